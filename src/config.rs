//! Simulation input, deserialized with serde.
//!
//! The structures are format agnostic: callers pick a serde format crate and hand the result to
//! [`Simulation::new`](crate::simulation::Simulation::new), which calls
//! [`SimulationConfig::validate`] before anything else.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CvfemError, Result};
use crate::linear_solver::KrylovMethod;
use crate::DEFAULT_SIMD_LEN;

fn one() -> usize {
    1
}

fn default_tolerance() -> f64 {
    1e-8
}

fn default_max_iterations() -> usize {
    1000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub linear_solvers: Vec<LinearSolverConfig>,
    #[serde(default)]
    pub time_integrator: Option<TimeIntegratorConfig>,
    #[serde(default)]
    pub realms: Vec<RealmConfig>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreconditionerType {
    None,
    #[default]
    Jacobi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSolverConfig {
    pub name: String,
    pub method: KrylovMethod,
    #[serde(default)]
    pub preconditioner: PreconditionerType,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeSteppingType {
    #[default]
    Fixed,
    Adaptive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeIntegratorConfig {
    pub name: String,
    #[serde(default)]
    pub termination_time: Option<f64>,
    /// Prevails over `termination_time` when both are given.
    #[serde(default)]
    pub termination_step_count: Option<usize>,
    pub time_step: f64,
    #[serde(default)]
    pub start_time: f64,
    /// Step count to start from, e.g. when continuing a simulation.
    #[serde(default)]
    pub time_step_count: usize,
    #[serde(default)]
    pub second_order_accuracy: bool,
    #[serde(default = "one")]
    pub nonlinear_iterations: usize,
    #[serde(default)]
    pub time_stepping_type: TimeSteppingType,
    pub realms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealmConfig {
    pub name: String,
    /// Steady realms keep a single field state and assemble no mass terms.
    #[serde(default)]
    pub steady: bool,
    pub equation_systems: EquationSystemsConfig,
    /// A missing block is a configuration error.
    #[serde(default)]
    pub initial_conditions: Option<Vec<InitialConditionConfig>>,
    #[serde(default)]
    pub boundary_conditions: Vec<BoundaryConditionConfig>,
    pub material_properties: MaterialPropertiesConfig,
    #[serde(default)]
    pub solution_options: SolutionOptions,
    #[serde(default)]
    pub time_step_control: TimeStepControl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquationSystemsConfig {
    pub name: String,
    #[serde(default = "one")]
    pub max_iterations: usize,
    /// Maps a degree-of-freedom name (e.g. `temperature`) to a linear solver name.
    #[serde(default)]
    pub solver_system_specification: BTreeMap<String, String>,
    pub systems: Vec<SystemConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SystemConfig {
    HeatConduction(HeatConductionConfig),
}

fn heat_conduction_name() -> String {
    "myHeatConduction".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatConductionConfig {
    #[serde(default = "heat_conduction_name")]
    pub name: String,
    #[serde(default = "one")]
    pub max_iterations: usize,
    #[serde(default)]
    pub convergence_tolerance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialConditionConfig {
    pub name: String,
    pub target: Vec<String>,
    /// Constant value per field name.
    pub value: BTreeMap<String, Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoundaryConditionConfig {
    Wall(WallBoundaryConditionConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallBoundaryConditionConfig {
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub user_data: WallUserData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WallUserData {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub heat_flux: Option<f64>,
}

/// A wall boundary condition after validation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum WallBcKind {
    Dirichlet(f64),
    HeatFlux(f64),
}

impl WallBoundaryConditionConfig {
    /// Exactly one of a Dirichlet value and a heat flux must be given.
    pub fn kind(&self) -> Result<WallBcKind> {
        match (self.user_data.temperature, self.user_data.heat_flux) {
            (Some(t), None) => Ok(WallBcKind::Dirichlet(t)),
            (None, Some(q)) => Ok(WallBcKind::HeatFlux(q)),
            (Some(_), Some(_)) => Err(CvfemError::configuration(format!(
                "wall boundary condition {} specifies both temperature and heat_flux",
                self.name
            ))),
            (None, None) => Err(CvfemError::configuration(format!(
                "wall boundary condition {} specifies neither temperature nor heat_flux",
                self.name
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialPropertiesConfig {
    #[serde(default)]
    pub target: Vec<String>,
    pub density: f64,
    pub specific_heat: f64,
    pub thermal_conductivity: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BcStyle {
    /// Boundary values are applied at boundary nodes.
    #[default]
    NodeCentered,
    /// Boundary values are applied weakly at face integration points.
    IpCentered,
}

fn default_simd_len() -> usize {
    DEFAULT_SIMD_LEN
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionOptions {
    #[serde(default)]
    pub bc_style: BcStyle,
    #[serde(default)]
    pub check_jacobians: bool,
    /// Compute nodal gradients from a consistent-mass projection instead of lumped Green-Gauss.
    #[serde(default)]
    pub consistent_mass_matrix_png: bool,
    #[serde(default = "default_simd_len")]
    pub simd_len: usize,
}

impl Default for SolutionOptions {
    fn default() -> Self {
        Self {
            bc_style: BcStyle::default(),
            check_jacobians: false,
            consistent_mass_matrix_png: false,
            simd_len: DEFAULT_SIMD_LEN,
        }
    }
}

fn default_target_fourier() -> f64 {
    1.0
}

fn default_time_step_max() -> f64 {
    f64::MAX
}

fn default_time_step_change_factor() -> f64 {
    1.25
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeStepControl {
    #[serde(default = "default_target_fourier")]
    pub target_fourier: f64,
    #[serde(default = "default_time_step_max")]
    pub time_step_max: f64,
    #[serde(default = "default_time_step_change_factor")]
    pub time_step_change_factor: f64,
}

impl Default for TimeStepControl {
    fn default() -> Self {
        Self {
            target_fourier: default_target_fourier(),
            time_step_max: default_time_step_max(),
            time_step_change_factor: default_time_step_change_factor(),
        }
    }
}

impl SimulationConfig {
    pub fn time_integrator(&self) -> Result<&TimeIntegratorConfig> {
        self.time_integrator
            .as_ref()
            .ok_or_else(|| CvfemError::configuration("no time integrator specified"))
    }

    pub fn linear_solver(&self, name: &str) -> Result<&LinearSolverConfig> {
        self.linear_solvers
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| CvfemError::configuration(format!("unknown linear solver {}", name)))
    }

    pub fn realm(&self, name: &str) -> Result<&RealmConfig> {
        self.realms
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| CvfemError::configuration(format!("unknown realm {}", name)))
    }

    /// Checks everything that can be checked without a mesh.
    pub fn validate(&self) -> Result<()> {
        let integrator = self.time_integrator()?;
        if integrator.termination_time.is_none() && integrator.termination_step_count.is_none() {
            return Err(CvfemError::configuration(format!(
                "time integrator {} needs termination_time or termination_step_count",
                integrator.name
            )));
        }
        if integrator.time_step <= 0.0 {
            return Err(CvfemError::configuration(format!(
                "time integrator {} has non-positive time_step {}",
                integrator.name, integrator.time_step
            )));
        }
        if integrator.nonlinear_iterations == 0 {
            return Err(CvfemError::configuration("nonlinear_iterations must be at least 1"));
        }
        if integrator.realms.is_empty() {
            return Err(CvfemError::configuration(format!(
                "time integrator {} drives no realms",
                integrator.name
            )));
        }

        for realm_name in &integrator.realms {
            let realm = self.realm(realm_name)?;
            realm.validate()?;
            for solver in realm.equation_systems.solver_system_specification.values() {
                self.linear_solver(solver)?;
            }
        }
        Ok(())
    }
}

impl RealmConfig {
    pub fn initial_conditions(&self) -> Result<&[InitialConditionConfig]> {
        self.initial_conditions
            .as_deref()
            .ok_or_else(|| CvfemError::configuration(format!("realm {} has no initial_conditions block", self.name)))
    }

    pub fn validate(&self) -> Result<()> {
        self.initial_conditions()?;
        for bc in &self.boundary_conditions {
            match bc {
                BoundaryConditionConfig::Wall(wall) => {
                    wall.kind()?;
                }
            }
        }
        if self.solution_options.simd_len == 0 {
            return Err(CvfemError::configuration(format!("realm {} has simd_len 0", self.name)));
        }
        let props = &self.material_properties;
        if props.target.is_empty() {
            return Err(CvfemError::configuration(format!(
                "realm {} has no material_properties target",
                self.name
            )));
        }
        if props.density <= 0.0 || props.specific_heat <= 0.0 || props.thermal_conductivity <= 0.0 {
            return Err(CvfemError::configuration(format!(
                "realm {} has non-positive material properties",
                self.name
            )));
        }
        if self.equation_systems.systems.is_empty() {
            return Err(CvfemError::configuration(format!("realm {} has no equation systems", self.name)));
        }
        Ok(())
    }
}
