//! Equation systems: one physics each, orchestrating fields, algorithms and a linear system.
//!
//! Every equation system goes through the stages
//! `Constructed -> FieldsRegistered -> AlgorithmsRegistered -> Initialized` once and then
//! through `Predicted -> AssembledAndSolved -> Updated -> DerivedRecomputed` in every step.
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::algorithm::{Algorithm, SolverAlgorithmDriver};
use crate::config::{
    EquationSystemsConfig, LinearSolverConfig, SolutionOptions, SystemConfig, WallBoundaryConditionConfig,
};
use crate::error::{CvfemError, Result};
use crate::heat_conduction::HeatConductionEquationSystem;
use crate::linear_system::{CsrLinearSystem, LinearSystem, SolveSummary};
use crate::mesh::{FieldState, MeshDatabase, PartId};
use crate::realm::SolveContext;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Constructed,
    FieldsRegistered,
    AlgorithmsRegistered,
    Initialized,
    Predicted,
    AssembledAndSolved,
    Updated,
    DerivedRecomputed,
}

impl Stage {
    fn may_enter(self, next: Stage) -> bool {
        use Stage::*;
        match next {
            Constructed => false,
            FieldsRegistered => matches!(self, Constructed | FieldsRegistered),
            AlgorithmsRegistered => matches!(self, FieldsRegistered | AlgorithmsRegistered),
            Initialized => self >= FieldsRegistered,
            Predicted | AssembledAndSolved | DerivedRecomputed => self >= Initialized,
            Updated => self == AssembledAndSolved,
        }
    }
}

/// Wall-clock time spent in the phases of an equation system.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EquationSystemTimers {
    pub init: Duration,
    pub assemble: Duration,
    pub solve: Duration,
    pub misc: Duration,
}

/// Everything an equation system needs from its realm at construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemSetup<'a> {
    pub spatial_dim: usize,
    pub num_nodes: usize,
    /// 1 for steady realms, 2 for first and 3 for second order time accuracy.
    pub num_states: usize,
    pub options: &'a SolutionOptions,
    pub linear_solvers: &'a [LinearSolverConfig],
    /// Degree-of-freedom name to linear solver name.
    pub solver_specification: &'a BTreeMap<String, String>,
}

impl<'a> SystemSetup<'a> {
    pub fn is_transient(&self) -> bool {
        self.num_states > 1
    }

    /// The linear solver configured for the degree of freedom `dof`.
    pub fn solver_for(&self, dof: &str) -> Result<LinearSolverConfig> {
        let name = self
            .solver_specification
            .get(dof)
            .ok_or_else(|| CvfemError::configuration(format!("no linear solver specified for {}", dof)))?;
        self.linear_solvers
            .iter()
            .find(|s| &s.name == name)
            .cloned()
            .ok_or_else(|| CvfemError::configuration(format!("unknown linear solver {} for {}", name, dof)))
    }
}

/// State shared by all equation systems: the solver algorithms, the linear system and the
/// boundary data algorithms.
#[derive(Debug)]
pub struct EquationSystemCore {
    name: String,
    dof_name: String,
    dofs_per_node: usize,
    num_nodes: usize,
    solver: LinearSolverConfig,
    linear_system: Box<dyn LinearSystem>,
    pub(crate) solver_driver: SolverAlgorithmDriver,
    /// Fill boundary value fields.
    pub(crate) bc_data: Vec<Box<dyn Algorithm>>,
    /// Move boundary values into the solution.
    pub(crate) bc_data_map: Vec<Box<dyn Algorithm>>,
    pub(crate) timers: EquationSystemTimers,
    pub(crate) max_iterations: usize,
    stage: Stage,
    last_solve: Option<SolveSummary>,
}

impl EquationSystemCore {
    pub fn new(
        name: &str,
        dof_name: &str,
        dofs_per_node: usize,
        num_nodes: usize,
        solver: LinearSolverConfig,
        max_iterations: usize,
    ) -> Self {
        let linear_system = CsrLinearSystem::new(dof_name, dofs_per_node, num_nodes, solver.clone());
        Self {
            name: name.to_string(),
            dof_name: dof_name.to_string(),
            dofs_per_node,
            num_nodes,
            solver,
            linear_system: Box::new(linear_system),
            solver_driver: SolverAlgorithmDriver::new(),
            bc_data: Vec::new(),
            bc_data_map: Vec::new(),
            timers: EquationSystemTimers::default(),
            max_iterations,
            stage: Stage::Constructed,
            last_solve: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dof_name(&self) -> &str {
        &self.dof_name
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn timers(&self) -> &EquationSystemTimers {
        &self.timers
    }

    pub fn linear_system(&self) -> &dyn LinearSystem {
        self.linear_system.as_ref()
    }

    pub fn solver_driver(&self) -> &SolverAlgorithmDriver {
        &self.solver_driver
    }

    pub fn last_solve(&self) -> Option<SolveSummary> {
        self.last_solve
    }

    pub(crate) fn enter(&mut self, next: Stage) -> Result<()> {
        if !self.stage.may_enter(next) {
            return Err(CvfemError::precondition(
                "equation system stage",
                format!("{} cannot move from {:?} to {:?}", self.name, self.stage, next),
            ));
        }
        self.stage = next;
        Ok(())
    }

    /// Builds the matrix graph of all solver algorithms and finalizes the linear system.
    pub fn initialize(&mut self, mesh: &MeshDatabase) -> Result<()> {
        let start = Instant::now();
        self.enter(Stage::Initialized)?;
        self.solver_driver
            .initialize_connectivity(mesh, self.linear_system.as_mut())?;
        self.linear_system.finalize_linear_system()?;
        self.timers.init += start.elapsed();
        Ok(())
    }

    /// Replaces the linear system by a fresh one and rebuilds its graph.
    pub fn reinitialize_linear_system(&mut self, mesh: &MeshDatabase) -> Result<()> {
        debug!("reinitializing linear system of {}", self.name);
        self.linear_system = Box::new(CsrLinearSystem::new(
            &self.dof_name,
            self.dofs_per_node,
            self.num_nodes,
            self.solver.clone(),
        ));
        self.initialize(mesh)
    }

    pub fn populate_boundary_data(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        for algorithm in &mut self.bc_data {
            algorithm.execute(mesh, ctx)?;
        }
        Ok(())
    }

    pub fn boundary_data_to_state_data(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        for algorithm in &mut self.bc_data_map {
            algorithm.execute(mesh, ctx)?;
        }
        Ok(())
    }

    /// Assembles the linear system, solves it and writes the solution into the NP1 state of
    /// `delta`.
    pub fn assemble_and_solve(
        &mut self,
        mesh: &mut MeshDatabase,
        ctx: &SolveContext,
        delta: &str,
    ) -> Result<SolveSummary> {
        self.enter(Stage::AssembledAndSolved)?;
        let start = Instant::now();
        self.solver_driver
            .execute(mesh, ctx, self.linear_system.as_mut())?;
        self.timers.assemble += start.elapsed();

        let start = Instant::now();
        let values = mesh.field_state_mut(delta, FieldState::Np1)?;
        if values.len() != self.linear_system.num_rows() {
            return Err(CvfemError::Field(format!(
                "delta field {} has {} values for {} rows",
                delta,
                values.len(),
                self.linear_system.num_rows()
            )));
        }
        let summary = self.linear_system.solve(values)?;
        self.timers.solve += start.elapsed();

        info!(
            "{:>20}: {} linear iterations, linear residual {:e}, nonlinear residual {:e}",
            self.name, summary.iterations, summary.linear_residual, summary.nonlinear_residual
        );
        self.last_solve = Some(summary);
        Ok(summary)
    }

    /// Nonlinear residual of the last solve scaled by the square root of the number of rows.
    pub fn system_norm(&self) -> f64 {
        let rows = (self.dofs_per_node * self.num_nodes).max(1) as f64;
        self.last_solve
            .map(|s| s.nonlinear_residual / rows.sqrt())
            .unwrap_or(0.0)
    }

    pub fn dump_eq_time(&self) {
        info!(
            "timing for {}: init {:.6}s assemble {:.6}s solve {:.6}s misc {:.6}s",
            self.name,
            self.timers.init.as_secs_f64(),
            self.timers.assemble.as_secs_f64(),
            self.timers.solve.as_secs_f64(),
            self.timers.misc.as_secs_f64()
        );
    }
}

/// One physics.
pub trait EquationSystem: Debug + Send {
    fn core(&self) -> &EquationSystemCore;

    fn core_mut(&mut self) -> &mut EquationSystemCore;

    fn name(&self) -> &str {
        self.core().name()
    }

    /// Declares the fields of the system on `parts`. Repeated declarations are idempotent.
    fn register_nodal_fields(&mut self, mesh: &mut MeshDatabase, parts: &[PartId]) -> Result<()>;

    fn register_interior_algorithm(&mut self, mesh: &MeshDatabase, parts: &[PartId]) -> Result<()>;

    fn register_wall_bc(
        &mut self,
        mesh: &mut MeshDatabase,
        part: PartId,
        bc: &WallBoundaryConditionConfig,
    ) -> Result<()>;

    fn initialize(&mut self, mesh: &MeshDatabase) -> Result<()> {
        self.core_mut().initialize(mesh)
    }

    fn reinitialize_linear_system(&mut self, mesh: &MeshDatabase) -> Result<()> {
        self.core_mut().reinitialize_linear_system(mesh)
    }

    fn populate_boundary_data(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        self.core_mut().populate_boundary_data(mesh, ctx)
    }

    fn boundary_data_to_state_data(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        self.core_mut().boundary_data_to_state_data(mesh, ctx)
    }

    fn populate_derived_quantities(&mut self, _mesh: &mut MeshDatabase, _ctx: &SolveContext) -> Result<()> {
        Ok(())
    }

    fn initial_work(&mut self, _mesh: &mut MeshDatabase, _ctx: &SolveContext) -> Result<()> {
        Ok(())
    }

    fn pre_timestep_work(&mut self, _mesh: &mut MeshDatabase, _ctx: &SolveContext) -> Result<()> {
        Ok(())
    }

    /// Moves the solution to its first guess for the new time level.
    fn predict_state(&mut self, mesh: &mut MeshDatabase) -> Result<()>;

    fn solve_and_update(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()>;

    fn post_converged_work(&mut self, _mesh: &mut MeshDatabase, _ctx: &SolveContext) -> Result<()> {
        Ok(())
    }

    fn system_norm(&self) -> f64 {
        self.core().system_norm()
    }

    fn dump_eq_time(&self) {
        self.core().dump_eq_time();
    }
}

/// The equation systems of one realm, solved one after the other.
#[derive(Debug)]
pub struct EquationSystems {
    name: String,
    max_iterations: usize,
    systems: Vec<Box<dyn EquationSystem>>,
}

impl EquationSystems {
    pub fn new(name: &str, max_iterations: usize) -> Self {
        Self {
            name: name.to_string(),
            max_iterations,
            systems: Vec::new(),
        }
    }

    /// Builds every system named in `config`.
    pub fn load(config: &EquationSystemsConfig, setup: &SystemSetup) -> Result<Self> {
        let mut systems = Self::new(&config.name, config.max_iterations);
        for system in &config.systems {
            match system {
                SystemConfig::HeatConduction(heat) => {
                    info!("equation systems {}: loading heat conduction {}", config.name, heat.name);
                    systems.push(Box::new(HeatConductionEquationSystem::new(heat, setup)?));
                }
            }
        }
        Ok(systems)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&mut self, system: Box<dyn EquationSystem>) {
        self.systems.push(system);
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn EquationSystem> {
        self.systems.iter().map(|s| s.as_ref())
    }

    pub fn get(&self, name: &str) -> Option<&dyn EquationSystem> {
        self.iter().find(|s| s.name() == name)
    }

    pub fn register_nodal_fields(&mut self, mesh: &mut MeshDatabase, parts: &[PartId]) -> Result<()> {
        for system in &mut self.systems {
            system.register_nodal_fields(mesh, parts)?;
        }
        Ok(())
    }

    pub fn register_interior_algorithm(&mut self, mesh: &MeshDatabase, parts: &[PartId]) -> Result<()> {
        for system in &mut self.systems {
            system.register_interior_algorithm(mesh, parts)?;
        }
        Ok(())
    }

    pub fn register_wall_bc(
        &mut self,
        mesh: &mut MeshDatabase,
        part: PartId,
        bc: &WallBoundaryConditionConfig,
    ) -> Result<()> {
        for system in &mut self.systems {
            system.register_wall_bc(mesh, part, bc)?;
        }
        Ok(())
    }

    pub fn initialize(&mut self, mesh: &MeshDatabase) -> Result<()> {
        for system in &mut self.systems {
            system.initialize(mesh)?;
        }
        Ok(())
    }

    pub fn reinitialize_linear_system(&mut self, mesh: &MeshDatabase) -> Result<()> {
        for system in &mut self.systems {
            system.reinitialize_linear_system(mesh)?;
        }
        Ok(())
    }

    pub fn populate_boundary_data(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        for system in &mut self.systems {
            system.populate_boundary_data(mesh, ctx)?;
        }
        Ok(())
    }

    pub fn boundary_data_to_state_data(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        for system in &mut self.systems {
            system.boundary_data_to_state_data(mesh, ctx)?;
        }
        Ok(())
    }

    pub fn populate_derived_quantities(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        for system in &mut self.systems {
            system.populate_derived_quantities(mesh, ctx)?;
        }
        Ok(())
    }

    pub fn initial_work(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        for system in &mut self.systems {
            system.initial_work(mesh, ctx)?;
        }
        Ok(())
    }

    pub fn pre_timestep_work(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        for system in &mut self.systems {
            system.pre_timestep_work(mesh, ctx)?;
        }
        Ok(())
    }

    pub fn predict_state(&mut self, mesh: &mut MeshDatabase) -> Result<()> {
        for system in &mut self.systems {
            system.predict_state(mesh)?;
        }
        Ok(())
    }

    /// Runs `max_iterations` coupling passes over all systems.
    pub fn solve_and_update(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        for k in 0..self.max_iterations {
            info!("{} iteration {}/{}", self.name, k + 1, self.max_iterations);
            for system in &mut self.systems {
                system.solve_and_update(mesh, ctx)?;
            }
        }
        Ok(())
    }

    pub fn post_converged_work(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        for system in &mut self.systems {
            system.post_converged_work(mesh, ctx)?;
        }
        Ok(())
    }

    /// Largest system norm.
    pub fn provide_system_norm(&self) -> f64 {
        self.systems
            .iter()
            .map(|s| s.system_norm())
            .fold(0.0, f64::max)
    }

    /// Mean of the system norms.
    pub fn provide_mean_system_norm(&self) -> f64 {
        if self.systems.is_empty() {
            return 0.0;
        }
        self.systems.iter().map(|s| s.system_norm()).sum::<f64>() / self.systems.len() as f64
    }

    pub fn dump_eq_time(&self) {
        for system in &self.systems {
            system.dump_eq_time();
        }
    }
}
