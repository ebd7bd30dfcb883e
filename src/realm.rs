//! A realm: one mesh with the physics solved on it.
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::algorithm::Algorithm;
use crate::algorithms::{AuxFunctionAlgorithm, ConstantAuxFunction};
use crate::assembly::BatchAssembler;
use crate::config::{BoundaryConditionConfig, LinearSolverConfig, RealmConfig, SolutionOptions, TimeStepControl};
use crate::equation_system::{EquationSystems, SystemSetup};
use crate::error::{CvfemError, Result};
use crate::geometry::ComputeGeometryAlgorithmDriver;
use crate::heat_conduction::{DENSITY, DUAL_NODAL_VOLUME, SPECIFIC_HEAT, THERMAL_CONDUCTIVITY};
use crate::master_element::MasterElementRepo;
use crate::mesh::{FieldState, MeshDatabase, Ownership, PartId};
use crate::time_integrator::TimeState;
use crate::topology::EntityRank;

/// Everything an algorithm needs besides the mesh and the linear system.
#[derive(Debug, Clone, Copy)]
pub struct SolveContext<'a> {
    pub time: TimeState,
    pub repo: &'a MasterElementRepo,
    pub assembler: &'a BatchAssembler,
    pub options: &'a SolutionOptions,
}

/// The shared, read-only services of a realm.
#[derive(Debug)]
struct Services {
    repo: MasterElementRepo,
    assembler: BatchAssembler,
    options: SolutionOptions,
}

impl Services {
    fn context(&self, time: TimeState) -> SolveContext<'_> {
        SolveContext {
            time,
            repo: &self.repo,
            assembler: &self.assembler,
            options: &self.options,
        }
    }
}

#[derive(Debug)]
pub struct Realm {
    name: String,
    mesh: MeshDatabase,
    services: Services,
    physics_targets: Vec<PartId>,
    equation_systems: EquationSystems,
    geometry: ComputeGeometryAlgorithmDriver,
    initial_conditions: Vec<AuxFunctionAlgorithm>,
    properties: Vec<AuxFunctionAlgorithm>,
    time_step_control: TimeStepControl,
    time: TimeState,
    num_states: usize,
    wall_time: Duration,
}

impl Realm {
    /// Builds the physics of `config` on `mesh`: fields, algorithms, boundary and initial
    /// conditions, and material properties.
    pub fn new(
        config: &RealmConfig,
        linear_solvers: &[LinearSolverConfig],
        mut mesh: MeshDatabase,
        second_order: bool,
    ) -> Result<Self> {
        config.validate()?;
        let physics_targets = config
            .material_properties
            .target
            .iter()
            .map(|name| mesh.part_id(name))
            .collect::<Result<Vec<_>>>()?;
        let num_states = match (config.steady, second_order) {
            (true, _) => 1,
            (false, false) => 2,
            (false, true) => 3,
        };
        info!(
            "realm {}: {} node(s), {} element(s), {} field state(s)",
            config.name,
            mesh.num_nodes(),
            mesh.elements().len(),
            num_states
        );

        let options = config.solution_options.clone();
        let setup = SystemSetup {
            spatial_dim: mesh.spatial_dim(),
            num_nodes: mesh.num_nodes(),
            num_states,
            options: &options,
            linear_solvers,
            solver_specification: &config.equation_systems.solver_system_specification,
        };
        let mut equation_systems = EquationSystems::load(&config.equation_systems, &setup)?;
        equation_systems.register_nodal_fields(&mut mesh, &physics_targets)?;
        equation_systems.register_interior_algorithm(&mesh, &physics_targets)?;
        for bc in &config.boundary_conditions {
            match bc {
                BoundaryConditionConfig::Wall(wall) => {
                    let part = mesh.part_id(&wall.target)?;
                    debug!("realm {}: wall boundary condition {} on {}", config.name, wall.name, wall.target);
                    equation_systems.register_wall_bc(&mut mesh, part, wall)?;
                }
            }
        }

        let geometry =
            ComputeGeometryAlgorithmDriver::new(&physics_targets, DUAL_NODAL_VOLUME, options.check_jacobians)?;

        let mut initial_conditions = Vec::new();
        for ic in config.initial_conditions()? {
            let parts = ic
                .target
                .iter()
                .map(|name| mesh.part_id(name))
                .collect::<Result<Vec<_>>>()?;
            for (field, values) in &ic.value {
                let components = mesh
                    .field(field)
                    .map_err(|_| {
                        CvfemError::configuration(format!(
                            "initial condition {} sets unknown field {}",
                            ic.name, field
                        ))
                    })?
                    .components();
                if values.len() != components {
                    return Err(CvfemError::configuration(format!(
                        "initial condition {} gives {} value(s) for {} with {} component(s)",
                        ic.name,
                        values.len(),
                        field,
                        components
                    )));
                }
                let function = ConstantAuxFunction::new(0, components, values.clone())?;
                initial_conditions.push(AuxFunctionAlgorithm::new(&parts, field, EntityRank::Node, Box::new(function)));
            }
        }

        let props = &config.material_properties;
        let properties = [
            (DENSITY, props.density),
            (SPECIFIC_HEAT, props.specific_heat),
            (THERMAL_CONDUCTIVITY, props.thermal_conductivity),
        ]
        .into_iter()
        .map(|(field, value)| {
            let function = ConstantAuxFunction::new(0, 1, vec![value])?;
            Ok(AuxFunctionAlgorithm::new(&physics_targets, field, EntityRank::Node, Box::new(function)))
        })
        .collect::<Result<Vec<_>>>()?;

        let assembler = BatchAssembler::new(options.simd_len);
        Ok(Self {
            name: config.name.clone(),
            mesh,
            services: Services {
                repo: MasterElementRepo::new(),
                assembler,
                options,
            },
            physics_targets,
            equation_systems,
            geometry,
            initial_conditions,
            properties,
            time_step_control: config.time_step_control.clone(),
            time: TimeState::default(),
            num_states,
            wall_time: Duration::ZERO,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mesh(&self) -> &MeshDatabase {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut MeshDatabase {
        &mut self.mesh
    }

    pub fn equation_systems(&self) -> &EquationSystems {
        &self.equation_systems
    }

    pub fn time_state(&self) -> TimeState {
        self.time
    }

    pub fn set_time_state(&mut self, time: TimeState) {
        self.time = time;
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn physics_targets(&self) -> &[PartId] {
        &self.physics_targets
    }

    /// Computes the dual nodal volumes, validates the elements if requested and builds the
    /// linear systems.
    pub fn initialize(&mut self) -> Result<()> {
        let start = Instant::now();
        let ctx = self.services.context(self.time);
        self.geometry.execute(&mut self.mesh, &ctx)?;
        self.equation_systems.initialize(&self.mesh)?;
        self.wall_time += start.elapsed();
        info!("realm {} initialized in {:.6}s", self.name, start.elapsed().as_secs_f64());
        Ok(())
    }

    pub fn populate_initial_condition(&mut self) -> Result<()> {
        let ctx = self.services.context(self.time);
        for algorithm in &mut self.initial_conditions {
            debug!("realm {}: initial condition for {}", self.name, algorithm.field());
            algorithm.execute(&mut self.mesh, &ctx)?;
        }
        Ok(())
    }

    pub fn populate_boundary_data(&mut self) -> Result<()> {
        let ctx = self.services.context(self.time);
        self.equation_systems
            .populate_boundary_data(&mut self.mesh, &ctx)
    }

    pub fn boundary_data_to_state_data(&mut self) -> Result<()> {
        let ctx = self.services.context(self.time);
        self.equation_systems
            .boundary_data_to_state_data(&mut self.mesh, &ctx)
    }

    pub fn populate_derived_quantities(&mut self) -> Result<()> {
        let ctx = self.services.context(self.time);
        self.equation_systems
            .populate_derived_quantities(&mut self.mesh, &ctx)
    }

    /// Evaluates the constant material properties on the physics targets.
    pub fn evaluate_properties(&mut self) -> Result<()> {
        let ctx = self.services.context(self.time);
        for algorithm in &mut self.properties {
            algorithm.execute(&mut self.mesh, &ctx)?;
        }
        Ok(())
    }

    pub fn initial_work(&mut self) -> Result<()> {
        let ctx = self.services.context(self.time);
        self.equation_systems.initial_work(&mut self.mesh, &ctx)
    }

    /// Largest stable step for the next step given the previous step `dt`.
    ///
    /// The step follows the target Fourier number `Fo = k dt / (rho cp h^2)` on every owned node,
    /// with `h` the edge length of a cube of the dual nodal volume, and may grow by at most the
    /// change factor per step.
    pub fn compute_adaptive_time_step(&self, dt: f64) -> Result<f64> {
        let control = &self.time_step_control;
        let dim = self.mesh.spatial_dim() as f64;
        let volume = self.mesh.field_state(DUAL_NODAL_VOLUME, FieldState::Np1)?;
        let rho = self.mesh.field_state(DENSITY, FieldState::Np1)?;
        let cp = self.mesh.field_state(SPECIFIC_HEAT, FieldState::Np1)?;
        let k = self.mesh.field_state(THERMAL_CONDUCTIVITY, FieldState::Np1)?;

        let mut dt_new = control.time_step_max.min(dt * control.time_step_change_factor);
        for n in self
            .mesh
            .select_nodes(&self.physics_targets, Ownership::LocallyOwned)
        {
            if volume[n] <= 0.0 || k[n] <= 0.0 {
                continue;
            }
            let h = volume[n].powf(1.0 / dim);
            dt_new = dt_new.min(control.target_fourier * h * h * rho[n] * cp[n] / k[n]);
        }
        debug!("realm {}: adaptive time step {:e}", self.name, dt_new);
        Ok(dt_new)
    }

    pub fn swap_states(&mut self) {
        self.mesh.swap_states();
    }

    pub fn predict_state(&mut self) -> Result<()> {
        self.equation_systems.predict_state(&mut self.mesh)
    }

    pub fn pre_timestep_work(&mut self) -> Result<()> {
        let ctx = self.services.context(self.time);
        self.equation_systems
            .pre_timestep_work(&mut self.mesh, &ctx)
    }

    /// One nonlinear pass over the equation systems.
    pub fn advance_time_step(&mut self) -> Result<()> {
        let start = Instant::now();
        let ctx = self.services.context(self.time);
        self.equation_systems
            .solve_and_update(&mut self.mesh, &ctx)?;
        self.wall_time += start.elapsed();
        Ok(())
    }

    pub fn post_converged_work(&mut self) -> Result<()> {
        let ctx = self.services.context(self.time);
        self.equation_systems
            .post_converged_work(&mut self.mesh, &ctx)
    }

    pub fn provide_mean_norm(&self) -> f64 {
        self.equation_systems.provide_mean_system_norm()
    }

    /// Replaces the linear systems of all physics after a change of the mesh connectivity.
    pub fn reinitialize_linear_systems(&mut self) -> Result<()> {
        self.equation_systems
            .reinitialize_linear_system(&self.mesh)
    }

    pub fn dump_simulation_time(&self) {
        info!(
            "realm {}: {:.6}s in initialization and nonlinear iterations",
            self.name,
            self.wall_time.as_secs_f64()
        );
        self.equation_systems.dump_eq_time();
    }
}
