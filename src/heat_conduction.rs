//! Transient heat conduction `rho cp dT/dt = div(k grad T)` for the nodal temperature.
use std::time::Instant;

use log::{debug, info};

use crate::algorithm::{Algorithm, AlgorithmType, SolverAlgorithm};
use crate::algorithms::{
    AssembleElemSolverAlgorithm, AssembleNodalGradAlgorithmDriver, AssembleNodeSolverAlgorithm,
    AssembleScalarDirichletBc, AssembleScalarFluxBcSolverAlgorithm, AuxFunctionAlgorithm, ConstantAuxFunction,
    ConstantBcAuxFunctionAlgorithm, CopyFieldAlgorithm, DirichletBc, FluxLocation, MassBackwardEuler, MassBdf2,
    MassFields, ScalarDiffElemKernel,
};
use crate::config::{BcStyle, HeatConductionConfig, WallBcKind, WallBoundaryConditionConfig};
use crate::equation_system::{EquationSystem, EquationSystemCore, Stage, SystemSetup};
use crate::error::Result;
use crate::field_functions::{field_axpby, field_copy};
use crate::mesh::{FieldState, MeshDatabase, PartId};
use crate::projected_nodal_gradient::ProjectedNodalGradientEquationSystem;
use crate::realm::SolveContext;
use crate::topology::EntityRank;

pub const TEMPERATURE: &str = "temperature";
pub const TEMPERATURE_BC: &str = "temperature_bc";
pub const HEAT_FLUX_BC: &str = "heat_flux_bc";
pub const DTDX: &str = "dtdx";
pub const T_TMP: &str = "t_tmp";
pub const DUAL_NODAL_VOLUME: &str = "dual_nodal_volume";
pub const DENSITY: &str = "density";
pub const SPECIFIC_HEAT: &str = "specific_heat";
pub const THERMAL_CONDUCTIVITY: &str = "thermal_conductivity";

/// How `dtdx` is computed.
#[derive(Debug)]
enum NodalGradient {
    /// Lumped Green-Gauss gradient.
    Lumped(AssembleNodalGradAlgorithmDriver),
    /// Consistent-mass projection solved through its own linear system.
    Projected(Box<ProjectedNodalGradientEquationSystem>),
}

#[derive(Debug)]
pub struct HeatConductionEquationSystem {
    core: EquationSystemCore,
    spatial_dim: usize,
    num_states: usize,
    bc_style: BcStyle,
    convergence_tolerance: f64,
    nodal_gradient: NodalGradient,
    /// Copies NP1 into N after the boundary data moved into the solution, so that a three-state
    /// temperature starts from consistent history.
    copy_state: Vec<CopyFieldAlgorithm>,
    is_init: bool,
}

impl HeatConductionEquationSystem {
    pub fn new(config: &HeatConductionConfig, setup: &SystemSetup) -> Result<Self> {
        let solver = setup.solver_for(TEMPERATURE)?;
        let core = EquationSystemCore::new(
            &config.name,
            TEMPERATURE,
            1,
            setup.num_nodes,
            solver.clone(),
            config.max_iterations,
        );

        let nodal_gradient = if setup.options.consistent_mass_matrix_png {
            let png_solver = setup.solver_for(DTDX).unwrap_or(solver);
            NodalGradient::Projected(Box::new(ProjectedNodalGradientEquationSystem::new(
                DTDX,
                "q_tmp",
                TEMPERATURE,
                "PNGGradEQS",
                setup.spatial_dim,
                setup.num_nodes,
                png_solver,
            )))
        } else {
            NodalGradient::Lumped(AssembleNodalGradAlgorithmDriver::new(TEMPERATURE, DTDX))
        };
        info!(
            "{}: {} nodal gradient for temperature",
            config.name,
            match nodal_gradient {
                NodalGradient::Lumped(_) => "lumped",
                NodalGradient::Projected(_) => "consistent-mass projected",
            }
        );

        Ok(Self {
            core,
            spatial_dim: setup.spatial_dim,
            num_states: setup.num_states,
            bc_style: setup.options.bc_style,
            convergence_tolerance: config.convergence_tolerance,
            nodal_gradient,
            copy_state: Vec::new(),
            is_init: true,
        })
    }

    fn is_transient(&self) -> bool {
        self.num_states > 1
    }

    pub fn compute_projected_nodal_gradient(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        let start = Instant::now();
        match &mut self.nodal_gradient {
            NodalGradient::Lumped(driver) => driver.execute(mesh, ctx)?,
            NodalGradient::Projected(png) => png.solve_and_update_external(mesh, ctx)?,
        }
        self.core.timers.misc += start.elapsed();
        self.core.enter(Stage::DerivedRecomputed)
    }

    fn register_dirichlet(&mut self, mesh: &mut MeshDatabase, part: PartId, temperature: f64) -> Result<()> {
        mesh.declare_field_on_parts(TEMPERATURE_BC, EntityRank::Node, 1, 1, &[part])?;
        let function = ConstantAuxFunction::new(0, 1, vec![temperature])?;
        self.core.bc_data.push(Box::new(AuxFunctionAlgorithm::new(
            &[part],
            TEMPERATURE_BC,
            EntityRank::Node,
            Box::new(function),
        )));
        self.core.bc_data_map.push(Box::new(CopyFieldAlgorithm::new(
            &[part],
            (TEMPERATURE_BC, FieldState::Np1),
            (TEMPERATURE, FieldState::Np1),
            0,
            1,
        )));

        let bc_style = self.bc_style;
        self.core
            .solver_driver
            .build_or_extend_dirichlet(AlgorithmType::Wall, &[part], |parts| {
                let algorithm: Box<dyn SolverAlgorithm> = match bc_style {
                    BcStyle::NodeCentered => Box::new(DirichletBc::new(parts, TEMPERATURE, TEMPERATURE_BC, 0, 1)),
                    BcStyle::IpCentered => Box::new(AssembleScalarDirichletBc::new(
                        parts,
                        TEMPERATURE,
                        TEMPERATURE_BC,
                        THERMAL_CONDUCTIVITY,
                    )),
                };
                Ok(algorithm)
            })
    }

    fn register_heat_flux(&mut self, mesh: &mut MeshDatabase, part: PartId, heat_flux: f64) -> Result<()> {
        let location = match self.bc_style {
            BcStyle::NodeCentered => {
                mesh.declare_field_on_parts(HEAT_FLUX_BC, EntityRank::Node, 1, 1, &[part])?;
                let function = ConstantAuxFunction::new(0, 1, vec![heat_flux])?;
                self.core.bc_data.push(Box::new(AuxFunctionAlgorithm::new(
                    &[part],
                    HEAT_FLUX_BC,
                    EntityRank::Node,
                    Box::new(function),
                )));
                FluxLocation::Node
            }
            BcStyle::IpCentered => {
                mesh.declare_field_on_parts(HEAT_FLUX_BC, EntityRank::Face, 1, 1, &[part])?;
                self.core
                    .bc_data
                    .push(Box::new(ConstantBcAuxFunctionAlgorithm::new(&[part], HEAT_FLUX_BC, vec![heat_flux])?));
                FluxLocation::Face
            }
        };
        self.core
            .solver_driver
            .build_or_extend_solver(AlgorithmType::WallHeatFlux, &[part], |parts| {
                Ok(Box::new(AssembleScalarFluxBcSolverAlgorithm::new(parts, HEAT_FLUX_BC, location)))
            })
    }
}

impl EquationSystem for HeatConductionEquationSystem {
    fn core(&self) -> &EquationSystemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EquationSystemCore {
        &mut self.core
    }

    fn register_nodal_fields(&mut self, mesh: &mut MeshDatabase, parts: &[PartId]) -> Result<()> {
        let dim = self.spatial_dim;
        mesh.declare_field_on_parts(TEMPERATURE, EntityRank::Node, 1, self.num_states, parts)?;
        mesh.declare_field_on_parts(DTDX, EntityRank::Node, dim, 1, parts)?;
        mesh.declare_field_on_parts(T_TMP, EntityRank::Node, 1, 1, parts)?;
        mesh.declare_field_on_parts(DUAL_NODAL_VOLUME, EntityRank::Node, 1, 1, parts)?;
        for property in [DENSITY, SPECIFIC_HEAT, THERMAL_CONDUCTIVITY] {
            mesh.declare_field_on_parts(property, EntityRank::Node, 1, 1, parts)?;
        }
        if let NodalGradient::Projected(png) = &mut self.nodal_gradient {
            png.register_nodal_fields(mesh, parts)?;
        }
        if self.num_states > 2 {
            self.copy_state.push(CopyFieldAlgorithm::new(
                parts,
                (TEMPERATURE, FieldState::Np1),
                (TEMPERATURE, FieldState::N),
                0,
                1,
            ));
        }
        self.core.enter(Stage::FieldsRegistered)
    }

    fn register_interior_algorithm(&mut self, _mesh: &MeshDatabase, parts: &[PartId]) -> Result<()> {
        match &mut self.nodal_gradient {
            NodalGradient::Lumped(driver) => driver.register_interior(parts, DUAL_NODAL_VOLUME)?,
            NodalGradient::Projected(png) => png.register_interior_algorithm(parts)?,
        }

        self.core
            .solver_driver
            .build_or_extend_solver(AlgorithmType::Interior, parts, |parts| {
                let mut algorithm = AssembleElemSolverAlgorithm::new(parts, 1);
                algorithm.add_kernel(Box::new(ScalarDiffElemKernel::new(TEMPERATURE, THERMAL_CONDUCTIVITY)));
                Ok(Box::new(algorithm))
            })?;

        if self.is_transient() {
            let num_states = self.num_states;
            self.core
                .solver_driver
                .build_or_extend_solver(AlgorithmType::Mass, parts, |parts| {
                    let mut algorithm = AssembleNodeSolverAlgorithm::new(parts, 1);
                    let fields = MassFields {
                        scalar: TEMPERATURE.to_string(),
                        density: DENSITY.to_string(),
                        specific_heat: SPECIFIC_HEAT.to_string(),
                        dual_nodal_volume: DUAL_NODAL_VOLUME.to_string(),
                    };
                    if num_states == 2 {
                        algorithm.add_supplemental(Box::new(MassBackwardEuler::new(fields)));
                    } else {
                        algorithm.add_supplemental(Box::new(MassBdf2::new(fields)));
                    }
                    Ok(Box::new(algorithm))
                })?;
        }
        self.core.enter(Stage::AlgorithmsRegistered)
    }

    fn register_wall_bc(
        &mut self,
        mesh: &mut MeshDatabase,
        part: PartId,
        bc: &WallBoundaryConditionConfig,
    ) -> Result<()> {
        // Every wall closes the nodal gradient, whatever its condition.
        match &mut self.nodal_gradient {
            NodalGradient::Lumped(driver) => driver.register_boundary(&[part], DUAL_NODAL_VOLUME)?,
            NodalGradient::Projected(png) => png.register_wall_bc(&[part])?,
        }

        match bc.kind()? {
            WallBcKind::Dirichlet(temperature) => self.register_dirichlet(mesh, part, temperature)?,
            WallBcKind::HeatFlux(q) => self.register_heat_flux(mesh, part, q)?,
        }
        self.core.enter(Stage::AlgorithmsRegistered)
    }

    fn initialize(&mut self, mesh: &MeshDatabase) -> Result<()> {
        self.core.initialize(mesh)?;
        if let NodalGradient::Projected(png) = &mut self.nodal_gradient {
            png.initialize(mesh)?;
        }
        Ok(())
    }

    fn reinitialize_linear_system(&mut self, mesh: &MeshDatabase) -> Result<()> {
        self.core.reinitialize_linear_system(mesh)?;
        if let NodalGradient::Projected(png) = &mut self.nodal_gradient {
            png.reinitialize_linear_system(mesh)?;
        }
        Ok(())
    }

    fn initial_work(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        for algorithm in &mut self.copy_state {
            algorithm.execute(mesh, ctx)?;
        }
        Ok(())
    }

    fn predict_state(&mut self, mesh: &mut MeshDatabase) -> Result<()> {
        if self.num_states > 1 {
            field_copy(mesh, (TEMPERATURE, FieldState::N), (TEMPERATURE, FieldState::Np1))?;
        }
        self.core.enter(Stage::Predicted)
    }

    fn solve_and_update(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        if self.is_init {
            self.compute_projected_nodal_gradient(mesh, ctx)?;
            self.is_init = false;
        }

        let max_iterations = self.core.max_iterations;
        for k in 0..max_iterations {
            info!("{}/{} {:>20}", k + 1, max_iterations, self.core.name());
            let summary = self.core.assemble_and_solve(mesh, ctx, T_TMP)?;

            let start = Instant::now();
            field_axpby(mesh, 1.0, T_TMP, 1.0, TEMPERATURE)?;
            self.core.timers.assemble += start.elapsed();
            self.core.enter(Stage::Updated)?;

            self.compute_projected_nodal_gradient(mesh, ctx)?;

            if summary.nonlinear_residual < self.convergence_tolerance {
                debug!(
                    "{} converged after {} iterations, nonlinear residual {:e}",
                    self.core.name(),
                    k + 1,
                    summary.nonlinear_residual
                );
                break;
            }
        }
        Ok(())
    }

    fn dump_eq_time(&self) {
        self.core.dump_eq_time();
        if let NodalGradient::Projected(png) = &self.nodal_gradient {
            png.dump_eq_time();
        }
    }
}
