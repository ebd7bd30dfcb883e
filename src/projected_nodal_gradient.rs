//! Consistent-mass projected nodal gradient.
//!
//! Solves `sum_k M_ik dqdx_k = sum over SCS of q_ip A_ip + sum over boundary sub-faces of q_ip A_ip`
//! for every node `i`, where `M_ik = sum over the SCVs of i of N_k(ip) V_scv`. The system has one
//! degree of freedom per spatial direction and is solved in residual form for the increment
//! `q_tmp`.
use log::info;

use crate::algorithm::{extend_parts, AlgorithmType, SolverAlgorithm};
use crate::algorithms::LocalContribution;
use crate::assembly::{ElementDataRequest, MasterElementQuantity};
use crate::config::LinearSolverConfig;
use crate::equation_system::{EquationSystemCore, Stage};
use crate::error::{CvfemError, Result};
use crate::field_functions::field_axpby;
use crate::linear_system::LinearSystem;
use crate::master_element::MasterElement;
use crate::mesh::{FieldState, MeshDatabase, PartId};
use crate::realm::SolveContext;
use crate::topology::EntityRank;

/// Interior contributions: the consistent mass matrix and the sub-control surface fluxes.
#[derive(Debug, Clone)]
pub struct AssemblePngElemSolverAlgorithm {
    parts: Vec<PartId>,
    independent: String,
    gradient: String,
    request: ElementDataRequest,
}

impl AssemblePngElemSolverAlgorithm {
    pub fn new(parts: &[PartId], independent: &str, gradient: &str) -> Self {
        let request = ElementDataRequest::new()
            .with_nodal_field(independent, FieldState::Np1)
            .with_nodal_field(gradient, FieldState::Np1)
            .with_quantity(MasterElementQuantity::ScvVolume)
            .with_quantity(MasterElementQuantity::ScsAreaVector);
        Self {
            parts: parts.to_vec(),
            independent: independent.to_string(),
            gradient: gradient.to_string(),
            request,
        }
    }
}

impl SolverAlgorithm for AssemblePngElemSolverAlgorithm {
    fn parts(&self) -> &[PartId] {
        &self.parts
    }

    fn add_parts(&mut self, parts: &[PartId]) {
        extend_parts(&mut self.parts, parts);
    }

    fn initialize_connectivity(&self, mesh: &MeshDatabase, system: &mut dyn LinearSystem) -> Result<()> {
        system.build_elem_graph(mesh, &self.parts);
        Ok(())
    }

    fn execute(&self, mesh: &MeshDatabase, ctx: &SolveContext, system: &mut dyn LinearSystem) -> Result<()> {
        let dim = mesh.spatial_dim();
        let batches = ctx
            .assembler
            .run_elem_algorithm(mesh, ctx.repo, &self.parts, &self.request, |smd| -> Result<Vec<LocalContribution>> {
                let views = &smd.elem;
                let topology = views
                    .topology()
                    .ok_or_else(|| CvfemError::precondition("projected nodal gradient", "batch without topology"))?;
                let volume_me = ctx.repo.volume(topology)?;
                let surface_me = ctx.repo.surface(topology)?;
                let (volume_shape, surface_shape) = (volume_me.shape_fcn(), surface_me.shape_fcn());
                let q = views.field(&self.independent, FieldState::Np1)?;
                let dqdx = views.field(&self.gradient, FieldState::Np1)?;
                let scv = views.quantity(MasterElementQuantity::ScvVolume)?;
                let area = views.quantity(MasterElementQuantity::ScsAreaVector)?;
                let n = topology.num_nodes();
                let rows = n * dim;

                let mut contributions = Vec::with_capacity(smd.num_simd_elems());
                for lane in 0..smd.num_simd_elems() {
                    let mut local = LocalContribution::zeros(views.nodes(lane), dim);

                    for (ip, &ir) in volume_me.ip_node_map().iter().enumerate() {
                        let sc_v = scv.get(lane, ip);
                        for ic in 0..n {
                            let r = volume_shape[(ip, ic)] * sc_v;
                            for i in 0..dim {
                                let (row, col) = (ir * dim + i, ic * dim + i);
                                local.lhs[row * rows + col] += r;
                                local.rhs[row] -= r * dqdx.get(lane, col);
                            }
                        }
                    }

                    for (ip, &[l, r]) in surface_me.lrscv().iter().enumerate() {
                        let q_ip: f64 = (0..n).map(|ic| surface_shape[(ip, ic)] * q.get(lane, ic)).sum();
                        for i in 0..dim {
                            let flux = q_ip * area.get(lane, ip * dim + i);
                            local.rhs[l * dim + i] += flux;
                            local.rhs[r * dim + i] -= flux;
                        }
                    }
                    contributions.push(local);
                }
                Ok(contributions)
            })?;
        for batch in batches {
            for local in batch? {
                system.sum_into(&local.nodes, &local.rhs, &local.lhs)?;
            }
        }
        Ok(())
    }
}

/// Boundary closure: the flux `q_ip A_ip` through the exposed sub-faces of a wall.
#[derive(Debug, Clone)]
pub struct AssemblePngBoundarySolverAlgorithm {
    parts: Vec<PartId>,
    independent: String,
    request: ElementDataRequest,
}

impl AssemblePngBoundarySolverAlgorithm {
    pub fn new(parts: &[PartId], independent: &str) -> Self {
        let request = ElementDataRequest::new()
            .with_nodal_field(independent, FieldState::Np1)
            .with_quantity(MasterElementQuantity::FcAreaVector);
        Self {
            parts: parts.to_vec(),
            independent: independent.to_string(),
            request,
        }
    }
}

impl SolverAlgorithm for AssemblePngBoundarySolverAlgorithm {
    fn parts(&self) -> &[PartId] {
        &self.parts
    }

    fn add_parts(&mut self, parts: &[PartId]) {
        extend_parts(&mut self.parts, parts);
    }

    fn initialize_connectivity(&self, mesh: &MeshDatabase, system: &mut dyn LinearSystem) -> Result<()> {
        system.build_face_graph(mesh, &self.parts);
        Ok(())
    }

    fn execute(&self, mesh: &MeshDatabase, ctx: &SolveContext, system: &mut dyn LinearSystem) -> Result<()> {
        let dim = mesh.spatial_dim();
        let batches = ctx
            .assembler
            .run_face_algorithm(mesh, ctx.repo, &self.parts, &self.request, |smd| -> Result<Vec<LocalContribution>> {
                let views = &smd.face;
                let topology = views
                    .topology()
                    .ok_or_else(|| CvfemError::precondition("projected nodal gradient", "batch without topology"))?;
                let me = ctx.repo.face(topology)?;
                let shape = me.shape_fcn();
                let q = views.field(&self.independent, FieldState::Np1)?;
                let area = views.quantity(MasterElementQuantity::FcAreaVector)?;
                let n = topology.num_nodes();

                let mut contributions = Vec::with_capacity(smd.num_simd_elems());
                for lane in 0..smd.num_simd_elems() {
                    let mut local = LocalContribution::zeros(views.nodes(lane), dim);
                    for (ip, &nn) in me.ip_node_map().iter().enumerate() {
                        let q_ip: f64 = (0..n).map(|ic| shape[(ip, ic)] * q.get(lane, ic)).sum();
                        for i in 0..dim {
                            local.rhs[nn * dim + i] += q_ip * area.get(lane, ip * dim + i);
                        }
                    }
                    contributions.push(local);
                }
                Ok(contributions)
            })?;
        for batch in batches {
            for local in batch? {
                system.sum_into(&local.nodes, &local.rhs, &local.lhs)?;
            }
        }
        Ok(())
    }
}

/// Projected nodal gradient of `independent`, managed by the system that owns `independent`.
#[derive(Debug)]
pub struct ProjectedNodalGradientEquationSystem {
    core: EquationSystemCore,
    gradient: String,
    delta: String,
    independent: String,
    spatial_dim: usize,
}

impl ProjectedNodalGradientEquationSystem {
    pub fn new(
        gradient: &str,
        delta: &str,
        independent: &str,
        name: &str,
        spatial_dim: usize,
        num_nodes: usize,
        solver: LinearSolverConfig,
    ) -> Self {
        Self {
            core: EquationSystemCore::new(name, gradient, spatial_dim, num_nodes, solver, 1),
            gradient: gradient.to_string(),
            delta: delta.to_string(),
            independent: independent.to_string(),
            spatial_dim,
        }
    }

    pub fn core(&self) -> &EquationSystemCore {
        &self.core
    }

    pub fn register_nodal_fields(&mut self, mesh: &mut MeshDatabase, parts: &[PartId]) -> Result<()> {
        mesh.declare_field_on_parts(&self.gradient, EntityRank::Node, self.spatial_dim, 1, parts)?;
        mesh.declare_field_on_parts(&self.delta, EntityRank::Node, self.spatial_dim, 1, parts)?;
        self.core.enter(Stage::FieldsRegistered)
    }

    pub fn register_interior_algorithm(&mut self, parts: &[PartId]) -> Result<()> {
        let (independent, gradient) = (self.independent.clone(), self.gradient.clone());
        self.core
            .solver_driver
            .build_or_extend_solver(AlgorithmType::Interior, parts, |parts| {
                Ok(Box::new(AssemblePngElemSolverAlgorithm::new(parts, &independent, &gradient)))
            })?;
        self.core.enter(Stage::AlgorithmsRegistered)
    }

    /// Every wall closes the projection with the face values of the independent field.
    pub fn register_wall_bc(&mut self, parts: &[PartId]) -> Result<()> {
        let independent = self.independent.clone();
        self.core
            .solver_driver
            .build_or_extend_solver(AlgorithmType::Wall, parts, |parts| {
                Ok(Box::new(AssemblePngBoundarySolverAlgorithm::new(parts, &independent)))
            })?;
        self.core.enter(Stage::AlgorithmsRegistered)
    }

    pub fn initialize(&mut self, mesh: &MeshDatabase) -> Result<()> {
        self.core.initialize(mesh)
    }

    pub fn reinitialize_linear_system(&mut self, mesh: &MeshDatabase) -> Result<()> {
        self.core.reinitialize_linear_system(mesh)
    }

    /// Solves for the gradient on behalf of the owning system.
    pub fn solve_and_update_external(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        for k in 0..self.core.max_iterations {
            info!("{}/{} {:>20}", k + 1, self.core.max_iterations, self.core.name());
            self.core.assemble_and_solve(mesh, ctx, &self.delta)?;
            field_axpby(mesh, 1.0, &self.delta, 1.0, &self.gradient)?;
            self.core.enter(Stage::Updated)?;
        }
        Ok(())
    }

    pub fn dump_eq_time(&self) {
        self.core.dump_eq_time();
    }
}
