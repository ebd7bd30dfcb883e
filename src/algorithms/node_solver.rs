use std::fmt::Debug;

use rayon::prelude::*;

use crate::algorithm::{extend_parts, SolverAlgorithm};
use crate::algorithms::LocalContribution;
use crate::error::Result;
use crate::linear_system::LinearSystem;
use crate::mesh::{FieldState, MeshDatabase, Ownership, PartId};
use crate::realm::SolveContext;

/// Node-local contribution of a supplemental algorithm, e.g. a time derivative or a source.
pub trait NodeSupplementalAlgorithm: Debug + Send + Sync {
    /// Adds the contribution of `node` to the `dofs x dofs` row-major `lhs` and to `rhs`.
    fn node_execute(
        &self,
        mesh: &MeshDatabase,
        ctx: &SolveContext,
        node: usize,
        lhs: &mut [f64],
        rhs: &mut [f64],
    ) -> Result<()>;
}

/// Node solver algorithm evaluating its supplemental algorithms on every locally owned node.
#[derive(Debug)]
pub struct AssembleNodeSolverAlgorithm {
    parts: Vec<PartId>,
    dofs_per_node: usize,
    supplemental: Vec<Box<dyn NodeSupplementalAlgorithm>>,
}

impl AssembleNodeSolverAlgorithm {
    pub fn new(parts: &[PartId], dofs_per_node: usize) -> Self {
        Self {
            parts: parts.to_vec(),
            dofs_per_node,
            supplemental: Vec::new(),
        }
    }

    pub fn add_supplemental(&mut self, algorithm: Box<dyn NodeSupplementalAlgorithm>) {
        self.supplemental.push(algorithm);
    }
}

impl SolverAlgorithm for AssembleNodeSolverAlgorithm {
    fn parts(&self) -> &[PartId] {
        &self.parts
    }

    fn add_parts(&mut self, parts: &[PartId]) {
        extend_parts(&mut self.parts, parts);
    }

    fn initialize_connectivity(&self, mesh: &MeshDatabase, system: &mut dyn LinearSystem) -> Result<()> {
        system.build_node_graph(mesh, &self.parts);
        Ok(())
    }

    fn execute(&self, mesh: &MeshDatabase, ctx: &SolveContext, system: &mut dyn LinearSystem) -> Result<()> {
        let nodes = mesh.select_nodes(&self.parts, Ownership::LocallyOwned);
        let contributions: Vec<LocalContribution> = nodes
            .par_iter()
            .map(|&node| {
                let mut local = LocalContribution::zeros(&[node], self.dofs_per_node);
                for algorithm in &self.supplemental {
                    algorithm.node_execute(mesh, ctx, node, &mut local.lhs, &mut local.rhs)?;
                }
                Ok(local)
            })
            .collect::<Result<_>>()?;
        for local in contributions {
            system.sum_into(&local.nodes, &local.rhs, &local.lhs)?;
        }
        Ok(())
    }
}

/// Names of the fields a scalar mass term reads.
#[derive(Debug, Clone)]
pub struct MassFields {
    pub scalar: String,
    pub density: String,
    pub specific_heat: String,
    pub dual_nodal_volume: String,
}

impl MassFields {
    fn values(&self, mesh: &MeshDatabase, node: usize) -> Result<(f64, f64)> {
        let rho = mesh.field_state(&self.density, FieldState::Np1)?[node];
        let cp = mesh.field_state(&self.specific_heat, FieldState::Np1)?[node];
        let volume = mesh.field_state(&self.dual_nodal_volume, FieldState::Np1)?[node];
        Ok((rho * cp, volume))
    }
}

/// First-order time derivative `rho cp (phi^{n+1} - phi^n) / dt`.
#[derive(Debug, Clone)]
pub struct MassBackwardEuler {
    fields: MassFields,
}

impl MassBackwardEuler {
    pub fn new(fields: MassFields) -> Self {
        Self { fields }
    }
}

impl NodeSupplementalAlgorithm for MassBackwardEuler {
    fn node_execute(
        &self,
        mesh: &MeshDatabase,
        ctx: &SolveContext,
        node: usize,
        lhs: &mut [f64],
        rhs: &mut [f64],
    ) -> Result<()> {
        let (rho_cp, volume) = self.fields.values(mesh, node)?;
        let phi_np1 = mesh.field_state(&self.fields.scalar, FieldState::Np1)?[node];
        let phi_n = mesh.field_state(&self.fields.scalar, FieldState::N)?[node];
        let dt = ctx.time.dt_n;
        rhs[0] -= rho_cp * (phi_np1 - phi_n) * volume / dt;
        lhs[0] += rho_cp * volume / dt;
        Ok(())
    }
}

/// Variable step BDF2 time derivative `rho cp (g1 phi^{n+1} + g2 phi^n + g3 phi^{n-1}) / dt`.
///
/// The coefficients come from the time integrator and fall back to backward Euler on the first
/// step.
#[derive(Debug, Clone)]
pub struct MassBdf2 {
    fields: MassFields,
}

impl MassBdf2 {
    pub fn new(fields: MassFields) -> Self {
        Self { fields }
    }
}

impl NodeSupplementalAlgorithm for MassBdf2 {
    fn node_execute(
        &self,
        mesh: &MeshDatabase,
        ctx: &SolveContext,
        node: usize,
        lhs: &mut [f64],
        rhs: &mut [f64],
    ) -> Result<()> {
        let (rho_cp, volume) = self.fields.values(mesh, node)?;
        let phi_np1 = mesh.field_state(&self.fields.scalar, FieldState::Np1)?[node];
        let phi_n = mesh.field_state(&self.fields.scalar, FieldState::N)?[node];
        let phi_nm1 = mesh.field_state(&self.fields.scalar, FieldState::Nm1)?[node];
        let [g1, g2, g3] = ctx.time.gamma;
        let dt = ctx.time.dt_n;
        rhs[0] -= rho_cp * (g1 * phi_np1 + g2 * phi_n + g3 * phi_nm1) * volume / dt;
        lhs[0] += g1 * rho_cp * volume / dt;
        Ok(())
    }
}
