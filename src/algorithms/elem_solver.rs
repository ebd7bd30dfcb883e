use std::fmt::Debug;

use crate::algorithm::{extend_parts, SolverAlgorithm};
use crate::algorithms::LocalContribution;
use crate::assembly::{ElementDataRequest, MasterElementQuantity, ScratchViews};
use crate::error::{CvfemError, Result};
use crate::linear_system::LinearSystem;
use crate::master_element::MasterElement;
use crate::mesh::{FieldState, MeshDatabase, PartId};
use crate::realm::SolveContext;

/// A numerical kernel evaluated per element of a batch.
pub trait ElemKernel: Debug + Send + Sync {
    /// Adds the data the kernel reads to `request`.
    fn request(&self, request: ElementDataRequest) -> ElementDataRequest;

    /// Adds the contribution of the element in `lane` to the row-major `lhs` and to `rhs`.
    fn execute(
        &self,
        ctx: &SolveContext,
        views: &ScratchViews,
        lane: usize,
        lhs: &mut [f64],
        rhs: &mut [f64],
    ) -> Result<()>;
}

/// Element solver algorithm running a consolidated list of kernels over one batched pass.
#[derive(Debug)]
pub struct AssembleElemSolverAlgorithm {
    parts: Vec<PartId>,
    dofs_per_node: usize,
    request: ElementDataRequest,
    kernels: Vec<Box<dyn ElemKernel>>,
}

impl AssembleElemSolverAlgorithm {
    pub fn new(parts: &[PartId], dofs_per_node: usize) -> Self {
        Self {
            parts: parts.to_vec(),
            dofs_per_node,
            request: ElementDataRequest::new(),
            kernels: Vec::new(),
        }
    }

    pub fn add_kernel(&mut self, kernel: Box<dyn ElemKernel>) {
        self.request = kernel.request(std::mem::take(&mut self.request));
        self.kernels.push(kernel);
    }

    pub fn num_kernels(&self) -> usize {
        self.kernels.len()
    }
}

impl SolverAlgorithm for AssembleElemSolverAlgorithm {
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
        if self.kernels.is_empty() {
            return Ok(());
        }
        let batches = ctx
            .assembler
            .run_elem_algorithm(mesh, ctx.repo, &self.parts, &self.request, |smd| -> Result<Vec<LocalContribution>> {
                let views = &smd.elem;
                (0..smd.num_simd_elems())
                    .map(|lane| {
                        let mut local = LocalContribution::zeros(views.nodes(lane), self.dofs_per_node);
                        for kernel in &self.kernels {
                            kernel.execute(ctx, views, lane, &mut local.lhs, &mut local.rhs)?;
                        }
                        Ok(local)
                    })
                    .collect()
            })?;
        for batch in batches {
            for local in batch? {
                system.sum_into(&local.nodes, &local.rhs, &local.lhs)?;
            }
        }
        Ok(())
    }
}

/// Diffusion of a nodal scalar through the sub-control surfaces:
/// `-k grad(phi) . A`, added to the left node and removed from the right node of each surface.
#[derive(Debug, Clone)]
pub struct ScalarDiffElemKernel {
    scalar: String,
    diffusion_coefficient: String,
}

impl ScalarDiffElemKernel {
    pub fn new(scalar: &str, diffusion_coefficient: &str) -> Self {
        Self {
            scalar: scalar.to_string(),
            diffusion_coefficient: diffusion_coefficient.to_string(),
        }
    }
}

impl ElemKernel for ScalarDiffElemKernel {
    fn request(&self, request: ElementDataRequest) -> ElementDataRequest {
        request
            .with_nodal_field_gradient(&self.scalar, FieldState::Np1)
            .with_nodal_field(&self.diffusion_coefficient, FieldState::Np1)
            .with_quantity(MasterElementQuantity::ScsAreaVector)
    }

    fn execute(
        &self,
        ctx: &SolveContext,
        views: &ScratchViews,
        lane: usize,
        lhs: &mut [f64],
        rhs: &mut [f64],
    ) -> Result<()> {
        let topology = views
            .topology()
            .ok_or_else(|| CvfemError::precondition("scalar diffusion", "batch without topology"))?;
        let me = ctx.repo.surface(topology)?;
        let shape = me.shape_fcn();
        let n = topology.num_nodes();
        let dim = topology.spatial_dim();
        let phi = views.field(&self.scalar, FieldState::Np1)?;
        let k = views.field(&self.diffusion_coefficient, FieldState::Np1)?;
        let area = views.quantity(MasterElementQuantity::ScsAreaVector)?;
        let grad_op = views.quantity(MasterElementQuantity::ScsGradOp)?;

        for (ip, &[il, ir]) in me.lrscv().iter().enumerate() {
            let k_ip: f64 = (0..n).map(|ic| shape[(ip, ic)] * k.get(lane, ic)).sum();
            let mut q_diff = 0.0;
            for ic in 0..n {
                let mut g_dot_a = 0.0;
                for j in 0..dim {
                    g_dot_a += grad_op.get(lane, (ip * n + ic) * dim + j) * area.get(lane, ip * dim + j);
                }
                let lhsfac = -k_ip * g_dot_a;
                q_diff += lhsfac * phi.get(lane, ic);
                lhs[il * n + ic] += lhsfac;
                lhs[ir * n + ic] -= lhsfac;
            }
            rhs[il] -= q_diff;
            rhs[ir] += q_diff;
        }
        Ok(())
    }
}
