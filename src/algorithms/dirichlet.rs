//! Prescribed boundary values.
//!
//! Node-centered values replace the rows of the boundary nodes. Ip-centered values are imposed
//! weakly at the face integration points through the consistent boundary flux and a penalty.
use crate::algorithm::{extend_parts, SolverAlgorithm};
use crate::algorithms::{magnitude, LocalContribution};
use crate::assembly::{ElementDataRequest, MasterElementQuantity};
use crate::error::{CvfemError, Result};
use crate::linear_system::LinearSystem;
use crate::master_element::MasterElement;
use crate::mesh::{FieldState, MeshDatabase, Ownership, PartId};
use crate::realm::SolveContext;

/// Node-centered Dirichlet condition: `delta = bc - phi` on every boundary node.
#[derive(Debug, Clone)]
pub struct DirichletBc {
    parts: Vec<PartId>,
    solution: String,
    bc_values: String,
    dof_begin: usize,
    dof_end: usize,
}

impl DirichletBc {
    pub fn new(parts: &[PartId], solution: &str, bc_values: &str, dof_begin: usize, dof_end: usize) -> Self {
        Self {
            parts: parts.to_vec(),
            solution: solution.to_string(),
            bc_values: bc_values.to_string(),
            dof_begin,
            dof_end,
        }
    }
}

impl SolverAlgorithm for DirichletBc {
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

    fn execute(&self, mesh: &MeshDatabase, _ctx: &SolveContext, system: &mut dyn LinearSystem) -> Result<()> {
        let solution = mesh.field(&self.solution)?;
        let components = solution.components();
        let phi = solution.state(FieldState::Np1)?;
        let bc = mesh.field_state(&self.bc_values, FieldState::Np1)?;
        if mesh.field(&self.bc_values)?.components() != components {
            return Err(CvfemError::Field(format!(
                "boundary values {} do not match the layout of {}",
                self.bc_values, self.solution
            )));
        }
        for node in mesh.select_nodes(&self.parts, Ownership::LocallyOwned) {
            for d in self.dof_begin..self.dof_end.min(components) {
                let i = node * components + d;
                system.reset_rows(&[node], d, d + 1, 1.0, bc[i] - phi[i])?;
            }
        }
        Ok(())
    }
}

/// Ip-centered Dirichlet condition for a scalar.
///
/// At every face integration point the consistent diffusive flux `-k grad(phi) . A` leaves the
/// domain through the owning node, together with a penalty `lambda (phi_ip - phi_bc)` where
/// `lambda = k |A| / h` and `h` is twice the distance from the integration point to the centroid
/// of the attached element.
#[derive(Debug, Clone)]
pub struct AssembleScalarDirichletBc {
    parts: Vec<PartId>,
    scalar: String,
    bc_values: String,
    diffusion_coefficient: String,
    face_request: ElementDataRequest,
    elem_request: ElementDataRequest,
}

impl AssembleScalarDirichletBc {
    pub fn new(parts: &[PartId], scalar: &str, bc_values: &str, diffusion_coefficient: &str) -> Self {
        let face_request = ElementDataRequest::new()
            .with_nodal_field(bc_values, FieldState::Np1)
            .with_quantity(MasterElementQuantity::FcAreaVector);
        let elem_request = ElementDataRequest::new()
            .with_nodal_field(scalar, FieldState::Np1)
            .with_nodal_field(diffusion_coefficient, FieldState::Np1)
            .with_quantity(MasterElementQuantity::FaceGradOp);
        Self {
            parts: parts.to_vec(),
            scalar: scalar.to_string(),
            bc_values: bc_values.to_string(),
            diffusion_coefficient: diffusion_coefficient.to_string(),
            face_request,
            elem_request,
        }
    }
}

impl SolverAlgorithm for AssembleScalarDirichletBc {
    fn parts(&self) -> &[PartId] {
        &self.parts
    }

    fn add_parts(&mut self, parts: &[PartId]) {
        extend_parts(&mut self.parts, parts);
    }

    fn initialize_connectivity(&self, mesh: &MeshDatabase, system: &mut dyn LinearSystem) -> Result<()> {
        system.build_face_elem_graph(mesh, &self.parts)
    }

    fn execute(&self, mesh: &MeshDatabase, ctx: &SolveContext, system: &mut dyn LinearSystem) -> Result<()> {
        let dim = mesh.spatial_dim();
        let batches = ctx.assembler.run_face_elem_algorithm(
            mesh,
            ctx.repo,
            &self.parts,
            &self.face_request,
            &self.elem_request,
            |smd| -> Result<Vec<LocalContribution>> {
                let (face, elem) = (&smd.face, &smd.elem);
                let precondition = |details| CvfemError::precondition("ip-centered dirichlet", details);
                let ordinal = smd
                    .ordinal
                    .ok_or_else(|| precondition("batch without face ordinal"))?;
                let face_topology = face
                    .topology()
                    .ok_or_else(|| precondition("batch without face topology"))?;
                let elem_topology = elem
                    .topology()
                    .ok_or_else(|| precondition("batch without element topology"))?;
                let side_nodes = elem_topology
                    .side_node_ordinals(ordinal)
                    .ok_or_else(|| precondition("face ordinal out of range"))?;

                let face_me = ctx.repo.face(face_topology)?;
                let shape = face_me.shape_fcn();
                let area = face.quantity(MasterElementQuantity::FcAreaVector)?;
                let bc = face.field(&self.bc_values, FieldState::Np1)?;
                let face_coords = face.coordinates();
                let phi = elem.field(&self.scalar, FieldState::Np1)?;
                let k = elem.field(&self.diffusion_coefficient, FieldState::Np1)?;
                let grad_op = elem.quantity(MasterElementQuantity::FaceGradOp)?;
                let elem_coords = elem.coordinates();
                let n = elem_topology.num_nodes();
                let face_n = face_topology.num_nodes();

                let mut contributions = Vec::with_capacity(smd.num_simd_elems());
                for lane in 0..smd.num_simd_elems() {
                    let mut local = LocalContribution::zeros(elem.nodes(lane), 1);
                    let centroid: Vec<f64> = (0..dim)
                        .map(|d| (0..n).map(|ic| elem_coords.get(lane, ic * dim + d)).sum::<f64>() / n as f64)
                        .collect();

                    for (ip, &face_node) in face_me.ip_node_map().iter().enumerate() {
                        let nn = side_nodes[face_node];
                        let mut phi_ip = 0.0;
                        let mut bc_ip = 0.0;
                        let mut k_ip = 0.0;
                        let mut x_ip = vec![0.0; dim];
                        for kf in 0..face_n {
                            let r = shape[(ip, kf)];
                            phi_ip += r * phi.get(lane, side_nodes[kf]);
                            k_ip += r * k.get(lane, side_nodes[kf]);
                            bc_ip += r * bc.get(lane, kf);
                            for d in 0..dim {
                                x_ip[d] += r * face_coords.get(lane, kf * dim + d);
                            }
                        }
                        let a: Vec<f64> = (0..dim).map(|d| area.get(lane, ip * dim + d)).collect();
                        let a_mag = magnitude(&a);
                        let distance: Vec<f64> = x_ip.iter().zip(&centroid).map(|(x, c)| x - c).collect();
                        let h = 2.0 * magnitude(&distance);
                        if h <= 0.0 {
                            return Err(precondition("degenerate element attached to boundary face"));
                        }
                        let lambda = k_ip * a_mag / h;

                        // Consistent flux leaving the domain through node nn.
                        let mut flux = 0.0;
                        for ic in 0..n {
                            let g_dot_a: f64 = (0..dim)
                                .map(|j| grad_op.get(lane, (ip * n + ic) * dim + j) * a[j])
                                .sum();
                            let lhsfac = -k_ip * g_dot_a;
                            flux += lhsfac * phi.get(lane, ic);
                            local.lhs[nn * n + ic] += lhsfac;
                        }

                        // Penalty towards the prescribed value.
                        for kf in 0..face_n {
                            local.lhs[nn * n + side_nodes[kf]] += lambda * shape[(ip, kf)];
                        }
                        local.rhs[nn] -= flux + lambda * (phi_ip - bc_ip);
                    }
                    contributions.push(local);
                }
                Ok(contributions)
            },
        )?;
        for batch in batches {
            for local in batch? {
                system.sum_into(&local.nodes, &local.rhs, &local.lhs)?;
            }
        }
        Ok(())
    }
}
