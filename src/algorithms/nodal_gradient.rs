//! Lumped Green-Gauss projected nodal gradients.
//!
//! `dqdx_i = 1/V_i * (sum over SCS of q_ip A_ip + sum over boundary sub-faces of q_ip A_ip)`,
//! where `V_i` is the dual nodal volume.
use log::trace;

use crate::algorithm::{extend_parts, Algorithm, AlgorithmDriver, AlgorithmType};
use crate::algorithms::scatter_nodal_sum;
use crate::assembly::{ElementDataRequest, MasterElementQuantity};
use crate::error::{CvfemError, Result};
use crate::field_functions::field_fill;
use crate::master_element::MasterElement;
use crate::mesh::parallel::parallel_sum;
use crate::mesh::{FieldState, MeshDatabase, PartId};
use crate::realm::SolveContext;

/// Interior part of the nodal gradient: contributions of the sub-control surfaces.
#[derive(Debug, Clone)]
pub struct AssembleNodalGradElemAlgorithm {
    parts: Vec<PartId>,
    scalar: String,
    gradient: String,
    dual_nodal_volume: String,
    request: ElementDataRequest,
}

impl AssembleNodalGradElemAlgorithm {
    pub fn new(parts: &[PartId], scalar: &str, gradient: &str, dual_nodal_volume: &str) -> Self {
        let request = ElementDataRequest::new()
            .with_nodal_field(scalar, FieldState::Np1)
            .with_nodal_field(dual_nodal_volume, FieldState::Np1)
            .with_quantity(MasterElementQuantity::ScsAreaVector);
        Self {
            parts: parts.to_vec(),
            scalar: scalar.to_string(),
            gradient: gradient.to_string(),
            dual_nodal_volume: dual_nodal_volume.to_string(),
            request,
        }
    }
}

impl Algorithm for AssembleNodalGradElemAlgorithm {
    fn parts(&self) -> &[PartId] {
        &self.parts
    }

    fn add_parts(&mut self, parts: &[PartId]) {
        extend_parts(&mut self.parts, parts);
    }

    fn execute(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        let dim = mesh.spatial_dim();
        let batches = ctx
            .assembler
            .run_elem_algorithm(mesh, ctx.repo, &self.parts, &self.request, |smd| -> Result<Vec<(usize, Vec<f64>)>> {
                let views = &smd.elem;
                let topology = views
                    .topology()
                    .ok_or_else(|| CvfemError::precondition("nodal gradient", "batch without topology"))?;
                let me = ctx.repo.surface(topology)?;
                let shape = me.shape_fcn();
                let q = views.field(&self.scalar, FieldState::Np1)?;
                let volume = views.field(&self.dual_nodal_volume, FieldState::Np1)?;
                let area = views.quantity(MasterElementQuantity::ScsAreaVector)?;

                let mut contributions = Vec::new();
                for lane in 0..smd.num_simd_elems() {
                    let nodes = views.nodes(lane);
                    let mut local = vec![vec![0.0; dim]; nodes.len()];
                    for (ip, &[l, r]) in me.lrscv().iter().enumerate() {
                        let q_ip: f64 = (0..nodes.len())
                            .map(|ic| shape[(ip, ic)] * q.get(lane, ic))
                            .sum();
                        let (inv_vl, inv_vr) = (1.0 / volume.get(lane, l), 1.0 / volume.get(lane, r));
                        for d in 0..dim {
                            let qa = q_ip * area.get(lane, ip * dim + d);
                            local[l][d] += qa * inv_vl;
                            local[r][d] -= qa * inv_vr;
                        }
                    }
                    contributions.extend(nodes.iter().copied().zip(local));
                }
                Ok(contributions)
            })?;
        for batch in batches {
            scatter_nodal_sum(mesh, &self.gradient, &batch?)?;
        }
        Ok(())
    }
}

/// Boundary closure of the nodal gradient: contributions of the exposed face sub-faces.
#[derive(Debug, Clone)]
pub struct AssembleNodalGradBoundaryAlgorithm {
    parts: Vec<PartId>,
    scalar: String,
    gradient: String,
    dual_nodal_volume: String,
    request: ElementDataRequest,
}

impl AssembleNodalGradBoundaryAlgorithm {
    pub fn new(parts: &[PartId], scalar: &str, gradient: &str, dual_nodal_volume: &str) -> Self {
        let request = ElementDataRequest::new()
            .with_nodal_field(scalar, FieldState::Np1)
            .with_nodal_field(dual_nodal_volume, FieldState::Np1)
            .with_quantity(MasterElementQuantity::FcAreaVector);
        Self {
            parts: parts.to_vec(),
            scalar: scalar.to_string(),
            gradient: gradient.to_string(),
            dual_nodal_volume: dual_nodal_volume.to_string(),
            request,
        }
    }
}

impl Algorithm for AssembleNodalGradBoundaryAlgorithm {
    fn parts(&self) -> &[PartId] {
        &self.parts
    }

    fn add_parts(&mut self, parts: &[PartId]) {
        extend_parts(&mut self.parts, parts);
    }

    fn execute(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        let dim = mesh.spatial_dim();
        let batches = ctx
            .assembler
            .run_face_algorithm(mesh, ctx.repo, &self.parts, &self.request, |smd| -> Result<Vec<(usize, Vec<f64>)>> {
                let views = &smd.face;
                let topology = views
                    .topology()
                    .ok_or_else(|| CvfemError::precondition("nodal gradient", "batch without topology"))?;
                let me = ctx.repo.face(topology)?;
                let shape = me.shape_fcn();
                let q = views.field(&self.scalar, FieldState::Np1)?;
                let volume = views.field(&self.dual_nodal_volume, FieldState::Np1)?;
                let area = views.quantity(MasterElementQuantity::FcAreaVector)?;

                let mut contributions = Vec::new();
                for lane in 0..smd.num_simd_elems() {
                    let nodes = views.nodes(lane);
                    for (ip, &nn) in me.ip_node_map().iter().enumerate() {
                        let q_ip: f64 = (0..nodes.len())
                            .map(|ic| shape[(ip, ic)] * q.get(lane, ic))
                            .sum();
                        let inv_v = 1.0 / volume.get(lane, nn);
                        let value = (0..dim)
                            .map(|d| q_ip * area.get(lane, ip * dim + d) * inv_v)
                            .collect();
                        contributions.push((nodes[nn], value));
                    }
                }
                Ok(contributions)
            })?;
        for batch in batches {
            scatter_nodal_sum(mesh, &self.gradient, &batch?)?;
        }
        Ok(())
    }
}

/// Zeroes the gradient, accumulates interior and boundary contributions and sums the result
/// over shared nodes.
#[derive(Debug)]
pub struct AssembleNodalGradAlgorithmDriver {
    scalar: String,
    gradient: String,
    driver: AlgorithmDriver,
}

impl AssembleNodalGradAlgorithmDriver {
    pub fn new(scalar: &str, gradient: &str) -> Self {
        Self {
            scalar: scalar.to_string(),
            gradient: gradient.to_string(),
            driver: AlgorithmDriver::new(),
        }
    }

    pub fn register_interior(&mut self, parts: &[PartId], dual_nodal_volume: &str) -> Result<()> {
        let (scalar, gradient) = (self.scalar.clone(), self.gradient.clone());
        self.driver
            .build_or_extend(AlgorithmType::Interior, parts, |parts| {
                Ok(Box::new(AssembleNodalGradElemAlgorithm::new(
                    parts,
                    &scalar,
                    &gradient,
                    dual_nodal_volume,
                )))
            })
    }

    pub fn register_boundary(&mut self, parts: &[PartId], dual_nodal_volume: &str) -> Result<()> {
        let (scalar, gradient) = (self.scalar.clone(), self.gradient.clone());
        self.driver
            .build_or_extend(AlgorithmType::Wall, parts, |parts| {
                Ok(Box::new(AssembleNodalGradBoundaryAlgorithm::new(
                    parts,
                    &scalar,
                    &gradient,
                    dual_nodal_volume,
                )))
            })
    }

    pub fn pre_work(&mut self, mesh: &mut MeshDatabase) -> Result<()> {
        field_fill(mesh, 0.0, &self.gradient, FieldState::Np1)
    }

    pub fn post_work(&mut self, partitions: &mut [MeshDatabase]) -> Result<()> {
        parallel_sum(partitions, &[self.gradient.as_str()])
    }

    pub fn execute(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        self.execute_partitions(std::slice::from_mut(mesh), ctx)
    }

    /// Assembles the gradient on every partition, then sums it over the shared nodes.
    pub fn execute_partitions(&mut self, partitions: &mut [MeshDatabase], ctx: &SolveContext) -> Result<()> {
        trace!("computing nodal gradient {} of {}", self.gradient, self.scalar);
        for mesh in partitions.iter_mut() {
            self.pre_work(mesh)?;
            self.driver.execute(mesh, ctx)?;
        }
        self.post_work(partitions)
    }
}
