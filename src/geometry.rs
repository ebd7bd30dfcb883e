//! Dual nodal volumes and the element validity check.
use std::collections::BTreeMap;

use log::{debug, error};

use crate::algorithm::{extend_parts, Algorithm, AlgorithmDriver, AlgorithmType};
use crate::algorithms::scatter_nodal_sum;
use crate::assembly::{ElementDataRequest, MasterElementQuantity};
use crate::error::{CvfemError, InvalidElementReport, Result};
use crate::field_functions::field_fill;
use crate::master_element::MasterElementRepo;
use crate::mesh::parallel::parallel_sum;
use crate::mesh::{FieldState, MeshDatabase, Ownership, PartId};
use crate::realm::SolveContext;
use crate::topology::EntityRank;

/// Accumulates the sub-control volumes of the interior elements into the dual nodal volume of
/// the node owning each sub-volume.
#[derive(Debug, Clone)]
pub struct ComputeGeometryInteriorAlgorithm {
    parts: Vec<PartId>,
    dual_nodal_volume: String,
    request: ElementDataRequest,
}

impl ComputeGeometryInteriorAlgorithm {
    pub fn new(parts: &[PartId], dual_nodal_volume: &str) -> Self {
        Self {
            parts: parts.to_vec(),
            dual_nodal_volume: dual_nodal_volume.to_string(),
            request: ElementDataRequest::new().with_quantity(MasterElementQuantity::ScvVolume),
        }
    }
}

impl Algorithm for ComputeGeometryInteriorAlgorithm {
    fn parts(&self) -> &[PartId] {
        &self.parts
    }

    fn add_parts(&mut self, parts: &[PartId]) {
        extend_parts(&mut self.parts, parts);
    }

    fn execute(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        let batches = ctx
            .assembler
            .run_elem_algorithm(mesh, ctx.repo, &self.parts, &self.request, |smd| -> Result<Vec<(usize, Vec<f64>)>> {
                let views = &smd.elem;
                let topology = views
                    .topology()
                    .ok_or_else(|| CvfemError::precondition("geometry", "batch without topology"))?;
                let me = ctx.repo.volume(topology)?;
                let scv = views.quantity(MasterElementQuantity::ScvVolume)?;
                let mut contributions = Vec::new();
                for lane in 0..smd.num_simd_elems() {
                    let nodes = views.nodes(lane);
                    for (ip, &nn) in me.ip_node_map().iter().enumerate() {
                        contributions.push((nodes[nn], vec![scv.get(lane, ip)]));
                    }
                }
                Ok(contributions)
            })?;
        for batch in batches {
            scatter_nodal_sum(mesh, &self.dual_nodal_volume, &batch?)?;
        }
        Ok(())
    }
}

/// Computes `dual_nodal_volume` on the physics targets and optionally validates the elements.
#[derive(Debug)]
pub struct ComputeGeometryAlgorithmDriver {
    dual_nodal_volume: String,
    targets: Vec<PartId>,
    check_jacobians: bool,
    driver: AlgorithmDriver,
}

impl ComputeGeometryAlgorithmDriver {
    pub fn new(targets: &[PartId], dual_nodal_volume: &str, check_jacobians: bool) -> Result<Self> {
        let mut driver = AlgorithmDriver::new();
        driver.build_or_extend(AlgorithmType::Interior, targets, |parts| {
            Ok(Box::new(ComputeGeometryInteriorAlgorithm::new(parts, dual_nodal_volume)))
        })?;
        Ok(Self {
            dual_nodal_volume: dual_nodal_volume.to_string(),
            targets: targets.to_vec(),
            check_jacobians,
            driver,
        })
    }

    pub fn pre_work(&mut self, mesh: &mut MeshDatabase) -> Result<()> {
        field_fill(mesh, 0.0, &self.dual_nodal_volume, FieldState::Np1)
    }

    /// Sums the dual volumes over shared nodes and validates the elements of every partition.
    pub fn post_work(&mut self, partitions: &mut [MeshDatabase], repo: &MasterElementRepo) -> Result<()> {
        parallel_sum(partitions, &[self.dual_nodal_volume.as_str()])?;
        if self.check_jacobians {
            for mesh in partitions.iter() {
                check_element_jacobians(mesh, repo, &self.targets)?;
            }
        }
        Ok(())
    }

    pub fn execute(&mut self, mesh: &mut MeshDatabase, ctx: &SolveContext) -> Result<()> {
        self.execute_partitions(std::slice::from_mut(mesh), ctx)
    }

    /// Computes the dual volumes of a set of partitions that share one part layout.
    ///
    /// The partitions are assembled one after the other and reduced once all of them are done,
    /// so the shared nodes of every partition end up with the volume of the whole mesh.
    pub fn execute_partitions(&mut self, partitions: &mut [MeshDatabase], ctx: &SolveContext) -> Result<()> {
        debug!(
            "computing {} on {} part(s) of {} partition(s)",
            self.dual_nodal_volume,
            self.targets.len(),
            partitions.len()
        );
        for mesh in partitions.iter_mut() {
            self.pre_work(mesh)?;
            self.driver.execute(mesh, ctx)?;
        }
        self.post_work(partitions, ctx.repo)
    }
}

/// Recomputes the sub-volumes of every locally owned element of `parts` and fails with one error
/// listing all elements that have a non-positive sub-volume, grouped by part.
pub fn check_element_jacobians(mesh: &MeshDatabase, repo: &MasterElementRepo, parts: &[PartId]) -> Result<()> {
    let mut invalid: BTreeMap<PartId, Vec<u64>> = BTreeMap::new();
    let mut coords = Vec::new();
    for bucket in mesh.buckets(EntityRank::Element, parts, Ownership::LocallyOwned) {
        let me = repo.volume(bucket.topology)?;
        for &e in &bucket.entities {
            let element = mesh
                .entity(EntityRank::Element, e)
                .ok_or_else(|| CvfemError::precondition("geometry", format!("no element with index {}", e)))?;
            mesh.gather_coordinates(element, &mut coords)?;
            if me.sub_volumes(&coords).iter().any(|&v| v <= 0.0) {
                invalid.entry(element.part).or_default().push(element.global_id);
            }
        }
    }
    if invalid.is_empty() {
        return Ok(());
    }

    let reports: Vec<InvalidElementReport> = invalid
        .into_iter()
        .map(|(part, mut element_ids)| {
            element_ids.sort_unstable();
            InvalidElementReport {
                part_name: mesh.part(part).name.clone(),
                element_ids,
            }
        })
        .collect();
    for report in &reports {
        error!(
            "{} element(s) with a negative jacobian on part {}: {:?}",
            report.element_ids.len(),
            report.part_name,
            report.element_ids
        );
    }
    Err(CvfemError::InvalidGeometry(reports))
}
