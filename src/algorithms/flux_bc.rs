use crate::algorithm::{extend_parts, SolverAlgorithm};
use crate::algorithms::{magnitude, LocalContribution};
use crate::assembly::{ElementDataRequest, MasterElementQuantity};
use crate::error::{CvfemError, Result};
use crate::linear_system::LinearSystem;
use crate::master_element::MasterElement;
use crate::mesh::{FieldState, MeshDatabase, PartId};
use crate::realm::SolveContext;
use crate::topology::EntityRank;

/// Where the prescribed boundary flux is stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FluxLocation {
    /// A nodal field, interpolated to the face integration points.
    Node,
    /// A side-rank field holding one value per face.
    Face,
}

/// Prescribed normal flux `q` into the domain: `rhs[nn] += q_ip |A_ip|` for every face sub-face.
#[derive(Debug, Clone)]
pub struct AssembleScalarFluxBcSolverAlgorithm {
    parts: Vec<PartId>,
    flux: String,
    location: FluxLocation,
    request: ElementDataRequest,
}

impl AssembleScalarFluxBcSolverAlgorithm {
    pub fn new(parts: &[PartId], flux: &str, location: FluxLocation) -> Self {
        let request = ElementDataRequest::new().with_quantity(MasterElementQuantity::FcAreaVector);
        let request = match location {
            FluxLocation::Node => request.with_nodal_field(flux, FieldState::Np1),
            FluxLocation::Face => request.with_entity_field(flux, FieldState::Np1, EntityRank::Face),
        };
        Self {
            parts: parts.to_vec(),
            flux: flux.to_string(),
            location,
            request,
        }
    }
}

impl SolverAlgorithm for AssembleScalarFluxBcSolverAlgorithm {
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
                    .ok_or_else(|| CvfemError::precondition("flux boundary condition", "batch without topology"))?;
                let me = ctx.repo.face(topology)?;
                let shape = me.shape_fcn();
                let flux = views.field(&self.flux, FieldState::Np1)?;
                let area = views.quantity(MasterElementQuantity::FcAreaVector)?;

                let mut contributions = Vec::with_capacity(smd.num_simd_elems());
                for lane in 0..smd.num_simd_elems() {
                    let nodes = views.nodes(lane);
                    let mut local = LocalContribution::zeros(nodes, 1);
                    for (ip, &nn) in me.ip_node_map().iter().enumerate() {
                        let flux_ip: f64 = match self.location {
                            FluxLocation::Node => (0..nodes.len())
                                .map(|ic| shape[(ip, ic)] * flux.get(lane, ic))
                                .sum(),
                            FluxLocation::Face => flux.get(lane, 0),
                        };
                        let a: Vec<f64> = (0..dim).map(|d| area.get(lane, ip * dim + d)).collect();
                        local.rhs[nn] += flux_ip * magnitude(&a);
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
