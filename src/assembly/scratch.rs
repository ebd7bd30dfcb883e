use std::collections::BTreeMap;

use crate::assembly::request::{ElementDataRequest, MasterElementQuantity};
use crate::error::{CvfemError, Result};
use crate::master_element::{MasterElement, MasterElementRepo};
use crate::mesh::{Entity, FieldState, MeshDatabase};
use crate::topology::{EntityRank, Topology};

/// Lane-major buffer holding the same quantity for every entity of a batch.
///
/// Value `index` of lane `lane` is stored at `index * simd_len + lane`.
#[derive(Debug, Clone, Default)]
pub struct ScratchView {
    data: Vec<f64>,
    per_entity: usize,
    simd_len: usize,
}

impl ScratchView {
    fn reset(&mut self, per_entity: usize, simd_len: usize) {
        self.per_entity = per_entity;
        self.simd_len = simd_len;
        self.data.clear();
        self.data.resize(per_entity * simd_len, 0.0);
    }

    /// Number of values stored per entity.
    pub fn per_entity(&self) -> usize {
        self.per_entity
    }

    pub fn get(&self, lane: usize, index: usize) -> f64 {
        self.data[index * self.simd_len + lane]
    }

    fn set(&mut self, lane: usize, index: usize, value: f64) {
        self.data[index * self.simd_len + lane] = value;
    }

    fn set_lane(&mut self, lane: usize, values: &[f64]) {
        for (index, &value) in values.iter().enumerate() {
            self.set(lane, index, value);
        }
    }

    /// Copies the values of one lane out of the interleaved storage.
    pub fn lane(&self, lane: usize) -> Vec<f64> {
        (0..self.per_entity)
            .map(|index| self.get(lane, index))
            .collect()
    }
}

/// Gathered data of the entities of one batch, for one entity rank.
#[derive(Debug, Clone, Default)]
pub struct ScratchViews {
    topology: Option<Topology>,
    entities: Vec<usize>,
    global_ids: Vec<u64>,
    connectivity: Vec<Vec<usize>>,
    coordinates: ScratchView,
    fields: Vec<((String, FieldState), ScratchView)>,
    quantities: BTreeMap<MasterElementQuantity, ScratchView>,
    master_element_error: bool,
    element_coords: Vec<f64>,
    quantity_buffer: Vec<f64>,
}

impl ScratchViews {
    pub fn num_entities(&self) -> usize {
        self.entities.len()
    }

    /// Topology shared by all entities of the batch.
    pub fn topology(&self) -> Option<Topology> {
        self.topology
    }

    /// Local index of the entity in `lane`.
    pub fn entity(&self, lane: usize) -> usize {
        self.entities[lane]
    }

    pub fn global_id(&self, lane: usize) -> u64 {
        self.global_ids[lane]
    }

    /// Local node indices of the entity in `lane`.
    pub fn nodes(&self, lane: usize) -> &[usize] {
        &self.connectivity[lane]
    }

    pub fn coordinates(&self) -> &ScratchView {
        &self.coordinates
    }

    pub fn field(&self, name: &str, state: FieldState) -> Result<&ScratchView> {
        self.fields
            .iter()
            .find(|((n, s), _)| n == name && *s == state)
            .map(|(_, view)| view)
            .ok_or_else(|| CvfemError::Field(format!("field {} ({:?}) was not gathered", name, state)))
    }

    pub fn quantity(&self, quantity: MasterElementQuantity) -> Result<&ScratchView> {
        self.quantities
            .get(&quantity)
            .ok_or_else(|| CvfemError::Field(format!("master element quantity {:?} was not requested", quantity)))
    }

    /// Whether a master element evaluation of this batch flagged a non-positive determinant.
    pub fn master_element_error(&self) -> bool {
        self.master_element_error
    }

    /// Gathers the requested data for `entities`, which must share one topology, and evaluates
    /// the requested master element quantities for the whole batch at once.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn fill(
        &mut self,
        mesh: &MeshDatabase,
        repo: &MasterElementRepo,
        rank: EntityRank,
        entities: &[usize],
        request: &ElementDataRequest,
        simd_len: usize,
        ordinal: Option<usize>,
    ) -> Result<()> {
        let records: Vec<&Entity> = entities
            .iter()
            .map(|&e| {
                mesh.entity(rank, e)
                    .ok_or_else(|| CvfemError::precondition("gather", format!("no {:?} with index {}", rank, e)))
            })
            .collect::<Result<_>>()?;
        let topology = records
            .first()
            .map(|e| e.topology)
            .ok_or_else(|| CvfemError::precondition("gather", "empty batch"))?;
        let nodes_per_entity = topology.num_nodes();
        let dim = mesh.spatial_dim();

        self.topology = Some(topology);
        self.entities.clear();
        self.entities.extend_from_slice(entities);
        self.global_ids.clear();
        self.global_ids.extend(records.iter().map(|e| e.global_id));
        self.connectivity.clear();
        self.connectivity
            .extend(records.iter().map(|e| e.nodes.clone()));
        self.master_element_error = false;

        if request.coordinates().is_some() {
            self.coordinates.reset(nodes_per_entity * dim, simd_len);
            for (lane, record) in records.iter().enumerate() {
                mesh.gather_coordinates(record, &mut self.element_coords)?;
                self.coordinates.set_lane(lane, &self.element_coords);
            }
        }

        self.fields.clear();
        for field_request in request.fields() {
            let field = mesh.field(&field_request.name)?;
            let values = field.state(field_request.state)?;
            let c = field.components();
            let mut view = ScratchView::default();
            if field.rank() == EntityRank::Node {
                view.reset(nodes_per_entity * c, simd_len);
                for (lane, record) in records.iter().enumerate() {
                    for (k, &n) in record.nodes.iter().enumerate() {
                        for i in 0..c {
                            view.set(lane, k * c + i, values[n * c + i]);
                        }
                    }
                }
            } else if field.rank() == rank {
                view.reset(c, simd_len);
                for (lane, &e) in entities.iter().enumerate() {
                    view.set_lane(lane, &values[e * c..(e + 1) * c]);
                }
            } else {
                return Err(CvfemError::Field(format!(
                    "field {} lives on {:?} and cannot be gathered for {:?} entities",
                    field_request.name,
                    field.rank(),
                    rank
                )));
            }
            self.fields
                .push(((field_request.name.clone(), field_request.state), view));
        }

        self.quantities.clear();
        if request.quantities().is_empty() {
            return Ok(());
        }

        // Master element routines take element-major coordinates.
        let batch = entities.len();
        self.element_coords.clear();
        for lane in 0..batch {
            self.element_coords
                .extend(self.coordinates.lane(lane));
        }
        for &quantity in request.quantities() {
            let mut error = false;
            let per_entity = match quantity {
                MasterElementQuantity::ScvVolume => {
                    let me = repo.volume(topology)?;
                    self.quantity_buffer
                        .resize(batch * me.determinant_len(), 0.0);
                    me.determinant(batch, &self.element_coords, &mut self.quantity_buffer, &mut error);
                    me.determinant_len()
                }
                MasterElementQuantity::ScsAreaVector => {
                    let me = repo.surface(topology)?;
                    self.quantity_buffer
                        .resize(batch * me.determinant_len(), 0.0);
                    me.determinant(batch, &self.element_coords, &mut self.quantity_buffer, &mut error);
                    me.determinant_len()
                }
                MasterElementQuantity::ScsGradOp => {
                    let me = repo.surface(topology)?;
                    let len = me.num_integration_points() * nodes_per_entity * dim;
                    let mut det_j = vec![0.0; batch * me.num_integration_points()];
                    self.quantity_buffer.resize(batch * len, 0.0);
                    me.grad_op(batch, &self.element_coords, &mut self.quantity_buffer, &mut det_j, &mut error);
                    len
                }
                MasterElementQuantity::FcAreaVector => {
                    let me = repo.face(topology)?;
                    self.quantity_buffer
                        .resize(batch * me.determinant_len(), 0.0);
                    me.determinant(batch, &self.element_coords, &mut self.quantity_buffer, &mut error);
                    me.determinant_len()
                }
                MasterElementQuantity::FaceGradOp => {
                    let ordinal = ordinal.ok_or_else(|| {
                        CvfemError::precondition("gather", "face gradient operator requested without a face ordinal")
                    })?;
                    let me = repo.surface(topology)?;
                    let len = me.num_face_ips(ordinal) * nodes_per_entity * dim;
                    self.quantity_buffer.resize(batch * len, 0.0);
                    me.face_grad_op(ordinal, batch, &self.element_coords, &mut self.quantity_buffer, &mut error);
                    len
                }
            };
            let mut view = ScratchView::default();
            view.reset(per_entity, simd_len);
            for lane in 0..batch {
                view.set_lane(lane, &self.quantity_buffer[lane * per_entity..(lane + 1) * per_entity]);
            }
            self.master_element_error |= error;
            self.quantities.insert(quantity, view);
        }
        Ok(())
    }
}

/// Per-worker buffers of one batch.
///
/// Element algorithms fill `elem`, face algorithms fill `face`, and face-element algorithms fill
/// both, with `elem` holding the single element attached to each face.
#[derive(Debug, Clone, Default)]
pub struct SharedMemData {
    num_simd_elems: usize,
    simd_len: usize,
    /// Face-element connectivity ordinal shared by all faces of the batch.
    pub ordinal: Option<usize>,
    pub face: ScratchViews,
    pub elem: ScratchViews,
}

impl SharedMemData {
    pub(crate) fn begin_batch(&mut self, num_simd_elems: usize, simd_len: usize, ordinal: Option<usize>) {
        self.num_simd_elems = num_simd_elems;
        self.simd_len = simd_len;
        self.ordinal = ordinal;
    }

    /// Number of occupied lanes in the current batch.
    pub fn num_simd_elems(&self) -> usize {
        self.num_simd_elems
    }

    pub fn simd_len(&self) -> usize {
        self.simd_len
    }
}
