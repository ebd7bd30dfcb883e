use std::collections::BTreeSet;

use crate::mesh::{FieldState, COORDINATES};
use crate::topology::EntityRank;

/// Master element quantities an algorithm needs evaluated per batch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MasterElementQuantity {
    /// Sub-control volumes, one value per SCV integration point.
    ScvVolume,
    /// Sub-control surface area vectors, `[ip][dim]`.
    ScsAreaVector,
    /// Shape function derivatives at the SCS integration points, `[ip][node][dim]`.
    ScsGradOp,
    /// Boundary face area vectors, `[ip][dim]`.
    FcAreaVector,
    /// Element shape function derivatives at the face integration points of the batch's face
    /// ordinal, `[face_ip][node][dim]`.
    FaceGradOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRequest {
    pub name: String,
    pub state: FieldState,
    /// Node fields are gathered for every node of the entity, fields on the entity's own rank
    /// once per entity.
    pub rank: EntityRank,
    pub needs_gradient: bool,
}

/// Declares the data an algorithm's kernel needs per entity.
///
/// Built once when the algorithm is constructed and immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementDataRequest {
    fields: Vec<FieldRequest>,
    quantities: BTreeSet<MasterElementQuantity>,
    coordinates: Option<String>,
}

impl ElementDataRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the nodal coordinates of every entity.
    pub fn with_coordinates(mut self) -> Self {
        self.coordinates = Some(COORDINATES.to_string());
        self
    }

    /// Gathers a nodal field for all nodes of every entity.
    pub fn with_nodal_field(self, name: &str, state: FieldState) -> Self {
        self.with_field(name, state, EntityRank::Node, false)
    }

    /// Gathers a nodal field and the SCS gradient operator needed to differentiate it.
    pub fn with_nodal_field_gradient(self, name: &str, state: FieldState) -> Self {
        self.with_field(name, state, EntityRank::Node, true)
            .with_quantity(MasterElementQuantity::ScsGradOp)
    }

    /// Gathers a field that lives on the entities themselves (e.g. side-rank boundary data).
    pub fn with_entity_field(self, name: &str, state: FieldState, rank: EntityRank) -> Self {
        self.with_field(name, state, rank, false)
    }

    fn with_field(mut self, name: &str, state: FieldState, rank: EntityRank, needs_gradient: bool) -> Self {
        let request = FieldRequest {
            name: name.to_string(),
            state,
            rank,
            needs_gradient,
        };
        if !self.fields.contains(&request) {
            self.fields.push(request);
        }
        self
    }

    /// Requests a master element quantity. Quantities need coordinates, which are added as well.
    pub fn with_quantity(mut self, quantity: MasterElementQuantity) -> Self {
        self.quantities.insert(quantity);
        self.with_coordinates()
    }

    pub fn fields(&self) -> &[FieldRequest] {
        &self.fields
    }

    pub fn quantities(&self) -> &BTreeSet<MasterElementQuantity> {
        &self.quantities
    }

    pub fn coordinates(&self) -> Option<&str> {
        self.coordinates.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.quantities.is_empty() && self.coordinates.is_none()
    }
}
