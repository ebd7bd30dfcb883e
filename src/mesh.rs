//! In-memory, single-partition mesh database.
//!
//! Entities are addressed by their local index on the partition. Every entity also carries a
//! global id and the rank of the partition that owns it; nodes additionally know whether they
//! are shared with another partition.
use std::collections::BTreeMap;

use itertools::Itertools;

use crate::error::{CvfemError, Result};
use crate::topology::{EntityRank, Topology};

pub mod builder;
pub mod field;
pub mod parallel;
pub mod procedural;

pub use builder::MeshBuilder;
pub use field::{Field, FieldId, FieldRegistry, FieldState};

pub type PartId = usize;

/// Name of the nodal coordinate field declared on every mesh.
pub const COORDINATES: &str = "coordinates";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub rank: EntityRank,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub global_id: u64,
    pub owner: usize,
    pub shared: bool,
}

/// An element or a boundary face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub global_id: u64,
    pub topology: Topology,
    pub nodes: Vec<usize>,
    pub part: PartId,
    pub owner: usize,
}

/// Attachment of a face to an element side.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FaceElementRelation {
    pub element: usize,
    pub ordinal: usize,
}

/// Which entities of a part selection take part in an operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Ownership {
    LocallyOwned,
    OwnedOrShared,
    All,
}

/// A group of entities of one rank sharing part, topology and ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub rank: EntityRank,
    /// `None` for node buckets, whose nodes may belong to several of the selected parts.
    pub part: Option<PartId>,
    pub topology: Topology,
    pub locally_owned: bool,
    pub entities: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct MeshDatabase {
    spatial_dim: usize,
    rank: usize,
    parts: Vec<Part>,
    nodes: Vec<Node>,
    elements: Vec<Entity>,
    faces: Vec<Entity>,
    face_elements: Vec<Vec<FaceElementRelation>>,
    fields: FieldRegistry,
}

impl MeshDatabase {
    pub fn spatial_dim(&self) -> usize {
        self.spatial_dim
    }

    /// Rank of the partition this mesh represents.
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn part(&self, id: PartId) -> &Part {
        &self.parts[id]
    }

    pub fn part_id(&self, name: &str) -> Result<PartId> {
        self.parts
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| CvfemError::configuration(format!("no part named {}", name)))
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn elements(&self) -> &[Entity] {
        &self.elements
    }

    pub fn faces(&self) -> &[Entity] {
        &self.faces
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn entity(&self, rank: EntityRank, index: usize) -> Option<&Entity> {
        match rank {
            EntityRank::Element => self.elements.get(index),
            EntityRank::Face => self.faces.get(index),
            EntityRank::Node => None,
        }
    }

    fn entities(&self, rank: EntityRank) -> &[Entity] {
        match rank {
            EntityRank::Element => &self.elements,
            EntityRank::Face => &self.faces,
            EntityRank::Node => &[],
        }
    }

    pub fn num_entities(&self, rank: EntityRank) -> usize {
        match rank {
            EntityRank::Node => self.nodes.len(),
            _ => self.entities(rank).len(),
        }
    }

    /// Elements attached to a face, with the side ordinal of the face in each element.
    pub fn face_elements(&self, face: usize) -> &[FaceElementRelation] {
        self.face_elements
            .get(face)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The single element attached to a boundary face.
    pub fn face_element(&self, face: usize) -> Result<FaceElementRelation> {
        match self.face_elements(face) {
            [relation] => Ok(*relation),
            relations => Err(CvfemError::precondition(
                "face element connectivity",
                format!(
                    "face {} is attached to {} elements, expected exactly one",
                    self.faces[face].global_id,
                    relations.len()
                ),
            )),
        }
    }

    pub fn is_locally_owned(&self, node: usize) -> bool {
        self.nodes[node].owner == self.rank
    }

    fn node_matches(&self, node: usize, ownership: Ownership) -> bool {
        match ownership {
            Ownership::LocallyOwned => self.is_locally_owned(node),
            Ownership::OwnedOrShared => self.is_locally_owned(node) || self.nodes[node].shared,
            Ownership::All => true,
        }
    }

    /// Sorted, deduplicated nodes of the entities in the given parts.
    pub fn select_nodes(&self, parts: &[PartId], ownership: Ownership) -> Vec<usize> {
        let mut selected: Vec<usize> = self
            .elements
            .iter()
            .chain(self.faces.iter())
            .filter(|e| parts.contains(&e.part))
            .flat_map(|e| e.nodes.iter().copied())
            .filter(|&n| self.node_matches(n, ownership))
            .collect();
        selected.sort_unstable();
        selected.dedup();
        selected
    }

    /// All nodes of the mesh matching the ownership filter.
    pub fn select_all_nodes(&self, ownership: Ownership) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&n| self.node_matches(n, ownership))
            .collect()
    }

    /// Buckets of the entities of `rank` in the given parts.
    ///
    /// Element and face buckets are keyed by (part, topology, locally owned); the resulting order
    /// is deterministic.
    pub fn buckets(&self, rank: EntityRank, parts: &[PartId], ownership: Ownership) -> Vec<Bucket> {
        if rank == EntityRank::Node {
            let nodes = self.select_nodes(parts, ownership);
            return nodes
                .into_iter()
                .into_group_map_by(|&n| self.is_locally_owned(n))
                .into_iter()
                .sorted_by_key(|(owned, _)| !*owned)
                .map(|(locally_owned, entities)| Bucket {
                    rank,
                    part: None,
                    topology: Topology::Node,
                    locally_owned,
                    entities,
                })
                .collect();
        }

        let mut groups: BTreeMap<(PartId, Topology, bool), Vec<usize>> = BTreeMap::new();
        for (index, entity) in self.entities(rank).iter().enumerate() {
            if !parts.contains(&entity.part) {
                continue;
            }
            let locally_owned = entity.owner == self.rank;
            if ownership == Ownership::LocallyOwned && !locally_owned {
                continue;
            }
            groups
                .entry((entity.part, entity.topology, locally_owned))
                .or_default()
                .push(index);
        }
        groups
            .into_iter()
            .map(|((part, topology, locally_owned), entities)| Bucket {
                rank,
                part: Some(part),
                topology,
                locally_owned,
                entities,
            })
            .collect()
    }

    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut FieldRegistry {
        &mut self.fields
    }

    /// Declares a field on all entities of `rank`; idempotent per name.
    pub fn declare_field(&mut self, name: &str, rank: EntityRank, components: usize, num_states: usize) -> Result<FieldId> {
        let count = self.num_entities(rank);
        self.fields
            .declare(name, rank, components, num_states, count)
    }

    /// Declares a field and records that it lives on the given parts.
    pub fn declare_field_on_parts(
        &mut self,
        name: &str,
        rank: EntityRank,
        components: usize,
        num_states: usize,
        parts: &[PartId],
    ) -> Result<FieldId> {
        let id = self.declare_field(name, rank, components, num_states)?;
        for &part in parts {
            self.fields.put_on_part(id, part);
        }
        Ok(id)
    }

    pub fn field(&self, name: &str) -> Result<&Field> {
        self.fields.by_name(name)
    }

    pub fn field_mut(&mut self, name: &str) -> Result<&mut Field> {
        self.fields.by_name_mut(name)
    }

    pub fn field_state(&self, name: &str, state: FieldState) -> Result<&[f64]> {
        self.field(name)?.state(state)
    }

    pub fn field_state_mut(&mut self, name: &str, state: FieldState) -> Result<&mut [f64]> {
        self.field_mut(name)?.state_mut(state)
    }

    pub fn coordinates(&self) -> Result<&[f64]> {
        self.field_state(COORDINATES, FieldState::Np1)
    }

    /// Nodal coordinates of an entity, laid out as `[node][dim]`.
    pub fn gather_coordinates(&self, entity: &Entity, out: &mut Vec<f64>) -> Result<()> {
        let coords = self.coordinates()?;
        let dim = self.spatial_dim;
        out.clear();
        for &n in &entity.nodes {
            out.extend_from_slice(&coords[n * dim..(n + 1) * dim]);
        }
        Ok(())
    }

    /// Rotates the states of every multi-state field.
    pub fn swap_states(&mut self) {
        self.fields.rotate_states();
    }
}
