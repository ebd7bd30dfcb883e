use rustc_hash::FxHashMap;

use crate::error::{CvfemError, Result};
use crate::mesh::{Entity, FaceElementRelation, FieldRegistry, FieldState, MeshDatabase, Node, Part, PartId, COORDINATES};
use crate::topology::{EntityRank, Topology};

/// Incremental construction of a [`MeshDatabase`].
#[derive(Debug, Clone)]
pub struct MeshBuilder {
    spatial_dim: usize,
    rank: usize,
    parts: Vec<Part>,
    nodes: Vec<Node>,
    coordinates: Vec<f64>,
    elements: Vec<Entity>,
    faces: Vec<Entity>,
    face_elements: Vec<Vec<FaceElementRelation>>,
    node_lookup: FxHashMap<u64, usize>,
}

impl MeshBuilder {
    pub fn new(spatial_dim: usize) -> Self {
        Self {
            spatial_dim,
            rank: 0,
            parts: Vec::new(),
            nodes: Vec::new(),
            coordinates: Vec::new(),
            elements: Vec::new(),
            faces: Vec::new(),
            face_elements: Vec::new(),
            node_lookup: FxHashMap::default(),
        }
    }

    /// Sets the partition rank of the mesh under construction; entities added afterwards are
    /// owned by this rank unless stated otherwise.
    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    pub fn spatial_dim(&self) -> usize {
        self.spatial_dim
    }

    /// Adds a part, or returns the existing part of the same name.
    pub fn add_part(&mut self, name: &str, rank: EntityRank) -> PartId {
        if let Some(id) = self.parts.iter().position(|p| p.name == name) {
            return id;
        }
        self.parts.push(Part {
            name: name.to_string(),
            rank,
        });
        self.parts.len() - 1
    }

    pub fn add_node(&mut self, global_id: u64, coords: &[f64]) -> Result<usize> {
        if coords.len() != self.spatial_dim {
            return Err(CvfemError::configuration(format!(
                "node {} has {} coordinates in a {}-dimensional mesh",
                global_id,
                coords.len(),
                self.spatial_dim
            )));
        }
        if self.node_lookup.contains_key(&global_id) {
            return Err(CvfemError::configuration(format!("duplicate node id {}", global_id)));
        }
        let index = self.nodes.len();
        self.nodes.push(Node {
            global_id,
            owner: self.rank,
            shared: false,
        });
        self.coordinates.extend_from_slice(coords);
        self.node_lookup.insert(global_id, index);
        Ok(index)
    }

    /// Local index of the node with the given global id.
    pub fn node(&self, global_id: u64) -> Option<usize> {
        self.node_lookup.get(&global_id).copied()
    }

    pub fn set_node_ownership(&mut self, node: usize, owner: usize, shared: bool) -> Result<()> {
        let entry = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| CvfemError::configuration(format!("no node with index {}", node)))?;
        entry.owner = owner;
        entry.shared = shared;
        Ok(())
    }

    pub fn add_element(&mut self, part: &str, topology: Topology, global_id: u64, nodes: &[usize]) -> Result<usize> {
        if topology.rank() != EntityRank::Element || topology.spatial_dim() != self.spatial_dim {
            return Err(CvfemError::UnsupportedTopology(topology, "element block"));
        }
        self.check_connectivity(topology, nodes)?;
        let part = self.add_part(part, EntityRank::Element);
        self.elements.push(Entity {
            global_id,
            topology,
            nodes: nodes.to_vec(),
            part,
            owner: self.rank,
        });
        Ok(self.elements.len() - 1)
    }

    pub fn set_element_owner(&mut self, element: usize, owner: usize) -> Result<()> {
        let entry = self
            .elements
            .get_mut(element)
            .ok_or_else(|| CvfemError::configuration(format!("no element with index {}", element)))?;
        entry.owner = owner;
        Ok(())
    }

    /// Adds the side `ordinal` of `element` as a face in the given side part.
    pub fn add_side(&mut self, part: &str, element: usize, ordinal: usize) -> Result<usize> {
        let parent = self
            .elements
            .get(element)
            .ok_or_else(|| CvfemError::configuration(format!("no element with index {}", element)))?;
        let (side_nodes, topology) = parent
            .topology
            .side_node_ordinals(ordinal)
            .zip(parent.topology.side_topology(ordinal))
            .ok_or_else(|| {
                CvfemError::configuration(format!("invalid side ordinal {} of {:?}", ordinal, parent.topology))
            })?;
        let nodes = side_nodes.iter().map(|&i| parent.nodes[i]).collect();
        let owner = parent.owner;
        let part = self.add_part(part, EntityRank::Face);
        self.faces.push(Entity {
            global_id: self.faces.len() as u64 + 1,
            topology,
            nodes,
            part,
            owner,
        });
        self.face_elements
            .push(vec![FaceElementRelation { element, ordinal }]);
        Ok(self.faces.len() - 1)
    }

    /// Records an additional element attached to an existing face, as happens for faces on
    /// internal interfaces.
    pub fn attach_face(&mut self, face: usize, element: usize, ordinal: usize) -> Result<()> {
        let relations = self
            .face_elements
            .get_mut(face)
            .ok_or_else(|| CvfemError::configuration(format!("no face with index {}", face)))?;
        relations.push(FaceElementRelation { element, ordinal });
        Ok(())
    }

    /// Adds every element side that is not shared by two elements to the side part chosen by
    /// `classify`, which receives the side centroid. Sides for which it returns `None` are skipped.
    pub fn add_exposed_sides<F>(&mut self, classify: F) -> Result<()>
    where
        F: Fn(&[f64]) -> Option<String>,
    {
        let mut counts: FxHashMap<Vec<usize>, (usize, usize, usize)> = FxHashMap::default();
        for (index, element) in self.elements.iter().enumerate() {
            for ordinal in 0..element.topology.num_sides() {
                let side = element.topology.side_node_ordinals(ordinal).unwrap_or(&[]);
                let mut key: Vec<usize> = side.iter().map(|&i| element.nodes[i]).collect();
                key.sort_unstable();
                counts
                    .entry(key)
                    .and_modify(|entry| entry.0 += 1)
                    .or_insert((1, index, ordinal));
            }
        }
        let mut exposed: Vec<(usize, usize, Vec<usize>)> = counts
            .into_iter()
            .filter(|(_, (count, _, _))| *count == 1)
            .map(|(nodes, (_, element, ordinal))| (element, ordinal, nodes))
            .collect();
        exposed.sort_unstable();

        let dim = self.spatial_dim;
        for (element, ordinal, nodes) in exposed {
            let centroid: Vec<f64> = (0..dim)
                .map(|d| nodes.iter().map(|&n| self.coordinates[n * dim + d]).sum::<f64>() / nodes.len() as f64)
                .collect();
            if let Some(part) = classify(&centroid) {
                self.add_side(&part, element, ordinal)?;
            }
        }
        Ok(())
    }

    fn check_connectivity(&self, topology: Topology, nodes: &[usize]) -> Result<()> {
        if nodes.len() != topology.num_nodes() {
            return Err(CvfemError::configuration(format!(
                "{:?} requires {} nodes, got {}",
                topology,
                topology.num_nodes(),
                nodes.len()
            )));
        }
        if let Some(&n) = nodes.iter().find(|&&n| n >= self.nodes.len()) {
            return Err(CvfemError::configuration(format!("node index {} out of bounds", n)));
        }
        Ok(())
    }

    /// Finishes the mesh and declares the nodal coordinate field.
    pub fn build(self) -> Result<MeshDatabase> {
        let mut mesh = MeshDatabase {
            spatial_dim: self.spatial_dim,
            rank: self.rank,
            parts: self.parts,
            nodes: self.nodes,
            elements: self.elements,
            faces: self.faces,
            face_elements: self.face_elements,
            fields: FieldRegistry::default(),
        };
        mesh.declare_field(COORDINATES, EntityRank::Node, self.spatial_dim, 1)?;
        mesh.field_state_mut(COORDINATES, FieldState::Np1)?
            .copy_from_slice(&self.coordinates);
        Ok(mesh)
    }
}
