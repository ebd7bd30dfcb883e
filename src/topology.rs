//! Entity ranks and topology tables.
//!
//! Node ordering and side ordinals follow the Exodus conventions, so that side node lists
//! are ordered with an outward pointing normal (right-hand rule in 3D, counter-clockwise
//! traversal of the parent element in 2D).
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityRank {
    Node,
    /// Boundary sides: edges in 2D, faces in 3D.
    Face,
    Element,
}

#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topology {
    Node,
    /// Two-node side of a 2D element.
    Segment2d2,
    /// Three-node face of a 3D element.
    Tri3d3,
    /// Four-node face of a 3D element.
    Quad4d3,
    Tri3d2,
    Quad4d2,
    Tet4,
    Pyramid5,
    Wedge6,
    Hex8,
}

const QUAD_EDGES: &[[usize; 2]] = &[[0, 1], [1, 2], [2, 3], [3, 0]];
const TRI_EDGES: &[[usize; 2]] = &[[0, 1], [1, 2], [2, 0]];
const TET_EDGES: &[[usize; 2]] = &[[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];
const PYRAMID_EDGES: &[[usize; 2]] = &[[0, 1], [1, 2], [2, 3], [3, 0], [0, 4], [1, 4], [2, 4], [3, 4]];
const WEDGE_EDGES: &[[usize; 2]] = &[
    [0, 1],
    [1, 2],
    [2, 0],
    [3, 4],
    [4, 5],
    [5, 3],
    [0, 3],
    [1, 4],
    [2, 5],
];
const HEX_EDGES: &[[usize; 2]] = &[
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

const QUAD_SIDES: &[&[usize]] = &[&[0, 1], &[1, 2], &[2, 3], &[3, 0]];
const TRI_SIDES: &[&[usize]] = &[&[0, 1], &[1, 2], &[2, 0]];
const TET_SIDES: &[&[usize]] = &[&[0, 1, 3], &[1, 2, 3], &[0, 3, 2], &[0, 2, 1]];
const PYRAMID_SIDES: &[&[usize]] = &[&[0, 1, 4], &[1, 2, 4], &[2, 3, 4], &[3, 0, 4], &[0, 3, 2, 1]];
const WEDGE_SIDES: &[&[usize]] = &[&[0, 1, 4, 3], &[1, 2, 5, 4], &[0, 3, 5, 2], &[0, 2, 1], &[3, 4, 5]];
const HEX_SIDES: &[&[usize]] = &[
    &[0, 1, 5, 4],
    &[1, 2, 6, 5],
    &[2, 3, 7, 6],
    &[0, 4, 7, 3],
    &[0, 3, 2, 1],
    &[4, 5, 6, 7],
];

#[rustfmt::skip]
const QUAD_REF: &[f64] = &[
    -1.0, -1.0,
     1.0, -1.0,
     1.0,  1.0,
    -1.0,  1.0,
];
#[rustfmt::skip]
const TRI_REF: &[f64] = &[
    0.0, 0.0,
    1.0, 0.0,
    0.0, 1.0,
];
#[rustfmt::skip]
const SEGMENT_REF: &[f64] = &[-1.0, 1.0];
#[rustfmt::skip]
const TET_REF: &[f64] = &[
    0.0, 0.0, 0.0,
    1.0, 0.0, 0.0,
    0.0, 1.0, 0.0,
    0.0, 0.0, 1.0,
];
// Pyramids are parametrized as a hexahedron whose top face is collapsed into the apex.
#[rustfmt::skip]
const PYRAMID_REF: &[f64] = &[
    -1.0, -1.0, -1.0,
     1.0, -1.0, -1.0,
     1.0,  1.0, -1.0,
    -1.0,  1.0, -1.0,
     0.0,  0.0,  1.0,
];
#[rustfmt::skip]
const WEDGE_REF: &[f64] = &[
    0.0, 0.0, -1.0,
    1.0, 0.0, -1.0,
    0.0, 1.0, -1.0,
    0.0, 0.0,  1.0,
    1.0, 0.0,  1.0,
    0.0, 1.0,  1.0,
];
#[rustfmt::skip]
const HEX_REF: &[f64] = &[
    -1.0, -1.0, -1.0,
     1.0, -1.0, -1.0,
     1.0,  1.0, -1.0,
    -1.0,  1.0, -1.0,
    -1.0, -1.0,  1.0,
     1.0, -1.0,  1.0,
     1.0,  1.0,  1.0,
    -1.0,  1.0,  1.0,
];

impl Topology {
    pub const ALL_ELEMENTS: [Topology; 6] = [
        Topology::Tri3d2,
        Topology::Quad4d2,
        Topology::Tet4,
        Topology::Pyramid5,
        Topology::Wedge6,
        Topology::Hex8,
    ];

    pub fn num_nodes(&self) -> usize {
        match self {
            Topology::Node => 1,
            Topology::Segment2d2 => 2,
            Topology::Tri3d3 | Topology::Tri3d2 => 3,
            Topology::Quad4d3 | Topology::Quad4d2 | Topology::Tet4 => 4,
            Topology::Pyramid5 => 5,
            Topology::Wedge6 => 6,
            Topology::Hex8 => 8,
        }
    }

    /// Dimension of the space the topology is embedded in.
    pub fn spatial_dim(&self) -> usize {
        match self {
            Topology::Node => 0,
            Topology::Segment2d2 | Topology::Tri3d2 | Topology::Quad4d2 => 2,
            _ => 3,
        }
    }

    /// Dimension of the reference (parametric) domain.
    pub fn reference_dim(&self) -> usize {
        match self {
            Topology::Node => 0,
            Topology::Segment2d2 => 1,
            Topology::Tri3d3 | Topology::Quad4d3 | Topology::Tri3d2 | Topology::Quad4d2 => 2,
            _ => 3,
        }
    }

    pub fn rank(&self) -> EntityRank {
        match self {
            Topology::Node => EntityRank::Node,
            Topology::Segment2d2 | Topology::Tri3d3 | Topology::Quad4d3 => EntityRank::Face,
            _ => EntityRank::Element,
        }
    }

    /// Reference coordinates of the nodes, stored node-major with `reference_dim` entries per node.
    pub fn reference_coordinates(&self) -> &'static [f64] {
        match self {
            Topology::Node => &[],
            Topology::Segment2d2 => SEGMENT_REF,
            Topology::Tri3d3 | Topology::Tri3d2 => TRI_REF,
            Topology::Quad4d3 | Topology::Quad4d2 => QUAD_REF,
            Topology::Tet4 => TET_REF,
            Topology::Pyramid5 => PYRAMID_REF,
            Topology::Wedge6 => WEDGE_REF,
            Topology::Hex8 => HEX_REF,
        }
    }

    pub fn edges(&self) -> &'static [[usize; 2]] {
        match self {
            Topology::Node => &[],
            Topology::Segment2d2 => &[[0, 1]],
            Topology::Tri3d3 | Topology::Tri3d2 => TRI_EDGES,
            Topology::Quad4d3 | Topology::Quad4d2 => QUAD_EDGES,
            Topology::Tet4 => TET_EDGES,
            Topology::Pyramid5 => PYRAMID_EDGES,
            Topology::Wedge6 => WEDGE_EDGES,
            Topology::Hex8 => HEX_EDGES,
        }
    }

    /// Number of sides (boundary faces in 3D, boundary edges in 2D) of an element topology.
    pub fn num_sides(&self) -> usize {
        self.side_table().len()
    }

    /// The element-local node ordinals of the given side, or `None` for an invalid ordinal.
    pub fn side_node_ordinals(&self, ordinal: usize) -> Option<&'static [usize]> {
        self.side_table().get(ordinal).copied()
    }

    pub fn side_topology(&self, ordinal: usize) -> Option<Topology> {
        let nodes = self.side_node_ordinals(ordinal)?;
        match (self.spatial_dim(), nodes.len()) {
            (2, 2) => Some(Topology::Segment2d2),
            (3, 3) => Some(Topology::Tri3d3),
            (3, 4) => Some(Topology::Quad4d3),
            _ => None,
        }
    }

    fn side_table(&self) -> &'static [&'static [usize]] {
        match self {
            Topology::Tri3d2 => TRI_SIDES,
            Topology::Quad4d2 => QUAD_SIDES,
            Topology::Tet4 => TET_SIDES,
            Topology::Pyramid5 => PYRAMID_SIDES,
            Topology::Wedge6 => WEDGE_SIDES,
            Topology::Hex8 => HEX_SIDES,
            _ => &[],
        }
    }

    /// Sides of the element that contain both nodes of the given edge.
    pub fn sides_adjacent_to_edge(&self, edge: [usize; 2]) -> Vec<usize> {
        self.side_table()
            .iter()
            .enumerate()
            .filter(|(_, nodes)| nodes.contains(&edge[0]) && nodes.contains(&edge[1]))
            .map(|(ordinal, _)| ordinal)
            .collect()
    }
}
