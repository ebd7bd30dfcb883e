//! Master elements: per-topology descriptors of the control-volume integration rules.
//!
//! Three work sets exist for every topology. The sub-control volumes (SCV) partition an element
//! into one or more sub-volumes per node, the sub-control surfaces (SCS) separate the two nodes
//! of every element edge, and the face work set (FC) partitions a boundary face into one sub-face
//! per face node. All master elements are immutable after construction and are shared read-only
//! through [`MasterElementRepo`].
use std::fmt::Debug;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use rustc_hash::FxHashMap;

use crate::error::{CvfemError, Result};
use crate::topology::Topology;

mod face;
pub mod shape;
mod surface;
mod volume;

pub use face::FaceMasterElement;
pub use surface::SurfaceMasterElement;
pub use volume::VolumeMasterElement;

/// Integration work set of a master element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkSet {
    /// Sub-control volumes.
    Scv,
    /// Sub-control surfaces.
    Scs,
    /// Boundary face sub-faces.
    Fc,
}

/// The contract shared by all master element work sets.
pub trait MasterElement: Debug + Send + Sync {
    fn topology(&self) -> Topology;

    fn work_set(&self) -> WorkSet;

    fn nodes_per_element(&self) -> usize {
        self.topology().num_nodes()
    }

    fn num_integration_points(&self) -> usize;

    /// Shape function values at the integration points, one row per integration point.
    fn shape_fcn(&self) -> &DMatrix<f64>;

    /// Number of values `determinant` writes per integration point.
    fn determinant_components(&self) -> usize;

    /// Evaluates the integration-point determinants of a batch of elements.
    ///
    /// `coords` holds the nodal coordinates of `batch_size` elements, laid out as
    /// `[elem][node][dim]`. For the SCV work set the output holds one sub-volume per integration
    /// point, for the SCS and FC work sets it holds one area vector per integration point.
    /// A non-positive determinant sets `error` to `true`; it is never raised.
    fn determinant(&self, batch_size: usize, coords: &[f64], out: &mut [f64], error: &mut bool);

    /// Number of output entries `determinant` produces per element.
    fn determinant_len(&self) -> usize {
        self.num_integration_points() * self.determinant_components()
    }
}

/// Precomputed reference gradients and weight of one quadrature sample.
#[derive(Debug, Clone)]
pub(crate) struct ReferenceSample {
    pub gradients: DMatrix<f64>,
    pub weight: f64,
}

/// Physical Jacobian `J[(i, j)] = dx_i / dxi_j` of one element.
pub(crate) fn physical_jacobian(coords: &[f64], dim: usize, gradients: &DMatrix<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(dim, dim, |i, j| {
        (0..gradients.ncols())
            .map(|n| coords[n * dim + i] * gradients[(j, n)])
            .sum()
    })
}

/// Maps a reference point through the shape functions of `topology` with the given nodal
/// coordinates (node-major, `dim` entries per node).
pub(crate) fn map_point(basis: &DVector<f64>, coords: &[f64], dim: usize) -> Vec<f64> {
    (0..dim)
        .map(|i| basis.iter().enumerate().map(|(n, phi)| phi * coords[n * dim + i]).sum())
        .collect()
}

/// Physical shape function gradients `J^{-T} dN/dxi`, stored as columns. `None` if the
/// Jacobian is singular.
pub(crate) fn physical_gradients(
    coords: &[f64],
    dim: usize,
    reference_gradients: &DMatrix<f64>,
) -> Option<(DMatrix<f64>, f64)> {
    let jacobian = physical_jacobian(coords, dim, reference_gradients);
    let det = jacobian.determinant();
    let inverse_transpose = jacobian.try_inverse()?.transpose();
    Some((inverse_transpose * reference_gradients, det))
}

pub(crate) fn reference_node(topology: Topology, node: usize) -> Vec<f64> {
    let dim = topology.reference_dim();
    topology.reference_coordinates()[node * dim..(node + 1) * dim].to_vec()
}

pub(crate) fn average(points: &[Vec<f64>]) -> Vec<f64> {
    let dim = points.first().map(Vec::len).unwrap_or(0);
    let n = points.len() as f64;
    (0..dim).map(|i| points.iter().map(|p| p[i]).sum::<f64>() / n).collect()
}

pub(crate) fn reference_centroid(topology: Topology) -> Vec<f64> {
    let points: Vec<_> = (0..topology.num_nodes())
        .map(|n| reference_node(topology, n))
        .collect();
    average(&points)
}

/// Reference coordinates of the nodes of side `ordinal`, expressed in the parent element's
/// reference domain.
///
/// The pyramid apex is the collapsed top face of a hexahedron, so on each triangular side it is
/// represented by the point of the collapsed edge that lies in the plane of that side.
pub(crate) fn side_reference_nodes(topology: Topology, ordinal: usize) -> Vec<Vec<f64>> {
    let side_nodes = topology.side_node_ordinals(ordinal).unwrap_or(&[]);
    side_nodes
        .iter()
        .map(|&node| {
            if topology == Topology::Pyramid5 && node == 4 && ordinal < 4 {
                let apex_on_side = [[0.0, -1.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0], [-1.0, 0.0, 1.0]];
                apex_on_side[ordinal].to_vec()
            } else {
                reference_node(topology, node)
            }
        })
        .collect()
}

/// Reference coordinates of the midpoint of the edge `(a, b)`.
///
/// The apex edges of a pyramid are collapsed vertical edges of the parent hexahedron, so their
/// midpoints lie at half height directly above the base node.
pub(crate) fn edge_midpoint(topology: Topology, a: usize, b: usize) -> Vec<f64> {
    if topology == Topology::Pyramid5 && (a == 4 || b == 4) {
        let base = reference_node(topology, a.min(b));
        vec![base[0], base[1], 0.0]
    } else {
        average(&[reference_node(topology, a), reference_node(topology, b)])
    }
}

/// Reference point that maps to the centroid of side `ordinal`.
pub(crate) fn side_centroid(topology: Topology, ordinal: usize) -> Vec<f64> {
    average(&side_reference_nodes(topology, ordinal))
}

pub(crate) fn cross(a: &[f64], b: &[f64]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Area vector of a sub-face given by its physical corners.
///
/// In 2D the sub-face is the segment `p0 -> p1` and the vector is the segment rotated clockwise,
/// in 3D the sub-face is the quadrilateral `p0 p1 p2 p3` and the vector is `(p2 - p0) x (p3 - p1) / 2`.
pub(crate) fn subface_area_vector(corners: &[Vec<f64>]) -> Vec<f64> {
    match corners.len() {
        2 => {
            let d = sub(&corners[1], &corners[0]);
            vec![d[1], -d[0]]
        }
        _ => {
            let c = cross(&sub(&corners[2], &corners[0]), &sub(&corners[3], &corners[1]));
            c.iter().map(|v| 0.5 * v).collect()
        }
    }
}

/// Topology-keyed dispatch table holding exactly one master element per topology and work set.
#[derive(Debug, Default)]
pub struct MasterElementRepo {
    volume: FxHashMap<Topology, Arc<VolumeMasterElement>>,
    surface: FxHashMap<Topology, Arc<SurfaceMasterElement>>,
    face: FxHashMap<Topology, Arc<FaceMasterElement>>,
}

impl MasterElementRepo {
    /// Builds the master elements of every supported topology.
    pub fn new() -> Self {
        let mut repo = Self::default();
        for topology in Topology::ALL_ELEMENTS {
            repo.volume
                .insert(topology, Arc::new(VolumeMasterElement::build(topology)));
            repo.surface
                .insert(topology, Arc::new(SurfaceMasterElement::build(topology)));
        }
        for topology in [Topology::Segment2d2, Topology::Tri3d3, Topology::Quad4d3] {
            repo.face
                .insert(topology, Arc::new(FaceMasterElement::build(topology)));
        }
        repo
    }

    pub fn volume(&self, topology: Topology) -> Result<&Arc<VolumeMasterElement>> {
        self.volume
            .get(&topology)
            .ok_or(CvfemError::UnsupportedTopology(topology, "scv"))
    }

    pub fn surface(&self, topology: Topology) -> Result<&Arc<SurfaceMasterElement>> {
        self.surface
            .get(&topology)
            .ok_or(CvfemError::UnsupportedTopology(topology, "scs"))
    }

    pub fn face(&self, topology: Topology) -> Result<&Arc<FaceMasterElement>> {
        self.face
            .get(&topology)
            .ok_or(CvfemError::UnsupportedTopology(topology, "fc"))
    }

    /// Type-erased access for callers that only need the common contract.
    pub fn get(&self, topology: Topology, work_set: WorkSet) -> Result<Arc<dyn MasterElement>> {
        Ok(match work_set {
            WorkSet::Scv => self.volume(topology)?.clone() as Arc<dyn MasterElement>,
            WorkSet::Scs => self.surface(topology)?.clone() as Arc<dyn MasterElement>,
            WorkSet::Fc => self.face(topology)?.clone() as Arc<dyn MasterElement>,
        })
    }
}
