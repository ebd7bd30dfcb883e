use nalgebra::{DMatrix, DVector};

use super::shape::evaluate_basis;
use super::{average, dot, map_point, reference_centroid, reference_node, subface_area_vector, MasterElement, WorkSet};
use crate::topology::Topology;

/// Boundary face master element.
///
/// Each face node owns one sub-face: in 3D the quadrilateral joining the node, the midpoints of
/// its two face edges and the face centroid, in 2D the half segment adjacent to the node.
/// Area vectors follow the orientation of the face node ordering, which is outward for sides
/// extracted from an element.
#[derive(Debug, Clone)]
pub struct FaceMasterElement {
    topology: Topology,
    ip_node_map: Vec<usize>,
    ip_coordinates: Vec<Vec<f64>>,
    corner_basis: Vec<Vec<DVector<f64>>>,
    shape_fcn: DMatrix<f64>,
}

fn subfaces(topology: Topology) -> Vec<Vec<Vec<f64>>> {
    let n = topology.num_nodes();
    let mid = |a: usize, b: usize| average(&[reference_node(topology, a), reference_node(topology, b)]);
    if topology.reference_dim() == 1 {
        vec![vec![reference_node(topology, 0), mid(0, 1)], vec![mid(0, 1), reference_node(topology, 1)]]
    } else {
        let centroid = reference_centroid(topology);
        (0..n)
            .map(|i| {
                let next = (i + 1) % n;
                let prev = (i + n - 1) % n;
                vec![reference_node(topology, i), mid(i, next), centroid.clone(), mid(i, prev)]
            })
            .collect()
    }
}

impl FaceMasterElement {
    pub(crate) fn build(topology: Topology) -> Self {
        let subfaces = subfaces(topology);
        let ip_node_map = (0..subfaces.len()).collect();
        let ip_coordinates: Vec<_> = subfaces.iter().map(|c| average(c)).collect();
        let corner_basis = subfaces
            .iter()
            .map(|corners| {
                corners
                    .iter()
                    .map(|c| evaluate_basis(topology, c))
                    .collect()
            })
            .collect();

        let mut shape_fcn = DMatrix::zeros(ip_coordinates.len(), topology.num_nodes());
        for (ip, xi) in ip_coordinates.iter().enumerate() {
            shape_fcn
                .row_mut(ip)
                .copy_from(&evaluate_basis(topology, xi).transpose());
        }

        Self {
            topology,
            ip_node_map,
            ip_coordinates,
            corner_basis,
            shape_fcn,
        }
    }

    /// Maps each face integration point to the face-local node owning it.
    pub fn ip_node_map(&self) -> &[usize] {
        &self.ip_node_map
    }

    /// Reference coordinates of the integration points in the face parametrization.
    pub fn ip_coordinates(&self) -> &[Vec<f64>] {
        &self.ip_coordinates
    }
}

impl MasterElement for FaceMasterElement {
    fn topology(&self) -> Topology {
        self.topology
    }

    fn work_set(&self) -> WorkSet {
        WorkSet::Fc
    }

    fn num_integration_points(&self) -> usize {
        self.ip_node_map.len()
    }

    fn shape_fcn(&self) -> &DMatrix<f64> {
        &self.shape_fcn
    }

    fn determinant_components(&self) -> usize {
        self.topology.spatial_dim()
    }

    fn determinant(&self, batch_size: usize, coords: &[f64], out: &mut [f64], error: &mut bool) {
        let dim = self.topology.spatial_dim();
        let stride = self.nodes_per_element() * dim;
        let len = self.determinant_len();
        for e in 0..batch_size {
            let face_coords = &coords[e * stride..(e + 1) * stride];
            for (ip, basis) in self.corner_basis.iter().enumerate() {
                let corners: Vec<_> = basis
                    .iter()
                    .map(|phi| map_point(phi, face_coords, dim))
                    .collect();
                let area = subface_area_vector(&corners);
                if dot(&area, &area) <= 0.0 {
                    *error = true;
                }
                out[e * len + ip * dim..e * len + (ip + 1) * dim].copy_from_slice(&area);
            }
        }
    }
}
