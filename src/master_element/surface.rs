use nalgebra::{DMatrix, DVector};

use super::face::FaceMasterElement;
use super::shape::{evaluate_basis, evaluate_basis_gradients};
use super::{
    average, dot, edge_midpoint, physical_gradients, reference_centroid, reference_node, side_centroid,
    side_reference_nodes, sub, subface_area_vector, MasterElement, WorkSet,
};
use crate::topology::Topology;

/// Integration points of the element on one of its sides, in the element's reference domain.
#[derive(Debug, Clone)]
struct SideIntegrationPoints {
    /// Element-local node owning each face integration point.
    ip_node_map: Vec<usize>,
    gradients: Vec<DMatrix<f64>>,
}

/// Sub-control surface master element.
///
/// One integration point per element edge. The sub-face of the edge `(l, r)` joins the edge
/// midpoint, the centroids of the two sides adjacent to the edge and the element centroid
/// (in 2D: the edge midpoint and the element centroid). Area vectors point from `l` to `r`.
#[derive(Debug, Clone)]
pub struct SurfaceMasterElement {
    topology: Topology,
    lrscv: Vec<[usize; 2]>,
    /// Basis values at the reference corners of each sub-face.
    corner_basis: Vec<Vec<DVector<f64>>>,
    ip_coordinates: Vec<Vec<f64>>,
    shape_fcn: DMatrix<f64>,
    ip_gradients: Vec<DMatrix<f64>>,
    sides: Vec<SideIntegrationPoints>,
}

fn dual_subfaces(topology: Topology) -> Vec<([usize; 2], Vec<Vec<f64>>)> {
    let centroid = reference_centroid(topology);
    topology
        .edges()
        .iter()
        .map(|&[l, r]| {
            let mid = edge_midpoint(topology, l, r);
            let corners = if topology.reference_dim() == 2 {
                vec![mid, centroid.clone()]
            } else {
                let sides = topology.sides_adjacent_to_edge([l, r]);
                vec![mid, side_centroid(topology, sides[0]), centroid.clone(), side_centroid(topology, sides[1])]
            };
            ([l, r], corners)
        })
        .collect()
}

/// Reverses the orientation of a sub-face so that its area vector points from `l` to `r`.
fn orient(topology: Topology, [l, r]: [usize; 2], mut corners: Vec<Vec<f64>>) -> Vec<Vec<f64>> {
    let direction = sub(&reference_node(topology, r), &reference_node(topology, l));
    if dot(&subface_area_vector(&corners), &direction) < 0.0 {
        if corners.len() == 2 {
            corners.swap(0, 1);
        } else {
            corners.swap(1, 3);
        }
    }
    corners
}

impl SurfaceMasterElement {
    pub(crate) fn build(topology: Topology) -> Self {
        let subfaces = dual_subfaces(topology);

        let mut lrscv = Vec::new();
        let mut corner_basis = Vec::new();
        let mut ip_coordinates = Vec::new();
        for (edge, corners) in subfaces {
            let corners = orient(topology, edge, corners);
            lrscv.push(edge);
            corner_basis.push(
                corners
                    .iter()
                    .map(|c| evaluate_basis(topology, c))
                    .collect::<Vec<_>>(),
            );
            ip_coordinates.push(average(&corners));
        }

        let n = topology.num_nodes();
        let mut shape_fcn = DMatrix::zeros(ip_coordinates.len(), n);
        for (ip, xi) in ip_coordinates.iter().enumerate() {
            shape_fcn
                .row_mut(ip)
                .copy_from(&evaluate_basis(topology, xi).transpose());
        }
        let ip_gradients = ip_coordinates
            .iter()
            .map(|xi| evaluate_basis_gradients(topology, xi))
            .collect();

        let sides = (0..topology.num_sides())
            .map(|ordinal| side_integration_points(topology, ordinal))
            .collect();

        Self {
            topology,
            lrscv,
            corner_basis,
            ip_coordinates,
            shape_fcn,
            ip_gradients,
            sides,
        }
    }

    /// Left and right node of every integration point.
    pub fn lrscv(&self) -> &[[usize; 2]] {
        &self.lrscv
    }

    pub fn ip_coordinates(&self) -> &[Vec<f64>] {
        &self.ip_coordinates
    }

    /// Number of face integration points on side `ordinal`.
    pub fn num_face_ips(&self, ordinal: usize) -> usize {
        self.sides
            .get(ordinal)
            .map(|side| side.ip_node_map.len())
            .unwrap_or(0)
    }

    /// Element-local node owning each face integration point of side `ordinal`.
    pub fn face_ip_node_map(&self, ordinal: usize) -> &[usize] {
        self.sides
            .get(ordinal)
            .map(|side| side.ip_node_map.as_slice())
            .unwrap_or(&[])
    }

    /// Physical shape function derivatives at the SCS integration points.
    ///
    /// `grad_op` is laid out as `[elem][ip][node][dim]` and `det_j` as `[elem][ip]`.
    /// A singular or inverted Jacobian sets `error` and leaves zero gradients.
    pub fn grad_op(&self, batch_size: usize, coords: &[f64], grad_op: &mut [f64], det_j: &mut [f64], error: &mut bool) {
        let nip = self.lrscv.len();
        for e in 0..batch_size {
            let (elem_coords, grads) = self.split_batch(e, coords, grad_op, nip);
            for (ip, reference) in self.ip_gradients.iter().enumerate() {
                let det = evaluate_gradient(self.topology, elem_coords, reference, grads, ip, error);
                det_j[e * nip + ip] = det;
            }
        }
    }

    /// Element shape function derivatives at the face integration points of side `ordinal`,
    /// laid out as `[elem][face_ip][node][dim]`.
    pub fn face_grad_op(&self, ordinal: usize, batch_size: usize, coords: &[f64], grad_op: &mut [f64], error: &mut bool) {
        let Some(side) = self.sides.get(ordinal) else {
            *error = true;
            return;
        };
        let nip = side.gradients.len();
        for e in 0..batch_size {
            let (elem_coords, grads) = self.split_batch(e, coords, grad_op, nip);
            for (ip, reference) in side.gradients.iter().enumerate() {
                evaluate_gradient(self.topology, elem_coords, reference, grads, ip, error);
            }
        }
    }

    fn split_batch<'a, 'b>(
        &self,
        e: usize,
        coords: &'a [f64],
        grad_op: &'b mut [f64],
        nip: usize,
    ) -> (&'a [f64], &'b mut [f64]) {
        let dim = self.topology.spatial_dim();
        let stride = self.nodes_per_element() * dim;
        let grad_stride = nip * stride;
        (
            &coords[e * stride..(e + 1) * stride],
            &mut grad_op[e * grad_stride..(e + 1) * grad_stride],
        )
    }
}

fn evaluate_gradient(
    topology: Topology,
    coords: &[f64],
    reference: &DMatrix<f64>,
    out: &mut [f64],
    ip: usize,
    error: &mut bool,
) -> f64 {
    let dim = topology.spatial_dim();
    let n = topology.num_nodes();
    let block = &mut out[ip * n * dim..(ip + 1) * n * dim];
    match physical_gradients(coords, dim, reference) {
        Some((gradients, det)) if det > 0.0 => {
            for node in 0..n {
                for d in 0..dim {
                    block[node * dim + d] = gradients[(d, node)];
                }
            }
            det
        }
        Some((_, det)) => {
            *error = true;
            block.fill(0.0);
            det
        }
        None => {
            *error = true;
            block.fill(0.0);
            0.0
        }
    }
}

fn side_integration_points(topology: Topology, ordinal: usize) -> SideIntegrationPoints {
    let side_nodes = topology.side_node_ordinals(ordinal).unwrap_or(&[]);
    let Some(face_topology) = topology.side_topology(ordinal) else {
        return SideIntegrationPoints {
            ip_node_map: Vec::new(),
            gradients: Vec::new(),
        };
    };
    let face = FaceMasterElement::build(face_topology);
    let side_reference = side_reference_nodes(topology, ordinal);
    let dim = topology.reference_dim();

    let mut ip_node_map = Vec::new();
    let mut gradients = Vec::new();
    let collapsed = topology == Topology::Pyramid5 && ordinal < 4;
    for (ip, face_xi) in face.ip_coordinates().iter().enumerate() {
        let face_basis = evaluate_basis(face_topology, face_xi);
        let xi: Vec<f64> = if collapsed {
            collapsed_side_point(&face_basis, &side_reference)
        } else {
            (0..dim)
                .map(|d| {
                    face_basis
                        .iter()
                        .zip(&side_reference)
                        .map(|(phi, x)| phi * x[d])
                        .sum()
                })
                .collect()
        };
        ip_node_map.push(side_nodes[face.ip_node_map()[ip]]);
        gradients.push(evaluate_basis_gradients(topology, &xi));
    }
    SideIntegrationPoints { ip_node_map, gradients }
}

/// Pyramid reference point of the triangular side point with barycentric weights `weights`
/// (two base nodes, then the apex).
///
/// The pyramid basis is not linear in the collapsed reference coordinates, so the height follows
/// the apex weight and the base position is the normalized blend of the two base nodes.
fn collapsed_side_point(weights: &DVector<f64>, side_reference: &[Vec<f64>]) -> Vec<f64> {
    let (wa, wb, apex) = (weights[0], weights[1], weights[2]);
    let base = wa + wb;
    let mut xi: Vec<f64> = (0..2)
        .map(|d| {
            if base > 0.0 {
                (wa * side_reference[0][d] + wb * side_reference[1][d]) / base
            } else {
                side_reference[2][d]
            }
        })
        .collect();
    xi.push(2.0 * apex - 1.0);
    xi
}

impl MasterElement for SurfaceMasterElement {
    fn topology(&self) -> Topology {
        self.topology
    }

    fn work_set(&self) -> WorkSet {
        WorkSet::Scs
    }

    fn num_integration_points(&self) -> usize {
        self.lrscv.len()
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
            let elem_coords = &coords[e * stride..(e + 1) * stride];
            for (ip, basis) in self.corner_basis.iter().enumerate() {
                let corners: Vec<_> = basis
                    .iter()
                    .map(|phi| super::map_point(phi, elem_coords, dim))
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
