use itertools::iproduct;
use nalgebra::DMatrix;

use super::shape::{evaluate_basis, evaluate_basis_gradients};
use super::{
    edge_midpoint, physical_jacobian, reference_centroid, reference_node, side_centroid, MasterElement,
    ReferenceSample, WorkSet,
};
use crate::topology::Topology;

const GAUSS_2: [(f64, f64); 2] = [(-0.577_350_269_189_625_8, 1.0), (0.577_350_269_189_625_8, 1.0)];
const GAUSS_3: [(f64, f64); 3] = [
    (-0.774_596_669_241_483_4, 5.0 / 9.0),
    (0.0, 8.0 / 9.0),
    (0.774_596_669_241_483_4, 5.0 / 9.0),
];

/// Sub-control volume master element.
///
/// Every sub-volume is the image of a reference-space quadrilateral (2D) or hexahedron (3D)
/// whose corners are the node, the midpoints of the adjacent edges, the centroids of the
/// adjacent faces and the element centroid. Its signed volume is integrated with a tensor
/// Gauss rule over that sub-region, so inverted elements produce negative sub-volumes. The apex
/// of a pyramid has four edges and owns what its four base nodes leave of the element.
#[derive(Debug, Clone)]
pub struct VolumeMasterElement {
    topology: Topology,
    ip_node_map: Vec<usize>,
    ip_coordinates: Vec<Vec<f64>>,
    shape_fcn: DMatrix<f64>,
    samples: Vec<Vec<ReferenceSample>>,
}

/// Reference-space corners of a sub-region, ordered like a `Quad4d2` or `Hex8` element.
#[derive(Debug, Clone)]
struct SubRegion {
    node: usize,
    corners: Vec<Vec<f64>>,
}

impl SubRegion {
    fn sub_topology(&self) -> Topology {
        if self.corners.len() == 4 {
            Topology::Quad4d2
        } else {
            Topology::Hex8
        }
    }

    fn sub_jacobian_determinant(&self, eta: &[f64]) -> f64 {
        let topology = self.sub_topology();
        let gradients = evaluate_basis_gradients(topology, eta);
        let flat: Vec<f64> = self.corners.iter().flatten().copied().collect();
        physical_jacobian(&flat, eta.len(), &gradients).determinant()
    }

    fn map(&self, eta: &[f64]) -> Vec<f64> {
        let basis = evaluate_basis(self.sub_topology(), eta);
        let flat: Vec<f64> = self.corners.iter().flatten().copied().collect();
        super::map_point(&basis, &flat, eta.len())
    }
}

fn side_centroid_containing(topology: Topology, nodes: &[usize]) -> Vec<f64> {
    let ordinal = (0..topology.num_sides())
        .find(|&ordinal| {
            topology
                .side_node_ordinals(ordinal)
                .map_or(false, |side| nodes.iter().all(|n| side.contains(n)))
        })
        .expect("Every pair of edges at a node spans a side of the element");
    side_centroid(topology, ordinal)
}

fn neighbours(topology: Topology, node: usize) -> Vec<usize> {
    topology
        .edges()
        .iter()
        .filter_map(|&[a, b]| match (a == node, b == node) {
            (true, _) => Some(b),
            (_, true) => Some(a),
            _ => None,
        })
        .collect()
}

/// The dual sub-region of `node`, built from the node's edges and faces.
fn dual_sub_region(topology: Topology, node: usize) -> SubRegion {
    let centroid = reference_centroid(topology);
    let x = reference_node(topology, node);
    let nbrs = neighbours(topology, node);
    let build = |a: usize, b: usize| -> Vec<Vec<f64>> {
        if topology.reference_dim() == 2 {
            vec![x.clone(), edge_midpoint(topology, node, a), centroid.clone(), edge_midpoint(topology, node, b)]
        } else {
            let c = nbrs[2];
            vec![
                x.clone(),
                edge_midpoint(topology, node, a),
                side_centroid_containing(topology, &[node, a, b]),
                edge_midpoint(topology, node, b),
                edge_midpoint(topology, node, c),
                side_centroid_containing(topology, &[node, a, c]),
                centroid.clone(),
                side_centroid_containing(topology, &[node, b, c]),
            ]
        }
    };
    let region = SubRegion {
        node,
        corners: build(nbrs[0], nbrs[1]),
    };
    let center = vec![0.0; topology.reference_dim()];
    if region.sub_jacobian_determinant(&center) > 0.0 {
        region
    } else {
        SubRegion {
            node,
            corners: build(nbrs[1], nbrs[0]),
        }
    }
}

fn sub_regions(topology: Topology) -> Vec<SubRegion> {
    match topology {
        Topology::Pyramid5 => {
            // Base nodes own their dual hexahedra. The apex owns the rest of the collapsed
            // hexahedron: the column above the top face of every base sub-region.
            let base: Vec<_> = (0..4)
                .map(|node| dual_sub_region(topology, node))
                .collect();
            let apex: Vec<_> = base
                .iter()
                .map(|region| {
                    let lower = &region.corners[4..];
                    let upper = lower.iter().map(|c| vec![c[0], c[1], 1.0]);
                    SubRegion {
                        node: 4,
                        corners: lower.iter().cloned().chain(upper).collect(),
                    }
                })
                .collect();
            base.into_iter().chain(apex).collect()
        }
        _ => (0..topology.num_nodes())
            .map(|node| dual_sub_region(topology, node))
            .collect(),
    }
}

/// Tensor Gauss rule over the sub-region reference domain as `(point, weight)` pairs.
///
/// Pyramid sub-regions are not boxes in the collapsed reference domain and need the three point
/// rule to integrate the volume of affine pyramids exactly.
fn gauss_rule(topology: Topology) -> Vec<(Vec<f64>, f64)> {
    let rule: &[(f64, f64)] = match topology {
        Topology::Pyramid5 => &GAUSS_3,
        _ => &GAUSS_2,
    };
    if topology.reference_dim() == 2 {
        iproduct!(rule, rule)
            .map(|(a, b)| (vec![a.0, b.0], a.1 * b.1))
            .collect()
    } else {
        iproduct!(rule, rule, rule)
            .map(|(a, b, c)| (vec![a.0, b.0, c.0], a.1 * b.1 * c.1))
            .collect()
    }
}

impl VolumeMasterElement {
    pub(crate) fn build(topology: Topology) -> Self {
        let dim = topology.reference_dim();
        let regions = sub_regions(topology);
        let center = vec![0.0; dim];

        let ip_node_map = regions.iter().map(|r| r.node).collect();
        let ip_coordinates: Vec<_> = regions.iter().map(|r| r.map(&center)).collect();
        let samples = regions
            .iter()
            .map(|region| {
                gauss_rule(topology)
                    .iter()
                    .map(|(eta, w)| {
                        let xi = region.map(eta);
                        ReferenceSample {
                            gradients: evaluate_basis_gradients(topology, &xi),
                            weight: w * region.sub_jacobian_determinant(eta),
                        }
                    })
                    .collect()
            })
            .collect();

        let n = topology.num_nodes();
        let mut shape_fcn = DMatrix::zeros(ip_coordinates.len(), n);
        for (ip, xi) in ip_coordinates.iter().enumerate() {
            shape_fcn
                .row_mut(ip)
                .copy_from(&evaluate_basis(topology, xi).transpose());
        }

        Self {
            topology,
            ip_node_map,
            ip_coordinates,
            shape_fcn,
            samples,
        }
    }

    /// Maps each integration point to the element-local node owning its sub-volume.
    pub fn ip_node_map(&self) -> &[usize] {
        &self.ip_node_map
    }

    /// Reference coordinates of the sub-volume centroids.
    pub fn ip_coordinates(&self) -> &[Vec<f64>] {
        &self.ip_coordinates
    }

    /// Signed sub-volumes of a single element.
    pub fn sub_volumes(&self, coords: &[f64]) -> Vec<f64> {
        let dim = self.topology.spatial_dim();
        self.samples
            .iter()
            .map(|samples| {
                samples
                    .iter()
                    .map(|s| s.weight * physical_jacobian(coords, dim, &s.gradients).determinant())
                    .sum()
            })
            .collect()
    }
}

impl MasterElement for VolumeMasterElement {
    fn topology(&self) -> Topology {
        self.topology
    }

    fn work_set(&self) -> WorkSet {
        WorkSet::Scv
    }

    fn num_integration_points(&self) -> usize {
        self.ip_node_map.len()
    }

    fn shape_fcn(&self) -> &DMatrix<f64> {
        &self.shape_fcn
    }

    fn determinant_components(&self) -> usize {
        1
    }

    fn determinant(&self, batch_size: usize, coords: &[f64], out: &mut [f64], error: &mut bool) {
        let stride = self.nodes_per_element() * self.topology.spatial_dim();
        let nip = self.num_integration_points();
        for e in 0..batch_size {
            let volumes = self.sub_volumes(&coords[e * stride..(e + 1) * stride]);
            for (ip, volume) in volumes.into_iter().enumerate() {
                if volume <= 0.0 {
                    *error = true;
                }
                out[e * nip + ip] = volume;
            }
        }
    }
}
