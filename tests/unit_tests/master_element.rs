use cvflow::master_element::{MasterElement, MasterElementRepo};
use cvflow::topology::Topology;
use matrixcompare::assert_scalar_eq;
use proptest::prelude::*;

const UNIT_SQUARE: [f64; 8] = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];

#[rustfmt::skip]
const UNIT_CUBE: [f64; 24] = [
    0.0, 0.0, 0.0,
    1.0, 0.0, 0.0,
    1.0, 1.0, 0.0,
    0.0, 1.0, 0.0,
    0.0, 0.0, 1.0,
    1.0, 0.0, 1.0,
    1.0, 1.0, 1.0,
    0.0, 1.0, 1.0,
];

fn scv_volumes(topology: Topology, coords: &[f64]) -> (Vec<f64>, bool) {
    let repo = MasterElementRepo::new();
    let me = repo.volume(topology).unwrap();
    let mut out = vec![0.0; me.determinant_len()];
    let mut error = false;
    me.determinant(1, coords, &mut out, &mut error);
    (out, error)
}

#[test]
fn quad4_sub_volumes_are_quarters_of_the_unit_square() {
    let (volumes, error) = scv_volumes(Topology::Quad4d2, &UNIT_SQUARE);
    assert!(!error);
    assert_eq!(volumes.len(), 4);
    for v in volumes {
        assert_scalar_eq!(v, 0.25, comp = abs, tol = 1e-12);
    }
}

#[test]
fn hex8_sub_volumes_sum_to_the_element_volume() {
    let (volumes, error) = scv_volumes(Topology::Hex8, &UNIT_CUBE);
    assert!(!error);
    assert_eq!(volumes.len(), 8);
    assert_scalar_eq!(volumes.iter().sum::<f64>(), 1.0, comp = abs, tol = 1e-12);
}

#[test]
fn reversed_quad_reports_a_determinant_error() {
    let reversed = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0];
    let (volumes, error) = scv_volumes(Topology::Quad4d2, &reversed);
    assert!(error);
    assert!(volumes.iter().all(|&v| v < 0.0));
}

#[test]
fn quad4_scs_area_vectors_point_from_left_to_right_node() {
    let repo = MasterElementRepo::new();
    let me = repo.surface(Topology::Quad4d2).unwrap();
    let mut areas = vec![0.0; me.determinant_len()];
    let mut error = false;
    me.determinant(1, &UNIT_SQUARE, &mut areas, &mut error);
    assert!(!error);
    assert_eq!(me.lrscv().len(), 4);
    for (ip, &[l, r]) in me.lrscv().iter().enumerate() {
        let a = &areas[2 * ip..2 * ip + 2];
        let edge = [UNIT_SQUARE[2 * r] - UNIT_SQUARE[2 * l], UNIT_SQUARE[2 * r + 1] - UNIT_SQUARE[2 * l + 1]];
        assert!(a[0] * edge[0] + a[1] * edge[1] > 0.0);
        assert_scalar_eq!(a[0].hypot(a[1]), 0.5, comp = abs, tol = 1e-12);
    }
}

#[test]
fn shape_functions_form_a_partition_of_unity() {
    let repo = MasterElementRepo::new();
    for topology in Topology::ALL_ELEMENTS {
        let shape = repo.volume(topology).unwrap().shape_fcn();
        for ip in 0..shape.nrows() {
            assert_scalar_eq!(shape.row(ip).sum(), 1.0, comp = abs, tol = 1e-12);
        }
        let shape = repo.surface(topology).unwrap().shape_fcn();
        for ip in 0..shape.nrows() {
            assert_scalar_eq!(shape.row(ip).sum(), 1.0, comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn face_area_vectors_sum_to_the_side_normal() {
    let repo = MasterElementRepo::new();
    let me = repo.face(Topology::Quad4d3).unwrap();
    // Top side of the unit cube, counter-clockwise seen from outside.
    let coords = [0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0];
    let mut areas = vec![0.0; me.determinant_len()];
    let mut error = false;
    me.determinant(1, &coords, &mut areas, &mut error);
    assert!(!error);
    let total: Vec<f64> = (0..3)
        .map(|d| areas.chunks(3).map(|a| a[d]).sum())
        .collect();
    assert_scalar_eq!(total[0], 0.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(total[1], 0.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(total[2], 1.0, comp = abs, tol = 1e-12);
}

#[test]
fn missing_topology_is_an_error() {
    let repo = MasterElementRepo::new();
    assert!(repo.volume(Topology::Segment2d2).is_err());
}

proptest! {
    #[test]
    fn scv_volumes_of_scaled_quads_sum_to_the_element_area(
        sx in 0.1f64..10.0,
        sy in 0.1f64..10.0,
        shear in -0.5f64..0.5,
    ) {
        let coords: Vec<f64> = UNIT_SQUARE
            .chunks(2)
            .flat_map(|p| [sx * (p[0] + shear * p[1]), sy * p[1]])
            .collect();
        let (volumes, error) = scv_volumes(Topology::Quad4d2, &coords);
        prop_assert!(!error);
        prop_assert!(volumes.iter().all(|&v| v > 0.0));
        let total: f64 = volumes.iter().sum();
        prop_assert!((total - sx * sy).abs() <= 1e-10 * sx * sy);
    }
}

/// Measure of the reference element of `topology`.
fn reference_measure(topology: Topology) -> f64 {
    match topology {
        Topology::Tri3d2 => 0.5,
        Topology::Quad4d2 => 4.0,
        Topology::Tet4 => 1.0 / 6.0,
        Topology::Pyramid5 => 8.0 / 3.0,
        Topology::Wedge6 => 1.0,
        Topology::Hex8 => 8.0,
        other => panic!("{:?} is not an element topology", other),
    }
}

/// Reference nodes of `topology` mapped through `x -> diag(scale) (I + upper(shear)) x + shift`.
///
/// Returns the nodal coordinates and the determinant of the map.
fn affine_element(topology: Topology, scale: &[f64], shear: &[f64], shift: &[f64]) -> (Vec<f64>, f64) {
    let dim = topology.spatial_dim();
    let coords = topology
        .reference_coordinates()
        .chunks(dim)
        .flat_map(|xi| {
            (0..dim)
                .map(|i| {
                    let sheared = xi[i]
                        + (i + 1..dim)
                            .map(|j| shear[i + j - 1] * xi[j])
                            .sum::<f64>();
                    scale[i] * sheared + shift[i]
                })
                .collect::<Vec<_>>()
        })
        .collect();
    (coords, scale[..dim].iter().product())
}

fn scs_area_vectors(repo: &MasterElementRepo, topology: Topology, coords: &[f64]) -> Vec<f64> {
    let me = repo.surface(topology).unwrap();
    let mut areas = vec![0.0; me.determinant_len()];
    let mut error = false;
    me.determinant(1, coords, &mut areas, &mut error);
    assert!(!error, "{:?}", topology);
    areas
}

/// Sub-face area vectors of side `ordinal`, paired with the element node owning each of them.
fn side_area_vectors(repo: &MasterElementRepo, topology: Topology, ordinal: usize, coords: &[f64]) -> Vec<(usize, Vec<f64>)> {
    let dim = topology.spatial_dim();
    let side_nodes = topology.side_node_ordinals(ordinal).unwrap();
    let face = repo.face(topology.side_topology(ordinal).unwrap()).unwrap();
    let face_coords: Vec<f64> = side_nodes
        .iter()
        .flat_map(|&n| coords[n * dim..(n + 1) * dim].to_vec())
        .collect();
    let mut areas = vec![0.0; face.determinant_len()];
    let mut error = false;
    face.determinant(1, &face_coords, &mut areas, &mut error);
    assert!(!error, "{:?} side {}", topology, ordinal);
    face.ip_node_map()
        .iter()
        .zip(areas.chunks(dim))
        .map(|(&face_node, area)| (side_nodes[face_node], area.to_vec()))
        .collect()
}

/// Net outward area vector of the control volume of every element node.
fn control_volume_net_areas(repo: &MasterElementRepo, topology: Topology, coords: &[f64]) -> Vec<Vec<f64>> {
    let dim = topology.spatial_dim();
    let mut net = vec![vec![0.0; dim]; topology.num_nodes()];
    let scs = scs_area_vectors(repo, topology, coords);
    let lrscv = repo.surface(topology).unwrap().lrscv();
    for (&[l, r], area) in lrscv.iter().zip(scs.chunks(dim)) {
        for d in 0..dim {
            net[l][d] += area[d];
            net[r][d] -= area[d];
        }
    }
    for ordinal in 0..topology.num_sides() {
        for (node, area) in side_area_vectors(repo, topology, ordinal, coords) {
            for d in 0..dim {
                net[node][d] += area[d];
            }
        }
    }
    net
}

#[test]
fn pyramid_control_volumes_are_closed() {
    let repo = MasterElementRepo::new();
    let coords = Topology::Pyramid5.reference_coordinates().to_vec();
    for area in control_volume_net_areas(&repo, Topology::Pyramid5, &coords) {
        for component in area {
            assert_scalar_eq!(component, 0.0, comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn pyramid_side_sub_faces_are_thirds_of_the_triangle() {
    let repo = MasterElementRepo::new();
    let coords = Topology::Pyramid5.reference_coordinates().to_vec();
    let face = &side_area_vectors(&repo, Topology::Pyramid5, 0, &coords);
    let total: Vec<f64> = (0..3).map(|d| face.iter().map(|(_, a)| a[d]).sum()).collect();
    for (node, area) in face {
        for d in 0..3 {
            assert_scalar_eq!(area[d], total[d] / 3.0, comp = abs, tol = 1e-12);
        }
        assert!([0, 1, 4].contains(node));
    }
}

#[test]
fn face_integration_points_of_solid_sides_follow_the_face_element() {
    let repo = MasterElementRepo::new();
    for topology in Topology::ALL_ELEMENTS {
        let surface = repo.surface(topology).unwrap();
        for ordinal in 0..topology.num_sides() {
            let side_nodes = topology.side_node_ordinals(ordinal).unwrap();
            let face = repo.face(topology.side_topology(ordinal).unwrap()).unwrap();
            let expected: Vec<usize> = face.ip_node_map().iter().map(|&n| side_nodes[n]).collect();
            assert_eq!(surface.face_ip_node_map(ordinal), expected.as_slice(), "{:?} side {}", topology, ordinal);
        }
    }
}

proptest! {
    #[test]
    fn scv_volumes_of_affine_elements_sum_to_the_element_volume(
        scale in prop::collection::vec(0.2f64..5.0, 3),
        shear in prop::collection::vec(-0.5f64..0.5, 3),
        shift in prop::collection::vec(-10.0f64..10.0, 3),
    ) {
        for topology in Topology::ALL_ELEMENTS {
            let (coords, det) = affine_element(topology, &scale, &shear, &shift);
            let (volumes, error) = scv_volumes(topology, &coords);
            prop_assert!(!error, "{:?}", topology);
            prop_assert!(volumes.iter().all(|&v| v > 0.0), "{:?}", topology);
            let expected = det * reference_measure(topology);
            let total: f64 = volumes.iter().sum();
            prop_assert!((total - expected).abs() <= 1e-10 * expected, "{:?}: {} vs {}", topology, total, expected);
        }
    }

    #[test]
    fn scs_area_vectors_of_affine_elements_point_along_their_edges(
        scale in prop::collection::vec(0.2f64..5.0, 3),
        shear in prop::collection::vec(-0.5f64..0.5, 3),
        shift in prop::collection::vec(-10.0f64..10.0, 3),
    ) {
        let repo = MasterElementRepo::new();
        for topology in Topology::ALL_ELEMENTS {
            let dim = topology.spatial_dim();
            let (coords, _) = affine_element(topology, &scale, &shear, &shift);
            let areas = scs_area_vectors(&repo, topology, &coords);
            let lrscv = repo.surface(topology).unwrap().lrscv();
            for (&[l, r], area) in lrscv.iter().zip(areas.chunks(dim)) {
                let flux: f64 = (0..dim)
                    .map(|d| area[d] * (coords[r * dim + d] - coords[l * dim + d]))
                    .sum();
                prop_assert!(flux > 0.0, "{:?} edge ({}, {})", topology, l, r);
            }
        }
    }

    #[test]
    fn control_volumes_of_affine_elements_are_closed(
        scale in prop::collection::vec(0.2f64..5.0, 3),
        shear in prop::collection::vec(-0.5f64..0.5, 3),
        shift in prop::collection::vec(-10.0f64..10.0, 3),
    ) {
        let repo = MasterElementRepo::new();
        for topology in Topology::ALL_ELEMENTS {
            let (coords, _) = affine_element(topology, &scale, &shear, &shift);
            let size = scale.iter().fold(1.0f64, |m, s| m.max(*s));
            for (node, area) in control_volume_net_areas(&repo, topology, &coords).iter().enumerate() {
                for component in area {
                    prop_assert!(component.abs() <= 1e-10 * size * size, "{:?} node {}: {:?}", topology, node, area);
                }
            }
        }
    }

    #[test]
    fn side_sub_faces_of_affine_elements_cover_a_closed_surface(
        scale in prop::collection::vec(0.2f64..5.0, 3),
        shear in prop::collection::vec(-0.5f64..0.5, 3),
        shift in prop::collection::vec(-10.0f64..10.0, 3),
    ) {
        let repo = MasterElementRepo::new();
        for topology in Topology::ALL_ELEMENTS {
            let dim = topology.spatial_dim();
            let (coords, _) = affine_element(topology, &scale, &shear, &shift);
            let mut total = vec![0.0; dim];
            let mut magnitude = 0.0;
            for ordinal in 0..topology.num_sides() {
                for (_, area) in side_area_vectors(&repo, topology, ordinal, &coords) {
                    for d in 0..dim {
                        total[d] += area[d];
                    }
                    magnitude += area.iter().map(|a| a * a).sum::<f64>().sqrt();
                }
            }
            prop_assert!(magnitude > 0.0);
            for component in total {
                prop_assert!(component.abs() <= 1e-10 * magnitude, "{:?}", topology);
            }
        }
    }
}
