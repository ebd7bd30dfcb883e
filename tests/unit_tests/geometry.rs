use cvflow::assembly::BatchAssembler;
use cvflow::config::SolutionOptions;
use cvflow::error::CvfemError;
use cvflow::geometry::{check_element_jacobians, ComputeGeometryAlgorithmDriver};
use cvflow::master_element::MasterElementRepo;
use cvflow::mesh::procedural::{create_rectangular_hex_mesh, create_rectangular_tri_mesh_2d, BLOCK};
use cvflow::mesh::{FieldState, MeshBuilder, MeshDatabase};
use cvflow::realm::SolveContext;
use cvflow::time_integrator::TimeState;
use cvflow::topology::{EntityRank, Topology};
use matrixcompare::assert_scalar_eq;

const DUAL_NODAL_VOLUME: &str = "dual_nodal_volume";

fn compute_dual_volumes(mesh: &mut MeshDatabase, check_jacobians: bool) -> cvflow::error::Result<()> {
    let repo = MasterElementRepo::new();
    let assembler = BatchAssembler::new(3);
    let options = SolutionOptions::default();
    let ctx = SolveContext {
        time: TimeState::default(),
        repo: &repo,
        assembler: &assembler,
        options: &options,
    };
    let block = mesh.part_id(BLOCK)?;
    mesh.declare_field_on_parts(DUAL_NODAL_VOLUME, EntityRank::Node, 1, 1, &[block])?;
    let mut driver = ComputeGeometryAlgorithmDriver::new(&[block], DUAL_NODAL_VOLUME, check_jacobians)?;
    driver.execute(mesh, &ctx)
}

/// Two unit quads side by side; the second one is optionally traversed clockwise.
fn two_quads(invert_second: bool) -> MeshDatabase {
    two_quads_with_owner(invert_second, 0)
}

/// Like `two_quads`, with the second quad owned by rank `second_owner` of a mesh on rank 0.
fn two_quads_with_owner(invert_second: bool, second_owner: usize) -> MeshDatabase {
    let mut builder = MeshBuilder::new(2);
    let coords = [[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, 1.0]];
    for (i, c) in coords.iter().enumerate() {
        builder.add_node(i as u64 + 1, c).unwrap();
    }
    builder
        .add_element("block_1", Topology::Quad4d2, 10, &[0, 1, 4, 3])
        .unwrap();
    let second: [usize; 4] = if invert_second { [1, 4, 5, 2] } else { [1, 2, 5, 4] };
    let element = builder
        .add_element("block_1", Topology::Quad4d2, 11, &second)
        .unwrap();
    builder.set_element_owner(element, second_owner).unwrap();
    builder.build().unwrap()
}

#[test]
fn dual_volumes_sum_to_the_domain_volume() {
    let mut mesh = create_rectangular_hex_mesh([3, 2, 2], [1.5, 1.0, 2.0]).unwrap();
    compute_dual_volumes(&mut mesh, true).unwrap();
    let volumes = mesh.field_state(DUAL_NODAL_VOLUME, FieldState::Np1).unwrap();
    assert!(volumes.iter().all(|&v| v > 0.0));
    assert_scalar_eq!(volumes.iter().sum::<f64>(), 3.0, comp = abs, tol = 1e-12);
}

#[test]
fn corner_and_interior_dual_volumes_of_a_tri_mesh() {
    let mut mesh = create_rectangular_tri_mesh_2d([4, 4], [1.0, 1.0]).unwrap();
    compute_dual_volumes(&mut mesh, false).unwrap();
    let volumes = mesh.field_state(DUAL_NODAL_VOLUME, FieldState::Np1).unwrap();
    assert_scalar_eq!(volumes.iter().sum::<f64>(), 1.0, comp = abs, tol = 1e-12);
    // Interior nodes are surrounded by six triangles of area 1/32, each contributing a third.
    let center = 2 * 5 + 2;
    assert_scalar_eq!(volumes[center], 6.0 / 96.0, comp = abs, tol = 1e-12);
}

#[test]
fn valid_mesh_has_no_invalid_elements() {
    let mesh = two_quads(false);
    let repo = MasterElementRepo::new();
    let block = mesh.part_id(BLOCK).unwrap();
    assert!(check_element_jacobians(&mesh, &repo, &[block]).is_ok());
}

#[test]
fn inverted_element_is_reported_by_id() {
    let mut mesh = two_quads(true);
    let err = compute_dual_volumes(&mut mesh, true).unwrap_err();
    assert!(matches!(err, CvfemError::InvalidGeometry(_)));
    assert_eq!(err.invalid_element_ids(), vec![11]);
    if let CvfemError::InvalidGeometry(reports) = &err {
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].part_name, "block_1");
    }
}

#[test]
fn inverted_element_passes_without_jacobian_check() {
    let mut mesh = two_quads(true);
    assert!(compute_dual_volumes(&mut mesh, false).is_ok());
}

#[test]
fn inverted_element_owned_by_another_rank_is_not_reported() {
    let mesh = two_quads_with_owner(true, 1);
    let repo = MasterElementRepo::new();
    let block = mesh.part_id(BLOCK).unwrap();
    assert!(check_element_jacobians(&mesh, &repo, &[block]).is_ok());

    let mesh = two_quads_with_owner(true, 0);
    let err = check_element_jacobians(&mesh, &repo, &[block]).unwrap_err();
    assert_eq!(err.invalid_element_ids(), vec![11]);
}
