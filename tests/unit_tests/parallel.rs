use cvflow::assembly::BatchAssembler;
use cvflow::config::SolutionOptions;
use cvflow::algorithms::AssembleNodalGradAlgorithmDriver;
use cvflow::error::CvfemError;
use cvflow::geometry::ComputeGeometryAlgorithmDriver;
use cvflow::master_element::MasterElementRepo;
use cvflow::mesh::parallel::parallel_sum;
use cvflow::mesh::{FieldState, MeshBuilder, MeshDatabase};
use cvflow::realm::SolveContext;
use cvflow::time_integrator::TimeState;
use cvflow::topology::{EntityRank, Topology};
use matrixcompare::assert_scalar_eq;

const DUAL_NODAL_VOLUME: &str = "dual_nodal_volume";
const TEMPERATURE: &str = "temperature";
const DTDX: &str = "dtdx";

/// Two unit quads touching at the corner (1, 1), which has global id 3.
const QUADS: [[(u64, [f64; 2]); 4]; 2] = [
    [(1, [0.0, 0.0]), (2, [1.0, 0.0]), (3, [1.0, 1.0]), (4, [0.0, 1.0])],
    [(3, [1.0, 1.0]), (5, [2.0, 1.0]), (6, [2.0, 2.0]), (7, [1.0, 2.0])],
];
const SHARED: u64 = 3;

fn single_mesh() -> MeshDatabase {
    let mut builder = MeshBuilder::new(2);
    for (e, quad) in QUADS.iter().enumerate() {
        let nodes: Vec<usize> = quad
            .iter()
            .map(|(id, x)| builder.node(*id).unwrap_or_else(|| builder.add_node(*id, x).unwrap()))
            .collect();
        builder
            .add_element("block_1", Topology::Quad4d2, e as u64 + 1, &nodes)
            .unwrap();
    }
    builder.build().unwrap()
}

fn partition(rank: usize) -> MeshDatabase {
    let mut builder = MeshBuilder::new(2).with_rank(rank);
    let nodes: Vec<usize> = QUADS[rank]
        .iter()
        .map(|(id, x)| {
            let node = builder.add_node(*id, x).unwrap();
            if *id == SHARED {
                builder.set_node_ownership(node, 0, true).unwrap();
            }
            node
        })
        .collect();
    builder
        .add_element("block_1", Topology::Quad4d2, rank as u64 + 1, &nodes)
        .unwrap();
    builder.build().unwrap()
}

fn compute_dual_volumes(mesh: &mut MeshDatabase) {
    let repo = MasterElementRepo::new();
    let assembler = BatchAssembler::new(8);
    let options = SolutionOptions::default();
    let ctx = SolveContext {
        time: TimeState::default(),
        repo: &repo,
        assembler: &assembler,
        options: &options,
    };
    let block = mesh.part_id("block_1").unwrap();
    mesh.declare_field_on_parts(DUAL_NODAL_VOLUME, EntityRank::Node, 1, 1, &[block])
        .unwrap();
    ComputeGeometryAlgorithmDriver::new(&[block], DUAL_NODAL_VOLUME, false)
        .unwrap()
        .execute(mesh, &ctx)
        .unwrap();
}

fn volume_of(mesh: &MeshDatabase, global_id: u64) -> f64 {
    let index = mesh
        .nodes()
        .iter()
        .position(|n| n.global_id == global_id)
        .unwrap();
    mesh.field_state(DUAL_NODAL_VOLUME, FieldState::Np1).unwrap()[index]
}

#[test]
fn two_partition_sum_equals_single_mesh_result() {
    let mut single = single_mesh();
    compute_dual_volumes(&mut single);

    let mut partitions = [partition(0), partition(1)];
    for mesh in partitions.iter_mut() {
        compute_dual_volumes(mesh);
    }
    assert_scalar_eq!(volume_of(&partitions[0], SHARED), 0.25, comp = abs, tol = 1e-12);
    parallel_sum(&mut partitions, &[DUAL_NODAL_VOLUME]).unwrap();

    for mesh in &partitions {
        for node in mesh.nodes() {
            assert_scalar_eq!(
                volume_of(mesh, node.global_id),
                volume_of(&single, node.global_id),
                comp = abs,
                tol = 1e-12
            );
        }
    }
    assert_scalar_eq!(volume_of(&partitions[1], SHARED), 0.5, comp = abs, tol = 1e-12);
}

#[test]
fn single_partition_sum_is_the_identity() {
    let mut mesh = single_mesh();
    compute_dual_volumes(&mut mesh);
    let before = mesh
        .field_state(DUAL_NODAL_VOLUME, FieldState::Np1)
        .unwrap()
        .to_vec();
    parallel_sum(std::slice::from_mut(&mut mesh), &[DUAL_NODAL_VOLUME]).unwrap();
    let after = mesh.field_state(DUAL_NODAL_VOLUME, FieldState::Np1).unwrap();
    util::assert_approx_slice_eq!(after, before.as_slice(), abstol = 0.0);
}

fn value_of(mesh: &MeshDatabase, name: &str, global_id: u64, component: usize) -> f64 {
    let index = mesh
        .nodes()
        .iter()
        .position(|n| n.global_id == global_id)
        .unwrap();
    let components = mesh.field(name).unwrap().components();
    mesh.field_state(name, FieldState::Np1).unwrap()[index * components + component]
}

/// Declares the volume, temperature and gradient fields and sets `T = 2x + 3y^2`.
fn prepare_fields(mesh: &mut MeshDatabase) {
    let block = mesh.part_id("block_1").unwrap();
    mesh.declare_field_on_parts(DUAL_NODAL_VOLUME, EntityRank::Node, 1, 1, &[block])
        .unwrap();
    mesh.declare_field_on_parts(TEMPERATURE, EntityRank::Node, 1, 1, &[block])
        .unwrap();
    mesh.declare_field_on_parts(DTDX, EntityRank::Node, 2, 1, &[block])
        .unwrap();
    let temperature: Vec<f64> = mesh
        .coordinates()
        .unwrap()
        .chunks(2)
        .map(|x| 2.0 * x[0] + 3.0 * x[1] * x[1])
        .collect();
    mesh.field_state_mut(TEMPERATURE, FieldState::Np1)
        .unwrap()
        .copy_from_slice(&temperature);
}

/// Runs the geometry and nodal gradient drivers over a set of partitions.
fn compute_gradients(partitions: &mut [MeshDatabase]) {
    let repo = MasterElementRepo::new();
    let assembler = BatchAssembler::new(8);
    let options = SolutionOptions::default();
    let ctx = SolveContext {
        time: TimeState::default(),
        repo: &repo,
        assembler: &assembler,
        options: &options,
    };
    let block = partitions[0].part_id("block_1").unwrap();
    ComputeGeometryAlgorithmDriver::new(&[block], DUAL_NODAL_VOLUME, true)
        .unwrap()
        .execute_partitions(partitions, &ctx)
        .unwrap();
    let mut gradient = AssembleNodalGradAlgorithmDriver::new(TEMPERATURE, DTDX);
    gradient
        .register_interior(&[block], DUAL_NODAL_VOLUME)
        .unwrap();
    gradient.execute_partitions(partitions, &ctx).unwrap();
}

#[test]
fn geometry_driver_sums_shared_dual_volumes_across_partitions() {
    let mut partitions = [partition(0), partition(1)];
    for mesh in partitions.iter_mut() {
        prepare_fields(mesh);
    }
    compute_gradients(&mut partitions);
    for mesh in &partitions {
        assert_scalar_eq!(volume_of(mesh, SHARED), 0.5, comp = abs, tol = 1e-12);
        assert_scalar_eq!(volume_of(mesh, 1), 0.25, comp = abs, tol = 1e-12);
    }
}

#[test]
fn nodal_gradient_driver_matches_the_unpartitioned_mesh() {
    let mut single = [single_mesh()];
    prepare_fields(&mut single[0]);
    compute_gradients(&mut single);

    let mut partitions = [partition(0), partition(1)];
    for mesh in partitions.iter_mut() {
        prepare_fields(mesh);
    }
    compute_gradients(&mut partitions);

    for mesh in &partitions {
        for node in mesh.nodes() {
            for d in 0..2 {
                assert_scalar_eq!(
                    value_of(mesh, DTDX, node.global_id, d),
                    value_of(&single[0], DTDX, node.global_id, d),
                    comp = abs,
                    tol = 1e-12
                );
            }
        }
    }
}

#[test]
fn ownership_of_unknown_entities_is_an_error() {
    let mut builder = MeshBuilder::new(2);
    let node = builder.add_node(1, &[0.0, 0.0]).unwrap();
    assert!(builder.set_node_ownership(node, 1, true).is_ok());
    assert!(matches!(
        builder.set_node_ownership(node + 1, 1, true),
        Err(CvfemError::Configuration(_))
    ));
    assert!(matches!(builder.set_element_owner(0, 1), Err(CvfemError::Configuration(_))));
}
