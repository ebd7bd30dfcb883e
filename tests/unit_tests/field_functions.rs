use cvflow::field_functions::{field_axpby, field_copy, field_fill, field_index_copy, field_scale};
use cvflow::mesh::procedural::create_rectangular_quad_mesh_2d;
use cvflow::mesh::{FieldState, MeshDatabase};
use cvflow::topology::EntityRank;

fn mesh_with_fields() -> MeshDatabase {
    let mut mesh = create_rectangular_quad_mesh_2d([2, 2], [1.0, 1.0]).unwrap();
    mesh.declare_field("a", EntityRank::Node, 1, 2).unwrap();
    mesh.declare_field("b", EntityRank::Node, 1, 1).unwrap();
    mesh.declare_field("v", EntityRank::Node, 2, 1).unwrap();
    let a = mesh.field_state_mut("a", FieldState::Np1).unwrap();
    for (i, value) in a.iter_mut().enumerate() {
        *value = i as f64;
    }
    mesh
}

#[test]
fn copying_twice_equals_copying_once() {
    let mut once = mesh_with_fields();
    field_copy(&mut once, ("a", FieldState::Np1), ("b", FieldState::Np1)).unwrap();
    let mut twice = mesh_with_fields();
    field_copy(&mut twice, ("a", FieldState::Np1), ("b", FieldState::Np1)).unwrap();
    field_copy(&mut twice, ("a", FieldState::Np1), ("b", FieldState::Np1)).unwrap();
    assert_eq!(
        once.field_state("b", FieldState::Np1).unwrap(),
        twice.field_state("b", FieldState::Np1).unwrap()
    );
    assert_eq!(
        once.field_state("a", FieldState::Np1).unwrap(),
        once.field_state("b", FieldState::Np1).unwrap()
    );
}

#[test]
fn copy_between_states_of_one_field() {
    let mut mesh = mesh_with_fields();
    field_copy(&mut mesh, ("a", FieldState::Np1), ("a", FieldState::N)).unwrap();
    assert_eq!(
        mesh.field_state("a", FieldState::N).unwrap(),
        mesh.field_state("a", FieldState::Np1).unwrap()
    );
}

#[test]
fn axpby_fill_and_scale() {
    let mut mesh = mesh_with_fields();
    field_fill(&mut mesh, 2.0, "b", FieldState::Np1).unwrap();
    field_axpby(&mut mesh, 3.0, "a", 0.5, "b").unwrap();
    field_scale(&mut mesh, 2.0, "b").unwrap();
    let b = mesh.field_state("b", FieldState::Np1).unwrap();
    for (i, &value) in b.iter().enumerate() {
        assert_eq!(value, 2.0 * (3.0 * i as f64 + 1.0));
    }
}

#[test]
fn index_copy_into_vector_component() {
    let mut mesh = mesh_with_fields();
    field_index_copy(&mut mesh, "a", 0, "v", 1).unwrap();
    let v = mesh.field_state("v", FieldState::Np1).unwrap();
    for n in 0..mesh.num_nodes() {
        assert_eq!(v[2 * n], 0.0);
        assert_eq!(v[2 * n + 1], n as f64);
    }
    assert!(field_index_copy(&mut mesh, "a", 1, "v", 0).is_err());
}

#[test]
fn mismatched_layouts_are_rejected() {
    let mut mesh = mesh_with_fields();
    assert!(field_copy(&mut mesh, ("a", FieldState::Np1), ("v", FieldState::Np1)).is_err());
    assert!(field_copy(&mut mesh, ("b", FieldState::N), ("a", FieldState::Np1)).is_err());
}

#[test]
fn swapping_states_moves_np1_into_n() {
    let mut mesh = mesh_with_fields();
    let np1 = mesh.field_state("a", FieldState::Np1).unwrap().to_vec();
    mesh.swap_states();
    assert_eq!(mesh.field_state("a", FieldState::N).unwrap(), np1.as_slice());
}
