use cvflow::mesh::procedural::{create_rectangular_quad_mesh_2d, create_rectangular_tri_mesh_2d};
use serde_json::json;

use super::{assert_nodal_field, assert_uniform_vector_field, heat_conduction_config, run, wall};

fn insulated_box_walls(left: f64, right: f64) -> serde_json::Value {
    json!([
        wall("left", json!({ "temperature": left })),
        wall("right", json!({ "temperature": right })),
        wall("bottom", json!({ "heat_flux": 0.0 })),
        wall("top", json!({ "heat_flux": 0.0 })),
    ])
}

#[test]
fn steady_node_centered_dirichlet_gives_linear_profile() {
    let mesh = create_rectangular_quad_mesh_2d([4, 3], [1.0, 1.0]).unwrap();
    let simulation = run(heat_conduction_config(insulated_box_walls(1.0, 3.0)), mesh);

    assert_nodal_field(&simulation, "temperature", |x| vec![1.0 + 2.0 * x[0]], 1e-8);
    assert_uniform_vector_field(&simulation, "dtdx", &[2.0, 0.0], 1e-7);
    assert_eq!(simulation.time_integrator().step_count(), 1);
}

#[test]
fn heat_flux_enters_through_the_right_wall() {
    let mesh = create_rectangular_quad_mesh_2d([5, 2], [1.0, 1.0]).unwrap();
    let walls = json!([
        wall("left", json!({ "temperature": 0.0 })),
        wall("right", json!({ "heat_flux": 2.0 })),
    ]);
    let simulation = run(heat_conduction_config(walls), mesh);

    assert_nodal_field(&simulation, "temperature", |x| vec![2.0 * x[0]], 1e-8);
}

#[test]
fn steady_ip_centered_walls_on_triangles() {
    let mesh = create_rectangular_tri_mesh_2d([4, 4], [1.0, 1.0]).unwrap();
    let mut config = heat_conduction_config(json!([
        wall("left", json!({ "temperature": 0.0 })),
        wall("right", json!({ "temperature": 1.0 })),
        wall("top", json!({ "heat_flux": 0.0 })),
    ]));
    let realm = &mut config["realms"][0];
    realm["solution_options"] = json!({ "bc_style": "IpCentered" });
    realm["equation_systems"]["solver_system_specification"]["temperature"] = json!("solve_general");
    let simulation = run(config, mesh);

    assert_nodal_field(&simulation, "temperature", |x| vec![x[0]], 1e-8);
}

#[test]
fn projected_nodal_gradient_is_exact_for_linear_fields() {
    let mesh = create_rectangular_quad_mesh_2d([3, 3], [1.0, 2.0]).unwrap();
    let mut config = heat_conduction_config(json!([
        wall("left", json!({ "temperature": 0.0 })),
        wall("right", json!({ "temperature": 4.0 })),
        wall("bottom", json!({ "heat_flux": 0.0 })),
        wall("top", json!({ "heat_flux": 0.0 })),
    ]));
    let realm = &mut config["realms"][0];
    realm["solution_options"] = json!({ "consistent_mass_matrix_png": true });
    realm["equation_systems"]["solver_system_specification"]["dtdx"] = json!("solve_general");
    let simulation = run(config, mesh);

    assert_nodal_field(&simulation, "temperature", |x| vec![4.0 * x[0]], 1e-8);
    assert_uniform_vector_field(&simulation, "dtdx", &[4.0, 0.0], 1e-7);
    let realm = simulation.realm(super::REALM).unwrap();
    assert!(realm
        .equation_systems()
        .get("myHeatConduction")
        .unwrap()
        .core()
        .last_solve()
        .is_some());
}

#[test]
fn missing_mesh_is_reported() {
    let config: cvflow::config::SimulationConfig =
        serde_json::from_value(heat_conduction_config(insulated_box_walls(0.0, 1.0))).unwrap();
    let result = cvflow::simulation::Simulation::new(config, Default::default());
    assert!(result.is_err());
}
