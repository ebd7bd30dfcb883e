use cvflow::mesh::procedural::{create_rectangular_hex_mesh, create_rectangular_quad_mesh_2d};
use matrixcompare::assert_scalar_eq;
use serde_json::json;

use super::{assert_nodal_field, heat_conduction_config, run, wall, REALM};

fn transient_config(steps: usize, time_step: f64, second_order: bool) -> serde_json::Value {
    let mut config = heat_conduction_config(json!([
        wall("left", json!({ "temperature": 0.0 })),
        wall("right", json!({ "temperature": 1.0 })),
    ]));
    config["realms"][0]["steady"] = json!(false);
    config["time_integrator"]["termination_step_count"] = json!(steps);
    config["time_integrator"]["time_step"] = json!(time_step);
    config["time_integrator"]["second_order_accuracy"] = json!(second_order);
    config
}

#[test]
fn step_count_prevails_over_termination_time() {
    let mesh = create_rectangular_quad_mesh_2d([2, 2], [1.0, 1.0]).unwrap();
    let mut config = transient_config(3, 0.1, false);
    config["time_integrator"]["termination_time"] = json!(100.0);
    let simulation = run(config, mesh);

    assert_eq!(simulation.time_integrator().step_count(), 3);
    assert_scalar_eq!(simulation.time_integrator().current_time(), 0.3, comp = abs, tol = 1e-12);
}

#[test]
fn termination_time_stops_at_first_step_past_it() {
    let mesh = create_rectangular_quad_mesh_2d([2, 2], [1.0, 1.0]).unwrap();
    let mut config = transient_config(0, 0.25, false);
    let integrator = config["time_integrator"].as_object_mut().unwrap();
    integrator.remove("termination_step_count");
    integrator.insert("termination_time".to_string(), json!(0.6));
    let simulation = run(config, mesh);

    assert_eq!(simulation.time_integrator().step_count(), 3);
    assert_scalar_eq!(simulation.time_integrator().current_time(), 0.75, comp = abs, tol = 1e-12);
}

#[test]
fn backward_euler_with_large_steps_reaches_steady_state() {
    let mesh = create_rectangular_hex_mesh([3, 2, 2], [1.0, 1.0, 1.0]).unwrap();
    let simulation = run(transient_config(3, 1e8, false), mesh);

    assert_eq!(simulation.realm(REALM).unwrap().num_states(), 2);
    assert_nodal_field(&simulation, "temperature", |x| vec![x[0]], 1e-6);
}

#[test]
fn bdf2_with_large_steps_reaches_steady_state() {
    let mesh = create_rectangular_hex_mesh([3, 2, 2], [1.0, 1.0, 1.0]).unwrap();
    let simulation = run(transient_config(4, 1e8, true), mesh);

    assert_eq!(simulation.realm(REALM).unwrap().num_states(), 3);
    assert_eq!(simulation.time_integrator().gamma(), [1.5, -2.0, 0.5]);
    assert_nodal_field(&simulation, "temperature", |x| vec![x[0]], 1e-6);
}

#[test]
fn small_steps_leave_the_cold_side_cold() {
    let mesh = create_rectangular_quad_mesh_2d([4, 1], [1.0, 1.0]).unwrap();
    let simulation = run(transient_config(2, 1e-3, false), mesh);

    let realm = simulation.realm(REALM).unwrap();
    let temperature = realm
        .mesh()
        .field_state("temperature", cvflow::mesh::FieldState::Np1)
        .unwrap();
    // the interior has barely started to heat up
    let coords = realm.mesh().coordinates().unwrap();
    for (n, &t) in temperature.iter().enumerate() {
        if coords[2 * n] < 0.5 {
            assert!(t < 0.5, "node {} at x = {} has temperature {}", n, coords[2 * n], t);
        }
    }
}

#[test]
fn adaptive_steps_grow_by_the_change_factor_up_to_the_maximum() {
    let mesh = create_rectangular_quad_mesh_2d([2, 2], [1.0, 1.0]).unwrap();
    let mut config = transient_config(4, 0.01, false);
    config["time_integrator"]["time_stepping_type"] = json!("Adaptive");
    config["realms"][0]["time_step_control"] = json!({
        "target_fourier": 1e6,
        "time_step_max": 0.05,
        "time_step_change_factor": 2.0
    });
    let simulation = run(config, mesh);

    // 0.02 + 0.04 + 0.05 + 0.05
    assert_scalar_eq!(simulation.time_integrator().current_time(), 0.16, comp = abs, tol = 1e-12);
    assert_scalar_eq!(simulation.time_integrator().time_state().dt_n, 0.05, comp = abs, tol = 1e-15);
}

#[test]
fn adaptive_steps_respect_the_fourier_limit() {
    let mesh = create_rectangular_quad_mesh_2d([2, 2], [1.0, 1.0]).unwrap();
    let mut config = transient_config(1, 1.0, false);
    config["time_integrator"]["time_stepping_type"] = json!("Adaptive");
    config["realms"][0]["time_step_control"] = json!({ "target_fourier": 2.0 });
    let simulation = run(config, mesh);

    // smallest dual volume is a corner quarter cell: h^2 = 1/16
    assert_scalar_eq!(simulation.time_integrator().current_time(), 2.0 / 16.0, comp = abs, tol = 1e-12);
}
