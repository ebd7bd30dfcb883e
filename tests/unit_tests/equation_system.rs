use cvflow::config::SimulationConfig;
use cvflow::equation_system::Stage;
use cvflow::mesh::procedural::create_rectangular_quad_mesh_2d;
use cvflow::realm::Realm;
use serde_json::json;

use super::config::base_config;

fn build_realm(value: serde_json::Value) -> Realm {
    let config: SimulationConfig = serde_json::from_value(value).unwrap();
    let mesh = create_rectangular_quad_mesh_2d([2, 2], [1.0, 1.0]).unwrap();
    Realm::new(config.realm("realm_1").unwrap(), &config.linear_solvers, mesh, false).unwrap()
}

#[test]
fn load_builds_one_system_per_entry() {
    let realm = build_realm(base_config());
    let systems = realm.equation_systems();
    assert_eq!(systems.len(), 1);
    let heat = systems.get("myHeatConduction").unwrap();
    assert_eq!(heat.core().dof_name(), "temperature");
    assert_eq!(heat.core().stage(), Stage::AlgorithmsRegistered);
    assert_eq!(realm.num_states(), 1);
}

#[test]
fn steady_realm_registers_no_mass_algorithm() {
    let realm = build_realm(base_config());
    let heat = realm.equation_systems().get("myHeatConduction").unwrap();
    // interior diffusion and the heat flux wall
    assert_eq!(heat.core().solver_driver().num_solver_algorithms(), 2);
    assert_eq!(heat.core().solver_driver().num_dirichlet_algorithms(), 1);
}

#[test]
fn transient_realm_registers_mass_algorithm() {
    let mut value = base_config();
    value["realms"][0]["steady"] = json!(false);
    let realm = build_realm(value);
    assert_eq!(realm.num_states(), 2);
    let heat = realm.equation_systems().get("myHeatConduction").unwrap();
    assert_eq!(heat.core().solver_driver().num_solver_algorithms(), 3);
}

#[test]
fn dirichlet_walls_share_one_algorithm() {
    for style in ["NodeCentered", "IpCentered"] {
        let mut value = base_config();
        value["realms"][0]["solution_options"] = json!({ "bc_style": style });
        value["realms"][0]["boundary_conditions"] = json!([
            { "Wall": { "name": "bc_left", "target": "left", "user_data": { "temperature": 1.0 } } },
            { "Wall": { "name": "bc_right", "target": "right", "user_data": { "temperature": 2.0 } } }
        ]);
        let realm = build_realm(value);
        let heat = realm.equation_systems().get("myHeatConduction").unwrap();
        assert_eq!(heat.core().solver_driver().num_dirichlet_algorithms(), 1);
        assert_eq!(heat.core().solver_driver().num_solver_algorithms(), 1);
        assert_eq!(
            heat.core()
                .solver_driver()
                .dirichlet_algorithm(cvflow::algorithm::AlgorithmType::Wall)
                .unwrap()
                .parts()
                .len(),
            2
        );
    }
}

#[test]
fn solving_before_initialize_is_an_error() {
    let mut realm = build_realm(base_config());
    assert!(realm.advance_time_step().is_err());
}

#[test]
fn initialize_moves_systems_to_initialized() {
    let mut realm = build_realm(base_config());
    realm.initialize().unwrap();
    let heat = realm.equation_systems().get("myHeatConduction").unwrap();
    assert_eq!(heat.core().stage(), Stage::Initialized);
    assert!(realm.mesh().field("dual_nodal_volume").is_ok());
}

#[test]
fn unknown_boundary_part_is_an_error() {
    let mut value = base_config();
    value["realms"][0]["boundary_conditions"][0]["Wall"]["target"] = json!("nowhere");
    let config: SimulationConfig = serde_json::from_value(value).unwrap();
    let mesh = create_rectangular_quad_mesh_2d([2, 2], [1.0, 1.0]).unwrap();
    assert!(Realm::new(config.realm("realm_1").unwrap(), &config.linear_solvers, mesh, false).is_err());
}

#[test]
fn initial_condition_for_unknown_field_is_an_error() {
    let mut value = base_config();
    value["realms"][0]["initial_conditions"][0]["value"] = json!({ "pressure": [0.0] });
    let config: SimulationConfig = serde_json::from_value(value).unwrap();
    let mesh = create_rectangular_quad_mesh_2d([2, 2], [1.0, 1.0]).unwrap();
    assert!(Realm::new(config.realm("realm_1").unwrap(), &config.linear_solvers, mesh, false).is_err());
}
