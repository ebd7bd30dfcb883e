use cvflow::config::{BcStyle, SimulationConfig, WallBcKind};
use cvflow::linear_solver::KrylovMethod;
use serde_json::json;

pub fn base_config() -> serde_json::Value {
    json!({
        "linear_solvers": [
            { "name": "solve_scalar", "method": "Cg", "tolerance": 1e-12 }
        ],
        "time_integrator": {
            "name": "ti_1",
            "termination_step_count": 1,
            "time_step": 1.0,
            "realms": ["realm_1"]
        },
        "realms": [{
            "name": "realm_1",
            "steady": true,
            "equation_systems": {
                "name": "theEqSys",
                "solver_system_specification": { "temperature": "solve_scalar" },
                "systems": [ { "HeatConduction": { "name": "myHeatConduction" } } ]
            },
            "initial_conditions": [
                { "name": "ic_1", "target": ["block_1"], "value": { "temperature": [0.0] } }
            ],
            "boundary_conditions": [
                { "Wall": { "name": "bc_left", "target": "left", "user_data": { "temperature": 1.0 } } },
                { "Wall": { "name": "bc_right", "target": "right", "user_data": { "heat_flux": 2.0 } } }
            ],
            "material_properties": {
                "target": ["block_1"],
                "density": 1.0,
                "specific_heat": 1.0,
                "thermal_conductivity": 1.0
            }
        }]
    })
}

fn parse(value: serde_json::Value) -> SimulationConfig {
    serde_json::from_value(value).unwrap()
}

#[test]
fn base_config_is_valid() {
    let config = parse(base_config());
    config.validate().unwrap();
    let realm = config.realm("realm_1").unwrap();
    assert_eq!(realm.solution_options.bc_style, BcStyle::NodeCentered);
    assert!(!realm.solution_options.check_jacobians);
    assert_eq!(realm.initial_conditions().unwrap().len(), 1);
    let time_integrator = config.time_integrator().unwrap();
    assert_eq!(time_integrator.nonlinear_iterations, 1);
    assert_eq!(time_integrator.termination_step_count, Some(1));
}

#[test]
fn wall_boundary_condition_kinds() {
    let config = parse(base_config());
    let realm = config.realm("realm_1").unwrap();
    let kinds: Vec<WallBcKind> = realm
        .boundary_conditions
        .iter()
        .map(|bc| match bc {
            cvflow::config::BoundaryConditionConfig::Wall(wall) => wall.kind().unwrap(),
        })
        .collect();
    assert_eq!(kinds, vec![WallBcKind::Dirichlet(1.0), WallBcKind::HeatFlux(2.0)]);
}

#[test]
fn missing_time_integrator_is_an_error() {
    let mut value = base_config();
    value.as_object_mut().unwrap().remove("time_integrator");
    assert!(parse(value).validate().is_err());
}

#[test]
fn missing_termination_bound_is_an_error() {
    let mut value = base_config();
    value["time_integrator"]
        .as_object_mut()
        .unwrap()
        .remove("termination_step_count");
    assert!(parse(value).validate().is_err());
}

#[test]
fn missing_initial_conditions_block_is_an_error() {
    let mut value = base_config();
    value["realms"][0]
        .as_object_mut()
        .unwrap()
        .remove("initial_conditions");
    assert!(parse(value).validate().is_err());
}

#[test]
fn wall_with_both_temperature_and_flux_is_an_error() {
    let mut value = base_config();
    value["realms"][0]["boundary_conditions"][0]["Wall"]["user_data"]["heat_flux"] = json!(1.0);
    assert!(parse(value).validate().is_err());
}

#[test]
fn wall_without_payload_is_an_error() {
    let mut value = base_config();
    value["realms"][0]["boundary_conditions"][1]["Wall"]["user_data"] = json!({});
    assert!(parse(value).validate().is_err());
}

#[test]
fn unknown_linear_solver_is_an_error() {
    let mut value = base_config();
    value["realms"][0]["equation_systems"]["solver_system_specification"]["temperature"] = json!("nope");
    assert!(parse(value).validate().is_err());
}

#[test]
fn material_properties_need_a_target() {
    let mut value = base_config();
    value["realms"][0]["material_properties"]["target"] = json!([]);
    assert!(parse(value).validate().is_err());
}

#[test]
fn linear_solver_method_accepts_lowercase_names() {
    let mut value = base_config();
    value["linear_solvers"][0]["method"] = json!("bicgstab");
    let config = parse(value);
    assert_eq!(config.linear_solvers[0].method, KrylovMethod::BiCgStab);
}
