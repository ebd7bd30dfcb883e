use std::collections::BTreeMap;

use cvflow::config::SimulationConfig;
use cvflow::mesh::{FieldState, MeshDatabase};
use cvflow::simulation::Simulation;
use nalgebra::DVector;
use serde_json::{json, Value};
use util::assert_approx_matrix_eq;

mod heat_conduction;
mod time_stepping;

pub const REALM: &str = "realm_1";

/// A single heat conduction realm with unit material properties, zero initial temperature and
/// the given walls, run for one step.
pub fn heat_conduction_config(walls: Value) -> Value {
    json!({
        "linear_solvers": [
            { "name": "solve_scalar", "method": "Cg", "tolerance": 1e-12, "max_iterations": 2000 },
            { "name": "solve_general", "method": "BiCgStab", "tolerance": 1e-12, "max_iterations": 2000 }
        ],
        "time_integrator": {
            "name": "ti_1",
            "termination_step_count": 1,
            "time_step": 1.0,
            "realms": [REALM]
        },
        "realms": [{
            "name": REALM,
            "steady": true,
            "equation_systems": {
                "name": "theEqSys",
                "solver_system_specification": { "temperature": "solve_scalar" },
                "systems": [ { "HeatConduction": { "name": "myHeatConduction" } } ]
            },
            "initial_conditions": [
                { "name": "ic_1", "target": ["block_1"], "value": { "temperature": [0.0] } }
            ],
            "boundary_conditions": walls,
            "material_properties": {
                "target": ["block_1"],
                "density": 1.0,
                "specific_heat": 1.0,
                "thermal_conductivity": 1.0
            }
        }]
    })
}

pub fn wall(target: &str, user_data: Value) -> Value {
    json!({ "Wall": { "name": format!("bc_{}", target), "target": target, "user_data": user_data } })
}

pub fn run(config: Value, mesh: MeshDatabase) -> Simulation {
    let config: SimulationConfig = serde_json::from_value(config).unwrap();
    let mut meshes = BTreeMap::new();
    meshes.insert(REALM.to_string(), mesh);
    let mut simulation = Simulation::new(config, meshes).unwrap();
    simulation.run().unwrap();
    simulation
}

/// Checks `field` against `expected` evaluated at every node.
pub fn assert_nodal_field<F>(simulation: &Simulation, field: &str, expected: F, tol: f64)
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let mesh = simulation.realm(REALM).unwrap().mesh();
    let dim = mesh.spatial_dim();
    let coords = mesh.coordinates().unwrap();
    let values = mesh.field_state(field, FieldState::Np1).unwrap();
    let components = mesh.field(field).unwrap().components();
    for n in 0..mesh.num_nodes() {
        let x = &coords[n * dim..(n + 1) * dim];
        let actual = &values[n * components..(n + 1) * components];
        let expected = expected(x);
        for (a, e) in actual.iter().zip(&expected) {
            assert!(
                (a - e).abs() <= tol,
                "{} at node {} ({:?}): {:?} != {:?}",
                field,
                n,
                x,
                actual,
                expected
            );
        }
    }
}

/// Checks that every component of the nodal vector field `field` is the constant `expected`.
pub fn assert_uniform_vector_field(simulation: &Simulation, field: &str, expected: &[f64], tol: f64) {
    let mesh = simulation.realm(REALM).unwrap().mesh();
    let values = mesh.field_state(field, FieldState::Np1).unwrap();
    assert_eq!(mesh.field(field).unwrap().components(), expected.len());
    for (i, &g) in expected.iter().enumerate() {
        let actual = util::component(values, expected.len(), i);
        let expected = DVector::repeat(actual.len(), g);
        assert_approx_matrix_eq!(&actual, &expected, abstol = tol);
    }
}
