use cvflow::config::{TimeIntegratorConfig, TimeSteppingType};
use cvflow::time_integrator::{IntegratorState, Termination, TimeIntegrator, TimeState};
use matrixcompare::assert_scalar_eq;

fn integrator_config() -> TimeIntegratorConfig {
    TimeIntegratorConfig {
        name: "ti_1".to_string(),
        termination_time: Some(10.0),
        termination_step_count: None,
        time_step: 0.1,
        start_time: 0.0,
        time_step_count: 0,
        second_order_accuracy: true,
        nonlinear_iterations: 1,
        time_stepping_type: TimeSteppingType::Fixed,
        realms: vec!["realm_1".to_string()],
    }
}

#[test]
fn first_step_uses_first_order_coefficients() {
    let mut time = TimeState::new(0.1, 0.1, 1);
    time.dt_nm1 = 0.05;
    time.compute_gamma();
    assert_eq!(time.gamma, [1.0, -1.0, 0.0]);
}

#[test]
fn variable_step_bdf2_coefficients() {
    let mut time = TimeState::new(0.3, 0.2, 2);
    time.dt_nm1 = 0.1;
    time.compute_gamma();
    assert_scalar_eq!(time.gamma[0], 5.0 / 3.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(time.gamma[1], -3.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(time.gamma[2], 4.0 / 3.0, comp = abs, tol = 1e-14);
}

#[test]
fn constant_step_bdf2_coefficients() {
    let mut time = TimeState::new(1.0, 0.1, 5);
    time.compute_gamma();
    assert_scalar_eq!(time.gamma[0], 1.5, comp = abs, tol = 1e-14);
    assert_scalar_eq!(time.gamma[1], -2.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(time.gamma[2], 0.5, comp = abs, tol = 1e-14);
}

#[test]
fn step_count_bound_prevails_over_time() {
    let mut config = integrator_config();
    config.termination_step_count = Some(3);
    let integrator = TimeIntegrator::load(&config).unwrap();
    assert_eq!(integrator.termination(), Termination::StepCount(3));
}

#[test]
fn missing_termination_is_a_configuration_error() {
    let mut config = integrator_config();
    config.termination_time = None;
    assert!(TimeIntegrator::load(&config).is_err());
}

#[test]
fn loaded_integrator_starts_idle() {
    let mut integrator = TimeIntegrator::load(&integrator_config()).unwrap();
    assert_eq!(integrator.state(), IntegratorState::Idle);
    assert!(integrator.is_second_order());
    assert!(!integrator.is_adaptive());
    assert!(integrator.simulation_proceeds());
    integrator.initialize().unwrap();
    assert_eq!(integrator.state(), IntegratorState::Initialized);
    assert!(integrator.initialize().is_err());
}

#[test]
fn integrating_before_initialization_is_an_error() {
    let mut integrator = TimeIntegrator::load(&integrator_config()).unwrap();
    assert!(integrator.integrate_realm(&mut []).is_err());
}
