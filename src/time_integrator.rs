//! The outer time loop.
//!
//! A [`TimeIntegrator`] owns the time level (current time, the two most recent step sizes and
//! the step counter) and drives every realm through the same fixed sequence of phases. The
//! realms only ever see a [`TimeState`] snapshot of it.
use log::{info, warn};

use crate::config::{TimeIntegratorConfig, TimeSteppingType};
use crate::error::{CvfemError, Result};
use crate::realm::Realm;

/// Time-differencing coefficients of the first-order (backward Euler) scheme.
pub const FIRST_ORDER_GAMMA: [f64; 3] = [1.0, -1.0, 0.0];

/// Snapshot of the time level passed to the physics.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TimeState {
    pub time: f64,
    /// Size of the current step.
    pub dt_n: f64,
    /// Size of the previous step.
    pub dt_nm1: f64,
    /// Coefficients of `phi^{n+1}`, `phi^n` and `phi^{n-1}` in the time derivative.
    pub gamma: [f64; 3],
    pub step_count: usize,
}

impl TimeState {
    pub fn new(time: f64, dt: f64, step_count: usize) -> Self {
        Self {
            time,
            dt_n: dt,
            dt_nm1: dt,
            gamma: FIRST_ORDER_GAMMA,
            step_count,
        }
    }

    /// Recomputes the variable step BDF2 coefficients from `dt_n` and `dt_nm1`.
    ///
    /// Up to and including the first step the first-order coefficients are used, since no
    /// `n-1` state exists yet.
    pub fn compute_gamma(&mut self) {
        self.gamma = FIRST_ORDER_GAMMA;
        if self.step_count > 1 {
            let tau = self.dt_n / self.dt_nm1;
            self.gamma = [(1.0 + 2.0 * tau) / (1.0 + tau), -(1.0 + tau), tau * tau / (1.0 + tau)];
        }
    }
}

impl Default for TimeState {
    fn default() -> Self {
        Self::new(0.0, 1.0, 0)
    }
}

/// When the time loop stops.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Termination {
    /// Stop as soon as the current time reaches the given time.
    Time(f64),
    /// Stop after the given number of steps.
    StepCount(usize),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IntegratorState {
    Idle,
    Initialized,
    Stepping,
    Complete,
}

#[derive(Debug, Clone)]
pub struct TimeIntegrator {
    name: String,
    termination: Termination,
    time_step_from_config: f64,
    time: TimeState,
    second_order: bool,
    adaptive: bool,
    nonlinear_iterations: usize,
    realm_names: Vec<String>,
    state: IntegratorState,
}

impl TimeIntegrator {
    /// Builds the integrator from its configuration.
    ///
    /// A step count bound prevails over a termination time, and at least one of them must be
    /// given.
    pub fn load(config: &TimeIntegratorConfig) -> Result<Self> {
        let termination = match (config.termination_step_count, config.termination_time) {
            (Some(steps), time) => {
                if time.is_some() {
                    warn!(
                        "time integrator {}: both termination_step_count and termination_time given, \
                         the step count prevails",
                        config.name
                    );
                }
                Termination::StepCount(steps)
            }
            (None, Some(time)) => Termination::Time(time),
            (None, None) => {
                return Err(CvfemError::configuration(format!(
                    "time integrator {} needs termination_time or termination_step_count",
                    config.name
                )))
            }
        };
        if config.nonlinear_iterations == 0 {
            return Err(CvfemError::configuration("nonlinear_iterations must be at least 1"));
        }

        let integrator = Self {
            name: config.name.clone(),
            termination,
            time_step_from_config: config.time_step,
            time: TimeState::new(config.start_time, config.time_step, config.time_step_count),
            second_order: config.second_order_accuracy,
            adaptive: config.time_stepping_type == TimeSteppingType::Adaptive,
            nonlinear_iterations: config.nonlinear_iterations,
            realm_names: config.realms.clone(),
            state: IntegratorState::Idle,
        };
        info!(
            "time integrator {}: second order {}, termination {:?}, {} time step {}",
            integrator.name,
            integrator.second_order,
            integrator.termination,
            if integrator.adaptive { "adaptive" } else { "fixed" },
            integrator.time_step_from_config
        );
        Ok(integrator)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the realms driven by this integrator, in driving order.
    pub fn realm_names(&self) -> &[String] {
        &self.realm_names
    }

    pub fn state(&self) -> IntegratorState {
        self.state
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    pub fn is_second_order(&self) -> bool {
        self.second_order
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn time_state(&self) -> TimeState {
        self.time
    }

    pub fn current_time(&self) -> f64 {
        self.time.time
    }

    pub fn step_count(&self) -> usize {
        self.time.step_count
    }

    pub fn gamma(&self) -> [f64; 3] {
        self.time.gamma
    }

    pub fn compute_gamma(&mut self) {
        self.time.compute_gamma();
    }

    pub fn simulation_proceeds(&self) -> bool {
        match self.termination {
            Termination::Time(end) => self.time.time < end,
            Termination::StepCount(steps) => self.time.step_count < steps,
        }
    }

    pub fn initialize(&mut self) -> Result<()> {
        if self.state != IntegratorState::Idle {
            return Err(CvfemError::precondition(
                "time integrator",
                format!("{} initialized twice", self.name),
            ));
        }
        self.state = IntegratorState::Initialized;
        Ok(())
    }

    fn broadcast(&self, realms: &mut [Realm]) {
        for realm in realms.iter_mut() {
            realm.set_time_state(self.time);
        }
    }

    /// Runs the start-up phases and then steps until the termination bound is reached.
    pub fn integrate_realm(&mut self, realms: &mut [Realm]) -> Result<()> {
        if self.state != IntegratorState::Initialized {
            return Err(CvfemError::precondition(
                "time integrator",
                format!("{} must be initialized before integrating, state is {:?}", self.name, self.state),
            ));
        }
        self.broadcast(realms);

        for realm in realms.iter_mut() {
            realm.populate_initial_condition()?;
        }
        for realm in realms.iter_mut() {
            realm.populate_boundary_data()?;
        }
        for realm in realms.iter_mut() {
            realm.boundary_data_to_state_data()?;
        }

        if self.adaptive {
            self.time.dt_n = self.time.dt_nm1;
        } else {
            self.time.dt_n = self.time_step_from_config;
        }
        self.broadcast(realms);

        for realm in realms.iter_mut() {
            realm.populate_derived_quantities()?;
        }
        for realm in realms.iter_mut() {
            realm.evaluate_properties()?;
        }
        for realm in realms.iter_mut() {
            realm.initial_work()?;
        }

        self.state = IntegratorState::Stepping;
        while self.simulation_proceeds() {
            if self.adaptive {
                let mut dt = f64::MAX;
                for realm in realms.iter() {
                    dt = dt.min(realm.compute_adaptive_time_step(self.time.dt_n)?);
                }
                self.time.dt_n = dt;
            }

            self.time.time += self.time.dt_n;
            self.time.step_count += 1;
            if self.second_order {
                self.compute_gamma();
            }
            info!(
                "time step count: {} current time: {} dt_n: {} dt_nm1: {} gammas: {} {} {}",
                self.time.step_count,
                self.time.time,
                self.time.dt_n,
                self.time.dt_nm1,
                self.time.gamma[0],
                self.time.gamma[1],
                self.time.gamma[2]
            );
            self.broadcast(realms);

            for realm in realms.iter_mut() {
                realm.swap_states();
                realm.predict_state()?;
            }
            for realm in realms.iter_mut() {
                realm.pre_timestep_work()?;
            }
            for realm in realms.iter_mut() {
                realm.populate_boundary_data()?;
            }

            for k in 0..self.nonlinear_iterations {
                info!("realm nonlinear iteration: {}/{}", k + 1, self.nonlinear_iterations);
                for realm in realms.iter_mut() {
                    realm.advance_time_step()?;
                }
            }

            for realm in realms.iter_mut() {
                realm.post_converged_work()?;
            }
            self.provide_mean_norm(realms);

            self.time.dt_nm1 = self.time.dt_n;
        }
        self.state = IntegratorState::Complete;

        info!(
            "simulation complete: time/step count {}/{}",
            self.time.time, self.time.step_count
        );
        for realm in realms.iter() {
            realm.dump_simulation_time();
        }
        Ok(())
    }

    /// Mean of the system norms of all realms.
    pub fn provide_mean_norm(&self, realms: &[Realm]) -> f64 {
        if realms.is_empty() {
            return 0.0;
        }
        let sum: f64 = realms.iter().map(Realm::provide_mean_norm).sum();
        let mean = sum / realms.len() as f64;
        info!(
            "mean system norm: {:.16e} {} {}",
            mean, self.time.step_count, self.time.time
        );
        mean
    }
}
