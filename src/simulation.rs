//! Top level: configuration and meshes in, a completed time integration out.
use std::collections::BTreeMap;

use eyre::{eyre, WrapErr};
use log::info;

use crate::config::SimulationConfig;
use crate::mesh::MeshDatabase;
use crate::realm::Realm;
use crate::time_integrator::TimeIntegrator;

#[derive(Debug)]
pub struct Simulation {
    realms: Vec<Realm>,
    time_integrator: TimeIntegrator,
}

impl Simulation {
    /// Validates `config` and builds the realms driven by its time integrator, each on the mesh
    /// stored under the realm's name in `meshes`.
    pub fn new(config: SimulationConfig, mut meshes: BTreeMap<String, MeshDatabase>) -> eyre::Result<Self> {
        config
            .validate()
            .wrap_err("invalid simulation configuration")?;
        let integrator_config = config.time_integrator()?;

        let mut realms = Vec::with_capacity(integrator_config.realms.len());
        for name in &integrator_config.realms {
            let realm_config = config.realm(name)?;
            let mesh = meshes
                .remove(name)
                .ok_or_else(|| eyre!("no mesh given for realm {}", name))?;
            let realm = Realm::new(
                realm_config,
                &config.linear_solvers,
                mesh,
                integrator_config.second_order_accuracy,
            )
            .wrap_err_with(|| format!("failed to build realm {}", name))?;
            realms.push(realm);
        }
        let time_integrator = TimeIntegrator::load(integrator_config)?;
        Ok(Self { realms, time_integrator })
    }

    pub fn realms(&self) -> &[Realm] {
        &self.realms
    }

    pub fn realm(&self, name: &str) -> Option<&Realm> {
        self.realms.iter().find(|r| r.name() == name)
    }

    pub fn time_integrator(&self) -> &TimeIntegrator {
        &self.time_integrator
    }

    /// Initializes every realm and integrates until the termination bound.
    pub fn run(&mut self) -> eyre::Result<()> {
        for realm in &mut self.realms {
            realm
                .initialize()
                .wrap_err_with(|| format!("failed to initialize realm {}", realm.name()))?;
        }
        self.time_integrator.initialize()?;
        self.time_integrator
            .integrate_realm(&mut self.realms)
            .wrap_err("time integration failed")?;
        info!(
            "simulation finished at time {} after {} step(s)",
            self.time_integrator.current_time(),
            self.time_integrator.step_count()
        );
        Ok(())
    }
}
