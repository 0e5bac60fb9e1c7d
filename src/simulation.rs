use glam::DVec3;

use crate::config::{Scene, SimulationConfig};
use crate::diagnostics::{self, ConvergenceMonitor, Diagnostics};
use crate::error::{DemError, Result};
use crate::integrator::{Integrator, IntegratorStatus};
use crate::material::{MaterialId, MaterialParams, MaterialTable};
use crate::particle::{Particle, ParticleStore};
use crate::physics::{ContactLaw, ContactModel, LawTable};
use crate::state::SimulationState;

/// Output record taken every `interval` steps of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub step: u64,
    pub time: f64,
    pub positions: Vec<DVec3>,
    pub velocities: Vec<DVec3>,
    pub kinetic_energy: f64,
    pub residual: f64,
}

impl Snapshot {
    pub fn capture(state: &SimulationState) -> Self {
        Self {
            step: state.step,
            time: state.time,
            positions: state.particles.positions().to_vec(),
            velocities: state.particles.velocities().to_vec(),
            kinetic_energy: diagnostics::kinetic_energy(state),
            residual: diagnostics::residual(state),
        }
    }
}

/// Result of [`Simulation::relax`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelaxOutcome {
    pub iterations: u64,
    pub converged: bool,
}

/// A particle assembly together with the integrator that advances it.
pub struct Simulation {
    integrator: Integrator,
    state: SimulationState,
}

impl Simulation {
    pub fn new(config: SimulationConfig, materials: MaterialTable, laws: LawTable) -> Result<Self> {
        let dimension = config.dimension;
        let integrator = Integrator::new(config, ContactModel::new(materials, laws))?;
        let state = integrator.initial_state(ParticleStore::new(dimension));
        Ok(Self { integrator, state })
    }

    /// Builds a simulation from a parsed scene, including its particles and
    /// applied loads.
    pub fn from_scene(scene: &Scene) -> Result<Self> {
        let mut sim = Self::new(scene.config.clone(), scene.material_table()?, scene.law_table())?;
        for entry in &scene.particles {
            let i = sim.add_particle(entry.to_particle())?;
            let force = DVec3::from_array(entry.applied_force);
            if force != DVec3::ZERO {
                sim.apply_force(i, force)?;
            }
        }
        for entry in &scene.bonds {
            let [a, b] = entry.particles;
            sim.add_bond(a, b, entry.stiffness, entry.rest_length)?;
        }
        for entry in &scene.dashpots {
            let [a, b] = entry.particles;
            sim.add_dashpot(a, b, entry.viscosity)?;
        }
        log::info!(
            "loaded scene: {} particles, {} materials, {} springs, {} dashpots",
            sim.state.particles.count(),
            sim.integrator.model().materials.len(),
            sim.state.bonds.springs().len(),
            sim.state.bonds.dashpots().len()
        );
        Ok(sim)
    }

    /// Adds a particle and returns its index.
    pub fn add_particle(&mut self, particle: Particle) -> Result<usize> {
        if !self.integrator.model().materials.contains(particle.material) {
            return Err(DemError::InvalidMaterial(particle.material));
        }
        let i = self.state.particles.push(particle)?;
        self.state.invalidate();
        Ok(i)
    }

    /// Sets the constant external force on particle `i`.
    pub fn apply_force(&mut self, i: usize, force: DVec3) -> Result<()> {
        self.state.particles.set_applied_force(i, force)?;
        self.state.invalidate();
        Ok(())
    }

    /// Links `a` and `b` with a linear spring. Without `rest_length` the spring
    /// is unstressed at the current distance.
    pub fn add_bond(&mut self, a: usize, b: usize, stiffness: f64, rest_length: Option<f64>) -> Result<usize> {
        let id = self
            .state
            .bonds
            .add_spring(&self.state.particles, a, b, stiffness, rest_length)?;
        self.state.invalidate();
        Ok(id)
    }

    pub fn add_dashpot(&mut self, a: usize, b: usize, viscosity: f64) -> Result<usize> {
        let id = self.state.bonds.add_dashpot(&self.state.particles, a, b, viscosity)?;
        self.state.invalidate();
        Ok(id)
    }

    pub fn set_velocity(&mut self, i: usize, velocity: DVec3) -> Result<()> {
        self.state.particles.set_velocity(i, velocity)?;
        self.state.invalidate();
        Ok(())
    }

    /// Registers the contact law between two materials. Only allowed before the first step.
    pub fn register_law(&mut self, a: MaterialId, b: MaterialId, law: ContactLaw) -> Result<()> {
        self.ensure_unlocked()?;
        self.integrator.model.laws.register(a, b, law);
        self.state.invalidate();
        Ok(())
    }

    pub fn register_material(&mut self, id: MaterialId, params: MaterialParams) -> Result<()> {
        self.ensure_unlocked()?;
        self.integrator.model.materials.insert(id, params)?;
        self.state.invalidate();
        Ok(())
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.state.step > 0 {
            return Err(DemError::ConfigLocked);
        }
        Ok(())
    }

    /// Advances one step with the configured time step.
    pub fn step(&mut self) -> Result<()> {
        let dt = self.integrator.config().dt;
        self.step_with(dt)
    }

    pub fn step_with(&mut self, dt: f64) -> Result<()> {
        self.integrator.advance(&mut self.state, dt)
    }

    /// Runs `steps` steps, taking a snapshot every `interval` steps.
    ///
    /// `observer` sees each snapshot as it is taken. On error the snapshots
    /// taken so far are lost but the state stays at the last good step.
    pub fn run<F>(&mut self, steps: u64, interval: u64, mut observer: F) -> Result<Vec<Snapshot>>
    where
        F: FnMut(&Snapshot),
    {
        if interval == 0 {
            return Err(DemError::InvalidConfig("output interval must be >= 1".to_string()));
        }
        log::info!(
            "starting run: {} particles, {} steps, dt = {}",
            self.state.particles.count(),
            steps,
            self.integrator.config().dt
        );

        let mut snapshots = Vec::with_capacity((steps / interval) as usize);
        for _ in 0..steps {
            self.step()?;
            if self.state.step % interval == 0 {
                let snapshot = Snapshot::capture(&self.state);
                observer(&snapshot);
                snapshots.push(snapshot);
            }
        }

        log::info!(
            "run finished at step {} (t = {:.6}), {} rebuilds",
            self.state.step,
            self.state.time,
            self.state.neighbors().rebuild_count()
        );
        Ok(snapshots)
    }

    /// Steps until the out-of-balance force of the free particles, relative to
    /// the external load, stays below `tol` for `ncheck` consecutive steps, or
    /// `max_steps` is reached. See [`diagnostics::relative_residual`].
    pub fn relax(&mut self, dt: f64, tol: f64, ncheck: usize, max_steps: u64) -> Result<RelaxOutcome> {
        let gravity = self.integrator.gravity();
        let mut monitor = ConvergenceMonitor::new(ncheck);
        for iteration in 1..=max_steps {
            self.step_with(dt)?;
            let residual = diagnostics::relative_residual(&self.state, gravity);
            if monitor.update(residual, tol) {
                log::info!("relaxed after {} steps (residual {:e})", iteration, residual);
                return Ok(RelaxOutcome {
                    iterations: iteration,
                    converged: true,
                });
            }
        }
        log::warn!("relaxation did not converge within {} steps", max_steps);
        Ok(RelaxOutcome {
            iterations: max_steps,
            converged: false,
        })
    }

    pub fn status(&self) -> IntegratorStatus {
        self.integrator.status()
    }

    pub fn config(&self) -> &SimulationConfig {
        self.integrator.config()
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn particles(&self) -> &ParticleStore {
        &self.state.particles
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics::compute(&self.state, self.integrator.gravity())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Dimension;

    fn simulation() -> Simulation {
        let mut materials = MaterialTable::new();
        materials.insert(0, MaterialParams::new(1000.0, 5.0, 500.0, 0.5)).unwrap();
        Simulation::new(
            SimulationConfig {
                dimension: Dimension::Two,
                dt: 0.001,
                ..SimulationConfig::default()
            },
            materials,
            LawTable::default(),
        )
        .unwrap()
    }

    #[test]
    fn laws_are_locked_after_first_step() {
        let mut sim = simulation();
        sim.add_particle(Particle::new(DVec3::ZERO, 1.0, 1.0)).unwrap();
        sim.register_law(0, 0, ContactLaw::HERTZIAN).unwrap();
        sim.step().unwrap();
        assert!(matches!(sim.register_law(0, 0, ContactLaw::LINEAR), Err(DemError::ConfigLocked)));
        assert!(matches!(
            sim.register_material(1, MaterialParams::new(1.0, 0.0, 0.0, 0.0)),
            Err(DemError::ConfigLocked)
        ));
    }

    #[test]
    fn unknown_material_is_rejected_on_add() {
        let mut sim = simulation();
        assert!(matches!(
            sim.add_particle(Particle::new(DVec3::ZERO, 1.0, 1.0).with_material(4)),
            Err(DemError::InvalidMaterial(4))
        ));
        assert!(sim.particles().is_empty());
    }

    #[test]
    fn apply_force_checks_index() {
        let mut sim = simulation();
        sim.add_particle(Particle::new(DVec3::ZERO, 1.0, 1.0)).unwrap();
        assert!(matches!(
            sim.apply_force(3, DVec3::X),
            Err(DemError::IndexError { index: 3, count: 1 })
        ));
    }

    #[test]
    fn run_takes_snapshots_at_interval() {
        let mut sim = simulation();
        sim.add_particle(Particle::new(DVec3::ZERO, 1.0, 1.0)).unwrap();
        let mut seen = 0;
        let snapshots = sim.run(10, 3, |_| seen += 1).unwrap();
        assert_eq!(seen, 3);
        let steps: Vec<u64> = snapshots.iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![3, 6, 9]);
        assert_eq!(sim.state().step, 10);
        assert!(matches!(sim.run(1, 0, |_| {}), Err(DemError::InvalidConfig(_))));
    }

    #[test]
    fn bonds_check_indices_and_invalidate_loads() {
        let mut sim = simulation();
        sim.add_particle(Particle::new(DVec3::ZERO, 0.5, 1.0)).unwrap();
        sim.add_particle(Particle::new(DVec3::new(3.0, 0.0, 0.0), 0.5, 1.0)).unwrap();
        sim.step().unwrap();
        assert!(sim.state().net_loads().is_some());

        assert_eq!(sim.add_bond(0, 1, 10.0, Some(2.0)).unwrap(), 0);
        assert!(sim.state().net_loads().is_none());
        assert_eq!(sim.add_dashpot(1, 0, 1.0).unwrap(), 0);
        assert!(matches!(
            sim.add_bond(0, 2, 10.0, None),
            Err(DemError::IndexError { index: 2, count: 2 })
        ));
        assert_eq!(diagnostics::coordination(sim.state()), vec![2, 2]);
    }

    #[test]
    fn loaded_particle_far_from_support_is_not_relaxed() {
        let mut materials = MaterialTable::new();
        materials.insert(0, MaterialParams::new(1000.0, 5.0, 500.0, 0.5)).unwrap();
        let mut sim = Simulation::new(
            SimulationConfig {
                dimension: Dimension::Two,
                gravity: [0.0; 3],
                ..SimulationConfig::default()
            },
            materials,
            LawTable::default(),
        )
        .unwrap();
        sim.add_particle(Particle::new(DVec3::ZERO, 0.5, 1.0).fixed()).unwrap();
        sim.add_particle(Particle::new(DVec3::new(0.0, 1.5, 0.0), 0.5, 1.0)).unwrap();
        sim.apply_force(1, DVec3::new(0.0, -1e-3, 0.0)).unwrap();

        // The kinetic energy stays tiny while the disk accelerates, but nothing
        // balances the load yet.
        let outcome = sim.relax(1e-4, 1e-6, 50, 2_000).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 2_000);
        assert_eq!(sim.state().active_contacts().count(), 0);
        assert!(diagnostics::free_kinetic_energy(sim.state()) < 1e-6);
    }
}
