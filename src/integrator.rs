//! Explicit time stepping.
//!
//! Translation uses velocity Verlet in kick-drift-kick form:
//!
//! ```text
//! 1. v(t + dt/2) = v(t) + dt/2 * F(t) / m
//! 2. x(t + dt)   = x(t) + dt * v(t + dt/2)
//! 3. F(t + dt)   from the neighbor list, contact laws and assembler
//! 4. v(t + dt)   = v(t + dt/2) + dt/2 * F(t + dt) / m
//! ```
//!
//! Angular velocity gets the same two half kicks from torque over inertia.
//! Orientation is not tracked. Fixed particles keep their prescribed
//! velocities and still drift with them.

use glam::DVec3;
use rayon::prelude::*;

use crate::assembly::{assemble, NetLoads};
use crate::config::{validate_dt, SimulationConfig};
use crate::contact::{evict_stale, ContactForce};
use crate::error::{DemError, Quantity, Result};
use crate::particle::{Dimension, ParticleStore};
use crate::physics::ContactModel;
use crate::state::SimulationState;

/// Why the integrator stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HaltReason {
    pub step: u64,
    pub particle: usize,
    pub quantity: Quantity,
}

impl HaltReason {
    fn to_error(self) -> DemError {
        DemError::NumericalInstability {
            step: self.step,
            particle: self.particle,
            quantity: self.quantity,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegratorStatus {
    Running,
    Halted(HaltReason),
}

pub struct Integrator {
    config: SimulationConfig,
    pub(crate) model: ContactModel,
    gravity: DVec3,
    status: IntegratorStatus,
}

impl Integrator {
    pub fn new(config: SimulationConfig, model: ContactModel) -> Result<Self> {
        config.validate()?;
        let mut gravity = config.gravity();
        if config.dimension == Dimension::Two {
            gravity.z = 0.0;
        }
        Ok(Self {
            config,
            model,
            gravity,
            status: IntegratorStatus::Running,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn model(&self) -> &ContactModel {
        &self.model
    }

    pub fn gravity(&self) -> DVec3 {
        self.gravity
    }

    pub fn status(&self) -> IntegratorStatus {
        self.status
    }

    pub fn initial_state(&self, particles: ParticleStore) -> SimulationState {
        SimulationState::new(particles, self.config.skin)
    }

    /// Advances `state` in place. On numerical blow-up the integrator halts and
    /// `state` is left exactly as it was; every later call fails the same way.
    pub fn advance(&mut self, state: &mut SimulationState, dt: f64) -> Result<()> {
        if let IntegratorStatus::Halted(reason) = self.status {
            return Err(reason.to_error());
        }
        match self.step(state, dt) {
            Ok(next) => {
                *state = next;
                Ok(())
            }
            Err(DemError::NumericalInstability { step, particle, quantity }) => {
                let reason = HaltReason { step, particle, quantity };
                log::error!("integrator halted: non-finite {} on particle {} at step {}", quantity, particle, step);
                self.status = IntegratorStatus::Halted(reason);
                Err(reason.to_error())
            }
            Err(e) => Err(e),
        }
    }

    /// One step as a pure function of the input state.
    pub fn step(&self, state: &SimulationState, dt: f64) -> Result<SimulationState> {
        validate_dt(dt)?;
        if dt == 0.0 {
            return Ok(state.clone());
        }

        let mut next = state.clone();
        let step_index = next.step + 1;

        let loads = match next.loads.take() {
            Some(loads) if loads.len() == next.particles.count() => loads,
            _ => self.compute_loads(&mut next, 0.0)?,
        };

        // (1) half kick, (2) drift
        kick(&mut next.particles, &loads, 0.5 * dt);
        drift(&mut next.particles, dt);
        check_finite(next.particles.positions(), step_index, Quantity::Position)?;

        // (3) forces at the new positions
        let loads = self.compute_loads(&mut next, dt)?;
        check_finite(&loads.forces, step_index, Quantity::Force)?;
        check_finite(&loads.torques, step_index, Quantity::Torque)?;

        // (4) second half kick
        kick(&mut next.particles, &loads, 0.5 * dt);
        check_finite(next.particles.velocities(), step_index, Quantity::Velocity)?;
        check_finite(next.particles.angular_velocities(), step_index, Quantity::AngularVelocity)?;

        next.loads = Some(loads);
        next.time += dt;
        next.step = step_index;
        Ok(next)
    }

    /// Neighbor update, contact and bond evaluation and assembly at the current positions.
    ///
    /// `dt` is the history increment for tangential laws; zero leaves stored
    /// displacements where they are.
    pub(crate) fn compute_loads(&self, state: &mut SimulationState, dt: f64) -> Result<NetLoads> {
        if state.neighbors.needs_rebuild(&state.particles) {
            let pairs = state.neighbors.rebuild(&state.particles, self.config.cell_size);
            let evicted = evict_stale(&state.contacts, pairs);
            if evicted > 0 {
                log::debug!("evicted {} contact histories", evicted);
            }
        }

        let forces = self.evaluate_contacts(state, dt)?;
        let bond_forces = state.bonds.evaluate(&state.particles);
        let loads = assemble(&state.particles, &forces, &bond_forces, self.gravity);
        state.contact_forces = forces;
        state.bond_forces = bond_forces;
        Ok(loads)
    }

    fn evaluate_contacts(&self, state: &SimulationState, dt: f64) -> Result<Vec<ContactForce>> {
        let particles = &state.particles;
        let contacts = &state.contacts;
        let model = &self.model;

        state
            .neighbors
            .pairs()
            .par_iter()
            .map(|&pair| {
                let a = particles.view(pair.i);
                let b = particles.view(pair.j);
                let existing = contacts.get(&pair).map(|c| *c);
                let mut contact = existing.unwrap_or_default();
                let force = model.evaluate(pair, &a, &b, &mut contact, dt)?;
                // History is created on first overlap and reset, not dropped, on separation
                if force.in_contact() || existing.is_some() {
                    contacts.insert(pair, contact);
                }
                Ok(force)
            })
            .collect()
    }
}

fn kick(particles: &mut ParticleStore, loads: &NetLoads, half_dt: f64) {
    let masses = &particles.masses;
    let inertias = &particles.inertias;
    let fixed = &particles.fixed;

    particles.velocities.par_iter_mut().enumerate().for_each(|(i, v)| {
        if !fixed[i] {
            *v += half_dt * loads.forces[i] / masses[i];
        }
    });
    particles.angular_velocities.par_iter_mut().enumerate().for_each(|(i, w)| {
        if !fixed[i] {
            *w += half_dt * loads.torques[i] / inertias[i];
        }
    });
}

fn drift(particles: &mut ParticleStore, dt: f64) {
    let velocities = &particles.velocities;
    particles.positions.par_iter_mut().zip(velocities.par_iter()).for_each(|(x, v)| {
        *x += dt * *v;
    });
}

fn check_finite(values: &[DVec3], step: u64, quantity: Quantity) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(particle) => Err(DemError::NumericalInstability { step, particle, quantity }),
        None => Ok(()),
    }
}
