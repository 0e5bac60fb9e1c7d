//! Permanent pair interactions: linear springs and viscous dashpots between
//! listed particle pairs. Unlike contacts they act regardless of overlap.

use glam::DVec3;
use rayon::prelude::*;

use crate::contact::ContactPair;
use crate::error::{DemError, Result};
use crate::particle::ParticleStore;

/// Linear spring `f = k (D - D0) dx / D`, pulling the pair back to `rest_length`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bond {
    pub pair: ContactPair,
    pub stiffness: f64,
    pub rest_length: f64,
}

/// Viscous link `f = eta (v_b - v_a)` on `a`, opposite on `b`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dashpot {
    pub pair: ContactPair,
    pub viscosity: f64,
}

/// Force of one bond or dashpot on its two particles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BondForce {
    pub pair: ContactPair,
    pub force_on_a: DVec3,
    pub force_on_b: DVec3,
    /// `0.5 k (D - D0)^2` for springs, zero for dashpots.
    pub potential_energy: f64,
}

impl Bond {
    pub fn evaluate(&self, particles: &ParticleStore) -> BondForce {
        let positions = particles.positions();
        let dx = positions[self.pair.j] - positions[self.pair.i];
        let length = dx.length();
        let stretch = length - self.rest_length;
        // Coincident centers have no direction to pull along
        let force_on_a = if length > 1e-12 {
            self.stiffness * stretch * dx / length
        } else {
            DVec3::ZERO
        };
        BondForce {
            pair: self.pair,
            force_on_a,
            force_on_b: -force_on_a,
            potential_energy: 0.5 * self.stiffness * stretch * stretch,
        }
    }
}

impl Dashpot {
    pub fn evaluate(&self, particles: &ParticleStore) -> BondForce {
        let velocities = particles.velocities();
        let force_on_a = self.viscosity * (velocities[self.pair.j] - velocities[self.pair.i]);
        BondForce {
            pair: self.pair,
            force_on_a,
            force_on_b: -force_on_a,
            potential_energy: 0.0,
        }
    }
}

/// All springs and dashpots of an assembly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BondSet {
    springs: Vec<Bond>,
    dashpots: Vec<Dashpot>,
}

impl BondSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn springs(&self) -> &[Bond] {
        &self.springs
    }

    pub fn dashpots(&self) -> &[Dashpot] {
        &self.dashpots
    }

    pub fn is_empty(&self) -> bool {
        self.springs.is_empty() && self.dashpots.is_empty()
    }

    /// Adds a spring between `a` and `b`. `rest_length` defaults to their
    /// current distance.
    pub fn add_spring(
        &mut self,
        particles: &ParticleStore,
        a: usize,
        b: usize,
        stiffness: f64,
        rest_length: Option<f64>,
    ) -> Result<usize> {
        let pair = checked_pair(particles, a, b)?;
        if !stiffness.is_finite() || stiffness < 0.0 {
            return Err(DemError::InvalidConfig(format!("bond stiffness must be >= 0, got {}", stiffness)));
        }
        let positions = particles.positions();
        let rest_length = rest_length.unwrap_or_else(|| (positions[b] - positions[a]).length());
        if !rest_length.is_finite() || rest_length < 0.0 {
            return Err(DemError::InvalidConfig(format!("bond rest length must be >= 0, got {}", rest_length)));
        }
        self.springs.push(Bond {
            pair,
            stiffness,
            rest_length,
        });
        Ok(self.springs.len() - 1)
    }

    pub fn add_dashpot(&mut self, particles: &ParticleStore, a: usize, b: usize, viscosity: f64) -> Result<usize> {
        let pair = checked_pair(particles, a, b)?;
        if !viscosity.is_finite() || viscosity < 0.0 {
            return Err(DemError::InvalidConfig(format!("dashpot viscosity must be >= 0, got {}", viscosity)));
        }
        self.dashpots.push(Dashpot { pair, viscosity });
        Ok(self.dashpots.len() - 1)
    }

    /// Springs first, then dashpots, each in insertion order.
    pub fn evaluate(&self, particles: &ParticleStore) -> Vec<BondForce> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut forces: Vec<BondForce> = self.springs.par_iter().map(|s| s.evaluate(particles)).collect();
        forces.par_extend(self.dashpots.par_iter().map(|d| d.evaluate(particles)));
        forces
    }

    /// Springs and dashpots attached to each particle.
    pub(crate) fn count_per_particle(&self, counts: &mut [usize]) {
        let pairs = self
            .springs
            .iter()
            .map(|s| s.pair)
            .chain(self.dashpots.iter().map(|d| d.pair));
        for pair in pairs {
            counts[pair.i] += 1;
            counts[pair.j] += 1;
        }
    }
}

fn checked_pair(particles: &ParticleStore, a: usize, b: usize) -> Result<ContactPair> {
    let count = particles.count();
    for index in [a, b] {
        if index >= count {
            return Err(DemError::IndexError { index, count });
        }
    }
    if a == b {
        return Err(DemError::InvalidConfig(format!("particle {} cannot be bonded to itself", a)));
    }
    Ok(ContactPair::new(a, b))
}
