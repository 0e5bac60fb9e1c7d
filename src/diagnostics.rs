//! Scalar diagnostics computed from a [`SimulationState`] without mutating it.

use std::collections::VecDeque;

use glam::{DMat3, DVec3};

use crate::state::SimulationState;

/// Diagnostic scalars reported after each step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Diagnostics {
    pub step: u64,
    pub time: f64,
    pub kinetic_energy: f64,
    pub contact_energy: f64,
    pub bond_energy: f64,
    pub gravitational_energy: f64,
    /// `|sum F_net|` over all particles.
    pub residual: f64,
    /// `|sum (f_a + f_b)|` over contacts; zero up to round-off.
    pub contact_force_balance: f64,
    pub active_contacts: usize,
    pub max_overlap: f64,
}

impl Diagnostics {
    pub fn compute(state: &SimulationState, gravity: DVec3) -> Self {
        Self {
            step: state.step,
            time: state.time,
            kinetic_energy: kinetic_energy(state),
            contact_energy: contact_energy(state),
            bond_energy: bond_energy(state),
            gravitational_energy: gravitational_energy(state, gravity),
            residual: residual(state),
            contact_force_balance: contact_force_balance(state),
            active_contacts: state.active_contacts().count(),
            max_overlap: state.active_contacts().map(|c| c.overlap).fold(0.0, f64::max),
        }
    }

    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy + self.contact_energy + self.bond_energy + self.gravitational_energy
    }
}

/// `sum 0.5 m |v|^2 + 0.5 I |w|^2`.
pub fn kinetic_energy(state: &SimulationState) -> f64 {
    let p = &state.particles;
    p.velocities()
        .iter()
        .zip(p.angular_velocities())
        .zip(p.masses().iter().zip(p.inertias()))
        .map(|((v, w), (m, i))| 0.5 * m * v.length_squared() + 0.5 * i * w.length_squared())
        .sum()
}

/// Kinetic energy of the particles that are free to move.
pub fn free_kinetic_energy(state: &SimulationState) -> f64 {
    let p = &state.particles;
    p.iter()
        .filter(|v| !v.fixed)
        .map(|v| 0.5 * v.mass * v.velocity.length_squared() + 0.5 * v.inertia * v.angular_velocity.length_squared())
        .sum()
}

/// Elastic energy stored in normal and tangential contact springs.
pub fn contact_energy(state: &SimulationState) -> f64 {
    state.active_contacts().map(|c| c.potential_energy).sum()
}

/// Elastic energy stored in bond springs.
pub fn bond_energy(state: &SimulationState) -> f64 {
    state.bond_forces().iter().map(|b| b.potential_energy).sum()
}

/// `-sum m g . x`, zero at the origin.
pub fn gravitational_energy(state: &SimulationState, gravity: DVec3) -> f64 {
    let p = &state.particles;
    p.positions().iter().zip(p.masses()).map(|(x, m)| -m * gravity.dot(*x)).sum()
}

/// Norm of the summed net force. Zero before forces were first evaluated.
pub fn residual(state: &SimulationState) -> f64 {
    match state.net_loads() {
        Some(loads) => loads.forces.iter().copied().sum::<DVec3>().length(),
        None => 0.0,
    }
}

pub fn contact_force_balance(state: &SimulationState) -> f64 {
    state
        .contact_forces()
        .iter()
        .map(|c| c.force_on_a + c.force_on_b)
        .sum::<DVec3>()
        .length()
}

/// Number of active contacts, springs and dashpots per particle.
pub fn coordination(state: &SimulationState) -> Vec<usize> {
    let mut counts = vec![0; state.particles.count()];
    for c in state.active_contacts() {
        counts[c.pair.i] += 1;
        counts[c.pair.j] += 1;
    }
    state.bonds().count_per_particle(&mut counts);
    counts
}

/// Out-of-balance force of the free particles, `sum |F_net|`, divided by the
/// external load `sum |m g + F_applied|` when that is non-zero.
pub fn relative_residual(state: &SimulationState, gravity: DVec3) -> f64 {
    let Some(loads) = state.net_loads() else {
        return 0.0;
    };
    let p = &state.particles;
    let mut unbalanced = 0.0;
    let mut external = 0.0;
    for i in 0..p.count() {
        if p.fixed_flags()[i] {
            continue;
        }
        unbalanced += loads.forces[i].length();
        external += (p.masses()[i] * gravity + p.applied_forces[i]).length();
    }
    if external > 0.0 {
        unbalanced / external
    } else {
        unbalanced
    }
}

/// Love-Weber average stress over `volume`, compression positive:
/// `sigma = (1/V) sum_c l_c (x) f_c` with `l_c` the branch vector from `a` to `b`
/// and `f_c` the force on `b`. Contacts and bonds both contribute.
pub fn stress_tensor(state: &SimulationState, volume: f64) -> DMat3 {
    let positions = state.particles.positions();
    let pair_forces = state
        .active_contacts()
        .map(|c| (c.pair, c.force_on_b))
        .chain(state.bond_forces().iter().map(|b| (b.pair, b.force_on_b)));
    let mut sigma = DMat3::ZERO;
    for (pair, f) in pair_forces {
        let l = positions[pair.j] - positions[pair.i];
        sigma += DMat3::from_cols(l * f.x, l * f.y, l * f.z);
    }
    sigma * (1.0 / volume)
}

/// Tracks the last `n` residuals; converged once all of them are below tolerance.
#[derive(Clone, Debug)]
pub struct ConvergenceMonitor {
    residuals: VecDeque<f64>,
    capacity: usize,
}

impl ConvergenceMonitor {
    pub fn new(n: usize) -> Self {
        let capacity = n.max(1);
        Self {
            residuals: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Forgets all recorded residuals.
    pub fn reset(&mut self) {
        self.residuals.clear();
    }

    pub fn update(&mut self, residual: f64, tol: f64) -> bool {
        if self.residuals.len() == self.capacity {
            self.residuals.pop_front();
        }
        self.residuals.push_back(residual);
        self.residuals.len() == self.capacity && self.residuals.iter().all(|r| *r < tol)
    }
}
