use glam::DVec3;

use crate::bond::BondForce;
use crate::contact::ContactForce;
use crate::particle::ParticleStore;

/// Net force and torque per particle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetLoads {
    pub forces: Vec<DVec3>,
    pub torques: Vec<DVec3>,
}

impl NetLoads {
    pub fn zeros(n: usize) -> Self {
        Self {
            forces: vec![DVec3::ZERO; n],
            torques: vec![DVec3::ZERO; n],
        }
    }

    pub fn len(&self) -> usize {
        self.forces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }
}

/// Sums contact forces, bond forces, gravity and applied loads into
/// per-particle totals.
///
/// Forces are added in the order given; callers pass contacts sorted by
/// pair so that the result is reproducible.
pub fn assemble(
    particles: &ParticleStore,
    contact_forces: &[ContactForce],
    bond_forces: &[BondForce],
    gravity: DVec3,
) -> NetLoads {
    let n = particles.count();
    let mut loads = NetLoads::zeros(n);

    for (i, force) in loads.forces.iter_mut().enumerate() {
        *force = particles.masses[i] * gravity + particles.applied_forces[i];
    }

    for c in contact_forces {
        loads.forces[c.pair.i] += c.force_on_a;
        loads.forces[c.pair.j] += c.force_on_b;
        loads.torques[c.pair.i] += c.torque_on_a;
        loads.torques[c.pair.j] += c.torque_on_b;
    }

    for b in bond_forces {
        loads.forces[b.pair.i] += b.force_on_a;
        loads.forces[b.pair.j] += b.force_on_b;
    }

    loads
}
