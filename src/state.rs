use crate::assembly::NetLoads;
use crate::bond::{BondForce, BondSet};
use crate::contact::{ContactForce, ContactMap};
use crate::neighbor::NeighborList;
use crate::particle::ParticleStore;

/// Everything that changes from one step to the next.
///
/// Besides particles, contact history, bonds, time and step count this carries the
/// neighbor list and the forces evaluated at the current positions, which the
/// next half-kick needs.
#[derive(Clone, Debug)]
pub struct SimulationState {
    pub particles: ParticleStore,
    pub contacts: ContactMap,
    pub(crate) bonds: BondSet,
    pub time: f64,
    pub step: u64,
    pub(crate) neighbors: NeighborList,
    pub(crate) loads: Option<NetLoads>,
    pub(crate) contact_forces: Vec<ContactForce>,
    pub(crate) bond_forces: Vec<BondForce>,
}

impl SimulationState {
    pub fn new(particles: ParticleStore, skin: f64) -> Self {
        Self {
            particles,
            contacts: ContactMap::new(),
            bonds: BondSet::new(),
            time: 0.0,
            step: 0,
            neighbors: NeighborList::new(skin),
            loads: None,
            contact_forces: Vec::new(),
            bond_forces: Vec::new(),
        }
    }

    pub fn neighbors(&self) -> &NeighborList {
        &self.neighbors
    }

    /// Net loads at the current positions, once they have been evaluated.
    pub fn net_loads(&self) -> Option<&NetLoads> {
        self.loads.as_ref()
    }

    /// Contact evaluations of the candidate pairs at the current positions.
    pub fn contact_forces(&self) -> &[ContactForce] {
        &self.contact_forces
    }

    pub fn bonds(&self) -> &BondSet {
        &self.bonds
    }

    /// Spring and dashpot forces at the current positions and velocities.
    pub fn bond_forces(&self) -> &[BondForce] {
        &self.bond_forces
    }

    pub fn active_contacts(&self) -> impl Iterator<Item = &ContactForce> {
        self.contact_forces.iter().filter(|c| c.in_contact())
    }

    /// Drops cached forces after the particles were edited outside a step.
    pub fn invalidate(&mut self) {
        self.loads = None;
    }
}
