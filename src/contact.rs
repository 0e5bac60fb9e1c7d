use dashmap::DashMap;
use glam::DVec3;

/// Unordered particle pair, stored as `(min, max)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactPair {
    pub i: usize,
    pub j: usize,
}

impl ContactPair {
    pub fn new(a: usize, b: usize) -> Self {
        debug_assert_ne!(a, b, "a particle cannot contact itself");
        if a < b {
            Self { i: a, j: b }
        } else {
            Self { i: b, j: a }
        }
    }
}

/// Persistent history of one contact.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContactState {
    pub tangential_displacement: DVec3, // Accumulated slip
    pub active: bool,
    pub age: u64, // Number of steps in contact
}

impl ContactState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Separation reset: history is zeroed and the contact goes inactive.
    pub fn reset(&mut self) {
        self.tangential_displacement = DVec3::ZERO;
        self.active = false;
        self.age = 0;
    }
}

/// Contact history keyed by pair. Each entry is owned by exactly one pair, so
/// concurrent evaluation of distinct pairs needs no further locking.
pub type ContactMap = DashMap<ContactPair, ContactState>;

/// Tangential regime reported by a contact evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Regime {
    /// No overlap, no force.
    Separated,
    /// In contact, tangential law without history or zero friction force.
    Frictionless,
    Stick,
    Slip,
}

/// Output of one contact law evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactForce {
    pub pair: ContactPair,
    pub force_on_a: DVec3,
    pub force_on_b: DVec3,
    pub torque_on_a: DVec3,
    pub torque_on_b: DVec3,
    /// Unit vector from `a` to `b`.
    pub normal: DVec3,
    pub overlap: f64,
    pub normal_force: f64,
    pub tangential_force: DVec3,
    /// Elastic energy stored in the contact springs.
    pub potential_energy: f64,
    pub regime: Regime,
}

impl ContactForce {
    pub fn separated(pair: ContactPair, normal: DVec3, overlap: f64) -> Self {
        Self {
            pair,
            force_on_a: DVec3::ZERO,
            force_on_b: DVec3::ZERO,
            torque_on_a: DVec3::ZERO,
            torque_on_b: DVec3::ZERO,
            normal,
            overlap,
            normal_force: 0.0,
            tangential_force: DVec3::ZERO,
            potential_energy: 0.0,
            regime: Regime::Separated,
        }
    }

    pub fn in_contact(&self) -> bool {
        self.regime != Regime::Separated
    }
}

/// Deletes history for pairs that left the neighbor list. `pairs` must be sorted.
pub fn evict_stale(contacts: &ContactMap, pairs: &[ContactPair]) -> usize {
    let before = contacts.len();
    contacts.retain(|key, _| pairs.binary_search(key).is_ok());
    before - contacts.len()
}
