use std::collections::HashMap;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::contact::{ContactForce, ContactPair, ContactState, Regime};
use crate::error::Result;
use crate::material::{effective_radius, pair_key, MaterialId, MaterialParams, MaterialTable};
use crate::particle::ParticleView;

/// Tangential speeds below this are treated as zero when picking a sliding direction.
const SLIP_DIRECTION_EPS: f64 = 1e-12;

/// Available normal force models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalForceModel {
    /// Linear Spring-Dashpot model.
    LinearSpringDashpot,
    /// Hertzian elastic contact with overlap-dependent damping.
    Hertzian,
}

/// Available tangential force models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TangentialForceModel {
    /// No tangential force.
    Frictionless,
    /// Kinetic Coulomb friction without history.
    Coulomb,
    /// Linear spring with Coulomb limit and persistent displacement.
    LinearSpringCoulomb,
}

/// A contact law: one normal model paired with one tangential model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactLaw {
    pub normal: NormalForceModel,
    pub tangential: TangentialForceModel,
}

impl ContactLaw {
    /// Plain elastic linear spring-dashpot.
    pub const LINEAR: ContactLaw = ContactLaw {
        normal: NormalForceModel::LinearSpringDashpot,
        tangential: TangentialForceModel::Frictionless,
    };

    pub const HERTZIAN: ContactLaw = ContactLaw {
        normal: NormalForceModel::Hertzian,
        tangential: TangentialForceModel::Frictionless,
    };

    /// Linear normal law with Coulomb friction that keeps contact history.
    pub const FRICTION: ContactLaw = ContactLaw {
        normal: NormalForceModel::LinearSpringDashpot,
        tangential: TangentialForceModel::LinearSpringCoulomb,
    };

    pub fn new(normal: NormalForceModel, tangential: TangentialForceModel) -> Self {
        Self { normal, tangential }
    }

    /// Evaluates the contact between `a` and `b`.
    ///
    /// `state` is the pair's history. It is reset when the particles are
    /// separated and updated in place otherwise.
    pub fn evaluate(
        &self,
        pair: ContactPair,
        a: &ParticleView,
        b: &ParticleView,
        state: &mut ContactState,
        params: &MaterialParams,
        dt: f64,
    ) -> ContactForce {
        let dist_vec = b.position - a.position;
        let dist = dist_vec.length();
        let normal = if dist > 1e-12 { dist_vec / dist } else { DVec3::Y };
        let overlap = a.radius + b.radius - dist;

        if overlap < 0.0 {
            state.reset();
            return ContactForce::separated(pair, normal, overlap);
        }

        // Velocities of the two surface points at the contact
        let va = a.velocity + a.angular_velocity.cross(a.radius * normal);
        let vb = b.velocity + b.angular_velocity.cross(-b.radius * normal);
        let rel_vel = vb - va;
        let vn = rel_vel.dot(normal);
        let vt = rel_vel - vn * normal;

        let r_star = effective_radius(a.radius, b.radius);
        let (fn_mag, normal_energy) = match self.normal {
            NormalForceModel::LinearSpringDashpot => {
                linear_spring_dashpot(overlap, vn, params.normal_stiffness, params.normal_damping)
            }
            NormalForceModel::Hertzian => {
                hertzian_contact(overlap, vn, r_star, params.normal_stiffness, params.normal_damping)
            }
        };

        let (ft, regime) = match self.tangential {
            TangentialForceModel::Frictionless => (DVec3::ZERO, Regime::Frictionless),
            TangentialForceModel::Coulomb => coulomb_friction(fn_mag, vt, params.friction_coefficient),
            TangentialForceModel::LinearSpringCoulomb => linear_spring_coulomb(
                fn_mag,
                vt,
                normal,
                state,
                params.tangential_stiffness,
                params.friction_coefficient,
                dt,
            ),
        };
        let tangential_energy = match self.tangential {
            TangentialForceModel::LinearSpringCoulomb => {
                0.5 * params.tangential_stiffness * state.tangential_displacement.length_squared()
            }
            _ => 0.0,
        };

        state.active = true;
        if dt > 0.0 {
            state.age += 1;
        }

        let force_on_a = -fn_mag * normal + ft;
        let force_on_b = -force_on_a;

        ContactForce {
            pair,
            force_on_a,
            force_on_b,
            torque_on_a: (a.radius * normal).cross(ft),
            torque_on_b: (-b.radius * normal).cross(-ft),
            normal,
            overlap,
            normal_force: fn_mag,
            tangential_force: ft,
            potential_energy: normal_energy + tangential_energy,
            regime,
        }
    }
}

impl Default for ContactLaw {
    fn default() -> Self {
        ContactLaw::FRICTION
    }
}

/// Normal force magnitude and stored energy of a linear spring-dashpot.
///
/// `vn` is the relative normal velocity, positive when separating. The
/// damping term never makes the force attractive.
pub fn linear_spring_dashpot(overlap: f64, vn: f64, kn: f64, cn: f64) -> (f64, f64) {
    let fn_mag = (kn * overlap - cn * vn).max(0.0);
    (fn_mag, 0.5 * kn * overlap * overlap)
}

/// Normal force magnitude and stored energy of a Hertzian contact.
///
/// The elastic part is `kn sqrt(R*) delta^(3/2)` where `kn` plays the role of
/// `4/3 E*`. Damping scales with the contact radius `sqrt(R* delta)`.
pub fn hertzian_contact(overlap: f64, vn: f64, r_star: f64, kn: f64, cn: f64) -> (f64, f64) {
    if overlap <= 0.0 {
        return (0.0, 0.0);
    }
    let stiffness = kn * r_star.sqrt();
    let force_elastic = stiffness * overlap.powf(1.5);
    let force_damping = -cn * (r_star * overlap).sqrt() * vn;
    let energy = 0.4 * stiffness * overlap.powf(2.5);
    ((force_elastic + force_damping).max(0.0), energy)
}

// Tangential Forces

/// Kinetic Coulomb limit, directed along the relative sliding velocity.
pub fn coulomb_friction(normal_force_mag: f64, vt: DVec3, mu: f64) -> (DVec3, Regime) {
    if vt.length_squared() < SLIP_DIRECTION_EPS * SLIP_DIRECTION_EPS {
        return (DVec3::ZERO, Regime::Frictionless);
    }
    (mu * normal_force_mag * vt.normalize(), Regime::Slip)
}

/// Linear spring with Coulomb limit.
///
/// Integrates the sliding velocity into the stored displacement, sticks while
/// `k_t |s| <= mu Fn` and slips otherwise, rescaling `s` onto the bound. When
/// slipping with no sliding velocity the force follows the stored displacement.
pub fn linear_spring_coulomb(
    normal_force_mag: f64,
    vt: DVec3,
    normal: DVec3,
    contact: &mut ContactState,
    kt: f64,
    mu: f64,
    dt: f64,
) -> (DVec3, Regime) {
    let mut s = rotate_into_plane(contact.tangential_displacement, normal);
    s += vt * dt;

    // Trial force
    let ft_trial = kt * s;
    let ft_mag = ft_trial.length();
    let f_coulomb = mu * normal_force_mag;

    if ft_mag <= f_coulomb {
        contact.tangential_displacement = s;
        return (ft_trial, Regime::Stick);
    }

    // Slip: rescale the stored displacement onto the Coulomb bound
    s *= f_coulomb / ft_mag;
    contact.tangential_displacement = s;

    let direction = if vt.length_squared() > SLIP_DIRECTION_EPS * SLIP_DIRECTION_EPS {
        vt.normalize()
    } else {
        ft_trial / ft_mag
    };
    (f_coulomb * direction, Regime::Slip)
}

/// Projects stored displacement onto the current tangent plane, keeping its length.
fn rotate_into_plane(s: DVec3, normal: DVec3) -> DVec3 {
    let len = s.length();
    if len == 0.0 {
        return s;
    }
    let projected = s - s.dot(normal) * normal;
    let projected_len = projected.length();
    if projected_len == 0.0 {
        DVec3::ZERO
    } else if projected_len == len {
        projected
    } else {
        projected * (len / projected_len)
    }
}

/// Contact law selection per material pair.
#[derive(Clone, Debug, Default)]
pub struct LawTable {
    default: ContactLaw,
    overrides: HashMap<(MaterialId, MaterialId), ContactLaw>,
}

impl LawTable {
    pub fn new(default: ContactLaw) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn register(&mut self, a: MaterialId, b: MaterialId, law: ContactLaw) {
        self.overrides.insert(pair_key(a, b), law);
    }

    pub fn law_for(&self, a: MaterialId, b: MaterialId) -> ContactLaw {
        self.overrides.get(&pair_key(a, b)).copied().unwrap_or(self.default)
    }
}

/// Materials plus laws: everything needed to evaluate any pair.
#[derive(Clone, Debug, Default)]
pub struct ContactModel {
    pub materials: MaterialTable,
    pub laws: LawTable,
}

impl ContactModel {
    pub fn new(materials: MaterialTable, laws: LawTable) -> Self {
        Self { materials, laws }
    }

    /// Fails with `InvalidMaterial` when either particle's material is unknown.
    pub fn evaluate(
        &self,
        pair: ContactPair,
        a: &ParticleView,
        b: &ParticleView,
        state: &mut ContactState,
        dt: f64,
    ) -> Result<ContactForce> {
        let params = self.materials.pair(a.material, b.material)?;
        let law = self.laws.law_for(a.material, b.material);
        Ok(law.evaluate(pair, a, b, state, &params, dt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn view(id: usize, position: DVec3, velocity: DVec3) -> ParticleView {
        ParticleView {
            id,
            position,
            velocity,
            angular_velocity: DVec3::ZERO,
            radius: 1.0,
            mass: 1.0,
            inertia: 0.4,
            material: 0,
            fixed: false,
        }
    }

    fn floor_params() -> MaterialParams {
        MaterialParams::new(1000.0, 0.0, 500.0, 0.5)
    }

    /// Particle resting on a floor particle, pressed in by `overlap`.
    fn resting_pair(overlap: f64, lateral_velocity: f64) -> (ParticleView, ParticleView) {
        let floor = view(0, DVec3::ZERO, DVec3::ZERO);
        let top = view(1, DVec3::new(0.0, 2.0 - overlap, 0.0), DVec3::new(lateral_velocity, 0.0, 0.0));
        (floor, top)
    }

    #[test]
    fn separated_pair_has_zero_force_and_resets_history() {
        let a = view(0, DVec3::ZERO, DVec3::X);
        let b = view(1, DVec3::new(2.5, 0.0, 0.0), -DVec3::X);
        let mut state = ContactState {
            tangential_displacement: DVec3::new(0.0, 0.3, 0.0),
            active: true,
            age: 4,
        };
        for law in [ContactLaw::LINEAR, ContactLaw::HERTZIAN, ContactLaw::FRICTION] {
            let f = law.evaluate(ContactPair::new(0, 1), &a, &b, &mut state, &floor_params(), 0.001);
            assert_eq!(f.force_on_a, DVec3::ZERO);
            assert_eq!(f.force_on_b, DVec3::ZERO);
            assert_eq!(f.torque_on_a, DVec3::ZERO);
            assert_eq!(f.regime, Regime::Separated);
            assert!(f.overlap < 0.0);
        }
        assert_eq!(state, ContactState::new());
    }

    #[test]
    fn normal_force_is_repulsive() {
        let a = view(0, DVec3::ZERO, DVec3::ZERO);
        let b = view(1, DVec3::new(1.9, 0.0, 0.0), DVec3::ZERO);
        for law in [ContactLaw::LINEAR, ContactLaw::HERTZIAN] {
            let mut state = ContactState::new();
            let f = law.evaluate(ContactPair::new(0, 1), &a, &b, &mut state, &floor_params(), 0.001);
            assert!(f.force_on_a.x < 0.0);
            assert!(f.force_on_b.x > 0.0);
            assert!(state.active);
        }
    }

    #[test]
    fn third_law_holds_exactly() {
        let mut rng = fastrand::Rng::with_seed(11);
        for _ in 0..200 {
            let mut a = view(0, DVec3::ZERO, DVec3::new(rng.f64(), rng.f64(), rng.f64()));
            a.angular_velocity = DVec3::new(rng.f64() - 0.5, rng.f64() - 0.5, rng.f64() - 0.5);
            let dir = DVec3::new(rng.f64() - 0.5, rng.f64() - 0.5, rng.f64() - 0.5).normalize();
            let b = view(1, dir * (1.8 + 0.2 * rng.f64()), DVec3::new(-rng.f64(), rng.f64(), 0.0));
            let mut state = ContactState::new();
            let f = ContactLaw::FRICTION.evaluate(ContactPair::new(0, 1), &a, &b, &mut state, &floor_params(), 0.01);
            assert_eq!(f.force_on_b, -f.force_on_a);
        }
    }

    #[test]
    fn damping_never_makes_contact_adhesive() {
        let params = MaterialParams::new(1000.0, 50.0, 0.0, 0.0);
        // Separating fast with a tiny overlap
        let a = view(0, DVec3::ZERO, -DVec3::X * 5.0);
        let b = view(1, DVec3::new(1.999, 0.0, 0.0), DVec3::X * 5.0);
        for law in [ContactLaw::LINEAR, ContactLaw::HERTZIAN] {
            let mut state = ContactState::new();
            let f = law.evaluate(ContactPair::new(0, 1), &a, &b, &mut state, &params, 0.001);
            assert_eq!(f.normal_force, 0.0);
            assert_eq!(f.force_on_a, DVec3::ZERO);
        }
    }

    #[test]
    fn hertz_force_follows_three_halves_power() {
        let (f1, _) = hertzian_contact(0.01, 0.0, 0.5, 1000.0, 0.0);
        let (f2, _) = hertzian_contact(0.04, 0.0, 0.5, 1000.0, 0.0);
        assert_relative_eq!(f2 / f1, 8.0, epsilon = 1e-9);
    }

    #[test]
    fn sticks_below_coulomb_bound() {
        let (floor, top) = resting_pair(0.00981, 0.0);
        let params = floor_params();
        let mut state = ContactState {
            tangential_displacement: DVec3::new(0.005, 0.0, 0.0),
            active: true,
            age: 10,
        };
        let f = ContactLaw::FRICTION.evaluate(ContactPair::new(0, 1), &floor, &top, &mut state, &params, 0.0);
        assert_eq!(f.regime, Regime::Stick);
        assert_eq!(f.tangential_force, params.tangential_stiffness * DVec3::new(0.005, 0.0, 0.0));
        assert_eq!(state.tangential_displacement, DVec3::new(0.005, 0.0, 0.0));
        assert!(f.tangential_force.length() < params.friction_coefficient * f.normal_force);
    }

    #[test]
    fn lateral_perturbation_accumulates_while_sticking() {
        let (floor, top) = resting_pair(0.00981, 0.1);
        let params = floor_params();
        let mut state = ContactState::new();
        let f = ContactLaw::FRICTION.evaluate(ContactPair::new(0, 1), &floor, &top, &mut state, &params, 0.01);
        assert_eq!(f.regime, Regime::Stick);
        assert_relative_eq!(state.tangential_displacement.x, 0.001, epsilon = 1e-15);
        assert_relative_eq!(f.tangential_force.x, 0.5, epsilon = 1e-12);
        // Friction on the floor particle points along the top particle's motion
        assert!(f.force_on_a.x > 0.0);
        assert!(f.force_on_b.x < 0.0);
    }

    #[test]
    fn slips_and_clips_exactly_at_coulomb_bound() {
        let (floor, top) = resting_pair(0.00981, 0.0);
        let params = floor_params();
        let mut state = ContactState {
            tangential_displacement: DVec3::new(0.02, 0.0, 0.0),
            active: true,
            age: 10,
        };
        let f = ContactLaw::FRICTION.evaluate(ContactPair::new(0, 1), &floor, &top, &mut state, &params, 0.0);
        let bound = params.friction_coefficient * f.normal_force;
        assert_eq!(f.regime, Regime::Slip);
        assert_relative_eq!(f.tangential_force.length(), bound, epsilon = 1e-12);
        // Zero sliding velocity: direction follows the stored displacement
        assert!(f.tangential_force.x > 0.0);
        assert_relative_eq!(
            params.tangential_stiffness * state.tangential_displacement.length(),
            bound,
            epsilon = 1e-12
        );
    }

    #[test]
    fn transition_boundary_is_stick() {
        let (floor, top) = resting_pair(0.01, 0.0);
        let params = floor_params();
        let mut trial = ContactState::new();
        let fn_mag = ContactLaw::FRICTION
            .evaluate(ContactPair::new(0, 1), &floor, &top, &mut trial, &params, 0.0)
            .normal_force;
        let threshold = params.friction_coefficient * fn_mag / params.tangential_stiffness;

        let mut at = ContactState {
            tangential_displacement: DVec3::new(threshold * (1.0 - 1e-9), 0.0, 0.0),
            ..ContactState::new()
        };
        let f = ContactLaw::FRICTION.evaluate(ContactPair::new(0, 1), &floor, &top, &mut at, &params, 0.0);
        assert_eq!(f.regime, Regime::Stick);

        let mut over = ContactState {
            tangential_displacement: DVec3::new(threshold * (1.0 + 1e-9), 0.0, 0.0),
            ..ContactState::new()
        };
        let f = ContactLaw::FRICTION.evaluate(ContactPair::new(0, 1), &floor, &top, &mut over, &params, 0.0);
        assert_eq!(f.regime, Regime::Slip);
    }

    #[test]
    fn sliding_force_follows_sliding_velocity() {
        let (floor, top) = resting_pair(0.01, 0.0);
        let mut top = top;
        top.velocity = DVec3::new(0.0, 0.0, 3.0);
        let params = floor_params();
        let mut state = ContactState {
            tangential_displacement: DVec3::new(0.05, 0.0, 0.0),
            ..ContactState::new()
        };
        let f = ContactLaw::FRICTION.evaluate(ContactPair::new(0, 1), &floor, &top, &mut state, &params, 0.01);
        assert_eq!(f.regime, Regime::Slip);
        let dir = f.tangential_force.normalize();
        assert_relative_eq!(dir.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn coulomb_bound_holds_for_random_histories() {
        let mut rng = fastrand::Rng::with_seed(3);
        let params = MaterialParams::new(2000.0, 3.0, 800.0, 0.3);
        for _ in 0..500 {
            let a = view(0, DVec3::ZERO, DVec3::new(rng.f64() - 0.5, rng.f64() - 0.5, rng.f64() - 0.5));
            let dir = DVec3::new(rng.f64() - 0.5, rng.f64() - 0.5, rng.f64() - 0.5).normalize();
            let b = view(1, dir * (1.9 + 0.1 * rng.f64()), DVec3::new(rng.f64() - 0.5, rng.f64() - 0.5, 0.0));
            let mut state = ContactState {
                tangential_displacement: DVec3::new(rng.f64() - 0.5, rng.f64() - 0.5, rng.f64() - 0.5) * 0.1,
                ..ContactState::new()
            };
            let f = ContactLaw::FRICTION.evaluate(ContactPair::new(0, 1), &a, &b, &mut state, &params, 0.005);
            let bound = params.friction_coefficient * f.normal_force;
            assert!(f.tangential_force.length() <= bound + 1e-9);
            assert!(params.tangential_stiffness * state.tangential_displacement.length() <= bound + 1e-9);
        }
    }

    #[test]
    fn friction_torques_spin_both_particles_the_same_way() {
        let a = view(0, DVec3::ZERO, DVec3::ZERO);
        let b = view(1, DVec3::new(1.99, 0.0, 0.0), DVec3::new(0.0, 1.0, 0.0));
        let mut state = ContactState::new();
        let f = ContactLaw::FRICTION.evaluate(ContactPair::new(0, 1), &a, &b, &mut state, &floor_params(), 0.001);
        assert!(f.tangential_force.y > 0.0);
        assert!(f.torque_on_a.z > 0.0);
        assert!(f.torque_on_b.z > 0.0);
        assert_relative_eq!(f.torque_on_a.z, f.tangential_force.y * 1.0, epsilon = 1e-12);
    }

    #[test]
    fn kinetic_coulomb_has_no_history() {
        let (floor, top) = resting_pair(0.01, 0.2);
        let law = ContactLaw::new(NormalForceModel::LinearSpringDashpot, TangentialForceModel::Coulomb);
        let mut state = ContactState::new();
        let f = law.evaluate(ContactPair::new(0, 1), &floor, &top, &mut state, &floor_params(), 0.01);
        assert_eq!(f.regime, Regime::Slip);
        assert_relative_eq!(f.tangential_force.length(), 0.5 * f.normal_force, epsilon = 1e-12);
        assert_eq!(state.tangential_displacement, DVec3::ZERO);
    }

    #[test]
    fn age_counts_only_steps_that_advance_time() {
        let (floor, top) = resting_pair(0.00981, 0.1);
        let params = floor_params();
        let mut state = ContactState::new();
        let pair = ContactPair::new(0, 1);
        ContactLaw::FRICTION.evaluate(pair, &floor, &top, &mut state, &params, 0.0);
        assert!(state.active);
        assert_eq!(state.age, 0);
        ContactLaw::FRICTION.evaluate(pair, &floor, &top, &mut state, &params, 0.01);
        ContactLaw::FRICTION.evaluate(pair, &floor, &top, &mut state, &params, 0.0);
        assert_eq!(state.age, 1);
    }

    #[test]
    fn law_table_resolves_overrides_symmetrically() {
        let mut laws = LawTable::new(ContactLaw::LINEAR);
        laws.register(2, 1, ContactLaw::FRICTION);
        assert_eq!(laws.law_for(1, 2), ContactLaw::FRICTION);
        assert_eq!(laws.law_for(2, 1), ContactLaw::FRICTION);
        assert_eq!(laws.law_for(1, 1), ContactLaw::LINEAR);
    }

    #[test]
    fn unknown_material_fails_evaluation() {
        let model = ContactModel::default();
        let a = view(0, DVec3::ZERO, DVec3::ZERO);
        let b = view(1, DVec3::new(1.5, 0.0, 0.0), DVec3::ZERO);
        let mut state = ContactState::new();
        assert!(model.evaluate(ContactPair::new(0, 1), &a, &b, &mut state, 0.001).is_err());
    }
}
