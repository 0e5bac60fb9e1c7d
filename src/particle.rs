use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{DemError, Result};
use crate::material::MaterialId;

/// Spatial dimension of a run. 2D runs keep every z component at zero and
/// treat particles as disks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Dimension {
    #[serde(rename = "2d")]
    Two,
    #[default]
    #[serde(rename = "3d")]
    Three,
}

impl Dimension {
    /// Moment of inertia of a solid disk (2D) or sphere (3D).
    pub fn moment_of_inertia(self, mass: f64, radius: f64) -> f64 {
        match self {
            Dimension::Two => 0.5 * mass * radius * radius,
            Dimension::Three => 0.4 * mass * radius * radius,
        }
    }
}

/// Description of a particle handed to the store.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub position: DVec3,
    pub velocity: DVec3,
    pub angular_velocity: DVec3,
    pub radius: f64,
    pub mass: f64,
    /// Derived from the dimension when `None`.
    pub inertia: Option<f64>,
    pub material: MaterialId,
    /// Fixed particles keep their prescribed velocity.
    pub fixed: bool,
}

impl Particle {
    pub fn new(position: DVec3, radius: f64, mass: f64) -> Self {
        Self {
            position,
            velocity: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
            radius,
            mass,
            inertia: None,
            material: 0,
            fixed: false,
        }
    }

    pub fn with_velocity(mut self, velocity: DVec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: DVec3) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    pub fn with_material(mut self, material: MaterialId) -> Self {
        self.material = material;
        self
    }

    pub fn with_inertia(mut self, inertia: f64) -> Self {
        self.inertia = Some(inertia);
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }
}

/// Copy of one particle's record in the store.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleView {
    pub id: usize,
    pub position: DVec3,
    pub velocity: DVec3,
    pub angular_velocity: DVec3,
    pub radius: f64,
    pub mass: f64,
    pub inertia: f64,
    pub material: MaterialId,
    pub fixed: bool,
}

/// Contiguous per-particle arrays. Index `i` is the particle's identity.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleStore {
    dimension: Dimension,
    pub(crate) positions: Vec<DVec3>,
    pub(crate) velocities: Vec<DVec3>,
    pub(crate) angular_velocities: Vec<DVec3>,
    pub(crate) radii: Vec<f64>,
    pub(crate) masses: Vec<f64>,
    pub(crate) inertias: Vec<f64>,
    pub(crate) materials: Vec<MaterialId>,
    pub(crate) fixed: Vec<bool>,
    pub(crate) applied_forces: Vec<DVec3>,
}

impl ParticleStore {
    pub fn new(dimension: Dimension) -> Self {
        Self::with_capacity(dimension, 0)
    }

    pub fn with_capacity(dimension: Dimension, capacity: usize) -> Self {
        Self {
            dimension,
            positions: Vec::with_capacity(capacity),
            velocities: Vec::with_capacity(capacity),
            angular_velocities: Vec::with_capacity(capacity),
            radii: Vec::with_capacity(capacity),
            masses: Vec::with_capacity(capacity),
            inertias: Vec::with_capacity(capacity),
            materials: Vec::with_capacity(capacity),
            fixed: Vec::with_capacity(capacity),
            applied_forces: Vec::with_capacity(capacity),
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Appends a particle and returns its index.
    pub fn push(&mut self, particle: Particle) -> Result<usize> {
        let inertia = particle
            .inertia
            .unwrap_or_else(|| self.dimension.moment_of_inertia(particle.mass, particle.radius));
        let view = ParticleView {
            id: self.count(),
            position: particle.position,
            velocity: particle.velocity,
            angular_velocity: particle.angular_velocity,
            radius: particle.radius,
            mass: particle.mass,
            inertia,
            material: particle.material,
            fixed: particle.fixed,
        };
        self.validate(&view)?;
        let view = self.flatten(view);

        self.positions.push(view.position);
        self.velocities.push(view.velocity);
        self.angular_velocities.push(view.angular_velocity);
        self.radii.push(view.radius);
        self.masses.push(view.mass);
        self.inertias.push(view.inertia);
        self.materials.push(view.material);
        self.fixed.push(view.fixed);
        self.applied_forces.push(DVec3::ZERO);
        Ok(view.id)
    }

    pub fn get(&self, i: usize) -> Result<ParticleView> {
        self.check_index(i)?;
        Ok(self.view(i))
    }

    /// Overwrites every field of particle `i`. The `id` of `fields` is ignored.
    pub fn set(&mut self, i: usize, fields: ParticleView) -> Result<()> {
        self.check_index(i)?;
        self.validate(&fields)?;
        let fields = self.flatten(fields);
        self.positions[i] = fields.position;
        self.velocities[i] = fields.velocity;
        self.angular_velocities[i] = fields.angular_velocity;
        self.radii[i] = fields.radius;
        self.masses[i] = fields.mass;
        self.inertias[i] = fields.inertia;
        self.materials[i] = fields.material;
        self.fixed[i] = fields.fixed;
        Ok(())
    }

    pub fn set_position(&mut self, i: usize, position: DVec3) -> Result<()> {
        self.check_index(i)?;
        self.positions[i] = self.flatten_linear(position);
        Ok(())
    }

    pub fn set_velocity(&mut self, i: usize, velocity: DVec3) -> Result<()> {
        self.check_index(i)?;
        self.velocities[i] = self.flatten_linear(velocity);
        Ok(())
    }

    pub fn set_angular_velocity(&mut self, i: usize, angular_velocity: DVec3) -> Result<()> {
        self.check_index(i)?;
        self.angular_velocities[i] = self.flatten_angular(angular_velocity);
        Ok(())
    }

    /// Sets the constant external load on particle `i`, replacing any previous one.
    pub fn set_applied_force(&mut self, i: usize, force: DVec3) -> Result<()> {
        self.check_index(i)?;
        self.applied_forces[i] = self.flatten_linear(force);
        Ok(())
    }

    pub fn applied_force(&self, i: usize) -> Result<DVec3> {
        self.check_index(i)?;
        Ok(self.applied_forces[i])
    }

    pub fn positions(&self) -> &[DVec3] {
        &self.positions
    }

    pub fn velocities(&self) -> &[DVec3] {
        &self.velocities
    }

    pub fn angular_velocities(&self) -> &[DVec3] {
        &self.angular_velocities
    }

    pub fn radii(&self) -> &[f64] {
        &self.radii
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    pub fn inertias(&self) -> &[f64] {
        &self.inertias
    }

    pub fn materials(&self) -> &[MaterialId] {
        &self.materials
    }

    pub fn fixed_flags(&self) -> &[bool] {
        &self.fixed
    }

    pub fn max_radius(&self) -> f64 {
        self.radii.iter().copied().fold(0.0, f64::max)
    }

    pub fn iter(&self) -> impl Iterator<Item = ParticleView> + '_ {
        (0..self.count()).map(move |i| self.view(i))
    }

    #[inline]
    pub(crate) fn view(&self, i: usize) -> ParticleView {
        ParticleView {
            id: i,
            position: self.positions[i],
            velocity: self.velocities[i],
            angular_velocity: self.angular_velocities[i],
            radius: self.radii[i],
            mass: self.masses[i],
            inertia: self.inertias[i],
            material: self.materials[i],
            fixed: self.fixed[i],
        }
    }

    fn check_index(&self, i: usize) -> Result<()> {
        if i >= self.count() {
            return Err(DemError::IndexError {
                index: i,
                count: self.count(),
            });
        }
        Ok(())
    }

    fn validate(&self, p: &ParticleView) -> Result<()> {
        if !p.radius.is_finite() || p.radius <= 0.0 {
            return Err(DemError::InvalidParticle(format!("radius must be > 0, got {}", p.radius)));
        }
        if !p.mass.is_finite() || p.mass <= 0.0 {
            return Err(DemError::InvalidParticle(format!("mass must be > 0, got {}", p.mass)));
        }
        if !p.inertia.is_finite() || p.inertia <= 0.0 {
            return Err(DemError::InvalidParticle(format!("inertia must be > 0, got {}", p.inertia)));
        }
        if !p.position.is_finite() {
            return Err(DemError::InvalidParticle("position must be finite".to_string()));
        }
        Ok(())
    }

    // 2D runs live in the xy plane and spin about z.
    fn flatten(&self, mut p: ParticleView) -> ParticleView {
        p.position = self.flatten_linear(p.position);
        p.velocity = self.flatten_linear(p.velocity);
        p.angular_velocity = self.flatten_angular(p.angular_velocity);
        p
    }

    fn flatten_linear(&self, v: DVec3) -> DVec3 {
        match self.dimension {
            Dimension::Two => DVec3::new(v.x, v.y, 0.0),
            Dimension::Three => v,
        }
    }

    fn flatten_angular(&self, w: DVec3) -> DVec3 {
        match self.dimension {
            Dimension::Two => DVec3::new(0.0, 0.0, w.z),
            Dimension::Three => w,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn push_derives_inertia_from_dimension() {
        let mut store = ParticleStore::new(Dimension::Three);
        let i = store.push(Particle::new(DVec3::ZERO, 2.0, 5.0)).unwrap();
        assert_relative_eq!(store.get(i).unwrap().inertia, 0.4 * 5.0 * 4.0);

        let mut flat = ParticleStore::new(Dimension::Two);
        let j = flat.push(Particle::new(DVec3::ZERO, 2.0, 5.0)).unwrap();
        assert_relative_eq!(flat.get(j).unwrap().inertia, 0.5 * 5.0 * 4.0);
    }

    #[test]
    fn out_of_range_access_is_index_error() {
        let mut store = ParticleStore::new(Dimension::Three);
        store.push(Particle::new(DVec3::ZERO, 1.0, 1.0)).unwrap();
        match store.get(1) {
            Err(DemError::IndexError { index, count }) => {
                assert_eq!(index, 1);
                assert_eq!(count, 1);
            }
            other => panic!("expected IndexError, got {:?}", other),
        }
        assert!(store.set_velocity(4, DVec3::X).is_err());
        assert!(store.set_applied_force(1, DVec3::X).is_err());
    }

    #[test]
    fn rejects_non_positive_radius_and_mass() {
        let mut store = ParticleStore::new(Dimension::Three);
        assert!(store.push(Particle::new(DVec3::ZERO, 0.0, 1.0)).is_err());
        assert!(store.push(Particle::new(DVec3::ZERO, 1.0, -1.0)).is_err());
        assert!(store.is_empty());

        let i = store.push(Particle::new(DVec3::ZERO, 1.0, 1.0)).unwrap();
        let mut view = store.get(i).unwrap();
        view.radius = -2.0;
        assert!(store.set(i, view).is_err());
        assert_eq!(store.get(i).unwrap().radius, 1.0);
    }

    #[test]
    fn set_round_trips_fields() {
        let mut store = ParticleStore::new(Dimension::Three);
        let i = store.push(Particle::new(DVec3::ZERO, 1.0, 1.0)).unwrap();
        let mut view = store.get(i).unwrap();
        view.position = DVec3::new(1.0, 2.0, 3.0);
        view.material = 4;
        store.set(i, view).unwrap();
        assert_eq!(store.get(i).unwrap(), view);
    }

    #[test]
    fn two_dimensional_store_drops_out_of_plane_components() {
        let mut store = ParticleStore::new(Dimension::Two);
        let i = store
            .push(
                Particle::new(DVec3::new(1.0, 2.0, 3.0), 1.0, 1.0)
                    .with_velocity(DVec3::new(1.0, 1.0, 1.0))
                    .with_angular_velocity(DVec3::new(1.0, 1.0, 1.0)),
            )
            .unwrap();
        let p = store.get(i).unwrap();
        assert_eq!(p.position, DVec3::new(1.0, 2.0, 0.0));
        assert_eq!(p.velocity, DVec3::new(1.0, 1.0, 0.0));
        assert_eq!(p.angular_velocity, DVec3::new(0.0, 0.0, 1.0));
    }
}
