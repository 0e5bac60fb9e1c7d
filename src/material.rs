use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{DemError, Result};

pub type MaterialId = u32;

/// Contact parameters shared by every contact that references a material.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialParams {
    pub normal_stiffness: f64,     // k_n
    pub normal_damping: f64,       // c_n
    pub tangential_stiffness: f64, // k_t
    pub friction_coefficient: f64, // mu
}

impl MaterialParams {
    pub fn new(normal_stiffness: f64, normal_damping: f64, tangential_stiffness: f64, friction_coefficient: f64) -> Self {
        Self {
            normal_stiffness,
            normal_damping,
            tangential_stiffness,
            friction_coefficient,
        }
    }

    /// Hertzian parameters derived from elastic constants of a single material.
    ///
    /// `normal_stiffness` becomes `4/3 E*` with `1/E* = 2 (1 - nu^2) / E`, and the
    /// tangential stiffness uses the same ratio as Mindlin's `8 G*` to `2 E*`.
    pub fn from_elastic(youngs_modulus: f64, poissons_ratio: f64, normal_damping: f64, friction_coefficient: f64) -> Self {
        let e_star = effective_youngs_modulus(youngs_modulus, poissons_ratio, youngs_modulus, poissons_ratio);
        let g = shear_modulus(youngs_modulus, poissons_ratio);
        let g_star = g / (2.0 * (2.0 - poissons_ratio));
        let kn = 4.0 / 3.0 * e_star;
        Self {
            normal_stiffness: kn,
            normal_damping,
            tangential_stiffness: kn * (8.0 * g_star) / (2.0 * e_star),
            friction_coefficient,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("normal_stiffness", self.normal_stiffness),
            ("normal_damping", self.normal_damping),
            ("tangential_stiffness", self.tangential_stiffness),
            ("friction_coefficient", self.friction_coefficient),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(DemError::InvalidConfig(format!("{} must be finite and >= 0, got {}", name, value)));
            }
        }
        if self.normal_stiffness == 0.0 {
            return Err(DemError::InvalidConfig("normal_stiffness must be > 0".to_string()));
        }
        Ok(())
    }

    /// Combine two materials: harmonic mean of stiffnesses, mean damping, lower friction.
    ///
    /// Identical inputs return the input unchanged.
    pub fn mix(&self, other: &MaterialParams) -> MaterialParams {
        MaterialParams {
            normal_stiffness: harmonic_mean(self.normal_stiffness, other.normal_stiffness),
            normal_damping: 0.5 * (self.normal_damping + other.normal_damping),
            tangential_stiffness: harmonic_mean(self.tangential_stiffness, other.tangential_stiffness),
            friction_coefficient: self.friction_coefficient.min(other.friction_coefficient),
        }
    }

    /// Duration of a linear spring contact between two masses, `pi sqrt(m*/k_n)`.
    pub fn contact_duration(&self, m1: f64, m2: f64) -> f64 {
        std::f64::consts::PI * (effective_mass(m1, m2) / self.normal_stiffness).sqrt()
    }
}

fn harmonic_mean(a: f64, b: f64) -> f64 {
    if a + b == 0.0 {
        0.0
    } else {
        2.0 * a * b / (a + b)
    }
}

/// Read-only registry of material parameters keyed by material id.
#[derive(Clone, Debug, Default)]
pub struct MaterialTable {
    materials: HashMap<MaterialId, MaterialParams>,
    pairs: HashMap<(MaterialId, MaterialId), MaterialParams>,
}

impl MaterialTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: MaterialId, params: MaterialParams) -> Result<()> {
        params.validate()?;
        self.materials.insert(id, params);
        Ok(())
    }

    /// Explicit parameters for contacts between two different materials.
    pub fn insert_pair(&mut self, a: MaterialId, b: MaterialId, params: MaterialParams) -> Result<()> {
        params.validate()?;
        self.pairs.insert(pair_key(a, b), params);
        Ok(())
    }

    pub fn get(&self, id: MaterialId) -> Result<&MaterialParams> {
        self.materials.get(&id).ok_or(DemError::InvalidMaterial(id))
    }

    pub fn contains(&self, id: MaterialId) -> bool {
        self.materials.contains_key(&id)
    }

    /// Parameters used for a contact between materials `a` and `b`.
    pub fn pair(&self, a: MaterialId, b: MaterialId) -> Result<MaterialParams> {
        let pa = self.get(a)?;
        let pb = self.get(b)?;
        if a == b {
            return Ok(*pa);
        }
        match self.pairs.get(&pair_key(a, b)) {
            Some(params) => Ok(*params),
            None => Ok(pa.mix(pb)),
        }
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

pub(crate) fn pair_key(a: MaterialId, b: MaterialId) -> (MaterialId, MaterialId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

// Helpers to compute effective properties between two bodies
pub fn effective_radius(r1: f64, r2: f64) -> f64 {
    (r1 * r2) / (r1 + r2)
}

pub fn effective_mass(m1: f64, m2: f64) -> f64 {
    (m1 * m2) / (m1 + m2)
}

pub fn effective_youngs_modulus(e1: f64, nu1: f64, e2: f64, nu2: f64) -> f64 {
    // 1/E* = (1-nu1^2)/E1 + (1-nu2^2)/E2
    let inv_e_star = (1.0 - nu1 * nu1) / e1 + (1.0 - nu2 * nu2) / e2;
    1.0 / inv_e_star
}

pub fn shear_modulus(e: f64, nu: f64) -> f64 {
    e / (2.0 * (1.0 + nu))
}
