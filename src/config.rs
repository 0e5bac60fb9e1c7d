//! Run configuration and scene files.
//!
//! A scene is a JSON document bundling the run configuration, the material
//! table, contact law choices and the initial particles:
//!
//! ```text
//! {
//!   "config": { "dimension": "2d", "dt": 0.001, "gravity": [0, -9.81, 0] },
//!   "materials": [ { "id": 0, "normal_stiffness": 1000.0, "normal_damping": 5.0,
//!                    "tangential_stiffness": 500.0, "friction_coefficient": 0.5 } ],
//!   "laws": { "default": { "normal": "linear_spring_dashpot", "tangential": "linear_spring_coulomb" } },
//!   "particles": [ { "position": [0, 0, 0], "radius": 1.0, "mass": 1.0 },
//!                  { "position": [3, 0, 0], "radius": 1.0, "mass": 1.0 } ],
//!   "bonds": [ { "particles": [0, 1], "stiffness": 100.0, "rest_length": 2.5 } ],
//!   "dashpots": [ { "particles": [0, 1], "viscosity": 0.1 } ]
//! }
//! ```

use std::fs;
use std::path::Path;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{DemError, Result};
use crate::material::{MaterialId, MaterialParams, MaterialTable};
use crate::particle::{Dimension, Particle};
use crate::physics::{ContactLaw, LawTable};

/// Immutable parameters of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub dimension: Dimension,
    pub gravity: [f64; 3],
    /// Extra detection margin around each particle.
    pub skin: f64,
    /// Requested cell size; raised to `2 max(radius) + skin` when smaller.
    pub cell_size: Option<f64>,
    pub dt: f64,
    pub steps: u64,
    pub output_interval: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dimension: Dimension::Three,
            gravity: [0.0, -9.81, 0.0],
            skin: 0.1,
            cell_size: None,
            dt: 1e-4,
            steps: 1000,
            output_interval: 100,
        }
    }
}

impl SimulationConfig {
    pub fn gravity(&self) -> DVec3 {
        DVec3::from_array(self.gravity)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.skin.is_finite() || self.skin < 0.0 {
            return Err(DemError::InvalidConfig(format!("skin must be >= 0, got {}", self.skin)));
        }
        if let Some(cell) = self.cell_size {
            if !cell.is_finite() || cell <= 0.0 {
                return Err(DemError::InvalidConfig(format!("cell_size must be > 0, got {}", cell)));
            }
        }
        validate_dt(self.dt)?;
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(DemError::InvalidConfig("gravity must be finite".to_string()));
        }
        if self.output_interval == 0 {
            return Err(DemError::InvalidConfig("output_interval must be >= 1".to_string()));
        }
        Ok(())
    }
}

pub(crate) fn validate_dt(dt: f64) -> Result<()> {
    if !dt.is_finite() || dt < 0.0 {
        return Err(DemError::InvalidConfig(format!("dt must be finite and >= 0, got {}", dt)));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialEntry {
    pub id: MaterialId,
    #[serde(flatten)]
    pub params: MaterialParams,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairLawEntry {
    pub materials: [MaterialId; 2],
    #[serde(flatten)]
    pub law: ContactLaw,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairMaterialEntry {
    pub materials: [MaterialId; 2],
    #[serde(flatten)]
    pub params: MaterialParams,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LawSection {
    pub default: Option<ContactLaw>,
    pub pairs: Vec<PairLawEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleEntry {
    pub position: [f64; 3],
    #[serde(default)]
    pub velocity: [f64; 3],
    #[serde(default)]
    pub angular_velocity: [f64; 3],
    pub radius: f64,
    pub mass: f64,
    #[serde(default)]
    pub inertia: Option<f64>,
    #[serde(default)]
    pub material: MaterialId,
    #[serde(default)]
    pub fixed: bool,
    #[serde(default)]
    pub applied_force: [f64; 3],
}

impl ParticleEntry {
    pub fn to_particle(&self) -> Particle {
        Particle {
            position: DVec3::from_array(self.position),
            velocity: DVec3::from_array(self.velocity),
            angular_velocity: DVec3::from_array(self.angular_velocity),
            radius: self.radius,
            mass: self.mass,
            inertia: self.inertia,
            material: self.material,
            fixed: self.fixed,
        }
    }
}

/// Spring between two particles, indexed in scene order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BondEntry {
    pub particles: [usize; 2],
    pub stiffness: f64,
    /// Current distance when omitted.
    #[serde(default)]
    pub rest_length: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DashpotEntry {
    pub particles: [usize; 2],
    pub viscosity: f64,
}

/// Parsed scene file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub config: SimulationConfig,
    pub materials: Vec<MaterialEntry>,
    pub material_pairs: Vec<PairMaterialEntry>,
    pub laws: LawSection,
    pub particles: Vec<ParticleEntry>,
    pub bonds: Vec<BondEntry>,
    pub dashpots: Vec<DashpotEntry>,
}

impl Scene {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let scene: Scene = serde_json::from_str(contents)?;
        scene.config.validate()?;
        Ok(scene)
    }

    pub fn material_table(&self) -> Result<MaterialTable> {
        let mut table = MaterialTable::new();
        for entry in &self.materials {
            table.insert(entry.id, entry.params)?;
        }
        for entry in &self.material_pairs {
            table.insert_pair(entry.materials[0], entry.materials[1], entry.params)?;
        }
        Ok(table)
    }

    pub fn law_table(&self) -> LawTable {
        let mut laws = LawTable::new(self.laws.default.unwrap_or_default());
        for entry in &self.laws.pairs {
            laws.register(entry.materials[0], entry.materials[1], entry.law);
        }
        laws
    }
}
