//! Error types for the DEM core.

use std::fmt;

use thiserror::Error;

use crate::material::MaterialId;

/// Which per-particle quantity went non-finite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quantity {
    Force,
    Torque,
    Velocity,
    AngularVelocity,
    Position,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quantity::Force => "force",
            Quantity::Torque => "torque",
            Quantity::Velocity => "velocity",
            Quantity::AngularVelocity => "angular velocity",
            Quantity::Position => "position",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum DemError {
    #[error("particle index {index} out of bounds (count {count})")]
    IndexError { index: usize, count: usize },

    #[error("no parameters registered for material {0}")]
    InvalidMaterial(MaterialId),

    #[error("invalid particle: {0}")]
    InvalidParticle(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("contact laws cannot be changed once the run has started")]
    ConfigLocked,

    #[error("non-finite {quantity} on particle {particle} at step {step}")]
    NumericalInstability {
        step: u64,
        particle: usize,
        quantity: Quantity,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DemError>;
