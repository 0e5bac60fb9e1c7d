//! Discrete element engine for spheres (3D) and disks (2D).
//!
//! Particles live in a [`ParticleStore`]. Each step finds candidate pairs with a
//! cell list plus Verlet skin, evaluates a contact law per pair, assembles net
//! loads together with any springs and dashpots and advances with velocity
//! Verlet. Tangential contact history is kept
//! per pair in the [`SimulationState`].

pub mod assembly;
pub mod bond;
pub mod config;
pub mod contact;
pub mod diagnostics;
pub mod error;
pub mod grid;
pub mod integrator;
pub mod material;
pub mod neighbor;
pub mod particle;
pub mod physics;
pub mod simulation;
pub mod state;
pub mod vtk;

pub use bond::{Bond, BondForce, BondSet, Dashpot};
pub use config::{Scene, SimulationConfig};
pub use contact::{ContactForce, ContactPair, ContactState, Regime};
pub use diagnostics::{ConvergenceMonitor, Diagnostics};
pub use error::{DemError, Quantity, Result};
pub use integrator::{HaltReason, Integrator, IntegratorStatus};
pub use material::{MaterialId, MaterialParams, MaterialTable};
pub use particle::{Dimension, Particle, ParticleStore, ParticleView};
pub use physics::{ContactLaw, ContactModel, LawTable, NormalForceModel, TangentialForceModel};
pub use simulation::{RelaxOutcome, Simulation, Snapshot};
pub use state::SimulationState;
