//! Verlet-style candidate pair list built on the cell grid.
//!
//! A pair is a candidate when the gap between the two surfaces is at most the
//! skin. The list stays valid until some particle has moved more than half
//! the skin since the last rebuild.

use glam::DVec3;
use rayon::prelude::*;

use crate::contact::ContactPair;
use crate::grid::Grid;
use crate::particle::ParticleStore;

#[derive(Clone, Debug, PartialEq)]
pub struct NeighborList {
    pairs: Vec<ContactPair>,
    reference_positions: Vec<DVec3>,
    skin: f64,
    cell_size: f64,
    rebuilds: u64,
}

impl NeighborList {
    pub fn new(skin: f64) -> Self {
        Self {
            pairs: Vec::new(),
            reference_positions: Vec::new(),
            skin,
            cell_size: 0.0,
            rebuilds: 0,
        }
    }

    pub fn pairs(&self) -> &[ContactPair] {
        &self.pairs
    }

    /// Cell size used by the last rebuild.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// Largest displacement of any particle since the last rebuild.
    pub fn max_displacement(&self, particles: &ParticleStore) -> f64 {
        particles
            .positions()
            .iter()
            .zip(&self.reference_positions)
            .map(|(p, r)| (*p - *r).length())
            .fold(0.0, f64::max)
    }

    /// True when the list is stale: never built, particle count changed, or a
    /// particle moved more than skin/2.
    pub fn needs_rebuild(&self, particles: &ParticleStore) -> bool {
        if self.reference_positions.len() != particles.count() || self.rebuilds == 0 {
            return true;
        }
        self.max_displacement(particles) > 0.5 * self.skin
    }

    /// Rebuilds the candidate set with the requested cell size (raised to the
    /// minimum safe size if smaller) and returns the sorted pairs.
    pub fn rebuild(&mut self, particles: &ParticleStore, cell_size: Option<f64>) -> &[ContactPair] {
        let min_cell = minimum_cell_size(particles, self.skin);
        let requested = cell_size.unwrap_or(min_cell);
        if requested < min_cell {
            log::warn!(
                "cell size {} is below 2*max_radius + skin; using {}",
                requested,
                min_cell
            );
        }
        let size = requested.max(min_cell);

        self.pairs = find_pairs(particles, size, self.skin);
        self.reference_positions = particles.positions().to_vec();
        self.cell_size = size;
        self.rebuilds += 1;
        log::debug!("neighbor list rebuilt: {} candidate pairs, cell size {}", self.pairs.len(), size);
        &self.pairs
    }
}

/// Smallest cell size for which the adjacent-cell stencil sees every candidate.
pub fn minimum_cell_size(particles: &ParticleStore, skin: f64) -> f64 {
    let size = 2.0 * particles.max_radius() + skin;
    if size > 0.0 {
        size
    } else {
        1.0
    }
}

/// All pairs with `|x_b - x_a| <= r_a + r_b + skin`, sorted by `(min, max)`.
pub fn find_pairs(particles: &ParticleStore, cell_size: f64, skin: f64) -> Vec<ContactPair> {
    let positions = particles.positions();
    let radii = particles.radii();
    let grid = Grid::build(positions, cell_size, particles.dimension());

    let mut pairs: Vec<ContactPair> = (0..particles.count())
        .into_par_iter()
        .flat_map_iter(|i| {
            let p = positions[i];
            let neighbors = grid.get_potential_collisions(p);
            neighbors
                .into_iter()
                .filter(move |&j| j > i)
                .filter(move |&j| {
                    let reach = radii[i] + radii[j] + skin;
                    (positions[j] - p).length_squared() <= reach * reach
                })
                .map(move |j| ContactPair::new(i, j))
        })
        .collect();

    pairs.sort_unstable();
    pairs
}
