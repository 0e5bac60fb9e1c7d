use glam::{DVec3, IVec3};

use crate::particle::Dimension;

/// Upper bound on allocated cells per particle. Sparse, spread-out
/// assemblies get coarser cells instead of a huge mostly empty grid.
const MAX_CELLS_PER_PARTICLE: f64 = 8.0;
const MIN_CELLS: f64 = 64.0;

/// Uniform cell list over the bounding box of a set of positions.
pub struct Grid {
    cell_size: f64,
    cells: Vec<Vec<usize>>, // Stores particle indices
    grid_origin: DVec3,
    grid_dims: IVec3,
    dimension: Dimension,
}

impl Grid {
    /// Bins `positions` into cells of at least `cell_size`.
    pub fn build(positions: &[DVec3], cell_size: f64, dimension: Dimension) -> Self {
        let (min_bound, max_bound) = bounds(positions);
        let mut cell_size = cell_size;
        let budget = (positions.len() as f64 * MAX_CELLS_PER_PARTICLE).max(MIN_CELLS);
        while cell_count(min_bound, max_bound, cell_size, dimension) > budget {
            cell_size *= 2.0;
        }

        let grid_dims = dims(min_bound, max_bound, cell_size, dimension);
        let total_cells = (grid_dims.x * grid_dims.y * grid_dims.z) as usize;

        let mut grid = Self {
            cell_size,
            cells: vec![Vec::new(); total_cells],
            grid_origin: min_bound,
            grid_dims,
            dimension,
        };
        for (id, &position) in positions.iter().enumerate() {
            if let Some(idx) = grid.get_cell_index(position) {
                grid.cells[idx].push(id);
            }
        }
        grid
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    fn coords(&self, position: DVec3) -> IVec3 {
        let relative_pos = position - self.grid_origin;
        let mut coords = (relative_pos / self.cell_size).floor().as_ivec3();
        if self.dimension == Dimension::Two {
            coords.z = 0;
        }
        coords
    }

    fn get_cell_index(&self, position: DVec3) -> Option<usize> {
        let coords = self.coords(position);
        self.flat_index(coords)
    }

    fn flat_index(&self, coords: IVec3) -> Option<usize> {
        if coords.x < 0 || coords.y < 0 || coords.z < 0 ||
           coords.x >= self.grid_dims.x || coords.y >= self.grid_dims.y || coords.z >= self.grid_dims.z {
            return None;
        }

        Some((coords.x + coords.y * self.grid_dims.x + coords.z * self.grid_dims.x * self.grid_dims.y) as usize)
    }

    /// Indices in the same or adjacent cells: a 3x3x3 stencil in 3D, 3x3 in 2D.
    pub fn get_potential_collisions(&self, position: DVec3) -> Vec<usize> {
        let mut neighbors = Vec::new();
        let center_coords = self.coords(position);
        let z_range = match self.dimension {
            Dimension::Two => 0..=0,
            Dimension::Three => -1..=1,
        };

        for z in z_range {
            for y in -1..=1 {
                for x in -1..=1 {
                    let neighbor_coords = center_coords + IVec3::new(x, y, z);
                    if let Some(idx) = self.flat_index(neighbor_coords) {
                        neighbors.extend_from_slice(&self.cells[idx]);
                    }
                }
            }
        }
        neighbors
    }
}

fn bounds(positions: &[DVec3]) -> (DVec3, DVec3) {
    if positions.is_empty() {
        return (DVec3::ZERO, DVec3::ZERO);
    }
    positions.iter().fold((DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)), |(lo, hi), &p| {
        (lo.min(p), hi.max(p))
    })
}

fn dims(min_bound: DVec3, max_bound: DVec3, cell_size: f64, dimension: Dimension) -> IVec3 {
    let mut d = ((max_bound - min_bound) / cell_size).floor().as_ivec3() + IVec3::ONE;
    if dimension == Dimension::Two {
        d.z = 1;
    }
    d
}

fn cell_count(min_bound: DVec3, max_bound: DVec3, cell_size: f64, dimension: Dimension) -> f64 {
    let extent = (max_bound - min_bound) / cell_size;
    let z = match dimension {
        Dimension::Two => 1.0,
        Dimension::Three => extent.z.floor() + 1.0,
    };
    (extent.x.floor() + 1.0) * (extent.y.floor() + 1.0) * z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stencil_finds_adjacent_cells_only() {
        let positions = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.5, 0.0, 0.0),
            DVec3::new(3.5, 0.0, 0.0),
        ];
        let grid = Grid::build(&positions, 1.0, Dimension::Three);
        let near = grid.get_potential_collisions(positions[0]);
        assert!(near.contains(&0));
        assert!(near.contains(&1));
        assert!(!near.contains(&2));
    }

    #[test]
    fn two_dimensional_grid_is_flat() {
        let positions = vec![DVec3::new(0.0, 0.0, 0.0), DVec3::new(0.5, 0.5, 0.0)];
        let grid = Grid::build(&positions, 1.0, Dimension::Two);
        assert_eq!(grid.grid_dims.z, 1);
        assert_eq!(grid.get_potential_collisions(positions[1]).len(), 2);
    }

    #[test]
    fn far_outlier_coarsens_cells() {
        let positions = vec![DVec3::ZERO, DVec3::splat(1.0e6)];
        let grid = Grid::build(&positions, 1.0, Dimension::Three);
        assert!(grid.cell_size() > 1.0);
        assert!(grid.cells.len() as f64 <= MIN_CELLS);
    }
}
