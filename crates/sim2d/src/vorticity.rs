//! Vorticity confinement.
//!
//! Coarse lattices smear vortices out; the confinement force pushes each
//! cell along the gradient of |curl|, scaled by the local curl, which
//! sharpens rotation the grid already has without inventing new energy
//! sources. Two row-parallel passes: curl first, then the force assembly
//! (the second reads neighbor rows of the first, so they cannot fuse).
//!
//! The resulting force field is consumed by the next collide pass.

use crate::executor::{SharedPtr, ThreadPool};
use crate::grid::FieldGrid;

const GRADIENT_EPSILON: f32 = 1e-6;

/// Recompute `force_x`/`force_y` from the current velocity field with
/// confinement strength `epsilon`.
pub(crate) fn compute_confinement(grid: &mut FieldGrid, epsilon: f32, pool: &ThreadPool) {
    let w = grid.width;
    let h = grid.height;

    let FieldGrid {
        ux,
        uy,
        curl,
        force_x,
        force_y,
        barriers,
        ..
    } = grid;

    let ux: &[f32] = ux.as_slice();
    let uy: &[f32] = uy.as_slice();
    let barriers: &[u8] = barriers.as_slice();

    // ========== Pass 1: discrete curl ==========
    let curl_out = SharedPtr::new(curl.as_mut_ptr());
    pool.parallel_for(0, h, |y_start, y_end| {
        for y in y_start..y_end {
            for x in 0..w {
                let i = y * w + x;
                let value = if x == 0 || x + 1 == w || y == 0 || y + 1 == h || barriers[i] != 0
                {
                    0.0
                } else {
                    (uy[i + 1] - uy[i - 1]) - (ux[i + w] - ux[i - w])
                };
                unsafe { curl_out.write(i, value) };
            }
        }
    });

    // ========== Pass 2: normalized gradient force ==========
    let curl: &[f32] = curl.as_slice();
    let fx_out = SharedPtr::new(force_x.as_mut_ptr());
    let fy_out = SharedPtr::new(force_y.as_mut_ptr());
    pool.parallel_for(0, h, |y_start, y_end| {
        for y in y_start..y_end {
            for x in 0..w {
                let i = y * w + x;
                let (fx, fy) = if x == 0 || x + 1 == w || y == 0 || y + 1 == h || barriers[i] != 0
                {
                    (0.0, 0.0)
                } else {
                    let grad_x = curl[i + 1].abs() - curl[i - 1].abs();
                    let grad_y = curl[i + w].abs() - curl[i - w].abs();
                    let magnitude = (grad_x * grad_x + grad_y * grad_y).sqrt();
                    if magnitude < GRADIENT_EPSILON {
                        (0.0, 0.0)
                    } else {
                        let scale = epsilon * curl[i] / magnitude;
                        (grad_y * scale, -grad_x * scale)
                    }
                };
                unsafe {
                    fx_out.write(i, fx);
                    fy_out.write(i, fy);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Solid-body rotation about the grid center.
    fn rotation_grid(n: usize) -> FieldGrid {
        let mut grid = FieldGrid::new(n, n);
        let c = (n as f32 - 1.0) * 0.5;
        for y in 0..n {
            for x in 0..n {
                let i = y * n + x;
                grid.ux[i] = -(y as f32 - c);
                grid.uy[i] = x as f32 - c;
            }
        }
        grid
    }

    #[test]
    fn test_rotation_has_positive_curl() {
        let mut grid = rotation_grid(16);
        let pool = ThreadPool::new(1);
        compute_confinement(&mut grid, 0.1, &pool);

        let i = grid.idx(8, 8);
        assert!(grid.curl[i] > 0.0, "counterclockwise flow has positive curl");
        // Solid-body rotation has uniform curl, so the gradient guard
        // zeroes the interior force.
        assert_eq!(grid.force_x[i], 0.0);
        assert_eq!(grid.force_y[i], 0.0);
    }

    #[test]
    fn test_edges_and_barriers_carry_no_force() {
        let mut grid = rotation_grid(16);
        let wall = grid.idx(5, 5);
        grid.barriers[wall] = 1;

        let pool = ThreadPool::new(1);
        compute_confinement(&mut grid, 0.2, &pool);

        assert_eq!(grid.curl[wall], 0.0);
        assert_eq!(grid.force_x[wall], 0.0);
        for x in 0..16 {
            assert_eq!(grid.curl[grid.idx(x, 0)], 0.0);
            assert_eq!(grid.force_y[grid.idx(x, 15)], 0.0);
        }
    }

    #[test]
    fn test_localized_vortex_produces_force() {
        // A vortex that falls off with radius has a |curl| gradient, so
        // confinement must push somewhere.
        let n = 24;
        let mut grid = FieldGrid::new(n, n);
        let c = (n as f32 - 1.0) * 0.5;
        for y in 0..n {
            for x in 0..n {
                let i = y * n + x;
                let dx = x as f32 - c;
                let dy = y as f32 - c;
                let fade = (-(dx * dx + dy * dy) / 20.0).exp();
                grid.ux[i] = -dy * fade;
                grid.uy[i] = dx * fade;
            }
        }

        let pool = ThreadPool::new(1);
        compute_confinement(&mut grid, 0.5, &pool);

        let total: f32 = grid
            .force_x
            .iter()
            .zip(&grid.force_y)
            .map(|(fx, fy)| fx.abs() + fy.abs())
            .sum();
        assert!(total > 0.0, "a decaying vortex must generate confinement force");
    }
}
