//! Semi-Lagrangian transport of the passive scalars.
//!
//! Each cell backtraces along the local velocity, samples the source
//! field with bilinear interpolation (solid neighbors count as zero), and
//! applies the per-step decay. The backtrace is clamped half a cell
//! inside the domain, so the four-point stencil never leaves it.
//!
//! The optional error-compensation ladder advects forward, back, forms
//! the corrected field `1.5 s - 0.5 s2`, and advects that forward again;
//! it roughly triples the cost and markedly reduces smearing.

use crate::executor::{SharedPtr, ThreadPool};
use crate::grid::FieldGrid;

/// One backtrace pass `src -> dst`. A negative `dt` traces forward,
/// which is how the compensation ladder reverses a pass.
#[allow(clippy::too_many_arguments)]
fn semi_lagrangian(
    src: &[f32],
    dst: &mut [f32],
    ux: &[f32],
    uy: &[f32],
    barriers: &[u8],
    w: usize,
    h: usize,
    dt: f32,
    decay: f32,
    pool: &ThreadPool,
) {
    let out = SharedPtr::new(dst.as_mut_ptr());
    let keep = 1.0 - decay;

    pool.parallel_for(0, h, |y_start, y_end| {
        for y in y_start..y_end {
            for x in 0..w {
                let i = y * w + x;
                if barriers[i] != 0 {
                    unsafe { out.write(i, 0.0) };
                    continue;
                }

                let xp = (x as f32 - ux[i] * dt).clamp(0.5, w as f32 - 1.5);
                let yp = (y as f32 - uy[i] * dt).clamp(0.5, h as f32 - 1.5);
                let ix = xp.floor() as usize;
                let iy = yp.floor() as usize;
                let fx = xp - ix as f32;
                let fy = yp - iy as f32;

                let sample = |sx: usize, sy: usize| -> f32 {
                    let j = sy * w + sx;
                    if barriers[j] != 0 {
                        0.0
                    } else {
                        src[j]
                    }
                };
                let s00 = sample(ix, iy);
                let s10 = sample(ix + 1, iy);
                let s01 = sample(ix, iy + 1);
                let s11 = sample(ix + 1, iy + 1);

                let top = s00 + (s10 - s00) * fx;
                let bottom = s01 + (s11 - s01) * fx;
                let value = (top + (bottom - top) * fy) * keep;
                unsafe { out.write(i, value) };
            }
        }
    });
}

/// Elementwise corrector `out = 1.5 orig - 0.5 back`, optionally floored
/// at zero (dye must stay non-negative; temperature may go below zero).
fn apply_correction(
    orig: &[f32],
    back: &[f32],
    out: &mut [f32],
    floor_at_zero: bool,
    pool: &ThreadPool,
) {
    let n = orig.len();
    let out_ptr = SharedPtr::new(out.as_mut_ptr());
    pool.parallel_for(0, n, |start, end| {
        for i in start..end {
            let mut v = 1.5 * orig[i] - 0.5 * back[i];
            if floor_at_zero && v < 0.0 {
                v = 0.0;
            }
            unsafe { out_ptr.write(i, v) };
        }
    });
}

/// Advect dye into `dye_new`; the caller swaps the buffers.
pub(crate) fn advect_dye(grid: &mut FieldGrid, dt: f32, decay: f32, bfecc: bool, pool: &ThreadPool) {
    let w = grid.width;
    let h = grid.height;
    let FieldGrid {
        dye,
        dye_new,
        bfecc_a,
        bfecc_b,
        ux,
        uy,
        barriers,
        ..
    } = grid;

    if bfecc {
        semi_lagrangian(dye, bfecc_a, ux, uy, barriers, w, h, dt, 0.0, pool);
        semi_lagrangian(bfecc_a, bfecc_b, ux, uy, barriers, w, h, -dt, 0.0, pool);
        apply_correction(dye, bfecc_b, bfecc_a, true, pool);
        semi_lagrangian(bfecc_a, dye_new, ux, uy, barriers, w, h, dt, decay, pool);
    } else {
        semi_lagrangian(dye, dye_new, ux, uy, barriers, w, h, dt, decay, pool);
    }
}

/// Advect temperature into `temperature_new`; the caller swaps.
pub(crate) fn advect_temperature(
    grid: &mut FieldGrid,
    dt: f32,
    diffusivity: f32,
    bfecc: bool,
    pool: &ThreadPool,
) {
    let w = grid.width;
    let h = grid.height;
    let FieldGrid {
        temperature,
        temperature_new,
        bfecc_a,
        bfecc_b,
        ux,
        uy,
        barriers,
        ..
    } = grid;

    if bfecc {
        semi_lagrangian(temperature, bfecc_a, ux, uy, barriers, w, h, dt, 0.0, pool);
        semi_lagrangian(bfecc_a, bfecc_b, ux, uy, barriers, w, h, -dt, 0.0, pool);
        apply_correction(temperature, bfecc_b, bfecc_a, false, pool);
        semi_lagrangian(bfecc_a, temperature_new, ux, uy, barriers, w, h, dt, diffusivity, pool);
    } else {
        semi_lagrangian(
            temperature,
            temperature_new,
            ux,
            uy,
            barriers,
            w,
            h,
            dt,
            diffusivity,
            pool,
        );
    }
}
