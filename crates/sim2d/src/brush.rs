//! Shape-masked region edits.
//!
//! All interactive editing goes through one masked iteration: an affine
//! frame (rotation plus aspect stretch) around the brush center, one of
//! three distance metrics, and a falloff curve mapping normalized
//! distance to a per-cell weight. The individual operators (force, dye,
//! temperature, dimensional velocity modes, porosity, obstacles) differ
//! only in what they do with that weight.

use glam::Vec2;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::grid::FieldGrid;
use crate::lattice::limit_velocity;

/// Distance metric of the brush footprint.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum BrushShape {
    #[default]
    Ellipse,
    Square,
    Diamond,
}

impl BrushShape {
    /// Decode the host-side integer code; unknown codes mean ellipse.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => BrushShape::Square,
            2 => BrushShape::Diamond,
            _ => BrushShape::Ellipse,
        }
    }
}

/// Weight profile from brush center to rim.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum FalloffMode {
    /// Blend between a flat stamp and a smoothstep dome; the parameter is
    /// the blend fraction.
    #[default]
    Smoothstep,
    /// `exp(-d^2 * param)`.
    Gaussian,
}

impl FalloffMode {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => FalloffMode::Gaussian,
            _ => FalloffMode::Smoothstep,
        }
    }
}

/// Velocity-field modes of the dimensional brush.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum DimensionalMode {
    /// Tangential swirl around the center.
    Vortex,
    /// Radial push away from (or toward, with negative strength) the
    /// center.
    Divergence,
    /// Per-cell uniform random kicks.
    Noise,
    /// Multiplicative velocity damping.
    Drag,
}

impl DimensionalMode {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => DimensionalMode::Divergence,
            2 => DimensionalMode::Noise,
            3 => DimensionalMode::Drag,
            _ => DimensionalMode::Vortex,
        }
    }
}

/// Geometric description of a brush footprint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Brush {
    /// Footprint radius in cells. Floored at 0.01.
    pub radius: f32,
    /// Rotation of the footprint frame, radians.
    pub angle: f32,
    /// Height/width ratio of the footprint. Floored at 0.01.
    pub aspect_ratio: f32,
    pub shape: BrushShape,
    pub falloff: FalloffMode,
    /// Meaning depends on the falloff mode; see [`FalloffMode`].
    pub falloff_param: f32,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            radius: 5.0,
            angle: 0.0,
            aspect_ratio: 1.0,
            shape: BrushShape::Ellipse,
            falloff: FalloffMode::Smoothstep,
            falloff_param: 1.0,
        }
    }
}

/// Visit every in-grid cell inside the footprint with its falloff weight.
/// Off-grid centers degrade gracefully to a partial (or empty) visit.
fn for_each_masked_cell(
    brush: &Brush,
    cx: f32,
    cy: f32,
    w: usize,
    h: usize,
    mut visit: impl FnMut(usize, usize, f32),
) {
    let radius = brush.radius.max(0.01);
    let aspect = brush.aspect_ratio.max(0.01);
    let (sin, cos) = brush.angle.sin_cos();

    // Conservative bounding box: covers the aspect stretch and the
    // diamond metric's sqrt(2) reach under any rotation.
    let reach = radius * aspect.max(1.0) * 1.5;
    let x_min = ((cx - reach).floor() as i64).max(0);
    let x_max = ((cx + reach).ceil() as i64).min(w as i64 - 1);
    let y_min = ((cy - reach).floor() as i64).max(0);
    let y_max = ((cy + reach).ceil() as i64).min(h as i64 - 1);

    for y in y_min..=y_max {
        for x in x_min..=x_max {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;

            // Rotate into the brush frame, then undo the aspect stretch.
            let rx = dx * cos + dy * sin;
            let ry = (-dx * sin + dy * cos) / aspect;

            let dist = match brush.shape {
                BrushShape::Ellipse => (rx * rx + ry * ry).sqrt(),
                BrushShape::Square => rx.abs().max(ry.abs()),
                BrushShape::Diamond => (rx.abs() + ry.abs()) * std::f32::consts::FRAC_1_SQRT_2,
            };
            if dist > radius {
                continue;
            }

            let d = dist / radius;
            let weight = match brush.falloff {
                FalloffMode::Smoothstep => {
                    let p = brush.falloff_param.clamp(0.0, 1.0);
                    let t = 1.0 - d;
                    (1.0 - p) + p * (t * t * (3.0 - 2.0 * t))
                }
                FalloffMode::Gaussian => (-d * d * brush.falloff_param).exp(),
            };
            visit(x as usize, y as usize, weight);
        }
    }
}

/// Force / dye / temperature brush. A nonzero force re-equilibrates the
/// touched cells so the velocity change survives the next collision.
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_generic(
    grid: &mut FieldGrid,
    x: f32,
    y: f32,
    brush: &Brush,
    force: Vec2,
    dye_amount: f32,
    temperature_amount: f32,
    dt: f32,
    max_velocity: f32,
) {
    let (w, h) = (grid.width, grid.height);
    let apply_force = force != Vec2::ZERO;

    for_each_masked_cell(brush, x, y, w, h, |gx, gy, weight| {
        let i = gy * w + gx;
        if grid.barriers[i] != 0 {
            return;
        }
        if apply_force {
            let (u, v) = limit_velocity(
                grid.ux[i] + force.x * weight * dt,
                grid.uy[i] + force.y * weight * dt,
                max_velocity,
            );
            grid.ux[i] = u;
            grid.uy[i] = v;
        }
        if dye_amount != 0.0 {
            grid.dye[i] = (grid.dye[i] + dye_amount * weight).max(0.0);
        }
        if temperature_amount != 0.0 {
            grid.temperature[i] += temperature_amount * weight;
        }
        if apply_force {
            grid.re_equilibrate(i);
        }
    });
}

/// Velocity-field brush: swirl, source/sink, noise, or drag.
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_dimensional(
    grid: &mut FieldGrid,
    x: f32,
    y: f32,
    brush: &Brush,
    mode: DimensionalMode,
    strength: f32,
    dt: f32,
    max_velocity: f32,
    rng: &mut ChaCha8Rng,
) {
    let (w, h) = (grid.width, grid.height);

    for_each_masked_cell(brush, x, y, w, h, |gx, gy, weight| {
        let i = gy * w + gx;
        if grid.barriers[i] != 0 {
            return;
        }
        let dx = gx as f32 - x;
        let dy = gy as f32 - y;
        let s = strength * weight * dt;

        match mode {
            DimensionalMode::Vortex => {
                grid.ux[i] += -dy * s;
                grid.uy[i] += dx * s;
            }
            DimensionalMode::Divergence => {
                grid.ux[i] += dx * s;
                grid.uy[i] += dy * s;
            }
            DimensionalMode::Noise => {
                grid.ux[i] += rng.gen_range(-1.0f32..=1.0) * s;
                grid.uy[i] += rng.gen_range(-1.0f32..=1.0) * s;
            }
            DimensionalMode::Drag => {
                let keep = (1.0 - s).max(0.0);
                grid.ux[i] *= keep;
                grid.uy[i] *= keep;
            }
        }

        let (u, v) = limit_velocity(grid.ux[i], grid.uy[i], max_velocity);
        grid.ux[i] = u;
        grid.uy[i] = v;
        grid.re_equilibrate(i);
    });
}

/// Porosity brush: signed strength raises or lowers permeability.
pub(crate) fn apply_porosity(grid: &mut FieldGrid, x: f32, y: f32, brush: &Brush, strength: f32) {
    let (w, h) = (grid.width, grid.height);
    for_each_masked_cell(brush, x, y, w, h, |gx, gy, weight| {
        let i = gy * w + gx;
        if grid.barriers[i] != 0 {
            return;
        }
        grid.porosity[i] = (grid.porosity[i] + strength * weight).clamp(0.0, 1.0);
    });
}

/// Obstacle brush: stamp or erase solid cells. Every touched cell resets
/// to rest equilibrium so newly exposed fluid starts clean. Returns true
/// when any cell actually changed.
pub(crate) fn apply_obstacle(
    grid: &mut FieldGrid,
    x: f32,
    y: f32,
    brush: &Brush,
    remove: bool,
) -> bool {
    let (w, h) = (grid.width, grid.height);
    let mut changed = false;

    for_each_masked_cell(brush, x, y, w, h, |gx, gy, _weight| {
        let i = gy * w + gx;
        let solid = grid.barriers[i] != 0;
        if remove && solid {
            grid.barriers[i] = 0;
            grid.set_cell_to_rest(i);
            changed = true;
        } else if !remove && !solid {
            grid.barriers[i] = 1;
            grid.set_cell_to_rest(i);
            changed = true;
        }
    });
    changed
}

/// Wipe a circular region back to pristine fluid: no barrier, rest
/// equilibrium, clean scalars, full permeability. Returns true when a
/// barrier was removed.
pub(crate) fn clear_region(grid: &mut FieldGrid, x: f32, y: f32, radius: f32) -> bool {
    let brush = Brush {
        radius,
        ..Brush::default()
    };
    let (w, h) = (grid.width, grid.height);
    let mut cleared_barrier = false;

    for_each_masked_cell(&brush, x, y, w, h, |gx, gy, _weight| {
        let i = gy * w + gx;
        if grid.barriers[i] != 0 {
            cleared_barrier = true;
        }
        grid.barriers[i] = 0;
        grid.porosity[i] = 1.0;
        grid.set_cell_to_rest(i);
    });
    cleared_barrier
}
