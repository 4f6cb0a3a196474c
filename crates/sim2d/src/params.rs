//! Tunable simulation parameters.
//!
//! Everything the host can configure lives here as plain data so a UI can
//! snapshot, serialize, and restore a full parameter set.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Velocity-damping frame near the domain boundary.
///
/// Cells within `width` of an active edge have their velocity scaled by
/// `1 - strength * (1 - d/width)^2`, where `d` is the distance to the
/// nearest active edge.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpongeConfig {
    /// Damping strength at the very edge, in `[0, 1]`.
    pub strength: f32,
    /// Frame width in cells. Zero disables the sponge.
    pub width: f32,
    /// Active edges, indexed left/right/top/bottom.
    pub edges: [bool; 4],
}

impl Default for SpongeConfig {
    fn default() -> Self {
        Self {
            strength: 0.0,
            width: 0.0,
            edges: [false; 4],
        }
    }
}

impl SpongeConfig {
    #[inline]
    pub(crate) fn active(&self) -> bool {
        self.strength > 0.0 && self.width > 0.0 && self.edges.iter().any(|&e| e)
    }
}

/// Full scalar parameter set of the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    /// BGK relaxation rate in `(0, 2)`. Set via [`SimParams::set_viscosity`]
    /// or directly.
    pub omega: f32,
    /// Fraction of dye removed per step.
    pub decay: f32,
    /// Time step in lattice units. 1.0 is the natural step.
    pub dt: f32,
    /// Uniform body acceleration.
    pub gravity: Vec2,
    /// Hard cap on the macroscopic speed. Must stay below the lattice
    /// sound speed `1/sqrt(3)`; this is the sole numerical safety net.
    pub max_velocity: f32,

    /// Boussinesq buoyancy coefficient. Zero disables thermal coupling.
    pub thermal_expansion: f32,
    /// Temperature at which buoyancy vanishes.
    pub reference_temperature: f32,
    /// Fraction of temperature removed per step.
    pub thermal_diffusivity: f32,

    /// Strength of the curl-amplifying confinement force. Zero disables it.
    pub vorticity_confinement: f32,

    /// Smagorinsky constant `C_s` for the eddy-viscosity closure.
    /// Zero disables it.
    pub smagorinsky: f32,
    /// Thins the fluid where it is hot: `nu / (1 + k * T)`. Zero disables.
    pub temperature_viscosity: f32,
    /// Power-law rheology exponent (1.0 = Newtonian).
    pub power_law_n: f32,
    /// Power-law consistency factor. Zero disables the closure.
    pub power_law_k: f32,

    /// Uniform velocity damping applied every collide.
    pub global_drag: f32,
    /// Extra damping scaled by `1 - porosity` per cell.
    pub porosity_drag: f32,

    pub sponge: SpongeConfig,

    /// Run scalar advection through the back-and-forth error compensation
    /// ladder (sharper, roughly 3x the advection cost).
    pub bfecc: bool,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            omega: 1.85,
            decay: 0.0,
            dt: 1.0,
            gravity: Vec2::ZERO,
            max_velocity: 0.57,
            thermal_expansion: 0.0,
            reference_temperature: 0.0,
            thermal_diffusivity: 0.0,
            vorticity_confinement: 0.0,
            smagorinsky: 0.0,
            temperature_viscosity: 0.0,
            power_law_n: 1.0,
            power_law_k: 0.0,
            global_drag: 0.0,
            porosity_drag: 0.0,
            sponge: SpongeConfig::default(),
            bfecc: false,
        }
    }
}

impl SimParams {
    /// Set the relaxation rate from a kinematic viscosity:
    /// `omega = 1 / (3 nu + 0.5)`.
    pub fn set_viscosity(&mut self, viscosity: f32) {
        self.omega = 1.0 / (3.0 * viscosity + 0.5);
    }

    /// Kinematic viscosity implied by the current relaxation rate.
    pub fn viscosity(&self) -> f32 {
        (1.0 / self.omega - 0.5) / 3.0
    }

    /// Any closure rescales the relaxation rate per cell.
    #[inline]
    pub(crate) fn closures_active(&self) -> bool {
        self.temperature_viscosity > 0.0 || self.strain_closures_active()
    }

    /// Closures that need the non-equilibrium strain-rate magnitude.
    #[inline]
    pub(crate) fn strain_closures_active(&self) -> bool {
        self.power_law_k > 0.0 || self.smagorinsky > 0.0
    }
}
