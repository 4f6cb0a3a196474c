//! Real-time 2D lattice-Boltzmann fluid simulation (D2Q9) with passive
//! dye and temperature transport.
//!
//! The kernel advances a `width x height` lattice through
//! collide-and-stream updates with per-edge boundary policies, optional
//! turbulence/rheology closures, vorticity confinement, and
//! semi-Lagrangian scalar advection, all running on a fixed pool of
//! row-stripe workers. A host application drives it by injecting forces,
//! dye, and obstacles through brush operations, stepping, and reading
//! the raw field buffers back for rendering.
//!
//! This crate is framework-agnostic and handles simulation only.
//! Rendering, input dispatch, and color mapping belong to the host.
//!
//! # Example
//!
//! ```
//! use sim2d::LbmSimulation;
//!
//! let mut sim = LbmSimulation::new(64, 64);
//! sim.add_force(32, 32, 0.05, 0.0);
//! sim.add_density(32, 32, 1.0);
//! sim.step(10);
//!
//! let i = 32 * 64 + 32;
//! assert!(sim.density()[i] > 0.0);
//! assert!(sim.dye().iter().sum::<f32>() > 0.0);
//! ```
//!
//! Units are lattice units throughout; `dt = 1` is the natural step.
//! Stability comes from the velocity cap, which defaults to 0.57,
//! just under the lattice sound speed `1/sqrt(3)`.

mod advection;
pub mod boundary;
pub mod brush;
mod collide;
mod executor;
mod grid;
pub mod lattice;
pub mod params;
mod vorticity;

pub use boundary::{BoundaryConfig, Edge, EdgePolicy};
pub use brush::{Brush, BrushShape, DimensionalMode, FalloffMode};
pub use executor::ThreadPool;
pub use glam::Vec2;
pub use params::{SimParams, SpongeConfig};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use grid::FieldGrid;
use lattice::limit_velocity;

/// Interactive D2Q9 lattice-Boltzmann simulation.
///
/// All buffers are allocated at construction and never reallocated, so
/// the borrowed views stay valid for the engine's lifetime. Nothing here
/// fails: out-of-range edits no-op, degenerate parameters are floored,
/// and runaway velocities are clamped.
pub struct LbmSimulation {
    grid: FieldGrid,
    params: SimParams,
    boundaries: BoundaryConfig,
    pool: ThreadPool,
    rng: ChaCha8Rng,
    noise_seed: u64,
    data_version: AtomicU64,
    barriers_dirty: AtomicBool,
}

impl LbmSimulation {
    /// Build a `width x height` lattice at rest equilibrium with a
    /// single-threaded (inline) executor. Dimensions are floored at 2.
    pub fn new(width: usize, height: usize) -> Self {
        let width = width.max(2);
        let height = height.max(2);
        log::info!("creating {}x{} lattice ({} cells)", width, height, width * height);

        Self {
            grid: FieldGrid::new(width, height),
            params: SimParams::default(),
            boundaries: BoundaryConfig::default(),
            pool: ThreadPool::new(1),
            rng: ChaCha8Rng::seed_from_u64(0),
            noise_seed: 0,
            data_version: AtomicU64::new(0),
            barriers_dirty: AtomicBool::new(false),
        }
    }

    // ========== Execution ==========

    /// Advance the simulation by `iterations` full update cycles.
    /// Synchronous: returns once every internal pass has completed.
    pub fn step(&mut self, iterations: u32) {
        for _ in 0..iterations {
            self.step_once();
        }
        self.bump_version();
    }

    fn step_once(&mut self) {
        // 1. Macroscopic boundary injection.
        boundary::apply_inflow(&mut self.grid, &self.boundaries);

        // 2. Collide and stream, then swap the double buffer.
        collide::collide_and_stream(&mut self.grid, &self.params, &self.boundaries, &self.pool);
        self.grid.swap_populations();

        // 3. Post-stream boundary fixup.
        boundary::apply_outflow(&mut self.grid, &self.boundaries);

        // 4. Derived fields catch up with the streamed populations.
        collide::refresh_macroscopics(&mut self.grid, self.params.max_velocity, &self.pool);

        // 5./6. Scalar transport.
        advection::advect_dye(
            &mut self.grid,
            self.params.dt,
            self.params.decay,
            self.params.bfecc,
            &self.pool,
        );
        self.grid.swap_dye();
        advection::advect_temperature(
            &mut self.grid,
            self.params.dt,
            self.params.thermal_diffusivity,
            self.params.bfecc,
            &self.pool,
        );
        self.grid.swap_temperature();

        // 7. Confinement force for the next cycle.
        if self.params.vorticity_confinement > 0.0 {
            vorticity::compute_confinement(
                &mut self.grid,
                self.params.vorticity_confinement,
                &self.pool,
            );
        }
    }

    // ========== Configuration ==========

    /// Set the kinematic viscosity (converted to the relaxation rate).
    pub fn set_viscosity(&mut self, viscosity: f32) {
        self.params.set_viscosity(viscosity);
        self.bump_version();
    }

    /// Set the BGK relaxation rate directly.
    pub fn set_omega(&mut self, omega: f32) {
        self.params.omega = omega;
        self.bump_version();
    }

    pub fn set_decay(&mut self, decay: f32) {
        self.params.decay = decay;
        self.bump_version();
    }

    pub fn set_dt(&mut self, dt: f32) {
        self.params.dt = dt;
        self.bump_version();
    }

    pub fn set_gravity(&mut self, gx: f32, gy: f32) {
        self.params.gravity = Vec2::new(gx, gy);
        self.bump_version();
    }

    /// Cap on the macroscopic speed. Keep it below `1/sqrt(3)`.
    pub fn set_max_velocity(&mut self, max_velocity: f32) {
        self.params.max_velocity = max_velocity;
        self.bump_version();
    }

    /// Replace the whole boundary configuration, e.g. with one of the
    /// [`BoundaryConfig`] presets.
    pub fn set_boundaries(&mut self, boundaries: BoundaryConfig) {
        self.boundaries = boundaries;
        self.bump_version();
    }

    pub fn set_edge_policy(&mut self, edge: Edge, policy: EdgePolicy) {
        self.boundaries.policies[edge.index()] = policy;
        self.bump_version();
    }

    /// Density and velocity imposed on equilibrium-inflow edges.
    pub fn set_inflow(&mut self, rho: f32, ux: f32, uy: f32) {
        self.boundaries.inflow_rho = rho;
        self.boundaries.inflow_velocity = Vec2::new(ux, uy);
        self.bump_version();
    }

    /// Tangential velocity of a moving-wall edge.
    pub fn set_wall_velocity(&mut self, edge: Edge, velocity: Vec2) {
        self.boundaries.wall_velocity[edge.index()] = velocity;
        self.bump_version();
    }

    /// Boussinesq buoyancy: expansion coefficient and the reference
    /// temperature at which it vanishes.
    pub fn set_thermal_expansion(&mut self, coefficient: f32, reference: f32) {
        self.params.thermal_expansion = coefficient;
        self.params.reference_temperature = reference;
        self.bump_version();
    }

    pub fn set_thermal_diffusivity(&mut self, diffusivity: f32) {
        self.params.thermal_diffusivity = diffusivity;
        self.bump_version();
    }

    /// Strength of the vorticity confinement force; 0 disables it and
    /// clears the force field.
    pub fn set_vorticity_confinement(&mut self, strength: f32) {
        self.params.vorticity_confinement = strength;
        if strength <= 0.0 {
            self.grid.force_x.fill(0.0);
            self.grid.force_y.fill(0.0);
        }
        self.bump_version();
    }

    pub fn set_smagorinsky(&mut self, constant: f32) {
        self.params.smagorinsky = constant;
        self.bump_version();
    }

    /// Viscosity thinning with temperature: `nu / (1 + k T)`.
    pub fn set_temperature_viscosity(&mut self, coupling: f32) {
        self.params.temperature_viscosity = coupling;
        self.bump_version();
    }

    /// Power-law rheology `(n, K)`; `K = 0` restores Newtonian behavior.
    pub fn set_power_law(&mut self, n: f32, k: f32) {
        self.params.power_law_n = n;
        self.params.power_law_k = k;
        self.bump_version();
    }

    pub fn set_global_drag(&mut self, drag: f32) {
        self.params.global_drag = drag;
        self.bump_version();
    }

    pub fn set_porosity_drag(&mut self, drag: f32) {
        self.params.porosity_drag = drag;
        self.bump_version();
    }

    /// Sponge frame: damping strength, width in cells, and the active
    /// edges indexed left/right/top/bottom.
    pub fn set_sponge(&mut self, strength: f32, width: f32, edges: [bool; 4]) {
        self.params.sponge = SpongeConfig {
            strength,
            width,
            edges,
        };
        self.bump_version();
    }

    /// Toggle the error-compensated advection ladder.
    pub fn set_bfecc(&mut self, enabled: bool) {
        self.params.bfecc = enabled;
        self.bump_version();
    }

    /// Resize the worker pool. 1 runs every pass inline on the caller.
    pub fn set_thread_count(&mut self, threads: usize) {
        let threads = threads.max(1);
        if threads != self.pool.threads() {
            self.pool = ThreadPool::new(threads);
        }
        self.bump_version();
    }

    /// Reseed the deterministic noise source.
    pub fn set_noise_seed(&mut self, seed: u64) {
        self.noise_seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.bump_version();
    }

    // ========== Interactive mutation ==========

    /// Kick the velocity of one interior cell and re-equilibrate it.
    /// Edge cells belong to the boundary policies; out-of-range or solid
    /// targets no-op.
    pub fn add_force(&mut self, x: i32, y: i32, fx: f32, fy: f32) {
        let (w, h) = (self.grid.width as i32, self.grid.height as i32);
        if x < 1 || x >= w - 1 || y < 1 || y >= h - 1 {
            return;
        }
        let i = self.grid.idx(x as usize, y as usize);
        if self.grid.is_barrier(i) {
            return;
        }
        let (u, v) = limit_velocity(
            self.grid.ux[i] + fx * self.params.dt,
            self.grid.uy[i] + fy * self.params.dt,
            self.params.max_velocity,
        );
        self.grid.ux[i] = u;
        self.grid.uy[i] = v;
        self.grid.re_equilibrate(i);
        self.bump_version();
    }

    /// Inject dye at one cell. Negative amounts erase, floored at zero.
    pub fn add_density(&mut self, x: i32, y: i32, amount: f32) {
        if !self.grid.in_bounds(x, y) {
            return;
        }
        let i = self.grid.idx(x as usize, y as usize);
        if self.grid.is_barrier(i) {
            return;
        }
        self.grid.dye[i] = (self.grid.dye[i] + amount).max(0.0);
        self.bump_version();
    }

    /// Inject (or with a negative amount, extract) heat at one cell.
    pub fn add_temperature(&mut self, x: i32, y: i32, amount: f32) {
        if !self.grid.in_bounds(x, y) {
            return;
        }
        let i = self.grid.idx(x as usize, y as usize);
        if self.grid.is_barrier(i) {
            return;
        }
        self.grid.temperature[i] += amount;
        self.bump_version();
    }

    /// Stamp (or with `remove`, erase) a solid obstacle.
    #[allow(clippy::too_many_arguments)]
    pub fn add_obstacle(
        &mut self,
        x: f32,
        y: f32,
        radius: f32,
        remove: bool,
        angle: f32,
        aspect_ratio: f32,
        shape: BrushShape,
    ) {
        let stamp = Brush {
            radius,
            angle,
            aspect_ratio,
            shape,
            ..Brush::default()
        };
        if brush::apply_obstacle(&mut self.grid, x, y, &stamp, remove) {
            self.barriers_dirty.store(true, Ordering::Release);
        }
        self.bump_version();
    }

    /// Wipe a circular region back to pristine fluid.
    pub fn clear_region(&mut self, x: f32, y: f32, radius: f32) {
        if brush::clear_region(&mut self.grid, x, y, radius) {
            self.barriers_dirty.store(true, Ordering::Release);
        }
        self.bump_version();
    }

    /// Masked force / dye / temperature application.
    pub fn apply_generic_brush(
        &mut self,
        x: f32,
        y: f32,
        stamp: &Brush,
        force: Vec2,
        dye_amount: f32,
        temperature_amount: f32,
    ) {
        brush::apply_generic(
            &mut self.grid,
            x,
            y,
            stamp,
            force,
            dye_amount,
            temperature_amount,
            self.params.dt,
            self.params.max_velocity,
        );
        self.bump_version();
    }

    /// Masked velocity-field edit: vortex, divergence, noise, or drag.
    pub fn apply_dimensional_brush(
        &mut self,
        x: f32,
        y: f32,
        stamp: &Brush,
        mode: DimensionalMode,
        strength: f32,
    ) {
        brush::apply_dimensional(
            &mut self.grid,
            x,
            y,
            stamp,
            mode,
            strength,
            self.params.dt,
            self.params.max_velocity,
            &mut self.rng,
        );
        self.bump_version();
    }

    /// Masked permeability edit; positive strength opens the medium up,
    /// negative closes it down.
    pub fn apply_porosity_brush(&mut self, x: f32, y: f32, stamp: &Brush, strength: f32) {
        brush::apply_porosity(&mut self.grid, x, y, stamp, strength);
        self.bump_version();
    }

    /// Restore the post-construction field state bit for bit (parameters
    /// and boundary configuration are left alone).
    pub fn reset(&mut self) {
        self.grid.reset();
        self.rng = ChaCha8Rng::seed_from_u64(self.noise_seed);
        self.barriers_dirty.store(true, Ordering::Release);
        self.bump_version();
        log::debug!("simulation reset");
    }

    // ========== Readout ==========

    pub fn width(&self) -> usize {
        self.grid.width
    }

    pub fn height(&self) -> usize {
        self.grid.height
    }

    /// Macroscopic density, row-major.
    pub fn density(&self) -> &[f32] {
        &self.grid.rho
    }

    pub fn velocity_x(&self) -> &[f32] {
        &self.grid.ux
    }

    pub fn velocity_y(&self) -> &[f32] {
        &self.grid.uy
    }

    pub fn dye(&self) -> &[f32] {
        &self.grid.dye
    }

    pub fn temperature(&self) -> &[f32] {
        &self.grid.temperature
    }

    pub fn porosity(&self) -> &[f32] {
        &self.grid.porosity
    }

    /// Solid mask: 0 = fluid, nonzero = solid.
    pub fn barriers(&self) -> &[u8] {
        &self.grid.barriers
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn boundaries(&self) -> &BoundaryConfig {
        &self.boundaries
    }

    /// Monotonic counter bumped by every mutation; lets the host detect
    /// changes without diffing buffers.
    pub fn data_version(&self) -> u64 {
        self.data_version.load(Ordering::Acquire)
    }

    /// Read-and-clear the latched "obstacles changed" flag.
    pub fn check_barrier_dirty(&self) -> bool {
        self.barriers_dirty.swap(false, Ordering::AcqRel)
    }

    fn bump_version(&self) {
        self.data_version.fetch_add(1, Ordering::AcqRel);
    }
}
