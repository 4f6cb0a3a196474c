//! The collide-and-stream kernel.
//!
//! Each pass over the lattice does, per fluid cell:
//!
//! 1. Moment reduction: `rho = sum f`, `u = sum c f / rho`.
//! 2. Body forces: gravity, the confinement force field, thermal
//!    buoyancy, global/porosity drag, sponge damping, velocity cap.
//! 3. Closure-adjusted relaxation (temperature thinning, power-law
//!    rheology, Smagorinsky eddy viscosity).
//! 4. BGK collision against the local equilibrium.
//! 5. Scatter-push streaming into `f_new`, with per-edge boundary
//!    dispatch at the source cell.
//!
//! Streaming writes cross stripe boundaries (a row's diagonal populations
//! land one row up or down), but each `(direction, destination)` slot has
//! exactly one source cell per pass, so the stripes write through
//! [`SharedPtr`] without synchronization.
//!
//! Solid cells are pinned: unit density, zero velocity, populations at
//! the rest equilibrium.

use crate::boundary::{BoundaryConfig, Edge, EdgePolicy};
use crate::executor::{SharedPtr, ThreadPool};
use crate::grid::FieldGrid;
use crate::lattice::{equilibrium, limit_velocity, CX, CY, OPP, Q, SLIP_H, SLIP_V, WEIGHTS};
use crate::params::{SimParams, SpongeConfig};

/// Velocity damping factor from the sponge frame, 1.0 outside it.
/// Overlapping sponge edges resolve to the nearest one.
#[inline]
fn sponge_factor(x: usize, y: usize, w: usize, h: usize, sponge: &SpongeConfig) -> f32 {
    let mut d = f32::INFINITY;
    if sponge.edges[Edge::Left.index()] {
        d = d.min(x as f32);
    }
    if sponge.edges[Edge::Right.index()] {
        d = d.min((w - 1 - x) as f32);
    }
    if sponge.edges[Edge::Top.index()] {
        d = d.min(y as f32);
    }
    if sponge.edges[Edge::Bottom.index()] {
        d = d.min((h - 1 - y) as f32);
    }
    if d >= sponge.width {
        return 1.0;
    }
    let t = 1.0 - d / sponge.width;
    (1.0 - sponge.strength * t * t).max(0.0)
}

/// Free-slip reflection table for an edge: vertical walls mirror cx,
/// horizontal walls mirror cy.
#[inline]
fn slip_for(edge: Edge, k: usize) -> usize {
    match edge {
        Edge::Left | Edge::Right => SLIP_V[k],
        Edge::Top | Edge::Bottom => SLIP_H[k],
    }
}

/// Resolve a single-edge crossing to the reflected direction and the
/// (possibly momentum-kicked) population value.
///
/// At a corner whose two walls disagree on the reflection map, free-slip
/// demotes to plain bounce-back (`slip_corner`); only the opposite-map
/// keeps every incoming slot covered exactly once there.
#[inline]
fn reflect(
    bounds: &BoundaryConfig,
    edge: Edge,
    k: usize,
    rho: f32,
    slip_corner: bool,
    value: f32,
) -> (usize, f32) {
    match bounds.policy(edge) {
        EdgePolicy::FreeSlip if !slip_corner => (slip_for(edge, k), value),
        EdgePolicy::MovingWall => {
            let dest = OPP[k];
            let wall = bounds.wall_velocity(edge);
            let kick =
                6.0 * WEIGHTS[k] * rho * (CX[dest] as f32 * wall.x + CY[dest] as f32 * wall.y);
            (dest, value + kick)
        }
        _ => (OPP[k], value),
    }
}

/// One collide-and-stream pass: reads `f`, writes `f_new` and the
/// macroscopic fields. The caller swaps `f` and `f_new` afterwards.
pub(crate) fn collide_and_stream(
    grid: &mut FieldGrid,
    params: &SimParams,
    bounds: &BoundaryConfig,
    pool: &ThreadPool,
) {
    let w = grid.width;
    let h = grid.height;
    let params = *params;
    let bounds = *bounds;

    let FieldGrid {
        f,
        f_new,
        rho,
        ux,
        uy,
        barriers,
        porosity,
        temperature,
        force_x,
        force_y,
        ..
    } = grid;

    let fr: [&[f32]; Q] = core::array::from_fn(|k| f[k].as_slice());
    let fw: [SharedPtr<f32>; Q] = core::array::from_fn(|k| SharedPtr::new(f_new[k].as_mut_ptr()));
    let rho_out = SharedPtr::new(rho.as_mut_ptr());
    let ux_out = SharedPtr::new(ux.as_mut_ptr());
    let uy_out = SharedPtr::new(uy.as_mut_ptr());
    let barriers: &[u8] = barriers.as_slice();
    let porosity: &[f32] = porosity.as_slice();
    let temperature: &[f32] = temperature.as_slice();
    let force_x: &[f32] = force_x.as_slice();
    let force_y: &[f32] = force_y.as_slice();

    let closures_active = params.closures_active();
    let strain_closures = params.strain_closures_active();
    let sponge_on = params.sponge.active();
    let drag_on = params.global_drag != 0.0 || params.porosity_drag != 0.0;

    pool.parallel_for(0, h, |y_start, y_end| {
        for y in y_start..y_end {
            let y_edge = if y == 0 {
                Some(Edge::Top)
            } else if y + 1 == h {
                Some(Edge::Bottom)
            } else {
                None
            };

            for x in 0..w {
                let i = y * w + x;

                if barriers[i] != 0 {
                    unsafe {
                        rho_out.write(i, 1.0);
                        ux_out.write(i, 0.0);
                        uy_out.write(i, 0.0);
                        for k in 0..Q {
                            fw[k].write(i, WEIGHTS[k]);
                        }
                    }
                    continue;
                }

                // ========== Moment reduction ==========
                let mut r = 0.0f32;
                let mut mx = 0.0f32;
                let mut my = 0.0f32;
                for k in 0..Q {
                    let fk = fr[k][i];
                    r += fk;
                    mx += CX[k] as f32 * fk;
                    my += CY[k] as f32 * fk;
                }
                let (mut u, mut v) = if r > 0.0 { (mx / r, my / r) } else { (0.0, 0.0) };

                // ========== Body forces ==========
                u += (params.gravity.x + force_x[i]) * params.dt;
                v += (params.gravity.y + force_y[i]) * params.dt;
                if params.thermal_expansion != 0.0 {
                    v += params.gravity.y
                        * params.thermal_expansion
                        * (temperature[i] - params.reference_temperature)
                        * params.dt;
                }
                if drag_on {
                    let drag =
                        params.global_drag + params.porosity_drag * (1.0 - porosity[i]);
                    let keep = (1.0 - drag).max(0.0);
                    u *= keep;
                    v *= keep;
                }
                if sponge_on {
                    let factor = sponge_factor(x, y, w, h, &params.sponge);
                    u *= factor;
                    v *= factor;
                }
                let (u, v) = limit_velocity(u, v, params.max_velocity);

                unsafe {
                    rho_out.write(i, r);
                    ux_out.write(i, u);
                    uy_out.write(i, v);
                }

                let feq = equilibrium(r, u, v);

                // ========== Closure-adjusted relaxation ==========
                let mut omega = params.omega;
                if closures_active {
                    let mut nu = (1.0 / omega - 0.5) / 3.0;
                    if params.temperature_viscosity > 0.0 {
                        nu /= 1.0 + params.temperature_viscosity * temperature[i];
                    }
                    if strain_closures {
                        // Non-equilibrium second moment; the rest direction
                        // contributes nothing.
                        let mut qxx = 0.0f32;
                        let mut qxy = 0.0f32;
                        let mut qyy = 0.0f32;
                        for k in 1..Q {
                            let d = fr[k][i] - feq[k];
                            let cxk = CX[k] as f32;
                            let cyk = CY[k] as f32;
                            qxx += cxk * cxk * d;
                            qxy += cxk * cyk * d;
                            qyy += cyk * cyk * d;
                        }
                        let strain =
                            (qxx * qxx + 2.0 * qxy * qxy + qyy * qyy).sqrt() * 1.5 * omega;
                        if params.power_law_k > 0.0 && strain > 1e-12 {
                            nu *= 1.0
                                + params.power_law_k * strain.powf(params.power_law_n - 1.0);
                        }
                        if params.smagorinsky > 0.0 {
                            nu += params.smagorinsky * params.smagorinsky * strain;
                        }
                    }
                    omega = (1.0 / (3.0 * nu + 0.5)).clamp(0.05, 1.95);
                }

                // ========== BGK collision ==========
                let mut f_post = [0.0f32; Q];
                for k in 0..Q {
                    f_post[k] = fr[k][i] * (1.0 - omega) + feq[k] * omega;
                }

                // ========== Streaming (scatter-push) ==========
                unsafe { fw[0].write(i, f_post[0]) };

                let x_edge = if x == 0 {
                    Some(Edge::Left)
                } else if x + 1 == w {
                    Some(Edge::Right)
                } else {
                    None
                };
                let slip_corner = matches!((x_edge, y_edge), (Some(ex), Some(ey))
                    if bounds.policy(ex) != EdgePolicy::Periodic
                        && bounds.policy(ey) != EdgePolicy::Periodic
                        && (bounds.policy(ex) == EdgePolicy::FreeSlip
                            || bounds.policy(ey) == EdgePolicy::FreeSlip));

                for k in 1..Q {
                    let mut nx = x as i32 + CX[k];
                    let mut ny = y as i32 + CY[k];
                    let mut crossed_x: Option<Edge> = None;
                    let mut crossed_y: Option<Edge> = None;

                    if nx < 0 {
                        if bounds.policy(Edge::Left) == EdgePolicy::Periodic {
                            nx = w as i32 - 1;
                        } else {
                            crossed_x = Some(Edge::Left);
                        }
                    } else if nx >= w as i32 {
                        if bounds.policy(Edge::Right) == EdgePolicy::Periodic {
                            nx = 0;
                        } else {
                            crossed_x = Some(Edge::Right);
                        }
                    }
                    if ny < 0 {
                        if bounds.policy(Edge::Top) == EdgePolicy::Periodic {
                            ny = h as i32 - 1;
                        } else {
                            crossed_y = Some(Edge::Top);
                        }
                    } else if ny >= h as i32 {
                        if bounds.policy(Edge::Bottom) == EdgePolicy::Periodic {
                            ny = 0;
                        } else {
                            crossed_y = Some(Edge::Bottom);
                        }
                    }

                    match (crossed_x, crossed_y) {
                        (None, None) => {
                            let j = ny as usize * w + nx as usize;
                            if barriers[j] != 0 {
                                // Solid neighbor: bounce back at the source.
                                unsafe { fw[OPP[k]].write(i, f_post[k]) };
                            } else {
                                unsafe { fw[k].write(j, f_post[k]) };
                            }
                        }
                        (Some(edge), None) | (None, Some(edge)) => {
                            let (dest, value) =
                                reflect(&bounds, edge, k, r, slip_corner, f_post[k]);
                            unsafe { fw[dest].write(i, value) };
                        }
                        (Some(_), Some(_)) => {
                            // Leaving through a domain corner: full
                            // bounce-back regardless of the edge policies.
                            unsafe { fw[OPP[k]].write(i, f_post[k]) };
                        }
                    }
                }
            }
        }
    });
}

/// Recompute `rho`, `ux`, `uy` from the streamed populations so host
/// views, the advector, and the confinement pass all see post-stream
/// state. Applies the velocity cap; no body forces here.
pub(crate) fn refresh_macroscopics(grid: &mut FieldGrid, max_velocity: f32, pool: &ThreadPool) {
    let w = grid.width;
    let h = grid.height;

    let FieldGrid {
        f,
        rho,
        ux,
        uy,
        barriers,
        ..
    } = grid;

    let fr: [&[f32]; Q] = core::array::from_fn(|k| f[k].as_slice());
    let rho_out = SharedPtr::new(rho.as_mut_ptr());
    let ux_out = SharedPtr::new(ux.as_mut_ptr());
    let uy_out = SharedPtr::new(uy.as_mut_ptr());
    let barriers: &[u8] = barriers.as_slice();

    pool.parallel_for(0, h, |y_start, y_end| {
        for y in y_start..y_end {
            for x in 0..w {
                let i = y * w + x;
                if barriers[i] != 0 {
                    unsafe {
                        rho_out.write(i, 1.0);
                        ux_out.write(i, 0.0);
                        uy_out.write(i, 0.0);
                    }
                    continue;
                }
                let mut r = 0.0f32;
                let mut mx = 0.0f32;
                let mut my = 0.0f32;
                for k in 0..Q {
                    let fk = fr[k][i];
                    r += fk;
                    mx += CX[k] as f32 * fk;
                    my += CY[k] as f32 * fk;
                }
                let (u, v) = if r > 0.0 { (mx / r, my / r) } else { (0.0, 0.0) };
                let (u, v) = limit_velocity(u, v, max_velocity);
                unsafe {
                    rho_out.write(i, r);
                    ux_out.write(i, u);
                    uy_out.write(i, v);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::equilibrium;

    fn run_pass(grid: &mut FieldGrid, params: &SimParams, bounds: &BoundaryConfig) {
        let pool = ThreadPool::new(1);
        collide_and_stream(grid, params, bounds, &pool);
        grid.swap_populations();
        refresh_macroscopics(grid, params.max_velocity, &pool);
    }

    #[test]
    fn test_rest_state_is_stable() {
        let mut grid = FieldGrid::new(8, 8);
        let params = SimParams::default();
        let bounds = BoundaryConfig::periodic();

        for _ in 0..5 {
            run_pass(&mut grid, &params, &bounds);
        }
        for i in 0..64 {
            assert!((grid.rho[i] - 1.0).abs() < 1e-6, "rho drifted at {}", i);
            assert!(grid.ux[i].abs() < 1e-7);
            assert!(grid.uy[i].abs() < 1e-7);
        }
    }

    #[test]
    fn test_barrier_cells_stay_pinned() {
        let mut grid = FieldGrid::new(8, 8);
        let i = grid.idx(4, 4);
        grid.barriers[i] = 1;
        let params = SimParams::default();
        let bounds = BoundaryConfig::periodic();

        run_pass(&mut grid, &params, &bounds);

        assert_eq!(grid.rho[i], 1.0);
        assert_eq!(grid.ux[i], 0.0);
        assert_eq!(grid.uy[i], 0.0);
        for k in 0..Q {
            assert_eq!(grid.f[k][i], WEIGHTS[k]);
        }
    }

    #[test]
    fn test_impulse_streams_to_neighbor() {
        let mut grid = FieldGrid::new(8, 8);
        let i = grid.idx(3, 3);
        let feq = equilibrium(1.0, 0.1, 0.0);
        for k in 0..Q {
            grid.f[k][i] = feq[k];
        }
        let params = SimParams::default();
        let bounds = BoundaryConfig::periodic();

        run_pass(&mut grid, &params, &bounds);

        let right = grid.idx(4, 3);
        assert!(grid.ux[right] > 0.0, "momentum must reach the right neighbor");
        assert!(grid.ux[i] < 0.1, "source cell must shed momentum");
    }

    #[test]
    fn test_interior_barrier_bounces_back() {
        let mut grid = FieldGrid::new(8, 8);
        let wall = grid.idx(4, 3);
        grid.barriers[wall] = 1;

        let i = grid.idx(3, 3);
        let feq = equilibrium(1.0, 0.2, 0.0);
        for k in 0..Q {
            grid.f[k][i] = feq[k];
        }
        let params = SimParams::default();
        let bounds = BoundaryConfig::periodic();

        run_pass(&mut grid, &params, &bounds);

        // The rightward population returned as the leftward one.
        assert!(
            grid.f[3][i] > WEIGHTS[3] + 0.01,
            "bounced population missing: {}",
            grid.f[3][i]
        );
    }

    #[test]
    fn test_every_slot_written_under_all_policies() {
        let configs = [
            BoundaryConfig::periodic(),
            BoundaryConfig::no_slip_box(),
            BoundaryConfig::channel_x(),
            BoundaryConfig::channel_y(),
            BoundaryConfig::slip_box(),
            BoundaryConfig::slip_channel_x(),
            {
                let mut c = BoundaryConfig::default();
                c.policies = [
                    EdgePolicy::Inflow,
                    EdgePolicy::Outflow,
                    EdgePolicy::NoSlip,
                    EdgePolicy::FreeSlip,
                ];
                c.inflow_velocity = glam::Vec2::new(0.05, 0.0);
                c
            },
            {
                let mut c = BoundaryConfig::no_slip_box();
                c.policies[Edge::Top.index()] = EdgePolicy::MovingWall;
                c.wall_velocity[Edge::Top.index()] = glam::Vec2::new(0.1, 0.0);
                c
            },
        ];

        for (ci, bounds) in configs.iter().enumerate() {
            let mut grid = FieldGrid::new(9, 7);
            let barrier_idx = grid.idx(4, 3);
            grid.barriers[barrier_idx] = 1;
            // Poison the streaming target; any slot the pass misses
            // survives as NaN.
            for k in 0..Q {
                grid.f_new[k].fill(f32::NAN);
            }
            let params = SimParams::default();
            let pool = ThreadPool::new(1);
            collide_and_stream(&mut grid, &params, bounds, &pool);
            grid.swap_populations();

            for k in 0..Q {
                for (i, &v) in grid.f[k].iter().enumerate() {
                    assert!(
                        v.is_finite(),
                        "config {}: direction {} cell {} never written",
                        ci,
                        k,
                        i
                    );
                }
            }
        }
    }

    #[test]
    fn test_moving_wall_drags_fluid() {
        let mut grid = FieldGrid::new(16, 16);
        let params = SimParams::default();
        let mut bounds = BoundaryConfig::no_slip_box();
        bounds.policies[Edge::Top.index()] = EdgePolicy::MovingWall;
        bounds.wall_velocity[Edge::Top.index()] = glam::Vec2::new(0.1, 0.0);

        for _ in 0..10 {
            run_pass(&mut grid, &params, &bounds);
        }

        let top_row_mean: f32 = (0..16).map(|x| grid.ux[grid.idx(x, 0)]).sum::<f32>() / 16.0;
        assert!(
            top_row_mean > 1e-4,
            "lid must drag the top row along, got {}",
            top_row_mean
        );
    }

    #[test]
    fn test_mass_conserved_in_closed_box() {
        let mut grid = FieldGrid::new(12, 12);
        // A lumpy but positive initial state.
        for i in 0..144 {
            let bump = 0.02 * ((i % 7) as f32 - 3.0);
            let feq = equilibrium(1.0 + bump, 0.0, 0.0);
            for k in 0..Q {
                grid.f[k][i] = feq[k];
            }
        }
        let params = SimParams::default();
        let bounds = BoundaryConfig::no_slip_box();

        let mass_before: f32 = grid.f.iter().map(|fk| fk.iter().sum::<f32>()).sum();
        for _ in 0..20 {
            run_pass(&mut grid, &params, &bounds);
        }
        let mass_after: f32 = grid.f.iter().map(|fk| fk.iter().sum::<f32>()).sum();

        assert!(
            (mass_before - mass_after).abs() < 1e-3,
            "mass drifted: {} -> {}",
            mass_before,
            mass_after
        );
    }

    #[test]
    fn test_sponge_damps_near_edge() {
        let sponge = SpongeConfig {
            strength: 0.5,
            width: 4.0,
            edges: [true, false, false, false],
        };
        // At the active edge the damping is strongest.
        assert!(sponge_factor(0, 8, 32, 32, &sponge) < sponge_factor(2, 8, 32, 32, &sponge));
        // Outside the frame nothing happens.
        assert_eq!(sponge_factor(10, 8, 32, 32, &sponge), 1.0);
        // Inactive edges contribute nothing.
        assert_eq!(sponge_factor(31, 8, 32, 32, &sponge), 1.0);
    }
}
