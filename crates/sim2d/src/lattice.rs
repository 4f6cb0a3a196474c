//! D2Q9 lattice constants and the discrete Maxwell-Boltzmann equilibrium.
//!
//! Direction 0 is the rest population, 1-4 are axial, 5-8 diagonal:
//!
//! ```text
//!   6  2  5
//!   3  0  1        (y grows downward, matching the row-major grid)
//!   7  4  8
//! ```

/// Number of discrete lattice velocities.
pub const Q: usize = 9;

/// X component of each lattice direction.
pub const CX: [i32; Q] = [0, 1, 0, -1, 0, 1, -1, -1, 1];

/// Y component of each lattice direction.
pub const CY: [i32; Q] = [0, 0, 1, 0, -1, 1, 1, -1, -1];

/// 180-degree reflection, used for no-slip bounce-back.
pub const OPP: [usize; Q] = [0, 3, 4, 1, 2, 7, 8, 5, 6];

/// Reflection across the x axis (flips cy), used for free-slip at
/// horizontal (top/bottom) walls.
pub const SLIP_H: [usize; Q] = [0, 1, 4, 3, 2, 8, 7, 6, 5];

/// Reflection across the y axis (flips cx), used for free-slip at
/// vertical (left/right) walls.
pub const SLIP_V: [usize; Q] = [0, 3, 2, 1, 4, 6, 5, 8, 7];

/// Quadrature weights: 4/9 rest, 1/9 axial, 1/36 diagonal.
pub const WEIGHTS: [f32; Q] = [
    4.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
];

/// Lattice speed of sound, `1/sqrt(3)`. Macroscopic velocities must stay
/// below this for the BGK update to remain stable; the engine caps them
/// well under it (default 0.57).
pub const SOUND_SPEED: f32 = 0.577_350_26;

/// Second-order Maxwell-Boltzmann equilibrium for `(rho, u, v)`:
///
/// `f_eq[k] = w[k] * rho * (1 + 3 c.u + 4.5 (c.u)^2 - 1.5 u.u)`
///
/// Branch-free; the fixed-length loop unrolls. Exact discrete moments:
/// the nine components sum to `rho` and their first moment is `rho * u`.
#[inline]
pub fn equilibrium(rho: f32, u: f32, v: f32) -> [f32; Q] {
    let base = 1.0 - 1.5 * (u * u + v * v);
    let mut feq = [0.0f32; Q];
    for k in 0..Q {
        let cu = CX[k] as f32 * u + CY[k] as f32 * v;
        feq[k] = WEIGHTS[k] * rho * (base + 3.0 * cu + 4.5 * cu * cu);
    }
    feq
}

/// Rescale `(u, v)` onto the cap circle when its magnitude exceeds `max`.
#[inline]
pub fn limit_velocity(u: f32, v: f32, max: f32) -> (f32, f32) {
    let speed_sq = u * u + v * v;
    if speed_sq > max * max {
        let scale = max / speed_sq.sqrt();
        (u * scale, v * scale)
    } else {
        (u, v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        let sum: f32 = WEIGHTS.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "weights sum to {}", sum);
    }

    #[test]
    fn test_opposite_reverses_direction() {
        for k in 0..Q {
            assert_eq!(CX[OPP[k]], -CX[k]);
            assert_eq!(CY[OPP[k]], -CY[k]);
            assert_eq!(OPP[OPP[k]], k, "opp must be an involution");
        }
    }

    #[test]
    fn test_slip_tables_flip_one_component() {
        for k in 0..Q {
            // SLIP_H mirrors across the x axis: cy flips, cx survives.
            assert_eq!(CX[SLIP_H[k]], CX[k]);
            assert_eq!(CY[SLIP_H[k]], -CY[k]);
            // SLIP_V mirrors across the y axis: cx flips, cy survives.
            assert_eq!(CX[SLIP_V[k]], -CX[k]);
            assert_eq!(CY[SLIP_V[k]], CY[k]);
            assert_eq!(SLIP_H[SLIP_H[k]], k);
            assert_eq!(SLIP_V[SLIP_V[k]], k);
        }
    }

    #[test]
    fn test_equilibrium_moments() {
        let (rho, u, v) = (1.2, 0.08, -0.05);
        let feq = equilibrium(rho, u, v);

        let mass: f32 = feq.iter().sum();
        assert!((mass - rho).abs() < 1e-5, "zeroth moment {} != {}", mass, rho);

        let mut mx = 0.0;
        let mut my = 0.0;
        for k in 0..Q {
            mx += CX[k] as f32 * feq[k];
            my += CY[k] as f32 * feq[k];
        }
        assert!((mx - rho * u).abs() < 1e-5, "x momentum {} != {}", mx, rho * u);
        assert!((my - rho * v).abs() < 1e-5, "y momentum {} != {}", my, rho * v);
    }

    #[test]
    fn test_rest_equilibrium_is_weights() {
        let feq = equilibrium(1.0, 0.0, 0.0);
        for k in 0..Q {
            assert!((feq[k] - WEIGHTS[k]).abs() < 1e-7);
        }
    }

    #[test]
    fn test_limit_velocity() {
        let (u, v) = limit_velocity(1.0, 0.0, 0.57);
        assert!((u - 0.57).abs() < 1e-6);
        assert_eq!(v, 0.0);

        // Below the cap is untouched, bit for bit.
        let (u, v) = limit_velocity(0.1, -0.2, 0.57);
        assert_eq!(u, 0.1);
        assert_eq!(v, -0.2);
    }
}
