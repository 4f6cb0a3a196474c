//! Property tests for the numeric kernels.

use proptest::prelude::*;
use sim2d::lattice::{equilibrium, limit_velocity, CX, CY, Q};
use sim2d::LbmSimulation;

proptest! {
    /// The discrete equilibrium reproduces its defining moments exactly
    /// (up to f32 rounding): mass rho and momentum rho * u.
    #[test]
    fn equilibrium_moments_are_exact(
        rho in 0.1f32..3.0,
        u in -0.4f32..0.4,
        v in -0.4f32..0.4,
    ) {
        let feq = equilibrium(rho, u, v);

        let mass: f32 = feq.iter().sum();
        prop_assert!((mass - rho).abs() < 1e-4);

        let mx: f32 = (0..Q).map(|k| CX[k] as f32 * feq[k]).sum();
        let my: f32 = (0..Q).map(|k| CY[k] as f32 * feq[k]).sum();
        prop_assert!((mx - rho * u).abs() < 1e-4);
        prop_assert!((my - rho * v).abs() < 1e-4);
    }

    /// The limiter never produces a speed above the cap and never touches
    /// vectors already under it.
    #[test]
    fn velocity_limiter_caps_speed(
        u in -5.0f32..5.0,
        v in -5.0f32..5.0,
        max in 0.01f32..0.57,
    ) {
        let (cu, cv) = limit_velocity(u, v, max);
        prop_assert!((cu * cu + cv * cv).sqrt() <= max * (1.0 + 1e-5));

        if (u * u + v * v).sqrt() <= max {
            prop_assert_eq!((cu, cv), (u, v));
        }
    }

    /// Dye injection can never drive the field negative.
    #[test]
    fn dye_never_goes_negative(amounts in prop::collection::vec(-5.0f32..5.0, 1..20)) {
        let mut sim = LbmSimulation::new(8, 8);
        for (n, amount) in amounts.iter().enumerate() {
            let x = (n % 8) as i32;
            let y = (n / 8 % 8) as i32;
            sim.add_density(x, y, *amount);
        }
        prop_assert!(sim.dye().iter().all(|&d| d >= 0.0));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Whatever impulse the host throws at a cell, the post-step speed
    /// stays under the cap everywhere.
    #[test]
    fn stepping_respects_the_velocity_cap(
        fx in -2.0f32..2.0,
        fy in -2.0f32..2.0,
    ) {
        let mut sim = LbmSimulation::new(24, 24);
        sim.set_gravity(0.0, 0.05);
        sim.add_force(12, 12, fx, fy);
        sim.step(3);

        for (u, v) in sim.velocity_x().iter().zip(sim.velocity_y()) {
            prop_assert!((u * u + v * v).sqrt() <= 0.57 + 1e-5);
        }
    }
}
