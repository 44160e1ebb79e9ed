//! Post-Newtonian two-body dynamics
//!
//! Relative acceleration of an isolated binary in harmonic gauge, carried
//! to 1PN (conservative, periastron advance) and 2.5PN (radiation
//! reaction). The 2.5PN drag is what shrinks the orbit: no radiated energy
//! is integrated explicitly.
//!
//! With `M = m1 + m2`, `eta = m1 m2 / M^2`, `n = r/|r|` and `rdot = n.v`:
//!
//! ```text
//! a = -(GM/r^2) [ (1 + A) n + B v ]
//! A_1   = [ (1+3eta) v^2 - 3/2 eta rdot^2 - 2(2+eta) GM/r ] / c^2
//! B_1   = -2(2-eta) rdot / c^2
//! A_2.5 = -8/5 eta (GM/r) rdot [ 18 v^2 + 2/3 GM/r - 25 rdot^2 ] / c^5
//! B_2.5 =  8/5 eta (GM/r) [ 6 v^2 - 2 GM/r - 15 rdot^2 ] / c^5
//! ```

use crate::error::{Result, SimError};
use crate::simulation::forces::ForceModel;
use crate::simulation::states::{Body, SystemState, Vector};

#[derive(Debug, Clone)]
pub struct PostNewtonianBinary {
    pub g: f64,
    pub c: f64,
    pub primaries: (usize, usize),
}

impl PostNewtonianBinary {
    pub fn new(g: f64, c: f64, primaries: (usize, usize)) -> Self {
        Self { g, c, primaries }
    }

    /// Acceleration of `r = x2 - x1`, summing the Newtonian, 1PN and 2.5PN terms
    pub fn relative_acceleration<const D: usize>(
        &self,
        m1: f64,
        m2: f64,
        r_vec: &Vector<D>,
        v_vec: &Vector<D>,
    ) -> Vector<D> {
        let r = r_vec.norm();
        if r == 0.0 {
            return Vector::<D>::zeros();
        }

        let m = m1 + m2;
        let eta = m1 * m2 / (m * m);
        let gm = self.g * m;
        let gm_r = gm / r;

        let n = r_vec / r;
        let v2 = v_vec.norm_squared();
        let rdot = n.dot(v_vec);

        let c2 = self.c * self.c;
        let c5 = c2 * c2 * self.c;

        let a_1pn = ((1.0 + 3.0 * eta) * v2 - 1.5 * eta * rdot * rdot - 2.0 * (2.0 + eta) * gm_r) / c2;
        let b_1pn = -2.0 * (2.0 - eta) * rdot / c2;

        let a_25pn = -1.6 * eta * gm_r * rdot
            * (18.0 * v2 + (2.0 / 3.0) * gm_r - 25.0 * rdot * rdot)
            / c5;
        let b_25pn = 1.6 * eta * gm_r * (6.0 * v2 - 2.0 * gm_r - 15.0 * rdot * rdot) / c5;

        let scale = -gm / (r * r);
        (n * (1.0 + a_1pn + a_25pn) + v_vec * (b_1pn + b_25pn)) * scale
    }
}

impl<const D: usize> ForceModel<D> for PostNewtonianBinary {
    fn accumulate(&self, state: &SystemState<D>, out: &mut [Vector<D>]) {
        let (i, j) = self.primaries;
        if i >= state.len() || j >= state.len() || i == j {
            return;
        }
        let (b1, b2) = (&state.bodies[i], &state.bodies[j]);
        let m = b1.mass + b2.mass;

        let r = b2.position - b1.position;
        let v = b2.velocity - b1.velocity;
        let a_rel = self.relative_acceleration(b1.mass, b2.mass, &r, &v);

        // Split about the centre of mass: m1 a1 + m2 a2 = 0
        out[i] -= a_rel * (b2.mass / m);
        out[j] += a_rel * (b1.mass / m);
    }

    fn potential_energy(&self, state: &SystemState<D>) -> f64 {
        let (i, j) = self.primaries;
        if i >= state.len() || j >= state.len() || i == j {
            return 0.0;
        }
        let r = state.separation(i, j);
        if r == 0.0 {
            return 0.0;
        }
        -self.g * state.bodies[i].mass * state.bodies[j].mass / r
    }
}

/// Relative velocity that starts a binary on a quasi-circular inspiral
#[derive(Debug, Clone, Copy)]
pub struct InspiralStart {
    pub tangential: f64, // circular speed solving the 1PN radial balance
    pub radial: f64,     // Peters drift, negative
}

/// Initial relative speeds for a binary of `m1`, `m2` at `separation`
///
/// Solves `v^2/r = GM/r^2 (1 + A_1)` with `rdot = 0` for the tangential
/// speed and adds the quadrupole-formula drift
/// `rdot = -64/5 eta (GM)^3 / (c^5 r^3)`, so radiation reaction does not
/// kick the orbit into a residual eccentricity.
pub fn quasi_circular(m1: f64, m2: f64, separation: f64, g: f64, c: f64) -> Result<InspiralStart> {
    if !(separation > 0.0 && separation.is_finite()) {
        return Err(SimError::InvalidConfig(format!(
            "binary separation must be positive, got {separation}"
        )));
    }
    let m = m1 + m2;
    let eta = m1 * m2 / (m * m);
    let gm = g * m;
    let x = gm / (separation * c * c);

    let numerator = 1.0 - 2.0 * (2.0 + eta) * x;
    let denominator = 1.0 - (1.0 + 3.0 * eta) * x;
    if numerator <= 0.0 || denominator <= 0.0 {
        return Err(SimError::InvalidConfig(format!(
            "separation {separation} is inside the 1PN circular-orbit limit (GM/rc^2 = {x:.3})"
        )));
    }
    let u = numerator / denominator;

    Ok(InspiralStart {
        tangential: (u * gm / separation).sqrt(),
        radial: -12.8 * eta * gm.powi(3) / (c.powi(5) * separation.powi(3)),
    })
}

/// Place a binary on the first axis with its centre of mass at the origin,
/// orbiting counter-clockwise in the (x, y) plane
pub fn binary_bodies<const D: usize>(
    m1: f64,
    m2: f64,
    separation: f64,
    relative_velocity: (f64, f64),
) -> Result<[Body<D>; 2]> {
    if D < 2 {
        return Err(SimError::InvalidConfig("a binary needs at least 2 dimensions".into()));
    }
    let m = m1 + m2;

    let mut r = Vector::<D>::zeros();
    r[0] = separation;
    let mut v = Vector::<D>::zeros();
    v[0] = relative_velocity.0;
    v[1] = relative_velocity.1;

    let b1 = Body::new(0, m1, r * (-m2 / m), v * (-m2 / m))?;
    let b2 = Body::new(1, m2, r * (m1 / m), v * (m1 / m))?;
    Ok([b1, b2])
}
