//! Initial conditions from orbital descriptions
//!
//! - Keplerian elements (`a`, `e`, period, epoch) to a planar position and
//!   velocity, via Newton-Raphson on Kepler's equation
//! - circular inclined orbits around a central body (3D only)

use std::f64::consts::{PI, TAU};

use crate::error::{Result, SimError};
use crate::simulation::states::{planar, Vector};

/// Newton-Raphson iterations on Kepler's equation
pub const KEPLER_ITERATIONS: usize = 5;

/// Mean anomaly reduced to `(-pi, pi]`
pub fn reduce_anomaly(m: f64) -> f64 {
    let r = m.rem_euclid(TAU);
    if r > PI {
        r - TAU
    } else {
        r
    }
}

/// Solve `M = E - e sin E` for the eccentric anomaly `E`
///
/// `M` is reduced to `(-pi, pi]` first. Starts from `E0 = M`, except for
/// `e > 0.8` where `E0 = M + 0.85 e sign(sin M)` keeps five iterations
/// well inside 1e-6 of the root.
pub fn solve_kepler(mean_anomaly: f64, e: f64) -> f64 {
    let m = reduce_anomaly(mean_anomaly);
    let mut ecc = if e > 0.8 {
        m + 0.85 * e * m.sin().signum()
    } else {
        m
    };

    for _ in 0..KEPLER_ITERATIONS {
        let f = ecc - e * ecc.sin() - m;
        let df = 1.0 - e * ecc.cos();
        ecc -= f / df;
    }
    ecc
}

/// True anomaly from the eccentric anomaly
pub fn true_anomaly(ecc_anomaly: f64, e: f64) -> f64 {
    2.0 * ((1.0 + e).sqrt() * (ecc_anomaly / 2.0).sin())
        .atan2((1.0 - e).sqrt() * (ecc_anomaly / 2.0).cos())
}

/// Keplerian orbit in its own plane, periapsis on the first axis
#[derive(Debug, Clone, Copy)]
pub struct OrbitalElements {
    pub semi_major_axis: f64,
    pub eccentricity: f64,
    pub period: f64,
}

impl OrbitalElements {
    pub fn new(semi_major_axis: f64, eccentricity: f64, period: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&eccentricity) {
            return Err(SimError::InvalidConfig(format!(
                "eccentricity must lie in [0, 1), got {eccentricity}"
            )));
        }
        if !(semi_major_axis > 0.0 && semi_major_axis.is_finite()) {
            return Err(SimError::InvalidConfig(format!(
                "semi-major axis must be positive, got {semi_major_axis}"
            )));
        }
        if !(period > 0.0 && period.is_finite()) {
            return Err(SimError::InvalidConfig(format!("period must be positive, got {period}")));
        }
        Ok(Self {
            semi_major_axis,
            eccentricity,
            period,
        })
    }

    pub fn mean_motion(&self) -> f64 {
        TAU / self.period
    }

    /// Position and velocity at time `t` after periapsis passage
    pub fn state_at<const D: usize>(&self, t: f64) -> Result<(Vector<D>, Vector<D>)> {
        let (a, e) = (self.semi_major_axis, self.eccentricity);
        let n = self.mean_motion();
        let ecc = solve_kepler(n * t, e);
        let theta = true_anomaly(ecc, e);
        let r = a * (1.0 - e * ecc.cos());

        let position = planar::<D>(r * theta.cos(), r * theta.sin())?;

        // perifocal velocity: n a / (1 - e cos E) (-sin E, sqrt(1 - e^2) cos E)
        let k = n * a / (1.0 - e * ecc.cos());
        let velocity = planar::<D>(-k * ecc.sin(), k * (1.0 - e * e).sqrt() * ecc.cos())?;

        Ok((position, velocity))
    }
}

/// Speed of a circular orbit of radius `r` around mass `m`
pub fn circular_speed(g: f64, m: f64, r: f64) -> f64 {
    (g * m / r).sqrt()
}

/// Circular orbit of radius `r` inclined by `inclination` (radians) about
/// the first axis, at orbital phase `phase`; relative to the central body
pub fn inclined_orbit<const D: usize>(
    g: f64,
    central_mass: f64,
    r: f64,
    inclination: f64,
    phase: f64,
) -> Result<(Vector<D>, Vector<D>)> {
    if D != 3 {
        return Err(SimError::InvalidConfig(format!(
            "inclined orbits need a 3D scenario, this one has {D} dimensions"
        )));
    }
    if !(r > 0.0 && r.is_finite()) {
        return Err(SimError::InvalidConfig(format!("orbit radius must be positive, got {r}")));
    }

    let v = circular_speed(g, central_mass, r);
    let (sin_t, cos_t) = phase.sin_cos();
    let (sin_i, cos_i) = inclination.sin_cos();

    let mut x = Vector::<D>::zeros();
    x[0] = r * cos_t;
    x[1] = r * sin_t * cos_i;
    x[2] = r * sin_t * sin_i;

    let mut u = Vector::<D>::zeros();
    u[0] = -v * sin_t;
    u[1] = v * cos_t * cos_i;
    u[2] = v * cos_t * sin_i;

    Ok((x, u))
}
