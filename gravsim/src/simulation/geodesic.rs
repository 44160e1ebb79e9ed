//! Equatorial Kerr geodesics for a single photon or massive particle
//!
//! Geometrised units throughout (G = c = M = 1): radii are in units of the
//! gravitational radius `r_g = GM/c^2`. The reduced phase-space state is
//! `y = (r, phi, p_r)` with conserved energy `E` and angular momentum
//! `L = b E`. With `Delta = r^2 - 2r + a^2`:
//!
//! ```text
//! P = E (r^2 + a^2) - a L
//! Q = mu r^2 + (L - a E)^2            mu = 0 photon, 1 massive
//! V = (P^2 - Delta Q) / r^4           radial "kinetic" radicand
//! dr/dl   = p_r
//! dphi/dl = (a P / Delta - (a E - L)) / r^2
//! dp_r/dl = V'(r) / 2
//! ```
//!
//! A negative radicand or a non-positive `Delta` is not an error: the
//! sample reports `terminated` and the tracer stops there.

use log::{debug, info};
use nalgebra::Vector3;
use serde::Deserialize;

use crate::error::{Result, SimError};
use crate::simulation::events::{Phase, TerminationReason};
use crate::simulation::integrator::{rk4, OdeState, OdeSystem};

/// Physical constants used to convert geometrised radii into metres
pub const G_SI: f64 = 6.67430e-11;
pub const C_SI: f64 = 299_792_458.0;

pub type GeodesicState = Vector3<f64>;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParticleKind {
    #[default]
    Photon,
    Massive,
}

impl ParticleKind {
    fn mu(self) -> f64 {
        match self {
            ParticleKind::Photon => 0.0,
            ParticleKind::Massive => 1.0,
        }
    }
}

/// Result of one field evaluation
#[derive(Debug, Clone, Copy)]
pub struct FieldSample {
    pub derivative: GeodesicState,
    pub terminated: Option<TerminationReason>,
}

impl FieldSample {
    fn stopped(reason: TerminationReason) -> Self {
        Self {
            derivative: GeodesicState::zeros(),
            terminated: Some(reason),
        }
    }
}

/// Slack on the radicand sign test, in units of `E^2`. RK4 stages overshoot
/// a turning point by a little; a genuinely forbidden state is far below it.
pub const RADICAND_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone)]
pub struct GeodesicField {
    pub spin: f64,             // a, |a| < 1
    pub energy: f64,           // E
    pub angular_momentum: f64, // L = b E
    pub particle: ParticleKind,
}

impl GeodesicField {
    pub fn new(spin: f64, impact_parameter: f64, energy: f64, particle: ParticleKind) -> Result<Self> {
        if !(spin.is_finite() && spin.abs() < 1.0) {
            return Err(SimError::InvalidConfig(format!("spin must satisfy |a| < 1, got {spin}")));
        }
        if !(energy.is_finite() && energy > 0.0) {
            return Err(SimError::InvalidConfig(format!("energy must be positive, got {energy}")));
        }
        if !impact_parameter.is_finite() {
            return Err(SimError::InvalidConfig("impact parameter must be finite".into()));
        }
        Ok(Self {
            spin,
            energy,
            angular_momentum: impact_parameter * energy,
            particle,
        })
    }

    /// Outer event horizon `r+ = 1 + sqrt(1 - a^2)`
    pub fn horizon(&self) -> f64 {
        1.0 + (1.0 - self.spin * self.spin).sqrt()
    }

    pub fn delta(&self, r: f64) -> f64 {
        r * r - 2.0 * r + self.spin * self.spin
    }

    /// Radicand `V(r)` and its derivative `V'(r)`
    pub fn radicand(&self, r: f64) -> (f64, f64) {
        let (a, e, l) = (self.spin, self.energy, self.angular_momentum);
        let mu = self.particle.mu();

        let p = e * (r * r + a * a) - a * l;
        let q = mu * r * r + (l - a * e).powi(2);
        let delta = self.delta(r);
        let big_r = p * p - delta * q;

        let dp = 2.0 * e * r;
        let dq = 2.0 * mu * r;
        let ddelta = 2.0 * r - 2.0;
        let d_big_r = 2.0 * p * dp - ddelta * q - delta * dq;

        let r4 = r.powi(4);
        (big_r / r4, d_big_r / r4 - 4.0 * big_r / (r4 * r))
    }

    /// Right-hand side `(dr, dphi, dp_r)` at `y`
    pub fn sample(&self, y: &GeodesicState) -> FieldSample {
        let r = y[0];
        let delta = self.delta(r);
        if !(r > 0.0) || !(delta > 0.0) {
            return FieldSample::stopped(TerminationReason::HorizonCrossed);
        }
        let (v, dv) = self.radicand(r);
        if !(v >= -RADICAND_TOLERANCE * self.energy * self.energy) {
            return FieldSample::stopped(TerminationReason::Unphysical);
        }

        let (a, e, l) = (self.spin, self.energy, self.angular_momentum);
        let p = e * (r * r + a * a) - a * l;
        let dphi = (a * p / delta - (a * e - l)) / (r * r);

        FieldSample {
            derivative: GeodesicState::new(y[2], dphi, 0.5 * dv),
            terminated: None,
        }
    }

    /// Inward radial momentum `-sqrt(V(r0))`; `None` if `r0` is forbidden
    pub fn initial_radial_momentum(&self, r0: f64) -> Option<f64> {
        let (v, _) = self.radicand(r0);
        (v >= 0.0 && self.delta(r0) > 0.0).then(|| -v.sqrt())
    }

    /// Critical impact parameter of a prograde (`a > 0`) or retrograde
    /// (`a < 0`) equatorial photon orbit; smaller `b` is captured
    pub fn critical_impact_parameter(spin: f64) -> f64 {
        // photon sphere: r_ph = 2 (1 + cos(2/3 acos(-a)))
        let r_ph = 2.0 * (1.0 + ((2.0 / 3.0) * (-spin).acos()).cos());
        // b_c = -(r^3 - 3 r^2 + a^2 r + a^2) / (a (r - 1)), Schwarzschild limit 3 sqrt(3)
        if spin.abs() < 1e-12 {
            return 3.0 * 3.0_f64.sqrt();
        }
        -(r_ph.powi(3) - 3.0 * r_ph * r_ph + spin * spin * r_ph + spin * spin) / (spin * (r_ph - 1.0))
    }
}

impl OdeState for GeodesicState {
    fn add_scaled(&self, k: &Self, h: f64) -> Self {
        self + k * h
    }
}

impl OdeSystem for GeodesicField {
    type State = GeodesicState;
    type Halt = TerminationReason;

    fn derivative(&self, y: &GeodesicState) -> std::result::Result<GeodesicState, TerminationReason> {
        let sample = self.sample(y);
        match sample.terminated {
            Some(reason) => Err(reason),
            None => Ok(sample.derivative),
        }
    }
}

/// One recorded point of a traced geodesic
#[derive(Debug, Clone, Copy)]
pub struct TrajectoryPoint {
    pub lambda: f64,
    pub r: f64,
    pub phi: f64,
    pub x: f64,          // cartesian, scaled by `length_scale`
    pub y: f64,
    pub dilation: f64,   // 1 / (1 - r+/r)
    pub redshift: f64,   // min(1, sqrt(r+/r)), 0 far away, 1 at the horizon
}

/// Steps a single particle along its geodesic and records the trajectory
#[derive(Debug, Clone)]
pub struct GeodesicTracer {
    pub field: GeodesicField,
    pub state: GeodesicState,
    pub lambda: f64,
    pub step: f64,
    pub escape_radius: f64,
    pub length_scale: f64, // metres per geometrised unit (1.0 keeps r_g units)
    phase: Phase,
    trajectory: Vec<TrajectoryPoint>,
}

impl GeodesicTracer {
    /// Start at `(r0, phi0)` moving inward
    pub fn new(field: GeodesicField, r0: f64, phi0: f64, step: f64) -> Result<Self> {
        if !(step.is_finite() && step > 0.0) {
            return Err(SimError::InvalidConfig(format!("geodesic step must be positive, got {step}")));
        }
        if !(r0 > field.horizon()) {
            return Err(SimError::InvalidConfig(format!(
                "start radius {r0} must lie outside the horizon {:.4}",
                field.horizon()
            )));
        }
        let p_r = field.initial_radial_momentum(r0).ok_or_else(|| {
            SimError::InvalidConfig(format!("start radius {r0} is classically forbidden for this impact parameter"))
        })?;

        Ok(Self {
            escape_radius: 10.0 * r0,
            length_scale: 1.0,
            field,
            state: GeodesicState::new(r0, phi0, p_r),
            lambda: 0.0,
            step,
            phase: Phase::Orbiting,
            trajectory: Vec::new(),
        })
    }

    pub fn with_escape_radius(mut self, escape_radius: f64) -> Self {
        self.escape_radius = escape_radius;
        self
    }

    /// Scale recorded cartesian points by `r_g` of a `mass_kg` black hole
    pub fn with_mass_kg(mut self, mass_kg: f64) -> Self {
        self.length_scale = G_SI * mass_kg / (C_SI * C_SI);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn trajectory(&self) -> &[TrajectoryPoint] {
        &self.trajectory
    }

    fn terminate(&mut self, reason: TerminationReason) {
        info!(
            "geodesic terminated ({reason:?}) at lambda = {:.4}, r = {:.4}",
            self.lambda, self.state[0]
        );
        self.phase = Phase::Terminated(reason);
    }

    /// Advance one step; returns false once the trajectory has ended
    pub fn tick(&mut self) -> bool {
        if self.phase != Phase::Orbiting {
            return false;
        }

        let next = match rk4(&self.field, &self.state, self.step) {
            Ok(next) => next,
            Err(reason) => {
                self.terminate(reason);
                return false;
            }
        };

        if !next.iter().all(|c| c.is_finite()) {
            self.terminate(TerminationReason::Unphysical);
            return false;
        }

        let r = next[0];
        let r_plus = self.field.horizon();
        if r <= r_plus {
            self.terminate(TerminationReason::HorizonCrossed);
            return false;
        }

        self.state = next;
        self.lambda += self.step;
        self.trajectory.push(TrajectoryPoint {
            lambda: self.lambda,
            r,
            phi: next[1],
            x: r * next[1].cos() * self.length_scale,
            y: r * next[1].sin() * self.length_scale,
            dilation: 1.0 / (1.0 - r_plus / r),
            redshift: (r_plus / r).sqrt().min(1.0),
        });

        if r >= self.escape_radius {
            self.terminate(TerminationReason::Escaped);
            return false;
        }
        true
    }

    /// Tick up to `steps` times and return what was recorded
    ///
    /// A trajectory that ends early is shorter than `steps`.
    pub fn trace(&mut self, steps: usize) -> &[TrajectoryPoint] {
        for _ in 0..steps {
            if !self.tick() {
                break;
            }
        }
        debug!(
            "traced {} of {steps} steps, phase {:?}",
            self.trajectory.len(),
            self.phase
        );
        &self.trajectory
    }
}
