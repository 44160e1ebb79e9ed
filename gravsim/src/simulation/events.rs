//! Phase tracking and merger / ejecta events
//!
//! The [`MergerDetector`] watches the primary pair after every step. When
//! they come within the threshold it fires once, flips the phase to
//! `Merging`, and spawns the ejecta shell as free-streaming tracers. From
//! then on it only counts ticks: the progress scalars a renderer needs
//! (flash, ejecta, shock, merger radius, opacity) are derived from that
//! counter, never from simulation time.

use std::f64::consts::TAU;

use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, SimError};
use crate::simulation::integrator::StepOutcome;
use crate::simulation::states::{SystemState, Tracer, Vector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    HorizonCrossed, // r <= r+
    Unphysical,     // negative radicand or non-finite state
    Escaped,        // r >= escape radius
}

/// Where a run is in its lifecycle; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Orbiting,
    Merging,
    PostEvent,
    Terminated(TerminationReason),
}

impl Phase {
    /// True once the merger has fired (`Merging` or `PostEvent`)
    pub fn is_post_merger(self) -> bool {
        matches!(self, Phase::Merging | Phase::PostEvent)
    }
}

/// Runtime settings of the merger event
#[derive(Debug, Clone)]
pub struct MergerConfig {
    pub primaries: (usize, usize),
    pub threshold: f64,     // separation that counts as contact
    pub flash_ticks: u64,   // ticks until the flash saturates
    pub ejecta_ticks: u64,  // ticks until the ejecta progress saturates
    pub shock_ticks: u64,   // ticks until the shock progress saturates
    pub radius_scale: f64,  // merger radius = radius_scale * sqrt(k + 1)
}

impl MergerConfig {
    pub fn new(primaries: (usize, usize), threshold: f64) -> Self {
        Self {
            primaries,
            threshold,
            flash_ticks: 50,
            ejecta_ticks: 100,
            shock_ticks: 150,
            radius_scale: 5.0e4,
        }
    }
}

/// Ejecta shell: `count` tracers with a speed that grows toward the poles
#[derive(Debug, Clone)]
pub struct EjectaConfig {
    pub count: usize,
    pub v_eq: f64,  // equatorial speed
    pub v_pol: f64, // polar speed
}

impl EjectaConfig {
    /// Speed of a tracer launched at `angle` from the polar axis
    pub fn speed_at(&self, cos_angle: f64) -> f64 {
        self.v_eq + (self.v_pol - self.v_eq) * cos_angle * cos_angle
    }
}

/// Scalars describing how far the event has evolved
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EventProgress {
    pub ticks_since: u64,
    pub flash: f64,
    pub ejecta: f64,
    pub shock: f64,
    pub merger_radius: f64,
    pub opacity: f64, // 1 - flash, for the fading primaries
}

impl EventProgress {
    /// Progress before any event: nothing has started, primaries fully opaque
    pub fn idle() -> Self {
        Self {
            opacity: 1.0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergerDetector {
    config: MergerConfig,
    ejecta: Option<EjectaConfig>,
    rng: ChaCha8Rng,
    fired: bool,
    counter: u64,
}

impl MergerDetector {
    pub fn new(config: MergerConfig, ejecta: Option<EjectaConfig>, seed: u64) -> Result<Self> {
        let (i, j) = config.primaries;
        if i == j {
            return Err(SimError::InvalidConfig(format!(
                "merger primaries must be two different bodies, got ({i}, {j})"
            )));
        }
        if !(config.threshold.is_finite() && config.threshold > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "merger threshold must be positive, got {}",
                config.threshold
            )));
        }
        if config.flash_ticks == 0 || config.ejecta_ticks == 0 || config.shock_ticks == 0 {
            return Err(SimError::InvalidConfig("event tick counts must be at least 1".into()));
        }
        if let Some(e) = &ejecta {
            if !(e.v_eq.is_finite() && e.v_pol.is_finite() && e.v_eq >= 0.0 && e.v_pol >= 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "ejecta speeds must be non-negative, got v_eq = {}, v_pol = {}",
                    e.v_eq, e.v_pol
                )));
            }
        }

        Ok(Self {
            config,
            ejecta,
            rng: ChaCha8Rng::seed_from_u64(seed),
            fired: false,
            counter: 0,
        })
    }

    pub fn primaries(&self) -> (usize, usize) {
        self.config.primaries
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Ticks elapsed since the merger tick (0 on that tick)
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Inspect the post-step state and return the (possibly new) phase
    ///
    /// Fires at most once. On firing, the ejecta are spawned into
    /// `state.tracers` before returning `Merging`.
    pub fn observe<const D: usize>(
        &mut self,
        state: &mut SystemState<D>,
        outcome: StepOutcome,
        phase: Phase,
    ) -> Phase {
        match phase {
            Phase::Orbiting if !self.fired => {
                let (i, j) = self.config.primaries;
                let contact = outcome == StepOutcome::MergerReached
                    || (i < state.len() && j < state.len() && state.separation(i, j) <= self.config.threshold);
                if !contact {
                    return phase;
                }

                self.fired = true;
                let spawned = self.spawn_ejecta(state);
                info!(
                    "merger at t = {:.6e}: separation <= {:.3e}, {spawned} ejecta tracers",
                    state.t, self.config.threshold
                );
                Phase::Merging
            }
            Phase::Merging if self.counter >= self.config.flash_ticks => Phase::PostEvent,
            _ => phase,
        }
    }

    /// Count one tick of event evolution
    pub fn advance(&mut self) {
        if self.fired {
            self.counter += 1;
        }
    }

    /// Tick count at which every progress scalar has saturated
    pub fn saturation_ticks(&self) -> u64 {
        let c = &self.config;
        c.flash_ticks.max(c.ejecta_ticks).max(c.shock_ticks)
    }

    /// The event has played out once the slowest progress scalar is past saturation
    pub fn is_complete(&self) -> bool {
        self.fired && self.counter > self.saturation_ticks()
    }

    pub fn progress(&self) -> EventProgress {
        if !self.fired {
            return EventProgress::idle();
        }
        let k = self.counter as f64;
        let ratio = |ticks: u64| (k / ticks as f64).min(1.0);
        let flash = ratio(self.config.flash_ticks);

        EventProgress {
            ticks_since: self.counter,
            flash,
            ejecta: ratio(self.config.ejecta_ticks),
            shock: ratio(self.config.shock_ticks),
            merger_radius: self.config.radius_scale * (k + 1.0).sqrt(),
            opacity: 1.0 - flash,
        }
    }

    /// Launch the ejecta shell from the primaries' centre of mass
    ///
    /// The polar axis is the last component. In 2D the angle from it is
    /// uniform in `[0, 2pi)`; in 3D directions are uniform on the sphere.
    fn spawn_ejecta<const D: usize>(&mut self, state: &mut SystemState<D>) -> usize {
        let Some(ejecta) = self.ejecta.clone() else {
            return 0;
        };
        if D < 2 {
            warn!("ejecta need at least 2 dimensions, skipping spawn");
            return 0;
        }

        let (i, j) = self.config.primaries;
        let origin = if i < state.len() && j < state.len() {
            state.center_of_mass(&[i, j])
        } else {
            Vector::<D>::zeros()
        };

        state.tracers.reserve(ejecta.count);
        for _ in 0..ejecta.count {
            let (direction, cos_polar) = self.sample_direction::<D>();
            let speed = ejecta.speed_at(cos_polar);
            state.tracers.push(Tracer {
                position: origin,
                velocity: direction * speed,
            });
        }
        debug!("spawned {} tracers at {:?}", ejecta.count, origin.as_slice());
        ejecta.count
    }

    /// Unit direction plus the cosine of its angle from the polar axis
    fn sample_direction<const D: usize>(&mut self) -> (Vector<D>, f64) {
        let mut dir = Vector::<D>::zeros();
        let polar = D - 1;

        if D == 2 {
            let alpha = self.rng.gen_range(0.0..TAU);
            dir[0] = alpha.sin();
            dir[polar] = alpha.cos();
            return (dir, alpha.cos());
        }

        // uniform on the sphere spanned by axes 0, 1 and the polar axis
        let cos_theta: f64 = self.rng.gen_range(-1.0..=1.0);
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let phi = self.rng.gen_range(0.0..TAU);
        dir[0] = sin_theta * phi.cos();
        dir[1] = sin_theta * phi.sin();
        dir[polar] = cos_theta;
        (dir, cos_theta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::states::Body;

    fn touching_pair<const D: usize>(gap: f64) -> SystemState<D> {
        let mut x2 = Vector::<D>::zeros();
        x2[0] = gap;
        SystemState::new(vec![
            Body::new(0, 1.0, Vector::<D>::zeros(), Vector::<D>::zeros()).unwrap(),
            Body::new(1, 1.0, x2, Vector::<D>::zeros()).unwrap(),
        ])
    }

    #[test]
    fn progress_saturates() {
        let mut cfg = MergerConfig::new((0, 1), 1.0);
        cfg.flash_ticks = 4;
        let mut det = MergerDetector::new(cfg, None, 1).unwrap();
        let mut state = touching_pair::<2>(0.5);
        assert_eq!(det.observe(&mut state, StepOutcome::Advanced, Phase::Orbiting), Phase::Merging);

        for _ in 0..2 {
            det.advance();
        }
        let p = det.progress();
        assert_eq!(p.ticks_since, 2);
        assert!((p.flash - 0.5).abs() < 1e-12);
        assert!((p.opacity - 0.5).abs() < 1e-12);
        assert!((p.merger_radius - 5.0e4 * 3.0_f64.sqrt()).abs() < 1e-6);

        for _ in 0..10 {
            det.advance();
        }
        assert_eq!(det.progress().flash, 1.0);
        assert_eq!(det.observe(&mut state, StepOutcome::Advanced, Phase::Merging), Phase::PostEvent);
    }

    #[test]
    fn sphere_directions_are_unit() {
        let ejecta = EjectaConfig { count: 64, v_eq: 1.0, v_pol: 1.0 };
        let mut det = MergerDetector::new(MergerConfig::new((0, 1), 1.0), Some(ejecta), 7).unwrap();
        let mut state = touching_pair::<3>(0.5);
        det.observe(&mut state, StepOutcome::Advanced, Phase::Orbiting);
        assert_eq!(state.tracers.len(), 64);
        for t in &state.tracers {
            assert!((t.velocity.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn rejects_same_primary_twice() {
        assert!(MergerDetector::new(MergerConfig::new((1, 1), 1.0), None, 0).is_err());
    }
}
