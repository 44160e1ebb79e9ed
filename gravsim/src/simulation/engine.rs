//! Simulation driver
//!
//! `Simulation<D>` owns everything a run needs (state, parameters, force
//! set, integrator, optional merger detector) and advances it one tick at
//! a time. Each tick:
//! 1. step the integrator while the phase is `Orbiting`
//! 2. let the detector inspect the post-step state
//! 3. once past the merger, free-stream the tracers and count event ticks
//!
//! Nothing here blocks or schedules: the host calls `tick` as often as it
//! likes and stops calling when it is done.

use log::{debug, info};

use crate::error::{Result, SimError};
use crate::simulation::events::{EventProgress, MergerDetector, Phase};
use crate::simulation::forces::{ForceModel, ForceSet};
use crate::simulation::integrator::{prime_accelerations, Integrator, StepOutcome, StepSizes};
use crate::simulation::params::Parameters;
use crate::simulation::snapshot::{BodySnapshot, Snapshot};
use crate::simulation::states::{SystemState, Vector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    Running,
    Finished,
}

/// Conserved-quantity readout of the current state
#[derive(Debug, Clone, Copy)]
pub struct Diagnostics<const D: usize> {
    pub kinetic: f64,
    pub potential: f64,
    pub momentum: Vector<D>,
    pub primary_separation: Option<f64>,
}

impl<const D: usize> Diagnostics<D> {
    pub fn total_energy(&self) -> f64 {
        self.kinetic + self.potential
    }
}

pub struct Simulation<const D: usize> {
    state: SystemState<D>,
    params: Parameters,
    forces: ForceSet<D>,
    integrator: Box<dyn Integrator<D>>,
    detector: Option<MergerDetector>,
    phase: Phase,
    ticks: u64,
    steps: StepSizes,
}

impl<const D: usize> Simulation<D> {
    /// Assemble a run; accelerations are primed so the first step starts fresh
    ///
    /// Parameters and the detector's primaries are checked here so no
    /// configuration error can surface once ticking has started.
    pub fn new(
        mut state: SystemState<D>,
        params: Parameters,
        forces: ForceSet<D>,
        integrator: Box<dyn Integrator<D>>,
        detector: Option<MergerDetector>,
    ) -> Result<Self> {
        params.validate()?;
        if let Some((i, j)) = detector.as_ref().map(MergerDetector::primaries) {
            let n = state.len();
            if i >= n || j >= n {
                return Err(SimError::InvalidConfig(format!(
                    "merger primaries ({i}, {j}) out of range for {n} bodies"
                )));
            }
        }

        prime_accelerations(&mut state, &forces);
        let steps = StepSizes::for_state(&params, &state);
        debug!(
            "simulation: {} bodies, {} force terms, integrator {}, dt = {:e}",
            state.len(),
            forces.len(),
            integrator.name(),
            params.dt
        );

        Ok(Self {
            state,
            params,
            forces,
            integrator,
            detector,
            phase: Phase::Orbiting,
            ticks: 0,
            steps,
        })
    }

    pub fn state(&self) -> &SystemState<D> {
        &self.state
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn detector(&self) -> Option<&MergerDetector> {
        self.detector.as_ref()
    }

    pub fn integrator_name(&self) -> &'static str {
        self.integrator.name()
    }

    /// Done when the tick budget is spent or the event has played out
    pub fn is_finished(&self) -> bool {
        if self.ticks >= self.params.max_ticks {
            return true;
        }
        match self.phase {
            Phase::Terminated(_) => true,
            Phase::Merging | Phase::PostEvent => self
                .detector
                .as_ref()
                .map_or(true, MergerDetector::is_complete),
            Phase::Orbiting => false,
        }
    }

    pub fn tick(&mut self) -> TickStatus {
        if self.is_finished() {
            return TickStatus::Finished;
        }

        let before = self.phase;

        let outcome = if self.phase == Phase::Orbiting {
            self.integrator.step(&mut self.state, &self.steps, &self.forces)
        } else {
            StepOutcome::Advanced
        };

        if let Some(detector) = self.detector.as_mut() {
            // counting starts the tick after the merger fires
            if before.is_post_merger() {
                detector.advance();
            }
            self.phase = detector.observe(&mut self.state, outcome, self.phase);
        }

        if self.phase.is_post_merger() {
            let dt = self.params.dt;
            for tracer in self.state.tracers.iter_mut() {
                tracer.advance(dt);
            }
            if before.is_post_merger() {
                self.state.t += dt;
            }
        }

        self.ticks += 1;
        if self.phase != before {
            info!(
                "tick {}: phase {:?} -> {:?} (t = {:.6e})",
                self.ticks, before, self.phase, self.state.t
            );
        }

        if self.is_finished() {
            TickStatus::Finished
        } else {
            TickStatus::Running
        }
    }

    /// Tick until finished; returns the number of ticks taken
    pub fn run_to_completion(&mut self) -> u64 {
        let start = self.ticks;
        while self.tick() == TickStatus::Running {}
        let taken = self.ticks - start;
        info!(
            "run finished after {taken} ticks in phase {:?} (t = {:.6e})",
            self.phase, self.state.t
        );
        taken
    }

    pub fn snapshot(&self) -> Snapshot<D> {
        let hidden = match (&self.detector, self.phase.is_post_merger()) {
            (Some(d), true) => Some(d.primaries()),
            _ => None,
        };

        let bodies = self
            .state
            .bodies
            .iter()
            .enumerate()
            .map(|(i, b)| BodySnapshot {
                id: b.id,
                position: b.position,
                velocity: b.velocity,
                radius: b.radius,
                group: b.group,
                visible: hidden.map_or(true, |(p, q)| i != p && i != q),
            })
            .collect();

        Snapshot {
            t: self.state.t,
            tick: self.ticks,
            phase: self.phase,
            bodies,
            tracers: self.state.tracers.iter().map(|tr| tr.position).collect(),
            progress: self
                .detector
                .as_ref()
                .map_or_else(EventProgress::idle, MergerDetector::progress),
        }
    }

    pub fn diagnostics(&self) -> Diagnostics<D> {
        Diagnostics {
            kinetic: self.state.kinetic_energy(),
            potential: self.forces.potential_energy(&self.state),
            momentum: self.state.total_momentum(),
            primary_separation: self.primary_separation(),
        }
    }

    pub fn primary_separation(&self) -> Option<f64> {
        let (i, j) = self.detector.as_ref()?.primaries();
        (i < self.state.len() && j < self.state.len()).then(|| self.state.separation(i, j))
    }
}
