//! Fixed-step time integrators for the dynamics engine
//!
//! Provides explicit Euler, velocity-Verlet, classical RK4 and a 4th-order
//! Yoshida composition of Verlet, all driven through [`ForceModel`] and a
//! per-body step schedule ([`StepSizes`]) so integration groups can run on
//! their own effective step while the force is always evaluated for the
//! whole system.

use std::cell::RefCell;
use std::convert::Infallible;

use crate::configuration::config::IntegratorKind;
use crate::simulation::forces::ForceModel;
use crate::simulation::params::Parameters;
use crate::simulation::states::{SystemState, Vector};

/// What a single step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced,
    /// The step began with the primaries already inside the merger
    /// threshold; the state was left untouched
    MergerReached,
}

/// Nominal step plus the effective step of every body
#[derive(Debug, Clone)]
pub struct StepSizes {
    pub nominal: f64,       // time advance of one step
    pub per_body: Vec<f64>, // step actually applied to body i
}

impl StepSizes {
    pub fn uniform(dt: f64, n: usize) -> Self {
        Self {
            nominal: dt,
            per_body: vec![dt; n],
        }
    }

    /// Look up every body's group in the parameters
    pub fn for_state<const D: usize>(params: &Parameters, state: &SystemState<D>) -> Self {
        Self {
            nominal: params.dt,
            per_body: state
                .bodies
                .iter()
                .map(|b| params.dt * params.group_factor(b.group))
                .collect(),
        }
    }

    /// Panics unless there is exactly one step per body
    pub fn check_covers<const D: usize>(&self, state: &SystemState<D>) {
        assert_eq!(
            self.per_body.len(),
            state.len(),
            "step sizes cover {} bodies but the state has {}",
            self.per_body.len(),
            state.len()
        );
    }

    /// Same schedule with every step multiplied by `w` (composition sub-steps)
    pub fn scaled(&self, w: f64) -> Self {
        Self {
            nominal: self.nominal * w,
            per_body: self.per_body.iter().map(|h| h * w).collect(),
        }
    }
}

/// Separation check that stops RK4 from stepping through a merger
#[derive(Debug, Clone, Copy)]
pub struct MergeGuard {
    pub primaries: (usize, usize),
    pub threshold: f64,
}

impl MergeGuard {
    pub fn reached<const D: usize>(&self, state: &SystemState<D>) -> bool {
        let (i, j) = self.primaries;
        i < state.len() && j < state.len() && state.separation(i, j) <= self.threshold
    }
}

/// A time integrator: advances `state` by one step of `steps`
pub trait Integrator<const D: usize>: Send + Sync {
    fn step(
        &self,
        state: &mut SystemState<D>,
        steps: &StepSizes,
        force: &dyn ForceModel<D>,
    ) -> StepOutcome;

    /// Take up to `n_steps` steps, stopping early if a merger is reached
    fn integrate(
        &self,
        state: &mut SystemState<D>,
        steps: &StepSizes,
        n_steps: usize,
        force: &dyn ForceModel<D>,
    ) -> StepOutcome {
        for _ in 0..n_steps {
            if self.step(state, steps, force) == StepOutcome::MergerReached {
                return StepOutcome::MergerReached;
            }
        }
        StepOutcome::Advanced
    }

    fn name(&self) -> &'static str;
}

/// Store fresh accelerations on every body
///
/// Euler, Verlet and Yoshida start from the stored acceleration, so this
/// must run once before the first step (the driver does it on construction).
pub fn prime_accelerations<const D: usize>(state: &mut SystemState<D>, force: &dyn ForceModel<D>) {
    let accels = force.compute(state);
    for (b, a) in state.bodies.iter_mut().zip(accels) {
        b.acceleration = a;
    }
}

/// State vector that RK4 can combine as `y + h k`
pub trait OdeState: Sized {
    fn add_scaled(&self, k: &Self, h: f64) -> Self;
}

/// First-order system `dy/dt = f(y)`; an evaluation may refuse to continue
/// (a geodesic reaching the horizon), which aborts the step
pub trait OdeSystem {
    type State: OdeState;
    type Halt;

    fn derivative(&self, y: &Self::State) -> Result<Self::State, Self::Halt>;
}

/// One classical RK4 step of size `h`, shared by the N-body and geodesic solvers
pub fn rk4<S: OdeSystem>(system: &S, y: &S::State, h: f64) -> Result<S::State, S::Halt> {
    let k1 = system.derivative(y)?;
    let k2 = system.derivative(&y.add_scaled(&k1, 0.5 * h))?;
    let k3 = system.derivative(&y.add_scaled(&k2, 0.5 * h))?;
    let k4 = system.derivative(&y.add_scaled(&k3, h))?;

    Ok(y.add_scaled(&k1, h / 6.0)
        .add_scaled(&k2, h / 3.0)
        .add_scaled(&k3, h / 3.0)
        .add_scaled(&k4, h / 6.0))
}

/// Build the integrator selected in the configuration
pub fn build_integrator<const D: usize>(
    kind: IntegratorKind,
    guard: Option<MergeGuard>,
) -> Box<dyn Integrator<D>> {
    match kind {
        IntegratorKind::Euler => Box::new(ExplicitEuler),
        IntegratorKind::Verlet => Box::new(VelocityVerlet),
        IntegratorKind::Rk4 => Box::new(ClassicalRk4 { merge_guard: guard }),
        IntegratorKind::Yoshida4 => Box::new(Yoshida4::new()),
    }
}

/// Explicit Euler (1st order)
///
/// Positions move with the pre-step velocity, then velocities take the
/// stored acceleration: `x' = x + v h`, `v' = v + a h`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitEuler;

impl<const D: usize> Integrator<D> for ExplicitEuler {
    fn step(
        &self,
        state: &mut SystemState<D>,
        steps: &StepSizes,
        force: &dyn ForceModel<D>,
    ) -> StepOutcome {
        steps.check_covers(state);
        for (b, h) in state.bodies.iter_mut().zip(steps.per_body.iter()) {
            b.position += b.velocity * *h;
            b.velocity += b.acceleration * *h;
        }
        state.t += steps.nominal;

        // one evaluation per step, at the new state
        prime_accelerations(state, force);
        StepOutcome::Advanced
    }

    fn name(&self) -> &'static str {
        "euler"
    }
}

/// Velocity-Verlet (2nd order, symplectic)
///
/// `x' = x + v h + a h^2 / 2`, `a' = a(x')`, `v' = v + (a + a') h / 2`.
/// One new force evaluation per step; `a'` is stored for the next one.
#[derive(Debug, Clone, Copy, Default)]
pub struct VelocityVerlet;

impl<const D: usize> Integrator<D> for VelocityVerlet {
    fn step(
        &self,
        state: &mut SystemState<D>,
        steps: &StepSizes,
        force: &dyn ForceModel<D>,
    ) -> StepOutcome {
        steps.check_covers(state);
        if state.is_empty() { // no bodies, only time moves
            state.t += steps.nominal;
            return StepOutcome::Advanced;
        }

        // Drift with the stored a_n
        for (b, h) in state.bodies.iter_mut().zip(steps.per_body.iter()) {
            b.position += b.velocity * *h + b.acceleration * (0.5 * h * h);
        }

        // a_n+1 from x_n+1
        let a_new = force.compute(state);

        // v_n+1 = v_n + (a_n + a_n+1) h/2
        for ((b, a), h) in state.bodies.iter_mut().zip(a_new).zip(steps.per_body.iter()) {
            b.velocity += (b.acceleration + a) * (0.5 * h);
            b.acceleration = a;
        }

        state.t += steps.nominal;
        StepOutcome::Advanced
    }

    fn name(&self) -> &'static str {
        "verlet"
    }
}

/// Classical 4th-order Runge–Kutta over `(x, v)` with derivative `(v, a)`
///
/// The force sees the stage velocities, so velocity-dependent terms
/// (post-Newtonian) are integrated consistently.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassicalRk4 {
    pub merge_guard: Option<MergeGuard>,
}

impl ClassicalRk4 {
    pub fn new() -> Self {
        Self { merge_guard: None }
    }

    pub fn with_merge_guard(primaries: (usize, usize), threshold: f64) -> Self {
        Self {
            merge_guard: Some(MergeGuard { primaries, threshold }),
        }
    }
}

/// Positions and velocities of every body, the RK4 state of the N-body system
#[derive(Debug, Clone)]
pub struct PhaseSpace<const D: usize> {
    pub x: Vec<Vector<D>>,
    pub v: Vec<Vector<D>>,
}

impl<const D: usize> OdeState for PhaseSpace<D> {
    fn add_scaled(&self, k: &Self, h: f64) -> Self {
        Self {
            x: self.x.iter().zip(&k.x).map(|(x, dx)| x + dx * h).collect(),
            v: self.v.iter().zip(&k.v).map(|(v, dv)| v + dv * h).collect(),
        }
    }
}

/// The N-body system as RK4 sees it: derivative `(v, a)`, every body's rate
/// scaled by its own step relative to the nominal one
struct NBodyOde<'a, const D: usize> {
    stage: RefCell<SystemState<D>>,
    force: &'a dyn ForceModel<D>,
    rates: Vec<f64>,
}

impl<const D: usize> OdeSystem for NBodyOde<'_, D> {
    type State = PhaseSpace<D>;
    type Halt = Infallible;

    fn derivative(&self, y: &PhaseSpace<D>) -> Result<PhaseSpace<D>, Infallible> {
        let mut stage = self.stage.borrow_mut();
        for ((b, x), v) in stage.bodies.iter_mut().zip(&y.x).zip(&y.v) {
            b.position = *x;
            b.velocity = *v;
        }
        let accels = self.force.compute(&stage);

        Ok(PhaseSpace {
            x: y.v.iter().zip(&self.rates).map(|(v, r)| v * *r).collect(),
            v: accels.iter().zip(&self.rates).map(|(a, r)| a * *r).collect(),
        })
    }
}

impl<const D: usize> Integrator<D> for ClassicalRk4 {
    fn step(
        &self,
        state: &mut SystemState<D>,
        steps: &StepSizes,
        force: &dyn ForceModel<D>,
    ) -> StepOutcome {
        steps.check_covers(state);
        if let Some(guard) = &self.merge_guard {
            if guard.reached(state) {
                return StepOutcome::MergerReached;
            }
        }

        let h = steps.nominal;
        let system = NBodyOde {
            stage: RefCell::new(SystemState::new(state.bodies.clone())),
            force,
            rates: steps
                .per_body
                .iter()
                .map(|hb| if h != 0.0 { hb / h } else { 0.0 })
                .collect(),
        };
        let y = PhaseSpace {
            x: state.bodies.iter().map(|b| b.position).collect(),
            v: state.bodies.iter().map(|b| b.velocity).collect(),
        };

        let next = match rk4(&system, &y, h) {
            Ok(next) => next,
            Err(never) => match never {},
        };
        for ((b, x), v) in state.bodies.iter_mut().zip(next.x).zip(next.v) {
            b.position = x;
            b.velocity = v;
        }
        state.t += h;

        prime_accelerations(state, force);
        StepOutcome::Advanced
    }

    fn name(&self) -> &'static str {
        "rk4"
    }
}

/// Yoshida 4th-order symplectic composition of velocity-Verlet
///
/// Three Verlet sub-steps of `w1 dt`, `w0 dt`, `w1 dt` with
/// `w1 = 1/(2 - 2^(1/3))` and `w0 = -2^(1/3)/(2 - 2^(1/3))`.
#[derive(Debug, Clone, Copy)]
pub struct Yoshida4 {
    w1: f64,
    w0: f64,
    base: VelocityVerlet,
}

impl Yoshida4 {
    pub fn new() -> Self {
        let cbrt2 = 2.0_f64.cbrt();
        Self {
            w1: 1.0 / (2.0 - cbrt2),
            w0: -cbrt2 / (2.0 - cbrt2),
            base: VelocityVerlet,
        }
    }

    pub fn weights(&self) -> [f64; 3] {
        [self.w1, self.w0, self.w1]
    }
}

impl Default for Yoshida4 {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> Integrator<D> for Yoshida4 {
    fn step(
        &self,
        state: &mut SystemState<D>,
        steps: &StepSizes,
        force: &dyn ForceModel<D>,
    ) -> StepOutcome {
        let t0 = state.t;
        for w in self.weights() {
            <VelocityVerlet as Integrator<D>>::step(&self.base, state, &steps.scaled(w), force);
        }
        // sub-step times sum to dt up to rounding
        state.t = t0 + steps.nominal;
        StepOutcome::Advanced
    }

    fn name(&self) -> &'static str {
        "yoshida4"
    }
}
