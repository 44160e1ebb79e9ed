use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_relative_eq;

use gravsim::simulation::events::{EjectaConfig, MergerConfig, MergerDetector, Phase, TerminationReason};
use gravsim::simulation::forces::{ForceModel, ForceSet, NewtonianPairwise};
use gravsim::simulation::geodesic::{GeodesicField, GeodesicState, GeodesicTracer, ParticleKind};
use gravsim::simulation::integrator::{
    build_integrator, prime_accelerations, rk4, ClassicalRk4, ExplicitEuler, Integrator, OdeSystem,
    StepOutcome, StepSizes, VelocityVerlet, Yoshida4,
};
use gravsim::simulation::oblateness::OblatenessPerturbation;
use gravsim::simulation::params::Parameters;
use gravsim::simulation::post_newtonian::{binary_bodies, quasi_circular, PostNewtonianBinary};
use gravsim::simulation::scenario::{load_config, parse_config, Scenario};
use gravsim::simulation::states::{Body, IntegrationGroup, SystemState, Vector};
use gravsim::{IntegratorKind, SimError, Simulation, TickStatus};

/// Build a simple 2-body system separated along the first axis
pub fn two_body_system<const D: usize>(dist: f64, m1: f64, m2: f64) -> SystemState<D> {
    let mut x = Vector::<D>::zeros();
    x[0] = dist / 2.0;
    SystemState::new(vec![
        Body::new(0, m1, -x, Vector::<D>::zeros()).unwrap(),
        Body::new(1, m2, x, Vector::<D>::zeros()).unwrap(),
    ])
}

/// Equal-mass circular binary with unit separation
pub fn circular_binary<const D: usize>(g: f64) -> SystemState<D> {
    let v = (g * 2.0).sqrt();
    SystemState::new(binary_bodies::<D>(1.0, 1.0, 1.0, (0.0, v)).unwrap().to_vec())
}

/// Default physics parameters for tests
pub fn test_params() -> Parameters {
    Parameters::new(0.1, 0.001)
}

/// Build a gravity term + ForceSet
pub fn gravity_set<const D: usize>(p: &Parameters) -> ForceSet<D> {
    ForceSet::new().with(NewtonianPairwise::new(p.g))
}

fn total_energy<const D: usize>(state: &SystemState<D>, forces: &ForceSet<D>) -> f64 {
    state.kinetic_energy() + forces.potential_energy(state)
}

/// Relative energy error after `periods` of the unit circular binary
fn energy_error(kind: IntegratorKind, steps_per_period: usize, periods: usize) -> f64 {
    let forces = gravity_set::<2>(&Parameters::new(1.0, 1.0));
    let mut sys = circular_binary::<2>(1.0);
    prime_accelerations(&mut sys, &forces);

    let period = std::f64::consts::TAU / 2.0_f64.sqrt();
    let steps = StepSizes::uniform(period / steps_per_period as f64, sys.len());
    let integrator = build_integrator::<2>(kind, None);

    let e0 = total_energy(&sys, &forces);
    integrator.integrate(&mut sys, &steps, steps_per_period * periods, &forces);
    ((total_energy(&sys, &forces) - e0) / e0).abs()
}

/// Force that only counts how often it is evaluated
struct CountingForce {
    calls: AtomicUsize,
}

impl<const D: usize> ForceModel<D> for CountingForce {
    fn accumulate(&self, _state: &SystemState<D>, _out: &mut [Vector<D>]) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(name)
}

/// Head-on Newtonian collision of two unit masses with a merger detector
fn head_on_simulation<const D: usize>(ejecta: Option<EjectaConfig>) -> Simulation<D> {
    let mut params = Parameters::new(1.0, 1e-3);
    params.max_ticks = 100_000;
    let state = two_body_system::<D>(2.0, 1.0, 1.0);
    let merger = MergerConfig::new((0, 1), 0.5);
    let detector = MergerDetector::new(merger, ejecta, 11).unwrap();

    Simulation::new(
        state,
        params,
        gravity_set::<D>(&Parameters::new(1.0, 1e-3)),
        Box::new(VelocityVerlet),
        Some(detector),
    )
    .unwrap()
}

// ==================================================================================
// Body / state tests
// ==================================================================================

#[test]
fn body_rejects_non_positive_mass() {
    let zero = Body::<2>::new(0, 0.0, Vector::<2>::zeros(), Vector::<2>::zeros());
    let negative = Body::<2>::new(0, -1.0, Vector::<2>::zeros(), Vector::<2>::zeros());
    let nan = Body::<2>::new(0, f64::NAN, Vector::<2>::zeros(), Vector::<2>::zeros());

    assert!(matches!(zero, Err(SimError::InvalidBody(_))));
    assert!(matches!(negative, Err(SimError::InvalidBody(_))));
    assert!(matches!(nan, Err(SimError::InvalidBody(_))));
}

#[test]
fn body_from_wrong_length_slice_is_dimension_mismatch() {
    let res = Body::<3>::from_slices(0, 1.0, &[1.0, 2.0], &[0.0, 0.0, 0.0]);
    assert!(matches!(
        res,
        Err(SimError::DimensionMismatch { expected: 3, found: 2 })
    ));
}

#[test]
fn center_of_mass_is_mass_weighted() {
    let sys = two_body_system::<2>(4.0, 1.0, 3.0);
    let com = sys.center_of_mass(&[0, 1]);
    assert_relative_eq!(com[0], 1.0, epsilon = 1e-12);
    assert_relative_eq!(com[1], 0.0, epsilon = 1e-12);
}

// ==================================================================================
// Gravity tests
// ==================================================================================

#[test]
fn gravity_newton_third_law() {
    let sys = two_body_system::<3>(1.0, 2.0, 3.0);
    let p = test_params();
    let forces = gravity_set::<3>(&p);

    let mut acc = vec![Vector::<3>::zeros(); 2];
    forces.accumulate_accels(&sys, &mut acc);

    let net = acc[0] * sys.bodies[0].mass + acc[1] * sys.bodies[1].mass;

    assert!(net.norm() < 1e-12, "Net momentum not zero: {:?}", net);
}

#[test]
fn gravity_points_toward_other_body() {
    let sys = two_body_system::<3>(2.0, 1.0, 1.0);
    let p = test_params();
    let forces = gravity_set::<3>(&p);

    let acc = forces.compute(&sys);

    let dx = sys.bodies[1].position - sys.bodies[0].position;

    assert!(dx.norm() > 0.0);
    assert!(acc[0].dot(&dx) > 0.0, "Acceleration is not toward second body");
    assert!(acc[1].dot(&dx) < 0.0, "Acceleration is not toward first body");
}

#[test]
fn gravity_inverse_square_law() {
    let sys_r = two_body_system::<2>(1.0, 1.0, 1.0);
    let sys_2r = two_body_system::<2>(2.0, 1.0, 1.0);
    let p = test_params();
    let forces = gravity_set::<2>(&p);

    let acc_r = forces.compute(&sys_r);
    let acc_2r = forces.compute(&sys_2r);

    let ratio = acc_r[0].norm() / acc_2r[0].norm();

    assert!((ratio - 4.0).abs() < 1e-9, "Expected 4x, got {}", ratio);
}

#[test]
fn gravity_magnitude_matches_newton() {
    let sys = two_body_system::<2>(2.0, 3.0, 5.0);
    let forces = gravity_set::<2>(&Parameters::new(1.0, 1.0));
    let acc = forces.compute(&sys);

    // |a_0| = G m_1 / r^2
    assert_relative_eq!(acc[0].norm(), 5.0 / 4.0, max_relative = 1e-12);
    assert_relative_eq!(acc[1].norm(), 3.0 / 4.0, max_relative = 1e-12);
}

#[test]
fn gravity_softening_prevents_blowup() {
    let p = test_params();
    let sys = two_body_system::<3>(1e-9, 1.0, 1.0);
    let forces = ForceSet::new().with(NewtonianPairwise::with_softening(p.g, 0.1));

    let acc = forces.compute(&sys);

    assert!(acc[0].norm() < 1e9, "Softening failed; acceleration too large");
}

#[test]
fn gravity_degenerate_pair_contributes_nothing() {
    let sys = two_body_system::<2>(0.0, 1.0, 1.0);
    let forces = gravity_set::<2>(&test_params());

    let acc = forces.compute(&sys);

    for a in &acc {
        assert!(a.iter().all(|c| c.is_finite()));
        assert_eq!(a.norm(), 0.0);
    }
}

#[test]
fn gravity_excluded_pair_is_skipped() {
    let sys = two_body_system::<2>(1.0, 1.0, 1.0);
    let gravity = NewtonianPairwise::new(1.0).excluding_pair((1, 0));

    let acc = gravity.compute(&sys);

    assert_eq!(acc[0].norm(), 0.0);
    assert_eq!(gravity.potential_energy(&sys), 0.0);
}

#[test]
fn force_set_sums_its_terms() {
    let sys = two_body_system::<2>(1.0, 1.0, 1.0);
    let single = gravity_set::<2>(&test_params());
    let doubled = gravity_set::<2>(&test_params()).with(NewtonianPairwise::new(0.1));

    let a1 = single.compute(&sys);
    let a2 = doubled.compute(&sys);

    assert_eq!(doubled.len(), 2);
    assert_relative_eq!(a2[0][0], 2.0 * a1[0][0], max_relative = 1e-12);
}

// ==================================================================================
// Post-Newtonian tests
// ==================================================================================

#[test]
fn post_newtonian_conserves_momentum() {
    let mut sys = two_body_system::<2>(1e5, 2.78e30, 1.4e30);
    sys.bodies[0].velocity = Vector::<2>::new(1.0e6, -3.0e7);
    sys.bodies[1].velocity = Vector::<2>::new(-2.0e6, 5.0e7);
    let pn = PostNewtonianBinary::new(6.6743e-11, 299_792_458.0, (0, 1));

    let acc = pn.compute(&sys);
    let net = acc[0] * sys.bodies[0].mass + acc[1] * sys.bodies[1].mass;

    assert!(net.norm() / (acc[0].norm() * sys.bodies[0].mass) < 1e-12);
}

#[test]
fn post_newtonian_reduces_to_newton_for_large_c() {
    let sys = two_body_system::<3>(2.0, 3.0, 5.0);
    let pn = PostNewtonianBinary::new(1.0, 1e12, (0, 1));
    let newton = NewtonianPairwise::new(1.0);

    let a_pn = pn.compute(&sys);
    let a_n = newton.compute(&sys);

    for i in 0..2 {
        assert_relative_eq!((a_pn[i] - a_n[i]).norm(), 0.0, epsilon = 1e-12);
    }
}

#[test]
fn quasi_circular_rejects_separation_inside_limit() {
    // GM / (r c^2) = 0.5 leaves no 1PN circular orbit
    let res = quasi_circular(1.0, 1.0, 1.0, 1.0, 2.0);
    assert!(matches!(res, Err(SimError::InvalidConfig(_))));
}

#[test]
fn post_newtonian_inspiral_separation_strictly_decreases() {
    let (g, c) = (6.6743e-11, 299_792_458.0);
    let (m, sep) = (2.78e30, 1.0e5);

    let start = quasi_circular(m, m, sep, g, c).unwrap();
    let period = std::f64::consts::TAU * sep / start.tangential;
    let dt = period / 500.0;

    let mut sys = SystemState::new(
        binary_bodies::<2>(m, m, sep, (start.radial, start.tangential))
            .unwrap()
            .to_vec(),
    );
    let forces = ForceSet::new().with(PostNewtonianBinary::new(g, c, (0, 1)));
    let rk4 = ClassicalRk4::with_merge_guard((0, 1), 60_000.0);
    let steps = StepSizes::uniform(dt, 2);
    prime_accelerations(&mut sys, &forces);

    let mut prev = sys.separation(0, 1);
    let mut merged = false;
    for n in 0..100_000 {
        if rk4.step(&mut sys, &steps, &forces) == StepOutcome::MergerReached {
            merged = true;
            break;
        }
        let now = sys.separation(0, 1);
        assert!(now < prev, "separation grew at step {n}: {prev} -> {now}");
        prev = now;
    }

    assert!(merged, "binary did not reach the merger threshold");
    assert!(prev <= 60_000.0);
}

// ==================================================================================
// Oblateness tests
// ==================================================================================

#[test]
fn oblateness_pulls_equatorial_satellite_inward() {
    let mut sys = two_body_system::<3>(0.0, 1.0, 1e-6);
    sys.bodies[1].position = Vector::<3>::new(2.0, 0.0, 0.0);
    let j2 = OblatenessPerturbation::new(1.0, 0, 0.01, 1.0).with_damping(1.0);

    let acc = j2.compute(&sys);

    // -3/2 J2 G M R^2 / r^4 along +x
    assert_relative_eq!(acc[1][0], -1.5 * 0.01 / 16.0, max_relative = 1e-12);
    assert_eq!(acc[0].norm(), 0.0);
}

#[test]
fn oblateness_skips_excluded_groups() {
    let mut sys = two_body_system::<3>(0.0, 1.0, 1e-6);
    sys.bodies[1].position = Vector::<3>::new(2.0, 0.0, 0.5);
    sys.bodies[1].group = IntegrationGroup::Fine;
    let j2 = OblatenessPerturbation::new(1.0, 0, 0.01, 1.0);

    assert_eq!(j2.compute(&sys)[1].norm(), 0.0);
}

// ==================================================================================
// Integrator tests
// ==================================================================================

#[test]
fn verlet_circular_orbit_keeps_separation() {
    let forces = gravity_set::<2>(&Parameters::new(1.0, 1.0));
    let mut sys = circular_binary::<2>(1.0);
    prime_accelerations(&mut sys, &forces);

    let period = std::f64::consts::TAU / 2.0_f64.sqrt();
    let steps = StepSizes::uniform(period / 1000.0, 2);

    for _ in 0..10 {
        VelocityVerlet.integrate(&mut sys, &steps, 1000, &forces);
        let sep = sys.separation(0, 1);
        assert!((sep - 1.0).abs() < 1e-3, "separation drifted to {sep}");
    }
    assert_relative_eq!(sys.t, 10.0 * period, max_relative = 1e-9);
}

#[test]
fn higher_order_integrators_beat_euler_on_energy() {
    let euler = energy_error(IntegratorKind::Euler, 200, 10);
    let verlet = energy_error(IntegratorKind::Verlet, 200, 10);
    let rk4 = energy_error(IntegratorKind::Rk4, 200, 10);
    let yoshida = energy_error(IntegratorKind::Yoshida4, 200, 10);

    assert!(verlet < euler, "verlet {verlet} vs euler {euler}");
    assert!(rk4 < euler, "rk4 {rk4} vs euler {euler}");
    assert!(yoshida < euler, "yoshida {yoshida} vs euler {euler}");
    assert!(verlet < 1e-6 && yoshida < 1e-6);
}

#[test]
fn euler_moves_with_pre_step_velocity() {
    let forces = gravity_set::<2>(&Parameters::new(1.0, 1.0));
    let mut sys = two_body_system::<2>(2.0, 1.0, 1.0);
    sys.bodies[0].velocity = Vector::<2>::new(0.0, 0.5);
    prime_accelerations(&mut sys, &forces);

    let x0 = sys.bodies[0].position;
    let v0 = sys.bodies[0].velocity;
    let a0 = sys.bodies[0].acceleration;
    let h = 0.1;

    ExplicitEuler.step(&mut sys, &StepSizes::uniform(h, 2), &forces);

    assert_eq!(sys.bodies[0].position, x0 + v0 * h);
    assert_eq!(sys.bodies[0].velocity, v0 + a0 * h);
}

#[test]
fn integrators_store_fresh_accelerations() {
    let forces = gravity_set::<2>(&Parameters::new(1.0, 1.0));

    for kind in [
        IntegratorKind::Euler,
        IntegratorKind::Verlet,
        IntegratorKind::Rk4,
        IntegratorKind::Yoshida4,
    ] {
        let mut sys = circular_binary::<2>(1.0);
        prime_accelerations(&mut sys, &forces);
        let integrator = build_integrator::<2>(kind, None);
        integrator.step(&mut sys, &StepSizes::uniform(0.01, 2), &forces);

        let fresh = forces.compute(&sys);
        for (b, a) in sys.bodies.iter().zip(fresh) {
            assert_relative_eq!((b.acceleration - a).norm(), 0.0, epsilon = 1e-12);
        }
    }
}

#[test]
fn yoshida_weights_sum_to_one() {
    let w = Yoshida4::new().weights();
    assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    assert!(w[1] < 0.0);
}

#[test]
fn group_steps_scale_each_body() {
    let mut params = Parameters::new(1.0, 1.0);
    params.group_dt.insert(IntegrationGroup::Fine, 0.1);
    params.group_dt.insert(IntegrationGroup::Coarse, 4.0);

    let bodies = [IntegrationGroup::Fine, IntegrationGroup::Standard, IntegrationGroup::Coarse]
        .into_iter()
        .enumerate()
        .map(|(i, group)| {
            Body::new(
                i as u32,
                1.0,
                Vector::<2>::new(0.0, 10.0 * i as f64),
                Vector::<2>::new(1.0, 0.0),
            )
            .unwrap()
            .with_group(group)
        })
        .collect();
    let mut sys = SystemState::new(bodies);
    let forces = ForceSet::<2>::new();
    let steps = StepSizes::for_state(&params, &sys);

    VelocityVerlet.step(&mut sys, &steps, &forces);

    assert_relative_eq!(sys.bodies[0].position[0], 0.1, epsilon = 1e-12);
    assert_relative_eq!(sys.bodies[1].position[0], 1.0, epsilon = 1e-12);
    assert_relative_eq!(sys.bodies[2].position[0], 4.0, epsilon = 1e-12);
    assert_relative_eq!(sys.t, 1.0, epsilon = 1e-12);
}

#[test]
fn rk4_merge_guard_short_circuits() {
    let mut sys = two_body_system::<2>(0.5, 1.0, 1.0);
    let before: Vec<_> = sys.bodies.iter().map(|b| b.position).collect();
    let counter = CountingForce {
        calls: AtomicUsize::new(0),
    };
    let rk4 = ClassicalRk4::with_merge_guard((0, 1), 1.0);

    let outcome = rk4.step(&mut sys, &StepSizes::uniform(0.1, 2), &counter);

    assert_eq!(outcome, StepOutcome::MergerReached);
    assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
    assert_eq!(sys.t, 0.0);
    for (b, x) in sys.bodies.iter().zip(before) {
        assert_eq!(b.position, x);
    }
}

#[test]
fn rk4_evaluates_force_four_times_per_step() {
    let mut sys = two_body_system::<2>(2.0, 1.0, 1.0);
    let counter = CountingForce {
        calls: AtomicUsize::new(0),
    };

    // four stages plus the acceleration stored for the next step
    ClassicalRk4::new().step(&mut sys, &StepSizes::uniform(0.1, 2), &counter);
    assert_eq!(counter.calls.load(Ordering::SeqCst), 5);
}

#[test]
#[should_panic(expected = "step sizes cover 1 bodies but the state has 2")]
fn verlet_rejects_short_step_schedule() {
    let mut sys = two_body_system::<2>(2.0, 1.0, 1.0);
    let forces = gravity_set::<2>(&test_params());
    VelocityVerlet.step(&mut sys, &StepSizes::uniform(0.1, 1), &forces);
}

#[test]
#[should_panic(expected = "step sizes cover 3 bodies but the state has 2")]
fn rk4_rejects_mismatched_step_schedule() {
    let mut sys = two_body_system::<2>(2.0, 1.0, 1.0);
    let forces = gravity_set::<2>(&test_params());
    ClassicalRk4::new().step(&mut sys, &StepSizes::uniform(0.1, 3), &forces);
}

/// Harmonic oscillator `x'' = -x` packed as `(x, v, 0)`; halts past `x_max`
struct Oscillator {
    x_max: f64,
}

impl OdeSystem for Oscillator {
    type State = GeodesicState;
    type Halt = f64;

    fn derivative(&self, y: &GeodesicState) -> Result<GeodesicState, f64> {
        if y[0] > self.x_max {
            return Err(y[0]);
        }
        Ok(GeodesicState::new(y[1], -y[0], 0.0))
    }
}

#[test]
fn shared_rk4_is_fourth_order() {
    let osc = Oscillator { x_max: f64::INFINITY };
    let mut y = GeodesicState::new(1.0, 0.0, 0.0);
    let h = 0.01;
    for _ in 0..100 {
        y = rk4(&osc, &y, h).unwrap();
    }
    // exact solution at t = 1: (cos 1, -sin 1)
    assert_relative_eq!(y[0], 1.0_f64.cos(), epsilon = 1e-9);
    assert_relative_eq!(y[1], -1.0_f64.sin(), epsilon = 1e-9);
}

#[test]
fn shared_rk4_stops_on_a_refusing_stage() {
    let osc = Oscillator { x_max: 1.0 };
    // k1 is fine, the first half-step stage moves x past 1
    let res = rk4(&osc, &GeodesicState::new(0.9, 1.0, 0.0), 0.5);
    assert!(matches!(res, Err(x) if x > 1.0));
}

// ==================================================================================
// Event tests
// ==================================================================================

#[test]
fn merger_fires_exactly_once_and_never_flips_back() {
    let ejecta = EjectaConfig {
        count: 40,
        v_eq: 1.0,
        v_pol: 3.0,
    };
    let mut sim = head_on_simulation::<2>(Some(ejecta));

    let mut phases = vec![sim.phase()];
    let mut tracer_counts = Vec::new();
    while sim.tick() == TickStatus::Running {
        if sim.phase() != *phases.last().unwrap() {
            phases.push(sim.phase());
        }
        if sim.phase() != Phase::Orbiting {
            tracer_counts.push(sim.state().tracers.len());
        }
    }

    assert_eq!(phases, vec![Phase::Orbiting, Phase::Merging, Phase::PostEvent]);
    assert!(tracer_counts.iter().all(|&n| n == 40), "ejecta spawned more than once");
    assert_eq!(sim.detector().unwrap().counter(), 151);
    assert!(sim.detector().unwrap().has_fired());
    assert_eq!(sim.tick(), TickStatus::Finished);
}

#[test]
fn every_progress_scalar_saturates_before_the_run_ends() {
    let mut sim = head_on_simulation::<2>(None);
    while sim.tick() == TickStatus::Running {}

    let p = sim.snapshot().progress;
    assert_eq!(sim.phase(), Phase::PostEvent);
    assert_eq!(p.flash, 1.0);
    assert_eq!(p.ejecta, 1.0);
    assert_eq!(p.shock, 1.0);
    assert_eq!(p.opacity, 0.0);
    assert_eq!(sim.detector().unwrap().saturation_ticks(), 150);
}

#[test]
fn run_waits_for_the_slowest_progress_scalar() {
    let mut params = Parameters::new(1.0, 1e-3);
    params.max_ticks = 100_000;
    let mut merger = MergerConfig::new((0, 1), 0.5);
    merger.flash_ticks = 20;
    merger.ejecta_ticks = 300;
    merger.shock_ticks = 10;
    let detector = MergerDetector::new(merger, None, 3).unwrap();
    let mut sim = Simulation::new(
        two_body_system::<2>(2.0, 1.0, 1.0),
        params.clone(),
        gravity_set::<2>(&params),
        Box::new(VelocityVerlet),
        Some(detector),
    )
    .unwrap();

    sim.run_to_completion();

    assert_eq!(sim.detector().unwrap().counter(), 301);
    assert_eq!(sim.snapshot().progress.ejecta, 1.0);
}

#[test]
fn primaries_freeze_and_hide_after_merger() {
    let mut sim = head_on_simulation::<2>(None);
    while sim.phase() == Phase::Orbiting {
        sim.tick();
    }
    let frozen: Vec<_> = sim.state().bodies.iter().map(|b| b.position).collect();
    let sep = sim.primary_separation().unwrap();
    assert!(sep <= 0.5);

    for _ in 0..10 {
        sim.tick();
    }
    let snap = sim.snapshot();
    assert!(snap.bodies.iter().all(|b| !b.visible));
    assert_eq!(snap.visible_bodies().count(), 0);
    for (b, x) in snap.bodies.iter().zip(frozen) {
        assert_eq!(b.position, x);
    }
    assert_eq!(snap.progress.ticks_since, 10);
    assert_relative_eq!(snap.progress.flash, 0.2, epsilon = 1e-12);
    assert_relative_eq!(snap.progress.opacity, 0.8, epsilon = 1e-12);
}

#[test]
fn ejecta_speeds_lie_between_equator_and_pole() {
    let ejecta = EjectaConfig {
        count: 150,
        v_eq: 5.0e6,
        v_pol: 1.5e7,
    };
    let mut sim = head_on_simulation::<3>(Some(ejecta));
    while sim.phase() == Phase::Orbiting {
        sim.tick();
    }

    let tracers = &sim.state().tracers;
    assert_eq!(tracers.len(), 150);
    for t in tracers {
        let speed = t.velocity.norm();
        assert!(speed >= 5.0e6 * (1.0 - 1e-12) && speed <= 1.5e7 * (1.0 + 1e-12), "speed {speed}");
    }
}

#[test]
fn ejecta_free_stream_from_the_center_of_mass() {
    let ejecta = EjectaConfig {
        count: 8,
        v_eq: 1.0,
        v_pol: 2.0,
    };
    let mut sim = head_on_simulation::<2>(Some(ejecta));
    sim.run_to_completion();

    let com = sim.state().center_of_mass(&[0, 1]);
    let dt = sim.params().dt;
    // spawn tick plus 151 event ticks
    for t in &sim.state().tracers {
        let expected = com + t.velocity * (dt * 152.0);
        assert_relative_eq!((t.position - expected).norm(), 0.0, epsilon = 1e-9);
    }
}

#[test]
fn ejecta_are_reproducible_for_a_seed() {
    let ejecta = EjectaConfig {
        count: 20,
        v_eq: 1.0,
        v_pol: 2.0,
    };
    let mut a = head_on_simulation::<3>(Some(ejecta.clone()));
    let mut b = head_on_simulation::<3>(Some(ejecta));
    a.run_to_completion();
    b.run_to_completion();

    for (ta, tb) in a.state().tracers.iter().zip(b.state().tracers.iter()) {
        assert_eq!(ta.velocity, tb.velocity);
    }
}

#[test]
fn max_ticks_ends_an_orbiting_run() {
    let mut params = Parameters::new(1.0, 0.01);
    params.max_ticks = 25;
    let forces = gravity_set::<2>(&params);
    let mut sim = Simulation::new(circular_binary::<2>(1.0), params, forces, Box::new(Yoshida4::new()), None).unwrap();

    assert_eq!(sim.run_to_completion(), 25);
    assert_eq!(sim.phase(), Phase::Orbiting);
    assert_eq!(sim.tick(), TickStatus::Finished);
    assert_relative_eq!(sim.state().t, 0.25, epsilon = 1e-12);
}

#[test]
fn simulation_diagnostics_conserve_energy_and_momentum() {
    let mut params = Parameters::new(1.0, 1e-3);
    params.max_ticks = 5000;
    let forces = gravity_set::<3>(&params);
    let mut sim = Simulation::new(circular_binary::<3>(1.0), params, forces, Box::new(VelocityVerlet), None).unwrap();

    let before = sim.diagnostics();
    sim.run_to_completion();
    let after = sim.diagnostics();

    assert_relative_eq!(after.total_energy(), before.total_energy(), max_relative = 1e-6);
    assert!(after.momentum.norm() < 1e-12);
}

#[test]
fn simulation_rejects_zero_time_step() {
    let params = Parameters::new(1.0, 0.0);
    let forces = gravity_set::<2>(&params);
    let res = Simulation::new(circular_binary::<2>(1.0), params, forces, Box::new(VelocityVerlet), None);
    assert!(matches!(res, Err(SimError::InvalidConfig(_))));
}

#[test]
fn simulation_rejects_nan_gravity_and_bad_group_step() {
    let params = Parameters::new(f64::NAN, 0.01);
    let forces = gravity_set::<2>(&params);
    let res = Simulation::new(circular_binary::<2>(1.0), params, forces, Box::new(VelocityVerlet), None);
    assert!(matches!(res, Err(SimError::InvalidConfig(_))));

    let mut params = Parameters::new(1.0, 0.01);
    params.group_dt.insert(IntegrationGroup::Fine, -1.0);
    let forces = gravity_set::<2>(&params);
    let res = Simulation::new(circular_binary::<2>(1.0), params, forces, Box::new(VelocityVerlet), None);
    assert!(matches!(res, Err(SimError::InvalidConfig(_))));
}

#[test]
fn simulation_rejects_merger_primaries_out_of_range() {
    let params = Parameters::new(1.0, 0.01);
    let forces = gravity_set::<2>(&params);
    let detector = MergerDetector::new(MergerConfig::new((0, 2), 0.5), None, 1).unwrap();
    let res = Simulation::new(
        circular_binary::<2>(1.0),
        params,
        forces,
        Box::new(VelocityVerlet),
        Some(detector),
    );
    assert!(matches!(res, Err(SimError::InvalidConfig(_))));
}

// ==================================================================================
// Geodesic tests
// ==================================================================================

#[test]
fn photon_below_capture_crosses_the_horizon() {
    let field = GeodesicField::new(0.0, 3.0, 1.0, ParticleKind::Photon).unwrap();
    let mut tracer = GeodesicTracer::new(field, 12.0, 0.0, 0.01).unwrap();

    let len = tracer.trace(4000).len();

    assert!(len < 4000);
    assert_eq!(tracer.phase(), Phase::Terminated(TerminationReason::HorizonCrossed));
    let last = tracer.trajectory().last().unwrap();
    assert!(last.r > 2.0 && last.r < 2.1, "last r = {}", last.r);
    assert!(!tracer.tick());
    assert_eq!(tracer.trajectory().len(), len);
}

#[test]
fn photon_above_capture_is_deflected_and_escapes() {
    let field = GeodesicField::new(0.0, 8.0, 1.0, ParticleKind::Photon).unwrap();
    let mut tracer = GeodesicTracer::new(field, 30.0, 0.0, 0.01)
        .unwrap()
        .with_escape_radius(40.0);

    tracer.trace(20_000);

    assert_eq!(tracer.phase(), Phase::Terminated(TerminationReason::Escaped));
    let closest = tracer
        .trajectory()
        .iter()
        .map(|p| p.r)
        .fold(f64::INFINITY, f64::min);
    // turning point of b = 8 is near r = 6.7
    assert!(closest > 6.0 && closest < 7.5, "closest approach {closest}");
}

#[test]
fn spin_separates_prograde_and_retrograde_photons() {
    let trace = |b: f64| {
        let field = GeodesicField::new(0.9, b, 1.0, ParticleKind::Photon).unwrap();
        let mut tracer = GeodesicTracer::new(field, 20.0, 0.0, 0.01)
            .unwrap()
            .with_escape_radius(30.0);
        tracer.trace(20_000);
        tracer.phase()
    };

    assert_eq!(trace(3.5), Phase::Terminated(TerminationReason::Escaped));
    assert_eq!(trace(-3.5), Phase::Terminated(TerminationReason::HorizonCrossed));
}

#[test]
fn forbidden_radius_sample_is_unphysical() {
    // a = 0, b = 8 at r = 4: V = (256 - 8 * 64) / 256 = -1
    let field = GeodesicField::new(0.0, 8.0, 1.0, ParticleKind::Photon).unwrap();
    assert_relative_eq!(field.radicand(4.0).0, -1.0, epsilon = 1e-12);

    let sample = field.sample(&GeodesicState::new(4.0, 0.0, 0.0));
    assert_eq!(sample.terminated, Some(TerminationReason::Unphysical));
    assert_eq!(sample.derivative, GeodesicState::zeros());
}

#[test]
fn tracer_stops_at_a_forbidden_radius_without_recording() {
    let field = GeodesicField::new(0.0, 8.0, 1.0, ParticleKind::Photon).unwrap();
    let mut tracer = GeodesicTracer::new(field, 30.0, 0.0, 0.01).unwrap();
    tracer.state = GeodesicState::new(4.0, 0.0, 0.0);

    assert!(!tracer.tick());
    assert_eq!(tracer.phase(), Phase::Terminated(TerminationReason::Unphysical));
    assert!(tracer.trajectory().is_empty());
    assert_eq!(tracer.lambda, 0.0);
    assert!(tracer.trace(100).is_empty());
}

#[test]
fn critical_impact_parameter_limits() {
    assert_relative_eq!(
        GeodesicField::critical_impact_parameter(0.0),
        3.0 * 3.0_f64.sqrt(),
        epsilon = 1e-12
    );
    let prograde = GeodesicField::critical_impact_parameter(0.5);
    let retrograde = GeodesicField::critical_impact_parameter(-0.5);
    assert!(prograde < 3.0 * 3.0_f64.sqrt() && retrograde > 3.0 * 3.0_f64.sqrt());
}

#[test]
fn trajectory_hints_grow_toward_the_horizon() {
    let field = GeodesicField::new(0.0, 3.0, 1.0, ParticleKind::Photon).unwrap();
    let mut tracer = GeodesicTracer::new(field, 12.0, 0.0, 0.01).unwrap();
    let points = tracer.trace(4000);

    let first = points.first().unwrap();
    let last = points.last().unwrap();
    assert!(last.dilation > first.dilation);
    assert!(last.redshift > first.redshift && last.redshift <= 1.0);
}

#[test]
fn tracer_rejects_start_inside_horizon() {
    let field = GeodesicField::new(0.5, 3.0, 1.0, ParticleKind::Photon).unwrap();
    assert!(GeodesicTracer::new(field, 1.5, 0.0, 0.01).is_err());
    assert!(GeodesicField::new(1.0, 3.0, 1.0, ParticleKind::Photon).is_err());
}

// ==================================================================================
// Configuration / scenario tests
// ==================================================================================

const CIRCULAR_YAML: &str = r#"
mode: nbody
engine:
  dimension: 2
  integrator: verlet
parameters:
  G: 1.0
  dt: 0.001
  max_ticks: 10
forces:
  - type: newtonian
bodies:
  - kind: cartesian
    m: 1.0
    x: [-0.5, 0.0]
    v: [0.0, -0.7071067811865476]
  - kind: cartesian
    m: 1.0
    x: [0.5, 0.0]
    v: [0.0, 0.7071067811865476]
    group: fine
"#;

#[test]
fn yaml_scenario_parses_and_builds() {
    let cfg = parse_config(CIRCULAR_YAML).unwrap();
    let Scenario::Planar(mut sim) = Scenario::build(cfg).unwrap() else {
        panic!("expected a 2D scenario");
    };

    assert_eq!(sim.state().len(), 2);
    assert_eq!(sim.state().bodies[1].group, IntegrationGroup::Fine);
    assert_eq!(sim.integrator_name(), "verlet");
    assert_eq!(sim.run_to_completion(), 10);
}

#[test]
fn wrong_vector_length_is_dimension_mismatch() {
    let yaml = CIRCULAR_YAML.replace("x: [-0.5, 0.0]", "x: [-0.5, 0.0, 0.0]");
    let res = Scenario::build(parse_config(&yaml).unwrap());
    assert!(matches!(
        res,
        Err(SimError::DimensionMismatch { expected: 2, found: 3 })
    ));
}

#[test]
fn post_newtonian_without_c_is_rejected() {
    let yaml = CIRCULAR_YAML.replace(
        "  - type: newtonian",
        "  - type: post_newtonian\n    primaries: [0, 1]",
    );
    let res = Scenario::build(parse_config(&yaml).unwrap());
    assert!(matches!(res, Err(SimError::InvalidConfig(_))));
}

#[test]
fn merger_primaries_must_exist() {
    let yaml = format!("{CIRCULAR_YAML}events:\n  merger:\n    primaries: [0, 5]\n    threshold: 0.1\n");
    let res = Scenario::build(parse_config(&yaml).unwrap());
    assert!(matches!(res, Err(SimError::InvalidConfig(_))));
}

#[test]
fn inclined_orbit_in_2d_is_rejected() {
    let yaml = format!("{CIRCULAR_YAML}  - kind: inclined\n    m: 0.001\n    r: 3.0\n    inclination_deg: 10.0\n");
    let res = Scenario::build(parse_config(&yaml).unwrap());
    assert!(matches!(res, Err(SimError::InvalidConfig(_))));
}

#[test]
fn eccentricity_out_of_range_is_rejected() {
    let yaml = format!("{CIRCULAR_YAML}  - kind: elements\n    m: 0.001\n    a: 3.0\n    e: 1.2\n    period: 10.0\n");
    let res = Scenario::build(parse_config(&yaml).unwrap());
    assert!(matches!(res, Err(SimError::InvalidConfig(_))));
}

#[test]
fn unsupported_dimension_is_rejected() {
    let yaml = CIRCULAR_YAML.replace("dimension: 2", "dimension: 4");
    let res = Scenario::build(parse_config(&yaml).unwrap());
    assert!(matches!(res, Err(SimError::InvalidConfig(_))));
}

#[test]
fn malformed_yaml_is_a_yaml_error() {
    let res = parse_config("mode: nbody\nengine: [");
    assert!(matches!(res, Err(SimError::Yaml(_))));
}

#[test]
fn missing_scenario_file_is_an_io_error() {
    let res = load_config(scenario_path("does_not_exist.yaml"));
    assert!(matches!(res, Err(SimError::Io(_))));
}

#[test]
fn bundled_scenarios_build() {
    for name in [
        "kilonova.yaml",
        "kilonova_newtonian.yaml",
        "sun_earth_moon.yaml",
        "solar_system.yaml",
        "jupiter_moons.yaml",
        "kerr_photon.yaml",
    ] {
        let scenario = Scenario::load(scenario_path(name));
        assert!(scenario.is_ok(), "{name}: {:?}", scenario.err());
    }
}

#[test]
fn jupiter_moons_scenario_layout() {
    let Scenario::Spatial(sim) = Scenario::load(scenario_path("jupiter_moons.yaml")).unwrap() else {
        panic!("expected a 3D scenario");
    };
    let state = sim.state();
    assert_eq!(state.len(), 16);

    // Io: circular speed around Jupiter, tilted by 0.036 degrees
    let io = &state.bodies[1];
    let v = (6.6743e-11 * 1.898e27 / 4.217e8_f64).sqrt();
    assert_relative_eq!(io.velocity.norm(), v, max_relative = 1e-12);
    assert_relative_eq!(io.position.norm(), 4.217e8, max_relative = 1e-12);
    assert_eq!(state.bodies[5].group, IntegrationGroup::Fine);
    assert_eq!(state.bodies[15].group, IntegrationGroup::Coarse);
}

#[test]
fn kilonova_scenario_runs_through_the_merger() {
    let Scenario::Planar(mut sim) = Scenario::load(scenario_path("kilonova.yaml")).unwrap() else {
        panic!("expected a 2D scenario");
    };
    let sep0 = sim.primary_separation().unwrap();
    assert_relative_eq!(sep0, 1.0e5, max_relative = 1e-12);

    sim.run_to_completion();

    assert_eq!(sim.phase(), Phase::PostEvent);
    assert_eq!(sim.state().tracers.len(), 150);
    assert!(sim.primary_separation().unwrap() <= 60_000.0);
    assert!(sim.ticks() < 40_000);
}

#[test]
fn kerr_photon_scenario_scales_to_metres() {
    let Scenario::Geodesic { mut tracer, steps } = Scenario::load(scenario_path("kerr_photon.yaml")).unwrap() else {
        panic!("expected a geodesic scenario");
    };
    assert_eq!(steps, 4000);

    let r_g = 6.6743e-11 * 5.0e30 / (299_792_458.0_f64 * 299_792_458.0);
    let first = tracer.trace(1)[0];
    assert_relative_eq!(
        (first.x * first.x + first.y * first.y).sqrt(),
        first.r * r_g,
        max_relative = 1e-9
    );
}
