use std::time::Instant;

use crate::configuration::config::IntegratorKind;
use crate::error::Result;
use crate::simulation::forces::{ForceModel, ForceSet, NewtonianPairwise};
use crate::simulation::integrator::{build_integrator, prime_accelerations, StepSizes};
use crate::simulation::states::{Body, NVec3, SystemState};

/// Helper to build a deterministic cluster of `n` bodies, no rand needed
fn make_cluster(n: usize) -> Result<SystemState<3>> {
    let bodies = (0..n)
        .map(|i| {
            let i_f = i as f64;
            let x = NVec3::new(
                (i_f * 0.37).sin() * 5.0,
                (i_f * 0.13).cos() * 5.0,
                (i_f * 0.07).sin() * 5.0,
            );
            Body::new(i as u32, 1.0, x, NVec3::zeros())
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(SystemState::new(bodies))
}

/// Equal-mass circular binary with G = 1, separation 1, period 2 pi / sqrt(2)
fn make_binary() -> Result<SystemState<3>> {
    let v = 0.5 * 2.0_f64.sqrt();
    let bodies = [(-0.5, -v), (0.5, v)]
        .iter()
        .enumerate()
        .map(|(i, &(x, vy))| {
            Body::new(i as u32, 1.0, NVec3::new(x, 0.0, 0.0), NVec3::new(0.0, vy, 0.0))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(SystemState::new(bodies))
}

fn energy(state: &SystemState<3>, forces: &ForceSet<3>) -> f64 {
    state.kinetic_energy() + forces.potential_energy(state)
}

/// Time one direct force evaluation for growing `n`
pub fn bench_gravity() -> Result<()> {
    let ns = [100, 200, 400, 800, 1600, 3200];

    for n in ns {
        let sys = make_cluster(n)?;
        let gravity = NewtonianPairwise::with_softening(0.1, 1e-4);

        // Warm up
        let _ = gravity.compute(&sys);

        let t0 = Instant::now();
        let acc = gravity.compute(&sys);
        let elapsed = t0.elapsed().as_secs_f64();

        println!("N = {n:5}, direct = {:8.6} s ({} accelerations)", elapsed, acc.len());
    }
    Ok(())
}

/// Energy drift and cost of every integrator on the same binary
/// Paste output directly into excel to graph
pub fn bench_integrators() -> Result<()> {
    let kinds = [
        IntegratorKind::Euler,
        IntegratorKind::Verlet,
        IntegratorKind::Rk4,
        IntegratorKind::Yoshida4,
    ];
    let periods = 10.0;
    let period = std::f64::consts::TAU / 2.0_f64.sqrt();

    println!("integrator,dt,steps,rel_energy_error,ms_total");

    for steps_per_period in [100_usize, 400, 1600] {
        let dt = period / steps_per_period as f64;
        let n_steps = (periods * steps_per_period as f64) as usize;

        for kind in kinds {
            let forces = ForceSet::new().with(NewtonianPairwise::new(1.0));
            let mut sys = make_binary()?;
            prime_accelerations(&mut sys, &forces);
            let integrator = build_integrator::<3>(kind, None);
            let steps = StepSizes::uniform(dt, sys.len());

            let e0 = energy(&sys, &forces);
            let t0 = Instant::now();
            integrator.integrate(&mut sys, &steps, n_steps, &forces);
            let ms = t0.elapsed().as_secs_f64() * 1000.0;
            let drift = ((energy(&sys, &forces) - e0) / e0).abs();

            println!("{},{:.6e},{},{:.3e},{:.3}", integrator.name(), dt, n_steps, drift, ms);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_keep_every_body() {
        let cluster = make_cluster(27).unwrap();
        assert_eq!(cluster.len(), 27);

        let binary = make_binary().unwrap();
        assert_eq!(binary.len(), 2);
        assert!(binary.separation(0, 1) > 0.0);
    }
}
