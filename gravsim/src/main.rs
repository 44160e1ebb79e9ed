use gravsim::{bench_gravity, bench_integrators};
use gravsim::{Scenario, Simulation, Snapshot, TickStatus};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use std::path::PathBuf;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, default_value = "kilonova.yaml")]
    file_name: String,

    /// Stop after this many ticks even if the scenario is still running
    #[arg(long)]
    ticks: Option<u64>,

    /// Log a snapshot summary every K ticks
    #[arg(long, default_value_t = 1000)]
    every: u64,

    /// Run the integrator benchmarks instead of a scenario
    #[arg(long)]
    bench: bool,
}

// load here to keep main clean
fn load_scenario(file_name: &str) -> Result<Scenario> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(file_name);
    Scenario::load(&config_path).with_context(|| format!("failed to load scenario {}", config_path.display()))
}

fn summarize<const D: usize>(snap: &Snapshot<D>) {
    info!(
        "tick {:7} t = {:.6e} phase {:?} bodies {} visible, {} tracers, flash {:.2}",
        snap.tick,
        snap.t,
        snap.phase,
        snap.visible_bodies().count(),
        snap.tracers.len(),
        snap.progress.flash
    );
}

fn run<const D: usize>(mut sim: Simulation<D>, ticks: Option<u64>, every: u64) {
    let every = every.max(1);
    let e0 = sim.diagnostics().total_energy();
    summarize(&sim.snapshot());

    loop {
        let status = sim.tick();
        if sim.ticks() % every == 0 {
            summarize(&sim.snapshot());
        }
        if status == TickStatus::Finished || ticks.is_some_and(|n| sim.ticks() >= n) {
            break;
        }
    }

    let diag = sim.diagnostics();
    summarize(&sim.snapshot());
    info!(
        "energy {:.6e} (initial {:.6e}), |p| = {:.3e}, primary separation {:?}, dt = {:e}",
        diag.total_energy(),
        e0,
        diag.momentum.norm(),
        diag.primary_separation,
        sim.params().dt
    );
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.bench {
        bench_gravity()?;
        bench_integrators()?;
        return Ok(());
    }

    match load_scenario(&args.file_name)? {
        Scenario::Planar(sim) => run(sim, args.ticks, args.every),
        Scenario::Spatial(sim) => run(sim, args.ticks, args.every),
        Scenario::Geodesic { mut tracer, steps } => {
            let steps = args.ticks.map_or(steps, |n| n as usize);
            let points = tracer.trace(steps);
            if let Some(last) = points.last() {
                info!(
                    "{} points, last at lambda = {:.3}: r = {:.4}, (x, y) = ({:.4e}, {:.4e}), redshift {:.3}",
                    points.len(),
                    last.lambda,
                    last.r,
                    last.x,
                    last.y,
                    last.redshift
                );
            }
            info!("geodesic phase {:?}", tracer.phase());
        }
    }

    Ok(())
}
