//! Build fully-initialized scenarios from configuration
//!
//! Takes a `ScenarioConfig` (YAML-facing) and produces a ready-to-run
//! runtime bundle:
//! - `Scenario::Planar` / `Scenario::Spatial`: a `Simulation<2>` or
//!   `Simulation<3>` with bodies at t = 0, the force set, the selected
//!   integrator and the merger detector
//! - `Scenario::Geodesic`: a `GeodesicTracer` and its step budget
//!
//! Every inconsistency in the configuration is reported here as a
//! `SimError` so the tick loop never sees a half-valid setup.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::{info, warn};

use crate::configuration::config::{
    BinaryConfig, BodyConfig, BodyKind, EventsConfig, ForceConfig, GeodesicConfig, NBodyConfig,
    ParametersConfig, ScenarioConfig,
};
use crate::error::{Result, SimError};
use crate::simulation::engine::Simulation;
use crate::simulation::events::{EjectaConfig, MergerConfig, MergerDetector};
use crate::simulation::forces::{ForceSet, NewtonianPairwise};
use crate::simulation::geodesic::{GeodesicField, GeodesicTracer};
use crate::simulation::integrator::{build_integrator, MergeGuard};
use crate::simulation::oblateness::OblatenessPerturbation;
use crate::simulation::orbits::{circular_speed, inclined_orbit, OrbitalElements};
use crate::simulation::params::Parameters;
use crate::simulation::post_newtonian::{binary_bodies, quasi_circular, PostNewtonianBinary};
use crate::simulation::states::{Body, SystemState};

/// A scenario ready to tick
pub enum Scenario {
    Planar(Simulation<2>),
    Spatial(Simulation<3>),
    Geodesic { tracer: GeodesicTracer, steps: usize },
}

impl Scenario {
    pub fn build(cfg: ScenarioConfig) -> Result<Self> {
        match cfg {
            ScenarioConfig::NBody(nbody) => match nbody.engine.dimension {
                2 => Ok(Scenario::Planar(build_simulation::<2>(&nbody)?)),
                3 => Ok(Scenario::Spatial(build_simulation::<3>(&nbody)?)),
                d => Err(SimError::InvalidConfig(format!("dimension must be 2 or 3, got {d}"))),
            },
            ScenarioConfig::Geodesic(geo) => {
                let tracer = build_tracer(&geo)?;
                Ok(Scenario::Geodesic {
                    tracer,
                    steps: geo.steps,
                })
            }
        }
    }

    /// Read and build a scenario file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(load_config(path)?)
    }
}

/// Parse a scenario file without building it
pub fn load_config(path: impl AsRef<Path>) -> Result<ScenarioConfig> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    Ok(serde_yaml::from_reader(reader)?)
}

pub fn parse_config(yaml: &str) -> Result<ScenarioConfig> {
    Ok(serde_yaml::from_str(yaml)?)
}

fn build_parameters(cfg: &ParametersConfig) -> Result<Parameters> {
    let params = Parameters {
        g: cfg.g,
        c: cfg.c,
        dt: cfg.dt,
        group_dt: cfg.group_dt.clone(),
        max_ticks: cfg.max_ticks.unwrap_or(u64::MAX),
        seed: cfg.seed,
    };
    params.validate()?;
    Ok(params)
}

fn check_index(what: &str, index: usize, n: usize) -> Result<()> {
    if index >= n {
        return Err(SimError::InvalidConfig(format!(
            "{what} refers to body {index}, but only {n} bodies exist"
        )));
    }
    Ok(())
}

fn check_pair(what: &str, (i, j): (usize, usize), n: usize) -> Result<()> {
    check_index(what, i, n)?;
    check_index(what, j, n)?;
    if i == j {
        return Err(SimError::InvalidConfig(format!("{what} needs two different bodies, got ({i}, {j})")));
    }
    Ok(())
}

/// The binary's two stars, on a quasi-circular inspiral when `c` is known
fn build_binary<const D: usize>(cfg: &BinaryConfig, params: &Parameters) -> Result<[Body<D>; 2]> {
    let (radial, tangential) = match params.c {
        Some(c) => {
            let start = quasi_circular(cfg.m1, cfg.m2, cfg.separation, params.g, c)?;
            (start.radial, start.tangential)
        }
        None => {
            if !(cfg.separation > 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "binary separation must be positive, got {}",
                    cfg.separation
                )));
            }
            (0.0, circular_speed(params.g, cfg.m1 + cfg.m2, cfg.separation))
        }
    };

    let [b1, b2] = binary_bodies::<D>(cfg.m1, cfg.m2, cfg.separation, (radial, tangential))?;
    Ok([b1.with_radius(cfg.radius)?, b2.with_radius(cfg.radius)?])
}

fn build_body<const D: usize>(
    id: u32,
    cfg: &BodyConfig,
    built: &[Body<D>],
    params: &Parameters,
) -> Result<Body<D>> {
    let body = match &cfg.kind {
        BodyKind::Cartesian { x, v } => Body::from_slices(id, cfg.m, x, v)?,
        BodyKind::Elements { a, e, period, t } => {
            let (x, v) = OrbitalElements::new(*a, *e, *period)?.state_at::<D>(*t)?;
            Body::new(id, cfg.m, x, v)?
        }
        BodyKind::Inclined {
            r,
            inclination_deg,
            phase_deg,
            central,
        } => {
            let Some(center) = built.get(*central) else {
                return Err(SimError::InvalidConfig(format!(
                    "body {id}: inclined orbit central body {central} must be listed before it"
                )));
            };
            let (x, v) = inclined_orbit::<D>(
                params.g,
                center.mass,
                *r,
                inclination_deg.to_radians(),
                phase_deg.to_radians(),
            )?;
            Body::new(id, cfg.m, center.position + x, center.velocity + v)?
        }
    };
    Ok(body.with_radius(cfg.radius)?.with_group(cfg.group))
}

fn build_forces<const D: usize>(
    cfg: &[ForceConfig],
    params: &Parameters,
    n: usize,
) -> Result<ForceSet<D>> {
    // the post-Newtonian term already carries the Newtonian pull of its pair
    let pn_pair = cfg.iter().find_map(|f| match f {
        ForceConfig::PostNewtonian { primaries } => Some(*primaries),
        _ => None,
    });

    let mut forces = ForceSet::new();
    for term in cfg {
        match term {
            ForceConfig::Newtonian { softening2 } => {
                if !(*softening2 >= 0.0) {
                    return Err(SimError::InvalidConfig(format!(
                        "softening2 must be non-negative, got {softening2}"
                    )));
                }
                let mut gravity = NewtonianPairwise::with_softening(params.g, *softening2);
                if let Some(pair) = pn_pair {
                    gravity = gravity.excluding_pair(pair);
                }
                forces.push(Box::new(gravity));
            }
            ForceConfig::PostNewtonian { primaries } => {
                let Some(c) = params.c else {
                    return Err(SimError::InvalidConfig(
                        "post_newtonian force needs the speed of light `c` in parameters".into(),
                    ));
                };
                check_pair("post_newtonian primaries", *primaries, n)?;
                forces.push(Box::new(PostNewtonianBinary::new(params.g, c, *primaries)));
            }
            ForceConfig::Oblateness {
                central,
                j2,
                radius,
                damping,
                excluded_groups,
            } => {
                check_index("oblateness central", *central, n)?;
                forces.push(Box::new(
                    OblatenessPerturbation::new(params.g, *central, *j2, *radius)
                        .with_damping(*damping)
                        .with_excluded_groups(excluded_groups.clone()),
                ));
            }
        }
    }
    if forces.is_empty() {
        warn!("scenario has no force terms, bodies will move in straight lines");
    }
    Ok(forces)
}

fn build_detector(cfg: &EventsConfig, seed: u64, n: usize) -> Result<MergerDetector> {
    let m = &cfg.merger;
    check_pair("merger primaries", m.primaries, n)?;

    let merger = MergerConfig {
        primaries: m.primaries,
        threshold: m.threshold,
        flash_ticks: m.flash_ticks,
        ejecta_ticks: m.ejecta_ticks,
        shock_ticks: m.shock_ticks,
        radius_scale: m.radius_scale,
    };
    let ejecta = cfg.ejecta.as_ref().map(|e| EjectaConfig {
        count: e.count,
        v_eq: e.v_eq,
        v_pol: e.v_pol,
    });
    MergerDetector::new(merger, ejecta, seed)
}

/// Build an N-body run in `D` dimensions
pub fn build_simulation<const D: usize>(cfg: &NBodyConfig) -> Result<Simulation<D>> {
    if cfg.engine.dimension != D {
        return Err(SimError::DimensionMismatch {
            expected: D,
            found: cfg.engine.dimension,
        });
    }
    let params = build_parameters(&cfg.parameters)?;

    // Bodies: the binary (if any) first, then the listed bodies in order
    let mut bodies: Vec<Body<D>> = Vec::with_capacity(cfg.bodies.len() + 2);
    if let Some(binary) = &cfg.binary {
        bodies.extend(build_binary::<D>(binary, &params)?);
    }
    for body_cfg in &cfg.bodies {
        let id = bodies.len() as u32;
        let body = build_body(id, body_cfg, &bodies, &params)?;
        bodies.push(body);
    }
    let n = bodies.len();

    let forces = build_forces::<D>(&cfg.forces, &params, n)?;

    let detector = cfg
        .events
        .as_ref()
        .map(|ev| build_detector(ev, params.seed, n))
        .transpose()?;
    let guard = cfg.events.as_ref().map(|ev| MergeGuard {
        primaries: ev.merger.primaries,
        threshold: ev.merger.threshold,
    });
    let integrator = build_integrator::<D>(cfg.engine.integrator, guard);

    info!(
        "built {D}D scenario: {n} bodies, {} force terms, integrator {}, merger {}",
        forces.len(),
        integrator.name(),
        if detector.is_some() { "on" } else { "off" }
    );

    Simulation::new(
        SystemState::new(bodies),
        params,
        forces,
        integrator,
        detector,
    )
}

/// Build the single-particle geodesic tracer
pub fn build_tracer(cfg: &GeodesicConfig) -> Result<GeodesicTracer> {
    if cfg.steps == 0 {
        return Err(SimError::InvalidConfig("geodesic steps must be at least 1".into()));
    }
    let field = GeodesicField::new(cfg.spin, cfg.impact_parameter, cfg.energy, cfg.particle)?;
    let mut tracer = GeodesicTracer::new(field, cfg.r0, cfg.phi0, cfg.step)?;

    if let Some(escape) = cfg.escape_radius {
        if !(escape > cfg.r0) {
            return Err(SimError::InvalidConfig(format!(
                "escape radius {escape} must exceed the start radius {}",
                cfg.r0
            )));
        }
        tracer = tracer.with_escape_radius(escape);
    }
    if let Some(mass) = cfg.mass_kg {
        if !(mass > 0.0 && mass.is_finite()) {
            return Err(SimError::InvalidConfig(format!("black hole mass must be positive, got {mass}")));
        }
        tracer = tracer.with_mass_kg(mass);
    }

    info!(
        "built geodesic scenario: a = {}, b = {}, r0 = {}, {:?}, horizon {:.4}",
        cfg.spin,
        cfg.impact_parameter,
        cfg.r0,
        cfg.particle,
        tracer.field.horizon()
    );
    Ok(tracer)
}
