//! Configuration types for loading simulation scenarios from YAML.
//!
//! This module defines a thin, `serde`-deserializable representation of a
//! scenario. The top level is tagged by `mode`:
//!
//! - `nbody`    – [`EngineConfig`], [`ParametersConfig`], a list of
//!                [`ForceConfig`] terms, optional [`EventsConfig`], an
//!                optional [`BinaryConfig`] and the [`BodyConfig`] list
//! - `geodesic` – a single Kerr geodesic ([`GeodesicConfig`])
//!
//! # YAML format
//! A 2D merger scenario matching these types:
//!
//! ```yaml
//! mode: nbody
//! engine:
//!   dimension: 2
//!   integrator: rk4          # euler | verlet | rk4 | yoshida4
//!
//! parameters:
//!   G: 6.674e-11
//!   c: 2.998e8
//!   dt: 2.0e-5
//!   max_ticks: 200000
//!   seed: 42
//!
//! forces:                  # post_newtonian carries its own Newtonian term
//!   - type: post_newtonian
//!     primaries: [0, 1]
//!
//! events:
//!   merger:
//!     primaries: [0, 1]
//!     threshold: 60000.0
//!   ejecta:
//!     count: 150
//!     v_eq: 5.0e6
//!     v_pol: 1.5e7
//!
//! binary:
//!   m1: 2.78e30
//!   m2: 2.78e30
//!   separation: 1.0e5
//!
//! bodies: []
//! ```
//!
//! The scenario builder then maps this configuration into the runtime
//! types (`Parameters`, `ForceSet`, `Simulation`, `GeodesicTracer`).

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::simulation::geodesic::ParticleKind;
use crate::simulation::states::IntegrationGroup;

/// Which integrator the engine uses
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorKind {
    Euler,    // explicit Euler, 1st order, only for comparison
    Verlet,   // velocity Verlet, symplectic, one force call per step
    Rk4,      // classical Runge-Kutta, needed for velocity-dependent forces
    Yoshida4, // 4th-order symplectic composition of Verlet
}

/// High-level engine configuration
#[derive(Deserialize, Debug, Clone)]
pub struct EngineConfig {
    pub dimension: usize,           // 2 or 3
    pub integrator: IntegratorKind, // time integrator used for advancing the state
}

fn default_seed() -> u64 {
    42
}

/// Global numerical and physical parameters for a scenario
#[derive(Deserialize, Debug, Clone)]
pub struct ParametersConfig {
    #[serde(rename = "G")]
    pub g: f64,                                    // gravitational constant
    #[serde(default)]
    pub c: Option<f64>,                            // speed of light, post-Newtonian only
    pub dt: f64,                                   // nominal step size
    #[serde(default)]
    pub group_dt: BTreeMap<IntegrationGroup, f64>, // step per integration group
    #[serde(default)]
    pub max_ticks: Option<u64>,                    // tick budget, unbounded if absent
    #[serde(default = "default_seed")]
    pub seed: u64,                                 // deterministic seed
}

fn default_damping() -> f64 {
    0.1
}

fn default_excluded() -> Vec<IntegrationGroup> {
    vec![IntegrationGroup::Fine]
}

/// One acceleration term
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForceConfig {
    Newtonian {
        #[serde(default)]
        softening2: f64,
    },
    PostNewtonian {
        primaries: (usize, usize),
    },
    Oblateness {
        central: usize,
        j2: f64,
        radius: f64,
        #[serde(default = "default_damping")]
        damping: f64,
        #[serde(default = "default_excluded")]
        excluded_groups: Vec<IntegrationGroup>,
    },
}

fn default_flash_ticks() -> u64 {
    50
}

fn default_ejecta_ticks() -> u64 {
    100
}

fn default_shock_ticks() -> u64 {
    150
}

fn default_radius_scale() -> f64 {
    5.0e4
}

#[derive(Deserialize, Debug, Clone)]
pub struct MergerEventConfig {
    pub primaries: (usize, usize),
    pub threshold: f64,
    #[serde(default = "default_flash_ticks")]
    pub flash_ticks: u64,
    #[serde(default = "default_ejecta_ticks")]
    pub ejecta_ticks: u64,
    #[serde(default = "default_shock_ticks")]
    pub shock_ticks: u64,
    #[serde(default = "default_radius_scale")]
    pub radius_scale: f64,
}

fn default_ejecta_count() -> usize {
    150
}

#[derive(Deserialize, Debug, Clone)]
pub struct EjectaEventConfig {
    #[serde(default = "default_ejecta_count")]
    pub count: usize,
    pub v_eq: f64,
    pub v_pol: f64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct EventsConfig {
    pub merger: MergerEventConfig,
    #[serde(default)]
    pub ejecta: Option<EjectaEventConfig>,
}

/// Compact binary placed on the first axis, centre of mass at the origin;
/// its two stars become bodies 0 and 1
#[derive(Deserialize, Debug, Clone)]
pub struct BinaryConfig {
    pub m1: f64,
    pub m2: f64,
    pub separation: f64,
    #[serde(default)]
    pub radius: f64,
}

/// How a body's initial state is given
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BodyKind {
    /// Explicit position / velocity vectors
    Cartesian { x: Vec<f64>, v: Vec<f64> },
    /// Keplerian ellipse around the origin, `t` after periapsis
    Elements {
        a: f64,
        e: f64,
        period: f64,
        #[serde(default)]
        t: f64,
    },
    /// Circular orbit around `central`, tilted about the first axis
    Inclined {
        r: f64,
        inclination_deg: f64,
        #[serde(default)]
        phase_deg: f64,
        #[serde(default)]
        central: usize,
    },
}

/// Configuration for a single body's initial state
#[derive(Deserialize, Debug, Clone)]
pub struct BodyConfig {
    pub m: f64,                 // mass of the body
    #[serde(flatten)]
    pub kind: BodyKind,         // initial state description
    #[serde(default)]
    pub radius: f64,            // physical radius
    #[serde(default)]
    pub group: IntegrationGroup, // time step group
}

#[derive(Deserialize, Debug, Clone)]
pub struct NBodyConfig {
    pub engine: EngineConfig,
    pub parameters: ParametersConfig,
    pub forces: Vec<ForceConfig>,
    #[serde(default)]
    pub events: Option<EventsConfig>,
    #[serde(default)]
    pub binary: Option<BinaryConfig>,
    #[serde(default)]
    pub bodies: Vec<BodyConfig>,
}

fn default_energy() -> f64 {
    1.0
}

/// Single particle in the equatorial plane of a Kerr black hole
#[derive(Deserialize, Debug, Clone)]
pub struct GeodesicConfig {
    pub spin: f64,
    pub impact_parameter: f64,
    pub r0: f64,
    #[serde(default)]
    pub phi0: f64,
    pub step: f64,
    pub steps: usize,
    #[serde(default)]
    pub particle: ParticleKind,
    #[serde(default = "default_energy")]
    pub energy: f64,
    #[serde(default)]
    pub escape_radius: Option<f64>,
    #[serde(default)]
    pub mass_kg: Option<f64>,
}

/// Top-level scenario configuration loaded from YAML.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScenarioConfig {
    #[serde(rename = "nbody")]
    NBody(NBodyConfig),
    Geodesic(GeodesicConfig),
}
