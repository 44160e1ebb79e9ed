//! Numerical and physical parameters for the simulation
//!
//! `Parameters` holds runtime settings:
//! - nominal step size and per-group step overrides,
//! - gravitational constant `g` and (relativistic runs only) `c`,
//! - tick budget and random seed

use std::collections::BTreeMap;

use crate::error::{Result, SimError};
use crate::simulation::states::IntegrationGroup;

#[derive(Debug, Clone)]
pub struct Parameters {
    pub g: f64,                                   // gravitational constant
    pub c: Option<f64>,                           // speed of light
    pub dt: f64,                                  // nominal step size
    pub group_dt: BTreeMap<IntegrationGroup, f64>, // absolute step per group
    pub max_ticks: u64,                           // tick budget
    pub seed: u64,                                // deterministic seed
}

impl Parameters {
    pub fn new(g: f64, dt: f64) -> Self {
        Self {
            g,
            c: None,
            dt,
            group_dt: BTreeMap::new(),
            max_ticks: u64::MAX,
            seed: 42,
        }
    }

    /// Reject settings that would make the tick loop meaningless
    pub fn validate(&self) -> Result<()> {
        if !(self.g.is_finite() && self.g > 0.0) {
            return Err(SimError::InvalidConfig(format!("G must be positive, got {}", self.g)));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SimError::InvalidConfig(format!("dt must be positive, got {}", self.dt)));
        }
        if let Some(c) = self.c {
            if !(c.is_finite() && c > 0.0) {
                return Err(SimError::InvalidConfig(format!("c must be positive, got {c}")));
            }
        }
        for (group, dt) in &self.group_dt {
            if !(dt.is_finite() && *dt > 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "step override for {group:?} must be positive, got {dt}"
                )));
            }
        }
        Ok(())
    }

    /// Ratio of a group's step to the nominal step
    pub fn group_factor(&self, group: IntegrationGroup) -> f64 {
        match group {
            IntegrationGroup::Standard => 1.0,
            _ => self.group_dt.get(&group).map_or(1.0, |dt| dt / self.dt),
        }
    }
}
