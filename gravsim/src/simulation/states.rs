//! Core state types for the dynamics engine.
//!
//! Everything is generic over the spatial dimension `D`:
//! - `Body<D>`        a gravitating body (mass, kinematics, integration group)
//! - `Tracer<D>`      a massless free-streaming particle (ejecta)
//! - `SystemState<D>` the ordered bodies, tracers and the current time `t`
//!
//! `NVec2` / `NVec3` are kept as the 2D / 3D shorthands.

use nalgebra::{SVector, Vector2, Vector3};
use serde::Deserialize;

use crate::error::{Result, SimError};

pub type Vector<const D: usize> = SVector<f64, D>;
pub type NVec2 = Vector2<f64>;
pub type NVec3 = Vector3<f64>;

/// Tag that selects a body's effective time step (and physics hints such as
/// oblateness exclusion) without special-casing bodies by name
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationGroup {
    /// Close / fast bodies that need a smaller step than nominal
    Fine,
    /// Nominal step
    #[default]
    Standard,
    /// Slow outer bodies that tolerate a larger step
    Coarse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyId(pub u32);

#[derive(Debug, Clone)]
pub struct Body<const D: usize> {
    pub id: BodyId,
    pub mass: f64,                 // mass (> 0)
    pub position: Vector<D>,       // position
    pub velocity: Vector<D>,       // velocity
    pub acceleration: Vector<D>,   // last evaluated acceleration
    pub radius: f64,               // physical radius (merge threshold / display)
    pub group: IntegrationGroup,   // time step group
}

impl<const D: usize> Body<D> {
    /// Build a body, refusing anything that would propagate NaNs
    pub fn new(id: u32, mass: f64, position: Vector<D>, velocity: Vector<D>) -> Result<Self> {
        if !mass.is_finite() || mass <= 0.0 {
            return Err(SimError::InvalidBody(format!(
                "body {id}: mass must be positive and finite, got {mass}"
            )));
        }
        if !position.iter().chain(velocity.iter()).all(|c| c.is_finite()) {
            return Err(SimError::InvalidBody(format!(
                "body {id}: position and velocity must be finite"
            )));
        }

        Ok(Self {
            id: BodyId(id),
            mass,
            position,
            velocity,
            acceleration: Vector::<D>::zeros(),
            radius: 0.0,
            group: IntegrationGroup::Standard,
        })
    }

    /// Build a body from raw component slices (configuration input)
    pub fn from_slices(id: u32, mass: f64, x: &[f64], v: &[f64]) -> Result<Self> {
        Self::new(id, mass, vector_from_slice(x)?, vector_from_slice(v)?)
    }

    pub fn with_radius(mut self, radius: f64) -> Result<Self> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(SimError::InvalidBody(format!(
                "body {}: radius must be non-negative, got {radius}",
                self.id.0
            )));
        }
        self.radius = radius;
        Ok(self)
    }

    pub fn with_group(mut self, group: IntegrationGroup) -> Self {
        self.group = group;
        self
    }

    pub fn momentum(&self) -> Vector<D> {
        self.velocity * self.mass
    }

    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * self.velocity.norm_squared()
    }

    pub fn distance_to(&self, other: &Body<D>) -> f64 {
        (other.position - self.position).norm()
    }
}

/// Massless particle that only free-streams (`x += v dt`)
#[derive(Debug, Clone)]
pub struct Tracer<const D: usize> {
    pub position: Vector<D>,
    pub velocity: Vector<D>,
}

impl<const D: usize> Tracer<D> {
    pub fn advance(&mut self, dt: f64) {
        self.position += self.velocity * dt;
    }
}

#[derive(Debug, Clone)]
pub struct SystemState<const D: usize> {
    pub bodies: Vec<Body<D>>,     // gravitating bodies, order is stable
    pub tracers: Vec<Tracer<D>>,  // ejecta, empty until an event spawns them
    pub t: f64,                   // time
}

impl<const D: usize> SystemState<D> {
    pub fn new(bodies: Vec<Body<D>>) -> Self {
        Self {
            bodies,
            tracers: Vec::new(),
            t: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Distance between bodies `i` and `j`
    pub fn separation(&self, i: usize, j: usize) -> f64 {
        (self.bodies[j].position - self.bodies[i].position).norm()
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.bodies.iter().map(Body::kinetic_energy).sum()
    }

    pub fn total_momentum(&self) -> Vector<D> {
        self.bodies
            .iter()
            .fold(Vector::<D>::zeros(), |acc, b| acc + b.momentum())
    }

    /// Mass-weighted centre of the bodies at `indices`
    pub fn center_of_mass(&self, indices: &[usize]) -> Vector<D> {
        let (weighted, mass) = indices.iter().fold((Vector::<D>::zeros(), 0.0), |(acc, m), &i| {
            let b = &self.bodies[i];
            (acc + b.position * b.mass, m + b.mass)
        });
        if mass > 0.0 {
            weighted / mass
        } else {
            Vector::<D>::zeros()
        }
    }
}

/// Convert a configuration slice into a `D`-vector, checking the length
pub fn vector_from_slice<const D: usize>(values: &[f64]) -> Result<Vector<D>> {
    if values.len() != D {
        return Err(SimError::DimensionMismatch {
            expected: D,
            found: values.len(),
        });
    }
    Ok(Vector::<D>::from_column_slice(values))
}

/// Embed a planar (x, y) pair into the first two axes of a `D`-vector
pub fn planar<const D: usize>(x: f64, y: f64) -> Result<Vector<D>> {
    if D < 2 {
        return Err(SimError::InvalidConfig(format!(
            "planar orbit needs at least 2 dimensions, scenario has {D}"
        )));
    }
    let mut v = Vector::<D>::zeros();
    v[0] = x;
    v[1] = y;
    Ok(v)
}
