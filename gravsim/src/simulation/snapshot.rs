//! Read-only per-tick view of the simulation
//!
//! A renderer (or logger) consumes one `Snapshot` per tick. It is a plain
//! copy of what is needed for display; nothing in it feeds back into the
//! physics.

use crate::simulation::events::{EventProgress, Phase};
use crate::simulation::states::{BodyId, IntegrationGroup, Vector};

#[derive(Debug, Clone)]
pub struct BodySnapshot<const D: usize> {
    pub id: BodyId,
    pub position: Vector<D>,
    pub velocity: Vector<D>,
    pub radius: f64,
    pub group: IntegrationGroup,
    pub visible: bool, // primaries are hidden once the merger fires
}

#[derive(Debug, Clone)]
pub struct Snapshot<const D: usize> {
    pub t: f64,
    pub tick: u64,
    pub phase: Phase,
    pub bodies: Vec<BodySnapshot<D>>,
    pub tracers: Vec<Vector<D>>,
    pub progress: EventProgress,
}

impl<const D: usize> Snapshot<D> {
    pub fn visible_bodies(&self) -> impl Iterator<Item = &BodySnapshot<D>> {
        self.bodies.iter().filter(|b| b.visible)
    }
}
