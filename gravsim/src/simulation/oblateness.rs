//! J2 (equatorial bulge) perturbation from an oblate central body
//!
//! Layered on top of [`NewtonianPairwise`](crate::simulation::forces::NewtonianPairwise)
//! inside a `ForceSet`. Only satellites feel it; the central body gets no
//! back-reaction. The polar axis is the third component, so in 2D the
//! term reduces to a purely radial correction.

use crate::simulation::forces::ForceModel;
use crate::simulation::states::{IntegrationGroup, SystemState, Vector};

#[derive(Debug, Clone)]
pub struct OblatenessPerturbation {
    pub g: f64,
    pub central: usize,                          // index of the oblate body
    pub j2: f64,                                 // J2 coefficient
    pub equatorial_radius: f64,                  // R of the central body
    pub damping: f64,                            // strength scale applied to the term
    pub excluded_groups: Vec<IntegrationGroup>,  // groups too fast to tolerate it
}

impl OblatenessPerturbation {
    pub fn new(g: f64, central: usize, j2: f64, equatorial_radius: f64) -> Self {
        Self {
            g,
            central,
            j2,
            equatorial_radius,
            damping: 0.1,
            excluded_groups: vec![IntegrationGroup::Fine],
        }
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_excluded_groups(mut self, groups: Vec<IntegrationGroup>) -> Self {
        self.excluded_groups = groups;
        self
    }

    /// J2 acceleration at offset `r` (satellite minus central body)
    pub fn j2_acceleration<const D: usize>(&self, central_mass: f64, r: &Vector<D>) -> Vector<D> {
        let dist2 = r.norm_squared();
        if dist2 == 0.0 {
            return Vector::<D>::zeros();
        }
        let dist = dist2.sqrt();
        let z = if D >= 3 { r[2] } else { 0.0 };
        let z2_r2 = z * z / dist2;

        let factor = -1.5 * self.g * central_mass * self.j2 * self.equatorial_radius.powi(2)
            / dist.powi(5);

        let mut a = r * (factor * (1.0 - 5.0 * z2_r2));
        if D >= 3 {
            a[2] = factor * z * (3.0 - 5.0 * z2_r2);
        }
        a * self.damping
    }
}

impl<const D: usize> ForceModel<D> for OblatenessPerturbation {
    fn accumulate(&self, state: &SystemState<D>, out: &mut [Vector<D>]) {
        let Some(central) = state.bodies.get(self.central) else {
            return;
        };

        for (i, body) in state.bodies.iter().enumerate() {
            if i == self.central || self.excluded_groups.contains(&body.group) {
                continue;
            }
            let r = body.position - central.position;
            out[i] += self.j2_acceleration(central.mass, &r);
        }
    }
}
