//! Force / acceleration contributors for the dynamics engine
//!
//! Defines the dimension-generic [`ForceModel`] trait, the [`ForceSet`]
//! collection that sums several terms, and direct pairwise Newtonian
//! gravity. The relativistic binary term and the oblateness perturbation
//! live in their own modules and plug into the same trait.

use crate::simulation::states::{SystemState, Vector};

/// Trait for acceleration sources operating on a [`SystemState`]
///
/// Implementations add their contribution into `out[i]` for each body.
/// They must be pure: integrators call them several times per step.
pub trait ForceModel<const D: usize>: Send + Sync {
    fn accumulate(&self, state: &SystemState<D>, out: &mut [Vector<D>]);

    /// Fresh accelerations for every body
    fn compute(&self, state: &SystemState<D>) -> Vec<Vector<D>> {
        let mut out = vec![Vector::<D>::zeros(); state.len()];
        self.accumulate(state, &mut out);
        out
    }

    /// Potential energy carried by this term (0 for non-conservative terms)
    fn potential_energy(&self, _state: &SystemState<D>) -> f64 {
        0.0
    }
}

/// Collection of acceleration terms (gravity, perturbations, ...)
/// Each term implements [`ForceModel`] and their contributions are summed
/// into a single acceleration vector per body
pub struct ForceSet<const D: usize> {
    terms: Vec<Box<dyn ForceModel<D>>>,
}

impl<const D: usize> ForceSet<D> {
    /// Create an empty force set
    pub fn new() -> Self {
        Self {
            terms: Vec::new()
        }
    }

    /// Add a term
    pub fn with<T>(mut self, term: T) -> Self
    where
        T: ForceModel<D> + 'static,
    {
        self.terms.push(Box::new(term));
        self
    }

    pub fn push(&mut self, term: Box<dyn ForceModel<D>>) {
        self.terms.push(term);
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Compute total accelerations for all bodies in `state`
    /// - `out[i]` will be set to the sum of contributions from all terms
    pub fn accumulate_accels(&self, state: &SystemState<D>, out: &mut [Vector<D>]) {
        // Zero buffer
        for a in out.iter_mut() {
            *a = Vector::<D>::zeros();
        }
        for term in &self.terms {
            term.accumulate(state, out);
        }
    }
}

impl<const D: usize> Default for ForceSet<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> ForceModel<D> for ForceSet<D> {
    fn accumulate(&self, state: &SystemState<D>, out: &mut [Vector<D>]) {
        for term in &self.terms {
            term.accumulate(state, out);
        }
    }

    fn potential_energy(&self, state: &SystemState<D>) -> f64 {
        self.terms.iter().map(|t| t.potential_energy(state)).sum()
    }
}

/// Newtonian gravity, direct n^2 sum over unordered pairs
///
/// `softening2` adds a Plummer core (`|r|^2 + eps^2`). With no softening a
/// zero separation is skipped: the pair contributes nothing instead of
/// producing inf/NaN.
#[derive(Debug, Clone)]
pub struct NewtonianPairwise {
    pub g: f64,                                // gravitational constant
    pub softening2: f64,                       // softening
    pub excluded_pair: Option<(usize, usize)>, // pair handled by another term
}

impl NewtonianPairwise {
    pub fn new(g: f64) -> Self {
        Self::with_softening(g, 0.0)
    }

    pub fn with_softening(g: f64, softening2: f64) -> Self {
        Self {
            g,
            softening2,
            excluded_pair: None,
        }
    }

    /// Leave the `(i, j)` interaction to another term (post-Newtonian binary)
    pub fn excluding_pair(mut self, pair: (usize, usize)) -> Self {
        self.excluded_pair = Some(pair);
        self
    }

    fn is_excluded(&self, i: usize, j: usize) -> bool {
        self.excluded_pair
            .is_some_and(|(p, q)| (p, q) == (i, j) || (q, p) == (i, j))
    }

    /// Softened squared distance, `None` for a degenerate pair
    fn softened_r2(&self, r2: f64) -> Option<f64> {
        let d2 = r2 + self.softening2;
        (d2 > 0.0).then_some(d2)
    }
}

impl<const D: usize> ForceModel<D> for NewtonianPairwise {
    fn accumulate(&self, state: &SystemState<D>, out: &mut [Vector<D>]) {
        let n = state.len();
        if n < 2 { // Nothing to pair
            return;
        }

        // Loop over each unordered pair (i, j) with i < j; i == j never occurs
        for i in 0..n {
            let bi = &state.bodies[i];

            for j in (i + 1)..n {
                if self.is_excluded(i, j) {
                    continue;
                }
                let bj = &state.bodies[j];

                // r points from i to j: i is pulled along +r, j along -r
                let r = bj.position - bi.position;

                // Coincident bodies: transient numerical coincidence, skip the pair
                let Some(d2) = self.softened_r2(r.norm_squared()) else {
                    continue;
                };

                // coef = G / |r|^3
                let inv_r = d2.sqrt().recip();
                let coef = self.g * inv_r * inv_r * inv_r;

                // a_i +=  G m_j r / |r|^3
                // a_j += -G m_i r / |r|^3
                out[i] += r * (coef * bj.mass);
                out[j] -= r * (coef * bi.mass);
            }
        }
    }

    fn potential_energy(&self, state: &SystemState<D>) -> f64 {
        let mut u = 0.0;
        for (i, bi) in state.bodies.iter().enumerate() {
            for (j, bj) in state.bodies.iter().enumerate().skip(i + 1) {
                if self.is_excluded(i, j) {
                    continue;
                }
                let r = bj.position - bi.position;
                if let Some(d2) = self.softened_r2(r.norm_squared()) {
                    u -= self.g * bi.mass * bj.mass / d2.sqrt();
                }
            }
        }
        u
    }
}
