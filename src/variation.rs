//! Real-coded variation: simulated binary crossover and polynomial mutation.
//!
//! References:
//! - Deb, K. & Agrawal, R. B. "Simulated Binary Crossover for Continuous Search Space" (1995)
//! - Deb, K. & Goyal, M. "A Combined Genetic Adaptive Search (GeneAS)" (1996)

use crate::problem::{Bound, ProblemSpec};
use rand::Rng;
use serde::Serialize;

/// Parent components closer than this are copied unchanged by SBX.
const MIN_PARENT_GAP: f64 = 1e-14;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Variation {
    /// Probability that a pair of parents is recombined at all
    pub crossover_prob: f64,
    /// Distribution index for SBX crossover
    pub eta_c: f64,
    /// Mutation probability (per gene)
    pub mutation_prob: f64,
    /// Distribution index for polynomial mutation
    pub eta_m: f64,
}

impl Variation {
    /// Defaults scaled to the problem: one expected mutation per child.
    pub fn for_problem(problem: &ProblemSpec) -> Self {
        Self {
            crossover_prob: 0.9,
            eta_c: 20.0,
            mutation_prob: 1.0 / problem.num_variables() as f64,
            eta_m: 20.0,
        }
    }

    /// Simulated binary crossover.
    ///
    /// Each participating component gets one spread factor; the children are
    /// mirror images of each other around the parents' midpoint.
    pub fn sbx<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        bounds: &[Bound],
        p1: &[f64],
        p2: &[f64],
    ) -> (Vec<f64>, Vec<f64>) {
        let mut c1 = p1.to_vec();
        let mut c2 = p2.to_vec();

        if rng.gen::<f64>() >= self.crossover_prob {
            return (c1, c2);
        }

        for (i, b) in bounds.iter().enumerate() {
            if rng.gen::<f64>() > 0.5 {
                continue;
            }

            let y1 = p1[i].min(p2[i]);
            let y2 = p1[i].max(p2[i]);
            if y2 - y1 < MIN_PARENT_GAP {
                continue;
            }

            // Spread is limited by whichever bound is nearer to the parents.
            let room = (y1 - b.lower).min(b.upper - y2).max(0.0);
            let beta = 1.0 + 2.0 * room / (y2 - y1);
            let alpha = 2.0 - beta.powf(-(self.eta_c + 1.0));
            let u: f64 = rng.gen();
            let betaq = if u <= 1.0 / alpha {
                (u * alpha).powf(1.0 / (self.eta_c + 1.0))
            } else {
                (1.0 / (2.0 - u * alpha)).powf(1.0 / (self.eta_c + 1.0))
            };

            let mid = 0.5 * (y1 + y2);
            let half = 0.5 * betaq * (y2 - y1);
            let (lo, hi) = (b.clip(mid - half), b.clip(mid + half));

            // Keep each child on its parent's side half of the time.
            if rng.gen::<bool>() {
                c1[i] = lo;
                c2[i] = hi;
            } else {
                c1[i] = hi;
                c2[i] = lo;
            }
        }

        (c1, c2)
    }

    /// Polynomial mutation, in place.
    pub fn mutate<R: Rng + ?Sized>(&self, rng: &mut R, bounds: &[Bound], x: &mut [f64]) {
        for (xi, b) in x.iter_mut().zip(bounds) {
            if rng.gen::<f64>() >= self.mutation_prob {
                continue;
            }

            let y = *xi;
            let width = b.width();
            let delta1 = (y - b.lower) / width;
            let delta2 = (b.upper - y) / width;
            let mut_pow = 1.0 / (self.eta_m + 1.0);

            let u: f64 = rng.gen();
            let deltaq = if u < 0.5 {
                let xy = 1.0 - delta1;
                let val = 2.0 * u + (1.0 - 2.0 * u) * xy.powf(self.eta_m + 1.0);
                val.powf(mut_pow) - 1.0
            } else {
                let xy = 1.0 - delta2;
                let val = 2.0 * (1.0 - u) + 2.0 * (u - 0.5) * xy.powf(self.eta_m + 1.0);
                1.0 - val.powf(mut_pow)
            };

            *xi = b.clip(y + deltaq * width);
        }
    }
}
