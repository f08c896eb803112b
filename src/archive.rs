//! Epsilon-box dominance archive.
//!
//! References:
//! - Laumanns, M., et al. "Combining Convergence and Diversity in Evolutionary
//!   Multiobjective Optimization" (2002)

use crate::dominance::{pareto, Dominance};
use crate::error::{CalibrationError, Result};
use crate::individual::Individual;
use std::cmp::Ordering;

#[derive(Clone, Debug)]
pub struct ArchiveEntry {
    pub individual: Individual,
    /// `floor(f[i] / epsilon[i])` per objective, kept as f64 so that
    /// objectives far beyond the i64 range still get distinct boxes
    pub box_index: Vec<f64>,
}

/// At most one solution per occupied epsilon box, and no entry
/// epsilon-dominated by another.
#[derive(Clone, Debug)]
pub struct EpsilonArchive {
    epsilons: Vec<f64>,
    entries: Vec<ArchiveEntry>,
    improvements: usize,
}

#[derive(Debug, PartialEq, Eq)]
enum BoxRelation {
    SameBox,
    Pareto(Dominance),
}

fn box_relation(a: &[f64], b: &[f64]) -> BoxRelation {
    if a == b {
        return BoxRelation::SameBox;
    }
    let mut better = false;
    let mut worse = false;
    for (x, y) in a.iter().zip(b) {
        match x.partial_cmp(y) {
            Some(Ordering::Less) => better = true,
            Some(Ordering::Greater) => worse = true,
            _ => {}
        }
    }
    BoxRelation::Pareto(match (better, worse) {
        (true, false) => Dominance::Dominates,
        (false, true) => Dominance::Dominated,
        _ => Dominance::NonDominated,
    })
}

impl EpsilonArchive {
    pub fn new(epsilons: Vec<f64>) -> Result<Self> {
        if epsilons.is_empty() {
            return Err(CalibrationError::config("epsilon vector is empty"));
        }
        if let Some(e) = epsilons.iter().find(|e| !(e.is_finite() && **e > 0.0)) {
            return Err(CalibrationError::config(format!(
                "epsilon values must be positive and finite, got {}",
                e
            )));
        }
        Ok(Self {
            epsilons,
            entries: Vec::new(),
            improvements: 0,
        })
    }

    pub fn box_index(&self, f: &[f64]) -> Vec<f64> {
        f.iter()
            .zip(&self.epsilons)
            // + 0.0 folds -0.0 into 0.0
            .map(|(v, e)| (v / e).floor() + 0.0)
            .collect()
    }

    /// Offer a candidate. Returns whether the archive changed.
    ///
    /// A candidate sharing a box with an entry replaces it only if it
    /// dominates it on the raw objectives; otherwise the earlier entry stays.
    pub fn add(&mut self, candidate: Individual) -> bool {
        let cbox = self.box_index(&candidate.f);
        let ccv = candidate.constraint_violation();
        let mut doomed = vec![false; self.entries.len()];

        for (i, entry) in self.entries.iter().enumerate() {
            let ecv = entry.individual.constraint_violation();
            if ccv > ecv {
                return false;
            }
            if ccv < ecv {
                doomed[i] = true;
                continue;
            }
            match box_relation(&cbox, &entry.box_index) {
                BoxRelation::Pareto(Dominance::Dominates) => doomed[i] = true,
                BoxRelation::Pareto(Dominance::Dominated) => return false,
                BoxRelation::Pareto(Dominance::NonDominated) => {}
                BoxRelation::SameBox => match pareto(&candidate.f, &entry.individual.f) {
                    Dominance::Dominates => doomed[i] = true,
                    Dominance::Dominated | Dominance::NonDominated => return false,
                },
            }
        }

        let mut flags = doomed.into_iter();
        self.entries.retain(|_| !flags.next().unwrap_or(false));
        self.entries.push(ArchiveEntry {
            individual: candidate,
            box_index: cbox,
        });
        self.improvements += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Accepted insertions so far.
    pub fn improvements(&self) -> usize {
        self.improvements
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Individual> {
        self.entries.iter().map(|e| &e.individual)
    }
}
