//! Constrained Pareto dominance, fast non-dominated sorting and crowding
//! distance.
//!
//! References:
//! - Deb, K., et al. "A Fast and Elitist Multiobjective Genetic Algorithm: NSGA-II" (2002)

use crate::individual::Individual;
use rand::Rng;
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dominance {
    Dominates,
    Dominated,
    NonDominated,
}

/// Compare two evaluated individuals (minimization).
///
/// Lower aggregate constraint violation wins outright; only equally
/// violating individuals are compared on their objectives.
pub fn compare(a: &Individual, b: &Individual) -> Dominance {
    let (cva, cvb) = (a.constraint_violation(), b.constraint_violation());
    if cva < cvb {
        return Dominance::Dominates;
    }
    if cva > cvb {
        return Dominance::Dominated;
    }
    pareto(&a.f, &b.f)
}

/// Plain Pareto comparison of two objective vectors.
pub fn pareto(fa: &[f64], fb: &[f64]) -> Dominance {
    let mut better = false;
    let mut worse = false;
    for (x, y) in fa.iter().zip(fb) {
        if x < y {
            better = true;
        } else if x > y {
            worse = true;
        }
        if better && worse {
            return Dominance::NonDominated;
        }
    }
    match (better, worse) {
        (true, false) => Dominance::Dominates,
        (false, true) => Dominance::Dominated,
        _ => Dominance::NonDominated,
    }
}

pub fn dominates(a: &Individual, b: &Individual) -> bool {
    compare(a, b) == Dominance::Dominates
}

/// Fast non-dominated sorting.
///
/// Writes the 0-based front index into `rank` and returns the fronts as
/// index lists into `pop`.
pub fn non_dominated_sort(pop: &mut [Individual]) -> Vec<Vec<usize>> {
    let n = pop.len();

    // Domination counts and dominated sets
    let mut domination_count: Vec<usize> = vec![0; n];
    let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); n];

    for i in 0..n {
        for j in (i + 1)..n {
            match compare(&pop[i], &pop[j]) {
                Dominance::Dominates => {
                    dominated_by[i].push(j);
                    domination_count[j] += 1;
                }
                Dominance::Dominated => {
                    dominated_by[j].push(i);
                    domination_count[i] += 1;
                }
                Dominance::NonDominated => {}
            }
        }
    }

    let mut fronts: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();

    while !current.is_empty() {
        let rank = fronts.len();
        let mut next: Vec<usize> = Vec::new();
        for &i in &current {
            pop[i].rank = rank;
            for &j in &dominated_by[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next.push(j);
                }
            }
        }
        fronts.push(current);
        current = next;
    }

    fronts
}

/// Crowding distance of the members of one front.
pub fn assign_crowding_distance(pop: &mut [Individual], front: &[usize]) {
    for &i in front {
        pop[i].crowding_distance = 0.0;
    }

    if front.len() <= 2 {
        for &i in front {
            pop[i].crowding_distance = f64::INFINITY;
        }
        return;
    }

    let n_obj = pop[front[0]].f.len();
    let mut order = front.to_vec();

    for m in 0..n_obj {
        order.sort_by(|&a, &b| {
            pop[a].f[m]
                .partial_cmp(&pop[b].f[m])
                .unwrap_or(Ordering::Equal)
        });

        let first = order[0];
        let last = order[order.len() - 1];
        pop[first].crowding_distance = f64::INFINITY;
        pop[last].crowding_distance = f64::INFINITY;

        let range = pop[last].f[m] - pop[first].f[m];
        if range <= 0.0 {
            continue;
        }

        for k in 1..(order.len() - 1) {
            let gap = pop[order[k + 1]].f[m] - pop[order[k - 1]].f[m];
            pop[order[k]].crowding_distance += gap / range;
        }
    }
}

/// Sort into fronts and compute crowding distances for every front.
pub fn rank_population(pop: &mut [Individual]) -> Vec<Vec<usize>> {
    let fronts = non_dominated_sort(pop);
    for front in &fronts {
        assign_crowding_distance(pop, front);
    }
    fronts
}

/// Crowded-comparison order: lower rank first, then larger crowding distance.
pub fn crowded_cmp(a: &Individual, b: &Individual) -> Ordering {
    a.rank.cmp(&b.rank).then_with(|| {
        b.crowding_distance
            .partial_cmp(&a.crowding_distance)
            .unwrap_or(Ordering::Equal)
    })
}

/// Binary tournament on a ranked population.
pub fn tournament<R: Rng + ?Sized>(rng: &mut R, pop: &[Individual]) -> usize {
    let a = rng.gen_range(0..pop.len());
    let b = rng.gen_range(0..pop.len());
    match crowded_cmp(&pop[a], &pop[b]) {
        Ordering::Less => a,
        Ordering::Greater => b,
        Ordering::Equal => {
            if rng.gen::<bool>() {
                a
            } else {
                b
            }
        }
    }
}

/// Environmental selection: keep the best `n` by crowded comparison,
/// re-ranking the merged population first.
pub fn truncate(mut pop: Vec<Individual>, n: usize) -> Vec<Individual> {
    let fronts = rank_population(&mut pop);

    let mut keep: Vec<usize> = Vec::with_capacity(n);
    for front in fronts {
        if keep.len() + front.len() <= n {
            keep.extend(front);
            continue;
        }
        let mut last = front;
        last.sort_by(|&a, &b| crowded_cmp(&pop[a], &pop[b]));
        last.truncate(n - keep.len());
        keep.extend(last);
        break;
    }

    keep.sort_unstable();
    let mut slots: Vec<Option<Individual>> = pop.into_iter().map(Some).collect();
    keep.into_iter().filter_map(|i| slots[i].take()).collect()
}
