use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::types::EntityTuple;

/// Seed value of every entity counter.
pub const EPSILON: f64 = 1e-10;

/// Precision, recall and F1 of one task.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PrfScore {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl fmt::Display for PrfScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p {:.4} r {:.4} f1 {:.4}", self.precision, self.recall, self.f1)
    }
}

/// Running set-overlap counts for entity scoring.
///
/// All three counters start at [`EPSILON`], so an evaluation with no
/// predicted and no gold entities scores approximately 1.0 everywhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityCounter {
    correct: f64,
    predicted: f64,
    gold: f64,
}

impl Default for EntityCounter {
    fn default() -> Self {
        Self {
            correct: EPSILON,
            predicted: EPSILON,
            gold: EPSILON,
        }
    }
}

impl EntityCounter {
    pub fn update(&mut self, predicted: &BTreeSet<EntityTuple>, gold: &BTreeSet<EntityTuple>) {
        self.correct += predicted.intersection(gold).count() as f64;
        self.predicted += predicted.len() as f64;
        self.gold += gold.len() as f64;
    }

    pub fn score(&self) -> PrfScore {
        PrfScore {
            precision: self.correct / self.predicted,
            recall: self.correct / self.gold,
            f1: 2.0 * self.correct / (self.predicted + self.gold),
        }
    }
}

/// Fraction of positions where `predicted` equals `gold`; 0.0 when empty.
pub fn accuracy(gold: &[u32], predicted: &[u32]) -> f64 {
    if gold.is_empty() {
        return 0.0;
    }
    let hits = gold.iter().zip(predicted).filter(|(g, p)| g == p).count();
    hits as f64 / gold.len() as f64
}

/// Unweighted mean of per-class F1 over every class present in either list.
pub fn macro_f1(gold: &[u32], predicted: &[u32]) -> f64 {
    // class -> (tp, fp, fn)
    let mut counts: BTreeMap<u32, (usize, usize, usize)> = BTreeMap::new();
    for (&g, &p) in gold.iter().zip(predicted) {
        if g == p {
            counts.entry(g).or_default().0 += 1;
        } else {
            counts.entry(p).or_default().1 += 1;
            counts.entry(g).or_default().2 += 1;
        }
    }
    if counts.is_empty() {
        return 0.0;
    }

    let total: f64 = counts
        .values()
        .map(|&(tp, fp, fn_)| {
            let denom = 2 * tp + fp + fn_;
            if denom == 0 {
                0.0
            } else {
                2.0 * tp as f64 / denom as f64
            }
        })
        .sum();
    total / counts.len() as f64
}
