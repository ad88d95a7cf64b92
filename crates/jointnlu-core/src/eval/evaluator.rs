use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::eval::metrics::{EntityCounter, PrfScore, accuracy, macro_f1};
use crate::model::JointPrediction;
use crate::supervision::EncodedBatch;
use crate::types::EntityTuple;

/// Final scores of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EvaluationReport {
    pub entity: PrfScore,
    pub intent_accuracy: f64,
    pub intent_macro_f1: f64,
    pub samples: usize,
}

impl EvaluationReport {
    /// Model-selection score: mean of entity F1 and intent macro-F1.
    pub fn combined(&self) -> f64 {
        (self.entity.f1 + self.intent_macro_f1) / 2.0
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entity {} | intent acc {:.4} f1 {:.4} | combined {:.4} ({} samples)",
            self.entity,
            self.intent_accuracy,
            self.intent_macro_f1,
            self.combined(),
            self.samples
        )
    }
}

/// Accumulates predictions over a whole split; scores are computed once in
/// [`Evaluator::finish`].
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    entities: EntityCounter,
    gold_intents: Vec<u32>,
    predicted_intents: Vec<u32>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one batch. Spans starting at token 0 (`[CLS]`, and the padding
    /// position) are excluded from both gold and predicted sets.
    pub fn update(&mut self, batch: &EncodedBatch, prediction: &JointPrediction) {
        let gold = scored(batch.gold_tuples());
        let predicted = scored(prediction.entity_tuples());
        self.entities.update(&predicted, &gold);

        self.gold_intents.extend(batch.intent_ids());
        self.predicted_intents
            .extend(prediction.intents.iter().map(|i| i.id));
    }

    pub fn finish(&self) -> EvaluationReport {
        EvaluationReport {
            entity: self.entities.score(),
            intent_accuracy: accuracy(&self.gold_intents, &self.predicted_intents),
            intent_macro_f1: macro_f1(&self.gold_intents, &self.predicted_intents),
            samples: self.gold_intents.len(),
        }
    }
}

fn scored(tuples: BTreeSet<EntityTuple>) -> BTreeSet<EntityTuple> {
    tuples.into_iter().filter(|t| t.start * t.end != 0).collect()
}
