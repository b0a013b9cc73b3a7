//! Completeness-based quality score.

use leadharvest_shared::{LeadRecord, ScoreWeights};

/// Sums the weights of the fields a lead has, clamped to `[0, 1]`.
///
/// Weights are non-negative (checked by `PipelineConfig::validate`), so
/// filling a field never lowers the score.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityScorer {
    weights: ScoreWeights,
}

impl QualityScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, record: &LeadRecord) -> f64 {
        let w = &self.weights;
        let mut total: f64 = 0.0;
        if record.email.is_some() {
            total += w.email;
        }
        if !record.domain.is_empty() {
            total += w.domain;
        }
        if record.company_name.is_some() {
            total += w.company_name;
        }
        if record.has_enrichment() {
            total += w.enrichment;
        }
        total.clamp(0.0, 1.0)
    }

    /// Recompute and store the score on `record`.
    pub fn apply(&self, record: &mut LeadRecord) {
        record.score = self.score(record);
    }
}
