//! Weekly per-learner weight tuning.
//!
//! Not a trained optimizer: a bounded heuristic that nudges the lapse- and
//! growth-related weights from aggregate review statistics. Every output is
//! finite for any non-negative input, including a learner with zero reviews.

use crate::domain::FsrsParameters;

/// Aggregate review statistics for one learner over the tuning window.
#[derive(Debug, Clone, Copy, Default)]
pub struct LearnerReviewStats {
    pub total_reviews: u64,
    pub total_lapses: u64,
    pub avg_retrievability: f64,
    pub avg_stability: f64,
    pub avg_difficulty: f64,
}

/// Output of a tuning pass.
#[derive(Debug, Clone)]
pub struct TunedParameters {
    pub weights: [f64; 19],
    pub target_retention: f64,
    pub lapse_rate: f64,
    /// Net adjustment pressure in [-1, 1]; positive means "schedule more
    /// conservatively".
    pub adjustment_score: f64,
}

fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.clamp(lo, hi)
}

/// Derive tuned parameters from a base weight vector and review statistics.
pub fn optimize_weights(base: &[f64; 19], stats: &LearnerReviewStats) -> TunedParameters {
    let lapse_rate = if stats.total_reviews == 0 {
        0.0
    } else {
        stats.total_lapses as f64 / stats.total_reviews as f64
    };

    let lapse_pressure = clamp((lapse_rate - 0.15) / 0.2, -1.0, 1.0);
    let retrievability_pressure = clamp((stats.avg_retrievability - 0.82) / 0.25, -1.0, 1.0);
    let difficulty_pressure = clamp((stats.avg_difficulty - 5.5) / 3.0, -1.0, 1.0);

    let adjustment_score = clamp(
        lapse_pressure - 0.5 * retrievability_pressure + 0.15 * difficulty_pressure,
        -1.0,
        1.0,
    );

    let mut weights = *base;

    // Growth weights shrink under pressure so stability climbs more slowly.
    let growth_scale = clamp(1.0 - 0.12 * adjustment_score, 0.85, 1.15);
    weights[8] *= growth_scale;
    weights[10] *= growth_scale;

    // Lapse weights grow so relearning is gentler on stability.
    let lapse_scale = clamp(1.0 + 0.15 * adjustment_score, 0.85, 1.2);
    weights[11] *= lapse_scale;
    weights[14] *= lapse_scale;

    weights[15] = clamp(
        weights[15] * clamp(1.0 - 0.1 * adjustment_score, 0.8, 1.2),
        0.08,
        0.9,
    );
    weights[16] = clamp(
        weights[16] * clamp(1.0 - 0.1 * adjustment_score, 0.85, 1.15),
        1.5,
        4.5,
    );

    let target_retention = clamp(0.9 + 0.05 * adjustment_score, 0.82, 0.95);

    TunedParameters {
        weights,
        target_retention,
        lapse_rate,
        adjustment_score,
    }
}

impl From<&TunedParameters> for FsrsParameters {
    fn from(tuned: &TunedParameters) -> Self {
        FsrsParameters {
            weights: tuned.weights,
            target_retention: tuned.target_retention,
        }
    }
}
