//! FSRS-5 scheduling math.
//!
//! All functions here are pure: they read a card and produce values without
//! touching it. The service layer decides when to persist the results.

use super::card::{CardState, FsrsCard, FsrsSchedule, Rating};
use chrono::{DateTime, Duration, Utc};

const DECAY: f64 = -0.5;
const FACTOR: f64 = 19.0 / 81.0;
const MS_PER_DAY: f64 = 86_400_000.0;

/// Forgetting curve: recall probability after `elapsed_days` at stability `s`.
///
/// `R(t, S) = (1 + FACTOR * t/S)^DECAY`. Zero elapsed time yields 1;
/// at `t == S` the curve passes through ~0.9 by construction.
pub fn retrievability(elapsed_days: f64, stability: f64) -> f64 {
    if stability <= 0.0 {
        return 1.0;
    }
    let t = elapsed_days.max(0.0);
    (1.0 + FACTOR * t / stability).powf(DECAY)
}

/// Recall probability of a card at `now`.
///
/// New cards (and cards with no review history or non-positive stability)
/// report 1.0.
pub fn current_retrievability(card: &FsrsCard, now: DateTime<Utc>) -> f64 {
    if card.is_new() || card.stability <= 0.0 {
        return 1.0;
    }
    let Some(last_review) = card.last_review else {
        return 1.0;
    };
    let elapsed = elapsed_days(last_review, now);
    retrievability(elapsed, card.stability)
}

/// Whether a card is due for review. New cards are always due.
pub fn is_due(card: &FsrsCard, due_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    if card.is_new() {
        return true;
    }
    match due_date {
        Some(due) => now >= due,
        None => true,
    }
}

/// Rate a card and compute its successor state. Does not mutate the card.
pub fn schedule(
    card: &FsrsCard,
    rating: Rating,
    now: DateTime<Utc>,
    weights: &[f64; 19],
    target_retention: f64,
) -> FsrsSchedule {
    let (stability, difficulty, retrievability_at_review, state) = if card.is_new() {
        let s = initial_stability(weights, rating);
        let d = initial_difficulty(weights, rating);
        let state = match rating {
            Rating::Again => CardState::Learning,
            _ => CardState::Review,
        };
        (s, d, 1.0, state)
    } else {
        let r = current_retrievability(card, now);
        let d = next_difficulty(weights, card.difficulty, rating);
        let (s, state) = match rating {
            Rating::Again => (
                lapse_stability(weights, card.difficulty, card.stability, r),
                CardState::Relearning,
            ),
            _ => (
                recall_stability(weights, card.difficulty, card.stability, r, rating),
                CardState::Review,
            ),
        };
        (s, d, r, state)
    };

    let interval_days = next_interval(stability, target_retention);
    FsrsSchedule {
        next_due: now + Duration::days(interval_days as i64),
        interval_days,
        stability,
        difficulty,
        retrievability: retrievability_at_review,
        state,
    }
}

/// Fold a schedule back into a card after the review is committed.
pub fn apply(card: &FsrsCard, sched: &FsrsSchedule, rating: Rating, now: DateTime<Utc>) -> FsrsCard {
    FsrsCard {
        stability: sched.stability,
        difficulty: sched.difficulty,
        retrievability: sched.retrievability,
        state: sched.state,
        last_review: Some(now),
        review_count: card.review_count + 1,
        lapse_count: card.lapse_count + u32::from(rating == Rating::Again),
    }
}

fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to.timestamp_millis() - from.timestamp_millis()) as f64 / MS_PER_DAY).max(0.0)
}

/// `S0(r) = max(1, w[r-1])`.
fn initial_stability(w: &[f64; 19], rating: Rating) -> f64 {
    w[(rating.as_u8() - 1) as usize].max(1.0)
}

/// `D0(r) = clamp(w4 - exp(w5 * (r - 1)) + 1, 1, 10)`.
fn initial_difficulty(w: &[f64; 19], rating: Rating) -> f64 {
    let r = rating.as_u8() as f64;
    (w[4] - (w[5] * (r - 1.0)).exp() + 1.0).clamp(1.0, 10.0)
}

/// `D' = clamp(w7 * D0(3) + (1 - w7) * (D - w6 * (r - 3)), 1, 10)`.
fn next_difficulty(w: &[f64; 19], difficulty: f64, rating: Rating) -> f64 {
    let r = rating.as_u8() as f64;
    let mean_reversion_target = initial_difficulty(w, Rating::Good);
    let updated = difficulty - w[6] * (r - 3.0);
    (w[7] * mean_reversion_target + (1.0 - w[7]) * updated).clamp(1.0, 10.0)
}

/// Post-recall stability for ratings Hard through Easy.
fn recall_stability(w: &[f64; 19], difficulty: f64, stability: f64, r: f64, rating: Rating) -> f64 {
    let hard_penalty = if rating == Rating::Hard { w[15] } else { 1.0 };
    let easy_bonus = if rating == Rating::Easy { w[16] } else { 1.0 };
    let growth = w[8].exp()
        * (11.0 - difficulty)
        * stability.powf(-w[9])
        * ((w[10] * (1.0 - r)).exp() - 1.0)
        * hard_penalty
        * easy_bonus;
    stability * (growth + 1.0)
}

/// Post-lapse stability, floored at one day.
fn lapse_stability(w: &[f64; 19], difficulty: f64, stability: f64, r: f64) -> f64 {
    let s = w[11]
        * difficulty.powf(-w[12])
        * ((stability + 1.0).powf(w[13]) - 1.0)
        * (w[14] * (1.0 - r)).exp();
    s.max(1.0)
}

/// `interval = max(1, round((S / FACTOR) * (retention^(1/DECAY) - 1)))`.
fn next_interval(stability: f64, target_retention: f64) -> u32 {
    let retention = target_retention.clamp(0.01, 0.99);
    let days = (stability / FACTOR) * (retention.powf(1.0 / DECAY) - 1.0);
    days.round().max(1.0) as u32
}
