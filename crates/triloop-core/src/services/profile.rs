//! Four-layer learner profile refresh.
//!
//! Pure functions: each takes the previous profile row (if any) plus the
//! aggregates of the session that just completed, and returns the next row.
//! Scalar metrics smooth with an exponential moving average; histories are
//! bounded rolling windows. Risk thresholds are configuration, not code.

use crate::domain::{
    LearnerBehavioralState, LearnerCognitiveProfile, LearnerKcState, LearnerMotivationalState,
    LearnerTopicProficiency, RiskLabel, RunningAccuracy, TrendLabel,
};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use std::collections::HashMap;

/// Tunable smoothing and risk thresholds.
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    /// EWMA smoothing factor for scalar metrics.
    pub ewma_alpha: f64,
    /// Rolling hemisphere-balance history length.
    pub hbs_history_len: usize,
    /// Rolling weekly-engagement history length.
    pub engagement_history_len: usize,
    /// Slope magnitude separating increasing/declining from stable.
    pub trend_slope_threshold: f64,
    /// Sessions per week that count as full engagement frequency.
    pub weekly_session_target: f64,
    /// Engagement below this marks moderate dropout risk.
    pub dropout_moderate_engagement: f64,
    /// Engagement below this (while declining) marks high dropout risk.
    pub dropout_high_engagement: f64,
    /// 7-day session count must exceed this multiple of the 30-day weekly
    /// rate to count as a frequency spike.
    pub burnout_frequency_spike_ratio: f64,
    /// Minimum 7-day session count for a spike to register at all.
    pub burnout_frequency_spike_floor: u32,
    /// Accuracy this far below baseline counts as declining.
    pub burnout_accuracy_drop: f64,
    /// Latency trend above this many milliseconds counts as increasing.
    pub burnout_latency_increase_ms: f64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            ewma_alpha: 0.3,
            hbs_history_len: 30,
            engagement_history_len: 8,
            trend_slope_threshold: 0.05,
            weekly_session_target: 5.0,
            dropout_moderate_engagement: 0.4,
            dropout_high_engagement: 0.3,
            burnout_frequency_spike_ratio: 2.0,
            burnout_frequency_spike_floor: 4,
            burnout_accuracy_drop: 0.15,
            burnout_latency_increase_ms: 500.0,
        }
    }
}

/// Aggregates of one completed session, precomputed by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct SessionObservation {
    pub topic_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub total_items: usize,
    pub correct: usize,
    pub accuracy: Option<f64>,
    pub mean_latency_ms: f64,
    pub help_requests: usize,
    pub responses: usize,
    /// (normalised confidence in [0, 1], was correct) per confident response.
    pub confidence_pairs: Vec<(f64, bool)>,
    /// Response counts per response type.
    pub response_type_counts: HashMap<String, u32>,
    /// Final encounter/analysis/return durations in milliseconds.
    pub stage_durations_ms: (u64, u64, u64),
    /// (difficulty tier, mastery delta) per updated KC.
    pub mastery_deltas: Vec<(u8, f64)>,
    /// Mean attempted difficulty level, 1..=4.
    pub attempted_difficulty_mean: f64,
    /// (item type, was correct) per scored response.
    pub item_type_results: Vec<(String, bool)>,
    /// (topic id, was correct) per scored response.
    pub topic_results: Vec<(String, bool)>,
    /// Hemisphere balance recomputed from the updated KC rows.
    pub hemisphere_balance_sample: f64,
}

fn ewma(prev: f64, sample: f64, alpha: f64) -> f64 {
    (1.0 - alpha) * prev + alpha * sample
}

/// Pearson correlation; `None` when degenerate (fewer than two points or
/// zero variance on either side).
fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    let n = pairs.len() as f64;
    if pairs.len() < 2 {
        return None;
    }
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Least-squares slope of evenly spaced samples.
fn slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den <= f64::EPSILON {
        0.0
    } else {
        num / den
    }
}

/// Normalise weights to a simplex (sum exactly 1 within float error).
fn normalize_simplex(weights: &mut HashMap<String, f64>) {
    let sum: f64 = weights.values().sum();
    if sum <= f64::EPSILON {
        let n = weights.len();
        if n > 0 {
            let uniform = 1.0 / n as f64;
            for v in weights.values_mut() {
                *v = uniform;
            }
        }
        return;
    }
    for v in weights.values_mut() {
        *v /= sum;
    }
}

/// Monday 00:00 UTC of the week containing `at`.
fn week_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_monday = at.weekday().num_days_from_monday() as i64;
    (at - Duration::days(days_from_monday))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or(at)
}

// ============================================================================
// Knowledge layer
// ============================================================================

/// Roll per-KC mastery into topic proficiency with categorical counts.
pub fn topic_proficiency(
    user_id: &str,
    topic_id: &str,
    kc_states: &[LearnerKcState],
    now: DateTime<Utc>,
) -> LearnerTopicProficiency {
    let mut mastered = 0u32;
    let mut in_progress = 0u32;
    let mut not_started = 0u32;
    for kc in kc_states {
        if kc.mastery_level >= 0.8 {
            mastered += 1;
        } else if kc.mastery_level > 0.0 {
            in_progress += 1;
        } else {
            not_started += 1;
        }
    }
    let proficiency = if kc_states.is_empty() {
        0.0
    } else {
        kc_states.iter().map(|kc| kc.mastery_level).sum::<f64>() / kc_states.len() as f64
    };
    LearnerTopicProficiency {
        user_id: user_id.to_string(),
        topic_id: topic_id.to_string(),
        proficiency,
        kcs_mastered: mastered,
        kcs_in_progress: in_progress,
        kcs_not_started: not_started,
        updated_at: now,
    }
}

// ============================================================================
// Behavioral layer
// ============================================================================

pub fn update_behavioral(
    prev: Option<LearnerBehavioralState>,
    user_id: &str,
    obs: &SessionObservation,
    sessions_last_7d: u32,
    sessions_last_30d: u32,
    config: &ProfileConfig,
    now: DateTime<Utc>,
) -> LearnerBehavioralState {
    let alpha = config.ewma_alpha;
    let first = prev.is_none();
    let mut state =
        prev.unwrap_or_else(|| LearnerBehavioralState::new_for_user(user_id.to_string(), now));

    state.total_sessions += 1;
    state.sessions_last_7d = sessions_last_7d;
    state.sessions_last_30d = sessions_last_30d;

    let duration = obs.duration_ms as f64;
    state.avg_session_duration_ms = if first {
        duration
    } else {
        ewma(state.avg_session_duration_ms, duration, alpha)
    };

    if obs.responses > 0 {
        state.latency_trend_ms = if first {
            0.0
        } else {
            obs.mean_latency_ms - state.mean_latency_ms
        };
        state.mean_latency_ms = if first {
            obs.mean_latency_ms
        } else {
            ewma(state.mean_latency_ms, obs.mean_latency_ms, alpha)
        };

        let help_rate = obs.help_requests as f64 / obs.responses as f64;
        state.help_request_rate = if first {
            help_rate
        } else {
            ewma(state.help_request_rate, help_rate, alpha)
        };
    }

    if let Some(started_at) = obs.started_at {
        let hour = started_at.hour() as usize;
        if state.hour_histogram.len() != 24 {
            state.hour_histogram = vec![0; 24];
        }
        state.hour_histogram[hour] += 1;
        state.preferred_hour = state
            .hour_histogram
            .iter()
            .enumerate()
            .max_by_key(|(_, count)| **count)
            .map(|(h, _)| h as u8);
    }

    let (enc, ana, ret) = obs.stage_durations_ms;
    let stage_total = enc + ana + ret;
    if stage_total > 0 {
        let sample = (
            enc as f64 / stage_total as f64,
            ana as f64 / stage_total as f64,
            ret as f64 / stage_total as f64,
        );
        if first {
            state.stage_time_ratio.encounter = sample.0;
            state.stage_time_ratio.analysis = sample.1;
            state.stage_time_ratio.return_stage = sample.2;
        } else {
            state.stage_time_ratio.encounter = ewma(state.stage_time_ratio.encounter, sample.0, alpha);
            state.stage_time_ratio.analysis = ewma(state.stage_time_ratio.analysis, sample.1, alpha);
            state.stage_time_ratio.return_stage =
                ewma(state.stage_time_ratio.return_stage, sample.2, alpha);
        }
    }

    let pairs: Vec<(f64, f64)> = obs
        .confidence_pairs
        .iter()
        .map(|(confidence, correct)| (*confidence, if *correct { 1.0 } else { 0.0 }))
        .collect();
    if let Some(corr) = pearson(&pairs) {
        state.confidence_accuracy_corr = if first {
            corr
        } else {
            ewma(state.confidence_accuracy_corr, corr, alpha)
        };
    }
    if !obs.confidence_pairs.is_empty() {
        if let Some(accuracy) = obs.accuracy {
            let mean_confidence = obs
                .confidence_pairs
                .iter()
                .map(|(c, _)| c)
                .sum::<f64>()
                / obs.confidence_pairs.len() as f64;
            let gap = mean_confidence - accuracy;
            state.calibration_gap = if first {
                gap
            } else {
                ewma(state.calibration_gap, gap, alpha)
            };
        }
    }

    state.updated_at = now;
    state
}

// ============================================================================
// Cognitive layer
// ============================================================================

pub fn update_cognitive(
    prev: Option<LearnerCognitiveProfile>,
    user_id: &str,
    obs: &SessionObservation,
    config: &ProfileConfig,
    now: DateTime<Utc>,
) -> LearnerCognitiveProfile {
    let alpha = config.ewma_alpha;
    let first = prev.is_none();
    let mut profile =
        prev.unwrap_or_else(|| LearnerCognitiveProfile::new_for_user(user_id.to_string(), now));

    // Hemisphere balance: raw sample into the history, smoothed scalar.
    profile.hbs_history.push(obs.hemisphere_balance_sample);
    let overflow = profile.hbs_history.len().saturating_sub(config.hbs_history_len);
    if overflow > 0 {
        profile.hbs_history.drain(0..overflow);
    }
    profile.hemisphere_balance = if first {
        obs.hemisphere_balance_sample
    } else {
        ewma(profile.hemisphere_balance, obs.hemisphere_balance_sample, alpha)
    };

    // Modality preferences: blend session shares in, renormalise to a simplex.
    let session_total: u32 = obs.response_type_counts.values().sum();
    if session_total > 0 {
        let mut blended: HashMap<String, f64> = HashMap::new();
        let keys: Vec<String> = profile
            .modality_preferences
            .keys()
            .chain(obs.response_type_counts.keys())
            .cloned()
            .collect();
        for key in keys {
            let old = profile.modality_preferences.get(&key).copied().unwrap_or(0.0);
            let share = obs
                .response_type_counts
                .get(&key)
                .map(|c| *c as f64 / session_total as f64)
                .unwrap_or(0.0);
            let value = if first { share } else { ewma(old, share, alpha) };
            blended.insert(key, value);
        }
        normalize_simplex(&mut blended);
        profile.modality_preferences = blended;
    }

    // Metacognition: closeness of confidence to outcomes.
    if !obs.confidence_pairs.is_empty() {
        if let Some(accuracy) = obs.accuracy {
            let mean_confidence = obs
                .confidence_pairs
                .iter()
                .map(|(c, _)| c)
                .sum::<f64>()
                / obs.confidence_pairs.len() as f64;
            let sample = 1.0 - (mean_confidence - accuracy).abs();
            profile.metacognitive_accuracy = if first {
                sample
            } else {
                ewma(profile.metacognitive_accuracy, sample, alpha)
            };
        }
    }

    // Learning velocity: mastery movement per session, overall and per tier.
    if !obs.mastery_deltas.is_empty() {
        let mean_delta = obs.mastery_deltas.iter().map(|(_, d)| d).sum::<f64>()
            / obs.mastery_deltas.len() as f64;
        profile.learning_velocity = if first {
            mean_delta
        } else {
            ewma(profile.learning_velocity, mean_delta, alpha)
        };
        for tier in 1..=4u8 {
            let tier_deltas: Vec<f64> = obs
                .mastery_deltas
                .iter()
                .filter(|(t, _)| *t == tier)
                .map(|(_, d)| *d)
                .collect();
            if !tier_deltas.is_empty() {
                let tier_mean = tier_deltas.iter().sum::<f64>() / tier_deltas.len() as f64;
                let slot = &mut profile.velocity_by_tier[(tier - 1) as usize];
                *slot = if first { tier_mean } else { ewma(*slot, tier_mean, alpha) };
            }
        }
    }

    // Strongest/weakest assessment types and topics.
    for (item_type, correct) in &obs.item_type_results {
        let acc = profile
            .item_type_accuracy
            .entry(item_type.clone())
            .or_insert_with(RunningAccuracy::default);
        acc.attempts += 1;
        acc.correct += u32::from(*correct);
    }
    for (topic, correct) in &obs.topic_results {
        let acc = profile
            .topic_accuracy
            .entry(topic.clone())
            .or_insert_with(RunningAccuracy::default);
        acc.attempts += 1;
        acc.correct += u32::from(*correct);
    }
    let (strongest_types, weakest_types) = rank_accuracy(&profile.item_type_accuracy);
    profile.strongest_item_types = strongest_types;
    profile.weakest_item_types = weakest_types;
    let (strongest_topics, weakest_topics) = rank_accuracy(&profile.topic_accuracy);
    profile.strongest_topics = strongest_topics;
    profile.weakest_topics = weakest_topics;

    profile.updated_at = now;
    profile
}

/// Top-3 and bottom-3 keys by accuracy ratio, deterministically ordered.
fn rank_accuracy(map: &HashMap<String, RunningAccuracy>) -> (Vec<String>, Vec<String>) {
    let mut entries: Vec<(&String, f64)> = map.iter().map(|(k, v)| (k, v.ratio())).collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    let strongest: Vec<String> = entries.iter().take(3).map(|(k, _)| (*k).clone()).collect();
    let weakest: Vec<String> = entries
        .iter()
        .rev()
        .take(3)
        .map(|(k, _)| (*k).clone())
        .collect();
    (strongest, weakest)
}

// ============================================================================
// Motivational layer
// ============================================================================

pub fn update_motivational(
    prev: Option<LearnerMotivationalState>,
    user_id: &str,
    obs: &SessionObservation,
    sessions_last_7d: u32,
    sessions_last_30d: u32,
    baseline_accuracy: Option<f64>,
    latency_trend_ms: f64,
    config: &ProfileConfig,
    now: DateTime<Utc>,
) -> LearnerMotivationalState {
    let alpha = config.ewma_alpha;
    let first = prev.is_none();
    let mut state =
        prev.unwrap_or_else(|| LearnerMotivationalState::new_for_user(user_id.to_string(), now));

    // Weekly engagement sample: frequency, accuracy, and finishing at all.
    let frequency = (sessions_last_7d as f64 / config.weekly_session_target).min(1.0);
    let accuracy_part = obs.accuracy.unwrap_or(0.5);
    let sample = (0.4 * frequency + 0.3 * accuracy_part + 0.3).clamp(0.0, 1.0);

    let this_week = week_start(obs.started_at.unwrap_or(now));
    match state.engagement_history.last_mut() {
        Some(entry) if entry.week_start == this_week => {
            entry.score = ewma(entry.score, sample, alpha);
        }
        _ => {
            state.engagement_history.push(crate::domain::WeeklyEngagement {
                week_start: this_week,
                score: sample,
            });
            let overflow = state
                .engagement_history
                .len()
                .saturating_sub(config.engagement_history_len);
            if overflow > 0 {
                state.engagement_history.drain(0..overflow);
            }
        }
    }
    state.engagement_score = state
        .engagement_history
        .last()
        .map(|e| e.score)
        .unwrap_or(sample);

    // Trend over the last four weekly scores.
    let recent: Vec<f64> = state
        .engagement_history
        .iter()
        .rev()
        .take(4)
        .rev()
        .map(|e| e.score)
        .collect();
    let trend_slope = slope(&recent);
    state.engagement_trend = if trend_slope > config.trend_slope_threshold {
        TrendLabel::Increasing
    } else if trend_slope < -config.trend_slope_threshold {
        TrendLabel::Declining
    } else {
        TrendLabel::Stable
    };

    if obs.attempted_difficulty_mean > 0.0 {
        let tolerance_sample = (obs.attempted_difficulty_mean / 4.0).clamp(0.0, 1.0);
        state.challenge_tolerance = if first {
            tolerance_sample
        } else {
            ewma(state.challenge_tolerance, tolerance_sample, alpha)
        };
    }

    // Burnout: count simultaneous strain signals.
    let weekly_rate_30d = sessions_last_30d as f64 * 7.0 / 30.0;
    let frequency_spike = sessions_last_7d >= config.burnout_frequency_spike_floor
        && sessions_last_7d as f64 > config.burnout_frequency_spike_ratio * weekly_rate_30d;
    let accuracy_declining = match (obs.accuracy, baseline_accuracy) {
        (Some(acc), Some(baseline)) => acc < baseline - config.burnout_accuracy_drop,
        _ => false,
    };
    let latency_increasing = latency_trend_ms > config.burnout_latency_increase_ms;
    let signals = u8::from(frequency_spike) + u8::from(accuracy_declining) + u8::from(latency_increasing);
    state.burnout_risk = match signals {
        3 => RiskLabel::High,
        2 => RiskLabel::Moderate,
        _ => RiskLabel::Low,
    };

    // Dropout: declining engagement with a low score.
    state.dropout_risk = if state.engagement_trend == TrendLabel::Declining
        && state.engagement_score < config.dropout_high_engagement
    {
        RiskLabel::High
    } else if state.engagement_trend == TrendLabel::Declining
        || state.engagement_score < config.dropout_moderate_engagement
    {
        RiskLabel::Moderate
    } else {
        RiskLabel::Low
    };

    state.updated_at = now;
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap() // a Monday
    }

    fn kc(mastery: f64) -> LearnerKcState {
        let mut state = LearnerKcState::new_for_kc("u1".into(), "kc".into(), t0());
        state.mastery_level = mastery;
        state
    }

    fn observation() -> SessionObservation {
        SessionObservation {
            topic_id: "t1".into(),
            started_at: Some(t0()),
            duration_ms: 900_000,
            total_items: 10,
            correct: 7,
            accuracy: Some(0.7),
            mean_latency_ms: 2_000.0,
            help_requests: 1,
            responses: 10,
            confidence_pairs: vec![(0.8, true), (0.6, true), (0.4, false), (0.9, true)],
            response_type_counts: HashMap::from([
                ("mcq".to_string(), 6u32),
                ("free_text".to_string(), 4u32),
            ]),
            stage_durations_ms: (180_000, 540_000, 180_000),
            mastery_deltas: vec![(1, 0.1), (2, 0.05)],
            attempted_difficulty_mean: 2.0,
            item_type_results: vec![
                ("mcq".to_string(), true),
                ("mcq".to_string(), true),
                ("free_text".to_string(), false),
            ],
            topic_results: vec![("t1".to_string(), true), ("t1".to_string(), false)],
            hemisphere_balance_sample: 0.2,
        }
    }

    #[test]
    fn topic_proficiency_buckets_by_mastery() {
        let states = vec![kc(0.9), kc(0.8), kc(0.4), kc(0.0)];
        let prof = topic_proficiency("u1", "t1", &states, t0());
        assert_eq!(prof.kcs_mastered, 2);
        assert_eq!(prof.kcs_in_progress, 1);
        assert_eq!(prof.kcs_not_started, 1);
        assert!((prof.proficiency - 0.525).abs() < 1e-9);
    }

    #[test]
    fn first_behavioral_update_seeds_from_the_session() {
        let cfg = ProfileConfig::default();
        let state = update_behavioral(None, "u1", &observation(), 1, 1, &cfg, t0());
        assert_eq!(state.total_sessions, 1);
        assert_eq!(state.avg_session_duration_ms, 900_000.0);
        assert_eq!(state.mean_latency_ms, 2_000.0);
        assert_eq!(state.latency_trend_ms, 0.0);
        assert_eq!(state.preferred_hour, Some(10));
        assert!((state.help_request_rate - 0.1).abs() < 1e-9);
        assert!((state.stage_time_ratio.encounter - 0.2).abs() < 1e-9);
    }

    #[test]
    fn later_behavioral_updates_smooth_with_alpha() {
        let cfg = ProfileConfig::default();
        let first = update_behavioral(None, "u1", &observation(), 1, 1, &cfg, t0());
        let mut second_obs = observation();
        second_obs.duration_ms = 300_000;
        let second = update_behavioral(Some(first), "u1", &second_obs, 2, 2, &cfg, t0());
        // 0.7 * 900_000 + 0.3 * 300_000
        assert!((second.avg_session_duration_ms - 720_000.0).abs() < 1e-6);
        assert_eq!(second.total_sessions, 2);
    }

    #[test]
    fn confidence_correlation_is_positive_for_calibrated_learner() {
        let cfg = ProfileConfig::default();
        let state = update_behavioral(None, "u1", &observation(), 1, 1, &cfg, t0());
        assert!(state.confidence_accuracy_corr > 0.0);
        // Mean confidence 0.675 vs accuracy 0.7.
        assert!(state.calibration_gap.abs() < 0.1);
    }

    #[test]
    fn cognitive_history_is_bounded() {
        let cfg = ProfileConfig::default();
        let mut profile = None;
        for i in 0..40 {
            let mut obs = observation();
            obs.hemisphere_balance_sample = i as f64 / 40.0;
            profile = Some(update_cognitive(profile, "u1", &obs, &cfg, t0()));
        }
        let profile = profile.unwrap();
        assert_eq!(profile.hbs_history.len(), cfg.hbs_history_len);
        // Newest sample is last.
        assert!((profile.hbs_history.last().unwrap() - 39.0 / 40.0).abs() < 1e-9);
    }

    #[test]
    fn modality_preferences_form_a_simplex() {
        let cfg = ProfileConfig::default();
        let profile = update_cognitive(None, "u1", &observation(), &cfg, t0());
        let sum: f64 = profile.modality_preferences.values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ranking_orders_types_by_accuracy() {
        let cfg = ProfileConfig::default();
        let profile = update_cognitive(None, "u1", &observation(), &cfg, t0());
        assert_eq!(profile.strongest_item_types.first().map(String::as_str), Some("mcq"));
        assert_eq!(profile.weakest_item_types.first().map(String::as_str), Some("free_text"));
    }

    #[test]
    fn engagement_history_grows_weekly_and_is_bounded() {
        let cfg = ProfileConfig::default();
        let mut state = None;
        for week in 0..10 {
            let mut obs = observation();
            obs.started_at = Some(t0() + Duration::weeks(week));
            state = Some(update_motivational(
                state, "u1", &obs, 3, 12, None, 0.0, &cfg,
                t0() + Duration::weeks(week),
            ));
        }
        let state = state.unwrap();
        assert_eq!(state.engagement_history.len(), cfg.engagement_history_len);
        assert!((0.0..=1.0).contains(&state.engagement_score));
    }

    #[test]
    fn declining_weeks_label_declining_and_raise_dropout_risk() {
        let cfg = ProfileConfig::default();
        let mut state = None;
        for (week, accuracy) in [0.9, 0.6, 0.3, 0.05].iter().enumerate() {
            let mut obs = observation();
            obs.started_at = Some(t0() + Duration::weeks(week as i64));
            obs.accuracy = Some(*accuracy);
            // Frequency collapsing alongside accuracy.
            let s7 = 4u32.saturating_sub(week as u32);
            state = Some(update_motivational(
                state, "u1", &obs, s7, 16, None, 0.0, &cfg,
                t0() + Duration::weeks(week as i64),
            ));
        }
        let state = state.unwrap();
        assert_eq!(state.engagement_trend, TrendLabel::Declining);
        assert_ne!(state.dropout_risk, RiskLabel::Low);
    }

    #[test]
    fn burnout_counts_simultaneous_signals() {
        let cfg = ProfileConfig::default();
        let mut obs = observation();
        obs.accuracy = Some(0.4);
        // Spike: 8 sessions in 7 days against a 30-day rate of ~2.8/week,
        // accuracy 0.4 against a 0.7 baseline, latency climbing.
        let state = update_motivational(
            None, "u1", &obs, 8, 12, Some(0.7), 800.0, &cfg, t0(),
        );
        assert_eq!(state.burnout_risk, RiskLabel::High);

        let state = update_motivational(
            None, "u1", &obs, 8, 12, Some(0.7), 0.0, &cfg, t0(),
        );
        assert_eq!(state.burnout_risk, RiskLabel::Moderate);

        let state = update_motivational(
            None, "u1", &obs, 2, 12, Some(0.7), 0.0, &cfg, t0(),
        );
        assert_eq!(state.burnout_risk, RiskLabel::Low);
    }

    #[test]
    fn week_start_is_monday_midnight() {
        let thursday = Utc.with_ymd_and_hms(2025, 6, 5, 15, 30, 0).unwrap();
        let monday = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        assert_eq!(week_start(thursday), monday);
        assert_eq!(week_start(monday), monday);
    }

    proptest! {
        #[test]
        fn simplex_holds_for_arbitrary_session_mixes(
            counts in proptest::collection::hash_map("[a-z]{3,8}", 1u32..50, 1..6)
        ) {
            let cfg = ProfileConfig::default();
            let mut obs = observation();
            obs.response_type_counts = counts;
            let profile = update_cognitive(None, "u1", &obs, &cfg, t0());
            let sum: f64 = profile.modality_preferences.values().sum();
            prop_assert!((sum - 1.0).abs() < 1e-6);
        }

        #[test]
        fn engagement_score_stays_bounded(
            accuracy in 0.0f64..1.0,
            s7 in 0u32..30,
        ) {
            let cfg = ProfileConfig::default();
            let mut obs = observation();
            obs.accuracy = Some(accuracy);
            let state = update_motivational(None, "u1", &obs, s7, s7, None, 0.0, &cfg, t0());
            prop_assert!((0.0..=1.0).contains(&state.engagement_score));
        }
    }
}
