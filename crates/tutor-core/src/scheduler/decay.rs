//! Pure memory-model math: exponential strength decay between practices and
//! sigmoid prediction of recall probability.

use chrono::{DateTime, Utc};

/// Memory strength floor.
pub const STRENGTH_MIN: f64 = -2.0;
/// Memory strength ceiling.
pub const STRENGTH_MAX: f64 = 5.0;

/// Current strength after decay: `s_last * exp(-lambda * dt)` with `dt` in
/// seconds since the last practice. Never-practiced skills do not decay.
pub fn decayed_strength(
    stored_strength: f64,
    last_practice_time: Option<DateTime<Utc>>,
    forgetting_rate: f64,
    now: DateTime<Utc>,
) -> f64 {
    match last_practice_time {
        None => stored_strength,
        Some(last) => {
            let elapsed = (now - last).num_milliseconds() as f64 / 1000.0;
            let elapsed = elapsed.max(0.0);
            stored_strength * (-forgetting_rate * elapsed).exp()
        }
    }
}

/// Predicted probability of a correct answer:
/// `1 / (1 + exp(-(strength - difficulty)))`.
pub fn predict_correctness(strength: f64, difficulty: f64) -> f64 {
    let logit = strength - difficulty;
    1.0 / (1.0 + (-logit).exp())
}

/// Strength increment for a correct answer, with diminishing returns as the
/// correct count grows. `correct_count` is the count before this attempt.
pub fn correct_increment(correct_count: u32) -> f64 {
    1.0 / (1.0 + 0.1 * correct_count as f64)
}

/// Multiplier applied to the increment when the response was slow. Exactly at
/// the threshold is not penalized; strictly above it is.
pub fn time_penalty(response_time_seconds: f64, threshold_seconds: f64) -> f64 {
    if response_time_seconds > threshold_seconds {
        0.5
    } else {
        1.0
    }
}
