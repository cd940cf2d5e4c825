//! Recent-performance analysis driving adaptive difficulty.

use crate::domain::QuestionAttempt;
use crate::question_index::QuestionIndex;

/// Summary of the lookback window.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceAnalysis {
    /// Combined score in [-1, 1]: negative = struggling, positive = excelling.
    pub performance_score: f64,
    /// Difficulty offset to apply to selection targets.
    pub difficulty_offset: f64,
    pub correctness_rate: f64,
    pub avg_time_ratio: f64,
}

impl PerformanceAnalysis {
    /// Neutral analysis used when there is no history.
    pub fn neutral() -> Self {
        Self {
            performance_score: 0.0,
            difficulty_offset: 0.0,
            correctness_rate: 0.5,
            avg_time_ratio: 1.0,
        }
    }
}

/// Map a performance score to a difficulty offset.
pub fn difficulty_offset(performance_score: f64) -> f64 {
    if performance_score < -0.3 {
        -0.30
    } else if performance_score < -0.1 {
        -0.15
    } else if performance_score > 0.3 {
        0.30
    } else if performance_score > 0.1 {
        0.15
    } else {
        0.0
    }
}

/// Analyze the last `lookback` attempts. Correctness carries 60% weight, time
/// efficiency 40%. Attempts without a known question or without a usable
/// response time are excluded from the time component only.
pub fn analyze_recent(
    attempts: &[QuestionAttempt],
    questions: &QuestionIndex,
    lookback: usize,
) -> PerformanceAnalysis {
    if attempts.is_empty() {
        return PerformanceAnalysis::neutral();
    }

    let start = attempts.len().saturating_sub(lookback);
    let recent = &attempts[start..];

    let correct = recent.iter().filter(|a| a.is_correct).count();
    let correctness_rate = correct as f64 / recent.len() as f64;

    let time_ratios: Vec<f64> = recent
        .iter()
        .filter(|a| a.response_time_seconds > 0.0)
        .filter_map(|a| {
            questions
                .get(&a.question_id)
                .filter(|q| q.expected_time_seconds > 0.0)
                .map(|q| a.response_time_seconds / q.expected_time_seconds)
        })
        .collect();
    let avg_time_ratio = if time_ratios.is_empty() {
        1.0
    } else {
        time_ratios.iter().sum::<f64>() / time_ratios.len() as f64
    };

    let correctness_score = (correctness_rate - 0.5) * 2.0;
    let time_score = (1.0 - avg_time_ratio.min(2.0) / 2.0) * 2.0 - 1.0;
    let performance_score = correctness_score * 0.6 + time_score * 0.4;

    let offset = difficulty_offset(performance_score);
    tracing::debug!(
        correctness_rate,
        avg_time_ratio,
        performance_score,
        difficulty_offset = offset,
        window = recent.len(),
        "analyzed recent performance"
    );

    PerformanceAnalysis {
        performance_score,
        difficulty_offset: offset,
        correctness_rate,
        avg_time_ratio,
    }
}
