//! # Insight Heuristics
//!
//! Pure computations behind the adaptive decision router: tone selection,
//! completion prediction, free-text classification, and weekday miss
//! patterns. Each function is total over its inputs; the router owns the
//! cache reads and freshness checks that feed them.
//!
//! ## Decision Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TONE (7-day window)                                                    │
//! │    misses >= 3                      → firm                              │
//! │    misses == 0 && streak delta >= 3 → supportive                        │
//! │    otherwise                        → neutral                           │
//! │                                                                         │
//! │  PREDICTION                                                             │
//! │    likelihood = 0.6·category_rate + 0.4·overall_rate  (2 decimals)     │
//! │    rates default to 0.5 with no history (target excluded)              │
//! │    open reminder: suggest due − 30 min when likelihood > 0.5,          │
//! │                   due − 60 min otherwise                               │
//! │                                                                         │
//! │  CLASSIFICATION                                                         │
//! │    ordered keyword table, first match wins  → confidence 0.7           │
//! │    no match                                 → "other", confidence 0.3  │
//! │                                                                         │
//! │  PATTERNS (90-day window)                                               │
//! │    weekdays with >= 3 misses, sorted by index (Monday = 0)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::ReminderStatus;

// =============================================================================
// Constants
// =============================================================================

/// Miss count at which the tone turns firm.
const FIRM_MISS_THRESHOLD: u32 = 3;

/// Net streak delta needed for a supportive tone (with zero misses).
const SUPPORTIVE_STREAK_THRESHOLD: i64 = 3;

/// Rate used for both blend components when there is no history.
const NO_HISTORY_RATE: f64 = 0.5;

/// Weight of the per-category completion rate in the blend.
const CATEGORY_WEIGHT: f64 = 0.6;

/// Weight of the overall completion rate in the blend.
const OVERALL_WEIGHT: f64 = 0.4;

/// Lead time before the due time for likely completions.
const CONFIDENT_LEAD_MINUTES: i64 = 30;

/// Lead time before the due time when completion looks uncertain.
const CAUTIOUS_LEAD_MINUTES: i64 = 60;

/// Confidence reported for a keyword match.
const KEYWORD_CONFIDENCE: f64 = 0.7;

/// Confidence reported for the fallback category.
const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Maximum length of the classification summary, in characters.
const SUMMARY_MAX_CHARS: usize = 200;

/// Misses per weekday needed before the weekday is reported as a pattern.
const PATTERN_MISS_THRESHOLD: u32 = 3;

/// Ordered keyword table for free-text classification. First match wins, so
/// more specific keywords must come before broader ones.
const KEYWORD_CATEGORIES: &[(&str, &str)] = &[
    ("homework", "school"),
    ("study", "school"),
    ("school", "school"),
    ("read", "school"),
    ("medicine", "health"),
    ("pill", "health"),
    ("doctor", "health"),
    ("dentist", "health"),
    ("brush", "health"),
    ("dishes", "chores"),
    ("laundry", "chores"),
    ("trash", "chores"),
    ("garbage", "chores"),
    ("clean", "chores"),
    ("tidy", "chores"),
    ("feed", "chores"),
    ("walk the dog", "chores"),
    ("practice", "activities"),
    ("piano", "activities"),
    ("soccer", "activities"),
    ("training", "activities"),
    ("appointment", "appointments"),
    ("meeting", "appointments"),
    ("pick up", "appointments"),
];

/// Category used when nothing in the keyword table matches.
const FALLBACK_CATEGORY: &str = "other";

// =============================================================================
// Tone
// =============================================================================

/// Messaging tone for a reminder nudge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Tone {
    Firm,
    Supportive,
    Neutral,
}

/// A tone decision with the factor that decided it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ToneDecision {
    pub tone: Tone,
    pub reason: String,
}

/// Selects the messaging tone from the recipient's recent record.
///
/// `misses_last_week` counts missed-reminder events for the recipient within
/// the family over the trailing 7 days; `net_streak_delta` sums the streak
/// changes over the same window.
pub fn select_tone(misses_last_week: u32, net_streak_delta: i64) -> ToneDecision {
    if misses_last_week >= FIRM_MISS_THRESHOLD {
        return ToneDecision {
            tone: Tone::Firm,
            reason: format!("{misses_last_week} misses in the last 7 days"),
        };
    }

    if misses_last_week == 0 && net_streak_delta >= SUPPORTIVE_STREAK_THRESHOLD {
        return ToneDecision {
            tone: Tone::Supportive,
            reason: format!("no misses and a +{net_streak_delta} streak"),
        };
    }

    ToneDecision {
        tone: Tone::Neutral,
        reason: format!(
            "{misses_last_week} misses, streak delta {net_streak_delta}"
        ),
    }
}

// =============================================================================
// Completion Prediction
// =============================================================================

/// Completion history for one recipient, target reminder excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionHistory {
    /// Completed reminders in the target's category.
    pub category_completed: u32,
    /// All cached reminders in the target's category.
    pub category_total: u32,
    /// Completed reminders across every category.
    pub overall_completed: u32,
    /// All cached reminders across every category.
    pub overall_total: u32,
}

/// A completion likelihood plus an optional suggested nudge time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CompletionPrediction {
    /// Blended completion likelihood, rounded to two decimals.
    pub likelihood: f64,
    /// Suggested nudge time; only present while the reminder is open.
    #[ts(as = "Option<String>")]
    pub suggested_reminder_at: Option<DateTime<Utc>>,
}

fn rate(completed: u32, total: u32) -> f64 {
    if total == 0 {
        NO_HISTORY_RATE
    } else {
        f64::from(completed) / f64::from(total)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Predicts how likely the target reminder is to be completed.
///
/// A likelihood of exactly 0.5 (the no-history blend) still gets the cautious
/// 60-minute lead; only a strictly better record earns the shorter one.
pub fn predict_completion(
    history: &CompletionHistory,
    status: ReminderStatus,
    due_at: DateTime<Utc>,
) -> CompletionPrediction {
    let category_rate = rate(history.category_completed, history.category_total);
    let overall_rate = rate(history.overall_completed, history.overall_total);
    let likelihood = round2(CATEGORY_WEIGHT * category_rate + OVERALL_WEIGHT * overall_rate);

    let suggested_reminder_at = if status.is_open() {
        let lead = if likelihood > NO_HISTORY_RATE {
            CONFIDENT_LEAD_MINUTES
        } else {
            CAUTIOUS_LEAD_MINUTES
        };
        Some(due_at - Duration::minutes(lead))
    } else {
        None
    };

    CompletionPrediction {
        likelihood,
        suggested_reminder_at,
    }
}

// =============================================================================
// Free-Text Classification
// =============================================================================

/// A category guess for free-form reminder text.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TextClassification {
    pub category: String,
    pub confidence: f64,
    /// First 200 characters of the trimmed input.
    pub summary: String,
}

/// Classifies free-form reminder text against the ordered keyword table.
pub fn classify_text(input: &str) -> TextClassification {
    let trimmed = input.trim();
    let lowered = trimmed.to_lowercase();

    let matched = KEYWORD_CATEGORIES
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword));

    let (category, confidence) = match matched {
        Some((_, category)) => ((*category).to_string(), KEYWORD_CONFIDENCE),
        None => (FALLBACK_CATEGORY.to_string(), FALLBACK_CONFIDENCE),
    };

    TextClassification {
        category,
        confidence,
        summary: trimmed.chars().take(SUMMARY_MAX_CHARS).collect(),
    }
}

// =============================================================================
// Weekday Miss Patterns
// =============================================================================

/// Miss count for one weekday (0 = Monday .. 6 = Sunday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WeekdayMisses {
    pub weekday: u32,
    pub miss_count: u32,
}

/// Counts misses per weekday and reports the weekdays with a habit of them.
///
/// `miss_times` are the timestamps of missed-reminder events over the trailing
/// 90 days; the caller applies the window. Output is sorted by weekday index.
pub fn pattern_insights(miss_times: &[DateTime<Utc>]) -> Vec<WeekdayMisses> {
    let mut per_weekday = [0u32; 7];
    for at in miss_times {
        per_weekday[at.weekday().num_days_from_monday() as usize] += 1;
    }

    per_weekday
        .iter()
        .enumerate()
        .filter(|(_, count)| **count >= PATTERN_MISS_THRESHOLD)
        .map(|(weekday, count)| WeekdayMisses {
            weekday: weekday as u32,
            miss_count: *count,
        })
        .collect()
}

// =============================================================================
// Remote-Only Answer Shapes
// =============================================================================
//
// Digest, push-back, and coaching have no local heuristic: the client lacks
// the signal to compute them safely, so the router always delegates these to
// the service. The shapes live here so both router implementations and the
// presentation layer share them.

/// A coaching message for the creator of a reminder.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CoachingAdvice {
    pub reminder_id: String,
    pub tone: Tone,
    pub message: String,
}

/// Weekly family digest, computed server-side.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WeeklyDigest {
    pub family_id: String,
    pub completed: u32,
    pub missed: u32,
    pub summary: String,
}

/// A push-back plan for an overloaded recipient, computed server-side.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PushBackPlan {
    pub reminder_id: String,
    pub recommended_delay_minutes: u32,
    pub rationale: String,
}

// =============================================================================
// Unit Tests
// =============================================================================
