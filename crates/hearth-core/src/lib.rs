//! # hearth-core: Pure Domain Crate
//!
//! Domain types and heuristic computations for the Hearth client data layer.
//! This crate performs no I/O: everything here is a plain value or a total
//! function over values, which keeps the reminder heuristics fully testable
//! without a database or a network.
//!
//! ## Module Organization
//!
//! - [`types`] - Cached entities: reminders, event logs, preference snapshots,
//!   sync cursors, and the sync batch that moves between them
//! - [`events`] - The closed set of real-time family events and their wire names
//! - [`insights`] - Heuristic computations: tone selection, completion
//!   prediction, free-text classification, weekday miss patterns

pub mod events;
pub mod insights;
pub mod types;

pub use events::{FamilyEvent, FamilyEventKind};
pub use insights::{
    classify_text, pattern_insights, predict_completion, select_tone, CoachingAdvice,
    CompletionHistory, CompletionPrediction, PushBackPlan, TextClassification, Tone, ToneDecision,
    WeekdayMisses, WeeklyDigest,
};
pub use types::{
    GamificationEvent, MediationEvent, PreferenceSnapshot, Reminder, ReminderEvent,
    ReminderStatus, SyncBatch, SyncCursor, SYNC_DOMAIN_ALL,
};
