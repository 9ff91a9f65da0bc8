//! # Adaptive Decision Router
//!
//! One interface, two interchangeable implementations:
//!
//! - [`RemoteRouter`] always defers to the service.
//! - [`AdaptiveRouter`] answers from the local cache when it is fresh and
//!   falls back to the remote implementation otherwise.
//!
//! ## Decision Flow (adaptive)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  query ──► cursor "all" exists AND now − last_sync_at < 24h ?           │
//! │              │ no                        │ yes                          │
//! │              ▼                           ▼                              │
//! │          RemoteRouter        entity-scoped? load it from the cache      │
//! │              ▲                           │ missing → remote             │
//! │              │                           ▼                              │
//! │              │               hearth_core::insights heuristics           │
//! │              │                           │                              │
//! │              └────── any local error ────┘  (swallowed, logged)         │
//! │                                                                         │
//! │  digest / push-back / coaching: remote-only, no local signal defined    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This two-tier split is the point of the whole layer: bounded-latency,
//! offline-capable answers when recent data exists locally, with transparent
//! degradation to the authoritative remote computation otherwise.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use hearth_core::insights::{
    self, CoachingAdvice, CompletionPrediction, PushBackPlan, TextClassification, ToneDecision,
    WeekdayMisses, WeeklyDigest,
};
use hearth_core::types::{Reminder, SYNC_DOMAIN_ALL};
use hearth_db::Database;

use crate::error::SyncResult;
use crate::gateway::{ApiGateway, Endpoint};

// =============================================================================
// Constants
// =============================================================================

/// The cache counts as fresh while the cursor is younger than this.
const FRESHNESS_WINDOW_HOURS: i64 = 24;

/// Tone and streak window.
const TONE_WINDOW_DAYS: i64 = 7;

/// Weekday pattern window.
const PATTERN_WINDOW_DAYS: i64 = 90;

// =============================================================================
// Router Mode
// =============================================================================

/// Which router implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterMode {
    /// Answer locally when the cache is fresh, remotely otherwise.
    #[default]
    PreferHeuristic,

    /// Always defer to the service.
    AlwaysRemote,
}

impl std::fmt::Display for RouterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterMode::PreferHeuristic => write!(f, "prefer_heuristic"),
            RouterMode::AlwaysRemote => write!(f, "always_remote"),
        }
    }
}

impl std::str::FromStr for RouterMode {
    type Err = crate::error::SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prefer_heuristic" | "heuristic" | "local" => Ok(RouterMode::PreferHeuristic),
            "always_remote" | "remote" => Ok(RouterMode::AlwaysRemote),
            other => Err(crate::error::SyncError::InvalidConfig(format!(
                "Unknown router mode: '{other}'. Valid options: prefer_heuristic, always_remote"
            ))),
        }
    }
}

// =============================================================================
// Router Interface
// =============================================================================

/// Analytical queries answered locally or remotely, caller-agnostic.
#[async_trait]
pub trait InsightRouter: Send + Sync {
    /// Picks the messaging tone for a reminder nudge.
    async fn tone(&self, reminder_id: &str) -> SyncResult<ToneDecision>;

    /// Coaching message for the reminder's creator.
    async fn coaching(&self, reminder_id: &str) -> SyncResult<CoachingAdvice>;

    /// Likelihood that the reminder gets completed, plus a nudge time.
    async fn predict_completion(&self, reminder_id: &str) -> SyncResult<CompletionPrediction>;

    /// Categorizes free-form reminder text.
    async fn classify_text(&self, text: &str) -> SyncResult<TextClassification>;

    /// Weekdays on which the recipient habitually misses reminders.
    async fn pattern_insights(
        &self,
        family_id: &str,
        recipient_id: &str,
    ) -> SyncResult<Vec<WeekdayMisses>>;

    /// Weekly family digest.
    async fn weekly_digest(&self, family_id: &str) -> SyncResult<WeeklyDigest>;

    /// Push-back plan for an overloaded recipient.
    async fn push_back(&self, reminder_id: &str) -> SyncResult<PushBackPlan>;
}

/// Builds the configured router implementation.
pub fn build_router(
    mode: RouterMode,
    gateway: Arc<ApiGateway>,
    db: Database,
) -> Arc<dyn InsightRouter> {
    match mode {
        RouterMode::AlwaysRemote => Arc::new(RemoteRouter::new(gateway)),
        RouterMode::PreferHeuristic => Arc::new(AdaptiveRouter::new(db, gateway)),
    }
}

// =============================================================================
// Remote Router
// =============================================================================

/// Router that always defers to the service.
pub struct RemoteRouter {
    gateway: Arc<ApiGateway>,
}

impl RemoteRouter {
    /// Creates a remote-only router.
    pub fn new(gateway: Arc<ApiGateway>) -> Self {
        RemoteRouter { gateway }
    }
}

#[async_trait]
impl InsightRouter for RemoteRouter {
    async fn tone(&self, reminder_id: &str) -> SyncResult<ToneDecision> {
        self.gateway
            .request(Endpoint::get("insights/tone").query("reminder_id", reminder_id))
            .await
    }

    async fn coaching(&self, reminder_id: &str) -> SyncResult<CoachingAdvice> {
        self.gateway
            .request(Endpoint::get("insights/coaching").query("reminder_id", reminder_id))
            .await
    }

    async fn predict_completion(&self, reminder_id: &str) -> SyncResult<CompletionPrediction> {
        self.gateway
            .request(Endpoint::get("insights/prediction").query("reminder_id", reminder_id))
            .await
    }

    async fn classify_text(&self, text: &str) -> SyncResult<TextClassification> {
        self.gateway
            .request(
                Endpoint::post("insights/classify")
                    .with_body(serde_json::json!({ "text": text })),
            )
            .await
    }

    async fn pattern_insights(
        &self,
        family_id: &str,
        recipient_id: &str,
    ) -> SyncResult<Vec<WeekdayMisses>> {
        self.gateway
            .request(
                Endpoint::get("insights/patterns")
                    .query("family_id", family_id)
                    .query("recipient_id", recipient_id),
            )
            .await
    }

    async fn weekly_digest(&self, family_id: &str) -> SyncResult<WeeklyDigest> {
        self.gateway
            .request(Endpoint::get("insights/digest").query("family_id", family_id))
            .await
    }

    async fn push_back(&self, reminder_id: &str) -> SyncResult<PushBackPlan> {
        self.gateway
            .request(
                Endpoint::post("insights/push-back")
                    .with_body(serde_json::json!({ "reminder_id": reminder_id })),
            )
            .await
    }
}

// =============================================================================
// Adaptive Router
// =============================================================================

/// Router that computes locally over a fresh cache and degrades to remote.
pub struct AdaptiveRouter {
    db: Database,
    remote: RemoteRouter,
}

impl AdaptiveRouter {
    /// Creates an adaptive router over the cache and a remote fallback.
    pub fn new(db: Database, gateway: Arc<ApiGateway>) -> Self {
        AdaptiveRouter {
            db,
            remote: RemoteRouter::new(gateway),
        }
    }

    /// Fresh iff a cursor exists for "all" and is younger than 24 hours.
    async fn cache_is_fresh(&self) -> bool {
        match self.db.cursors().last_sync_at(SYNC_DOMAIN_ALL).await {
            Ok(Some(last_sync_at)) => {
                Utc::now() - last_sync_at < Duration::hours(FRESHNESS_WINDOW_HOURS)
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Cursor read failed; treating cache as stale");
                false
            }
        }
    }

    /// Loads the target of an entity-scoped query from a fresh cache.
    /// `None` means "go remote" (stale cache or unknown entity).
    async fn fresh_target(&self, reminder_id: &str) -> SyncResult<Option<Reminder>> {
        if !self.cache_is_fresh().await {
            debug!(reminder_id, "Cache stale; delegating to remote");
            return Ok(None);
        }
        self.db
            .reminders()
            .by_id(reminder_id)
            .await
            .map_err(Into::into)
    }

    async fn local_tone(&self, reminder_id: &str) -> SyncResult<Option<ToneDecision>> {
        let Some(target) = self.fresh_target(reminder_id).await? else {
            return Ok(None);
        };

        let since = Utc::now() - Duration::days(TONE_WINDOW_DAYS);
        let misses = self
            .db
            .events()
            .miss_count_since(&target.family_id, &target.recipient_id, since)
            .await?;
        let streak = self
            .db
            .events()
            .net_streak_delta_since(&target.family_id, &target.recipient_id, since)
            .await?;

        Ok(Some(insights::select_tone(misses, streak)))
    }

    async fn local_prediction(
        &self,
        reminder_id: &str,
    ) -> SyncResult<Option<CompletionPrediction>> {
        let Some(target) = self.fresh_target(reminder_id).await? else {
            return Ok(None);
        };

        let history = self
            .db
            .reminders()
            .completion_counts(
                &target.family_id,
                &target.recipient_id,
                &target.category,
                &target.id,
            )
            .await?;

        Ok(Some(insights::predict_completion(
            &history,
            target.status,
            target.due_at,
        )))
    }

    async fn local_patterns(
        &self,
        family_id: &str,
        recipient_id: &str,
    ) -> SyncResult<Option<Vec<WeekdayMisses>>> {
        if !self.cache_is_fresh().await {
            return Ok(None);
        }

        let since = Utc::now() - Duration::days(PATTERN_WINDOW_DAYS);
        let miss_times = self
            .db
            .events()
            .miss_times_since(family_id, recipient_id, since)
            .await?;

        Ok(Some(insights::pattern_insights(&miss_times)))
    }
}

#[async_trait]
impl InsightRouter for AdaptiveRouter {
    async fn tone(&self, reminder_id: &str) -> SyncResult<ToneDecision> {
        match self.local_tone(reminder_id).await {
            Ok(Some(decision)) => Ok(decision),
            Ok(None) => self.remote.tone(reminder_id).await,
            Err(e) => {
                warn!(error = %e, "Local tone computation failed; delegating to remote");
                self.remote.tone(reminder_id).await
            }
        }
    }

    async fn coaching(&self, reminder_id: &str) -> SyncResult<CoachingAdvice> {
        // No local heuristic defined; the service computes coaching copy.
        self.remote.coaching(reminder_id).await
    }

    async fn predict_completion(&self, reminder_id: &str) -> SyncResult<CompletionPrediction> {
        match self.local_prediction(reminder_id).await {
            Ok(Some(prediction)) => Ok(prediction),
            Ok(None) => self.remote.predict_completion(reminder_id).await,
            Err(e) => {
                warn!(error = %e, "Local prediction failed; delegating to remote");
                self.remote.predict_completion(reminder_id).await
            }
        }
    }

    async fn classify_text(&self, text: &str) -> SyncResult<TextClassification> {
        // The keyword table needs no cache data, but a stale cache means the
        // device has been offline-and-behind long enough that the service's
        // classifier is the better answer.
        if self.cache_is_fresh().await {
            Ok(insights::classify_text(text))
        } else {
            self.remote.classify_text(text).await
        }
    }

    async fn pattern_insights(
        &self,
        family_id: &str,
        recipient_id: &str,
    ) -> SyncResult<Vec<WeekdayMisses>> {
        match self.local_patterns(family_id, recipient_id).await {
            Ok(Some(insights)) => Ok(insights),
            Ok(None) => self.remote.pattern_insights(family_id, recipient_id).await,
            Err(e) => {
                warn!(error = %e, "Local pattern computation failed; delegating to remote");
                self.remote.pattern_insights(family_id, recipient_id).await
            }
        }
    }

    async fn weekly_digest(&self, family_id: &str) -> SyncResult<WeeklyDigest> {
        // Remote-only: the digest needs family-wide data the cache may lack.
        self.remote.weekly_digest(family_id).await
    }

    async fn push_back(&self, reminder_id: &str) -> SyncResult<PushBackPlan> {
        // Remote-only: rescheduling across members needs the full calendar.
        self.remote.push_back(reminder_id).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_mode_parses_aliases() {
        assert_eq!(
            "prefer_heuristic".parse::<RouterMode>().unwrap(),
            RouterMode::PreferHeuristic
        );
        assert_eq!("local".parse::<RouterMode>().unwrap(), RouterMode::PreferHeuristic);
        assert_eq!("remote".parse::<RouterMode>().unwrap(), RouterMode::AlwaysRemote);
        assert!("sideways".parse::<RouterMode>().is_err());
    }

    #[test]
    fn router_mode_default_prefers_heuristics() {
        assert_eq!(RouterMode::default(), RouterMode::PreferHeuristic);
        assert_eq!(RouterMode::PreferHeuristic.to_string(), "prefer_heuristic");
    }
}
