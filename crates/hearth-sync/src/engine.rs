//! # Synchronization Engine
//!
//! Pulls incremental deltas from the service and applies them atomically to
//! the cache.
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  idle ──start_periodic_sync──► loop: sync → swallow error → sleep 300s  │
//! │   ▲                                  │                                  │
//! │   └────────────stop_sync─────────────┘   (cancellation at any await)    │
//! │                                                                         │
//! │  sync(family_id) one-shot: errors surface to the caller                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each delta batch commits in one cache transaction, and the cursor is set
//! to the server-reported time, not the local clock, so device clock skew
//! never drifts the watermark.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use hearth_core::types::{
    GamificationEvent, MediationEvent, PreferenceSnapshot, Reminder, ReminderEvent, ReminderStatus,
    SyncBatch, SYNC_DOMAIN_ALL,
};
use hearth_db::Database;

use crate::error::SyncResult;
use crate::gateway::{ApiGateway, Endpoint};

/// Interval between periodic sync ticks.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(300);

// =============================================================================
// Wire Shapes
// =============================================================================

/// Delta-sync response: everything changed since the cursor.
#[derive(Debug, Deserialize)]
pub struct DeltaResponse {
    #[serde(default)]
    pub reminders: Vec<ReminderDto>,
    #[serde(default)]
    pub reminder_events: Vec<ReminderEventDto>,
    #[serde(default)]
    pub mediation_events: Vec<MediationEventDto>,
    #[serde(default)]
    pub gamification_events: Vec<GamificationEventDto>,
    #[serde(default)]
    pub preferences: Vec<PreferenceDto>,
    pub server_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReminderDto {
    pub id: String,
    pub family_id: String,
    pub creator_id: String,
    pub recipient_id: String,
    pub due_at: DateTime<Utc>,
    pub category: String,
    pub completion_definition: String,
    pub description: Option<String>,
    pub status: ReminderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReminderEventDto {
    pub id: String,
    pub reminder_id: String,
    pub family_id: String,
    pub recipient_id: String,
    pub kind: String,
    pub data: Option<Value>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct MediationEventDto {
    pub id: String,
    pub reminder_id: String,
    pub family_id: String,
    pub actor_id: String,
    pub kind: String,
    pub data: Option<Value>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct GamificationEventDto {
    pub id: String,
    pub user_id: String,
    pub family_id: String,
    pub kind: String,
    #[serde(default)]
    pub streak_delta: i64,
    pub data: Option<Value>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PreferenceDto {
    pub user_id: String,
    pub payload: Value,
    pub updated_at: DateTime<Utc>,
}

/// Serializes a nested free-form payload for storage.
fn payload_string(data: Option<Value>) -> Option<String> {
    data.map(|value| value.to_string())
}

impl DeltaResponse {
    /// Flattens the wire response into a storable batch. The reminders'
    /// `synced_at` is stamped with the server time of this batch.
    pub fn into_batch(self) -> SyncBatch {
        let server_time = self.server_time;

        SyncBatch {
            reminders: self
                .reminders
                .into_iter()
                .map(|r| Reminder {
                    id: r.id,
                    family_id: r.family_id,
                    creator_id: r.creator_id,
                    recipient_id: r.recipient_id,
                    due_at: r.due_at,
                    category: r.category,
                    completion_definition: r.completion_definition,
                    description: r.description,
                    status: r.status,
                    created_at: r.created_at,
                    synced_at: server_time,
                })
                .collect(),
            reminder_events: self
                .reminder_events
                .into_iter()
                .map(|e| ReminderEvent {
                    id: e.id,
                    reminder_id: e.reminder_id,
                    family_id: e.family_id,
                    recipient_id: e.recipient_id,
                    kind: e.kind,
                    payload: payload_string(e.data),
                    at: e.at,
                })
                .collect(),
            mediation_events: self
                .mediation_events
                .into_iter()
                .map(|e| MediationEvent {
                    id: e.id,
                    reminder_id: e.reminder_id,
                    family_id: e.family_id,
                    actor_id: e.actor_id,
                    kind: e.kind,
                    payload: payload_string(e.data),
                    at: e.at,
                })
                .collect(),
            gamification_events: self
                .gamification_events
                .into_iter()
                .map(|e| GamificationEvent {
                    id: e.id,
                    user_id: e.user_id,
                    family_id: e.family_id,
                    kind: e.kind,
                    streak_delta: e.streak_delta,
                    payload: payload_string(e.data),
                    at: e.at,
                })
                .collect(),
            preferences: self
                .preferences
                .into_iter()
                .map(|p| PreferenceSnapshot {
                    user_id: p.user_id,
                    payload: p.payload.to_string(),
                    updated_at: p.updated_at,
                })
                .collect(),
            server_time,
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Pulls deltas through the gateway and writes them to the cache.
pub struct SyncEngine {
    gateway: Arc<ApiGateway>,
    db: Database,
    interval: Duration,
    // Dropping the sender cancels the running loop at its next await.
    loop_handle: Mutex<Option<watch::Sender<bool>>>,
}

impl SyncEngine {
    /// Creates an engine with the default 300 s interval.
    pub fn new(gateway: Arc<ApiGateway>, db: Database) -> Self {
        Self::with_interval(gateway, db, DEFAULT_SYNC_INTERVAL)
    }

    /// Creates an engine with a custom interval (tests, aggressive refresh).
    pub fn with_interval(gateway: Arc<ApiGateway>, db: Database, interval: Duration) -> Self {
        SyncEngine {
            gateway,
            db,
            interval,
            loop_handle: Mutex::new(None),
        }
    }

    /// Starts the periodic loop, cancelling any existing one first.
    ///
    /// The loop syncs immediately, then every interval. Tick errors are
    /// logged and swallowed; the next tick retries.
    pub async fn start_periodic_sync(&self, family_id: &str) {
        let mut guard = self.loop_handle.lock().await;

        // Cancel the previous loop, if any.
        if let Some(cancel) = guard.take() {
            let _ = cancel.send(true);
        }

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        *guard = Some(cancel_tx);

        let gateway = self.gateway.clone();
        let db = self.db.clone();
        let interval = self.interval;
        let family_id = family_id.to_string();

        tokio::spawn(async move {
            info!(family_id = %family_id, interval_secs = interval.as_secs(), "Periodic sync started");
            loop {
                if *cancel_rx.borrow() {
                    break;
                }

                // Best-effort: a failed tick is retried on the next one.
                if let Err(e) = sync_once(&gateway, &db, &family_id).await {
                    warn!(error = %e, "Periodic sync tick failed");
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = cancel_rx.changed() => break,
                }
            }
            info!("Periodic sync stopped");
        });
    }

    /// Stops the periodic loop. Idempotent.
    pub async fn stop_sync(&self) {
        if let Some(cancel) = self.loop_handle.lock().await.take() {
            let _ = cancel.send(true);
        }
    }

    /// One-shot sync. Unlike the periodic loop, the caller sees the error.
    ///
    /// Returns the cursor value after the batch committed.
    pub async fn sync(&self, family_id: &str) -> SyncResult<DateTime<Utc>> {
        sync_once(&self.gateway, &self.db, family_id).await
    }

    /// Wipes the whole cache (used on logout).
    pub async fn clear_cache(&self) -> SyncResult<()> {
        self.db.writer().clear_all().await?;
        Ok(())
    }
}

/// Fetches one delta batch and applies it atomically.
async fn sync_once(
    gateway: &ApiGateway,
    db: &Database,
    family_id: &str,
) -> SyncResult<DateTime<Utc>> {
    let since = db.cursors().last_sync_at(SYNC_DOMAIN_ALL).await?;

    let endpoint = Endpoint::get("sync/delta")
        .query("family_id", family_id)
        .query_opt("since", since.map(|at| at.to_rfc3339()));

    let delta: DeltaResponse = gateway.request(endpoint).await?;
    let batch = delta.into_batch();

    debug!(
        family_id,
        entities = batch.len(),
        server_time = %batch.server_time,
        "Fetched delta batch"
    );

    let cursor = db.writer().apply_sync_batch(&batch).await?;
    Ok(cursor)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_response_flattens_payloads_to_strings() {
        let json = r#"{
            "reminders": [],
            "reminder_events": [{
                "id": "ev-1",
                "reminder_id": "rem-1",
                "family_id": "fam-1",
                "recipient_id": "kid",
                "kind": "missed",
                "data": {"note": "late", "minutes": 20},
                "at": "2025-06-01T12:00:00Z"
            }],
            "mediation_events": [],
            "gamification_events": [],
            "server_time": "2025-06-01T12:00:05.123Z"
        }"#;

        let delta: DeltaResponse = serde_json::from_str(json).unwrap();
        let batch = delta.into_batch();

        let payload = batch.reminder_events[0].payload.as_deref().unwrap();
        let value: Value = serde_json::from_str(payload).unwrap();
        assert_eq!(value["minutes"], 20);
    }

    #[test]
    fn reminders_are_stamped_with_the_server_time() {
        let json = r#"{
            "reminders": [{
                "id": "rem-1",
                "family_id": "fam-1",
                "creator_id": "parent",
                "recipient_id": "kid",
                "due_at": "2025-06-01T13:00:00Z",
                "category": "chores",
                "completion_definition": "checkbox",
                "description": null,
                "status": "open",
                "created_at": "2025-06-01T08:00:00Z"
            }],
            "server_time": "2025-06-01T12:00:00Z"
        }"#;

        let delta: DeltaResponse = serde_json::from_str(json).unwrap();
        let batch = delta.into_batch();

        assert_eq!(batch.reminders[0].synced_at, batch.server_time);
        assert_eq!(batch.reminders[0].status, ReminderStatus::Open);
    }

    #[test]
    fn missing_collections_default_to_empty() {
        // The service omits collections with no changes.
        let json = r#"{ "server_time": "2025-06-01T12:00:00Z" }"#;
        let delta: DeltaResponse = serde_json::from_str(json).unwrap();
        assert!(delta.into_batch().is_empty());
    }

    #[test]
    fn server_time_decodes_with_and_without_fractional_seconds() {
        let with: DeltaResponse =
            serde_json::from_str(r#"{ "server_time": "2025-06-01T12:00:00.250Z" }"#).unwrap();
        let without: DeltaResponse =
            serde_json::from_str(r#"{ "server_time": "2025-06-01T12:00:00Z" }"#).unwrap();
        assert!(with.server_time > without.server_time);
    }
}
