//! End-to-end tests for the sync engine and the adaptive router: delta
//! fetch → atomic apply → cursor advance, and the local/remote decision
//! surface, all against a local stub API and an in-memory cache.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use hearth_core::types::{
    GamificationEvent, Reminder, ReminderEvent, ReminderStatus, SyncBatch, SYNC_DOMAIN_ALL,
};
use hearth_db::{Database, DbConfig};
use hearth_sync::{
    ApiError, ApiGateway, InsightRouter, MemoryTokenStore, RemoteRouter, RouterMode, SyncEngine,
    SyncError, AdaptiveRouter, build_router,
};

const FAMILY: &str = "fam-1";
const PARENT: &str = "user-parent";
const KID: &str = "user-kid";

/// Sentinel likelihood only the remote stub produces.
const REMOTE_LIKELIHOOD: f64 = 0.99;

// =============================================================================
// Stub API
// =============================================================================

struct Stub {
    /// Body served by /v1/sync/delta; `None` makes the route fail with 500.
    delta: Option<Value>,
}

async fn delta(State(stub): State<Arc<Stub>>) -> (StatusCode, Json<Value>) {
    match &stub.delta {
        Some(body) => (StatusCode::OK, Json(body.clone())),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "code": "boom", "message": "delta exploded" } })),
        ),
    }
}

async fn remote_prediction() -> Json<Value> {
    Json(json!({ "likelihood": REMOTE_LIKELIHOOD, "suggested_reminder_at": null }))
}

async fn remote_tone() -> Json<Value> {
    Json(json!({ "tone": "neutral", "reason": "remote heuristics" }))
}

async fn remote_classify() -> Json<Value> {
    Json(json!({ "category": "remote_other", "confidence": 0.42, "summary": "" }))
}

async fn remote_digest() -> Json<Value> {
    Json(json!({ "family_id": FAMILY, "completed": 5, "missed": 1, "summary": "a fine week" }))
}

async fn remote_patterns() -> Json<Value> {
    Json(json!([{ "weekday": 0, "miss_count": 9 }]))
}

async fn spawn_stub(stub: Arc<Stub>) -> String {
    let app = Router::new()
        .route("/v1/sync/delta", get(delta))
        .route("/v1/insights/prediction", get(remote_prediction))
        .route("/v1/insights/tone", get(remote_tone))
        .route("/v1/insights/classify", post(remote_classify))
        .route("/v1/insights/digest", get(remote_digest))
        .route("/v1/insights/patterns", get(remote_patterns))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}/v1")
}

async fn gateway_for(base: &str) -> Arc<ApiGateway> {
    let tokens = Arc::new(MemoryTokenStore::with_tokens("token-1", "refresh-1"));
    Arc::new(ApiGateway::new(base, tokens).unwrap())
}

// =============================================================================
// Fixtures
// =============================================================================

fn reminder(id: &str, category: &str, status: ReminderStatus, due_at: DateTime<Utc>) -> Reminder {
    Reminder {
        id: id.to_string(),
        family_id: FAMILY.to_string(),
        creator_id: PARENT.to_string(),
        recipient_id: KID.to_string(),
        due_at,
        category: category.to_string(),
        completion_definition: "checkbox".to_string(),
        description: None,
        status,
        created_at: due_at - Duration::hours(4),
        synced_at: due_at,
    }
}

fn miss_event(id: &str, at: DateTime<Utc>) -> ReminderEvent {
    ReminderEvent {
        id: id.to_string(),
        reminder_id: "rem-target".to_string(),
        family_id: FAMILY.to_string(),
        recipient_id: KID.to_string(),
        kind: "missed".to_string(),
        payload: None,
        at,
    }
}

/// Seeds a fresh in-memory cache: cursor at `cursor_at`, given entities.
async fn seeded_db(cursor_at: DateTime<Utc>, batch: SyncBatch) -> Database {
    let db = Database::open(DbConfig::in_memory()).await.unwrap();
    let batch = SyncBatch {
        server_time: cursor_at,
        ..batch
    };
    db.writer().apply_sync_batch(&batch).await.unwrap();
    db
}

// =============================================================================
// Sync Engine
// =============================================================================

#[tokio::test]
async fn sync_applies_the_delta_and_sets_the_cursor_to_server_time() {
    let server_time = "2025-06-01T12:00:05.250Z";
    let stub = Arc::new(Stub {
        delta: Some(json!({
            "reminders": [{
                "id": "rem-1",
                "family_id": FAMILY,
                "creator_id": PARENT,
                "recipient_id": KID,
                "due_at": "2025-06-01T13:00:00Z",
                "category": "chores",
                "completion_definition": "checkbox",
                "description": null,
                "status": "open",
                "created_at": "2025-06-01T08:00:00Z"
            }],
            "reminder_events": [{
                "id": "ev-1",
                "reminder_id": "rem-1",
                "family_id": FAMILY,
                "recipient_id": KID,
                "kind": "created",
                "data": { "source": "app" },
                "at": "2025-06-01T08:00:00Z"
            }],
            "mediation_events": [],
            "gamification_events": [],
            "preferences": [{
                "user_id": KID,
                "payload": { "quiet_hours": true },
                "updated_at": "2025-06-01T08:00:00Z"
            }],
            "server_time": server_time
        })),
    });
    let base = spawn_stub(stub).await;
    let db = Database::open(DbConfig::in_memory()).await.unwrap();
    let engine = SyncEngine::new(gateway_for(&base).await, db.clone());

    let cursor = engine.sync(FAMILY).await.unwrap();
    assert_eq!(cursor, server_time.parse::<DateTime<Utc>>().unwrap());

    let stored = db.reminders().by_id("rem-1").await.unwrap().unwrap();
    assert_eq!(stored.category, "chores");
    assert_eq!(stored.synced_at, cursor);

    let events = db.events().for_reminder("rem-1").await.unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].payload.as_deref().unwrap().contains("app"));

    assert_eq!(
        db.preferences().latest(KID).await.unwrap().unwrap().payload,
        json!({ "quiet_hours": true }).to_string()
    );

    // Re-syncing the same batch changes nothing (idempotent upsert).
    let cursor_again = engine.sync(FAMILY).await.unwrap();
    assert_eq!(cursor_again, cursor);
    assert_eq!(db.reminders().for_family(FAMILY).await.unwrap().len(), 1);
}

#[tokio::test]
async fn one_shot_sync_surfaces_server_errors() {
    let stub = Arc::new(Stub { delta: None });
    let base = spawn_stub(stub).await;
    let db = Database::open(DbConfig::in_memory()).await.unwrap();
    let engine = SyncEngine::new(gateway_for(&base).await, db.clone());

    match engine.sync(FAMILY).await {
        Err(SyncError::Api(ApiError::Server(message))) => {
            assert_eq!(message, "delta exploded");
        }
        other => panic!("expected Server error, got {other:?}"),
    }

    // Nothing was committed, so the cursor stays absent.
    assert!(db
        .cursors()
        .last_sync_at(SYNC_DOMAIN_ALL)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn periodic_loop_swallows_errors_and_keeps_ticking() {
    let stub = Arc::new(Stub { delta: None });
    let base = spawn_stub(stub).await;
    let db = Database::open(DbConfig::in_memory()).await.unwrap();
    let engine = SyncEngine::with_interval(
        gateway_for(&base).await,
        db.clone(),
        std::time::Duration::from_millis(20),
    );

    engine.start_periodic_sync(FAMILY).await;
    tokio::time::sleep(std::time::Duration::from_millis(120)).await;
    engine.stop_sync().await;
    // Stopping twice is fine.
    engine.stop_sync().await;

    // Every tick failed; the loop neither panicked nor wrote anything.
    assert!(db
        .cursors()
        .last_sync_at(SYNC_DOMAIN_ALL)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn periodic_loop_syncs_without_explicit_calls() {
    let stub = Arc::new(Stub {
        delta: Some(json!({ "server_time": "2025-06-01T12:00:00Z" })),
    });
    let base = spawn_stub(stub).await;
    let db = Database::open(DbConfig::in_memory()).await.unwrap();
    let engine = SyncEngine::with_interval(
        gateway_for(&base).await,
        db.clone(),
        std::time::Duration::from_millis(50),
    );

    engine.start_periodic_sync(FAMILY).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    engine.stop_sync().await;

    assert!(db
        .cursors()
        .last_sync_at(SYNC_DOMAIN_ALL)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn clear_cache_wipes_everything() {
    let db = seeded_db(
        Utc::now(),
        SyncBatch {
            reminders: vec![reminder(
                "rem-1",
                "chores",
                ReminderStatus::Open,
                Utc::now() + Duration::hours(1),
            )],
            ..SyncBatch::default()
        },
    )
    .await;

    let stub = Arc::new(Stub { delta: None });
    let base = spawn_stub(stub).await;
    let engine = SyncEngine::new(gateway_for(&base).await, db.clone());

    engine.clear_cache().await.unwrap();
    assert!(db.reminders().for_family(FAMILY).await.unwrap().is_empty());
}

// =============================================================================
// Adaptive Router
// =============================================================================

#[tokio::test]
async fn scenario_a_fresh_empty_history_predicts_half_with_sixty_minute_lead() {
    let due = Utc::now() + Duration::hours(1);
    let db = seeded_db(
        Utc::now(),
        SyncBatch {
            reminders: vec![reminder("rem-target", "chores", ReminderStatus::Open, due)],
            ..SyncBatch::default()
        },
    )
    .await;

    let base = spawn_stub(Arc::new(Stub { delta: None })).await;
    let router = AdaptiveRouter::new(db, gateway_for(&base).await);

    let prediction = router.predict_completion("rem-target").await.unwrap();
    assert_eq!(prediction.likelihood, 0.5);
    assert_eq!(
        prediction.suggested_reminder_at,
        Some(due - Duration::minutes(60))
    );
}

#[tokio::test]
async fn scenario_b_strong_history_predicts_point_eight_with_thirty_minute_lead() {
    let due = Utc::now() + Duration::hours(1);
    let mut reminders = vec![reminder("rem-target", "chores", ReminderStatus::Open, due)];
    for i in 0..4 {
        reminders.push(reminder(
            &format!("done-{i}"),
            "chores",
            ReminderStatus::Completed,
            due - Duration::days(i64::from(i) + 1),
        ));
    }
    reminders.push(reminder(
        "still-open",
        "chores",
        ReminderStatus::Open,
        due - Duration::days(6),
    ));

    let db = seeded_db(
        Utc::now(),
        SyncBatch {
            reminders,
            ..SyncBatch::default()
        },
    )
    .await;

    let base = spawn_stub(Arc::new(Stub { delta: None })).await;
    let router = AdaptiveRouter::new(db, gateway_for(&base).await);

    let prediction = router.predict_completion("rem-target").await.unwrap();
    assert_eq!(prediction.likelihood, 0.8);
    assert_eq!(
        prediction.suggested_reminder_at,
        Some(due - Duration::minutes(30))
    );
}

#[tokio::test]
async fn freshness_boundary_decides_local_versus_remote() {
    let due = Utc::now() + Duration::hours(1);
    let target = reminder("rem-target", "chores", ReminderStatus::Open, due);
    let base = spawn_stub(Arc::new(Stub { delta: None })).await;

    // Cursor 23h59m old: still fresh, answered locally.
    let db = seeded_db(
        Utc::now() - Duration::hours(23) - Duration::minutes(59),
        SyncBatch {
            reminders: vec![target.clone()],
            ..SyncBatch::default()
        },
    )
    .await;
    let router = AdaptiveRouter::new(db, gateway_for(&base).await);
    let prediction = router.predict_completion("rem-target").await.unwrap();
    assert_eq!(prediction.likelihood, 0.5);

    // Cursor 24h01m old: stale, delegated to the remote stub.
    let db = seeded_db(
        Utc::now() - Duration::hours(24) - Duration::minutes(1),
        SyncBatch {
            reminders: vec![target],
            ..SyncBatch::default()
        },
    )
    .await;
    let router = AdaptiveRouter::new(db, gateway_for(&base).await);
    let prediction = router.predict_completion("rem-target").await.unwrap();
    assert_eq!(prediction.likelihood, REMOTE_LIKELIHOOD);
}

#[tokio::test]
async fn missing_target_entity_delegates_to_remote() {
    let db = seeded_db(Utc::now(), SyncBatch::default()).await;
    let base = spawn_stub(Arc::new(Stub { delta: None })).await;
    let router = AdaptiveRouter::new(db, gateway_for(&base).await);

    let prediction = router.predict_completion("rem-nowhere").await.unwrap();
    assert_eq!(prediction.likelihood, REMOTE_LIKELIHOOD);
}

#[tokio::test]
async fn tone_boundaries_hold_over_the_cache() {
    let now = Utc::now();
    let due = now + Duration::hours(1);

    // Exactly 3 misses in the window: firm.
    let db = seeded_db(
        now,
        SyncBatch {
            reminders: vec![reminder("rem-target", "chores", ReminderStatus::Open, due)],
            reminder_events: vec![
                miss_event("m1", now - Duration::days(1)),
                miss_event("m2", now - Duration::days(2)),
                miss_event("m3", now - Duration::days(3)),
            ],
            ..SyncBatch::default()
        },
    )
    .await;
    let base = spawn_stub(Arc::new(Stub { delta: None })).await;
    let router = AdaptiveRouter::new(db, gateway_for(&base).await);
    let decision = router.tone("rem-target").await.unwrap();
    assert_eq!(decision.tone, hearth_core::insights::Tone::Firm);

    // 2 misses alone: neutral.
    let db = seeded_db(
        now,
        SyncBatch {
            reminders: vec![reminder("rem-target", "chores", ReminderStatus::Open, due)],
            reminder_events: vec![
                miss_event("m1", now - Duration::days(1)),
                miss_event("m2", now - Duration::days(2)),
            ],
            ..SyncBatch::default()
        },
    )
    .await;
    let router = AdaptiveRouter::new(db, gateway_for(&base).await);
    let decision = router.tone("rem-target").await.unwrap();
    assert_eq!(decision.tone, hearth_core::insights::Tone::Neutral);

    // Clean week with a +3 streak: supportive.
    let db = seeded_db(
        now,
        SyncBatch {
            reminders: vec![reminder("rem-target", "chores", ReminderStatus::Open, due)],
            gamification_events: vec![GamificationEvent {
                id: "g1".to_string(),
                user_id: KID.to_string(),
                family_id: FAMILY.to_string(),
                kind: "streak_extended".to_string(),
                streak_delta: 3,
                payload: None,
                at: now - Duration::days(1),
            }],
            ..SyncBatch::default()
        },
    )
    .await;
    let router = AdaptiveRouter::new(db, gateway_for(&base).await);
    let decision = router.tone("rem-target").await.unwrap();
    assert_eq!(decision.tone, hearth_core::insights::Tone::Supportive);
}

#[tokio::test]
async fn classification_runs_locally_on_a_fresh_cache_only() {
    let base = spawn_stub(Arc::new(Stub { delta: None })).await;

    let fresh = seeded_db(Utc::now(), SyncBatch::default()).await;
    let router = AdaptiveRouter::new(fresh, gateway_for(&base).await);
    let local = router.classify_text("math homework tonight").await.unwrap();
    assert_eq!(local.category, "school");
    assert_eq!(local.confidence, 0.7);

    let stale = seeded_db(Utc::now() - Duration::days(3), SyncBatch::default()).await;
    let router = AdaptiveRouter::new(stale, gateway_for(&base).await);
    let remote = router.classify_text("math homework tonight").await.unwrap();
    assert_eq!(remote.category, "remote_other");
}

#[tokio::test]
async fn patterns_come_from_the_cache_when_fresh() {
    let now = Utc::now();
    // Four misses on one weekday within the window.
    let events = (0..4)
        .map(|i| miss_event(&format!("m{i}"), now - Duration::weeks(i64::from(i))))
        .collect();

    let db = seeded_db(
        now,
        SyncBatch {
            reminder_events: events,
            ..SyncBatch::default()
        },
    )
    .await;
    let base = spawn_stub(Arc::new(Stub { delta: None })).await;
    let router = AdaptiveRouter::new(db, gateway_for(&base).await);

    let insights = router.pattern_insights(FAMILY, KID).await.unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].miss_count, 4);
}

#[tokio::test]
async fn digest_always_delegates_to_remote() {
    let db = seeded_db(Utc::now(), SyncBatch::default()).await;
    let base = spawn_stub(Arc::new(Stub { delta: None })).await;
    let router = AdaptiveRouter::new(db, gateway_for(&base).await);

    let digest = router.weekly_digest(FAMILY).await.unwrap();
    assert_eq!(digest.summary, "a fine week");
}

#[tokio::test]
async fn router_factory_selects_the_implementation() {
    let db = seeded_db(Utc::now(), SyncBatch::default()).await;
    let base = spawn_stub(Arc::new(Stub { delta: None })).await;
    let gateway = gateway_for(&base).await;

    // Remote-only: even a fresh cache is ignored.
    let remote = build_router(RouterMode::AlwaysRemote, gateway.clone(), db.clone());
    let classified = remote.classify_text("homework").await.unwrap();
    assert_eq!(classified.category, "remote_other");

    // Adaptive: a fresh cache answers locally.
    let adaptive = build_router(RouterMode::PreferHeuristic, gateway, db);
    let classified = adaptive.classify_text("homework").await.unwrap();
    assert_eq!(classified.category, "school");
}

#[tokio::test]
async fn remote_router_decodes_every_endpoint_shape() {
    let base = spawn_stub(Arc::new(Stub { delta: None })).await;
    let router = RemoteRouter::new(gateway_for(&base).await);

    assert_eq!(router.tone("rem-1").await.unwrap().reason, "remote heuristics");
    assert_eq!(
        router.predict_completion("rem-1").await.unwrap().likelihood,
        REMOTE_LIKELIHOOD
    );
    assert_eq!(router.pattern_insights(FAMILY, KID).await.unwrap()[0].miss_count, 9);
    assert_eq!(router.weekly_digest(FAMILY).await.unwrap().completed, 5);
}
