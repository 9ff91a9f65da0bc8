//! # Real-Time Family Events
//!
//! The closed set of domain events delivered over the real-time stream, plus
//! the mapping to and from their wire names.
//!
//! The stream layer parses `{ "event", "family_id"?, "actor_id"?, "data"?,
//! "ts"? }` frames; `ping`/`pong` are reserved keep-alive names and never
//! reach consumers. Unrecognized names are dropped by the stream client, so
//! adding a server-side event never breaks older clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Event Kinds
// =============================================================================

/// Every event kind a consumer can observe on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum FamilyEventKind {
    ReminderCreated,
    ReminderUpdated,
    ReminderStatusChanged,
    ExcuseSubmitted,
    MemberAdded,
    MemberRemoved,
    ConnectionInvited,
    ConnectionAccepted,
}

impl FamilyEventKind {
    /// Maps a wire event name to a kind. Returns `None` for unrecognized names.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "reminder_created" => Some(FamilyEventKind::ReminderCreated),
            "reminder_updated" => Some(FamilyEventKind::ReminderUpdated),
            "reminder_status_changed" => Some(FamilyEventKind::ReminderStatusChanged),
            "excuse_submitted" => Some(FamilyEventKind::ExcuseSubmitted),
            "member_added" => Some(FamilyEventKind::MemberAdded),
            "member_removed" => Some(FamilyEventKind::MemberRemoved),
            "connection_invited" => Some(FamilyEventKind::ConnectionInvited),
            "connection_accepted" => Some(FamilyEventKind::ConnectionAccepted),
            _ => None,
        }
    }

    /// The wire name for this kind.
    pub fn wire_name(&self) -> &'static str {
        match self {
            FamilyEventKind::ReminderCreated => "reminder_created",
            FamilyEventKind::ReminderUpdated => "reminder_updated",
            FamilyEventKind::ReminderStatusChanged => "reminder_status_changed",
            FamilyEventKind::ExcuseSubmitted => "excuse_submitted",
            FamilyEventKind::MemberAdded => "member_added",
            FamilyEventKind::MemberRemoved => "member_removed",
            FamilyEventKind::ConnectionInvited => "connection_invited",
            FamilyEventKind::ConnectionAccepted => "connection_accepted",
        }
    }
}

// Display matches the wire name so log lines read like the server frames.
impl std::fmt::Display for FamilyEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

// =============================================================================
// Event
// =============================================================================

/// A typed real-time event as delivered to consumers.
///
/// `data` is the server payload re-serialized verbatim; the stream layer does
/// not interpret it, so each consumer decodes only the payloads it cares
/// about.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FamilyEvent {
    pub kind: FamilyEventKind,
    pub family_id: Option<String>,
    pub actor_id: Option<String>,
    /// Serialized JSON payload, passed through verbatim.
    pub data: Option<String>,
    #[ts(as = "Option<String>")]
    pub ts: Option<DateTime<Utc>>,
}
