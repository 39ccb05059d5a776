// src/models/call.rs
use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};

use crate::rooms::RoomSession;

/// Canonical call-kind discriminator. Billing, payout and matching all key
/// off this enum; there is deliberately no separate `is_video` flag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Voice,
    Video,
}

impl CallKind {
    pub fn as_str(&self) -> &str {
        match self {
            CallKind::Voice => "voice",
            CallKind::Video => "video",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ringing,
    Active,
    Ended,
    Missed,
    Rejected,
}

impl CallStatus {
    /// Terminal states are immutable; no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Ended | CallStatus::Missed | CallStatus::Rejected)
    }

    pub fn as_str(&self) -> &str {
        match self {
            CallStatus::Ringing => "ringing",
            CallStatus::Active => "active",
            CallStatus::Ended => "ended",
            CallStatus::Missed => "missed",
            CallStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: String,
    pub seeker_id: String,
    pub listener_id: String,
    pub kind: CallKind,
    /// Frozen at creation; never recomputed retroactively.
    pub rate_per_minute: Decimal,
    /// Frozen at creation: true iff the seeker had zero prior call records.
    pub is_first_call: bool,
    pub status: CallStatus,
    pub room: Option<RoomSession>,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    pub cost: Decimal,
}

impl Call {
    pub fn participant(&self, user_id: &str) -> bool {
        self.seeker_id == user_id || self.listener_id == user_id
    }
}

/// Terminal outcome of a call as reported back to clients.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CallSummary {
    pub call_id: String,
    pub status: CallStatus,
    pub duration_seconds: i64,
    pub cost: Decimal,
}

impl From<&Call> for CallSummary {
    fn from(call: &Call) -> Self {
        Self {
            call_id: call.id.clone(),
            status: call.status,
            duration_seconds: call.duration_seconds,
            cost: call.cost,
        }
    }
}
