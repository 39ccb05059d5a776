// src/models/risk.rs
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlagKind {
    ShortCallSpam,
    PairOvercall,
    PairOverminutes,
    SilenceFarming,
}

impl RiskFlagKind {
    pub fn as_str(&self) -> &str {
        match self {
            RiskFlagKind::ShortCallSpam => "short_call_spam",
            RiskFlagKind::PairOvercall => "pair_overcall",
            RiskFlagKind::PairOverminutes => "pair_overminutes",
            RiskFlagKind::SilenceFarming => "silence_farming",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlagStatus {
    Active,
    Resolved,
}

/// Append-only. Flags are only ever resolved by manual review, never
/// retracted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFlag {
    pub id: String,
    pub subject_id: String,
    pub kind: RiskFlagKind,
    pub description: String,
    pub status: FlagStatus,
    pub call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RiskFlag {
    pub fn new(subject_id: &str, kind: RiskFlagKind, description: String, call_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            kind,
            description,
            status: FlagStatus::Active,
            call_id: Some(call_id.to_string()),
            created_at: Utc::now(),
        }
    }
}
