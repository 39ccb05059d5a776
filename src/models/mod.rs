// src/models/mod.rs
pub mod profile;
pub mod call;
pub mod wallet;
pub mod risk;
pub mod referral;

pub use profile::{SeekerProfile, ListenerProfile, ListenerTier};
pub use call::{Call, CallKind, CallStatus, CallSummary};
pub use wallet::{
    WalletAccount, LedgerEntry, EntryDirection, ListenerEarnings, EarningsEntry, EarningKind,
    Subscription,
};
pub use risk::{RiskFlag, RiskFlagKind, FlagStatus};
pub use referral::{Referral, ReferralStatus, ReferralTier};

use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};

/// Sliding-window counter state for the durable rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RateWindow {
    pub hits: Vec<DateTime<Utc>>,
}

// ==================== API DTOs ====================

#[derive(Debug, Deserialize)]
pub struct OnboardSeekerRequest {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub intent_tags: Vec<String>,
    #[serde(default)]
    pub device_fingerprint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OnboardListenerRequest {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub topic_tags: Vec<String>,
    #[serde(default)]
    pub device_fingerprint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TalkNowRequest {
    pub seeker_id: String,
    #[serde(default)]
    pub excluded_listener_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub listener_id: String,
    pub name: String,
    pub languages: Vec<String>,
    pub topic_tags: Vec<String>,
    pub tier: ListenerTier,
}

impl From<&ListenerProfile> for MatchResponse {
    fn from(l: &ListenerProfile) -> Self {
        Self {
            listener_id: l.id.clone(),
            name: l.name.clone(),
            languages: l.languages.clone(),
            topic_tags: l.topic_tags.clone(),
            tier: l.tier,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartCallRequest {
    pub seeker_id: String,
    pub listener_id: String,
    #[serde(default = "default_call_kind")]
    pub call_kind: CallKind,
}

fn default_call_kind() -> CallKind {
    CallKind::Voice
}

/// Accept/reject/end all carry the acting user; ownership is checked against
/// the call record.
#[derive(Debug, Deserialize)]
pub struct CallActionRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RechargeRequest {
    pub pack_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TipRequest {
    pub user_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ToggleOnlineRequest {
    pub online: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApplyReferralRequest {
    pub listener_id: String,
    pub referral_code: String,
}

#[derive(Debug, Serialize)]
pub struct ReferralSummary {
    pub code: String,
    pub tier: ReferralTier,
    pub bonus_per_referral: Decimal,
    pub commission_rate: Decimal,
    pub total_referrals: usize,
    pub active_referrals: usize,
    pub pending_referrals: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}
