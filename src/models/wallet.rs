// src/models/wallet.rs
use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletAccount {
    pub owner_id: String,
    /// Never negative: every debit is conditional on sufficient balance, and
    /// the partial-charge fallback clamps at zero.
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl WalletAccount {
    pub fn new(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            balance: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Credit,
    Debit,
}

/// Append-only money movement. The ledger is the source of truth; the cached
/// wallet balance is a reconciliable aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub owner_id: String,
    pub direction: EntryDirection,
    pub amount: Decimal,
    pub reason: String,
    pub call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        owner_id: &str,
        direction: EntryDirection,
        amount: Decimal,
        reason: &str,
        call_id: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            direction,
            amount,
            reason: reason.to_string(),
            call_id: call_id.map(str::to_string),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerEarnings {
    pub owner_id: String,
    pub total_earned: Decimal,
    pub pending_balance: Decimal,
    pub withdrawn: Decimal,
    pub created_at: DateTime<Utc>,
}

impl ListenerEarnings {
    pub fn new(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            total_earned: Decimal::ZERO,
            pending_balance: Decimal::ZERO,
            withdrawn: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EarningKind {
    CallEarning,
    ReferralBonus,
    ReferralCommission,
    Tip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningsEntry {
    pub id: String,
    pub owner_id: String,
    pub kind: EarningKind,
    pub amount: Decimal,
    pub description: String,
    pub call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EarningsEntry {
    pub fn new(
        owner_id: &str,
        kind: EarningKind,
        amount: Decimal,
        description: &str,
        call_id: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            kind,
            amount,
            description: description.to_string(),
            call_id: call_id.map(str::to_string),
            created_at: Utc::now(),
        }
    }
}

/// Active subscription discount applied when freezing a non-first-call rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub owner_id: String,
    pub discount_percent: Decimal,
    pub expires_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
