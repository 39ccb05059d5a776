// src/models/referral.rs
use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    Pending,
    Active,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub id: String,
    pub referrer_id: String,
    pub referred_id: String,
    pub code_used: String,
    pub status: ReferralStatus,
    pub applied_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub accrued_commission: Decimal,
    pub bonus_paid: bool,
}

impl Referral {
    pub fn new(referrer_id: &str, referred_id: &str, code_used: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            referrer_id: referrer_id.to_string(),
            referred_id: referred_id.to_string(),
            code_used: code_used.to_string(),
            status: ReferralStatus::Pending,
            applied_at: Utc::now(),
            activated_at: None,
            accrued_commission: Decimal::ZERO,
            bonus_paid: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReferralTier {
    Bronze,
    Silver,
    Gold,
}

impl ReferralTier {
    /// Tier is keyed by the referrer's current count of active referrals, so
    /// it can drift upward over a referral's commission window.
    pub fn for_active_count(active: usize) -> Self {
        match active {
            0..=5 => ReferralTier::Bronze,
            6..=15 => ReferralTier::Silver,
            _ => ReferralTier::Gold,
        }
    }

    pub fn activation_bonus(&self) -> Decimal {
        match self {
            ReferralTier::Bronze => Decimal::from(200),
            ReferralTier::Silver => Decimal::from(350),
            ReferralTier::Gold => Decimal::from(500),
        }
    }

    /// Commission as a fraction of the referred listener's per-call earnings.
    pub fn commission_rate(&self) -> Decimal {
        match self {
            ReferralTier::Bronze => Decimal::new(5, 2),   // 5%
            ReferralTier::Silver => Decimal::new(75, 3),  // 7.5%
            ReferralTier::Gold => Decimal::new(10, 2),    // 10%
        }
    }

    pub fn commission_window_days(&self) -> i64 {
        30
    }

    pub fn as_str(&self) -> &str {
        match self {
            ReferralTier::Bronze => "bronze",
            ReferralTier::Silver => "silver",
            ReferralTier::Gold => "gold",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn tier_boundaries() {
        assert_eq!(ReferralTier::for_active_count(0), ReferralTier::Bronze);
        assert_eq!(ReferralTier::for_active_count(5), ReferralTier::Bronze);
        assert_eq!(ReferralTier::for_active_count(6), ReferralTier::Silver);
        assert_eq!(ReferralTier::for_active_count(15), ReferralTier::Silver);
        assert_eq!(ReferralTier::for_active_count(16), ReferralTier::Gold);
        assert_eq!(ReferralTier::for_active_count(25), ReferralTier::Gold);
    }

    #[test]
    fn bronze_matches_launch_offer() {
        assert_eq!(ReferralTier::Bronze.activation_bonus(), dec!(200));
        assert_eq!(ReferralTier::Bronze.commission_rate(), dec!(0.05));
    }
}
