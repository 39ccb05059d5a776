// src/services/referral.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::models::{
    Call, CallStatus, EarningKind, Referral, ReferralStatus, ReferralSummary, ReferralTier,
};
use crate::services::billing;
use crate::services::rate_limiter::RateLimiter;
use crate::services::wallet::WalletService;
use crate::store::Store;

/// Cumulative ended-call talk time a referred listener needs before the
/// referral activates.
const ACTIVATION_SECONDS: i64 = 30 * 60;
/// Hard cap on referrals per referrer, across all tiers.
const MAX_REFERRALS: usize = 25;

const APPLY_LIMIT: u32 = 5;
const APPLY_WINDOW_MINUTES: i64 = 60;

pub struct ReferralEngine {
    store: Arc<Store>,
    wallet: Arc<WalletService>,
    limiter: Arc<RateLimiter>,
}

impl ReferralEngine {
    pub fn new(store: Arc<Store>, wallet: Arc<WalletService>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            store,
            wallet,
            limiter,
        }
    }

    /// Apply a referral code on behalf of a newly onboarded listener,
    /// creating a `pending` referral.
    pub fn apply(&self, referred_id: &str, code: &str) -> Result<Referral, EngineError> {
        if !self.limiter.allow(
            "referral_apply",
            referred_id,
            APPLY_LIMIT,
            Duration::minutes(APPLY_WINDOW_MINUTES),
        ) {
            return Err(EngineError::RateLimited("referral applications".into()));
        }

        let referred = self
            .store
            .listeners
            .get(referred_id)
            .ok_or(EngineError::NotFound("listener profile"))?;

        let referrer = self
            .store
            .listeners
            .find(|l| l.referral_code == code)
            .into_iter()
            .next()
            .ok_or(EngineError::NotFound("referral code"))?;

        if referrer.id == referred_id {
            return Err(EngineError::Validation("cannot use your own referral code".into()));
        }

        if self.store.referrals.count(|r| r.referred_id == referred_id) > 0 {
            return Err(EngineError::Conflict("listener already has a referral".into()));
        }

        let referrer_total = self.store.referrals.count(|r| r.referrer_id == referrer.id);
        if referrer_total >= MAX_REFERRALS {
            return Err(EngineError::Conflict("referrer is at the referral cap".into()));
        }

        if let (Some(a), Some(b)) = (&referrer.device_fingerprint, &referred.device_fingerprint) {
            if a == b {
                warn!(
                    "Referral refused: {} and {} share a device fingerprint",
                    referrer.id, referred_id
                );
                return Err(EngineError::Conflict("shared device between referrer and referred".into()));
            }
        }

        let referral = Referral::new(&referrer.id, referred_id, code);
        // One referral per referred id; the keyed insert makes a concurrent
        // duplicate application lose cleanly.
        if !self.store.referrals.insert(referred_id, referral.clone()) {
            return Err(EngineError::Conflict("listener already has a referral".into()));
        }

        info!(
            "Referral applied: {} referred by {} (code {})",
            referred_id, referral.referrer_id, code
        );
        Ok(referral)
    }

    pub fn summary(&self, listener_id: &str) -> Result<ReferralSummary, EngineError> {
        let listener = self
            .store
            .listeners
            .get(listener_id)
            .ok_or(EngineError::NotFound("listener profile"))?;

        let total = self.store.referrals.count(|r| r.referrer_id == listener_id);
        let active = self.active_count(listener_id);
        let tier = ReferralTier::for_active_count(active);

        Ok(ReferralSummary {
            code: listener.referral_code,
            tier,
            bonus_per_referral: tier.activation_bonus(),
            commission_rate: tier.commission_rate(),
            total_referrals: total,
            active_referrals: active,
            pending_referrals: total - active,
        })
    }

    /// Post-call hook for the referred listener's completed calls: drives
    /// pending->active activation and the ongoing commission accrual.
    pub fn on_call_settled(&self, call: &Call, now: DateTime<Utc>) {
        if call.status != CallStatus::Ended || call.duration_seconds <= 0 {
            return;
        }

        let Some(referral) = self.store.referrals.get(&call.listener_id) else {
            return;
        };

        match referral.status {
            ReferralStatus::Pending => self.try_activate(&referral, now),
            ReferralStatus::Active => self.accrue_commission(&referral, call, now),
        }
    }

    /// Activation is computed from the immutable ended-call records, never a
    /// cached minutes counter, and transitions exactly once via a
    /// conditional update.
    fn try_activate(&self, referral: &Referral, now: DateTime<Utc>) {
        let talked: i64 = self
            .store
            .calls
            .find(|c| c.listener_id == referral.referred_id && c.status == CallStatus::Ended)
            .iter()
            .map(|c| c.duration_seconds)
            .sum();

        if talked < ACTIVATION_SECONDS {
            return;
        }

        let won = self.store.referrals.update_if(
            &referral.referred_id,
            |r| r.status == ReferralStatus::Pending,
            |r| {
                r.status = ReferralStatus::Active;
                r.activated_at = Some(now);
                r.bonus_paid = true;
            },
        );
        if !won {
            return;
        }

        // Tier at the moment of activation, this referral included.
        let tier = ReferralTier::for_active_count(self.active_count(&referral.referrer_id));
        let bonus = tier.activation_bonus();
        self.wallet.credit_earnings(
            &referral.referrer_id,
            EarningKind::ReferralBonus,
            bonus,
            &format!("Referral bonus ({}) for {}", tier.as_str(), referral.referred_id),
            None,
        );
        info!(
            "Referral activated: {} -> {} ({} bonus {})",
            referral.referrer_id,
            referral.referred_id,
            tier.as_str(),
            bonus
        );
    }

    fn accrue_commission(&self, referral: &Referral, call: &Call, now: DateTime<Utc>) {
        let Some(activated_at) = referral.activated_at else {
            return;
        };

        // Tier (and window) re-evaluated from the referrer's current active
        // count, so the rate can drift upward over time.
        let tier = ReferralTier::for_active_count(self.active_count(&referral.referrer_id));
        if now - activated_at > Duration::days(tier.commission_window_days()) {
            return;
        }

        let earnings = billing::listener_payout(call.duration_seconds, call.kind);
        let commission = (earnings * tier.commission_rate()).round_dp(2);
        if commission <= Decimal::ZERO {
            return;
        }

        self.store
            .referrals
            .update(&referral.referred_id, |r| r.accrued_commission += commission);
        self.wallet.credit_earnings(
            &referral.referrer_id,
            EarningKind::ReferralCommission,
            commission,
            &format!(
                "Referral commission ({}) from {}",
                tier.as_str(),
                referral.referred_id
            ),
            Some(&call.id),
        );
    }

    fn active_count(&self, referrer_id: &str) -> usize {
        self.store
            .referrals
            .count(|r| r.referrer_id == referrer_id && r.status == ReferralStatus::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use crate::models::{CallKind, ListenerProfile};

    fn engine() -> (Arc<Store>, ReferralEngine) {
        let store = Arc::new(Store::new());
        let wallet = Arc::new(WalletService::new(store.clone()));
        let limiter = Arc::new(RateLimiter::new(store.clone()));
        (store.clone(), ReferralEngine::new(store, wallet, limiter))
    }

    fn listener(store: &Store, id: &str) -> ListenerProfile {
        let l = ListenerProfile::new(id, id, vec![], vec![]);
        store.listeners.insert(id, l.clone());
        l
    }

    fn ended_call(id: &str, listener_id: &str, duration: i64) -> Call {
        let now = Utc::now();
        Call {
            id: id.to_string(),
            seeker_id: "s1".to_string(),
            listener_id: listener_id.to_string(),
            kind: CallKind::Voice,
            rate_per_minute: dec!(5),
            is_first_call: false,
            status: CallStatus::Ended,
            room: None,
            created_at: now,
            connected_at: Some(now),
            ended_at: Some(now),
            duration_seconds: duration,
            cost: dec!(5),
        }
    }

    #[test]
    fn apply_creates_a_pending_referral() {
        let (store, engine) = engine();
        let referrer = listener(&store, "ref");
        listener(&store, "new");

        let referral = engine.apply("new", &referrer.referral_code).unwrap();
        assert_eq!(referral.status, ReferralStatus::Pending);
        assert_eq!(referral.referrer_id, "ref");
    }

    #[test]
    fn self_referral_is_rejected() {
        let (store, engine) = engine();
        let me = listener(&store, "ref");
        assert!(matches!(
            engine.apply("ref", &me.referral_code),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn second_application_conflicts() {
        let (store, engine) = engine();
        let a = listener(&store, "ref_a");
        let b = listener(&store, "ref_b");
        listener(&store, "new");

        engine.apply("new", &a.referral_code).unwrap();
        assert!(matches!(
            engine.apply("new", &b.referral_code),
            Err(EngineError::Conflict(_))
        ));
    }

    #[test]
    fn unknown_code_is_not_found() {
        let (store, engine) = engine();
        listener(&store, "new");
        assert!(matches!(
            engine.apply("new", "NOPE1234"),
            Err(EngineError::NotFound("referral code"))
        ));
    }

    #[test]
    fn shared_device_fingerprint_is_rejected() {
        let (store, engine) = engine();
        let referrer = listener(&store, "ref");
        listener(&store, "new");
        store
            .listeners
            .update("ref", |l| l.device_fingerprint = Some("dev-1".into()));
        store
            .listeners
            .update("new", |l| l.device_fingerprint = Some("dev-1".into()));

        assert!(matches!(
            engine.apply("new", &referrer.referral_code),
            Err(EngineError::Conflict(_))
        ));
    }

    #[test]
    fn referral_cap_is_enforced() {
        let (store, engine) = engine();
        let referrer = listener(&store, "ref");
        for i in 0..MAX_REFERRALS {
            let id = format!("old-{}", i);
            store
                .referrals
                .insert(&id, Referral::new("ref", &id, &referrer.referral_code));
        }
        listener(&store, "new");

        assert!(matches!(
            engine.apply("new", &referrer.referral_code),
            Err(EngineError::Conflict(_))
        ));
    }

    #[test]
    fn activation_threshold_is_thirty_minutes_of_ended_calls() {
        let (store, engine) = engine();
        let referrer = listener(&store, "ref");
        listener(&store, "new");
        engine.apply("new", &referrer.referral_code).unwrap();

        // 29.9 minutes: stays pending.
        store.calls.insert("c1", ended_call("c1", "new", 1794));
        engine.on_call_settled(&store.calls.get("c1").unwrap(), Utc::now());
        assert_eq!(store.referrals.get("new").unwrap().status, ReferralStatus::Pending);

        // 30.1 cumulative minutes: activates and pays the bronze bonus once.
        store.calls.insert("c2", ended_call("c2", "new", 12));
        engine.on_call_settled(&store.calls.get("c2").unwrap(), Utc::now());

        let referral = store.referrals.get("new").unwrap();
        assert_eq!(referral.status, ReferralStatus::Active);
        assert!(referral.bonus_paid);
        assert!(referral.activated_at.is_some());

        let earnings = store.earnings.get("ref").unwrap();
        assert_eq!(earnings.total_earned, dec!(200));
    }

    #[test]
    fn activation_pays_the_bonus_exactly_once() {
        let (store, engine) = engine();
        let referrer = listener(&store, "ref");
        listener(&store, "new");
        engine.apply("new", &referrer.referral_code).unwrap();

        store.calls.insert("c1", ended_call("c1", "new", 1800));
        let call = store.calls.get("c1").unwrap();
        engine.on_call_settled(&call, Utc::now());
        // Replayed settlement hook: the referral is already active, so the
        // second pass accrues commission instead of re-paying the bonus.
        engine.on_call_settled(&call, Utc::now());

        let earnings = store.earnings.get("ref").unwrap();
        // 1800s voice payout = 90; bronze commission 5% = 4.5; bonus 200.
        assert_eq!(earnings.total_earned, dec!(204.5));
    }

    #[test]
    fn commission_accrues_inside_the_window() {
        let (store, engine) = engine();
        let referrer = listener(&store, "ref");
        listener(&store, "new");
        engine.apply("new", &referrer.referral_code).unwrap();
        store.referrals.update("new", |r| {
            r.status = ReferralStatus::Active;
            r.activated_at = Some(Utc::now() - Duration::days(2));
            r.bonus_paid = true;
        });

        store.calls.insert("c1", ended_call("c1", "new", 600));
        engine.on_call_settled(&store.calls.get("c1").unwrap(), Utc::now());

        // 600s voice payout = 30; bronze 5% = 1.5.
        let referral = store.referrals.get("new").unwrap();
        assert_eq!(referral.accrued_commission, dec!(1.5));
        let earnings = store.earnings.get("ref").unwrap();
        assert_eq!(earnings.total_earned, dec!(1.5));
    }

    #[test]
    fn commission_stops_after_the_window() {
        let (store, engine) = engine();
        let referrer = listener(&store, "ref");
        listener(&store, "new");
        engine.apply("new", &referrer.referral_code).unwrap();
        store.referrals.update("new", |r| {
            r.status = ReferralStatus::Active;
            r.activated_at = Some(Utc::now() - Duration::days(31));
            r.bonus_paid = true;
        });

        store.calls.insert("c1", ended_call("c1", "new", 600));
        engine.on_call_settled(&store.calls.get("c1").unwrap(), Utc::now());

        assert_eq!(store.referrals.get("new").unwrap().accrued_commission, dec!(0));
        assert!(store.earnings.get("ref").is_none());
    }

    #[test]
    fn repeated_applications_rate_limit() {
        let (store, engine) = engine();
        listener(&store, "new");
        for _ in 0..APPLY_LIMIT {
            let _ = engine.apply("new", "NOCODE99");
        }
        assert!(matches!(
            engine.apply("new", "NOCODE99"),
            Err(EngineError::RateLimited(_))
        ));
    }
}
