// src/services/call_lifecycle.rs
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Call, CallStatus, CallSummary, EarningKind, StartCallRequest};
use crate::realtime::{ChannelRegistry, RealtimeEvent};
use crate::rooms::RoomProvider;
use crate::services::billing;
use crate::services::referral::ReferralEngine;
use crate::services::risk::RiskEngine;
use crate::services::wallet::WalletService;
use crate::store::Store;

/// Unanswered calls stop ringing after this and resolve as `missed`.
pub const RING_TIMEOUT_SECONDS: i64 = 60;

/// Owns the ringing -> active -> terminal transitions. Every transition is a
/// conditional update on the call document, so concurrent actions on the same
/// call resolve to exactly one winner and billing runs at most once.
pub struct CallLifecycle {
    store: Arc<Store>,
    wallet: Arc<WalletService>,
    risk: Arc<RiskEngine>,
    referral: Arc<ReferralEngine>,
    rooms: Arc<dyn RoomProvider>,
    channels: Arc<dyn ChannelRegistry>,
}

impl CallLifecycle {
    pub fn new(
        store: Arc<Store>,
        wallet: Arc<WalletService>,
        risk: Arc<RiskEngine>,
        referral: Arc<ReferralEngine>,
        rooms: Arc<dyn RoomProvider>,
        channels: Arc<dyn ChannelRegistry>,
    ) -> Self {
        Self {
            store,
            wallet,
            risk,
            referral,
            rooms,
            channels,
        }
    }

    /// Create a `ringing` call with the rate and first-call flag frozen in.
    pub async fn start(&self, req: &StartCallRequest) -> Result<Call, EngineError> {
        let now = Utc::now();

        self.store
            .seekers
            .get(&req.seeker_id)
            .ok_or(EngineError::NotFound("seeker profile"))?;
        let listener = self
            .store
            .listeners
            .get(&req.listener_id)
            .ok_or(EngineError::NotFound("listener profile"))?;
        if !listener.online || listener.in_call {
            return Err(EngineError::Conflict("listener is unavailable".into()));
        }

        let available = self.wallet.balance(&req.seeker_id)?;
        if available < billing::MIN_CALL_BALANCE {
            return Err(EngineError::InsufficientFunds {
                required: billing::MIN_CALL_BALANCE.to_string(),
                available: available.to_string(),
            });
        }

        // First call iff the seeker has no prior call record of any outcome.
        let is_first_call = self.store.calls.count(|c| c.seeker_id == req.seeker_id) == 0;
        let discount = self
            .store
            .subscriptions
            .get(&req.seeker_id)
            .filter(|s| s.is_active(now))
            .map(|s| s.discount_percent);
        let rate = billing::resolve_rate(req.call_kind, is_first_call, discount);

        let call_id = Uuid::new_v4().to_string();
        let room = self.rooms.create_room(&format!("call-{}", call_id)).await;

        let call = Call {
            id: call_id.clone(),
            seeker_id: req.seeker_id.clone(),
            listener_id: req.listener_id.clone(),
            kind: req.call_kind,
            rate_per_minute: rate,
            is_first_call,
            status: CallStatus::Ringing,
            room,
            created_at: now,
            connected_at: None,
            ended_at: None,
            duration_seconds: 0,
            cost: Decimal::ZERO,
        };
        self.store.calls.insert(&call_id, call.clone());

        self.channels
            .send(
                &req.listener_id,
                RealtimeEvent::IncomingCall {
                    call_id: call_id.clone(),
                    seeker_id: req.seeker_id.clone(),
                    kind: req.call_kind,
                },
            )
            .await;

        info!(
            "Call {} ringing: {} -> {} ({}, rate {}/min, first={})",
            call_id,
            req.seeker_id,
            req.listener_id,
            req.call_kind.as_str(),
            rate,
            is_first_call
        );
        Ok(call)
    }

    /// Listener answers. Only `ringing` calls can be accepted, and only by
    /// the matched listener.
    pub async fn accept(&self, call_id: &str, user_id: &str) -> Result<Call, EngineError> {
        let call = self
            .store
            .calls
            .get(call_id)
            .ok_or(EngineError::NotFound("call"))?;
        if call.listener_id != user_id {
            return Err(EngineError::Authorization("not the called listener".into()));
        }

        let now = Utc::now();
        let accepted = self.store.calls.update_if(
            call_id,
            |c| c.status == CallStatus::Ringing,
            |c| {
                c.status = CallStatus::Active;
                c.connected_at = Some(now);
            },
        );
        if !accepted {
            return Err(EngineError::Conflict("call is no longer ringing".into()));
        }

        // Busy only from accept onward; selection never reserves a listener.
        self.store.listeners.update(user_id, |l| {
            l.in_call = true;
            l.answered_count += 1;
        });

        self.channels
            .send(&call.seeker_id, RealtimeEvent::CallAccepted { call_id: call_id.to_string() })
            .await;

        info!("Call {} accepted by {}", call_id, user_id);
        self.store
            .calls
            .get(call_id)
            .ok_or(EngineError::NotFound("call"))
    }

    /// Listener declines a ringing call. Free for the seeker, counted against
    /// the listener's answer rate.
    pub async fn reject(&self, call_id: &str, user_id: &str) -> Result<CallSummary, EngineError> {
        let call = self
            .store
            .calls
            .get(call_id)
            .ok_or(EngineError::NotFound("call"))?;
        if call.listener_id != user_id {
            return Err(EngineError::Authorization("not the called listener".into()));
        }

        let now = Utc::now();
        let rejected = self.store.calls.update_if(
            call_id,
            |c| c.status == CallStatus::Ringing,
            |c| {
                c.status = CallStatus::Rejected;
                c.ended_at = Some(now);
            },
        );
        if !rejected {
            return Err(EngineError::Conflict("call is no longer ringing".into()));
        }

        self.store.listeners.update(user_id, |l| l.rejected_count += 1);
        self.release_room(&call);
        self.channels
            .send(&call.seeker_id, RealtimeEvent::CallRejected { call_id: call_id.to_string() })
            .await;

        info!("Call {} rejected by {}", call_id, user_id);
        self.summary_of(call_id)
    }

    /// Terminal transition, callable by either side, idempotent.
    ///
    /// A ringing call ends as `missed` (free). An active call races to
    /// `ended` through a conditional update; the winner measures the duration
    /// and settles, the loser returns the winner's persisted result.
    pub async fn end(&self, call_id: &str, user_id: &str) -> Result<CallSummary, EngineError> {
        let call = self
            .store
            .calls
            .get(call_id)
            .ok_or(EngineError::NotFound("call"))?;
        if !call.participant(user_id) {
            return Err(EngineError::Authorization("not a participant of this call".into()));
        }

        if call.status.is_terminal() {
            return Ok(CallSummary::from(&call));
        }

        let now = Utc::now();

        if call.status == CallStatus::Ringing {
            let missed = self.store.calls.update_if(
                call_id,
                |c| c.status == CallStatus::Ringing,
                |c| {
                    c.status = CallStatus::Missed;
                    c.ended_at = Some(now);
                },
            );
            if missed {
                self.release_room(&call);
                self.channels
                    .send(
                        &call.listener_id,
                        RealtimeEvent::CallEnded {
                            call_id: call_id.to_string(),
                            duration_seconds: 0,
                            cost: Decimal::ZERO,
                        },
                    )
                    .await;
                info!("Call {} missed", call_id);
                return self.summary_of(call_id);
            }
            // Lost to a concurrent accept; fall through against fresh state.
            return self.resolve_race(call_id).await;
        }

        // Active: measure, price, and race to `ended`.
        let connected_at = call
            .connected_at
            .ok_or_else(|| EngineError::Internal("active call without connected_at".into()))?;
        let duration = (now - connected_at).num_seconds().max(0);
        let cost = billing::call_cost(duration, call.rate_per_minute, call.is_first_call, call.kind);

        let won = self.store.calls.update_if(
            call_id,
            |c| c.status == CallStatus::Active,
            |c| {
                c.status = CallStatus::Ended;
                c.ended_at = Some(now);
                c.duration_seconds = duration;
                c.cost = cost;
            },
        );
        if !won {
            // The other side already ended it; its settlement stands.
            return self.resolve_race(call_id).await;
        }

        self.settle(&call, duration, cost).await;
        self.summary_of(call_id)
    }

    /// Post-transition settlement: runs exactly once, on the side that won
    /// the active -> ended update.
    async fn settle(&self, call: &Call, duration: i64, cost: Decimal) {
        let reason = format!("Call ({}) - {}s", call.kind.as_str(), duration);
        match self.wallet.debit(&call.seeker_id, cost, &reason, Some(&call.id)) {
            Ok(outcome) => {
                if outcome.shortfall > Decimal::ZERO {
                    // The recorded cost tracks what was actually collected.
                    warn!(
                        "Call {} cost {} not fully collectable; recording {}",
                        call.id, cost, outcome.charged
                    );
                    self.store
                        .calls
                        .update(&call.id, |c| c.cost = outcome.charged);
                }
            }
            Err(e) => warn!("Call {} debit failed: {}", call.id, e),
        }

        let payout = billing::listener_payout(duration, call.kind);
        self.wallet.credit_earnings(
            &call.listener_id,
            EarningKind::CallEarning,
            payout,
            &format!("Call earning ({}) - {}s", call.kind.as_str(), duration),
            Some(&call.id),
        );

        self.store.listeners.update(&call.listener_id, |l| {
            l.in_call = false;
            l.total_calls += 1;
            l.total_seconds += duration;
        });
        self.release_room(call);

        if let Some(ended) = self.store.calls.get(&call.id) {
            let event = RealtimeEvent::CallEnded {
                call_id: ended.id.clone(),
                duration_seconds: ended.duration_seconds,
                cost: ended.cost,
            };
            self.channels.send(&ended.seeker_id, event.clone()).await;
            self.channels.send(&ended.listener_id, event).await;

            let now = Utc::now();
            self.risk.scan_call(&ended, now);
            self.referral.on_call_settled(&ended, now);

            info!(
                "Call {} ended: {}s, cost {}, payout {}",
                ended.id, ended.duration_seconds, ended.cost, payout
            );
        }
    }

    /// After losing a transition race, report whatever terminal state the
    /// winner persisted.
    async fn resolve_race(&self, call_id: &str) -> Result<CallSummary, EngineError> {
        let call = self
            .store
            .calls
            .get(call_id)
            .ok_or(EngineError::NotFound("call"))?;
        if call.status.is_terminal() {
            return Ok(CallSummary::from(&call));
        }
        // Ringing flipped to active underneath us; the caller retries end().
        Err(EngineError::Conflict("call state changed, retry".into()))
    }

    /// Background sweep: time out calls that have been ringing past the
    /// timeout. Each expiry is the same conditional update an explicit end
    /// uses, so it never clobbers a concurrent accept.
    pub async fn expire_stale_ringing(&self) -> usize {
        let now = Utc::now();
        let floor = now - chrono::Duration::seconds(RING_TIMEOUT_SECONDS);
        let stale = self
            .store
            .calls
            .find(|c| c.status == CallStatus::Ringing && c.created_at < floor);

        let mut expired = 0;
        for call in stale {
            let missed = self.store.calls.update_if(
                &call.id,
                |c| c.status == CallStatus::Ringing,
                |c| {
                    c.status = CallStatus::Missed;
                    c.ended_at = Some(now);
                },
            );
            if !missed {
                continue;
            }
            self.release_room(&call);
            let event = RealtimeEvent::CallEnded {
                call_id: call.id.clone(),
                duration_seconds: 0,
                cost: Decimal::ZERO,
            };
            self.channels.send(&call.seeker_id, event.clone()).await;
            self.channels.send(&call.listener_id, event).await;
            info!("Call {} timed out while ringing", call.id);
            expired += 1;
        }
        expired
    }

    fn release_room(&self, call: &Call) {
        if let Some(room) = &call.room {
            let rooms = self.rooms.clone();
            let room_id = room.room_id.clone();
            tokio::spawn(async move { rooms.end_room(&room_id).await });
        }
    }

    fn summary_of(&self, call_id: &str) -> Result<CallSummary, EngineError> {
        self.store
            .calls
            .get(call_id)
            .map(|c| CallSummary::from(&c))
            .ok_or(EngineError::NotFound("call"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use crate::models::{CallKind, ListenerProfile, SeekerProfile, Subscription};
    use crate::realtime::InProcessChannelRegistry;
    use crate::rooms::NoopRoomProvider;
    use crate::services::rate_limiter::RateLimiter;

    fn lifecycle() -> (Arc<Store>, CallLifecycle) {
        let store = Arc::new(Store::new());
        let wallet = Arc::new(WalletService::new(store.clone()));
        let limiter = Arc::new(RateLimiter::new(store.clone()));
        let risk = Arc::new(RiskEngine::new(store.clone()));
        let referral = Arc::new(ReferralEngine::new(store.clone(), wallet.clone(), limiter));
        let lifecycle = CallLifecycle::new(
            store.clone(),
            wallet,
            risk,
            referral,
            Arc::new(NoopRoomProvider),
            Arc::new(InProcessChannelRegistry::new()),
        );
        (store, lifecycle)
    }

    fn start_req() -> StartCallRequest {
        StartCallRequest {
            seeker_id: "s1".to_string(),
            listener_id: "l1".to_string(),
            call_kind: CallKind::Voice,
        }
    }

    fn seed(store: &Arc<Store>, balance: Decimal) {
        store
            .seekers
            .insert("s1", SeekerProfile::new("s1", "Ravi", vec![], vec![]));
        let mut l = ListenerProfile::new("l1", "Meera", vec![], vec![]);
        l.online = true;
        l.last_heartbeat = Some(Utc::now());
        store.listeners.insert("l1", l);

        let wallet = WalletService::new(store.clone());
        wallet.ensure_wallet("s1");
        if balance > Decimal::ZERO {
            wallet.credit("s1", balance, "seed", None).unwrap();
        }
    }

    /// A terminal prior record, so the next start is not a first call.
    fn burn_first_call(store: &Store) {
        store.calls.insert(
            "c0",
            Call {
                id: "c0".to_string(),
                seeker_id: "s1".to_string(),
                listener_id: "l1".to_string(),
                kind: CallKind::Voice,
                rate_per_minute: dec!(1),
                is_first_call: true,
                status: CallStatus::Missed,
                room: None,
                created_at: Utc::now(),
                connected_at: None,
                ended_at: Some(Utc::now()),
                duration_seconds: 0,
                cost: Decimal::ZERO,
            },
        );
    }

    /// Shift an active call's connect time into the past to simulate talk
    /// time without sleeping.
    fn backdate(store: &Store, call_id: &str, seconds: i64) {
        store.calls.update(call_id, |c| {
            c.connected_at = Some(Utc::now() - Duration::seconds(seconds));
        });
    }

    #[tokio::test]
    async fn start_requires_the_minimum_balance() {
        let (store, lc) = lifecycle();
        seed(&store, dec!(3));

        let err = lc.start(&start_req()).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn first_call_freezes_the_discount_rate() {
        let (store, lc) = lifecycle();
        seed(&store, dec!(100));

        let first = lc.start(&start_req()).await.unwrap();
        assert!(first.is_first_call);
        assert_eq!(first.rate_per_minute, dec!(1));
        assert_eq!(first.status, CallStatus::Ringing);

        // Any prior record, terminal or not, clears the flag.
        let second = lc.start(&start_req()).await.unwrap();
        assert!(!second.is_first_call);
        assert_eq!(second.rate_per_minute, dec!(5));
    }

    #[tokio::test]
    async fn start_freezes_a_subscription_discounted_rate() {
        let (store, lc) = lifecycle();
        seed(&store, dec!(100));
        burn_first_call(&store);
        store.subscriptions.put(
            "s1",
            Subscription {
                owner_id: "s1".to_string(),
                discount_percent: dec!(20),
                expires_at: Utc::now() + Duration::days(7),
            },
        );

        // Voice 5/min less 20%.
        let call = lc.start(&start_req()).await.unwrap();
        assert_eq!(call.rate_per_minute, dec!(4.00));
        assert!(!call.is_first_call);

        // An expired subscription is ignored.
        store.subscriptions.put(
            "s1",
            Subscription {
                owner_id: "s1".to_string(),
                discount_percent: dec!(20),
                expires_at: Utc::now() - Duration::days(1),
            },
        );
        let call = lc.start(&start_req()).await.unwrap();
        assert_eq!(call.rate_per_minute, dec!(5));
    }

    #[tokio::test]
    async fn busy_listener_cannot_be_called() {
        let (store, lc) = lifecycle();
        seed(&store, dec!(100));
        store.listeners.update("l1", |l| l.in_call = true);

        assert!(matches!(
            lc.start(&start_req()).await,
            Err(EngineError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn accept_requires_the_called_listener() {
        let (store, lc) = lifecycle();
        seed(&store, dec!(100));
        let call = lc.start(&start_req()).await.unwrap();

        assert!(matches!(
            lc.accept(&call.id, "someone-else").await,
            Err(EngineError::Authorization(_))
        ));
        assert!(matches!(
            lc.end(&call.id, "someone-else").await,
            Err(EngineError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn accept_marks_the_listener_busy() {
        let (store, lc) = lifecycle();
        seed(&store, dec!(100));
        let call = lc.start(&start_req()).await.unwrap();

        let active = lc.accept(&call.id, "l1").await.unwrap();
        assert_eq!(active.status, CallStatus::Active);
        assert!(active.connected_at.is_some());

        let listener = store.listeners.get("l1").unwrap();
        assert!(listener.in_call);
        assert_eq!(listener.answered_count, 1);

        // A second accept loses the conditional update.
        assert!(matches!(
            lc.accept(&call.id, "l1").await,
            Err(EngineError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn full_call_settles_wallet_and_earnings() {
        let (store, lc) = lifecycle();
        seed(&store, dec!(100));
        burn_first_call(&store);

        let call = lc.start(&start_req()).await.unwrap();
        lc.accept(&call.id, "l1").await.unwrap();
        backdate(&store, &call.id, 120);

        let summary = lc.end(&call.id, "s1").await.unwrap();
        assert_eq!(summary.status, CallStatus::Ended);
        assert_eq!(summary.duration_seconds, 120);
        assert_eq!(summary.cost, dec!(10.00));

        let wallet = store.wallets.get("s1").unwrap();
        assert_eq!(wallet.balance, dec!(90.00));

        // 120s voice payout at 3/min.
        let earnings = store.earnings.get("l1").unwrap();
        assert_eq!(earnings.total_earned, dec!(6.00));

        let listener = store.listeners.get("l1").unwrap();
        assert!(!listener.in_call);
        assert_eq!(listener.total_calls, 1);
        assert_eq!(listener.total_seconds, 120);
    }

    #[tokio::test]
    async fn end_is_idempotent() {
        let (store, lc) = lifecycle();
        seed(&store, dec!(100));
        let call = lc.start(&start_req()).await.unwrap();
        lc.accept(&call.id, "l1").await.unwrap();
        backdate(&store, &call.id, 90);

        let first = lc.end(&call.id, "s1").await.unwrap();
        let second = lc.end(&call.id, "l1").await.unwrap();
        assert_eq!(first, second);

        // Exactly one debit despite two end calls.
        let debits = store
            .wallet_ledger
            .count(|e| e.call_id.as_deref() == Some(call.id.as_str()));
        assert_eq!(debits, 1);
    }

    #[tokio::test]
    async fn grace_period_call_is_free() {
        let (store, lc) = lifecycle();
        seed(&store, dec!(100));
        let call = lc.start(&start_req()).await.unwrap();
        lc.accept(&call.id, "l1").await.unwrap();
        backdate(&store, &call.id, 4);

        let summary = lc.end(&call.id, "l1").await.unwrap();
        assert_eq!(summary.cost, dec!(0));
        assert_eq!(store.wallets.get("s1").unwrap().balance, dec!(100));
        // The payout is pro-rated from the first second; only the seeker side
        // has a grace period.
        assert_eq!(store.earnings.get("l1").unwrap().total_earned, dec!(0.20));
    }

    #[tokio::test]
    async fn reject_is_free_and_counts_against_answer_rate() {
        let (store, lc) = lifecycle();
        seed(&store, dec!(100));
        let call = lc.start(&start_req()).await.unwrap();

        let summary = lc.reject(&call.id, "l1").await.unwrap();
        assert_eq!(summary.status, CallStatus::Rejected);
        assert_eq!(summary.cost, dec!(0));

        let listener = store.listeners.get("l1").unwrap();
        assert_eq!(listener.rejected_count, 1);
        assert!(!listener.in_call);
    }

    #[tokio::test]
    async fn ending_a_ringing_call_marks_it_missed() {
        let (store, lc) = lifecycle();
        seed(&store, dec!(100));
        let call = lc.start(&start_req()).await.unwrap();

        let summary = lc.end(&call.id, "s1").await.unwrap();
        assert_eq!(summary.status, CallStatus::Missed);
        assert_eq!(summary.cost, dec!(0));
        assert_eq!(store.wallets.get("s1").unwrap().balance, dec!(100));
    }

    #[tokio::test]
    async fn ring_timeout_sweep_misses_only_stale_calls() {
        let (store, lc) = lifecycle();
        seed(&store, dec!(100));

        let stale = lc.start(&start_req()).await.unwrap();
        store.calls.update(&stale.id, |c| {
            c.created_at = Utc::now() - Duration::seconds(RING_TIMEOUT_SECONDS + 5);
        });
        let fresh = lc.start(&start_req()).await.unwrap();

        assert_eq!(lc.expire_stale_ringing().await, 1);
        assert_eq!(store.calls.get(&stale.id).unwrap().status, CallStatus::Missed);
        assert_eq!(store.calls.get(&fresh.id).unwrap().status, CallStatus::Ringing);
    }

    #[tokio::test]
    async fn shortfall_corrects_the_recorded_cost() {
        let (store, lc) = lifecycle();
        seed(&store, dec!(5));
        // Not a first call, so the standard rate applies.
        burn_first_call(&store);

        let call = lc.start(&start_req()).await.unwrap();
        lc.accept(&call.id, "l1").await.unwrap();
        backdate(&store, &call.id, 600);

        // Priced at 50 but only 5 was collectable.
        let summary = lc.end(&call.id, "s1").await.unwrap();
        assert_eq!(summary.cost, dec!(5));
        assert_eq!(store.wallets.get("s1").unwrap().balance, dec!(0));

        // The listener payout is unaffected by the shortfall.
        let earnings = store.earnings.get("l1").unwrap();
        assert_eq!(earnings.total_earned, dec!(30.00));
    }
}
