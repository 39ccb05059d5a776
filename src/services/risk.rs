// src/services/risk.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::models::{Call, CallStatus, FlagStatus, RiskFlag, RiskFlagKind};
use crate::services::matching::day_start;
use crate::store::Store;

const SHORT_CALL_MAX_SECONDS: i64 = 60;
const SHORT_CALL_WINDOW_MINUTES: i64 = 15;
const SHORT_CALL_THRESHOLD: usize = 3;
const PAIR_OVERCALL_THRESHOLD: usize = 3;
const PAIR_OVERMINUTES_SECONDS: i64 = 60 * 60;
const SILENCE_MIN_SECONDS: i64 = 5;
const SILENCE_MAX_SECONDS: i64 = 30;
const SILENCE_PRIOR_FLAGS: usize = 2;
/// Active flags (cumulative, all kinds) before a seeker is shadow-limited.
const SHADOW_LIMIT_FLAG_COUNT: usize = 5;

/// Post-call heuristic scan. Runs once per call that reached `ended` with
/// talk time, as fire-and-forget work after settlement.
pub struct RiskEngine {
    store: Arc<Store>,
}

impl RiskEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn scan_call(&self, call: &Call, now: DateTime<Utc>) {
        if call.status != CallStatus::Ended || call.duration_seconds <= 0 {
            return;
        }

        let mut flags: Vec<RiskFlag> = Vec::new();
        let today = day_start(now);

        let seeker_ended = self
            .store
            .calls
            .find(|c| c.seeker_id == call.seeker_id && c.status == CallStatus::Ended);

        // short_call_spam: three or more sub-minute calls in the trailing
        // window, the current call included.
        let window_floor = now - Duration::minutes(SHORT_CALL_WINDOW_MINUTES);
        let short_recent = seeker_ended
            .iter()
            .filter(|c| {
                c.duration_seconds > 0
                    && c.duration_seconds < SHORT_CALL_MAX_SECONDS
                    && c.ended_at.map_or(false, |t| t >= window_floor)
            })
            .count();
        if short_recent >= SHORT_CALL_THRESHOLD {
            flags.push(RiskFlag::new(
                &call.seeker_id,
                RiskFlagKind::ShortCallSpam,
                format!("{} sub-60s calls within {} minutes", short_recent, SHORT_CALL_WINDOW_MINUTES),
                &call.id,
            ));
        }

        // Pair volume since midnight.
        let pair_today: Vec<&Call> = seeker_ended
            .iter()
            .filter(|c| c.listener_id == call.listener_id && c.ended_at.map_or(false, |t| t >= today))
            .collect();
        if pair_today.len() > PAIR_OVERCALL_THRESHOLD {
            flags.push(RiskFlag::new(
                &call.seeker_id,
                RiskFlagKind::PairOvercall,
                format!(
                    "{} completed calls with listener {} today",
                    pair_today.len(),
                    call.listener_id
                ),
                &call.id,
            ));
        }
        let pair_seconds: i64 = pair_today.iter().map(|c| c.duration_seconds).sum();
        if pair_seconds > PAIR_OVERMINUTES_SECONDS {
            flags.push(RiskFlag::new(
                &call.seeker_id,
                RiskFlagKind::PairOverminutes,
                format!(
                    "{}s cumulative with listener {} today",
                    pair_seconds, call.listener_id
                ),
                &call.id,
            ));
        }

        // silence_farming: a call short enough to look like farming, from a
        // seeker already flagged for it twice today.
        if call.duration_seconds > SILENCE_MIN_SECONDS && call.duration_seconds < SILENCE_MAX_SECONDS {
            let prior_silence = self.store.risk_flags.count(|f| {
                f.subject_id == call.seeker_id
                    && f.kind == RiskFlagKind::SilenceFarming
                    && f.status == FlagStatus::Active
                    && f.created_at >= today
            });
            if prior_silence >= SILENCE_PRIOR_FLAGS {
                flags.push(RiskFlag::new(
                    &call.seeker_id,
                    RiskFlagKind::SilenceFarming,
                    format!(
                        "{}s call with {} prior silence flags today",
                        call.duration_seconds, prior_silence
                    ),
                    &call.id,
                ));
            }
        }

        for flag in flags {
            warn!(
                "Risk flag {} for seeker {} on call {}: {}",
                flag.kind.as_str(),
                flag.subject_id,
                call.id,
                flag.description
            );
            self.store.risk_flags.insert(&flag.id.clone(), flag);
        }

        self.apply_shadow_limit(&call.seeker_id);
    }

    /// Restriction is covert: the profile flag only changes what matching
    /// answers, never what the seeker is told.
    fn apply_shadow_limit(&self, seeker_id: &str) {
        let active = self
            .store
            .risk_flags
            .count(|f| f.subject_id == seeker_id && f.status == FlagStatus::Active);
        if active < SHADOW_LIMIT_FLAG_COUNT {
            return;
        }

        let applied = self.store.seekers.update_if(
            seeker_id,
            |s| !s.shadow_limited,
            |s| s.shadow_limited = true,
        );
        if applied {
            info!(
                "Seeker {} shadow-limited ({} active risk flags)",
                seeker_id, active
            );
        }
    }
}
