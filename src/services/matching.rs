// src/services/matching.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::models::{ListenerProfile, SeekerProfile};
use crate::store::Store;

/// Heartbeats older than this drop a listener out of the candidate pool.
pub const HEARTBEAT_FRESHNESS_SECONDS: i64 = 90;

const LANGUAGE_WEIGHT: f64 = 10.0;
const TOPIC_WEIGHT: f64 = 3.0;
const ANSWER_RATE_WEIGHT: f64 = 20.0;
const NEVER_MATCHED_BONUS: f64 = 30.0;
const PAIR_REPEAT_PENALTY: f64 = 10.0;
const JITTER_MAX: f64 = 5.0;

/// Scores and selects a listener for a seeker request.
///
/// The tie-break jitter makes selection non-deterministic by design; the RNG
/// is injected and seedable so tests can pin the outcome.
pub struct MatchingEngine {
    store: Arc<Store>,
    rng: Mutex<StdRng>,
}

impl MatchingEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(store: Arc<Store>, seed: u64) -> Self {
        Self {
            store,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// `excluded` carries listeners the seeker already missed or rejected so
    /// a rematch never returns the same one.
    pub async fn match_listener(
        &self,
        seeker_id: &str,
        excluded: &[String],
    ) -> Result<ListenerProfile, EngineError> {
        let seeker = self
            .store
            .seekers
            .get(seeker_id)
            .ok_or(EngineError::NotFound("seeker profile"))?;

        // Shadow-limited seekers get the same answer as an empty pool.
        if seeker.shadow_limited {
            info!("Match refused for shadow-limited seeker {}", seeker_id);
            return Err(EngineError::NoListenersAvailable);
        }

        let now = Utc::now();
        let freshness_floor = now - Duration::seconds(HEARTBEAT_FRESHNESS_SECONDS);

        let pool = self.store.listeners.find(|l| {
            l.online
                && !l.in_call
                && l.last_heartbeat.map_or(false, |h| h >= freshness_floor)
                && !excluded.iter().any(|id| id == &l.id)
        });

        if pool.is_empty() {
            return Err(EngineError::NoListenersAvailable);
        }

        let mut rng = self.rng.lock().await;
        let mut best: Option<(f64, ListenerProfile)> = None;
        for listener in pool {
            let pair_calls = self.pair_calls_today(seeker_id, &listener.id, now);
            let jitter = rng.gen_range(0.0..JITTER_MAX);
            let score = score_candidate(&seeker, &listener, pair_calls, now, jitter);
            debug!(
                "Match candidate {} for {}: score {:.2} (pair calls today {})",
                listener.id, seeker_id, score, pair_calls
            );
            match &best {
                Some((top, _)) if *top >= score => {}
                _ => best = Some((score, listener)),
            }
        }
        drop(rng);

        // Pool was non-empty, so there is always a winner.
        let (score, winner) = best.ok_or(EngineError::NoListenersAvailable)?;

        // Selection stamps the fairness-rotation timestamp; `in_call` is only
        // set on accept, so two concurrent requests may pick the same
        // listener and one of them gets rejected.
        self.store
            .listeners
            .update(&winner.id, |l| l.last_matched_at = Some(now));

        info!(
            "Matched seeker {} with listener {} (score {:.2})",
            seeker_id, winner.id, score
        );
        Ok(winner)
    }

    fn pair_calls_today(&self, seeker_id: &str, listener_id: &str, now: DateTime<Utc>) -> usize {
        let day_start = day_start(now);
        self.store.calls.count(|c| {
            c.seeker_id == seeker_id && c.listener_id == listener_id && c.created_at >= day_start
        })
    }
}

pub fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn overlap(a: &[String], b: &[String]) -> usize {
    a.iter().filter(|x| b.contains(x)).count()
}

fn score_candidate(
    seeker: &SeekerProfile,
    listener: &ListenerProfile,
    pair_calls_today: usize,
    now: DateTime<Utc>,
    jitter: f64,
) -> f64 {
    let language_overlap = overlap(&seeker.languages, &listener.languages) as f64;
    let topic_overlap = overlap(&seeker.intent_tags, &listener.topic_tags) as f64;

    let fairness = match listener.last_matched_at {
        None => NEVER_MATCHED_BONUS,
        Some(at) => {
            let minutes = (now - at).num_minutes().max(0) as f64;
            minutes.min(NEVER_MATCHED_BONUS)
        }
    };

    LANGUAGE_WEIGHT * language_overlap
        + TOPIC_WEIGHT * topic_overlap
        + listener.tier.score_bonus()
        + ANSWER_RATE_WEIGHT * listener.answer_rate()
        + fairness
        - PAIR_REPEAT_PENALTY * pair_calls_today as f64
        + jitter
}
