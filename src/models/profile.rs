// src/models/profile.rs
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeekerProfile {
    pub id: String,
    pub name: String,
    pub languages: Vec<String>,
    pub intent_tags: Vec<String>,
    /// Covert restriction set by the risk engine. Seekers with this flag get
    /// the same "no listeners available" error as an empty pool.
    pub shadow_limited: bool,
    pub device_fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SeekerProfile {
    pub fn new(id: &str, name: &str, languages: Vec<String>, intent_tags: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            languages,
            intent_tags,
            shadow_limited: false,
            device_fingerprint: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListenerTier {
    New,
    Trusted,
    Elite,
}

impl ListenerTier {
    pub fn score_bonus(&self) -> f64 {
        match self {
            ListenerTier::New => 0.0,
            ListenerTier::Trusted => 2.0,
            ListenerTier::Elite => 4.0,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ListenerTier::New => "new",
            ListenerTier::Trusted => "trusted",
            ListenerTier::Elite => "elite",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerProfile {
    pub id: String,
    pub name: String,
    pub languages: Vec<String>,
    pub topic_tags: Vec<String>,
    pub tier: ListenerTier,
    pub online: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub in_call: bool,
    pub last_matched_at: Option<DateTime<Utc>>,
    pub answered_count: u32,
    pub rejected_count: u32,
    pub total_calls: u64,
    pub total_seconds: i64,
    /// KYC outcome is an opaque attribute owned by an external verifier.
    pub kyc_verified: bool,
    pub referral_code: String,
    pub device_fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ListenerProfile {
    pub fn new(id: &str, name: &str, languages: Vec<String>, topic_tags: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            languages,
            topic_tags,
            tier: ListenerTier::New,
            online: false,
            last_heartbeat: None,
            in_call: false,
            last_matched_at: None,
            answered_count: 0,
            rejected_count: 0,
            total_calls: 0,
            total_seconds: 0,
            kyc_verified: false,
            referral_code: generate_referral_code(),
            device_fingerprint: None,
            created_at: Utc::now(),
        }
    }

    /// Derived from the accept/reject counters, never stored. 0.5 until the
    /// listener has ring history.
    pub fn answer_rate(&self) -> f64 {
        let total = self.answered_count + self.rejected_count;
        if total == 0 {
            0.5
        } else {
            f64::from(self.answered_count) / f64::from(total)
        }
    }
}

pub fn generate_referral_code() -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
