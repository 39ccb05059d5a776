// src/services/mod.rs
pub mod billing;
pub mod call_lifecycle;
pub mod matching;
pub mod rate_limiter;
pub mod referral;
pub mod risk;
pub mod wallet;

pub use call_lifecycle::CallLifecycle;
pub use matching::MatchingEngine;
pub use rate_limiter::RateLimiter;
pub use referral::ReferralEngine;
pub use risk::RiskEngine;
pub use wallet::{DebitOutcome, WalletService};
