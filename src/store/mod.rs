// src/store/mod.rs
pub mod collection;

pub use collection::Collection;

use crate::models::{
    Call, EarningsEntry, LedgerEntry, ListenerEarnings, ListenerProfile, RateWindow, Referral,
    RiskFlag, SeekerProfile, Subscription, WalletAccount,
};

/// One collection per entity, mirroring the document layout of the persistent
/// store. The ledgers are append-only: entries are inserted under fresh ids
/// and never updated or deleted.
pub struct Store {
    pub seekers: Collection<SeekerProfile>,
    pub listeners: Collection<ListenerProfile>,
    pub calls: Collection<Call>,
    pub wallets: Collection<WalletAccount>,
    pub wallet_ledger: Collection<LedgerEntry>,
    pub earnings: Collection<ListenerEarnings>,
    pub earnings_ledger: Collection<EarningsEntry>,
    pub risk_flags: Collection<RiskFlag>,
    pub referrals: Collection<Referral>,
    pub subscriptions: Collection<Subscription>,
    pub rate_windows: Collection<RateWindow>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            seekers: Collection::new("seeker_profiles"),
            listeners: Collection::new("listener_profiles"),
            calls: Collection::new("calls"),
            wallets: Collection::new("wallet_accounts"),
            wallet_ledger: Collection::new("wallet_ledger"),
            earnings: Collection::new("listener_earnings"),
            earnings_ledger: Collection::new("listener_earnings_ledger"),
            risk_flags: Collection::new("risk_flags"),
            referrals: Collection::new("referrals"),
            subscriptions: Collection::new("subscriptions"),
            rate_windows: Collection::new("rate_windows"),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
