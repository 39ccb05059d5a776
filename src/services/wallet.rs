// src/services/wallet.rs
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::models::{
    EarningKind, EarningsEntry, EntryDirection, LedgerEntry, ListenerEarnings, WalletAccount,
};
use crate::store::Store;

/// Recharge packs are treated as already-settled credits; gateway integration
/// lives outside the engine.
static RECHARGE_PACKS: Lazy<HashMap<&'static str, Decimal>> = Lazy::new(|| {
    HashMap::from([
        ("pack_99", Decimal::from(99)),
        ("pack_299", Decimal::from(299)),
        ("pack_699", Decimal::from(699)),
    ])
});

/// Outcome of a debit attempt. `charged < requested` means the partial-charge
/// fallback ran and the caller should correct any recorded cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebitOutcome {
    pub charged: Decimal,
    pub shortfall: Decimal,
}

pub struct WalletService {
    store: Arc<Store>,
}

impl WalletService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn ensure_wallet(&self, owner_id: &str) {
        self.store.wallets.insert(owner_id, WalletAccount::new(owner_id));
    }

    pub fn ensure_earnings(&self, owner_id: &str) {
        self.store.earnings.insert(owner_id, ListenerEarnings::new(owner_id));
    }

    pub fn balance(&self, owner_id: &str) -> Result<Decimal, EngineError> {
        self.store
            .wallets
            .get(owner_id)
            .map(|w| w.balance)
            .ok_or(EngineError::NotFound("wallet"))
    }

    /// Debit with the balance-non-negative guarantee.
    ///
    /// The happy path is a single conditional update requiring
    /// `balance >= amount`. If that condition fails (a concurrent debit got
    /// there first), fall back to a partial charge: charge whatever is still
    /// available, clamp the balance at zero, and report the shortfall so the
    /// caller can correct the call's recorded cost. The platform absorbs the
    /// gap; the invariant holds.
    pub fn debit(
        &self,
        owner_id: &str,
        amount: Decimal,
        reason: &str,
        call_id: Option<&str>,
    ) -> Result<DebitOutcome, EngineError> {
        if amount < Decimal::ZERO {
            return Err(EngineError::Validation("debit amount must be non-negative".into()));
        }
        if amount == Decimal::ZERO {
            return Ok(DebitOutcome { charged: Decimal::ZERO, shortfall: Decimal::ZERO });
        }

        let applied = self
            .store
            .wallets
            .update_if(owner_id, |w| w.balance >= amount, |w| w.balance -= amount);

        if applied {
            self.append_ledger(owner_id, EntryDirection::Debit, amount, reason, call_id);
            return Ok(DebitOutcome { charged: amount, shortfall: Decimal::ZERO });
        }

        // Partial charge: retry against the exact balance we observed until a
        // conditional update lands.
        loop {
            let wallet = self
                .store
                .wallets
                .get(owner_id)
                .ok_or(EngineError::NotFound("wallet"))?;
            let available = wallet.balance.max(Decimal::ZERO);
            let charge = amount.min(available);

            let observed = wallet.balance;
            let applied = self.store.wallets.update_if(
                owner_id,
                |w| w.balance == observed,
                |w| w.balance = (w.balance - charge).max(Decimal::ZERO),
            );
            if !applied {
                continue;
            }

            let shortfall = amount - charge;
            warn!(
                "Wallet shortfall for {}: requested {}, charged {} (gap {})",
                owner_id, amount, charge, shortfall
            );
            if charge > Decimal::ZERO {
                self.append_ledger(owner_id, EntryDirection::Debit, charge, reason, call_id);
            }
            return Ok(DebitOutcome { charged: charge, shortfall });
        }
    }

    /// Unconditional credit, always paired with a ledger entry.
    pub fn credit(
        &self,
        owner_id: &str,
        amount: Decimal,
        reason: &str,
        call_id: Option<&str>,
    ) -> Result<Decimal, EngineError> {
        if amount < Decimal::ZERO {
            return Err(EngineError::Validation("credit amount must be non-negative".into()));
        }

        self.store.wallets.mutate(
            owner_id,
            || WalletAccount::new(owner_id),
            |w| w.balance += amount,
        );
        self.append_ledger(owner_id, EntryDirection::Credit, amount, reason, call_id);

        self.balance(owner_id)
    }

    pub fn recharge(&self, owner_id: &str, pack_id: &str) -> Result<Decimal, EngineError> {
        let amount = RECHARGE_PACKS
            .get(pack_id)
            .copied()
            .ok_or_else(|| EngineError::Validation(format!("unknown pack: {}", pack_id)))?;

        let new_balance = self.credit(owner_id, amount, &format!("Recharge {}", pack_id), None)?;
        info!("Recharged {} with {} (balance now {})", owner_id, amount, new_balance);
        Ok(new_balance)
    }

    /// Listener-side accrual: earnings, referral bonuses/commissions, tips.
    pub fn credit_earnings(
        &self,
        owner_id: &str,
        kind: EarningKind,
        amount: Decimal,
        description: &str,
        call_id: Option<&str>,
    ) {
        if amount <= Decimal::ZERO {
            return;
        }

        self.store.earnings.mutate(
            owner_id,
            || ListenerEarnings::new(owner_id),
            |e| {
                e.total_earned += amount;
                e.pending_balance += amount;
            },
        );

        let entry = EarningsEntry::new(owner_id, kind, amount, description, call_id);
        self.store.earnings_ledger.insert(&entry.id.clone(), entry);
    }

    /// Direct seeker-to-listener appreciation. Unlike call settlement there
    /// is no partial fallback: a tip either fits the balance or is rejected.
    pub fn tip(
        &self,
        seeker_id: &str,
        listener_id: &str,
        amount: Decimal,
        call_id: Option<&str>,
    ) -> Result<Decimal, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::Validation("tip amount must be positive".into()));
        }

        let applied = self
            .store
            .wallets
            .update_if(seeker_id, |w| w.balance >= amount, |w| w.balance -= amount);
        if !applied {
            let available = self.balance(seeker_id)?;
            return Err(EngineError::InsufficientFunds {
                required: amount.to_string(),
                available: available.to_string(),
            });
        }

        self.append_ledger(seeker_id, EntryDirection::Debit, amount, "Tip", call_id);
        self.credit_earnings(listener_id, EarningKind::Tip, amount, "Tip received", call_id);
        info!("Tip of {} from {} to {}", amount, seeker_id, listener_id);
        self.balance(seeker_id)
    }

    /// Move accrued earnings out for payout. Conditional on sufficient
    /// pending balance; the external payout rail is out of scope, so a
    /// withdrawal is recorded as settled immediately.
    pub fn withdraw_earnings(
        &self,
        owner_id: &str,
        amount: Decimal,
    ) -> Result<ListenerEarnings, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::Validation("withdrawal amount must be positive".into()));
        }

        let earnings = self
            .store
            .earnings
            .get(owner_id)
            .ok_or(EngineError::NotFound("earnings account"))?;

        let applied = self.store.earnings.update_if(
            owner_id,
            |e| e.pending_balance >= amount,
            |e| {
                e.pending_balance -= amount;
                e.withdrawn += amount;
            },
        );
        if !applied {
            return Err(EngineError::InsufficientFunds {
                required: amount.to_string(),
                available: earnings.pending_balance.to_string(),
            });
        }

        info!("Withdrawal of {} by {}", amount, owner_id);
        self.store
            .earnings
            .get(owner_id)
            .ok_or(EngineError::NotFound("earnings account"))
    }

    pub fn transactions(&self, owner_id: &str) -> Vec<LedgerEntry> {
        let mut entries = self.store.wallet_ledger.find(|e| e.owner_id == owner_id);
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    fn append_ledger(
        &self,
        owner_id: &str,
        direction: EntryDirection,
        amount: Decimal,
        reason: &str,
        call_id: Option<&str>,
    ) {
        let entry = LedgerEntry::new(owner_id, direction, amount, reason, call_id);
        self.store.wallet_ledger.insert(&entry.id.clone(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn service() -> WalletService {
        WalletService::new(Arc::new(Store::new()))
    }

    #[test]
    fn debit_within_balance_is_exact() {
        let svc = service();
        svc.ensure_wallet("s1");
        svc.credit("s1", dec!(50), "Recharge", None).unwrap();

        let outcome = svc.debit("s1", dec!(12.34), "Call", Some("c1")).unwrap();
        assert_eq!(outcome.charged, dec!(12.34));
        assert_eq!(outcome.shortfall, dec!(0));
        assert_eq!(svc.balance("s1").unwrap(), dec!(37.66));
    }

    #[test]
    fn overdraw_falls_back_to_partial_charge() {
        let svc = service();
        svc.ensure_wallet("s1");
        svc.credit("s1", dec!(3), "Recharge", None).unwrap();

        let outcome = svc.debit("s1", dec!(7), "Call", Some("c1")).unwrap();
        assert_eq!(outcome.charged, dec!(3));
        assert_eq!(outcome.shortfall, dec!(4));
        assert_eq!(svc.balance("s1").unwrap(), dec!(0));
    }

    #[test]
    fn zero_debit_writes_no_ledger_entry() {
        let svc = service();
        svc.ensure_wallet("s1");
        svc.debit("s1", dec!(0), "Call", None).unwrap();
        assert!(svc.transactions("s1").is_empty());
    }

    #[test]
    fn every_movement_has_a_ledger_entry() {
        let svc = service();
        svc.ensure_wallet("s1");
        svc.credit("s1", dec!(99), "Recharge pack_99", None).unwrap();
        svc.debit("s1", dec!(10), "Call (voice) - 120s", Some("c1")).unwrap();

        let txns = svc.transactions("s1");
        assert_eq!(txns.len(), 2);
        // Ledger total reconciles with the cached balance.
        let net: Decimal = txns
            .iter()
            .map(|t| match t.direction {
                EntryDirection::Credit => t.amount,
                EntryDirection::Debit => -t.amount,
            })
            .sum();
        assert_eq!(net, svc.balance("s1").unwrap());
    }

    #[test]
    fn unknown_recharge_pack_is_rejected() {
        let svc = service();
        svc.ensure_wallet("s1");
        assert!(matches!(
            svc.recharge("s1", "pack_1"),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn tip_moves_money_or_fails_whole() {
        let svc = service();
        svc.ensure_wallet("s1");
        svc.credit("s1", dec!(10), "Recharge", None).unwrap();

        let balance = svc.tip("s1", "l1", dec!(7), Some("c1")).unwrap();
        assert_eq!(balance, dec!(3));
        assert_eq!(svc.store.earnings.get("l1").unwrap().total_earned, dec!(7));

        // No partial fallback for tips.
        assert!(matches!(
            svc.tip("s1", "l1", dec!(4), None),
            Err(EngineError::InsufficientFunds { .. })
        ));
        assert_eq!(svc.balance("s1").unwrap(), dec!(3));
    }

    #[test]
    fn withdrawal_moves_pending_to_withdrawn() {
        let svc = service();
        svc.ensure_earnings("l1");
        svc.credit_earnings("l1", EarningKind::CallEarning, dec!(50), "Call earning", Some("c1"));

        let earnings = svc.withdraw_earnings("l1", dec!(30)).unwrap();
        assert_eq!(earnings.pending_balance, dec!(20));
        assert_eq!(earnings.withdrawn, dec!(30));
        // Lifetime total is untouched by withdrawals.
        assert_eq!(earnings.total_earned, dec!(50));

        assert!(matches!(
            svc.withdraw_earnings("l1", dec!(25)),
            Err(EngineError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            svc.withdraw_earnings("l1", dec!(0)),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            svc.withdraw_earnings("ghost", dec!(1)),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn earnings_accrue_with_ledger_mirror() {
        let svc = service();
        svc.ensure_earnings("l1");
        svc.credit_earnings("l1", EarningKind::CallEarning, dec!(4.5), "Call earning - 90s", Some("c1"));
        svc.credit_earnings("l1", EarningKind::ReferralBonus, dec!(200), "Referral bonus", None);

        let earnings = svc.store.earnings.get("l1").unwrap();
        assert_eq!(earnings.total_earned, dec!(204.5));
        assert_eq!(earnings.pending_balance, dec!(204.5));
        assert_eq!(svc.store.earnings_ledger.len(), 2);
    }
}
