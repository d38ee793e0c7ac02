//! The claim-block ledger
//!
//! Every player holds a balance of claim blocks, the currency of region
//! footprint: creating or expanding a region debits its horizontal area,
//! deleting or retracting refunds it. Balances are process-wide state,
//! loaded at startup and flushed at shutdown, and can never go negative:
//! the debit check and the debit itself are one atomic step per account.

use dashmap::DashMap;
use std::collections::BTreeMap;
use tracing::debug;

use freehold_core::PlayerId;

use crate::config::AccrualConfig;
use crate::error::StoreError;

pub struct BlockLedger {
    accounts: DashMap<PlayerId, u64>,
    config: AccrualConfig,
}

impl BlockLedger {
    pub fn new(config: AccrualConfig) -> Self {
        Self {
            accounts: DashMap::new(),
            config,
        }
    }

    /// Current balance; a first touch seeds the initial grant
    pub fn balance(&self, player: &PlayerId) -> u64 {
        *self
            .accounts
            .entry(player.clone())
            .or_insert(self.config.initial_balance)
    }

    /// Withdraw `amount` blocks, or fail leaving the balance untouched
    pub fn try_debit(&self, player: &PlayerId, amount: u64) -> Result<u64, StoreError> {
        let mut entry = self
            .accounts
            .entry(player.clone())
            .or_insert(self.config.initial_balance);
        if *entry < amount {
            return Err(StoreError::InsufficientBalance {
                required: amount,
                available: *entry,
            });
        }
        *entry -= amount;
        debug!(player = %player, amount, balance = *entry, "claim blocks debited");
        Ok(*entry)
    }

    /// Add blocks without a cap (refunds and administrative grants)
    pub fn deposit(&self, player: &PlayerId, amount: u64) -> u64 {
        let mut entry = self
            .accounts
            .entry(player.clone())
            .or_insert(self.config.initial_balance);
        *entry = entry.saturating_add(amount);
        debug!(player = %player, amount, balance = *entry, "claim blocks deposited");
        *entry
    }

    /// Periodic play-time accrual, capped at the configured maximum
    ///
    /// A balance already at or above the cap (from refunds or grants) is
    /// left as it is.
    pub fn accrue(&self, player: &PlayerId) -> u64 {
        let mut entry = self
            .accounts
            .entry(player.clone())
            .or_insert(self.config.initial_balance);
        if *entry < self.config.max_accrued_balance {
            let headroom = self.config.max_accrued_balance - *entry;
            *entry += self.config.blocks_per_tick.min(headroom);
        }
        *entry
    }

    /// One accrual tick for every listed player
    pub fn accrue_all<'a>(&self, players: impl IntoIterator<Item = &'a PlayerId>) {
        for player in players {
            self.accrue(player);
        }
    }

    /// Sorted copy of all balances, for the snapshot layer
    pub fn snapshot(&self) -> BTreeMap<PlayerId, u64> {
        self.accounts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Replace all balances from a persisted snapshot
    pub fn restore(&self, balances: BTreeMap<PlayerId, u64>) {
        self.accounts.clear();
        for (player, balance) in balances {
            self.accounts.insert(player, balance);
        }
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(name: &str) -> PlayerId {
        PlayerId::new(name).unwrap()
    }

    fn make_ledger() -> BlockLedger {
        BlockLedger::new(AccrualConfig {
            blocks_per_tick: 10,
            initial_balance: 100,
            max_accrued_balance: 120,
            ..Default::default()
        })
    }

    #[test]
    fn test_initial_grant_on_first_touch() {
        let ledger = make_ledger();
        assert_eq!(ledger.balance(&player("Alice")), 100);
        assert_eq!(ledger.account_count(), 1);
    }

    #[test]
    fn test_debit_and_refund_restore_balance() {
        let ledger = make_ledger();
        let alice = player("Alice");
        ledger.try_debit(&alice, 40).unwrap();
        assert_eq!(ledger.balance(&alice), 60);
        ledger.deposit(&alice, 40);
        assert_eq!(ledger.balance(&alice), 100);
    }

    #[test]
    fn test_debit_fails_without_mutating() {
        let ledger = make_ledger();
        let alice = player("Alice");
        let err = ledger.try_debit(&alice, 101).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientBalance {
                required: 101,
                available: 100
            }
        ));
        assert_eq!(ledger.balance(&alice), 100);
    }

    #[test]
    fn test_accrual_respects_cap() {
        let ledger = make_ledger();
        let alice = player("Alice");
        assert_eq!(ledger.accrue(&alice), 110);
        assert_eq!(ledger.accrue(&alice), 120);
        // At the cap: no further accrual
        assert_eq!(ledger.accrue(&alice), 120);
        // Deposits ignore the cap
        ledger.deposit(&alice, 50);
        assert_eq!(ledger.balance(&alice), 170);
        assert_eq!(ledger.accrue(&alice), 170);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let ledger = make_ledger();
        ledger.try_debit(&player("Alice"), 30).unwrap();
        ledger.deposit(&player("Bob"), 500);

        let snapshot = ledger.snapshot();
        let restored = make_ledger();
        restored.restore(snapshot);
        assert_eq!(restored.balance(&player("Alice")), 70);
        assert_eq!(restored.balance(&player("Bob")), 600);
    }
}
