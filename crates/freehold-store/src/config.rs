//! Store configuration
//!
//! Plain config structs with documented defaults. Loading these from a
//! file is the job of the embedding server; the store only consumes the
//! values.

use std::collections::BTreeSet;
use std::time::Duration;

use freehold_core::WorldId;

/// What the expiration sweep does with an expired region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiredRegionPolicy {
    /// Delete the region and refund its footprint to the owner
    DeleteAndRefund,
    /// Delete the region, no refund
    Delete,
    /// Leave the region standing; other players may steal it
    MarkStealable,
}

/// Claim-block accrual for online players
#[derive(Debug, Clone)]
pub struct AccrualConfig {
    /// Blocks deposited per accrual tick to each online player
    pub blocks_per_tick: u64,
    /// Time between accrual ticks
    pub tick_interval: Duration,
    /// Balance granted to a player on first contact
    pub initial_balance: u64,
    /// Accrual stops at this balance (manual deposits are uncapped)
    pub max_accrued_balance: u64,
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            blocks_per_tick: 20,
            tick_interval: Duration::from_secs(600), // 10 minutes
            initial_balance: 100,
            max_accrued_balance: 80_000,
        }
    }
}

/// Expiration sweep tuning
#[derive(Debug, Clone)]
pub struct ExpirationConfig {
    /// A player-owned region expires when no qualifying login happened
    /// for this long
    pub inactivity_threshold: Duration,
    /// Expiry and steal are suppressed for this long after a transfer
    pub transfer_grace: Duration,
    /// What the sweep does with expired regions
    pub policy: ExpiredRegionPolicy,
    /// How often the background sweep runs
    pub sweep_interval: Duration,
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold: Duration::from_secs(60 * 86400), // 60 days
            transfer_grace: Duration::from_secs(3600),             // 1 hour
            policy: ExpiredRegionPolicy::DeleteAndRefund,
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

/// Top-level store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Minimum footprint of any region, in blocks
    pub min_claim_area: u64,
    /// Minimum height of a subdivision, in blocks
    pub min_subdivision_height: u64,
    /// Maximum parent-chain depth (1 = top-level only)
    pub max_nesting_depth: usize,
    /// Worlds where claiming is refused outright
    pub unclaimable_worlds: BTreeSet<WorldId>,
    /// How often the autosave task snapshots to disk
    pub autosave_interval: Duration,
    pub accrual: AccrualConfig,
    pub expiration: ExpirationConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            min_claim_area: 100,
            min_subdivision_height: 3,
            max_nesting_depth: 16,
            unclaimable_worlds: BTreeSet::new(),
            autosave_interval: Duration::from_secs(300),
            accrual: AccrualConfig::default(),
            expiration: ExpirationConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = StoreConfig::default();
        assert!(config.min_claim_area > 0);
        assert!(config.max_nesting_depth >= 2);
        assert!(config.expiration.inactivity_threshold > config.expiration.transfer_grace);
        assert_eq!(
            config.expiration.policy,
            ExpiredRegionPolicy::DeleteAndRefund
        );
    }
}
