//! All-or-nothing refresh of the session snapshot.
//!
//! A refresh reads the raw protocol state, the bLUSD price, the vault APYs,
//! the account's bonds, the protocol stats and the account balances, derives
//! every figure, and only then commits everything under one write lock. A
//! failing read or computation leaves the previous snapshot untouched.
//!
//! Requests that arrive while a refresh is in flight are coalesced into one
//! follow-up, signalled on the shared trigger when the running refresh ends.

use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::chain::provider::ChainDataProvider;
use crate::core::bond::{Bond, Stats};
use crate::core::config::SessionConfig;
use crate::core::protocol::{ProtocolInfo, VaultApys};
use crate::core::token::{Balances, Token};
use crate::engine::metrics::{bond_from_record, build_protocol_info, simulate_protocol_info};
use crate::engine::valuation::marginal_market_price;
use crate::error::{Error, Result};
use crate::session::state::{SessionState, SharedState};
use crate::sync::apy_cache::ApyCache;
use crate::utils::math::Decimal;

/// Result of a refresh request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The snapshot was replaced
    Completed,
    /// Another refresh was in flight; the request is served after it
    Coalesced,
}

/// Everything a refresh commits
struct FreshData {
    info: ProtocolInfo,
    bonds: Vec<Bond>,
    stats: Stats,
    balances: Balances,
}

/// Refreshes the shared session snapshot from the chain
pub struct Synchronizer {
    provider: Arc<dyn ChainDataProvider>,
    state: SharedState,
    config: SessionConfig,
    apy_cache: Mutex<ApyCache>,
    /// Wakes the refresh service for a coalesced follow-up
    trigger: Arc<Notify>,
}

impl Synchronizer {
    /// Create a synchronizer for `config.account`, signalling follow-ups on `trigger`
    pub fn new(
        provider: Arc<dyn ChainDataProvider>,
        state: SharedState,
        config: SessionConfig,
        trigger: Arc<Notify>,
    ) -> Self {
        let apy_cache = Mutex::new(ApyCache::new(config.apy_cache_ttl()));
        Self {
            provider,
            state,
            config,
            apy_cache,
            trigger,
        }
    }

    /// Run one refresh, unless one is already in flight
    pub async fn synchronize(&self) -> Result<SyncOutcome> {
        {
            let mut state = self.state.write().await;
            if state.is_synchronizing {
                state.request_synchronization();
                debug!("Refresh already in flight, request coalesced");
                return Ok(SyncOutcome::Coalesced);
            }
            state.is_synchronizing = true;
            state.resync_requested = false;
        }

        let fetched = self.fetch().await;

        let mut state = self.state.write().await;
        state.is_synchronizing = false;
        let committed = fetched.and_then(|fresh| commit(&mut state, fresh));
        let follow_up = std::mem::take(&mut state.resync_requested);

        let outcome = match committed {
            Ok(()) => {
                state.should_synchronize = follow_up;
                info!(
                    bonds = state.bonds.len(),
                    timestamp = ?state.last_synchronized,
                    "Session synchronized"
                );
                Ok(SyncOutcome::Completed)
            }
            Err(e) => {
                let e = Error::SynchronizationFailure(e.to_string());
                state.should_synchronize = true;
                state.last_error = Some(e.clone());
                warn!(error = %e, "Synchronization failed");
                Err(e)
            }
        };

        if follow_up {
            debug!("Serving coalesced refresh request");
            self.trigger.notify_one();
        }
        outcome
    }

    /// Install a what-if price, kept across refreshes
    pub async fn set_simulated_market_price(&self, price: Decimal) -> Result<()> {
        if !price.is_positive() {
            return Err(Error::InvalidParameter {
                name: "simulated_market_price".into(),
                reason: format!("must be positive, got {}", price),
            });
        }

        let mut state = self.state.write().await;
        let simulated = state
            .protocol_info
            .as_ref()
            .map(|info| simulate_protocol_info(info, price))
            .transpose()?;
        if simulated.is_some() {
            state.simulated_protocol_info = simulated;
        }
        state.simulated_price = Some(price);
        debug!(%price, "Simulated market price set");
        Ok(())
    }

    /// Drop the what-if price; simulated figures follow the live price again
    pub async fn reset_simulated_market_price(&self) {
        let mut state = self.state.write().await;
        state.simulated_price = None;
        state.simulated_protocol_info = state.protocol_info.clone();
        debug!("Simulated market price reset");
    }

    async fn fetch(&self) -> Result<FreshData> {
        let provider = &self.provider;
        let account = &self.config.account;

        let raw = provider.get_protocol_snapshot().await?;
        let market_price = match raw.amm_oracle_price {
            Some(price) => price,
            None => {
                let input = self.config.marginal_quote_input;
                let output = provider.quote_swap(Token::BLusd, input).await?;
                marginal_market_price(input, output)?
            }
        };
        debug!(%market_price, supply = %raw.bond_token_supply, "Protocol snapshot read");

        let apys = self.vault_apys().await;
        let info = build_protocol_info(&raw, market_price, apys.as_ref())?;

        let bonds = provider
            .get_bonds_for_account(account)
            .await?
            .iter()
            .map(|record| bond_from_record(record, &info, raw.timestamp))
            .collect::<Result<Vec<_>>>()?;
        let stats = provider.get_stats().await?;
        let balances = provider.get_balances(account).await?;

        Ok(FreshData {
            info,
            bonds,
            stats,
            balances,
        })
    }

    /// Cached APYs, fetched when stale; `None` when the fetch fails
    async fn vault_apys(&self) -> Option<VaultApys> {
        let mut cache = self.apy_cache.lock().await;
        if let Some(apys) = cache.get() {
            return Some(apys);
        }

        match self.provider.get_vault_apys().await {
            Ok(apys) => {
                cache.store(apys);
                Some(apys)
            }
            Err(e) => {
                warn!(error = %e, "Vault APYs unavailable");
                None
            }
        }
    }
}

fn commit(state: &mut SessionState, fresh: FreshData) -> Result<()> {
    let simulated = match state.simulated_price {
        Some(price) => simulate_protocol_info(&fresh.info, price)?,
        None => fresh.info.clone(),
    };

    state.last_synchronized = Some(fresh.info.snapshot_timestamp);
    state.protocol_info = Some(fresh.info);
    state.simulated_protocol_info = Some(simulated);
    state.bonds = fresh.bonds;
    state.stats = Some(fresh.stats);
    state.balances = Some(fresh.balances);
    state.optimistic_bond = None;
    state.last_error = None;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::memory::InMemoryChain;
    use crate::core::bond::OptimisticBond;
    use crate::core::token::AccountId;
    use std::time::Duration;

    fn setup() -> (Arc<InMemoryChain>, SharedState, Synchronizer) {
        let account = AccountId::from("0xabc");
        let chain = Arc::new(
            InMemoryChain::new(account.clone())
                .with_pool_price(Decimal::new(12, 1))
                .with_apys(VaultApys {
                    b_amm: Decimal::new(5, 2),
                    curve: Decimal::new(3, 2),
                }),
        );
        let state = SessionState::new().shared();
        let synchronizer = Synchronizer::new(
            chain.clone(),
            state.clone(),
            SessionConfig::new(account),
            Arc::new(Notify::new()),
        );
        (chain, state, synchronizer)
    }

    #[tokio::test]
    async fn test_refresh_commits_snapshot() {
        let (_chain, state, synchronizer) = setup();
        state.write().await.optimistic_bond = Some(OptimisticBond::new(Decimal::ONE, 1));

        assert_eq!(synchronizer.synchronize().await.unwrap(), SyncOutcome::Completed);

        let state = state.read().await;
        let info = state.protocol_info.as_ref().unwrap();
        assert_eq!(info.market_price, Decimal::new(12, 1));
        assert!(info.is_bootstrap());
        assert_eq!(state.simulated_protocol_info.as_ref(), Some(info));
        assert!(state.optimistic_bond.is_none());
        assert!(!state.should_synchronize);
        assert!(!state.is_synchronizing);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_snapshot() {
        let (chain, state, synchronizer) = setup();
        synchronizer.synchronize().await.unwrap();
        let before = state.read().await.protocol_info.clone();

        chain.set_reads_failing(true).await;
        let err = synchronizer.synchronize().await.unwrap_err();
        assert!(matches!(err, Error::SynchronizationFailure(_)));
        assert!(err.is_recoverable());
        {
            let state = state.read().await;
            assert_eq!(state.protocol_info, before);
            assert!(state.should_synchronize);
            assert!(!state.is_synchronizing);
            assert!(state.last_error.is_some());
        }

        chain.set_reads_failing(false).await;
        synchronizer.synchronize().await.unwrap();
        let state = state.read().await;
        assert!(state.last_error.is_none());
        assert!(!state.should_synchronize);
    }

    #[tokio::test]
    async fn test_in_flight_refresh_coalesces() {
        let (_chain, state, synchronizer) = setup();
        state.write().await.is_synchronizing = true;

        assert_eq!(synchronizer.synchronize().await.unwrap(), SyncOutcome::Coalesced);
        let state = state.read().await;
        assert!(state.should_synchronize);
        assert!(state.resync_requested);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesced_request_signals_follow_up() {
        let (chain, state, _) = setup();
        let trigger = Arc::new(Notify::new());
        let account = AccountId::from("0xabc");
        let synchronizer = Arc::new(Synchronizer::new(
            chain.clone(),
            state.clone(),
            SessionConfig::new(account),
            trigger.clone(),
        ));
        chain.set_read_latency(Duration::from_secs(2)).await;

        let running = tokio::spawn({
            let synchronizer = Arc::clone(&synchronizer);
            async move { synchronizer.synchronize().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(synchronizer.synchronize().await.unwrap(), SyncOutcome::Coalesced);

        assert_eq!(running.await.unwrap().unwrap(), SyncOutcome::Completed);
        assert!(state.read().await.should_synchronize);
        assert!(!state.read().await.resync_requested);
        assert!(tokio::time::timeout(Duration::from_millis(1), trigger.notified()).await.is_ok());
    }

    #[tokio::test]
    async fn test_uncontended_refresh_does_not_signal() {
        let (chain, state, _) = setup();
        let trigger = Arc::new(Notify::new());
        let synchronizer = Synchronizer::new(
            chain,
            state,
            SessionConfig::new(AccountId::from("0xabc")),
            trigger.clone(),
        );

        synchronizer.synchronize().await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(1), trigger.notified()).await.is_err());
    }

    #[tokio::test]
    async fn test_simulated_override_survives_refresh() {
        let (chain, state, synchronizer) = setup();
        synchronizer.synchronize().await.unwrap();
        synchronizer.set_simulated_market_price(Decimal::from_int(2)).await.unwrap();

        chain.set_pool_price(Decimal::new(15, 1)).await;
        synchronizer.synchronize().await.unwrap();
        {
            let state = state.read().await;
            let live = state.protocol_info.as_ref().unwrap();
            assert_eq!(live.market_price, Decimal::new(15, 1));
            assert_eq!(live.simulated_market_price, live.market_price);
            let simulated = state.simulated_protocol_info.as_ref().unwrap();
            assert_eq!(simulated.simulated_market_price, Decimal::from_int(2));
        }

        assert!(synchronizer.set_simulated_market_price(Decimal::ZERO).await.is_err());
        synchronizer.reset_simulated_market_price().await;
        let state = state.read().await;
        assert_eq!(state.simulated_price, None);
        assert_eq!(state.simulated_protocol_info, state.protocol_info);
    }

    #[tokio::test]
    async fn test_apys_are_cached() {
        let (chain, _state, synchronizer) = setup();
        synchronizer.synchronize().await.unwrap();
        synchronizer.synchronize().await.unwrap();
        assert_eq!(chain.calls().await.apy_reads, 1);
        assert_eq!(chain.calls().await.snapshot_reads, 2);
    }
}
