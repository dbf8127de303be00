//! Bond session.
//!
//! A [`BondSession`] wires the view machine, the synchronizer, the refresh
//! service and the allowance watchers around one [`SharedState`] and one
//! chain provider. Dropping the session stops its background tasks.

pub mod state;

pub use state::{SessionSnapshot, SessionState, SharedState};

use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::chain::provider::ChainDataProvider;
use crate::core::config::SessionConfig;
use crate::core::token::ApprovalKey;
use crate::error::Result;
use crate::sync::approvals::ApprovalWatcher;
use crate::sync::service::SyncService;
use crate::sync::synchronizer::{SyncOutcome, Synchronizer};
use crate::utils::math::Decimal;
use crate::view::machine::BondViewMachine;
use crate::view::transitions::{BondEvent, BondView, EventKind};

/// A running bond session for one account
pub struct BondSession {
    config: SessionConfig,
    state: SharedState,
    machine: BondViewMachine,
    synchronizer: Arc<Synchronizer>,
    watcher: Arc<ApprovalWatcher>,
    service: SyncService,
    service_task: Option<JoinHandle<()>>,
}

impl BondSession {
    /// Start a session: refresh once, then keep refreshing in the background
    ///
    /// A failing mount refresh is logged and retried by the service; it does
    /// not fail the start.
    pub async fn start(provider: Arc<dyn ChainDataProvider>, config: SessionConfig) -> Result<Self> {
        config.validate()?;

        let state = SessionState::new().shared();
        let trigger = Arc::new(Notify::new());
        let machine = BondViewMachine::new(Arc::clone(&provider), Arc::clone(&state), Arc::clone(&trigger));
        let synchronizer = Arc::new(Synchronizer::new(
            Arc::clone(&provider),
            Arc::clone(&state),
            config.clone(),
            Arc::clone(&trigger),
        ));
        let watcher = Arc::new(ApprovalWatcher::new(
            Arc::clone(&provider),
            Arc::clone(&state),
            config.account.clone(),
            config.approval_poll_interval(),
        ));

        if let Err(e) = synchronizer.synchronize().await {
            warn!(account = %config.account, error = %e, "Mount refresh failed");
        }

        let service = SyncService::new(Arc::clone(&synchronizer), trigger, config.sync_interval());
        let service_task = Some(service.start());

        if config.watch_approvals {
            for key in ApprovalKey::all() {
                watcher.watch(key).await;
            }
        }

        info!(account = %config.account, "Bond session started");
        Ok(Self {
            config,
            state,
            machine,
            synchronizer,
            watcher,
            service,
            service_task,
        })
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current view
    pub async fn view(&self) -> BondView {
        self.machine.view().await
    }

    /// Events admissible in the current view
    pub async fn valid_events(&self) -> Vec<EventKind> {
        self.machine.valid_events().await
    }

    /// Dispatch an event to the view machine
    pub async fn dispatch(&self, event: BondEvent) -> Result<BondView> {
        self.machine.dispatch(event).await
    }

    /// Consistent copy of the session state
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.read().await.snapshot()
    }

    /// Refresh now
    pub async fn synchronize(&self) -> Result<SyncOutcome> {
        self.synchronizer.synchronize().await
    }

    /// Install a what-if bLUSD price
    pub async fn set_simulated_market_price(&self, price: Decimal) -> Result<()> {
        self.synchronizer.set_simulated_market_price(price).await
    }

    /// Drop the what-if price
    pub async fn reset_simulated_market_price(&self) {
        self.synchronizer.reset_simulated_market_price().await
    }

    /// Start polling an allowance not watched at start
    pub async fn watch_approval(&self, key: ApprovalKey) -> bool {
        self.watcher.watch(key).await
    }

    /// Stop background tasks and wait for the refresh service to exit
    pub async fn shutdown(mut self) {
        self.service.stop().await;
        self.watcher.shutdown().await;
        if let Some(task) = self.service_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Sync service task ended abnormally");
            }
        }
        info!(account = %self.config.account, "Bond session stopped");
    }
}

impl Drop for BondSession {
    fn drop(&mut self) {
        if let Some(task) = self.service_task.take() {
            task.abort();
        }
        self.watcher.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::memory::InMemoryChain;
    use crate::core::token::AccountId;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_start_refreshes_and_watches() {
        let account = AccountId::from("0xabc");
        let chain = Arc::new(InMemoryChain::new(account.clone()));
        let session = BondSession::start(chain.clone(), SessionConfig::new(account)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1)).await;
        let snapshot = session.snapshot().await;
        assert!(snapshot.protocol_info.is_some());
        assert_eq!(snapshot.approvals.len(), ApprovalKey::all().len());
        assert_eq!(session.view().await, BondView::Idle);

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_survives_failing_mount_refresh() {
        let account = AccountId::from("0xabc");
        let chain = Arc::new(InMemoryChain::new(account.clone()));
        chain.set_reads_failing(true).await;

        let mut config = SessionConfig::new(account);
        config.watch_approvals = false;
        let session = BondSession::start(chain.clone(), config).await.unwrap();
        let snapshot = session.snapshot().await;
        assert!(snapshot.protocol_info.is_none());
        assert!(snapshot.last_error.is_some());
        assert!(snapshot.should_synchronize);

        chain.set_reads_failing(false).await;
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(session.snapshot().await.protocol_info.is_some());
        assert!(snapshot.approvals.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let chain = Arc::new(InMemoryChain::new(AccountId::from("0xabc")));
        let mut config = SessionConfig::new(AccountId::from("0xabc"));
        config.sync_interval_secs = 0;
        assert!(BondSession::start(chain, config).await.is_err());
    }
}
