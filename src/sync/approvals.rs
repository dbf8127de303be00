//! Allowance polling.
//!
//! One background task per watched `(token, spender)` key polls the
//! allowance and writes it into the session state. Watching a key that
//! already has a live task is a no-op.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::chain::provider::ChainDataProvider;
use crate::core::token::{AccountId, ApprovalKey};
use crate::session::state::SharedState;

/// Owner of the allowance polling tasks
pub struct ApprovalWatcher {
    provider: Arc<dyn ChainDataProvider>,
    state: SharedState,
    owner: AccountId,
    poll_interval: Duration,
    tasks: Mutex<HashMap<ApprovalKey, JoinHandle<()>>>,
}

impl ApprovalWatcher {
    /// Create a watcher polling `owner`'s allowances every `poll_interval`
    pub fn new(
        provider: Arc<dyn ChainDataProvider>,
        state: SharedState,
        owner: AccountId,
        poll_interval: Duration,
    ) -> Self {
        Self {
            provider,
            state,
            owner,
            poll_interval,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start polling `key`; returns false if it is already watched
    pub async fn watch(&self, key: ApprovalKey) -> bool {
        let mut tasks = self.tasks.lock().await;
        if tasks.get(&key).is_some_and(|task| !task.is_finished()) {
            debug!(token = %key.token, spender = ?key.spender, "Already watched");
            return false;
        }

        let provider = Arc::clone(&self.provider);
        let state = Arc::clone(&self.state);
        let owner = self.owner.clone();
        let period = self.poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match provider.get_allowance(&owner, key.spender, key.token).await {
                    Ok(allowance) => {
                        state.write().await.approvals.insert(key, allowance);
                    }
                    Err(e) => {
                        warn!(token = %key.token, spender = ?key.spender, error = %e, "Allowance poll failed");
                    }
                }
            }
        });

        tasks.insert(key, task);
        true
    }

    /// Stop polling `key`; returns false if it was not watched
    pub async fn unwatch(&self, key: ApprovalKey) -> bool {
        match self.tasks.lock().await.remove(&key) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Keys with a live polling task
    pub async fn watched(&self) -> Vec<ApprovalKey> {
        let tasks = self.tasks.lock().await;
        let mut keys: Vec<_> = tasks
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .map(|(key, _)| *key)
            .collect();
        keys.sort();
        keys
    }

    /// Stop every polling task
    pub async fn shutdown(&self) {
        for (_, task) in self.tasks.lock().await.drain() {
            task.abort();
        }
    }

    /// Stop every polling task without waiting for the task map lock
    pub(crate) fn abort_all(&self) {
        if let Ok(mut tasks) = self.tasks.try_lock() {
            for (_, task) in tasks.drain() {
                task.abort();
            }
        }
    }
}

impl Drop for ApprovalWatcher {
    fn drop(&mut self) {
        for (_, task) in self.tasks.get_mut().drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::memory::InMemoryChain;
    use crate::chain::provider::{Allowance, ApprovalAmount};
    use crate::core::token::{Spender, Token};
    use crate::session::state::SessionState;

    fn setup() -> (Arc<InMemoryChain>, SharedState, ApprovalWatcher) {
        let account = AccountId::from("0xabc");
        let chain = Arc::new(InMemoryChain::new(account.clone()));
        let state = SessionState::new().shared();
        let watcher = ApprovalWatcher::new(chain.clone(), state.clone(), account, Duration::from_secs(15));
        (chain, state, watcher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_polls_allowance() {
        let (chain, state, watcher) = setup();
        assert!(watcher.watch(ApprovalKey::BOND_CREATION).await);
        assert!(!watcher.watch(ApprovalKey::BOND_CREATION).await);

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(
            state.read().await.approvals.get(&ApprovalKey::BOND_CREATION),
            Some(&Allowance::Amount(Default::default()))
        );

        chain
            .submit_approval(Token::Lusd, Spender::ChickenBondManager, ApprovalAmount::Unlimited)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(
            state.read().await.approvals.get(&ApprovalKey::BOND_CREATION),
            Some(&Allowance::Unlimited)
        );
        assert_eq!(chain.calls().await.allowance_reads, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unwatch_stops_polling() {
        let (chain, _state, watcher) = setup();
        watcher.watch(ApprovalKey::BOND_CREATION).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(watcher.unwatch(ApprovalKey::BOND_CREATION).await);
        assert!(!watcher.unwatch(ApprovalKey::BOND_CREATION).await);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(chain.calls().await.allowance_reads, 1);
        assert!(watcher.watched().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_every_task() {
        let (_chain, _state, watcher) = setup();
        for key in ApprovalKey::all() {
            watcher.watch(key).await;
        }
        assert_eq!(watcher.watched().await.len(), ApprovalKey::all().len());

        watcher.shutdown().await;
        assert!(watcher.watched().await.is_empty());
    }
}
