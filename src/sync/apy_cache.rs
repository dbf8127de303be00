//! Time-bounded cache of vault APYs.

use std::time::Duration;
use tokio::time::Instant;

use crate::core::protocol::VaultApys;

/// Last fetched APYs, fresh for `ttl`
#[derive(Debug, Clone)]
pub struct ApyCache {
    ttl: Duration,
    entry: Option<(VaultApys, Instant)>,
}

impl ApyCache {
    /// Empty cache
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    /// Cached APYs, if fetched less than `ttl` ago
    pub fn get(&self) -> Option<VaultApys> {
        self.entry
            .filter(|(_, fetched_at)| fetched_at.elapsed() < self.ttl)
            .map(|(apys, _)| apys)
    }

    /// Store freshly fetched APYs
    pub fn store(&mut self, apys: VaultApys) {
        self.entry = Some((apys, Instant::now()));
    }

    /// Drop the cached entry
    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::math::Decimal;

    fn apys() -> VaultApys {
        VaultApys {
            b_amm: Decimal::new(5, 2),
            curve: Decimal::new(3, 2),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires() {
        let mut cache = ApyCache::new(Duration::from_secs(600));
        assert_eq!(cache.get(), None);

        cache.store(apys());
        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(cache.get(), Some(apys()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate() {
        let mut cache = ApyCache::new(Duration::from_secs(600));
        cache.store(apys());
        cache.invalidate();
        assert_eq!(cache.get(), None);
    }
}
