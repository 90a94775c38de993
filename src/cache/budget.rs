//! Memory budget of the decoded-message cache.

use crate::config::CacheConfig;
use crate::resources::DeviceResources;

/// How much the cache may hold and how many rows a build reads at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheBudget {
    /// Upper bound on [`CachedMessage::heap_size`](super::CachedMessage::heap_size) totals.
    pub max_bytes: u64,
    /// Rows fetched from the index per build batch.
    pub batch_size: usize,
}

impl CacheBudget {
    pub fn new(max_bytes: u64, batch_size: usize) -> Self {
        Self {
            max_bytes,
            batch_size: batch_size.max(1),
        }
    }

    /// `max_bytes = memory × heap_fraction`, `batch_size = max_bytes / message_size_estimate`.
    ///
    /// Falls back to `config.memory_limit` when the device reports no memory.
    pub fn from_resources(resources: &dyn DeviceResources, config: &CacheConfig) -> Self {
        let memory = match resources.total_available_memory() {
            0 => config.memory_limit,
            m => m,
        };
        let fraction = config.heap_fraction.clamp(0.0, 1.0);
        let max_bytes = (memory as f64 * fraction) as u64;
        let batch_size = max_bytes / config.message_size_estimate.max(1);
        Self::new(max_bytes, batch_size.min(usize::MAX as u64) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::FixedResources;

    #[test]
    fn test_budget_from_memory() {
        let res = FixedResources {
            memory: 1_000_000_000,
            disk: 0,
        };
        let budget = CacheBudget::from_resources(&res, &CacheConfig::default());
        assert_eq!(budget.max_bytes, 200_000_000);
        assert_eq!(budget.batch_size, 14_285);
    }

    #[test]
    fn test_unknown_memory_uses_configured_limit() {
        let res = FixedResources { memory: 0, disk: 0 };
        let config = CacheConfig {
            memory_limit: 100_000,
            ..CacheConfig::default()
        };
        let budget = CacheBudget::from_resources(&res, &config);
        assert_eq!(budget.max_bytes, 20_000);
        // Never zero, or a build would make no progress.
        assert_eq!(budget.batch_size, 1);
    }
}
