//! Monitor registry (spec §5: "at most one monitor instance exists per
//! `payment_id` at any time")
//!
//! An in-memory map guarded by a mutex, one of the three mechanisms the
//! spec names explicitly ("OS process ownership, a lock file, or an
//! in-memory registry"). Since every monitor runs as a detached `tokio`
//! task inside this process, this is the simplest correct option.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Clone, Default)]
pub struct MonitorRegistry {
    inner: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` for `payment_id`, replacing (and letting drop
    /// abort) any previous handle for the same id. Returns `false` if a
    /// still-running monitor already owned this payment.
    pub async fn spawn_guarded(&self, payment_id: String, handle: JoinHandle<()>) -> bool {
        let mut guard = self.inner.lock().await;
        if let Some(existing) = guard.get(&payment_id) {
            if !existing.is_finished() {
                handle.abort();
                return false;
            }
        }
        guard.insert(payment_id, handle);
        true
    }

    pub async fn is_active(&self, payment_id: &str) -> bool {
        let guard = self.inner.lock().await;
        guard.get(payment_id).map(|h| !h.is_finished()).unwrap_or(false)
    }

    pub async fn active_count(&self) -> usize {
        let guard = self.inner.lock().await;
        guard.values().filter(|h| !h.is_finished()).count()
    }

    /// Drop finished handles so the map does not grow unbounded over a long
    /// process lifetime.
    pub async fn reap(&self) {
        let mut guard = self.inner.lock().await;
        guard.retain(|_, h| !h.is_finished());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_spawn_for_same_payment_is_rejected_while_active() {
        let registry = MonitorRegistry::new();
        let h1 = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        });
        assert!(registry.spawn_guarded("pay_1".into(), h1).await);

        let h2 = tokio::spawn(async {});
        let accepted = registry.spawn_guarded("pay_1".into(), h2).await;
        assert!(!accepted);
        assert!(registry.is_active("pay_1").await);
    }

    #[tokio::test]
    async fn test_spawn_allowed_after_previous_monitor_finished() {
        let registry = MonitorRegistry::new();
        let h1 = tokio::spawn(async {});
        registry.spawn_guarded("pay_1".into(), h1).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let h2 = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        });
        assert!(registry.spawn_guarded("pay_1".into(), h2).await);
    }
}
