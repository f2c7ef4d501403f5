use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use timemux::{ClientId, Notifier};

#[derive(Debug)]
struct Inner {
    /// Notifications per client not yet consumed by [`CondvarNotifier::wait`].
    pending: Mutex<Vec<u64>>,
    ready: Condvar,
}

/// In-process notification channel: one counter per client, woken through a shared condvar.
///
/// Clones share state, so the server gets one handle and client threads wait on others.
#[derive(Debug, Clone)]
pub struct CondvarNotifier {
    inner: Arc<Inner>,
}

impl CondvarNotifier {
    pub fn new(client_count: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(vec![0; client_count]),
                ready: Condvar::new(),
            }),
        }
    }

    /// Notifications delivered to `client` since its last [`wait`](Self::wait).
    pub fn pending(&self, client: ClientId) -> u64 {
        self.lock()
            .get(client.index() as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Blocks until `client` has been notified at least once or `timeout` passes, then
    /// consumes and returns its pending notification count.
    pub fn wait(&self, client: ClientId, timeout: Duration) -> u64 {
        let idx = client.index() as usize;
        let guard = self.lock();
        if idx >= guard.len() {
            return 0;
        }
        let (mut guard, _) = self
            .inner
            .ready
            .wait_timeout_while(guard, timeout, |pending| pending[idx] == 0)
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut guard[idx])
    }

    // Counters stay consistent across a panic elsewhere, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Vec<u64>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Notifier for CondvarNotifier {
    fn notify(&self, client: ClientId) {
        let mut pending = self.lock();
        match pending.get_mut(client.index() as usize) {
            Some(count) => *count += 1,
            None => {
                tracing::warn!(%client, "notification for unknown client dropped");
                return;
            }
        }
        drop(pending);
        self.inner.ready.notify_all();
    }
}
