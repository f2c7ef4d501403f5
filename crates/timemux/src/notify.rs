use crate::client::ClientId;

/// Wakes a client after one of its timers fired.
///
/// Called from the dispatch loop with the server lock held, so implementations must not block
/// or call back into the server.
pub trait Notifier: Send + Sync {
    fn notify(&self, client: ClientId);
}

impl<F> Notifier for F
where
    F: Fn(ClientId) + Send + Sync,
{
    fn notify(&self, client: ClientId) {
        self(client)
    }
}

/// Adapts a transport that addresses clients by badge rather than by index.
///
/// The wrapped callback receives [`ClientId::badge`] of the client to wake.
#[derive(Debug, Clone, Copy, Default)]
pub struct BadgeNotifier<F>(pub F);

impl<F> Notifier for BadgeNotifier<F>
where
    F: Fn(u64) + Send + Sync,
{
    fn notify(&self, client: ClientId) {
        (self.0)(client.badge())
    }
}
