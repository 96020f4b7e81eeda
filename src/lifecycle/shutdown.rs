//! Shutdown coordination.

use std::sync::Arc;

use tokio::sync::watch;

/// One-way stop signal shared by long-running tasks.
///
/// Backed by a watch channel so tasks that subscribe after the trigger
/// still observe it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new, untriggered signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Resolve once `rx` has seen the trigger, or its sender is gone.
///
/// Holds no `watch::Ref` across the await, so the returned future is `Send`
/// and can sit in a `select!` inside a spawned task.
pub async fn triggered(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let mut rx = shutdown.subscribe();
        assert!(rx.wait_for(|stopped| *stopped).await.is_ok());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn triggered_can_be_selected_in_spawned_task() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();

        let waiter = tokio::spawn(async move {
            tokio::select! {
                _ = triggered(&mut rx) => {
                    // Awaiting here keeps the select output alive across a suspension point.
                    tokio::task::yield_now().await;
                    true
                }
                _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => false,
            }
        });

        shutdown.trigger();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn triggered_resolves_when_sender_dropped() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        drop(shutdown);

        tokio::time::timeout(std::time::Duration::from_secs(1), triggered(&mut rx))
            .await
            .unwrap();
    }
}
