//! Worker pool subsystem.
//!
//! # Data Flow
//! ```text
//! Listener accept
//!     → WorkerPool::submit (non-blocking)
//!         queue has room → bounded queue → one of N workers
//!         queue full     → 503 "Server busy", connection closed
//!     → worker.rs (TLS handshake, HTTP/1.1 driver, dispatch)
//! ```
//!
//! # Design Decisions
//! - Fixed number of workers; a panicking connection never shrinks the pool
//! - Queue capacity is the only buffering; the accept loop never waits
//! - Drain closes the queue, finishes queued work, then waits with a deadline

pub mod worker;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures_util::future::join_all;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::config::WorkerConfig;
use crate::http::dispatch::Dispatcher;
use crate::lifecycle::Shutdown;
use crate::net::IncomingConnection;
use crate::observability::metrics;

pub use worker::{ConnectionSettings, SERVER_NAME};
use worker::Worker;

/// A queued connection waiting for a worker.
pub type WorkItem = IncomingConnection;

/// Fixed wire response for connections refused under load.
pub const BUSY_RESPONSE: &[u8] = b"HTTP/1.1 503 Service Unavailable\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Length: 12\r\n\
Retry-After: 1\r\n\
Connection: close\r\n\
\r\n\
Server busy\n";

/// N workers sharing one bounded queue.
pub struct WorkerPool {
    queue: ArcSwapOption<mpsc::Sender<WorkItem>>,
    drain: Shutdown,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
    capacity: usize,
    handshake_timeout: Duration,
}

impl WorkerPool {
    /// Spawn `config.count` workers on the current runtime.
    pub fn start(
        dispatcher: Dispatcher,
        config: &WorkerConfig,
        settings: ConnectionSettings,
    ) -> Self {
        let size = config.count.max(1);
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let queue = Arc::new(tokio::sync::Mutex::new(rx));
        let dispatcher = Arc::new(dispatcher);
        let drain = Shutdown::new();

        let workers = (0..size)
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: Arc::clone(&queue),
                    dispatcher: Arc::clone(&dispatcher),
                    settings,
                    drain: drain.subscribe(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        tracing::info!(workers = size, queue_capacity = capacity, "Worker pool started");

        Self {
            queue: ArcSwapOption::from_pointee(tx),
            drain,
            workers: Mutex::new(workers),
            size,
            capacity,
            handshake_timeout: settings.handshake_timeout,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue a connection, or refuse it right away if the queue is full.
    pub fn submit(&self, item: WorkItem) {
        let guard = self.queue.load();
        let Some(queue) = &*guard else {
            self.reject(item, "draining");
            return;
        };

        match queue.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(item)) => self.reject(item, "queue full"),
            Err(TrySendError::Closed(item)) => self.reject(item, "closed"),
        }
    }

    /// Answer with 503 and close, off the accept path.
    fn reject(&self, item: WorkItem, reason: &'static str) {
        metrics::record_pool_rejection();
        tracing::warn!(
            peer_addr = %item.peer_addr(),
            reason,
            "Worker pool saturated, refusing connection"
        );

        let handshake_timeout = self.handshake_timeout;
        tokio::spawn(async move {
            let mut connection = match item.negotiate(handshake_timeout).await {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::debug!(error = %e, "Refused connection failed setup");
                    return;
                }
            };

            if let Err(e) = connection.stream.write_all(BUSY_RESPONSE).await {
                tracing::debug!(error = %e, "Failed to write busy response");
                return;
            }
            let _ = connection.stream.shutdown().await;

            // Consume what the client already sent so the close is not a reset.
            let mut sink = [0u8; 1024];
            let _ = tokio::time::timeout(Duration::from_millis(500), async {
                while let Ok(n) = connection.stream.read(&mut sink).await {
                    if n == 0 {
                        break;
                    }
                }
            })
            .await;
        });
    }

    /// Stop taking work, let queued and in-flight connections finish.
    ///
    /// Returns `false` if workers were still busy at the deadline; they are
    /// aborted.
    pub async fn drain(&self, timeout: Duration) -> bool {
        // Dropping the sender closes the queue once the last guard is gone.
        self.queue.store(None);
        self.drain.trigger();

        let handles = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *workers)
        };
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        match tokio::time::timeout(timeout, join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "Worker ended abnormally");
                    }
                }
                tracing::info!("Worker pool drained");
                true
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "Drain deadline reached, aborting workers"
                );
                for abort in aborts {
                    abort.abort();
                }
                false
            }
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
