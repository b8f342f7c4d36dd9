//! Connection pool for the streaming transport.
//!
//! Amortizes connection setup cost and bounds concurrent transport
//! usage. The pool pre-warms a minimum number of clients, grows lazily
//! up to a hard ceiling, and parks callers when every connection is
//! checked out.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            ConnectionPool               │
//! │  idle:    [Client] [Client]             │
//! │  in use:  [Client] [Client] [Client]    │
//! │  waiters: caller ── caller              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! A released client is handed directly to exactly one parked caller,
//! or returned to the idle set; it is never visible as both.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::future::Future;
use std::pin::pin;

use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, info};

use crate::client::Client;
use crate::config::Config;
use crate::error::{Error, Result};

// ============================================================================
// PoolOptions
// ============================================================================

/// Sizing options for a [`ConnectionPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Connections established eagerly when the pool starts.
    pub min_connections: usize,

    /// Hard ceiling on total connections; callers park beyond it.
    pub max_connections: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 8,
        }
    }
}

impl PoolOptions {
    /// Creates options with default sizing.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of pre-warmed connections.
    #[inline]
    #[must_use]
    pub fn with_min_connections(mut self, min: usize) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection ceiling.
    #[inline]
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}

// ============================================================================
// PoolState
// ============================================================================

/// Pool lifecycle; transitions are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    /// Serving acquires.
    Running,
    /// Close requested; draining checked-out connections.
    Closing,
    /// Every connection closed.
    Closed,
}

// ============================================================================
// PoolInner
// ============================================================================

/// Bookkeeping guarded by one mutex.
///
/// Invariant: `idle.len() + checked_out == total <= max_connections`,
/// and a client is never idle and handed to a waiter at the same time.
#[derive(Debug)]
struct PoolInner {
    state: PoolState,
    idle: VecDeque<Client>,
    waiters: VecDeque<oneshot::Sender<Handoff>>,
    total: usize,
    checked_out: usize,
}

// ============================================================================
// ConnectionPool
// ============================================================================

/// A bounded, lazily grown collection of [`Client`]s.
///
/// # Example
///
/// ```ignore
/// let pool = ConnectionPool::connect(config, PoolOptions::new().with_max_connections(4)).await?;
///
/// let value = pool
///     .execute(|client| async move { client.query("SELECT * FROM sensor").await })
///     .await?;
///
/// pool.close().await;
/// ```
#[derive(Debug)]
pub struct ConnectionPool {
    /// Configuration used for every pooled connection.
    config: Config,

    /// Sizing limits.
    options: PoolOptions,

    /// Idle/checked-out bookkeeping and parked callers.
    inner: Mutex<PoolInner>,

    /// Signaled whenever a connection is closed during drain.
    drained: Notify,
}

// ============================================================================
// ConnectionPool - Constructor
// ============================================================================

impl ConnectionPool {
    /// Creates a pool and pre-warms its minimum connections.
    ///
    /// Fails atomically: if any warm connection cannot be established,
    /// the ones already built are closed and the error is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the sizing options are inconsistent
    /// - Any [`Client::connect`] error from pre-warming
    pub async fn connect(config: Config, options: PoolOptions) -> Result<Self> {
        if options.max_connections == 0 {
            return Err(Error::config("max_connections must be at least 1"));
        }
        if options.min_connections > options.max_connections {
            return Err(Error::config(format!(
                "min_connections ({}) exceeds max_connections ({})",
                options.min_connections, options.max_connections
            )));
        }

        let pool = Self {
            config,
            options,
            inner: Mutex::new(PoolInner {
                state: PoolState::Running,
                idle: VecDeque::new(),
                waiters: VecDeque::new(),
                total: 0,
                checked_out: 0,
            }),
            drained: Notify::new(),
        };

        for _ in 0..options.min_connections {
            match Client::connect(&pool.config).await {
                Ok(client) => {
                    let mut inner = pool.inner.lock();
                    inner.idle.push_back(client);
                    inner.total += 1;
                }
                Err(e) => {
                    let warm: Vec<Client> = pool.inner.lock().idle.drain(..).collect();
                    for client in warm {
                        client.close();
                    }
                    return Err(e);
                }
            }
        }

        info!(
            min = options.min_connections,
            max = options.max_connections,
            "connection pool started"
        );

        Ok(pool)
    }
}

// ============================================================================
// ConnectionPool - Acquire / Release
// ============================================================================

/// What `acquire` decided to do while holding the lock.
enum Plan {
    /// An idle client was handed out.
    Ready(Client),
    /// A slot was reserved; establish a new connection.
    Grow,
    /// The pool is at its ceiling; park until a release or a freed slot.
    Wait(oneshot::Receiver<Handoff>),
}

/// What a parked caller receives when it is woken.
#[derive(Debug)]
enum Handoff {
    /// A released client, checked out directly to the waiter.
    Client(Client),
    /// Growth capacity freed by a failed connect; retry the acquire.
    Retry,
}

impl ConnectionPool {
    /// Checks a client out of the pool.
    ///
    /// Returns an idle client immediately when one exists; otherwise
    /// grows the pool if the ceiling allows, or parks the caller until
    /// another caller releases. Parking is unbounded; wrap the call in
    /// a deadline if waiting forever is unacceptable.
    ///
    /// # Errors
    ///
    /// - [`Error::ClientClosed`] if the pool is closing or closed
    /// - Any [`Client::connect`] error when growing
    pub async fn acquire(&self) -> Result<Client> {
        loop {
            let plan = {
                let mut inner = self.inner.lock();

                if inner.state != PoolState::Running {
                    return Err(Error::ClientClosed);
                }

                if let Some(client) = inner.idle.pop_front() {
                    inner.checked_out += 1;
                    Plan::Ready(client)
                } else if inner.total < self.options.max_connections {
                    // Reserve the slot before connecting so concurrent
                    // growth cannot overshoot the ceiling.
                    inner.total += 1;
                    inner.checked_out += 1;
                    Plan::Grow
                } else {
                    let (waiter_tx, waiter_rx) = oneshot::channel();
                    inner.waiters.push_back(waiter_tx);
                    Plan::Wait(waiter_rx)
                }
            };

            match plan {
                Plan::Ready(client) => return Ok(client),

                Plan::Grow => match Client::connect(&self.config).await {
                    Ok(client) => {
                        debug!("pool grew by one connection");
                        return Ok(client);
                    }
                    Err(e) => {
                        self.abandon_growth();
                        return Err(e);
                    }
                },

                Plan::Wait(waiter_rx) => match waiter_rx.await {
                    Ok(Handoff::Client(client)) => return Ok(client),
                    // A failed growth freed its slot; try again.
                    Ok(Handoff::Retry) => continue,
                    // Sender dropped means the pool closed while we waited.
                    Err(_) => return Err(Error::ClientClosed),
                },
            }
        }
    }

    /// Returns a reserved growth slot after a failed connect.
    ///
    /// While running, the freed capacity is handed to one parked caller,
    /// which retries `acquire` and grows the pool itself; otherwise the
    /// waiters were already drained by `close()`. Either way the drain
    /// loop is woken in case this was the last slot it waited for.
    fn abandon_growth(&self) {
        let mut inner = self.inner.lock();
        inner.total = inner.total.saturating_sub(1);
        inner.checked_out = inner.checked_out.saturating_sub(1);

        if inner.state == PoolState::Running {
            while let Some(waiter) = inner.waiters.pop_front() {
                if waiter.send(Handoff::Retry).is_ok() {
                    break;
                }
            }
        }
        drop(inner);

        self.drained.notify_waiters();
    }

    /// Returns a checked-out client to the pool.
    ///
    /// Exactly one parked caller is woken and receives this client, or
    /// it joins the idle set. During close, released clients are closed
    /// instead of reused.
    pub fn release(&self, client: Client) {
        let mut inner = self.inner.lock();
        inner.checked_out = inner.checked_out.saturating_sub(1);

        match inner.state {
            PoolState::Running => {
                let mut client = client;
                loop {
                    match inner.waiters.pop_front() {
                        Some(waiter) => match waiter.send(Handoff::Client(client)) {
                            Ok(()) => {
                                inner.checked_out += 1;
                                return;
                            }
                            // The waiter gave up; try the next one.
                            Err(Handoff::Client(returned)) => client = returned,
                            // send hands back exactly the value it was given
                            Err(Handoff::Retry) => unreachable!(),
                        },
                        None => {
                            inner.idle.push_back(client);
                            return;
                        }
                    }
                }
            }

            PoolState::Closing | PoolState::Closed => {
                inner.total = inner.total.saturating_sub(1);
                drop(inner);

                client.close();
                self.drained.notify_waiters();
            }
        }
    }

    /// Runs `operation` with a pooled client, always releasing it.
    ///
    /// The client goes back to the pool whether the operation succeeds
    /// or fails.
    ///
    /// # Errors
    ///
    /// Any [`acquire`](Self::acquire) error, or the operation's own.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let client = self.acquire().await?;
        let outcome = operation(client.clone()).await;
        self.release(client);
        outcome
    }
}

// ============================================================================
// ConnectionPool - Introspection
// ============================================================================

impl ConnectionPool {
    /// Returns the number of idle clients.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.lock().idle.len()
    }

    /// Returns the total number of clients, idle and checked out.
    #[must_use]
    pub fn total_connections(&self) -> usize {
        self.inner.lock().total
    }

    /// Returns `true` once `close()` has been observed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().state != PoolState::Running
    }
}

// ============================================================================
// ConnectionPool - Lifecycle
// ============================================================================

impl ConnectionPool {
    /// Closes the pool and every connection in it.
    ///
    /// Idle clients are closed immediately and parked acquires fail
    /// with [`Error::ClientClosed`]. Checked-out clients are not
    /// interrupted: each is closed as its caller releases it, and this
    /// method waits until the last one has come back. Idempotent.
    pub async fn close(&self) {
        let (to_close, parked) = {
            let mut inner = self.inner.lock();
            match inner.state {
                PoolState::Running => {
                    inner.state = PoolState::Closing;
                    let idle: Vec<Client> = inner.idle.drain(..).collect();
                    inner.total = inner.total.saturating_sub(idle.len());
                    let parked: Vec<_> = inner.waiters.drain(..).collect();
                    (idle, parked)
                }
                PoolState::Closing | PoolState::Closed => (Vec::new(), Vec::new()),
            }
        };

        for client in to_close {
            client.close();
        }

        // Dropping the senders fails parked acquires.
        drop(parked);

        // Wait for checked-out clients to be released and closed. The
        // waiter is enabled before the recheck so a release landing in
        // between cannot be missed.
        loop {
            let mut drained = pin!(self.drained.notified());
            drained.as_mut().enable();
            if self.inner.lock().checked_out == 0 {
                break;
            }
            drained.await;
        }

        self.inner.lock().state = PoolState::Closed;
        info!("connection pool closed");
    }
}

// ============================================================================
// Tests
// ============================================================================
