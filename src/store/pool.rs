//! Reference-counted session pool.
//!
//! # Responsibilities
//! - Open a fixed set of sessions to one cluster and close them together
//! - Hand out the least-referenced session on every acquire
//! - Track borrows per session and release them through an RAII lease
//!
//! # Design Decisions
//! - Sessions live in an [`IndexedHeap`] keyed by reference count, so the
//!   least-loaded session is always the root and a release can re-sort the
//!   exact session it touched
//! - One mutex guards the heap; it is never held across driver I/O
//! - An idle session is refreshed before it is handed out again

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::heap::{HeapSlot, IndexedHeap, DETACHED};
use super::session::{DocumentDriver, DocumentSession};
use super::types::{ConnectionError, DialOptions, PoolError};
use crate::observability::metrics;

/// Pool size used when the configured size is zero.
pub const DEFAULT_POOL_SIZE: usize = 100;

/// One session owned by the pool.
#[derive(Debug)]
pub struct PooledSession<S> {
    handle: S,
    ref_count: AtomicUsize,
    pool_index: AtomicUsize,
}

impl<S> PooledSession<S> {
    fn new(handle: S) -> Self {
        Self {
            handle,
            ref_count: AtomicUsize::new(0),
            pool_index: AtomicUsize::new(DETACHED),
        }
    }

    /// Outstanding leases on this session.
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Relaxed)
    }

    /// Current position in the pool heap.
    pub fn pool_index(&self) -> usize {
        self.pool_index.load(Ordering::Relaxed)
    }

    pub fn handle(&self) -> &S {
        &self.handle
    }
}

impl<S> HeapSlot for Arc<PooledSession<S>> {
    fn set_heap_index(&mut self, index: usize) {
        self.pool_index.store(index, Ordering::Relaxed);
    }
}

fn fewer_refs<S>(a: &Arc<PooledSession<S>>, b: &Arc<PooledSession<S>>) -> bool {
    a.ref_count() < b.ref_count()
}

struct PoolState<S> {
    sessions: IndexedHeap<Arc<PooledSession<S>>>,
    closed: bool,
}

/// A fixed-size pool of sessions, load-balanced by reference count.
pub struct SessionPool<S: DocumentSession> {
    state: Mutex<PoolState<S>>,
    address: String,
    size: usize,
}

impl<S: DocumentSession> SessionPool<S> {
    /// Dial the cluster and fork the remaining sessions from the first one.
    pub async fn open<D>(driver: &D, options: &DialOptions) -> Result<Self, ConnectionError>
    where
        D: DocumentDriver<Session = S>,
    {
        let mut size = options.pool_size;
        if size == 0 {
            warn!(
                address = %options.address,
                default = DEFAULT_POOL_SIZE,
                "pool size is zero, using default"
            );
            size = DEFAULT_POOL_SIZE;
        }

        let primary = match timeout(options.dial_timeout, driver.dial(options)).await {
            Ok(dialed) => dialed?,
            Err(_) => {
                return Err(ConnectionError::Timeout {
                    address: options.address.clone(),
                    timeout: options.dial_timeout,
                })
            }
        };

        let forks: Vec<S> = (1..size).map(|_| primary.fork()).collect();
        let sessions = std::iter::once(primary)
            .chain(forks)
            .map(|handle| Arc::new(PooledSession::new(handle)))
            .collect();

        info!(
            address = %options.address,
            pool_size = size,
            read_preference = ?options.read_preference,
            "Session pool opened"
        );

        Ok(Self {
            state: Mutex::new(PoolState {
                sessions: IndexedHeap::new(sessions, fewer_refs::<S>),
                closed: false,
            }),
            address: options.address.clone(),
            size,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Lease the least-referenced session.
    pub fn acquire(&self) -> Result<SessionLease<'_, S>, PoolError> {
        let mut state = self.state.lock();
        if state.closed {
            error!(address = %self.address, "acquire on a closed session pool");
            return Err(PoolError::Closed);
        }

        let Some(session) = state.sessions.peek().cloned() else {
            error!(address = %self.address, "acquire on an empty session pool");
            return Err(PoolError::Empty);
        };

        if session.ref_count() == 0 {
            session.handle.refresh();
        }
        session.ref_count.fetch_add(1, Ordering::Relaxed);
        state.sessions.fix(0);
        drop(state);

        metrics::record_pool_lease(&self.address);
        Ok(SessionLease {
            pool: self,
            session,
        })
    }

    fn release(&self, session: &Arc<PooledSession<S>>) {
        let mut state = self.state.lock();
        let index = session.pool_index();
        let current = session.ref_count();
        if current == 0 {
            error!(
                address = %self.address,
                session = index,
                "release of a session with no outstanding lease"
            );
            return;
        }
        session.ref_count.store(current - 1, Ordering::Relaxed);

        if !state.sessions.fix(index) {
            error!(
                address = %self.address,
                session = index,
                "released session is not tracked by this pool"
            );
        }
    }

    /// Close every session. Outstanding leases are logged, not waited for.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            debug!(address = %self.address, "session pool already closed");
            return;
        }
        state.closed = true;

        for session in state.sessions.iter() {
            session.handle.close();
            let refs = session.ref_count();
            if refs != 0 {
                error!(
                    address = %self.address,
                    session = session.pool_index(),
                    refs,
                    "session still referenced at pool close"
                );
            }
        }
        info!(address = %self.address, "Session pool closed");
    }

    /// Reference counts in heap order; the first entry is the next to lease.
    pub fn stats(&self) -> Vec<usize> {
        self.state
            .lock()
            .sessions
            .iter()
            .map(|s| s.ref_count())
            .collect()
    }
}

/// A borrowed session; released when dropped.
pub struct SessionLease<'a, S: DocumentSession> {
    pool: &'a SessionPool<S>,
    session: Arc<PooledSession<S>>,
}

impl<S: DocumentSession> SessionLease<'_, S> {
    /// Position of the leased session in the pool heap right now.
    pub fn pool_index(&self) -> usize {
        self.session.pool_index()
    }

    pub fn ref_count(&self) -> usize {
        self.session.ref_count()
    }
}

impl<S: DocumentSession> Deref for SessionLease<'_, S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.session.handle
    }
}

impl<S: DocumentSession> Drop for SessionLease<'_, S> {
    fn drop(&mut self) {
        self.pool.release(&self.session);
    }
}
