//! Bounded pool of render sessions.
//!
//! At most `max_sessions` sessions are lent out at once; `acquire` suspends
//! until a slot frees up. Returned sessions are kept idle and reused by the
//! next worker, so a job never holds more browser sessions than its
//! concurrency limit.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::browser::session::{RenderSession, SessionFactory};
use crate::error::CrawlError;

pub struct SessionPool {
    factory: Arc<dyn SessionFactory>,
    /// One permit per session that may be active
    permits: Arc<Semaphore>,
    /// Sessions returned by workers, ready for reuse
    idle: Mutex<Vec<Box<dyn RenderSession>>>,
    max_sessions: usize,
    /// Slots still usable; drops below `max_sessions` when the backend refuses sessions
    capacity: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    created: AtomicUsize,
}

impl SessionPool {
    /// Create a pool and start one session up front, so an unreachable
    /// backend fails the job before any page is dispatched
    pub async fn connect(factory: Arc<dyn SessionFactory>, max_sessions: usize) -> Result<Arc<Self>, CrawlError> {
        if max_sessions == 0 {
            return Err(CrawlError::setup("Session pool needs at least one slot"));
        }

        let first = factory.create().await?;
        info!("Session pool ready with up to {} sessions", max_sessions);

        Ok(Arc::new(Self {
            factory,
            permits: Arc::new(Semaphore::new(max_sessions)),
            idle: Mutex::new(vec![first]),
            max_sessions,
            capacity: AtomicUsize::new(max_sessions),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            created: AtomicUsize::new(1),
        }))
    }

    /// Borrow a session, waiting for a free slot if the pool is saturated.
    ///
    /// If the backend refuses to start another session, the slot is given up
    /// and the caller waits for one of the sessions that already exist.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledSession, CrawlError> {
        loop {
            let permit = Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .map_err(|_| CrawlError::setup("Session pool is closed"))?;

            let reused = self.lock_idle().pop();
            let session = match reused {
                Some(session) => session,
                None => match self.factory.create().await {
                    Ok(session) => {
                        self.created.fetch_add(1, Ordering::SeqCst);
                        debug!("Started session {} of {}", self.created(), self.capacity());
                        session
                    }
                    Err(e) if self.created() > 0 => {
                        permit.forget();
                        let capacity = self.capacity.fetch_sub(1, Ordering::SeqCst) - 1;
                        warn!("Could not start another session, continuing with {}: {}", capacity, e);
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };

            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_active.fetch_max(active, Ordering::SeqCst);

            return Ok(PooledSession {
                session: Some(session),
                pool: Arc::clone(self),
                _permit: permit,
            });
        }
    }

    /// Return a session to the pool. Dropping the guard does the same.
    pub fn release(&self, session: PooledSession) {
        drop(session);
    }

    /// Close every idle session and refuse further acquisitions
    pub async fn shutdown(&self) {
        self.permits.close();

        let sessions: Vec<_> = self.lock_idle().drain(..).collect();
        let count = sessions.len();

        futures::future::join_all(sessions.into_iter().map(|mut session| async move {
            session.close().await;
        }))
        .await;

        info!("Session pool shut down, closed {} sessions", count);
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Sessions that may be lent out at once
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }

    /// Sessions currently lent out
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of sessions lent out at the same time
    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    /// Sessions created over the pool's lifetime
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, Vec<Box<dyn RenderSession>>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn give_back(&self, session: Box<dyn RenderSession>) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.lock_idle().push(session);
    }
}

/// A session on loan from the pool; returned when dropped
pub struct PooledSession {
    session: Option<Box<dyn RenderSession>>,
    pool: Arc<SessionPool>,
    // Released after the session is back in the idle list
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledSession {
    type Target = dyn RenderSession;

    fn deref(&self) -> &Self::Target {
        match self.session.as_deref() {
            Some(session) => session,
            None => unreachable!("session is only taken on drop"),
        }
    }
}

impl DerefMut for PooledSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.session.as_deref_mut() {
            Some(session) => session,
            None => unreachable!("session is only taken on drop"),
        }
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.give_back(session);
        }
    }
}
