//! Per-upstream cache of idle stream connections.
//!
//! Each proxy owns its own cache, so there is no process-wide pool and no lock
//! shared between upstreams. The mutex is only held to push or pop an entry,
//! never across an `.await`.

use socket2::SockRef;
use std::collections::VecDeque;
use std::io;
use std::mem::MaybeUninit;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;

/// Idle connections kept per upstream and transport.
pub const MAX_IDLE_PER_UPSTREAM: usize = 2;

/// Cheap liveness check run on an idle stream before it is handed out again.
pub trait IdleCheck {
    /// `true` when the stream must not be reused.
    fn is_stale(&self) -> bool;
}

/// Peeks one byte without blocking.
///
/// `Ok(0)` is EOF, `Ok(n)` means the peer sent bytes nobody asked for, and
/// `WouldBlock` means the socket is idle and usable.
pub(crate) fn peek_idle(stream: &TcpStream) -> io::Result<usize> {
    let mut buf = [MaybeUninit::<u8>::uninit(); 1];
    SockRef::from(stream).peek(&mut buf)
}

impl IdleCheck for TcpStream {
    fn is_stale(&self) -> bool {
        match peek_idle(self) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
            // EOF, unsolicited data or a socket error
            _ => true,
        }
    }
}

struct IdleEntry<S> {
    stream: S,
    idle_since: Instant,
}

pub struct ConnCache<S> {
    idle: Mutex<VecDeque<IdleEntry<S>>>,
    max_idle: usize,
    expire: Duration,
}

impl<S: IdleCheck> ConnCache<S> {
    pub fn new(expire: Duration) -> Self {
        Self::with_capacity(MAX_IDLE_PER_UPSTREAM, expire)
    }

    pub fn with_capacity(max_idle: usize, expire: Duration) -> Self {
        Self {
            idle: Mutex::new(VecDeque::with_capacity(max_idle)),
            max_idle,
            expire,
        }
    }

    /// Hands out the most recently returned stream that is neither expired
    /// nor stale. Everything older that fails those checks is dropped.
    pub fn take(&self) -> Option<S> {
        loop {
            let entry = self.lock().pop_back()?;
            if entry.idle_since.elapsed() >= self.expire {
                debug!("Dropping expired idle connection");
                continue;
            }
            if entry.stream.is_stale() {
                debug!("Dropping stale idle connection");
                continue;
            }
            return Some(entry.stream);
        }
    }

    /// Returns a stream after a successful exchange. Past capacity the oldest
    /// idle stream is closed.
    pub fn put(&self, stream: S) {
        if self.max_idle == 0 {
            return;
        }
        let mut idle = self.lock();
        if idle.len() >= self.max_idle {
            idle.pop_front();
        }
        idle.push_back(IdleEntry {
            stream,
            idle_since: Instant::now(),
        });
    }

    /// Closes every idle stream.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<IdleEntry<S>>> {
        // Entries are plain values; a poisoned lock still holds a usable queue.
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }
}
