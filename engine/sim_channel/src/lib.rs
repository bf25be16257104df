//! Bounded work channel for the simulation test pipeline.
//!
//! One channel connects the enumerator to the worker pool, another connects
//! the workers to the aggregator. Both need two ways to end:
//!
//! - **Graceful close**: the channel is created with a writer count. Each
//!   writer calls [`Channel::dec_writer`] exactly once when it is done; when
//!   the count reaches zero, readers drain whatever is queued and then see the
//!   end-of-stream marker (`Ok(None)` from [`Channel::get`]).
//! - **Crash**: [`Channel::crash`] aborts the channel. Every blocked or future
//!   `put`/`get` fails with [`Crashed`], even if items are still queued.
//!
//! Crash wins over close. Both states are terminal.
//!
//! # Usage
//!
//! ```text
//! let chan = Arc::new(Channel::bounded(16, 1));
//! chan.put(item)?;
//! chan.dec_writer();
//! while let Some(item) = chan.get()? {
//!     // ...
//! }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Error returned by every operation on a crashed channel.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("channel crashed: {reason}")]
pub struct Crashed {
    reason: Arc<str>,
}

impl Crashed {
    /// The reason passed to the first [`Channel::crash`] call.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Lifecycle state of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// Writers remain; `get` blocks while the queue is empty.
    Open,
    /// Every writer has called `dec_writer`.
    Closed,
    /// `crash` was called.
    Crashed,
}

struct Inner<T> {
    queue: VecDeque<T>,
    writers: usize,
    crash: Option<Arc<str>>,
}

impl<T> Inner<T> {
    fn crashed(&self) -> Result<(), Crashed> {
        match &self.crash {
            Some(reason) => Err(Crashed {
                reason: Arc::clone(reason),
            }),
            None => Ok(()),
        }
    }
}

/// A bounded, multi-producer multi-consumer queue with reference-counted
/// close and one-shot crash.
///
/// Share it between threads with `Arc<Channel<T>>`; all methods take `&self`.
pub struct Channel<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> Channel<T> {
    /// Create an open channel holding at most `capacity` items (at least 1)
    /// that closes after `writers` calls to [`Channel::dec_writer`].
    pub fn bounded(capacity: usize, writers: usize) -> Self {
        Channel {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                writers,
                crash: None,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue `item`, blocking while the channel is full.
    pub fn put(&self, item: T) -> Result<(), Crashed> {
        let mut inner = self.inner.lock();
        loop {
            inner.crashed()?;
            if inner.queue.len() < self.capacity {
                break;
            }
            self.not_full.wait(&mut inner);
        }
        inner.queue.push_back(item);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the next item, blocking while the channel is empty and open.
    ///
    /// Returns `Ok(None)` once the channel is closed and drained.
    pub fn get(&self) -> Result<Option<T>, Crashed> {
        let mut inner = self.inner.lock();
        loop {
            inner.crashed()?;
            if let Some(item) = inner.queue.pop_front() {
                drop(inner);
                self.not_full.notify_one();
                return Ok(Some(item));
            }
            if inner.writers == 0 {
                return Ok(None);
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Release one writer. The last release closes the channel.
    pub fn dec_writer(&self) {
        let mut inner = self.inner.lock();
        let Some(remaining) = inner.writers.checked_sub(1) else {
            tracing::warn!("dec_writer called on a channel with no writers left");
            return;
        };
        inner.writers = remaining;
        if remaining == 0 {
            drop(inner);
            tracing::trace!("channel closed");
            self.not_empty.notify_all();
        }
    }

    /// Abort the channel, waking every waiter with an error.
    ///
    /// Only the first call takes effect; returns whether this call did.
    pub fn crash(&self, reason: impl Into<Arc<str>>) -> bool {
        let mut inner = self.inner.lock();
        if inner.crash.is_some() {
            return false;
        }
        let reason = reason.into();
        tracing::debug!(reason = %reason, "channel crashed");
        inner.crash = Some(reason);
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        true
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        let inner = self.inner.lock();
        if inner.crash.is_some() {
            ChannelState::Crashed
        } else if inner.writers == 0 {
            ChannelState::Closed
        } else {
            ChannelState::Open
        }
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Channel")
            .field("len", &inner.queue.len())
            .field("capacity", &self.capacity)
            .field("writers", &inner.writers)
            .field("crash", &inner.crash)
            .finish()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
