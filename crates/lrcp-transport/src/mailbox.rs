//! Single-consumer rendezvous queue.
//!
//! Producers `put` items and block while the mailbox is full; one consumer
//! blocks in [`Mailbox::get`] until an item arrives, the producer side
//! signals end-of-stream, or the wait times out. Items the consumer took but
//! could not use go back to the head with [`Mailbox::put_front`], which
//! ignores the capacity.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Why a [`Mailbox::get`] returned without an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MailboxError {
    /// The producer ended the stream and every queued item was consumed.
    #[error("mailbox ended")]
    Ended,

    /// Nothing arrived within the wait budget.
    #[error("mailbox wait timed out after {0:?}")]
    TimedOut(Duration),
}

/// Capacity of [`Mailbox::new`]: one item in flight.
const RENDEZVOUS_CAPACITY: usize = 1;

struct State<T> {
    queue: VecDeque<T>,
    ended: bool,
}

/// A bounded blocking FIFO with an explicit end-of-stream marker.
pub struct Mailbox<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    ready: Condvar,
    space: Condvar,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    /// A rendezvous mailbox holding a single item.
    pub fn new() -> Self {
        Self::with_capacity(RENDEZVOUS_CAPACITY)
    }

    /// A mailbox holding up to `capacity` items (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                ended: false,
            }),
            capacity,
            ready: Condvar::new(),
            space: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an item, waiting while the mailbox is full.
    ///
    /// Returns the item back if the stream ended before it was queued.
    pub fn put(&self, item: T) -> Result<(), T> {
        let mut state = self.lock();
        while !state.ended && state.queue.len() >= self.capacity {
            state = self
                .space
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.ended {
            return Err(item);
        }
        state.queue.push_back(item);
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    /// Push an item back to the head of the queue.
    ///
    /// Accepted even after [`Mailbox::put_end`]: the consumer is returning
    /// something it already received.
    pub fn put_front(&self, item: T) {
        self.lock().queue.push_front(item);
        self.ready.notify_one();
    }

    /// Mark end-of-stream. Queued items stay readable; blocked producers
    /// get their items back.
    pub fn put_end(&self) {
        self.lock().ended = true;
        self.ready.notify_all();
        self.space.notify_all();
    }

    /// Wait for the next item.
    ///
    /// `None` waits indefinitely. Queued items are always drained before
    /// [`MailboxError::Ended`] is reported.
    pub fn get(&self, timeout: Option<Duration>) -> Result<T, MailboxError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();
        loop {
            if let Some(item) = state.queue.pop_front() {
                drop(state);
                self.space.notify_one();
                return Ok(item);
            }
            if state.ended {
                return Err(MailboxError::Ended);
            }
            match deadline {
                None => {
                    state = self
                        .ready
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(MailboxError::TimedOut(timeout.unwrap_or_default()));
                    }
                    let (next, _) = self
                        .ready
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = next;
                }
            }
        }
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
