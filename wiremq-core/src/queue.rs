//! Single-slot unbounded hand-off queue.
//!
//! `Unbounded<T>` decouples a producer task (a connection read-loop, which
//! must never block on a slow consumer) from a single consumer task (a
//! socket's consumption loop, which paces itself with `load` + `next`).
//!
//! The queue holds exactly one "pending receive" slot and an unbounded FIFO
//! backlog for everything else:
//! - `push` resolves the pending slot if one is waiting, otherwise appends
//!   to the backlog. It never suspends.
//! - `load` moves the oldest backlog item into the pending slot, if any.
//! - `next` suspends until the pending slot is fulfilled, then drains it.
//! - `close` sends an end sentinel through the same path, exactly once.
//!
//! The mailbox state lives behind a plain mutex; the lock is never held
//! across a suspension point. The pending slot itself is a oneshot channel,
//! so `push` and `next` are message-passing operations rather than shared
//! mutable access.

use std::collections::VecDeque;

use futures::channel::oneshot;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors surfaced by [`Unbounded`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// `push` was called after `close`.
    #[error("queue is closed")]
    Closed,

    /// `next` was called while no pending slot exists and the queue is
    /// still open. Call `load` (or start from a fresh queue) first.
    #[error("next item has not been loaded")]
    NotLoaded,
}

struct Inner<T> {
    /// Resolver for the current pending slot; taken when the slot is
    /// fulfilled by `push` or `load`.
    pending: Option<oneshot::Sender<Option<T>>>,
    /// Consumer side of the current pending slot; taken by `next`.
    head: Option<oneshot::Receiver<Option<T>>>,
    /// Items (and possibly the end sentinel) waiting behind the slot.
    backlog: VecDeque<Option<T>>,
    /// True when the slot has been fulfilled but not yet consumed.
    loaded: bool,
    closed: bool,
}

impl<T> Inner<T> {
    /// Deliver `next` into the pending slot or the backlog.
    fn deliver(&mut self, next: Option<T>) {
        if let Some(tx) = self.pending.take() {
            self.loaded = true;
            // The receiver can only be gone if the consumer was dropped
            // mid-await; the item is lost either way.
            let _ = tx.send(next);
        } else {
            self.backlog.push_back(next);
        }
    }
}

/// Single-consumer asynchronous queue with one pending-receive slot and an
/// unbounded backlog. See the module docs for the contract.
pub struct Unbounded<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for Unbounded<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Unbounded<T> {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            inner: Mutex::new(Inner {
                pending: Some(tx),
                head: Some(rx),
                backlog: VecDeque::new(),
                loaded: false,
                closed: false,
            }),
        }
    }

    /// Enqueue an item. Resolves a waiting `next` immediately when the
    /// pending slot is unfulfilled; otherwise appends to the backlog.
    /// Never suspends.
    pub fn push(&self, item: T) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(QueueError::Closed);
        }
        inner.deliver(Some(item));
        Ok(())
    }

    /// Close the queue, delivering the end sentinel through the same path
    /// as ordinary items. Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.deliver(None);
        inner.closed = true;
    }

    /// Move the oldest backlog item (if any) into the pending slot.
    ///
    /// Returns `true` if an item was advanced. A no-op when the slot is
    /// already fulfilled or the backlog is empty; in the latter case the
    /// slot is still (re)armed so a later `push` can resolve `next`
    /// directly.
    pub fn load(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.loaded {
            return false;
        }
        if inner.pending.is_none() && inner.head.is_none() {
            let (tx, rx) = oneshot::channel();
            inner.pending = Some(tx);
            inner.head = Some(rx);
        }
        if inner.backlog.is_empty() {
            return false;
        }
        if let Some(next) = inner.backlog.pop_front() {
            inner.deliver(next);
        }
        true
    }

    /// Wait for the pending slot to be fulfilled and take its value.
    ///
    /// Returns `Ok(None)` when the end sentinel is reached (queue closed
    /// and backlog drained). Fails with [`QueueError::NotLoaded`] instead
    /// of suspending forever when no slot has been armed.
    pub async fn next(&self) -> Result<Option<T>, QueueError> {
        let rx = {
            let mut inner = self.inner.lock();
            match inner.head.take() {
                Some(rx) => rx,
                None if inner.closed => return Ok(None),
                None => return Err(QueueError::NotLoaded),
            }
        };

        // Suspend outside the lock; `push`/`load` fulfill the slot.
        let item = rx.await.map_err(|_| QueueError::Closed)?;

        let mut inner = self.inner.lock();
        inner.loaded = false;
        Ok(item)
    }
}
