//! The action queue & cooperative cancellation (C8, spec §4.8): a single
//! mutex defining "currently processing action", with a small queue of
//! recorded intents so a waiting Stop/Restart can pre-empt an in-flight
//! one without cancelling a write mid-byte.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::Mutex as AsyncMutex;

use crate::cancel::CancelToken;
use crate::err::{Error, Result};

/// The kind of action competing for the queue (spec §4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Start,
    Stop,
    Restart,
    Controller,
}

struct Entry {
    id: u64,
    kind: ActionKind,
}

/// A recorded intent to run an action, obtained from
/// [`ActionQueue::enqueue`] before awaiting the mutex.
pub struct Ticket {
    id: u64,
    kind: ActionKind,
}

impl Ticket {
    /// The kind this ticket was recorded as.
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// This ticket's position in the queue's monotonic ordering, usable
    /// with [`ActionQueue::stop_recorded_after`] to detect pre-emption
    /// that happened entirely during this action's run (spec §4.7
    /// "Restart algorithm").
    pub fn sequence(&self) -> u64 {
        self.id
    }
}

/// Holds the mutex for the duration of one action. Dropping it (however
/// the action finished) removes the action's queue entry.
pub struct ActionGuard<'a> {
    _permit: tokio::sync::MutexGuard<'a, ()>,
    queue: &'a ActionQueue,
    id: u64,
}

impl Drop for ActionGuard<'_> {
    fn drop(&mut self) {
        self.queue.remove(self.id);
    }
}

/// The action queue itself (spec §4.8).
pub struct ActionQueue {
    mutex: AsyncMutex<()>,
    entries: Mutex<VecDeque<Entry>>,
    next_id: AtomicU64,
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionQueue {
    /// A fresh, empty queue.
    pub fn new() -> Self {
        ActionQueue {
            mutex: AsyncMutex::new(()),
            entries: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Record intent to run `kind` (spec §4.8: "the caller records intent
    /// in a small queue"). Call this before awaiting
    /// [`ActionQueue::acquire`].
    pub fn enqueue(&self, kind: ActionKind) -> Ticket {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().push_back(Entry { id, kind });
        Ticket { id, kind }
    }

    /// Await exclusive access, cooperatively honouring `cancel`. Once the
    /// mutex is available, the queue is inspected for a competing entry
    /// (any ticket other than this one still outstanding); if found, this
    /// action aborts with [`Error::Interrupted`] without ever having run
    /// (spec §4.8: "if a competing action ... is present, the current
    /// action aborts").
    pub async fn acquire(&self, ticket: &Ticket, cancel: &mut CancelToken) -> Result<ActionGuard<'_>> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.remove(ticket.id);
                return Err(Error::cancelled(None));
            }
            permit = self.mutex.lock() => permit,
        };
        if self.has_competitor(ticket.id) {
            drop(permit);
            self.remove(ticket.id);
            return Err(Error::Interrupted);
        }
        Ok(ActionGuard { _permit: permit, queue: self, id: ticket.id })
    }

    /// True if a `Stop` intent was recorded after `since` (a ticket's
    /// [`Ticket::sequence`]) — used by an in-flight `Restart` to detect a
    /// pre-empting user `Stop` (spec §4.7 "Restart algorithm": "if the
    /// action queue has seen a user Stop request while this was running").
    pub fn stop_recorded_after(&self, since: u64) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.id > since && e.kind == ActionKind::Stop)
    }

    fn has_competitor(&self, self_id: u64) -> bool {
        self.entries.lock().unwrap().iter().any(|e| e.id != self_id)
    }

    fn remove(&self, id: u64) {
        self.entries.lock().unwrap().retain(|e| e.id != id);
    }
}
