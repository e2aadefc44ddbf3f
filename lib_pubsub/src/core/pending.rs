//! # Pending Request Table
//!
//! Requests in flight, keyed by sequence number. Every entry owns a
//! cancellable timer task; when the timer runs out the sequence number is sent
//! to the expiry channel and the owner calls [`PendingRequestTable::expire`].
//! Whichever of resolve, expire, remove or clear reaches an entry first takes
//! it, so a completion can only ever be handed out once.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::PubSubError;

/// One request waiting for its response.
#[derive(Debug)]
pub struct PendingRequest<T> {
    pub sequence: u64,
    /// The completion and whatever else the owner attached.
    pub value: T,
    /// Error-only completion: nothing is reported on success or on timeout.
    pub disposable: bool,
    /// When the request was registered.
    pub created_at: Instant,
    completed: bool,
    timer: CancellationToken,
}

impl<T> PendingRequest<T> {
    /// Whether the entry has been resolved.
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

/// A registration refused by the table; the value is handed back.
#[derive(Debug)]
pub struct Rejected<T> {
    pub error: PubSubError,
    pub value: T,
}

/// Bounded map of in-flight requests with per-entry timeouts.
#[derive(Debug)]
pub struct PendingRequestTable<T> {
    entries: HashMap<u64, PendingRequest<T>>,
    limit: usize,
    expiries: mpsc::UnboundedSender<u64>,
}

impl<T> PendingRequestTable<T> {
    /// An empty table holding at most `limit` live entries, reporting timer
    /// expiries on `expiries`.
    pub fn new(limit: usize, expiries: mpsc::UnboundedSender<u64>) -> Self {
        Self {
            entries: HashMap::new(),
            limit,
            expiries,
        }
    }

    /// Stores a request and starts its timer. Must run inside a tokio runtime.
    pub fn register(&mut self, sequence: u64, value: T, disposable: bool, timeout: Duration) -> Result<(), Rejected<T>> {
        if self.entries.len() >= self.limit {
            return Err(Rejected {
                error: PubSubError::CapacityExceeded { limit: self.limit },
                value,
            });
        }
        if self.entries.contains_key(&sequence) {
            return Err(Rejected {
                error: PubSubError::Protocol(format!("Sequence {} is already pending", sequence)),
                value,
            });
        }

        let timer = CancellationToken::new();
        let token = timer.clone();
        let expiries = self.expiries.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep(timeout) => {
                    let _ = expiries.send(sequence);
                }
            }
        });

        self.entries.insert(
            sequence,
            PendingRequest {
                sequence,
                value,
                disposable,
                created_at: Instant::now(),
                completed: false,
                timer,
            },
        );
        Ok(())
    }

    /// Takes the entry for a response that just arrived. `None` when the
    /// sequence is unknown, already resolved or already expired.
    pub fn resolve(&mut self, sequence: u64) -> Option<PendingRequest<T>> {
        let mut entry = self.entries.remove(&sequence)?;
        if entry.completed {
            return None;
        }
        entry.completed = true;
        entry.timer.cancel();
        Some(entry)
    }

    /// Takes the entry whose timer ran out, if it is still live.
    pub fn expire(&mut self, sequence: u64) -> Option<PendingRequest<T>> {
        match self.entries.get(&sequence) {
            Some(entry) if !entry.completed => self.entries.remove(&sequence),
            _ => None,
        }
    }

    /// Drops an entry without reporting anything.
    pub fn remove(&mut self, sequence: u64) -> bool {
        match self.entries.remove(&sequence) {
            Some(entry) => {
                entry.timer.cancel();
                true
            }
            None => false,
        }
    }

    /// Drops every entry and stops every timer. Nothing is reported.
    pub fn clear(&mut self) {
        self.drain();
    }

    /// Takes every entry out and stops every timer.
    pub fn drain(&mut self) -> Vec<PendingRequest<T>> {
        let mut entries: Vec<PendingRequest<T>> = self.entries.drain().map(|(_, entry)| entry).collect();
        for entry in &entries {
            entry.timer.cancel();
        }
        entries.sort_by_key(|entry| entry.sequence);
        entries
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no request is in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
