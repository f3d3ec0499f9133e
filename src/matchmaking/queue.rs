//! FIFO matchmaking queue
//!
//! A queue holds each identity at most once and hands out pairs strictly in
//! arrival order. It has no locking of its own; the manager owns one queue per
//! kind behind a mutex.

use crate::types::{PlayerId, QueueKind};
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

/// An identity waiting in a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub player_id: PlayerId,
    pub joined_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Time spent waiting as of `now`
    pub fn waited(&self, now: DateTime<Utc>) -> Duration {
        (now - self.joined_at).to_std().unwrap_or_default()
    }
}

/// Ordered, de-duplicated waiting list for one queue kind
#[derive(Debug, Clone)]
pub struct MatchQueue {
    kind: QueueKind,
    entries: VecDeque<QueueEntry>,
    members: HashSet<PlayerId>,
}

impl MatchQueue {
    pub fn new(kind: QueueKind) -> Self {
        Self {
            kind,
            entries: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Append `player_id` unless it is already waiting
    ///
    /// Returns `false` and leaves the queue untouched for a duplicate.
    pub fn enqueue(&mut self, player_id: &str) -> bool {
        if self.members.contains(player_id) {
            return false;
        }

        self.members.insert(player_id.to_string());
        self.entries.push_back(QueueEntry {
            player_id: player_id.to_string(),
            joined_at: Utc::now(),
        });
        true
    }

    /// Remove and return the two longest-waiting entries, oldest first
    pub fn try_extract_pair(&mut self) -> Option<(QueueEntry, QueueEntry)> {
        if self.entries.len() < 2 {
            return None;
        }

        let first = self.entries.pop_front()?;
        let second = self.entries.pop_front()?;
        self.members.remove(&first.player_id);
        self.members.remove(&second.player_id);

        Some((first, second))
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.members.contains(player_id)
    }

    /// 1-based position of `player_id`, if waiting
    pub fn position(&self, player_id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.player_id == player_id)
            .map(|index| index + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities in arrival order
    pub fn waiting(&self) -> Vec<PlayerId> {
        self.entries
            .iter()
            .map(|entry| entry.player_id.clone())
            .collect()
    }
}
