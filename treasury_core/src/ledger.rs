//! The Decision Ledger - a bounded, insertion-ordered log of decisions.
//!
//! Entries are never mutated after append. When the retained window is full
//! the oldest entry is evicted (FIFO). Per-agent append counts are kept for
//! the lifetime of the ledger, independent of eviction, so that
//! `Performance::decisions_count` can always be checked against it.

use crate::decision::Decision;
use std::collections::{HashMap, VecDeque};
use treasury_env::AgentId;

/// Bounded decision log.
#[derive(Debug, Clone)]
pub struct DecisionLedger {
    /// Retained entries, oldest at the front
    entries: VecDeque<Decision>,

    /// Maximum number of retained entries
    capacity: usize,

    /// Lifetime append count per agent
    appended: HashMap<AgentId, u64>,

    /// Lifetime append count across all agents
    total_appended: u64,
}

impl DecisionLedger {
    /// Creates an empty ledger. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            appended: HashMap::new(),
            total_appended: 0,
        }
    }

    /// Rebuilds a ledger from persisted parts.
    ///
    /// `decisions` must be oldest first. Lifetime counts are taken from
    /// `counts` and raised to at least the number of retained entries per agent.
    pub fn from_parts(
        capacity: usize,
        decisions: impl IntoIterator<Item = Decision>,
        counts: impl IntoIterator<Item = (AgentId, u64)>,
    ) -> Self {
        let mut ledger = Self::new(capacity);
        for decision in decisions {
            ledger.append(decision);
        }
        for (agent_id, count) in counts {
            let entry = ledger.appended.entry(agent_id).or_insert(0);
            *entry = (*entry).max(count);
        }
        ledger.total_appended = ledger.appended.values().sum();
        ledger
    }

    /// Appends a decision, returning the evicted entry if the window overflowed.
    pub fn append(&mut self, decision: Decision) -> Option<Decision> {
        *self.appended.entry(decision.agent_id.clone()).or_insert(0) += 1;
        self.total_appended += 1;
        self.entries.push_back(decision);

        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// Returns up to `n` most recent entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<Decision> {
        self.entries.iter().rev().take(n).cloned().collect()
    }

    /// Lifetime number of decisions appended for `agent_id`.
    pub fn count_for_agent(&self, agent_id: &AgentId) -> u64 {
        self.appended.get(agent_id).copied().unwrap_or(0)
    }

    /// Number of currently retained decisions for `agent_id`.
    pub fn retained_for_agent(&self, agent_id: &AgentId) -> usize {
        self.entries.iter().filter(|d| &d.agent_id == agent_id).count()
    }

    /// Retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Decision> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }

    /// Timestamp of the newest retained entry.
    pub fn last_timestamp(&self) -> Option<u64> {
        self.entries.back().map(|d| d.timestamp)
    }
}
