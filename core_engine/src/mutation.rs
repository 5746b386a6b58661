//! Debounced re-scan of subtrees the host inserts after the initial pass.

use std::time::{Duration, Instant};

use crate::document::{Document, MutationRecord, NodeId};
use crate::scanner::{is_engine_ui, is_inside_processed, PROCESSED_CLASS};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Collects newly inserted element roots and releases them once no new
/// mutation batch has arrived for the debounce delay.
#[derive(Debug)]
pub struct MutationCoordinator {
    delay: Duration,
    pending: Vec<NodeId>,
    deadline: Option<Instant>,
}

impl MutationCoordinator {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Vec::new(),
            deadline: None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn pending(&self) -> &[NodeId] {
        &self.pending
    }

    /// Filters one batch of records and re-arms the debounce. Returns the
    /// deadline after which [`take_due`](Self::take_due) releases the roots.
    pub fn observe(
        &mut self,
        document: &Document,
        records: Vec<MutationRecord>,
        now: Instant,
    ) -> Option<Instant> {
        if records.is_empty() {
            return self.deadline;
        }

        for record in records {
            if is_inside_processed(document, record.target) || is_engine_ui(document, record.target)
            {
                continue;
            }
            for added in record.added {
                let fresh_element = document.element(added).is_some()
                    && !document.has_class(added, PROCESSED_CLASS)
                    && !is_engine_ui(document, added);
                if fresh_element && !self.pending.contains(&added) {
                    self.pending.push(added);
                }
            }
        }

        self.deadline = Some(now + self.delay);
        self.deadline
    }

    /// Roots whose debounce window has elapsed. Empty while the window is
    /// still open.
    pub fn take_due(&mut self, now: Instant) -> Vec<NodeId> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                std::mem::take(&mut self.pending)
            }
            _ => Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.deadline = None;
    }
}

impl Default for MutationCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
