use std::collections::{HashSet, VecDeque};
use tracing::debug;

use crate::crawler::filter::normalize_url;
use crate::crawler::task::CrawlTarget;

/// FIFO queue of pending crawl targets for one job.
///
/// Owned by the scheduler loop, which is the only place that pushes or pops,
/// so no lock is needed around it.
#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<CrawlTarget>,
    max_depth: u32,
    /// Normalized URLs already accepted, when deduplication is on
    seen: Option<HashSet<String>>,
}

impl Frontier {
    pub fn new(max_depth: u32, dedupe: bool) -> Self {
        Self {
            queue: VecDeque::new(),
            max_depth,
            seen: dedupe.then(HashSet::new),
        }
    }

    /// Enqueue a target. Returns false if it is too deep or already seen.
    pub fn push(&mut self, target: CrawlTarget) -> bool {
        if target.depth > self.max_depth {
            debug!("Rejecting {} at depth {} (max {})", target.url, target.depth, self.max_depth);
            return false;
        }

        if let Some(seen) = self.seen.as_mut() {
            if !seen.insert(normalize_url(&target.url)) {
                debug!("Skipping already enqueued URL: {}", target.url);
                return false;
            }
        }

        self.queue.push_back(target);
        true
    }

    /// Put a target back at the head of the queue for another attempt,
    /// bypassing deduplication
    pub fn requeue(&mut self, target: CrawlTarget) {
        self.queue.push_front(target);
    }

    pub fn pop(&mut self) -> Option<CrawlTarget> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Drop all remaining targets, returning how many were discarded
    pub fn clear(&mut self) -> usize {
        let remaining = self.queue.len();
        self.queue.clear();
        remaining
    }
}
