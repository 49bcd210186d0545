//! Bounded priority queue for deferred events.

use super::error::CallbackResult;
use std::collections::VecDeque;
use tokio::time::Instant;

/// Deferred unit of work waiting for the execution lane.
pub(super) struct PriorityEvent {
    pub(super) event_type: String,
    pub(super) priority: i32,
    pub(super) enqueued_at: Instant,
    pub(super) callback: Box<dyn FnOnce() -> CallbackResult + Send>,
}

/// Events in insertion order.
///
/// Insertion order doubles as the tie-breaker: among equal priorities the
/// earliest-queued event runs first.
#[derive(Default)]
pub(super) struct EventQueue {
    events: VecDeque<PriorityEvent>,
}

impl EventQueue {
    pub(super) fn len(&self) -> usize {
        self.events.len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append `event`, evicting oldest entries until at most `cap` remain.
    ///
    /// Returns the evicted events.
    pub(super) fn push_bounded(&mut self, event: PriorityEvent, cap: usize) -> Vec<PriorityEvent> {
        self.events.push_back(event);
        let mut evicted = Vec::new();
        while self.events.len() > cap.max(1) {
            if let Some(oldest) = self.events.pop_front() {
                evicted.push(oldest);
            }
        }
        evicted
    }

    /// Remove the highest-priority event, earliest first among ties.
    pub(super) fn pop_highest(&mut self) -> Option<PriorityEvent> {
        let mut best: Option<(usize, i32)> = None;
        for (index, event) in self.events.iter().enumerate() {
            if best.map_or(true, |(_, priority)| event.priority > priority) {
                best = Some((index, event.priority));
            }
        }
        best.and_then(|(index, _)| self.events.remove(index))
    }

    pub(super) fn clear(&mut self) -> usize {
        let count = self.events.len();
        self.events.clear();
        count
    }

    pub(super) fn shrink_to_fit(&mut self) {
        self.events.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str, priority: i32) -> PriorityEvent {
        PriorityEvent {
            event_type: event_type.to_string(),
            priority,
            enqueued_at: Instant::now(),
            callback: Box::new(|| Ok(())),
        }
    }

    #[test]
    fn test_pop_highest_with_fifo_ties() {
        let mut queue = EventQueue::default();
        queue.push_bounded(event("a", 1), 10);
        queue.push_bounded(event("b", 5), 10);
        queue.push_bounded(event("c", 5), 10);
        queue.push_bounded(event("d", -2), 10);

        let order: Vec<String> = std::iter::from_fn(|| queue.pop_highest())
            .map(|e| e.event_type)
            .collect();
        assert_eq!(order, vec!["b", "c", "a", "d"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_bounded_evicts_oldest() {
        let mut queue = EventQueue::default();
        queue.push_bounded(event("first", 100), 2);
        queue.push_bounded(event("second", 0), 2);
        let evicted = queue.push_bounded(event("third", 0), 2);

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].event_type, "first");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_clear_reports_count() {
        let mut queue = EventQueue::default();
        queue.push_bounded(event("a", 0), 10);
        queue.push_bounded(event("b", 0), 10);
        assert_eq!(queue.clear(), 2);
        assert!(queue.pop_highest().is_none());
    }
}
