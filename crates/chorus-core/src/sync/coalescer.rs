//! Debounced write scheduling.

use std::collections::HashMap;

#[derive(Debug, Clone)]
struct PendingWrite<V, T> {
    value: V,
    deadline: T,
}

/// Keeps at most one pending value per storage key.
///
/// Scheduling again before the deadline replaces the value and pushes the
/// deadline out. The scheduler never reads a clock itself; callers pass the
/// deadline and the current time, so tests can use plain integers.
#[derive(Debug, Clone)]
pub struct WriteCoalescer<V, T> {
    pending: HashMap<String, PendingWrite<V, T>>,
}

impl<V, T: Ord + Copy> Default for WriteCoalescer<V, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, T: Ord + Copy> WriteCoalescer<V, T> {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Returns true if an earlier pending value was superseded.
    pub fn schedule(&mut self, key: impl Into<String>, value: V, deadline: T) -> bool {
        self.pending
            .insert(key.into(), PendingWrite { value, deadline })
            .is_some()
    }

    /// Removes and returns every entry whose deadline is at or before `now`.
    pub fn take_due(&mut self, now: T) -> Vec<(String, V)> {
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        due.into_iter()
            .filter_map(|k| self.pending.remove(&k).map(|p| (k, p.value)))
            .collect()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<T> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Removes everything regardless of deadline.
    pub fn drain(&mut self) -> Vec<(String, V)> {
        self.pending.drain().map(|(k, p)| (k, p.value)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_collapses_to_last_value() {
        let mut coalescer = WriteCoalescer::new();
        assert!(!coalescer.schedule("chat", 1, 250));
        assert!(coalescer.schedule("chat", 2, 300));
        assert!(coalescer.schedule("chat", 3, 350));

        assert!(coalescer.take_due(349).is_empty());
        assert_eq!(coalescer.take_due(350), vec![("chat".to_string(), 3)]);
        assert!(coalescer.take_due(1_000).is_empty());
    }

    #[test]
    fn test_keys_are_independent() {
        let mut coalescer = WriteCoalescer::new();
        coalescer.schedule("chat", "a", 10);
        coalescer.schedule("profile", "b", 20);

        assert_eq!(coalescer.next_deadline(), Some(10));
        assert_eq!(coalescer.take_due(15), vec![("chat".to_string(), "a")]);
        assert_eq!(coalescer.next_deadline(), Some(20));
    }

    #[test]
    fn test_drain_ignores_deadlines() {
        let mut coalescer = WriteCoalescer::new();
        coalescer.schedule("chat", 1, 1_000);
        assert_eq!(coalescer.drain().len(), 1);
        assert!(coalescer.is_empty());
        assert_eq!(coalescer.next_deadline(), None);
    }
}
