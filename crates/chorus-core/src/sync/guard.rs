//! Deferral of reconciliation while local streaming is active.

/// Whether an incoming remote change may be merged right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Apply,
    Deferred,
}

/// Counts active long-running local mutation sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InFlightGuard {
    active: usize,
    deferred: bool,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) {
        self.active += 1;
    }

    /// Leaves one sequence. Returns true exactly when the count reached zero
    /// with a deferred trigger recorded; the flag is cleared in that case.
    pub fn end(&mut self) -> bool {
        self.active = self.active.saturating_sub(1);
        if self.active == 0 && self.deferred {
            self.deferred = false;
            return true;
        }
        false
    }

    /// Admits a remote trigger, or records it for later.
    pub fn offer(&mut self) -> Admission {
        if self.active > 0 {
            self.deferred = true;
            Admission::Deferred
        } else {
            Admission::Apply
        }
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_guard_applies() {
        let mut guard = InFlightGuard::new();
        assert_eq!(guard.offer(), Admission::Apply);
        assert!(!guard.is_deferred());
    }

    #[test]
    fn test_deferral_fires_once_when_last_sequence_ends() {
        let mut guard = InFlightGuard::new();
        guard.begin();
        guard.begin();
        assert_eq!(guard.offer(), Admission::Deferred);
        assert_eq!(guard.offer(), Admission::Deferred);

        assert!(!guard.end());
        assert!(guard.end());
        assert!(!guard.is_deferred());
        assert!(!guard.end());
    }

    #[test]
    fn test_count_saturates_at_zero() {
        let mut guard = InFlightGuard::new();
        assert!(!guard.end());
        assert_eq!(guard.active(), 0);
        guard.begin();
        assert_eq!(guard.active(), 1);
    }

    #[test]
    fn test_end_without_deferral_is_quiet() {
        let mut guard = InFlightGuard::new();
        guard.begin();
        assert!(!guard.end());
    }
}
