//! Copy-on-write holder for one replica's snapshot.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::watch;

/// Synchronous change observer.
pub type ChangeListener<S> = Arc<dyn Fn(&Arc<S>) + Send + Sync>;

/// Holds the current snapshot and swaps it whole on every mutation.
///
/// Mutators work on a private clone, so readers only ever see complete
/// snapshots. Mutations are serialized in the order they are issued.
/// Listeners run on the mutating thread before `apply` returns and must not
/// call back into the container.
pub struct ReplicaContainer<S> {
    tx: watch::Sender<Arc<S>>,
    apply_lock: Mutex<()>,
    listeners: RwLock<Vec<ChangeListener<S>>>,
}

impl<S: Clone> ReplicaContainer<S> {
    pub fn new(initial: S) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self {
            tx,
            apply_lock: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Runs `mutator` against a draft and publishes the result.
    pub fn apply<T, F>(&self, mutator: F) -> T
    where
        F: FnOnce(&mut S) -> T,
    {
        let _guard = self.apply_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut draft = S::clone(&self.tx.borrow());
        let out = mutator(&mut draft);
        self.publish(Arc::new(draft));
        out
    }

    /// Swaps in a whole snapshot.
    pub fn replace(&self, next: S) {
        let _guard = self.apply_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.publish(Arc::new(next));
    }

    /// Like [`ReplicaContainer::replace`], but computed from the current
    /// snapshot under the apply lock. Returning `None` leaves the snapshot
    /// untouched and notifies nobody.
    pub fn replace_with<F>(&self, f: F) -> bool
    where
        F: FnOnce(&S) -> Option<S>,
    {
        let _guard = self.apply_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();
        match f(&current) {
            Some(next) => {
                self.publish(Arc::new(next));
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Arc<S> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<S>> {
        self.tx.subscribe()
    }

    pub fn on_change(&self, listener: ChangeListener<S>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn publish(&self, next: Arc<S>) {
        self.tx.send_replace(next.clone());
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(&next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_apply_returns_mutator_output() {
        let container = ReplicaContainer::new(vec![1]);
        let len = container.apply(|v| {
            v.push(2);
            v.len()
        });
        assert_eq!(len, 2);
        assert_eq!(*container.snapshot(), vec![1, 2]);
    }

    #[test]
    fn test_old_snapshot_is_not_mutated() {
        let container = ReplicaContainer::new(vec![1]);
        let before = container.snapshot();
        container.apply(|v| v.push(2));
        assert_eq!(*before, vec![1]);
    }

    #[test]
    fn test_listeners_run_before_apply_returns() {
        let container = ReplicaContainer::new(0u32);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        container.on_change(Arc::new(move |value: &Arc<u32>| {
            counter.store(**value as usize, Ordering::SeqCst);
        }));

        container.apply(|v| *v = 7);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_replace_with_none_is_silent() {
        let container = ReplicaContainer::new(1u32);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        container.on_change(Arc::new(move |_: &Arc<u32>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(!container.replace_with(|_| None));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(container.replace_with(|v| Some(v + 1)));
        assert_eq!(*container.snapshot(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_watch_receivers_see_latest() {
        let container = ReplicaContainer::new(String::new());
        let mut rx = container.subscribe();
        container.apply(|s| s.push_str("hello"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_str(), "hello");
    }
}
