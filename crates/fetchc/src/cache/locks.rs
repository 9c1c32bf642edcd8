//! Per-key exclusive scopes.
//!
//! A key is "busy" while a guard for it is alive. Writers for the same key
//! queue on the condition variable; writers for different keys only share
//! the short critical section that flips membership in the busy set.

use std::collections::HashSet;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    busy: Mutex<HashSet<String>>,
    released: Condvar,
}

impl KeyLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Block until `key` is free, then hold it until the guard drops
    pub(crate) fn lock(&self, key: &str) -> KeyGuard<'_> {
        let mut busy = self.busy.lock();
        while busy.contains(key) {
            self.released.wait(&mut busy);
        }
        busy.insert(key.to_string());
        KeyGuard {
            owner: self,
            key: key.to_string(),
        }
    }

    #[cfg(test)]
    fn is_busy(&self, key: &str) -> bool {
        self.busy.lock().contains(key)
    }
}

pub(crate) struct KeyGuard<'a> {
    owner: &'a KeyLocks,
    key: String,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.owner.busy.lock().remove(&self.key);
        self.owner.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_guard_releases_on_drop() {
        let locks = KeyLocks::new();
        {
            let _guard = locks.lock("a");
            assert!(locks.is_busy("a"));
        }
        assert!(!locks.is_busy("a"));
    }

    #[test]
    fn test_distinct_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.lock("a");
        // Would deadlock if keys shared a scope.
        let _b = locks.lock("b");
        assert!(locks.is_busy("a"));
        assert!(locks.is_busy("b"));
    }

    #[test]
    fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_seen = max_seen.clone();
                thread::spawn(move || {
                    let _guard = locks.lock("same");
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(!locks.is_busy("same"));
    }
}
