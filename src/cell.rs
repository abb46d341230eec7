//! Single-slot broadcast cell.
//!
//! # Semantics
//! ```text
//! empty ──set(v1)──▶ v1 ──set(v2)──▶ v2 ...
//!
//! get(timeout): wait until the slot holds a value (or the deadline passes),
//!               then hand back a clone. The slot keeps its value.
//! set(value):   overwrite the slot and wake every waiter. Never waits.
//! ```
//!
//! # Design Decisions
//! - Backed by `tokio::sync::watch`: one slot, last value wins, all receivers woken
//! - Readers clone the value out; for shared resources store an `Arc`
//! - Handles are cheap to clone and all point at the same slot

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// A thread-safe container holding at most one value.
///
/// Any number of tasks may wait in [`get`](Self::get) while writers call
/// [`set`](Self::set) or [`replace`](Self::replace); writers never wait on
/// readers and readers never consume the value.
#[derive(Debug)]
pub struct ValueCell<T> {
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> Default for ValueCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ValueCell<T> {
    /// Create an empty cell.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Install `value`, replacing whatever was there.
    pub fn set(&self, value: T) {
        self.tx.send_replace(Some(value));
    }

    /// Install `value` and return the value it superseded, in one atomic step.
    ///
    /// Two racing `replace` calls each get back a distinct previous value, so
    /// every value that ever left the cell is returned to exactly one caller.
    pub fn replace(&self, value: T) -> Option<T> {
        self.tx.send_replace(Some(value))
    }

    /// True if no value has been installed yet.
    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_none()
    }
}

impl<T: Clone> ValueCell<T> {
    /// Wait up to `timeout` for the cell to hold a value and return a clone of it.
    ///
    /// Returns `None` once the deadline passes with the cell still empty.
    /// A zero timeout checks the cell once without waiting.
    pub async fn get(&self, timeout: Duration) -> Option<T> {
        let mut rx = self.tx.subscribe();
        let waited = tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await;
        // The sender lives as long as `self`, so `wait_for` only fails on timeout.
        match waited {
            Ok(Ok(slot)) => slot.clone(),
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Return the current value without waiting.
    pub fn peek(&self) -> Option<T> {
        self.tx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn get_returns_last_written_value() {
        let cell = ValueCell::new();
        for v in 1..=5 {
            cell.set(v);
        }
        assert_eq!(cell.get(Duration::from_millis(10)).await, Some(5));
        // Reading does not consume.
        assert_eq!(cell.get(Duration::ZERO).await, Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn short_get_on_empty_cell_times_out() {
        let cell: ValueCell<u32> = ValueCell::new();
        let start = tokio::time::Instant::now();
        assert_eq!(cell.get(Duration::from_millis(25)).await, None);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn zero_timeout_polls_present_value() {
        let cell = ValueCell::new();
        cell.set("ready");
        assert_eq!(cell.get(Duration::ZERO).await, Some("ready"));
    }

    #[tokio::test]
    async fn long_get_unblocks_on_set() {
        let cell = ValueCell::new();
        let reader = cell.clone();
        let waiter = tokio::spawn(async move { reader.get(Duration::from_secs(3600)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let started = Instant::now();
        cell.set(7u64);
        assert!(started.elapsed() < Duration::from_millis(50), "set must not block");
        assert_eq!(waiter.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn all_blocked_readers_see_the_same_value() {
        let cell = ValueCell::new();
        let readers: Vec<_> = (0..16)
            .map(|_| {
                let c = cell.clone();
                tokio::spawn(async move { c.get(Duration::from_secs(60)).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        cell.set(Arc::new(String::from("balancer-a")));

        for r in readers {
            let got = r.await.unwrap().unwrap();
            assert_eq!(got.as_str(), "balancer-a");
        }
    }

    #[test]
    fn replace_hands_back_each_value_once() {
        let cell = ValueCell::new();
        assert!(cell.is_empty());
        assert_eq!(cell.replace(1), None);
        assert_eq!(cell.replace(2), Some(1));
        assert_eq!(cell.replace(3), Some(2));
        assert_eq!(cell.peek(), Some(3));
    }

    #[test]
    fn concurrent_replacers_never_lose_a_value() {
        let cell = ValueCell::new();
        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let c = cell.clone();
                std::thread::spawn(move || {
                    (0..100u32)
                        .filter_map(|i| c.replace(t * 1000 + i))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut returned: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        returned.push(cell.peek().unwrap());
        returned.sort_unstable();
        returned.dedup();
        assert_eq!(returned.len(), 800);
    }
}
