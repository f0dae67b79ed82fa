//! Blocking iterator over state change events
//!
//! Provides various iteration patterns for consuming change events:
//! - Blocking: `recv()`, `for event in iter`
//! - Non-blocking: `try_recv()`, `try_iter()`
//! - Timeout: `recv_timeout()`, `timeout_iter()`

use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use crate::event::StateChanged;

/// Blocking iterator over state change events
///
/// Receives change events for watched contexts via `std::sync::mpsc`.
/// All methods are synchronous.
///
/// # Example
///
/// ```rust,ignore
/// // Drain whatever happened during the last tick
/// for event in dict.changes().try_iter() {
///     println!("{}/{} = {}", event.context, event.variable, event.value);
/// }
/// ```
pub struct ChangeIterator {
    rx: Arc<Mutex<mpsc::Receiver<StateChanged>>>,
}

impl ChangeIterator {
    pub(crate) fn new(rx: Arc<Mutex<mpsc::Receiver<StateChanged>>>) -> Self {
        Self { rx }
    }

    /// Block until the next event is available
    ///
    /// Returns `None` if the channel is closed.
    pub fn recv(&self) -> Option<StateChanged> {
        self.rx.lock().ok()?.recv().ok()
    }

    /// Block until the next event or timeout expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<StateChanged> {
        self.rx.lock().ok()?.recv_timeout(timeout).ok()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<StateChanged> {
        self.rx.lock().ok()?.try_recv().ok()
    }

    /// Non-blocking iterator over currently queued events
    pub fn try_iter(&self) -> TryIter<'_> {
        TryIter { inner: self }
    }

    /// Iterator that waits up to `timeout` for each event
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIter<'_> {
        TimeoutIter {
            inner: self,
            timeout,
        }
    }
}

impl Iterator for ChangeIterator {
    type Item = StateChanged;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

/// Non-blocking iterator over currently available events
pub struct TryIter<'a> {
    inner: &'a ChangeIterator,
}

impl<'a> Iterator for TryIter<'a> {
    type Item = StateChanged;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

/// Blocking iterator with timeout
pub struct TimeoutIter<'a> {
    inner: &'a ChangeIterator,
    timeout: Duration,
}

impl<'a> Iterator for TimeoutIter<'a> {
    type Item = StateChanged;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.recv_timeout(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;
    use std::time::Instant;

    fn create_test_event() -> StateChanged {
        StateChanged::new("player", "status", json!("playing"))
    }

    fn channel() -> (mpsc::Sender<StateChanged>, ChangeIterator) {
        let (tx, rx) = mpsc::channel();
        (tx, ChangeIterator::new(Arc::new(Mutex::new(rx))))
    }

    #[test]
    fn test_try_recv_empty() {
        let (_tx, iter) = channel();
        assert!(iter.try_recv().is_none());
    }

    #[test]
    fn test_try_recv_with_event() {
        let (tx, iter) = channel();
        tx.send(create_test_event()).unwrap();

        let event = iter.try_recv().unwrap();
        assert_eq!(event.variable, "status");
        assert!(iter.try_recv().is_none());
    }

    #[test]
    fn test_recv_timeout() {
        let (_tx, iter) = channel();

        let start = Instant::now();
        assert!(iter.recv_timeout(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_try_iter() {
        let (tx, iter) = channel();
        for _ in 0..3 {
            tx.send(create_test_event()).unwrap();
        }

        assert_eq!(iter.try_iter().count(), 3);
        assert!(iter.try_recv().is_none());
    }

    #[test]
    fn test_blocking_recv() {
        let (tx, iter) = channel();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            tx.send(create_test_event()).unwrap();
        });

        let event = iter.recv().unwrap();
        assert_eq!(event.context, "player");
    }

    #[test]
    fn test_channel_closed() {
        let (tx, iter) = channel();
        drop(tx);
        assert!(iter.recv().is_none());
    }
}
