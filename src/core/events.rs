//! Outward notifications
//!
//! Subscribers register callbacks for console output, console input and
//! property changes. Callbacks run on the UI thread in registration order.

use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

/// Which process stream produced a line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// A line of process output, forwarded whether or not it was displayed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsoleOutputEvent {
    pub content: String,
    pub stream: StreamKind,
}

/// A line sent to the process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsoleInputEvent {
    pub content: String,
}

/// Session property that changed value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyChange {
    ShowDiagnostics(bool),
    InputEnabled(bool),
    ProcessRunning(bool),
}

/// Handle returned by [`Subscribers::subscribe`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Box<dyn FnMut(&T)>;

/// Ordered list of callbacks for one event type
pub struct Subscribers<T> {
    callbacks: Vec<(SubscriptionId, Callback<T>)>,
    next_id: u64,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            callbacks: Vec::new(),
            next_id: 1,
        }
    }
}

impl<T> Subscribers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(sid, _)| *sid != id);
        self.callbacks.len() != before
    }

    /// Invoke every callback in registration order.
    ///
    /// A panicking callback is logged and skipped; the rest still run.
    pub fn emit(&mut self, event: &T) {
        for (id, callback) in self.callbacks.iter_mut() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(event)));
            if result.is_err() {
                warn!("Subscriber {:?} panicked; continuing with remaining subscribers", id);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_emit_in_registration_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut subs: Subscribers<u32> = Subscribers::new();

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            subs.subscribe(move |v| seen.borrow_mut().push(format!("{}:{}", tag, v)));
        }
        subs.emit(&7);

        assert_eq!(*seen.borrow(), ["first:7", "second:7", "third:7"]);
    }

    #[test]
    fn test_panicking_subscriber_does_not_stop_others() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut subs: Subscribers<&str> = Subscribers::new();

        subs.subscribe(|_| panic!("subscriber failure"));
        let s = seen.clone();
        subs.subscribe(move |v| s.borrow_mut().push(v.to_string()));

        subs.emit(&"a");
        subs.emit(&"b");
        assert_eq!(*seen.borrow(), ["a", "b"]);
    }

    #[test]
    fn test_unsubscribe() {
        let count = Rc::new(RefCell::new(0));
        let mut subs: Subscribers<()> = Subscribers::new();

        let c = count.clone();
        let id = subs.subscribe(move |_| *c.borrow_mut() += 1);
        subs.emit(&());
        assert!(subs.unsubscribe(id));
        assert!(!subs.unsubscribe(id));
        subs.emit(&());

        assert_eq!(*count.borrow(), 1);
        assert!(subs.is_empty());
    }
}
