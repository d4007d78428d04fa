//! UI dispatcher
//!
//! The UI thread owns the session and its presentation sink. Background
//! threads never touch either; they post messages into a FIFO queue that
//! the UI thread drains with [`UiDispatcher::try_next`].

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use thiserror::Error;

use super::process::ProcessEvent;
use super::session::OutputStyle;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DispatchError {
    #[error("UI queue drained from a thread other than the one that owns it")]
    WrongThread,
}

/// Work marshalled onto the UI thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiMessage {
    /// Notification from the process interface
    Process(ProcessEvent),
    /// Output written from another thread
    WriteOutput { text: String, style: OutputStyle },
    /// Input written from another thread
    WriteInput {
        text: String,
        style: OutputStyle,
        echo: bool,
    },
}

/// The UI-owned end of the queue
pub struct UiDispatcher {
    owner: ThreadId,
    tx: Sender<UiMessage>,
    rx: Receiver<UiMessage>,
}

impl Default for UiDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl UiDispatcher {
    /// Create a dispatcher owned by the calling thread
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            owner: thread::current().id(),
            tx,
            rx,
        }
    }

    /// Get a sendable handle for posting from any thread
    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle {
            owner: self.owner,
            tx: self.tx.clone(),
        }
    }

    /// Whether the calling thread is the UI thread
    pub fn check_access(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Take the next queued message without blocking
    pub fn try_next(&self) -> Result<Option<UiMessage>, DispatchError> {
        self.ensure_access()?;
        match self.rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            // The dispatcher holds a sender itself, so the queue never disconnects
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }

    /// Wait up to `timeout` for the next queued message
    pub fn next_timeout(&self, timeout: Duration) -> Result<Option<UiMessage>, DispatchError> {
        self.ensure_access()?;
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn ensure_access(&self) -> Result<(), DispatchError> {
        if self.check_access() {
            Ok(())
        } else {
            Err(DispatchError::WrongThread)
        }
    }
}

/// Posting end of the UI queue
#[derive(Clone, Debug)]
pub struct DispatchHandle {
    owner: ThreadId,
    tx: Sender<UiMessage>,
}

impl DispatchHandle {
    /// Queue a message. Returns false once the UI side is gone.
    pub fn post(&self, msg: UiMessage) -> bool {
        self.tx.send(msg).is_ok()
    }

    pub fn post_process(&self, event: ProcessEvent) -> bool {
        self.post(UiMessage::Process(event))
    }

    /// Whether the calling thread is the UI thread
    pub fn check_access(&self) -> bool {
        thread::current().id() == self.owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_drain_in_fifo_order() {
        let dispatcher = UiDispatcher::new();
        let handle = dispatcher.handle();

        handle.post_process(ProcessEvent::Output("A".into()));
        handle.post_process(ProcessEvent::Error("B".into()));
        handle.post_process(ProcessEvent::Output("C".into()));

        let mut drained = Vec::new();
        while let Some(msg) = dispatcher.try_next().unwrap() {
            drained.push(msg);
        }
        assert_eq!(
            drained,
            vec![
                UiMessage::Process(ProcessEvent::Output("A".into())),
                UiMessage::Process(ProcessEvent::Error("B".into())),
                UiMessage::Process(ProcessEvent::Output("C".into())),
            ]
        );
    }

    #[test]
    fn test_background_posts_arrive() {
        let dispatcher = UiDispatcher::new();
        let handle = dispatcher.handle();

        let worker = thread::spawn(move || {
            assert!(!handle.check_access());
            handle.post(UiMessage::WriteOutput {
                text: "from worker".into(),
                style: OutputStyle::Normal,
            })
        });
        assert!(worker.join().unwrap());

        let msg = dispatcher.next_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(
            msg,
            Some(UiMessage::WriteOutput {
                text: "from worker".into(),
                style: OutputStyle::Normal,
            })
        );
        assert!(dispatcher.check_access());
        assert_eq!(dispatcher.try_next(), Ok(None));
    }

    #[test]
    fn test_draining_off_thread_is_refused() {
        let dispatcher = UiDispatcher::new();
        let result = thread::spawn(move || dispatcher.try_next()).join().unwrap();
        assert_eq!(result, Err(DispatchError::WrongThread));
    }
}
