//! Core console session components.
//!
//! This module contains the process bridging logic:
//!
//! - **process**: Child process with piped stdio and background stream pumps
//! - **dispatch**: FIFO queue marshalling background work onto the UI thread
//! - **echo**: Suppression of output that only repeats the last input
//! - **events**: Ordered subscriber lists for outward notifications
//! - **session**: Session controller tying the pieces to a presentation sink
//!
//! # Architecture
//!
//! ```text
//! Session (UI thread)
//! ├── ProcessInterface ──(stdout/stderr/stdin/reaper threads)──┐
//! ├── UiDispatcher  <──────────── ProcessEvent ────────────────┘
//! ├── EchoSuppressor
//! ├── CommandHistory
//! └── PresentationSink (renderer)
//! ```

pub mod dispatch;
pub mod echo;
pub mod events;
pub mod process;
pub mod session;
