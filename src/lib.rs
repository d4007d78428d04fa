//! procterm - a console session over a child process's stdio
//!
//! The session core is independent of any UI toolkit: a front end
//! implements [`core::session::PresentationSink`] and feeds semantic keys to
//! [`core::session::Session`]. The crossterm front end in [`ui`] is one such
//! implementation.
//!
//! ```no_run
//! use procterm::core::session::{ConsoleKey, PresentationSink, Session, SessionSettings};
//! use procterm::ui::ConsoleView;
//!
//! let mut session = Session::with_process(SessionSettings::default(), ConsoleView::default());
//! session.start_process("sh", "-i");
//! session.sink_mut().set_input_text("echo hi");
//! session.handle_key(ConsoleKey::Submit);
//! session.pump_timeout(std::time::Duration::from_millis(100)).unwrap();
//! ```

pub mod config;
pub mod core;
pub mod history;
pub mod ui;
