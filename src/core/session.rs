//! Console session
//!
//! Binds one child process to one presentation sink. Process notifications
//! arrive through the UI dispatcher and are applied here, on the UI thread,
//! together with echo suppression and command history.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, trace};

use super::dispatch::{DispatchError, DispatchHandle, UiDispatcher, UiMessage};
use super::echo::EchoSuppressor;
use super::events::{
    ConsoleInputEvent, ConsoleOutputEvent, PropertyChange, StreamKind, Subscribers,
    SubscriptionId,
};
use super::process::{ProcessBackend, ProcessEvent, ProcessInterface};
use crate::config::Config;
use crate::history::CommandHistory;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// How a piece of console text is presented
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStyle {
    /// Process stdout and echoed input
    Normal,
    /// Process stderr
    Error,
    /// Locally generated start/exit announcements
    Diagnostic,
}

/// Semantic keys the session reacts to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleKey {
    /// Commit the input line
    Submit,
    HistoryUp,
    HistoryDown,
}

/// The rendering surface a session writes to
pub trait PresentationSink {
    /// Append text to the scrollback in the given style
    fn append_output(&mut self, text: &str, style: OutputStyle);

    /// Current contents of the input line
    fn input_text(&self) -> String;

    fn set_input_text(&mut self, text: &str);
}

/// Session options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub show_diagnostics: bool,
    pub input_enabled: bool,
    /// Echo submitted lines into the scrollback
    pub echo_input: bool,
    /// History capacity, 0 for unlimited
    pub history_limit: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            show_diagnostics: false,
            input_enabled: true,
            echo_input: true,
            history_limit: crate::history::HISTORY_LIMIT,
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            show_diagnostics: config.show_diagnostics,
            input_enabled: config.input_enabled,
            echo_input: config.echo_input,
            history_limit: config.history_limit,
        }
    }
}

/// Sendable handle for writing to a session from other threads.
///
/// Writes are queued and applied the next time the UI thread pumps.
#[derive(Clone, Debug)]
pub struct ConsoleHandle {
    dispatch: DispatchHandle,
}

impl ConsoleHandle {
    pub fn write_output(&self, text: impl Into<String>, style: OutputStyle) -> bool {
        self.dispatch.post(UiMessage::WriteOutput {
            text: text.into(),
            style,
        })
    }

    pub fn write_input(&self, text: impl Into<String>, style: OutputStyle, echo: bool) -> bool {
        self.dispatch.post(UiMessage::WriteInput {
            text: text.into(),
            style,
            echo,
        })
    }
}

/// A console session
pub struct Session<P: ProcessBackend, S: PresentationSink> {
    process: P,
    sink: S,
    dispatcher: UiDispatcher,
    history: CommandHistory,
    echo: EchoSuppressor,
    show_diagnostics: bool,
    input_enabled: bool,
    echo_input: bool,
    process_running: bool,
    output_subscribers: Subscribers<ConsoleOutputEvent>,
    input_subscribers: Subscribers<ConsoleInputEvent>,
    property_subscribers: Subscribers<PropertyChange>,
}

impl<S: PresentationSink> Session<ProcessInterface, S> {
    /// Create a session backed by a real child process.
    ///
    /// Must be called on the UI thread; that thread owns the dispatcher.
    pub fn with_process(settings: SessionSettings, sink: S) -> Self {
        let dispatcher = UiDispatcher::new();
        let process = ProcessInterface::new(dispatcher.handle());
        Self::new(settings, dispatcher, process, sink)
    }
}

impl<P: ProcessBackend, S: PresentationSink> Session<P, S> {
    pub fn new(settings: SessionSettings, dispatcher: UiDispatcher, process: P, sink: S) -> Self {
        Self {
            process,
            sink,
            dispatcher,
            history: CommandHistory::with_limit(settings.history_limit),
            echo: EchoSuppressor::new(),
            show_diagnostics: settings.show_diagnostics,
            input_enabled: settings.input_enabled,
            echo_input: settings.echo_input,
            process_running: false,
            output_subscribers: Subscribers::new(),
            input_subscribers: Subscribers::new(),
            property_subscribers: Subscribers::new(),
        }
    }

    /// Start the child process
    pub fn start_process(&mut self, file_name: &str, arguments: &str) {
        if self.show_diagnostics {
            self.append(&format!("Preparing to run {}", file_name), OutputStyle::Diagnostic);
            if arguments.is_empty() {
                self.append(".\n", OutputStyle::Diagnostic);
            } else {
                self.append(
                    &format!(" with arguments {}.\n", arguments),
                    OutputStyle::Diagnostic,
                );
            }
        }

        self.process.start_process(file_name, arguments);
        self.set_process_running(true);
    }

    /// Request the child to stop. `is_process_running` flips on the exit notification.
    pub fn stop_process(&mut self) {
        self.process.stop_process();
    }

    /// Write text to the scrollback, dropping it if it only echoes the last input
    pub fn write_output(&mut self, text: &str, style: OutputStyle) {
        if self.echo.should_suppress(text) {
            trace!("Suppressed echo of last input");
            return;
        }
        self.append(text, style);
    }

    /// Send a line to the process, optionally echoing it locally
    pub fn write_input(&mut self, text: &str, style: OutputStyle, echo: bool) {
        if echo {
            self.append(&format!("{}\n", text), style);
        }

        self.echo.set_last_input(text);
        self.process.write_input(text);
        self.input_subscribers.emit(&ConsoleInputEvent {
            content: text.to_string(),
        });
    }

    /// Clearing the scrollback is not implemented
    pub fn clear_output(&mut self) -> Result<(), ConsoleError> {
        Err(ConsoleError::Unsupported("clear_output"))
    }

    /// React to a semantic key from the front end
    pub fn handle_key(&mut self, key: ConsoleKey) {
        match key {
            ConsoleKey::Submit => {
                let input = self.sink.input_text();
                self.history.record(&input);
                self.sink.set_input_text("");
                self.write_input(&input, OutputStyle::Normal, self.echo_input);
            }
            ConsoleKey::HistoryUp => {
                if let Some(command) = self.history.recall_previous() {
                    self.sink.set_input_text(command);
                }
            }
            ConsoleKey::HistoryDown => {
                if let Some(command) = self.history.recall_next() {
                    self.sink.set_input_text(command);
                }
            }
        }
    }

    /// Apply every queued message without blocking. Returns how many were applied.
    pub fn pump(&mut self) -> Result<usize, ConsoleError> {
        let mut applied = 0;
        while let Some(msg) = self.dispatcher.try_next()? {
            self.apply(msg);
            applied += 1;
        }
        Ok(applied)
    }

    /// Wait up to `timeout` for a message, then apply everything queued
    pub fn pump_timeout(&mut self, timeout: Duration) -> Result<usize, ConsoleError> {
        match self.dispatcher.next_timeout(timeout)? {
            Some(msg) => {
                self.apply(msg);
                Ok(1 + self.pump()?)
            }
            None => Ok(0),
        }
    }

    pub fn handle(&self) -> ConsoleHandle {
        ConsoleHandle {
            dispatch: self.dispatcher.handle(),
        }
    }

    fn apply(&mut self, msg: UiMessage) {
        match msg {
            UiMessage::Process(event) => self.on_process_event(event),
            UiMessage::WriteOutput { text, style } => self.write_output(&text, style),
            UiMessage::WriteInput { text, style, echo } => self.write_input(&text, style, echo),
        }
    }

    fn on_process_event(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::Output(content) => {
                self.write_output(&content, OutputStyle::Normal);
                // Forwarded even when suppressed from display
                self.output_subscribers.emit(&ConsoleOutputEvent {
                    content,
                    stream: StreamKind::Stdout,
                });
            }
            ProcessEvent::Error(content) => {
                self.append(&content, OutputStyle::Error);
                self.output_subscribers.emit(&ConsoleOutputEvent {
                    content,
                    stream: StreamKind::Stderr,
                });
            }
            ProcessEvent::InputEcho(content) => {
                // Subscribers were already notified by write_input
                trace!("Process accepted input: {:?}", content);
            }
            ProcessEvent::Exited { run, code } => {
                if run != self.process.current_run() {
                    debug!("Ignoring exit of earlier run {} ({:?})", run, code);
                    return;
                }
                info!("{} exited ({:?})", self.process.process_file_name(), code);
                if self.show_diagnostics {
                    let line = format!("\n{} exited.", self.process.process_file_name());
                    self.append(&line, OutputStyle::Diagnostic);
                }
                self.set_process_running(false);
            }
        }
    }

    fn append(&mut self, text: &str, style: OutputStyle) {
        self.sink.append_output(text, style);
    }

    fn set_process_running(&mut self, running: bool) {
        if self.process_running != running {
            self.process_running = running;
            self.property_subscribers
                .emit(&PropertyChange::ProcessRunning(running));
        }
    }

    pub fn is_process_running(&self) -> bool {
        self.process_running
    }

    pub fn show_diagnostics(&self) -> bool {
        self.show_diagnostics
    }

    pub fn set_show_diagnostics(&mut self, show: bool) {
        if self.show_diagnostics != show {
            debug!("show_diagnostics = {}", show);
            self.show_diagnostics = show;
            self.property_subscribers
                .emit(&PropertyChange::ShowDiagnostics(show));
        }
    }

    /// Whether the input line accepts typing. Enforced by the front end.
    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    pub fn set_input_enabled(&mut self, enabled: bool) {
        if self.input_enabled != enabled {
            debug!("input_enabled = {}", enabled);
            self.input_enabled = enabled;
            self.property_subscribers
                .emit(&PropertyChange::InputEnabled(enabled));
        }
    }

    pub fn subscribe_output(
        &mut self,
        callback: impl FnMut(&ConsoleOutputEvent) + 'static,
    ) -> SubscriptionId {
        self.output_subscribers.subscribe(callback)
    }

    pub fn unsubscribe_output(&mut self, id: SubscriptionId) -> bool {
        self.output_subscribers.unsubscribe(id)
    }

    pub fn subscribe_input(
        &mut self,
        callback: impl FnMut(&ConsoleInputEvent) + 'static,
    ) -> SubscriptionId {
        self.input_subscribers.subscribe(callback)
    }

    pub fn unsubscribe_input(&mut self, id: SubscriptionId) -> bool {
        self.input_subscribers.unsubscribe(id)
    }

    pub fn subscribe_properties(
        &mut self,
        callback: impl FnMut(&PropertyChange) + 'static,
    ) -> SubscriptionId {
        self.property_subscribers.subscribe(callback)
    }

    pub fn unsubscribe_properties(&mut self, id: SubscriptionId) -> bool {
        self.property_subscribers.unsubscribe(id)
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn process(&self) -> &P {
        &self.process
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
