//! Child process interface
//!
//! Spawns a child with piped stdio and pumps its streams on background
//! threads. Every notification is posted to the UI dispatcher; nothing here
//! touches the session directly.

use std::io::{self, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use super::dispatch::DispatchHandle;

#[cfg(windows)]
const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
const LINE_ENDING: &str = "\n";

/// Read buffer size for the stream pumps
const READ_BUFFER_SIZE: usize = 4096;

/// Poll interval while waiting for the child to be reaped
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("No program given")]
    EmptyCommand,

    #[error("Unterminated quote in arguments")]
    UnterminatedQuote,

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start {0} thread: {1}")]
    Thread(&'static str, #[source] io::Error),
}

pub type Result<T> = std::result::Result<T, ProcessError>;

/// Notifications from the process interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A read from stdout
    Output(String),
    /// A read from stderr
    Error(String),
    /// A line was written to stdin
    InputEcho(String),
    /// The child started by `run` has exited (or never started)
    Exited { run: u64, code: Option<i32> },
}

/// What the session needs from a process
pub trait ProcessBackend {
    /// Spawn `file_name` with a command-line style `arguments` string.
    ///
    /// Failures are not returned; they surface as an immediate
    /// [`ProcessEvent::Exited`] with no preceding output. Every accepted
    /// start begins a new run.
    fn start_process(&mut self, file_name: &str, arguments: &str);

    /// Request termination. Does nothing when no process is running.
    fn stop_process(&mut self);

    /// Write a line to the child's stdin. Does nothing when no process is running.
    fn write_input(&mut self, text: &str);

    /// File name of the most recently started process
    fn process_file_name(&self) -> &str;

    fn is_running(&self) -> bool;

    /// Run number of the most recent start, 0 before the first
    fn current_run(&self) -> u64;
}

/// Process interface over `std::process`
pub struct ProcessInterface {
    events: DispatchHandle,
    file_name: String,
    arguments: String,
    child: Option<Arc<Mutex<Child>>>,
    stdin_tx: Option<Sender<String>>,
    running: Arc<AtomicBool>,
    run: u64,
}

impl ProcessInterface {
    pub fn new(events: DispatchHandle) -> Self {
        Self {
            events,
            file_name: String::new(),
            arguments: String::new(),
            child: None,
            stdin_tx: None,
            running: Arc::new(AtomicBool::new(false)),
            run: 0,
        }
    }

    /// Arguments of the most recently started process
    pub fn process_arguments(&self) -> &str {
        &self.arguments
    }

    fn spawn(&mut self) -> Result<()> {
        if self.file_name.trim().is_empty() {
            return Err(ProcessError::EmptyCommand);
        }
        let args = split_arguments(&self.arguments)?;

        let mut child = Command::new(&self.file_name)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: self.file_name.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let child = Arc::new(Mutex::new(child));

        // Set before the reaper exists so a fast exit can't be overwritten
        self.running.store(true, Ordering::SeqCst);
        if let Err(e) = self.spawn_threads(&child, stdin, stdout, stderr) {
            // Don't leave an orphan behind without pumps
            let _ = lock_child(&child).kill();
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        self.child = Some(child);
        Ok(())
    }

    fn spawn_threads(
        &mut self,
        child: &Arc<Mutex<Child>>,
        stdin: Option<ChildStdin>,
        stdout: Option<impl Read + Send + 'static>,
        stderr: Option<impl Read + Send + 'static>,
    ) -> Result<()> {
        let mut readers = Vec::new();

        if let Some(out) = stdout {
            let events = self.events.clone();
            readers.push(spawn_named("stdout", move || {
                pump_stream(out, &events, ProcessEvent::Output)
            })?);
        }

        if let Some(err) = stderr {
            let events = self.events.clone();
            readers.push(spawn_named("stderr", move || {
                pump_stream(err, &events, ProcessEvent::Error)
            })?);
        }

        if let Some(stdin) = stdin {
            let (tx, rx) = mpsc::channel::<String>();
            let events = self.events.clone();
            spawn_named("stdin", move || write_lines(stdin, rx, &events))?;
            self.stdin_tx = Some(tx);
        }

        let child = child.clone();
        let running = self.running.clone();
        let events = self.events.clone();
        let run = self.run;
        spawn_named("reaper", move || {
            // Readers finish once the child closes its output
            for reader in readers {
                let _ = reader.join();
            }
            let code = reap(&child);
            running.store(false, Ordering::SeqCst);
            info!("Process exited with code {:?}", code);
            events.post_process(ProcessEvent::Exited { run, code });
        })?;

        Ok(())
    }
}

impl ProcessBackend for ProcessInterface {
    fn start_process(&mut self, file_name: &str, arguments: &str) {
        if self.is_running() {
            warn!(
                "Refusing to start {}: {} is still running",
                file_name, self.file_name
            );
            return;
        }

        self.file_name = file_name.to_string();
        self.arguments = arguments.to_string();
        self.child = None;
        self.stdin_tx = None;
        self.run += 1;

        match self.spawn() {
            Ok(()) => info!("Started {} {}", self.file_name, self.arguments),
            Err(e) => {
                error!("Failed to start process: {}", e);
                self.events.post_process(ProcessEvent::Exited {
                    run: self.run,
                    code: None,
                });
            }
        }
    }

    fn stop_process(&mut self) {
        if !self.is_running() {
            debug!("Stop requested with no process running");
            return;
        }
        if let Some(child) = &self.child {
            match lock_child(child).kill() {
                Ok(()) => info!("Sent kill to {}", self.file_name),
                Err(e) => debug!("Kill failed, process likely exited: {}", e),
            }
        }
    }

    fn write_input(&mut self, text: &str) {
        if !self.is_running() {
            debug!("Dropping input, no process running");
            return;
        }
        if let Some(tx) = &self.stdin_tx {
            if tx.send(text.to_string()).is_err() {
                debug!("Dropping input, stdin writer has stopped");
            }
        }
    }

    fn process_file_name(&self) -> &str {
        &self.file_name
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn current_run(&self) -> u64 {
        self.run
    }
}

impl Drop for ProcessInterface {
    fn drop(&mut self) {
        // Pump threads are detached; killing the child closes their pipes
        self.stop_process();
    }
}

fn spawn_named<F>(name: &'static str, f: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(format!("procterm-{}", name))
        .spawn(f)
        .map_err(|e| ProcessError::Thread(name, e))
}

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Poll until the child is reaped. The lock is released between polls so
/// `stop_process` can still kill it.
fn reap(child: &Mutex<Child>) -> Option<i32> {
    loop {
        match lock_child(child).try_wait() {
            Ok(Some(status)) => return status.code(),
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to wait on process: {}", e);
                return None;
            }
        }
        thread::sleep(REAP_POLL_INTERVAL);
    }
}

/// Read a stream until EOF, posting each read as one event
fn pump_stream<R: Read>(stream: R, events: &DispatchHandle, wrap: fn(String) -> ProcessEvent) {
    let mut reader = BufReader::new(stream);
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut decoder = Utf8Decoder::default();

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                let content = decoder.decode(&buffer[..n]);
                if content.is_empty() {
                    continue;
                }
                trace!("Read {} bytes", n);
                if !events.post_process(wrap(content)) {
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Stream read failed: {}", e);
                break;
            }
        }
    }

    if let Some(rest) = decoder.finish() {
        events.post_process(wrap(rest));
    }
}

/// Own the child's stdin, writing each queued line
fn write_lines(mut stdin: ChildStdin, lines: Receiver<String>, events: &DispatchHandle) {
    for line in lines {
        let result = stdin
            .write_all(line.as_bytes())
            .and_then(|_| stdin.write_all(LINE_ENDING.as_bytes()))
            .and_then(|_| stdin.flush());

        match result {
            Ok(()) => {
                events.post_process(ProcessEvent::InputEcho(line));
            }
            Err(e) => {
                debug!("Stdin write failed, stopping writer: {}", e);
                break;
            }
        }
    }
}

/// Decodes a byte stream without splitting multi-byte characters across reads
#[derive(Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let keep_from = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // Incomplete sequence at the end, hold it for the next read
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };

        let tail = self.pending.split_off(keep_from);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        text
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(text)
    }
}

/// Split a command-line string into arguments.
///
/// Whitespace separates words; `'...'` is literal; `"..."` groups and
/// honors `\"` and `\\`. A backslash outside quotes escapes a quote,
/// backslash or whitespace and is kept literally otherwise.
pub fn split_arguments(arguments: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = arguments.chars().peekable();

    while let Some(ch) = chars.next() {
        match quote {
            Some('\'') => {
                if ch == '\'' {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            Some(_) => match ch {
                '"' => quote = None,
                '\\' if matches!(chars.peek(), Some('"') | Some('\\')) => {
                    current.extend(chars.next());
                }
                _ => current.push(ch),
            },
            None => match ch {
                c if c.is_whitespace() => {
                    if in_word {
                        args.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                '\'' | '"' => {
                    quote = Some(ch);
                    in_word = true;
                }
                '\\' => {
                    in_word = true;
                    match chars.peek() {
                        Some(&c) if c == '"' || c == '\'' || c == '\\' || c.is_whitespace() => {
                            current.push(c);
                            chars.next();
                        }
                        _ => current.push('\\'),
                    }
                }
                _ => {
                    current.push(ch);
                    in_word = true;
                }
            },
        }
    }

    if quote.is_some() {
        return Err(ProcessError::UnterminatedQuote);
    }
    if in_word {
        args.push(current);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::{UiDispatcher, UiMessage};
    use std::time::Instant;

    /// Drain process events until `Exited` or the deadline passes
    fn collect_until_exit(dispatcher: &UiDispatcher) -> Vec<ProcessEvent> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut events = Vec::new();
        while Instant::now() < deadline {
            if let Some(UiMessage::Process(event)) =
                dispatcher.next_timeout(Duration::from_millis(50)).unwrap()
            {
                let done = matches!(event, ProcessEvent::Exited { .. });
                events.push(event);
                if done {
                    break;
                }
            }
        }
        events
    }

    fn stream_text(events: &[ProcessEvent], stdout: bool) -> String {
        events
            .iter()
            .filter_map(|e| match (e, stdout) {
                (ProcessEvent::Output(s), true) | (ProcessEvent::Error(s), false) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_split_arguments() {
        assert_eq!(split_arguments("").unwrap(), Vec::<String>::new());
        assert_eq!(split_arguments("  -l   -a ").unwrap(), ["-l", "-a"]);
        assert_eq!(
            split_arguments(r#"-c "echo hi; exit 1" 'a b'"#).unwrap(),
            ["-c", "echo hi; exit 1", "a b"]
        );
        assert_eq!(split_arguments(r#""say \"hi\"""#).unwrap(), [r#"say "hi""#]);
        assert_eq!(split_arguments(r"one\ word").unwrap(), ["one word"]);
        assert_eq!(split_arguments(r"C:\tools\x.exe").unwrap(), [r"C:\tools\x.exe"]);
        assert_eq!(split_arguments(r#""""#).unwrap(), [""]);
    }

    #[test]
    fn test_split_arguments_unterminated_quote() {
        assert!(matches!(
            split_arguments("'open"),
            Err(ProcessError::UnterminatedQuote)
        ));
        assert!(matches!(
            split_arguments("\"open"),
            Err(ProcessError::UnterminatedQuote)
        ));
    }

    #[test]
    fn test_utf8_decoder_holds_split_sequence() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "héllo".as_bytes();
        // Split inside the two-byte 'é'
        assert_eq!(decoder.decode(&bytes[..2]), "h");
        assert_eq!(decoder.decode(&bytes[2..]), "éllo");
        assert_eq!(decoder.finish(), None);

        assert_eq!(decoder.decode(&[0xE3, 0x81]), "");
        assert_eq!(decoder.finish(), Some("\u{FFFD}".to_string()));
    }

    #[test]
    fn test_write_and_stop_without_process_are_noops() {
        let dispatcher = UiDispatcher::new();
        let mut process = ProcessInterface::new(dispatcher.handle());

        process.write_input("ignored");
        process.stop_process();
        process.stop_process();

        assert!(!process.is_running());
        assert_eq!(dispatcher.try_next().unwrap(), None);
    }

    #[test]
    fn test_spawn_failure_surfaces_as_exit() {
        let dispatcher = UiDispatcher::new();
        let mut process = ProcessInterface::new(dispatcher.handle());

        process.start_process("procterm-no-such-program-3f9a", "-x 'y z'");

        assert!(!process.is_running());
        assert_eq!(
            collect_until_exit(&dispatcher),
            [ProcessEvent::Exited { run: 1, code: None }]
        );
        assert_eq!(process.process_file_name(), "procterm-no-such-program-3f9a");
        assert_eq!(process.process_arguments(), "-x 'y z'");
        assert_eq!(process.current_run(), 1);
    }

    #[test]
    fn test_bad_arguments_surface_as_exit() {
        let dispatcher = UiDispatcher::new();
        let mut process = ProcessInterface::new(dispatcher.handle());

        process.start_process("sh", "-c 'unterminated");

        assert_eq!(
            collect_until_exit(&dispatcher),
            [ProcessEvent::Exited { run: 1, code: None }]
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_child_streams_and_exit() {
        let dispatcher = UiDispatcher::new();
        let mut process = ProcessInterface::new(dispatcher.handle());

        process.start_process("sh", r#"-c "echo out; echo err 1>&2; exit 3""#);
        let events = collect_until_exit(&dispatcher);

        assert_eq!(stream_text(&events, true), "out\n");
        assert_eq!(stream_text(&events, false), "err\n");
        assert_eq!(
            events.last(),
            Some(&ProcessEvent::Exited {
                run: 1,
                code: Some(3)
            })
        );
        assert!(!process.is_running());
    }

    #[test]
    #[cfg(unix)]
    fn test_write_input_reaches_child_and_stop_ends_it() {
        let dispatcher = UiDispatcher::new();
        let mut process = ProcessInterface::new(dispatcher.handle());

        process.start_process("cat", "");
        assert!(process.is_running());
        process.write_input("ping");

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut echoed = false;
        let mut output = String::new();
        while Instant::now() < deadline && !(echoed && output == "ping\n") {
            match dispatcher.next_timeout(Duration::from_millis(50)).unwrap() {
                Some(UiMessage::Process(ProcessEvent::InputEcho(s))) => {
                    assert_eq!(s, "ping");
                    echoed = true;
                }
                Some(UiMessage::Process(ProcessEvent::Output(s))) => output.push_str(&s),
                _ => {}
            }
        }
        assert!(echoed);
        assert_eq!(output, "ping\n");

        // A second start while running is refused
        process.start_process("sh", "-c 'echo nope'");
        assert_eq!(process.process_file_name(), "cat");
        assert_eq!(process.current_run(), 1);

        process.stop_process();
        let events = collect_until_exit(&dispatcher);
        assert!(matches!(events.last(), Some(ProcessEvent::Exited { run: 1, .. })));
        assert!(!process.is_running());

        process.stop_process();
        process.write_input("after exit");
        assert_eq!(dispatcher.try_next().unwrap(), None);
    }

    #[test]
    #[cfg(unix)]
    fn test_fast_exits_never_leave_running_set() {
        let dispatcher = UiDispatcher::new();
        let mut process = ProcessInterface::new(dispatcher.handle());

        for run in 1..=50 {
            process.start_process("true", "");
            let events = collect_until_exit(&dispatcher);
            assert_eq!(
                events.last(),
                Some(&ProcessEvent::Exited {
                    run,
                    code: Some(0)
                })
            );
            assert!(!process.is_running(), "still running after run {}", run);
        }
        assert_eq!(process.current_run(), 50);
    }
}
