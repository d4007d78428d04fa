//! procterm - a scrollable console for a child process
//!
//! procterm runs a program with piped stdin/stdout/stderr and presents it as
//! a console session: output scrolls by as it arrives, typed lines are sent
//! to the program, and earlier lines can be recalled with the arrow keys.
//!
//! # Quick Start
//!
//! ```text
//! procterm                     # Run $SHELL (or sh / cmd.exe)
//! procterm python3 -i          # Run an interactive Python
//! procterm -d -- ls -la        # Announce start and exit
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | Enter | Send the input line |
//! | Up/Down | Recall history |
//! | PageUp/PageDown | Scroll output |
//! | Ctrl+End | Jump to newest output |
//! | Ctrl+C | Stop the program |
//! | Ctrl+Q | Quit |

use std::env;
use std::time::Duration;

use crossterm::event::{self, Event};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use procterm::config::{self, ColorScheme, Config};
use procterm::core::process::ProcessInterface;
use procterm::core::session::{Session, SessionSettings};
use procterm::ui::{ConsoleView, InputAction, KeyMapper, Renderer, StatusInfo};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long to wait for a key before pumping process output again
const INPUT_POLL: Duration = Duration::from_millis(10);

type ConsoleSession = Session<ProcessInterface, ConsoleView>;

/// Command line options. `None` means "use the config file".
#[derive(Debug, Default, PartialEq)]
struct CliOptions {
    /// Program to run
    program: Option<String>,
    /// Program arguments as a single command-line string
    arguments: String,
    show_diagnostics: Option<bool>,
    echo_input: Option<bool>,
    input_enabled: Option<bool>,
    color_scheme: Option<String>,
}

fn print_version() {
    eprintln!("procterm {}", VERSION);
}

fn print_help() {
    eprintln!("procterm {} - a scrollable console for a child process", VERSION);
    eprintln!();
    eprintln!("Usage: procterm [OPTIONS] [--] [PROGRAM [ARGS...]]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -d, --diagnostics     Announce process start and exit");
    eprintln!("      --no-echo         Don't echo submitted lines");
    eprintln!("      --no-input        Start with the input line disabled");
    eprintln!("      --scheme <NAME>   Color scheme");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  Enter                 Send the input line");
    eprintln!("  Up/Down               Recall history");
    eprintln!("  PageUp/PageDown       Scroll output");
    eprintln!("  Ctrl+End              Jump to newest output");
    eprintln!("  Ctrl+C                Stop the program");
    eprintln!("  Ctrl+Q                Quit");
    eprintln!();
    eprintln!("Configuration: ~/.procterm/config.toml");
    eprintln!("Log file:      ~/.procterm/procterm.log (RUST_LOG overrides the level)");
    eprintln!();
    eprintln!("Color schemes: {}", ColorScheme::list().join(", "));
}

fn parse_args(args: &[String]) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-d" | "--diagnostics" => options.show_diagnostics = Some(true),
            "--no-echo" => options.echo_input = Some(false),
            "--no-input" => options.input_enabled = Some(false),
            "--scheme" => {
                i += 1;
                let name = args.get(i).ok_or("Missing scheme name")?;
                options.color_scheme = Some(name.clone());
            }
            "--" => {
                i += 1;
                break;
            }
            arg if arg.starts_with('-') && arg.len() > 1 => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
            _ => break,
        }
        i += 1;
    }

    if let Some(program) = args.get(i) {
        options.program = Some(program.clone());
        options.arguments = args[i + 1..]
            .iter()
            .map(|a| quote_argument(a))
            .collect::<Vec<_>>()
            .join(" ");
    }

    Ok(options)
}

/// Quote an argument so the process interface splits it back unchanged
fn quote_argument(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '"' || c == '\\');
    if needs_quotes {
        format!("'{}'", arg.replace('\'', r"'\''"))
    } else {
        arg.to_string()
    }
}

/// Program used when neither the command line nor the config names one
fn default_program() -> String {
    #[cfg(windows)]
    {
        env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
    }
    #[cfg(not(windows))]
    {
        env::var("SHELL").unwrap_or_else(|_| "sh".to_string())
    }
}

/// Initialize logging to file; stdout belongs to the console UI
fn init_logging() {
    let Some(dir) = config::config_dir() else {
        return;
    };
    let log_path = dir.join("procterm.log");

    // Open log file (append mode)
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    info!("procterm {} starting...", VERSION);

    // Let child processes detect procterm
    env::set_var("PROCTERM", "1");
    env::set_var("PROCTERM_VERSION", VERSION);

    run_console(options)
}

/// Merge command line options over the config file
fn resolve_config(options: &CliOptions, mut config: Config) -> (Config, String, String) {
    if let Some(show) = options.show_diagnostics {
        config.show_diagnostics = show;
    }
    if let Some(echo) = options.echo_input {
        config.echo_input = echo;
    }
    if let Some(enabled) = options.input_enabled {
        config.input_enabled = enabled;
    }
    if let Some(ref scheme) = options.color_scheme {
        config.color_scheme = scheme.clone();
    }

    let (program, arguments) = match (&options.program, &config.program) {
        (Some(program), _) => (program.clone(), options.arguments.clone()),
        (None, Some(program)) => (program.clone(), config.arguments.clone()),
        (None, None) => (default_program(), String::new()),
    };
    (config, program, arguments)
}

fn run_console(options: CliOptions) -> anyhow::Result<()> {
    let (config, program, arguments) = resolve_config(&options, Config::load());
    info!("Program: {} {}", program, arguments);
    info!("Color scheme: {}", config.color_scheme);

    let view = ConsoleView::new(config.scrollback_limit);
    let mut session = Session::with_process(SessionSettings::from(&config), view);
    session.subscribe_properties(|change| info!("Session property changed: {:?}", change));
    session.subscribe_input(|input| debug!("Sent {} bytes to process", input.content.len()));

    let mut renderer = Renderer::new(config.get_color_scheme());
    renderer.init()?;

    session.start_process(&program, &arguments);

    let result = run_main_loop(&mut session, &mut renderer, &program);
    if let Err(ref e) = result {
        error!("Main loop failed: {}", e);
    }

    if session.is_process_running() {
        session.stop_process();
    }
    renderer.cleanup()?;
    info!("procterm exiting");

    result
}

fn run_main_loop(
    session: &mut ConsoleSession,
    renderer: &mut Renderer,
    program: &str,
) -> anyhow::Result<()> {
    let mut dirty = true;

    loop {
        if session.pump()? > 0 {
            dirty = true;
        }

        if dirty {
            let status = StatusInfo {
                program,
                running: session.is_process_running(),
                input_enabled: session.input_enabled(),
            };
            renderer.render(session.sink_mut(), &status)?;
            dirty = false;
        }

        if !event::poll(INPUT_POLL)? {
            continue;
        }

        match event::read()? {
            Event::Key(key) => {
                let Some(action) = KeyMapper::map(&key) else {
                    continue;
                };
                if action == InputAction::Quit {
                    info!("Quit requested");
                    return Ok(());
                }
                if action.is_input() && !session.input_enabled() {
                    continue;
                }
                handle_action(session, action);
                dirty = true;
            }
            Event::Resize(cols, rows) => {
                debug!("Resize: {}x{}", cols, rows);
                dirty = true;
            }
            _ => {}
        }
    }
}

fn handle_action(session: &mut ConsoleSession, action: InputAction) {
    let page = Renderer::size()
        .map(|(_, rows)| rows.saturating_sub(3).max(1) as usize)
        .unwrap_or(10);

    match action {
        InputAction::Console(key) => {
            session.sink_mut().scroll_to_bottom();
            session.handle_key(key);
        }
        InputAction::Char(ch) => session.sink_mut().push_char(ch),
        InputAction::Backspace => session.sink_mut().backspace(),
        InputAction::PageUp => session.sink_mut().scroll_up(page),
        InputAction::PageDown => session.sink_mut().scroll_down(page),
        InputAction::ScrollToBottom => session.sink_mut().scroll_to_bottom(),
        InputAction::Stop => {
            if session.is_process_running() {
                info!("Stop requested");
                session.stop_process();
            }
        }
        InputAction::Quit => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procterm::core::process::split_arguments;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_flags_and_program() {
        let options = parse_args(&args(&["-d", "--no-echo", "python3", "-i", "-q"])).unwrap();
        assert_eq!(options.show_diagnostics, Some(true));
        assert_eq!(options.echo_input, Some(false));
        assert_eq!(options.program.as_deref(), Some("python3"));
        // Flags after the program belong to it
        assert_eq!(options.arguments, "-i -q");
    }

    #[test]
    fn test_parse_double_dash_and_errors() {
        let options = parse_args(&args(&["--", "-weird", "x"])).unwrap();
        assert_eq!(options.program.as_deref(), Some("-weird"));

        assert!(parse_args(&args(&["--bogus"])).is_err());
        assert!(parse_args(&args(&["--scheme"])).is_err());
        assert_eq!(parse_args(&args(&[])).unwrap(), CliOptions::default());
    }

    #[test]
    fn test_arguments_survive_quoting() {
        let original = ["-c", "echo 'hi there'", "", r"C:\x", "say \"yo\""];
        let mut argv = args(&["sh"]);
        argv.extend(args(&original));
        let options = parse_args(&argv).unwrap();
        assert_eq!(split_arguments(&options.arguments).unwrap(), original);
    }

    #[test]
    fn test_cli_overrides_config() {
        let config = Config {
            program: Some("python3".into()),
            arguments: "-i".into(),
            show_diagnostics: true,
            ..Config::default()
        };

        let (merged, program, arguments) = resolve_config(&CliOptions::default(), config.clone());
        assert!(merged.show_diagnostics);
        assert_eq!((program.as_str(), arguments.as_str()), ("python3", "-i"));

        let options = CliOptions {
            program: Some("cat".into()),
            show_diagnostics: Some(false),
            input_enabled: Some(false),
            ..CliOptions::default()
        };
        let (merged, program, arguments) = resolve_config(&options, config);
        assert!(!merged.show_diagnostics);
        assert!(!merged.input_enabled);
        assert_eq!((program.as_str(), arguments.as_str()), ("cat", ""));
    }
}
