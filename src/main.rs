//! rconsole - interactive command console in the terminal
//!
//! Runs the console full screen: transcript on top, prompt on the bottom
//! row. While a command runs, the bottom row forwards typed lines to it.
//!
//! # Quick Start
//!
//! ```text
//! rconsole              # Split commands into words, no shell
//! rconsole -s           # Run commands through the platform shell
//! rconsole -d ~/src     # Start in another directory
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | Up/Down | History |
//! | PageUp/PageDown | History search by prefix |
//! | Tab | Complete file name |
//! | Ctrl+C | Interrupt running command |
//! | Ctrl+\ | Kill running command |
//! | Ctrl+Q | Quit |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rconsole::ui::Renderer;
use rconsole::{Console, ConsoleConfig, InputMode};

/// Command line options
#[derive(Default)]
struct Options {
    /// Run commands through the platform shell
    shell: bool,
    /// Starting directory
    directory: Option<PathBuf>,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the log filter
const LOG_ENV: &str = "RCONSOLE_LOG";

fn print_version() {
    eprintln!("rconsole {}", VERSION);
}

fn print_help() {
    eprintln!("rconsole {} - interactive command console", VERSION);
    eprintln!();
    eprintln!("Usage: rconsole [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -s, --shell           Run commands through the platform shell");
    eprintln!("  -d, --dir <DIR>       Start in DIR");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  Up/Down               Previous/next command");
    eprintln!("  PageUp/PageDown       Search history by the text before the cursor");
    eprintln!("  Tab                   Complete file name");
    eprintln!("  Home / Shift+Home     Start of command / select to start");
    eprintln!("  Ctrl+C                Interrupt the running command");
    eprintln!("  Ctrl+\\                Kill the running command");
    eprintln!("  Ctrl+Q                Quit");
    eprintln!();
    eprintln!("Configuration: ~/.rconsole/config.toml");
    eprintln!("Log filter:    {}=debug", LOG_ENV);
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    let mut options = Options::default();
    let mut i = 1;

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
            "-s" | "--shell" => {
                options.shell = true;
            }
            "-d" | "--dir" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing directory argument".to_string());
                }
                options.directory = Some(PathBuf::from(&args[i]));
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(options)
}

/// Log to ~/.rconsole/rconsole.log; the terminal belongs to the console
fn init_logging() {
    let log_path = dirs::home_dir()
        .map(|h| h.join(".rconsole").join("rconsole.log"))
        .unwrap_or_else(|| PathBuf::from("rconsole.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let options = match parse_args() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    info!("rconsole starting...");

    let mut config = ConsoleConfig::load();
    if options.shell {
        config.use_shell_interpreter = true;
    }
    if options.directory.is_some() {
        config.start_directory = options.directory;
    }

    let mut console = Console::new(config, Renderer::new())?;
    console.display_mut().init()?;
    console.refresh();

    let result = run_main_loop(&mut console);
    if let Err(ref e) = result {
        error!("Main loop failed: {}", e);
    }

    let _ = console.display_mut().cleanup();
    info!("rconsole exiting");
    result
}

fn run_main_loop(console: &mut Console<Renderer>) -> anyhow::Result<()> {
    let poll_timeout = Duration::from_millis(10);
    let mut console = console.focus();
    // Input edits do not touch the transcript; track them separately
    let mut drawn_input: Option<(String, usize)> = None;

    loop {
        if event::poll(poll_timeout)? {
            match event::read()? {
                Event::Key(key_event) => {
                    if key_event.kind != KeyEventKind::Press {
                        continue;
                    }
                    if key_event.code == KeyCode::Char('q')
                        && key_event.modifiers.contains(KeyModifiers::CONTROL)
                    {
                        info!("Quit requested");
                        break;
                    }
                    console.on_keystroke(key_event.code, key_event.modifiers);
                }
                Event::Resize(cols, rows) => {
                    info!("Resized to {}x{}", cols, rows);
                    console.display_mut().invalidate();
                }
                _ => {}
            }
        }

        console.pump();

        let input = match console.input_mode() {
            InputMode::Command => (console.input().line(), console.input().cursor_col()),
            InputMode::Interact => (
                console.interaction().line(),
                console.interaction().cursor_col(),
            ),
        };
        if console.display().needs_redraw() || drawn_input.as_ref() != Some(&input) {
            console.display_mut().draw(&input.0, input.1)?;
            drawn_input = Some(input);
        }
    }

    Ok(())
}
