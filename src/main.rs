//! runconsole - run a command inside an embedded ANSI console
//!
//! Spawns a process, feeds its stdout and stderr through the console core and
//! prints the styled transcript as lines complete. Typed lines are forwarded
//! to the process's stdin.
//!
//! # Quick Start
//!
//! ```text
//! runconsole                       # Built-in demo script
//! runconsole -- cargo build        # Run a command
//! runconsole --max-lines 500 -- ls --color=always
//! ```

use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use runconsole::config::Config;
use runconsole::core::runner::ProcessRunner;
use runconsole::core::service::{BindingId, ConsoleService};
use runconsole::core::term::{ConsoleDelta, StreamKind};
use runconsole::ui::{DebugRenderer, Renderer, TranscriptPrinter};

/// Command line options
#[derive(Default)]
struct CliArgs {
    /// Scrollback override
    max_lines: Option<usize>,
    /// Verbose logging and a debug dump at exit
    debug: bool,
    /// Program and arguments to run
    command: Vec<String>,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("runconsole {}", VERSION);
}

fn print_help() {
    eprintln!("runconsole {} - Run a command inside an embedded ANSI console", VERSION);
    eprintln!();
    eprintln!("Usage: runconsole [OPTIONS] [-- <COMMAND> [ARGS...]]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --max-lines <N>       Scrollback cap (default from config.toml)");
    eprintln!("  -d, --debug           Debug logging and a plain-text dump at exit");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Without a command a short demo script is rendered.");
    eprintln!("Config: ~/.runconsole/config.toml  Log: ~/.runconsole/runconsole.log");
}

fn parse_args() -> Result<CliArgs, String> {
    let args: Vec<String> = env::args().collect();
    let mut cli = CliArgs::default();
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
            "-d" | "--debug" => {
                cli.debug = true;
            }
            "--max-lines" => {
                i += 1;
                let value = args.get(i).ok_or("Missing --max-lines argument")?;
                let n = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --max-lines value: {}", value))?;
                cli.max_lines = Some(n);
            }
            "--" => {
                cli.command = args[i + 1..].to_vec();
                break;
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                cli.command = args[i..].to_vec();
                break;
            }
        }
        i += 1;
    }

    Ok(cli)
}

fn init_logging(config: &Config, debug: bool) {
    let log_path = Config::app_dir()
        .map(|dir| dir.join("runconsole.log"))
        .unwrap_or_else(|| PathBuf::from("runconsole.log"));

    // Create log directory if needed
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    // Open log file (append mode)
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let level = if debug { "debug" } else { config.log_level.as_str() };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = match parse_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let mut config = Config::load();
    if let Some(max_lines) = cli.max_lines {
        config.max_lines = max_lines;
    }

    init_logging(&config, cli.debug);
    info!("runconsole starting...");
    info!("Scrollback: {} lines", config.max_lines);
    info!(
        "Tabs: {}",
        if config.tabs.use_spaces {
            format!("{} spaces", config.tabs.spaces_per_tab)
        } else {
            "literal".to_string()
        }
    );

    let service = ConsoleService::from_config(&config);

    let code = if cli.command.is_empty() {
        run_demo(&service)?;
        0
    } else {
        run_command(&service, &cli.command)?
    };

    if cli.debug {
        let width = Renderer::size().map(|(cols, _)| cols as usize).unwrap_or(80);
        eprintln!(
            "{}",
            DebugRenderer::render(&service.create_lines_snapshot(), service.cursor(), width)
        );
    }

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Run a command, printing lines as they are completed
fn run_command(service: &ConsoleService, command: &[String]) -> anyhow::Result<i32> {
    let (tx, rx) = mpsc::channel::<ConsoleDelta>();
    let listener = service.add_listener(move |delta| {
        let _ = tx.send(delta);
    });

    let runner = match ProcessRunner::spawn(service, &command[0], &command[1..]) {
        Ok(runner) => runner,
        Err(e) => {
            error!("Failed to start command: {}", e);
            service.remove_listener(listener);
            return Err(e.into());
        }
    };
    info!("Running {:?} (pid {})", command, runner.id());
    spawn_stdin_forwarder(service.clone(), runner.stdin_binding());

    let mut printer = TranscriptPrinter::new(Renderer::new());
    let mut stdout = io::stdout();
    let waiter = thread::spawn(move || runner.wait());

    while !waiter.is_finished() {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(delta) => printer.commit(&mut stdout, &service.snapshot(), delta)?,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let status = waiter
        .join()
        .map_err(|_| anyhow!("Process runner thread panicked"))??;
    service.remove_listener(listener);

    // Everything that is left, including the exit line
    printer.finish(&mut stdout, &service.snapshot())?;

    Ok(status.code().unwrap_or(1))
}

/// Forward host stdin lines to whichever process owns the console. At EOF
/// the command's own binding is released, closing its stdin.
fn spawn_stdin_forwarder(service: ConsoleService, binding: Option<BindingId>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if !service.submit_stdin(&format!("{}\n", line)) {
                break;
            }
        }
        if let Some(id) = binding {
            service.release_stdin(id);
        }
    });
}

/// Render a canned script through the console
fn run_demo(service: &ConsoleService) -> anyhow::Result<()> {
    let demo_output = concat!(
        "\x1b[32mWelcome to runconsole!\x1b[0m\r\n",
        "\r\n",
        "This is a \x1b[1mbold\x1b[0m and \x1b[4munderlined\x1b[0m text.\r\n",
        "Colors: \x1b[31mRed\x1b[0m \x1b[32mGreen\x1b[0m \x1b[34mBlue\x1b[0m ",
        "\x1b[38;5;208m208\x1b[0m \x1b[38;2;120;80;200mrgb\x1b[0m\r\n",
        "Progress: 10%\r",
        "Progress: 55%\r",
        "Progress: 100%\r\n",
        "abc\x1b[3DXY\r\n",
    );

    service.write(demo_output, StreamKind::Stdout);
    service.write("warning: this line came from stderr\n", StreamKind::Stderr);
    service.write("[demo finished]\n", StreamKind::System);

    let lines = service.create_lines_snapshot();
    Renderer::new().render_lines(&mut io::stdout(), &lines)?;
    Ok(())
}
