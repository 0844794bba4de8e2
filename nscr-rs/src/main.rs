use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use crossterm::style::Stylize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use nscr::breakpoint::BreakpointStore;
use nscr::cli::{self, CliArgs, ConfigFile};
use nscr::config::{find_user_config, Config};
use nscr::script::{HostAction, Prompt, ScriptProcessor};
use nscr::ScriptError;

fn main() -> ExitCode {
    let args = cli::parse_args();

    // ── Diagnostics: -v > RUST_LOG > "warn" ───────────────────────────────────
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let styled = unsafe { libc::isatty(libc::STDERR_FILENO) != 0 };
    let interactive = unsafe { libc::isatty(libc::STDIN_FILENO) != 0 };

    let config = load_config(&args);
    let mut processor = ScriptProcessor::new(config);
    processor.set_install_procedures(args.install);
    let yes_answer = processor.config().yes_answer.clone();
    processor.prompt = Some(make_prompt(args.yes, yes_answer, interactive));

    processor.set_script_file_name(&args.script);
    processor.breakpoints = Some(collect_breakpoints(&args, &processor).into_lookup());

    if let Err(e) = processor.open() {
        report_error(&e, styled);
        return ExitCode::FAILURE;
    }

    // ── Command loop ──────────────────────────────────────────────────────────
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut status = ExitCode::SUCCESS;
    while processor.is_open() {
        let result = processor.next_command();
        flush_host(&mut processor, styled);
        match result {
            Ok(cmd) if cmd.is_empty() => {}
            Ok(cmd) => {
                if writeln!(out, "{cmd}").is_err() {
                    break;
                }
            }
            Err(e) => {
                report_error(&e, styled);
                status = ExitCode::FAILURE;
            }
        }
    }
    flush_host(&mut processor, styled);
    status
}

// ── Setup ─────────────────────────────────────────────────────────────────────

fn load_config(args: &CliArgs) -> Config {
    let path = match args.config_file() {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(p) => Some(p),
        ConfigFile::Search => find_user_config(),
    };
    let Some(path) = path else { return Config::new() };

    match Config::load_file(&path) {
        Ok((config, errors)) => {
            for e in errors {
                warn!(file = %path.display(), "config: {e}");
            }
            debug!(file = %path.display(), "config loaded");
            config
        }
        Err(e) => {
            warn!(file = %path.display(), error = %e, "cannot read config");
            Config::new()
        }
    }
}

/// Breakpoints without a file belong to the main script.
fn collect_breakpoints(args: &CliArgs, processor: &ScriptProcessor) -> BreakpointStore {
    let mut store = BreakpointStore::new();
    for bp in &args.breakpoints {
        let file = match &bp.file {
            Some(name) => processor.file_system().valid_file_name(name, ".nscr"),
            None => processor.script_file_name().map(|p| p.to_path_buf()),
        };
        match file {
            Some(file) => {
                store.add(file, bp.line);
            }
            None => warn!(line = bp.line, "breakpoint without a resolvable file ignored"),
        }
    }
    store
}

/// License prompt: `-y` answers for the user, otherwise one line is read
/// from stdin.  A non-interactive stdin without `-y` declines.
fn make_prompt(yes: bool, yes_answer: String, interactive: bool) -> Prompt {
    Arc::new(move |question: &str| {
        if yes {
            return yes_answer.clone();
        }
        if !interactive {
            return String::new();
        }
        eprint!("{question} ");
        let _ = io::stderr().flush();
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => answer.trim().to_owned(),
            Err(_) => String::new(),
        }
    })
}

// ── Output ────────────────────────────────────────────────────────────────────

fn flush_host(processor: &mut ScriptProcessor, styled: bool) {
    for line in processor.take_output() {
        if styled {
            eprintln!("{}", line.cyan());
        } else {
            eprintln!("{line}");
        }
    }
    for action in processor.take_actions() {
        print_action(&action, styled);
    }
}

fn print_action(action: &HostAction, styled: bool) {
    let text = format!("% {action}");
    if styled {
        eprintln!("{}", text.dark_grey());
    } else {
        eprintln!("{text}");
    }
}

fn report_error(e: &ScriptError, styled: bool) {
    let text = format!("nscr: {} [{}]", e, e.code());
    if styled {
        eprintln!("{}", text.red().bold());
    } else {
        eprintln!("{text}");
    }
    if !e.line().is_empty() {
        eprintln!("  in: {}", e.line());
    }
}
