//! Command-line argument parsing.
//!
//! Usage:
//!   nscr [-i] [-y] [-v] [-c <file> | -n] [-b [<file>:]<line>]... <script>

use std::path::PathBuf;

use clap::Parser;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "nscr", version, about = "Run a script through the directive processor")]
pub struct CliArgs {
    /// Script to process; `.nscr` is added when no extension is given.
    pub script: String,
    /// Run `<install>` sections and allow procedure definitions (`-i`).
    #[arg(short, long)]
    pub install: bool,
    /// Breakpoint at `<line>` of the script, or `<file>:<line>` (`-b`).
    #[arg(short = 'b', long = "break", value_name = "[FILE:]LINE", value_parser = parse_breakpoint)]
    pub breakpoints: Vec<BreakpointArg>,
    /// Load this config file instead of searching for one (`-c`).
    #[arg(short, long, value_name = "FILE", conflicts_with = "no_config")]
    pub config: Option<PathBuf>,
    /// Skip the user config file (`-n`).
    #[arg(short, long)]
    pub no_config: bool,
    /// Accept every license without asking (`-y`).
    #[arg(short, long)]
    pub yes: bool,
    /// Debug-level diagnostics on stderr (`-v`).
    #[arg(short, long)]
    pub verbose: bool,
}

/// How to choose the user config file.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum ConfigFile {
    /// Search the standard locations (default).
    #[default]
    Search,
    /// `-n`: skip user config.
    Skip,
    /// `-c <file>`: load this specific file.
    Explicit(PathBuf),
}

/// One `-b` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointArg {
    /// File the breakpoint belongs to; `None` means the main script.
    pub file: Option<String>,
    /// 1-based line number.
    pub line: usize,
}

impl CliArgs {
    pub fn config_file(&self) -> ConfigFile {
        match (&self.config, self.no_config) {
            (Some(p), _) => ConfigFile::Explicit(p.clone()),
            (None, true) => ConfigFile::Skip,
            (None, false) => ConfigFile::Search,
        }
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()`, exiting with usage on error.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}

fn parse_breakpoint(s: &str) -> Result<BreakpointArg, String> {
    let (file, line) = match s.rsplit_once(':') {
        Some((f, l)) if !f.is_empty() => (Some(f.to_owned()), l),
        _ => (None, s),
    };
    let line: usize = line
        .parse()
        .map_err(|_| format!("invalid line number: {line}"))?;
    if line == 0 {
        return Err("line numbers start at 1".to_owned());
    }
    Ok(BreakpointArg { file, line })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
