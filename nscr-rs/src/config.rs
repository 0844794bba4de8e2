//! `.nscrrc` configuration file parser.
//!
//! The file uses the same line syntax as scripts:
//!
//! | Directive | Action |
//! |-----------|--------|
//! | `set <name>=<value>` or `set <name> <value>` | set a processor setting |
//! | Lines starting with `##` | comment, ignored |
//! | Any other command | silently skipped |
//!
//! Recognised settings: `exe_dir`, `script_dir`, `log_file`, `docs_dir`,
//! `runtime_version`, `yes_answer`.

use std::num::IntErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Processor settings: where things live and which runtime is running.
#[derive(Debug, Clone)]
pub struct Config {
    /// Installation root; the `<>` path token expands to this directory.
    pub exe_dir: PathBuf,
    /// Default directory for script names that are not absolute.
    pub script_dir: PathBuf,
    /// Installation log; `None` means `<exe_dir>/install.log`.
    pub log_file: Option<PathBuf>,
    /// Target directory for extracted documentation articles; `None` means
    /// `<exe_dir>/docs/plugins`.
    pub docs_dir: Option<PathBuf>,
    /// Flattened version of the running build (see [`build_version`]).
    pub runtime_version: u32,
    /// Answer prefix accepted as "yes" by the license prompt.
    pub yes_answer: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::rooted(default_exe_dir())
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for an installation rooted at `root` (scripts in `root/scripts`).
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let exe_dir = root.into();
        Config {
            script_dir: exe_dir.join("scripts"),
            exe_dir,
            log_file: None,
            docs_dir: None,
            runtime_version: build_version(),
            yes_answer: "y".to_owned(),
        }
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.exe_dir.join("install.log"))
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.docs_dir
            .clone()
            .unwrap_or_else(|| self.exe_dir.join("docs").join("plugins"))
    }

    /// Parse a config string on top of the defaults.
    ///
    /// Returns the config and a list of any errors on recognised lines.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let errors = config.apply_str(s);
        (config, errors)
    }

    /// Apply the `set` directives in `s` to this config.
    pub fn apply_str(&mut self, s: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with("##") {
                continue;
            }

            let (cmd, args_str) = line
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((line, ""));

            if cmd != "set" {
                continue;
            }

            let tokens = split_args(args_str.trim());
            if let Err(message) = self.parse_set(&tokens) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        errors
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    fn parse_set(&mut self, tokens: &[String]) -> Result<(), String> {
        if tokens.is_empty() {
            return Err("set: requires an argument".into());
        }

        let (name, value) = if let Some(eq) = tokens[0].find('=') {
            (tokens[0][..eq].to_owned(), tokens[0][eq + 1..].to_owned())
        } else if tokens.len() >= 2 {
            (tokens[0].clone(), tokens[1..].join(" "))
        } else {
            return Err(format!("set: missing value for '{}'", tokens[0]));
        };

        match name.as_str() {
            "exe_dir" => {
                let exe_dir = PathBuf::from(value);
                // A script dir still at its default follows the new root.
                if self.script_dir == self.exe_dir.join("scripts") {
                    self.script_dir = exe_dir.join("scripts");
                }
                self.exe_dir = exe_dir;
            }
            "script_dir" => self.script_dir = PathBuf::from(value),
            "log_file" => self.log_file = Some(PathBuf::from(value)),
            "docs_dir" => self.docs_dir = Some(PathBuf::from(value)),
            "runtime_version" => {
                self.runtime_version = flatten_version(&value)
                    .ok_or_else(|| format!("set: invalid version '{value}'"))?;
            }
            "yes_answer" => {
                if value.is_empty() {
                    return Err("set: yes_answer cannot be empty".into());
                }
                self.yes_answer = value;
            }
            "" => return Err("set: setting name cannot be empty".into()),
            other => return Err(format!("set: unknown setting '{other}'")),
        }
        Ok(())
    }
}

// ── Versions ──────────────────────────────────────────────────────────────────

fn version_digits(s: &str) -> String {
    s.trim().chars().filter(|&c| c != '.').collect()
}

/// Flatten a dotted version by dropping the separators: `"1.1.2"` → `112`.
pub fn flatten_version(s: &str) -> Option<u32> {
    version_digits(s).parse().ok()
}

/// Flatten the minimum version a package asks for.
///
/// A number too large for `u64` saturates, so it is never satisfied; a value
/// that is not a number counts as 0.
pub fn flatten_required_version(s: &str) -> u64 {
    match version_digits(s).parse::<u64>() {
        Ok(v) => v,
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => u64::MAX,
        Err(_) => 0,
    }
}

/// The running build as `major*100 + minor*10 + patch`.
pub fn build_version() -> u32 {
    let mut parts = env!("CARGO_PKG_VERSION")
        .split('.')
        .map(|p| p.parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    let patch = parts.next().unwrap_or(0);
    major * 100 + minor * 10 + patch
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Determine the installation root.
///
/// Priority: `NSCR_HOME` env var → platform data directory → `.`.
pub fn default_exe_dir() -> PathBuf {
    if let Ok(d) = std::env::var("NSCR_HOME") {
        return PathBuf::from(d);
    }
    directories::ProjectDirs::from("", "", "nscr")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Search for the user config file in the standard locations.
/// Returns the first path that exists, or `None`.
pub fn find_user_config() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dirs) = directories::ProjectDirs::from("", "", "nscr") {
        candidates.push(dirs.config_dir().join("nscrrc"));
    }
    if let Some(home) = directories::BaseDirs::new() {
        candidates.push(home.home_dir().join(".nscrrc"));
    }
    candidates.push(PathBuf::from("./.nscrrc"));
    candidates.into_iter().find(|p| p.exists())
}

// ── Argument tokenizer ────────────────────────────────────────────────────────

/// Split `s` into whitespace-delimited tokens, honouring double-quoted strings
/// and `\"` escapes within them.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if !cur.is_empty() {
                    args.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        args.push(cur);
    }
    args
}

// ── Tests ─────────────────────────────────────────────────────────────────────
