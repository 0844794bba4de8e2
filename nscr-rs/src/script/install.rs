//! Installation sections: info headers, package chains and the install log.
//!
//! An installation runs through these stages:
//!
//! | Stage | Entered on | Left on |
//! |-------|------------|---------|
//! | idle | processor start | `<install>` |
//! | awaiting info | `<install>` | `<endinfo>` |
//! | installing | `<endinfo>` | `<endinstall>` or end of stream |
//! | awaiting next package | end of stream with packages queued | next package opened |
//! | terminated | chain exhausted | |
//!
//! [`InstallationState`] is created on the first `<install>` and survives
//! across every package of the chain.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::flatten_required_version;
use crate::error::{Result, ScriptError};

use super::comment::erase_block_comments;
use super::syntax::{key_value, split_list};

pub const INSTALL_OPEN: &str = "<install>";
pub const INSTALL_CLOSE: &str = "<endinstall>";
pub const INFO_OPEN: &str = "<info>";
pub const INFO_CLOSE: &str = "<endinfo>";

pub const FLAG_FULL_LOGGING: &str = "ENABLE_FULL_LOGGING";
pub const FLAG_DISABLE_SCREEN_OUTPUT: &str = "DISABLE_SCREEN_OUTPUT";

const LOG_SUCCESS: &str = "--- INSTALLATION TERMINATED SUCCESSFULLY ---";
const LOG_FAILURE: &str = "--- INSTALLATION FAILED ---";

// ── Screen messages ───────────────────────────────────────────────────────────

pub const MSG_START: &str = "Starting installation ...";
pub const MSG_SUCCESS: &str = "Installation terminated successfully.";
pub const MSG_ABORT: &str = "Installation aborted: license not accepted.";

pub fn license_message(install_id: &str, license: &str) -> String {
    format!("Package \"{install_id}\" is distributed under the following license: {license}. Do you agree? (y/n)")
}

pub fn installing_message(procedure: &str) -> String {
    format!("Installing \"{procedure}\" ...")
}

// ── Info header ───────────────────────────────────────────────────────────────

/// Split `text` around an `<info>…<endinfo>` pair.
///
/// Returns the header between the markers and the text after `<endinfo>`, or
/// `None` if either marker is missing.
pub fn split_info(text: &str) -> Option<(&str, &str)> {
    let open = text.find(INFO_OPEN)?;
    let body = &text[open + INFO_OPEN.len()..];
    let close = body.find(INFO_CLOSE)?;
    Some((&body[..close], &body[close + INFO_CLOSE.len()..]))
}

/// The parsed `key=value` fields of an install header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallInfo {
    /// Header text with block comments erased, as logged and declared.
    pub header: String,
    pub name: String,
    pub packages: Vec<String>,
    pub required_version: Option<u64>,
    pub license: Option<String>,
    pub full_logging: bool,
    pub disable_screen_output: bool,
}

impl InstallInfo {
    pub fn parse(header: &str) -> Self {
        let header = erase_block_comments(header).trim().to_owned();

        let name = key_value(&header, "name").unwrap_or_default();
        let packages = key_value(&header, "requirepackages")
            .map(|list| split_list(&list))
            .unwrap_or_default();
        let required_version =
            key_value(&header, "requireversion").map(|v| flatten_required_version(&v));
        let license = key_value(&header, "license");
        let flags = key_value(&header, "flags").unwrap_or_default();

        InstallInfo {
            name,
            packages,
            required_version,
            license,
            full_logging: flags.contains(FLAG_FULL_LOGGING),
            disable_screen_output: flags.contains(FLAG_DISABLE_SCREEN_OUTPUT),
            header,
        }
    }
}

// ── Package chain ─────────────────────────────────────────────────────────────

/// Ordered, duplicate-free list of package scripts to install.
///
/// The first entry is the script that declared the first dependency; it is
/// resumed once every dependency is installed.  The cursor only moves
/// forward.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageChain {
    entries: Vec<PathBuf>,
    index: usize,
}

impl PackageChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `package`, seeding the chain with `origin` when it is empty.
    ///
    /// Returns `false` if the package was already queued.
    pub fn enqueue(&mut self, origin: &Path, package: PathBuf) -> bool {
        if self.entries.is_empty() {
            self.entries.push(origin.to_path_buf());
        }
        if self.entries.contains(&package) {
            return false;
        }
        self.entries.push(package);
        true
    }

    /// Move to the next package, if any.
    pub fn advance(&mut self) -> Option<PathBuf> {
        if self.index + 1 < self.entries.len() {
            self.index += 1;
            Some(self.entries[self.index].clone())
        } else {
            self.index = self.entries.len();
            None
        }
    }

    /// The originating script.
    pub fn origin(&self) -> Option<&Path> {
        self.entries.first().map(PathBuf::as_path)
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` if no package is left to advance to.
    pub fn is_exhausted(&self) -> bool {
        self.index + 1 >= self.entries.len()
    }
}

// ── Install log ───────────────────────────────────────────────────────────────

/// An open installation log.
///
/// Every record opened by [`InstallLog::open`] is closed with a footer:
/// [`InstallLog::finish`] writes the chosen one, and dropping an unfinished
/// log writes the failure footer.
#[derive(Debug)]
pub struct InstallLog {
    path: PathBuf,
    file: File,
    finished: bool,
}

impl InstallLog {
    /// Open `path` for appending and write the record header.
    ///
    /// `line` is the directive that started the installation, reported on
    /// failure.
    pub fn open(path: &Path, line: &str) -> Result<Self> {
        let cannot_open = |source| ScriptError::CannotOpenLogfile {
            line: line.to_owned(),
            path: path.to_path_buf(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(cannot_open)?;
        let stamp = chrono::Local::now().format("%Y-%m-%d, %H:%M:%S");
        writeln!(file, "--- INSTALLATION {stamp} ---").map_err(cannot_open)?;
        debug!(path = %path.display(), "install log opened");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn install_info(&mut self, header: &str) -> Result<()> {
        writeln!(self.file, "Installinfo: {header}")?;
        Ok(())
    }

    pub fn installing(&mut self, procedure: &str) -> Result<()> {
        writeln!(self.file, ">> Installing: \"{procedure}\" ...")?;
        Ok(())
    }

    pub fn evaluating(&mut self, line: &str) -> Result<()> {
        writeln!(self.file, ">> Evaluating: {line} ...")?;
        Ok(())
    }

    pub fn copying(&mut self, line: &str) -> Result<()> {
        writeln!(self.file, ">> >> Copying: {line} ...")?;
        Ok(())
    }

    /// Write the footer and close the log.
    pub fn finish(mut self, success: bool) -> Result<()> {
        self.finished = true;
        let footer = if success { LOG_SUCCESS } else { LOG_FAILURE };
        write!(self.file, "{footer}\n\n\n")?;
        debug!(path = %self.path.display(), success, "install log closed");
        Ok(())
    }
}

impl Drop for InstallLog {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = write!(self.file, "{LOG_FAILURE}\n\n\n") {
            warn!(path = %self.path.display(), error = %e, "cannot finalize install log");
        }
    }
}

// ── Installation state ────────────────────────────────────────────────────────

/// Cross-line state of a running installation.
#[derive(Debug, Default)]
pub struct InstallationState {
    pub chain: PackageChain,
    pub log: Option<InstallLog>,
    pub full_logging: bool,
    pub disable_screen_output: bool,
    pub installing_procedure: bool,
    pub install_id: String,
    pub help_id: Option<String>,
}

impl InstallationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the per-package flags when a new `<install>` section starts.
    pub fn begin_package(&mut self, log: InstallLog) {
        self.log = Some(log);
        self.full_logging = false;
        self.disable_screen_output = false;
        self.installing_procedure = false;
    }

    /// Take over the flags and identifier of a parsed header.
    pub fn apply(&mut self, info: &InstallInfo) {
        self.install_id = info.name.trim().to_owned();
        self.full_logging |= info.full_logging;
        self.disable_screen_output |= info.disable_screen_output;
    }

    /// Finish the log, if one is open.  Returns `true` if it was.
    pub fn finish_log(&mut self, success: bool) -> Result<bool> {
        match self.log.take() {
            Some(log) => {
                log.finish(success)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Echo one line to the log while full logging is on.
    pub fn log_line(&mut self, line: &str) -> Result<()> {
        if !self.full_logging {
            return Ok(());
        }
        let Some(log) = self.log.as_mut() else { return Ok(()) };
        if self.installing_procedure {
            log.copying(line)
        } else {
            log.evaluating(line)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
