//! Processor errors.
//!
//! Every failure of the directive processor is a [`ScriptError`].  Each
//! variant carries the script text that was being processed when the failure
//! happened and, where a file is involved, the offending path.
//!
//! | Error | Code |
//! |-------|------|
//! | [`ScriptError::ScriptNotFound`] | `SCRIPT_NOT_FOUND` |
//! | [`ScriptError::CannotOpenLogfile`] | `CANNOT_OPEN_LOGFILE` |
//! | [`ScriptError::CannotReadFile`] | `CANNOT_READ_FILE` |
//! | [`ScriptError::InsufficientRuntimeVersion`] | `INSUFFICIENT_RUNTIME_VERSION` |
//! | [`ScriptError::ProcedureDefinedOutsideInstall`] | `PROCEDURE_WITHOUT_INSTALL` |
//! | [`ScriptError::UnterminatedInstallInfo`] | `UNTERMINATED_INSTALL_INFO` |
//! | [`ScriptError::InvalidLocalDefinition`] | `INVALID_LOCAL_DEFINITION` |
//! | [`ScriptError::Io`] | `IO` |
//!
//! A declined license agreement is not an error: the processor closes the
//! session and hands back an empty command instead.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failure raised while reading directives from a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// A primary script, an include or a chained package could not be opened.
    #[error("script not found: {}", path.display())]
    ScriptNotFound { line: String, path: PathBuf },

    /// The installation log could not be opened for appending.
    #[error("cannot open installation log {}: {source}", path.display())]
    CannotOpenLogfile {
        line: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A generated artifact (documentation article, layout) could not be written.
    #[error("cannot write file {}: {source}", path.display())]
    CannotReadFile {
        line: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The package requires a newer runtime than the one running.
    #[error("package requires runtime version {required}, running {running}")]
    InsufficientRuntimeVersion {
        line: String,
        required: u64,
        running: u32,
    },

    /// A procedure definition outside of an active installation.
    #[error("procedure definition outside of an install section: {line}")]
    ProcedureDefinedOutsideInstall { line: String },

    /// The stream ended before `<endinfo>` closed the install header.
    #[error("install header is missing <endinfo>: {line}")]
    UnterminatedInstallInfo { line: String },

    /// An `lclfunc` line that does not have the `name(args) := body` shape.
    #[error("invalid local function definition ({reason}): {line}")]
    InvalidLocalDefinition { line: String, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ScriptError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ScriptError::ScriptNotFound { .. } => "SCRIPT_NOT_FOUND",
            ScriptError::CannotOpenLogfile { .. } => "CANNOT_OPEN_LOGFILE",
            ScriptError::CannotReadFile { .. } => "CANNOT_READ_FILE",
            ScriptError::InsufficientRuntimeVersion { .. } => "INSUFFICIENT_RUNTIME_VERSION",
            ScriptError::ProcedureDefinedOutsideInstall { .. } => "PROCEDURE_WITHOUT_INSTALL",
            ScriptError::UnterminatedInstallInfo { .. } => "UNTERMINATED_INSTALL_INFO",
            ScriptError::InvalidLocalDefinition { .. } => "INVALID_LOCAL_DEFINITION",
            ScriptError::Io(_) => "IO",
        }
    }

    /// The script text being processed when the error was raised.
    pub fn line(&self) -> &str {
        match self {
            ScriptError::ScriptNotFound { line, .. }
            | ScriptError::CannotOpenLogfile { line, .. }
            | ScriptError::CannotReadFile { line, .. }
            | ScriptError::InsufficientRuntimeVersion { line, .. }
            | ScriptError::ProcedureDefinedOutsideInstall { line }
            | ScriptError::UnterminatedInstallInfo { line }
            | ScriptError::InvalidLocalDefinition { line, .. } => line,
            ScriptError::Io(_) => "",
        }
    }

    /// The file the error refers to, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ScriptError::ScriptNotFound { path, .. }
            | ScriptError::CannotOpenLogfile { path, .. }
            | ScriptError::CannotReadFile { path, .. } => Some(path),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScriptError>;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_path() {
        let e = ScriptError::ScriptNotFound {
            line: "@missing".to_owned(),
            path: PathBuf::from("/scripts/missing.nscr"),
        };
        assert_eq!(e.code(), "SCRIPT_NOT_FOUND");
        assert_eq!(e.line(), "@missing");
        assert_eq!(e.path(), Some(Path::new("/scripts/missing.nscr")));
        assert!(e.to_string().contains("missing.nscr"));
    }

    #[test]
    fn version_error_reports_both_versions() {
        let e = ScriptError::InsufficientRuntimeVersion {
            line: String::new(),
            required: 200,
            running: 112,
        };
        assert_eq!(e.code(), "INSUFFICIENT_RUNTIME_VERSION");
        assert!(e.path().is_none());
        let msg = e.to_string();
        assert!(msg.contains("200") && msg.contains("112"));
    }

    #[test]
    fn io_error_converts() {
        let e: ScriptError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert_eq!(e.code(), "IO");
        assert_eq!(e.line(), "");
    }
}
