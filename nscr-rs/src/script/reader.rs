//! Physical and logical line reading.
//!
//! A logical line is one or more physical lines joined by the continuation
//! token `\\` at the end of a line.  Every physical line read advances the
//! line counter, including lines consumed by multi-line directives, so the
//! counter always matches the position in the file.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::breakpoint::BreakpointLookup;

/// Line continuation token.
pub const CONTINUATION: &str = "\\\\";

/// Prefix marking a line that carries a breakpoint.
pub const BREAKPOINT_MARKER: &str = "|>";

/// A composed logical line and the number of its first physical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    pub text: String,
    pub line: usize,
}

/// Line reader over one script stream.
pub struct LineReader {
    path: PathBuf,
    source: Box<dyn BufRead>,
    line: usize,
    eof: bool,
}

impl std::fmt::Debug for LineReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineReader")
            .field("path", &self.path)
            .field("line", &self.line)
            .field("eof", &self.eof)
            .finish()
    }
}

impl LineReader {
    /// Open `path` for reading.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(path, BufReader::new(file)))
    }

    /// Wrap an already open stream; `path` is used for breakpoint lookups.
    pub fn from_reader(path: impl Into<PathBuf>, source: impl BufRead + 'static) -> Self {
        Self {
            path: path.into(),
            source: Box::new(source),
            line: 0,
            eof: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of physical lines consumed so far.
    pub fn line(&self) -> usize {
        self.line
    }

    /// `true` once no further bytes can be read.  Peeks without consuming.
    pub fn at_eof(&mut self) -> bool {
        if self.eof {
            return true;
        }
        match self.source.fill_buf() {
            Ok(buf) => buf.is_empty(),
            Err(_) => false,
        }
    }

    /// Read one physical line with surrounding whitespace stripped.
    ///
    /// A line that is not valid UTF-8 is decoded as Latin-1.  Returns `None`
    /// at end of stream.
    pub fn next_physical(&mut self) -> io::Result<Option<String>> {
        if self.eof {
            return Ok(None);
        }
        let mut buf = Vec::new();
        if self.source.read_until(b'\n', &mut buf)? == 0 {
            self.eof = true;
            return Ok(None);
        }
        self.line += 1;
        let text = match String::from_utf8(buf) {
            Ok(text) => text,
            Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
        };
        Ok(Some(text.trim().to_owned()))
    }

    /// Read one logical line, joining continued physical lines.
    ///
    /// When `breakpoints` reports the starting line as marked, the text is
    /// prefixed with [`BREAKPOINT_MARKER`] (once).
    pub fn next_logical(
        &mut self,
        breakpoints: Option<&BreakpointLookup>,
    ) -> io::Result<Option<LogicalLine>> {
        let Some(mut text) = self.next_physical()? else {
            return Ok(None);
        };
        let start = self.line;

        while text.len() > CONTINUATION.len() && text.ends_with(CONTINUATION) {
            let Some(next) = self.next_physical()? else { break };
            text.truncate(text.len() - CONTINUATION.len());
            text.push_str(&next);
        }

        if let Some(lookup) = breakpoints {
            if lookup(&self.path, start) && !text.starts_with(BREAKPOINT_MARKER) {
                text.insert_str(0, "|> ");
            }
        }

        Ok(Some(LogicalLine { text, line: start }))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
