//! Script inclusion (`@name[:scope]`).
//!
//! An included file only contributes definitions.  Every line whose keyword
//! is not in the definition set is dropped, and install sections are skipped
//! wholesale.
//!
//! | Scope | Accepted keywords |
//! |-------|-------------------|
//! | none / `:procedures` | `define`, `ifndef`, `ifndefined`, `redefine`, `redef`, `lclfunc`, `global` |
//! | `:defines` | the above minus `global` |
//! | `:globals` | `global` |

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::breakpoint::BreakpointLookup;
use crate::error::{Result, ScriptError};
use crate::fs::FileSystem;

use super::comment::{resume_block_comment, strip_block_comment, strip_line_comment};
use super::install::{INSTALL_CLOSE, INSTALL_OPEN};
use super::reader::LineReader;
use super::syntax::command_keyword;

const DEFINITION_KEYWORDS: &[&str] = &["define", "ifndef", "ifndefined", "redefine", "redef", "lclfunc"];
const GLOBAL_KEYWORD: &str = "global";

/// Which part of an included file is passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncludeScope {
    #[default]
    All,
    Defines,
    Globals,
    Procedures,
}

impl IncludeScope {
    /// `true` if a line with `keyword` passes this scope's filter.
    pub fn accepts(self, keyword: &str) -> bool {
        let is_definition = DEFINITION_KEYWORDS.contains(&keyword);
        let is_global = keyword == GLOBAL_KEYWORD;
        match self {
            IncludeScope::All | IncludeScope::Procedures => is_definition || is_global,
            IncludeScope::Defines => is_definition,
            IncludeScope::Globals => is_global,
        }
    }
}

/// A parsed `@name[:scope]` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeMarker {
    pub name: String,
    pub scope: IncludeScope,
}

impl IncludeMarker {
    /// Recognise an include marker at the start of `line`.
    ///
    /// `@ x` (a space right after `@`) and a bare `@` are not markers.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix('@')?;
        if rest.is_empty() || rest.starts_with(' ') {
            return None;
        }

        // A quoted name keeps its colons; the scope follows the closing quote.
        let (name, scope_src) = if let Some(quoted) = rest.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            let end = rest.find(' ').unwrap_or(rest.len());
            match scope_colon(&rest[..end]) {
                Some(colon) => (&rest[..colon], &rest[colon..]),
                None => (&rest[..end], &rest[end..]),
            }
        };

        let scope = match scope_src.find(':') {
            Some(c) => {
                let s = &scope_src[c + 1..];
                if s.contains("defines") {
                    IncludeScope::Defines
                } else if s.contains("globals") {
                    IncludeScope::Globals
                } else if s.contains("procedures") {
                    IncludeScope::Procedures
                } else {
                    IncludeScope::All
                }
            }
            None => IncludeScope::All,
        };

        Some(IncludeMarker {
            name: name.to_owned(),
            scope,
        })
    }
}

/// Position of the scope separator in an include name, skipping a drive
/// letter colon such as the one in `C:/lib/defs`.
fn scope_colon(name: &str) -> Option<usize> {
    let pos = name.rfind(':')?;
    let b = name.as_bytes();
    let is_drive = pos == 1 && matches!(b.get(2), Some(b'/') | Some(b'\\'));
    (!is_drive).then_some(pos)
}

/// An open included file.
#[derive(Debug)]
pub struct IncludeSession {
    reader: LineReader,
    scope: IncludeScope,
    block_comment: bool,
}

impl IncludeSession {
    /// Resolve and open the file named by `marker`.
    ///
    /// `line` is the directive text, reported on failure.
    pub fn open(marker: &IncludeMarker, fs: &FileSystem, line: &str) -> Result<Self> {
        let path = fs
            .valid_file_name(&marker.name, ".nscr")
            .unwrap_or_else(|| PathBuf::from(&marker.name));
        let reader = LineReader::open(&path).map_err(|_| ScriptError::ScriptNotFound {
            line: line.to_owned(),
            path: path.clone(),
        })?;
        debug!(path = %path.display(), scope = ?marker.scope, "include opened");
        Ok(Self {
            reader,
            scope: marker.scope,
            block_comment: false,
        })
    }

    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    pub fn scope(&self) -> IncludeScope {
        self.scope
    }

    pub fn line(&self) -> usize {
        self.reader.line()
    }

    pub fn block_comment_active(&self) -> bool {
        self.block_comment
    }

    /// Next accepted line, or `None` once the file is exhausted.
    pub fn next_line(&mut self, breakpoints: Option<&BreakpointLookup>) -> Result<Option<String>> {
        while let Some(logical) = self.reader.next_logical(breakpoints)? {
            let mut text = logical.text;
            if text.is_empty() {
                continue;
            }

            if self.block_comment {
                match resume_block_comment(&text, &mut self.block_comment, None) {
                    Some(rest) => text = rest,
                    None => continue,
                }
            }

            if starts_install_section(&text) {
                self.skip_install_section()?;
                continue;
            }

            text = strip_line_comment(&text, false);
            text = strip_block_comment(&text, false, &mut self.block_comment);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            if self.scope.accepts(command_keyword(text)) {
                return Ok(Some(text.to_owned()));
            }
        }
        debug!(path = %self.reader.path().display(), "include exhausted");
        Ok(None)
    }

    fn skip_install_section(&mut self) -> Result<()> {
        while let Some(line) = self.reader.next_physical()? {
            if line.starts_with(INSTALL_CLOSE)
                || (command_keyword(&line) == GLOBAL_KEYWORD && line.contains(INSTALL_CLOSE))
            {
                break;
            }
        }
        Ok(())
    }
}

fn starts_install_section(line: &str) -> bool {
    line.starts_with(INSTALL_OPEN)
        || (command_keyword(line) == GLOBAL_KEYWORD && line.contains(INSTALL_OPEN))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn marker(name: &str, scope: IncludeScope) -> IncludeMarker {
        IncludeMarker { name: name.to_owned(), scope }
    }

    #[test]
    fn parse_plain_and_scoped() {
        assert_eq!(IncludeMarker::parse("@defs"), Some(marker("defs", IncludeScope::All)));
        assert_eq!(IncludeMarker::parse("@defs:defines"), Some(marker("defs", IncludeScope::Defines)));
        assert_eq!(IncludeMarker::parse("@defs:globals"), Some(marker("defs", IncludeScope::Globals)));
        assert_eq!(
            IncludeMarker::parse("@lib/defs:procedures"),
            Some(marker("lib/defs", IncludeScope::Procedures))
        );
    }

    #[test]
    fn parse_quoted() {
        assert_eq!(
            IncludeMarker::parse("@\"my defs\":globals"),
            Some(marker("my defs", IncludeScope::Globals))
        );
        assert_eq!(IncludeMarker::parse("@\"my defs\""), Some(marker("my defs", IncludeScope::All)));
        assert_eq!(
            IncludeMarker::parse("@\"C:/a:b\":defines"),
            Some(marker("C:/a:b", IncludeScope::Defines))
        );
    }

    #[test]
    fn parse_drive_letter_is_not_scope() {
        assert_eq!(
            IncludeMarker::parse("@C:/lib/defs"),
            Some(marker("C:/lib/defs", IncludeScope::All))
        );
        assert_eq!(
            IncludeMarker::parse("@C:/lib/defs:defines"),
            Some(marker("C:/lib/defs", IncludeScope::Defines))
        );
    }

    #[test]
    fn not_a_marker() {
        assert_eq!(IncludeMarker::parse("@ defs"), None);
        assert_eq!(IncludeMarker::parse("@"), None);
        assert_eq!(IncludeMarker::parse("print @x"), None);
    }

    #[test]
    fn scope_filters() {
        assert!(IncludeScope::All.accepts("define"));
        assert!(IncludeScope::All.accepts("global"));
        assert!(!IncludeScope::All.accepts("print"));
        assert!(IncludeScope::Defines.accepts("redef"));
        assert!(!IncludeScope::Defines.accepts("global"));
        assert!(IncludeScope::Globals.accepts("global"));
        assert!(!IncludeScope::Globals.accepts("lclfunc"));
        assert!(IncludeScope::Procedures.accepts("ifndefined"));
    }

    fn include_file(dir: &Path, name: &str, body: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    #[test]
    fn session_filters_and_skips_install() {
        let dir = tempfile::tempdir().unwrap();
        include_file(
            dir.path(),
            "defs.nscr",
            "define f(x) := x^2 ## square\n\
             print \"dropped\"\n\
             <install>\n\
             define hidden() := 0\n\
             <endinstall>\n\
             #* block\n\
             define commented() := 1\n\
             *# global g = 1\n\
             lclfunc h(y) := y+1\n",
        );
        let fs = FileSystem::new(dir.path(), dir.path());
        let mut inc = IncludeSession::open(&marker("defs", IncludeScope::All), &fs, "@defs").unwrap();

        assert_eq!(inc.next_line(None).unwrap().as_deref(), Some("define f(x) := x^2"));
        assert_eq!(inc.next_line(None).unwrap().as_deref(), Some("global g = 1"));
        assert_eq!(inc.next_line(None).unwrap().as_deref(), Some("lclfunc h(y) := y+1"));
        assert_eq!(inc.next_line(None).unwrap(), None);
        assert_eq!(inc.line(), 9);
        assert!(!inc.block_comment_active());
    }

    #[test]
    fn defines_scope_drops_globals() {
        let dir = tempfile::tempdir().unwrap();
        include_file(dir.path(), "defs.nscr", "define a() := 1\nglobal b = 2\n");
        let fs = FileSystem::new(dir.path(), dir.path());
        let mut inc = IncludeSession::open(&marker("defs", IncludeScope::Defines), &fs, "@defs:defines").unwrap();
        assert_eq!(inc.next_line(None).unwrap().as_deref(), Some("define a() := 1"));
        assert_eq!(inc.next_line(None).unwrap(), None);
    }

    #[test]
    fn missing_file_is_script_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FileSystem::new(dir.path(), dir.path());
        let err = IncludeSession::open(&marker("nope", IncludeScope::All), &fs, "@nope").unwrap_err();
        assert_eq!(err.code(), "SCRIPT_NOT_FOUND");
        assert_eq!(err.line(), "@nope");
        assert_eq!(err.path(), Some(dir.path().join("nope.nscr").as_path()));
    }
}
