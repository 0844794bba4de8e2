//! Side files generated from install sections.
//!
//! * `<helpfile> … </helpfile>` blocks hold documentation articles.  Article
//!   ids are moved into the plugin namespace and every article is tagged
//!   with the install id before the block is written to
//!   `<docs_dir>/<id>.nhlp`.
//! * `layout <file> … endlayout` blocks are written to `<file>.nlyt` with
//!   one tab of indentation per open `group`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::{debug, info};

use crate::error::{Result, ScriptError};
use crate::fs::FileSystem;

use super::comment::strip_line_comment;
use super::reader::LineReader;
use super::syntax::arg_at;

pub const HELPFILE_OPEN: &str = "<helpfile>";
pub const HELPFILE_CLOSE: &str = "</helpfile>";
pub const DOC_EXT: &str = ".nhlp";

pub const LAYOUT_KEYWORD: &str = "layout";
pub const LAYOUT_END: &str = "endlayout";
pub const LAYOUT_EXT: &str = ".nlyt";

const ID_PREFIX: &str = "plgn_";
const PACKAGE_PREFIX: &str = "pkg_";

// ── Documentation articles ────────────────────────────────────────────────────

/// Put an article id into the plugin namespace unless it already is.
pub fn normalize_article_id(id: &str) -> String {
    if id.starts_with(ID_PREFIX) || id.starts_with(PACKAGE_PREFIX) {
        id.to_owned()
    } else {
        format!("{ID_PREFIX}{id}")
    }
}

fn article_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<article\b([^>]*)>(.*?)</article>").expect("article regex"))
}

fn id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\bid\s*=\s*"([^"]*)""#).expect("article id regex"))
}

/// A documentation block after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Articles {
    pub document: String,
    /// Normalized ids in document order.
    pub ids: Vec<String>,
}

impl Articles {
    pub fn first_id(&self) -> Option<&str> {
        self.ids.first().map(String::as_str)
    }
}

/// Normalize every `<article>` of a helpfile body.
pub fn extract_articles(body: &str, install_id: &str) -> Articles {
    let mut ids = Vec::new();

    let document = article_regex().replace_all(body, |caps: &Captures<'_>| {
        let mut attrs = caps[1].to_owned();
        let mut content = caps[2].to_owned();

        let id = id_regex()
            .captures(&attrs)
            .and_then(|c| c.get(1))
            .map(|m| (m.range(), normalize_article_id(m.as_str())));
        if let Some((range, normalized)) = id {
            attrs.replace_range(range, &normalized);
            ids.push(normalized);
        }

        if !content.contains("<keywords") {
            content.insert_str(0, &format!("<keywords><keyword>{install_id}</keyword></keywords>"));
        }

        format!("<article{attrs}>{content}</article>")
    });

    Articles {
        document: document.into_owned(),
        ids,
    }
}

/// Gather a helpfile body starting at `line`.
///
/// The inline form ends on the same line; otherwise physical lines are read
/// from `reader` (line comments stripped) up to `</helpfile>` or end of
/// stream.
pub fn collect_helpfile(line: &str, reader: &mut LineReader) -> io::Result<String> {
    let start = line.find(HELPFILE_OPEN).map_or(0, |p| p + HELPFILE_OPEN.len());
    let first = &line[start..];

    if let Some(end) = first.find(HELPFILE_CLOSE) {
        return Ok(first[..end].to_owned());
    }

    let mut body = format!("{first}\n");
    while let Some(raw) = reader.next_physical()? {
        let text = strip_line_comment(&raw, false);
        match text.find(HELPFILE_CLOSE) {
            Some(end) => {
                body.push_str(&text[..end]);
                break;
            }
            None => {
                body.push_str(&text);
                body.push('\n');
            }
        }
    }
    Ok(body)
}

/// Write a normalized document to `<docs_dir>/<id>.nhlp`.
pub fn write_documentation(docs_dir: &Path, id: &str, document: &str, line: &str) -> Result<PathBuf> {
    let path = docs_dir.join(format!("{id}{DOC_EXT}"));
    std::fs::create_dir_all(docs_dir)
        .and_then(|()| std::fs::write(&path, document))
        .map_err(|source| ScriptError::CannotReadFile {
            line: line.to_owned(),
            path: path.clone(),
            source,
        })?;
    info!(path = %path.display(), "documentation written");
    Ok(path)
}

// ── Layouts ───────────────────────────────────────────────────────────────────

/// A `layout` directive and its collected body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutWriter {
    file_name: String,
    header: String,
    body: Vec<String>,
    complete: bool,
}

impl LayoutWriter {
    /// Parse a `layout <file> …` line.  Returns `None` if no file name follows
    /// the keyword.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix(LAYOUT_KEYWORD)?;
        let offset = LAYOUT_KEYWORD.len() + (rest.len() - rest.trim_start().len());
        let name = arg_at(line, offset);
        if name.is_empty() {
            return None;
        }

        // The header keeps everything after the first unquoted space that
        // follows the file name.
        let bytes = line.as_bytes();
        let mut quotes = 0usize;
        let mut header = LAYOUT_KEYWORD.to_owned();
        for i in offset..bytes.len() {
            if bytes[i] == b'"' && bytes[i - 1] != b'\\' {
                quotes += 1;
            }
            if quotes % 2 == 0 && bytes[i] == b' ' {
                header.push_str(&line[i..]);
                break;
            }
        }

        let complete = header.contains(LAYOUT_END);
        if let Some(pos) = header.find(LAYOUT_END) {
            header.truncate(pos + LAYOUT_END.len());
        }

        Some(Self {
            file_name: name,
            header,
            body: Vec::new(),
            complete,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// `true` once `endlayout` has been seen.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Read the multi-line body from `reader` up to `endlayout`.
    pub fn read_body(&mut self, reader: &mut LineReader) -> io::Result<()> {
        let mut indent = 1usize;
        while !self.complete {
            let Some(text) = reader.next_physical()? else { break };

            if text.starts_with("endgroup") || text.starts_with(LAYOUT_END) {
                indent = indent.saturating_sub(1);
            }
            let mut out = "\t".repeat(indent);

            if let Some(pos) = text.find(LAYOUT_END) {
                out.push_str(&text[..pos + LAYOUT_END.len()]);
                self.body.push(out);
                self.complete = true;
                break;
            }

            out.push_str(&text);
            self.body.push(out);
            if text.starts_with("group") {
                indent += 1;
            }
        }
        Ok(())
    }

    /// File contents: header followed by the indented body.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.header.len() + 1);
        out.push_str(&self.header);
        out.push('\n');
        for line in &self.body {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Write the layout file and return its path.
    pub fn write(&self, fs: &FileSystem, line: &str) -> Result<PathBuf> {
        let path = fs
            .valid_file_name(&self.file_name, LAYOUT_EXT)
            .unwrap_or_else(|| PathBuf::from(&self.file_name));
        std::fs::write(&path, self.render()).map_err(|source| ScriptError::CannotReadFile {
            line: line.to_owned(),
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), lines = self.body.len() + 1, "layout written");
        Ok(path)
    }
}

/// The command that replaces a written layout block.
pub fn layout_command(path: &Path) -> String {
    format!("{LAYOUT_KEYWORD} \"{}\"", path.display())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
