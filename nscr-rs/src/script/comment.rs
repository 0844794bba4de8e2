//! Comment stripping.
//!
//! | Marker | Meaning |
//! |--------|---------|
//! | `##` | line comment |
//! | `##!` | documentation line comment |
//! | `#*` … `*#` | block comment, may span lines |
//! | `#*!` … `*#` | documentation block comment |
//!
//! Markers inside double-quoted strings are ignored.  A quote counts when it
//! is not immediately preceded by a backslash; `\\"` is therefore still
//! treated as escaped.
//!
//! Documentation comments survive only when `keep_docs` is set, i.e. while a
//! procedure body of an active installation is being read.

use std::sync::OnceLock;

use aho_corasick::AhoCorasick;

pub const LINE_COMMENT: &str = "##";
pub const LINE_DOC_COMMENT: &str = "##!";
pub const BLOCK_OPEN: &str = "#*";
pub const BLOCK_DOC_OPEN: &str = "#*!";
pub const BLOCK_CLOSE: &str = "*#";

fn markers() -> &'static AhoCorasick {
    static MARKERS: OnceLock<AhoCorasick> = OnceLock::new();
    MARKERS.get_or_init(|| AhoCorasick::new([LINE_COMMENT, BLOCK_OPEN, BLOCK_CLOSE]))
}

/// `true` if `line` contains any comment marker (quoted or not).
pub fn has_comment_marker(line: &str) -> bool {
    markers().is_match(line)
}

/// Tracks quote parity while scanning a line byte by byte.
struct QuoteParity {
    quotes: usize,
}

impl QuoteParity {
    fn new() -> Self {
        Self { quotes: 0 }
    }

    /// Account for the byte at `i` and report whether `i` is outside quotes.
    fn step(&mut self, bytes: &[u8], i: usize) -> bool {
        if bytes[i] == b'"' && (i == 0 || bytes[i - 1] != b'\\') {
            self.quotes += 1;
        }
        self.quotes % 2 == 0
    }
}

// ── Line comments ─────────────────────────────────────────────────────────────

/// Remove a `##` line comment.
pub fn strip_line_comment(line: &str, keep_docs: bool) -> String {
    if line == LINE_COMMENT {
        return String::new();
    }
    if !has_comment_marker(line) {
        return line.to_owned();
    }

    let bytes = line.as_bytes();
    let mut parity = QuoteParity::new();

    for i in 0..bytes.len() {
        let outside = parity.step(bytes, i);
        if !outside {
            continue;
        }
        let rest = &bytes[i..];
        if keep_docs && rest.starts_with(LINE_DOC_COMMENT.as_bytes()) {
            return line.to_owned();
        }
        if rest.starts_with(LINE_COMMENT.as_bytes()) {
            return line[..i].to_owned();
        }
    }
    line.to_owned()
}

// ── Block comments ────────────────────────────────────────────────────────────

/// Remove `#* … *#` block comments from a line.
///
/// An opener without a terminator on the same line erases the rest of the
/// line and sets `active`; subsequent lines go through
/// [`resume_block_comment`] until the terminator shows up.
pub fn strip_block_comment(line: &str, keep_docs: bool, active: &mut bool) -> String {
    if line == BLOCK_OPEN {
        *active = true;
        return String::new();
    }
    if !has_comment_marker(line) {
        return line.to_owned();
    }

    let mut out = line.to_owned();
    let mut parity = QuoteParity::new();
    let mut i = 0;

    while i < out.len() {
        let outside = parity.step(out.as_bytes(), i);
        if outside {
            let rest = &out.as_bytes()[i..];
            if keep_docs && rest.starts_with(BLOCK_DOC_OPEN.as_bytes()) {
                return line.to_owned();
            }
            if rest.starts_with(BLOCK_OPEN.as_bytes()) {
                match out[i + BLOCK_OPEN.len()..].find(BLOCK_CLOSE) {
                    Some(rel) => {
                        let end = i + BLOCK_OPEN.len() + rel + BLOCK_CLOSE.len();
                        out.replace_range(i..end, "");
                        // The byte now at `i` has not been scanned yet.
                        continue;
                    }
                    None => {
                        out.truncate(i);
                        *active = true;
                        break;
                    }
                }
            }
        }
        i += 1;
    }
    out
}

/// Continue a block comment opened on an earlier line.
///
/// Returns the text after the terminator, or `None` if the whole line is
/// comment body.  The consumed comment text is appended to `docs` while it is
/// buffering.
pub fn resume_block_comment(
    line: &str,
    active: &mut bool,
    docs: Option<&mut DocumentationBuffer>,
) -> Option<String> {
    match line.find(BLOCK_CLOSE) {
        Some(pos) => {
            let end = pos + BLOCK_CLOSE.len();
            if let Some(docs) = docs {
                docs.append_if_buffering(&line[..end]);
            }
            *active = false;
            let rest = &line[end..];
            if rest.is_empty() {
                None
            } else {
                Some(rest.to_owned())
            }
        }
        None => {
            if let Some(docs) = docs {
                docs.append_if_buffering(line);
            }
            None
        }
    }
}

/// Remove every complete block comment, ignoring quotes.  An unterminated
/// opener erases the rest of the text.  Used on assembled install headers.
pub fn erase_block_comments(text: &str) -> String {
    let mut out = text.to_owned();
    while let Some(start) = out.find(BLOCK_OPEN) {
        match out[start + BLOCK_OPEN.len()..].find(BLOCK_CLOSE) {
            Some(rel) => {
                let end = start + BLOCK_OPEN.len() + rel + BLOCK_CLOSE.len();
                out.replace_range(start..end, "");
            }
            None => {
                out.truncate(start);
                break;
            }
        }
    }
    out
}

// ── Documentation buffer ──────────────────────────────────────────────────────

/// Consecutive documentation comment lines waiting for a procedure header.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DocumentationBuffer {
    text: String,
}

impl DocumentationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one documentation line.
    pub fn push(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
    }

    /// Add a block-comment continuation line, only if a doc block is open.
    pub fn append_if_buffering(&mut self, line: &str) {
        if !self.text.is_empty() {
            self.push(line);
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Hand the buffered text to `line` and reset the buffer.
    pub fn attach_to(&mut self, line: &mut String) {
        line.push_str(&self.text);
        self.text.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // -- line comments --------------------------------------------------------

    #[test]
    fn line_without_comment_is_identity() {
        assert_eq!(strip_line_comment("no comment here", false), "no comment here");
    }

    #[test]
    fn line_comment_truncates() {
        assert_eq!(strip_line_comment("a = 1 ## set a", false), "a = 1 ");
        assert_eq!(strip_line_comment("##", false), "");
        assert_eq!(strip_line_comment("## whole line", false), "");
    }

    #[test]
    fn line_comment_inside_quotes_kept() {
        let line = r###"print "## not a comment" ## but this is"###;
        assert_eq!(strip_line_comment(line, false), r###"print "## not a comment" "###);
    }

    #[test]
    fn escaped_quote_does_not_toggle() {
        let line = r###"print "say \"## hi\"" ## c"###;
        assert_eq!(strip_line_comment(line, false), r###"print "say \"## hi\"" "###);
    }

    #[test]
    fn doc_line_comment_kept_only_with_keep_docs() {
        let line = "##! Computes the sum";
        assert_eq!(strip_line_comment(line, true), line);
        assert_eq!(strip_line_comment(line, false), "");
        assert_eq!(strip_line_comment("x ##! trailing", true), "x ##! trailing");
    }

    // -- block comments -------------------------------------------------------

    #[test]
    fn block_comment_inline() {
        let mut active = false;
        assert_eq!(strip_block_comment("a #* hidden *# b", false, &mut active), "a  b");
        assert!(!active);
    }

    #[test]
    fn block_comment_unterminated_then_resumed() {
        let mut active = false;
        assert_eq!(strip_block_comment("a #* unterminated", false, &mut active), "a ");
        assert!(active);
        assert_eq!(resume_block_comment("more *# tail", &mut active, None).as_deref(), Some(" tail"));
        assert!(!active);
    }

    #[test]
    fn block_comment_multiple_per_line() {
        let mut active = false;
        let out = strip_block_comment("x #*1*##*2*# y #*3*# z", false, &mut active);
        assert_eq!(out, "x  y  z");
        assert!(!active);
    }

    #[test]
    fn block_opener_alone_activates() {
        let mut active = false;
        assert_eq!(strip_block_comment("#*", false, &mut active), "");
        assert!(active);
    }

    #[test]
    fn block_opener_at_line_end_activates() {
        let mut active = false;
        assert_eq!(strip_block_comment("code #*", false, &mut active), "code ");
        assert!(active);
    }

    #[test]
    fn block_comment_in_quotes_kept() {
        let mut active = false;
        let line = r###"print "#* not *#" #* yes *#"###;
        assert_eq!(strip_block_comment(line, false, &mut active), r###"print "#* not *#" "###);
    }

    #[test]
    fn doc_block_kept_with_keep_docs() {
        let mut active = false;
        let line = "#*! documented *#";
        assert_eq!(strip_block_comment(line, true, &mut active), line);
        assert_eq!(strip_block_comment(line, false, &mut active), "");
        assert!(!active);
    }

    #[test]
    fn resume_without_terminator_discards() {
        let mut active = true;
        assert_eq!(resume_block_comment("still comment", &mut active, None), None);
        assert!(active);
        assert_eq!(resume_block_comment("end *#", &mut active, None), None);
        assert!(!active);
    }

    #[test]
    fn resume_feeds_buffering_docs() {
        let mut active = true;
        let mut docs = DocumentationBuffer::new();
        resume_block_comment("ignored", &mut active, Some(&mut docs));
        assert!(docs.is_empty());

        docs.push("#*! Header");
        resume_block_comment("body line", &mut active, Some(&mut docs));
        resume_block_comment("last *# rest", &mut active, Some(&mut docs));
        assert_eq!(docs.as_str(), "#*! Header\nbody line\nlast *#\n");
    }

    #[test]
    fn erase_in_header() {
        assert_eq!(erase_block_comments("name=x #* c *# flags=Y"), "name=x  flags=Y");
        assert_eq!(erase_block_comments("name=x #* open"), "name=x ");
    }

    #[test]
    fn attach_moves_docs() {
        let mut docs = DocumentationBuffer::new();
        docs.push("##! one");
        let mut line = "procedure $f()".to_owned();
        docs.attach_to(&mut line);
        assert_eq!(line, "procedure $f()##! one\n");
        assert!(docs.is_empty());
    }
}
