//! Small lexical helpers shared by the directive handlers.
//!
//! None of these understand the command language; they only find keywords,
//! procedure headers and `key=value` arguments in raw line text.

use std::sync::OnceLock;

use regex::Regex;

use super::reader::BREAKPOINT_MARKER;

/// The leading command keyword of a line, ignoring a breakpoint marker.
///
/// `"|> define f(x) := x"` → `"define"`; `"@inc"` → `""`.
pub fn command_keyword(line: &str) -> &str {
    let line = line
        .strip_prefix(BREAKPOINT_MARKER)
        .unwrap_or(line)
        .trim_start();
    let end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(line.len());
    &line[..end]
}

fn procedure_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[\s>])procedure\s+(\$[^\s(]+)").expect("procedure header regex")
    })
}

/// Name (with its leading `$`) of the procedure a line starts to define.
pub fn procedure_name(line: &str) -> Option<&str> {
    procedure_regex()
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub fn is_procedure_start(line: &str) -> bool {
    procedure_name(line).is_some()
}

pub fn is_procedure_end(line: &str) -> bool {
    line.contains("endprocedure")
}

/// Byte offset just past `key=` in `text`, matching only at a word boundary
/// and outside double quotes.
pub fn find_key(text: &str, key: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let needle = format!("{key}=");
    let mut in_quotes = false;

    for i in 0..bytes.len() {
        if bytes[i] == b'"' && (i == 0 || bytes[i - 1] != b'\\') {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes || !bytes[i..].starts_with(needle.as_bytes()) {
            continue;
        }
        let boundary = i == 0 || {
            let prev = bytes[i - 1];
            !(prev.is_ascii_alphanumeric() || prev == b'_')
        };
        if boundary {
            return Some(i + needle.len());
        }
    }
    None
}

/// Read the argument starting at byte offset `pos`.
///
/// A quoted argument runs to the matching unescaped quote and is returned
/// without the quotes (escaped quotes unescaped); otherwise the argument ends
/// at the next whitespace.
pub fn arg_at(text: &str, pos: usize) -> String {
    let Some(rest) = text.get(pos..) else { return String::new() };
    let rest = rest.trim_start();

    if let Some(quoted) = rest.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = quoted.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some('"') => out.push('"'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => out.push('\\'),
                },
                '"' => break,
                c => out.push(c),
            }
        }
        return out;
    }

    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    rest[..end].to_owned()
}

/// Value of `key=` in `text`, if the key is present.
pub fn key_value(text: &str, key: &str) -> Option<String> {
    find_key(text, key).map(|pos| arg_at(text, pos))
}

/// Split a comma-separated list, dropping empty entries and surrounding quotes.
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().trim_matches('"').trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_extraction() {
        assert_eq!(command_keyword("define f(x) := x^2"), "define");
        assert_eq!(command_keyword("|> global a = 1"), "global");
        assert_eq!(command_keyword("lclfunc"), "lclfunc");
        assert_eq!(command_keyword("@inc"), "");
        assert_eq!(command_keyword("x=1"), "x");
    }

    #[test]
    fn procedure_detection() {
        assert_eq!(procedure_name("procedure $sum(a, b)"), Some("$sum"));
        assert_eq!(procedure_name("|> procedure $ns~calc()"), Some("$ns~calc"));
        assert_eq!(procedure_name("procedure plain()"), None);
        assert_eq!(procedure_name("endprocedure"), None);
        assert!(is_procedure_end("endprocedure"));
        assert!(!is_procedure_start("print \"a procedure\""));
    }

    #[test]
    fn key_at_word_boundary_only() {
        let text = "pkgname=bad name=good";
        assert_eq!(key_value(text, "name").as_deref(), Some("good"));
        assert_eq!(key_value(text, "flags"), None);
    }

    #[test]
    fn key_inside_quotes_ignored() {
        let text = r#"license="name=fake" name=real"#;
        assert_eq!(key_value(text, "name").as_deref(), Some("real"));
        assert_eq!(key_value(text, "license").as_deref(), Some("name=fake"));
    }

    #[test]
    fn quoted_argument_with_escape() {
        assert_eq!(arg_at(r#"x="a \"b\" c" y"#, 2), r#"a "b" c"#);
    }

    #[test]
    fn bare_argument_stops_at_space() {
        assert_eq!(arg_at("requireversion=1.2.3 flags=X", 15), "1.2.3");
        assert_eq!(arg_at("x=", 2), "");
        assert_eq!(arg_at("x", 10), "");
    }

    #[test]
    fn list_splitting() {
        assert_eq!(split_list("a, b,,\"c\" "), ["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }
}
