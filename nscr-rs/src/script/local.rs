//! Script-local functions (`lclfunc`).
//!
//! ```text
//! lclfunc area(w, h) := w * h
//! print area(2, 3)          →  print ((2) * (3))
//! ```
//!
//! Definitions live for one script session.  Calls are expanded textually
//! outside of string literals; a body may call other local functions, which
//! are expanded on the next pass up to [`MAX_EXPANSION_DEPTH`] passes.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, ScriptError};

use super::reader::BREAKPOINT_MARKER;
use super::syntax::command_keyword;

pub const LOCAL_KEYWORD: &str = "lclfunc";
pub const MAX_EXPANSION_DEPTH: usize = 32;

const ASSIGN: &str = ":=";

/// One `lclfunc` definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: String,
}

/// `true` if `line` defines a local function.
pub fn is_definition(line: &str) -> bool {
    command_keyword(line) == LOCAL_KEYWORD
}

/// The text after the `lclfunc` keyword.
fn definition_text(line: &str) -> &str {
    let line = line.strip_prefix(BREAKPOINT_MARKER).unwrap_or(line).trim_start();
    line.strip_prefix(LOCAL_KEYWORD).unwrap_or(line).trim()
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_identifier(s: &str) -> bool {
    let b = s.as_bytes();
    !b.is_empty() && !b[0].is_ascii_digit() && b.iter().all(|&c| is_ident_byte(c))
}

/// Per-session store of local functions.
#[derive(Debug, Clone, Default)]
pub struct LocalFunctions {
    defs: HashMap<String, LocalFunction>,
}

impl LocalFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&LocalFunction> {
        self.defs.get(name)
    }

    pub fn clear(&mut self) {
        self.defs.clear();
    }

    /// Parse and store an `lclfunc name(a, b) := body` line, replacing any
    /// earlier definition of the same name.
    pub fn define(&mut self, line: &str) -> Result<&LocalFunction> {
        let invalid = |reason: &str| ScriptError::InvalidLocalDefinition {
            line: line.to_owned(),
            reason: reason.to_owned(),
        };

        let text = definition_text(line);
        let (head, body) = text.split_once(ASSIGN).ok_or_else(|| invalid("missing ':='"))?;
        let body = body.trim();
        if body.is_empty() {
            return Err(invalid("empty body"));
        }

        let head = head.trim();
        let open = head.find('(').ok_or_else(|| invalid("missing parameter list"))?;
        let close = head.rfind(')').filter(|&c| c > open).ok_or_else(|| invalid("unclosed parameter list"))?;

        let name = head[..open].trim();
        if !is_identifier(name) {
            return Err(invalid("invalid function name"));
        }

        let params_src = head[open + 1..close].trim();
        let mut params = Vec::new();
        if !params_src.is_empty() {
            for p in params_src.split(',') {
                let p = p.trim();
                if !is_identifier(p) {
                    return Err(invalid("invalid parameter name"));
                }
                params.push(p.to_owned());
            }
        }

        let func = LocalFunction {
            name: name.to_owned(),
            params,
            body: body.to_owned(),
        };
        debug!(name = %func.name, arity = func.params.len(), "local function defined");
        let key = func.name.clone();
        self.defs.insert(key.clone(), func);
        Ok(&self.defs[&key])
    }

    /// Expand every call of a local function in `line`.
    pub fn substitute(&self, line: &str) -> String {
        if self.defs.is_empty() {
            return line.to_owned();
        }
        let mut current = line.to_owned();
        for _ in 0..MAX_EXPANSION_DEPTH {
            match self.expand_once(&current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    /// One left-to-right expansion pass.  `None` if nothing was expanded.
    fn expand_once(&self, line: &str) -> Option<String> {
        let bytes = line.as_bytes();
        let mut out = String::with_capacity(line.len());
        let mut changed = false;
        let mut in_quotes = false;
        let mut i = 0;
        let mut copied = 0;

        while i < bytes.len() {
            let b = bytes[i];
            if b == b'"' && (i == 0 || bytes[i - 1] != b'\\') {
                in_quotes = !in_quotes;
                i += 1;
                continue;
            }
            if in_quotes || !is_ident_byte(b) || (i > 0 && is_ident_byte(bytes[i - 1])) {
                i += 1;
                continue;
            }

            let start = i;
            while i < bytes.len() && is_ident_byte(bytes[i]) {
                i += 1;
            }
            let Some(func) = self.get(&line[start..i]) else { continue };

            let mut open = i;
            while open < bytes.len() && bytes[open] == b' ' {
                open += 1;
            }
            if bytes.get(open) != Some(&b'(') {
                continue;
            }
            let Some((args, end)) = call_arguments(line, open) else { continue };
            if args.len() != func.params.len() {
                continue;
            }

            out.push_str(&line[copied..start]);
            out.push('(');
            out.push_str(&bind_parameters(&func.body, &func.params, &args));
            out.push(')');
            copied = end;
            i = end;
            changed = true;
        }

        if !changed {
            return None;
        }
        out.push_str(&line[copied..]);
        Some(out)
    }
}

/// Split the argument list starting at the `(` at `open`.
///
/// Returns the trimmed arguments and the byte offset just past the closing
/// parenthesis.  Commas inside nested parentheses or quotes do not split.
fn call_arguments(line: &str, open: usize) -> Option<(Vec<String>, usize)> {
    let bytes = line.as_bytes();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut args = Vec::new();
    let mut arg_start = open + 1;

    for i in open..bytes.len() {
        let b = bytes[i];
        if b == b'"' && bytes[i - 1] != b'\\' {
            in_quotes = !in_quotes;
        }
        if in_quotes {
            continue;
        }
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    let last = line[arg_start..i].trim();
                    if !(args.is_empty() && last.is_empty()) {
                        args.push(last.to_owned());
                    }
                    return Some((args, i + 1));
                }
            }
            b',' if depth == 1 => {
                args.push(line[arg_start..i].trim().to_owned());
                arg_start = i + 1;
            }
            _ => {}
        }
    }
    None
}

/// Replace whole-identifier occurrences of `params` in `body` with `(arg)`.
fn bind_parameters(body: &str, params: &[String], args: &[String]) -> String {
    if params.is_empty() {
        return body.to_owned();
    }
    let bytes = body.as_bytes();
    let mut out = String::with_capacity(body.len());
    let mut i = 0;
    let mut copied = 0;

    while i < bytes.len() {
        if !is_ident_byte(bytes[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && is_ident_byte(bytes[i]) {
            i += 1;
        }
        if let Some(idx) = params.iter().position(|p| p == &body[start..i]) {
            out.push_str(&body[copied..start]);
            out.push('(');
            out.push_str(&args[idx]);
            out.push(')');
            copied = i;
        }
    }
    out.push_str(&body[copied..]);
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
