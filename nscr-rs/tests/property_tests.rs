use proptest::prelude::*;

use nscr::script::comment::{strip_block_comment, strip_line_comment};
use nscr::script::local::LocalFunctions;
use nscr::script::{IncludeMarker, InstallInfo};

/// Text without quotes, backslashes or comment markers.
fn plain() -> impl Strategy<Value = String> {
    "[a-z0-9 =+()]{0,20}"
}

/// A quoted string that may contain comment markers.
fn quoted() -> impl Strategy<Value = String> {
    "[a-z #*!]{0,12}".prop_map(|s| format!("\"{s}\""))
}

proptest! {
    /// A comment after balanced quotes is found no matter what precedes it.
    #[test]
    fn line_comment_after_balanced_quotes(pre in plain(), q in quoted(), mid in plain(), tail in "[a-z ]{0,10}") {
        let code = format!("{pre}{q}{mid}");
        let line = format!("{code}## {tail}");
        prop_assert_eq!(strip_line_comment(&line, false), code);
    }

    /// Markers inside a quoted string never start a comment.
    #[test]
    fn quoted_markers_are_kept(pre in plain(), q in quoted(), post in plain()) {
        let line = format!("{pre}{q}{post}");
        prop_assert_eq!(strip_line_comment(&line, false), line.clone());
        let mut active = false;
        prop_assert_eq!(strip_block_comment(&line, false, &mut active), line);
        prop_assert!(!active);
    }

    /// A closed block comment is removed wherever it sits between quoted parts.
    #[test]
    fn block_comment_between_quotes(a in plain(), q in quoted(), body in "[a-z #!]{0,10}", b in plain()) {
        let line = format!("{a}{q}#*{body}*#{q}{b}");
        let mut active = false;
        prop_assert_eq!(strip_block_comment(&line, false, &mut active), format!("{a}{q}{q}{b}"));
        prop_assert!(!active);
    }
}

proptest! {
    /// None of the line parsers panic on arbitrary input.
    #[test]
    fn parsers_do_not_panic(s in "\\PC*") {
        let mut active = false;
        let _ = strip_line_comment(&s, true);
        let _ = strip_block_comment(&s, true, &mut active);
        let _ = IncludeMarker::parse(&s);
        let _ = InstallInfo::parse(&s);
        let mut defs = LocalFunctions::new();
        let _ = defs.define(&format!("lclfunc {s}"));
        let _ = defs.substitute(&s);
    }

    /// Expansion through a defined function never panics and always
    /// terminates, even for self-referencing bodies.
    #[test]
    fn substitution_terminates(body in "[a-z(), ]{1,15}", call in "[a-z(), ]{0,30}") {
        let mut defs = LocalFunctions::new();
        if defs.define(&format!("lclfunc f(x) := {body}")).is_ok() {
            let _ = defs.substitute(&call);
        }
    }
}
