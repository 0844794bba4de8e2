//! Breakpoint store.
//!
//! The processor never owns breakpoints; it asks a [`BreakpointLookup`]
//! callback whether a (file, line) pair is marked.  [`BreakpointStore`] is a
//! plain in-memory store that front-ends (the CLI, tests) can share through
//! [`BreakpointStore::into_lookup`].
//!
//! Line numbers are 1-based, matching [`crate::script::reader::LineReader`].

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Callback answering "is there a breakpoint at this line of this file?".
pub type BreakpointLookup = Arc<dyn Fn(&Path, usize) -> bool + Send + Sync>;

/// Per-file sets of breakpoint line numbers.
#[derive(Debug, Default, Clone)]
pub struct BreakpointStore {
    lines: HashMap<PathBuf, BTreeSet<usize>>,
}

impl BreakpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `line` of `file`.  Returns `false` if it was already marked.
    pub fn add(&mut self, file: impl Into<PathBuf>, line: usize) -> bool {
        self.lines.entry(file.into()).or_default().insert(line)
    }

    /// Remove a breakpoint.  Returns `true` if it existed.
    pub fn remove(&mut self, file: &Path, line: usize) -> bool {
        let Some(set) = self.lines.get_mut(file) else { return false };
        let removed = set.remove(&line);
        if set.is_empty() {
            self.lines.remove(file);
        }
        removed
    }

    pub fn contains(&self, file: &Path, line: usize) -> bool {
        self.lines.get(file).is_some_and(|set| set.contains(&line))
    }

    /// Breakpoint lines of one file in ascending order.
    pub fn lines_of(&self, file: &Path) -> impl Iterator<Item = usize> + '_ {
        self.lines.get(file).into_iter().flat_map(|set| set.iter().copied())
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Freeze the store into a lookup callback.
    pub fn into_lookup(self) -> BreakpointLookup {
        Arc::new(move |file: &Path, line: usize| self.contains(file, line))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
