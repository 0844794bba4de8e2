//! File name resolution for scripts, packages and generated artifacts.
//!
//! | Input | Resolved to |
//! |-------|-------------|
//! | `<>/docs/x` | `<exe_dir>/docs/x` |
//! | `<scriptpath>/x` | `<script_dir>/x` |
//! | `"quoted name"` | quotes removed, then resolved |
//! | relative name | `<script_dir>/name` |
//! | name without extension | default extension appended |

use std::path::{Path, PathBuf};

use crate::config::Config;

/// Path resolver bound to an installation's directories.
#[derive(Debug, Clone)]
pub struct FileSystem {
    exe_dir: PathBuf,
    script_dir: PathBuf,
}

impl FileSystem {
    pub fn new(exe_dir: impl Into<PathBuf>, script_dir: impl Into<PathBuf>) -> Self {
        Self {
            exe_dir: exe_dir.into(),
            script_dir: script_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.exe_dir, &config.script_dir)
    }

    pub fn exe_dir(&self) -> &Path {
        &self.exe_dir
    }

    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    /// Turn a user-supplied file name into a concrete path.
    ///
    /// Returns `None` for an empty name.
    pub fn valid_file_name(&self, name: &str, default_ext: &str) -> Option<PathBuf> {
        let name = name.trim();
        let name = name
            .strip_prefix('"')
            .and_then(|n| n.strip_suffix('"'))
            .unwrap_or(name)
            .trim()
            .replace('\\', "/");

        if name.is_empty() {
            return None;
        }

        let mut path = if let Some(rest) = name.strip_prefix("<>") {
            self.exe_dir.join(rest.trim_start_matches('/'))
        } else if let Some(rest) = name.strip_prefix("<scriptpath>") {
            self.script_dir.join(rest.trim_start_matches('/'))
        } else {
            let p = PathBuf::from(&name);
            if p.is_absolute() || is_drive_path(&name) {
                p
            } else {
                self.script_dir.join(p)
            }
        };

        if path.extension().is_none() {
            path.set_extension(default_ext.trim_start_matches('.'));
        }
        Some(path)
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// `C:/…` style names count as absolute regardless of the host platform.
fn is_drive_path(name: &str) -> bool {
    let b = name.as_bytes();
    b.len() >= 3 && b[0].is_ascii_alphabetic() && b[1] == b':' && b[2] == b'/'
}

/// Abbreviate the middle directories of a path: `/a/b/c/d/file` → `/a/../d/file`.
pub fn short_name(path: &Path) -> String {
    let full = path.display().to_string().replace('\\', "/");
    let parts: Vec<&str> = full.split('/').collect();
    if parts.len() <= 4 {
        return full;
    }
    let n = parts.len();
    format!("{}/{}/../{}/{}", parts[0], parts[1], parts[n - 2], parts[n - 1])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
