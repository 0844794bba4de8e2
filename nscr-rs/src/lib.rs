//! `nscr`: a directive processor for procedure scripts.
//!
//! | Module | Role |
//! |--------|------|
//! | [`script`] | the line pipeline and [`script::ScriptProcessor`] |
//! | [`config`] | `.nscrrc` settings |
//! | [`fs`] | script path resolution |
//! | [`breakpoint`] | breakpoint lookup callbacks |
//! | [`error`] | [`error::ScriptError`] |
//! | [`cli`] | command-line arguments of the `nscr` binary |

pub mod breakpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod fs;
pub mod script;

pub use error::{Result, ScriptError};
