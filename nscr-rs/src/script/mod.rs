//! Script directive processing.
//!
//! A script is read line by line and turned into a stream of plain commands
//! for the host interpreter.  Along the way the processor:
//!
//! - joins `\\` continuations and honours `|> ` breakpoint markers
//! - strips `##` / `#* … *#` comments, keeping `##!` / `#*!` documentation
//!   for the next procedure header
//! - splices definitions from `@name[:scope]` includes
//! - expands `lclfunc` local functions and the `<this>` token
//! - runs `<install>` sections: package chains, the installation log,
//!   `<helpfile>` articles and `layout` blocks
//!
//! # Quick start
//!
//! ```rust,no_run
//! use nscr::config::Config;
//! use nscr::script::ScriptProcessor;
//!
//! let mut p = ScriptProcessor::new(Config::new());
//! p.open_script("hello").unwrap();
//! while p.is_open() {
//!     let cmd = p.next_command().unwrap();
//!     println!("{cmd}");
//! }
//! ```

pub mod artifact;
pub mod comment;
pub mod include;
pub mod install;
pub mod local;
pub mod processor;
pub mod reader;
pub mod syntax;

// Re-exports for convenience.
pub use include::{IncludeMarker, IncludeScope};
pub use install::{InstallInfo, PackageChain};
pub use local::LocalFunctions;
pub use processor::{HostAction, Prompt, ScriptProcessor};
pub use reader::LineReader;
