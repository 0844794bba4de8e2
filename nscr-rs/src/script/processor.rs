//! The directive processor.
//!
//! [`ScriptProcessor`] pulls lines from the open script (or the active
//! include), removes comments, handles the structural directives itself and
//! hands every other line back to the caller as a command string.
//!
//! | Directive | Handling |
//! |-----------|----------|
//! | `@name[:scope]` | open an include; its filtered lines come next |
//! | `<install>` … `<endinstall>` | skipped unless install mode is on |
//! | `<info>` … `<endinfo>` | install header: dependencies, version, license, flags |
//! | `<helpfile>` … `</helpfile>` | written to the documentation directory |
//! | `layout <file>` … `endlayout` | written to `<file>.nlyt`, returned as `layout "<path>"` |
//! | `lclfunc name(args) := body` | stored; later calls are expanded |
//! | `<this>` | replaced by the directory of the current script |
//!
//! Side effects on the host are not performed directly: they are queued as
//! [`HostAction`]s (drained with [`ScriptProcessor::take_actions`]) and screen
//! messages are appended to [`ScriptProcessor::output`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::breakpoint::BreakpointLookup;
use crate::config::Config;
use crate::error::{Result, ScriptError};
use crate::fs::{short_name, FileSystem};

use super::artifact::{
    collect_helpfile, extract_articles, layout_command, write_documentation, LayoutWriter,
    HELPFILE_OPEN, LAYOUT_KEYWORD,
};
use super::comment::{
    resume_block_comment, strip_block_comment, strip_line_comment, DocumentationBuffer,
    BLOCK_DOC_OPEN, BLOCK_OPEN, LINE_COMMENT, LINE_DOC_COMMENT,
};
use super::include::{IncludeMarker, IncludeSession};
use super::install::{
    installing_message, license_message, split_info, InstallInfo, InstallLog, InstallationState,
    INFO_CLOSE, INFO_OPEN, INSTALL_CLOSE, INSTALL_OPEN, MSG_ABORT, MSG_START, MSG_SUCCESS,
};
use super::local::{is_definition, LocalFunctions};
use super::reader::LineReader;
use super::syntax::{is_procedure_end, is_procedure_start, procedure_name};

const SCRIPT_EXT: &str = ".nscr";
const THIS_TOKEN: &str = "<this>";
const PROCEDURE_HEADER: &str = "procedure ";

// ── Host seams ────────────────────────────────────────────────────────────────

/// Synchronous question to the user; returns the typed answer.
pub type Prompt = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Side effects requested from the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    /// Register a package with the procedure library (the full info header).
    DeclarePackage(String),
    /// Link a package's help article to its install id.
    AddHelpIndex { install_id: String, help_id: String },
    /// Add a written documentation file to the documentation index.
    IndexDocumentation(PathBuf),
}

impl fmt::Display for HostAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostAction::DeclarePackage(header) => write!(f, "declare package: {header}"),
            HostAction::AddHelpIndex { install_id, help_id } => {
                write!(f, "help index: {install_id} -> {help_id}")
            }
            HostAction::IndexDocumentation(path) => {
                write!(f, "index documentation: {}", path.display())
            }
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// The primary script stream.
#[derive(Debug)]
struct ScriptSession {
    reader: LineReader,
    block_comment: bool,
}

// ── Processor ─────────────────────────────────────────────────────────────────

/// Turns script files into a stream of executable commands.
pub struct ScriptProcessor {
    config: Config,
    fs: FileSystem,
    /// Canonical script name; reopened by [`ScriptProcessor::open`] and
    /// [`ScriptProcessor::restart`].
    script_path: Option<PathBuf>,
    session: Option<ScriptSession>,
    include: Option<IncludeSession>,
    install: Option<InstallationState>,
    /// Execute install sections instead of skipping them.
    install_mode: bool,
    valid: bool,
    auto_start: bool,
    last_command: bool,
    local_defs: LocalFunctions,
    /// Last parsed install header, for [`ScriptProcessor::take_install_info`].
    install_info: String,
    /// Messages for the user's screen.
    pub output: Vec<String>,
    /// Side-effects queued for the host.
    pub actions: Vec<HostAction>,
    /// Breakpoint lookup consulted for every logical line.
    pub breakpoints: Option<BreakpointLookup>,
    /// License prompt.  Without one, licenses are treated as declined.
    pub prompt: Option<Prompt>,
}

impl fmt::Debug for ScriptProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptProcessor")
            .field("script_path", &self.script_path)
            .field("session", &self.session)
            .field("include", &self.include)
            .field("install", &self.install)
            .field("install_mode", &self.install_mode)
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

impl ScriptProcessor {
    pub fn new(config: Config) -> Self {
        ScriptProcessor {
            fs: FileSystem::from_config(&config),
            config,
            script_path: None,
            session: None,
            include: None,
            install: None,
            install_mode: false,
            valid: false,
            auto_start: false,
            last_command: false,
            local_defs: LocalFunctions::new(),
            install_info: String::new(),
            output: Vec::new(),
            actions: Vec::new(),
            breakpoints: None,
            prompt: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn file_system(&self) -> &FileSystem {
        &self.fs
    }

    /// Drain and return all queued [`HostAction`]s.
    pub fn take_actions(&mut self) -> Vec<HostAction> {
        std::mem::take(&mut self.actions)
    }

    /// Drain and return the screen messages.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    // ── State queries ─────────────────────────────────────────────────────────

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_including(&self) -> bool {
        self.include.is_some()
    }

    /// `true` while an installation (or a chain of them) is in progress.
    pub fn is_installing(&self) -> bool {
        self.install.is_some()
    }

    pub fn install_procedures(&self) -> bool {
        self.install_mode
    }

    pub fn set_install_procedures(&mut self, on: bool) {
        self.install_mode = on;
    }

    pub fn auto_start(&self) -> bool {
        self.auto_start
    }

    pub fn set_auto_start(&mut self, on: bool) {
        self.auto_start = on;
    }

    /// Line number of the most recently read line of the active stream.
    pub fn current_line(&self) -> usize {
        match (&self.include, &self.session) {
            (Some(include), _) => include.line(),
            (None, Some(session)) => session.reader.line(),
            (None, None) => 0,
        }
    }

    /// Package chain entries of the running installation.
    pub fn package_chain(&self) -> &[PathBuf] {
        self.install
            .as_ref()
            .map(|s| s.chain.entries())
            .unwrap_or_default()
    }

    /// `true` once after the final line of a script was served.
    pub fn was_last_command(&mut self) -> bool {
        std::mem::take(&mut self.last_command)
    }

    /// The last install header, cleared on read.
    pub fn take_install_info(&mut self) -> String {
        std::mem::take(&mut self.install_info)
    }

    // ── Script names ──────────────────────────────────────────────────────────

    pub fn set_script_file_name(&mut self, name: &str) {
        self.script_path = self.fs.valid_file_name(name, SCRIPT_EXT);
    }

    pub fn script_file_name(&self) -> Option<&Path> {
        self.script_path.as_deref()
    }

    /// The script name with its middle directories abbreviated.
    pub fn script_file_name_short(&self) -> String {
        self.script_path.as_deref().map(short_name).unwrap_or_default()
    }

    // ── Session lifecycle ─────────────────────────────────────────────────────

    /// Set the script name and open it.
    pub fn open_script(&mut self, name: &str) -> Result<()> {
        self.set_script_file_name(name);
        self.open()
    }

    /// (Re)open the canonical script.  Does nothing if no name is set.
    pub fn open(&mut self) -> Result<()> {
        let Some(path) = self.script_path.clone() else { return Ok(()) };
        self.open_path(&path)
    }

    fn open_path(&mut self, path: &Path) -> Result<()> {
        self.session = None;
        self.include = None;

        let reader = match LineReader::open(path) {
            Ok(reader) => reader,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot open script");
                let chained = self.install.as_ref().is_some_and(|s| !s.chain.is_empty());
                self.teardown();
                if !chained {
                    self.script_path = None;
                }
                return Err(ScriptError::ScriptNotFound {
                    line: String::new(),
                    path: path.to_path_buf(),
                });
            }
        };

        self.script_path = Some(path.to_path_buf());
        self.session = Some(ScriptSession {
            reader,
            block_comment: false,
        });
        self.valid = true;
        self.auto_start = false;
        self.local_defs.clear();
        if let Some(state) = self.install.as_mut() {
            state.full_logging = false;
            state.disable_screen_output = false;
            state.installing_procedure = false;
            state.install_id.clear();
            state.help_id = None;
        }
        info!(path = %path.display(), "script opened");
        Ok(())
    }

    /// Close the current script.
    ///
    /// If an installation chain still has packages queued, the next one is
    /// opened instead and the processor stays open.
    pub fn close(&mut self) -> Result<()> {
        if self.session.is_none() {
            return Ok(());
        }
        self.include = None;
        self.session = None;

        let next = match self.install.as_mut() {
            Some(state) => {
                if let Err(e) = state.finish_log(false) {
                    warn!(error = %e, "cannot finalize install log");
                }
                if !state.chain.is_empty() && state.chain.is_exhausted() {
                    info!(packages = state.chain.len(), "installation chain finished");
                }
                state.chain.advance()
            }
            None => None,
        };

        match next {
            Some(path) => {
                self.last_command = false;
                info!(path = %path.display(), "continuing with next package");
                self.open_path(&path)
            }
            None => {
                self.teardown();
                debug!("script closed");
                Ok(())
            }
        }
    }

    /// Rewind to the first line of the current script, reopening the
    /// canonical script if none is open.
    pub fn restart(&mut self) -> Result<()> {
        self.local_defs.clear();
        self.include = None;

        let Some(session) = self.session.as_mut() else {
            return self.open();
        };
        let path = session.reader.path().to_path_buf();
        session.reader = LineReader::open(&path).map_err(|_| ScriptError::ScriptNotFound {
            line: String::new(),
            path: path.clone(),
        })?;
        session.block_comment = false;
        debug!(path = %path.display(), "script restarted");
        Ok(())
    }

    /// Handle an explicit `return` from the script: finish the install log
    /// successfully, then close.
    pub fn return_command(&mut self) -> Result<()> {
        if self.session.is_none() {
            return Ok(());
        }
        self.finish_install_log(true)?;
        self.close()
    }

    /// Drop every stream and all installation state.  The first entry of an
    /// installation chain becomes the canonical script again.
    fn teardown(&mut self) {
        self.include = None;
        self.session = None;
        if let Some(mut state) = self.install.take() {
            if let Err(e) = state.finish_log(false) {
                warn!(error = %e, "cannot finalize install log");
            }
            if let Some(origin) = state.chain.origin() {
                self.script_path = Some(origin.to_path_buf());
            }
        }
        self.valid = false;
        self.auto_start = false;
        self.install_mode = false;
        self.local_defs.clear();
    }

    // ── Command loop ──────────────────────────────────────────────────────────

    /// Return the next executable command.
    ///
    /// An empty string means nothing is left to execute right now: the script
    /// ended, was closed, or the line was consumed at the end of the stream.
    /// Any error aborts the running installation and closes the processor.
    pub fn next_command(&mut self) -> Result<String> {
        if self.session.is_none() {
            return Ok(String::new());
        }

        let result = self.dispatch().and_then(|cmd| {
            self.finish_if_exhausted()?;
            Ok(cmd)
        });

        if let Err(e) = &result {
            warn!(code = e.code(), line = self.current_line(), "script aborted: {e}");
            self.teardown();
        }
        result
    }

    fn finish_if_exhausted(&mut self) -> Result<()> {
        if self.include.is_some() {
            return Ok(());
        }
        let exhausted = self.session.as_mut().is_some_and(|s| s.reader.at_eof());
        if exhausted {
            self.last_command = true;
            self.close()?;
        }
        Ok(())
    }

    fn dispatch(&mut self) -> Result<String> {
        loop {
            let from_include = self.include.is_some();
            let next = if from_include {
                match self.next_from_include()? {
                    Some(line) => Some(line),
                    None => continue,
                }
            } else {
                self.next_from_script()?
            };
            let Some(line) = next else { return Ok(String::new()) };

            let mut line = self.expand_this(line);

            if !from_include {
                if let Some(marker) = IncludeMarker::parse(&line) {
                    if marker.name.is_empty() {
                        warn!(line = %line, "include without a file name skipped");
                        return Ok(String::new());
                    }
                    self.include = Some(IncludeSession::open(&marker, &self.fs, &line)?);
                    continue;
                }
            }

            if !self.install_mode && is_procedure_start(&line) {
                return Err(ScriptError::ProcedureDefinedOutsideInstall { line });
            }

            if self.install_mode {
                self.log_install_line(&line)?;
            } else {
                if is_definition(&line) {
                    self.local_defs.define(&line)?;
                    continue;
                }
                line = self.local_defs.substitute(&line);
            }

            return Ok(line);
        }
    }

    fn next_from_include(&mut self) -> Result<Option<String>> {
        let Some(include) = self.include.as_mut() else { return Ok(None) };
        let line = include.next_line(self.breakpoints.as_ref())?;
        if line.is_none() {
            if include.block_comment_active() {
                warn!(path = %include.path().display(), "include ends inside a block comment");
            }
            debug!(path = %include.path().display(), scope = ?include.scope(), "include closed");
            self.include = None;
        }
        Ok(line)
    }

    fn keep_docs(&self) -> bool {
        self.install_mode && self.install.as_ref().is_some_and(|s| s.installing_procedure)
    }

    /// Next line of the primary script with comments removed and structural
    /// directives handled.  `None` at end of stream or after an abort.
    fn next_from_script(&mut self) -> Result<Option<String>> {
        let mut docs = DocumentationBuffer::new();

        loop {
            let Some(session) = self.session.as_mut() else { return Ok(None) };
            let Some(logical) = session.reader.next_logical(self.breakpoints.as_ref())? else {
                return Ok(None);
            };
            let mut text = logical.text;
            if text.is_empty() {
                continue;
            }

            if session.block_comment {
                match resume_block_comment(&text, &mut session.block_comment, Some(&mut docs)) {
                    Some(rest) => text = rest,
                    None => continue,
                }
            }

            if text.contains(LINE_COMMENT) {
                if self.install_mode && text.starts_with(LINE_DOC_COMMENT) {
                    docs.push(&text);
                } else {
                    docs.clear();
                }
                text = strip_line_comment(&text, self.keep_docs());
                if text.is_empty() {
                    continue;
                }
            }

            if text.starts_with(INSTALL_OPEN) {
                if !self.install_mode {
                    self.skip_install_section()?;
                    continue;
                }
                match self.start_installation(&text)? {
                    Some(rest) => text = rest,
                    None => continue,
                }
            }

            if self.install_mode && text.starts_with(INFO_OPEN) {
                match self.handle_info(&text)? {
                    Some(rest) => text = rest,
                    None => continue,
                }
            }

            if self.install_mode && text.starts_with(HELPFILE_OPEN) {
                self.write_helpfile(&text)?;
                continue;
            }

            if text.starts_with(&format!("{LAYOUT_KEYWORD} ")) {
                if let Some(command) = self.write_layout(&text)? {
                    return Ok(Some(command));
                }
            }

            if text.starts_with(INSTALL_CLOSE) {
                self.finish_install_log(true)?;
                if let Some(state) = self.install.as_mut() {
                    state.installing_procedure = false;
                }
                text = text[INSTALL_CLOSE.len()..].trim().to_owned();
                if text.is_empty() {
                    continue;
                }
            }

            if text.contains(BLOCK_OPEN) {
                if self.install_mode && text.starts_with(BLOCK_DOC_OPEN) {
                    docs.push(&text);
                } else {
                    docs.clear();
                }
                let keep = self.keep_docs();
                if let Some(session) = self.session.as_mut() {
                    text = strip_block_comment(&text, keep, &mut session.block_comment);
                }
            }

            let mut text = text.trim().to_owned();
            if text.is_empty() {
                continue;
            }
            if text.starts_with(PROCEDURE_HEADER) {
                docs.attach_to(&mut text);
            }
            return Ok(Some(text));
        }
    }

    fn skip_install_section(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else { return Ok(()) };
        while let Some(line) = session.reader.next_physical()? {
            if line.starts_with(INSTALL_CLOSE) {
                break;
            }
        }
        debug!(line = session.reader.line(), "install section skipped");
        Ok(())
    }

    fn expand_this(&self, line: String) -> String {
        if !line.contains(THIS_TOKEN) {
            return line;
        }
        let current = self
            .session
            .as_ref()
            .map(|s| s.reader.path())
            .or(self.script_path.as_deref());
        let dir = current
            .and_then(Path::parent)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        line.replace(THIS_TOKEN, &dir)
    }

    // ── Installation ──────────────────────────────────────────────────────────

    /// Handle an `<install>` line.  Returns the text left to process.
    fn start_installation(&mut self, line: &str) -> Result<Option<String>> {
        let log = InstallLog::open(&self.config.log_file(), line)?;
        self.install
            .get_or_insert_with(InstallationState::new)
            .begin_package(log);
        info!(script = %self.script_file_name_short(), "installation started");

        let rest = line[INSTALL_OPEN.len()..].trim();
        if !rest.contains(INFO_OPEN) {
            return Ok(None);
        }
        self.handle_info(rest)
    }

    /// Parse an install header starting at `line`, reading further lines up
    /// to `<endinfo>` if needed.  Returns the text after `<endinfo>`.
    fn handle_info(&mut self, line: &str) -> Result<Option<String>> {
        let mut assembled = line.to_owned();
        if !assembled.contains(INFO_CLOSE) {
            if let Some(session) = self.session.as_mut() {
                while let Some(raw) = session.reader.next_physical()? {
                    let text = strip_line_comment(&raw, false);
                    assembled.push(' ');
                    assembled.push_str(&text);
                    if text.contains(INFO_CLOSE) {
                        break;
                    }
                }
            }
        }

        let Some((header, rest)) = split_info(&assembled) else {
            return Err(ScriptError::UnterminatedInstallInfo {
                line: line.to_owned(),
            });
        };
        let info = InstallInfo::parse(header);
        let rest = rest.trim().to_owned();

        let packages: Vec<PathBuf> = info
            .packages
            .iter()
            .filter_map(|name| self.resolve_package(name))
            .collect();
        let origin = self.script_path.clone().unwrap_or_default();
        let state = self.install.get_or_insert_with(InstallationState::new);
        for package in packages {
            if state.chain.enqueue(&origin, package.clone()) {
                debug!(package = %package.display(), "package queued");
            }
        }

        if let Some(required) = info.required_version {
            if required > u64::from(self.config.runtime_version) {
                return Err(ScriptError::InsufficientRuntimeVersion {
                    line: line.to_owned(),
                    required,
                    running: self.config.runtime_version,
                });
            }
        }

        if let Some(license) = &info.license {
            let question = license_message(&info.name, license);
            self.output.push(question.clone());
            let answer = self.prompt.as_ref().map(|ask| ask(&question)).unwrap_or_default();
            if !self.is_yes(&answer) {
                self.output.push(MSG_ABORT.to_owned());
                info!(package = %info.name, "license declined");
                self.close()?;
                return Ok(None);
            }
        }

        let state = self.install.get_or_insert_with(InstallationState::new);
        state.apply(&info);
        if !info.header.is_empty() {
            if !state.disable_screen_output {
                self.output.push(MSG_START.to_owned());
            }
            if let Some(log) = state.log.as_mut() {
                log.install_info(&info.header)?;
            }
            self.actions.push(HostAction::DeclarePackage(info.header.clone()));
        }
        self.install_info = info.header;

        Ok(if rest.is_empty() { None } else { Some(rest) })
    }

    fn is_yes(&self, answer: &str) -> bool {
        answer
            .trim()
            .to_lowercase()
            .starts_with(&self.config.yes_answer.to_lowercase())
    }

    /// Look a dependency up in `<script_dir>/packages` first, then resolve it
    /// like any script name.
    fn resolve_package(&self, name: &str) -> Option<PathBuf> {
        let packaged = self
            .fs
            .valid_file_name(&format!("packages/{name}"), SCRIPT_EXT)
            .filter(|p| self.fs.exists(p));
        packaged.or_else(|| self.fs.valid_file_name(name, SCRIPT_EXT))
    }

    fn finish_install_log(&mut self, success: bool) -> Result<()> {
        let Some(state) = self.install.as_mut() else { return Ok(()) };
        if state.finish_log(success)? && success && !state.disable_screen_output {
            self.output.push(MSG_SUCCESS.to_owned());
        }
        Ok(())
    }

    /// Procedure tracking and full logging for a line of an install section.
    fn log_install_line(&mut self, line: &str) -> Result<()> {
        let Some(state) = self.install.as_mut() else { return Ok(()) };
        if state.log.is_none() {
            return Ok(());
        }

        if let Some(name) = procedure_name(line) {
            state.installing_procedure = true;
            if let Some(log) = state.log.as_mut() {
                log.installing(name)?;
            }
            if !state.disable_screen_output {
                self.output.push(installing_message(name));
            }
        }

        state.log_line(line)?;

        if is_procedure_end(line) {
            state.installing_procedure = false;
        }
        Ok(())
    }

    // ── Artifacts ─────────────────────────────────────────────────────────────

    fn write_helpfile(&mut self, line: &str) -> Result<()> {
        let Some(session) = self.session.as_mut() else { return Ok(()) };
        let body = collect_helpfile(line, &mut session.reader)?;

        let install_id = self
            .install
            .as_ref()
            .map(|s| s.install_id.clone())
            .unwrap_or_default();
        let articles = extract_articles(&body, &install_id);
        let Some(id) = articles.first_id() else {
            warn!(install_id = %install_id, "helpfile without articles");
            return Ok(());
        };

        let path = write_documentation(&self.config.docs_dir(), id, &articles.document, line)?;
        let state = self.install.get_or_insert_with(InstallationState::new);
        let help_id = state.help_id.get_or_insert_with(|| id.to_owned()).clone();

        self.actions.push(HostAction::AddHelpIndex {
            install_id,
            help_id,
        });
        self.actions.push(HostAction::IndexDocumentation(path));
        Ok(())
    }

    /// Write a layout block.  Returns the replacement command, or `None` if
    /// the line names no layout file.
    fn write_layout(&mut self, line: &str) -> Result<Option<String>> {
        let Some(mut layout) = LayoutWriter::parse(line) else { return Ok(None) };
        if !layout.is_complete() {
            if let Some(session) = self.session.as_mut() {
                layout.read_body(&mut session.reader)?;
            }
            if !layout.is_complete() {
                warn!(file = layout.file_name(), "layout ends without endlayout");
            }
        }
        let path = layout.write(&self.fs, line)?;
        Ok(Some(layout_command(&path)))
    }
}

impl Drop for ScriptProcessor {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.teardown();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        processor: ScriptProcessor,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::create_dir_all(dir.path().join("scripts")).unwrap();
            let mut config = Config::rooted(dir.path());
            config.runtime_version = 150;
            Fixture {
                processor: ScriptProcessor::new(config),
                dir,
            }
        }

        fn script(&self, name: &str, body: &str) -> PathBuf {
            let path = self.dir.path().join("scripts").join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, body).unwrap();
            path
        }

        fn run(&mut self, name: &str) -> Vec<String> {
            self.processor.open_script(name).unwrap();
            let mut out = Vec::new();
            while self.processor.is_open() {
                let cmd = self.processor.next_command().unwrap();
                if !cmd.is_empty() {
                    out.push(cmd);
                }
            }
            out
        }

        fn log(&self) -> String {
            std::fs::read_to_string(self.dir.path().join("install.log")).unwrap_or_default()
        }
    }

    #[test]
    fn plain_lines_pass_through() {
        let mut f = Fixture::new();
        f.script("main.nscr", "a = 1 ## set\n\n#* block *# b = 2\nprint a + \\\\\nb\n");
        assert_eq!(f.run("main"), ["a = 1", "b = 2", "print a + b"]);
        assert!(!f.processor.is_open());
        assert!(f.processor.was_last_command());
        assert!(!f.processor.was_last_command());
    }

    #[test]
    fn closed_processor_returns_empty() {
        let mut f = Fixture::new();
        assert_eq!(f.processor.next_command().unwrap(), "");
        assert!(f.processor.close().is_ok());
        assert!(f.processor.restart().is_ok());
    }

    #[test]
    fn missing_script_is_not_found() {
        let mut f = Fixture::new();
        let err = f.processor.open_script("nope").unwrap_err();
        assert_eq!(err.code(), "SCRIPT_NOT_FOUND");
        assert!(!f.processor.is_open());
        assert_eq!(f.processor.script_file_name(), None);
    }

    #[test]
    fn install_section_skipped_without_install_mode() {
        let mut f = Fixture::new();
        f.script(
            "main.nscr",
            "a = 1\n<install>\n<info> name=x <endinfo>\nprocedure $f()\nendprocedure\n<endinstall>\nb = 2\n",
        );
        assert_eq!(f.run("main"), ["a = 1", "b = 2"]);
        assert_eq!(f.log(), "");
    }

    #[test]
    fn procedure_outside_install_is_an_error() {
        let mut f = Fixture::new();
        f.script("main.nscr", "procedure $f()\nendprocedure\n");
        f.processor.open_script("main").unwrap();
        let err = f.processor.next_command().unwrap_err();
        assert_eq!(err.code(), "PROCEDURE_WITHOUT_INSTALL");
        assert_eq!(err.line(), "procedure $f()");
        assert!(!f.processor.is_open());
    }

    #[test]
    fn procedure_inside_install_is_fine() {
        let mut f = Fixture::new();
        f.script(
            "main.nscr",
            "<install>\n<info> name=pkg <endinfo>\nprocedure $f()\nreturn 1\nendprocedure\n<endinstall>\n",
        );
        f.processor.set_install_procedures(true);
        assert_eq!(f.run("main"), ["procedure $f()", "return 1", "endprocedure"]);
        assert!(f.processor.output.contains(&"Installing \"$f\" ...".to_owned()));
        let log = f.log();
        assert!(log.contains("Installinfo: name=pkg"));
        assert!(log.contains(">> Installing: \"$f\" ..."));
        assert!(log.ends_with("--- INSTALLATION TERMINATED SUCCESSFULLY ---\n\n\n"));
        assert_eq!(
            f.processor.take_actions(),
            [HostAction::DeclarePackage("name=pkg".to_owned())]
        );
        assert!(!f.processor.install_procedures());
    }

    #[test]
    fn docs_attached_to_procedure_header() {
        let mut f = Fixture::new();
        f.script(
            "main.nscr",
            "<install>\n<info> name=pkg <endinfo>\n##! Adds one\nprocedure $inc(x)\nreturn x+1 ## plain\nendprocedure\n<endinstall>\n",
        );
        f.processor.set_install_procedures(true);
        let out = f.run("main");
        assert_eq!(out[0], "procedure $inc(x)##! Adds one\n");
        assert_eq!(out[1], "return x+1");
    }

    #[test]
    fn local_functions_expand() {
        let mut f = Fixture::new();
        f.script("main.nscr", "lclfunc sq(x) := x*x\nprint sq(3)\n");
        assert_eq!(f.run("main"), ["print ((3)*(3))"]);
    }

    #[test]
    fn this_token_is_script_dir() {
        let mut f = Fixture::new();
        let path = f.script("sub/main.nscr", "load \"<this>/data.dat\"\n");
        let dir = path.parent().unwrap().display().to_string();
        assert_eq!(f.run("sub/main"), [format!("load \"{dir}/data.dat\"")]);
    }

    #[test]
    fn include_lines_come_first() {
        let mut f = Fixture::new();
        f.script("defs.nscr", "define a() := 1\nprint 0\nglobal g = 2\n");
        f.script("main.nscr", "@defs:defines\nprint a()\n");
        assert_eq!(f.run("main"), ["define a() := 1", "print a()"]);
    }

    #[test]
    fn include_line_numbers() {
        let mut f = Fixture::new();
        f.script("defs.nscr", "\n\ndefine a() := 1\n");
        f.script("main.nscr", "@defs\nx\ny\n");
        f.processor.open_script("main").unwrap();
        assert_eq!(f.processor.next_command().unwrap(), "define a() := 1");
        assert!(f.processor.is_including());
        assert_eq!(f.processor.current_line(), 3);
        assert_eq!(f.processor.next_command().unwrap(), "x");
        assert!(!f.processor.is_including());
        assert_eq!(f.processor.current_line(), 2);
    }

    #[test]
    fn restart_rewinds() {
        let mut f = Fixture::new();
        f.script("main.nscr", "a\nb\n");
        f.processor.open_script("main").unwrap();
        assert_eq!(f.processor.next_command().unwrap(), "a");
        f.processor.restart().unwrap();
        assert_eq!(f.processor.current_line(), 0);
        assert_eq!(f.processor.next_command().unwrap(), "a");
    }

    #[test]
    fn restart_reopens_closed_script() {
        let mut f = Fixture::new();
        f.script("main.nscr", "a\n");
        assert_eq!(f.run("main"), ["a"]);
        f.processor.restart().unwrap();
        assert!(f.processor.is_open());
        assert_eq!(f.processor.next_command().unwrap(), "a");
    }

    #[test]
    fn return_command_closes_with_success() {
        let mut f = Fixture::new();
        f.script("main.nscr", "<install> <info> name=p <endinfo>\nreturn\nmore\n");
        f.processor.set_install_procedures(true);
        f.processor.open_script("main").unwrap();
        assert_eq!(f.processor.next_command().unwrap(), "return");
        f.processor.return_command().unwrap();
        assert!(!f.processor.is_open());
        assert!(f.log().ends_with("--- INSTALLATION TERMINATED SUCCESSFULLY ---\n\n\n"));
        assert!(!f.log().contains("FAILED"));
    }

    #[test]
    fn install_info_taken_once() {
        let mut f = Fixture::new();
        f.script("main.nscr", "<install>\n<info>\nname=p ## id\nflags=DISABLE_SCREEN_OUTPUT\n<endinfo>\n<endinstall>\n");
        f.processor.set_install_procedures(true);
        f.run("main");
        assert_eq!(f.processor.take_install_info(), "name=p  flags=DISABLE_SCREEN_OUTPUT");
        assert_eq!(f.processor.take_install_info(), "");
        assert!(!f.processor.output.iter().any(|m| m == MSG_START));
    }

    #[test]
    fn unterminated_info_is_an_error() {
        let mut f = Fixture::new();
        f.script("main.nscr", "<install>\n<info> name=p\nflags=X\n");
        f.processor.set_install_procedures(true);
        f.processor.open_script("main").unwrap();
        let err = f.processor.next_command().unwrap_err();
        assert_eq!(err.code(), "UNTERMINATED_INSTALL_INFO");
        assert!(f.log().ends_with("--- INSTALLATION FAILED ---\n\n\n"));
    }

    #[test]
    fn license_declined_aborts_quietly() {
        let mut f = Fixture::new();
        f.script("main.nscr", "<install>\n<info> name=p license=\"GPL\" <endinfo>\nprocedure $f()\n");
        f.processor.set_install_procedures(true);
        f.processor.prompt = Some(Arc::new(|_: &str| "no".to_owned()));
        f.processor.open_script("main").unwrap();
        assert_eq!(f.processor.next_command().unwrap(), "");
        assert!(!f.processor.is_open());
        assert_eq!(f.processor.output.last().map(String::as_str), Some(MSG_ABORT));
        assert!(f.log().ends_with("--- INSTALLATION FAILED ---\n\n\n"));
        assert!(f.processor.take_actions().is_empty());
    }

    #[test]
    fn license_accepted_continues() {
        let mut f = Fixture::new();
        f.script("main.nscr", "<install>\n<info> name=p license=\"GPL\" <endinfo>\nx = 1\n<endinstall>\n");
        f.processor.set_install_procedures(true);
        f.processor.prompt = Some(Arc::new(|_: &str| "Yes".to_owned()));
        assert_eq!(f.run("main"), ["x = 1"]);
        assert!(f.processor.output[0].contains("GPL"));
    }

    #[test]
    fn layout_written_and_rewritten() {
        let mut f = Fixture::new();
        f.script("main.nscr", "layout win\ngroup\nbutton\nendgroup\nendlayout\nnext\n");
        let out = f.run("main");
        let path = f.dir.path().join("scripts").join("win.nlyt");
        assert_eq!(out, [format!("layout \"{}\"", path.display()), "next".to_owned()]);
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "layout\n\tgroup\n\t\tbutton\n\tendgroup\nendlayout\n"
        );
    }

    #[test]
    fn helpfile_written_in_install_mode() {
        let mut f = Fixture::new();
        f.script(
            "main.nscr",
            "<install>\n<info> name=stats <endinfo>\n<helpfile>\n<article id=\"mean\">\n<title>Mean</title>\n</article>\n</helpfile>\n<endinstall>\n",
        );
        f.processor.set_install_procedures(true);
        assert!(f.run("main").is_empty());

        let doc = f.dir.path().join("docs").join("plugins").join("plgn_mean.nhlp");
        let text = std::fs::read_to_string(&doc).unwrap();
        assert!(text.contains("id=\"plgn_mean\""));
        assert!(text.contains("<keywords><keyword>stats</keyword></keywords>"));

        let actions = f.processor.take_actions();
        assert_eq!(actions.len(), 3);
        assert_eq!(
            actions[1],
            HostAction::AddHelpIndex {
                install_id: "stats".to_owned(),
                help_id: "plgn_mean".to_owned()
            }
        );
        assert_eq!(actions[2], HostAction::IndexDocumentation(doc));
    }

    #[test]
    fn short_name_of_script() {
        let mut f = Fixture::new();
        f.processor.set_script_file_name("/a/b/c/d/main");
        assert_eq!(f.processor.script_file_name_short(), "/a/../d/main.nscr");
    }

    #[test]
    fn auto_start_reset_on_open() {
        let mut f = Fixture::new();
        f.script("main.nscr", "a\n");
        f.processor.set_auto_start(true);
        f.processor.open_script("main").unwrap();
        assert!(!f.processor.auto_start());
    }

    #[test]
    fn action_display() {
        let a = HostAction::AddHelpIndex {
            install_id: "p".into(),
            help_id: "plgn_p".into(),
        };
        assert_eq!(a.to_string(), "help index: p -> plgn_p");
    }
}
