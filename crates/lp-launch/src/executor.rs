// SPDX-License-Identifier: MIT OR Apache-2.0
//! Composes initializers into a single launch.

use crate::child::ChildHandle;
use crate::initializer::{CombinationCategory, EnvEdit, EnvSource, EnvironmentSource, Initializer};
use crate::lifecycle::{LaunchState, LaunchTracker};
use crate::stdio::{Endpoint, Redirector, StdStream, Stdio, StdioKind};
use crate::sys;
use lp_cmdline::{CommandLine, resolve_executable};
use lp_env::EnvironmentMap;
use lp_error::{ErrorCode, LaunchError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Launcher seam
// ---------------------------------------------------------------------------

/// Performs the platform process-creation call.
pub trait Launcher {
    /// Create the process described by `request`.
    ///
    /// Implementations own every resource in the request and must release
    /// all of them on failure.
    fn launch(&self, request: LaunchRequest) -> Result<ChildHandle, LaunchError>;
}

impl<L: Launcher + ?Sized> Launcher for &L {
    fn launch(&self, request: LaunchRequest) -> Result<ChildHandle, LaunchError> {
        (**self).launch(request)
    }
}

/// Launcher for the host platform: fork/exec on POSIX, `CreateProcessW` on
/// Windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeLauncher;

impl Launcher for NativeLauncher {
    fn launch(&self, request: LaunchRequest) -> Result<ChildHandle, LaunchError> {
        sys::spawn(request)
    }
}

// ---------------------------------------------------------------------------
// Plan & request
// ---------------------------------------------------------------------------

/// Validated, merged launch parameters. No OS resource is held yet.
#[derive(Debug)]
pub struct LaunchPlan {
    /// Resolved path of the executable.
    pub program: PathBuf,
    /// The command line as given; `argv[0]` is the program as written.
    pub command: CommandLine,
    /// Final environment; `None` inherits the parent's.
    pub environment: Option<EnvironmentMap>,
    /// Directory the child starts in; `None` keeps the parent's.
    pub working_dir: Option<PathBuf>,
    /// Redirections in descriptor order.
    pub stdio: [Stdio; 3],
}

impl LaunchPlan {
    /// Redirection kinds in descriptor order.
    pub fn stdio_kinds(&self) -> [StdioKind; 3] {
        [
            self.stdio[0].kind(),
            self.stdio[1].kind(),
            self.stdio[2].kind(),
        ]
    }

    /// Open every redirection. On error, endpoints already opened are
    /// dropped.
    pub fn open(self) -> Result<LaunchRequest, LaunchError> {
        let [stdin, stdout, stderr] = self.stdio;
        Ok(LaunchRequest {
            program: self.program,
            command: self.command,
            environment: self.environment,
            working_dir: self.working_dir,
            stdin: stdin.open(StdStream::Stdin)?,
            stdout: stdout.open(StdStream::Stdout)?,
            stderr: stderr.open(StdStream::Stderr)?,
        })
    }
}

/// Everything a [`Launcher`] needs, with redirections opened.
#[derive(Debug)]
pub struct LaunchRequest {
    /// Resolved path of the executable.
    pub program: PathBuf,
    /// Program and arguments.
    pub command: CommandLine,
    /// Final environment; `None` inherits the parent's.
    pub environment: Option<EnvironmentMap>,
    /// Child working directory.
    pub working_dir: Option<PathBuf>,
    /// Opened stdin redirection.
    pub stdin: Endpoint,
    /// Opened stdout redirection.
    pub stdout: Endpoint,
    /// Opened stderr redirection.
    pub stderr: Endpoint,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Collects [`Initializer`]s and launches a child from them.
///
/// ```no_run
/// use lp_cmdline::CommandLine;
/// use lp_launch::{EnvEdit, EnvSource, Executor};
///
/// let child = Executor::new()
///     .with(CommandLine::new("env"))
///     .with(EnvSource::Clean)
///     .with(EnvEdit::Set("A".into(), "1".into()))
///     .launch()?;
/// let outcome = child.monitor().join();
/// # Ok::<(), lp_error::LaunchError>(())
/// ```
///
/// Order matters only among environment edits; everything else commutes.
///
/// The program is resolved before launch. A relative path with a separator
/// (`./tool`, `bin/tool`) is taken relative to the parent's current
/// directory, not to a [`WorkingDir`](crate::Initializer::WorkingDir) set on
/// this executor; use an absolute path to run something inside the child's
/// working directory. Bare names are searched on the child's `PATH`.
#[derive(Debug)]
pub struct Executor<L: Launcher = NativeLauncher> {
    initializers: Vec<Initializer>,
    launcher: L,
}

impl Executor {
    /// Executor using the host platform's launcher.
    pub fn new() -> Self {
        Self::with_launcher(NativeLauncher)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Launcher> Executor<L> {
    /// Executor with a custom launcher.
    pub fn with_launcher(launcher: L) -> Self {
        Self {
            initializers: Vec::new(),
            launcher,
        }
    }

    /// Add an initializer (builder style).
    #[must_use]
    pub fn with(mut self, init: impl Into<Initializer>) -> Self {
        self.initializers.push(init.into());
        self
    }

    /// Add an initializer.
    pub fn push(&mut self, init: impl Into<Initializer>) -> &mut Self {
        self.initializers.push(init.into());
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn working_dir(self, dir: impl Into<PathBuf>) -> Self {
        self.with(Initializer::WorkingDir(dir.into()))
    }

    /// Redirect one standard stream.
    #[must_use]
    pub fn redirect(self, stream: StdStream, stdio: impl Into<Stdio>) -> Self {
        self.with(Initializer::Redirect(stream, stdio.into()))
    }

    /// Shorthand for an [`EnvEdit::Set`].
    #[must_use]
    pub fn env(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(EnvEdit::Set(name.into(), value.into()))
    }

    /// Initializers collected so far.
    pub fn initializers(&self) -> &[Initializer] {
        &self.initializers
    }

    /// Run the validation pass and merge, without acquiring OS resources.
    pub fn plan(self) -> Result<LaunchPlan, LaunchError> {
        build_plan(self.initializers)
    }

    /// Validate, acquire resources and start the child.
    pub fn launch(self) -> Result<ChildHandle, LaunchError> {
        self.launch_tracked().0
    }

    /// Like [`launch`](Self::launch), also returning the state history.
    pub fn launch_tracked(self) -> (Result<ChildHandle, LaunchError>, LaunchTracker) {
        let mut tracker = LaunchTracker::new();
        debug!(target: "lp.launch", state = %tracker.state(), initializers = self.initializers.len());

        let plan = match build_plan(self.initializers) {
            Ok(plan) => plan,
            Err(err) => {
                fail(&mut tracker, &err);
                return (Err(err), tracker);
            }
        };
        advance(&mut tracker, LaunchState::Launching, None);

        let program = plan.program.clone();
        match plan.open().and_then(|req| self.launcher.launch(req)) {
            Ok(child) => {
                advance(
                    &mut tracker,
                    LaunchState::Succeeded,
                    Some(format!("pid {}", child.pid())),
                );
                info!(target: "lp.launch", pid = child.pid(), program = %program.display(), "launched");
                (Ok(child), tracker)
            }
            Err(err) => {
                fail(&mut tracker, &err);
                (Err(err), tracker)
            }
        }
    }
}

fn advance(tracker: &mut LaunchTracker, to: LaunchState, reason: Option<String>) {
    let from = tracker.state();
    match tracker.transition(to, reason) {
        Ok(()) => debug!(target: "lp.launch", %from, %to, "transition"),
        Err(e) => warn!(target: "lp.launch", error = %e, "unexpected transition"),
    }
}

fn fail(tracker: &mut LaunchTracker, err: &LaunchError) {
    warn!(target: "lp.launch", code = %err.code, error = %err, "launch failed");
    advance(tracker, LaunchState::LaunchFailed, Some(err.code.as_str().to_owned()));
}

// ---------------------------------------------------------------------------
// Validation pass
// ---------------------------------------------------------------------------

fn build_plan(initializers: Vec<Initializer>) -> Result<LaunchPlan, LaunchError> {
    check_conflicts(&initializers)?;

    let mut command = None;
    let mut working_dir = None;
    let mut source = None;
    let mut edits = Vec::new();
    let mut stdio: [Stdio; 3] = Default::default();

    for init in initializers {
        match init {
            Initializer::Command(cmd) => command = Some(cmd),
            Initializer::WorkingDir(dir) => working_dir = Some(dir),
            Initializer::Environment(src) => source = Some(src),
            Initializer::EnvEdit(edit) => edits.push(edit),
            Initializer::Redirect(stream, s) => stdio[stream.index()] = s,
        }
    }

    let command = command.ok_or_else(|| {
        LaunchError::new(ErrorCode::ValidationMissingCommand, "no command was given")
    })?;
    if let Some(index) = command.iter().position(|part| part.contains('\0')) {
        return Err(LaunchError::new(
            ErrorCode::ValidationInvalidArgument,
            "argument contains a NUL character",
        )
        .with_context("index", index));
    }

    if let Some(dir) = &working_dir {
        if !dir.is_dir() {
            return Err(LaunchError::new(
                ErrorCode::ValidationInvalidWorkingDir,
                "working directory does not exist or is not a directory",
            )
            .with_context("working_dir", dir.display().to_string()));
        }
    }

    let environment = merge_environment(source, &edits)?;
    if let Some(env) = &environment {
        env.validate()?;
    }

    let cwd = std::env::current_dir()
        .map_err(|e| LaunchError::from_io(ErrorCode::SystemIo, "cannot read current directory", e))?;
    let search_path = match &environment {
        Some(env) => env.get("PATH").map(std::ffi::OsString::from),
        None => std::env::var_os("PATH"),
    };
    let program = resolve_executable(command.program(), &cwd, search_path.as_deref())
        .ok_or_else(|| {
            LaunchError::new(
                ErrorCode::ValidationExecutableNotFound,
                "executable not found",
            )
            .with_context("program", command.program())
        })?;
    debug!(target: "lp.launch", program = %program.display(), "resolved executable");

    Ok(LaunchPlan {
        program,
        command,
        environment,
        working_dir,
        stdio,
    })
}

fn check_conflicts(initializers: &[Initializer]) -> Result<(), LaunchError> {
    let mut seen: BTreeMap<&'static str, usize> = BTreeMap::new();
    for init in initializers {
        if let CombinationCategory::Exclusive(name) = init.category() {
            *seen.entry(name).or_default() += 1;
        }
    }
    let conflicts: Vec<&str> = seen
        .into_iter()
        .filter(|&(_, n)| n > 1)
        .map(|(name, _)| name)
        .collect();
    if conflicts.is_empty() {
        return Ok(());
    }
    Err(LaunchError::new(
        ErrorCode::ValidationConflictingInitializers,
        "exclusive initializer given more than once",
    )
    .with_context("categories", conflicts))
}

fn merge_environment(
    source: Option<EnvSource>,
    edits: &[EnvEdit],
) -> Result<Option<EnvironmentMap>, LaunchError> {
    let source = match source {
        Some(src) => src,
        None if edits.is_empty() => return Ok(None),
        None => EnvSource::Derive,
    };
    let mut env = source.base_environment()?;
    for edit in edits {
        edit.apply(&mut env);
    }
    Ok(Some(env))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_existing(candidates: &[&str]) -> String {
        candidates
            .iter()
            .find(|c| std::path::Path::new(c).is_file())
            .map(|c| (*c).to_owned())
            .unwrap_or_else(|| candidates[0].to_owned())
    }

    fn shell() -> String {
        if cfg!(windows) {
            first_existing(&["C:\\Windows\\System32\\cmd.exe"])
        } else {
            first_existing(&["/bin/sh", "/usr/bin/sh"])
        }
    }

    #[test]
    fn missing_command() {
        let err = Executor::new().with(EnvSource::Clean).plan().unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationMissingCommand);
    }

    #[test]
    fn duplicate_environment_conflicts() {
        let err = Executor::new()
            .with(CommandLine::new(shell()))
            .with(EnvSource::Clean)
            .with(EnvSource::Derive)
            .plan()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationConflictingInitializers);
        assert_eq!(err.context["categories"], serde_json::json!(["environment"]));
    }

    #[test]
    fn duplicate_redirect_of_same_stream_conflicts() {
        let err = Executor::new()
            .with(CommandLine::new(shell()))
            .redirect(StdStream::Stdout, Stdio::Null)
            .redirect(StdStream::Stdout, Stdio::Piped)
            .plan()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationConflictingInitializers);
    }

    #[test]
    fn redirects_of_different_streams_combine() {
        let plan = Executor::new()
            .with(CommandLine::new(shell()))
            .redirect(StdStream::Stdout, Stdio::Null)
            .redirect(StdStream::Stderr, Stdio::Piped)
            .plan()
            .unwrap();
        assert_eq!(
            plan.stdio_kinds(),
            [StdioKind::Inherit, StdioKind::Null, StdioKind::Piped]
        );
    }

    #[test]
    fn unresolvable_program_is_validation_error() {
        let err = Executor::new()
            .with(CommandLine::new("definitely-not-a-real-program-lp"))
            .plan()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationExecutableNotFound);
        assert!(err.is_validation());
    }

    #[test]
    fn missing_working_dir() {
        let err = Executor::new()
            .with(CommandLine::new(shell()))
            .working_dir("/definitely/not/here")
            .plan()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationInvalidWorkingDir);
    }

    #[test]
    fn invalid_variable_is_rejected() {
        let err = Executor::new()
            .with(CommandLine::new(shell()))
            .with(EnvSource::Clean)
            .env("", "x")
            .plan()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationInvalidVariable);
    }

    #[test]
    fn nul_argument_is_rejected() {
        let err = Executor::new()
            .with(CommandLine::new(shell()).arg("a\0b"))
            .plan()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationInvalidArgument);
    }

    #[test]
    fn no_environment_initializers_inherit() {
        let plan = Executor::new().with(CommandLine::new(shell())).plan().unwrap();
        assert!(plan.environment.is_none());
    }

    #[test]
    fn edits_without_source_start_from_derive() {
        let plan = Executor::new()
            .with(CommandLine::new(shell()))
            .env("LP_EXECUTOR_EDIT", "1")
            .plan()
            .unwrap();
        let env = plan.environment.unwrap();
        assert_eq!(env.get("LP_EXECUTOR_EDIT"), Some("1"));
        assert!(env.contains("PATH"));
    }

    #[test]
    fn later_edit_wins() {
        let plan = Executor::new()
            .with(CommandLine::new(shell()))
            .with(EnvSource::Clean)
            .env("A", "1")
            .env("A", "2")
            .plan()
            .unwrap();
        assert_eq!(plan.environment.unwrap().get("A"), Some("2"));
    }

    #[test]
    fn clean_env_without_path_still_resolves_absolute_program() {
        let plan = Executor::new()
            .with(CommandLine::new(shell()))
            .with(EnvSource::Clean)
            .plan()
            .unwrap();
        assert!(plan.program.is_absolute());
        assert!(plan.environment.unwrap().is_empty());
    }

    #[test]
    fn relative_program_ignores_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("only-in-workdir");
        std::fs::write(&tool, b"").unwrap();
        let rel = format!(".{}only-in-workdir", std::path::MAIN_SEPARATOR);

        let err = Executor::new()
            .with(CommandLine::new(rel))
            .working_dir(dir.path())
            .plan()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationExecutableNotFound);

        let plan = Executor::new()
            .with(CommandLine::new(tool.to_string_lossy()))
            .working_dir(dir.path())
            .plan()
            .unwrap();
        assert_eq!(plan.program, tool);
    }

    #[test]
    fn tracker_records_validation_failure() {
        let (result, tracker) = Executor::new().launch_tracked();
        assert!(result.is_err());
        assert_eq!(tracker.state(), LaunchState::LaunchFailed);
        assert_eq!(tracker.history().len(), 1);
        assert_eq!(
            tracker.history()[0].reason.as_deref(),
            Some("VALIDATION_MISSING_COMMAND")
        );
    }
}
