// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy with stable error codes for launchplane.
//!
//! Every launch error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, the originating OS error number
//! when there is one, an optional cause chain, and arbitrary key-value
//! context. Use the builder returned by [`LaunchError::new`] to construct
//! errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed launch input, detected before any OS resource is touched.
    Validation,
    /// An OS call to enumerate or allocate a resource failed.
    SystemResource,
    /// The platform process-creation call itself failed.
    Launch,
    /// Waiting on, or signalling, a launched process failed.
    Wait,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::SystemResource => "system_resource",
            Self::Launch => "launch",
            Self::Wait => "wait",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Validation --
    /// No command initializer was supplied.
    ValidationMissingCommand,
    /// The program could not be resolved to an existing file.
    ValidationExecutableNotFound,
    /// An argument cannot be passed to the platform (e.g. interior NUL).
    ValidationInvalidArgument,
    /// An environment variable name or value is invalid.
    ValidationInvalidVariable,
    /// The working directory override does not exist or is not a directory.
    ValidationInvalidWorkingDir,
    /// An exclusive initializer category occurs more than once.
    ValidationConflictingInitializers,

    // -- System resources --
    /// The current process environment could not be enumerated.
    SystemEnvironmentUnavailable,
    /// A pipe or descriptor pair could not be allocated.
    SystemPipeFailed,
    /// Any other I/O failure while acquiring launch resources.
    SystemIo,

    // -- Launch --
    /// `fork` failed in the parent.
    LaunchForkFailed,
    /// `exec` failed in the child and was reported through the side channel.
    LaunchExecFailed,
    /// The child could not change to the requested working directory.
    LaunchChdirFailed,
    /// The child could not install a standard-stream redirection.
    LaunchRedirectFailed,
    /// The Windows process-creation call returned failure.
    LaunchCreateProcessFailed,

    // -- Wait --
    /// The termination-wait call failed.
    WaitFailed,
    /// The process could not be terminated.
    WaitKillFailed,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationMissingCommand
            | Self::ValidationExecutableNotFound
            | Self::ValidationInvalidArgument
            | Self::ValidationInvalidVariable
            | Self::ValidationInvalidWorkingDir
            | Self::ValidationConflictingInitializers => ErrorCategory::Validation,

            Self::SystemEnvironmentUnavailable | Self::SystemPipeFailed | Self::SystemIo => {
                ErrorCategory::SystemResource
            }

            Self::LaunchForkFailed
            | Self::LaunchExecFailed
            | Self::LaunchChdirFailed
            | Self::LaunchRedirectFailed
            | Self::LaunchCreateProcessFailed => ErrorCategory::Launch,

            Self::WaitFailed | Self::WaitKillFailed => ErrorCategory::Wait,

            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"LAUNCH_EXEC_FAILED"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationMissingCommand => "VALIDATION_MISSING_COMMAND",
            Self::ValidationExecutableNotFound => "VALIDATION_EXECUTABLE_NOT_FOUND",
            Self::ValidationInvalidArgument => "VALIDATION_INVALID_ARGUMENT",
            Self::ValidationInvalidVariable => "VALIDATION_INVALID_VARIABLE",
            Self::ValidationInvalidWorkingDir => "VALIDATION_INVALID_WORKING_DIR",
            Self::ValidationConflictingInitializers => "VALIDATION_CONFLICTING_INITIALIZERS",
            Self::SystemEnvironmentUnavailable => "SYSTEM_ENVIRONMENT_UNAVAILABLE",
            Self::SystemPipeFailed => "SYSTEM_PIPE_FAILED",
            Self::SystemIo => "SYSTEM_IO",
            Self::LaunchForkFailed => "LAUNCH_FORK_FAILED",
            Self::LaunchExecFailed => "LAUNCH_EXEC_FAILED",
            Self::LaunchChdirFailed => "LAUNCH_CHDIR_FAILED",
            Self::LaunchRedirectFailed => "LAUNCH_REDIRECT_FAILED",
            Self::LaunchCreateProcessFailed => "LAUNCH_CREATE_PROCESS_FAILED",
            Self::WaitFailed => "WAIT_FAILED",
            Self::WaitKillFailed => "WAIT_KILL_FAILED",
            Self::Internal => "INTERNAL",
        }
    }

    /// Whether a caller may reasonably retry the operation.
    ///
    /// Only transient resource shortages qualify. The engine itself never
    /// retries; this is advice for callers.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::SystemResource
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// LaunchError
// ---------------------------------------------------------------------------

/// Unified launch error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, the raw OS
/// error number when the failure originated in a system call, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use lp_error::{ErrorCode, LaunchError};
///
/// let err = LaunchError::new(ErrorCode::ValidationExecutableNotFound, "no such program")
///     .with_context("program", "frobnicate");
/// assert!(err.is_validation());
/// ```
pub struct LaunchError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Raw OS error number (`errno` / `GetLastError`), if any.
    pub os_code: Option<i32>,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl LaunchError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            os_code: None,
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Build an error from an [`io::Error`], recording its OS error number.
    pub fn from_io(code: ErrorCode, message: impl Into<String>, err: io::Error) -> Self {
        Self::new(code, message).with_os_error(err)
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Record a raw OS error number.
    pub fn with_os_code(mut self, code: i32) -> Self {
        self.os_code = Some(code);
        self
    }

    /// Attach an [`io::Error`] as the source, keeping its OS error number.
    pub fn with_os_error(mut self, err: io::Error) -> Self {
        if let Some(code) = err.raw_os_error() {
            self.os_code = Some(code);
        }
        self.source = Some(Box::new(err));
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// `true` for errors raised before any OS resource was acquired.
    pub fn is_validation(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    /// `true` when the platform process-creation call failed.
    pub fn is_launch(&self) -> bool {
        self.category() == ErrorCategory::Launch
    }
}

impl fmt::Debug for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("LaunchError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(code) = self.os_code {
            d.field("os_code", &code);
        }
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if let Some(code) = self.os_code {
            write!(f, " (os error {code})")?;
        }
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for LaunchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Convenience alias used across the workspace.
pub type Result<T, E = LaunchError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`LaunchError`] (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct LaunchErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Broad category of the code.
    pub category: ErrorCategory,
    /// Human-readable message.
    pub message: String,
    /// Raw OS error number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_code: Option<i32>,
    /// Structured context.
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&LaunchError> for LaunchErrorDto {
    fn from(err: &LaunchError) -> Self {
        Self {
            code: err.code,
            category: err.category(),
            message: err.message.clone(),
            os_code: err.os_code,
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<LaunchErrorDto> for LaunchError {
    fn from(dto: LaunchErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            os_code: dto.os_code,
            source: None,
            context: dto.context,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
