// SPDX-License-Identifier: MIT OR Apache-2.0
//! Standard-stream redirection.

use crate::sys;
use lp_error::{ErrorCode, LaunchError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};

/// One of the three standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdStream {
    /// Descriptor 0 / `STD_INPUT_HANDLE`.
    Stdin,
    /// Descriptor 1 / `STD_OUTPUT_HANDLE`.
    Stdout,
    /// Descriptor 2 / `STD_ERROR_HANDLE`.
    Stderr,
}

impl StdStream {
    /// All streams in descriptor order.
    pub const ALL: [StdStream; 3] = [Self::Stdin, Self::Stdout, Self::Stderr];

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdin => "stdin",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }

    /// Index into `[stdin, stdout, stderr]`, equal to the POSIX descriptor.
    pub fn index(&self) -> usize {
        match self {
            Self::Stdin => 0,
            Self::Stdout => 1,
            Self::Stderr => 2,
        }
    }

    /// Whether the child reads from this stream.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Stdin)
    }
}

impl fmt::Display for StdStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a child's standard stream is connected to.
#[derive(Debug, Default)]
pub enum Stdio {
    /// Share the parent's stream.
    #[default]
    Inherit,
    /// Connect to the null device.
    Null,
    /// Create a pipe; the parent keeps the other end.
    Piped,
    /// Use an already open file. Ownership moves into the launch.
    File(File),
}

impl Stdio {
    /// The variant without its payload.
    pub fn kind(&self) -> StdioKind {
        match self {
            Self::Inherit => StdioKind::Inherit,
            Self::Null => StdioKind::Null,
            Self::Piped => StdioKind::Piped,
            Self::File(_) => StdioKind::File,
        }
    }
}

impl From<File> for Stdio {
    fn from(file: File) -> Self {
        Self::File(file)
    }
}

/// Payload-free mirror of [`Stdio`], comparable and serializable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdioKind {
    /// See [`Stdio::Inherit`].
    Inherit,
    /// See [`Stdio::Null`].
    Null,
    /// See [`Stdio::Piped`].
    Piped,
    /// See [`Stdio::File`].
    File,
}

/// An opened redirection: what the child receives and what the parent keeps.
///
/// Both ends are close-on-exec / non-inheritable. The launcher installs the
/// child end as the stream itself, and drops it in the parent once the
/// platform call returns.
#[derive(Debug)]
pub struct Endpoint {
    /// Source for the child's stream; `None` inherits the parent's.
    pub child: Option<File>,
    /// Parent side of a pipe.
    pub parent: Option<File>,
}

impl Endpoint {
    /// Share the parent's stream.
    pub fn inherit() -> Self {
        Self {
            child: None,
            parent: None,
        }
    }
}

/// Turns a redirection request into an [`Endpoint`].
pub trait Redirector {
    /// Acquire the OS resources for `stream`.
    fn open(self, stream: StdStream) -> Result<Endpoint, LaunchError>;
}

impl Redirector for Stdio {
    fn open(self, stream: StdStream) -> Result<Endpoint, LaunchError> {
        match self {
            Self::Inherit => Ok(Endpoint::inherit()),
            Self::Null => {
                let file = OpenOptions::new()
                    .read(stream.is_input())
                    .write(!stream.is_input())
                    .open(sys::NULL_DEVICE)
                    .map_err(|e| {
                        LaunchError::from_io(ErrorCode::SystemIo, "cannot open null device", e)
                            .with_context("stream", stream.as_str())
                    })?;
                Ok(Endpoint {
                    child: Some(file),
                    parent: None,
                })
            }
            Self::Piped => {
                let (read, write) = pipe()?;
                let (child, parent) = if stream.is_input() {
                    (read, write)
                } else {
                    (write, read)
                };
                Ok(Endpoint {
                    child: Some(child),
                    parent: Some(parent),
                })
            }
            Self::File(file) => Ok(Endpoint {
                child: Some(file),
                parent: None,
            }),
        }
    }
}

/// Anonymous pipe as `(read, write)`, both ends close-on-exec.
pub fn pipe() -> Result<(File, File), LaunchError> {
    sys::pipe().map_err(|e| LaunchError::from_io(ErrorCode::SystemPipeFailed, "cannot create pipe", e))
}
