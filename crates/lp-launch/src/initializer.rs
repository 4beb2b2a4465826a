// SPDX-License-Identifier: MIT OR Apache-2.0
//! The settings a launch is composed from.

use crate::stdio::{StdStream, Stdio};
use lp_cmdline::CommandLine;
use lp_env::EnvironmentMap;
use lp_error::LaunchError;
use std::path::PathBuf;

/// How an initializer may be combined with others of its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CombinationCategory {
    /// At most one initializer of the named category per launch.
    Exclusive(&'static str),
    /// Any number, applied in order.
    Unconstrained,
}

/// Starting point of the child's environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvSource {
    /// Snapshot of the parent's environment at launch time.
    Derive,
    /// No variables at all.
    Clean,
    /// An explicit map.
    Map(EnvironmentMap),
}

/// Supplies the base environment a launch starts from.
pub trait EnvironmentSource {
    /// Produce the base map. Called once per launch, during validation.
    fn base_environment(&self) -> Result<EnvironmentMap, LaunchError>;
}

impl EnvironmentSource for EnvSource {
    fn base_environment(&self) -> Result<EnvironmentMap, LaunchError> {
        match self {
            Self::Derive => EnvironmentMap::derive(),
            Self::Clean => Ok(EnvironmentMap::clean()),
            Self::Map(map) => Ok(map.clone()),
        }
    }
}

/// A single change applied on top of the base environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvEdit {
    /// `EnvironmentMap::set`.
    Set(String, String),
    /// `EnvironmentMap::append`.
    Append(String, String),
    /// `EnvironmentMap::append_path`.
    AppendPath(String, String),
    /// `EnvironmentMap::prepend`.
    Prepend(String, String),
    /// `EnvironmentMap::prepend_path`.
    PrependPath(String, String),
    /// `EnvironmentMap::remove`.
    Remove(String),
}

impl EnvEdit {
    /// Apply the edit to `map`.
    pub fn apply(&self, map: &mut EnvironmentMap) {
        match self {
            Self::Set(k, v) => {
                map.set(k.as_str(), v.as_str());
            }
            Self::Append(k, v) => {
                map.append(k.as_str(), v.as_str());
            }
            Self::AppendPath(k, v) => {
                map.append_path(k.as_str(), v.as_str());
            }
            Self::Prepend(k, v) => {
                map.prepend(k.as_str(), v.as_str());
            }
            Self::PrependPath(k, v) => {
                map.prepend_path(k.as_str(), v.as_str());
            }
            Self::Remove(k) => {
                map.remove(k);
            }
        }
    }
}

/// One piece of launch configuration.
#[derive(Debug)]
pub enum Initializer {
    /// Program and arguments.
    Command(CommandLine),
    /// Directory the child starts in.
    WorkingDir(PathBuf),
    /// Base environment.
    Environment(EnvSource),
    /// Environment change on top of the base.
    EnvEdit(EnvEdit),
    /// Standard-stream redirection.
    Redirect(StdStream, Stdio),
}

impl Initializer {
    /// Combination rule for this initializer.
    pub fn category(&self) -> CombinationCategory {
        match self {
            Self::Command(_) => CombinationCategory::Exclusive("command"),
            Self::WorkingDir(_) => CombinationCategory::Exclusive("working_dir"),
            Self::Environment(_) => CombinationCategory::Exclusive("environment"),
            Self::EnvEdit(_) => CombinationCategory::Unconstrained,
            Self::Redirect(stream, _) => CombinationCategory::Exclusive(stream.as_str()),
        }
    }
}

impl From<CommandLine> for Initializer {
    fn from(cmd: CommandLine) -> Self {
        Self::Command(cmd)
    }
}

impl From<EnvSource> for Initializer {
    fn from(src: EnvSource) -> Self {
        Self::Environment(src)
    }
}

impl From<EnvironmentMap> for Initializer {
    fn from(map: EnvironmentMap) -> Self {
        Self::Environment(EnvSource::Map(map))
    }
}

impl From<EnvEdit> for Initializer {
    fn from(edit: EnvEdit) -> Self {
        Self::EnvEdit(edit)
    }
}
