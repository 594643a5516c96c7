// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the invocation engine.
//!
//! Failures in user code are never reported through these types: they're classified into an
//! [`Outcome`](crate::outcome::Outcome) instead. These errors cover configuration and the engine's
//! own machinery.

use camino::{Utf8Path, Utf8PathBuf};
use config::ConfigError;
use std::io;
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse test-invoker config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error which indicates that a profile was requested but isn't known.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }

    /// The profile that was requested.
    pub fn profile(&self) -> &str {
        &self.profile
    }
}

/// An error in the engine's own machinery while invoking a test.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InvokeError {
    /// The runtime used to supervise a timeout couldn't be created.
    #[error("error creating timeout supervision runtime")]
    RuntimeCreate(#[source] io::Error),

    /// The worker running a supervised test was cancelled.
    #[error("error joining supervised worker")]
    WorkerJoin(#[source] tokio::task::JoinError),

    /// The worker running a supervised test finished without reporting a result.
    #[error("worker for test `{test}` finished without reporting a result")]
    MissingWorkerResult {
        /// The test that was being run.
        test: String,
    },
}
