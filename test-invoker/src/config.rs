// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the invocation engine.
//!
//! Configuration is organized into profiles. The default profile is always present and defines
//! every setting; custom profiles override some settings and fall back to the default profile for
//! the rest.

use crate::errors::{ConfigParseError, ConfigParseErrorKind, ProfileNotFound};
use camino::Utf8Path;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use smol_str::SmolStr;
use std::{collections::HashMap, time::Duration};
use tracing::level_filters::LevelFilter;

/// Overall configuration for the invocation engine.
#[derive(Clone, Debug)]
pub struct InvokerConfig {
    default_profile: DefaultProfileImpl,
    other_profiles: HashMap<String, CustomProfileImpl>,
}

impl InvokerConfig {
    /// The default location of the config within the root: `.config/test-invoker.toml`.
    pub const CONFIG_PATH: &'static str = ".config/test-invoker.toml";

    /// Contains the default config as a TOML file.
    ///
    /// User configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the config from the given file, or if not specified from `.config/test-invoker.toml`
    /// under `root`.
    ///
    /// A missing file at the default location is not an error. A missing explicitly-specified
    /// file is.
    pub fn from_sources(
        root: impl AsRef<Utf8Path>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.as_ref().join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let deserialized = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(config_file, kind))?;
        Ok(deserialized.into_config_impl())
    }

    /// Returns the default config.
    pub fn default_config() -> Self {
        let deserialized = Self::build_and_deserialize_config(&Self::make_default_config())
            .expect("default config is always valid");
        deserialized.into_config_impl()
    }

    /// Returns the profile with the given name.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<InvokerProfile<'_>, ProfileNotFound> {
        let name = name.as_ref();
        let custom_profile = match name {
            Self::DEFAULT_PROFILE => None,
            other => Some(
                self.other_profiles
                    .get(other)
                    .ok_or_else(|| ProfileNotFound::new(name, self.all_profiles()))?,
            ),
        };
        Ok(InvokerProfile {
            name: name.to_owned(),
            default_profile: &self.default_profile,
            custom_profile,
        })
    }

    fn all_profiles(&self) -> impl Iterator<Item = &str> {
        self.other_profiles
            .keys()
            .map(|key| key.as_str())
            .chain(std::iter::once(Self::DEFAULT_PROFILE))
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<InvokerConfigDeserialize, ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        serde_path_to_error::deserialize(config).map_err(|error| {
            // The config crate reports the key as well; drop it in favor of the path.
            let path = error.path().clone();
            let error = match error.into_inner() {
                ConfigError::At { error, .. } => *error,
                other => other,
            };
            ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                path, error,
            )))
        })
    }
}

/// A configuration profile, obtained through [`InvokerConfig::profile`].
#[derive(Clone, Debug)]
pub struct InvokerProfile<'cfg> {
    name: String,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
}

impl InvokerProfile<'_> {
    /// The name of the profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The timeout applied to test methods that don't declare their own.
    ///
    /// A zero duration is treated as unset.
    pub fn test_timeout(&self) -> Option<Duration> {
        self.custom_profile
            .and_then(|profile| profile.test_timeout)
            .or(self.default_profile.test_timeout)
            .filter(|timeout| !timeout.is_zero())
    }

    /// The name of the worker thread that runs a test under a deadline.
    pub fn worker_thread_name(&self) -> &str {
        self.custom_profile
            .and_then(|profile| profile.worker_thread_name.as_deref())
            .unwrap_or(&self.default_profile.worker_thread_name)
    }

    /// Whether `tracing` events emitted by test code are captured into the debug trace.
    pub fn capture_debug_trace(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.capture_debug_trace)
            .unwrap_or(self.default_profile.capture_debug_trace)
    }

    /// The most verbose level captured into the debug trace.
    pub fn debug_trace_level(&self) -> TraceLevel {
        self.custom_profile
            .and_then(|profile| profile.debug_trace_level)
            .unwrap_or(self.default_profile.debug_trace_level)
    }
}

/// A `tracing` level, as written in configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceLevel {
    /// Errors only.
    Error,
    /// Warnings and above.
    Warn,
    /// Informational messages and above.
    Info,
    /// Debug messages and above.
    Debug,
    /// Everything.
    Trace,
}

impl TraceLevel {
    /// Converts this level to a [`LevelFilter`].
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct InvokerConfigDeserialize {
    #[serde(rename = "profile")]
    profiles: HashMap<String, CustomProfileImpl>,
}

impl InvokerConfigDeserialize {
    fn into_config_impl(mut self) -> InvokerConfig {
        let p = self
            .profiles
            .remove(InvokerConfig::DEFAULT_PROFILE)
            .expect("default profile should exist");
        let default_profile = DefaultProfileImpl::new(p);

        InvokerConfig {
            default_profile,
            other_profiles: self.profiles,
        }
    }
}

#[derive(Clone, Debug)]
struct DefaultProfileImpl {
    test_timeout: Option<Duration>,
    worker_thread_name: SmolStr,
    capture_debug_trace: bool,
    debug_trace_level: TraceLevel,
}

impl DefaultProfileImpl {
    fn new(p: CustomProfileImpl) -> Self {
        Self {
            test_timeout: p.test_timeout,
            worker_thread_name: p
                .worker_thread_name
                .expect("worker-thread-name present in default profile"),
            capture_debug_trace: p
                .capture_debug_trace
                .expect("capture-debug-trace present in default profile"),
            debug_trace_level: p
                .debug_trace_level
                .expect("debug-trace-level present in default profile"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default, with = "humantime_serde")]
    test_timeout: Option<Duration>,
    #[serde(default)]
    worker_thread_name: Option<SmolStr>,
    #[serde(default)]
    capture_debug_trace: Option<bool>,
    #[serde(default)]
    debug_trace_level: Option<TraceLevel>,
}
