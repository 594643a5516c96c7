// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outcomes, failure descriptions and test results.

use crate::{capture::CapturedOutput, raised::Raised, runner::ExecutionUnit};
use camino::Utf8PathBuf;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use tracing::warn;

/// The definitive outcome of one test invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// The test passed.
    Passed,

    /// The test failed.
    Failed,

    /// The test could not decide whether it passed.
    Inconclusive,

    /// The test did not finish within its timeout.
    Timeout,

    /// The engine could not invoke the test.
    Error,
}

impl Outcome {
    /// Returns true if this outcome is [`Outcome::Passed`].
    pub fn is_success(self) -> bool {
        self == Self::Passed
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Inconclusive => "inconclusive",
            Self::Timeout => "timeout",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// The kind of failure an invocation ended with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The constructor raised.
    InstanceCreation,

    /// Injecting the execution context raised.
    ContextSet,

    /// A setup method raised something other than an assertion signal.
    Initialize,

    /// An assertion failed.
    AssertionFailure,

    /// An assertion was inconclusive.
    AssertionInconclusive,

    /// The test method raised an error that wasn't expected.
    UnhandledException,

    /// An expected-exception contract was declared, but nothing was raised.
    MissingExpectedException,

    /// The test timed out.
    Timeout,

    /// A teardown step raised.
    Cleanup,

    /// The engine failed to invoke user code.
    InvocationError,
}

impl FailureKind {
    /// The outcome a failure of this kind results in.
    pub fn outcome(self) -> Outcome {
        match self {
            Self::AssertionInconclusive => Outcome::Inconclusive,
            Self::Timeout => Outcome::Timeout,
            Self::InvocationError => Outcome::Error,
            Self::InstanceCreation
            | Self::ContextSet
            | Self::Initialize
            | Self::AssertionFailure
            | Self::UnhandledException
            | Self::MissingExpectedException
            | Self::Cleanup => Outcome::Failed,
        }
    }
}

/// A structured description of why a test didn't pass.
#[derive(Clone, Debug)]
pub struct FailureDescriptor {
    /// The kind of failure.
    pub kind: FailureKind,

    /// The human-readable message.
    pub message: String,

    /// The stack trace pointing at user code, if available.
    pub stack_trace: Option<String>,

    /// The raised value this failure was classified from, if any.
    pub cause: Option<Raised>,

    /// The test's own failure, if a teardown failure replaced it.
    pub superseded: Option<Box<FailureDescriptor>>,
}

impl FailureDescriptor {
    /// Creates a new failure descriptor with no stack trace or cause.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack_trace: None,
            cause: None,
            superseded: None,
        }
    }

    pub(crate) fn with_stack_trace(mut self, stack_trace: Option<&str>) -> Self {
        self.stack_trace = stack_trace.map(str::to_owned);
        self
    }

    pub(crate) fn with_cause(mut self, cause: Raised) -> Self {
        self.cause = Some(cause);
        self
    }

    /// The outcome this failure results in.
    pub fn outcome(&self) -> Outcome {
        self.kind.outcome()
    }
}

impl fmt::Display for FailureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The status of an invocation as seen by the lifecycle runner and the timeout supervisor, before
/// timing and log capture are attached.
#[derive(Clone, Debug)]
pub(crate) struct ExecuteStatus {
    pub(crate) failure: Option<FailureDescriptor>,
}

impl ExecuteStatus {
    pub(crate) fn passed() -> Self {
        Self { failure: None }
    }

    pub(crate) fn failed(failure: FailureDescriptor) -> Self {
        Self {
            failure: Some(failure),
        }
    }

    pub(crate) fn outcome(&self) -> Outcome {
        self.failure
            .as_ref()
            .map_or(Outcome::Passed, FailureDescriptor::outcome)
    }

    /// Applies a teardown failure.
    ///
    /// A teardown failure replaces a pass or a failure, but an inconclusive outcome is kept.
    pub(crate) fn with_cleanup_failure(self, cleanup: FailureDescriptor) -> Self {
        match self.failure {
            None => Self::failed(cleanup),
            Some(failure) if failure.outcome() == Outcome::Inconclusive => {
                warn!(
                    cleanup = %cleanup.message,
                    "teardown failed after an inconclusive result; keeping inconclusive",
                );
                Self {
                    failure: Some(failure),
                }
            }
            Some(failure) => Self::failed(FailureDescriptor {
                superseded: Some(Box::new(failure)),
                ..cleanup
            }),
        }
    }
}

/// The result of one test invocation.
#[derive(Debug)]
pub struct TestResult {
    /// Why the test didn't pass, or `None` if it did.
    pub failure: Option<FailureDescriptor>,

    /// When the invocation started.
    pub start_time: DateTime<Local>,

    /// How long the invocation took, including setup and teardown.
    pub duration: Duration,

    /// Output captured while the invocation ran.
    pub output: CapturedOutput,

    /// Files produced by the test, collected from the execution context.
    pub result_files: Vec<Utf8PathBuf>,

    /// For a timed-out invocation, the worker that may still be running.
    pub abandoned: Option<ExecutionUnit>,
}

impl TestResult {
    /// The outcome of the invocation.
    pub fn outcome(&self) -> Outcome {
        self.failure
            .as_ref()
            .map_or(Outcome::Passed, FailureDescriptor::outcome)
    }

    /// The failure message, if the test didn't pass.
    pub fn message(&self) -> Option<&str> {
        self.failure.as_ref().map(|failure| failure.message.as_str())
    }

    /// Captured standard output.
    pub fn stdout(&self) -> &str {
        &self.output.stdout
    }

    /// Captured standard error.
    pub fn stderr(&self) -> &str {
        &self.output.stderr
    }

    /// Captured debug trace.
    pub fn debug_trace(&self) -> &str {
        &self.output.debug_trace
    }

    /// When the invocation ended.
    pub fn end_time(&self) -> DateTime<Local> {
        self.start_time + self.duration
    }

    /// The worker abandoned after a timeout, if any.
    ///
    /// A timed-out test can't be stopped safely: its thread may keep running, and keep mutating
    /// shared state, after this result is returned. Check
    /// [`ExecutionUnit::is_alive`] before assuming process-wide state is clean.
    pub fn abandoned_unit(&self) -> Option<&ExecutionUnit> {
        self.abandoned.as_ref()
    }
}
