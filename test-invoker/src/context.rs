// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-invocation execution context.

use crate::{descriptor::TestName, outcome::Outcome};
use camino::Utf8PathBuf;
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// A handle exposing outcome reporting and result-artifact collection for one invocation.
///
/// A context is created for exactly one invocation and must not be shared across invocations. It
/// is injected into the instance under test if the class declares a context slot, which is why its
/// methods take `&self`.
pub trait ExecutionContext: fmt::Debug + Send + Sync {
    /// Records the outcome of the test. Called before teardown runs, so that teardown code can
    /// observe it.
    fn set_outcome(&self, outcome: Outcome);

    /// Collects the result files added during the invocation.
    fn collect_result_files(&self) -> Vec<Utf8PathBuf>;
}

/// The default [`ExecutionContext`].
#[derive(Debug)]
pub struct TestContext {
    test_name: TestName,
    state: Mutex<TestContextState>,
}

#[derive(Debug, Default)]
struct TestContextState {
    outcome: Option<Outcome>,
    result_files: Vec<Utf8PathBuf>,
    properties: BTreeMap<String, String>,
}

impl TestContext {
    /// Creates a new context for the given test.
    pub fn new(test_name: TestName) -> Self {
        Self {
            test_name,
            state: Mutex::new(TestContextState::default()),
        }
    }

    /// The test this context belongs to.
    pub fn test_name(&self) -> &TestName {
        &self.test_name
    }

    /// The outcome recorded so far, if any.
    pub fn outcome(&self) -> Option<Outcome> {
        self.state().outcome
    }

    /// Adds a file produced by the test to the result.
    pub fn add_result_file(&self, path: impl Into<Utf8PathBuf>) {
        self.state().result_files.push(path.into());
    }

    /// Sets a named property.
    pub fn set_property(&self, name: impl Into<String>, value: impl Into<String>) {
        self.state().properties.insert(name.into(), value.into());
    }

    /// Looks up a named property.
    pub fn property(&self, name: &str) -> Option<String> {
        self.state().properties.get(name).cloned()
    }

    // A test that panicked while holding the lock must not take the context down with it.
    fn state(&self) -> MutexGuard<'_, TestContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ExecutionContext for TestContext {
    fn set_outcome(&self, outcome: Outcome) {
        self.state().outcome = Some(outcome);
    }

    fn collect_result_files(&self) -> Vec<Utf8PathBuf> {
        std::mem::take(&mut self.state().result_files)
    }
}
