// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expected-exception contracts.

use crate::{descriptor::TestName, raised::Raised};
use smol_str::SmolStr;
use std::fmt;

/// A user-declared contract deciding whether an error raised by a test method is the test's
/// intended outcome.
///
/// The engine treats implementations as black boxes: `verify` may return an error or panic, and
/// either is classified like any other raised value.
pub trait ExpectedExceptionContract: fmt::Debug + Send + Sync {
    /// Returns `Ok(())` if `raised` is the expected error.
    ///
    /// `raised` has already been unwrapped from the dispatch wrapper.
    fn verify(&self, raised: &Raised, test: &TestName) -> Result<(), Raised>;

    /// A short description of the contract, used in failure messages.
    fn description(&self) -> String;

    /// The message to report when the test method returns without raising anything.
    ///
    /// If `None`, a default message is used.
    fn no_exception_message(&self) -> Option<String> {
        None
    }
}

/// Expects an error of a particular type.
///
/// Assertion failures and inconclusive signals are never accepted: they are raised again unchanged
/// so they're reported as themselves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpectedException {
    type_name: SmolStr,
    message_contains: Option<String>,
    no_exception_message: Option<String>,
}

impl ExpectedException {
    /// Expects an error whose type name is exactly `type_name`.
    pub fn new(type_name: impl Into<SmolStr>) -> Self {
        Self {
            type_name: type_name.into(),
            message_contains: None,
            no_exception_message: None,
        }
    }

    /// Expects an error created from a Rust error of type `E` (see
    /// [`Raised::from_error`](crate::raised::Raised::from_error)).
    pub fn of<E: 'static>() -> Self {
        Self::new(std::any::type_name::<E>())
    }

    /// Additionally requires the error message to contain `fragment`.
    pub fn with_message_containing(mut self, fragment: impl Into<String>) -> Self {
        self.message_contains = Some(fragment.into());
        self
    }

    /// Overrides the message reported when no error is raised at all.
    pub fn with_no_exception_message(mut self, message: impl Into<String>) -> Self {
        self.no_exception_message = Some(message.into());
        self
    }
}

impl ExpectedExceptionContract for ExpectedException {
    fn verify(&self, raised: &Raised, test: &TestName) -> Result<(), Raised> {
        if raised.is_assertion() {
            return Err(raised.clone());
        }

        let actual = raised.type_name();
        if actual != self.type_name {
            return Err(Raised::assert_failed(format!(
                "Test method {test} threw exception {actual}, but exception {} was expected. \
                 Exception message: {}",
                self.type_name,
                raised.message(),
            )));
        }

        if let Some(fragment) = &self.message_contains {
            let message = raised.message();
            if !message.contains(fragment.as_str()) {
                return Err(Raised::assert_failed(format!(
                    "Test method {test} threw expected exception {actual}, but its message \
                     {message:?} does not contain {fragment:?}",
                )));
            }
        }

        Ok(())
    }

    fn description(&self) -> String {
        format!("ExpectedException({})", self.type_name)
    }

    fn no_exception_message(&self) -> Option<String> {
        self.no_exception_message.clone()
    }
}
