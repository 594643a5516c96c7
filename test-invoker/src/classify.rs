// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of raised values into failures.
//!
//! [`classify`] handles errors raised by the test method itself. The other functions in this module
//! format failures raised at the other stages of the lifecycle.

use crate::{
    descriptor::{LifecycleMethod, TestName},
    expected::ExpectedExceptionContract,
    outcome::{FailureDescriptor, FailureKind},
    raised::{Raised, WRONG_THREAD_ERROR_CODE, dispatch},
};
use std::{fmt, time::Duration};
use tracing::debug;

/// The result of classifying an error raised by a test method.
#[derive(Clone, Debug)]
pub enum Classification {
    /// The error was accepted by the method's expected-exception contract.
    Expected,

    /// The error is a failure.
    Failure(FailureDescriptor),
}

/// Classifies an error raised by the test method `test`.
///
/// `raised` is the value as returned by dispatching into the test method, so one level of dispatch
/// wrapper is removed first. If `expected` is set, the contract is consulted before general
/// classification.
pub fn classify(
    raised: Raised,
    expected: Option<&dyn ExpectedExceptionContract>,
    test: &TestName,
) -> Classification {
    let Some(real) = raised.into_real() else {
        return Classification::Failure(invocation_failure(
            test,
            "the error raised by the test method could not be recovered",
        ));
    };

    if let Some(contract) = expected {
        match dispatch(|| contract.verify(&real, test)) {
            Ok(()) => {
                debug!(%test, "raised error was expected");
                return Classification::Expected;
            }
            Err(raised) => {
                // The outer layer comes from calling the contract. Whatever the contract raised
                // may itself be a wrapper around the real signal.
                let target = raised.unwrap_or_self().unwrap_or_self();
                let kind = if target.is_inconclusive() {
                    FailureKind::AssertionInconclusive
                } else {
                    FailureKind::AssertionFailure
                };
                return Classification::Failure(
                    FailureDescriptor::new(kind, target.message())
                        .with_stack_trace(target.stack_trace())
                        .with_cause(target),
                );
            }
        }
    }

    Classification::Failure(general_failure(real, test))
}

fn general_failure(real: Raised, test: &TestName) -> FailureDescriptor {
    match &real {
        Raised::AssertFailed(signal) | Raised::AssertInconclusive(signal) => {
            let kind = if real.is_inconclusive() {
                FailureKind::AssertionInconclusive
            } else {
                FailureKind::AssertionFailure
            };
            FailureDescriptor::new(kind, signal.message())
                .with_stack_trace(signal.stack_trace())
                .with_cause(real)
        }
        Raised::ThreadTerminated(_) | Raised::Invocation(_) | Raised::Exception(_) => {
            let mut message = format!(
                "Test method {test} threw exception:\n{}: {}",
                real.type_name(),
                real.message()
            );
            if real.error_code() == Some(WRONG_THREAD_ERROR_CODE) {
                message.push_str(
                    "\n\nThe test used an object from a thread other than the one that owns it. \
                     If the test touches UI objects, mark it to run on the UI thread instead.",
                );
            }

            // Thread termination traces point at the machinery that stopped the thread.
            let stack_trace = match &real {
                Raised::ThreadTerminated(_) => None,
                _ => real.stack_trace(),
            };
            FailureDescriptor::new(FailureKind::UnhandledException, message)
                .with_stack_trace(stack_trace)
                .with_cause(real)
        }
    }
}

/// Formats a constructor failure.
pub fn instance_creation_failure(class: &str, raised: Raised) -> FailureDescriptor {
    let real = match stage_cause(raised, format_args!("the constructor of class {class}")) {
        Ok(real) => real,
        Err(failure) => return failure,
    };
    let message = format!(
        "Unable to create instance of class {class}. Error: {}: {}.",
        real.type_name(),
        real.message(),
    );
    FailureDescriptor::new(FailureKind::InstanceCreation, message)
        .with_stack_trace(real.stack_trace())
        .with_cause(real)
}

/// Formats a context injection failure.
pub fn context_set_failure(class: &str, raised: Raised) -> FailureDescriptor {
    let real = match stage_cause(raised, format_args!("the context slot of class {class}")) {
        Ok(real) => real,
        Err(failure) => return failure,
    };
    let message = format!(
        "Unable to set execution context property for the class {class}. Error: {}: {}.",
        real.type_name(),
        real.message(),
    );
    FailureDescriptor::new(FailureKind::ContextSet, message)
        .with_stack_trace(real.stack_trace())
        .with_cause(real)
}

/// Formats a failure raised by a setup method.
///
/// Assertion signals keep their own message.
pub fn initialize_failure<T>(method: &LifecycleMethod<T>, raised: Raised) -> FailureDescriptor {
    let real = match stage_cause(
        raised,
        format_args!(
            "initialization method {}.{}",
            method.declaring_class(),
            method.name()
        ),
    ) {
        Ok(real) => real,
        Err(failure) => return failure,
    };
    let (kind, message) = match &real {
        Raised::AssertInconclusive(signal) => {
            (FailureKind::AssertionInconclusive, signal.message().to_owned())
        }
        Raised::AssertFailed(signal) => {
            (FailureKind::AssertionFailure, signal.message().to_owned())
        }
        _ => (
            FailureKind::Initialize,
            format!(
                "Initialization method {}.{} threw exception. {}: {}.",
                method.declaring_class(),
                method.name(),
                real.type_name(),
                real.message(),
            ),
        ),
    };
    FailureDescriptor::new(kind, message)
        .with_stack_trace(real.stack_trace())
        .with_cause(real)
}

/// Formats a failure raised by a teardown step.
///
/// Any teardown failure forces a Failed outcome, so a dispatch wrapper with no cause is reported
/// under the cleanup kind as well.
pub fn cleanup_failure(class: &str, method: &str, raised: Raised) -> FailureDescriptor {
    let real = raised.unwrap_or_self();
    let message = format!(
        "Cleanup method {class}.{method} threw exception. {}: {}.",
        real.type_name(),
        real.message(),
    );
    FailureDescriptor::new(FailureKind::Cleanup, message)
        .with_stack_trace(real.stack_trace())
        .with_cause(real)
}

/// Formats a timeout.
pub fn timeout_failure(test: &TestName, timeout: Duration) -> FailureDescriptor {
    FailureDescriptor::new(
        FailureKind::Timeout,
        format!(
            "Test '{test}' exceeded execution timeout period of {}.",
            humantime::format_duration(timeout),
        ),
    )
}

/// Formats a test method that returned normally despite declaring an expected exception.
pub fn missing_expected_exception(
    test: &TestName,
    contract: &dyn ExpectedExceptionContract,
) -> FailureDescriptor {
    let message = dispatch(|| {
        Ok(contract.no_exception_message().unwrap_or_else(|| {
            format!(
                "Test method {test} did not throw an exception. An exception was expected by {}.",
                contract.description(),
            )
        }))
    });
    match message {
        Ok(message) => FailureDescriptor::new(FailureKind::MissingExpectedException, message),
        // The contract itself failed, as when verify raises.
        Err(raised) => {
            let target = raised.unwrap_or_self();
            FailureDescriptor::new(FailureKind::AssertionFailure, target.message())
                .with_stack_trace(target.stack_trace())
                .with_cause(target)
        }
    }
}

/// Removes the dispatch wrapper from a value raised at a lifecycle stage.
///
/// A wrapper with nothing inside can't be attributed to user code, so it becomes a failure to
/// invoke `callee`.
fn stage_cause(raised: Raised, callee: impl fmt::Display) -> Result<Raised, FailureDescriptor> {
    raised.into_real().ok_or_else(|| {
        FailureDescriptor::new(
            FailureKind::InvocationError,
            format!("Failed to invoke {callee}: the error it raised could not be recovered"),
        )
    })
}

/// Formats a failure of the engine to invoke the test method.
pub fn invocation_failure(test: &TestName, reason: impl fmt::Display) -> FailureDescriptor {
    FailureDescriptor::new(
        FailureKind::InvocationError,
        format!("Failed to invoke test method {test}: {reason}"),
    )
}

pub(crate) fn parameter_count_mismatch(
    test: &TestName,
    expected: usize,
    actual: usize,
) -> FailureDescriptor {
    invocation_failure(
        test,
        format_args!(
            "the method declares {expected} parameter(s) but {actual} argument(s) were supplied"
        ),
    )
}
