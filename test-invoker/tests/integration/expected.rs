// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use test_invoker::{
    descriptor::{MethodDescriptor, TestName},
    expected::{ExpectedException, ExpectedExceptionContract},
    outcome::{FailureKind, Outcome},
    raised::Raised,
};

#[derive(Debug, thiserror::Error)]
#[error("divisor was zero")]
struct DivideByZero;

fn expecting(
    contract: impl ExpectedExceptionContract + 'static,
    body: impl Fn() -> Result<(), Raised> + Send + Sync + 'static,
) -> Arc<MethodDescriptor<Probe>> {
    Arc::new(
        MethodDescriptor::new("test_method", move |probe: &mut Probe, _| {
            probe.log.push("test");
            body()
        })
        .with_expected_exception(contract),
    )
}

#[test]
fn expected_error_passes() {
    let log = CallLog::default();
    let class = ClassSpec::passing().build(&log);
    let method = expecting(ExpectedException::of::<DivideByZero>(), || {
        Err(Raised::from_error(DivideByZero))
    });

    let result = run(&invoker(), &class, &method);
    assert_eq!(result.outcome(), Outcome::Passed);
    assert!(result.failure.is_none());
    // Teardown still runs for expected errors.
    assert_eq!(
        log.teardown_entries(),
        ["Derived.cleanup", "Base.cleanup", "dispose"]
    );
}

#[test]
fn expected_panic_passes() {
    let class = ClassSpec::passing().build(&CallLog::default());
    let method = expecting(
        ExpectedException::new("panic").with_message_containing("overflow"),
        || panic!("attempt to add with overflow"),
    );

    let result = run(&invoker(), &class, &method);
    assert_eq!(result.outcome(), Outcome::Passed);
}

#[test]
fn no_error_raised() {
    let class = ClassSpec::passing().build(&CallLog::default());
    let method = expecting(ExpectedException::new("ParseError"), || Ok(()));

    let result = run(&invoker(), &class, &method);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::MissingExpectedException);
    assert_eq!(result.outcome(), Outcome::Failed);
    assert_eq!(
        failure.message,
        "Test method Derived.test_method did not throw an exception. An exception was expected \
         by ExpectedException(ParseError)."
    );
}

#[test]
fn no_error_raised_custom_message() {
    let class = ClassSpec::passing().build(&CallLog::default());
    let method = expecting(
        ExpectedException::new("ParseError").with_no_exception_message("garbage was accepted"),
        || Ok(()),
    );

    let result = run(&invoker(), &class, &method);
    assert_eq!(result.message(), Some("garbage was accepted"));
}

#[test]
fn wrong_error_type() {
    let class = ClassSpec::passing().build(&CallLog::default());
    let method = expecting(ExpectedException::new("ParseError"), || {
        Err(Raised::exception("IoError", "disk full"))
    });

    let result = run(&invoker(), &class, &method);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::AssertionFailure);
    assert_eq!(
        failure.message,
        "Test method Derived.test_method threw exception IoError, but exception ParseError was \
         expected. Exception message: disk full"
    );
}

#[test]
fn assertion_failures_are_not_swallowed() {
    let class = ClassSpec::passing().build(&CallLog::default());
    let method = expecting(ExpectedException::new("ParseError"), || {
        Err(Raised::assert_failed("expected 3, got 4"))
    });

    let result = run(&invoker(), &class, &method);
    assert_eq!(result.outcome(), Outcome::Failed);
    assert_eq!(result.message(), Some("expected 3, got 4"));
}

/// A contract that can't decide, and says so.
#[derive(Debug)]
struct Undecided;

impl ExpectedExceptionContract for Undecided {
    fn verify(&self, _raised: &Raised, _test: &TestName) -> Result<(), Raised> {
        Err(Raised::assert_inconclusive("contract could not decide"))
    }

    fn description(&self) -> String {
        "Undecided".to_owned()
    }
}

#[test]
fn contract_may_report_inconclusive() {
    let class = ClassSpec::passing().build(&CallLog::default());
    let method = expecting(Undecided, || Err(Raised::exception("ParseError", "bad")));

    let result = run(&invoker(), &class, &method);
    assert_eq!(result.outcome(), Outcome::Inconclusive);
    assert_eq!(result.message(), Some("contract could not decide"));
}

/// A contract with a bug in it.
#[derive(Debug)]
struct Exploding;

impl ExpectedExceptionContract for Exploding {
    fn verify(&self, _raised: &Raised, _test: &TestName) -> Result<(), Raised> {
        panic!("contract bug")
    }

    fn description(&self) -> String {
        "Exploding".to_owned()
    }
}

#[test]
fn panicking_contract_is_a_failure() {
    let log = CallLog::default();
    let class = ClassSpec::passing().build(&log);
    let method = expecting(Exploding, || Err(Raised::exception("ParseError", "bad")));

    let result = run(&invoker(), &class, &method);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::AssertionFailure);
    assert_eq!(failure.message, "contract bug");
    assert_eq!(
        log.teardown_entries(),
        ["Derived.cleanup", "Base.cleanup", "dispose"]
    );
}

/// A contract whose failure message can't be produced.
#[derive(Debug)]
struct Speechless;

impl ExpectedExceptionContract for Speechless {
    fn verify(&self, _raised: &Raised, _test: &TestName) -> Result<(), Raised> {
        Ok(())
    }

    fn description(&self) -> String {
        "Speechless".to_owned()
    }

    fn no_exception_message(&self) -> Option<String> {
        panic!("no words")
    }
}

#[test]
fn panicking_no_exception_message_is_a_failure() {
    let log = CallLog::default();
    let class = ClassSpec::passing().build(&log);
    let method = expecting(Speechless, || Ok(()));

    let result = run(&invoker(), &class, &method);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(result.outcome(), Outcome::Failed);
    assert_eq!(failure.kind, FailureKind::AssertionFailure);
    assert_eq!(failure.message, "no words");
    assert_eq!(
        log.teardown_entries(),
        ["Derived.cleanup", "Base.cleanup", "dispose"]
    );
}
