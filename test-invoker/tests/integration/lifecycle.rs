// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino::Utf8PathBuf;
use color_eyre::eyre::{Result, bail};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex},
    time::Duration,
};
use test_case::test_case;
use test_invoker::{
    context::TestContext,
    descriptor::{ClassDescriptor, ClassLevel, MethodDescriptor},
    outcome::{FailureKind, Outcome},
    raised::Raised,
    runner::{DeadlineOutcome, TestInvokerBuilder, ThreadOperations, TokioThreadOperations},
};

#[test]
fn passing_test_runs_every_stage_in_order() {
    let log = CallLog::default();
    let class = ClassSpec::passing().build(&log);
    let result = run(&invoker(), &class, &method(Action::Succeed));

    assert_eq!(result.outcome(), Outcome::Passed);
    assert!(result.failure.is_none());
    assert!(result.duration > Duration::ZERO);
    assert!(result.abandoned_unit().is_none());
    assert_eq!(
        log.entries(),
        [
            "construct",
            "context",
            "Base.initialize",
            "Derived.initialize",
            "test",
            "Derived.cleanup",
            "Base.cleanup",
            "dispose",
            "drop",
        ]
    );
}

#[test]
fn instance_is_not_reused() {
    let log = CallLog::default();
    let class = ClassSpec::passing().build(&log);
    let invoker = invoker();
    let method = method(Action::Succeed);
    run(&invoker, &class, &method);
    run(&invoker, &class, &method);

    let entries = log.entries();
    assert_eq!(entries.iter().filter(|e| *e == "construct").count(), 2);
    assert_eq!(entries.iter().filter(|e| *e == "drop").count(), 2);
}

#[test_case(
    Action::Throw,
    "Unable to create instance of class Derived. Error: StepError: constructor threw."
    ; "constructor returns an error"
)]
#[test_case(
    Action::Panic,
    "Unable to create instance of class Derived. Error: panic: constructor panicked."
    ; "constructor panics"
)]
fn construction_failure_skips_everything(constructor: Action, message: &str) {
    let log = CallLog::default();
    let class = ClassSpec {
        constructor,
        ..ClassSpec::passing()
    }
    .build(&log);
    let result = run(&invoker(), &class, &method(Action::Succeed));

    assert_eq!(result.outcome(), Outcome::Failed);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::InstanceCreation);
    assert_eq!(failure.message, message);
    assert_eq!(log.entries(), ["construct"]);
    assert_eq!(log.teardown_entries(), Vec::<String>::new());
}

#[test]
fn context_failure_skips_teardown() {
    let log = CallLog::default();
    let class = ClassSpec {
        context: Some(Action::Throw),
        ..ClassSpec::passing()
    }
    .build(&log);
    let result = run(&invoker(), &class, &method(Action::Succeed));

    assert_eq!(result.outcome(), Outcome::Failed);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::ContextSet);
    assert_eq!(
        failure.message,
        "Unable to set execution context property for the class Derived. \
         Error: StepError: context threw."
    );
    // The instance is released, but no teardown method runs.
    assert_eq!(log.entries(), ["construct", "context", "drop"]);
}

#[test]
fn class_without_context_slot_runs_teardown() {
    let log = CallLog::default();
    let class = ClassSpec {
        context: None,
        ..ClassSpec::passing()
    }
    .build(&log);
    let result = run(&invoker(), &class, &method(Action::Succeed));

    assert_eq!(result.outcome(), Outcome::Passed);
    assert!(!class.has_context_slot());
    assert_eq!(
        log.teardown_entries(),
        ["Derived.cleanup", "Base.cleanup", "dispose"]
    );
}

#[test]
fn instance_receives_context() {
    let log = CallLog::default();
    let class = ClassSpec::passing().build(&log);
    let method = Arc::new(MethodDescriptor::new(
        "test_method",
        |probe: &mut Probe, _| match &probe.context {
            Some(_) => Ok(()),
            None => Err(Raised::assert_failed("context was not injected")),
        },
    ));
    let result = run(&invoker(), &class, &method);
    assert_eq!(result.outcome(), Outcome::Passed);
}

#[test]
fn setup_error_aborts_chain_but_runs_teardown() {
    let log = CallLog::default();
    let mut spec = ClassSpec::passing();
    spec.levels[0].initialize = Some(Action::Throw);
    let class = spec.build(&log);
    let result = run(&invoker(), &class, &method(Action::Succeed));

    assert_eq!(result.outcome(), Outcome::Failed);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Initialize);
    assert_eq!(
        failure.message,
        "Initialization method Base.initialize threw exception. StepError: Base.initialize threw."
    );
    assert_eq!(
        log.entries(),
        [
            "construct",
            "context",
            "Base.initialize",
            "Derived.cleanup",
            "Base.cleanup",
            "dispose",
            "drop",
        ]
    );
}

#[test_case(
    Action::Inconclusive,
    Outcome::Inconclusive,
    "Derived.initialize was inconclusive"
    ; "inconclusive"
)]
#[test_case(Action::Fail, Outcome::Failed, "Derived.initialize failed"; "assertion failure")]
fn setup_assertion_keeps_its_message(action: Action, outcome: Outcome, message: &str) {
    let log = CallLog::default();
    let mut spec = ClassSpec::passing();
    spec.levels[1].initialize = Some(action);
    let class = spec.build(&log);
    let result = run(&invoker(), &class, &method(Action::Succeed));

    assert_eq!(result.outcome(), outcome);
    assert_eq!(result.message(), Some(message));
    assert!(!log.entries().contains(&"test".to_owned()));
}

#[test_case(
    Action::Fail,
    Outcome::Failed,
    FailureKind::AssertionFailure,
    "test failed"
    ; "assertion failure"
)]
#[test_case(
    Action::Inconclusive,
    Outcome::Inconclusive,
    FailureKind::AssertionInconclusive,
    "test was inconclusive"
    ; "inconclusive"
)]
#[test_case(
    Action::Throw,
    Outcome::Failed,
    FailureKind::UnhandledException,
    "Test method Derived.test_method threw exception:\nStepError: test threw"
    ; "returned error"
)]
#[test_case(
    Action::Panic,
    Outcome::Failed,
    FailureKind::UnhandledException,
    "Test method Derived.test_method threw exception:\npanic: test panicked"
    ; "panic"
)]
fn test_method_failures(action: Action, outcome: Outcome, kind: FailureKind, message: &str) {
    let log = CallLog::default();
    let class = ClassSpec::passing().build(&log);
    let result = run(&invoker(), &class, &method(action));

    assert_eq!(result.outcome(), outcome);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.kind, kind);
    assert_eq!(failure.message, message);
    assert_eq!(
        log.teardown_entries(),
        ["Derived.cleanup", "Base.cleanup", "dispose"]
    );
}

#[test]
fn unrecoverable_setup_payload_is_an_error() {
    let log = CallLog::default();
    let class = Arc::new(
        ClassDescriptor::builder("Derived", {
            let log = log.clone();
            move || {
                Ok(Probe {
                    log: log.clone(),
                    context: None,
                })
            }
        })
        .level(ClassLevel::new("Derived").initialize("initialize", |_: &mut Probe| {
            panic::panic_any(7_i64)
        }))
        .build(),
    );
    let result = run(&invoker(), &class, &method(Action::Succeed));

    assert_eq!(result.outcome(), Outcome::Error);
    assert_eq!(
        result.message(),
        Some(
            "Failed to invoke initialization method Derived.initialize: the error it raised \
             could not be recovered"
        )
    );
    assert!(!log.entries().contains(&"test".to_owned()));
}

#[test]
fn unrecoverable_panic_payload_is_an_error() {
    let log = CallLog::default();
    let class = ClassSpec::passing().build(&log);
    let method = Arc::new(MethodDescriptor::new("test_method", |_: &mut Probe, _| {
        panic::panic_any(42_u32)
    }));
    let result = run(&invoker(), &class, &method);

    assert_eq!(result.outcome(), Outcome::Error);
    let message = result.message().unwrap();
    assert!(
        message.starts_with("Failed to invoke test method Derived.test_method"),
        "unexpected message: {message}"
    );
}

#[test]
fn teardown_failure_overrides_pass() {
    let log = CallLog::default();
    let mut spec = ClassSpec::passing();
    spec.levels[0].cleanup = Some(Action::Throw);
    spec.levels[1].cleanup = Some(Action::Throw);
    let class = spec.build(&log);
    let result = run(&invoker(), &class, &method(Action::Succeed));

    assert_eq!(result.outcome(), Outcome::Failed);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Cleanup);
    // Only the first teardown failure is reported, but every step still runs.
    assert_eq!(
        failure.message,
        "Cleanup method Derived.cleanup threw exception. StepError: Derived.cleanup threw."
    );
    assert_eq!(
        log.teardown_entries(),
        ["Derived.cleanup", "Base.cleanup", "dispose"]
    );
    assert_eq!(log.entries().last().map(String::as_str), Some("drop"));
}

#[test]
fn teardown_failure_supersedes_test_failure() {
    let log = CallLog::default();
    let mut spec = ClassSpec::passing();
    spec.levels[0].cleanup = Some(Action::Throw);
    let class = spec.build(&log);
    let result = run(&invoker(), &class, &method(Action::Fail));

    assert_eq!(result.outcome(), Outcome::Failed);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Cleanup);
    let superseded = failure.superseded.as_ref().expect("test failure is kept");
    assert_eq!(superseded.kind, FailureKind::AssertionFailure);
    assert_eq!(superseded.message, "test failed");
}

#[test]
fn teardown_failure_keeps_inconclusive() {
    let log = CallLog::default();
    let class = ClassSpec {
        dispose: Some(Action::Throw),
        ..ClassSpec::passing()
    }
    .build(&log);
    let result = run(&invoker(), &class, &method(Action::Inconclusive));

    assert_eq!(result.outcome(), Outcome::Inconclusive);
    assert_eq!(result.message(), Some("test was inconclusive"));
}

#[test]
fn dispose_panic_is_a_cleanup_failure() {
    let log = CallLog::default();
    let class = ClassSpec {
        dispose: Some(Action::Panic),
        ..ClassSpec::passing()
    }
    .build(&log);
    let result = run(&invoker(), &class, &method(Action::Succeed));

    assert_eq!(result.outcome(), Outcome::Failed);
    assert_eq!(
        result.message(),
        Some("Cleanup method Derived.dispose threw exception. panic: dispose panicked.")
    );
    assert_eq!(log.entries().last().map(String::as_str), Some("drop"));
}

struct PanicsOnDrop;

impl Drop for PanicsOnDrop {
    fn drop(&mut self) {
        panic!("released twice");
    }
}

#[test]
fn panicking_drop_is_a_cleanup_failure() {
    let class = Arc::new(ClassDescriptor::builder("Handle", || Ok(PanicsOnDrop)).build());
    let method = Arc::new(MethodDescriptor::new("closes", |_: &mut PanicsOnDrop, _| Ok(())));
    let result = invoker()
        .invoke(&class, &method, Vec::new(), new_context())
        .unwrap();

    assert_eq!(result.outcome(), Outcome::Failed);
    assert_eq!(
        result.message(),
        Some("Cleanup method Handle.drop threw exception. panic: released twice.")
    );
}

#[test]
fn outcome_is_recorded_before_teardown() -> Result<()> {
    let context = new_context();
    let observed = Arc::new(Mutex::new(None));

    let class = {
        let context = context.clone();
        let observed = observed.clone();
        Arc::new(
            ClassDescriptor::builder("Observer", || Ok(()))
                .level(ClassLevel::new("Observer").cleanup("check", move |_| {
                    *observed.lock().unwrap() = context.outcome();
                    Ok(())
                }))
                .build(),
        )
    };
    let method = Arc::new(MethodDescriptor::new("fails", |_: &mut (), _| {
        Err(Raised::assert_failed("nope"))
    }));

    let result = invoker().invoke(&class, &method, Vec::new(), context.clone())?;
    assert_eq!(result.outcome(), Outcome::Failed);
    assert_eq!(*observed.lock().unwrap(), Some(Outcome::Failed));
    assert_eq!(context.outcome(), Some(Outcome::Failed));
    Ok(())
}

#[test]
fn result_files_are_collected() -> Result<()> {
    let context = new_context();
    let class = Arc::new(ClassDescriptor::builder("Reporter", || Ok(())).build());
    let method = {
        let context = context.clone();
        Arc::new(MethodDescriptor::new("writes", move |_: &mut (), _| {
            context.add_result_file("target/report.html");
            Ok(())
        }))
    };

    let result = invoker().invoke(&class, &method, Vec::new(), context)?;
    assert_eq!(result.outcome(), Outcome::Passed);
    assert_eq!(
        result.result_files,
        vec![Utf8PathBuf::from("target/report.html")]
    );
    Ok(())
}

#[test]
fn arguments_are_passed_and_checked() -> Result<()> {
    let log = CallLog::default();
    let class = ClassSpec::passing().build(&log);
    let method = Arc::new(
        MethodDescriptor::new("adds", |probe: &mut Probe, args| {
            probe.log.push("test");
            if args[0].as_i64().unwrap() + args[1].as_i64().unwrap() == 5 {
                Ok(())
            } else {
                Err(Raised::assert_failed("wrong sum"))
            }
        })
        .with_parameters(["a", "b"]),
    );
    let invoker = invoker();

    let result = invoker.invoke(&class, &method, vec![json!(2), json!(3)], new_context())?;
    if !result.outcome().is_success() {
        bail!("expected a pass, got {:?}", result.failure);
    }

    let before = log.entries().len();
    let result = invoker.invoke(&class, &method, vec![json!(2)], new_context())?;
    assert_eq!(result.outcome(), Outcome::Error);
    assert_eq!(
        result.message(),
        Some(
            "Failed to invoke test method Derived.adds: the method declares 2 parameter(s) \
             but 1 argument(s) were supplied"
        )
    );
    let entries = &log.entries()[before..];
    assert!(!entries.contains(&"test".to_owned()), "body must not run");
    assert!(entries.contains(&"Base.cleanup".to_owned()), "teardown still runs");
    Ok(())
}

#[test]
fn engine_panic_propagates_after_teardown() {
    let log = CallLog::default();
    let class = ClassSpec::passing().build(&log);
    let method = method(Action::Succeed);
    let invoker = invoker();

    let payload = panic::catch_unwind(AssertUnwindSafe(|| {
        invoker.invoke(
            &class,
            &method,
            Vec::new(),
            Arc::new(PanickingContext("set_outcome exploded")),
        )
    }))
    .expect_err("engine panic propagates");

    assert_eq!(payload.downcast_ref::<&str>(), Some(&"set_outcome exploded"));
    assert_eq!(
        log.teardown_entries(),
        ["Derived.cleanup", "Base.cleanup", "dispose"]
    );
}

/// Thread operations that never run the test method.
#[derive(Debug, Default)]
struct DecliningOps(TokioThreadOperations);

impl ThreadOperations for DecliningOps {
    fn run_with_abort_safety(&self, _action: &mut dyn FnMut()) {}

    fn run_with_deadline(
        &self,
        action: Box<dyn FnOnce() + Send>,
        timeout: Duration,
    ) -> Result<DeadlineOutcome, test_invoker::errors::InvokeError> {
        self.0.run_with_deadline(action, timeout)
    }
}

#[test]
fn method_not_executed_is_an_error() {
    let log = CallLog::default();
    let class = ClassSpec::passing().build(&log);
    let config = test_invoker::config::InvokerConfig::default_config();
    let mut builder = TestInvokerBuilder::default();
    builder.set_thread_operations(Arc::new(DecliningOps::default()));
    let invoker = builder.build(&config.profile("default").unwrap());

    let result = run(&invoker, &class, &method(Action::Succeed));
    assert_eq!(result.outcome(), Outcome::Error);
    assert_eq!(
        result.message(),
        Some("Failed to invoke test method Derived.test_method: test method was not executed")
    );
    assert!(!log.entries().contains(&"test".to_owned()));
}

#[test]
fn context_is_exclusive_to_invocation() {
    // A fresh TestContext starts without an outcome, regardless of earlier invocations.
    let log = CallLog::default();
    let class = ClassSpec::passing().build(&log);
    let first = new_context();
    invoker()
        .invoke(&class, &method(Action::Fail), Vec::new(), first.clone())
        .unwrap();
    let second: Arc<TestContext> = new_context();

    assert_eq!(first.outcome(), Some(Outcome::Failed));
    assert_eq!(second.outcome(), None);
}
