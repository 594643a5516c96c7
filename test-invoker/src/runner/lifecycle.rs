// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sequencing of a single invocation: construct, inject context, set up, invoke, tear down.

use super::ThreadOperations;
use crate::{
    classify::{self, Classification},
    descriptor::{ClassDescriptor, MethodDescriptor, SharedContext, TestArguments, TestName},
    outcome::{ExecuteStatus, FailureDescriptor, Outcome},
    raised::{Raised, dispatch},
};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, warn};

/// Writes outcomes into the execution context until a final outcome has been recorded.
///
/// After a timeout the supervisor records `Timeout` as final. The abandoned worker may finish
/// later, and its outcome must not replace the timeout.
#[derive(Debug)]
pub(super) struct OutcomeRecorder {
    context: SharedContext,
    finalized: Mutex<bool>,
}

impl OutcomeRecorder {
    pub(super) fn new(context: SharedContext) -> Self {
        Self {
            context,
            finalized: Mutex::new(false),
        }
    }

    /// Records `outcome` unless a final outcome has already been recorded. Returns false if the
    /// outcome was discarded.
    pub(super) fn record(&self, outcome: Outcome) -> bool {
        let finalized = self.lock();
        if *finalized {
            return false;
        }
        self.context.set_outcome(outcome);
        true
    }

    /// Records `outcome` as final. Later calls to [`record`](Self::record) are ignored.
    pub(super) fn finalize(&self, outcome: Outcome) {
        let mut finalized = self.lock();
        *finalized = true;
        self.context.set_outcome(outcome);
    }

    // The lock is held across `set_outcome`, which may panic.
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.finalized.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(super) struct LifecycleRunner<'a, T> {
    pub(super) class: &'a ClassDescriptor<T>,
    pub(super) method: &'a MethodDescriptor<T>,
    pub(super) arguments: &'a TestArguments,
    pub(super) context: &'a SharedContext,
    pub(super) recorder: &'a OutcomeRecorder,
    pub(super) thread_ops: &'a dyn ThreadOperations,
    pub(super) test_name: &'a TestName,
}

impl<T> LifecycleRunner<'_, T> {
    /// Runs the invocation and returns its status.
    ///
    /// Failures in user code are always classified. A panic in the engine's own logic after the
    /// context has been injected is resumed once teardown has been attempted.
    pub(super) fn execute(&self) -> ExecuteStatus {
        let test = self.test_name;

        let mut instance = match dispatch(|| self.class.construct()) {
            Ok(instance) => instance,
            Err(raised) => {
                debug!(%test, stage = "construct", "instance creation failed");
                return ExecuteStatus::failed(classify::instance_creation_failure(
                    self.class.name(),
                    raised,
                ));
            }
        };

        if let Err(raised) =
            dispatch(|| self.class.inject_context(&mut instance, self.context.clone()))
        {
            debug!(%test, stage = "context", "context injection failed");
            let failure = classify::context_set_failure(self.class.name(), raised);
            // Without a context the instance never became usable, so no teardown runs.
            if let Err(raised) = dispatch(move || drop_instance(instance)) {
                warn!(
                    %test,
                    error = %raised,
                    "dropping instance after failed context injection panicked",
                );
            }
            return ExecuteStatus::failed(failure);
        }

        let body = panic::catch_unwind(AssertUnwindSafe(|| {
            let status = self.set_up_and_invoke(&mut instance);
            debug!(%test, outcome = %status.outcome(), "recording outcome");
            if !self.recorder.record(status.outcome()) {
                debug!(%test, "deadline already elapsed; outcome not recorded");
            }
            status
        }));

        let cleanup = self.tear_down(instance);

        match body {
            Ok(status) => match cleanup {
                Some(cleanup) => status.with_cleanup_failure(cleanup),
                None => status,
            },
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn set_up_and_invoke(&self, instance: &mut T) -> ExecuteStatus {
        let test = self.test_name;

        for initializer in self.class.initializers() {
            if let Err(raised) = dispatch(|| initializer.call(instance)) {
                debug!(
                    %test,
                    stage = "initialize",
                    method = %initializer.name(),
                    "setup method failed",
                );
                return ExecuteStatus::failed(classify::initialize_failure(initializer, raised));
            }
        }

        let expected = self.method.parameters().len();
        if self.arguments.len() != expected {
            return ExecuteStatus::failed(classify::parameter_count_mismatch(
                test,
                expected,
                self.arguments.len(),
            ));
        }

        let mut result = None;
        self.thread_ops.run_with_abort_safety(&mut || {
            result = Some(dispatch(|| self.method.call(instance, self.arguments)));
        });

        let contract = self.method.expected_exception();
        match result {
            None => ExecuteStatus::failed(classify::invocation_failure(
                test,
                "test method was not executed",
            )),
            Some(Ok(())) => match contract {
                Some(contract) => ExecuteStatus::failed(classify::missing_expected_exception(
                    test, contract,
                )),
                None => ExecuteStatus::passed(),
            },
            Some(Err(raised)) => match classify::classify(raised, contract, test) {
                Classification::Expected => ExecuteStatus::passed(),
                Classification::Failure(failure) => ExecuteStatus::failed(failure),
            },
        }
    }

    /// Runs the teardown chain, then disposal, then drops the instance.
    ///
    /// Every step runs even if an earlier one fails. Only the first failure is returned.
    fn tear_down(&self, mut instance: T) -> Option<FailureDescriptor> {
        let test = self.test_name;
        let mut first_failure = None;
        let mut record = |failure: FailureDescriptor| {
            debug!(%test, stage = "cleanup", message = %failure.message, "teardown step failed");
            first_failure.get_or_insert(failure);
        };

        for cleanup in self.class.cleanups() {
            if let Err(raised) = dispatch(|| cleanup.call(&mut instance)) {
                record(classify::cleanup_failure(
                    cleanup.declaring_class(),
                    cleanup.name(),
                    raised,
                ));
            }
        }

        if let Some(dispose) = self.class.dispose()
            && let Err(raised) = dispatch(|| dispose.call(&mut instance))
        {
            record(classify::cleanup_failure(
                dispose.declaring_class(),
                dispose.name(),
                raised,
            ));
        }

        if let Err(raised) = dispatch(move || drop_instance(instance)) {
            record(classify::cleanup_failure(self.class.name(), "drop", raised));
        }

        first_failure
    }
}

fn drop_instance<T>(instance: T) -> Result<(), Raised> {
    drop(instance);
    Ok(())
}
