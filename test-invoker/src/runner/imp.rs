// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    ThreadOperations, TokioThreadOperations,
    lifecycle::OutcomeRecorder,
    supervisor::{Supervised, SupervisedRun},
};
use crate::{
    capture::{BufferCapture, LogCapture},
    config::InvokerProfile,
    descriptor::{ClassDescriptor, MethodDescriptor, SharedContext, TestName},
    errors::InvokeError,
    outcome::TestResult,
    time::stopwatch,
};
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// Test invoker options.
#[derive(Debug, Default)]
pub struct TestInvokerBuilder {
    thread_operations: Option<Arc<dyn ThreadOperations>>,
    log_capture: Option<Arc<dyn LogCapture>>,
    default_timeout: Option<Duration>,
}

impl TestInvokerBuilder {
    /// Sets the thread primitives used to run tests.
    ///
    /// Defaults to [`TokioThreadOperations`] with the profile's worker thread name.
    pub fn set_thread_operations(
        &mut self,
        thread_operations: Arc<dyn ThreadOperations>,
    ) -> &mut Self {
        self.thread_operations = Some(thread_operations);
        self
    }

    /// Sets the log capture used around each invocation.
    ///
    /// Defaults to a [`BufferCapture`] configured from the profile.
    pub fn set_log_capture(&mut self, log_capture: Arc<dyn LogCapture>) -> &mut Self {
        self.log_capture = Some(log_capture);
        self
    }

    /// Sets the timeout for test methods that don't declare their own, overriding the profile's
    /// `test-timeout`.
    pub fn set_default_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Creates a new test invoker.
    pub fn build(self, profile: &InvokerProfile<'_>) -> TestInvoker {
        let thread_operations = self.thread_operations.unwrap_or_else(|| {
            Arc::new(TokioThreadOperations::new(profile.worker_thread_name()))
        });
        let log_capture = self.log_capture.unwrap_or_else(|| {
            let level = profile
                .capture_debug_trace()
                .then(|| profile.debug_trace_level().to_level_filter());
            Arc::new(BufferCapture::new(level))
        });
        let default_timeout = self
            .default_timeout
            .or_else(|| profile.test_timeout())
            .filter(|timeout| !timeout.is_zero());

        TestInvoker {
            thread_operations,
            log_capture,
            default_timeout,
        }
    }
}

/// Runs individual tests.
///
/// Created through [`TestInvokerBuilder`].
#[derive(Debug)]
pub struct TestInvoker {
    thread_operations: Arc<dyn ThreadOperations>,
    log_capture: Arc<dyn LogCapture>,
    default_timeout: Option<Duration>,
}

impl TestInvoker {
    /// The timeout applied to test methods that don't declare their own.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Invokes one test method on a fresh instance of its class.
    ///
    /// `context` must be exclusive to this invocation. Anything user code does is classified into
    /// the returned result; `Err` is only returned if the engine's own machinery fails.
    ///
    /// If the test times out, `Timeout` is recorded in `context` and stays there even if the
    /// abandoned worker finishes later. Result files the worker adds after the timeout stay in
    /// `context`: collect them once [`TestResult::abandoned_unit`] is no longer alive.
    ///
    /// # Panics
    ///
    /// A panic in the engine's own logic (for example, in the [`ExecutionContext`]
    /// implementation) is propagated once teardown has been attempted.
    ///
    /// [`ExecutionContext`]: crate::context::ExecutionContext
    pub fn invoke<T: 'static>(
        &self,
        class: &Arc<ClassDescriptor<T>>,
        method: &Arc<MethodDescriptor<T>>,
        arguments: Vec<serde_json::Value>,
        context: SharedContext,
    ) -> Result<TestResult, InvokeError> {
        let test_name = TestName::new(class.name(), method.name());
        let span = tracing::debug_span!("invoke", test = %test_name);
        let _enter = span.enter();

        let timeout = method.timeout().or(self.default_timeout);
        let run = SupervisedRun {
            class: class.clone(),
            method: method.clone(),
            arguments: arguments.into(),
            context: context.clone(),
            recorder: Arc::new(OutcomeRecorder::new(context.clone())),
            thread_ops: self.thread_operations.clone(),
            test_name: test_name.clone(),
        };

        let stopwatch = stopwatch();
        let scope = self.log_capture.begin();
        let res = run.run(timeout);
        let output = scope.finish();
        let snapshot = stopwatch.snapshot();

        let Supervised { status, abandoned } = res?;
        let result = TestResult {
            failure: status.failure,
            start_time: snapshot.start_time,
            duration: snapshot.duration,
            output,
            result_files: context.collect_result_files(),
            abandoned,
        };
        debug!(
            test = %test_name,
            outcome = %result.outcome(),
            duration = ?result.duration,
            "invocation finished",
        );
        Ok(result)
    }
}
