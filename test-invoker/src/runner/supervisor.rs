// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    DeadlineOutcome, ExecutionUnit, ThreadOperations,
    lifecycle::{LifecycleRunner, OutcomeRecorder},
};
use crate::{
    classify,
    descriptor::{ClassDescriptor, MethodDescriptor, SharedContext, TestName},
    errors::InvokeError,
    outcome::{ExecuteStatus, Outcome},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Everything needed to run one invocation, owned so that it can be moved to a worker thread.
pub(super) struct SupervisedRun<T> {
    pub(super) class: Arc<ClassDescriptor<T>>,
    pub(super) method: Arc<MethodDescriptor<T>>,
    pub(super) arguments: Arc<[serde_json::Value]>,
    pub(super) context: SharedContext,
    pub(super) recorder: Arc<OutcomeRecorder>,
    pub(super) thread_ops: Arc<dyn ThreadOperations>,
    pub(super) test_name: TestName,
}

pub(super) struct Supervised {
    pub(super) status: ExecuteStatus,
    pub(super) abandoned: Option<ExecutionUnit>,
}

impl<T: 'static> SupervisedRun<T> {
    /// Runs the invocation directly if `timeout` is `None`, otherwise on a worker thread under a
    /// deadline.
    pub(super) fn run(self, timeout: Option<Duration>) -> Result<Supervised, InvokeError> {
        let Some(timeout) = timeout else {
            debug!(test = %self.test_name, "running directly");
            return Ok(Supervised {
                status: self.execute(),
                abandoned: None,
            });
        };

        debug!(test = %self.test_name, ?timeout, "running under deadline");
        let test_name = self.test_name.clone();
        let thread_ops = self.thread_ops.clone();
        let recorder = self.recorder.clone();
        let (sender, mut receiver) = oneshot::channel();
        let outcome = thread_ops.run_with_deadline(
            Box::new(move || {
                // The receiver is gone if the deadline already elapsed.
                _ = sender.send(self.execute());
            }),
            timeout,
        )?;

        match outcome {
            DeadlineOutcome::Completed => {
                let status = receiver
                    .try_recv()
                    .map_err(|_| InvokeError::MissingWorkerResult {
                        test: test_name.to_string(),
                    })?;
                Ok(Supervised {
                    status,
                    abandoned: None,
                })
            }
            DeadlineOutcome::TimedOut(unit) => {
                warn!(
                    test = %test_name,
                    timeout = %humantime::format_duration(timeout),
                    "test timed out; its worker thread may still be running",
                );
                recorder.finalize(Outcome::Timeout);
                Ok(Supervised {
                    status: ExecuteStatus::failed(classify::timeout_failure(&test_name, timeout)),
                    abandoned: Some(unit),
                })
            }
        }
    }

    fn execute(&self) -> ExecuteStatus {
        LifecycleRunner {
            class: &self.class,
            method: &self.method,
            arguments: &self.arguments,
            context: &self.context,
            recorder: &self.recorder,
            thread_ops: self.thread_ops.as_ref(),
            test_name: &self.test_name,
        }
        .execute()
    }
}
