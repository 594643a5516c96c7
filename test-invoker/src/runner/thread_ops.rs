// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::InvokeError;
use smol_str::SmolStr;
use std::{
    fmt, panic,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tracing::dispatcher;

/// Thread primitives used to run a test.
pub trait ThreadOperations: fmt::Debug + Send + Sync {
    /// Runs `action` such that a termination request from another thread can't leave the engine's
    /// bookkeeping half-updated.
    ///
    /// Implementations may decline to run `action` at all; the engine treats that as a failure to
    /// invoke the test.
    fn run_with_abort_safety(&self, action: &mut dyn FnMut());

    /// Runs `action` on a separate thread, waiting for at most `timeout`.
    ///
    /// A panic in `action` is resumed on the calling thread.
    fn run_with_deadline(
        &self,
        action: Box<dyn FnOnce() + Send>,
        timeout: Duration,
    ) -> Result<DeadlineOutcome, InvokeError>;
}

/// The result of [`ThreadOperations::run_with_deadline`].
#[derive(Debug)]
pub enum DeadlineOutcome {
    /// The action finished before the deadline.
    Completed,

    /// The deadline elapsed first. The action may still be running on the returned unit.
    TimedOut(ExecutionUnit),
}

/// A liveness handle for the thread running a supervised test.
///
/// Threads can't be stopped safely from the outside, so a test that times out is abandoned rather
/// than stopped. It may continue to run, and to mutate shared state, after its result has been
/// returned.
#[derive(Clone, Debug)]
pub struct ExecutionUnit {
    alive: Arc<AtomicBool>,
}

impl ExecutionUnit {
    /// Creates a new unit, initially alive.
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Returns true if the work on this unit hasn't finished yet.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Returns a guard that marks this unit as finished when dropped, including on unwind.
    pub fn finish_guard(&self) -> FinishGuard {
        FinishGuard {
            alive: self.alive.clone(),
        }
    }
}

impl Default for ExecutionUnit {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks an [`ExecutionUnit`] as finished when dropped.
#[derive(Debug)]
pub struct FinishGuard {
    alive: Arc<AtomicBool>,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// [`ThreadOperations`] backed by a tokio runtime.
///
/// Each supervised run builds a current-thread runtime, runs the action on its blocking pool and
/// waits on a timer. The runtime is always shut down in the background, so an abandoned action
/// never blocks the caller.
#[derive(Clone, Debug)]
pub struct TokioThreadOperations {
    thread_name: SmolStr,
}

impl TokioThreadOperations {
    /// Creates a new instance whose worker threads are named `thread_name`.
    pub fn new(thread_name: impl Into<SmolStr>) -> Self {
        Self {
            thread_name: thread_name.into(),
        }
    }
}

impl Default for TokioThreadOperations {
    fn default() -> Self {
        Self::new("test-invoker-worker")
    }
}

impl ThreadOperations for TokioThreadOperations {
    fn run_with_abort_safety(&self, action: &mut dyn FnMut()) {
        // Threads are never torn down asynchronously here, so running the action is enough.
        action()
    }

    fn run_with_deadline(
        &self,
        action: Box<dyn FnOnce() + Send>,
        timeout: Duration,
    ) -> Result<DeadlineOutcome, InvokeError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .thread_name(self.thread_name.as_str())
            .build()
            .map_err(InvokeError::RuntimeCreate)?;

        let unit = ExecutionUnit::new();
        let guard = unit.finish_guard();
        // Events emitted by the test should go wherever they would have gone on this thread.
        let dispatch = dispatcher::get_default(|dispatch| dispatch.clone());
        let handle = runtime.spawn_blocking(move || {
            let _guard = guard;
            dispatcher::with_default(&dispatch, action)
        });

        // The timer must be created inside the runtime.
        let res = runtime.block_on(async move { tokio::time::timeout(timeout, handle).await });
        runtime.shutdown_background();

        match res {
            Ok(Ok(())) => Ok(DeadlineOutcome::Completed),
            Ok(Err(join_error)) => match join_error.try_into_panic() {
                Ok(payload) => panic::resume_unwind(payload),
                Err(join_error) => Err(InvokeError::WorkerJoin(join_error)),
            },
            Err(_elapsed) => Ok(DeadlineOutcome::TimedOut(unit)),
        }
    }
}
