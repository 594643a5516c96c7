// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoped capture of the output produced while a test runs.
//!
//! A [`LogCapture`] hands out one [`CaptureScope`] per invocation. The scope is active from
//! [`LogCapture::begin`] until it's finished or dropped, whichever comes first, so capture is
//! released on every exit path.

use bytes::BytesMut;
use std::{
    fmt, io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{level_filters::LevelFilter, subscriber::DefaultGuard};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::MakeWriter,
    layer::{Layer, SubscriberExt},
};

/// Events from the engine's own targets are never part of a test's debug trace.
const ENGINE_TARGET: &str = "test_invoker";

fn is_engine_target(target: &str) -> bool {
    target
        .strip_prefix(ENGINE_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

/// Text captured while one test ran.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,

    /// Captured debug trace.
    pub debug_trace: String,
}

/// A source of scoped output capture.
pub trait LogCapture: fmt::Debug + Send + Sync {
    /// Starts capturing. Capture ends when the returned scope is finished or dropped.
    fn begin(&self) -> Box<dyn CaptureScope + '_>;
}

/// An active capture scope.
pub trait CaptureScope {
    /// Ends the scope and returns what was captured.
    fn finish(self: Box<Self>) -> CapturedOutput;
}

/// A [`LogCapture`] that captures nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCapture;

impl LogCapture for NoCapture {
    fn begin(&self) -> Box<dyn CaptureScope + '_> {
        Box::new(NoCaptureScope)
    }
}

struct NoCaptureScope;

impl CaptureScope for NoCaptureScope {
    fn finish(self: Box<Self>) -> CapturedOutput {
        CapturedOutput::default()
    }
}

/// A [`LogCapture`] that captures into in-memory buffers.
///
/// The host hands [`stdout`](Self::stdout) and [`stderr`](Self::stderr) writers to test code.
/// `tracing` events emitted by test code on the invoking thread (or, under a deadline, on the
/// worker thread) are captured into the debug trace.
#[derive(Clone, Debug)]
pub struct BufferCapture {
    stdout: CaptureWriter,
    stderr: CaptureWriter,
    debug_trace_level: Option<LevelFilter>,
}

impl BufferCapture {
    /// Creates a new capture. `debug_trace_level` is the most verbose level captured into the
    /// debug trace; if `None`, the debug trace isn't captured.
    pub fn new(debug_trace_level: Option<LevelFilter>) -> Self {
        Self {
            stdout: CaptureWriter::default(),
            stderr: CaptureWriter::default(),
            debug_trace_level,
        }
    }

    /// The writer standing in for standard output.
    pub fn stdout(&self) -> CaptureWriter {
        self.stdout.clone()
    }

    /// The writer standing in for standard error.
    pub fn stderr(&self) -> CaptureWriter {
        self.stderr.clone()
    }
}

impl LogCapture for BufferCapture {
    fn begin(&self) -> Box<dyn CaptureScope + '_> {
        // Anything written between scopes doesn't belong to any test.
        self.stdout.take();
        self.stderr.take();

        let debug_trace = CaptureWriter::default();
        let guard = self.debug_trace_level.map(|level| {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(debug_trace.clone())
                .with_ansi(false)
                .without_time()
                .with_filter(filter_fn(move |metadata| {
                    *metadata.level() <= level && !is_engine_target(metadata.target())
                }));
            tracing::subscriber::set_default(tracing_subscriber::registry().with(layer))
        });

        Box::new(BufferScope {
            capture: self,
            debug_trace,
            guard,
        })
    }
}

struct BufferScope<'a> {
    capture: &'a BufferCapture,
    debug_trace: CaptureWriter,
    guard: Option<DefaultGuard>,
}

impl CaptureScope for BufferScope<'_> {
    fn finish(mut self: Box<Self>) -> CapturedOutput {
        // Restore the previous subscriber before reading the trace.
        drop(self.guard.take());
        CapturedOutput {
            stdout: self.capture.stdout.take(),
            stderr: self.capture.stderr.take(),
            debug_trace: self.debug_trace.take(),
        }
    }
}

/// An in-memory writer shared between test code and a [`BufferCapture`].
#[derive(Clone, Debug, Default)]
pub struct CaptureWriter {
    buf: Arc<Mutex<BytesMut>>,
}

impl CaptureWriter {
    fn take(&self) -> String {
        let bytes = self.buf().split().freeze();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn buf(&self) -> MutexGuard<'_, BytesMut> {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl io::Write for CaptureWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CaptureWriter {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
