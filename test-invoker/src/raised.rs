// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Values raised by user code.
//!
//! Test code reports failure either by returning `Err(Raised)` from a lifecycle method, or by
//! panicking. Either way the engine ends up holding a [`Raised`]: panics are caught at every
//! dispatch into user code, and their payloads are recovered with [`Raised::from_panic_payload`].
//!
//! Every dispatch wraps whatever user code raised in a [`Raised::Invocation`]. Classification
//! unwraps exactly one level of that wrapper before looking at the real error.

use smol_str::SmolStr;
use std::{
    any::Any,
    backtrace::{Backtrace, BacktraceStatus},
    error::Error as StdError,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};
use thiserror::Error;

/// The native error code reported when an object is used from a thread other than the one that
/// owns it ("called from the wrong thread").
pub const WRONG_THREAD_ERROR_CODE: i32 = 0x8001_010E_u32 as i32;

/// Something raised by user code while a test was running.
#[derive(Clone, Debug, Error)]
pub enum Raised {
    /// An assertion failed.
    #[error("assertion failed: {0}")]
    AssertFailed(AssertionSignal),

    /// An assertion could not decide whether the test passed.
    #[error("assertion inconclusive: {0}")]
    AssertInconclusive(AssertionSignal),

    /// The thread running the test was told to terminate.
    ///
    /// Stack traces of this variant point at the machinery that terminated the thread, not at user
    /// code, so they are never reported.
    #[error("thread terminated: {0}")]
    ThreadTerminated(UserException),

    /// The wrapper produced when dispatching into user code.
    #[error(transparent)]
    Invocation(InvocationError),

    /// Any other error.
    #[error(transparent)]
    Exception(UserException),
}

impl Raised {
    /// Creates an assertion failure with the given message.
    pub fn assert_failed(message: impl Into<String>) -> Self {
        Self::AssertFailed(AssertionSignal::new(message))
    }

    /// Creates an inconclusive-assertion signal with the given message.
    pub fn assert_inconclusive(message: impl Into<String>) -> Self {
        Self::AssertInconclusive(AssertionSignal::new(message))
    }

    /// Creates a general error of the given type name.
    pub fn exception(type_name: impl Into<SmolStr>, message: impl Into<String>) -> Self {
        Self::Exception(UserException::new(type_name, message))
    }

    /// Creates a general error from a Rust error value, recording its type name as the exception
    /// type.
    pub fn from_error<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Exception(UserException::from_error(error))
    }

    /// Creates a thread-termination signal.
    pub fn thread_terminated(message: impl Into<String>) -> Self {
        Self::ThreadTerminated(UserException::new("ThreadTerminated", message))
    }

    /// Wraps a raised value the way dispatching into user code does.
    pub fn invocation(inner: Raised) -> Self {
        Self::Invocation(InvocationError {
            inner: Some(Box::new(inner)),
        })
    }

    /// A dispatch wrapper whose underlying error could not be recovered.
    pub fn invocation_without_cause() -> Self {
        Self::Invocation(InvocationError { inner: None })
    }

    /// Recovers a raised value from a panic payload.
    ///
    /// Payloads raised with [`std::panic::panic_any`] carrying a [`Raised`] or an
    /// [`AssertionSignal`] are returned as such. String payloads (from `panic!` and the standard
    /// assertion macros) become a general error with the type name `panic`. Returns `None` for any
    /// other payload type.
    pub fn from_panic_payload(payload: Box<dyn Any + Send>) -> Option<Self> {
        let payload = match payload.downcast::<Raised>() {
            Ok(raised) => return Some(*raised),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<AssertionSignal>() {
            Ok(signal) => return Some(Self::AssertFailed(*signal)),
            Err(payload) => payload,
        };
        if let Some(message) = payload.downcast_ref::<&'static str>() {
            return Some(Self::Exception(UserException::panic(*message)));
        }
        payload
            .downcast_ref::<String>()
            .map(|message| Self::Exception(UserException::panic(message.clone())))
    }

    /// Unwraps one level of dispatch wrapper.
    ///
    /// Returns `None` if this is a wrapper that carries no underlying error. Values that aren't
    /// wrappers are returned unchanged.
    pub fn into_real(self) -> Option<Self> {
        match self {
            Self::Invocation(InvocationError { inner }) => inner.map(|inner| *inner),
            other => Some(other),
        }
    }

    /// Unwraps one level of dispatch wrapper if it carries an underlying error, otherwise returns
    /// the value as is.
    pub fn unwrap_or_self(self) -> Self {
        match self {
            Self::Invocation(InvocationError { inner: Some(inner) }) => *inner,
            other => other,
        }
    }

    /// Returns true if this is an assertion failure or an inconclusive-assertion signal.
    pub fn is_assertion(&self) -> bool {
        matches!(self, Self::AssertFailed(_) | Self::AssertInconclusive(_))
    }

    /// Returns true if this is an inconclusive-assertion signal.
    pub fn is_inconclusive(&self) -> bool {
        matches!(self, Self::AssertInconclusive(_))
    }

    /// The name of the type of error that was raised.
    pub fn type_name(&self) -> &str {
        match self {
            Self::AssertFailed(_) => "AssertionFailure",
            Self::AssertInconclusive(_) => "AssertionInconclusive",
            Self::Invocation(_) => "InvocationError",
            Self::ThreadTerminated(exception) | Self::Exception(exception) => {
                exception.type_name()
            }
        }
    }

    /// The human-readable message carried by this value.
    pub fn message(&self) -> String {
        match self {
            Self::AssertFailed(signal) | Self::AssertInconclusive(signal) => {
                signal.message().to_owned()
            }
            Self::ThreadTerminated(exception) | Self::Exception(exception) => {
                exception.message().to_owned()
            }
            Self::Invocation(error) => error.to_string(),
        }
    }

    /// The stack trace captured when this value was created, if any.
    pub fn stack_trace(&self) -> Option<&str> {
        match self {
            Self::AssertFailed(signal) | Self::AssertInconclusive(signal) => signal.stack_trace(),
            Self::ThreadTerminated(exception) | Self::Exception(exception) => {
                exception.stack_trace()
            }
            Self::Invocation(_) => None,
        }
    }

    /// The native error code attached to this value, if any.
    pub fn error_code(&self) -> Option<i32> {
        match self {
            Self::ThreadTerminated(exception) | Self::Exception(exception) => exception.code(),
            _ => None,
        }
    }
}

/// Fails the current test with an assertion failure.
pub fn fail(message: impl Into<String>) -> ! {
    panic::panic_any(Raised::assert_failed(message))
}

/// Ends the current test as inconclusive.
pub fn inconclusive(message: impl Into<String>) -> ! {
    panic::panic_any(Raised::assert_inconclusive(message))
}

/// The payload of an assertion failure or inconclusive signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssertionSignal {
    message: String,
    stack_trace: Option<String>,
}

impl AssertionSignal {
    /// Creates a new signal, capturing a stack trace if backtraces are enabled.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: capture_stack_trace(),
        }
    }

    /// The assertion message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The stack trace captured when the signal was created.
    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }
}

impl fmt::Display for AssertionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A general error raised by user code.
#[derive(Clone, Debug)]
pub struct UserException {
    type_name: SmolStr,
    message: String,
    code: Option<i32>,
    stack_trace: Option<String>,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl UserException {
    /// Creates a new error of the given type name, capturing a stack trace if backtraces are
    /// enabled.
    pub fn new(type_name: impl Into<SmolStr>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            code: None,
            stack_trace: capture_stack_trace(),
            source: None,
        }
    }

    /// Creates a new error from a Rust error value.
    pub fn from_error<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let mut exception = Self::new(std::any::type_name::<E>(), error.to_string());
        exception.source = Some(Arc::new(error));
        exception
    }

    // By the time a panic is caught the stack has unwound, so there's nothing useful to capture.
    fn panic(message: impl Into<String>) -> Self {
        Self {
            type_name: SmolStr::new_static("panic"),
            message: message.into(),
            code: None,
            stack_trace: None,
            source: None,
        }
    }

    /// Attaches a native error code.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Replaces the stack trace.
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// The name of the error type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The native error code, if any.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// The stack trace, if one was captured.
    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }
}

impl fmt::Display for UserException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

impl StdError for UserException {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

/// The wrapper around whatever user code raised when the engine dispatched into it.
#[derive(Clone, Debug)]
pub struct InvocationError {
    inner: Option<Box<Raised>>,
}

impl InvocationError {
    /// The underlying raised value, if it could be recovered.
    pub fn inner(&self) -> Option<&Raised> {
        self.inner.as_deref()
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(inner) => write!(f, "user code raised an error: {inner}"),
            None => write!(f, "user code failed and the underlying error could not be recovered"),
        }
    }
}

impl StdError for InvocationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.as_deref().map(|inner| inner as &(dyn StdError + 'static))
    }
}

/// Calls into user code.
///
/// Both returned errors and panics come back wrapped in [`Raised::Invocation`].
pub(crate) fn dispatch<R>(f: impl FnOnce() -> Result<R, Raised>) -> Result<R, Raised> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(raised)) => Err(Raised::invocation(raised)),
        Err(payload) => Err(match Raised::from_panic_payload(payload) {
            Some(raised) => Raised::invocation(raised),
            None => Raised::invocation_without_cause(),
        }),
    }
}

fn capture_stack_trace() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}
