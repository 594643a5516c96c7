// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! The per-test invocation engine.
//!
//! Given a resolved [`MethodDescriptor`](descriptor::MethodDescriptor) and the
//! [`ClassDescriptor`](descriptor::ClassDescriptor) it belongs to, a
//! [`TestInvoker`](runner::TestInvoker) runs exactly one test: it constructs a fresh instance,
//! injects the execution context, runs the setup chain, invokes the test method, records the
//! outcome, and runs the teardown chain. Whatever user code does along the way is classified into
//! exactly one [`Outcome`](outcome::Outcome), returned as part of a
//! [`TestResult`](outcome::TestResult).
//!
//! The flow of a single invocation is:
//!
//! ```text
//! TestInvoker (timing, log capture, result files)
//!   -> timeout supervision (direct, or on a worker thread with a deadline)
//!     -> lifecycle (construct, context, setup, invoke, teardown)
//!       -> classification of anything raised
//! ```

pub mod capture;
pub mod classify;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod errors;
pub mod expected;
pub mod outcome;
pub mod raised;
pub mod runner;
mod time;
