// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The invocation engine.
//!
//! The main structure in this module is [`TestInvoker`].

mod imp;
mod lifecycle;
mod supervisor;
mod thread_ops;

pub use imp::*;
pub use thread_ops::*;
