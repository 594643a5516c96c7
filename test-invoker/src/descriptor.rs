// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pre-resolved metadata describing test classes and test methods.
//!
//! Descriptors are produced once, at discovery time, and are immutable afterwards. A
//! [`ClassDescriptor`] is shared by every invocation of the methods of its class. Setup and
//! teardown chains across the class hierarchy are resolved when the descriptor is built: setup runs
//! base→derived, teardown derived→base.

use crate::{context::ExecutionContext, expected::ExpectedExceptionContract, raised::Raised};
use debug_ignore::DebugIgnore;
use derive_where::derive_where;
use smol_str::SmolStr;
use std::{fmt, sync::Arc, time::Duration};

/// The execution context as seen by an instance under test.
pub type SharedContext = Arc<dyn ExecutionContext>;

/// The arguments a test method is invoked with.
pub type TestArguments = [serde_json::Value];

type ConstructorFn<T> = dyn Fn() -> Result<T, Raised> + Send + Sync;
type LifecycleFn<T> = dyn Fn(&mut T) -> Result<(), Raised> + Send + Sync;
type ContextSlotFn<T> = dyn Fn(&mut T, SharedContext) -> Result<(), Raised> + Send + Sync;
type TestBodyFn<T> = dyn Fn(&mut T, &TestArguments) -> Result<(), Raised> + Send + Sync;

/// The name of a test: the class it's declared on and the method name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestName {
    /// The class name.
    pub class: SmolStr,

    /// The method name.
    pub method: SmolStr,
}

impl TestName {
    /// Creates a new test name.
    pub fn new(class: impl Into<SmolStr>, method: impl Into<SmolStr>) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for TestName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.method)
    }
}

/// A setup or teardown method, along with the class in the hierarchy that declared it.
#[derive_where(Clone, Debug)]
pub struct LifecycleMethod<T> {
    declaring_class: SmolStr,
    name: SmolStr,
    f: DebugIgnore<Arc<LifecycleFn<T>>>,
}

impl<T> LifecycleMethod<T> {
    /// Creates a new lifecycle method.
    pub fn new<F>(declaring_class: impl Into<SmolStr>, name: impl Into<SmolStr>, f: F) -> Self
    where
        F: Fn(&mut T) -> Result<(), Raised> + Send + Sync + 'static,
    {
        Self {
            declaring_class: declaring_class.into(),
            name: name.into(),
            f: DebugIgnore(Arc::new(f)),
        }
    }

    /// The class in the hierarchy that declared this method.
    pub fn declaring_class(&self) -> &str {
        &self.declaring_class
    }

    /// The method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, instance: &mut T) -> Result<(), Raised> {
        (self.f)(instance)
    }
}

/// Metadata for a test class.
#[derive_where(Debug)]
pub struct ClassDescriptor<T> {
    name: SmolStr,
    constructor: DebugIgnore<Box<ConstructorFn<T>>>,
    initializers: Vec<LifecycleMethod<T>>,
    cleanups: Vec<LifecycleMethod<T>>,
    context_slot: Option<DebugIgnore<Box<ContextSlotFn<T>>>>,
    dispose: Option<LifecycleMethod<T>>,
}

impl<T> ClassDescriptor<T> {
    /// Starts building a descriptor for the class `name`, whose instances are created by
    /// `constructor`.
    pub fn builder<F>(name: impl Into<SmolStr>, constructor: F) -> ClassDescriptorBuilder<T>
    where
        F: Fn() -> Result<T, Raised> + Send + Sync + 'static,
    {
        ClassDescriptorBuilder {
            name: name.into(),
            constructor: DebugIgnore(Box::new(constructor)),
            levels: Vec::new(),
            context_slot: None,
            dispose: None,
        }
    }

    /// The class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The setup chain, in base→derived order.
    pub fn initializers(&self) -> &[LifecycleMethod<T>] {
        &self.initializers
    }

    /// The teardown chain, in derived→base order.
    pub fn cleanups(&self) -> &[LifecycleMethod<T>] {
        &self.cleanups
    }

    /// Returns true if instances of this class accept an execution context.
    pub fn has_context_slot(&self) -> bool {
        self.context_slot.is_some()
    }

    /// The disposal capability, if the class has one.
    pub fn dispose(&self) -> Option<&LifecycleMethod<T>> {
        self.dispose.as_ref()
    }

    pub(crate) fn construct(&self) -> Result<T, Raised> {
        (self.constructor)()
    }

    /// A class without a context slot accepts the context trivially.
    pub(crate) fn inject_context(
        &self,
        instance: &mut T,
        context: SharedContext,
    ) -> Result<(), Raised> {
        match &self.context_slot {
            Some(slot) => slot(instance, context),
            None => Ok(()),
        }
    }
}

/// Builder for a [`ClassDescriptor`].
///
/// Levels of the class hierarchy are added base class first, with the class under test itself last.
#[derive_where(Debug)]
pub struct ClassDescriptorBuilder<T> {
    name: SmolStr,
    constructor: DebugIgnore<Box<ConstructorFn<T>>>,
    levels: Vec<ClassLevel<T>>,
    context_slot: Option<DebugIgnore<Box<ContextSlotFn<T>>>>,
    dispose: Option<LifecycleMethod<T>>,
}

impl<T> ClassDescriptorBuilder<T> {
    /// Adds the next level of the class hierarchy, in base→derived order.
    pub fn level(mut self, level: ClassLevel<T>) -> Self {
        self.levels.push(level);
        self
    }

    /// Declares a writable context slot.
    pub fn context_slot<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut T, SharedContext) -> Result<(), Raised> + Send + Sync + 'static,
    {
        self.context_slot = Some(DebugIgnore(Box::new(f)));
        self
    }

    /// Declares a disposal capability, run after the teardown chain.
    pub fn dispose<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut T) -> Result<(), Raised> + Send + Sync + 'static,
    {
        self.dispose = Some(LifecycleMethod::new(self.name.clone(), "dispose", f));
        self
    }

    /// Resolves the setup and teardown chains and builds the descriptor.
    pub fn build(self) -> ClassDescriptor<T> {
        let initializers = self
            .levels
            .iter()
            .filter_map(|level| level.initialize.clone())
            .collect();
        let cleanups = self
            .levels
            .iter()
            .rev()
            .filter_map(|level| level.cleanup.clone())
            .collect();

        ClassDescriptor {
            name: self.name,
            constructor: self.constructor,
            initializers,
            cleanups,
            context_slot: self.context_slot,
            dispose: self.dispose,
        }
    }
}

/// One level of a class hierarchy, with at most one setup and one teardown method.
#[derive_where(Clone, Debug)]
pub struct ClassLevel<T> {
    name: SmolStr,
    initialize: Option<LifecycleMethod<T>>,
    cleanup: Option<LifecycleMethod<T>>,
}

impl<T> ClassLevel<T> {
    /// Creates a level for the class `name` with no lifecycle methods.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            initialize: None,
            cleanup: None,
        }
    }

    /// Sets the per-test setup method declared at this level.
    pub fn initialize<F>(mut self, method: impl Into<SmolStr>, f: F) -> Self
    where
        F: Fn(&mut T) -> Result<(), Raised> + Send + Sync + 'static,
    {
        self.initialize = Some(LifecycleMethod::new(self.name.clone(), method, f));
        self
    }

    /// Sets the per-test teardown method declared at this level.
    pub fn cleanup<F>(mut self, method: impl Into<SmolStr>, f: F) -> Self
    where
        F: Fn(&mut T) -> Result<(), Raised> + Send + Sync + 'static,
    {
        self.cleanup = Some(LifecycleMethod::new(self.name.clone(), method, f));
        self
    }
}

/// Metadata for a test method.
#[derive_where(Debug)]
pub struct MethodDescriptor<T> {
    name: SmolStr,
    parameters: Vec<SmolStr>,
    timeout: Duration,
    expected_exception: Option<Arc<dyn ExpectedExceptionContract>>,
    body: DebugIgnore<Box<TestBodyFn<T>>>,
}

impl<T> MethodDescriptor<T> {
    /// Creates a descriptor for a test method with no parameters, no timeout and no expected
    /// exception.
    pub fn new<F>(name: impl Into<SmolStr>, body: F) -> Self
    where
        F: Fn(&mut T, &TestArguments) -> Result<(), Raised> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            timeout: Duration::ZERO,
            expected_exception: None,
            body: DebugIgnore(Box::new(body)),
        }
    }

    /// Declares the method's parameters. Invocations must supply exactly one argument per
    /// parameter.
    pub fn with_parameters<I>(mut self, parameters: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SmolStr>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    /// Declares a timeout. `Duration::ZERO` means no timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Declares that the method is expected to raise an error accepted by `contract`.
    pub fn with_expected_exception(
        mut self,
        contract: impl ExpectedExceptionContract + 'static,
    ) -> Self {
        self.expected_exception = Some(Arc::new(contract));
        self
    }

    /// The method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared parameter names.
    pub fn parameters(&self) -> &[SmolStr] {
        &self.parameters
    }

    /// The declared timeout, or `None` if unset.
    pub fn timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }

    /// The expected-exception contract, if one was declared.
    pub fn expected_exception(&self) -> Option<&dyn ExpectedExceptionContract> {
        self.expected_exception.as_deref()
    }

    pub(crate) fn call(&self, instance: &mut T, arguments: &TestArguments) -> Result<(), Raised> {
        (self.body)(instance, arguments)
    }
}
