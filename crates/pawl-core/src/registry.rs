//! Name-to-provider tables for conditions, functions, and registers.
//!
//! The registry is built once at startup and shared read-only across every
//! attempt; resolution is by [`ProviderName`]. Plain closures plug in through
//! the `*Fn` adapters.

use crate::eval::EvalError;
use crate::invoke::FunctionError;
use crate::scope::{TransientValue, TransitionScope};
use pawl_graph::{ArgMap, ProviderName};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A named boolean check consulted during condition evaluation.
///
/// Conditions read the scope; they never mutate it.
pub trait ConditionProvider: Send + Sync {
    fn check(&self, scope: &TransitionScope, args: &ArgMap) -> Result<bool, EvalError>;
}

/// A named side-effecting function run before or after a commit.
pub trait FunctionProvider: Send + Sync {
    fn execute(&self, scope: &mut TransitionScope, args: &ArgMap) -> Result<(), FunctionError>;
}

/// A named computation seeding one transient variable at scope-build time.
pub trait RegisterProvider: Send + Sync {
    fn compute(
        &self,
        scope: &TransitionScope,
        args: &ArgMap,
    ) -> Result<TransientValue, FunctionError>;
}

/// Closure adapter for [`ConditionProvider`].
pub struct ConditionFn<F>(pub F);

impl<F> ConditionProvider for ConditionFn<F>
where
    F: Fn(&TransitionScope, &ArgMap) -> Result<bool, EvalError> + Send + Sync,
{
    fn check(&self, scope: &TransitionScope, args: &ArgMap) -> Result<bool, EvalError> {
        (self.0)(scope, args)
    }
}

/// Closure adapter for [`FunctionProvider`].
pub struct FunctionFn<F>(pub F);

impl<F> FunctionProvider for FunctionFn<F>
where
    F: Fn(&mut TransitionScope, &ArgMap) -> Result<(), FunctionError> + Send + Sync,
{
    fn execute(&self, scope: &mut TransitionScope, args: &ArgMap) -> Result<(), FunctionError> {
        (self.0)(scope, args)
    }
}

/// Closure adapter for [`RegisterProvider`].
pub struct RegisterFn<F>(pub F);

impl<F> RegisterProvider for RegisterFn<F>
where
    F: Fn(&TransitionScope, &ArgMap) -> Result<TransientValue, FunctionError> + Send + Sync,
{
    fn compute(
        &self,
        scope: &TransitionScope,
        args: &ArgMap,
    ) -> Result<TransientValue, FunctionError> {
        (self.0)(scope, args)
    }
}

/// Immutable provider tables shared across attempts.
pub struct ProviderRegistry {
    conditions: BTreeMap<ProviderName, Arc<dyn ConditionProvider>>,
    functions: BTreeMap<ProviderName, Arc<dyn FunctionProvider>>,
    registers: BTreeMap<ProviderName, Arc<dyn RegisterProvider>>,
}

impl ProviderRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn condition(&self, name: &ProviderName) -> Option<&dyn ConditionProvider> {
        self.conditions.get(name).map(|p| &**p)
    }

    pub fn function(&self, name: &ProviderName) -> Option<&dyn FunctionProvider> {
        self.functions.get(name).map(|p| &**p)
    }

    pub fn register(&self, name: &ProviderName) -> Option<&dyn RegisterProvider> {
        self.registers.get(name).map(|p| &**p)
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("conditions", &self.conditions.len())
            .field("functions", &self.functions.len())
            .field("registers", &self.registers.len())
            .finish()
    }
}

/// Collects providers; registering a name twice keeps the later entry.
#[derive(Default)]
pub struct RegistryBuilder {
    conditions: BTreeMap<ProviderName, Arc<dyn ConditionProvider>>,
    functions: BTreeMap<ProviderName, Arc<dyn FunctionProvider>>,
    registers: BTreeMap<ProviderName, Arc<dyn RegisterProvider>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn condition(
        mut self,
        name: impl Into<ProviderName>,
        provider: impl ConditionProvider + 'static,
    ) -> Self {
        self.conditions.insert(name.into(), Arc::new(provider));
        self
    }

    pub fn condition_fn<F>(self, name: impl Into<ProviderName>, f: F) -> Self
    where
        F: Fn(&TransitionScope, &ArgMap) -> Result<bool, EvalError> + Send + Sync + 'static,
    {
        self.condition(name, ConditionFn(f))
    }

    pub fn function(
        mut self,
        name: impl Into<ProviderName>,
        provider: impl FunctionProvider + 'static,
    ) -> Self {
        self.functions.insert(name.into(), Arc::new(provider));
        self
    }

    pub fn function_fn<F>(self, name: impl Into<ProviderName>, f: F) -> Self
    where
        F: Fn(&mut TransitionScope, &ArgMap) -> Result<(), FunctionError> + Send + Sync + 'static,
    {
        self.function(name, FunctionFn(f))
    }

    pub fn register(
        mut self,
        name: impl Into<ProviderName>,
        provider: impl RegisterProvider + 'static,
    ) -> Self {
        self.registers.insert(name.into(), Arc::new(provider));
        self
    }

    pub fn register_fn<F>(self, name: impl Into<ProviderName>, f: F) -> Self
    where
        F: Fn(&TransitionScope, &ArgMap) -> Result<TransientValue, FunctionError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, RegisterFn(f))
    }

    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            conditions: self.conditions,
            functions: self.functions,
            registers: self.registers,
        }
    }
}
