//! Built-in condition, function, and register providers.
//!
//! Small scope-level primitives that most graphs want without writing custom
//! providers. Registered under well-known names by [`register_builtins`].

use crate::eval::EvalError;
use crate::invoke::FunctionError;
use crate::registry::{ConditionProvider, FunctionProvider, RegisterProvider, RegistryBuilder};
use crate::scope::{TransientValue, TransitionScope};
use pawl_graph::{ArgMap, StepId, Value};
use tracing::info;

fn text_arg<'a>(args: &'a ArgMap, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// `scope_defined`: true when `key` resolves in the combined scope.
pub struct ScopeDefined;

impl ConditionProvider for ScopeDefined {
    fn check(&self, scope: &TransitionScope, args: &ArgMap) -> Result<bool, EvalError> {
        let key = text_arg(args, "key")
            .ok_or_else(|| EvalError::malformed_args("scope_defined", "missing text argument 'key'"))?;
        Ok(scope.resolve(key).is_some())
    }
}

/// `scope_equals`: true when `key` resolves to exactly `value`.
///
/// An opaque transient value never equals anything; an unset key is simply
/// unequal, not an error.
pub struct ScopeEquals;

impl ConditionProvider for ScopeEquals {
    fn check(&self, scope: &TransitionScope, args: &ArgMap) -> Result<bool, EvalError> {
        let key = text_arg(args, "key")
            .ok_or_else(|| EvalError::malformed_args("scope_equals", "missing text argument 'key'"))?;
        let expected = args
            .get("value")
            .ok_or_else(|| EvalError::malformed_args("scope_equals", "missing argument 'value'"))?;
        Ok(scope.resolve(key).and_then(|r| r.as_value()) == Some(expected))
    }
}

/// `current_step_is`: true when the instance occupies `step`.
pub struct CurrentStepIs;

impl ConditionProvider for CurrentStepIs {
    fn check(&self, scope: &TransitionScope, args: &ArgMap) -> Result<bool, EvalError> {
        let step = text_arg(args, "step").ok_or_else(|| {
            EvalError::malformed_args("current_step_is", "missing text argument 'step'")
        })?;
        Ok(scope.injected().current_steps.contains(&StepId::from(step)))
    }
}

/// `caller_is`: true when the request carried exactly this caller identity.
pub struct CallerIs;

impl ConditionProvider for CallerIs {
    fn check(&self, scope: &TransitionScope, args: &ArgMap) -> Result<bool, EvalError> {
        let expected = text_arg(args, "caller")
            .ok_or_else(|| EvalError::malformed_args("caller_is", "missing text argument 'caller'"))?;
        Ok(scope.injected().caller.as_deref() == Some(expected))
    }
}

/// `set_scope`: write `value` to the persistent scope under `key`.
pub struct SetScope;

impl FunctionProvider for SetScope {
    fn execute(&self, scope: &mut TransitionScope, args: &ArgMap) -> Result<(), FunctionError> {
        let key = text_arg(args, "key")
            .ok_or_else(|| FunctionError::failed("set_scope", "missing text argument 'key'"))?
            .to_owned();
        let value = args
            .get("value")
            .cloned()
            .ok_or_else(|| FunctionError::failed("set_scope", "missing argument 'value'"))?;
        scope.set_persistent(key, value);
        Ok(())
    }
}

/// `stamp_caller`: record the caller identity in the persistent scope.
///
/// Writes under `key` (default `"caller"`); an anonymous request stamps null.
pub struct StampCaller;

impl FunctionProvider for StampCaller {
    fn execute(&self, scope: &mut TransitionScope, args: &ArgMap) -> Result<(), FunctionError> {
        let key = text_arg(args, "key").unwrap_or("caller").to_owned();
        let value = match scope.injected().caller.clone() {
            Some(caller) => Value::Text(caller),
            None => Value::Null,
        };
        scope.set_persistent(key, value);
        Ok(())
    }
}

/// `log_notice`: emit `message` on the info log. No scope effect.
pub struct LogNotice;

impl FunctionProvider for LogNotice {
    fn execute(&self, scope: &mut TransitionScope, args: &ArgMap) -> Result<(), FunctionError> {
        let message = text_arg(args, "message")
            .ok_or_else(|| FunctionError::failed("log_notice", "missing text argument 'message'"))?;
        info!("instance {}: {message}", scope.injected().instance.id);
        Ok(())
    }
}

/// `timestamp`: the attempt-start wall clock as an RFC 3339 string.
pub struct Timestamp;

impl RegisterProvider for Timestamp {
    fn compute(
        &self,
        _scope: &TransitionScope,
        _args: &ArgMap,
    ) -> Result<TransientValue, FunctionError> {
        Ok(TransientValue::Plain(Value::Text(
            chrono::Utc::now().to_rfc3339(),
        )))
    }
}

/// Register every built-in provider on `builder` under its well-known name.
pub fn register_builtins(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .condition("scope_defined", ScopeDefined)
        .condition("scope_equals", ScopeEquals)
        .condition("current_step_is", CurrentStepIs)
        .condition("caller_is", CallerIs)
        .function("set_scope", SetScope)
        .function("stamp_caller", StampCaller)
        .function("log_notice", LogNotice)
        .register("timestamp", Timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProviderRegistry;
    use crate::scope::{InjectedVars, PersistentScope};
    use pawl_graph::{ActionId, GraphRef, InstanceId, ProviderName, WorkflowName};
    use pawl_store::InstanceRecord;

    fn test_scope() -> TransitionScope {
        let mut record = InstanceRecord::new(InstanceId::new(1), WorkflowName::from("w"));
        record.current_steps.insert(StepId::from("review"));
        let injected = InjectedVars {
            instance: record.clone(),
            action: ActionId::from("go"),
            current_steps: record.current_steps.clone(),
            graph: GraphRef {
                name: WorkflowName::from("w"),
                digest: "0".repeat(64),
            },
            caller: Some("kim".to_owned()),
        };
        TransitionScope::new(PersistentScope::from_record(&record), injected)
    }

    fn args(pairs: &[(&str, Value)]) -> ArgMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn scope_defined_sees_both_scopes() {
        let mut scope = test_scope();
        scope.set_transient("t", 1);
        scope.set_persistent("p", 1);

        let check = |key: &str| {
            ScopeDefined
                .check(&scope, &args(&[("key", Value::from(key))]))
                .unwrap()
        };
        assert!(check("t"));
        assert!(check("p"));
        assert!(!check("absent"));
    }

    #[test]
    fn scope_defined_requires_key() {
        let err = ScopeDefined.check(&test_scope(), &ArgMap::new()).unwrap_err();
        assert!(matches!(err, EvalError::MalformedArgs { .. }));
    }

    #[test]
    fn scope_equals_compares_resolved_value() {
        let mut scope = test_scope();
        scope.set_persistent("state", "ready");
        scope.set_transient("state", "blocked");

        let equals = |expected: &str| {
            ScopeEquals
                .check(
                    &scope,
                    &args(&[("key", Value::from("state")), ("value", Value::from(expected))]),
                )
                .unwrap()
        };
        // Transient shadows persistent.
        assert!(equals("blocked"));
        assert!(!equals("ready"));
    }

    #[test]
    fn scope_equals_on_opaque_is_false() {
        let mut scope = test_scope();
        scope.set_transient("conn", TransientValue::opaque(42_u32));
        let passed = ScopeEquals
            .check(
                &scope,
                &args(&[("key", Value::from("conn")), ("value", Value::from(42))]),
            )
            .unwrap();
        assert!(!passed);
    }

    #[test]
    fn current_step_is_checks_injected_steps() {
        let scope = test_scope();
        let check = |step: &str| {
            CurrentStepIs
                .check(&scope, &args(&[("step", Value::from(step))]))
                .unwrap()
        };
        assert!(check("review"));
        assert!(!check("done"));
    }

    #[test]
    fn caller_is_matches_exactly() {
        let scope = test_scope();
        let check = |caller: &str| {
            CallerIs
                .check(&scope, &args(&[("caller", Value::from(caller))]))
                .unwrap()
        };
        assert!(check("kim"));
        assert!(!check("sam"));
    }

    #[test]
    fn set_scope_writes_persistent() {
        let mut scope = test_scope();
        SetScope
            .execute(
                &mut scope,
                &args(&[("key", Value::from("owner")), ("value", Value::from("kim"))]),
            )
            .unwrap();
        assert_eq!(scope.persistent("owner"), Some(&Value::from("kim")));
        assert!(scope.persistent_dirty());
    }

    #[test]
    fn stamp_caller_defaults_key() {
        let mut scope = test_scope();
        StampCaller.execute(&mut scope, &ArgMap::new()).unwrap();
        assert_eq!(scope.persistent("caller"), Some(&Value::from("kim")));

        StampCaller
            .execute(&mut scope, &args(&[("key", Value::from("actor"))]))
            .unwrap();
        assert_eq!(scope.persistent("actor"), Some(&Value::from("kim")));
    }

    #[test]
    fn timestamp_register_is_rfc3339() {
        let value = Timestamp.compute(&test_scope(), &ArgMap::new()).unwrap();
        let text = value.as_plain().and_then(Value::as_str).unwrap().to_owned();
        assert!(chrono::DateTime::parse_from_rfc3339(&text).is_ok());
    }

    #[test]
    fn builtins_register_under_well_known_names() {
        let registry = register_builtins(ProviderRegistry::builder()).build();
        assert!(registry.condition(&ProviderName::from("scope_equals")).is_some());
        assert!(registry.function(&ProviderName::from("set_scope")).is_some());
        assert!(registry.register(&ProviderName::from("timestamp")).is_some());
    }
}
