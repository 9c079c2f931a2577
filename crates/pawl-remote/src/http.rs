use crate::wire::{EvalRequest, EvalResponse};
use crate::{RemoteConfig, PROTOCOL_VERSION};
use pawl_core::{ConditionProvider, EvalError, TransitionScope};
use pawl_graph::{ArgMap, ProviderName, Value};
use std::collections::BTreeMap;
use std::io::Read;
use tracing::debug;

/// Condition provider that defers the verdict to a condition host.
///
/// POSTs a JSON [`EvalRequest`] to `{url}/conditions/{name}` and maps the
/// response: 200 carries the verdict, 404 means the host does not serve the
/// condition, 422 means it rejected the arguments. Transport faults and
/// timeouts are `RemoteUnavailable`, so a broken host aborts the attempt
/// instead of denying it.
pub struct HttpCondition {
    name: ProviderName,
    config: RemoteConfig,
    requires: Vec<String>,
    agent: ureq::Agent,
}

impl HttpCondition {
    pub fn new(name: impl Into<ProviderName>, config: RemoteConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .build()
            .new_agent();
        Self {
            name: name.into(),
            config,
            requires: Vec::new(),
            agent,
        }
    }

    /// Marshal the named transient key on every request. Keys not listed here
    /// never cross the wire.
    #[must_use]
    pub fn require(mut self, key: impl Into<String>) -> Self {
        self.requires.push(key.into());
        self
    }

    pub fn name(&self) -> &ProviderName {
        &self.name
    }

    fn project_transient(
        &self,
        scope: &TransitionScope,
    ) -> Result<BTreeMap<String, Value>, EvalError> {
        let mut projected = BTreeMap::new();
        for key in &self.requires {
            let Some(entry) = scope.transient(key) else {
                continue;
            };
            match entry.as_plain() {
                Some(value) => {
                    projected.insert(key.clone(), value.clone());
                }
                None => {
                    return Err(EvalError::remote_unavailable(
                        self.name.clone(),
                        format!("transient '{key}' is opaque and cannot cross the wire"),
                    ));
                }
            }
        }
        Ok(projected)
    }
}

impl ConditionProvider for HttpCondition {
    fn check(&self, scope: &TransitionScope, args: &ArgMap) -> Result<bool, EvalError> {
        let injected = scope.injected();
        let request = EvalRequest {
            args: args.clone(),
            transient: self.project_transient(scope)?,
            persistent: scope.persistent_values().clone(),
            instance: injected.instance.id,
            action: injected.action.clone(),
            current_steps: injected.current_steps.clone(),
            graph: injected.graph.clone(),
            caller: injected.caller.clone(),
        };
        let body = serde_json::to_vec(&request).map_err(|e| {
            EvalError::remote_unavailable(
                self.name.clone(),
                format!("request encoding failed: {e}"),
            )
        })?;

        let url = format!("{}/conditions/{}", self.config.url, self.name);
        debug!("POST {url} ({} bytes)", body.len());
        let mut req = self
            .agent
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-Pawl-Protocol", &PROTOCOL_VERSION.to_string());
        if let Some(ref token) = self.config.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        let response = match req.send(&body[..]) {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(404)) => {
                return Err(EvalError::ProviderNotFound(self.name.clone()));
            }
            Err(ureq::Error::StatusCode(422)) => {
                return Err(EvalError::malformed_args(
                    self.name.clone(),
                    "rejected by condition host (HTTP 422)",
                ));
            }
            Err(ureq::Error::StatusCode(code)) => {
                return Err(EvalError::remote_unavailable(
                    self.name.clone(),
                    format!("condition host returned HTTP {code}"),
                ));
            }
            Err(e) => {
                return Err(EvalError::remote_unavailable(self.name.clone(), e.to_string()));
            }
        };

        let mut reader = response.into_body().into_reader();
        let mut raw = Vec::new();
        reader
            .read_to_end(&mut raw)
            .map_err(|e| EvalError::remote_unavailable(self.name.clone(), e.to_string()))?;
        let verdict: EvalResponse = serde_json::from_slice(&raw).map_err(|e| {
            EvalError::remote_unavailable(self.name.clone(), format!("invalid response body: {e}"))
        })?;
        debug!(
            "remote condition '{}' returned {}",
            self.name, verdict.passes
        );
        Ok(verdict.passes)
    }
}
