//! Operation gate: looks up the rule bound to an operation and evaluates it
//! before any business resolver runs. Unmapped operations are denied.

mod map;
mod rule;

pub use map::{
    load_gate_map_from_path, load_gate_map_from_reader, parse_gate_map_str, GateMap, GateMapFile,
};
pub use rule::{CompositeMode, Rule};

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_recursion::async_recursion;
use futures::FutureExt;
use schoolgate_audit::{AuditLevel, AuditLog};
use schoolgate_core_types::{Decision, ResourceId, Role, ValidationError};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::checker::PermissionChecker;
use crate::errors::{AuthzError, RuleError};
use crate::principal::Principal;

/// Deepest composite nesting evaluated before the rule is treated as broken.
pub const MAX_RULE_DEPTH: usize = 16;

pub const REASON_UNMAPPED: &str = "Operation is not mapped";
pub const REASON_INVALID_ARGUMENT: &str = "Invalid argument";
pub const REASON_INTERNAL: &str = "Internal authorization error";

pub struct Gatekeeper {
    map: Arc<GateMap>,
    checker: Arc<PermissionChecker>,
}

impl Gatekeeper {
    pub fn new(map: Arc<GateMap>, checker: Arc<PermissionChecker>) -> Self {
        Self { map, checker }
    }

    pub fn map(&self) -> &Arc<GateMap> {
        &self.map
    }

    pub fn checker(&self) -> &Arc<PermissionChecker> {
        &self.checker
    }

    fn audit(&self) -> &Arc<AuditLog> {
        self.checker.audit()
    }

    /// Evaluates the rule bound to `operation`.
    ///
    /// Never fails: malformed arguments, internal errors and panics inside
    /// evaluation all come back as denials.
    pub async fn evaluate(
        &self,
        operation: &str,
        args: &Value,
        principal: Option<&Principal>,
    ) -> Decision {
        let Some(rule) = self.map.get(operation) else {
            warn!(operation, "no gate rule for operation; denying");
            let decision = Decision::deny(REASON_UNMAPPED);
            self.audit_gate(AuditLevel::Warning, operation, principal, &decision, json!({}));
            return decision;
        };

        let outcome = AssertUnwindSafe(self.eval_rule(rule, operation, args, principal, 0))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(decision)) => {
                debug!(operation, allowed = decision.allowed, "gate evaluated");
                decision
            }
            Ok(Err(RuleError::Validation(err))) => {
                warn!(operation, error = %err, "rejected operation arguments");
                let decision = Decision::deny(REASON_INVALID_ARGUMENT);
                self.audit_gate(
                    AuditLevel::Warning,
                    operation,
                    principal,
                    &decision,
                    json!({ "error": err.to_string() }),
                );
                decision
            }
            Ok(Err(RuleError::Internal(message))) => {
                self.internal_failure(operation, principal, &message)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                self.internal_failure(operation, principal, &message)
            }
        }
    }

    /// Like [`evaluate`](Self::evaluate), collapsed into the uniform
    /// access-denied error.
    pub async fn guard(
        &self,
        operation: &str,
        args: &Value,
        principal: Option<&Principal>,
    ) -> Result<(), AuthzError> {
        if self.evaluate(operation, args, principal).await.allowed {
            Ok(())
        } else {
            Err(AuthzError::AccessDenied)
        }
    }

    /// Runs `resolver` only if the gate allows `operation`, then records the
    /// data access or modification it performed.
    pub async fn dispatch<F, Fut, T>(
        &self,
        operation: &str,
        args: &Value,
        principal: Option<&Principal>,
        resolver: F,
    ) -> Result<T, AuthzError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.guard(operation, args, principal).await?;
        let output = resolver().await;

        let actor = principal.map(Principal::actor);
        let resource_id = args.get("id").and_then(id_for_audit);
        if operation.starts_with("Mutation.") {
            self.audit()
                .data_modification(actor, operation, operation, resource_id, json!({}));
        } else {
            self.audit().data_access(actor, operation, resource_id);
        }
        Ok(output)
    }

    #[async_recursion]
    async fn eval_rule(
        &self,
        rule: &Rule,
        operation: &str,
        args: &Value,
        principal: Option<&Principal>,
        depth: usize,
    ) -> Result<Decision, RuleError> {
        if depth > MAX_RULE_DEPTH {
            return Err(RuleError::Internal(format!(
                "rule nesting exceeds {MAX_RULE_DEPTH} levels"
            )));
        }

        match rule {
            Rule::AllowAlways => {
                let decision = Decision::allow("Public operation");
                self.audit_gate(AuditLevel::Info, operation, principal, &decision, json!({}));
                Ok(decision)
            }
            Rule::DenyAlways => {
                let decision = Decision::deny("Operation is disabled");
                self.audit_gate(AuditLevel::Warning, operation, principal, &decision, json!({}));
                Ok(decision)
            }
            Rule::Authenticated => {
                let decision = if principal.is_some() {
                    Decision::allow("Authenticated")
                } else {
                    Decision::deny("No user provided")
                };
                let level = if decision.allowed {
                    AuditLevel::Info
                } else {
                    AuditLevel::Warning
                };
                self.audit_gate(level, operation, principal, &decision, json!({}));
                Ok(decision)
            }
            Rule::Permission { name } => Ok(self.checker.check_permission(principal, name).await),
            Rule::ResourceOwnership {
                id_arg,
                owner_role,
                owner_role_arg,
            } => {
                let resource = ResourceId::from_arg(id_arg, args.get(id_arg).unwrap_or(&Value::Null))?;
                let owner = match (owner_role, owner_role_arg) {
                    (Some(role), _) => *role,
                    (None, Some(arg)) => role_arg(arg, args)?,
                    (None, None) => {
                        return Err(RuleError::Internal(
                            "ownership rule without an owner role".into(),
                        ))
                    }
                };
                Ok(self.checker.check_resource_access(principal, resource, owner))
            }
            Rule::Composite { mode, rules } => {
                if rules.is_empty() {
                    let decision = Decision::deny("Empty composite rule");
                    self.audit_gate(AuditLevel::Warning, operation, principal, &decision, json!({}));
                    return Ok(decision);
                }
                let mut last = None;
                for child in rules {
                    let decision = self
                        .eval_rule(child, operation, args, principal, depth + 1)
                        .await?;
                    let stop = match mode {
                        CompositeMode::All => !decision.allowed,
                        CompositeMode::Any => decision.allowed,
                    };
                    if stop {
                        return Ok(decision);
                    }
                    last = Some(decision);
                }
                Ok(last.unwrap_or_else(|| Decision::deny("Empty composite rule")))
            }
        }
    }

    fn internal_failure(
        &self,
        operation: &str,
        principal: Option<&Principal>,
        message: &str,
    ) -> Decision {
        error!(operation, error = message, "rule evaluation failed; denying");
        let decision = Decision::deny(REASON_INTERNAL);
        self.audit().security_event(
            principal.map(Principal::actor),
            "gate_evaluation_failed",
            false,
            json!({ "operation": operation, "error": message }),
        );
        decision
    }

    fn audit_gate(
        &self,
        level: AuditLevel,
        operation: &str,
        principal: Option<&Principal>,
        decision: &Decision,
        mut details: Value,
    ) {
        if let Some(map) = details.as_object_mut() {
            map.insert("reason".into(), json!(decision.reason));
        }
        self.audit().authorization_at(
            level,
            principal.map(Principal::actor),
            "gate",
            operation,
            None,
            decision.allowed,
            details,
        );
    }
}

fn role_arg(arg: &str, args: &Value) -> Result<Role, ValidationError> {
    match args.get(arg) {
        None | Some(Value::Null) => Err(ValidationError::MissingArgument(arg.to_string())),
        Some(Value::String(raw)) => raw.parse(),
        Some(other) => Err(ValidationError::UnknownRole(other.to_string())),
    }
}

fn id_for_audit(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(raw) => Some(raw.clone()),
        _ => None,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic during rule evaluation".to_string()
    }
}
