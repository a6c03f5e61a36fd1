// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Declarative policy engine (C7): rule matching, priority ordering,
//! defaults fallback, and an optional Rego-style adapter seam.
//!
//! Open Question #2 resolution: the "agent-scoped YAML" and "priority-
//! sorted DSL" rule models from the original system are unified into one —
//! a [`Policy`] carries an `agents` filter, and [`PolicyEngine::evaluate`]
//! only considers rules from policies whose filter matches the caller
//! before the priority sort, preserving the observable evaluation order
//! (collect → sort by priority → first match → defaults).

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Matches,
}

/// A JSON-like scalar/sequence literal usable on either side of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
}

impl Value {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Evaluation context: a dot-addressable tree of values. Built by callers
/// from the caller's trust score, agent metadata, and the requested action.
#[derive(Debug, Clone, Default)]
pub struct PolicyContext {
    fields: HashMap<String, Value>,
}

impl PolicyContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: &str, value: Value) -> &mut Self {
        self.fields.insert(path.to_string(), value);
        self
    }

    /// Resolve a dot-notated path. Missing paths yield [`Value::Null`]; this
    /// crate stores context flat (keyed by the full dot path) rather than
    /// as a nested tree, so resolution is a direct lookup.
    pub fn resolve(&self, path: &str) -> &Value {
        self.fields.get(path).unwrap_or(&Value::Null)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCondition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
}

impl PolicyCondition {
    pub fn evaluate(&self, context: &PolicyContext) -> Result<bool, PolicyError> {
        let resolved = context.resolve(&self.field);
        if matches!(resolved, Value::Null) && self.operator != ConditionOperator::Ne {
            return Ok(false);
        }

        Ok(match self.operator {
            ConditionOperator::Eq => resolved == &self.value,
            ConditionOperator::Ne => resolved != &self.value,
            ConditionOperator::Gt => resolved.as_f64().zip(self.value.as_f64()).is_some_and(|(a, b)| a > b),
            ConditionOperator::Gte => resolved.as_f64().zip(self.value.as_f64()).is_some_and(|(a, b)| a >= b),
            ConditionOperator::Lt => resolved.as_f64().zip(self.value.as_f64()).is_some_and(|(a, b)| a < b),
            ConditionOperator::Lte => resolved.as_f64().zip(self.value.as_f64()).is_some_and(|(a, b)| a <= b),
            ConditionOperator::In => match &self.value {
                Value::List(items) => items.contains(resolved),
                _ => false,
            },
            ConditionOperator::NotIn => match &self.value {
                Value::List(items) => !items.contains(resolved),
                _ => true,
            },
            ConditionOperator::Matches => {
                let (Some(haystack), Some(pattern)) = (resolved.as_str(), self.value.as_str()) else {
                    return Ok(false);
                };
                let regex = Regex::new(pattern)
                    .map_err(|error| PolicyError::InvalidRegex(self.field.clone(), error.to_string()))?;
                regex.is_match(haystack)
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Deny,
    Warn,
    RequireApproval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub name: String,
    pub priority: i64,
    pub condition: PolicyCondition,
    pub action: RuleAction,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDefaults {
    pub min_trust_score: f64,
    pub max_delegation_depth: u32,
    pub allowed_namespaces: Vec<String>,
    pub require_handshake: bool,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            min_trust_score: 500.0,
            max_delegation_depth: 3,
            allowed_namespaces: vec!["*".to_string()],
            require_handshake: true,
        }
    }
}

/// `agents: [did|*]` — which callers this policy's rules apply to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    pub agents: Vec<String>,
    pub rules: Vec<PolicyRule>,
    pub defaults: PolicyDefaults,
}

impl Policy {
    pub fn targets(&self, agent_did: &str) -> bool {
        self.agents.iter().any(|entry| entry == "*" || entry == agent_did)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub action: Option<RuleAction>,
    pub policy_name: Option<String>,
    pub matched_rule: Option<String>,
    pub reason: String,
}

/// Adapter interface for an optional Rego/OPA backend, consulted only when
/// no DSL rule matched. DSL always wins when it matches.
pub trait RegoEvaluator: Send + Sync {
    fn evaluate(&self, query_path: &str, input: &PolicyContext) -> OpaDecision;
}

#[derive(Debug, Clone)]
pub struct OpaDecision {
    pub allowed: bool,
    pub error: Option<String>,
    pub source: String,
    pub evaluation_ms: u64,
}

/// Loads zero or more [`Policy`] documents and evaluates requests against
/// their combined rule set.
pub struct PolicyEngine {
    policies: Vec<Policy>,
    rego: Option<Box<dyn RegoEvaluator>>,
}

impl PolicyEngine {
    pub fn new(policies: Vec<Policy>) -> Self {
        Self { policies, rego: None }
    }

    pub fn with_rego_evaluator(mut self, evaluator: Box<dyn RegoEvaluator>) -> Self {
        self.rego = Some(evaluator);
        self
    }

    /// (1) Collect rules from policies targeting `agent_did`. (2) Sort by
    /// priority ascending (lower = higher precedence), ties broken by
    /// insertion order (a stable sort preserves this). (3) Return the first
    /// rule whose condition matches. (4) Otherwise fall back to the first
    /// targeting policy's defaults, then an optional Rego evaluator.
    pub fn evaluate(&self, agent_did: &str, context: &PolicyContext) -> Result<PolicyDecision, PolicyError> {
        let mut candidates: Vec<(&Policy, &PolicyRule)> = Vec::new();
        for policy in &self.policies {
            if !policy.targets(agent_did) {
                continue;
            }
            for rule in &policy.rules {
                if rule.enabled {
                    candidates.push((policy, rule));
                }
            }
        }
        candidates.sort_by_key(|(_, rule)| rule.priority);

        for (policy, rule) in &candidates {
            if rule.condition.evaluate(context)? {
                return Ok(PolicyDecision {
                    allowed: rule.action == RuleAction::Allow,
                    action: Some(rule.action),
                    policy_name: Some(policy.name.clone()),
                    matched_rule: Some(rule.name.clone()),
                    reason: format!("matched rule \"{}\" (priority {})", rule.name, rule.priority),
                });
            }
        }

        if let Some(policy) = self.policies.iter().find(|policy| policy.targets(agent_did)) {
            return Ok(self.apply_defaults(policy, context));
        }

        if let Some(rego) = &self.rego {
            let opa = rego.evaluate(agent_did, context);
            return Ok(PolicyDecision {
                allowed: opa.allowed,
                action: Some(if opa.allowed { RuleAction::Allow } else { RuleAction::Deny }),
                policy_name: Some(opa.source),
                matched_rule: None,
                reason: opa.error.unwrap_or_else(|| "rego evaluator decision".to_string()),
            });
        }

        Ok(PolicyDecision {
            allowed: true,
            action: Some(RuleAction::Allow),
            policy_name: None,
            matched_rule: None,
            reason: "no policy targets this agent; default allow".to_string(),
        })
    }

    fn apply_defaults(&self, policy: &Policy, context: &PolicyContext) -> PolicyDecision {
        let defaults = &policy.defaults;

        if let Value::Number(trust_score) = context.resolve("trust_score") {
            if *trust_score < defaults.min_trust_score {
                return PolicyDecision {
                    allowed: false,
                    action: Some(RuleAction::Deny),
                    policy_name: Some(policy.name.clone()),
                    matched_rule: None,
                    reason: format!("trust_score {trust_score} below min_trust_score {}", defaults.min_trust_score),
                };
            }
        }

        if let Value::Number(depth) = context.resolve("delegation_depth") {
            if *depth > defaults.max_delegation_depth as f64 {
                return PolicyDecision {
                    allowed: false,
                    action: Some(RuleAction::Deny),
                    policy_name: Some(policy.name.clone()),
                    matched_rule: None,
                    reason: format!("delegation_depth {depth} exceeds max_delegation_depth {}", defaults.max_delegation_depth),
                };
            }
        }

        if let Value::String(namespace) = context.resolve("agent.namespace") {
            let wildcard = defaults.allowed_namespaces.iter().any(|ns| ns == "*");
            if !wildcard && !defaults.allowed_namespaces.iter().any(|ns| ns == namespace) {
                return PolicyDecision {
                    allowed: false,
                    action: Some(RuleAction::Deny),
                    policy_name: Some(policy.name.clone()),
                    matched_rule: None,
                    reason: format!("namespace \"{namespace}\" not in allowed_namespaces"),
                };
            }
        }

        PolicyDecision {
            allowed: true,
            action: Some(RuleAction::Allow),
            policy_name: Some(policy.name.clone()),
            matched_rule: None,
            reason: "no rule matched; defaults permit".to_string(),
        }
    }
}
