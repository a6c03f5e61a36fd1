// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Criterion benchmark suite for the AgentMesh governance engines.
//!
//! Benchmarks cover:
//!
//! - Merkle-chained audit log append + inclusion proof
//! - Declarative policy evaluation (rule match + defaults fallback)
//! - Reward engine recalculation (multi-signal EMA scoring)
//! - Token-bucket rate limiting
//!
//! Run with: `cargo bench --bench audit_benchmark`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use agentmesh_core::audit::{AuditAction, AuditLog, NullSink};
use agentmesh_core::clock::SystemClock;
use agentmesh_core::policy::{
    ConditionOperator, Policy, PolicyCondition, PolicyContext, PolicyDefaults, PolicyEngine, PolicyRule, RuleAction, Value,
};
use agentmesh_core::rate_limiter::{RateLimitConfig, RateLimiter};
use agentmesh_core::reward::{Dimension, RewardConfig, RewardEngine};

// ---------------------------------------------------------------------------
// Audit log benchmark
// ---------------------------------------------------------------------------

/// Benchmark append + hash-chain computation and Merkle proof construction.
fn audit_log_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("audit_log");

    let log = AuditLog::new(Arc::new(NullSink));
    for index in 0..256 {
        log.append(
            1_700_000_000_000 + index,
            format!("did:agentmesh:agent-{index:04}"),
            AuditAction::PolicyDecision,
            None,
            serde_json::json!({"index": index}),
        )
        .unwrap();
    }

    group.bench_function("append_entry", |bencher| {
        bencher.iter(|| {
            let entry = log
                .append(
                    black_box(1_700_000_001_000),
                    black_box("did:agentmesh:bench-agent"),
                    black_box(AuditAction::CredentialIssued),
                    black_box(None),
                    black_box(serde_json::json!({"ttl": 900})),
                )
                .unwrap();
            black_box(entry);
        });
    });

    group.bench_function("verify_chain", |bencher| {
        bencher.iter(|| {
            let result = log.verify_chain();
            black_box(result);
        });
    });

    group.bench_function("merkle_proof_for_tail", |bencher| {
        bencher.iter(|| {
            let proof = log.proof_for(black_box(log.len() as u64 - 1));
            black_box(proof);
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Policy engine benchmark
// ---------------------------------------------------------------------------

/// Benchmark 1K iterations of rule evaluation against a policy set with
/// competing rules and a defaults fallback.
fn policy_engine_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("policy_engine");

    let policies = vec![
        Policy {
            name: "namespace-guard".to_string(),
            version: "1.0".to_string(),
            description: None,
            agents: vec!["*".to_string()],
            rules: vec![PolicyRule {
                name: "deny-quarantine".to_string(),
                priority: 10,
                condition: PolicyCondition {
                    field: "agent.namespace".to_string(),
                    operator: ConditionOperator::Eq,
                    value: Value::String("quarantine".to_string()),
                },
                action: RuleAction::Deny,
                enabled: true,
            }],
            defaults: PolicyDefaults::default(),
        },
        Policy {
            name: "high-trust-fast-path".to_string(),
            version: "1.0".to_string(),
            description: None,
            agents: vec!["*".to_string()],
            rules: vec![PolicyRule {
                name: "allow-high-trust".to_string(),
                priority: 20,
                condition: PolicyCondition {
                    field: "trust_score".to_string(),
                    operator: ConditionOperator::Gte,
                    value: Value::Number(800.0),
                },
                action: RuleAction::Allow,
                enabled: true,
            }],
            defaults: PolicyDefaults::default(),
        },
    ];

    let engine = PolicyEngine::new(policies);

    let mut context = PolicyContext::new();
    context.set("trust_score", Value::Number(650.0));
    context.set("delegation_depth", Value::Number(1.0));
    context.set("agent.namespace", Value::String("default".to_string()));

    group.bench_function("evaluate_defaults_fallback", |bencher| {
        bencher.iter(|| {
            let decision = engine.evaluate(black_box("did:agentmesh:agent-0001"), black_box(&context));
            black_box(decision);
        });
    });

    let mut high_trust_context = context.clone();
    high_trust_context.set("trust_score", Value::Number(900.0));

    group.bench_function("evaluate_rule_match", |bencher| {
        bencher.iter(|| {
            let decision = engine.evaluate(black_box("did:agentmesh:agent-0002"), black_box(&high_trust_context));
            black_box(decision);
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Reward engine benchmark
// ---------------------------------------------------------------------------

/// Benchmark score recalculation across a fleet of agents with accumulated
/// signal history.
fn reward_engine_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("reward_engine");

    let engine = RewardEngine::new(SystemClock, RewardConfig::default()).unwrap();
    for index in 0..64 {
        let agent_did = format!("did:agentmesh:agent-{index:04}");
        for _ in 0..20 {
            engine.record_signal(&agent_did, Dimension::PolicyCompliance, 0.9, "bench");
        }
    }

    group.bench_function("recalculate_score", |bencher| {
        bencher.iter(|| {
            let score = engine.recalculate_score(black_box("did:agentmesh:agent-0032"));
            black_box(score);
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Rate limiter benchmark
// ---------------------------------------------------------------------------

/// Benchmark the hot allow/check path across a fleet of distinct agents.
fn rate_limiter_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("rate_limiter");

    let limiter = RateLimiter::new(SystemClock, RateLimitConfig::default());
    for index in 0..32 {
        let agent_did = format!("did:agentmesh:agent-{index:04}");
        limiter.allow(&agent_did);
    }

    group.bench_function("allow_existing_agent", |bencher| {
        bencher.iter(|| {
            let allowed = limiter.allow(black_box("did:agentmesh:agent-0016"));
            black_box(allowed);
        });
    });

    group.bench_function("check_without_consuming", |bencher| {
        bencher.iter(|| {
            let result = limiter.check(black_box("did:agentmesh:agent-0016"));
            black_box(result);
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Criterion harness
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    audit_log_benchmark,
    policy_engine_benchmark,
    reward_engine_benchmark,
    rate_limiter_benchmark,
);

criterion_main!(benches);
