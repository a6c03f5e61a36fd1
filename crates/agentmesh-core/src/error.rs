// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Error taxonomy for every governance sub-system.
//!
//! Each kind below is a [`thiserror::Error`] enum rather than a single
//! catch-all type, so callers can match on the failure mode instead of
//! parsing a message string. Boundary validation errors (malformed input)
//! surface immediately; engine-internal errors are recovered locally where
//! the component design says so.

use thiserror::Error;

/// Errors raised while constructing or mutating an [`crate::identity::AgentIdentity`],
/// and while encoding/decoding JWK material.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("agent name must not be empty")]
    EmptyName,
    #[error("sponsor email \"{0}\" is not a valid address")]
    InvalidSponsorEmail(String),
    #[error("public key must not be empty")]
    EmptyPublicKey,
    #[error("invalid DID format: \"{0}\"")]
    InvalidDid(String),
    #[error("parent DID \"{0}\" is not a valid did:mesh identifier")]
    InvalidParentDid(String),
    #[error("private key not available")]
    PrivateKeyUnavailable,
    #[error("unsupported key type: \"{0}\" (expected OKP)")]
    UnsupportedKeyType(String),
    #[error("unsupported curve: \"{0}\" (expected Ed25519)")]
    UnsupportedCurve(String),
    #[error("JWK is missing required field \"{0}\"")]
    MissingJwkField(String),
    #[error("invalid base64url in field \"{0}\"")]
    InvalidBase64(String),
    #[error("JWK set is missing the \"keys\" array")]
    MissingJwksKeys,
    #[error("JWK set contains no keys")]
    EmptyJwks,
    #[error("no key found in JWK set with kid \"{0}\"")]
    KidNotFound(String),
    #[error("no such identity: \"{0}\"")]
    NotFound(String),
}

/// Errors raised while issuing, validating, or rotating a bearer credential.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("unknown credential token")]
    UnknownToken,
    #[error("credential has expired")]
    Expired,
    #[error("credential has been revoked")]
    Revoked,
    #[error("requested ttl_seconds must be greater than zero")]
    InvalidTtl,
    #[error("requested scopes {0:?} are not a subset of owner capabilities {1:?}")]
    ScopesExceedCapabilities(Vec<String>, Vec<String>),
}

/// Errors raised while building or extending a [`crate::scope_chain::ScopeChain`].
#[derive(Debug, Error)]
pub enum DelegationError {
    #[error("delegated capabilities {0:?} are not a subset of parent capabilities {1:?}")]
    CapabilityWidening(Vec<String>, Vec<String>),
    #[error("link_hash does not match the recomputed hash at depth {0}")]
    HashMismatch(u32),
    #[error("signature verification failed for the link at depth {0}")]
    InvalidSignature(u32),
    #[error("link depth {found} does not follow expected depth {expected}")]
    DepthMismatch { expected: u32, found: u32 },
    #[error("parent_did \"{found}\" does not match the previous link's child_did \"{expected}\"")]
    ParentMismatch { expected: String, found: String },
    #[error("previous_link_hash does not match the preceding link's hash")]
    PreviousHashMismatch,
    #[error("root link must have depth 0 and no previous_link_hash")]
    InvalidRootLink,
    #[error(transparent)]
    DepthExceeded(#[from] DelegationDepthError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Raised when a scope chain would grow past its configured `max_depth`.
#[derive(Debug, Error)]
#[error("chain depth {depth} would exceed max_depth {max_depth}")]
pub struct DelegationDepthError {
    pub depth: u32,
    pub max_depth: u32,
}

/// Errors raised during the trust handshake protocol.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("peer DID is empty or malformed: \"{0}\"")]
    MalformedDid(String),
    #[error("handshake timed out after {0}ms")]
    Timeout(u64),
    #[error("handshake signature is invalid")]
    InvalidSignature,
    #[error("nonce timestamp skew of {0}s exceeds the allowed window")]
    NonceSkew(i64),
    #[error("peer \"{0}\" is revoked")]
    PeerRevoked(String),
    #[error("peer trust score {actual} is below the required {required}")]
    InsufficientTrust { actual: u32, required: u32 },
    #[error("peer is missing required capability \"{0}\"")]
    MissingCapability(String),
    #[error("challenge \"{0}\" is unknown or has already been consumed")]
    UnknownChallenge(String),
    #[error("public key in response does not match the registered key for \"{0}\"")]
    KeyMismatch(String),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Errors raised while loading or evaluating policy rules.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("malformed rule \"{0}\": {1}")]
    MalformedRule(String, String),
    #[error("invalid regex in condition for rule \"{0}\": {1}")]
    InvalidRegex(String, String),
    #[error("rule \"{0}\" has conflicting enable flags")]
    ConflictingFlags(String),
}

/// Errors raised by the reward/scoring engine.
#[derive(Debug, Error)]
pub enum TrustError {
    #[error("score {0} is out of range [0, 1000]")]
    ScoreOutOfRange(f64),
    #[error("dimension weights sum to {0}, expected 1.0 (±1e-9)")]
    InvalidWeightSum(f64),
    #[error("unknown dimension \"{0}\"")]
    UnknownDimension(String),
}

/// Errors raised by the Merkle-chained audit log.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to canonicalize audit entry: {0}")]
    Canonicalization(String),
    #[error("merkle proof verification failed")]
    ProofInvalid,
    #[error("chain broken at entry {0}: {1}")]
    ChainBroken(usize, String),
    #[error("persistence sink failed on audit append: {0}")]
    SinkFailed(String),
}

/// Errors raised by transport adapters consumed but not implemented here.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("protocol decode error: {0}")]
    Decode(String),
}
