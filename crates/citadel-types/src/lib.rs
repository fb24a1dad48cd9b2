#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **citadel-types** – Shared primitive data structures for the Citadel
//! token-authority and agent-execution substrate.
//!
//! The crate is dependency-light and sits at the bottom of the crate graph
//! so that every other crate can depend on it without causing cycles. It
//! intentionally makes no assumptions about cryptography, I/O or storage –
//! those concerns live in `citadel-auth`, `citadel-revocation` and friends.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

//─────────────────────────────
//  Safety constants
//─────────────────────────────

/// Maximum number of `extra` claim entries accepted on a single token.
pub const MAX_EXTRA_CLAIMS: usize = 64;

/// Maximum number of audience entries accepted on a single token.
pub const MAX_AUDIENCE_ENTRIES: usize = 32;

/// Hard minimum length (bytes) for an HMAC signing secret.
pub const MIN_HMAC_KEY_BYTES: usize = 64;

/// Recommended minimum length (bytes) for an HMAC signing secret; below this
/// construction succeeds but emits a warning.
pub const RECOMMENDED_HMAC_KEY_BYTES: usize = 128;

/// Hard maximum length (bytes) accepted for an HMAC signing secret.
pub const MAX_HMAC_KEY_BYTES: usize = 512;

/// Claim key under which the Login Guard marks refresh credentials.
pub const REFRESH_CLAIM_KEY: &str = "type";

/// Claim value used alongside [`REFRESH_CLAIM_KEY`] for refresh credentials.
pub const REFRESH_CLAIM_VALUE: &str = "refresh";

//─────────────────────────────
//  Subject / identifiers
//─────────────────────────────

/// Opaque identifier a credential is bound to. Usually a username or an
/// agent id; the Token Authority never interprets its contents.
pub type Subject = String;

/// Return the current time as a second-resolution Unix epoch.
///
/// Centralised so that tests can reason about a single time source and so
/// that no component reaches for `Instant`/`SystemTime` directly.
pub fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

//─────────────────────────────
//  Algorithm family
//─────────────────────────────

/// Signing algorithm family selected at Token Authority construction and
/// cached for the authority's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// HMAC-SHA256 (symmetric).
    HS256,
    /// HMAC-SHA384 (symmetric).
    HS384,
    /// HMAC-SHA512 (symmetric).
    HS512,
    /// RSA PKCS#1 v1.5 with SHA-256.
    RS256,
    /// RSA PKCS#1 v1.5 with SHA-384.
    RS384,
    /// RSA PKCS#1 v1.5 with SHA-512.
    RS512,
    /// ECDSA with SHA-256.
    ES256,
    /// ECDSA with SHA-384.
    ES384,
}

impl Algorithm {
    /// Whether this algorithm uses a single shared secret (HMAC family).
    pub fn is_symmetric(self) -> bool {
        matches!(self, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
    }

    /// Canonical short name used in the compact envelope header.
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::HS256 => "HS256",
            Algorithm::HS384 => "HS384",
            Algorithm::HS512 => "HS512",
            Algorithm::RS256 => "RS256",
            Algorithm::RS384 => "RS384",
            Algorithm::RS512 => "RS512",
            Algorithm::ES256 => "ES256",
            Algorithm::ES384 => "ES384",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header fields of the compact envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Algorithm identifier, e.g. `"HS256"`.
    pub alg: String,
    /// Optional key identifier, used for key rotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Token type, fixed to `"JWT"` for wire compatibility with generic
    /// bearer-token tooling.
    pub typ: String,
}

impl Header {
    /// Build a header for `alg`, with an optional key id.
    pub fn new(alg: Algorithm, kid: Option<String>) -> Self {
        Self {
            alg: alg.as_str().to_string(),
            kid,
            typ: "JWT".to_string(),
        }
    }
}

//─────────────────────────────
//  Claims / payload
//─────────────────────────────

/// Canonical claim set carried by every credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject – the identifier the credential is bound to.
    pub sub: Subject,
    /// Issuing authority name.
    pub iss: String,
    /// Ordered set of intended consumers (possibly empty).
    #[serde(default)]
    pub aud: Vec<String>,
    /// Issued-at timestamp (seconds since Unix epoch).
    pub iat: i64,
    /// Not-before timestamp (seconds since Unix epoch).
    pub nbf: i64,
    /// Absolute expiry timestamp (seconds since Unix epoch).
    pub exp: i64,
    /// Unique token identifier (128-bit), unique per issuance.
    pub jti: Uuid,
    /// Opaque extra claims (alternative identity key, token type, …).
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// Whether `extra` carries a `type=refresh` marker (§4.4 step 5).
    pub fn is_refresh_credential(&self) -> bool {
        self.extra
            .get(REFRESH_CLAIM_KEY)
            .and_then(|v| v.as_str())
            .map(|v| v == REFRESH_CLAIM_VALUE)
            .unwrap_or(false)
    }

    /// Resolve the effective subject, preferring `identity_key` within
    /// `extra` when configured and present (§4.3 Verify).
    pub fn resolve_subject(&self, identity_key: Option<&str>) -> Subject {
        match identity_key {
            Some(key) => match self.extra.get(key) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => self.sub.clone(),
            },
            None => self.sub.clone(),
        }
    }
}

/// Options overriding defaults when signing a new credential (§4.3 Sign).
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    /// Override the configured audience.
    pub audience: Option<Vec<String>>,
    /// Extra claims merged into the envelope.
    pub extra: HashMap<String, serde_json::Value>,
    /// Explicit expiry epoch, overriding the configured `Expired` duration.
    pub expires_at: Option<i64>,
    /// Explicit token id, overriding random generation (tests only).
    pub token_id: Option<Uuid>,
}

impl SignOptions {
    /// Mark the resulting credential as a refresh credential.
    pub fn as_refresh(mut self) -> Self {
        self.extra.insert(
            REFRESH_CLAIM_KEY.to_string(),
            serde_json::Value::String(REFRESH_CLAIM_VALUE.to_string()),
        );
        self
    }
}

/// The compact, signed bearer credential returned by `Sign`/`Refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Compact textual encoding: `header.payload.signature`.
    pub compact: String,
    /// Expiry epoch (seconds since Unix epoch), duplicated for convenience
    /// so callers don't need to re-parse the envelope.
    pub expires_at: i64,
}

impl Token {
    /// Wrap a compact string and its expiry.
    pub fn new(compact: String, expires_at: i64) -> Self {
        Self { compact, expires_at }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.compact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claims() -> Claims {
        Claims {
            sub: "alice".into(),
            iss: "citadel".into(),
            aud: vec![],
            iat: 1_000,
            nbf: 1_000,
            exp: 2_000,
            jti: Uuid::new_v4(),
            extra: HashMap::new(),
        }
    }

    #[test]
    fn resolves_default_subject_without_identity_key() {
        let claims = sample_claims();
        assert_eq!(claims.resolve_subject(None), "alice");
    }

    #[test]
    fn resolves_alternative_identity_key_when_present() {
        let mut claims = sample_claims();
        claims
            .extra
            .insert("user_id".into(), serde_json::Value::String("u-42".into()));
        assert_eq!(claims.resolve_subject(Some("user_id")), "u-42");
    }

    #[test]
    fn falls_back_to_subject_when_identity_key_missing() {
        let claims = sample_claims();
        assert_eq!(claims.resolve_subject(Some("user_id")), "alice");
    }

    #[test]
    fn stringifies_non_string_identity_values() {
        let mut claims = sample_claims();
        claims
            .extra
            .insert("user_id".into(), serde_json::Value::Number(42.into()));
        assert_eq!(claims.resolve_subject(Some("user_id")), "42");
    }

    #[test]
    fn detects_refresh_credentials() {
        let opts = SignOptions::default().as_refresh();
        assert_eq!(
            opts.extra.get(REFRESH_CLAIM_KEY).and_then(|v| v.as_str()),
            Some(REFRESH_CLAIM_VALUE)
        );
    }

    #[test]
    fn algorithm_display_matches_header_name() {
        assert_eq!(Algorithm::HS256.to_string(), "HS256");
        assert!(Algorithm::HS256.is_symmetric());
        assert!(!Algorithm::RS256.is_symmetric());
    }
}
