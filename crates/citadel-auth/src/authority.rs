//! The Token Authority: Sign / Verify / Refresh / Revoke over a configured
//! algorithm and key material.

use std::sync::Arc;

use async_trait::async_trait;
use citadel_errors::{CitadelError, CitadelResult, ErrorKind};
use citadel_types::{
    now_epoch_secs, Algorithm, Claims, SignOptions, Subject, Token, MAX_AUDIENCE_ENTRIES,
    MAX_EXTRA_CLAIMS,
};
use jsonwebtoken::Validation;
use uuid::Uuid;

use crate::keys::{jwt_algorithm, KeyMaterial};

/// Contract a backing store must satisfy to participate in `Verify` and
/// `Revoke`. Kept in this crate (rather than in `citadel-revocation`) so
/// the Token Authority never depends on a concrete store implementation –
/// `citadel-revocation` depends on this trait instead, not the other way
/// around.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record `jti` as revoked until at least `expires_at`.
    async fn revoke(&self, jti: Uuid, expires_at: i64) -> CitadelResult<()>;

    /// Whether `jti` has been revoked.
    async fn is_revoked(&self, jti: Uuid) -> CitadelResult<bool>;
}

/// Static configuration of a [`TokenAuthority`], everything except key
/// material (kept separate so this type can be cloned and logged without
/// risk of leaking secrets).
#[derive(Debug, Clone)]
pub struct TokenAuthorityConfig {
    /// Value stamped into every credential's `iss` claim.
    pub issuer: String,
    /// Default audience used when `SignOptions::audience` is not set.
    pub audience: Vec<String>,
    /// Signing/verification algorithm.
    pub algorithm: Algorithm,
    /// Lifetime of a freshly signed credential, in seconds.
    pub token_ttl_secs: i64,
    /// Maximum time since a refresh credential's original issuance before
    /// `Refresh` refuses to extend it further.
    pub max_refresh_secs: i64,
    /// Clock-skew tolerance applied to `exp`/`nbf` validation, in seconds.
    pub leeway_secs: i64,
    /// Optional key id stamped into the envelope header, for rotation.
    pub kid: Option<String>,
    /// Optional alternative claim key used to resolve the effective
    /// subject (see [`Claims::resolve_subject`]).
    pub identity_key: Option<String>,
}

impl Default for TokenAuthorityConfig {
    fn default() -> Self {
        Self {
            issuer: "citadel".to_string(),
            audience: Vec::new(),
            algorithm: Algorithm::HS256,
            token_ttl_secs: 15 * 60,
            max_refresh_secs: 7 * 24 * 60 * 60,
            leeway_secs: 30,
            kid: None,
            identity_key: None,
        }
    }
}

/// Issues, verifies, refreshes and revokes bearer credentials for a single
/// algorithm and key.
pub struct TokenAuthority {
    config: TokenAuthorityConfig,
    encoding_key: Option<jsonwebtoken::EncodingKey>,
    decoding_key: jsonwebtoken::DecodingKey,
    jwt_algorithm: jsonwebtoken::Algorithm,
    revocation: Option<Arc<dyn RevocationStore>>,
}

impl TokenAuthority {
    /// Construct a new authority, validating `key_material` against
    /// `config.algorithm` up front.
    #[tracing::instrument(skip(key_material), fields(algorithm = %config.algorithm))]
    pub fn new(config: TokenAuthorityConfig, key_material: KeyMaterial) -> CitadelResult<Self> {
        key_material.validate(config.algorithm)?;
        let encoding_key = key_material.encoding_key()?;
        let decoding_key = key_material.decoding_key()?;
        if encoding_key.is_none() {
            tracing::info!("authority constructed with verify-only key material");
        }
        Ok(Self {
            jwt_algorithm: jwt_algorithm(config.algorithm),
            config,
            encoding_key,
            decoding_key,
            revocation: None,
        })
    }

    /// Attach a revocation store, enabling `Verify` rejection of revoked
    /// credentials and making `Revoke` available.
    pub fn with_revocation_store(mut self, store: Arc<dyn RevocationStore>) -> Self {
        self.revocation = Some(store);
        self
    }

    /// Resolve the effective subject for `claims` per the configured
    /// `identity_key`.
    pub fn subject_of(&self, claims: &Claims) -> Subject {
        claims.resolve_subject(self.config.identity_key.as_deref())
    }

    fn assemble_claims(&self, subject: Subject, iat: i64, opts: SignOptions) -> CitadelResult<Claims> {
        let aud = opts.audience.unwrap_or_else(|| self.config.audience.clone());
        if aud.len() > MAX_AUDIENCE_ENTRIES {
            return Err(CitadelError::new(ErrorKind::InvalidParam)
                .with_message(format!("audience exceeds {MAX_AUDIENCE_ENTRIES} entries")));
        }
        if opts.extra.len() > MAX_EXTRA_CLAIMS {
            return Err(CitadelError::new(ErrorKind::InvalidParam)
                .with_message(format!("extra claims exceed {MAX_EXTRA_CLAIMS} entries")));
        }
        let exp = opts
            .expires_at
            .unwrap_or_else(|| iat + self.config.token_ttl_secs);
        let jti = opts.token_id.unwrap_or_else(Uuid::new_v4);
        Ok(Claims {
            sub: subject,
            iss: self.config.issuer.clone(),
            aud,
            iat,
            nbf: iat,
            exp,
            jti,
            extra: opts.extra,
        })
    }

    fn encode_claims(&self, claims: Claims) -> CitadelResult<Token> {
        let encoding_key = self.encoding_key.as_ref().ok_or_else(|| {
            CitadelError::new(ErrorKind::NotImplemented)
                .with_message("authority holds no private key material and cannot sign")
        })?;
        let header = jsonwebtoken::Header {
            kid: self.config.kid.clone(),
            ..jsonwebtoken::Header::new(self.jwt_algorithm)
        };
        let exp = claims.exp;
        let compact = jsonwebtoken::encode(&header, &claims, encoding_key).map_err(wrap_encode_error)?;
        Ok(Token::new(compact, exp))
    }

    /// Mint a new credential for `subject` (§4.3 Sign).
    #[tracing::instrument(skip(self, opts), fields(subject = %subject))]
    pub fn sign(&self, subject: impl Into<Subject>, opts: SignOptions) -> CitadelResult<Token> {
        let now = now_epoch_secs();
        let claims = self.assemble_claims(subject.into(), now, opts)?;
        self.encode_claims(claims)
    }

    fn decode(&self, token: &str, validate_temporal: bool) -> CitadelResult<Claims> {
        let mut validation = Validation::new(self.jwt_algorithm);
        validation.leeway = self.config.leeway_secs.max(0) as u64;
        validation.validate_exp = validate_temporal;
        validation.validate_nbf = validate_temporal;
        validation.validate_aud = false;
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(map_decode_error)?;
        Ok(data.claims)
    }

    /// Verify `token`'s structure, signature, temporal validity and
    /// revocation status, returning its claims (§4.3 Verify).
    #[tracing::instrument(skip(self, token))]
    pub async fn verify(&self, token: &str) -> CitadelResult<Claims> {
        let claims = self.decode(token, true)?;
        if let Some(store) = &self.revocation {
            if store.is_revoked(claims.jti).await? {
                return Err(CitadelError::new(ErrorKind::TokenRevoked));
            }
        }
        Ok(claims)
    }

    /// Exchange any still-within-window credential for a new one,
    /// preserving the chain's original issuance instant so repeated
    /// refreshes cannot outlive `max_refresh_secs` (§4.3 Refresh). Whether
    /// a credential is meant to be used this way (vs. a short-lived access
    /// credential) is the caller's concern, not a precondition enforced
    /// here — see the Login Guard's `type=refresh` convention.
    ///
    /// Re-parses the token WITHOUT rejecting expiry: an expired credential
    /// is explicitly allowed to refresh as long as it is still within its
    /// `max_refresh_secs` window. Signature and revocation are still
    /// enforced.
    #[tracing::instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> CitadelResult<Token> {
        let claims = self.decode(refresh_token, false)?;
        let now = now_epoch_secs();
        if now.saturating_sub(claims.iat) > self.config.max_refresh_secs {
            return Err(CitadelError::new(ErrorKind::SessionExpired));
        }
        if let Some(store) = &self.revocation {
            if store.is_revoked(claims.jti).await? {
                return Err(CitadelError::new(ErrorKind::TokenRevoked));
            }
        }
        if let Some(store) = &self.revocation {
            let horizon = claims.iat + self.config.max_refresh_secs;
            if horizon > now {
                store.revoke(claims.jti, horizon).await?;
            }
        }
        let opts = SignOptions {
            audience: Some(claims.aud.clone()),
            extra: claims.extra.clone(),
            expires_at: None,
            token_id: None,
        };
        let new_claims = self.assemble_claims(claims.sub.clone(), claims.iat, opts)?;
        self.encode_claims(new_claims)
    }

    /// Revoke `token` ahead of its natural expiry (§4.2). The signature is
    /// still checked so callers cannot poison the revocation store with an
    /// arbitrary `jti`; expiry is not checked, so already-expired tokens
    /// can still be revoked defensively. The revocation horizon is
    /// `issued-at + max_refresh_secs`, not the token's own `exp` — this is
    /// what keeps a near-expiry token from being refreshed into a new
    /// session in the gap between verification and revocation.
    #[tracing::instrument(skip(self, token))]
    pub async fn revoke(&self, token: &str) -> CitadelResult<()> {
        let store = self.revocation.as_ref().ok_or_else(|| {
            CitadelError::new(ErrorKind::NotImplemented).with_message("no revocation store configured")
        })?;
        let claims = self.decode(token, false)?;
        let now = now_epoch_secs();
        let horizon = claims.iat + self.config.max_refresh_secs;
        if horizon <= now {
            return Ok(());
        }
        store.revoke(claims.jti, horizon).await
    }
}

fn wrap_encode_error(err: jsonwebtoken::errors::Error) -> CitadelError {
    CitadelError::new(ErrorKind::Internal)
        .with_message("failed to encode credential")
        .with_cause(err)
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> CitadelError {
    use citadel_errors::InvalidTokenReason::*;
    use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
    let kind = match err.kind() {
        JwtErrorKind::ExpiredSignature => ErrorKind::TokenExpired,
        JwtErrorKind::ImmatureSignature => ErrorKind::InvalidToken(NotYetValid),
        JwtErrorKind::InvalidSignature => ErrorKind::InvalidToken(BadSignature),
        JwtErrorKind::InvalidAlgorithm | JwtErrorKind::InvalidAlgorithmName | JwtErrorKind::MissingAlgorithm => {
            ErrorKind::InvalidToken(AlgorithmMismatch)
        }
        _ => ErrorKind::InvalidToken(Malformed),
    };
    CitadelError::new(kind).with_cause(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyMaterial;

    fn hmac_authority() -> TokenAuthority {
        let key = KeyMaterial::Hmac {
            secret: vec![7u8; 128],
        };
        TokenAuthority::new(TokenAuthorityConfig::default(), key).expect("authority should construct")
    }

    #[test]
    fn sign_then_decode_round_trips_subject() {
        let authority = hmac_authority();
        let token = authority
            .sign("alice", SignOptions::default())
            .expect("sign should succeed");
        let claims = authority.decode(&token.compact, true).expect("decode should succeed");
        assert_eq!(claims.sub, "alice");
    }

    #[tokio::test]
    async fn verify_accepts_freshly_signed_token() {
        let authority = hmac_authority();
        let token = authority
            .sign("bob", SignOptions::default())
            .expect("sign should succeed");
        let claims = authority.verify(&token.compact).await.expect("verify should succeed");
        assert_eq!(claims.sub, "bob");
    }

    #[tokio::test]
    async fn verify_rejects_tampered_signature() {
        let authority = hmac_authority();
        let token = authority
            .sign("carol", SignOptions::default())
            .expect("sign should succeed");
        let mut tampered = token.compact.clone();
        tampered.push('x');
        let err = authority.verify(&tampered).await.expect_err("tampered token must fail");
        assert_eq!(
            err.kind(),
            citadel_errors::ErrorKind::InvalidToken(citadel_errors::InvalidTokenReason::BadSignature)
        );
    }

    #[tokio::test]
    async fn refresh_preserves_original_issued_at() {
        let authority = hmac_authority();
        let refresh_token = authority
            .sign("erin", SignOptions::default().as_refresh())
            .expect("sign should succeed");
        let original_claims = authority
            .decode(&refresh_token.compact, true)
            .expect("decode should succeed");
        let refreshed = authority
            .refresh(&refresh_token.compact)
            .await
            .expect("refresh should succeed");
        let new_claims = authority
            .decode(&refreshed.compact, true)
            .expect("decode should succeed");
        assert_eq!(new_claims.iat, original_claims.iat);
        assert_ne!(new_claims.jti, original_claims.jti);
    }

    #[tokio::test]
    async fn refresh_succeeds_on_an_already_expired_token_within_window() {
        let mut config = TokenAuthorityConfig::default();
        config.token_ttl_secs = 0;
        config.max_refresh_secs = 3600;
        let key = KeyMaterial::Hmac {
            secret: vec![7u8; 128],
        };
        let authority = TokenAuthority::new(config, key).expect("authority should construct");
        let refresh_token = authority
            .sign("grace", SignOptions::default().as_refresh())
            .expect("sign should succeed");
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let err = authority.verify(&refresh_token.compact).await.expect_err("plain verify must see expiry");
        assert_eq!(err.kind(), citadel_errors::ErrorKind::TokenExpired);
        let refreshed = authority
            .refresh(&refresh_token.compact)
            .await
            .expect("refresh must accept an expired-but-in-window refresh token");
        let new_claims = authority.decode(&refreshed.compact, true).expect("decode should succeed");
        assert_eq!(new_claims.sub, "grace");
    }

    #[tokio::test]
    async fn refresh_accepts_a_plain_credential() {
        // §4.3 imposes no `type=refresh` precondition on Refresh; that
        // distinction belongs to the Login Guard, not the authority.
        let authority = hmac_authority();
        let token = authority
            .sign("frank", SignOptions::default())
            .expect("sign should succeed");
        let refreshed = authority
            .refresh(&token.compact)
            .await
            .expect("refresh of a plain credential must succeed");
        let new_claims = authority.decode(&refreshed.compact, true).expect("decode should succeed");
        assert_eq!(new_claims.sub, "frank");
    }

    #[tokio::test]
    async fn revocation_horizon_uses_max_refresh_not_natural_expiry() {
        let mut config = TokenAuthorityConfig::default();
        config.token_ttl_secs = 1;
        config.max_refresh_secs = 3600;
        let key = KeyMaterial::Hmac {
            secret: vec![7u8; 128],
        };
        let authority = TokenAuthority::new(config, key)
            .expect("authority should construct")
            .with_revocation_store(Arc::new(super::test_support::InMemoryRevocationStore::default()));
        let token = authority
            .sign("heidi", SignOptions::default())
            .expect("sign should succeed");
        authority.revoke(&token.compact).await.expect("revoke should succeed");
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        // The token's own exp (1s) has long passed, but the revocation
        // horizon is iat + max_refresh_secs (1h); it must still be revoked.
        let err = authority
            .verify(&token.compact)
            .await
            .expect_err("token must still read as revoked well past its natural exp");
        assert_eq!(err.kind(), citadel_errors::ErrorKind::TokenRevoked);
    }

    #[tokio::test]
    async fn revoke_of_an_already_past_horizon_token_is_a_no_op_success() {
        let mut config = TokenAuthorityConfig::default();
        config.token_ttl_secs = 0;
        config.max_refresh_secs = 0;
        let key = KeyMaterial::Hmac {
            secret: vec![7u8; 128],
        };
        let authority = TokenAuthority::new(config, key)
            .expect("authority should construct")
            .with_revocation_store(Arc::new(super::test_support::InMemoryRevocationStore::default()));
        let token = authority
            .sign("ivan", SignOptions::default())
            .expect("sign should succeed");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        authority
            .revoke(&token.compact)
            .await
            .expect("revoke past its own horizon must succeed without a store write");
    }
}

#[cfg(test)]
mod test_support {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use citadel_errors::CitadelResult;
    use uuid::Uuid;

    use crate::authority::RevocationStore;

    /// Minimal in-memory [`RevocationStore`] used only by this crate's own
    /// unit tests; the real implementations live in `citadel-revocation`.
    #[derive(Default)]
    pub struct InMemoryRevocationStore {
        entries: Mutex<std::collections::HashMap<Uuid, i64>>,
    }

    #[async_trait]
    impl RevocationStore for InMemoryRevocationStore {
        async fn revoke(&self, jti: Uuid, expires_at: i64) -> CitadelResult<()> {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries.entry(jti).or_insert(expires_at);
            *entry = (*entry).max(expires_at);
            Ok(())
        }

        async fn is_revoked(&self, jti: Uuid) -> CitadelResult<bool> {
            let entries = self.entries.lock().unwrap();
            Ok(entries
                .get(&jti)
                .map(|exp| *exp > citadel_types::now_epoch_secs())
                .unwrap_or(false))
        }
    }
}
