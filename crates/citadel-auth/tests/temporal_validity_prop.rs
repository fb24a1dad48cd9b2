//! Property: a credential whose `exp` has already elapsed fails `Verify`
//! with `TokenExpired`, for any configured lifetime (§8, "Temporal
//! validity"). Leeway is pinned to zero so the past/future boundary is
//! exact instead of smeared by clock-skew tolerance.

use citadel_auth::{KeyMaterial, SignOptions, TokenAuthority, TokenAuthorityConfig};
use citadel_errors::ErrorKind;
use citadel_types::Algorithm;
use proptest::prelude::*;

fn authority_with_ttl(ttl_secs: i64) -> TokenAuthority {
    let config = TokenAuthorityConfig {
        issuer: "prop-temporal".to_string(),
        audience: Vec::new(),
        algorithm: Algorithm::HS256,
        token_ttl_secs: ttl_secs,
        max_refresh_secs: 3600,
        leeway_secs: 0,
        kid: None,
        identity_key: None,
    };
    let key = KeyMaterial::Hmac { secret: vec![9u8; 128] };
    TokenAuthority::new(config, key).expect("authority should construct")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn expired_tokens_always_fail_verify_with_token_expired(
        ttl_secs in prop_oneof![-500i64..-2, 2i64..500],
    ) {
        let authority = authority_with_ttl(ttl_secs);
        let token = authority
            .sign("prop-subject", SignOptions::default())
            .expect("sign should succeed");

        let result = tokio_test::block_on(authority.verify(&token.compact));

        if ttl_secs < 0 {
            let err = result.expect_err("a token already past its exp must fail verify");
            prop_assert_eq!(err.kind(), ErrorKind::TokenExpired);
        } else {
            prop_assert!(result.is_ok(), "a token not yet past its exp must verify");
        }
    }
}
