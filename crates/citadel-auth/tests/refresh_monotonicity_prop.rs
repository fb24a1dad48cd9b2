//! Property: `Refresh` monotonicity across a configured `max_refresh_secs`
//! window (§8, "Refresh monotonicity"). Within the window it yields a new
//! token with a fresh token-id but the same subject and extra claims; once
//! the window has elapsed it fails with `SessionExpired`.
//!
//! These cases sleep in real time (there is no mock clock in this crate),
//! so both the window width and the case count are kept small.

use std::collections::HashMap;

use citadel_auth::{KeyMaterial, SignOptions, TokenAuthority, TokenAuthorityConfig};
use citadel_errors::ErrorKind;
use citadel_types::Algorithm;
use proptest::prelude::*;

fn authority_with_max_refresh(max_refresh_secs: i64) -> TokenAuthority {
    let config = TokenAuthorityConfig {
        issuer: "prop-refresh".to_string(),
        audience: Vec::new(),
        algorithm: Algorithm::HS256,
        token_ttl_secs: 1,
        max_refresh_secs,
        leeway_secs: 0,
        kid: None,
        identity_key: None,
    };
    let key = KeyMaterial::Hmac { secret: vec![5u8; 128] };
    TokenAuthority::new(config, key).expect("authority should construct")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn refresh_succeeds_strictly_inside_the_window_and_preserves_claims(
        max_refresh_secs in 2i64..5,
        elapsed_fraction in 0u64..90,
    ) {
        let authority = authority_with_max_refresh(max_refresh_secs);
        let mut extra = HashMap::new();
        extra.insert("role".to_string(), serde_json::json!("operator"));
        let opts = SignOptions {
            extra,
            ..SignOptions::default()
        };
        let token = authority
            .sign("prop-subject", opts)
            .expect("sign should succeed");
        let original = tokio_test::block_on(authority.verify(&token.compact))
            .expect("freshly signed token must verify");

        // Sleep to a point strictly inside (0, max_refresh_secs), in whole
        // seconds so it lines up with the authority's second-resolution
        // clock.
        let elapsed_secs = 1 + (elapsed_fraction as i64 * (max_refresh_secs - 2) / 90);
        std::thread::sleep(std::time::Duration::from_secs(elapsed_secs as u64));

        let refreshed = tokio_test::block_on(authority.refresh(&token.compact))
            .expect("refresh strictly inside the window must succeed");
        let new_claims = tokio_test::block_on(authority.verify(&refreshed.compact))
            .expect("freshly refreshed token must verify");

        prop_assert_ne!(new_claims.jti, original.jti);
        prop_assert_eq!(new_claims.sub.clone(), original.sub);
        prop_assert_eq!(new_claims.extra.clone(), original.extra);
        prop_assert!(new_claims.exp >= original.iat);
    }

    #[test]
    fn refresh_fails_with_session_expired_once_the_window_has_elapsed(
        max_refresh_secs in 1i64..3,
        overshoot in 1i64..3,
    ) {
        let authority = authority_with_max_refresh(max_refresh_secs);
        let token = authority
            .sign("prop-subject", SignOptions::default())
            .expect("sign should succeed");

        std::thread::sleep(std::time::Duration::from_secs((max_refresh_secs + overshoot) as u64));

        let err = tokio_test::block_on(authority.refresh(&token.compact))
            .expect_err("refresh past max_refresh_secs must fail");
        prop_assert_eq!(err.kind(), ErrorKind::SessionExpired);
    }
}
