//! Key material for every supported algorithm family.
//!
//! A `KeyMaterial` value is algorithm-tagged rather than stored behind an
//! open trait hierarchy: the closed set of families (HMAC, RSA, ECDSA) is
//! known up front, so a tagged enum keeps construction and validation in
//! one place instead of scattering it across `impl` blocks.

use citadel_errors::{CitadelError, CitadelResult, ErrorKind};
use citadel_types::{Algorithm, MAX_HMAC_KEY_BYTES, MIN_HMAC_KEY_BYTES, RECOMMENDED_HMAC_KEY_BYTES};
use jsonwebtoken::{Algorithm as JwtAlgorithm, DecodingKey, EncodingKey};

/// Key material backing a [`crate::TokenAuthority`].
///
/// RSA and EC variants carry an optional private half: an authority built
/// with only a public key can verify credentials but not mint or refresh
/// them, matching the common deployment shape where a signing authority's
/// public key is distributed to downstream verifiers.
#[derive(Clone)]
pub enum KeyMaterial {
    /// Shared secret used for both signing and verification.
    Hmac {
        /// Raw secret bytes.
        secret: Vec<u8>,
    },
    /// RSA key pair, PEM-encoded.
    Rsa {
        /// Private key, required to sign.
        private_pem: Option<Vec<u8>>,
        /// Public key, required to verify.
        public_pem: Vec<u8>,
    },
    /// ECDSA key pair, PEM-encoded.
    Ec {
        /// Private key, required to sign.
        private_pem: Option<Vec<u8>>,
        /// Public key, required to verify.
        public_pem: Vec<u8>,
    },
}

impl KeyMaterial {
    /// Whether this key material can mint new credentials.
    pub fn can_sign(&self) -> bool {
        match self {
            KeyMaterial::Hmac { .. } => true,
            KeyMaterial::Rsa { private_pem, .. } => private_pem.is_some(),
            KeyMaterial::Ec { private_pem, .. } => private_pem.is_some(),
        }
    }

    /// Validate that this key material is consistent with `algorithm`,
    /// emitting a [`tracing::warn!`] when an HMAC secret is shorter than
    /// recommended but not short enough to reject outright.
    pub fn validate(&self, algorithm: Algorithm) -> CitadelResult<()> {
        match (self, algorithm.is_symmetric()) {
            (KeyMaterial::Hmac { secret }, true) => {
                if secret.len() < MIN_HMAC_KEY_BYTES {
                    return Err(CitadelError::new(ErrorKind::ConfigError).with_message(format!(
                        "HMAC secret is {} bytes, below the required minimum of {MIN_HMAC_KEY_BYTES}",
                        secret.len()
                    )));
                }
                if secret.len() > MAX_HMAC_KEY_BYTES {
                    return Err(CitadelError::new(ErrorKind::ConfigError).with_message(format!(
                        "HMAC secret is {} bytes, above the accepted maximum of {MAX_HMAC_KEY_BYTES}",
                        secret.len()
                    )));
                }
                if secret.len() < RECOMMENDED_HMAC_KEY_BYTES {
                    tracing::warn!(
                        secret_len = secret.len(),
                        recommended = RECOMMENDED_HMAC_KEY_BYTES,
                        "HMAC secret is shorter than recommended"
                    );
                }
                Ok(())
            }
            (KeyMaterial::Hmac { .. }, false) | ((KeyMaterial::Rsa { .. } | KeyMaterial::Ec { .. }), true) => {
                Err(CitadelError::new(ErrorKind::ConfigError)
                    .with_message("key material family does not match configured algorithm"))
            }
            (KeyMaterial::Rsa { .. }, false) | (KeyMaterial::Ec { .. }, false) => Ok(()),
        }
    }

    /// Build the `jsonwebtoken` encoding key, if this material can sign.
    pub fn encoding_key(&self) -> CitadelResult<Option<EncodingKey>> {
        let key = match self {
            KeyMaterial::Hmac { secret } => Some(EncodingKey::from_secret(secret)),
            KeyMaterial::Rsa {
                private_pem: Some(pem),
                ..
            } => Some(EncodingKey::from_rsa_pem(pem).map_err(wrap_key_error)?),
            KeyMaterial::Ec {
                private_pem: Some(pem),
                ..
            } => Some(EncodingKey::from_ec_pem(pem).map_err(wrap_key_error)?),
            KeyMaterial::Rsa { private_pem: None, .. } | KeyMaterial::Ec { private_pem: None, .. } => None,
        };
        Ok(key)
    }

    /// Build the `jsonwebtoken` decoding key, always available.
    pub fn decoding_key(&self) -> CitadelResult<DecodingKey> {
        match self {
            KeyMaterial::Hmac { secret } => Ok(DecodingKey::from_secret(secret)),
            KeyMaterial::Rsa { public_pem, .. } => {
                DecodingKey::from_rsa_pem(public_pem).map_err(wrap_key_error)
            }
            KeyMaterial::Ec { public_pem, .. } => {
                DecodingKey::from_ec_pem(public_pem).map_err(wrap_key_error)
            }
        }
    }
}

fn wrap_key_error(err: jsonwebtoken::errors::Error) -> CitadelError {
    CitadelError::new(ErrorKind::ConfigError)
        .with_message("failed to parse key material")
        .with_cause(err)
}

/// Map a [`citadel_types::Algorithm`] onto the `jsonwebtoken` equivalent.
pub fn jwt_algorithm(algorithm: Algorithm) -> JwtAlgorithm {
    match algorithm {
        Algorithm::HS256 => JwtAlgorithm::HS256,
        Algorithm::HS384 => JwtAlgorithm::HS384,
        Algorithm::HS512 => JwtAlgorithm::HS512,
        Algorithm::RS256 => JwtAlgorithm::RS256,
        Algorithm::RS384 => JwtAlgorithm::RS384,
        Algorithm::RS512 => JwtAlgorithm::RS512,
        Algorithm::ES256 => JwtAlgorithm::ES256,
        Algorithm::ES384 => JwtAlgorithm::ES384,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_hmac_secret() {
        let key = KeyMaterial::Hmac {
            secret: vec![0u8; 8],
        };
        assert!(key.validate(Algorithm::HS256).is_err());
    }

    #[test]
    fn accepts_recommended_hmac_secret() {
        let key = KeyMaterial::Hmac {
            secret: vec![0u8; RECOMMENDED_HMAC_KEY_BYTES],
        };
        assert!(key.validate(Algorithm::HS256).is_ok());
    }

    #[test]
    fn rejects_family_mismatch() {
        let key = KeyMaterial::Hmac {
            secret: vec![0u8; RECOMMENDED_HMAC_KEY_BYTES],
        };
        assert!(key.validate(Algorithm::RS256).is_err());
    }

    #[test]
    fn public_only_key_material_cannot_sign() {
        let key = KeyMaterial::Rsa {
            private_pem: None,
            public_pem: b"not-a-real-pem".to_vec(),
        };
        assert!(!key.can_sign());
    }
}
