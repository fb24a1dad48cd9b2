//! A Revocation Store that revokes nothing. Useful for local development
//! and for Token Authority configurations that rely on short credential
//! lifetimes alone instead of explicit revocation.

use async_trait::async_trait;
use citadel_auth::RevocationStore;
use citadel_errors::CitadelResult;
use uuid::Uuid;

/// Always reports credentials as not revoked; `revoke` is a logged no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpRevocationStore;

#[async_trait]
impl RevocationStore for NoOpRevocationStore {
    async fn revoke(&self, jti: Uuid, _expires_at: i64) -> CitadelResult<()> {
        tracing::warn!(%jti, "revoke requested against a no-op revocation store; ignoring");
        Ok(())
    }

    async fn is_revoked(&self, _jti: Uuid) -> CitadelResult<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn never_reports_revoked() {
        let store = NoOpRevocationStore;
        let jti = Uuid::new_v4();
        store.revoke(jti, 0).await.unwrap();
        assert!(!store.is_revoked(jti).await.unwrap());
    }
}
