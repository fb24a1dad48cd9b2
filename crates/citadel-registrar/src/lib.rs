#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **citadel-registrar** – advertises `(service, address, routing rule)`
//! to a Redis coordination store under a short-lived, periodically
//! renewed lease (§4.9).

use std::time::Duration;

use citadel_errors::{CitadelError, CitadelResult, ErrorKind};
use deadpool_redis::Pool;
use md5::{Digest, Md5};
use redis::AsyncCommands;

/// Configuration for a [`ServiceRegistrar`].
#[derive(Debug, Clone, Copy)]
pub struct ServiceRegistrarConfig {
    /// TTL attached to every key written for a registration.
    pub lease_ttl: Duration,
    /// Interval between keep-alive renewals. Should be comfortably
    /// shorter than `lease_ttl` so a single missed renewal does not
    /// cause deregistration.
    pub renew_interval: Duration,
}

impl Default for ServiceRegistrarConfig {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_secs(10),
            renew_interval: Duration::from_secs(3),
        }
    }
}

struct RegistrationKeys {
    rule_key: String,
    service_key: String,
    endpoint_key: String,
}

impl RegistrationKeys {
    fn for_service(service: &str, instance_id: &str) -> Self {
        Self {
            rule_key: format!("traefik/http/routers/{service}/rule"),
            service_key: format!("traefik/http/routers/{service}/service"),
            endpoint_key: format!("traefik/http/services/{service}/loadbalancer/servers/{instance_id}/url"),
        }
    }
}

/// A live registration: owns the keep-alive task and must be passed to
/// [`ServiceRegistrar::close`] to deregister promptly.
pub struct Registration {
    keys: RegistrationKeys,
    keep_alive: tokio::task::JoinHandle<()>,
}

/// Advertises service endpoints to a Redis-backed coordination store.
pub struct ServiceRegistrar {
    pool: Pool,
    config: ServiceRegistrarConfig,
}

impl ServiceRegistrar {
    /// Build a registrar over `pool`.
    pub fn new(pool: Pool, config: ServiceRegistrarConfig) -> Self {
        Self { pool, config }
    }

    /// Derive a stable instance id from `address` (an MD5 prefix), so a
    /// process restarting on the same address overwrites its previous
    /// registration instead of leaking a stale endpoint.
    pub fn instance_id(address: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(address.as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }

    /// Acquire a lease for `(service, address, rule)`, write the three
    /// routing keys under it, and start the keep-alive loop.
    #[tracing::instrument(skip(self), fields(service = %service))]
    pub async fn register(&self, service: &str, address: &str, rule: &str) -> CitadelResult<Registration> {
        let instance_id = Self::instance_id(address);
        let keys = RegistrationKeys::for_service(service, &instance_id);
        self.write_keys(&keys, address, service, rule).await?;
        tracing::info!(service = %service, %instance_id, "lease acquired and registration written");

        let pool = self.pool.clone();
        let renew_interval = self.config.renew_interval;
        let ttl_secs = self.config.lease_ttl.as_secs().max(1);
        let rule_key = keys.rule_key.clone();
        let service_key = keys.service_key.clone();
        let endpoint_key = keys.endpoint_key.clone();
        let service_name = service.to_string();
        let keep_alive = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(renew_interval);
            loop {
                ticker.tick().await;
                match pool.get().await {
                    Ok(mut conn) => {
                        for key in [&rule_key, &service_key, &endpoint_key] {
                            if let Err(err) = conn.expire::<_, ()>(key, ttl_secs as i64).await {
                                tracing::warn!(service = %service_name, error = %err, "lease renewal failed");
                            }
                        }
                        tracing::debug!(service = %service_name, "lease renewed");
                    }
                    Err(err) => {
                        tracing::warn!(service = %service_name, error = %err, "could not obtain connection to renew lease");
                    }
                }
            }
        });

        Ok(Registration { keys, keep_alive })
    }

    async fn write_keys(
        &self,
        keys: &RegistrationKeys,
        address: &str,
        service: &str,
        rule: &str,
    ) -> CitadelResult<()> {
        let mut conn = self.pool.get().await.map_err(wrap_redis_error)?;
        let ttl_secs = self.config.lease_ttl.as_secs().max(1);
        redis::pipe()
            .atomic()
            .set_ex(&keys.rule_key, rule, ttl_secs)
            .set_ex(&keys.service_key, service, ttl_secs)
            .set_ex(&keys.endpoint_key, address, ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(wrap_redis_error)
    }

    /// Stop the keep-alive loop and explicitly revoke the lease,
    /// deregistering promptly rather than waiting for the TTL.
    #[tracing::instrument(skip(self, registration))]
    pub async fn close(&self, registration: Registration) -> CitadelResult<()> {
        registration.keep_alive.abort();
        let mut conn = self.pool.get().await.map_err(wrap_redis_error)?;
        let keys = registration.keys;
        redis::pipe()
            .atomic()
            .del(&keys.rule_key)
            .del(&keys.service_key)
            .del(&keys.endpoint_key)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(wrap_redis_error)?;
        tracing::info!("registration revoked");
        Ok(())
    }
}

fn wrap_redis_error(err: impl std::error::Error + Send + Sync + 'static) -> CitadelError {
    CitadelError::new(ErrorKind::Network)
        .with_message("service registrar request failed")
        .with_cause(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_id_is_deterministic_for_the_same_address() {
        let a = ServiceRegistrar::instance_id("10.0.0.1:8080");
        let b = ServiceRegistrar::instance_id("10.0.0.1:8080");
        assert_eq!(a, b);
    }

    #[test]
    fn instance_id_differs_for_different_addresses() {
        let a = ServiceRegistrar::instance_id("10.0.0.1:8080");
        let b = ServiceRegistrar::instance_id("10.0.0.2:8080");
        assert_ne!(a, b);
    }

    #[test]
    fn registration_keys_match_the_coordination_store_layout() {
        let keys = RegistrationKeys::for_service("citadel-auth", "abc123");
        assert_eq!(keys.rule_key, "traefik/http/routers/citadel-auth/rule");
        assert_eq!(keys.service_key, "traefik/http/routers/citadel-auth/service");
        assert_eq!(
            keys.endpoint_key,
            "traefik/http/services/citadel-auth/loadbalancer/servers/abc123/url"
        );
    }
}
