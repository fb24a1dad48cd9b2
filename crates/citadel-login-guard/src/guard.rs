//! Login flow orchestration: failure tracking, lockout, and an optional
//! IP × endpoint composite rate-limiting dimension layered alongside it.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use citadel_errors::{CitadelError, CitadelResult, ErrorKind};
use citadel_types::now_epoch_secs;

use crate::storage::LoginGuardStorage;

/// Optional hook letting a deployment require a human-verification
/// challenge alongside credential checking (§9 Open Question: the
/// source's `VerifyCaptcha` stub is excluded as placeholder, but a
/// conforming implementation may expose a real hook instead). Never
/// wired to a hardcoded answer; callers supply a real verifier (e.g. an
/// HTTP round-trip to a third-party captcha service).
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// Verify `response` (the client-submitted captcha token), returning
    /// whether it is valid.
    async fn verify(&self, response: &str) -> bool;
}

/// Policy governing when a subject is locked out after repeated failures.
#[derive(Debug, Clone, Copy)]
pub struct LoginGuardConfig {
    /// Failures allowed within `failure_window_secs` before locking.
    pub max_failures: u32,
    /// Sliding window over which failures accumulate, in seconds.
    pub failure_window_secs: i64,
    /// How long a lock lasts once triggered, in seconds.
    pub lock_duration_secs: i64,
}

impl Default for LoginGuardConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            failure_window_secs: 15 * 60,
            lock_duration_secs: 30 * 60,
        }
    }
}

/// Optional composite dimension limiting requests by `ip`×`endpoint`
/// regardless of which subject they target (§4.4.1), layered alongside
/// per-subject lockout rather than in place of it.
#[derive(Debug, Clone, Copy)]
pub struct CompositeLimitConfig {
    /// Maximum requests allowed within `window_secs`.
    pub max_requests: u32,
    /// Sliding window, in seconds.
    pub window_secs: i64,
}

/// Outcome of a single login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Credentials were valid and the subject was not locked.
    Success,
    /// Credentials were invalid; the subject is not (yet) locked.
    Failure {
        /// Attempts remaining before the subject is locked.
        remaining_attempts: u32,
    },
    /// The subject is currently locked out.
    Locked {
        /// Seconds until the lock expires.
        retry_after_secs: i64,
    },
}

/// Tracks login failures per subject and enforces a temporary lockout
/// after too many within a sliding window (§4.4).
pub struct LoginGuard {
    storage: Arc<dyn LoginGuardStorage>,
    config: LoginGuardConfig,
    captcha: Option<Arc<dyn CaptchaVerifier>>,
}

impl LoginGuard {
    /// Build a guard over `storage` with `config`.
    pub fn new(storage: Arc<dyn LoginGuardStorage>, config: LoginGuardConfig) -> Self {
        Self {
            storage,
            config,
            captcha: None,
        }
    }

    /// Require `captcha` to verify the caller-submitted response before
    /// credential verification runs, on every call to
    /// [`LoginGuard::attempt_with_captcha`]. Plain `attempt` never
    /// consults this hook.
    pub fn with_captcha(mut self, captcha: Arc<dyn CaptchaVerifier>) -> Self {
        self.captcha = Some(captcha);
        self
    }

    /// Run a single login attempt for `subject`. `verify` performs the
    /// actual credential check (password hash comparison, external IdP
    /// round-trip, …) and is only invoked when `subject` is not currently
    /// locked, so a locked-out account never pays the cost of credential
    /// verification.
    #[tracing::instrument(skip(self, verify), fields(subject = %subject))]
    pub async fn attempt<F, Fut>(&self, subject: &str, verify: F) -> CitadelResult<LoginOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        if let Some(until) = self.storage.locked_until(subject).await? {
            return Ok(LoginOutcome::Locked {
                retry_after_secs: until - now_epoch_secs(),
            });
        }

        if verify().await {
            self.storage.reset_failures(subject).await?;
            return Ok(LoginOutcome::Success);
        }

        let count = self
            .storage
            .increment_failures(subject, self.config.failure_window_secs)
            .await?;
        if count >= self.config.max_failures {
            self.storage.lock(subject, self.config.lock_duration_secs).await?;
            tracing::warn!(subject = %subject, failures = count, "subject locked after repeated login failures");
            return Ok(LoginOutcome::Locked {
                retry_after_secs: self.config.lock_duration_secs,
            });
        }

        Ok(LoginOutcome::Failure {
            remaining_attempts: self.config.max_failures.saturating_sub(count),
        })
    }

    /// Like [`LoginGuard::attempt`], but first checks `captcha_response`
    /// against the configured [`CaptchaVerifier`] (if one was set via
    /// [`LoginGuard::with_captcha`]) before running `verify`. A missing
    /// response or a failed verification counts as a login failure the
    /// same way a wrong password would, so it also feeds the lockout
    /// counter; it never invokes `verify`.
    #[tracing::instrument(skip(self, verify), fields(subject = %subject))]
    pub async fn attempt_with_captcha<F, Fut>(
        &self,
        subject: &str,
        captcha_response: Option<&str>,
        verify: F,
    ) -> CitadelResult<LoginOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        let Some(captcha) = &self.captcha else {
            return self.attempt(subject, verify).await;
        };

        // A locked subject short-circuits before the captcha is even
        // checked, same as a plain `attempt` short-circuits before
        // `verify`; `attempt` below re-checks the lock, so the outcome
        // is identical either way.
        let captcha_ok = match captcha_response {
            Some(response) => captcha.verify(response).await,
            None => false,
        };
        if !captcha_ok {
            return self.attempt(subject, || async { false }).await;
        }

        self.attempt(subject, verify).await
    }

    /// Enforce the optional `ip`×`endpoint` composite dimension,
    /// independent of and in addition to per-subject lockout. Returns an
    /// error when the limit is exceeded so callers can short-circuit
    /// before ever touching subject-level state.
    #[tracing::instrument(skip(self))]
    pub async fn check_composite_limit(
        &self,
        ip: &str,
        endpoint: &str,
        limit: CompositeLimitConfig,
    ) -> CitadelResult<()> {
        let key = format!("composite:{ip}:{endpoint}");
        let count = self.storage.increment_counter(&key, limit.window_secs).await?;
        if count > limit.max_requests {
            return Err(CitadelError::new(ErrorKind::TooManyRequests)
                .with_message(format!("rate limit exceeded for {ip} on {endpoint}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryLoginGuardStorage;

    fn guard_with(config: LoginGuardConfig) -> LoginGuard {
        LoginGuard::new(Arc::new(MemoryLoginGuardStorage::new()), config)
    }

    #[tokio::test]
    async fn successful_attempt_resets_failure_count() {
        let guard = guard_with(LoginGuardConfig::default());
        let outcome = guard.attempt("alice", || async { true }).await.unwrap();
        assert_eq!(outcome, LoginOutcome::Success);
    }

    #[tokio::test]
    async fn repeated_failures_lock_the_subject() {
        let config = LoginGuardConfig {
            max_failures: 3,
            failure_window_secs: 300,
            lock_duration_secs: 300,
        };
        let guard = guard_with(config);
        for _ in 0..2 {
            let outcome = guard.attempt("bob", || async { false }).await.unwrap();
            assert!(matches!(outcome, LoginOutcome::Failure { .. }));
        }
        let outcome = guard.attempt("bob", || async { false }).await.unwrap();
        assert!(matches!(outcome, LoginOutcome::Locked { .. }));
    }

    #[tokio::test]
    async fn locked_subject_is_rejected_without_invoking_verify() {
        let config = LoginGuardConfig {
            max_failures: 1,
            failure_window_secs: 300,
            lock_duration_secs: 300,
        };
        let guard = guard_with(config);
        let _ = guard.attempt("carol", || async { false }).await.unwrap();
        let verify_called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = verify_called.clone();
        let outcome = guard
            .attempt("carol", || async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                true
            })
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Locked { .. }));
        assert!(!verify_called.load(std::sync::atomic::Ordering::SeqCst));
    }

    struct FixedCaptcha {
        accepted: &'static str,
    }

    #[async_trait]
    impl CaptchaVerifier for FixedCaptcha {
        async fn verify(&self, response: &str) -> bool {
            response == self.accepted
        }
    }

    #[tokio::test]
    async fn captcha_hook_blocks_verify_on_bad_response() {
        let guard = guard_with(LoginGuardConfig::default())
            .with_captcha(Arc::new(FixedCaptcha { accepted: "right" }));
        let verify_called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = verify_called.clone();
        let outcome = guard
            .attempt_with_captcha("dave", Some("wrong"), || async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                true
            })
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Failure { .. }));
        assert!(!verify_called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn captcha_hook_allows_verify_on_correct_response() {
        let guard = guard_with(LoginGuardConfig::default())
            .with_captcha(Arc::new(FixedCaptcha { accepted: "right" }));
        let outcome = guard
            .attempt_with_captcha("dave", Some("right"), || async { true })
            .await
            .unwrap();
        assert_eq!(outcome, LoginOutcome::Success);
    }

    #[tokio::test]
    async fn attempt_with_captcha_falls_back_to_plain_attempt_when_unconfigured() {
        let guard = guard_with(LoginGuardConfig::default());
        let outcome = guard
            .attempt_with_captcha("erin", None, || async { true })
            .await
            .unwrap();
        assert_eq!(outcome, LoginOutcome::Success);
    }

    #[tokio::test]
    async fn composite_limit_rejects_once_exceeded() {
        let guard = guard_with(LoginGuardConfig::default());
        let limit = CompositeLimitConfig {
            max_requests: 2,
            window_secs: 60,
        };
        guard.check_composite_limit("1.2.3.4", "/login", limit).await.unwrap();
        guard.check_composite_limit("1.2.3.4", "/login", limit).await.unwrap();
        let err = guard
            .check_composite_limit("1.2.3.4", "/login", limit)
            .await
            .expect_err("third request within window must be rejected");
        assert_eq!(err.kind(), citadel_errors::ErrorKind::TooManyRequests);
    }
}
