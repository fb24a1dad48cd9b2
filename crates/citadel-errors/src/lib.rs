#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **citadel-errors** – the closed error taxonomy shared by the Token
//! Authority and the Agent Execution Substrate.
//!
//! Errors are values, never exceptions or panics: every fallible public
//! operation in the workspace returns `Result<T, CitadelError>`. Each error
//! carries a numeric code (`AABBCCC`: service / category / sequence), an
//! HTTP projection, an RPC (gRPC-style) projection, and bilingual messages,
//! following the registry-table convention used across this codebase for
//! other process-wide, write-once-at-init tables.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Sub-reason attached to [`ErrorKind::InvalidToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidTokenReason {
    /// The compact encoding could not be parsed (wrong segment count,
    /// non-base64url characters, padding present).
    Malformed,
    /// Signature verification failed.
    BadSignature,
    /// `not-before` is in the future.
    NotYetValid,
    /// The envelope's algorithm header does not match the configured one.
    AlgorithmMismatch,
}

impl InvalidTokenReason {
    fn as_str(self) -> &'static str {
        match self {
            InvalidTokenReason::Malformed => "malformed",
            InvalidTokenReason::BadSignature => "bad-signature",
            InvalidTokenReason::NotYetValid => "not-yet-valid",
            InvalidTokenReason::AlgorithmMismatch => "algorithm-mismatch",
        }
    }
}

/// The closed taxonomy of error kinds shared by every component in the
/// workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A caller-supplied parameter was empty, malformed or out of range.
    InvalidParam,
    /// Opaque authentication failure (wrong credentials, unknown subject).
    Unauthorized,
    /// Credential failed structural or cryptographic validation.
    InvalidToken(InvalidTokenReason),
    /// Credential's temporal claims place it in the past.
    TokenExpired,
    /// Credential has been recorded in the revocation store.
    TokenRevoked,
    /// Credential is outside its refresh window (`MaxRefresh` elapsed).
    SessionExpired,
    /// Subject is locked out of login after repeated failures.
    TooManyRequests,
    /// Subject's account has been administratively disabled.
    AccountDisabled,
    /// Caller lacks permission for the requested operation.
    PermissionDenied,
    /// Requested resource does not exist.
    NotFound,
    /// Resource already exists (idempotency conflict).
    AlreadyExists,
    /// Acquiring a pooled resource exceeded its deadline.
    PoolTimeout,
    /// The pool has been closed and accepts no further acquisitions.
    PoolClosed,
    /// A generic operation exceeded its deadline (not pool-specific).
    Timeout,
    /// Configuration defect detected at construction time.
    ConfigError,
    /// The operation is not supported in the current configuration.
    NotImplemented,
    /// Underlying data-store failure.
    Database,
    /// Underlying network failure.
    Network,
    /// Unclassified internal failure; the cause is wrapped when available.
    Internal,
}

impl ErrorKind {
    /// Stable `AABBCCC` numeric code: service `10`, two-digit category,
    /// three-digit sequence within the category.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidParam => "1001001",
            ErrorKind::Unauthorized => "1002001",
            ErrorKind::InvalidToken(InvalidTokenReason::Malformed) => "1003001",
            ErrorKind::InvalidToken(InvalidTokenReason::BadSignature) => "1003002",
            ErrorKind::InvalidToken(InvalidTokenReason::NotYetValid) => "1003003",
            ErrorKind::InvalidToken(InvalidTokenReason::AlgorithmMismatch) => "1003004",
            ErrorKind::TokenExpired => "1003005",
            ErrorKind::TokenRevoked => "1003006",
            ErrorKind::SessionExpired => "1003007",
            ErrorKind::TooManyRequests => "1004001",
            ErrorKind::AccountDisabled => "1004002",
            ErrorKind::PermissionDenied => "1005001",
            ErrorKind::NotFound => "1006001",
            ErrorKind::AlreadyExists => "1006002",
            ErrorKind::PoolTimeout => "1007001",
            ErrorKind::PoolClosed => "1007002",
            ErrorKind::Timeout => "1007003",
            ErrorKind::ConfigError => "1008001",
            ErrorKind::NotImplemented => "1008002",
            ErrorKind::Database => "1009001",
            ErrorKind::Network => "1009002",
            ErrorKind::Internal => "1009999",
        }
    }

    /// HTTP status code projection, shared by both the HTTP and RPC planes'
    /// lookup (the RPC projection further maps this through
    /// [`ErrorKind::rpc_status`]).
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::InvalidParam => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::InvalidToken(_) => 401,
            ErrorKind::TokenExpired => 401,
            ErrorKind::TokenRevoked => 401,
            ErrorKind::SessionExpired => 401,
            ErrorKind::TooManyRequests => 429,
            ErrorKind::AccountDisabled => 403,
            ErrorKind::PermissionDenied => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyExists => 409,
            ErrorKind::PoolTimeout => 408,
            ErrorKind::PoolClosed => 503,
            ErrorKind::Timeout => 408,
            ErrorKind::ConfigError => 500,
            ErrorKind::NotImplemented => 501,
            ErrorKind::Database => 500,
            ErrorKind::Network => 502,
            ErrorKind::Internal => 500,
        }
    }

    /// RPC (gRPC-style) status projection, derived independently from
    /// [`ErrorKind::http_status`] but from the same category table so both
    /// planes always agree on which category an error belongs to.
    pub fn rpc_status(self) -> &'static str {
        match self {
            ErrorKind::InvalidParam => "INVALID_ARGUMENT",
            ErrorKind::Unauthorized => "UNAUTHENTICATED",
            ErrorKind::InvalidToken(_) => "UNAUTHENTICATED",
            ErrorKind::TokenExpired => "UNAUTHENTICATED",
            ErrorKind::TokenRevoked => "UNAUTHENTICATED",
            ErrorKind::SessionExpired => "UNAUTHENTICATED",
            ErrorKind::TooManyRequests => "RESOURCE_EXHAUSTED",
            ErrorKind::AccountDisabled => "PERMISSION_DENIED",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::PoolTimeout => "DEADLINE_EXCEEDED",
            ErrorKind::PoolClosed => "UNAVAILABLE",
            ErrorKind::Timeout => "DEADLINE_EXCEEDED",
            ErrorKind::ConfigError => "INTERNAL",
            ErrorKind::NotImplemented => "UNIMPLEMENTED",
            ErrorKind::Database => "INTERNAL",
            ErrorKind::Network => "UNAVAILABLE",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    /// Default English message. Use [`CitadelError::message`] for the
    /// effective message, which honours an override if one was set.
    pub fn default_message_en(self) -> &'static str {
        match self {
            ErrorKind::InvalidParam => "invalid parameter",
            ErrorKind::Unauthorized => "invalid credentials",
            ErrorKind::InvalidToken(reason) => match reason {
                InvalidTokenReason::Malformed => "malformed token",
                InvalidTokenReason::BadSignature => "invalid token signature",
                InvalidTokenReason::NotYetValid => "token not yet valid",
                InvalidTokenReason::AlgorithmMismatch => "token algorithm mismatch",
            },
            ErrorKind::TokenExpired => "token has expired",
            ErrorKind::TokenRevoked => "token has been revoked",
            ErrorKind::SessionExpired => "session has expired, please sign in again",
            ErrorKind::TooManyRequests => "locked",
            ErrorKind::AccountDisabled => "account disabled",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::PoolTimeout => "timed out waiting for a pooled instance",
            ErrorKind::PoolClosed => "pool is closed",
            ErrorKind::Timeout => "operation timed out",
            ErrorKind::ConfigError => "invalid configuration",
            ErrorKind::NotImplemented => "not implemented",
            ErrorKind::Database => "database error",
            ErrorKind::Network => "network error",
            ErrorKind::Internal => "internal error",
        }
    }

    /// Default Chinese message, mirroring [`ErrorKind::default_message_en`].
    pub fn default_message_zh(self) -> &'static str {
        match self {
            ErrorKind::InvalidParam => "参数无效",
            ErrorKind::Unauthorized => "用户名或密码错误",
            ErrorKind::InvalidToken(reason) => match reason {
                InvalidTokenReason::Malformed => "令牌格式错误",
                InvalidTokenReason::BadSignature => "令牌签名无效",
                InvalidTokenReason::NotYetValid => "令牌尚未生效",
                InvalidTokenReason::AlgorithmMismatch => "令牌算法不匹配",
            },
            ErrorKind::TokenExpired => "令牌已过期",
            ErrorKind::TokenRevoked => "令牌已被吊销",
            ErrorKind::SessionExpired => "会话已过期，请重新登录",
            ErrorKind::TooManyRequests => "账户已被锁定",
            ErrorKind::AccountDisabled => "账户已被禁用",
            ErrorKind::PermissionDenied => "权限不足",
            ErrorKind::NotFound => "资源不存在",
            ErrorKind::AlreadyExists => "资源已存在",
            ErrorKind::PoolTimeout => "获取池实例超时",
            ErrorKind::PoolClosed => "连接池已关闭",
            ErrorKind::Timeout => "操作超时",
            ErrorKind::ConfigError => "配置无效",
            ErrorKind::NotImplemented => "功能未实现",
            ErrorKind::Database => "数据库错误",
            ErrorKind::Network => "网络错误",
            ErrorKind::Internal => "内部错误",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.default_message_en())
    }
}

/// Lazily built, process-wide lookup from error code to its HTTP/RPC
/// projection. Write-once-at-init, read-many — the table itself never
/// changes after first access, so a plain `Lazy` is sufficient.
static PROJECTION_TABLE: Lazy<Vec<(&'static str, u16, &'static str)>> = Lazy::new(|| {
    use ErrorKind::*;
    use InvalidTokenReason::*;
    [
        InvalidParam,
        Unauthorized,
        InvalidToken(Malformed),
        InvalidToken(BadSignature),
        InvalidToken(NotYetValid),
        InvalidToken(AlgorithmMismatch),
        TokenExpired,
        TokenRevoked,
        SessionExpired,
        TooManyRequests,
        AccountDisabled,
        PermissionDenied,
        NotFound,
        AlreadyExists,
        PoolTimeout,
        PoolClosed,
        Timeout,
        ConfigError,
        NotImplemented,
        Database,
        Network,
        Internal,
    ]
    .iter()
    .map(|k| (k.code(), k.http_status(), k.rpc_status()))
    .collect()
});

/// Look up the HTTP/RPC projection for a numeric error code. Returns
/// `None` for codes outside the closed taxonomy.
pub fn lookup_projection(code: &str) -> Option<(u16, &'static str)> {
    PROJECTION_TABLE
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, http, rpc)| (*http, *rpc))
}

/// The error type returned by every fallible public operation in the
/// Citadel workspace.
///
/// `CitadelError` wraps a closed [`ErrorKind`], an optional message
/// override, and an optional chained cause. Two errors compare equal
/// (`==`) iff their codes match — message text and cause are deliberately
/// excluded from identity, matching the "identity comparison by code"
/// requirement.
#[derive(Debug, Clone)]
pub struct CitadelError {
    kind: ErrorKind,
    message: Option<Arc<str>>,
    cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl CitadelError {
    /// Construct an error of `kind` with its default message.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            cause: None,
        }
    }

    /// Shorthand for `ErrorKind::Internal` wrapping an arbitrary cause.
    pub fn internal(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorKind::Internal).with_cause(cause)
    }

    /// Override the default message for this instance.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(Arc::from(message.into()));
        self
    }

    /// Attach a chained cause without altering the message.
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// The error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Stable numeric code (`AABBCCC`).
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Effective English message (override if set, else the default).
    pub fn message(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or_else(|| self.kind.default_message_en())
    }

    /// Effective Chinese message. Overrides apply only to the English
    /// message; callers needing a localized override should construct a
    /// dedicated variant rather than relying on translation at the edge.
    pub fn message_zh(&self) -> &str {
        self.kind.default_message_zh()
    }

    /// HTTP status code projection.
    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    /// RPC status projection.
    pub fn rpc_status(&self) -> &'static str {
        self.kind.rpc_status()
    }
}

impl fmt::Display for CitadelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message())
    }
}

impl std::error::Error for CitadelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl PartialEq for CitadelError {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code()
    }
}

impl Eq for CitadelError {}

/// Convenience result alias used throughout the workspace.
pub type CitadelResult<T> = Result<T, CitadelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_message_is_used_without_override() {
        let err = CitadelError::new(ErrorKind::Unauthorized);
        assert_eq!(err.message(), "invalid credentials");
    }

    #[test]
    fn message_override_does_not_change_code_identity() {
        let base = CitadelError::new(ErrorKind::TooManyRequests);
        let overridden = CitadelError::new(ErrorKind::TooManyRequests).with_message("locked out");
        assert_eq!(base, overridden);
        assert_eq!(overridden.message(), "locked out");
    }

    #[test]
    fn unauthorized_messages_are_identical_for_unknown_user_and_bad_password() {
        let unknown_user = CitadelError::new(ErrorKind::Unauthorized);
        let bad_password = CitadelError::new(ErrorKind::Unauthorized);
        assert_eq!(unknown_user.message(), bad_password.message());
    }

    #[test]
    fn http_and_rpc_projections_agree_on_category() {
        let err = CitadelError::new(ErrorKind::PoolTimeout);
        assert_eq!(err.http_status(), 408);
        assert_eq!(err.rpc_status(), "DEADLINE_EXCEEDED");
    }

    #[test]
    fn lookup_projection_resolves_known_codes() {
        let err = CitadelError::new(ErrorKind::NotFound);
        let (http, rpc) = lookup_projection(err.code()).expect("code should be registered");
        assert_eq!(http, 404);
        assert_eq!(rpc, "NOT_FOUND");
    }

    #[test]
    fn distinct_kinds_compare_unequal() {
        let a = CitadelError::new(ErrorKind::TokenExpired);
        let b = CitadelError::new(ErrorKind::TokenRevoked);
        assert_ne!(a, b);
    }

    #[test]
    fn cause_chain_is_reachable_via_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = CitadelError::internal(io_err);
        assert!(std::error::Error::source(&err).is_some());
    }
}
