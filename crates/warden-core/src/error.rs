use thiserror::Error;

/// Unified error type for the warden pipeline.
///
/// Only infrastructure failures are errors. Policy and audit rejections are
/// ordinary data carried inside a [`Disposition`](crate::Disposition).
#[derive(Error, Debug)]
pub enum WardenError {
    // ── Pipeline errors (surfaced by `submit`) ─────────────────
    #[error("service unavailable: {reason}")]
    ServiceUnavailable { reason: String },

    #[error("budget exceeded: {resource}: used {used}, limit {limit}")]
    BudgetExceeded {
        resource: String,
        used: f64,
        limit: f64,
    },

    #[error("request cancelled by caller")]
    Cancelled,

    // ── Upstream errors ────────────────────────────────────────
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("upstream rate limited, retry after {retry_after_secs}s")]
    UpstreamRateLimited { retry_after_secs: u64 },

    #[error("upstream call timed out after {timeout_ms}ms")]
    UpstreamTimeout { timeout_ms: u64 },

    #[error("upstream rejected request: HTTP {status}: {body}")]
    UpstreamRejected { status: u16, body: String },

    #[error("malformed upstream output: {0}")]
    MalformedUpstream(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Audit log errors ───────────────────────────────────────
    #[error("audit log error: {0}")]
    AuditLog(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl WardenError {
    /// Short machine-readable name, used in HTTP error bodies and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Cancelled => "cancelled",
            Self::Upstream(_) => "upstream",
            Self::UpstreamRateLimited { .. } => "upstream_rate_limited",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::UpstreamRejected { .. } => "upstream_rejected",
            Self::MalformedUpstream(_) => "malformed_upstream",
            Self::Config(_) | Self::ConfigValidation { .. } => "config",
            Self::AuditLog(_) => "audit_log",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Other(_) => "other",
        }
    }

    /// Whether this error came from the upstream planning/verification service.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Upstream(_)
                | Self::UpstreamRateLimited { .. }
                | Self::UpstreamTimeout { .. }
                | Self::UpstreamRejected { .. }
                | Self::MalformedUpstream(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
