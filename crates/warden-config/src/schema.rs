use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Root configuration; maps to `warden.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub budget: BudgetConfig,
    pub rate_limit: RateLimitConfig,
    pub breaker: BreakerConfig,
    pub retry: RetryConfig,
    pub policy: PolicyConfig,
    pub tiers: TierConfig,
    pub upstream: UpstreamConfig,
    pub audit: AuditConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

// ── Budget ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Per-caller spend ceiling for one UTC day.
    pub daily_limit: f64,
    /// Per-caller spend ceiling for one UTC calendar month.
    pub monthly_limit: f64,
    /// Ceiling on a single action's `budgetImpact`.
    pub per_action_max: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit: 1_000.0,
            monthly_limit: 20_000.0,
            per_action_max: 500.0,
        }
    }
}

// ── Rate limits ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Actions per caller per rolling minute, across all tiers.
    pub per_minute: u32,
    /// Tier2 actions per caller per rolling hour.
    pub tier2_per_hour: u32,
    /// Tier3 actions per caller per rolling day.
    pub tier3_per_day: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 30,
            tier2_per_hour: 20,
            tier3_per_day: 5,
        }
    }
}

// ── Circuit breaker ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a trial call is allowed.
    pub recovery_timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout_secs: 60,
        }
    }
}

// ── Retry ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts for the outbound planner call (first try included).
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_ms: 1_500,
        }
    }
}

// ── Policy ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Callers allowed to submit plans. `"*"` admits everyone; empty admits nobody.
    pub allowed_callers: Vec<String>,
    /// Templates a Tier2 action may reference.
    pub allowed_templates: Vec<String>,
    /// Action types allowed at all. Empty means unrestricted.
    pub allowed_action_types: Vec<String>,
    /// Action types that are always blocked.
    pub denied_action_types: Vec<String>,
    /// Resource substrings that block any action touching them.
    pub denied_resources: Vec<String>,
    /// Force every plan into simulation.
    pub kill_switch: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_callers: vec!["*".into()],
            allowed_templates: vec![
                "welcome_series_v2".into(),
                "weekly_digest".into(),
                "renewal_reminder".into(),
                "webinar_invite".into(),
            ],
            allowed_action_types: vec![],
            denied_action_types: vec![
                "delete_all_data".into(),
                "disable_audit_log".into(),
                "modify_governance_policy".into(),
            ],
            denied_resources: vec![
                "production_database".into(),
                "payment_credentials".into(),
                "audit_log".into(),
            ],
            kill_switch: false,
        }
    }
}

// ── Tiers ──────────────────────────────────────────────────────

/// Static action type → tier table used by the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub tier1: Vec<String>,
    pub tier2: Vec<String>,
    pub tier3: Vec<String>,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            tier1: vec![
                "generate_report".into(),
                "read_metrics".into(),
                "draft_content".into(),
                "summarize".into(),
                "internal_note".into(),
                "fetch_analytics".into(),
            ],
            tier2: vec![
                "send_email".into(),
                "publish_content".into(),
                "schedule_post".into(),
                "update_crm".into(),
                "launch_journey".into(),
            ],
            tier3: vec![
                "financial_transaction".into(),
                "modify_pricing".into(),
                "delete_data".into(),
                "change_permissions".into(),
                "sign_contract".into(),
            ],
        }
    }
}

impl TierConfig {
    /// Action types listed under more than one tier.
    pub fn overlaps(&self) -> BTreeSet<String> {
        let norm = |v: &Vec<String>| -> BTreeSet<String> {
            v.iter().map(|s| s.trim().to_lowercase()).collect()
        };
        let (t1, t2, t3) = (norm(&self.tier1), norm(&self.tier2), norm(&self.tier3));
        t1.intersection(&t2)
            .chain(t1.intersection(&t3))
            .chain(t2.intersection(&t3))
            .cloned()
            .collect()
    }
}

// ── Upstream ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the planning/verification service.
    pub base_url: String,
    /// Bearer token for the service. Can also be set via WARDEN_UPSTREAM_API_KEY.
    pub api_key: Option<String>,
    /// Timeout applied when a request does not carry its own.
    pub default_timeout_ms: u64,
    /// Model name forwarded to the verifier.
    pub model: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8700".into(),
            api_key: None,
            default_timeout_ms: 30_000,
            model: "verifier-default".into(),
        }
    }
}

// ── Audit log ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON-lines file the audit trail is appended to.
    pub path: PathBuf,
    /// Rotate the live file once it reaches this size. 0 = never rotate.
    pub rotate_bytes: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("warden-audit.jsonl"),
            rotate_bytes: 0,
        }
    }
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address.
    pub listen: String,
    /// Optional API key for the `/v1` routes.
    pub api_key: Option<String>,
    /// Enable permissive CORS.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3710".into(),
            api_key: None,
            cors: false,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl ConfigWarning {
    fn error(field: &str, message: impl Into<String>, hint: &str) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: WarningSeverity::Error,
            hint: Some(hint.into()),
        }
    }

    fn warning(field: &str, message: impl Into<String>, hint: &str) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: WarningSeverity::Warning,
            hint: Some(hint.into()),
        }
    }
}

impl WardenConfig {
    /// Every problem found, errors included.
    pub fn findings(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // ── Budget ───
        for (field, value) in [
            ("budget.daily_limit", self.budget.daily_limit),
            ("budget.monthly_limit", self.budget.monthly_limit),
            ("budget.per_action_max", self.budget.per_action_max),
        ] {
            if !value.is_finite() || value <= 0.0 {
                warnings.push(ConfigWarning::error(
                    field,
                    format!("limit {} must be a positive number", value),
                    "Set to e.g. 1000.0",
                ));
            }
        }
        if self.budget.daily_limit > self.budget.monthly_limit {
            warnings.push(ConfigWarning::warning(
                "budget.daily_limit",
                "daily limit exceeds the monthly limit",
                "The monthly window will cap spend before the daily one does",
            ));
        }

        // ── Rate limits ───
        for (field, value) in [
            ("rate_limit.per_minute", self.rate_limit.per_minute),
            ("rate_limit.tier2_per_hour", self.rate_limit.tier2_per_hour),
            ("rate_limit.tier3_per_day", self.rate_limit.tier3_per_day),
        ] {
            if value == 0 {
                warnings.push(ConfigWarning::warning(
                    field,
                    "limit is 0; every matching action will be rate limited",
                    "Set a positive limit",
                ));
            }
        }

        // ── Breaker / retry ───
        if self.breaker.failure_threshold == 0 {
            warnings.push(ConfigWarning::error(
                "breaker.failure_threshold",
                "threshold is 0",
                "Set to e.g. 3",
            ));
        }
        if self.breaker.recovery_timeout_secs == 0 {
            warnings.push(ConfigWarning::warning(
                "breaker.recovery_timeout_secs",
                "recovery timeout is 0; an open circuit admits a trial call immediately",
                "Set to e.g. 60",
            ));
        }
        if self.retry.max_attempts == 0 {
            warnings.push(ConfigWarning::error(
                "retry.max_attempts",
                "max_attempts is 0; the planner would never be called",
                "Set to e.g. 2",
            ));
        }

        // ── Policy ───
        if self.policy.allowed_callers.is_empty() {
            warnings.push(ConfigWarning::warning(
                "policy.allowed_callers",
                "caller allow-list is empty; every plan will be rejected",
                "Add caller ids, or \"*\" to admit all callers",
            ));
        } else if self.policy.allowed_callers.iter().any(|c| c == "*") {
            warnings.push(ConfigWarning {
                field: "policy.allowed_callers".into(),
                message: "wildcard caller allow-list admits every caller".into(),
                severity: WarningSeverity::Info,
                hint: Some("List explicit caller ids in production".into()),
            });
        }
        if self.policy.kill_switch {
            warnings.push(ConfigWarning::warning(
                "policy.kill_switch",
                "kill switch is active; every plan is simulation only",
                "Set kill_switch = false to allow execution",
            ));
        }

        // ── Tiers ───
        let overlaps = self.tiers.overlaps();
        if !overlaps.is_empty() {
            warnings.push(ConfigWarning::error(
                "tiers",
                format!(
                    "action types listed in more than one tier: {}",
                    overlaps.into_iter().collect::<Vec<_>>().join(", ")
                ),
                "Each action type must map to exactly one tier",
            ));
        }

        // ── Upstream ───
        if self.upstream.base_url.is_empty() {
            warnings.push(ConfigWarning::error(
                "upstream.base_url",
                "base URL is empty",
                "Set to e.g. 'http://127.0.0.1:8700'",
            ));
        } else if !self.upstream.base_url.starts_with("http://")
            && !self.upstream.base_url.starts_with("https://")
        {
            warnings.push(ConfigWarning::error(
                "upstream.base_url",
                format!("'{}' is not an http(s) URL", self.upstream.base_url),
                "Use 'http://host:port' or 'https://host'",
            ));
        }
        if self.upstream.default_timeout_ms == 0 {
            warnings.push(ConfigWarning::error(
                "upstream.default_timeout_ms",
                "timeout is 0",
                "Set to e.g. 30000",
            ));
        }

        // ── Server ───
        if self.server.listen.is_empty() {
            warnings.push(ConfigWarning::error(
                "server.listen",
                "listen address is empty",
                "Set to e.g. '127.0.0.1:3710'",
            ));
        } else if self.server.listen.starts_with("0.0.0.0") && self.server.api_key.is_none() {
            warnings.push(ConfigWarning::warning(
                "server.api_key",
                "no API key set while server is network-accessible",
                "Set server.api_key to protect the governance endpoints",
            ));
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning::warning(
                "logging.format",
                format!("unknown log format '{}'", self.logging.format),
                &format!("Valid values: {}", valid_formats.join(", ")),
            ));
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning::warning(
                "logging.level",
                format!("unknown log level '{}'", self.logging.level),
                &format!("Valid values: {}", valid_levels.join(", ")),
            ));
        }

        warnings
    }

    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let warnings = self.findings();
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
