#[cfg(test)]
mod tests {
    use warden_config::ConfigLoader;
    use warden_config::schema::*;
    use std::io::Write;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_budget_config_defaults() {
        let config = BudgetConfig::default();
        assert_eq!(config.daily_limit, 1_000.0);
        assert_eq!(config.monthly_limit, 20_000.0);
        assert_eq!(config.per_action_max, 500.0);
    }

    #[test]
    fn test_breaker_and_retry_defaults() {
        let config = WardenConfig::default();
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.recovery_timeout_secs, 60);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.backoff_ms, 1_500);
    }

    #[test]
    fn test_policy_defaults() {
        let config = PolicyConfig::default();
        assert_eq!(config.allowed_callers, vec!["*".to_string()]);
        assert!(!config.kill_switch);
        assert!(config.denied_resources.iter().any(|r| r == "production_database"));
        assert!(config.allowed_action_types.is_empty());
    }

    #[test]
    fn test_rate_limit_defaults() {
        let config = RateLimitConfig::default();
        assert_eq!(config.per_minute, 30);
        assert_eq!(config.tier2_per_hour, 20);
        assert_eq!(config.tier3_per_day, 5);
    }

    #[test]
    fn test_default_config_is_valid() {
        let warnings = WardenConfig::default().validate().unwrap();
        // Wildcard allow-list is reported, but only as info.
        assert!(warnings.iter().all(|w| w.severity != WarningSeverity::Error));
        assert!(warnings.iter().any(|w| w.field == "policy.allowed_callers"));
    }

    // ── TOML tests ─────────────────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = WardenConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: WardenConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.budget.daily_limit, config.budget.daily_limit);
        assert_eq!(restored.tiers.tier3, config.tiers.tier3);
        assert_eq!(restored.server.listen, config.server.listen);
    }

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[budget]
daily_limit = 50.0

[policy]
kill_switch = true
allowed_callers = ["agent-ceo", "agent-cmo"]
"#;
        let config: WardenConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.budget.daily_limit, 50.0);
        assert!(config.policy.kill_switch);
        assert_eq!(config.policy.allowed_callers.len(), 2);
        // Defaults should fill in
        assert_eq!(config.budget.monthly_limit, 20_000.0);
        assert_eq!(config.retry.max_attempts, 2);
        assert!(!config.policy.denied_action_types.is_empty());
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut config = WardenConfig::default();
        config.budget.daily_limit = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("budget.daily_limit"));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = WardenConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().unwrap_err().contains("retry.max_attempts"));
    }

    #[test]
    fn test_validate_rejects_overlapping_tiers() {
        let mut config = WardenConfig::default();
        config.tiers.tier1.push("Send_Email".into());
        let err = config.validate().unwrap_err();
        assert!(err.contains("send_email"));
    }

    #[test]
    fn test_validate_rejects_non_http_upstream() {
        let mut config = WardenConfig::default();
        config.upstream.base_url = "ftp://planner".into();
        assert!(config.validate().unwrap_err().contains("upstream.base_url"));
    }

    #[test]
    fn test_validate_warns_on_empty_caller_list() {
        let mut config = WardenConfig::default();
        config.policy.allowed_callers.clear();
        let warnings = config.validate().unwrap();
        let w = warnings
            .iter()
            .find(|w| w.field == "policy.allowed_callers")
            .unwrap();
        assert_eq!(w.severity, WarningSeverity::Warning);
        assert!(w.message.contains("rejected"));
    }

    #[test]
    fn test_validate_warns_on_kill_switch() {
        let mut config = WardenConfig::default();
        config.policy.kill_switch = true;
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.field == "policy.kill_switch"));
    }

    #[test]
    fn test_warning_display_includes_hint() {
        let mut config = WardenConfig::default();
        config.logging.format = "xml".into();
        let warnings = config.validate().unwrap();
        let w = warnings.iter().find(|w| w.field == "logging.format").unwrap();
        let s = w.to_string();
        assert!(s.contains("[warning]"));
        assert!(s.contains("Valid values"));
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("warden.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
[budget]
daily_limit = 75.0
per_action_max = 25.0

[rate_limit]
per_minute = 10

[upstream]
base_url = "https://planner.internal"
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let config = loader.get();
        assert_eq!(config.budget.daily_limit, 75.0);
        assert_eq!(config.budget.per_action_max, 25.0);
        assert_eq!(config.rate_limit.per_minute, 10);
        assert_eq!(config.upstream.base_url, "https://planner.internal");
        assert_eq!(loader.path(), config_path.as_path());
    }

    #[test]
    fn test_config_loader_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("warden.toml");
        std::fs::write(&config_path, "[breaker]\nfailure_threshold = 0\n").unwrap();
        assert!(ConfigLoader::load(Some(config_path.as_path())).is_err());
    }

    #[test]
    fn test_config_loader_rejects_unparseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("warden.toml");
        std::fs::write(&config_path, "[budget\ndaily_limit = ").unwrap();
        let err = ConfigLoader::load(Some(config_path.as_path())).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_config_loader_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("warden.toml");

        std::fs::write(&config_path, "[retry]\nbackoff_ms = 100\n").unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.get().retry.backoff_ms, 100);

        std::fs::write(&config_path, "[retry]\nbackoff_ms = 250\n").unwrap();

        loader.reload().unwrap();
        assert_eq!(loader.get().retry.backoff_ms, 250);
    }

    #[test]
    fn test_config_loader_reload_keeps_config_on_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("warden.toml");
        std::fs::write(&config_path, "[retry]\nmax_attempts = 3\n").unwrap();
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();

        std::fs::write(&config_path, "[retry]\nmax_attempts = 0\n").unwrap();
        assert!(loader.reload().is_err());
        assert_eq!(loader.get().retry.max_attempts, 3);
    }

    #[test]
    fn test_from_config_shares_state() {
        let loader = ConfigLoader::from_config(WardenConfig::default());
        loader.shared().write().policy.kill_switch = true;
        assert!(loader.get().policy.kill_switch);
    }
}
