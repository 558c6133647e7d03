use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::WardenConfig;

/// Loads and optionally hot-reloads the warden configuration.
#[derive(Debug)]
pub struct ConfigLoader {
    config: Arc<RwLock<WardenConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > WARDEN_CONFIG env > ~/.warden/warden.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("WARDEN_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".warden")
            .join("warden.toml")
    }

    /// Resolve, read and apply env overrides without validating.
    pub fn read_unvalidated(path: Option<&Path>) -> warden_core::Result<(PathBuf, WardenConfig)> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::read(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            WardenConfig::default()
        };
        Ok((config_path, Self::apply_env_overrides(config)))
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> warden_core::Result<Self> {
        let (config_path, config) = Self::read_unvalidated(path)?;

        // Validate config: log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(warden_core::WardenError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Wrap an in-memory config (tests, embedding).
    pub fn from_config(config: WardenConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            config_path: PathBuf::from("warden.toml"),
        }
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> WardenConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<WardenConfig>> {
        Arc::clone(&self.config)
    }

    /// Path being watched.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn read(path: &Path) -> warden_core::Result<WardenConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<WardenConfig>(&raw).map_err(|e| {
            warden_core::WardenError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Apply env var overrides (WARDEN_KILL_SWITCH, WARDEN_DAILY_BUDGET, etc.)
    pub fn apply_env_overrides(mut config: WardenConfig) -> WardenConfig {
        if let Ok(v) = std::env::var("WARDEN_KILL_SWITCH") {
            match v.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.policy.kill_switch = true,
                "0" | "false" | "no" | "off" => config.policy.kill_switch = false,
                other => warn!(value = other, "ignoring unparseable WARDEN_KILL_SWITCH"),
            }
        }
        if let Ok(v) = std::env::var("WARDEN_DAILY_BUDGET")
            && let Ok(limit) = v.parse::<f64>()
        {
            config.budget.daily_limit = limit;
        }
        if let Ok(v) = std::env::var("WARDEN_MONTHLY_BUDGET")
            && let Ok(limit) = v.parse::<f64>()
        {
            config.budget.monthly_limit = limit;
        }
        if let Ok(v) = std::env::var("WARDEN_PER_ACTION_MAX")
            && let Ok(limit) = v.parse::<f64>()
        {
            config.budget.per_action_max = limit;
        }
        if let Ok(v) = std::env::var("WARDEN_UPSTREAM_URL") {
            config.upstream.base_url = v;
        }
        if let Ok(v) = std::env::var("WARDEN_AUDIT_PATH") {
            config.audit.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("WARDEN_SERVER_LISTEN") {
            config.server.listen = v;
        }
        if let Ok(v) = std::env::var("WARDEN_LOG_LEVEL") {
            config.logging.level = v;
        }
        // Config file takes priority, env is the fallback.
        if config.upstream.api_key.is_none()
            && let Ok(v) = std::env::var("WARDEN_UPSTREAM_API_KEY")
        {
            config.upstream.api_key = Some(v);
        }
        config
    }

    /// Reload the config from disk.
    pub fn reload(&self) -> warden_core::Result<()> {
        if !self.config_path.exists() {
            return Err(warden_core::WardenError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::read(&self.config_path)?);
        new_config.validate().map_err(warden_core::WardenError::Config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    /// Start a background file watcher that reloads the config when the file changes
    /// and hands every successfully reloaded config to `on_change`.
    /// Returns a handle to the watcher (must be kept alive for watching to continue).
    pub fn watch<F>(&self, on_change: F) -> warden_core::Result<notify::RecommendedWatcher>
    where
        F: Fn(&WardenConfig) + Send + 'static,
    {
        let config = Arc::clone(&self.config);
        let config_path = self.config_path.clone();

        info!(?config_path, "starting config file watcher");

        let path_for_event = config_path.clone();
        let mut watcher = notify::recommended_watcher(
            move |res: Result<NotifyEvent, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let is_our_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == path_for_event.file_name());
                    if !is_our_file {
                        return;
                    }

                    info!("config file changed, reloading");
                    match ConfigLoader::read(&path_for_event) {
                        Ok(new_config) => {
                            let new_config = ConfigLoader::apply_env_overrides(new_config);
                            if let Err(e) = new_config.validate() {
                                warn!(error = %e, "config file has errors, keeping current config");
                                return;
                            }
                            on_change(&new_config);
                            *config.write() = new_config;
                            info!("configuration hot-reloaded successfully");
                        }
                        Err(e) => {
                            warn!(error = %e, "config file has errors, keeping current config");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "file watcher error");
                }
            },
        )
        .map_err(|e| {
            warden_core::WardenError::Config(format!("failed to create file watcher: {}", e))
        })?;

        // Watch the parent directory (some editors create temp files + rename)
        let watch_path = self
            .config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| {
                warden_core::WardenError::Config(format!("failed to watch config directory: {}", e))
            })?;

        Ok(watcher)
    }
}
