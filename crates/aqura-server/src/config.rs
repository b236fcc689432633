use std::time::Duration;

use aqura_listener::{ReconnectPolicy, SubscriberConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Change notification subscriber
    #[serde(default)]
    pub listener: ListenerSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Database validations
        if self.database.url.trim().is_empty() {
            return Err(
                "database.url is required (set it in the config file, AQURA__DATABASE__URL or DATABASE_URL)"
                    .into(),
            );
        }
        if self.database.pool_size == 0 {
            return Err("database.pool_size must be > 0".into());
        }
        if self.database.connect_timeout_ms == 0 {
            return Err("database.connect_timeout_ms must be > 0".into());
        }
        // Listener validations
        let l = &self.listener;
        if l.idle_timeout_secs == 0 || l.ping_timeout_secs == 0 || l.connect_timeout_secs == 0 {
            return Err("listener timeouts must be > 0".into());
        }
        if l.min_reconnect_secs == 0 {
            return Err("listener.min_reconnect_secs must be > 0".into());
        }
        if l.min_reconnect_secs > l.max_reconnect_secs {
            return Err("listener.min_reconnect_secs must be <= listener.max_reconnect_secs".into());
        }
        if l.queue_capacity == 0 {
            return Err("listener.queue_capacity must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    /// Subscriber settings for the given channels.
    pub fn subscriber_config<I, S>(&self, channels: I) -> SubscriberConfig
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let l = &self.listener;
        SubscriberConfig::new(channels)
            .with_idle_timeout(Duration::from_secs(l.idle_timeout_secs))
            .with_ping_timeout(Duration::from_secs(l.ping_timeout_secs))
            .with_connect_timeout(Duration::from_secs(l.connect_timeout_secs))
            .with_reconnect(ReconnectPolicy::new(
                Duration::from_secs(l.min_reconnect_secs),
                Duration::from_secs(l.max_reconnect_secs),
            ))
            .with_queue_capacity(l.queue_capacity)
    }

    /// Sweeper period, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.cache.sweep_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL. Falls back to `DATABASE_URL` when not configured.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_pool_size() -> u32 {
    5
}
fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: default_pool_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerSettings {
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
    /// Upper bound on one connect-and-LISTEN attempt.
    #[serde(default = "default_listener_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_min_reconnect_secs")]
    pub min_reconnect_secs: u64,
    #[serde(default = "default_max_reconnect_secs")]
    pub max_reconnect_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Clear the whole cache after a reconnect or dropped notifications.
    #[serde(default = "default_true")]
    pub clear_on_resync: bool,
}

fn default_idle_timeout_secs() -> u64 {
    90
}
fn default_ping_timeout_secs() -> u64 {
    10
}
fn default_listener_connect_timeout_secs() -> u64 {
    30
}
fn default_min_reconnect_secs() -> u64 {
    10
}
fn default_max_reconnect_secs() -> u64 {
    60
}
fn default_queue_capacity() -> usize {
    256
}
fn default_true() -> bool {
    true
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            ping_timeout_secs: default_ping_timeout_secs(),
            connect_timeout_secs: default_listener_connect_timeout_secs(),
            min_reconnect_secs: default_min_reconnect_secs(),
            max_reconnect_secs: default_max_reconnect_secs(),
            queue_capacity: default_queue_capacity(),
            clear_on_resync: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Seconds between expired-entry sweeps. 0 disables the sweeper.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, used when no path is given.
    pub const DEFAULT_CONFIG_PATH: &str = "aqura.toml";

    /// Load configuration.
    ///
    /// Precedence, lowest first: `DATABASE_URL` as the default for
    /// `database.url`, the TOML file (skipped if missing), then `AQURA__*`
    /// environment variables.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();

        if let Ok(url) = std::env::var("DATABASE_URL")
            && !url.is_empty()
        {
            builder = builder
                .set_default("database.url", url)
                .map_err(|e| format!("config build error: {e}"))?;
        }

        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }

        // Environment variable overrides, e.g., AQURA__LISTENER__QUEUE_CAPACITY=512
        builder = builder.add_source(
            Environment::with_prefix("AQURA")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.database.url = "postgres://localhost/aqura".into();
        cfg
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.database.pool_size, 5);
        assert_eq!(cfg.listener.idle_timeout_secs, 90);
        assert_eq!(cfg.listener.connect_timeout_secs, 30);
        assert_eq!(cfg.listener.min_reconnect_secs, 10);
        assert_eq!(cfg.listener.max_reconnect_secs, 60);
        assert!(cfg.listener.clear_on_resync);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());

        let err = AppConfig::default().validate().unwrap_err();
        assert!(err.contains("database.url"));

        let mut cfg = valid();
        cfg.database.pool_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.listener.min_reconnect_secs = 120;
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("min_reconnect_secs must be <="));

        let mut cfg = valid();
        cfg.listener.queue_capacity = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.listener.connect_timeout_secs = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("listener timeouts"));

        let mut cfg = valid();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.logging.level = "DEBUG".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_subscriber_config_mapping() {
        let mut cfg = valid();
        cfg.listener.idle_timeout_secs = 30;
        cfg.listener.connect_timeout_secs = 4;
        cfg.listener.min_reconnect_secs = 2;
        cfg.listener.max_reconnect_secs = 8;
        cfg.listener.queue_capacity = 16;

        let sub = cfg.subscriber_config(["a", "b", "a"]);
        assert_eq!(sub.channels, vec!["a", "b"]);
        assert_eq!(sub.idle_timeout, Duration::from_secs(30));
        assert_eq!(sub.ping_timeout, Duration::from_secs(10));
        assert_eq!(sub.connect_timeout, Duration::from_secs(4));
        assert_eq!(sub.reconnect.delay_for(0), Duration::from_secs(2));
        assert_eq!(sub.reconnect.delay_for(5), Duration::from_secs(8));
        assert_eq!(sub.queue_capacity, 16);
        assert!(sub.validate().is_ok());
    }

    #[test]
    fn test_sweep_interval() {
        let mut cfg = valid();
        assert_eq!(cfg.sweep_interval(), Some(Duration::from_secs(60)));
        cfg.cache.sweep_interval_secs = 0;
        assert_eq!(cfg.sweep_interval(), None);
    }
}
