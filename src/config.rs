use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    /// Symbols tracked for the session; fixed at startup
    pub symbols: Vec<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Exchange calendar timezone
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Exchange-local open/close, "HH:MM"
    #[serde(default = "default_market_open")]
    pub market_open: String,
    #[serde(default = "default_market_close")]
    pub market_close: String,
    /// Minutes to wait after the open before strategies may act
    #[serde(default = "default_cool_down")]
    pub cool_down_minutes: i64,
    /// Minutes before the close at which positions are force-flattened
    #[serde(default = "default_liquidation_cutoff")]
    pub liquidation_cutoff_minutes: i64,
    /// Grace period past the close before teardown fires
    #[serde(default = "default_teardown_grace")]
    pub teardown_grace_minutes: i64,
    /// Age at which an unfilled order is cancelled for resubmission
    #[serde(default = "default_stale_order")]
    pub stale_order_minutes: i64,
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_market_open() -> String {
    "09:30".to_string()
}

fn default_market_close() -> String {
    "16:00".to_string()
}

fn default_cool_down() -> i64 {
    5
}

fn default_liquidation_cutoff() -> i64 {
    15
}

fn default_teardown_grace() -> i64 {
    10
}

fn default_stale_order() -> i64 {
    1
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            market_open: default_market_open(),
            market_close: default_market_close(),
            cool_down_minutes: default_cool_down(),
            liquidation_cutoff_minutes: default_liquidation_cutoff(),
            teardown_grace_minutes: default_teardown_grace(),
            stale_order_minutes: default_stale_order(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("database.max_connections", 5)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(
                    std::env::var("DAYTRADER_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (DAYTRADER_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("DAYTRADER")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.symbols.is_empty() {
            errors.push("at least one symbol must be configured".to_string());
        }

        if self.session.liquidation_cutoff_minutes <= 0 {
            errors.push("liquidation_cutoff_minutes must be positive".to_string());
        }

        if self.session.teardown_grace_minutes < 0 {
            errors.push("teardown_grace_minutes must not be negative".to_string());
        }

        if self.session.stale_order_minutes <= 0 {
            errors.push("stale_order_minutes must be positive".to_string());
        }

        if self.session.cool_down_minutes < 0 {
            errors.push("cool_down_minutes must not be negative".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
