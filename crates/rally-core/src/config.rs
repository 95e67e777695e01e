use anyhow::Result;
use chrono::NaiveTime;
use config::Config;
use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub session: SessionConfig,
    pub budget: BudgetConfig,
    pub logging: LoggingConfig,
}

/// Batch and live-session driver settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Deployment-wide overflow threshold; not configurable per event.
    pub overflow_threshold: u32,
    pub phase_poll_seconds: u64,
    pub batch_refresh_seconds: u64,
    /// Attempts before a lost join race is surfaced as a conflict.
    pub join_retry_limit: u32,
}

/// Daily usage-budget settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    pub daily_limit_seconds: u32,
    pub reset_hour: u32,
    pub reset_minute: u32,
    /// IANA timezone the reset time-of-day is anchored in.
    pub timezone: String,
}

impl BudgetConfig {
    /// ## Summary
    /// Returns the fixed daily reset time-of-day.
    ///
    /// ## Errors
    /// Returns `CoreError::InvalidConfiguration` if the configured hour or
    /// minute is out of range.
    pub fn reset_time(&self) -> CoreResult<NaiveTime> {
        NaiveTime::from_hms_opt(self.reset_hour, self.reset_minute, 0).ok_or_else(|| {
            CoreError::InvalidConfiguration(format!(
                "reset time {:02}:{:02} is out of range",
                self.reset_hour, self.reset_minute
            ))
        })
    }

    /// ## Summary
    /// Resolves the configured IANA timezone name.
    ///
    /// ## Errors
    /// Returns `CoreError::InvalidConfiguration` if the name is unknown.
    pub fn tz(&self) -> CoreResult<chrono_tz::Tz> {
        self.timezone.parse::<chrono_tz::Tz>().map_err(|_e| {
            CoreError::InvalidConfiguration(format!("unknown timezone: {}", self.timezone))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    /// ## Summary
    /// Loads configuration from `.env` file and environment variables into a `Settings`.
    /// Environment variables take precedence over `.env` file values.
    ///
    /// ## Errors
    /// Returns an error if building the configuration or deserializing it fails.
    pub fn load() -> Result<Self> {
        Ok(Config::builder()
            .set_default("session.overflow_threshold", 6)?
            .set_default("session.phase_poll_seconds", 1)?
            .set_default("session.batch_refresh_seconds", 10)?
            .set_default("session.join_retry_limit", 3)?
            .set_default("budget.daily_limit_seconds", 1260)?
            .set_default("budget.reset_hour", 4)?
            .set_default("budget.reset_minute", 0)?
            .set_default("budget.timezone", "UTC")?
            .set_default("logging.level", "debug")?
            // Env file
            .add_source(
                config::Environment::default()
                    .convert_case(config::Case::Snake)
                    .separator("_")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            // TOML file
            .add_source(config::File::with_name("config.toml").required(false))
            .build()?
            .try_deserialize::<Settings>()?)
    }
}

/// ## Summary
/// Loads configuration from environment variables and `.env` file.
///
/// ## Errors
/// Returns an error if loading or deserializing the configuration fails.
pub fn load_config() -> Result<Settings> {
    dotenvy::dotenv().ok();

    Settings::load()
}
