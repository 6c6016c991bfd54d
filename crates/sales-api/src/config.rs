use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default bcrypt cost factor for password hashing.
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Minimum bcrypt cost accepted from configuration.
pub const MIN_BCRYPT_COST: u32 = 10;

/// Maximum bcrypt cost accepted from configuration.
pub const MAX_BCRYPT_COST: u32 = 14;

/// Default grace window for in-flight and background work during shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_SECONDS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub environment: String,
    pub db_max_connections: u32,
    pub limiter: LimiterConfig,
    pub cors_trusted_origins: Vec<String>,
    pub shutdown_grace: Duration,
    pub bcrypt_cost: u32,
}

/// Per-client token bucket settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterConfig {
    pub enabled: bool,
    /// Tokens added per second.
    pub rps: f64,
    /// Bucket capacity.
    pub burst: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps: 2.0,
            burst: 4,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:4000".to_string());

        let environment = vars
            .get("ENVIRONMENT")
            .cloned()
            .unwrap_or_else(|| "development".to_string());

        let defaults = LimiterConfig::default();
        let limiter = LimiterConfig {
            enabled: parse_or(vars, "LIMITER_ENABLED", defaults.enabled)?,
            rps: parse_or(vars, "LIMITER_RPS", defaults.rps)?,
            burst: parse_or(vars, "LIMITER_BURST", defaults.burst)?,
        };

        if !limiter.rps.is_finite() || limiter.rps < 0.0 {
            return Err(ConfigError::InvalidValue {
                var: "LIMITER_RPS".to_string(),
                reason: format!("must be a non-negative number, got {}", limiter.rps),
            });
        }

        let cors_trusted_origins = vars
            .get("CORS_TRUSTED_ORIGINS")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let shutdown_grace = Duration::from_secs(parse_or(
            vars,
            "SHUTDOWN_GRACE_SECONDS",
            DEFAULT_SHUTDOWN_GRACE_SECONDS,
        )?);

        let db_max_connections = parse_or(vars, "DB_MAX_CONNECTIONS", 25u32)?;

        let bcrypt_cost = parse_or(vars, "BCRYPT_COST", DEFAULT_BCRYPT_COST)?;
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&bcrypt_cost) {
            return Err(ConfigError::InvalidValue {
                var: "BCRYPT_COST".to_string(),
                reason: format!(
                    "must be between {} and {}, got {}",
                    MIN_BCRYPT_COST, MAX_BCRYPT_COST, bcrypt_cost
                ),
            });
        }

        Ok(Config {
            database_url,
            bind_address,
            environment,
            db_max_connections,
            limiter,
            cors_trusted_origins,
            shutdown_grace,
            bcrypt_cost,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_or<T>(vars: &HashMap<String, String>, var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var: var.to_string(),
            reason: e.to_string(),
        }),
    }
}
