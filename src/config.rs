//! Configuration for the auth core
//!
//! Loads settings from environment variables, with a `.env` file picked up
//! in debug builds for local development. Token secrets are required; all
//! other knobs have sensible defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::info;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub tokens: TokenSettings,
    pub otp: OtpSettings,
    pub rate_limit: RateLimitSettings,
    pub maintenance: MaintenanceSettings,
}

impl Settings {
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            database: DatabaseSettings::from_env()?,
            tokens: TokenSettings::from_env()?,
            otp: OtpSettings::from_env()?,
            rate_limit: RateLimitSettings::from_env()?,
            maintenance: MaintenanceSettings::from_env()?,
        })
    }
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("Invalid DATABASE_MIN_CONNECTIONS")?,
            acquire_timeout: env::var("DATABASE_ACQUIRE_TIMEOUT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid DATABASE_ACQUIRE_TIMEOUT")?,
        })
    }
}

/// Signed credential settings: three distinct secrets, three lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub reset_secret: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub reset_ttl_secs: u64,
}

impl TokenSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            access_secret: env::var("AUTH_ACCESS_TOKEN_SECRET")
                .context("AUTH_ACCESS_TOKEN_SECRET must be set")?,
            refresh_secret: env::var("AUTH_REFRESH_TOKEN_SECRET")
                .context("AUTH_REFRESH_TOKEN_SECRET must be set")?,
            reset_secret: env::var("AUTH_RESET_TOKEN_SECRET")
                .context("AUTH_RESET_TOKEN_SECRET must be set")?,
            access_ttl_secs: env::var("AUTH_ACCESS_TOKEN_TTL_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .context("Invalid AUTH_ACCESS_TOKEN_TTL_SECS")?,
            refresh_ttl_secs: env::var("AUTH_REFRESH_TOKEN_TTL_SECS")
                .unwrap_or_else(|_| "2592000".to_string()) // 30 days
                .parse()
                .context("Invalid AUTH_REFRESH_TOKEN_TTL_SECS")?,
            reset_ttl_secs: env::var("AUTH_RESET_TOKEN_TTL_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .context("Invalid AUTH_RESET_TOKEN_TTL_SECS")?,
        })
    }
}

/// One-time code settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpSettings {
    pub ttl_secs: u64,
    /// Failed verifications allowed against a single code before it is
    /// burned.
    pub max_verify_attempts: i32,
}

impl OtpSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            ttl_secs: env::var("OTP_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("Invalid OTP_TTL_SECS")?,
            max_verify_attempts: env::var("OTP_MAX_VERIFY_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid OTP_MAX_VERIFY_ATTEMPTS")?,
        })
    }
}

/// Sliding-window lockout settings, per identifier (phone number)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub max_attempts: u32,
    /// Window length in seconds; also the lockout duration measured from
    /// the first failure in the window.
    pub window_secs: u64,
}

impl RateLimitSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            max_attempts: env::var("LOGIN_MAX_FAILED_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid LOGIN_MAX_FAILED_ATTEMPTS")?,
            window_secs: env::var("LOGIN_LOCKOUT_WINDOW_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .context("Invalid LOGIN_LOCKOUT_WINDOW_SECS")?,
        })
    }
}

/// Background sweep settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceSettings {
    pub sweep_interval_secs: u64,
    /// How long expired/revoked refresh token rows are retained before GC.
    pub token_retention_hours: i64,
}

impl MaintenanceSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            sweep_interval_secs: env::var("MAINTENANCE_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("Invalid MAINTENANCE_SWEEP_INTERVAL_SECS")?,
            token_retention_hours: env::var("MAINTENANCE_TOKEN_RETENTION_HOURS")
                .unwrap_or_else(|_| "72".to_string())
                .parse()
                .context("Invalid MAINTENANCE_TOKEN_RETENTION_HOURS")?,
        })
    }
}
