//! Account authentication core: phone-verified registration, password
//! login with lockout, rotating refresh tokens, single-session enforcement
//! and password reset.
//!
//! The crate is transport-agnostic. An HTTP or RPC layer constructs
//! [`services::AuthService`] and [`services::RequestVerifier`] over a
//! Postgres pool and maps [`error::AuthError`] variants to its wire
//! responses.

pub mod config;
pub mod db;
pub mod error;
pub mod maintenance;
pub mod models;
pub mod rate_limit;
pub mod security;
pub mod services;
pub mod validators;

pub use config::Settings;
pub use error::{AuthError, Result};
pub use models::{Account, Role, Session};
pub use rate_limit::{AttemptCounter, InProcessAttemptCounter};
pub use security::TokenSigner;
pub use services::{
    AuthContext, AuthService, AuthTokens, OtpSendOutcome, OtpService, RequestMeta, RequestVerifier,
};

/// Initialize structured JSON logging. Intended for binaries and test
/// harnesses embedding this crate; fails if a global subscriber is already
/// installed.
pub fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "auth_core=info,info".into()))
        .with_target(false)
        .json()
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
}
