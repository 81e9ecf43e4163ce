//! Business logic for the auth core
//!
//! - `otp`: one-time code gate for phone verification
//! - `auth`: the orchestrator facade (register, login, refresh, logout,
//!   password reset, session management)
//! - `verifier`: the request-time gate run on every protected call
pub mod auth;
pub mod otp;
pub mod verifier;

pub use auth::{AuthService, AuthTokens};
pub use otp::{OtpSendOutcome, OtpService};
pub use verifier::{AuthContext, RequestVerifier};

/// Network/device metadata observed on an inbound request
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
        }
    }

    pub fn ip(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
}
