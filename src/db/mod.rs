//! Database repositories, one module per record type.
//!
//! Functions take `impl PgExecutor<'_>` where the orchestrator composes
//! them inside a transaction, and `&PgPool` where an operation manages its
//! own transaction or is a standalone read.
pub mod accounts;
pub mod login_attempts;
pub mod otp_codes;
pub mod refresh_tokens;
pub mod sessions;
