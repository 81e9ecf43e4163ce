pub mod account;
pub mod login_attempt;
pub mod otp;
pub mod refresh_token;
pub mod session;

pub use account::{Account, Role};
pub use login_attempt::LoginAttempt;
pub use otp::OtpCode;
pub use refresh_token::RefreshTokenRecord;
pub use session::Session;
