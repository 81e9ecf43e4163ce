//! Input validation utilities for the auth core
//!
//! Phone numbers arrive pre-normalized (E.164) from the caller; this module
//! only checks shape, it never parses or rewrites numbers.

/// Validate E.164 phone number shape (e.g. +14155551234)
pub fn is_valid_e164(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix('+') else {
        return false;
    };
    digits.len() >= 7 && digits.len() <= 15 && digits.chars().all(|c| c.is_ascii_digit())
}

/// Validate a submitted one-time code: exactly six ASCII digits
pub fn is_valid_otp_shape(code: &str) -> bool {
    code.len() == 6 && code.chars().all(|c| c.is_ascii_digit())
}

/// Mask a phone number for logging, keeping the last four digits
pub fn mask_phone(phone: &str) -> String {
    if phone.len() <= 4 {
        return "****".to_string();
    }
    format!("****{}", &phone[phone.len() - 4..])
}
