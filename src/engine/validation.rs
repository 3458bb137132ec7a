//! Checkout input checks shared by order placement and payment.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Pragmatic email check: local part, @, dotted domain with a TLD
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)*\.[a-zA-Z]{2,}$"
    ).unwrap();

    /// MM/YY or MM/YYYY
    static ref EXPIRY_REGEX: Regex = Regex::new(
        r"^(0[1-9]|1[0-2])/(\d{2}|\d{4})$"
    ).unwrap();
}

pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

/// Card number: 12-19 digits, spaces allowed between groups
pub fn validate_card_number(card: &str) -> Result<(), String> {
    let digits: String = card.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() {
        return Err("Card number is required".to_string());
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("Card number must contain only digits".to_string());
    }
    if !(12..=19).contains(&digits.len()) {
        return Err("Card number must be between 12 and 19 digits".to_string());
    }
    Ok(())
}

pub fn validate_expiry_date(expiry: &str) -> Result<(), String> {
    let expiry = expiry.trim();
    if expiry.is_empty() {
        return Err("Expiry date is required".to_string());
    }
    if !EXPIRY_REGEX.is_match(expiry) {
        return Err("Expiry date must be in MM/YY format".to_string());
    }
    Ok(())
}

pub fn validate_cvv(cvv: &str) -> Result<(), String> {
    let cvv = cvv.trim();
    if cvv.is_empty() {
        return Err("CVV is required".to_string());
    }
    if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|c| c.is_ascii_digit()) {
        return Err("CVV must be 3 or 4 digits".to_string());
    }
    Ok(())
}
