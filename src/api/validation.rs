//! Input validation for API requests.
//!
//! Each validator returns `Err(message)` describing the first problem found.
//! Use `ValidationErrorBuilder` from the `error` module to collect them.
//! Checkout validators live in `engine::validation`.

use lazy_static::lazy_static;
use regex::Regex;

pub use crate::engine::validation::validate_email;

lazy_static! {
    static ref HTTP_URL_REGEX: Regex = Regex::new(
        r"^https?://[^\s/$.?#][^\s]*$"
    ).unwrap();
}

pub const MAX_PRODUCT_NAME_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 5000;
pub const MAX_SIZE_OPTIONS: usize = 20;

pub fn validate_product_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Product name is required".to_string());
    }
    if name.chars().count() > MAX_PRODUCT_NAME_LEN {
        return Err(format!(
            "Product name is too long (max {} characters)",
            MAX_PRODUCT_NAME_LEN
        ));
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<(), String> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(format!(
            "Description is too long (max {} characters)",
            MAX_DESCRIPTION_LEN
        ));
    }
    Ok(())
}

pub fn validate_stock(stock: i64) -> Result<(), String> {
    if stock < 0 {
        return Err("Stock cannot be negative".to_string());
    }
    Ok(())
}

pub fn validate_size_options(sizes: &[String]) -> Result<(), String> {
    if sizes.len() > MAX_SIZE_OPTIONS {
        return Err(format!("At most {} size options are allowed", MAX_SIZE_OPTIONS));
    }
    if sizes.iter().any(|s| s.trim().is_empty()) {
        return Err("Size options cannot be empty".to_string());
    }
    for (i, size) in sizes.iter().enumerate() {
        if sizes[..i].contains(size) {
            return Err(format!("Duplicate size option: {}", size));
        }
    }
    Ok(())
}

/// Validate an optional image URL (empty string is treated as no image)
pub fn validate_image_url(url: &Option<String>) -> Result<(), String> {
    match url {
        Some(u) if !u.is_empty() => {
            if u.len() > 2048 {
                return Err("Image URL is too long (max 2048 characters)".to_string());
            }
            if !HTTP_URL_REGEX.is_match(u) {
                return Err("Image URL must be an http(s) URL".to_string());
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
