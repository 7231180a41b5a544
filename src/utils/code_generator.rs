//! Short code generation and validation utilities.

use std::sync::LazyLock;

use crate::error::AppError;
use rand::Rng;
use rand::distr::Alphanumeric;
use regex::Regex;
use serde_json::json;

/// Default length of generated codes.
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Shape accepted for any code looked up on the redirect path.
static CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

/// Produces candidate short codes.
///
/// Uniqueness is not the generator's job: the link store rejects a
/// duplicate and the caller asks for another candidate.
#[cfg_attr(test, mockall::automock)]
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random alphanumeric codes from the thread-local CSPRNG.
#[derive(Debug, Clone)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect()
    }
}

/// Validates a short code taken from a request path.
///
/// # Rules
///
/// - Length: 1-64 characters
/// - Allowed characters: ASCII letters, digits, `_` and `-`
///
/// # Errors
///
/// Returns [`AppError::Validation`] if the code does not match.
///
/// # Examples
///
/// ```ignore
/// assert!(validate_code("aB3xY9").is_ok());
/// assert!(validate_code("bad code").is_err());
/// ```
pub fn validate_code(code: &str) -> Result<(), AppError> {
    if code.is_empty() {
        return Err(AppError::bad_request("Short code is required", json!({})));
    }

    if !CODE_PATTERN.is_match(code) {
        return Err(AppError::bad_request(
            "Short code may only contain letters, digits, '_' and '-' (max 64)",
            json!({ "provided_length": code.len() }),
        ));
    }

    Ok(())
}
