//! Utility functions for code generation, URL validation, and request handling.
//!
//! - [`code_generator`] - Short code generation and validation
//! - [`url_validator`] - Destination URL validation
//! - [`client_ip`] - Client address extraction for click partitioning

pub mod client_ip;
pub mod code_generator;
pub mod url_validator;
