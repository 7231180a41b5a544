//! Infrastructure layer for external integrations.
//!
//! This layer implements interfaces defined by the domain layer, providing
//! concrete implementations for data persistence, caching and the click
//! event channel.
//!
//! # Modules
//!
//! - [`cache`] - Resolution cache tiers (Redis, in-process and no-op)
//! - [`channel`] - Event channels (Redis Streams and in-process)
//! - [`persistence`] - PostgreSQL and in-memory repository implementations

pub mod cache;
pub mod channel;
pub mod persistence;
