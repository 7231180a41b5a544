//! Event channel implementations.
//!
//! - [`redis_stream`] - Durable channel on Redis Streams consumer groups
//! - [`memory`] - In-process channel for tests and Redis-less deployments

pub mod memory;
pub mod redis_stream;

pub use memory::{MemoryChannel, MemorySubscriber};
pub use redis_stream::{RedisStreamConfig, RedisStreamPublisher, RedisStreamSubscriber};
