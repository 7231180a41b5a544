//! Domain layer containing business entities and logic.
//!
//! Defines entities, repository and channel contracts, and the background
//! click consumer, independent of any particular database, cache or broker.
//!
//! # Architecture
//!
//! - [`entities`] - Core business data structures
//! - [`repositories`] - Data access trait definitions
//! - [`event_channel`] - Ordered, partitioned, commit-gated message log contract
//! - [`click_event`] - Click message model
//! - [`click_worker`] - Click consumer state machine
//!
//! # Click Processing Flow
//!
//! 1. Redirect handler resolves a code through the resolver
//! 2. A [`click_event::ClickEvent`] is published to the channel without waiting
//! 3. [`click_worker::ClickConsumer`] reads it and applies it through
//!    [`repositories::ClickRepository`]
//! 4. The channel position is committed only after the click is persisted

pub mod click_event;
pub mod click_worker;
pub mod entities;
pub mod event_channel;
pub mod repositories;
