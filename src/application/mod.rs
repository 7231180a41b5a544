//! Application layer services implementing business logic.
//!
//! This layer orchestrates domain operations by coordinating repository calls,
//! the resolution cache and the click channel. Services receive every
//! collaborator at construction time and provide a clean API for HTTP
//! handlers and the operator CLI.
//!
//! # Available Services
//!
//! - [`services::link_service::LinkService`] - Short link creation and administration
//! - [`services::resolver::Resolver`] - Cache-aside redirect resolution
//! - [`services::click_publisher::ClickPublisher`] - Non-blocking click producer

pub mod services;
