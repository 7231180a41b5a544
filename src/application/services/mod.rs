//! Business logic services for the application layer.

pub mod click_publisher;
pub mod link_service;
pub mod resolver;

pub use click_publisher::ClickPublisher;
pub use link_service::{LinkService, LinkSettings};
pub use resolver::{Resolver, Visitor};
