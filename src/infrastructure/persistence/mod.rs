//! Repository implementations.
//!
//! Concrete implementations of domain repository traits. The PostgreSQL
//! repositories use SQLx with bound parameters; the in-memory store backs
//! tests and local runs.
//!
//! # Repositories
//!
//! - [`PgLinkRepository`] - Link storage and retrieval
//! - [`PgClickRepository`] - Idempotent click ledger and dead letters
//! - [`InMemoryLinkStore`] - Both contracts in process memory

pub mod memory_store;
pub mod pg_click_repository;
pub mod pg_link_repository;

pub use memory_store::InMemoryLinkStore;
pub use pg_click_repository::PgClickRepository;
pub use pg_link_repository::PgLinkRepository;
