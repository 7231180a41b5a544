//! Core domain entities.
//!
//! - [`ShortLink`] - A shortened URL mapping with its click counter
//! - [`Click`] - A click applied to the ledger
//! - [`DeadLetter`] - A click message set aside after repeated failures
//!
//! Creation inputs use separate structs (`NewLink`, `NewClick`) so that
//! store-assigned fields never come from callers.

pub mod click;
pub mod link;

pub use click::{Click, ClickOutcome, DeadLetter, LedgerSummary, NewClick};
pub use link::{NewLink, ShortLink, Unresolvable};
