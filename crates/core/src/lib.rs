//! Domain logic for the log-to-subscriber delivery service.
//!
//! Everything in this crate is synchronous and free of I/O:
//!
//! - [`Event`] -- one decoded log line, keyed by dotted field paths.
//! - [`parse_owner`] -- owner extraction from location identifiers.
//! - [`PredicateChain`] -- ordered match rules deciding what gets forwarded.
//! - [`mutation`] -- nested JSON unwrap / transform / rewrap for content
//!   that must be altered before it leaves the process.

pub mod config;
pub mod error;
pub mod event;
pub mod mutation;
pub mod owner;
pub mod rules;

pub use config::RuleConfig;
pub use error::CoreError;
pub use event::{Event, FieldMap};
pub use mutation::{ContentMutation, Mutation, NestedPath, Redaction};
pub use owner::parse_owner;
pub use rules::{FriendLocationRule, FriendOfflineRule, MatchResult, MatchRule, PredicateChain};
