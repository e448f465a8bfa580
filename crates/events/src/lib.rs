//! Live delivery pipeline: follow a log, filter it, fan it out.
//!
//! - [`follower`] -- tails an append-only file from its current end.
//! - [`pipeline`] -- decodes lines, runs the predicate chain and content
//!   mutation, and yields forwarding payloads.
//! - [`broadcast`] -- [`Broadcaster`] fans each payload out to every
//!   registered [`Subscription`] without letting one stalled subscriber
//!   hold up the rest.

pub mod broadcast;
pub mod error;
pub mod follower;
pub mod pipeline;

pub use broadcast::{
    BroadcastConfig, Broadcaster, DeliveryReport, SubscriberId, SubscriberInfo, Subscription, Teardown,
};
pub use error::SourceError;
pub use follower::{follow, FollowerConfig};
pub use pipeline::{connect_to_source, forward_payloads, process_line};
