//! Quietwire Key Lifecycle Core
//!
//! The server-facing half of the end-to-end encryption key lifecycle:
//! the row-level data model, the storage abstraction it lives in, the
//! group-key distribution protocol, and the read-triggered
//! disappearing-message scheduler.
//!
//! # Architecture
//!
//! Protocol logic is written as plain functions over a [`store::Store`]
//! handle so it can be driven synchronously in tests; the only async
//! surface is the [`disappearing::Scheduler`] loop that periodically runs
//! an otherwise-synchronous sweep. Push notifications to live sessions go
//! through the [`event::Notifier`] seam so transports stay out of this
//! crate.
//!
//! # Components
//!
//! - [`model`]: ids, storage rows, and conversation/user settings
//! - [`store`]: the `Store` trait plus an in-memory implementation
//! - [`group`]: group-key generation, per-member wrapping, unwrapping
//! - [`disappearing`]: read events, deletion deadlines, the sweep
//! - [`event`]: push events fired at the transport collaborator

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod disappearing;
mod error;
pub mod event;
pub mod group;
pub mod model;
pub mod store;

pub use error::{LifecycleError, StoreError};
