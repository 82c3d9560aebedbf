//! Quietwire Client
//!
//! Per-user session context for the key lifecycle. Owns the local half of
//! the protocol: the identity keypair, the session-key and group-key
//! caches, and the API surface the UI layer calls.
//!
//! # Architecture
//!
//! One [`ClientSession`] per logged-in user. The caches live inside the
//! session as an explicit [`KeyCache`] object rather than module-level
//! state, so a test harness can simulate several users in one process and
//! multi-account clients get isolation for free. All key material stays
//! on the device; only public keys and ciphertext cross the [`Store`]
//! boundary.
//!
//! # Components
//!
//! - [`ClientSession`]: the session context and API surface
//! - [`KeyCache`]: per-conversation and per-group symmetric key caches
//! - [`DisappearingToggle`]: result of flipping the disappearing toggle

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cache;
mod session;

pub use cache::KeyCache;
pub use quietwire_core::{LifecycleError, store::Store};
pub use session::{ClientSession, DisappearingToggle};
