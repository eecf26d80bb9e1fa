//! Client-side chat synchronization for the storefront.
//!
//! [`SyncCore`] is a single-owner state machine: it keeps the profile cache,
//! per-room message lists and the thread list consistent as gateway events
//! and user actions arrive. [`actor::spawn`] runs it on one tokio task and
//! executes its REST calls; [`http`] and [`ws`] are the bundled adapters for
//! the REST service and the gateway socket.

pub mod actor;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod profile;
pub mod reconcile;
pub mod rest;
pub mod seen;
pub mod subscriptions;
pub mod threads;
pub mod transport;
pub mod ws;

pub use actor::{Command, Snapshot, SyncHandle};
pub use config::SyncConfig;
pub use engine::{ConnectionState, RestCall, RestOutcome, SyncCore};
pub use error::{Result, SyncError};
pub use rest::RoomsApi;
pub use transport::{Transport, TransportEvent};
