//! Shared wire types for the storefront chat: REST payloads, gateway frames,
//! and the canonical message model the sync core works with.

pub mod api;
pub mod events;
pub mod models;

mod wire;
