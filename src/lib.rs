//! Messaging core of the RYD rental marketplace: thread list, message list
//! and the optimistic send pipeline, plus a local SQLite stand-in for the
//! hosted backend.

pub mod common;
pub mod utils;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "server")]
pub mod server;
