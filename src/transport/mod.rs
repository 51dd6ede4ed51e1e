//! Transport module - drives the protocol over tokio byte streams.
//!
//! Provides:
//! - [`serve`] - TCP accept loop that stops when the exit flag is set
//! - [`serve_connection`] - one server-side connection
//! - [`exchange`] - one client call

mod tcp;

pub use tcp::{exchange, serve, serve_connection};
