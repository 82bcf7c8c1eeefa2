#![deny(missing_docs)]
//! Discord transport adapter for the DM relay.

/// Discord transport configuration.
pub mod config;
/// `ChatGateway` implementation over the Discord HTTP API.
pub mod gateway;
/// Gateway event handler feeding the router.
pub mod handler;
/// Discord runtime entrypoint.
pub mod runner;
