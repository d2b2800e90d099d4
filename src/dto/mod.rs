//! Wire message structures exchanged with the console and the buzzers.

/// Payload fragments shared by several message types.
pub mod common;
/// Health endpoint response body.
pub mod health;
/// Envelope and message enums for the WebSocket protocol.
pub mod ws;
