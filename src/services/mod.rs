//! Business logic services: connection handling, game flow, streaming, ops.

/// Fan-out helpers toward the console and the buzzers.
pub mod broadcaster;
/// Handlers for identified buzzer messages.
pub mod buzzer_service;
/// Handlers for identified console messages.
pub mod console_service;
/// OpenAPI document assembly.
pub mod documentation;
/// Session engine orchestration (questions, answers, buzz arbitration).
pub mod game_service;
/// Health snapshot assembly.
pub mod health_service;
/// Jingle chunk streaming pipeline.
pub mod jingle_service;
/// WebSocket lifecycle: identification, heartbeats, receive loops.
pub mod websocket_service;
