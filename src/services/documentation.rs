//! OpenAPI document for the HTTP surface.
//!
//! Only the upgrade endpoint and the health route live here; the real
//! protocol runs over the WebSocket and is documented in the message types.

use utoipa::OpenApi;

use crate::dto::{
    common::{BuzzerSummary, ClientTimestamps, ConsoleConfig},
    health::HealthResponse,
};

/// Aggregated OpenAPI documentation served under `/docs`.
#[derive(OpenApi)]
#[openapi(
    paths(crate::routes::health::healthcheck, crate::routes::websocket::ws_handler),
    components(schemas(HealthResponse, BuzzerSummary, ClientTimestamps, ConsoleConfig))
)]
pub struct ApiDoc;
