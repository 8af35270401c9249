//! HTTP API for the Cursor bridge.
//!
//! ## Endpoints
//!
//! - `GET /health` - Configuration summary
//! - `GET /v1/models` - Models reported by `cursor-agent --list-models` (cached)
//! - `POST /v1/chat/completions` - OpenAI-compatible chat completion (optionally SSE)
//!
//! When an API key is configured, all endpoints require `Authorization: Bearer <key>`.

mod auth;
mod chat;
mod routes;
pub mod types;

pub use routes::{router, serve, AppState};
pub use types::ApiError;
