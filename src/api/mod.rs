//! HTTP API module.
//!
//! REST endpoints for conversation listing and message history, plus the
//! WebSocket upgrade route for the live relay.

mod error;
mod handlers;
mod routes;
mod state;

#[allow(unused_imports)]
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
