//! HTTP API module for health, metrics, monitor views and market switching.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
