//! HTTP surface: WebSocket upgrade, health and stats

mod routes;

pub use routes::build_router;
