//! HTTP surface: health probe and the WebSocket route

pub mod routes;

pub use routes::build_router;
