//! HTTP surface: router, handlers and auth

pub mod middleware;
pub mod routes;

pub use routes::build_router;
