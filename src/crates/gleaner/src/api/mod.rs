//! The HTTP surface: transport webhook plus the admin API.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;

pub use routes::create_router;
