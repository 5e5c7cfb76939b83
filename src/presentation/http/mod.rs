//! HTTP Surface
//!
//! The realtime upgrade endpoint plus operational endpoints.

pub mod routes;

pub use routes::create_router;
