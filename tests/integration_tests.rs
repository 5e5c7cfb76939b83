//! Integration Tests Entry Point
//!
//! Tests are organized by module:
//! - `scenarios/` - end-to-end flows over in-memory collaborators
//! - `common/` - Shared test utilities

mod common;
mod scenarios;
