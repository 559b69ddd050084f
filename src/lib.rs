pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;

// Use cases and the ports they depend on
pub mod app;
// Adapters: HTTP, document store
pub mod infra;
