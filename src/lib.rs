//! Cache-backed fetch client for dashboard data sources.
//!
//! The [`cache`] module holds the payload-agnostic client; [`services`] wires
//! it to the weather, film and nutrition APIs used by the dashboard.

pub mod cache;
pub mod config;
pub mod error;
pub mod services;

pub use error::CacheError;
