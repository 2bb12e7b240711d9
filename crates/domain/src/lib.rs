//! `pt-domain` — shared types for the panel API client crates.
//!
//! Holds the error taxonomy every crate returns, the structured API error
//! built from the panel's JSON error envelope, serde-backed configuration,
//! the resource DTOs the client surfaces, and structured trace events.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod trace;

pub use api::{ApiError, ErrorDetail, ErrorSource, RateLimitInfo};
pub use error::{Error, Result};
