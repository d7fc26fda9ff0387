//! Types shared across the crate: geometry, errors, configuration and
//! cancellation

pub mod cancel;
pub mod config;
pub mod error;
pub mod geometry;
