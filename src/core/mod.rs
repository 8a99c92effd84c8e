//! Core domain models for an integration run
//!
//! This module defines the run configuration, the context passed between
//! phases, and the outcomes setup tasks report.

pub mod config;
pub mod context;
pub mod error;
pub mod outcome;

pub use config::*;
pub use context::*;
pub use error::*;
pub use outcome::*;
