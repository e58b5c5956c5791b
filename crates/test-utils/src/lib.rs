//! Shared test utilities for the adaptor workspace.
//!
//! This crate provides common testing infrastructure including:
//! - The shipped definitions document and small hand-written variants
//! - Request documents used across crates
//! - Generators for decoded field headers and fake GRIB payloads
//!
//! It deliberately depends on no workspace crate so that every crate can
//! use it as a dev-dependency.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
pub use paths::*;
