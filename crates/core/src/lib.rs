//! `rolegate-core`: shared building blocks for the identity subsystem.
//!
//! This crate holds **pure** value types (no crypto, no IO).

pub mod error;
pub mod name;

pub use error::{DomainError, DomainResult};
pub use name::{ApplicationName, Username};
