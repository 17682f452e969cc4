//! `rolegate-infra`: storage-side implementations of the auth contracts.
//!
//! Only an in-memory directory ships here (dev/test and seeded deployments);
//! a relational implementation plugs into the same traits.

pub mod directory;
pub mod password;

pub use directory::{DirectorySeed, InMemoryDirectory};
