//! User directory implementations.

pub mod in_memory;
pub mod seed;

pub use in_memory::InMemoryDirectory;
pub use seed::DirectorySeed;
