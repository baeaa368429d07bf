//! Storage backends
//!
//! `core` defines the `ObjectStorage` seam; `memory` is the process-local
//! engine behind `memory:` URLs.

pub mod core;
pub mod memory;

pub use self::core::*;
pub use memory::MemoryStorage;
