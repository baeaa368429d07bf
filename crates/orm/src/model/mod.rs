//! Model System - Modular model trait system for persistent entities
//!
//! - `core_trait`: Core Model trait definition
//! - `crud_operations`: find, save, delete, refresh
//! - `query_methods`: collection queries and the query builder entry point
//! - `identity`: identity-based equality, hashing and display

pub mod core_trait;
pub mod crud_operations;
pub mod identity;
pub mod query_methods;

// Re-export main types and traits for convenience
pub use core_trait::Model;
pub use crud_operations::CrudOperations;
pub use identity::{Keyed, ModelIdentity};
pub use query_methods::QueryMethods;

/// Composite trait that includes all model functionality
pub trait FullModel: Model + CrudOperations + QueryMethods + ModelIdentity {}

impl<T> FullModel for T where T: Model + CrudOperations + QueryMethods + ModelIdentity {}
