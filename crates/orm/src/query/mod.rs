//! OSQL query support
//!
//! - `types`: statement AST shared by the parser and the builder
//! - `parser`: OSQL text to AST
//! - `params`: placeholder binding
//! - `builder`: typed construction of statements
//! - `execution`: filtering, ordering and paging of documents

pub mod builder;
pub mod execution;
pub mod params;
pub mod parser;
pub mod types;

pub use builder::QueryBuilder;
pub use params::{BoundQuery, QueryParams};
pub use parser::parse;
pub use types::{Condition, Operand, OrderDirection, Param, QueryOperator, SelectQuery};
