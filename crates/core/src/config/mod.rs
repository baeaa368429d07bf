pub mod database;
pub mod environment;
pub mod sources;
pub mod validation;

pub use database::*;
pub use environment::*;
pub use sources::*;
pub use validation::*;
