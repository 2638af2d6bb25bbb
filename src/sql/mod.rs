//! SQL for the PostgreSQL document backend: statement builders and bind values.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
