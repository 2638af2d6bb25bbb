//! HTTP handlers for the persistence endpoints.

pub mod entity;
pub use entity::*;
