//! Route builders.

pub mod common;
pub mod entity;

pub use common::*;
pub use entity::*;
