//! Database models split into domain-specific modules.

pub mod admin;
pub mod common;
pub mod order;
pub mod product;

pub use admin::*;
pub use common::*;
pub use order::*;
pub use product::*;
