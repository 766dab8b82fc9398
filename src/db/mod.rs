//! Database module: entity models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: typed domain entities returned by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `pricebot::db` — we re-export the
//! repository API and commonly used models for convenience.

pub mod model;
pub mod repo;

pub use model::{SubscriptionFields, SubscriptionRecord};
pub use repo::*;
