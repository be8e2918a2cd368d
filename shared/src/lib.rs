//! Shared types and models for the Restaurant Management Platform
//!
//! This crate contains the domain models and pure stock-valuation logic
//! shared between the backend and its test suites.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
