#![cfg_attr(test, allow(clippy::expect_used))]

//! Bizdir Shared Types and Utilities
//!
//! This crate contains row types, money helpers and database utilities
//! shared across the Bizdir platform.

pub mod db;
pub mod types;

pub use db::*;
pub use types::*;
