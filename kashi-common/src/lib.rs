//! # Kashi Common Library
//!
//! Shared code for Kashi services:
//! - Common error type
//! - Bootstrap configuration loading (CLI → ENV → TOML → defaults)
//! - Scratch directory initialization
//! - Resource token helpers

pub mod config;
pub mod error;
pub mod token;

pub use error::{Error, Result};
pub use token::ResourceToken;
