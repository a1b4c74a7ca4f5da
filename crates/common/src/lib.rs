//! Common utilities and types shared across the broadcast client crates.

#![warn(clippy::pedantic)]

/// Module for identifier newtypes and session vocabulary types
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;
