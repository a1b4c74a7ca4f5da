//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Use these types
//! for every value that grants access to a media session: transport access
//! tokens, backend API keys, and similar material.
//!
//! `SecretString` implements `Debug` with redaction, so any struct that
//! derives `Debug` and holds a secret is safe to log via `{:?}` or tracing.
//! Secrets are zeroized when dropped.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct JoinTicket {
//!     channel: String,
//!     access_token: SecretString,
//! }
//!
//! let ticket = JoinTicket {
//!     channel: "townhall".to_string(),
//!     access_token: SecretString::from("006abc"),
//! };
//!
//! // Safe: the token is redacted
//! println!("{:?}", ticket);
//!
//! // Access requires an explicit call
//! let token: &str = ticket.access_token.expose_secret();
//! ```
//!
//! # Serde Integration
//!
//! With the `serde` feature enabled, secrets can be deserialized from JSON,
//! which is how credential backend responses are decoded:
//!
//! ```rust
//! use serde::Deserialize;
//! use common::secret::SecretString;
//!
//! #[derive(Debug, Deserialize)]
//! struct TokenResponse {
//!     token: SecretString,
//! }
//!
//! let json = r#"{"token": "006abc"}"#;
//! let response: TokenResponse = serde_json::from_str(json).unwrap();
//! println!("{:?}", response);
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
