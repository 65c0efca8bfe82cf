//! # mailgate-token
//!
//! Compact, self-authenticating tokens for public email links.
//!
//! A token carries a value and an optional argument list through a URL query
//! parameter without any server-side lookup: the receiver verifies an
//! HMAC-SHA256 tag and gets the original fields back, or `None` if the token
//! was forged, truncated, or garbled in transit.
//!
//! Three trust modes are supported:
//! - [`EncodeMode::Basic`] — deterministic, HMAC only. Identical inputs
//!   produce identical tokens, which keeps generated links cacheable.
//! - [`EncodeMode::Salt`] — a random salt is mixed in, so repeated calls
//!   produce unrelated tokens and links cannot be correlated.
//! - [`EncodeMode::Encrypted`] — like `Salt`, but every field is additionally
//!   AES-256-CBC encrypted so the plaintext (e.g. a raw email address) is not
//!   recoverable from the link without the secret.
//!
//! ## Example
//!
//! ```
//! use mailgate_token::{EncodeMode, Encoder};
//!
//! let encoder = Encoder::new(b"secret".to_vec(), EncodeMode::Basic);
//! let token = encoder.encode("a@example.com", &[Some("news")]);
//!
//! let decoded = encoder.decode(&token).unwrap();
//! assert_eq!(decoded[0].as_deref(), Some("a@example.com"));
//! assert_eq!(decoded[1].as_deref(), Some("news"));
//!
//! // Tampering is detected, not reported as an error.
//! assert_eq!(encoder.decode(&token[..token.len() - 1]), None);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod codec;

pub use codec::{EncodeMode, Encoder, SecretError};
