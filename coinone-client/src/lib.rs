//! Coinone API Client
//!
//! Signed and public calls against the Coinone REST API on top of the
//! single-use requests of `coinone-http`.
//!
//! Features:
//! - HMAC-SHA512 request signing with per-call nonces
//! - Public GET calls with raw query strings
//! - Tagged responses with the legacy `error : <code>, message : <body>` form
//! - TOML and environment configuration

pub mod client;
pub mod config;
pub mod error;
pub mod signer;

pub use client::{query_string, ApiClient, ApiResponse, Params, RawBody, ResponseExtractor};
pub use config::ClientConfig;
pub use error::{ClientError, ClientErrorCategory, ClientResult};
pub use signer::{SignedHeaders, Signer, HEADER_PAYLOAD, HEADER_SIGNATURE};
