//! Coinone HTTP
//!
//! A small blocking HTTP layer built around a single-use request object.
//! Each [`HttpRequest`] owns one connection that is created lazily on first
//! use and released on [`HttpRequest::disconnect`] or drop.
//!
//! Features:
//! - Fluent header, timeout and proxy configuration
//! - URL-encoded form bodies written incrementally
//! - Charset-aware request and response bodies
//! - Transparent gzip response decoding
//! - Upload progress callbacks
//! - Pluggable transport through [`ConnectionFactory`]

pub mod charset;
pub mod close;
pub mod connection;
pub mod error;
pub mod output;
pub mod param;
pub mod progress;
pub mod request;
pub mod stream;
pub mod transport;

pub use charset::{valid_charset, Charset, CHARSET_UTF8};
pub use close::{using, ClosePolicy, Closeable};
pub use connection::{BodySink, BodySource, Connection, ConnectionFactory, ProxySettings};
pub use error::{RequestError, RequestErrorCategory, RequestResult};
pub use output::RequestOutput;
pub use param::extract_param;
pub use progress::{NoProgress, UploadProgress};
pub use request::{HttpRequest, DEFAULT_BUFFER_SIZE};
pub use reqwest::Method;
pub use stream::ResponseStream;
pub use transport::{ReqwestConnection, ReqwestConnectionFactory};

pub const HEADER_ACCEPT_ENCODING: &str = "Accept-Encoding";
pub const HEADER_CONTENT_ENCODING: &str = "Content-Encoding";
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";

pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_JSON: &str = "application/json";

pub const ENCODING_GZIP: &str = "gzip";
pub const PARAM_CHARSET: &str = "charset";

pub const HTTP_OK: u16 = 200;
pub const HTTP_BAD_REQUEST: u16 = 400;
