//! Transport connections and the factory that opens them
//!
//! A [`Connection`] is the exclusive transport of one request. It is created
//! by a [`ConnectionFactory`] handed to the request at construction, so tests
//! can substitute an in-memory transport per test case.

use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// Writable half of a request body
pub trait BodySink: Write + Send {
    /// Finish the body. No writes are accepted afterwards.
    fn close(&mut self) -> io::Result<()>;
}

/// Readable response body
pub trait BodySource: Read + Send {
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BodySource for io::Empty {}

impl BodySource for io::Cursor<Vec<u8>> {}

/// A single-use HTTP transport connection.
///
/// Request configuration (`set_*`, [`Connection::open_output`]) is only
/// valid until the exchange happens. The first call to any response
/// accessor sends the request; later calls observe the same response.
pub trait Connection: Send {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Set a request header, replacing any earlier value for `name`
    fn set_request_property(&mut self, name: &str, value: &str) -> io::Result<()>;

    fn request_property(&self, name: &str) -> Option<String>;

    /// Open the request body for writing
    fn open_output(&mut self) -> io::Result<Box<dyn BodySink>>;

    fn response_code(&mut self) -> io::Result<u16>;

    /// First value of a response header (case-insensitive name)
    fn header_field(&mut self, name: &str) -> io::Result<Option<String>>;

    /// Body of a successful response. Fails for error statuses.
    fn input_stream(&mut self) -> io::Result<Box<dyn BodySource>>;

    /// Body of an error response, if the server sent one
    fn error_stream(&mut self) -> Option<Box<dyn BodySource>>;

    /// Release the connection. Safe to call more than once.
    fn disconnect(&mut self);
}

/// Opens connections for requests
pub trait ConnectionFactory: Send + Sync {
    fn create(&self, url: &Url, method: &Method, proxy: Option<&ProxySettings>) -> io::Result<Box<dyn Connection>>;
}

/// HTTP proxy used when a connection is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
}

impl ProxySettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// Proxy URL in `http://host:port` form
    pub fn url(&self) -> String {
        format!("http://{self}")
    }
}

impl fmt::Display for ProxySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_url() {
        let proxy = ProxySettings::new("proxy.local", 3128);
        assert_eq!(proxy.url(), "http://proxy.local:3128");
        assert_eq!(proxy.to_string(), "proxy.local:3128");
    }
}
