//! Default connection factory backed by the blocking reqwest client
//!
//! Each connection builds its own client with connection pooling disabled,
//! so no socket outlives the request that opened it. The request body is
//! collected in memory and sent when the response is first requested.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Proxy};
use tracing::debug;
use url::Url;

use crate::connection::{BodySink, BodySource, Connection, ConnectionFactory, ProxySettings};

/// Opens [`ReqwestConnection`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestConnectionFactory;

impl ConnectionFactory for ReqwestConnectionFactory {
    fn create(&self, url: &Url, method: &Method, proxy: Option<&ProxySettings>) -> io::Result<Box<dyn Connection>> {
        Ok(Box::new(ReqwestConnection::new(url.clone(), method.clone(), proxy.cloned())))
    }
}

type SharedBody = Arc<Mutex<Vec<u8>>>;

/// A single request/response exchange over reqwest
pub struct ReqwestConnection {
    url: Url,
    method: Method,
    proxy: Option<ProxySettings>,
    read_timeout: Option<Duration>,
    headers: HeaderMap,
    body: Option<SharedBody>,
    /// Outcome of the single send attempt; a failure is terminal
    exchange: Option<Result<Exchange, FailedExchange>>,
    disconnected: bool,
}

struct FailedExchange {
    kind: io::ErrorKind,
    message: String,
}

impl FailedExchange {
    fn to_io_error(&self) -> io::Error {
        io::Error::new(self.kind, self.message.clone())
    }
}

struct Exchange {
    status: u16,
    headers: HeaderMap,
    response: Option<Response>,
}

impl fmt::Debug for ReqwestConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestConnection")
            .field("url", &self.url.as_str())
            .field("method", &self.method)
            .field("proxy", &self.proxy)
            .field("sent", &self.exchange.is_some())
            .field("failed", &matches!(self.exchange, Some(Err(_))))
            .finish_non_exhaustive()
    }
}

impl ReqwestConnection {
    pub fn new(url: Url, method: Method, proxy: Option<ProxySettings>) -> Self {
        Self {
            url,
            method,
            proxy,
            read_timeout: None,
            headers: HeaderMap::new(),
            body: None,
            exchange: None,
            disconnected: false,
        }
    }

    fn ensure_configurable(&self) -> io::Result<()> {
        if self.disconnected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        if self.exchange.is_some() {
            return Err(io::Error::new(io::ErrorKind::Other, "already connected"));
        }
        Ok(())
    }

    fn build_client(&self) -> io::Result<Client> {
        let mut builder = Client::builder().pool_max_idle_per_host(0);
        if let Some(timeout) = self.read_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(Proxy::all(proxy.url()).map_err(to_io_error)?);
        }
        builder.build().map_err(to_io_error)
    }

    fn exchange(&mut self) -> io::Result<&mut Exchange> {
        if self.disconnected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        if self.exchange.is_none() {
            let outcome = self.send().map_err(|e| {
                debug!("Sending to {} failed: {}", self.url, e);
                FailedExchange {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            });
            self.exchange = Some(outcome);
        }
        match self.exchange.as_mut() {
            Some(Ok(exchange)) => Ok(exchange),
            Some(Err(failed)) => Err(failed.to_io_error()),
            None => Err(io::Error::new(io::ErrorKind::Other, "no response")),
        }
    }

    fn send(&mut self) -> io::Result<Exchange> {
        let client = self.build_client()?;
        let mut request = client.request(self.method.clone(), self.url.clone()).headers(self.headers.clone());
        if let Some(body) = &self.body {
            let bytes = std::mem::take(&mut *body.lock().unwrap_or_else(PoisonError::into_inner));
            request = request.body(bytes);
        }

        debug!("Sending {} {}", self.method, self.url);
        let response = request.send().map_err(to_io_error)?;
        let status = response.status().as_u16();
        debug!("Received status {} from {}", status, self.url);

        Ok(Exchange {
            status,
            headers: response.headers().clone(),
            response: Some(response),
        })
    }
}

impl Connection for ReqwestConnection {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.ensure_configurable()?;
        self.read_timeout = Some(timeout);
        Ok(())
    }

    fn set_request_property(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.ensure_configurable()?;
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let value = HeaderValue::from_str(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.headers.insert(name, value);
        Ok(())
    }

    fn request_property(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    fn open_output(&mut self) -> io::Result<Box<dyn BodySink>> {
        self.ensure_configurable()?;
        let body = self.body.get_or_insert_with(SharedBody::default).clone();
        Ok(Box::new(BufferedBody { body, closed: false }))
    }

    fn response_code(&mut self) -> io::Result<u16> {
        Ok(self.exchange()?.status)
    }

    fn header_field(&mut self, name: &str) -> io::Result<Option<String>> {
        Ok(self
            .exchange()?
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }

    fn input_stream(&mut self) -> io::Result<Box<dyn BodySource>> {
        let url = self.url.to_string();
        let exchange = self.exchange()?;
        if exchange.status >= 400 {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("server returned HTTP response code {} for URL {}", exchange.status, url),
            ));
        }
        exchange
            .response
            .take()
            .map(|response| Box::new(ResponseBody(response)) as Box<dyn BodySource>)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "response body already consumed"))
    }

    fn error_stream(&mut self) -> Option<Box<dyn BodySource>> {
        let Some(Ok(exchange)) = self.exchange.as_mut() else {
            return None;
        };
        if exchange.status < 400 {
            return None;
        }
        exchange
            .response
            .take()
            .map(|response| Box::new(ResponseBody(response)) as Box<dyn BodySource>)
    }

    fn disconnect(&mut self) {
        if !self.disconnected {
            debug!("Disconnecting from {}", self.url);
        }
        self.disconnected = true;
        self.exchange = None;
        self.body = None;
    }
}

/// Request body collected in memory until the exchange
struct BufferedBody {
    body: SharedBody,
    closed: bool,
}

impl Write for BufferedBody {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "request body closed"));
        }
        self.body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BodySink for BufferedBody {
    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

struct ResponseBody(Response);

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl BodySource for ResponseBody {}

fn to_io_error(error: reqwest::Error) -> io::Error {
    let kind = if error.is_timeout() {
        io::ErrorKind::TimedOut
    } else if error.is_connect() {
        io::ErrorKind::ConnectionRefused
    } else {
        io::ErrorKind::Other
    };
    io::Error::new(kind, error)
}
