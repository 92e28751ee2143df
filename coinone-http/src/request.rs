//! The single-use HTTP request
//!
//! An [`HttpRequest`] owns exactly one connection. The connection is created
//! on first use (a timeout, a header, a body write or a response accessor);
//! until then the request is configuring and a proxy may still be chosen.
//! Once the response has been requested, the body is closed for good and
//! request headers can no longer change.

use std::fmt;
use std::io::{self, BufReader, Read};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use tracing::{debug, warn};
use url::Url;

use crate::charset::{valid_charset, Charset};
use crate::close::{using, ClosePolicy};
use crate::connection::{Connection, ConnectionFactory, ProxySettings};
use crate::output::RequestOutput;
use crate::param::extract_param;
use crate::progress::{NoProgress, UploadProgress};
use crate::stream::ResponseStream;
use crate::transport::ReqwestConnectionFactory;
use crate::{
    RequestError, RequestResult, CONTENT_TYPE_FORM, ENCODING_GZIP, HEADER_ACCEPT_ENCODING, HEADER_CONTENT_ENCODING,
    HEADER_CONTENT_LENGTH, HEADER_CONTENT_TYPE, HTTP_BAD_REQUEST, HTTP_OK, PARAM_CHARSET,
};

/// Default size of body buffers
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

// Upper bound on the response buffer preallocated from Content-Length
const MAX_PREALLOCATION: usize = 1 << 20;

enum ConnectionState {
    Configuring { proxy: Option<ProxySettings> },
    Active(Box<dyn Connection>),
    Disconnected,
}

enum OutputState {
    Pending,
    Open(RequestOutput),
    /// The request has been handed to the transport
    Sent,
}

/// A single-use HTTP request
pub struct HttpRequest {
    url: Url,
    method: Method,
    factory: Arc<dyn ConnectionFactory>,
    connection: ConnectionState,
    output: OutputState,
    form: bool,
    buffer_size: usize,
    close_policy: ClosePolicy,
    progress: Arc<dyn UploadProgress>,
    upload_size: Option<u64>,
    uncompress: bool,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("url", &self.url.as_str())
            .field("method", &self.method)
            .field("active", &self.is_active())
            .field("form", &self.form)
            .field("close_policy", &self.close_policy)
            .finish_non_exhaustive()
    }
}

impl HttpRequest {
    /// Create a request using the default reqwest-backed transport
    pub fn new(url: &str, method: Method) -> RequestResult<Self> {
        Self::with_factory(url, method, Arc::new(ReqwestConnectionFactory))
    }

    /// Create a request whose connection comes from `factory`
    pub fn with_factory(url: &str, method: Method, factory: Arc<dyn ConnectionFactory>) -> RequestResult<Self> {
        let url = Url::parse(url)?;
        Ok(Self {
            url,
            method,
            factory,
            connection: ConnectionState::Configuring { proxy: None },
            output: OutputState::Pending,
            form: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            close_policy: ClosePolicy::default(),
            progress: Arc::new(NoProgress),
            upload_size: None,
            uncompress: true,
        })
    }

    pub fn get(url: &str) -> RequestResult<Self> {
        Self::new(url, Method::GET)
    }

    pub fn post(url: &str) -> RequestResult<Self> {
        Self::new(url, Method::POST)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Whether the connection has been created and not yet released
    pub fn is_active(&self) -> bool {
        matches!(self.connection, ConnectionState::Active(_))
    }

    // ---- configuration -------------------------------------------------

    /// Route the connection through an HTTP proxy.
    ///
    /// Only legal before the connection exists.
    pub fn proxy(&mut self, host: impl Into<String>, port: u16) -> RequestResult<&mut Self> {
        let ConnectionState::Configuring { proxy } = &mut self.connection else {
            return Err(RequestError::InvalidState("proxy must be set before the connection is created"));
        };
        *proxy = Some(ProxySettings::new(host, port));
        Ok(self)
    }

    /// Set the socket read timeout. Creates the connection.
    pub fn read_timeout(&mut self, timeout_ms: u64) -> RequestResult<&mut Self> {
        self.ensure_unsent()?;
        self.connection()?.set_read_timeout(Duration::from_millis(timeout_ms))?;
        Ok(self)
    }

    /// Set a request header; a later value for the same name replaces it.
    ///
    /// Headers are fixed once the request body has been opened.
    pub fn header(&mut self, name: &str, value: &str) -> RequestResult<&mut Self> {
        self.ensure_body_pending()?;
        self.connection()?.set_request_property(name, value)?;
        Ok(self)
    }

    pub fn headers<I, K, V>(&mut self, headers: I) -> RequestResult<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self.header(name.as_ref(), value.as_ref())?;
        }
        Ok(self)
    }

    /// Set `Content-Type`, appending `; charset=<charset>` when one is given
    pub fn content_type(&mut self, content_type: &str, charset: Option<&str>) -> RequestResult<&mut Self> {
        match charset {
            Some(charset) if !charset.is_empty() => {
                self.header(HEADER_CONTENT_TYPE, &format!("{content_type}; {PARAM_CHARSET}={charset}"))
            }
            _ => self.header(HEADER_CONTENT_TYPE, content_type),
        }
    }

    /// Ask the server for a gzip-encoded response
    pub fn accept_gzip_encoding(&mut self) -> RequestResult<&mut Self> {
        self.header(HEADER_ACCEPT_ENCODING, ENCODING_GZIP)
    }

    /// Decode gzip responses transparently (on by default)
    pub fn uncompress(&mut self, uncompress: bool) -> &mut Self {
        self.uncompress = uncompress;
        self
    }

    pub fn buffer_size(&mut self, size: usize) -> RequestResult<&mut Self> {
        if size == 0 {
            return Err(RequestError::InvalidArgument("buffer size must be greater than zero".to_string()));
        }
        self.buffer_size = size;
        Ok(self)
    }

    pub fn close_policy(&mut self, policy: ClosePolicy) -> &mut Self {
        self.close_policy = policy;
        self
    }

    /// Shorthand for [`ClosePolicy::Ignore`] / [`ClosePolicy::Propagate`]
    pub fn ignore_close_errors(&mut self, ignore: bool) -> &mut Self {
        self.close_policy(ClosePolicy::from_ignore_flag(ignore))
    }

    /// Callback invoked after every chunk written to the request body
    pub fn progress<P: UploadProgress + 'static>(&mut self, callback: P) -> &mut Self {
        self.progress = Arc::new(callback);
        if let OutputState::Open(output) = &mut self.output {
            output.set_progress(self.progress.clone());
        }
        self
    }

    /// Declare the total upload size reported to the progress callback
    pub fn upload_size(&mut self, total: u64) -> &mut Self {
        self.upload_size = Some(total);
        if let OutputState::Open(output) = &mut self.output {
            output.set_total(Some(total));
        }
        self
    }

    // ---- request body --------------------------------------------------

    /// Add form fields encoded as UTF-8
    pub fn form<I, K, V>(&mut self, values: I) -> RequestResult<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.form_with_charset(values, None)
    }

    pub fn form_with_charset<I, K, V>(&mut self, values: I, charset: Option<&str>) -> RequestResult<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in values {
            self.form_field(name.as_ref(), Some(value.as_ref()), charset)?;
        }
        Ok(self)
    }

    /// Append one `name=value` pair to a URL-encoded form body.
    ///
    /// The first field sets the form Content-Type (UTF-8 unless `charset`
    /// says otherwise); later fields are separated by `&`. A missing value
    /// is written as empty. An unknown charset or a character it cannot
    /// represent is a transport error.
    pub fn form_field(&mut self, name: &str, value: Option<&str>, charset: Option<&str>) -> RequestResult<&mut Self> {
        let (name, value) = Charset::for_optional_label(charset)
            .and_then(|encoding| {
                let name = encoding.form_encode(name)?;
                let value = value.map(|v| encoding.form_encode(v)).transpose()?;
                Ok((name, value))
            })
            .map_err(RequestError::into_transport)?;

        let first = !self.form;
        if first {
            self.content_type(CONTENT_TYPE_FORM, Some(valid_charset(charset)))?;
            self.form = true;
        }

        let output = self.open_output()?;
        if !first {
            output.write_bytes(b"&")?;
        }
        output.write_bytes(name.as_bytes())?;
        output.write_bytes(b"=")?;
        if let Some(value) = value {
            output.write_bytes(value.as_bytes())?;
        }
        Ok(self)
    }

    /// Write raw bytes to the request body
    pub fn send_bytes(&mut self, bytes: &[u8]) -> RequestResult<&mut Self> {
        self.open_output()?.write_bytes(bytes)?;
        Ok(self)
    }

    /// Write text to the request body in the Content-Type charset
    pub fn send_str(&mut self, text: &str) -> RequestResult<&mut Self> {
        self.open_output()?.write_str(text)?;
        Ok(self)
    }

    /// Copy a reader into the request body, one buffer at a time
    pub fn send_reader<R: Read>(&mut self, mut reader: R) -> RequestResult<&mut Self> {
        let chunk_size = self.buffer_size;
        self.open_output()?.copy_from(&mut reader, chunk_size)?;
        Ok(self)
    }

    // ---- response ------------------------------------------------------

    /// HTTP status code. Sends the request on first call.
    pub fn code(&mut self) -> RequestResult<u16> {
        self.close_output()?;
        Ok(self.connection()?.response_code()?)
    }

    /// Whether the status code is 200
    pub fn ok(&mut self) -> RequestResult<bool> {
        Ok(self.code()? == HTTP_OK)
    }

    /// First value of a response header
    pub fn response_header(&mut self, name: &str) -> RequestResult<Option<String>> {
        self.close_output()?;
        Ok(self.connection()?.header_field(name)?)
    }

    pub fn content_encoding(&mut self) -> RequestResult<Option<String>> {
        self.response_header(HEADER_CONTENT_ENCODING)
    }

    /// Declared Content-Length; absent or unparseable values are `None`
    pub fn content_length(&mut self) -> RequestResult<Option<u64>> {
        Ok(self
            .response_header(HEADER_CONTENT_LENGTH)?
            .and_then(|value| value.trim().parse().ok()))
    }

    /// A parameter of a response header, e.g. the charset of Content-Type
    pub fn parameter(&mut self, header_name: &str, param_name: &str) -> RequestResult<Option<String>> {
        Ok(self
            .response_header(header_name)?
            .and_then(|value| extract_param(&value, param_name)))
    }

    /// Charset declared by the response Content-Type
    pub fn charset(&mut self) -> RequestResult<Option<String>> {
        self.parameter(HEADER_CONTENT_TYPE, PARAM_CHARSET)
    }

    /// The response body stream.
    ///
    /// Error statuses read the error stream, falling back to the regular
    /// stream, and then to an empty one when no content was declared.
    pub fn stream(&mut self) -> RequestResult<ResponseStream> {
        let source = if self.code()? < HTTP_BAD_REQUEST {
            self.connection()?.input_stream()?
        } else {
            let error_stream = self.connection()?.error_stream();
            match error_stream {
                Some(source) => source,
                None => match self.connection()?.input_stream() {
                    Ok(source) => source,
                    Err(e) if self.content_length()?.unwrap_or(0) > 0 => return Err(e.into()),
                    Err(_) => Box::new(io::empty()),
                },
            }
        };

        let gzip = self.uncompress
            && self
                .content_encoding()?
                .is_some_and(|encoding| encoding.trim().eq_ignore_ascii_case(ENCODING_GZIP));
        Ok(if gzip {
            ResponseStream::gzip(source)
        } else {
            ResponseStream::plain(source)
        })
    }

    /// The response stream behind a buffer of the configured size
    pub fn buffer(&mut self) -> RequestResult<BufReader<ResponseStream>> {
        Ok(BufReader::with_capacity(self.buffer_size, self.stream()?))
    }

    /// Read the whole response body
    pub fn bytes(&mut self) -> RequestResult<Vec<u8>> {
        let capacity = self
            .content_length()?
            .and_then(|len| usize::try_from(len).ok())
            .map_or(0, |len| len.min(MAX_PREALLOCATION));
        let input = self.buffer()?;
        using(input, self.close_policy, |input| {
            let mut body = Vec::with_capacity(capacity);
            input.read_to_end(&mut body)?;
            Ok(body)
        })
    }

    /// Response body decoded with the response charset (UTF-8 if undeclared)
    pub fn body(&mut self) -> RequestResult<String> {
        self.body_with_charset(None)
    }

    /// Response body decoded with `charset`, or the response charset if `None`
    pub fn body_with_charset(&mut self, charset: Option<&str>) -> RequestResult<String> {
        let label = match charset {
            Some(charset) => Some(charset.to_string()),
            None => self.charset()?,
        };
        let charset = Charset::for_optional_label(label.as_deref())?;
        Ok(charset.decode(self.bytes()?))
    }

    /// Close any open body, then release the connection. Further use of
    /// the request fails.
    pub fn disconnect(&mut self) {
        if let Err(e) = self.close_output() {
            warn!("Discarding request body close error on disconnect: {}", e);
        }
        if let ConnectionState::Active(connection) = &mut self.connection {
            connection.disconnect();
        }
        self.connection = ConnectionState::Disconnected;
        self.output = OutputState::Sent;
    }

    // ---- internals -----------------------------------------------------

    fn ensure_body_pending(&self) -> RequestResult<()> {
        match self.output {
            OutputState::Pending => Ok(()),
            OutputState::Open(_) => Err(RequestError::InvalidState("request body already opened")),
            OutputState::Sent => Err(RequestError::InvalidState("request already sent")),
        }
    }

    fn ensure_unsent(&self) -> RequestResult<()> {
        match self.output {
            OutputState::Sent => Err(RequestError::InvalidState("request already sent")),
            _ => Ok(()),
        }
    }

    fn connection(&mut self) -> RequestResult<&mut (dyn Connection + 'static)> {
        if let ConnectionState::Configuring { proxy } = &self.connection {
            let proxy = proxy.clone();
            let connection = self.factory.create(&self.url, &self.method, proxy.as_ref())?;
            debug!(
                "Created connection for {} {}{}",
                self.method,
                self.url,
                proxy.map(|p| format!(" via proxy {p}")).unwrap_or_default()
            );
            self.connection = ConnectionState::Active(connection);
        }
        match &mut self.connection {
            ConnectionState::Active(connection) => Ok(connection.as_mut()),
            ConnectionState::Configuring { .. } => Err(RequestError::InvalidState("connection not created")),
            ConnectionState::Disconnected => Err(RequestError::InvalidState("request already disconnected")),
        }
    }

    fn open_output(&mut self) -> RequestResult<&mut RequestOutput> {
        if let OutputState::Pending = self.output {
            let buffer_size = self.buffer_size;
            let progress = self.progress.clone();
            let total = self.upload_size;
            let connection = self.connection()?;
            let label = connection
                .request_property(HEADER_CONTENT_TYPE)
                .and_then(|value| extract_param(&value, PARAM_CHARSET));
            let charset = Charset::for_optional_label(label.as_deref())?;
            let sink = connection.open_output()?;
            self.output = OutputState::Open(RequestOutput::new(sink, charset, buffer_size, progress, total));
        }
        match &mut self.output {
            OutputState::Open(output) => Ok(output),
            OutputState::Pending => Err(RequestError::InvalidState("request body not opened")),
            OutputState::Sent => Err(RequestError::InvalidState("request body already sent")),
        }
    }

    /// Finish the request body exactly once; later calls are no-ops
    fn close_output(&mut self) -> RequestResult<()> {
        let state = std::mem::replace(&mut self.output, OutputState::Sent);
        if let OutputState::Open(output) = state {
            using(output, self.close_policy, |output| {
                debug!("Closing request output after {} bytes", output.written());
                Ok(())
            })?;
        }
        Ok(())
    }
}

impl Drop for HttpRequest {
    fn drop(&mut self) {
        if self.is_active() {
            self.disconnect();
        }
    }
}
