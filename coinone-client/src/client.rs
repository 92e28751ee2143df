//! Coinone REST client
//!
//! Calls without parameters are private: they are signed and sent as a POST
//! with an empty body. Calls with parameters are public: a GET with the
//! parameters appended as a raw query string.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use coinone_http::{ConnectionFactory, HttpRequest, Method, ReqwestConnectionFactory};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::signer::Signer;
use crate::{ClientError, ClientResult};

/// Query or form parameters, kept in key order
pub type Params = BTreeMap<String, String>;

/// Outcome of an API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse {
    /// Status 200 with the extracted payload
    Success(String),
    /// Any other status with the raw response body
    Failure { code: u16, body: String },
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success(_))
    }

    /// `Success` as `Ok`, `Failure` as [`ClientError::Api`]
    pub fn into_result(self) -> ClientResult<String> {
        match self {
            ApiResponse::Success(body) => Ok(body),
            ApiResponse::Failure { code, body } => Err(ClientError::Api { code, body }),
        }
    }

    /// The single-string form: the payload, or `error : <code>, message : <body>`
    pub fn into_legacy_string(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ApiResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiResponse::Success(body) => f.write_str(body),
            ApiResponse::Failure { code, body } => write!(f, "error : {code}, message : {body}"),
        }
    }
}

/// Turns a successful response body into the API payload
pub trait ResponseExtractor: Send + Sync {
    fn extract(&self, body: String) -> ClientResult<String>;
}

/// Returns the body unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBody;

impl ResponseExtractor for RawBody {
    fn extract(&self, body: String) -> ClientResult<String> {
        Ok(body)
    }
}

/// Raw `?k=v&k=v` query string. Values are not percent-encoded.
pub fn query_string(params: &Params) -> String {
    if params.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = params.iter().map(|(key, value)| format!("{key}={value}")).collect();
    format!("?{}", pairs.join("&"))
}

/// Coinone API client
pub struct ApiClient {
    config: ClientConfig,
    signer: Signer,
    factory: Arc<dyn ConnectionFactory>,
    extractor: Arc<dyn ResponseExtractor>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient").field("config", &self.config).finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Self::with_factory(config, Arc::new(ReqwestConnectionFactory))
    }

    /// Client whose requests open connections through `factory`
    pub fn with_factory(config: ClientConfig, factory: Arc<dyn ConnectionFactory>) -> ClientResult<Self> {
        config.validate()?;
        let signer = Signer::new(config.access_key.clone(), config.secret_key.clone());
        Ok(Self {
            config,
            signer,
            factory,
            extractor: Arc::new(RawBody),
        })
    }

    pub fn with_extractor(mut self, extractor: impl ResponseExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Call `path`; `None` or empty `params` make a signed call
    pub fn execute(&self, path: &str, params: Option<&Params>) -> ClientResult<ApiResponse> {
        let url = format!("{}{}", self.config.api_url, path);

        let mut request = match params.filter(|params| !params.is_empty()) {
            None => {
                let headers = self.signer.sign()?;
                let mut request = self.request(&url, Method::POST)?;
                request.headers(headers.iter())?;
                debug!("Calling private endpoint {} with nonce {}", path, headers.nonce);
                request
            }
            Some(params) => {
                debug!("Calling public endpoint {} with {} parameters", path, params.len());
                self.request(&format!("{url}{}", query_string(params)), Method::GET)?
            }
        };

        let response = if request.ok()? {
            ApiResponse::Success(self.extractor.extract(request.body()?)?)
        } else {
            let code = request.code()?;
            let body = request.body()?;
            warn!("Endpoint {} returned status {}", path, code);
            ApiResponse::Failure { code, body }
        };
        request.disconnect();

        Ok(response)
    }

    /// [`ApiClient::execute`] folded into one string; failures read
    /// `error : <code>, message : <body>`
    pub fn call(&self, path: &str, params: Option<&Params>) -> ClientResult<String> {
        Ok(self.execute(path, params)?.into_legacy_string())
    }

    /// Decode a successful payload as JSON
    pub fn call_json<T: DeserializeOwned>(&self, path: &str, params: Option<&Params>) -> ClientResult<T> {
        let body = self.execute(path, params)?.into_result()?;
        Ok(serde_json::from_str(&body)?)
    }

    fn request(&self, url: &str, method: Method) -> ClientResult<HttpRequest> {
        let mut request = HttpRequest::with_factory(url, method, self.factory.clone())?;
        if let Some(proxy) = &self.config.proxy {
            request.proxy(proxy.host.clone(), proxy.port)?;
        }
        request.ignore_close_errors(self.config.ignore_close_errors);
        request.read_timeout(self.config.read_timeout_ms)?;
        Ok(request)
    }
}
