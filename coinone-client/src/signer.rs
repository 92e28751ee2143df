//! Request signing for private API calls
//!
//! A signed call carries two headers derived from the access key and a
//! fresh nonce: the base64 of the compact JSON `{"access_token","nonce"}`
//! object, and the lowercase hex HMAC-SHA512 of that base64 text keyed by
//! the upper-cased secret key.

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha512;

use coinone_http::{CONTENT_TYPE_JSON, HEADER_CONTENT_TYPE};

use crate::{ClientError, ClientResult};

type HmacSha512 = Hmac<Sha512>;

pub const HEADER_PAYLOAD: &str = "X-COINONE-PAYLOAD";
pub const HEADER_SIGNATURE: &str = "X-COINONE-SIGNATURE";

// Field order is part of the signed byte sequence
#[derive(Serialize)]
struct Payload<'a> {
    access_token: &'a str,
    nonce: &'a str,
}

/// Authentication headers for one signed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    /// Base64 JSON payload
    pub payload: String,
    /// Lowercase hex HMAC-SHA512 of `payload`
    pub signature: String,
    /// Nonce embedded in the payload
    pub nonce: String,
}

impl SignedHeaders {
    /// Header pairs in the order Content-Type, payload, signature
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        [
            (HEADER_CONTENT_TYPE, CONTENT_TYPE_JSON),
            (HEADER_PAYLOAD, self.payload.as_str()),
            (HEADER_SIGNATURE, self.signature.as_str()),
        ]
        .into_iter()
    }
}

/// Signs private API calls with an access/secret key pair
#[derive(Debug, Clone)]
pub struct Signer {
    access_key: SecretString,
    secret_key: SecretString,
}

impl Signer {
    pub fn new(access_key: SecretString, secret_key: SecretString) -> Self {
        Self { access_key, secret_key }
    }

    /// Sign with the current time in milliseconds as nonce
    pub fn sign(&self) -> ClientResult<SignedHeaders> {
        self.sign_with_nonce(&current_nonce())
    }

    pub fn sign_with_nonce(&self, nonce: &str) -> ClientResult<SignedHeaders> {
        let payload = encode_payload(self.access_key.expose_secret(), nonce)?;
        let signature = signature(&payload, self.secret_key.expose_secret())?;
        Ok(SignedHeaders {
            payload,
            signature,
            nonce: nonce.to_string(),
        })
    }
}

/// Current time in milliseconds. Not guaranteed monotonic across clock changes.
pub fn current_nonce() -> String {
    Utc::now().timestamp_millis().to_string()
}

/// Base64 of the compact JSON credential object
pub fn encode_payload(access_key: &str, nonce: &str) -> ClientResult<String> {
    let json = serde_json::to_string(&Payload {
        access_token: access_key,
        nonce,
    })
    .map_err(|e| ClientError::Signing(e.to_string()))?;
    Ok(general_purpose::STANDARD.encode(json.as_bytes()))
}

/// Lowercase hex HMAC-SHA512 of `payload` keyed by the upper-cased secret
pub fn signature(payload: &str, secret_key: &str) -> ClientResult<String> {
    let key = secret_key.to_uppercase();
    let mut mac =
        HmacSha512::new_from_slice(key.as_bytes()).map_err(|e| ClientError::Signing(e.to_string()))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
