//! KuCoin request signing (API key version 2)
//!
//! `KC-API-SIGN = base64(HMAC-SHA256(secret, timestamp + METHOD + endpoint + body))`
//! where `endpoint` includes the query string. The passphrase is signed with the
//! same secret.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;

use crate::config::Credentials;
use crate::ports::exchange::ExchangeError;

type HmacSha256 = Hmac<Sha256>;

pub const KEY_VERSION: &str = "2";

#[derive(Clone)]
pub struct KucoinAuth {
    credentials: Credentials,
}

impl KucoinAuth {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    fn sign(&self, message: &str) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.credentials.api_secret.as_bytes())
            .map_err(|e| ExchangeError::Authentication(format!("HMAC init failed: {}", e)))?;
        mac.update(message.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    /// Signature over one request; `endpoint` is the path plus query string
    pub fn signature(&self, timestamp_ms: i64, method: &str, endpoint: &str, body: &str) -> Result<String, ExchangeError> {
        self.sign(&format!("{}{}{}{}", timestamp_ms, method.to_uppercase(), endpoint, body))
    }

    pub fn signed_passphrase(&self) -> Result<String, ExchangeError> {
        self.sign(&self.credentials.passphrase)
    }

    /// Authentication headers for one request
    pub fn headers(&self, timestamp_ms: i64, method: &str, endpoint: &str, body: &str) -> Result<HeaderMap, ExchangeError> {
        let header = |value: String| {
            HeaderValue::from_str(&value)
                .map_err(|e| ExchangeError::Authentication(format!("Invalid header value: {}", e)))
        };

        let mut headers = HeaderMap::new();
        headers.insert("KC-API-KEY", header(self.credentials.api_key.clone())?);
        headers.insert("KC-API-SIGN", header(self.signature(timestamp_ms, method, endpoint, body)?)?);
        headers.insert("KC-API-TIMESTAMP", header(timestamp_ms.to_string())?);
        headers.insert("KC-API-PASSPHRASE", header(self.signed_passphrase()?)?);
        headers.insert("KC-API-KEY-VERSION", HeaderValue::from_static(KEY_VERSION));
        Ok(headers)
    }
}
