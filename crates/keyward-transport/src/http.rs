//! HTTP transport

use std::time::Duration;

use keyward_core::{KeywardError, KeywardResult};

/// Status and body of a completed request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        HttpResponse {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking GET against the authority
///
/// Errors are `TransportFailure` for anything that prevented a response.
/// A response with any status is `Ok`; status handling is the caller's.
pub trait HttpTransport: Send {
    fn get(&self, url: &str) -> KeywardResult<HttpResponse>;
}

/// reqwest blocking client over TLS
///
/// Certificate validation is disabled: the node has no way to keep a trust
/// store current.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> KeywardResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()
            .map_err(|e| KeywardError::TransportFailure(e.to_string()))?;
        Ok(ReqwestTransport { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str) -> KeywardResult<HttpResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| KeywardError::TransportFailure(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| KeywardError::TransportFailure(e.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}
