//! Network transport for the router exchange.
//!
//! # Design
//! `Transport` is the only place that performs I/O. The production
//! implementation wraps a blocking ureq agent configured with the router's
//! fixed policy: the self-signed certificate is accepted and every call is
//! bounded by [`REQUEST_TIMEOUT`]. The policy is not configurable per call.
//! Tests plug in their own `Transport` to observe requests and script
//! responses.

use std::fmt;
use std::time::Duration;

use ureq::tls::TlsConfig;
use ureq::Agent;

use crate::error::{ApiError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Upper bound for one request/response exchange, connect included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes one HTTP exchange.
///
/// Implementations return non-2xx responses as data; only failures that
/// produce no response at all (DNS, connect, TLS, timeout) become errors.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        (**self).send(request)
    }
}

/// Blocking transport backed by a ureq agent.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport")
            .field("timeout", &REQUEST_TIMEOUT)
            .finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        let tls = TlsConfig::builder().disable_verification(true).build();
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(REQUEST_TIMEOUT))
            .tls_config(tls)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            HttpMethod::Post => self.agent.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = builder
            .send(request.body.as_bytes())
            .map_err(transport_error)?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(transport_error)?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

fn transport_error(err: ureq::Error) -> ApiError {
    ApiError::TransportError {
        message: err.to_string(),
        body: None,
    }
}
