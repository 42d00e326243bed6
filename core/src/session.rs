//! Authenticated request/response cycle against the router's `/cgi` endpoint.
//!
//! # Design
//! `Session` holds only the router address, the credentials and a transport.
//! It carries no mutable state between calls, so one session can be shared
//! across threads. Each exchange is split into `build_request`, which wraps
//! an encoded batch in the fixed header set, and `parse_response`, which maps
//! the HTTP status and the router status line onto `ApiError`. `execute`
//! glues the two around a single `Transport::send`.
//!
//! Authentication travels in a `Cookie: Authorization=Basic ...` header
//! rather than the standard `Authorization` header; the router's firmware
//! only reads the cookie.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, warn};

use crate::codec::{self, CommandBatch, Decoded};
use crate::config::RouterConfig;
use crate::error::{ApiError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::templates;
use crate::transport::{Transport, UreqTransport};

pub const USER_AGENT: &str = "routercgi";

/// Client for one router.
#[derive(Clone)]
pub struct Session<T = UreqTransport> {
    address: String,
    username: String,
    password: String,
    transport: T,
}

impl Session<UreqTransport> {
    /// Session over the production transport. Performs no I/O.
    pub fn new(address: &str, username: &str, password: &str) -> Self {
        Self::with_transport(address, username, password, UreqTransport::new())
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(&config.address, &config.username, &config.password)
    }
}

impl<T: Transport> Session<T> {
    pub fn with_transport(address: &str, username: &str, password: &str, transport: T) -> Self {
        Self {
            address: address.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            transport,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// `<address>/cgi`, with `?<suffix>` appended verbatim when non-empty.
    pub fn endpoint(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            format!("{}/cgi", self.address)
        } else {
            format!("{}/cgi?{suffix}", self.address)
        }
    }

    /// Value of the `Cookie` header: `Authorization=Basic <base64(user:pass)>`.
    pub fn auth_cookie(&self) -> String {
        let credentials = format!("{}:{}", self.username, self.password);
        format!("Authorization=Basic {}", BASE64.encode(credentials))
    }

    fn headers(&self) -> Vec<(String, String)> {
        [
            ("Accept", "*/*".to_string()),
            ("Accept-Language", "en-US,en;q=0.9".to_string()),
            ("Content-Type", "text/plain".to_string()),
            ("Dnt", "1".to_string()),
            ("Origin", self.address.clone()),
            ("Referer", format!("{}/", self.address)),
            ("User-Agent", USER_AGENT.to_string()),
            ("Cookie", self.auth_cookie()),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
    }

    /// Encode `batch` and wrap it in the authenticated POST request.
    ///
    /// Fails with `MalformedCommand` before anything is sent.
    pub fn build_request(&self, suffix: &str, batch: &CommandBatch) -> Result<HttpRequest> {
        let body = codec::encode(batch)?;
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.endpoint(suffix),
            headers: self.headers(),
            body,
        })
    }

    /// Map an HTTP response onto decoded sections or an error.
    pub fn parse_response(&self, response: &HttpResponse) -> Result<Decoded> {
        check_status(response)?;
        let decoded = codec::decode(&response.body)?;
        if !decoded.is_success() {
            warn!(code = decoded.status, "router reported an error");
            return Err(ApiError::ApplicationError {
                code: decoded.status,
            });
        }
        Ok(decoded)
    }

    fn round_trip(&self, suffix: &str, batch: &CommandBatch) -> Result<(Decoded, HttpResponse)> {
        let request = self.build_request(suffix, batch)?;
        debug!(url = %request.url, commands = batch.len(), "sending command batch");
        let response = self.transport.send(&request)?;
        debug!(status = response.status, bytes = response.body.len(), "received response");
        let decoded = self.parse_response(&response)?;
        Ok((decoded, response))
    }

    /// Run `batch` against the endpoint variant named by `suffix`.
    pub fn execute(&self, suffix: &str, batch: &CommandBatch) -> Result<Decoded> {
        self.round_trip(suffix, batch).map(|(decoded, _)| decoded)
    }

    /// Run a creating mutate and return the index the router assigned.
    pub fn execute_create(&self, suffix: &str, batch: &CommandBatch) -> Result<u32> {
        let (_, response) = self.round_trip(suffix, batch)?;
        codec::extract_assigned_id(&response.body)
    }

    pub fn logout(&self) -> Result<()> {
        self.execute(templates::suffix::LOGOUT, &templates::logout())
            .map(|_| ())
    }
}

// Credentials stay out of debug output.
impl<T> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Non-2xx responses become `TransportError` carrying the status line and body.
fn check_status(response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    warn!(status = response.status, "router rejected request");
    Err(ApiError::TransportError {
        message: response.status_line(),
        body: Some(response.body.clone()),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::thread;

    use super::*;
    use crate::codec::Command;

    /// Records every request and answers with a fixed response.
    struct Scripted {
        response: HttpResponse,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Scripted {
        fn new(status: u16, status_text: &str, body: &str) -> Self {
            Self {
                response: HttpResponse {
                    status,
                    status_text: status_text.to_string(),
                    headers: Vec::new(),
                    body: body.to_string(),
                },
                seen: Mutex::new(Vec::new()),
            }
        }

        fn ok(body: &str) -> Self {
            Self::new(200, "OK", body)
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Transport for Scripted {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.response.clone())
        }
    }

    struct Unreachable;

    impl Transport for Unreachable {
        fn send(&self, _request: &HttpRequest) -> Result<HttpResponse> {
            Err(ApiError::TransportError {
                message: "timed out".to_string(),
                body: None,
            })
        }
    }

    fn session<T: Transport>(transport: T) -> Session<T> {
        Session::with_transport("https://192.168.1.1", "admin", "admin", transport)
    }

    #[test]
    fn logout_posts_fixed_batch_to_cgi() {
        let transport = Scripted::ok("[error]0\r\n");
        session(&transport).logout().unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "https://192.168.1.1/cgi");
        assert_eq!(req.body, "[/cgi/logout#0,0,0,0,0,0#0,0,0,0,0,0]0,0\r\n");
        assert!(req.header("cookie").unwrap().starts_with("Authorization=Basic "));
    }

    #[test]
    fn auth_rides_in_cookie_not_authorization_header() {
        let s = session(Scripted::ok("[error]0\r\n"));
        let req = s
            .build_request("", &Command::query("STAT_CFG").into())
            .unwrap();
        assert_eq!(req.header("Cookie"), Some("Authorization=Basic YWRtaW46YWRtaW4="));
        assert!(req.header("Authorization").is_none());
    }

    #[test]
    fn fixed_headers_are_present() {
        let s = session(Scripted::ok("[error]0\r\n"));
        let req = s
            .build_request("5", &Command::query("STAT_CFG").into())
            .unwrap();
        assert_eq!(req.url, "https://192.168.1.1/cgi?5");
        assert_eq!(req.header("Content-Type"), Some("text/plain"));
        assert_eq!(req.header("Accept"), Some("*/*"));
        assert_eq!(req.header("Dnt"), Some("1"));
        assert_eq!(req.header("Origin"), Some("https://192.168.1.1"));
        assert_eq!(req.header("Referer"), Some("https://192.168.1.1/"));
        assert_eq!(req.header("User-Agent"), Some(USER_AGENT));
    }

    #[test]
    fn suffix_is_appended_verbatim() {
        let s = session(Scripted::ok("[error]0\r\n"));
        assert_eq!(s.endpoint("1&1&1&8"), "https://192.168.1.1/cgi?1&1&1&8");
        assert_eq!(s.endpoint(""), "https://192.168.1.1/cgi");
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let s = Session::with_transport("https://192.168.1.1/", "a", "b", Unreachable);
        assert_eq!(s.endpoint(""), "https://192.168.1.1/cgi");
    }

    #[test]
    fn from_config_uses_address_and_credentials() {
        let config = RouterConfig::new("https://192.168.1.1/", "admin", "admin");
        let s = Session::from_config(&config);
        assert_eq!(s.address(), "https://192.168.1.1");
        assert_eq!(s.endpoint(""), "https://192.168.1.1/cgi");
        assert_eq!(s.auth_cookie(), "Authorization=Basic YWRtaW46YWRtaW4=");
    }

    #[test]
    fn malformed_command_is_rejected_before_sending() {
        let transport = Scripted::ok("[error]0\r\n");
        let batch = Command::query("TC").field("enable=1").into();
        let err = session(&transport).execute("", &batch).unwrap_err();
        assert!(matches!(err, ApiError::MalformedCommand(_)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn non_2xx_is_transport_error_with_status_text() {
        let transport = Scripted::new(403, "Forbidden", "[error]0\r\n");
        let err = session(&transport)
            .execute("", &Command::query("STAT_CFG").into())
            .unwrap_err();
        match err {
            ApiError::TransportError { message, body } => {
                assert!(message.contains("Forbidden"));
                assert_eq!(body.as_deref(), Some("[error]0\r\n"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn nonzero_status_is_application_error() {
        let transport = Scripted::ok("[TC#0,0,0,0,0,0#0,0,0,0,0,0]0,0\r\n[error]71017\r\n");
        let err = session(&transport)
            .execute("2", &Command::query("TC").into())
            .unwrap_err();
        assert!(matches!(err, ApiError::ApplicationError { code: 71017 }));
    }

    #[test]
    fn missing_status_is_protocol_violation() {
        let transport = Scripted::ok("<html>login</html>");
        let err = session(&transport)
            .execute("", &Command::query("STAT_CFG").into())
            .unwrap_err();
        assert!(matches!(err, ApiError::ProtocolViolation(_)));
    }

    #[test]
    fn transport_failure_is_surfaced() {
        let err = session(Unreachable).logout().unwrap_err();
        assert!(matches!(err, ApiError::TransportError { body: None, .. }));
    }

    #[test]
    fn execute_returns_decoded_sections() {
        let transport = Scripted::ok(
            "[STAT_CFG#0,0,0,0,0,0#0,0,0,0,0,0]0,1\r\ninterval=10\r\n[error]0\r\n",
        );
        let decoded = session(&transport)
            .execute("1&5", &Command::query("STAT_CFG").into())
            .unwrap();
        assert_eq!(decoded.first_for(0).unwrap().get("interval"), Some("10"));
    }

    #[test]
    fn execute_create_returns_assigned_id() {
        let transport =
            Scripted::ok("[LAN_DHCP_STATIC_ADDR#1,7,0,0,0,0#0,0,0,0,0,0]0,0\r\n[error]0\r\n");
        let batch = Command::mutate("LAN_DHCP_STATIC_ADDR")
            .set("enable", 1)
            .into();
        assert_eq!(session(&transport).execute_create("3", &batch).unwrap(), 7);
    }

    #[test]
    fn execute_create_without_echo_is_id_not_found() {
        let transport = Scripted::ok("[error]0\r\n");
        let batch = Command::mutate("TC").set("enable", 0).into();
        let err = session(&transport).execute_create("2", &batch).unwrap_err();
        assert!(matches!(err, ApiError::IdNotFound));
    }

    #[test]
    fn concurrent_calls_share_one_session() {
        let transport = Scripted::ok("[error]0\r\n");
        let s = Arc::new(session(transport));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&s);
                thread::spawn(move || s.logout())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(s.transport.requests().len(), 8);
    }

    #[test]
    fn debug_hides_password() {
        let s = Session::with_transport("https://r", "admin", "hunter2", Unreachable);
        assert!(!format!("{s:?}").contains("hunter2"));
    }
}
