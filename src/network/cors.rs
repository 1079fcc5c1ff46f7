//! Cross-Origin Resource Sharing
//!
//! Allow-list based CORS. An empty allow-list turns the whole layer off:
//! no headers are added and preflight requests are routed like any other.

use crate::network::http::{Request, Response};

/// Methods advertised in preflight responses.
const ALLOWED_METHODS: &str = "DELETE, GET, HEAD, OPTIONS, PATCH, POST, PUT";

/// Preflight cache lifetime in seconds.
const PREFLIGHT_MAX_AGE: u32 = 600;

/// CORS policy built from the configured origin allow-list.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
    allow_any: bool,
}

impl CorsPolicy {
    /// Create a policy. `"*"` in the list allows every origin.
    pub fn new(allowed_origins: Vec<String>) -> Self {
        let allow_any = allowed_origins.iter().any(|o| o == "*");
        Self {
            allowed_origins,
            allow_any,
        }
    }

    /// Whether any CORS handling is installed.
    pub fn is_enabled(&self) -> bool {
        !self.allowed_origins.is_empty()
    }

    /// Whether `origin` may call the API.
    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allow_any || self.allowed_origins.iter().any(|o| o == origin)
    }

    /// Answer a preflight request, or `None` if `request` is not one.
    pub fn preflight(&self, request: &Request) -> Option<Response> {
        if !self.is_enabled() || request.method() != "OPTIONS" {
            return None;
        }
        let origin = request.header("origin")?;
        request.header("access-control-request-method")?;

        if !self.is_allowed(origin) {
            return Some(Response::text(400, "Disallowed CORS origin"));
        }

        let mut response = Response::text(200, "OK")
            .with_header("Access-Control-Allow-Origin", origin)
            .with_header("Access-Control-Allow-Credentials", "true")
            .with_header("Access-Control-Allow-Methods", ALLOWED_METHODS)
            .with_header("Access-Control-Max-Age", &PREFLIGHT_MAX_AGE.to_string())
            .with_header("Vary", "Origin");
        if let Some(headers) = request.header("access-control-request-headers") {
            response = response.with_header("Access-Control-Allow-Headers", headers);
        }
        Some(response)
    }

    /// Add CORS headers to a normal response.
    pub fn apply(&self, request: &Request, response: Response) -> Response {
        if !self.is_enabled() {
            return response;
        }
        match request.header("origin") {
            Some(origin) if self.is_allowed(origin) => response
                .with_header("Access-Control-Allow-Origin", origin)
                .with_header("Access-Control-Allow-Credentials", "true")
                .with_header("Vary", "Origin"),
            _ => response,
        }
    }
}
