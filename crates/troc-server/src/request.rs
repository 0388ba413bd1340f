//! Request and response values passed through the dispatcher

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::{json, Value};
use troc_core::error::TrocError;
use troc_core::NpmCommand;

/// Header npm 7+ sends alongside `Referer`
pub const NPM_COMMAND_HEADER: &str = "npm-command";

/// A fully buffered inbound request
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    /// Raw path, query string included
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl GatewayRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(HeaderName::from_static(name), value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    fn header_str(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Token from `Authorization: Bearer <token>` or a bare token
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header_str(header::AUTHORIZATION)?.trim();
        let token = match value.split_once(' ') {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
            Some(_) => return None,
            None => value,
        };
        (!token.is_empty()).then_some(token)
    }

    /// Command announced by the client, `Referer` first
    pub fn announced_command(&self) -> Option<NpmCommand> {
        self.header_str(header::REFERER)
            .and_then(NpmCommand::from_referer)
            .or_else(|| self.header_str(NPM_COMMAND_HEADER).and_then(|c| c.trim().parse().ok()))
    }

    pub fn host(&self) -> Option<&str> {
        self.header_str(header::HOST)
    }

    /// Parse the body as JSON, a 400 on failure
    pub fn json_body(&self) -> Result<Value, TrocError> {
        serde_json::from_slice(&self.body).map_err(|e| TrocError::Validation(format!("body is not JSON: {}", e)))
    }
}

/// A fully buffered response
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl GatewayResponse {
    pub fn new(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn json(status: StatusCode, value: &Value) -> Self {
        // Serializing a Value cannot fail
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self::new(status, "application/json", body)
    }

    pub fn ok(value: Value) -> Self {
        Self::json(StatusCode::OK, &value)
    }

    pub fn tarball(bytes: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, "application/octet-stream", bytes)
    }

    /// npm prints the `error` field of a failed response
    pub fn status(status: StatusCode, message: &str) -> Self {
        Self::json(status, &json!({ "error": message }))
    }

    pub fn not_found() -> Self {
        Self::status(StatusCode::NOT_FOUND, "not found")
    }

    pub fn from_error(error: &TrocError) -> Self {
        Self::status(status_for(error), &error.to_string())
    }

    /// JSON body of the response, for callers that inspect it
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// HTTP status for an error that escaped a handler
pub fn status_for(error: &TrocError) -> StatusCode {
    match error {
        TrocError::Validation(_) | TrocError::Conflict(_) => StatusCode::BAD_REQUEST,
        TrocError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        TrocError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}
