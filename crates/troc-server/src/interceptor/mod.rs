//! Request interceptors
//!
//! Every request passes through an ordered chain before it reaches a
//! handler. Each interceptor may enrich the [`RequestContext`] or answer the
//! request itself, which ends the chain.

use axum::http::{Method, StatusCode};
use tracing::debug;

use troc_core::{ApiOwner, NpmCommand, ParsedUrl, RequestKey};

use crate::context::{AppContext, RegistryState};
use crate::request::{GatewayRequest, GatewayResponse};

/// Path npm uses for `npm ping`, under any registry prefix
pub const PING_SUFFIX: &str = "/-/ping";

/// Per-request state accumulated by the chain
#[derive(Debug)]
pub struct RequestContext<'a> {
    pub request: GatewayRequest,
    pub parsed: ParsedUrl,
    pub registry: Option<&'a RegistryState>,
    /// Bearer token the client sent, valid or not
    pub client_token: Option<String>,
    /// Owner of `client_token` when it is a known token
    pub username: Option<String>,
    pub command: Option<NpmCommand>,
    pub key: Option<RequestKey>,
}

impl<'a> RequestContext<'a> {
    pub fn new(request: GatewayRequest) -> Self {
        let parsed = ParsedUrl::parse(&request.path);
        Self {
            request,
            parsed,
            registry: None,
            client_token: None,
            username: None,
            command: None,
            key: None,
        }
    }

    /// Request path without the query string
    pub fn path(&self) -> &str {
        self.request.path.split('?').next().unwrap_or_default()
    }
}

/// Outcome of one interceptor
#[derive(Debug)]
pub enum Flow {
    Continue,
    Respond(GatewayResponse),
}

pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn intercept<'a>(&self, app: &'a AppContext, cx: &mut RequestContext<'a>) -> Flow;
}

/// Ordered interceptors, short-circuiting on the first response
#[derive(Default)]
pub struct InterceptorChain {
    interceptors: Vec<Box<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Health, registry lookup, readiness, auth, then the dispatch key
    pub fn standard() -> Self {
        Self::new()
            .with(HealthCheck)
            .with(RegistryLookup)
            .with(ReadinessGate)
            .with(AuthResolver)
            .with(KeyBuilder)
    }

    pub fn with(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Box::new(interceptor));
        self
    }

    /// Run the chain; `Some` when an interceptor answered the request
    pub fn run<'a>(&self, app: &'a AppContext, cx: &mut RequestContext<'a>) -> Option<GatewayResponse> {
        for interceptor in &self.interceptors {
            if let Flow::Respond(response) = interceptor.intercept(app, cx) {
                debug!(interceptor = interceptor.name(), status = %response.status, "request answered by interceptor");
                return Some(response);
            }
        }
        None
    }
}

/// 503 until the request's registry has loaded its auth logs. Runs after
/// [`RegistryLookup`]; other registries are unaffected.
pub struct ReadinessGate;

impl Interceptor for ReadinessGate {
    fn name(&self) -> &'static str {
        "readiness"
    }

    fn intercept<'a>(&self, _app: &'a AppContext, cx: &mut RequestContext<'a>) -> Flow {
        match cx.registry {
            Some(state) if !state.cache.is_loaded() => Flow::Respond(GatewayResponse::status(
                StatusCode::SERVICE_UNAVAILABLE,
                "registry is starting",
            )),
            _ => Flow::Continue,
        }
    }
}

pub struct HealthCheck;

impl Interceptor for HealthCheck {
    fn name(&self) -> &'static str {
        "health"
    }

    fn intercept<'a>(&self, _app: &'a AppContext, cx: &mut RequestContext<'a>) -> Flow {
        if cx.path().ends_with(PING_SUFFIX) {
            Flow::Respond(GatewayResponse::ok(serde_json::json!({})))
        } else {
            Flow::Continue
        }
    }
}

/// Resolve the registry owning the path; 404 when none does
pub struct RegistryLookup;

impl Interceptor for RegistryLookup {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn intercept<'a>(&self, app: &'a AppContext, cx: &mut RequestContext<'a>) -> Flow {
        match app.registry_for(&cx.parsed.registry_path) {
            Some(state) => {
                cx.registry = Some(state);
                Flow::Continue
            }
            None => Flow::Respond(GatewayResponse::not_found()),
        }
    }
}

/// Resolve the bearer token to a user. Never rejects; handlers decide
/// whether they need a user.
pub struct AuthResolver;

impl Interceptor for AuthResolver {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn intercept<'a>(&self, _app: &'a AppContext, cx: &mut RequestContext<'a>) -> Flow {
        cx.client_token = cx.request.bearer_token().map(str::to_string);
        if let (Some(token), Some(state)) = (cx.client_token.as_deref(), cx.registry) {
            cx.username = state.cache.username_for_token(token);
        }
        Flow::Continue
    }
}

/// Build the dispatch key; 404 when the request maps to no key
pub struct KeyBuilder;

impl Interceptor for KeyBuilder {
    fn name(&self) -> &'static str {
        "key"
    }

    fn intercept<'a>(&self, _app: &'a AppContext, cx: &mut RequestContext<'a>) -> Flow {
        let Some(state) = cx.registry else {
            return Flow::Respond(GatewayResponse::not_found());
        };

        cx.command = cx
            .request
            .announced_command()
            .or_else(|| infer_command(&cx.request.method, &cx.parsed));
        cx.key = RequestKey::build(&cx.parsed, cx.command, &state.registry);

        match cx.key {
            Some(_) => Flow::Continue,
            None => Flow::Respond(GatewayResponse::not_found()),
        }
    }
}

/// Command for clients that announce none: the npm auth endpoints by
/// method, and plain package fetches as installs
pub fn infer_command(method: &Method, parsed: &ParsedUrl) -> Option<NpmCommand> {
    if parsed.api_owner == ApiOwner::Npm {
        let path = parsed.api_path.as_deref()?;
        return match *method {
            Method::PUT if path.starts_with("user/org.couchdb.user:") => Some(NpmCommand::Adduser),
            Method::GET if path == "whoami" => Some(NpmCommand::Whoami),
            Method::DELETE if path.starts_with("user/token/") => Some(NpmCommand::Logout),
            _ => None,
        };
    }

    if parsed.is_package() {
        return match *method {
            Method::GET | Method::HEAD => Some(NpmCommand::Install),
            Method::PUT => Some(NpmCommand::Publish),
            _ => None,
        };
    }

    None
}
