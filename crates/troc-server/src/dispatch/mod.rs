//! Command dispatcher
//!
//! A request runs through the interceptor chain, which resolves its registry,
//! caller and [`RequestKey`]. The key's string form selects the handler; a
//! key without a handler is a 404.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use tracing::{error, info, warn};

use troc_core::{NpmCommand, PkgAction, RegistryType};

use crate::context::AppContext;
use crate::handlers::Handler;
use crate::interceptor::{InterceptorChain, RequestContext};
use crate::request::{GatewayRequest, GatewayResponse};

/// Serialized request key to handler
#[derive(Debug, Clone)]
pub struct HandlerTable {
    routes: HashMap<String, Handler>,
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerTable {
    pub fn new() -> Self {
        let mut table = Self { routes: HashMap::new() };

        // Accounts live in the gateway whatever the registry type
        for kind in [RegistryType::Local, RegistryType::Proxy] {
            table.npm(kind, NpmCommand::Adduser, PkgAction::Unknown, Handler::Adduser);
            table.npm(kind, NpmCommand::Whoami, PkgAction::Unknown, Handler::Whoami);
            table.npm(kind, NpmCommand::Logout, PkgAction::Unknown, Handler::Logout);
        }

        for command in [NpmCommand::Install, NpmCommand::View] {
            table.npm(RegistryType::Local, command, PkgAction::GetInfo, Handler::LocalGetInfo);
            table.npm(RegistryType::Local, command, PkgAction::GetTarball, Handler::LocalGetTarball);
            table.npm(RegistryType::Proxy, command, PkgAction::GetInfo, Handler::ProxyGetInfo);
            table.npm(RegistryType::Proxy, command, PkgAction::GetTarball, Handler::ProxyGetTarball);
        }

        table.npm(RegistryType::Local, NpmCommand::Publish, PkgAction::Unknown, Handler::LocalPublish);
        table.npm(RegistryType::Proxy, NpmCommand::Publish, PkgAction::Unknown, Handler::ProxyPublish);

        table.insert("troc/v1/signup", Handler::Signup);
        table.insert("troc/v1/attach-token", Handler::AttachToken);
        table
    }

    fn npm(&mut self, kind: RegistryType, command: NpmCommand, action: PkgAction, handler: Handler) {
        let key = troc_core::RequestKey::Npm {
            registry_type: kind,
            command,
            pkg_action: action,
        };
        self.insert(&key.to_string(), handler);
    }

    pub fn insert(&mut self, key: &str, handler: Handler) {
        self.routes.insert(key.to_string(), handler);
    }

    pub fn get(&self, key: &str) -> Option<Handler> {
        self.routes.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Entry point for every request
pub struct Gateway {
    app: Arc<AppContext>,
    chain: InterceptorChain,
    table: HandlerTable,
}

impl Gateway {
    pub fn new(app: Arc<AppContext>) -> Self {
        Self {
            app,
            chain: InterceptorChain::standard(),
            table: HandlerTable::new(),
        }
    }

    pub fn app(&self) -> &Arc<AppContext> {
        &self.app
    }

    pub async fn handle(&self, request: GatewayRequest) -> GatewayResponse {
        let started = Instant::now();
        let method = request.method.clone();
        let path = request.path.clone();

        let mut cx = RequestContext::new(request);
        let response = match self.chain.run(&self.app, &mut cx) {
            Some(response) => response,
            None => self.dispatch(&cx).await,
        };

        let key = cx.key.as_ref().map(ToString::to_string).unwrap_or_default();
        info!(
            %method,
            %path,
            %key,
            status = response.status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request"
        );
        response
    }

    async fn dispatch(&self, cx: &RequestContext<'_>) -> GatewayResponse {
        let Some(key) = cx.key.as_ref().map(ToString::to_string) else {
            return GatewayResponse::not_found();
        };
        let Some(handler) = self.table.get(&key) else {
            return GatewayResponse::not_found();
        };

        match handler.call(&self.app, cx).await {
            Ok(response) => response,
            Err(e) => {
                let response = GatewayResponse::from_error(&e);
                if response.status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(%key, error = %e, "handler failed");
                } else {
                    warn!(%key, error = %e, "request rejected");
                }
                response
            }
        }
    }
}
