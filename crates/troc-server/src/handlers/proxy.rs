//! Proxy registry handlers
//!
//! Upstreams are tried one at a time in resolver order; the first 200 wins
//! and is cached. The local copy is only a fallback for when every upstream
//! failed.

use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::Method;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use troc_cache::rewrite_tarball_urls;
use troc_core::error::TrocError;
use troc_core::NpmCommand;
use troc_registry::{forwardable_headers, get_proxy_urls, upstream_url, UpstreamRequest, UpstreamResponse};

use super::{package_parts, registry, HandlerResult};
use crate::context::{AppContext, RegistryState};
use crate::interceptor::RequestContext;
use crate::request::GatewayResponse;

/// Fetch a package document upstream, cache it, serve it rewritten
#[instrument(skip_all, fields(path = %cx.request.path))]
pub async fn get_info(app: &AppContext, cx: &RequestContext<'_>) -> HandlerResult {
    let state = registry(cx)?;
    let (scope, name) = package_parts(cx)?;
    let base_url = app.public_base_url(cx.request.host(), &state.registry);

    let mut headers = forwardable_headers(&cx.request.headers);
    // Full documents only; the abbreviated form would poison the cache
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

    let fetched = fetch_first(app, cx, state, headers, |response| {
        serde_json::from_slice::<Value>(&response.body)
            .map_err(|e| debug!(error = %e, "upstream document is not JSON"))
            .ok()
            .filter(Value::is_object)
    })
    .await;

    let mut info = match fetched {
        Some(info) => {
            if let Err(e) = state.packages.write_info(scope, name, &info).await {
                warn!(error = %e, "failed to cache package document");
            }
            info
        }
        None => state
            .packages
            .read_info_json(scope, name)
            .await?
            .ok_or_else(|| TrocError::NotFound(cx.parsed.package_id().unwrap_or_default()))?,
    };

    rewrite_tarball_urls(&mut info, &base_url, scope, name);
    Ok(GatewayResponse::ok(info))
}

/// Fetch a tarball upstream, cache it, pass the bytes through
#[instrument(skip_all, fields(path = %cx.request.path))]
pub async fn get_tarball(app: &AppContext, cx: &RequestContext<'_>) -> HandlerResult {
    let state = registry(cx)?;
    let (scope, name) = package_parts(cx)?;
    let version = cx
        .parsed
        .tarball_version
        .as_deref()
        .ok_or_else(|| TrocError::NotFound(cx.request.path.clone()))?;

    let headers = forwardable_headers(&cx.request.headers);
    let fetched = fetch_first(app, cx, state, headers, |response| Some(response.body.clone())).await;

    match fetched {
        Some(bytes) => {
            match state.packages.write_tarball(scope, name, version, &bytes).await {
                Ok(()) => info!(package = ?cx.parsed.package_id(), %version, "cached tarball"),
                // Tarballs are immutable; the cached copy is the same artifact
                Err(TrocError::Conflict(_)) => {}
                Err(e) => warn!(error = %e, "failed to cache tarball"),
            }
            Ok(GatewayResponse::tarball(bytes))
        }
        None => {
            let bytes = state.packages.read_tarball(scope, name, version).await?;
            Ok(GatewayResponse::tarball(bytes))
        }
    }
}

/// Forward a publish verbatim to the first upstream the caller holds a
/// session token for, and relay its answer
#[instrument(skip_all, fields(path = %cx.request.path))]
pub async fn publish(app: &AppContext, cx: &RequestContext<'_>) -> HandlerResult {
    let state = registry(cx)?;
    let upstream_path = cx
        .parsed
        .upstream_path()
        .ok_or_else(|| TrocError::Validation("publish needs a package path".to_string()))?;
    let client_token = cx.client_token.as_deref().unwrap_or_default();

    let candidates = get_proxy_urls(
        &state.registry,
        NpmCommand::Publish,
        cx.parsed.pkg_scope.as_deref(),
        cx.parsed.pkg_name.as_deref(),
    );

    for base in candidates {
        let Some(bearer) = state.cache.session_token(client_token, &base) else {
            debug!(upstream = %base, "no session token for upstream");
            continue;
        };

        let request = UpstreamRequest {
            method: Method::PUT,
            url: upstream_url(&base, &upstream_path),
            headers: forwardable_headers(&cx.request.headers),
            bearer: Some(bearer),
            body: Some(cx.request.body.clone()),
        };

        match app.upstream.send(request).await {
            Ok(response) => {
                info!(upstream = %base, status = %response.status, "relayed publish");
                return Ok(relay(response));
            }
            Err(e) if e.is_recoverable() => warn!(upstream = %base, error = %e, "publish upstream failed"),
            Err(e) => return Err(e),
        }
    }

    Err(TrocError::Validation("no upstream accepted the publish".to_string()))
}

/// Try each candidate upstream in order and return the first 200 response
/// that `accept` takes
async fn fetch_first<T>(
    app: &AppContext,
    cx: &RequestContext<'_>,
    state: &RegistryState,
    headers: HeaderMap,
    accept: impl Fn(&UpstreamResponse) -> Option<T>,
) -> Option<T> {
    let command = cx.command.unwrap_or(NpmCommand::Install);
    let upstream_path = cx.parsed.upstream_path()?;
    let candidates = get_proxy_urls(
        &state.registry,
        command,
        cx.parsed.pkg_scope.as_deref(),
        cx.parsed.pkg_name.as_deref(),
    );

    for base in candidates {
        let bearer = cx
            .client_token
            .as_deref()
            .and_then(|token| state.cache.session_token(token, &base));
        let request = UpstreamRequest {
            method: Method::GET,
            url: upstream_url(&base, &upstream_path),
            headers: headers.clone(),
            bearer,
            body: None,
        };

        match app.upstream.send(request).await {
            Ok(response) if response.is_ok() => match accept(&response) {
                Some(value) => {
                    debug!(upstream = %base, "upstream hit");
                    return Some(value);
                }
                None => warn!(upstream = %base, "unusable upstream response"),
            },
            Ok(response) => debug!(upstream = %base, status = %response.status, "upstream miss"),
            Err(e) => warn!(upstream = %base, error = %e, "upstream failed"),
        }
    }

    None
}

fn relay(response: UpstreamResponse) -> GatewayResponse {
    let mut relayed = GatewayResponse {
        status: response.status,
        headers: Default::default(),
        body: response.body,
    };
    if let Some(content_type) = response.headers.get(header::CONTENT_TYPE) {
        relayed.headers.insert(header::CONTENT_TYPE, content_type.clone());
    }
    relayed
}
