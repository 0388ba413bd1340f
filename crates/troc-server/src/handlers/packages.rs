//! Local registry handlers: the package store is the source of truth

use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tracing::{info, instrument, warn};

use troc_cache::{merge_info, rewrite_tarball_urls, stamp_npm_user, stamp_publish_time};
use troc_core::error::{TrocError, TrocResult};
use troc_registry::PublishPayload;

use super::{package_parts, registry, HandlerResult};
use crate::context::{AppContext, RegistryState};
use crate::interceptor::RequestContext;
use crate::request::GatewayResponse;

/// Serve `info.json` with tarball URLs pointing at this gateway
#[instrument(skip_all, fields(path = %cx.request.path))]
pub async fn get_info(app: &AppContext, cx: &RequestContext<'_>) -> HandlerResult {
    let state = registry(cx)?;
    let (scope, name) = package_parts(cx)?;

    let mut info = state
        .packages
        .read_info_json(scope, name)
        .await?
        .ok_or_else(|| TrocError::NotFound(cx.parsed.package_id().unwrap_or_default()))?;

    let base_url = app.public_base_url(cx.request.host(), &state.registry);
    rewrite_tarball_urls(&mut info, &base_url, scope, name);
    Ok(GatewayResponse::ok(info))
}

#[instrument(skip_all, fields(path = %cx.request.path))]
pub async fn get_tarball(_app: &AppContext, cx: &RequestContext<'_>) -> HandlerResult {
    let state = registry(cx)?;
    let (scope, name) = package_parts(cx)?;
    let version = cx
        .parsed
        .tarball_version
        .as_deref()
        .ok_or_else(|| TrocError::NotFound(cx.request.path.clone()))?;

    let bytes = state.packages.read_tarball(scope, name, version).await?;
    Ok(GatewayResponse::tarball(bytes))
}

/// Publish to the local store. All versions are checked before anything is
/// written, so a collision rejects the whole publish.
#[instrument(skip_all, fields(path = %cx.request.path))]
pub async fn publish(_app: &AppContext, cx: &RequestContext<'_>) -> HandlerResult {
    let state = registry(cx)?;
    let username = cx
        .username
        .as_deref()
        .ok_or_else(|| TrocError::Unauthorized("publishing requires a valid token".to_string()))?;
    let (scope, name) = package_parts(cx)?;

    let payload = PublishPayload::parse(&cx.request.body)?;
    if payload.scope_and_name() != (scope, name) {
        return Err(TrocError::Validation(format!(
            "payload names {} but was sent to {}",
            payload.name,
            cx.parsed.package_id().unwrap_or_default()
        )));
    }

    let _guard = state.publish_lock.lock().await;

    for tarball in &payload.tarballs {
        if state.packages.access_tarball(scope, name, &tarball.version).await {
            return Err(TrocError::Conflict(format!(
                "{}@{} is already published",
                payload.name, tarball.version
            )));
        }
    }

    state
        .packages
        .write_tarballs(
            scope,
            name,
            payload
                .tarballs
                .iter()
                .map(|tarball| (tarball.version.as_str(), tarball.bytes.as_slice()))
                .collect::<Vec<(&str, &[u8])>>(),
        )
        .await?;

    let versions: Vec<&str> = payload.versions().collect();
    if let Err(e) = write_document(state, scope, name, username, &payload, &versions).await {
        for tarball in &payload.tarballs {
            if let Err(cleanup) = state.packages.remove_tarball(scope, name, &tarball.version).await {
                warn!(version = %tarball.version, error = %cleanup, "failed to roll back tarball");
            }
        }
        return Err(e);
    }

    info!(package = %payload.name, versions = ?versions, user = %username, "published");
    Ok(GatewayResponse::ok(json!({ "ok": true, "success": true })))
}

/// Merge the payload into the stored document and stamp the new versions
async fn write_document(
    state: &RegistryState,
    scope: Option<&str>,
    name: &str,
    username: &str,
    payload: &PublishPayload,
    versions: &[&str],
) -> TrocResult<()> {
    let current = state.packages.read_info_json(scope, name).await?;
    let mut next = merge_info(current, payload.document.clone());

    let email = state.cache.users.get(username).map(|user| user.email).unwrap_or_default();
    stamp_npm_user(&mut next, versions, username, &email);
    stamp_publish_time(&mut next, versions, &Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
    state.packages.write_info(scope, name, &next).await
}
