//! Account and session handlers: adduser, whoami, logout and the gateway's
//! own signup and attach-token endpoints

use serde::Deserialize;
use serde_json::json;
use tracing::info;
use url::Url;

use troc_cache::UserData;
use troc_core::error::TrocError;
use troc_core::utils::{generate_token, hash_password, verify_password};

use super::{registry, HandlerResult};
use crate::context::{AppContext, RegistryState};
use crate::interceptor::RequestContext;
use crate::request::GatewayResponse;

#[derive(Debug, Default, Deserialize)]
struct Credentials {
    name: Option<String>,
    password: Option<String>,
    email: Option<String>,
}

impl Credentials {
    fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachToken {
    registry_url: Option<String>,
    token: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// `npm adduser` / `npm login`. New users need name, password and email;
/// existing users log in with name and password. Anything missing or wrong
/// is a 401.
pub async fn adduser(app: &AppContext, cx: &RequestContext<'_>) -> HandlerResult {
    let state = registry(cx)?;
    let credentials = Credentials::parse(&cx.request.body).unwrap_or_default();

    let (Some(name), Some(password)) = (present(credentials.name), present(credentials.password)) else {
        return Err(TrocError::Unauthorized("name and password are required".to_string()));
    };

    match state.cache.users.get(&name) {
        Some(user) => {
            if !verify_password(&app.settings.secret, &password, &user.password_hash) {
                return Err(TrocError::Unauthorized(format!("wrong password for {}", name)));
            }
        }
        None => {
            let email = present(credentials.email)
                .ok_or_else(|| TrocError::Unauthorized("email is required to create a user".to_string()))?;
            create_user(app, state, &name, &password, email).await?;
        }
    }

    let token = generate_token();
    state.cache.issue_token(&token, &name).await?;
    info!(user = %name, "issued token");

    Ok(GatewayResponse::ok(json!({
        "ok": true,
        "id": format!("org.couchdb.user:{}", name),
        "token": token,
    })))
}

pub async fn whoami(_app: &AppContext, cx: &RequestContext<'_>) -> HandlerResult {
    match cx.username.as_deref() {
        Some(username) => Ok(GatewayResponse::ok(json!({ "username": username }))),
        None => Err(TrocError::Unauthorized("missing or unknown token".to_string())),
    }
}

/// Revoke the caller's token and session. Unknown tokens succeed too.
pub async fn logout(_app: &AppContext, cx: &RequestContext<'_>) -> HandlerResult {
    let state = registry(cx)?;

    // npm also names the token in the path: /-/user/token/<token>
    let token = cx.client_token.clone().or_else(|| {
        cx.parsed
            .api_path
            .as_deref()
            .and_then(|path| path.strip_prefix("user/token/"))
            .map(str::to_string)
    });

    if let Some(token) = token {
        state.cache.revoke(&token).await?;
        info!(user = ?cx.username, "revoked token");
    }

    Ok(GatewayResponse::ok(json!({ "ok": true })))
}

/// `POST /-/troc/v1/signup {name, password, email}`
pub async fn signup(app: &AppContext, cx: &RequestContext<'_>) -> HandlerResult {
    let state = registry(cx)?;
    let credentials = Credentials::parse(&cx.request.body)
        .ok_or_else(|| TrocError::Validation("signup body must be a JSON object".to_string()))?;

    let (Some(name), Some(password), Some(email)) = (
        present(credentials.name),
        present(credentials.password),
        present(credentials.email),
    ) else {
        return Err(TrocError::Validation("name, password and email are required".to_string()));
    };

    if state.cache.users.get(&name).is_some() {
        return Err(TrocError::Validation(format!("user {} already exists", name)));
    }

    create_user(app, state, &name, &password, email).await?;
    let token = generate_token();
    state.cache.issue_token(&token, &name).await?;
    info!(user = %name, "signed up");

    Ok(GatewayResponse::ok(json!({ "ok": true, "token": token })))
}

/// `POST /-/troc/v1/attach-token {registryUrl, token}`: later proxied
/// requests to `registryUrl` carry `token`
pub async fn attach_token(_app: &AppContext, cx: &RequestContext<'_>) -> HandlerResult {
    let state = registry(cx)?;
    let (Some(client_token), Some(_)) = (cx.client_token.as_deref(), cx.username.as_deref()) else {
        return Err(TrocError::Unauthorized("a valid token is required".to_string()));
    };

    let body: AttachToken = serde_json::from_slice(&cx.request.body)
        .map_err(|e| TrocError::Validation(format!("malformed attach-token body: {}", e)))?;
    let (Some(registry_url), Some(upstream_token)) = (present(body.registry_url), present(body.token)) else {
        return Err(TrocError::Validation("registryUrl and token are required".to_string()));
    };

    let parsed = Url::parse(&registry_url)
        .map_err(|e| TrocError::Validation(format!("invalid registryUrl '{}': {}", registry_url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(TrocError::Validation(format!("registryUrl must be http(s): {}", registry_url)));
    }

    state
        .cache
        .attach_token(client_token, &registry_url, &upstream_token)
        .await?;
    info!(user = ?cx.username, upstream = %registry_url, "attached upstream token");

    Ok(GatewayResponse::ok(json!({ "ok": true })))
}

async fn create_user(
    app: &AppContext,
    state: &RegistryState,
    name: &str,
    password: &str,
    email: String,
) -> Result<(), TrocError> {
    let password_hash = hash_password(&app.settings.secret, password)?;
    state
        .cache
        .users
        .write_record(name, UserData { password_hash, email })
        .await?;
    info!(user = %name, "created user");
    Ok(())
}
