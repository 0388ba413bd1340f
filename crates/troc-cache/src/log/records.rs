//! Users, tokens and sessions of one registry

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::collection::{CacheCollection, LoadOutcome};
use crate::CacheResult;

/// File names inside a registry's storage directory
pub const USERS_FILE: &str = "users.json";
pub const TOKENS_FILE: &str = "tokens.json";
pub const SESSIONS_FILE: &str = "sessions.json";

/// A registered user, keyed by username
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub password_hash: String,
    pub email: String,
}

/// An issued bearer token, keyed by the token itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    pub username: String,
}

/// Upstream tokens attached to a client token, keyed by the client token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionData {
    /// Upstream registry URL to upstream bearer token
    pub registries: BTreeMap<String, String>,
}

impl SessionData {
    pub fn token_for(&self, upstream_url: &str) -> Option<&str> {
        self.registries.get(&normalize_upstream(upstream_url)).map(String::as_str)
    }
}

/// Upstream URLs are compared without trailing slashes
pub fn normalize_upstream(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// The three auth collections of one registry
#[derive(Debug)]
pub struct RegistryCache {
    pub users: CacheCollection<UserData>,
    pub tokens: CacheCollection<TokenData>,
    pub sessions: CacheCollection<SessionData>,
    loaded: AtomicBool,
}

impl RegistryCache {
    /// Point the collections at `storage_dir`; nothing is read yet
    pub fn new(storage_dir: &Utf8Path) -> Self {
        Self {
            users: CacheCollection::new(storage_dir.join(USERS_FILE)),
            tokens: CacheCollection::new(storage_dir.join(TOKENS_FILE)),
            sessions: CacheCollection::new(storage_dir.join(SESSIONS_FILE)),
            loaded: AtomicBool::new(false),
        }
    }

    /// Load every collection; until this finishes the registry is not ready
    pub async fn read_all(&self) -> CacheResult<()> {
        let users = self.users.read_all().await?;
        let tokens = self.tokens.read_all().await?;
        let sessions = self.sessions.read_all().await?;

        info!(
            users = count(users),
            tokens = count(tokens),
            sessions = count(sessions),
            "registry cache loaded"
        );
        self.loaded.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Username owning a client token
    pub fn username_for_token(&self, token: &str) -> Option<String> {
        self.tokens.get(token).map(|data| data.username)
    }

    /// Upstream token attached to a client token for `upstream_url`
    pub fn session_token(&self, client_token: &str, upstream_url: &str) -> Option<String> {
        self.sessions
            .get(client_token)
            .and_then(|session| session.token_for(upstream_url).map(str::to_string))
    }

    /// Issue `token` to `username`
    pub async fn issue_token(&self, token: &str, username: &str) -> CacheResult<()> {
        self.tokens
            .write_record(token, TokenData { username: username.to_string() })
            .await
    }

    /// Attach an upstream token to the caller's session
    pub async fn attach_token(&self, client_token: &str, upstream_url: &str, upstream_token: &str) -> CacheResult<()> {
        self.sessions
            .update(client_token, |session| {
                let mut session = session.unwrap_or_default();
                session
                    .registries
                    .insert(normalize_upstream(upstream_url), upstream_token.to_string());
                session
            })
            .await?;
        Ok(())
    }

    /// Drop a token and its session; unknown tokens are fine
    pub async fn revoke(&self, client_token: &str) -> CacheResult<()> {
        self.tokens.delete(client_token).await?;
        self.sessions.delete(client_token).await?;
        Ok(())
    }
}

fn count(outcome: LoadOutcome) -> usize {
    match outcome {
        LoadOutcome::Missing => 0,
        LoadOutcome::Clean { records } | LoadOutcome::Recovered { records, .. } => records,
    }
}
