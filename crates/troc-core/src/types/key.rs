//! Dispatch keys.
//!
//! A [`RequestKey`] is built once per request from the classified URL, the
//! npm command the client announced and the registry that owns the path. Its
//! string form is the lookup key into the server's handler table.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::registry::Registry;
use super::url::{ApiOwner, ParsedUrl};

/// Command keyword an npm client embeds in its `Referer` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NpmCommand {
    Install,
    Publish,
    View,
    Adduser,
    Whoami,
    Logout,
}

impl NpmCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            NpmCommand::Install => "install",
            NpmCommand::Publish => "publish",
            NpmCommand::View => "view",
            NpmCommand::Adduser => "adduser",
            NpmCommand::Whoami => "whoami",
            NpmCommand::Logout => "logout",
        }
    }

    /// Read the command from a `Referer` header such as
    /// `"install node registry.npmjs.org"`
    pub fn from_referer(referer: &str) -> Option<Self> {
        referer.split_whitespace().next()?.parse().ok()
    }
}

impl FromStr for NpmCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "install" | "i" | "add" | "ci" | "update" => Ok(NpmCommand::Install),
            "publish" => Ok(NpmCommand::Publish),
            "view" | "info" | "show" => Ok(NpmCommand::View),
            "adduser" | "login" | "add-user" => Ok(NpmCommand::Adduser),
            "whoami" => Ok(NpmCommand::Whoami),
            "logout" => Ok(NpmCommand::Logout),
            _ => Err(()),
        }
    }
}

impl fmt::Display for NpmCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a package request wants from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PkgAction {
    GetInfo,
    GetTarball,
    Unknown,
}

impl PkgAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PkgAction::GetInfo => "getInfo",
            PkgAction::GetTarball => "getTarball",
            PkgAction::Unknown => "unknown",
        }
    }

    /// publish carries its own payload; everything else reads either the
    /// tarball or the package document
    pub fn derive(command: NpmCommand, parsed: &ParsedUrl) -> Self {
        if command == NpmCommand::Publish {
            PkgAction::Unknown
        } else if parsed.tarball_version.is_some() {
            PkgAction::GetTarball
        } else if parsed.pkg_name.is_some() {
            PkgAction::GetInfo
        } else {
            PkgAction::Unknown
        }
    }
}

/// Whether a registry owns its packages or fronts upstreams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryType {
    Local,
    Proxy,
}

impl RegistryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryType::Local => "local",
            RegistryType::Proxy => "proxy",
        }
    }
}

/// Composite dispatch key, compared by its string form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestKey {
    Npm {
        registry_type: RegistryType,
        command: NpmCommand,
        pkg_action: PkgAction,
    },
    Api {
        owner: ApiOwner,
        version: String,
        path: String,
    },
}

impl RequestKey {
    /// Build the key for a classified request. An announced npm command
    /// always wins; without one only API paths produce a key.
    pub fn build(parsed: &ParsedUrl, command: Option<NpmCommand>, registry: &Registry) -> Option<Self> {
        if let Some(command) = command {
            return Some(RequestKey::Npm {
                registry_type: registry.registry_type(),
                command,
                pkg_action: PkgAction::derive(command, parsed),
            });
        }

        if parsed.is_api() {
            return Some(RequestKey::Api {
                owner: parsed.api_owner,
                version: parsed.api_version.clone().unwrap_or_default(),
                path: parsed.api_path.clone().unwrap_or_default(),
            });
        }

        None
    }

    /// Derived key for the same request; pair with the `with_*` setters
    pub fn fork(&self) -> Self {
        self.clone()
    }

    pub fn with_pkg_action(self, action: PkgAction) -> Self {
        match self {
            RequestKey::Npm { registry_type, command, .. } => RequestKey::Npm {
                registry_type,
                command,
                pkg_action: action,
            },
            api => api,
        }
    }

    pub fn with_registry_type(self, kind: RegistryType) -> Self {
        match self {
            RequestKey::Npm { command, pkg_action, .. } => RequestKey::Npm {
                registry_type: kind,
                command,
                pkg_action,
            },
            api => api,
        }
    }

    pub fn command(&self) -> Option<NpmCommand> {
        match self {
            RequestKey::Npm { command, .. } => Some(*command),
            RequestKey::Api { .. } => None,
        }
    }

    fn segments(&self) -> Vec<&str> {
        match self {
            RequestKey::Npm { registry_type, command, pkg_action } => {
                vec![registry_type.as_str(), command.as_str(), pkg_action.as_str()]
            }
            RequestKey::Api { owner, version, path } => vec![owner.as_str(), version, path],
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segments: Vec<&str> = self
            .segments()
            .into_iter()
            .filter(|s| !s.is_empty() && *s != "unknown")
            .collect();
        f.write_str(&segments.join("/"))
    }
}

/// Build the dispatch key for a classified request
pub fn build_key(parsed: &ParsedUrl, command: Option<NpmCommand>, registry: &Registry) -> Option<RequestKey> {
    RequestKey::build(parsed, command, registry)
}
