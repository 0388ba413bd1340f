//! Command and API handlers
//!
//! Local and proxy variants of the same command are separate handlers; the
//! dispatch table picks one by request key.

pub mod auth;
pub mod packages;
pub mod proxy;

use troc_core::error::{TrocError, TrocResult};
use troc_core::utils::is_safe_segment;

use crate::context::{AppContext, RegistryState};
use crate::interceptor::RequestContext;
use crate::request::GatewayResponse;

pub type HandlerResult = TrocResult<GatewayResponse>;

/// Every handler the dispatch table can name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Adduser,
    Whoami,
    Logout,
    LocalGetInfo,
    LocalGetTarball,
    LocalPublish,
    ProxyGetInfo,
    ProxyGetTarball,
    ProxyPublish,
    Signup,
    AttachToken,
}

impl Handler {
    pub async fn call(self, app: &AppContext, cx: &RequestContext<'_>) -> HandlerResult {
        match self {
            Handler::Adduser => auth::adduser(app, cx).await,
            Handler::Whoami => auth::whoami(app, cx).await,
            Handler::Logout => auth::logout(app, cx).await,
            Handler::LocalGetInfo => packages::get_info(app, cx).await,
            Handler::LocalGetTarball => packages::get_tarball(app, cx).await,
            Handler::LocalPublish => packages::publish(app, cx).await,
            Handler::ProxyGetInfo => proxy::get_info(app, cx).await,
            Handler::ProxyGetTarball => proxy::get_tarball(app, cx).await,
            Handler::ProxyPublish => proxy::publish(app, cx).await,
            Handler::Signup => auth::signup(app, cx).await,
            Handler::AttachToken => auth::attach_token(app, cx).await,
        }
    }
}

/// The registry resolved by the interceptor chain
pub(crate) fn registry<'a>(cx: &RequestContext<'a>) -> TrocResult<&'a RegistryState> {
    cx.registry
        .ok_or_else(|| TrocError::NotFound(format!("no registry serves {}", cx.request.path)))
}

/// `(scope, name)` of the requested package. Names that could leave the
/// storage directory are reported as missing.
pub(crate) fn package_parts<'c>(cx: &'c RequestContext<'_>) -> TrocResult<(Option<&'c str>, &'c str)> {
    let not_found = || TrocError::NotFound(cx.request.path.clone());

    let name = cx.parsed.pkg_name.as_deref().ok_or_else(not_found)?;
    let scope = cx.parsed.pkg_scope.as_deref();
    let version = cx.parsed.tarball_version.as_deref();

    let safe = [Some(name), scope, version]
        .into_iter()
        .flatten()
        .all(is_safe_segment);
    if safe {
        Ok((scope, name))
    } else {
        Err(not_found())
    }
}
