//! # troc-server
//!
//! Request dispatch for the troc npm gateway.
//!
//! Requests are buffered into a [`GatewayRequest`], run through an
//! [`InterceptorChain`] (readiness, health, registry lookup, auth, dispatch
//! key) and handed to the handler the [`HandlerTable`] names for their key.

pub mod context;
pub mod dispatch;
pub mod handlers;
pub mod interceptor;
pub mod request;
pub mod server;

pub use context::{AppContext, RegistryState};
pub use dispatch::{Gateway, HandlerTable};
pub use handlers::Handler;
pub use interceptor::{Flow, Interceptor, InterceptorChain, RequestContext};
pub use request::{GatewayRequest, GatewayResponse};
pub use server::{router, run, serve};

use troc_core::error::TrocError;

/// Result type for server operations
pub type ServerResult<T> = Result<T, TrocError>;
