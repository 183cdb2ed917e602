//! REST API plumbing for the blog backend.
//!
//! This module provides the `Transport` every call goes through, the
//! middleware chain it runs, the response envelope it unwraps, and the
//! authentication endpoints built on top of it.
//!
//! The API uses bearer token authentication obtained from the login
//! endpoint and renewed through the refresh endpoint.

pub mod auth;
pub mod envelope;
pub mod error;
pub mod middleware;
pub mod transport;

pub use auth::{token_expiry, AuthApi, HttpAuthApi, LoginGrant, RefreshGrant};
pub use envelope::{Envelope, SUCCESS_CODE};
pub use error::{ApiError, ErrorKind};
pub use middleware::{BearerAuth, Middleware, Next, RequestLog, StatusCheck};
pub use transport::{ApiCall, Transport};
