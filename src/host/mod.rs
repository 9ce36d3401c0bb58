//! Host integration.
//!
//! The pipeline itself only knows [`HttpRequestData`](crate::request::HttpRequestData)
//! and the projector traits; this module wires it into an axum application.

pub mod middleware;
pub mod sinks;

pub use middleware::{saml2_middleware, session_from_headers, HostError, ModuleState};
pub use sinks::{CookieSessionSink, RedbRequestStates, ResponseBuilder};
