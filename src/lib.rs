//! Zentinel SAML2 Service Provider module
//!
//! Claims a configurable path prefix inside a host web application and
//! serves the SAML2 SP endpoints under it: metadata, sign-in (AuthnRequest
//! over HTTP-Redirect), the assertion consumer service and logout.
//!
//! A request flows through four stages:
//! [`CommandFactory::resolve`](command::CommandFactory::resolve) picks a
//! [`Command`](command::Command), [`run_command`](executor::run_command)
//! executes it with protocol faults contained, [`project`](projector::project)
//! turns the result into response and session effects, and
//! [`apply`](projector::apply) performs them through host traits.

pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod host;
pub mod projector;
pub mod request;
pub mod session;

pub use command::{Command, CommandFactory, CommandResult};
pub use config::Saml2Config;
pub use error::{CommandError, Saml2Error};
pub use host::{saml2_middleware, ModuleState};
