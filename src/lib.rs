//! Client-side dispatch for authenticated HTTP requests with transparent,
//! single-flight access token refresh.
//!
//! A [`Dispatcher`] admits each request straight to its [`Transport`] while the
//! access token has more than the configured lead time left. The first request
//! inside the lead window fires the registered refresh trigger; it and every
//! request after it are held, in order, until the application reports the
//! refresh outcome with [`Dispatcher::refresh_completed`].

pub mod config;
pub mod coordinator;
pub mod credential;
pub mod dispatch;
pub mod endpoint;
pub mod errors;
pub mod lifecycle;
pub mod queue;
pub mod request;
pub mod retry;
pub mod telemetry;
pub mod transport;
pub mod watchdog;

pub use config::{Config, ConfigLocation, read_config};
pub use coordinator::{Admission, RefreshCoordinator, RefreshStatus, RefreshTrigger};
pub use credential::{Credential, TokenType};
pub use dispatch::{Capabilities, Dispatcher};
pub use endpoint::{EndpointCall, ResourcePoint, ResponseParser};
pub use errors::{Error, Result};
pub use request::{Completion, Request, RequestKind, Response};
pub use transport::{AlwaysOnline, Connectivity, ReqwestTransport, Transport};
pub use watchdog::spawn_refresh_watchdog;

#[cfg(test)]
mod tests;
