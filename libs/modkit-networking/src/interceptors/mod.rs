//! Ready-made interceptors

mod auth;
mod logging;
mod user_agent;

pub use auth::{AuthenticationInterceptor, TokenProvider};
pub use logging::{LoggingInterceptor, NetworkLogger, NoopNetworkLogger, TracingNetworkLogger};
pub use user_agent::UserAgentInterceptor;
