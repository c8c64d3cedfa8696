//! # strata-http
//!
//! A profile-declared HTTP client layer with layered option resolution,
//! circuit breaking, outcome logging, and per-step instrumentation.
//!
//! The heavy lifting of an HTTP client (connection pooling, TLS, redirects,
//! compression) belongs to the engine underneath. This crate supplies the
//! composition around it:
//!
//! - **Layered options**: definition-time options, a dynamic-options
//!   callback, and per-call overrides merge into one validated set per call.
//!   Validation is closed: unrecognized option names are rejected.
//! - **Circuit breaking**: calls are gated through named, per-process
//!   breakers that trip after a configured number of failure signals inside
//!   a time window.
//! - **Outcome logging**: server-error responses produce one warning by
//!   default; the behavior can be replaced or suppressed per call.
//! - **Step instrumentation**: every named step (`log`, `circuit_breaker`,
//!   `transport`) runs inside a span that records its phase and duration,
//!   and each call gets a top-level span carrying method, URL and outcome.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strata_http::{HttpProfile, OptionsPatch};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = HttpProfile::builder("orders")
//!         .options(
//!             OptionsPatch::new()
//!                 .base_url("https://api.example.com")
//!                 .receive_timeout(Duration::from_secs(2)),
//!         )
//!         .build()?;
//!
//!     let response = api.get("/orders/42").send().await?;
//!     println!("status: {}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! ## With a breaker and per-call overrides
//!
//! ```rust,no_run
//! use strata_http::{BreakerParams, BreakerSetting, HttpProfile, LogPolicy, OptionsPatch};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = HttpProfile::builder("payments")
//!         .options(
//!             OptionsPatch::new()
//!                 .base_url("https://payments.example.com")
//!                 .breaker(BreakerSetting::Enabled(BreakerParams {
//!                     melt_threshold: 5,
//!                     window: Duration::from_secs(10),
//!                 })),
//!         )
//!         .dynamic_options(|| {
//!             // Evaluated per call, for values unsafe to fix at declaration.
//!             OptionsPatch::new().pool(std::env::var("PAYMENTS_POOL").unwrap_or_default())
//!         })
//!         .build()?;
//!
//!     // Call-time options take precedence over everything else.
//!     let response = api
//!         .post("/charges")
//!         .json(&serde_json::json!({"amount": 1200}))
//!         .receive_timeout(Duration::from_millis(500))
//!         .log(LogPolicy::None)
//!         .send()
//!         .await?;
//!
//!     println!("charged: {}", response.is_success());
//!     Ok(())
//! }
//! ```

mod breaker;
mod error;
mod logging;
mod options;
mod pipeline;
mod profile;
mod request;
mod response;
mod retry;
mod transport;

pub use breaker::{
    BreakerMode, BreakerParams, BreakerRegistry, BreakerSetting, CircuitBreaker, CircuitState,
};
pub use error::{HttpClientError, Result};
pub use logging::{LogObserver, LogPolicy, LogRecord};
pub use options::{
    DEFAULT_CHECKOUT_TIMEOUT, DEFAULT_RECEIVE_TIMEOUT, MeltPredicate, OptionsPatch,
    RECOGNIZED_OPTIONS, ResolvedOptions,
};
pub use profile::{DynamicOptions, HttpProfile, HttpProfileBuilder};
pub use request::RequestBuilder;
pub use response::Response;
pub use retry::{RetryDelay, RetryPolicy};
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};

// Re-export common types
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use strata_http::prelude::*;
/// ```
pub mod prelude {
    pub use crate::breaker::{BreakerMode, BreakerParams, BreakerSetting, CircuitState};
    pub use crate::error::{HttpClientError, Result};
    pub use crate::logging::{LogPolicy, LogRecord};
    pub use crate::options::{OptionsPatch, ResolvedOptions};
    pub use crate::profile::{HttpProfile, HttpProfileBuilder};
    pub use crate::request::RequestBuilder;
    pub use crate::response::Response;
    pub use crate::retry::{RetryDelay, RetryPolicy};
    pub use crate::transport::{Transport, TransportRequest, TransportResponse};
    pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
}
