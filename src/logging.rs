//! Outcome logging policy.
//!
//! The logging step runs last in the response phase so it observes the
//! outcome of everything before it. The default behavior can be replaced
//! wholesale by a caller-supplied observer, or suppressed entirely.

use std::fmt;
use std::sync::Arc;

use http::Method;
use tracing::{debug, warn};

use crate::error::HttpClientError;
use crate::response::Response;

/// Caller-supplied logging capability. Receives the finished call and owns
/// its own logging decisions.
pub type LogObserver = Arc<dyn Fn(&LogRecord<'_>) + Send + Sync>;

/// Logging behavior for one call, decided once at composition time.
#[derive(Clone, Default)]
pub enum LogPolicy {
    /// Warn on server-error statuses (above 499), silent otherwise.
    #[default]
    Default,
    /// Replace the default entirely with the given observer.
    Custom(LogObserver),
    /// Suppress all call logging.
    None,
}

impl fmt::Debug for LogPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::Custom(_) => f.write_str("Custom(..)"),
            Self::None => f.write_str("None"),
        }
    }
}

/// What the logging step sees once a call finishes.
pub struct LogRecord<'a> {
    /// Instrumentation name of the calling profile.
    pub profile: &'a str,
    /// Request method.
    pub method: &'a Method,
    /// Target URL.
    pub url: &'a str,
    /// The call outcome.
    pub result: &'a std::result::Result<Response, HttpClientError>,
}

pub(crate) fn log_request(policy: &LogPolicy, profile: &str, method: &Method, url: &str) {
    if matches!(policy, LogPolicy::Default) {
        debug!(profile, method = %method, url, "sending request");
    }
}

pub(crate) fn observe_outcome(policy: &LogPolicy, record: &LogRecord<'_>) {
    match policy {
        LogPolicy::Default => default_observe(record),
        LogPolicy::Custom(observer) => observer(record),
        LogPolicy::None => {}
    }
}

fn default_observe(record: &LogRecord<'_>) {
    if let Ok(response) = record.result
        && response.status().as_u16() > 499
    {
        warn!(
            profile = record.profile,
            status = response.status().as_u16(),
            body = %render_body(response.bytes()),
            url = record.url,
            "upstream returned a server error"
        );
    }
}

/// Pass UTF-8 bodies through unchanged, debug-format anything else.
pub(crate) fn render_body(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => format!("{:?}", bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_bodies_pass_through() {
        assert_eq!(render_body(b"plain text"), "plain text");
        assert_eq!(render_body(br#"{"ok":true}"#), r#"{"ok":true}"#);
    }

    #[test]
    fn binary_bodies_are_debug_formatted() {
        let rendered = render_body(&[0xff, 0xfe, 0x00]);
        assert_eq!(rendered, "[255, 254, 0]");
    }
}
