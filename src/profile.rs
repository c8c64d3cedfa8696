//! HTTP client profiles.
//!
//! A profile is declared once and used for many calls. It fixes the
//! definition-time options, optionally carries a dynamic-options callback
//! for values unsafe to fix at declaration (environment-provided addresses
//! and the like), and owns the shared transport.

use std::fmt;
use std::sync::Arc;

use http::Method;

use crate::error::Result;
use crate::options::{OptionsPatch, ResolvedOptions};
use crate::request::RequestBuilder;
use crate::transport::{ReqwestTransport, Transport};

/// Zero-argument callback evaluated at call time; its result is merged above
/// the definition options and below call-time overrides.
pub type DynamicOptions = Arc<dyn Fn() -> OptionsPatch + Send + Sync>;

/// A declared HTTP client profile.
#[derive(Clone)]
pub struct HttpProfile {
    name: Arc<str>,
    definition: OptionsPatch,
    dynamic: Option<DynamicOptions>,
    transport: Arc<dyn Transport>,
}

impl HttpProfile {
    /// Start declaring a profile.
    pub fn builder(name: impl Into<String>) -> HttpProfileBuilder {
        HttpProfileBuilder {
            name: name.into(),
            definition: OptionsPatch::new(),
            dynamic: None,
            transport: None,
        }
    }

    /// The profile name; doubles as the default instrumentation and breaker
    /// name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn definition(&self) -> &OptionsPatch {
        &self.definition
    }

    pub(crate) fn dynamic_options(&self) -> Option<OptionsPatch> {
        self.dynamic.as_ref().map(|callback| callback())
    }

    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Create a GET request builder.
    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::GET, url.into())
    }

    /// Create a POST request builder.
    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::POST, url.into())
    }

    /// Create a PUT request builder.
    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PUT, url.into())
    }

    /// Create a PATCH request builder.
    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PATCH, url.into())
    }

    /// Create a DELETE request builder.
    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::DELETE, url.into())
    }

    /// Create a HEAD request builder.
    pub fn head(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::HEAD, url.into())
    }

    /// Create a request builder with a custom method.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, url.into())
    }
}

impl fmt::Debug for HttpProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProfile")
            .field("name", &self.name)
            .field("definition", &self.definition)
            .field("dynamic", &self.dynamic.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Builder for [`HttpProfile`].
pub struct HttpProfileBuilder {
    name: String,
    definition: OptionsPatch,
    dynamic: Option<DynamicOptions>,
    transport: Option<Arc<dyn Transport>>,
}

impl HttpProfileBuilder {
    /// Set the definition-time options.
    pub fn options(mut self, definition: OptionsPatch) -> Self {
        self.definition = definition;
        self
    }

    /// Set the dynamic-options callback.
    pub fn dynamic_options<F>(mut self, callback: F) -> Self
    where
        F: Fn() -> OptionsPatch + Send + Sync + 'static,
    {
        self.dynamic = Some(Arc::new(callback));
        self
    }

    /// Replace the default transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate the definition options and build the profile.
    ///
    /// Malformed definition options fail here, at declaration, rather than
    /// on the first call.
    pub fn build(self) -> Result<HttpProfile> {
        ResolvedOptions::resolve(&[&self.definition])?;

        Ok(HttpProfile {
            name: Arc::from(self.name),
            definition: self.definition,
            dynamic: self.dynamic,
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(ReqwestTransport::new())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{BreakerParams, BreakerSetting};
    use std::time::Duration;

    #[test]
    fn build_validates_definition_options() {
        let result = HttpProfile::builder("bad")
            .options(OptionsPatch::new().base_url("::not-a-url::"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn build_accepts_a_complete_definition() {
        let profile = HttpProfile::builder("api")
            .options(
                OptionsPatch::new()
                    .base_url("https://api.example.com")
                    .receive_timeout(Duration::from_secs(2))
                    .breaker(BreakerSetting::Enabled(BreakerParams::default())),
            )
            .build()
            .unwrap();
        assert_eq!(profile.name(), "api");
    }

    #[test]
    fn dynamic_callback_is_evaluated_per_use() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = hits.clone();

        let profile = HttpProfile::builder("dyn")
            .dynamic_options(move || {
                counted.fetch_add(1, Ordering::SeqCst);
                OptionsPatch::new().pool("replica")
            })
            .build()
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        let first = profile.dynamic_options().unwrap();
        let second = profile.dynamic_options().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(first.pool, Some("replica".to_string()));
        assert_eq!(second.pool, Some("replica".to_string()));
    }
}
