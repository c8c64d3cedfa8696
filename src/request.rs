//! Per-call request builder.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;

use crate::breaker::BreakerSetting;
use crate::error::{HttpClientError, Result};
use crate::logging::LogPolicy;
use crate::options::OptionsPatch;
use crate::pipeline::{self, CallParts};
use crate::profile::HttpProfile;
use crate::response::Response;
use crate::transport::Transport;

/// Builder for one request against a profile.
///
/// Anything set here forms the call-time option layer, which takes
/// precedence over the profile's dynamic and definition layers.
pub struct RequestBuilder<'a> {
    profile: &'a HttpProfile,
    method: Method,
    url: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Option<Bytes>,
    overrides: OptionsPatch,
    transport: Option<Arc<dyn Transport>>,
    invalid: Option<HttpClientError>,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(profile: &'a HttpProfile, method: Method, url: String) -> Self {
        Self {
            profile,
            method,
            url,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            overrides: OptionsPatch::new(),
            transport: None,
            invalid: None,
        }
    }

    /// Add a header to the request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => {
                self.invalid = Some(HttpClientError::RequestBuild(format!(
                    "invalid header `{name}`"
                )));
            }
        }
        self
    }

    /// Add multiple headers to the request.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add multiple query parameters.
    pub fn queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in params {
            self.query.push((key.into(), value.into()));
        }
        self
    }

    /// Set the request body as raw bytes.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the request body as text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.body = Some(Bytes::from(text.into().into_bytes()));
        self
    }

    /// Set the request body as JSON.
    pub fn json<T: Serialize>(mut self, json: &T) -> Self {
        match serde_json::to_vec(json) {
            Ok(bytes) => {
                self.headers.insert(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                self.body = Some(bytes.into());
            }
            Err(error) => {
                self.invalid = Some(HttpClientError::RequestBuild(error.to_string()));
            }
        }
        self
    }

    /// Set the request body as form data.
    pub fn form<T: Serialize>(mut self, form: &T) -> Self {
        match serde_urlencoded::to_string(form) {
            Ok(encoded) => {
                self.headers.insert(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                );
                self.body = Some(Bytes::from(encoded.into_bytes()));
            }
            Err(error) => {
                self.invalid = Some(HttpClientError::RequestBuild(error.to_string()));
            }
        }
        self
    }

    /// Set bearer authentication.
    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Set basic authentication.
    pub fn basic_auth(
        self,
        username: impl Into<String>,
        password: Option<impl Into<String>>,
    ) -> Self {
        use base64::Engine;
        let credentials = match password {
            Some(password) => format!("{}:{}", username.into(), password.into()),
            None => format!("{}:", username.into()),
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        self.header("Authorization", format!("Basic {encoded}"))
    }

    /// Override any recognized options for this call only.
    pub fn options(mut self, patch: OptionsPatch) -> Self {
        self.overrides.apply(&patch);
        self
    }

    /// Shorthand for overriding the response wait.
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.overrides = self.overrides.receive_timeout(timeout);
        self
    }

    /// Shorthand for overriding the pool-checkout wait.
    pub fn checkout_timeout(mut self, timeout: Duration) -> Self {
        self.overrides = self.overrides.checkout_timeout(timeout);
        self
    }

    /// Shorthand for requesting the undecoded body.
    pub fn raw(mut self, raw: bool) -> Self {
        self.overrides = self.overrides.raw(raw);
        self
    }

    /// Shorthand for overriding the logging policy.
    pub fn log(mut self, policy: LogPolicy) -> Self {
        self.overrides = self.overrides.log(policy);
        self
    }

    /// Shorthand for overriding the breaker attachment.
    pub fn breaker(mut self, setting: BreakerSetting) -> Self {
        self.overrides = self.overrides.breaker(setting);
        self
    }

    /// Replace the transport for this call. This is the test seam.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Send the request through the step pipeline.
    pub async fn send(self) -> Result<Response> {
        if let Some(error) = self.invalid {
            return Err(error);
        }
        pipeline::execute(
            self.profile,
            CallParts {
                method: self.method,
                url: self.url,
                headers: self.headers,
                query: self.query,
                body: self.body,
                overrides: self.overrides,
                transport: self.transport,
            },
        )
        .await
    }
}
