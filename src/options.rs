//! Layered option resolution.
//!
//! Three partial layers feed every call: the profile's definition options,
//! the dynamic-options callback result, and per-call overrides. Layers are
//! folded left-to-right (later wins) and schema defaults fill whatever is
//! still unset. Resolution is pure: identical inputs always produce the same
//! resolved set, and no input layer is ever mutated.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::breaker::{BreakerMode, BreakerParams, BreakerSetting};
use crate::error::{HttpClientError, Result};
use crate::logging::LogPolicy;
use crate::response::Response;
use crate::retry::{RetryDelay, RetryPolicy};

/// Failure-signal function: decides whether a finished call counts as a melt
/// for the attached breaker.
pub type MeltPredicate =
    Arc<dyn Fn(&std::result::Result<Response, HttpClientError>) -> bool + Send + Sync>;

/// Pool-checkout wait applied when no layer sets `checkout_timeout`.
pub const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_millis(500);

/// Response wait applied when no layer sets `receive_timeout`.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Every option name the schema recognizes. Validation is closed: anything
/// outside this list is rejected, at every layer.
pub const RECOGNIZED_OPTIONS: &[&str] = &[
    "base_url",
    "pool",
    "checkout_timeout",
    "receive_timeout",
    "raw",
    "decode_body",
    "retry",
    "retry_delay",
    "max_retries",
    "log",
    "breaker",
    "breaker_name",
    "breaker_verbose",
    "breaker_mode",
    "melt_predicate",
    "instrument_name",
];

/// Option names whose values are functions and therefore only settable in
/// code, never from a data-sourced layer.
const CODE_ONLY_OPTIONS: &[&str] = &["retry", "retry_delay", "log", "melt_predicate"];

/// One partial configuration layer.
///
/// Every field is optional; an unset field defers to lower layers and
/// ultimately to the schema default.
#[derive(Clone, Default)]
pub struct OptionsPatch {
    pub(crate) base_url: Option<String>,
    pub(crate) pool: Option<String>,
    pub(crate) checkout_timeout: Option<Duration>,
    pub(crate) receive_timeout: Option<Duration>,
    pub(crate) raw: Option<bool>,
    pub(crate) decode_body: Option<bool>,
    pub(crate) retry: Option<RetryPolicy>,
    pub(crate) retry_delay: Option<RetryDelay>,
    pub(crate) max_retries: Option<u32>,
    pub(crate) log: Option<LogPolicy>,
    pub(crate) breaker: Option<BreakerSetting>,
    pub(crate) breaker_name: Option<String>,
    pub(crate) breaker_verbose: Option<bool>,
    pub(crate) breaker_mode: Option<BreakerMode>,
    pub(crate) melt_predicate: Option<MeltPredicate>,
    pub(crate) instrument_name: Option<String>,
}

impl OptionsPatch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a patch from a JSON object, rejecting unrecognized keys and
    /// malformed values with an error naming the offending key.
    pub fn from_json(value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| HttpClientError::InvalidOption {
            key: "options".to_string(),
            reason: "expected a JSON object".to_string(),
        })?;

        let mut patch = OptionsPatch::new();
        for (key, value) in map {
            match key.as_str() {
                "base_url" => patch.base_url = Some(expect_string(key, value)?),
                "pool" => patch.pool = Some(expect_string(key, value)?),
                "checkout_timeout" => patch.checkout_timeout = Some(expect_millis(key, value)?),
                "receive_timeout" => patch.receive_timeout = Some(expect_millis(key, value)?),
                "raw" => patch.raw = Some(expect_bool(key, value)?),
                "decode_body" => patch.decode_body = Some(expect_bool(key, value)?),
                "max_retries" => patch.max_retries = Some(expect_u32(key, value)?),
                "breaker" => {
                    patch.breaker = Some(
                        serde_json::from_value(value.clone())
                            .map_err(|error| invalid(key, error.to_string()))?,
                    );
                }
                "breaker_name" => patch.breaker_name = Some(expect_string(key, value)?),
                "breaker_verbose" => patch.breaker_verbose = Some(expect_bool(key, value)?),
                "breaker_mode" => {
                    patch.breaker_mode = Some(
                        serde_json::from_value(value.clone())
                            .map_err(|error| invalid(key, error.to_string()))?,
                    );
                }
                "instrument_name" => patch.instrument_name = Some(expect_string(key, value)?),
                name if CODE_ONLY_OPTIONS.contains(&name) => {
                    return Err(invalid(key, "only settable in code"));
                }
                _ => {
                    return Err(HttpClientError::UnknownOption { key: key.clone() });
                }
            }
        }
        Ok(patch)
    }

    /// Set the base address requests are resolved against.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Name the transport pool connections are checked out of.
    pub fn pool(mut self, name: impl Into<String>) -> Self {
        self.pool = Some(name.into());
        self
    }

    /// Set the pool-checkout wait.
    pub fn checkout_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = Some(timeout);
        self
    }

    /// Set the response wait.
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }

    /// Return the body undecoded.
    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Enable or disable JSON body decoding.
    pub fn decode_body(mut self, decode: bool) -> Self {
        self.decode_body = Some(decode);
        self
    }

    /// Select the retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Shape the delay between retry attempts.
    pub fn retry_delay(mut self, delay: RetryDelay) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Cap the number of retries.
    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    /// Set the logging policy.
    pub fn log(mut self, policy: LogPolicy) -> Self {
        self.log = Some(policy);
        self
    }

    /// Attach or disable the circuit breaker.
    pub fn breaker(mut self, setting: BreakerSetting) -> Self {
        self.breaker = Some(setting);
        self
    }

    /// Override the breaker registry key (defaults to the profile name).
    pub fn breaker_name(mut self, name: impl Into<String>) -> Self {
        self.breaker_name = Some(name.into());
        self
    }

    /// Raise breaker transition logs from debug to info.
    pub fn breaker_verbose(mut self, verbose: bool) -> Self {
        self.breaker_verbose = Some(verbose);
        self
    }

    /// Choose the breaker state scope.
    pub fn breaker_mode(mut self, mode: BreakerMode) -> Self {
        self.breaker_mode = Some(mode);
        self
    }

    /// Supply the failure-signal function presented to the breaker.
    pub fn melt_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&std::result::Result<Response, HttpClientError>) -> bool + Send + Sync + 'static,
    {
        self.melt_predicate = Some(Arc::new(predicate));
        self
    }

    /// Override the instrumentation name (defaults to the profile name).
    pub fn instrument_name(mut self, name: impl Into<String>) -> Self {
        self.instrument_name = Some(name.into());
        self
    }

    /// Overlay `other` onto this patch: any option `other` sets wins.
    pub(crate) fn apply(&mut self, other: &OptionsPatch) {
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        overlay!(
            base_url,
            pool,
            checkout_timeout,
            receive_timeout,
            raw,
            decode_body,
            retry,
            retry_delay,
            max_retries,
            log,
            breaker,
            breaker_name,
            breaker_verbose,
            breaker_mode,
            melt_predicate,
            instrument_name,
        );
    }
}

impl fmt::Debug for OptionsPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionsPatch")
            .field("base_url", &self.base_url)
            .field("pool", &self.pool)
            .field("checkout_timeout", &self.checkout_timeout)
            .field("receive_timeout", &self.receive_timeout)
            .field("raw", &self.raw)
            .field("decode_body", &self.decode_body)
            .field("retry", &self.retry)
            .field("retry_delay", &self.retry_delay)
            .field("max_retries", &self.max_retries)
            .field("log", &self.log)
            .field("breaker", &self.breaker)
            .field("breaker_name", &self.breaker_name)
            .field("breaker_verbose", &self.breaker_verbose)
            .field("breaker_mode", &self.breaker_mode)
            .field("melt_predicate", &self.melt_predicate.as_ref().map(|_| ".."))
            .field("instrument_name", &self.instrument_name)
            .finish()
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> HttpClientError {
    HttpClientError::InvalidOption {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn expect_string(key: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(key, "expected a string"))
}

fn expect_bool(key: &str, value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| invalid(key, "expected a boolean"))
}

fn expect_u32(key: &str, value: &Value) -> Result<u32> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| invalid(key, "expected an unsigned integer"))
}

fn expect_millis(key: &str, value: &Value) -> Result<Duration> {
    value
        .as_u64()
        .map(Duration::from_millis)
        .ok_or_else(|| invalid(key, "expected a duration in milliseconds"))
}

/// One validated, fully-defaulted option set, computed fresh per call.
#[derive(Clone)]
pub struct ResolvedOptions {
    /// Base address, already parsed.
    pub base_url: Option<Url>,
    /// Named transport pool.
    pub pool: Option<String>,
    /// Pool-checkout wait.
    pub checkout_timeout: Duration,
    /// Response wait.
    pub receive_timeout: Duration,
    /// Skip all body processing.
    pub raw: bool,
    /// JSON-decode the response body.
    pub decode_body: bool,
    /// Retry selector.
    pub retry: RetryPolicy,
    /// Delay between retry attempts.
    pub retry_delay: RetryDelay,
    /// Retry cap.
    pub max_retries: u32,
    /// Logging policy.
    pub log: LogPolicy,
    /// Breaker attachment.
    pub breaker: BreakerSetting,
    /// Breaker registry key override.
    pub breaker_name: Option<String>,
    /// Breaker transition log level.
    pub breaker_verbose: bool,
    /// Breaker state scope.
    pub breaker_mode: BreakerMode,
    /// Failure-signal override.
    pub melt_predicate: Option<MeltPredicate>,
    /// Instrumentation name override.
    pub instrument_name: Option<String>,
}

impl std::fmt::Debug for ResolvedOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedOptions")
            .field("base_url", &self.base_url)
            .field("pool", &self.pool)
            .field("checkout_timeout", &self.checkout_timeout)
            .field("receive_timeout", &self.receive_timeout)
            .field("raw", &self.raw)
            .field("decode_body", &self.decode_body)
            .field("retry", &format_args!("<retry>"))
            .field("retry_delay", &format_args!("<retry_delay>"))
            .field("max_retries", &self.max_retries)
            .field("log", &format_args!("<log>"))
            .field("breaker", &self.breaker)
            .field("breaker_name", &self.breaker_name)
            .field("breaker_verbose", &self.breaker_verbose)
            .field("breaker_mode", &self.breaker_mode)
            .field(
                "melt_predicate",
                &self.melt_predicate.as_ref().map(|_| format_args!("<fn>")),
            )
            .field("instrument_name", &self.instrument_name)
            .finish()
    }
}

impl ResolvedOptions {
    /// Fold the given layers left-to-right (later layers override earlier
    /// ones), apply schema defaults, and validate the result.
    ///
    /// Fails before any network activity: a malformed base URL or degenerate
    /// breaker parameters surface here.
    pub fn resolve(layers: &[&OptionsPatch]) -> Result<Self> {
        let mut merged = OptionsPatch::new();
        for layer in layers {
            merged.apply(layer);
        }

        let base_url = match &merged.base_url {
            Some(raw) => {
                Some(Url::parse(raw).map_err(|error| invalid("base_url", error.to_string()))?)
            }
            None => None,
        };

        let breaker = merged
            .breaker
            .unwrap_or_else(|| BreakerSetting::Enabled(BreakerParams::default()));
        if let BreakerSetting::Enabled(params) = &breaker {
            params.validate()?;
        }

        Ok(Self {
            base_url,
            pool: merged.pool,
            checkout_timeout: merged.checkout_timeout.unwrap_or(DEFAULT_CHECKOUT_TIMEOUT),
            receive_timeout: merged.receive_timeout.unwrap_or(DEFAULT_RECEIVE_TIMEOUT),
            raw: merged.raw.unwrap_or(false),
            decode_body: merged.decode_body.unwrap_or(true),
            retry: merged.retry.unwrap_or_default(),
            retry_delay: merged.retry_delay.unwrap_or_default(),
            max_retries: merged.max_retries.unwrap_or(0),
            log: merged.log.unwrap_or_default(),
            breaker,
            breaker_name: merged.breaker_name,
            breaker_verbose: merged.breaker_verbose.unwrap_or(false),
            breaker_mode: merged.breaker_mode.unwrap_or_default(),
            melt_predicate: merged.melt_predicate,
            instrument_name: merged.instrument_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_apply_when_no_layer_sets_a_value() {
        let options = ResolvedOptions::resolve(&[]).unwrap();

        assert_eq!(options.checkout_timeout, Duration::from_millis(500));
        assert_eq!(options.receive_timeout, Duration::from_millis(1000));
        assert!(!options.raw);
        assert!(options.decode_body);
        assert_eq!(options.max_retries, 0);
        assert!(matches!(options.retry, RetryPolicy::Off));
        assert!(matches!(options.log, LogPolicy::Default));
        assert!(matches!(options.breaker, BreakerSetting::Enabled(_)));
    }

    #[test]
    fn later_layers_override_earlier_ones() {
        let definition = OptionsPatch::new().receive_timeout(Duration::from_millis(999));
        let dynamic = OptionsPatch::new().receive_timeout(Duration::from_millis(500));
        let call = OptionsPatch::new().receive_timeout(Duration::ZERO);

        let options = ResolvedOptions::resolve(&[&definition, &dynamic, &call]).unwrap();
        assert_eq!(options.receive_timeout, Duration::ZERO);

        let options = ResolvedOptions::resolve(&[&definition, &dynamic]).unwrap();
        assert_eq!(options.receive_timeout, Duration::from_millis(500));

        let options = ResolvedOptions::resolve(&[&definition]).unwrap();
        assert_eq!(options.receive_timeout, Duration::from_millis(999));
    }

    #[test]
    fn unset_fields_fall_through_the_merge() {
        let definition = OptionsPatch::new()
            .base_url("https://api.example.com")
            .receive_timeout(Duration::from_millis(999));
        let call = OptionsPatch::new().raw(true);

        let options = ResolvedOptions::resolve(&[&definition, &call]).unwrap();
        assert_eq!(
            options.base_url.as_ref().map(Url::as_str),
            Some("https://api.example.com/")
        );
        assert_eq!(options.receive_timeout, Duration::from_millis(999));
        assert!(options.raw);
    }

    #[test]
    fn resolution_is_deterministic() {
        let definition = OptionsPatch::new()
            .base_url("https://api.example.com")
            .checkout_timeout(Duration::from_millis(42));
        let call = OptionsPatch::new().decode_body(false);

        let first = ResolvedOptions::resolve(&[&definition, &call]).unwrap();
        let second = ResolvedOptions::resolve(&[&definition, &call]).unwrap();

        assert_eq!(first.base_url, second.base_url);
        assert_eq!(first.checkout_timeout, second.checkout_timeout);
        assert_eq!(first.receive_timeout, second.receive_timeout);
        assert_eq!(first.decode_body, second.decode_body);
        assert_eq!(first.breaker, second.breaker);
        // Inputs are untouched by resolution.
        assert_eq!(definition.checkout_timeout, Some(Duration::from_millis(42)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let error = OptionsPatch::from_json(&json!({"receive_timeout": 100, "bogus": 1}))
            .unwrap_err();
        assert!(matches!(
            error,
            HttpClientError::UnknownOption { key } if key == "bogus"
        ));
    }

    #[test]
    fn code_only_keys_are_rejected_from_data() {
        let error = OptionsPatch::from_json(&json!({"log": "none"})).unwrap_err();
        assert!(matches!(
            error,
            HttpClientError::InvalidOption { key, .. } if key == "log"
        ));
    }

    #[test]
    fn data_patch_covers_every_data_option() {
        let patch = OptionsPatch::from_json(&json!({
            "base_url": "https://api.example.com",
            "pool": "payments",
            "checkout_timeout": 250,
            "receive_timeout": 2000,
            "raw": false,
            "decode_body": true,
            "max_retries": 2,
            "breaker": {"enabled": {"melt_threshold": 3, "window": 5000}},
            "breaker_name": "payments-upstream",
            "breaker_verbose": true,
            "breaker_mode": "per_host",
            "instrument_name": "payments.api",
        }))
        .unwrap();

        assert_eq!(patch.checkout_timeout, Some(Duration::from_millis(250)));
        assert_eq!(
            patch.breaker,
            Some(BreakerSetting::Enabled(BreakerParams {
                melt_threshold: 3,
                window: Duration::from_millis(5000),
            }))
        );
        assert_eq!(patch.breaker_mode, Some(BreakerMode::PerHost));

        let disabled = OptionsPatch::from_json(&json!({"breaker": "disabled"})).unwrap();
        assert_eq!(disabled.breaker, Some(BreakerSetting::Disabled));
    }

    #[test]
    fn wrong_types_name_the_offending_key() {
        let error = OptionsPatch::from_json(&json!({"receive_timeout": "fast"})).unwrap_err();
        assert!(matches!(
            error,
            HttpClientError::InvalidOption { key, .. } if key == "receive_timeout"
        ));
    }

    #[test]
    fn malformed_base_url_fails_resolution() {
        let definition = OptionsPatch::new().base_url("not a url");
        let error = ResolvedOptions::resolve(&[&definition]).unwrap_err();
        assert!(error.is_validation());
    }

    #[test]
    fn degenerate_breaker_params_fail_resolution() {
        let definition = OptionsPatch::new().breaker(BreakerSetting::Enabled(BreakerParams {
            melt_threshold: 0,
            window: Duration::from_secs(1),
        }));
        let error = ResolvedOptions::resolve(&[&definition]).unwrap_err();
        assert!(matches!(
            error,
            HttpClientError::InvalidOption { key, .. } if key == "breaker"
        ));
    }

    #[test]
    fn every_recognized_option_is_listed() {
        assert_eq!(RECOGNIZED_OPTIONS.len(), 16);
        for key in CODE_ONLY_OPTIONS {
            assert!(RECOGNIZED_OPTIONS.contains(key));
        }
    }
}
