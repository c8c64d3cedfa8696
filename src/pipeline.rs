//! Step pipeline composition and execution.
//!
//! One logical request flows through a fixed, ordered set of named steps:
//! the merged options are validated first, then `log` and `circuit_breaker`
//! run their request-phase hooks, the `transport` step executes, and the
//! response phase mirrors the order back out (breaker observes the outcome,
//! then logging observes it). Every step is wrapped in a span that records
//! its name, phase and elapsed time, whatever the outcome.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method};
use tracing::{Instrument, debug, debug_span};
use url::Url;

use crate::breaker::{BreakerMode, BreakerRegistry, BreakerSetting, CircuitBreaker};
use crate::error::{HttpClientError, Result};
use crate::logging::{self, LogRecord};
use crate::options::{OptionsPatch, ResolvedOptions};
use crate::profile::HttpProfile;
use crate::response::Response;
use crate::transport::{Transport, TransportRequest, TransportResponse};

const PHASE_REQUEST: &str = "request";
const PHASE_RESPONSE: &str = "response";

/// Everything the request builder hands over for one call.
pub(crate) struct CallParts {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub overrides: OptionsPatch,
    pub transport: Option<Arc<dyn Transport>>,
}

/// Resolve options, compose the step sequence, and drive it to completion.
pub(crate) async fn execute(profile: &HttpProfile, parts: CallParts) -> Result<Response> {
    // Options resolve before anything can touch the network.
    let dynamic = profile.dynamic_options();
    let mut layers: Vec<&OptionsPatch> = Vec::with_capacity(3);
    layers.push(profile.definition());
    if let Some(dynamic) = dynamic.as_ref() {
        layers.push(dynamic);
    }
    layers.push(&parts.overrides);
    let options = ResolvedOptions::resolve(&layers)?;

    let url = build_url(&options, &parts.url, &parts.query)?;
    let instrument = options
        .instrument_name
        .clone()
        .unwrap_or_else(|| profile.name().to_string());

    let span = debug_span!(
        "http_call",
        profile = %instrument,
        method = %parts.method,
        url = %url,
        query = %format_query(&parts.query),
    );
    debug!(parent: &span, "request started");
    let started = Instant::now();

    let transport = parts
        .transport
        .clone()
        .unwrap_or_else(|| profile.transport());
    let result = run(profile.name(), &instrument, &parts, &options, transport, url)
        .instrument(span.clone())
        .await;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(response) => {
            debug!(parent: &span, status = response.status().as_u16(), elapsed_ms, "request finished");
        }
        Err(error) => {
            debug!(parent: &span, error = %error, elapsed_ms, "request failed");
        }
    }
    result
}

async fn run(
    profile_name: &str,
    instrument: &str,
    parts: &CallParts,
    options: &ResolvedOptions,
    transport: Arc<dyn Transport>,
    url: Url,
) -> Result<Response> {
    step("log", PHASE_REQUEST, || {
        logging::log_request(&options.log, instrument, &parts.method, url.as_str())
    });

    let breaker = step("circuit_breaker", PHASE_REQUEST, || {
        gate_breaker(options, profile_name, &url)
    })?;

    let request = TransportRequest {
        method: parts.method.clone(),
        url: url.clone(),
        headers: parts.headers.clone(),
        body: parts.body.clone(),
        pool: options.pool.clone(),
        checkout_timeout: options.checkout_timeout,
        receive_timeout: options.receive_timeout,
    };

    let raw = call_transport(transport.as_ref(), request, options).await;
    let outcome = raw.and_then(|raw| decode_response(raw, options));

    if let Some(breaker) = &breaker {
        step("circuit_breaker", PHASE_RESPONSE, || {
            observe_breaker(breaker, options, &outcome)
        });
    }

    step("log", PHASE_RESPONSE, || {
        logging::observe_outcome(
            &options.log,
            &LogRecord {
                profile: instrument,
                method: &parts.method,
                url: url.as_str(),
                result: &outcome,
            },
        )
    });

    outcome
}

/// Run one named step inside a span, reporting elapsed time on completion
/// whether it succeeded or not.
fn step<T>(name: &'static str, phase: &'static str, f: impl FnOnce() -> T) -> T {
    let span = debug_span!("step", step = name, phase = phase);
    let started = Instant::now();
    let out = span.in_scope(f);
    let elapsed_ms = started.elapsed().as_millis() as u64;
    debug!(parent: &span, step = name, phase = phase, elapsed_ms, "step completed");
    out
}

/// The transport step, with the retry loop around it. No other step retries.
async fn call_transport(
    transport: &dyn Transport,
    request: TransportRequest,
    options: &ResolvedOptions,
) -> Result<TransportResponse> {
    let mut attempt: u32 = 0;
    loop {
        let span = debug_span!("step", step = "transport", phase = PHASE_REQUEST);
        let started = Instant::now();
        let result = transport.call(request.clone()).instrument(span.clone()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(parent: &span, step = "transport", phase = PHASE_REQUEST, elapsed_ms, "step completed");

        match result {
            Err(error)
                if attempt < options.max_retries
                    && options.retry.should_retry(&request.method, &error) =>
            {
                attempt += 1;
                let delay = options.retry_delay.delay_for_attempt(attempt);
                debug!(attempt, error = %error, delay_ms = delay.as_millis() as u64, "retrying request");
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

/// Attach the breaker for this call, or fail fast if it is open.
///
/// `Disabled` yields no breaker at all: options are accepted, nothing is
/// gated or recorded.
fn gate_breaker(
    options: &ResolvedOptions,
    profile_name: &str,
    url: &Url,
) -> Result<Option<Arc<CircuitBreaker>>> {
    let params = match &options.breaker {
        BreakerSetting::Disabled => return Ok(None),
        BreakerSetting::Enabled(params) => *params,
    };

    let base = options.breaker_name.as_deref().unwrap_or(profile_name);
    let key = match options.breaker_mode {
        BreakerMode::PerProfile => base.to_string(),
        BreakerMode::PerHost => format!("{}/{}", base, url.host_str().unwrap_or("unknown")),
    };

    let breaker = BreakerRegistry::global().fetch(&key, params, options.breaker_verbose);
    if !breaker.is_allowed() {
        return Err(HttpClientError::CircuitOpen { breaker: key });
    }
    Ok(Some(breaker))
}

fn observe_breaker(
    breaker: &CircuitBreaker,
    options: &ResolvedOptions,
    outcome: &Result<Response>,
) {
    let melted = match &options.melt_predicate {
        Some(predicate) => predicate(outcome),
        None => default_melt(outcome),
    };
    if melted {
        breaker.melt();
    } else {
        breaker.record_success();
    }
}

/// Default failure signal: server-error statuses and transport-level faults
/// melt; decode failures do not say anything about the upstream's health.
fn default_melt(outcome: &Result<Response>) -> bool {
    match outcome {
        Ok(response) => response.status().is_server_error(),
        Err(HttpClientError::Decode(_)) => false,
        Err(_) => true,
    }
}

fn decode_response(raw: TransportResponse, options: &ResolvedOptions) -> Result<Response> {
    if options.raw || !options.decode_body {
        return Ok(Response::from_transport(raw, None));
    }
    let json_content = raw
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("json"));
    if !json_content || raw.body.is_empty() {
        return Ok(Response::from_transport(raw, None));
    }
    match serde_json::from_slice(&raw.body) {
        Ok(value) => Ok(Response::from_transport(raw, Some(value))),
        Err(error) => Err(HttpClientError::Decode(error.to_string())),
    }
}

fn build_url(options: &ResolvedOptions, target: &str, query: &[(String, String)]) -> Result<Url> {
    let mut url = match &options.base_url {
        Some(base) => base.join(target)?,
        None => Url::parse(target)?,
    };
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

fn format_query(query: &[(String, String)]) -> String {
    query
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}
