//! HTTP response wrapper.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{HttpClientError, Result};
use crate::transport::TransportResponse;

/// A finished response as the pipeline hands it back to the caller.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    url: url::Url,
    body: Bytes,
    decoded: Option<Value>,
}

impl Response {
    pub(crate) fn from_transport(raw: TransportResponse, decoded: Option<Value>) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers,
            url: raw.url,
            body: raw.body,
            decoded,
        }
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Check if the response was successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Check if the response was a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// Check if the response was a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|value| value.to_str().ok())
    }

    /// Get the final URL the response came from.
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Get the raw response body.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response and return the raw body.
    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// Get the response body as text.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|error| HttpClientError::Decode(error.to_string()))
    }

    /// The body decoded by the response phase, when decoding was on and the
    /// upstream sent JSON.
    pub fn decoded(&self) -> Option<&Value> {
        self.decoded.as_ref()
    }

    /// Parse the response body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|error| HttpClientError::Decode(error.to_string()))
    }

    /// Get the content length if available.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
    }

    /// Get the content type if available.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use url::Url;

    fn raw(status: u16, body: &str, content_type: &str) -> TransportResponse {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_str(content_type).unwrap(),
        );
        TransportResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            url: Url::parse("https://api.example.com/data").unwrap(),
            body: Bytes::from(body.to_string().into_bytes()),
        }
    }

    #[test]
    fn typed_json_access() {
        let response = Response::from_transport(raw(200, r#"{"id": 7}"#, "application/json"), None);

        #[derive(serde::Deserialize)]
        struct Payload {
            id: u32,
        }
        let payload: Payload = response.json().unwrap();
        assert_eq!(payload.id, 7);
        assert!(response.is_success());
    }

    #[test]
    fn text_and_header_access() {
        let response = Response::from_transport(raw(404, "missing", "text/plain"), None);
        assert_eq!(response.text().unwrap(), "missing");
        assert_eq!(response.content_type(), Some("text/plain"));
        assert!(response.is_client_error());
    }

    #[test]
    fn json_on_non_json_body_is_a_decode_error() {
        let response = Response::from_transport(raw(200, "not json", "text/plain"), None);
        let error = response.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(error, HttpClientError::Decode(_)));
    }
}
