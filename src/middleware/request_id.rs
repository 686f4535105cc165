//! Tags every request with an `x-request-id` and runs the handler inside a
//! span carrying it, so log lines from one API call can be grouped.

use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_LEN: usize = 128;

/// Inserted into request extensions for handlers that want to echo it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Keeps a well-formed id sent by the client or proxy, otherwise mints a UUID.
    pub fn resolve(headers: &HeaderMap) -> Self {
        headers
            .get(&REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|id| acceptable(id))
            .map(|id| Self(id.to_string()))
            .unwrap_or_else(|| Self(Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn acceptable(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = RequestId::resolve(request.headers());
    let span = info_span!(
        "request",
        request_id = %id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    request.extensions_mut().insert(id.clone());

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER.clone(), HeaderValue::from_str(id).unwrap());
        headers
    }

    #[test]
    fn test_client_id_is_kept() {
        assert_eq!(RequestId::resolve(&headers("portal-42")).as_str(), "portal-42");
    }

    #[test]
    fn test_malformed_id_is_replaced() {
        let id = RequestId::resolve(&headers("not valid!"));
        assert_ne!(id.as_str(), "not valid!");
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_missing_header_mints_distinct_ids() {
        let empty = HeaderMap::new();
        assert_ne!(RequestId::resolve(&empty), RequestId::resolve(&empty));
    }

    #[test]
    fn test_length_limit() {
        assert!(acceptable(&"a".repeat(MAX_LEN)));
        assert!(!acceptable(&"a".repeat(MAX_LEN + 1)));
        assert!(!acceptable("abc/123"));
    }
}
