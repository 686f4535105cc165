//! Shared helper functions for handlers.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
    response::{IntoResponse, Response},
};
use chrono::NaiveDateTime;
use diesel::result::Error as DieselError;
use diesel::QueryResult;
use serde::{Deserialize, Deserializer};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use tracing::error;

use crate::error::{ApiError, ApiResult};

pub const CSV_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Caller address for audit entries: the first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the socket peer.
#[derive(Debug, Clone, Default)]
pub struct ClientIp(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);
        Ok(Self(client_ip(&parts.headers, peer)))
    }
}

pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| ip.parse::<IpAddr>().is_ok());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|ip| ip.parse::<IpAddr>().is_ok())
    };

    forwarded
        .or_else(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|p| p.ip().to_string()))
}

/// Diesel refuses an `AsChangeset` with nothing set; treat that as "no change"
/// and fall back to the current row.
pub fn unchanged_or<T>(
    result: QueryResult<T>,
    current: impl FnOnce() -> QueryResult<T>,
) -> QueryResult<T> {
    match result {
        Err(DieselError::QueryBuilderError(_)) => current(),
        other => other,
    }
}

/// Reads an explicit `null` as `Some(None)` so PATCH bodies can clear a
/// nullable column. Pair with `#[serde(default)]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Trims and rejects missing or blank text with a 400.
pub fn required_text(
    value: Option<&str>,
    message: &str,
    code: &str,
) -> ApiResult<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request(message, code))
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(CSV_TIMESTAMP_FORMAT).to_string()
}

/// Renders rows as a `text/csv` attachment.
pub fn csv_attachment(
    filename: &str,
    headers: &[String],
    rows: impl IntoIterator<Item = Vec<String>>,
) -> ApiResult<Response> {
    let body = write_csv(headers, rows).map_err(|e| {
        error!(error = %e, filename, "CSV export failed");
        ApiError::internal("Failed to build export", "EXPORT_ERROR")
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}

fn write_csv(
    headers: &[String],
    rows: impl IntoIterator<Item = Vec<String>>,
) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, None).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn test_falls_back_to_real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("garbage"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_ip(&headers, None).as_deref(), Some("198.51.100.4"));

        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert_eq!(
            client_ip(&HeaderMap::new(), Some(peer)).as_deref(),
            Some("127.0.0.1")
        );
        assert!(client_ip(&HeaderMap::new(), None).is_none());
    }

    #[test]
    fn test_required_text_rejects_blank() {
        assert!(required_text(Some("   "), "missing", "MISSING").is_err());
        assert!(required_text(None, "missing", "MISSING").is_err());
        assert_eq!(
            required_text(Some(" ship it "), "missing", "MISSING").unwrap(),
            "ship it"
        );
    }

    #[test]
    fn test_csv_quotes_embedded_commas() {
        let bytes = write_csv(
            &["Name".to_string(), "Answer".to_string()],
            vec![vec!["a".to_string(), "x, y".to_string()]],
        )
        .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "Name,Answer\na,\"x, y\"\n");
    }

    #[test]
    fn test_unchanged_or_falls_back_on_empty_changeset() {
        let result: QueryResult<i32> = unchanged_or(
            Err(DieselError::QueryBuilderError("no changes".into())),
            || Ok(7),
        );
        assert_eq!(result.unwrap(), 7);

        let result: QueryResult<i32> = unchanged_or(Err(DieselError::NotFound), || Ok(7));
        assert!(matches!(result, Err(DieselError::NotFound)));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = chrono::NaiveDate::from_ymd_opt(2025, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();
        assert_eq!(format_timestamp(ts), "2025-03-09 14:05:00");
    }
}
