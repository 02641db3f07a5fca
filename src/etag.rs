//! ETag 计算与条件 GET 校验。

use axum::http::{HeaderMap, header};
use httpdate::parse_http_date;
use std::fs::Metadata;
use std::time::{SystemTime, UNIX_EPOCH};

/// 根据文件元数据生成弱 ETag。
pub fn etag_from_metadata(metadata: &Metadata) -> String {
    let size = metadata.len();
    let modified = metadata.modified().ok();
    if let Some(modified) = modified
        && let Ok(duration) = modified.duration_since(UNIX_EPOCH)
    {
        return format!(
            "W/\"{}-{}-{}\"",
            size,
            duration.as_secs(),
            duration.subsec_nanos()
        );
    }
    format!("W/\"{}\"", size)
}

/// 校验 If-None-Match / If-Modified-Since，命中时应返回 304。
///
/// If-None-Match 存在时优先，忽略 If-Modified-Since。
pub fn is_not_modified(headers: &HeaderMap, etag: &str, modified: Option<SystemTime>) -> bool {
    if let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        return value.trim() == "*" || etag_matches(value, etag);
    }

    let Some(modified) = modified else {
        return false;
    };
    match headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_http_date(v).ok())
    {
        Some(since) => truncate_to_secs(modified) <= since,
        None => false,
    }
}

/// 校验 If-Range：仅接受日期形式（弱 ETag 不可用于 If-Range）。
pub fn if_range_matches(headers: &HeaderMap, modified: Option<SystemTime>) -> bool {
    match headers.get(header::IF_RANGE).and_then(|v| v.to_str().ok()) {
        Some(value) => match parse_http_date(value) {
            Ok(date) => modified.is_some_and(|ts| truncate_to_secs(ts) <= date),
            Err(_) => false,
        },
        None => true,
    }
}

// weak comparison: W/ prefixes are ignored on both sides
fn etag_matches(header_value: &str, current: &str) -> bool {
    let current = current.trim_start_matches("W/");
    header_value
        .split(',')
        .map(|item| item.trim().trim_start_matches("W/"))
        .any(|item| item == current)
}

fn truncate_to_secs(ts: SystemTime) -> SystemTime {
    match ts.duration_since(UNIX_EPOCH) {
        Ok(duration) => UNIX_EPOCH + std::time::Duration::from_secs(duration.as_secs()),
        Err(_) => ts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use httpdate::fmt_http_date;
    use std::time::Duration;

    const ETAG: &str = "W/\"5-1700000000-0\"";

    #[test]
    fn if_none_match_takes_precedence() {
        let modified = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"other\""));
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_str(&fmt_http_date(modified)).expect("date"),
        );
        assert!(!is_not_modified(&headers, ETAG, Some(modified)));

        headers.insert(
            header::IF_NONE_MATCH,
            HeaderValue::from_static("\"x\", \"5-1700000000-0\""),
        );
        assert!(is_not_modified(&headers, ETAG, Some(modified)));
    }

    #[test]
    fn if_modified_since_compares_whole_seconds() {
        let modified = UNIX_EPOCH + Duration::from_millis(1_700_000_000_400);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_str(&fmt_http_date(UNIX_EPOCH + Duration::from_secs(1_700_000_000)))
                .expect("date"),
        );
        assert!(is_not_modified(&headers, ETAG, Some(modified)));

        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_str(&fmt_http_date(UNIX_EPOCH + Duration::from_secs(1_600_000_000)))
                .expect("date"),
        );
        assert!(!is_not_modified(&headers, ETAG, Some(modified)));
        assert!(!is_not_modified(&HeaderMap::new(), ETAG, Some(modified)));
    }

    #[test]
    fn if_range_requires_unchanged_date() {
        let modified = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let mut headers = HeaderMap::new();
        assert!(if_range_matches(&headers, Some(modified)));

        headers.insert(
            header::IF_RANGE,
            HeaderValue::from_str(&fmt_http_date(modified)).expect("date"),
        );
        assert!(if_range_matches(&headers, Some(modified)));

        headers.insert(header::IF_RANGE, HeaderValue::from_static(ETAG));
        assert!(!if_range_matches(&headers, Some(modified)));
    }
}
