//! Header utilities: the retry counter, the safe-header allowlist, and DLQ
//! naming (spec.md §3, §4.1).
//!
//! Headers travel as lapin's [`FieldTable`] end to end rather than through a
//! home-grown header type — the broker collaborator already gives us a
//! well-typed map, and introducing a second one would just be translation
//! overhead at every call site.

use std::time::{SystemTime, UNIX_EPOCH};

use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};

use crate::error::HeaderError;

/// Header carrying the retry counter (spec.md §3 `RetryCounter`).
pub const RETRY_COUNT_HEADER: &str = "x-midaz-retry-count";
/// Header carrying the caller-supplied message identifier.
pub const MIDAZ_ID_HEADER: &str = "x-midaz-id";
/// Header carrying the correlation identifier propagated across retries.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
/// Header carrying an opaque per-message header identifier.
pub const MIDAZ_HEADER_ID_HEADER: &str = "x-midaz-header-id";
/// Standard content-type header, also allowlisted so it survives republish.
pub const CONTENT_TYPE_HEADER: &str = "content-type";

/// DLQ-only headers, added on top of the sanitized allowlist (spec.md §3 `DLQHeaders`).
pub const DLQ_REASON_HEADER: &str = "x-dlq-reason";
pub const DLQ_ORIGINAL_QUEUE_HEADER: &str = "x-dlq-original-queue";
pub const DLQ_RETRY_COUNT_HEADER: &str = "x-dlq-retry-count";
pub const DLQ_TIMESTAMP_HEADER: &str = "x-dlq-timestamp";
pub const DLQ_ERROR_TYPE_HEADER: &str = "x-dlq-error-type";

/// `MaxRetries` (spec.md §3): 5 delivery attempts total, the original plus 4 retries.
pub const MAX_RETRIES: i32 = 5;

/// `BackoffSchedule` (spec.md §3): `backoff(k)` indexes into this, 1-based.
pub const BACKOFF_SCHEDULE_SECS: [u64; 4] = [0, 5, 15, 30];

/// Returns the fixed allowlist of headers that survive republish and DLQ
/// routing (spec.md §3 `SafeHeaderAllowlist`).
pub fn safe_header_allowlist() -> &'static [&'static str] {
    &[
        CORRELATION_ID_HEADER,
        MIDAZ_HEADER_ID_HEADER,
        CONTENT_TYPE_HEADER,
        RETRY_COUNT_HEADER,
        MIDAZ_ID_HEADER,
    ]
}

fn is_allowlisted(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    safe_header_allowlist().iter().any(|k| *k == lower)
}

/// `readRetryCount` (spec.md §4.1): `0` when absent or of any type other than
/// a 32-/64-bit signed integer. Never fails.
pub fn read_retry_count(headers: &Option<FieldTable>) -> i32 {
    let Some(table) = headers.as_ref() else {
        return 0;
    };
    let Some(value) = find_case_insensitive(table, RETRY_COUNT_HEADER) else {
        return 0;
    };
    match value {
        AMQPValue::LongInt(n) => *n,
        AMQPValue::LongLongInt(n) => i32::try_from(*n).unwrap_or(i32::MAX),
        _ => 0,
    }
}

/// `incrementRetryCount` (spec.md §4.1): saturates at `INT32_MAX`, never wraps.
pub fn increment_retry_count(current: i32) -> i32 {
    current.saturating_add(1)
}

/// `backoff(k)` (spec.md §3): `k <= 0` clamps to the first element, `k` beyond
/// the schedule clamps to the last. Monotonically non-decreasing in `k`.
pub fn backoff(k: i32) -> std::time::Duration {
    let idx = if k <= 0 {
        0
    } else {
        (k as usize).min(BACKOFF_SCHEDULE_SECS.len()) - 1
    };
    std::time::Duration::from_secs(BACKOFF_SCHEDULE_SECS[idx])
}

/// `sanitizeHeaders` (spec.md §4.1): keeps only allowlisted keys. A missing
/// table yields an empty one.
pub fn sanitize_headers(src: &Option<FieldTable>) -> FieldTable {
    let mut out = FieldTable::default();
    if let Some(table) = src.as_ref() {
        for (key, value) in table.inner() {
            if is_allowlisted(key.as_str()) {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    out
}

/// `buildDLQName` (spec.md §4.1): `<queue>.dlq`; empty input is a hard error.
pub fn build_dlq_name(queue: &str) -> Result<String, HeaderError> {
    if queue.is_empty() {
        return Err(HeaderError::EmptyQueueName);
    }
    Ok(format!("{queue}.dlq"))
}

/// Extracts `x-midaz-id` from headers, accepting either a string or a byte
/// sequence (spec.md §4.4 step 1).
pub fn read_midaz_id(headers: &Option<FieldTable>) -> Option<String> {
    let table = headers.as_ref()?;
    match find_case_insensitive(table, MIDAZ_ID_HEADER)? {
        AMQPValue::LongString(s) => Some(s.to_string()),
        AMQPValue::ShortString(s) => Some(s.to_string()),
        AMQPValue::ByteArray(b) => Some(String::from_utf8_lossy(b.as_slice()).into_owned()),
        _ => None,
    }
}

/// Reads a plain string header such as `x-correlation-id`, if present.
pub fn read_string_header(headers: &Option<FieldTable>, key: &str) -> Option<String> {
    let table = headers.as_ref()?;
    match find_case_insensitive(table, key)? {
        AMQPValue::LongString(s) => Some(s.to_string()),
        AMQPValue::ShortString(s) => Some(s.to_string()),
        _ => None,
    }
}

fn find_case_insensitive<'a>(table: &'a FieldTable, key: &str) -> Option<&'a AMQPValue> {
    let lower = key.to_ascii_lowercase();
    table
        .inner()
        .iter()
        .find(|(k, _)| k.as_str().to_ascii_lowercase() == lower)
        .map(|(_, v)| v)
}

/// Sets `x-midaz-retry-count` on a header table, inserting or overwriting it.
pub fn with_retry_count(mut headers: FieldTable, next: i32) -> FieldTable {
    headers.insert(
        ShortString::from(RETRY_COUNT_HEADER),
        AMQPValue::LongInt(next),
    );
    headers
}

/// Truncates a metric label value to 64 characters (spec.md §3 invariant).
pub fn truncate_label(value: &str) -> String {
    const MAX: usize = 64;
    if value.chars().count() <= MAX {
        value.to_string()
    } else {
        value.chars().take(MAX).collect()
    }
}

/// Builds the DLQ-only header set layered on top of the sanitized allowlist
/// (spec.md §3 `DLQHeaders`). `reason` is already a sanitized category string
/// such as `business_error:processing_error` or `panic:nil_pointer_dereference`.
pub fn build_dlq_headers(
    sanitized: FieldTable,
    reason: &str,
    original_queue: &str,
    retry_count: i32,
    is_business_error: bool,
) -> FieldTable {
    let mut headers = sanitized;
    let now_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    headers.insert(
        ShortString::from(DLQ_REASON_HEADER),
        AMQPValue::LongString(LongString::from(reason)),
    );
    headers.insert(
        ShortString::from(DLQ_ORIGINAL_QUEUE_HEADER),
        AMQPValue::LongString(LongString::from(original_queue)),
    );
    headers.insert(
        ShortString::from(DLQ_RETRY_COUNT_HEADER),
        AMQPValue::LongInt(retry_count),
    );
    headers.insert(
        ShortString::from(DLQ_TIMESTAMP_HEADER),
        AMQPValue::Timestamp(now_secs),
    );
    if is_business_error {
        headers.insert(
            ShortString::from(DLQ_ERROR_TYPE_HEADER),
            AMQPValue::LongString(LongString::from("business_error")),
        );
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(key: &str, value: AMQPValue) -> Option<FieldTable> {
        let mut t = FieldTable::default();
        t.insert(ShortString::from(key), value);
        Some(t)
    }

    #[test]
    fn read_retry_count_absent_is_zero() {
        assert_eq!(read_retry_count(&None), 0);
    }

    #[test]
    fn read_retry_count_wrong_type_is_zero() {
        let headers = table_with(RETRY_COUNT_HEADER, AMQPValue::Boolean(true));
        assert_eq!(read_retry_count(&headers), 0);
    }

    #[test]
    fn read_retry_count_long_int() {
        let headers = table_with(RETRY_COUNT_HEADER, AMQPValue::LongInt(3));
        assert_eq!(read_retry_count(&headers), 3);
    }

    #[test]
    fn read_retry_count_long_long_int() {
        let headers = table_with(RETRY_COUNT_HEADER, AMQPValue::LongLongInt(7));
        assert_eq!(read_retry_count(&headers), 7);
    }

    #[test]
    fn increment_saturates_at_i32_max() {
        assert_eq!(increment_retry_count(i32::MAX), i32::MAX);
        assert_eq!(increment_retry_count(i32::MAX - 1), i32::MAX);
        assert_eq!(increment_retry_count(4), 5);
    }

    #[test]
    fn backoff_schedule_is_monotonic_and_saturates() {
        assert_eq!(backoff(0).as_secs(), 0);
        assert_eq!(backoff(-5).as_secs(), 0);
        assert_eq!(backoff(1).as_secs(), 0);
        assert_eq!(backoff(2).as_secs(), 5);
        assert_eq!(backoff(3).as_secs(), 15);
        assert_eq!(backoff(4).as_secs(), 30);
        assert_eq!(backoff(40).as_secs(), 30);

        let mut prev = 0;
        for k in -2..10 {
            let cur = backoff(k).as_secs();
            assert!(cur >= prev, "backoff not monotonic at k={k}");
            prev = cur;
        }
    }

    #[test]
    fn sanitize_headers_drops_unlisted_keys() {
        let mut src = FieldTable::default();
        src.insert(
            ShortString::from("authorization"),
            AMQPValue::LongString(LongString::from("Bearer x")),
        );
        src.insert(
            ShortString::from(CORRELATION_ID_HEADER),
            AMQPValue::LongString(LongString::from("c")),
        );
        let out = sanitize_headers(&Some(src));
        assert!(out.inner().get("authorization").is_none());
        assert!(out.inner().get(CORRELATION_ID_HEADER).is_some());
    }

    #[test]
    fn sanitize_headers_nil_input_is_empty() {
        let out = sanitize_headers(&None);
        assert!(out.inner().is_empty());
    }

    #[test]
    fn build_dlq_name_appends_suffix() {
        assert_eq!(build_dlq_name("payments.process").unwrap(), "payments.process.dlq");
    }

    #[test]
    fn build_dlq_name_rejects_empty() {
        assert_eq!(build_dlq_name("").unwrap_err(), HeaderError::EmptyQueueName);
    }

    #[test]
    fn truncate_label_caps_at_64_chars() {
        let long = "x".repeat(200);
        assert_eq!(truncate_label(&long).chars().count(), 64);
        assert_eq!(truncate_label("short"), "short");
    }

    #[test]
    fn build_dlq_headers_carries_business_error_type() {
        let headers = build_dlq_headers(FieldTable::default(), "business_error:processing_error", "orders", 5, true);
        assert!(headers.inner().get(DLQ_ERROR_TYPE_HEADER).is_some());
        assert_eq!(
            headers.inner().get(DLQ_RETRY_COUNT_HEADER),
            Some(&AMQPValue::LongInt(5))
        );
    }
}
