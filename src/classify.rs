//! Error and panic classification into a closed, generic category set
//! (spec.md §3 `ErrorCategory`/`PanicCategory`, §4.1).
//!
//! Matching is substring-based against the stringified cause. The point is
//! never to let the original string reach a DLQ header, a metric label, or a
//! log line meant for an external sink — categories are the only thing that
//! crosses that boundary.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    DatabaseConnectionError,
    OperationTimeout,
    ValidationError,
    ResourceNotFound,
    DuplicateEntry,
    AuthorizationError,
    StaleBalanceVersionConflict,
    ProcessingError,
    UnknownError,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::DatabaseConnectionError => "database_connection_error",
            ErrorCategory::OperationTimeout => "operation_timeout",
            ErrorCategory::ValidationError => "validation_error",
            ErrorCategory::ResourceNotFound => "resource_not_found",
            ErrorCategory::DuplicateEntry => "duplicate_entry",
            ErrorCategory::AuthorizationError => "authorization_error",
            ErrorCategory::StaleBalanceVersionConflict => "stale_balance_version_conflict",
            ErrorCategory::ProcessingError => "processing_error",
            ErrorCategory::UnknownError => "unknown_error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicCategory {
    NilPointerDereference,
    IndexOutOfBounds,
    SliceBoundsError,
    MapAccessError,
    ChannelOperationError,
    RuntimeError,
    UnhandledPanic,
    UnknownPanic,
}

impl fmt::Display for PanicCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PanicCategory::NilPointerDereference => "nil_pointer_dereference",
            PanicCategory::IndexOutOfBounds => "index_out_of_bounds",
            PanicCategory::SliceBoundsError => "slice_bounds_error",
            PanicCategory::MapAccessError => "map_access_error",
            PanicCategory::ChannelOperationError => "channel_operation_error",
            PanicCategory::RuntimeError => "runtime_error",
            PanicCategory::UnhandledPanic => "unhandled_panic",
            PanicCategory::UnknownPanic => "unknown_panic",
        };
        f.write_str(s)
    }
}

/// Classifies a business-error's stringified cause (spec.md §4.1).
///
/// The "stale balance" sentinel is checked first since it is a specific,
/// known business condition rather than a generic bucket.
pub fn classify_error(cause: &str) -> ErrorCategory {
    let lower = cause.to_ascii_lowercase();

    if lower.contains("stale balance") || lower.contains("version conflict") {
        return ErrorCategory::StaleBalanceVersionConflict;
    }
    if lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("database")
        || lower.contains("no such host")
        || lower.contains("dial tcp")
    {
        return ErrorCategory::DatabaseConnectionError;
    }
    if lower.contains("timeout") || lower.contains("deadline exceeded") {
        return ErrorCategory::OperationTimeout;
    }
    if lower.contains("validation") || lower.contains("invalid") || lower.contains("malformed") {
        return ErrorCategory::ValidationError;
    }
    if lower.contains("not found") || lower.contains("no rows") {
        return ErrorCategory::ResourceNotFound;
    }
    if lower.contains("duplicate") || lower.contains("already exists") || lower.contains("unique constraint") {
        return ErrorCategory::DuplicateEntry;
    }
    if lower.contains("unauthorized") || lower.contains("forbidden") || lower.contains("permission denied") {
        return ErrorCategory::AuthorizationError;
    }
    if lower.contains("processing") || lower.contains("failed to process") {
        return ErrorCategory::ProcessingError;
    }
    ErrorCategory::UnknownError
}

/// Classifies a caught panic's stringified payload (spec.md §4.1).
pub fn classify_panic(payload: &str) -> PanicCategory {
    let lower = payload.to_ascii_lowercase();

    if lower.contains("nil pointer") || lower.contains("null pointer") || lower.contains("none") {
        return PanicCategory::NilPointerDereference;
    }
    if lower.contains("index out of bounds") || lower.contains("index out of range") {
        return PanicCategory::IndexOutOfBounds;
    }
    if lower.contains("slice") && (lower.contains("bounds") || lower.contains("range")) {
        return PanicCategory::SliceBoundsError;
    }
    if lower.contains("hashmap") || lower.contains("map access") || lower.contains("key not found") {
        return PanicCategory::MapAccessError;
    }
    if lower.contains("channel") || lower.contains("send on a closed") || lower.contains("recv on a closed") {
        return PanicCategory::ChannelOperationError;
    }
    if lower.contains("runtime error") || lower.contains("divide by zero") || lower.contains("overflow") {
        return PanicCategory::RuntimeError;
    }
    if lower.is_empty() {
        return PanicCategory::UnknownPanic;
    }
    PanicCategory::UnhandledPanic
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_stale_balance_sentinel() {
        assert_eq!(
            classify_error("stale balance version detected for account 123"),
            ErrorCategory::StaleBalanceVersionConflict
        );
    }

    #[test]
    fn classifies_generic_processing_error() {
        assert_eq!(
            classify_error("failed to process transaction batch"),
            ErrorCategory::ProcessingError
        );
    }

    #[test]
    fn classifies_nil_pointer_panic() {
        assert_eq!(
            classify_panic("runtime error: invalid memory address or nil pointer dereference"),
            PanicCategory::NilPointerDereference
        );
    }

    #[test]
    fn classification_never_leaks_raw_content() {
        let category = classify_error("connection refused to db at /var/run/postgres.sock user=admin");
        let rendered = category.to_string();
        assert!(!rendered.contains('/'));
        assert!(!rendered.contains("admin"));
        assert!(!rendered.contains("goroutine"));
    }

    #[test]
    fn unknown_category_is_fallback() {
        assert_eq!(classify_error("something entirely unexpected happened"), ErrorCategory::UnknownError);
        assert_eq!(classify_panic("zzz_bespoke_panic_token"), PanicCategory::UnhandledPanic);
    }
}
