//! Source column type mapping.
//!
//! SQLite-family databases accept any declared type string, so mapping is
//! by case-insensitive substring, following the column affinity rules:
//! `VARCHAR(255)`, `varchar` and `NATIVE CHARACTER` all map to string.
//! Unknown or empty declared types map to string and never fail.

use tursotap_types::catalog::CanonicalType;

/// Canonical mapping of one declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfo {
    pub canonical_type: CanonicalType,
    /// BLOB-origin column; values are emitted base64-encoded.
    pub is_base64_encoded: bool,
    /// Date or timestamp column; values are normalized to RFC 3339 in UTC.
    pub is_temporal: bool,
}

impl TypeInfo {
    const fn plain(canonical_type: CanonicalType) -> Self {
        Self {
            canonical_type,
            is_base64_encoded: false,
            is_temporal: false,
        }
    }

    const STRING: Self = Self::plain(CanonicalType::String);
}

/// Map a declared source type string to its canonical type.
pub fn map_source_type(source_type: &str) -> TypeInfo {
    let upper = source_type.to_ascii_uppercase();
    let has = |needles: &[&str]| needles.iter().any(|n| upper.contains(n));

    if has(&["INT"]) {
        return TypeInfo::plain(CanonicalType::Integer);
    }
    // A bare TIME has no date part and cannot be a date-time.
    if has(&["DATE", "TIMESTAMP"]) {
        return TypeInfo {
            is_temporal: true,
            ..TypeInfo::STRING
        };
    }
    if has(&["CHAR", "CLOB", "TEXT"]) {
        return TypeInfo::STRING;
    }
    if has(&["REAL", "FLOA", "DOUB", "NUMERIC", "DECIMAL"]) {
        return TypeInfo::plain(CanonicalType::Number);
    }
    if has(&["BLOB"]) {
        return TypeInfo {
            is_base64_encoded: true,
            ..TypeInfo::STRING
        };
    }
    if has(&["BOOL"]) {
        return TypeInfo::plain(CanonicalType::Boolean);
    }
    TypeInfo::STRING
}
