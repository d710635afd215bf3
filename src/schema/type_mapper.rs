//! Logical-to-dialect type mapping.
//!
//! The mapper holds no dialect knowledge of its own; it is the lookup
//! indirection that keeps schema generation dialect-agnostic. Nullability
//! helpers operate on textual logical type names (a trailing `?` marks a
//! nullable type) independent of any dialect.

use crate::core::ScalarType;
use crate::dialect::Dialect;

/// Maps a logical scalar to the dialect's column type string.
pub fn column_type(dialect: &dyn Dialect, scalar: ScalarType) -> String {
    match scalar {
        ScalarType::String => dialect.text_column_type(),
        ScalarType::Int => dialect.integer_column_type(),
        ScalarType::Double => dialect.real_column_type(),
        ScalarType::Bool => dialect.boolean_column_type(),
        ScalarType::DateTime => dialect.date_time_column_type(),
        ScalarType::Uuid => dialect.uuid_column_type(),
    }
}

/// Whether a textual logical type name carries the nullable marker.
pub fn is_nullable_name(type_name: &str) -> bool {
    type_name.trim_end().ends_with('?')
}

/// Strips the nullable marker from a textual logical type name.
pub fn strip_nullable_name(type_name: &str) -> &str {
    let trimmed = type_name.trim_end();
    match trimmed.strip_suffix('?') {
        Some(base) => base.trim_end(),
        None => trimmed,
    }
}

/// Parses a textual logical type name, nullable marker included.
pub fn scalar_from_name(type_name: &str) -> Option<ScalarType> {
    ScalarType::parse(strip_nullable_name(type_name))
}
