//! ANSI-flavoured reference dialect.
//!
//! Usable against any backend that accepts the default statement shapes;
//! concrete drivers typically start from this and override type names,
//! placeholders, or error rules.

use regex::RegexSet;

use crate::connection::DriverError;

use super::{Dialect, DriverErrorKind};

/// Regex rule tables for classifying opaque driver failures.
#[derive(Debug, Clone)]
pub struct ErrorRules {
    duplicate: RegexSet,
    timeout: RegexSet,
    connection: RegexSet,
}

impl ErrorRules {
    pub fn new(
        duplicate: &[&str],
        timeout: &[&str],
        connection: &[&str],
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            duplicate: RegexSet::new(duplicate)?,
            timeout: RegexSet::new(timeout)?,
            connection: RegexSet::new(connection)?,
        })
    }

    pub fn defaults() -> Self {
        Self::new(
            &[r"(?i)unique", r"(?i)duplicate", r"(?i)primary key constraint"],
            &[r"(?i)timed?\s?out", r"(?i)timeout"],
            &[
                r"(?i)connection (refused|reset|closed|lost|aborted)",
                r"(?i)broken pipe",
                r"(?i)no route to host",
                r"(?i)network is unreachable",
            ],
        )
        .expect("built-in driver error patterns compile")
    }

    /// Timeout patterns win over connection patterns so "connection timed
    /// out" classifies as a timeout.
    pub fn classify(&self, error: &DriverError) -> DriverErrorKind {
        let message = &error.message;
        if self.duplicate.is_match(message) {
            DriverErrorKind::Duplicate
        } else if self.timeout.is_match(message) {
            DriverErrorKind::Timeout
        } else if self.connection.is_match(message) {
            DriverErrorKind::Connection
        } else {
            DriverErrorKind::Unknown
        }
    }
}

impl Default for ErrorRules {
    fn default() -> Self {
        Self::defaults()
    }
}

pub struct GenericDialect {
    error_rules: ErrorRules,
}

impl GenericDialect {
    pub fn new() -> Self {
        Self {
            error_rules: ErrorRules::defaults(),
        }
    }

    pub fn with_error_rules(error_rules: ErrorRules) -> Self {
        Self { error_rules }
    }
}

impl Default for GenericDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn uuid_column_type(&self) -> String {
        "TEXT".to_string()
    }

    fn text_column_type(&self) -> String {
        "TEXT".to_string()
    }

    fn integer_column_type(&self) -> String {
        "INTEGER".to_string()
    }

    fn real_column_type(&self) -> String {
        "REAL".to_string()
    }

    fn boolean_column_type(&self) -> String {
        "BOOLEAN".to_string()
    }

    fn date_time_column_type(&self) -> String {
        "TIMESTAMP".to_string()
    }

    fn classify_driver_error(&self, error: &DriverError) -> DriverErrorKind {
        self.error_rules.classify(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_duplicate() {
        let dialect = GenericDialect::new();
        let err = DriverError::new("UNIQUE constraint failed: order.id");
        assert_eq!(dialect.classify_driver_error(&err), DriverErrorKind::Duplicate);
    }

    #[test]
    fn test_classifies_connection_and_timeout() {
        let dialect = GenericDialect::new();
        assert_eq!(
            dialect.classify_driver_error(&DriverError::new("connection refused")),
            DriverErrorKind::Connection
        );
        assert_eq!(
            dialect.classify_driver_error(&DriverError::new("connection timed out")),
            DriverErrorKind::Timeout
        );
    }

    #[test]
    fn test_unmatched_is_unknown() {
        let dialect = GenericDialect::new();
        assert_eq!(
            dialect.classify_driver_error(&DriverError::new("syntax error near SELECT")),
            DriverErrorKind::Unknown
        );
    }

    #[test]
    fn test_custom_rules() {
        let rules = ErrorRules::new(&[r"E11000"], &[], &[]).unwrap();
        let dialect = GenericDialect::with_error_rules(rules);
        assert_eq!(
            dialect.classify_driver_error(&DriverError::new("E11000 duplicate key error")),
            DriverErrorKind::Duplicate
        );
    }
}
