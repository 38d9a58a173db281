mod hash;

pub use hash::compute_step_checksum;

use once_cell::sync::Lazy;
use regex::Regex;

/// Default name of the ledger table kept inside each store
pub const DEFAULT_LEDGER_TABLE: &str = "_migrations";

/// File extension of the database file for each instance
pub const DATABASE_EXTENSION: &str = "sqlite3";

/// Step names and instance identifiers: alphanumeric start, then `_`, `.` or `-`
static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("name pattern should compile")
});

/// Plain SQL identifiers (table names we interpolate into statements)
static IDENTIFIER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern should compile")
});

/// Check whether a step name or instance identifier is well formed
pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

/// Check whether a string can be used unquoted as a SQL identifier
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(name)
}

/// Get current timestamp in ISO 8601 format
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("0001_create_users"));
        assert!(is_valid_name("v1.2-add-index"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("_leading_underscore"));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name("../escape"));
    }

    #[test]
    fn test_valid_identifiers() {
        assert!(is_valid_identifier(DEFAULT_LEDGER_TABLE));
        assert!(is_valid_identifier("schema_history"));
        assert!(!is_valid_identifier("1table"));
        assert!(!is_valid_identifier("users; DROP TABLE users"));
    }

    #[test]
    fn test_now_iso_parses() {
        assert!(chrono::DateTime::parse_from_rfc3339(&now_iso()).is_ok());
    }
}
