//! ID and timestamp generation shared by every ledger entity.

use chrono::Utc;
use uuid::Uuid;

/// Generate a new entity ID: the first 12 hex characters of a v4 UUID.
///
/// This matches the original system's `_new_id()` convention
/// (`uuid.uuid4().hex[:12]`) — short enough to read in logs and CLI
/// output while collision odds stay negligible for a single-writer ledger.
/// [`crate::execution::ExecutionRecord::execution_id`] is the one exception:
/// it keeps the full hyphenated UUID, matching the original consumer shim.
pub fn new_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..12].to_string()
}

/// Current UTC time formatted as `%Y-%m-%dT%H:%M:%SZ` (RFC3339, second
/// precision, matching the original system's `strftime` convention).
pub fn now_rfc3339() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_is_twelve_hex_chars() {
        let id = new_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn new_id_is_not_constant() {
        assert_ne!(new_id(), new_id());
    }

    #[test]
    fn now_rfc3339_matches_expected_shape() {
        let ts = now_rfc3339();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.as_bytes()[10], b'T');
    }
}
