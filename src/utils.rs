//! Utility functions for the lobby bot

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique lobby ID
pub fn generate_lobby_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a correlation ID for outbound requests
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Lossy, truncated view of a raw payload for log output
pub fn payload_preview(bytes: &[u8], max_len: usize) -> String {
    let preview_len = std::cmp::min(max_len, bytes.len());
    String::from_utf8_lossy(&bytes[..preview_len]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_lobby_id();
        let id2 = generate_lobby_id();
        assert_ne!(id1, id2);

        assert_ne!(generate_correlation_id(), generate_correlation_id());
    }

    #[test]
    fn test_payload_preview() {
        assert_eq!(payload_preview(b"hello world", 5), "hello");
        assert_eq!(payload_preview(b"hi", 100), "hi");
        assert_eq!(payload_preview(b"", 10), "");
    }
}
