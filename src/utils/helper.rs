use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since epoch
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Alert operations team (warning)
pub fn alert_operations_team_warning(message: String) {
    tracing::warn!("WARNING ALERT: {}", message);
}
