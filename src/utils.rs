use chrono::{DateTime, Utc};
use uuid::Uuid;

pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Hex rendering of at most `limit` leading bytes, for log lines.
pub fn hex_preview(data: &[u8], limit: usize) -> String {
    let shown = &data[..data.len().min(limit)];
    if data.len() > limit {
        format!("{}..", hex::encode(shown))
    } else {
        hex::encode(shown)
    }
}
