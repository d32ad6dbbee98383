use chrono::{DateTime, Utc};

/// Soft ordering hint extracted from raw payload bytes at synchronization
/// time. Extraction failures are tolerated; `None` simply sorts the item
/// ahead of dated ones.
pub trait TimestampSource {
    fn timestamp(&self, payload: &[u8]) -> Option<DateTime<Utc>>;
}

/// Reads an RFC 3339 timestamp from a string field of a JSON payload.
#[derive(Debug, Clone)]
pub struct JsonTimestamp {
    field: String,
}

impl JsonTimestamp {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Default for JsonTimestamp {
    fn default() -> Self {
        Self::new("transactionTime")
    }
}

impl TimestampSource for JsonTimestamp {
    fn timestamp(&self, payload: &[u8]) -> Option<DateTime<Utc>> {
        let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
        let raw = value.get(&self.field)?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|stamp| stamp.with_timezone(&Utc))
    }
}

/// For hosts that do not want sync-time ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTimestamp;

impl TimestampSource for NoTimestamp {
    fn timestamp(&self, _payload: &[u8]) -> Option<DateTime<Utc>> {
        None
    }
}
