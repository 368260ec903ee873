use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification priority level
///
/// Queue order is priority rank first, enqueue order second. `Critical`
/// preempts everything at the head of the queue; `Low` entries are the
/// eviction victims when the queue is full.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    /// Low priority (evictable under pressure)
    Low,
    /// Normal priority (standard delivery)
    Normal,
    /// High priority (ahead of normal traffic)
    High,
    /// Critical priority (alarm-level, always first)
    Critical,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
            NotificationPriority::Critical => "critical",
        }
    }

    /// Numeric rank, higher is more urgent
    pub fn rank(&self) -> u8 {
        match self {
            NotificationPriority::Low => 0,
            NotificationPriority::Normal => 1,
            NotificationPriority::High => 2,
            NotificationPriority::Critical => 3,
        }
    }

    /// Parse a priority string, falling back to `Normal`
    pub fn parse(value: &str) -> Self {
        match value {
            "low" => NotificationPriority::Low,
            "high" => NotificationPriority::High,
            "critical" => NotificationPriority::Critical,
            _ => NotificationPriority::Normal,
        }
    }
}

impl Default for NotificationPriority {
    fn default() -> Self {
        NotificationPriority::Normal
    }
}

/// One queued notification envelope
///
/// Created by `NotificationQueue::enqueue` and immutable apart from
/// `retry_count`, which only the retry path touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,

    /// Notification kind tag, opaque to the queue
    #[serde(rename = "type")]
    pub kind: String,

    pub payload: serde_json::Value,

    pub priority: NotificationPriority,

    pub enqueued_at: DateTime<Utc>,

    pub retry_count: u32,

    pub max_retries: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Explicit recipient subset; `None` means broadcast to every
    /// registered client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_clients: Option<Vec<String>>,

    /// Opaque producer metadata, passed through unchanged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Envelope {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Options accepted by `enqueue`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnqueueOptions {
    #[serde(default)]
    pub priority: NotificationPriority,

    /// Per-envelope retry budget; `None` uses the queue-wide default
    pub max_retries: Option<u32>,

    pub expires_at: Option<DateTime<Utc>>,

    pub target_clients: Option<Vec<String>>,

    pub metadata: Option<serde_json::Value>,
}

/// Pending count per priority band
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PriorityBreakdown {
    pub low: usize,
    pub normal: usize,
    pub high: usize,
    pub critical: usize,
}

/// Snapshot returned by the queue status accessor
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Pending envelopes
    pub depth: usize,
    /// Whether the processing loop is currently running
    pub processing: bool,
    /// Live connections in the client registry
    pub connected_clients: usize,
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
    pub newest_enqueued_at: Option<DateTime<Utc>>,
    pub by_priority: PriorityBreakdown,
    /// Cumulative counters since queue creation
    pub delivered_total: u64,
    pub retried_total: u64,
    pub dropped_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_serialization() {
        let priorities = vec![
            NotificationPriority::Low,
            NotificationPriority::Normal,
            NotificationPriority::High,
            NotificationPriority::Critical,
        ];

        for priority in priorities {
            let json = serde_json::to_string(&priority).unwrap();
            let deserialized: NotificationPriority = serde_json::from_str(&json).unwrap();
            assert_eq!(priority, deserialized);
        }
    }

    #[test]
    fn test_priority_rank_order() {
        assert!(NotificationPriority::Critical.rank() > NotificationPriority::High.rank());
        assert!(NotificationPriority::High.rank() > NotificationPriority::Normal.rank());
        assert!(NotificationPriority::Normal.rank() > NotificationPriority::Low.rank());
    }

    #[test]
    fn test_priority_parse_falls_back_to_normal() {
        assert_eq!(NotificationPriority::parse("critical"), NotificationPriority::Critical);
        assert_eq!(NotificationPriority::parse("bogus"), NotificationPriority::Normal);
        assert_eq!(NotificationPriority::parse(""), NotificationPriority::Normal);
    }

    #[test]
    fn test_envelope_kind_serializes_as_type() {
        let envelope = Envelope {
            id: "1-1".to_string(),
            kind: "visitor_request".to_string(),
            payload: serde_json::json!({"plate": "1กข 234"}),
            priority: NotificationPriority::Normal,
            enqueued_at: Utc::now(),
            retry_count: 0,
            max_retries: 3,
            expires_at: None,
            target_clients: None,
            metadata: None,
        };

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "visitor_request");
        assert!(value.get("kind").is_none());
        assert!(value.get("expires_at").is_none());
    }

    #[test]
    fn test_envelope_expiry_check() {
        let mut envelope = Envelope {
            id: "1-1".to_string(),
            kind: "system".to_string(),
            payload: serde_json::Value::Null,
            priority: NotificationPriority::Low,
            enqueued_at: Utc::now(),
            retry_count: 0,
            max_retries: 3,
            expires_at: None,
            target_clients: None,
            metadata: None,
        };

        let now = Utc::now();
        assert!(!envelope.is_expired(now));

        envelope.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(envelope.is_expired(now));

        envelope.expires_at = Some(now + chrono::Duration::seconds(60));
        assert!(!envelope.is_expired(now));
    }

    #[test]
    fn test_enqueue_options_defaults() {
        let options: EnqueueOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.priority, NotificationPriority::Normal);
        assert!(options.max_retries.is_none());
        assert!(options.target_clients.is_none());
    }
}
