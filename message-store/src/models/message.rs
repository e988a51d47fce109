//! Message model for persistence.
//!
//! Maps to the `messages` table through the [`crate::Entity`] impl in `mapper`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;

/// Semantic kind of a relayed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Task,
    TaskResult,
    Ack,
    Incoming,
}

impl MessageType {
    /// Name persisted in the `message_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Task => "TASK",
            MessageType::TaskResult => "TASK_RESULT",
            MessageType::Ack => "ACK",
            MessageType::Incoming => "INCOMING",
        }
    }
}

impl FromStr for MessageType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TASK" => Ok(MessageType::Task),
            "TASK_RESULT" => Ok(MessageType::TaskResult),
            "ACK" => Ok(MessageType::Ack),
            "INCOMING" => Ok(MessageType::Incoming),
            other => Err(StorageError::Mapping(format!(
                "unknown message type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a message. Queries only partition on sent / not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
    Unconfirmed,
}

impl MessageStatus {
    /// Name persisted in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "PENDING",
            MessageStatus::Sent => "SENT",
            MessageStatus::Failed => "FAILED",
            MessageStatus::Unconfirmed => "UNCONFIRMED",
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, MessageStatus::Sent)
    }
}

impl FromStr for MessageStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(MessageStatus::Pending),
            "SENT" => Ok(MessageStatus::Sent),
            "FAILED" => Ok(MessageStatus::Failed),
            "UNCONFIRMED" => Ok(MessageStatus::Unconfirmed),
            other => Err(StorageError::Mapping(format!(
                "unknown message status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One relayed item: identity, payload, lifecycle state and delivery/sent tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// External identity; never the table's row id.
    pub uuid: String,
    pub body: String,
    pub from: Option<String>,
    /// Ordering key; persisted with millisecond precision.
    pub timestamp: DateTime<Utc>,
    pub message_type: MessageType,
    pub status: MessageStatus,
    #[serde(default)]
    pub delivery_result_code: Option<i64>,
    #[serde(default)]
    pub delivery_result_message: Option<String>,
    #[serde(default)]
    pub sent_result_code: Option<i64>,
    #[serde(default)]
    pub sent_result_message: Option<String>,
    #[serde(default)]
    pub retries: i64,
}

impl Message {
    /// Creates a pending message with a generated UUID and the current timestamp,
    /// truncated to milliseconds so a stored copy reads back identical.
    pub fn new(body: impl Into<String>, from: Option<String>, message_type: MessageType) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            body: body.into(),
            from,
            timestamp: Utc::now().trunc_subsecs(3),
            message_type,
            status: MessageStatus::Pending,
            delivery_result_code: None,
            delivery_result_message: None,
            sent_result_code: None,
            sent_result_message: None,
            retries: 0,
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the timestamp from epoch milliseconds, the precision the store keeps.
    /// A value outside chrono's range leaves the timestamp unchanged.
    pub fn with_timestamp_millis(mut self, millis: i64) -> Self {
        if let Some(ts) = DateTime::<Utc>::from_timestamp_millis(millis) {
            self.timestamp = ts;
        }
        self
    }

    pub fn with_retries(mut self, retries: i64) -> Self {
        self.retries = retries;
        self
    }

    pub fn is_sent(&self) -> bool {
        self.status.is_sent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_is_pending() {
        let message = Message::new("hello", Some("+254700000000".to_string()), MessageType::Task);
        assert_eq!(message.status, MessageStatus::Pending);
        assert_eq!(message.retries, 0);
        assert!(Uuid::parse_str(&message.uuid).is_ok());
        assert!(!message.is_sent());
    }

    #[test]
    fn test_new_message_timestamp_has_millisecond_precision() {
        let message = Message::new("hello", None, MessageType::Task);
        assert_eq!(message.timestamp.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_out_of_range_millis_keep_timestamp() {
        let message = Message::new("hello", None, MessageType::Task).with_timestamp_millis(1_000);
        let unchanged = message.clone().with_timestamp_millis(i64::MAX);
        assert_eq!(unchanged.timestamp, message.timestamp);
        assert_eq!(unchanged.timestamp.timestamp_millis(), 1_000);
    }

    #[test]
    fn test_status_names_parse_back() {
        for status in [
            MessageStatus::Pending,
            MessageStatus::Sent,
            MessageStatus::Failed,
            MessageStatus::Unconfirmed,
        ] {
            assert_eq!(status.as_str().parse::<MessageStatus>().unwrap(), status);
        }
        assert!("DELIVERED".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn test_unknown_type_is_mapping_error() {
        let err = "BROADCAST".parse::<MessageType>().unwrap_err();
        assert!(matches!(err, StorageError::Mapping(_)));
        assert_eq!("TASK_RESULT".parse::<MessageType>().unwrap(), MessageType::TaskResult);
    }

    #[test]
    fn test_serde_uses_stored_names() {
        let message = Message::new("x", None, MessageType::TaskResult)
            .with_uuid("m1")
            .with_status(MessageStatus::Sent);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["message_type"], "TASK_RESULT");
        assert_eq!(json["status"], "SENT");
    }
}
