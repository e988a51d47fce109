//! Record <-> column mapping.
//!
//! [`Entity`] converts a typed record into an ordered [`FieldMap`] for writes and
//! rebuilds it from a [`SqliteRow`] for reads.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error::{Result, StorageError};
use crate::models::Message;

/// A single bindable column value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(Option<String>),
    Integer(Option<i64>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(Some(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(Some(value))
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(Some(value))
    }
}

impl From<Option<i64>> for FieldValue {
    fn from(value: Option<i64>) -> Self {
        FieldValue::Integer(value)
    }
}

/// Column name to value, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    fields: Vec<(&'static str, FieldValue)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `column`, replacing an earlier value for the same column.
    pub fn put(&mut self, column: &'static str, value: impl Into<FieldValue>) -> &mut Self {
        let value = value.into();
        match self.fields.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
        self
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v)
    }

    /// Keeps only `columns`, in the order given. Unknown columns are skipped.
    pub fn subset(&self, columns: &[&'static str]) -> FieldMap {
        let fields = columns
            .iter()
            .filter_map(|c| self.get(c).map(|v| (*c, v.clone())))
            .collect();
        FieldMap { fields }
    }

    pub fn without(&self, column: &str) -> FieldMap {
        let fields = self
            .fields
            .iter()
            .filter(|(c, _)| *c != column)
            .cloned()
            .collect();
        FieldMap { fields }
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(c, _)| *c)
    }

    pub fn values(&self) -> impl Iterator<Item = &FieldValue> + '_ {
        self.fields.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A record persisted in one table and addressed by one key column.
pub trait Entity: Sized {
    const TABLE: &'static str;
    const KEY_COLUMN: &'static str;

    fn key(&self) -> &str;
    fn to_field_map(&self) -> FieldMap;
    fn from_row(row: &SqliteRow) -> Result<Self>;
}

pub mod columns {
    pub const UUID: &str = "message_uuid";
    pub const BODY: &str = "message_body";
    pub const FROM: &str = "message_from";
    pub const DATE: &str = "messages_date";
    pub const TYPE: &str = "message_type";
    pub const STATUS: &str = "status";
    pub const DELIVERY_RESULT_CODE: &str = "delivery_result_code";
    pub const DELIVERY_RESULT_MESSAGE: &str = "delivery_result_message";
    pub const SENT_RESULT_CODE: &str = "sent_result_code";
    pub const SENT_RESULT_MESSAGE: &str = "sent_result_message";
    pub const RETRIES: &str = "retries";

    /// Written by delivery-report handling.
    pub const DELIVERY_FIELDS: &[&str] = &[
        TYPE,
        STATUS,
        DELIVERY_RESULT_CODE,
        DELIVERY_RESULT_MESSAGE,
        RETRIES,
    ];

    /// Written by send workers.
    pub const SENT_FIELDS: &[&str] = &[TYPE, STATUS, SENT_RESULT_CODE, SENT_RESULT_MESSAGE, RETRIES];
}

impl Entity for Message {
    const TABLE: &'static str = "messages";
    const KEY_COLUMN: &'static str = columns::UUID;

    fn key(&self) -> &str {
        &self.uuid
    }

    fn to_field_map(&self) -> FieldMap {
        let mut map = FieldMap::new();
        map.put(columns::UUID, self.uuid.as_str())
            .put(columns::BODY, self.body.as_str())
            .put(columns::FROM, self.from.clone())
            .put(columns::DATE, self.timestamp.timestamp_millis())
            .put(columns::TYPE, self.message_type.as_str())
            .put(columns::STATUS, self.status.as_str())
            .put(columns::DELIVERY_RESULT_CODE, self.delivery_result_code)
            .put(columns::DELIVERY_RESULT_MESSAGE, self.delivery_result_message.clone())
            .put(columns::SENT_RESULT_CODE, self.sent_result_code)
            .put(columns::SENT_RESULT_MESSAGE, self.sent_result_message.clone())
            .put(columns::RETRIES, self.retries);
        map
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        let millis: i64 = row.try_get(columns::DATE)?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            StorageError::Mapping(format!("timestamp out of range: {}", millis))
        })?;
        let type_str: String = row.try_get(columns::TYPE)?;
        let status_str: String = row.try_get(columns::STATUS)?;

        Ok(Message {
            uuid: row.try_get(columns::UUID)?,
            body: row.try_get(columns::BODY)?,
            from: row.try_get(columns::FROM)?,
            timestamp,
            message_type: type_str.parse()?,
            status: status_str.parse()?,
            delivery_result_code: row.try_get(columns::DELIVERY_RESULT_CODE)?,
            delivery_result_message: row.try_get(columns::DELIVERY_RESULT_MESSAGE)?,
            sent_result_code: row.try_get(columns::SENT_RESULT_CODE)?,
            sent_result_message: row.try_get(columns::SENT_RESULT_MESSAGE)?,
            retries: row.try_get(columns::RETRIES)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageStatus, MessageType};

    #[test]
    fn test_field_map_covers_every_column() {
        let message = Message::new("body", None, MessageType::Task).with_uuid("u1");
        let map = message.to_field_map();
        assert_eq!(map.len(), 11);
        assert_eq!(map.get(columns::UUID), Some(&FieldValue::from("u1")));
        assert_eq!(map.get(columns::FROM), Some(&FieldValue::Text(None)));
        assert_eq!(
            map.get(columns::DATE),
            Some(&FieldValue::Integer(Some(message.timestamp.timestamp_millis())))
        );
    }

    #[test]
    fn test_subset_keeps_requested_order() {
        let message = Message::new("body", None, MessageType::Ack)
            .with_status(MessageStatus::Sent)
            .with_retries(3);
        let map = message.to_field_map().subset(columns::SENT_FIELDS);
        let cols: Vec<_> = map.columns().collect();
        assert_eq!(cols, columns::SENT_FIELDS.to_vec());
        assert_eq!(map.get(columns::STATUS), Some(&FieldValue::from("SENT")));
        assert_eq!(map.get(columns::RETRIES), Some(&FieldValue::from(3)));
        assert!(map.get(columns::BODY).is_none());
    }

    #[test]
    fn test_put_replaces_existing_column() {
        let mut map = FieldMap::new();
        map.put(columns::RETRIES, 1).put(columns::RETRIES, 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(columns::RETRIES), Some(&FieldValue::from(2)));
        assert!(map.without(columns::RETRIES).is_empty());
    }
}
