//! Message repository: the SQL behind every message store operation.
//!
//! Runs inline on the caller's task; [`crate::MessageStore`] submits these to the
//! work serializer. Every write holds the keyed lock of the uuids it touches.

use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::Result;
use crate::handle::StorageHandle;
use crate::locks::KeyedLocks;
use crate::mapper::{columns, Entity, FieldMap, FieldValue};
use crate::models::{Message, MessageStats, MessageStatus, MessageType};
use crate::statement::{execute_delete, execute_insert, execute_update, Direction, Select};

const BY_UUID: &str = "message_uuid = ?";
const BY_TYPE: &str = "message_type = ?";
const BY_STATUS: &str = "status = ?";
const NOT_STATUS: &str = "status != ?";

fn sent_arg() -> Vec<FieldValue> {
    vec![FieldValue::from(MessageStatus::Sent.as_str())]
}

fn newest_first(select: Select) -> Select {
    select.order_by(columns::DATE, Direction::Desc)
}

pub struct MessageRepository {
    handle: StorageHandle,
    locks: KeyedLocks,
}

impl MessageRepository {
    pub fn new(config: StoreConfig) -> Self {
        let locks = KeyedLocks::new(config.lock_shards);
        Self {
            handle: StorageHandle::new(config),
            locks,
        }
    }

    pub fn handle(&self) -> &StorageHandle {
        &self.handle
    }

    /// Inserts all messages as new rows in one transaction; nothing is written on error.
    pub async fn put_many(&self, messages: &[Message]) -> Result<()> {
        let pool = self.handle.writable().await?;
        let _guard = self
            .locks
            .lock_many(messages.iter().map(|m| m.uuid.as_str()))
            .await;

        let mut tx = pool.begin().await?;
        for message in messages {
            execute_insert(&mut *tx, Message::TABLE, &message.to_field_map()).await?;
        }
        tx.commit().await?;

        debug!(count = messages.len(), "Inserted message batch");
        Ok(())
    }

    /// Upsert by uuid: update every column, insert when no row matched. Both
    /// statements share one transaction and the uuid's write lock.
    pub async fn put_one(&self, message: &Message) -> Result<()> {
        let pool = self.handle.writable().await?;
        let _guard = self.locks.lock(&message.uuid).await;

        let fields = message.to_field_map();
        let mut tx = pool.begin().await?;
        let updated = execute_update(
            &mut *tx,
            Message::TABLE,
            &fields.without(Message::KEY_COLUMN),
            BY_UUID,
            &[FieldValue::from(message.key())],
        )
        .await?;
        if updated == 0 {
            execute_insert(&mut *tx, Message::TABLE, &fields).await?;
        }
        tx.commit().await?;

        debug!(uuid = %message.uuid, inserted = (updated == 0), "Put message");
        Ok(())
    }

    /// Updates every column of an existing row. Returns rows affected; 0 means the
    /// uuid is unknown and nothing was created.
    pub async fn update_full(&self, message: &Message) -> Result<u64> {
        let fields = message.to_field_map().without(Message::KEY_COLUMN);
        self.update_columns(message, fields).await
    }

    /// Updates type, status, delivery result code/message and retries.
    pub async fn update_delivery_fields(&self, message: &Message) -> Result<u64> {
        let fields = message.to_field_map().subset(columns::DELIVERY_FIELDS);
        self.update_columns(message, fields).await
    }

    /// Updates type, status, sent result code/message and retries.
    pub async fn update_sent_fields(&self, message: &Message) -> Result<u64> {
        let fields = message.to_field_map().subset(columns::SENT_FIELDS);
        self.update_columns(message, fields).await
    }

    async fn update_columns(&self, message: &Message, fields: FieldMap) -> Result<u64> {
        let pool = self.handle.writable().await?;
        let _guard = self.locks.lock(&message.uuid).await;

        let rows = execute_update(
            pool,
            Message::TABLE,
            &fields,
            BY_UUID,
            &[FieldValue::from(message.key())],
        )
        .await?;

        debug!(uuid = %message.uuid, rows, "Updated message");
        Ok(rows)
    }

    /// Deletes one message. Unknown uuids are not an error and return 0.
    pub async fn delete_by_uuid(&self, uuid: &str) -> Result<u64> {
        let pool = self.handle.writable().await?;
        let _guard = self.locks.lock(uuid).await;

        let rows = execute_delete(pool, Message::TABLE, Some(BY_UUID), &[FieldValue::from(uuid)]).await?;

        debug!(uuid = %uuid, rows, "Deleted message");
        Ok(rows)
    }

    pub async fn delete_all(&self) -> Result<u64> {
        let pool = self.handle.writable().await?;
        let _guard = self.locks.lock_all().await;

        let rows = execute_delete(pool, Message::TABLE, None, &[]).await?;

        info!(rows, "Deleted all messages");
        Ok(rows)
    }

    pub async fn delete_all_sent(&self) -> Result<u64> {
        let pool = self.handle.writable().await?;
        let _guard = self.locks.lock_all().await;

        let rows = execute_delete(pool, Message::TABLE, Some(BY_STATUS), &sent_arg()).await?;

        info!(rows, "Deleted sent messages");
        Ok(rows)
    }

    pub async fn fetch_by_type(&self, message_type: MessageType) -> Result<Vec<Message>> {
        let pool = self.handle.readable().await?;
        newest_first(Select::from(Message::TABLE).filter(BY_TYPE, vec![message_type.as_str().into()]))
            .fetch_all(pool)
            .await
    }

    pub async fn fetch_by_status(&self, status: MessageStatus) -> Result<Vec<Message>> {
        let pool = self.handle.readable().await?;
        newest_first(Select::from(Message::TABLE).filter(BY_STATUS, vec![status.as_str().into()]))
            .fetch_all(pool)
            .await
    }

    /// Point lookup. `Ok(None)` when no message has that uuid.
    pub async fn fetch_by_uuid(&self, uuid: &str) -> Result<Option<Message>> {
        let pool = self.handle.readable().await?;
        let message: Option<Message> = Select::from(Message::TABLE)
            .filter(BY_UUID, vec![uuid.into()])
            .fetch_optional(pool)
            .await?;

        debug!(uuid = %uuid, found = message.is_some(), "Fetched message by uuid");
        Ok(message)
    }

    /// One point lookup per uuid. Unknown uuids are skipped and the result keeps
    /// the order of `uuids`; a storage error aborts the whole call.
    pub async fn fetch_by_uuids(&self, uuids: &[String]) -> Result<Vec<Message>> {
        let pool = self.handle.readable().await?;
        let mut messages = Vec::with_capacity(uuids.len());
        for uuid in uuids {
            let found = Select::from(Message::TABLE)
                .filter(BY_UUID, vec![uuid.as_str().into()])
                .fetch_optional::<Message, _>(pool)
                .await?;
            if let Some(message) = found {
                messages.push(message);
            }
        }

        debug!(requested = uuids.len(), found = messages.len(), "Fetched messages by uuids");
        Ok(messages)
    }

    /// Every message not yet sent, newest first.
    pub async fn fetch_pending(&self) -> Result<Vec<Message>> {
        let pool = self.handle.readable().await?;
        newest_first(Select::from(Message::TABLE).filter(NOT_STATUS, sent_arg()))
            .fetch_all(pool)
            .await
    }

    pub async fn fetch_sent(&self) -> Result<Vec<Message>> {
        let pool = self.handle.readable().await?;
        newest_first(Select::from(Message::TABLE).filter(BY_STATUS, sent_arg()))
            .fetch_all(pool)
            .await
    }

    pub async fn fetch_all(&self) -> Result<Vec<Message>> {
        let pool = self.handle.readable().await?;
        Select::from(Message::TABLE).fetch_all(pool).await
    }

    /// First `limit` rows in the table's natural order (no explicit sort).
    pub async fn fetch_by_limit(&self, limit: usize) -> Result<Vec<Message>> {
        let pool = self.handle.readable().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Select::from(Message::TABLE).limit(limit).fetch_all(pool).await
    }

    pub async fn count_pending(&self) -> Result<usize> {
        let pool = self.handle.readable().await?;
        Select::from(Message::TABLE)
            .filter(NOT_STATUS, sent_arg())
            .count(pool)
            .await
    }

    pub async fn count_sent(&self) -> Result<usize> {
        let pool = self.handle.readable().await?;
        Select::from(Message::TABLE)
            .filter(BY_STATUS, sent_arg())
            .count(pool)
            .await
    }

    pub async fn stats(&self) -> Result<MessageStats> {
        let pool = self.handle.readable().await?;
        let total = Select::from(Message::TABLE).count(pool).await?;
        let sent = Select::from(Message::TABLE)
            .filter(BY_STATUS, sent_arg())
            .count(pool)
            .await?;

        Ok(MessageStats {
            total,
            pending: total.saturating_sub(sent),
            sent,
        })
    }
}
