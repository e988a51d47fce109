//! Message store: the public surface for message persistence.
//!
//! Each async operation is submitted to the [`WorkSerializer`] and resolves with
//! its value or a [`crate::StorageError`]; once the store is closed every operation
//! resolves with [`crate::StorageError::StoreClosed`]. A few operations also have
//! `_blocking` twins for threads outside the runtime.
//!
//! Construct one store per process and hand out clones; clones share the same
//! pool, locks and closed flag.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::message_repo::MessageRepository;
use crate::models::{Message, MessageStats, MessageStatus, MessageType};
use crate::repository::Repository;
use crate::worker::WorkSerializer;

#[derive(Clone)]
pub struct MessageStore {
    repo: Arc<MessageRepository>,
    serializer: WorkSerializer,
}

impl MessageStore {
    /// Creates the store. The database is opened on the first operation.
    pub fn new(config: StoreConfig, serializer: WorkSerializer) -> Self {
        Self {
            repo: Arc::new(MessageRepository::new(config)),
            serializer,
        }
    }

    /// Creates the store on the current tokio runtime.
    pub fn with_current_runtime(config: StoreConfig) -> Self {
        Self::new(config, WorkSerializer::current())
    }

    async fn submit<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Arc<MessageRepository>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.serializer.submit(op(self.repo.clone())).await
    }

    fn block_on<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Arc<MessageRepository>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.serializer.block_on(op(self.repo.clone()))
    }

    fn count_or_zero(operation: &'static str, result: Result<usize>) -> usize {
        result.unwrap_or_else(|e| {
            warn!(operation, error = %e, "Message count unavailable, reporting 0");
            0
        })
    }

    // --- Writes ---

    /// Inserts a batch of new messages in one transaction.
    pub async fn put_many(&self, messages: Vec<Message>) -> Result<()> {
        self.submit(move |repo| async move { repo.put_many(&messages).await })
            .await
    }

    /// Inserts the message, or replaces every field of the stored message with the same uuid.
    pub async fn put_one(&self, message: Message) -> Result<()> {
        self.submit(move |repo| async move { repo.put_one(&message).await })
            .await
    }

    /// Replaces every field of the stored message with the same uuid.
    ///
    /// Does not insert: for an unknown uuid this succeeds with 0 rows affected.
    pub async fn update_full(&self, message: Message) -> Result<u64> {
        self.submit(move |repo| async move { repo.update_full(&message).await })
            .await
    }

    /// Writes type, status, delivery result code/message and retries. 0 rows for an unknown uuid.
    pub async fn update_delivery_fields(&self, message: Message) -> Result<u64> {
        self.submit(move |repo| async move { repo.update_delivery_fields(&message).await })
            .await
    }

    /// Writes type, status, sent result code/message and retries. 0 rows for an unknown uuid.
    pub async fn update_sent_fields(&self, message: Message) -> Result<u64> {
        self.submit(move |repo| async move { repo.update_sent_fields(&message).await })
            .await
    }

    /// Deletes one message; succeeds with 0 when the uuid is unknown.
    pub async fn delete_by_uuid(&self, uuid: impl Into<String>) -> Result<u64> {
        let uuid = uuid.into();
        self.submit(move |repo| async move { repo.delete_by_uuid(&uuid).await })
            .await
    }

    pub async fn delete_all(&self) -> Result<u64> {
        self.submit(|repo| async move { repo.delete_all().await }).await
    }

    /// Deletes every message whose status is sent.
    pub async fn delete_all_sent(&self) -> Result<u64> {
        self.submit(|repo| async move { repo.delete_all_sent().await })
            .await
    }

    // --- Reads ---

    /// Messages of one type, newest first.
    pub async fn fetch_by_type(&self, message_type: MessageType) -> Result<Vec<Message>> {
        self.submit(move |repo| async move { repo.fetch_by_type(message_type).await })
            .await
    }

    /// Messages with one status, newest first.
    pub async fn fetch_by_status(&self, status: MessageStatus) -> Result<Vec<Message>> {
        self.submit(move |repo| async move { repo.fetch_by_status(status).await })
            .await
    }

    /// `Ok(None)` when no message has that uuid.
    pub async fn fetch_by_uuid(&self, uuid: impl Into<String>) -> Result<Option<Message>> {
        let uuid = uuid.into();
        self.submit(move |repo| async move { repo.fetch_by_uuid(&uuid).await })
            .await
    }

    pub fn fetch_by_uuid_blocking(&self, uuid: impl Into<String>) -> Result<Option<Message>> {
        let uuid = uuid.into();
        self.block_on(move |repo| async move { repo.fetch_by_uuid(&uuid).await })
    }

    /// Looks up each uuid. Unknown uuids are left out of the result, which keeps the
    /// requested order; any storage error fails the whole call.
    pub async fn fetch_by_uuids(&self, uuids: Vec<String>) -> Result<Vec<Message>> {
        self.submit(move |repo| async move { repo.fetch_by_uuids(&uuids).await })
            .await
    }

    /// Messages not yet sent, newest first.
    pub async fn fetch_pending(&self) -> Result<Vec<Message>> {
        self.submit(|repo| async move { repo.fetch_pending().await })
            .await
    }

    pub fn fetch_pending_blocking(&self) -> Result<Vec<Message>> {
        self.block_on(|repo| async move { repo.fetch_pending().await })
    }

    /// Sent messages, newest first.
    pub async fn fetch_sent(&self) -> Result<Vec<Message>> {
        self.submit(|repo| async move { repo.fetch_sent().await }).await
    }

    /// Every message, unordered.
    pub async fn fetch_all(&self) -> Result<Vec<Message>> {
        self.submit(|repo| async move { repo.fetch_all().await }).await
    }

    /// First `limit` messages in storage order.
    pub async fn fetch_by_limit(&self, limit: usize) -> Result<Vec<Message>> {
        self.submit(move |repo| async move { repo.fetch_by_limit(limit).await })
            .await
    }

    pub fn fetch_by_limit_blocking(&self, limit: usize) -> Result<Vec<Message>> {
        self.block_on(move |repo| async move { repo.fetch_by_limit(limit).await })
    }

    // --- Counts ---

    /// Number of messages not yet sent.
    pub async fn total_pending(&self) -> Result<usize> {
        self.submit(|repo| async move { repo.count_pending().await })
            .await
    }

    /// Size of [`Self::fetch_pending`]; same value as [`Self::total_pending`].
    pub async fn pending_total(&self) -> Result<usize> {
        self.submit(|repo| async move { Ok(repo.fetch_pending().await?.len()) })
            .await
    }

    pub async fn sent_total(&self) -> Result<usize> {
        self.submit(|repo| async move { repo.count_sent().await })
            .await
    }

    /// Like [`Self::total_pending`], but 0 when the store is closed or the query fails.
    pub fn total_pending_blocking(&self) -> usize {
        Self::count_or_zero(
            "total_pending",
            self.block_on(|repo| async move { repo.count_pending().await }),
        )
    }

    pub fn pending_total_blocking(&self) -> usize {
        Self::count_or_zero(
            "pending_total",
            self.block_on(|repo| async move { Ok(repo.fetch_pending().await?.len()) }),
        )
    }

    pub fn sent_total_blocking(&self) -> usize {
        Self::count_or_zero(
            "sent_total",
            self.block_on(|repo| async move { repo.count_sent().await }),
        )
    }

    pub async fn stats(&self) -> Result<MessageStats> {
        self.submit(|repo| async move { repo.stats().await }).await
    }

    // --- Lifecycle ---

    pub fn is_closed(&self) -> bool {
        self.repo.handle().is_closed()
    }

    /// Closes the store for every clone. Operations already running finish; later
    /// ones resolve with [`crate::StorageError::StoreClosed`].
    pub async fn close(&self) {
        self.repo.handle().close().await;
    }
}

#[async_trait]
impl Repository<Message> for MessageStore {
    async fn save(&self, entity: &Message) -> Result<()> {
        self.put_one(entity.clone()).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Message>> {
        self.fetch_by_uuid(id).await
    }

    async fn find_all(&self) -> Result<Vec<Message>> {
        self.fetch_all().await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.delete_by_uuid(id).await? > 0)
    }
}
