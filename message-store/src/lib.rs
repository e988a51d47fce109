//! Message store crate: persistence for relayed messages (pending, sent, delivery tracking).
//!
//! ## Modules
//!
//! - [`error`] – Storage error types
//! - [`models`] – Message, MessageType, MessageStatus, MessageStats
//! - [`mapper`] – Entity trait and field maps
//! - [`statement`] – Insert/update/delete helpers and the select builder
//! - [`handle`] – StorageHandle (lazily opened SQLite pool)
//! - [`worker`] – WorkSerializer
//! - [`locks`] – KeyedLocks (per-uuid write ordering)
//! - [`message_repo`] – MessageRepository (SQL for each operation)
//! - [`message_store`] – MessageStore (public async/blocking surface)
//! - [`repository`] – Repository trait

mod config;
mod error;
mod handle;
mod locks;
pub mod mapper;
mod message_repo;
mod message_store;
mod models;
mod repository;
pub mod statement;
mod worker;


pub use config::StoreConfig;
pub use error::{Result, StorageError};
pub use handle::StorageHandle;
pub use locks::{KeyedGuard, KeyedLocks};
pub use mapper::{Entity, FieldMap, FieldValue};
pub use message_repo::MessageRepository;
pub use message_store::MessageStore;
pub use models::{Message, MessageStats, MessageStatus, MessageType};
pub use repository::Repository;
pub use worker::WorkSerializer;
