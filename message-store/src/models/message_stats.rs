//! Aggregate counts for messages.
//!
//! Returned by MessageStore::stats.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStats {
    pub total: usize,
    pub pending: usize,
    pub sent: usize,
}
