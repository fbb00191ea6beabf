//! Action Ledger
//!
//! Bounded, append-only, in-memory history of tool invocations. When full,
//! the oldest record is evicted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{compute::InstanceRef, metrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    List,
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionOutcome {
    Succeeded,
    Provisional,
    Failed,
}

/// One recorded tool invocation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: ActionKind,
    pub instance: InstanceRef,
    pub outcome: ActionOutcome,
    /// Tool arguments exactly as received
    pub request: Value,
    /// Handler output exactly as returned, or the error on failure
    pub result: Value,
}

impl ActionRecord {
    pub fn new(
        kind: ActionKind,
        instance: InstanceRef,
        outcome: ActionOutcome,
        request: Value,
        result: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            instance,
            outcome,
            request,
            result,
        }
    }
}

pub struct ActionLedger {
    capacity: usize,
    records: RwLock<VecDeque<ActionRecord>>,
}

impl ActionLedger {
    /// Creates a ledger holding at most `capacity` records (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn append(&self, record: ActionRecord) {
        let mut records = self.records.write().await;
        if records.len() == self.capacity {
            if let Some(evicted) = records.pop_front() {
                debug!("Ledger full, evicting record {}", evicted.id);
            }
        }
        records.push_back(record);
        metrics::LEDGER_RECORDS.set(records.len() as i64);
    }

    /// Last `min(limit, len)` records, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<ActionRecord> {
        let records = self.records.read().await;
        let skip = records.len().saturating_sub(limit);
        records.iter().skip(skip).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
