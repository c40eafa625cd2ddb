use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::RegisterType;

/// What a block operation did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Read,
    Write,
}

/// Notification payload emitted after a block read or block write.
///
/// Carries the operation kind, the starting address of the block and the
/// point values involved. A pure value type: it has no identity of its own
/// and the same payload is handed to every registered observer in turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOperation<T> {
    pub kind: OperationKind,
    pub start_address: u16,
    pub points: Vec<T>,
}

/// Callback invoked synchronously after every block operation on a store.
///
/// Observers run in registration order. A panicking observer unwinds out of
/// the triggering `read_block`/`write_block` call, but only after the
/// mutation has already been applied to the store.
pub trait StorageObserver<T>: Send {
    fn on_storage_operation(&self, event: &StorageOperation<T>);
}

impl<T, F> StorageObserver<T> for F
where
    F: Fn(&StorageOperation<T>) + Send,
{
    fn on_storage_operation(&self, event: &StorageOperation<T>) {
        self(event)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

/// A storage operation tagged with its data table, normalized for
/// republishing.
///
/// Coil and discrete-input values are mapped to 0/1 words so that one payload
/// shape covers all four tables, matching what a push hub or JSONL sink
/// expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageNotification {
    pub table: RegisterType,
    pub kind: OperationKind,
    pub start_address: u16,
    pub values: Vec<u16>,
    pub timestamp: String,
}

impl StorageNotification {
    pub fn from_bits(table: RegisterType, event: &StorageOperation<bool>) -> Self {
        Self {
            table,
            kind: event.kind,
            start_address: event.start_address,
            values: event.points.iter().map(|on| u16::from(*on)).collect(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn from_words(table: RegisterType, event: &StorageOperation<u16>) -> Self {
        Self {
            table,
            kind: event.kind,
            start_address: event.start_address,
            values: event.points.clone(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
