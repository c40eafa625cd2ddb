use std::collections::HashMap;

use super::events::{ObserverId, OperationKind, StorageObserver, StorageOperation};

/// Sparse, 16-bit-addressed register bank for a single point type.
///
/// Behaves like a 65536-entry array of `T` without allocating one: reading an
/// address that was never written yields `T::default()`, and memory grows
/// with the number of distinct addresses written. Block operations wrap at
/// the 16-bit address boundary, mirroring unsigned address arithmetic.
///
/// Not safe for unsynchronized concurrent access; a single owner (or an
/// external mutex around the whole [`super::SlaveStorage`]) must serialize
/// reads and writes.
///
/// ```
/// use modsim::storage::PointStore;
///
/// let mut store = PointStore::<u16>::new();
/// store.set(3, 700);
/// assert_eq!(store.get(3), 700);
/// assert_eq!(store.get(4), 0);
/// assert_eq!(store.read_block(2, 3), vec![0, 700, 0]);
/// ```
pub struct PointStore<T> {
    points: HashMap<u16, T>,
    observers: Vec<(ObserverId, Box<dyn StorageObserver<T>>)>,
    next_observer_id: u64,
}

impl<T: Default + Clone> PointStore<T> {
    pub fn new() -> Self {
        Self {
            points: HashMap::new(),
            observers: Vec::new(),
            next_observer_id: 0,
        }
    }

    /// Value at `address`, or the type default if never written. Never fails.
    pub fn get(&self, address: u16) -> T {
        self.points.get(&address).cloned().unwrap_or_default()
    }

    /// Store `value` at `address`, creating the entry if absent and
    /// overwriting silently otherwise. An entry is created even when the
    /// value equals the default.
    pub fn set(&mut self, address: u16, value: T) {
        self.points.insert(address, value);
    }

    /// Number of populated entries.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Read `count` consecutive values starting at `start`.
    ///
    /// Address arithmetic wraps at the 16-bit boundary, so `read_block(65535,
    /// 3)` covers addresses 65535, 0 and 1 in that order. Observers receive a
    /// single Read event with the assembled block after it is built and
    /// before this call returns.
    pub fn read_block(&self, start: u16, count: u16) -> Vec<T> {
        let points: Vec<T> = (0..count).map(|i| self.get(start.wrapping_add(i))).collect();
        self.notify(StorageOperation {
            kind: OperationKind::Read,
            start_address: start,
            points: points.clone(),
        });
        points
    }

    /// Write `values` at consecutive addresses starting at `start`, in index
    /// order, wrapping at the 16-bit boundary. Observers receive a single
    /// Write event with the input block after every value is stored.
    pub fn write_block(&mut self, start: u16, values: &[T]) {
        for (i, value) in values.iter().enumerate() {
            self.set(start.wrapping_add(i as u16), value.clone());
        }
        self.notify(StorageOperation {
            kind: OperationKind::Write,
            start_address: start,
            points: values.to_vec(),
        });
    }

    /// Register an observer, invoked synchronously after every block
    /// operation in registration order.
    pub fn subscribe(&mut self, observer: Box<dyn StorageObserver<T>>) -> ObserverId {
        let id = ObserverId(self.next_observer_id);
        self.next_observer_id += 1;
        self.observers.push((id, observer));
        id
    }

    /// Remove a previously registered observer. Returns false if the id is
    /// unknown or was already unsubscribed.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    fn notify(&self, event: StorageOperation<T>) {
        for (_, observer) in &self.observers {
            observer.on_storage_operation(&event);
        }
    }
}

impl<T: Default + Clone> Default for PointStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
