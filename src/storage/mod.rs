pub mod events;
pub mod points;

pub use events::{
    ObserverId, OperationKind, StorageNotification, StorageObserver, StorageOperation,
};
pub use points::PointStore;

use crate::config::RegisterType;

/// The four standard Modbus data tables, one sparse point store each.
///
/// Each store is owned exclusively and addressed in isolation; there are no
/// cross-store invariants. The facade itself is not thread-safe — the
/// protocol server wraps it in a mutex and is the only serialization layer.
#[derive(Default)]
pub struct SlaveStorage {
    /// Coil outputs (read/write bits).
    pub coils: PointStore<bool>,
    /// Discrete inputs (read-only bits).
    pub discretes: PointStore<bool>,
    /// Holding registers (read/write words).
    pub holdings: PointStore<u16>,
    /// Input registers (read-only words).
    pub inputs: PointStore<u16>,
}

impl SlaveStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a forwarding observer on all four stores and return the
    /// receiving end of the notification channel.
    ///
    /// Every block operation on any table shows up as one
    /// [`StorageNotification`] tagged with the table it touched. Call more
    /// than once to fan out to multiple consumers; each call gets the full
    /// stream from its attach point onward.
    pub fn attach_hub(&mut self) -> flume::Receiver<StorageNotification> {
        let (tx, rx) = flume::unbounded();

        let sender = tx.clone();
        self.coils
            .subscribe(Box::new(move |event: &StorageOperation<bool>| {
                let _ = sender.send(StorageNotification::from_bits(RegisterType::Coils, event));
            }));

        let sender = tx.clone();
        self.discretes
            .subscribe(Box::new(move |event: &StorageOperation<bool>| {
                let _ = sender.send(StorageNotification::from_bits(
                    RegisterType::DiscreteInputs,
                    event,
                ));
            }));

        let sender = tx.clone();
        self.holdings
            .subscribe(Box::new(move |event: &StorageOperation<u16>| {
                let _ = sender.send(StorageNotification::from_words(
                    RegisterType::Holding,
                    event,
                ));
            }));

        let sender = tx;
        self.inputs
            .subscribe(Box::new(move |event: &StorageOperation<u16>| {
                let _ = sender.send(StorageNotification::from_words(RegisterType::Input, event));
            }));

        rx
    }
}
