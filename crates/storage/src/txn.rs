use std::sync::atomic::{AtomicU64, Ordering};

/// Handle identifying one transaction. Threaded through every storage call;
/// lock ownership and log records key off the id.
#[derive(Debug)]
pub struct Transaction {
    pub id: u64,
}

/// Hands out monotonically increasing transaction ids.
#[derive(Debug, Default)]
pub struct TransactionManager {
    next: AtomicU64,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn begin(&self) -> Transaction {
        Transaction {
            id: self.next.fetch_add(1, Ordering::Relaxed),
        }
    }
}
