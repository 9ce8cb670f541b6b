use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Serializes the conflict-check-then-write sequence per vet within this
/// process. Bookings for different vets never wait on each other.
#[derive(Default)]
pub struct VetBookingLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl VetBookingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, vet_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(vet_id).or_default())
        };

        debug!("Waiting for booking lock on vet {}", vet_id);
        lock.lock_owned().await
    }

    pub fn tracked_vets(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
