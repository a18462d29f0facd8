use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use coldline_types::Bucket;
use tracing::trace;

type Slot = Arc<Mutex<()>>;

/// Keyed mutual exclusion for work on buckets.
///
/// Two calls with the same key never run their handlers at the same time.
/// Calls with different keys never wait on each other beyond the short
/// critical section that looks up the per-key slot.
///
/// Slots are created on first use and dropped when the last holder or
/// waiter releases them, so the table only grows with the number of keys
/// in flight.
///
/// A handler that panics still releases its key: the slot guard is dropped
/// during unwinding, and a poisoned slot is recovered by the next caller
/// since it protects no data.
#[derive(Default)]
pub struct BucketLocker {
    slots: Mutex<HashMap<String, Slot>>,
}

impl BucketLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `handler` while holding the lock for `bucket`'s identity.
    ///
    /// The key is the bucket's [`BucketKey`](coldline_types::BucketKey), so
    /// the same bucket in two formats or at two locations shares a lock.
    pub fn call_under_shared_lock<T>(
        &self,
        bucket: &Bucket,
        handler: impl FnOnce(&Bucket) -> T,
    ) -> T {
        self.call_under_key(&bucket_key(bucket), || handler(bucket))
    }

    /// Like [`BucketLocker::call_under_shared_lock`], but returns `None`
    /// instead of waiting when another caller holds the bucket's lock.
    pub fn try_call_under_shared_lock<T>(
        &self,
        bucket: &Bucket,
        handler: impl FnOnce(&Bucket) -> T,
    ) -> Option<T> {
        let release = self.acquire_slot(&bucket_key(bucket));
        let _guard = match release.slot.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(handler(bucket))
    }

    /// Run `handler` while holding the lock named `key`.
    ///
    /// Used for identities other than a bucket, such as an archive
    /// destination URI.
    pub fn call_under_key<T>(&self, key: &str, handler: impl FnOnce() -> T) -> T {
        let release = self.acquire_slot(key);
        let _guard: MutexGuard<'_, ()> = release
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        trace!(key, "lock acquired");
        handler()
    }

    /// Number of keys currently held or waited on.
    pub fn active_keys(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire_slot(&self, key: &str) -> Release<'_> {
        let slot = Arc::clone(self.table().entry(key.to_string()).or_default());
        Release {
            locker: self,
            key: key.to_string(),
            slot,
        }
    }
}

impl std::fmt::Debug for BucketLocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketLocker")
            .field("active_keys", &self.active_keys())
            .finish()
    }
}

fn bucket_key(bucket: &Bucket) -> String {
    format!("bucket:{}", bucket.key())
}

/// Handle on one slot. Declared before the slot guard so it drops after it,
/// then removes the slot from the table if nobody else references it.
struct Release<'a> {
    locker: &'a BucketLocker,
    key: String,
    slot: Slot,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        let mut table = self.locker.table();
        // Clones are only taken under the table lock, so a count of two
        // (table + self) means no other holder or waiter exists.
        if Arc::strong_count(&self.slot) == 2 {
            table.remove(&self.key);
            trace!(key = %self.key, "lock slot released");
        }
    }
}
