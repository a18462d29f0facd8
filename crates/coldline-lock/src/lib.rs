//! Per-key mutual exclusion for coldline.
//!
//! [`BucketLocker`] keeps retrieval and archival of one bucket from running
//! twice at the same time while letting unrelated buckets proceed in
//! parallel. It guards work, not data: handlers re-observe state after
//! acquiring the lock.

pub mod locker;

pub use locker::BucketLocker;
