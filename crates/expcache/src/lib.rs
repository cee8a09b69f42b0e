//! Expiring key-value cache with optional mirroring to a persistent store.
//!
//! ```text
//!   caller ──set/get/has/delete──▶ ExpiringCache ──whole table (JSON)──▶ PersistentStore
//!                                        │                                  ├─ MemoryStore (session)
//!                                        └── Clock (now in ms)              └─ FileStore   (durable)
//! ```
mod cache;
mod clock;
mod store;

pub use cache::{CacheEntry, CacheError, CacheOptions, ExpiringCache, PersistenceError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{FileStore, MemoryStore, PersistentStore, StoreError};
pub use tuning::PersistenceMode;
