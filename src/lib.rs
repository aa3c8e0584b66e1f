//! Temporal-KV: temporal key-value store
//!
//! Every key keeps a history of values indexed by a caller-supplied logical
//! timestamp, and reads answer "what was the value of this key at or before
//! time T?".
//!
//! # Core Concepts
//!
//! - **Versions**: one (key, timestamp, value) record; at most one per pair
//! - **Upserts**: `put` creates a version or overwrites its value
//! - **Point-in-time reads**: `get` returns the latest version at or before T
//! - **Conflict retry**: writers racing to create the same version converge
//!   through the backend's uniqueness constraint and a bounded retry loop
//!
//! # Example
//!
//! ```no_run
//! use temporal_kv::prelude::*;
//!
//! # async fn example() -> temporal_kv::error::Result<()> {
//! let store = TemporalStore::in_memory();
//!
//! store.put("user:1", "active", Timestamp::new(1000)).await?;
//! store.put("user:1", "inactive", Timestamp::new(2000)).await?;
//!
//! let value = store.get("user:1", Timestamp::new(1500)).await?;
//! assert_eq!(value.as_deref(), Some("active"));
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod retry;
pub mod storage;

/// Main store type
pub mod store;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::{BackendConfig, StoreConfig};
    pub use crate::core::*;
    pub use crate::error::{Error, Result};
    pub use crate::retry::RetryPolicy;
    pub use crate::storage::{
        BackendTransaction, FileBackend, MemoryBackend, PersistenceBackend,
    };
    pub use crate::store::TemporalStore;
}
