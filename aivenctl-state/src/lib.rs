//! aivenctl State Management
//!
//! Persists what `aivenctl apply` created so later runs can refresh, diff
//! and delete it. State lives in a local JSON file guarded by a lock file.
//!
//! # Overview
//!
//! - **StateFile**: all managed resources with their Aiven identifiers
//! - **StateBackend**: trait for state storage backends
//! - **LockInfo**: who holds the state lock, and until when
//!
//! # Example
//!
//! ```ignore
//! use aivenctl_state::{LocalBackend, StateBackend, StateFile};
//!
//! let backend = LocalBackend::new();
//! let lock = backend.acquire_lock("apply").await?;
//!
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! // ... apply, then record results ...
//! state.increment_serial();
//! backend.write_state(&state).await?;
//!
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

// Re-export main types for convenience
pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
