//! Persistence: backend traits, the two session-aware stores and the
//! bundled backends.

pub mod file;
pub mod local;
pub mod memory;
pub mod remote;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

pub use file::FileSnapshotBackend;
pub use local::LocalSnapshotStore;
pub use memory::{MemoryDraftBackend, MemorySnapshotBackend};
pub use remote::RemoteDraftStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDraftBackend;
pub use traits::{DraftBackend, SnapshotBackend};
