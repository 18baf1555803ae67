//! Installation store infrastructure.
//!
//! Implements [`bridge::InstallationStore`] twice:
//!
//! - [`SqliteInstallStore`]: durable, one SQLite file per listener process.
//! - [`MemoryInstallStore`]: process-local, for tests and ephemeral runs.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Schema, SQL, and locking live here. The domain crate
//! sees only the trait.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryInstallStore;
pub use sqlite::SqliteInstallStore;
