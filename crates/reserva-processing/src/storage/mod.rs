//! Object stores the raw dataset can be fetched from.
//!
//! Ingestion only needs one operation, "copy this object to that file", so
//! the [`ObjectStore`] trait is kept that small. Concrete stores:
//!
//! - [`GcsObjectStore`] - Google Cloud Storage JSON API (requires `gcs` feature)
//! - [`LocalObjectStore`] - a directory per bucket on the local filesystem
//!
//! # Example
//!
//! ```rust,ignore
//! use reserva_processing::storage::{LocalObjectStore, ObjectStore};
//!
//! let store = LocalObjectStore::new("/data/buckets");
//! store.download("reservations", "Hotel_Reservations.csv", "artifacts/raw/raw.csv".as_ref())?;
//! ```

use std::path::Path;

use reserva_common::Result;

mod local;
pub use local::LocalObjectStore;

#[cfg(feature = "gcs")]
mod gcs;
#[cfg(feature = "gcs")]
pub use gcs::{GcsConfig, GcsConfigBuilder, GcsObjectStore};

/// A read-only source of bucket objects.
///
/// Implementations must be `Send + Sync` so one store can be shared by
/// stages running on different threads.
pub trait ObjectStore: Send + Sync {
    /// Copy `bucket/object` to `dest`, returning the number of bytes written.
    ///
    /// `dest`'s parent directory must already exist.
    fn download(&self, bucket: &str, object: &str, dest: &Path) -> Result<u64>;

    /// Store name for logging.
    fn name(&self) -> &str;
}
