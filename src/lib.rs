//! Append-only storage of fixed-type array datasets inside an HDF5 file.
//!
//! A [`Dataset`] is a growable array of `i64` or `i16` elements, each either a
//! scalar or a fixed `rows x cols` block. Appends grow the array along its
//! first dimension and write the new elements at the old end; reads fetch any
//! contiguous range of whole elements.

pub mod config;
pub mod dataset;
pub mod encoding;
mod error;
pub mod storage;

pub use config::{CacheSizing, ChunkCacheConfig};
pub use dataset::Dataset;
pub use encoding::{Element, Encoding};
pub use error::{Error, ErrorKind, Result};
pub use storage::{Container, Storage};

#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
