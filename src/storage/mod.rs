use std::fmt;

use crate::{
    config::ChunkCacheConfig,
    encoding::{Element, Encoding},
};

mod container;
#[cfg(test)]
pub(crate) mod faulty;
mod space;

pub use container::{Container, OpenHandles};
pub use space::{Dataspace, Hyperslab};

// The contract the dataset layer drives, shaped after the HDF5 C API it was
// first written against. `Container` implements it on top of an HDF5 file.
//
// Every object the caller obtains (an array, a dataspace, a property list)
// is an identity that must be handed back through the matching `close_*`
// call. Dataspaces are snapshots of an array's shape at the moment they were
// obtained, and carry at most one hyperslab selection; a transfer moves
// elements between a selection in the array and a memory-side dataspace
// describing the caller's buffer.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpaceId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlistId(pub(crate) u64);

impl fmt::Display for ArrayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "array#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlistClass {
    /// Array creation properties (chunk shape).
    Create,
    /// Array access properties (chunk cache).
    Access,
}

pub trait Storage: Clone + fmt::Debug {
    /// A reference to the child container `name`, created on first use.
    fn group(&self, name: &str) -> anyhow::Result<Self>;

    /// `max_dims[i] == None` makes dimension `i` unlimited.
    fn create_space(&self, dims: &[u64], max_dims: &[Option<u64>]) -> anyhow::Result<SpaceId>;
    fn space_dims(&self, space: SpaceId) -> anyhow::Result<Vec<u64>>;
    fn select_hyperslab(&self, space: SpaceId, start: &[u64], count: &[u64])
        -> anyhow::Result<()>;
    fn close_space(&self, space: SpaceId) -> anyhow::Result<()>;

    fn create_plist(&self, class: PlistClass) -> anyhow::Result<PlistId>;
    fn set_chunk(&self, plist: PlistId, dims: &[u64]) -> anyhow::Result<()>;
    fn set_chunk_cache(&self, plist: PlistId, cache: ChunkCacheConfig) -> anyhow::Result<()>;
    fn close_plist(&self, plist: PlistId) -> anyhow::Result<()>;

    /// `access == None` uses the default chunk cache.
    fn create_array(
        &self,
        name: &str,
        encoding: Encoding,
        space: SpaceId,
        create: PlistId,
        access: Option<PlistId>,
    ) -> anyhow::Result<ArrayId>;
    fn open_array(&self, name: &str) -> anyhow::Result<ArrayId>;
    fn array_encoding(&self, array: ArrayId) -> anyhow::Result<Encoding>;
    /// A new dataspace holding the array's current shape.
    fn array_space(&self, array: ArrayId) -> anyhow::Result<SpaceId>;
    fn set_extent(&self, array: ArrayId, dims: &[u64]) -> anyhow::Result<()>;
    fn write<T: Element>(
        &self,
        array: ArrayId,
        mem: SpaceId,
        file: SpaceId,
        data: &[T],
    ) -> anyhow::Result<()>;
    fn read<T: Element>(
        &self,
        array: ArrayId,
        mem: SpaceId,
        file: SpaceId,
        data: &mut [T],
    ) -> anyhow::Result<()>;
    fn close_array(&self, array: ArrayId) -> anyhow::Result<()>;
}

/// Something obtained from a `Storage` that has to be given back.
pub trait Identity: Copy + fmt::Debug {
    fn release<S: Storage>(self, storage: &S) -> anyhow::Result<()>;
}

impl Identity for SpaceId {
    fn release<S: Storage>(self, storage: &S) -> anyhow::Result<()> {
        storage.close_space(self)
    }
}

impl Identity for PlistId {
    fn release<S: Storage>(self, storage: &S) -> anyhow::Result<()> {
        storage.close_plist(self)
    }
}

impl Identity for ArrayId {
    fn release<S: Storage>(self, storage: &S) -> anyhow::Result<()> {
        storage.close_array(self)
    }
}
