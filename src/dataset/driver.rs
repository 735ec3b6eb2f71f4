use crate::{
    config::CacheSizing,
    encoding::{Element, Encoding},
    error::{Error, Result, Step},
    storage::{ArrayId, PlistClass, Storage},
};

use super::scoped::Scoped;

// Every routine here follows the same discipline: identities obtained along
// the way are scoped to the call and given back before it returns, whether it
// succeeds or not. Only the array identity returned by `create_*`/`open`
// outlives the call.

/// An extensible array of scalars, chunked along its only dimension, with a
/// read cache sized to hold a few chunks.
pub(crate) fn create_1d<S: Storage>(
    parent: &S,
    name: &str,
    encoding: Encoding,
    chunk_len: u64,
    sizing: &CacheSizing,
) -> Result<ArrayId> {
    let space = Scoped::acquire(parent, parent.create_space(&[0], &[None]), "create dataspace")?;
    let create = Scoped::acquire(
        parent,
        parent.create_plist(PlistClass::Create),
        "create creation property list",
    )?;
    parent
        .set_chunk(create.id(), &[chunk_len])
        .step("set chunk shape")?;

    let access = Scoped::acquire(
        parent,
        parent.create_plist(PlistClass::Access),
        "create access property list",
    )?;
    parent
        .set_chunk_cache(access.id(), sizing.for_chunk(chunk_len, encoding.size()))
        .step("set chunk cache")?;

    let array = Scoped::acquire(
        parent,
        parent.create_array(name, encoding, space.id(), create.id(), Some(access.id())),
        "create array",
    )?;
    space.close("close dataspace")?;
    create.close("close creation property list")?;
    access.close("close access property list")?;
    Ok(array.into_inner())
}

/// An extensible array of `rows x cols` blocks, one block per chunk row.
/// The chunk cache is left at the backend default.
pub(crate) fn create_3d<S: Storage>(
    parent: &S,
    name: &str,
    encoding: Encoding,
    rows: u64,
    cols: u64,
    chunk_len: u64,
) -> Result<ArrayId> {
    let space = Scoped::acquire(
        parent,
        parent.create_space(&[0, rows, cols], &[None, Some(rows), Some(cols)]),
        "create dataspace",
    )?;
    let create = Scoped::acquire(
        parent,
        parent.create_plist(PlistClass::Create),
        "create creation property list",
    )?;
    parent
        .set_chunk(create.id(), &[chunk_len, rows, cols])
        .step("set chunk shape")?;

    let array = Scoped::acquire(
        parent,
        parent.create_array(name, encoding, space.id(), create.id(), None),
        "create array",
    )?;
    space.close("close dataspace")?;
    create.close("close creation property list")?;
    Ok(array.into_inner())
}

/// Binds to an existing array and reads back its encoding and shape.
pub(crate) fn open<S: Storage>(parent: &S, name: &str) -> Result<(ArrayId, Encoding, Vec<u64>)> {
    let array = Scoped::acquire(parent, parent.open_array(name), "open array")?;
    let encoding = parent
        .array_encoding(array.id())
        .step("read element encoding")?;
    let space = Scoped::acquire(parent, parent.array_space(array.id()), "get dataspace")?;
    let dims = parent.space_dims(space.id()).step("read dataspace dims")?;
    space.close("close dataspace")?;

    if dims.len() != 1 && dims.len() != 3 {
        return Err(Error::shape(format!(
            "{} has rank {}, only 1-D and 3-D datasets are supported",
            name,
            dims.len()
        )));
    }
    Ok((array.into_inner(), encoding, dims))
}

/// Grows a 1-D array by `count` and writes `count` scalars at the old extent.
pub(crate) fn append_many_1d<S: Storage, T: Element>(
    storage: &S,
    id: ArrayId,
    dims: &mut Vec<u64>,
    count: u64,
    data: &[T],
) -> Result<u64> {
    append_region(storage, id, dims, count, data)
}

/// Grows a 3-D array by one and writes a single block at the old extent.
pub(crate) fn append_block_3d<S: Storage, T: Element>(
    storage: &S,
    id: ArrayId,
    dims: &mut Vec<u64>,
    data: &[T],
) -> Result<u64> {
    append_region(storage, id, dims, 1, data)
}

/// Grows dimension 0 by `count`, then writes `data` into the new rows.
///
/// `dims` tracks the backend: once the extent change succeeds it holds the
/// grown shape, even if the write that follows fails.
pub(crate) fn append_region<S: Storage, T: Element>(
    storage: &S,
    id: ArrayId,
    dims: &mut Vec<u64>,
    count: u64,
    data: &[T],
) -> Result<u64> {
    let start = dims[0];
    let mut grown = dims.clone();
    grown[0] = start + count;
    storage.set_extent(id, &grown).step("set extent")?;
    *dims = grown;

    let (offset, span) = rows(dims, start, count);
    let file = Scoped::acquire(storage, storage.array_space(id), "get dataspace")?;
    storage
        .select_hyperslab(file.id(), &offset, &span)
        .step("select appended rows")?;
    let mem = Scoped::acquire(
        storage,
        storage.create_space(&span, &fixed(&span)),
        "create memory dataspace",
    )?;
    storage
        .write(id, mem.id(), file.id(), data)
        .step("write appended rows")?;
    file.close("close file dataspace")?;
    mem.close("close memory dataspace")?;
    Ok(start)
}

/// Reads rows `[start, start + count)` into `data`.
pub(crate) fn read_region<S: Storage, T: Element>(
    storage: &S,
    id: ArrayId,
    dims: &[u64],
    start: u64,
    count: u64,
    data: &mut [T],
) -> Result<()> {
    let (offset, span) = rows(dims, start, count);
    let file = Scoped::acquire(storage, storage.array_space(id), "get dataspace")?;
    storage
        .select_hyperslab(file.id(), &offset, &span)
        .step("select rows to read")?;
    let mem = Scoped::acquire(
        storage,
        storage.create_space(&span, &fixed(&span)),
        "create memory dataspace",
    )?;
    storage
        .read(id, mem.id(), file.id(), data)
        .step("read rows")?;
    file.close("close file dataspace")?;
    mem.close("close memory dataspace")?;
    Ok(())
}

/// Offset and count of `count` rows from `start`, spanning every fixed dimension.
fn rows(dims: &[u64], start: u64, count: u64) -> (Vec<u64>, Vec<u64>) {
    let mut offset = vec![0; dims.len()];
    offset[0] = start;
    let mut span = dims.to_vec();
    span[0] = count;
    (offset, span)
}

fn fixed(dims: &[u64]) -> Vec<Option<u64>> {
    dims.iter().map(|d| Some(*d)).collect()
}
