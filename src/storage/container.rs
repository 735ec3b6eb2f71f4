use std::{cell::RefCell, collections::HashMap, ops::Range, path::Path, rc::Rc};

use anyhow::{anyhow, bail};
use hdf5::{plist::DatasetAccess, Extent, H5Type, SimpleExtents};
use ndarray::{s, ArrayD, ArrayView, IxDyn};
use tracing::debug;

use crate::{
    config::ChunkCacheConfig,
    encoding::{Element, Encoding},
};

use super::{
    space::{Dataspace, Hyperslab},
    ArrayId, PlistClass, PlistId, SpaceId, Storage,
};

// HDF5 keeps chunk dimensions and chunk byte sizes in 32 bits.
const MAX_CHUNK_ELEMENTS: u64 = u32::MAX as u64;
const MAX_CHUNK_BYTES: u64 = u32::MAX as u64;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OpenHandles {
    pub arrays: usize,
    pub spaces: usize,
    pub plists: usize,
}

#[derive(Debug)]
enum Plist {
    Create { chunk: Option<Vec<u64>> },
    Access { cache: Option<ChunkCacheConfig> },
}

#[derive(Debug)]
struct OpenArray {
    dataset: hdf5::Dataset,
    name: String,
    encoding: Encoding,
    max_dims: Vec<Option<u64>>,
    cache: ChunkCacheConfig,
}

impl OpenArray {
    fn dims(&self) -> Vec<u64> {
        self.dataset.shape().iter().map(|d| *d as u64).collect()
    }

    /// The selection a transfer targets, checked against the array's current shape.
    fn target(&self, file: &Dataspace) -> anyhow::Result<Hyperslab> {
        let dims = self.dims();
        if file.rank() != dims.len() {
            bail!(
                "rank {} dataspace used with rank {} array {}",
                file.rank(),
                dims.len(),
                self.name
            );
        }
        let slab = file.selection();
        for ((s, c), d) in slab.start.iter().zip(&slab.count).zip(&dims) {
            if s + c > *d {
                bail!("selection reaches past the extent of {}", self.name);
            }
        }
        Ok(slab)
    }
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    spaces: HashMap<u64, Dataspace>,
    plists: HashMap<u64, Plist>,
    arrays: HashMap<u64, OpenArray>,
}

impl State {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn space(&self, space: SpaceId) -> anyhow::Result<&Dataspace> {
        self.spaces
            .get(&space.0)
            .ok_or_else(|| anyhow!("no open dataspace {:?}", space))
    }

    fn plist(&mut self, plist: PlistId) -> anyhow::Result<&mut Plist> {
        self.plists
            .get_mut(&plist.0)
            .ok_or_else(|| anyhow!("no open property list {:?}", plist))
    }

    fn array(&self, array: ArrayId) -> anyhow::Result<&OpenArray> {
        self.arrays
            .get(&array.0)
            .ok_or_else(|| anyhow!("no open array {:?}", array))
    }

    /// Checks a transfer's memory and file sides against each other, the
    /// array's encoding and the buffer, returning the file-side selection.
    fn transfer(
        &self,
        array: ArrayId,
        mem: SpaceId,
        file: SpaceId,
        encoding: Encoding,
        len: usize,
    ) -> anyhow::Result<Hyperslab> {
        let mem_len = self.space(mem)?.selection().len();
        let arr = self.array(array)?;
        if encoding != arr.encoding {
            bail!("{} elements transferred to {} array {}", encoding, arr.encoding, arr.name);
        }
        let slab = arr.target(self.space(file)?)?;
        if slab.len() != mem_len {
            bail!(
                "memory selects {} elements but the file selection has {}",
                mem_len,
                slab.len()
            );
        }
        if len as u64 != slab.len() {
            bail!("buffer holds {} elements, transfer needs {}", len, slab.len());
        }
        Ok(slab)
    }
}

fn check_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        bail!("invalid name {:?}", name);
    }
    Ok(())
}

fn to_usize(v: u64) -> anyhow::Result<usize> {
    Ok(usize::try_from(v)?)
}

fn ranges(slab: &Hyperslab) -> anyhow::Result<Vec<Range<usize>>> {
    slab.start
        .iter()
        .zip(&slab.count)
        .map(|(s, c)| Ok(to_usize(*s)?..to_usize(s + c)?))
        .collect()
}

/// A hierarchical container of chunked arrays kept in an HDF5 file.
///
/// Clones and groups share one table of open identities, and keep the file
/// open for as long as any of them lives.
#[derive(Debug, Clone)]
pub struct Container {
    state: Rc<RefCell<State>>,
    file: Rc<hdf5::File>,
    group: hdf5::Group,
    path: String,
}

impl Container {
    /// Creates a new HDF5 file at `path`, replacing any file already there.
    pub fn create<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self::new(hdf5::File::create(path)?))
    }

    /// Opens an existing HDF5 file for reading and appending.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self::new(hdf5::File::open_rw(path)?))
    }

    fn new(file: hdf5::File) -> Self {
        let group = (*file).clone();
        Container {
            state: Rc::new(RefCell::new(State::default())),
            file: Rc::new(file),
            group,
            path: String::new(),
        }
    }

    pub fn open_handles(&self) -> OpenHandles {
        let state = self.state.borrow();
        OpenHandles {
            arrays: state.arrays.len(),
            spaces: state.spaces.len(),
            plists: state.plists.len(),
        }
    }

    /// The chunk cache an open array was bound with.
    pub fn cache_config(&self, array: ArrayId) -> Option<ChunkCacheConfig> {
        self.state.borrow().arrays.get(&array.0).map(|a| a.cache)
    }

    fn full_name(&self, name: &str) -> String {
        format!("{}/{}", self.path, name)
    }

    fn build<T: H5Type>(
        &self,
        name: &str,
        space: &Dataspace,
        chunk: &[u64],
        cache: ChunkCacheConfig,
    ) -> anyhow::Result<hdf5::Dataset> {
        let extents = space
            .dims()
            .iter()
            .zip(space.max_dims())
            .map(|(d, m)| Ok(Extent::new(to_usize(*d)?, m.map(to_usize).transpose()?)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let chunk = chunk
            .iter()
            .map(|c| to_usize(*c))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let dapl = DatasetAccess::build()
            .chunk_cache(cache.nslots, to_usize(cache.nbytes)?, cache.w0)
            .finish()?;
        Ok(self
            .group
            .new_dataset::<T>()
            .chunk(chunk)
            .shape(SimpleExtents::new(extents))
            .set_access_plist(&dapl)
            .create(name)?)
    }
}

impl Storage for Container {
    fn group(&self, name: &str) -> anyhow::Result<Self> {
        check_name(name)?;
        let group = if self.group.link_exists(name) {
            self.group.group(name)?
        } else {
            self.group.create_group(name)?
        };
        Ok(Container {
            state: self.state.clone(),
            file: self.file.clone(),
            group,
            path: self.full_name(name),
        })
    }

    fn create_space(&self, dims: &[u64], max_dims: &[Option<u64>]) -> anyhow::Result<SpaceId> {
        let space = Dataspace::new(dims, max_dims)?;
        let mut state = self.state.borrow_mut();
        let id = state.id();
        state.spaces.insert(id, space);
        Ok(SpaceId(id))
    }

    fn space_dims(&self, space: SpaceId) -> anyhow::Result<Vec<u64>> {
        Ok(self.state.borrow().space(space)?.dims().to_vec())
    }

    fn select_hyperslab(
        &self,
        space: SpaceId,
        start: &[u64],
        count: &[u64],
    ) -> anyhow::Result<()> {
        self.state
            .borrow_mut()
            .spaces
            .get_mut(&space.0)
            .ok_or_else(|| anyhow!("no open dataspace {:?}", space))?
            .select(start, count)
    }

    fn close_space(&self, space: SpaceId) -> anyhow::Result<()> {
        match self.state.borrow_mut().spaces.remove(&space.0) {
            Some(_) => Ok(()),
            None => bail!("no open dataspace {:?}", space),
        }
    }

    fn create_plist(&self, class: PlistClass) -> anyhow::Result<PlistId> {
        let plist = match class {
            PlistClass::Create => Plist::Create { chunk: None },
            PlistClass::Access => Plist::Access { cache: None },
        };
        let mut state = self.state.borrow_mut();
        let id = state.id();
        state.plists.insert(id, plist);
        Ok(PlistId(id))
    }

    fn set_chunk(&self, plist: PlistId, dims: &[u64]) -> anyhow::Result<()> {
        if dims.is_empty() || dims.contains(&0) {
            bail!("invalid chunk shape {:?}", dims);
        }
        match dims.iter().try_fold(1_u64, |acc, d| acc.checked_mul(*d)) {
            Some(n) if n <= MAX_CHUNK_ELEMENTS => {}
            _ => bail!("chunk shape {:?} exceeds {} elements", dims, MAX_CHUNK_ELEMENTS),
        }
        match self.state.borrow_mut().plist(plist)? {
            Plist::Create { chunk } => {
                *chunk = Some(dims.to_vec());
                Ok(())
            }
            Plist::Access { .. } => bail!("chunk shape set on an access property list"),
        }
    }

    fn set_chunk_cache(&self, plist: PlistId, config: ChunkCacheConfig) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&config.w0) {
            bail!("chunk cache w0 {} outside [0, 1]", config.w0);
        }
        match self.state.borrow_mut().plist(plist)? {
            Plist::Access { cache } => {
                *cache = Some(config);
                Ok(())
            }
            Plist::Create { .. } => bail!("chunk cache set on a creation property list"),
        }
    }

    fn close_plist(&self, plist: PlistId) -> anyhow::Result<()> {
        match self.state.borrow_mut().plists.remove(&plist.0) {
            Some(_) => Ok(()),
            None => bail!("no open property list {:?}", plist),
        }
    }

    fn create_array(
        &self,
        name: &str,
        encoding: Encoding,
        space: SpaceId,
        create: PlistId,
        access: Option<PlistId>,
    ) -> anyhow::Result<ArrayId> {
        check_name(name)?;
        let mut state = self.state.borrow_mut();

        let space = state.space(space)?.clone();
        let chunk = match state.plist(create)? {
            Plist::Create { chunk: Some(chunk) } => chunk.clone(),
            Plist::Create { chunk: None } => bail!("extensible arrays need a chunk shape"),
            Plist::Access { .. } => bail!("expected a creation property list"),
        };
        if chunk.len() != space.rank() {
            bail!(
                "rank {} chunk for a rank {} array",
                chunk.len(),
                space.rank()
            );
        }
        let chunk_bytes = chunk
            .iter()
            .try_fold(encoding.size() as u64, |acc, d| acc.checked_mul(*d));
        match chunk_bytes {
            Some(n) if n <= MAX_CHUNK_BYTES => {}
            _ => bail!("{} chunk of shape {:?} exceeds 4 GiB", encoding, chunk),
        }
        let cache = match access {
            Some(access) => match state.plist(access)? {
                Plist::Access { cache } => cache.unwrap_or_default(),
                Plist::Create { .. } => bail!("expected an access property list"),
            },
            None => ChunkCacheConfig::default(),
        };

        if self.group.link_exists(name) {
            bail!("array {} already exists", self.full_name(name));
        }
        let dataset = match encoding {
            Encoding::I64 => self.build::<i64>(name, &space, &chunk, cache)?,
            Encoding::I16 => self.build::<i16>(name, &space, &chunk, cache)?,
        };

        let id = state.id();
        debug!(name = %self.full_name(name), %space, ?chunk, ?cache, "created array");
        state.arrays.insert(
            id,
            OpenArray {
                dataset,
                name: self.full_name(name),
                encoding,
                max_dims: space.max_dims().to_vec(),
                cache,
            },
        );
        Ok(ArrayId(id))
    }

    fn open_array(&self, name: &str) -> anyhow::Result<ArrayId> {
        check_name(name)?;
        if !self.group.link_exists(name) {
            bail!("no array named {}", self.full_name(name));
        }
        let dataset = self.group.dataset(name)?;
        let desc = dataset.dtype()?.to_descriptor()?;
        let encoding = Encoding::from_descriptor(&desc)
            .ok_or_else(|| anyhow!("{} holds {:?} elements", self.full_name(name), desc))?;
        let dims: Vec<u64> = dataset.shape().iter().map(|d| *d as u64).collect();
        // Arrays are opened as extensible along dimension 0 only; HDF5 itself
        // still enforces whatever maximum the file records.
        let max_dims = dims
            .iter()
            .enumerate()
            .map(|(i, d)| if i == 0 { None } else { Some(*d) })
            .collect();

        let mut state = self.state.borrow_mut();
        let id = state.id();
        debug!(name = %self.full_name(name), ?dims, %encoding, "opened array");
        state.arrays.insert(
            id,
            OpenArray {
                dataset,
                name: self.full_name(name),
                encoding,
                max_dims,
                cache: ChunkCacheConfig::default(),
            },
        );
        Ok(ArrayId(id))
    }

    fn array_encoding(&self, array: ArrayId) -> anyhow::Result<Encoding> {
        Ok(self.state.borrow().array(array)?.encoding)
    }

    fn array_space(&self, array: ArrayId) -> anyhow::Result<SpaceId> {
        let mut state = self.state.borrow_mut();
        let arr = state.array(array)?;
        let space = Dataspace::new(&arr.dims(), &arr.max_dims)?;
        let id = state.id();
        state.spaces.insert(id, space);
        Ok(SpaceId(id))
    }

    fn set_extent(&self, array: ArrayId, dims: &[u64]) -> anyhow::Result<()> {
        let state = self.state.borrow();
        let arr = state.array(array)?;
        let old = arr.dims();
        if dims.len() != old.len() {
            bail!("cannot change the rank of {}", arr.name);
        }
        for ((new, old), max) in dims.iter().zip(&old).zip(&arr.max_dims) {
            if new < old {
                bail!("shrinking {} is not supported", arr.name);
            }
            if let Some(max) = max {
                if new > max {
                    bail!("dimension {} of {} exceeds its maximum {}", new, arr.name, max);
                }
            }
        }
        let dims = dims
            .iter()
            .map(|d| to_usize(*d))
            .collect::<anyhow::Result<Vec<_>>>()?;
        arr.dataset.resize(dims)?;
        Ok(())
    }

    fn write<T: Element>(
        &self,
        array: ArrayId,
        mem: SpaceId,
        file: SpaceId,
        data: &[T],
    ) -> anyhow::Result<()> {
        let state = self.state.borrow();
        let slab = state.transfer(array, mem, file, T::ENCODING, data.len())?;
        if slab.is_empty() {
            return Ok(());
        }
        let arr = state.array(array)?;
        let shape = slab
            .count
            .iter()
            .map(|c| to_usize(*c))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let view = ArrayView::from_shape(IxDyn(&shape), data)?;
        match ranges(&slab)?.as_slice() {
            [a] => arr.dataset.write_slice(view, s![a.clone()])?,
            [a, b] => arr.dataset.write_slice(view, s![a.clone(), b.clone()])?,
            [a, b, c] => arr
                .dataset
                .write_slice(view, s![a.clone(), b.clone(), c.clone()])?,
            other => bail!("rank {} transfers are not supported", other.len()),
        }
        Ok(())
    }

    fn read<T: Element>(
        &self,
        array: ArrayId,
        mem: SpaceId,
        file: SpaceId,
        data: &mut [T],
    ) -> anyhow::Result<()> {
        let state = self.state.borrow();
        let slab = state.transfer(array, mem, file, T::ENCODING, data.len())?;
        if slab.is_empty() {
            return Ok(());
        }
        let arr = state.array(array)?;
        let out: ArrayD<T> = match ranges(&slab)?.as_slice() {
            [a] => arr.dataset.read_slice(s![a.clone()])?,
            [a, b] => arr.dataset.read_slice(s![a.clone(), b.clone()])?,
            [a, b, c] => arr.dataset.read_slice(s![a.clone(), b.clone(), c.clone()])?,
            other => bail!("rank {} transfers are not supported", other.len()),
        };
        if out.len() != data.len() {
            bail!("read {} elements, expected {}", out.len(), data.len());
        }
        for (d, v) in data.iter_mut().zip(out.iter()) {
            *d = *v;
        }
        Ok(())
    }

    fn close_array(&self, array: ArrayId) -> anyhow::Result<()> {
        match self.state.borrow_mut().arrays.remove(&array.0) {
            Some(arr) => {
                debug!(name = %arr.name, "closed array");
                Ok(())
            }
            None => bail!("no open array {:?}", array),
        }
    }
}
