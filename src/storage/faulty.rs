use std::{cell::RefCell, collections::HashSet, rc::Rc};

use anyhow::bail;

use crate::{
    config::ChunkCacheConfig,
    encoding::{Element, Encoding},
};

use super::{ArrayId, PlistClass, PlistId, SpaceId, Storage};

#[derive(Debug, Clone)]
pub enum Event {
    Group(String),
    CreateSpace(Vec<u64>),
    SpaceDims,
    Select(Vec<u64>, Vec<u64>),
    CloseSpace,
    CreatePlist(PlistClass),
    SetChunk(Vec<u64>),
    SetChunkCache(ChunkCacheConfig),
    ClosePlist,
    CreateArray(String, Encoding),
    OpenArray(String),
    ArrayEncoding,
    ArraySpace,
    SetExtent(Vec<u64>),
    Write(usize),
    Read(usize),
    CloseArray,
}

impl Event {
    /// The name faults are injected under.
    pub fn op(&self) -> &'static str {
        match self {
            Event::Group(_) => "group",
            Event::CreateSpace(_) => "create-space",
            Event::SpaceDims => "space-dims",
            Event::Select(..) => "select",
            Event::CloseSpace => "close-space",
            Event::CreatePlist(_) => "create-plist",
            Event::SetChunk(_) => "set-chunk",
            Event::SetChunkCache(_) => "set-chunk-cache",
            Event::ClosePlist => "close-plist",
            Event::CreateArray(..) => "create-array",
            Event::OpenArray(_) => "open-array",
            Event::ArrayEncoding => "array-encoding",
            Event::ArraySpace => "array-space",
            Event::SetExtent(_) => "set-extent",
            Event::Write(_) => "write",
            Event::Read(_) => "read",
            Event::CloseArray => "close-array",
        }
    }

    pub fn write_abbrev<W: std::fmt::Write>(&self, w: &mut W) -> std::fmt::Result {
        match self {
            Event::Group(name) => write!(w, "Group({})", name),
            Event::CreateSpace(dims) => write!(w, "CreateSpace({:?})", dims),
            Event::SpaceDims => write!(w, "SpaceDims"),
            Event::Select(start, count) => write!(w, "Select({:?}, {:?})", start, count),
            Event::CloseSpace => write!(w, "CloseSpace"),
            Event::CreatePlist(class) => write!(w, "CreatePlist({:?})", class),
            Event::SetChunk(dims) => write!(w, "SetChunk({:?})", dims),
            Event::SetChunkCache(c) => {
                write!(w, "SetChunkCache({}, {}, {})", c.nslots, c.nbytes, c.w0)
            }
            Event::ClosePlist => write!(w, "ClosePlist"),
            Event::CreateArray(name, encoding) => write!(w, "CreateArray({}, {})", name, encoding),
            Event::OpenArray(name) => write!(w, "OpenArray({})", name),
            Event::ArrayEncoding => write!(w, "ArrayEncoding"),
            Event::ArraySpace => write!(w, "ArraySpace"),
            Event::SetExtent(dims) => write!(w, "SetExtent({:?})", dims),
            Event::Write(len) => write!(w, "Write({})", len),
            Event::Read(len) => write!(w, "Read({})", len),
            Event::CloseArray => write!(w, "CloseArray"),
        }
    }
}

#[derive(Debug, Default)]
struct Log {
    events: Vec<Event>,
    // Ops whose next call fails.
    pending: HashSet<String>,
}

/// Wraps a `Storage`, recording every call and failing the ones a test
/// asks to fail. Releases are recorded but never fail.
#[derive(Debug, Clone)]
pub struct Faulty<S> {
    inner: S,
    log: Rc<RefCell<Log>>,
}

impl<S: Storage> Faulty<S> {
    pub fn new(inner: S) -> Self {
        Faulty {
            inner,
            log: Rc::new(RefCell::new(Log::default())),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Makes the next call of `op` (as named by `Event::op`) fail.
    pub fn inject(&self, op: &str) {
        assert!(!op.starts_with("close-"), "releases never fail");
        self.log.borrow_mut().pending.insert(op.to_string());
    }

    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut self.log.borrow_mut().events)
    }

    fn perform_op(&self, e: Event) -> anyhow::Result<()> {
        let mut log = self.log.borrow_mut();
        let op = e.op();
        log.events.push(e);
        if log.pending.remove(op) {
            bail!("injected fault in {}", op);
        }
        Ok(())
    }

    fn record(&self, e: Event) {
        self.log.borrow_mut().events.push(e);
    }
}

impl<S: Storage> Storage for Faulty<S> {
    fn group(&self, name: &str) -> anyhow::Result<Self> {
        self.perform_op(Event::Group(name.into()))?;
        Ok(Faulty {
            inner: self.inner.group(name)?,
            log: self.log.clone(),
        })
    }

    fn create_space(&self, dims: &[u64], max_dims: &[Option<u64>]) -> anyhow::Result<SpaceId> {
        self.perform_op(Event::CreateSpace(dims.to_vec()))?;
        self.inner.create_space(dims, max_dims)
    }

    fn space_dims(&self, space: SpaceId) -> anyhow::Result<Vec<u64>> {
        self.perform_op(Event::SpaceDims)?;
        self.inner.space_dims(space)
    }

    fn select_hyperslab(
        &self,
        space: SpaceId,
        start: &[u64],
        count: &[u64],
    ) -> anyhow::Result<()> {
        self.perform_op(Event::Select(start.to_vec(), count.to_vec()))?;
        self.inner.select_hyperslab(space, start, count)
    }

    fn close_space(&self, space: SpaceId) -> anyhow::Result<()> {
        self.record(Event::CloseSpace);
        self.inner.close_space(space)
    }

    fn create_plist(&self, class: PlistClass) -> anyhow::Result<PlistId> {
        self.perform_op(Event::CreatePlist(class))?;
        self.inner.create_plist(class)
    }

    fn set_chunk(&self, plist: PlistId, dims: &[u64]) -> anyhow::Result<()> {
        self.perform_op(Event::SetChunk(dims.to_vec()))?;
        self.inner.set_chunk(plist, dims)
    }

    fn set_chunk_cache(&self, plist: PlistId, cache: ChunkCacheConfig) -> anyhow::Result<()> {
        self.perform_op(Event::SetChunkCache(cache))?;
        self.inner.set_chunk_cache(plist, cache)
    }

    fn close_plist(&self, plist: PlistId) -> anyhow::Result<()> {
        self.record(Event::ClosePlist);
        self.inner.close_plist(plist)
    }

    fn create_array(
        &self,
        name: &str,
        encoding: Encoding,
        space: SpaceId,
        create: PlistId,
        access: Option<PlistId>,
    ) -> anyhow::Result<ArrayId> {
        self.perform_op(Event::CreateArray(name.into(), encoding))?;
        self.inner.create_array(name, encoding, space, create, access)
    }

    fn open_array(&self, name: &str) -> anyhow::Result<ArrayId> {
        self.perform_op(Event::OpenArray(name.into()))?;
        self.inner.open_array(name)
    }

    fn array_encoding(&self, array: ArrayId) -> anyhow::Result<Encoding> {
        self.perform_op(Event::ArrayEncoding)?;
        self.inner.array_encoding(array)
    }

    fn array_space(&self, array: ArrayId) -> anyhow::Result<SpaceId> {
        self.perform_op(Event::ArraySpace)?;
        self.inner.array_space(array)
    }

    fn set_extent(&self, array: ArrayId, dims: &[u64]) -> anyhow::Result<()> {
        self.perform_op(Event::SetExtent(dims.to_vec()))?;
        self.inner.set_extent(array, dims)
    }

    fn write<T: Element>(
        &self,
        array: ArrayId,
        mem: SpaceId,
        file: SpaceId,
        data: &[T],
    ) -> anyhow::Result<()> {
        self.perform_op(Event::Write(data.len()))?;
        self.inner.write(array, mem, file, data)
    }

    fn read<T: Element>(
        &self,
        array: ArrayId,
        mem: SpaceId,
        file: SpaceId,
        data: &mut [T],
    ) -> anyhow::Result<()> {
        self.perform_op(Event::Read(data.len()))?;
        self.inner.read(array, mem, file, data)
    }

    fn close_array(&self, array: ArrayId) -> anyhow::Result<()> {
        self.record(Event::CloseArray);
        self.inner.close_array(array)
    }
}
