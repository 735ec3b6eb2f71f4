use tracing::debug;

use crate::{
    config::CacheSizing,
    encoding::{Element, Encoding},
    error::{Error, Result, Step},
    storage::{ArrayId, Storage},
};

mod driver;
mod scoped;


// A dataset is one named, typed, growable array. Dimension 0 is the number of
// elements appended so far; for block datasets, dimensions 1 and 2 are the
// fixed rows and columns of every element.
//
// The handle caches the array's shape so that appends don't have to ask the
// backend where the end is. That cache is only authoritative for the handle
// that did the appending: two handles open on the same array will disagree
// after either one appends.

/// A handle to one open dataset.
///
/// Clones share the backend identity, so closing any one of them closes it
/// for all.
#[derive(Debug, Clone)]
pub struct Dataset<S: Storage> {
    storage: S,
    id: ArrayId,
    encoding: Encoding,
    dims: Vec<u64>,
}

impl<S: Storage> Dataset<S> {
    /// Creates an empty dataset named `name` under `parent`.
    ///
    /// `chunk_shape` is `[chunk_len]` for a dataset of scalars, or
    /// `[chunk_len, rows, cols]` for a dataset of `rows x cols` blocks.
    pub fn create(
        parent: &S,
        name: &str,
        encoding: Encoding,
        chunk_shape: &[u64],
    ) -> Result<Self> {
        Self::create_with(parent, name, encoding, chunk_shape, &CacheSizing::default())
    }

    /// Like `create`, with an explicit read-cache sizing for scalar datasets.
    pub fn create_with(
        parent: &S,
        name: &str,
        encoding: Encoding,
        chunk_shape: &[u64],
        sizing: &CacheSizing,
    ) -> Result<Self> {
        let id = match chunk_shape {
            &[chunk_len] => driver::create_1d(parent, name, encoding, chunk_len, sizing)?,
            &[chunk_len, rows, cols] => {
                driver::create_3d(parent, name, encoding, rows, cols, chunk_len)?
            }
            _ => {
                return Err(Error::shape(format!(
                    "chunk shape {:?} is neither [len] nor [len, rows, cols]",
                    chunk_shape
                )))
            }
        };
        let mut dims = chunk_shape.to_vec();
        dims[0] = 0;
        debug!(name, %encoding, ?chunk_shape, "created dataset");
        Ok(Dataset {
            storage: parent.clone(),
            id,
            encoding,
            dims,
        })
    }

    /// Opens an existing dataset, reading its encoding and shape from storage.
    pub fn open(parent: &S, name: &str) -> Result<Self> {
        let (id, encoding, dims) = driver::open(parent, name)?;
        debug!(name, %encoding, ?dims, "opened dataset");
        Ok(Dataset {
            storage: parent.clone(),
            id,
            encoding,
            dims,
        })
    }

    pub fn id(&self) -> ArrayId {
        self.id
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    /// Number of elements appended so far.
    pub fn extent(&self) -> u64 {
        self.dims[0]
    }

    /// The fixed shape of one element: empty for scalars, `[rows, cols]` for blocks.
    pub fn element_shape(&self) -> &[u64] {
        &self.dims[1..]
    }

    fn values_per_element(&self) -> u64 {
        self.element_shape().iter().product()
    }

    fn check_encoding(&self, encoding: Encoding) -> Result<()> {
        if encoding != self.encoding {
            return Err(Error::shape(format!(
                "dataset holds {} elements, not {}",
                self.encoding, encoding
            )));
        }
        Ok(())
    }

    fn check_append(
        &self,
        encoding: Encoding,
        count: u64,
        data_len: usize,
        element_shape: &[u64],
    ) -> Result<()> {
        self.check_encoding(encoding)?;
        if element_shape != self.element_shape() {
            return Err(Error::shape(format!(
                "element shape {:?} does not match the dataset's {:?}",
                element_shape,
                self.element_shape()
            )));
        }
        if self.extent().checked_add(count).is_none() {
            return Err(Error::shape(format!(
                "appending {} elements overflows extent {}",
                count,
                self.extent()
            )));
        }
        let per = self.values_per_element();
        if count.checked_mul(per) != Some(data_len as u64) {
            return Err(Error::shape(format!(
                "{} values supplied for {} elements of {} values each",
                data_len, count, per
            )));
        }
        Ok(())
    }

    /// Checks a read of `count` elements from `start`, returning how many
    /// values the destination has to hold.
    fn check_read(&self, encoding: Encoding, start: u64, count: u64) -> Result<usize> {
        self.check_encoding(encoding)?;
        match start.checked_add(count) {
            Some(end) if end <= self.extent() => Ok((count * self.values_per_element()) as usize),
            _ => Err(Error::OutOfRange {
                start,
                count,
                extent: self.extent(),
            }),
        }
    }

    /// Appends `count` elements taken from `data` and returns the index the
    /// first of them landed at.
    ///
    /// `data` holds exactly `count` elements' worth of values, row-major for
    /// block datasets. Nothing is written if it doesn't.
    ///
    /// If the backend fails after the extent has grown, the extent stays
    /// grown (here and in storage) and the new elements are left unwritten.
    /// Nothing is rolled back.
    pub fn append<T: Element>(&mut self, count: u64, data: &[T]) -> Result<u64> {
        let shape = self.element_shape().to_vec();
        self.check_append(T::ENCODING, count, data.len(), &shape)?;
        let start = if self.dims.len() == 1 {
            driver::append_many_1d(&self.storage, self.id, &mut self.dims, count, data)?
        } else {
            driver::append_region(&self.storage, self.id, &mut self.dims, count, data)?
        };
        debug!(id = %self.id, start, count, extent = self.extent(), "appended");
        Ok(start)
    }

    /// Appends a single value to a scalar dataset.
    pub fn append_one<T: Element>(&mut self, value: T) -> Result<u64> {
        self.check_append(T::ENCODING, 1, 1, &[])?;
        let start = driver::append_many_1d(&self.storage, self.id, &mut self.dims, 1, &[value])?;
        debug!(id = %self.id, start, "appended value");
        Ok(start)
    }

    /// Appends one `rows x cols` block to a block dataset. The declared shape
    /// must be the dataset's.
    pub fn append_block<T: Element>(&mut self, rows: u64, cols: u64, data: &[T]) -> Result<u64> {
        self.check_append(T::ENCODING, 1, data.len(), &[rows, cols])?;
        let start = driver::append_block_3d(&self.storage, self.id, &mut self.dims, data)?;
        debug!(id = %self.id, start, "appended block");
        Ok(start)
    }

    /// Reads elements `[start, start + count)` into `data`, which must be
    /// exactly that size. Validation failures leave `data` untouched.
    pub fn read<T: Element>(&self, start: u64, count: u64, data: &mut [T]) -> Result<()> {
        let len = self.check_read(T::ENCODING, start, count)?;
        if data.len() != len {
            return Err(Error::shape(format!(
                "buffer of {} values for a read of {}",
                data.len(),
                len
            )));
        }
        driver::read_region(&self.storage, self.id, &self.dims, start, count, data)?;
        debug!(id = %self.id, start, count, "read");
        Ok(())
    }

    pub fn read_vec<T: Element>(&self, start: u64, count: u64) -> Result<Vec<T>> {
        let len = self.check_read(T::ENCODING, start, count)?;
        let mut out = vec![T::default(); len];
        self.read(start, count, &mut out)?;
        Ok(out)
    }

    /// Releases the dataset's backend identity.
    pub fn close(self) -> Result<()> {
        debug!(id = %self.id, extent = self.extent(), "closing dataset");
        self.storage.close_array(self.id).step("close dataset")
    }
}
