use std::fmt;

use hdf5::types::{IntSize, TypeDescriptor};
use hdf5::H5Type;

/// The closed set of element encodings a dataset can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Signed 64-bit integer ("long").
    I64,
    /// Signed 16-bit integer ("short").
    I16,
}

impl Encoding {
    /// Width in bytes of one element.
    pub fn size(self) -> usize {
        match self {
            Encoding::I64 => 8,
            Encoding::I16 => 2,
        }
    }

    /// The encoding stored under an HDF5 type, if it is one of ours.
    pub(crate) fn from_descriptor(desc: &TypeDescriptor) -> Option<Self> {
        match desc {
            TypeDescriptor::Integer(IntSize::U8) => Some(Encoding::I64),
            TypeDescriptor::Integer(IntSize::U2) => Some(Encoding::I16),
            _ => None,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::I64 => write!(f, "i64"),
            Encoding::I16 => write!(f, "i16"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for i64 {}
    impl Sealed for i16 {}
}

/// A native in-memory type with a matching `Encoding`, transferred to and
/// from storage as its HDF5 counterpart.
pub trait Element: H5Type + Copy + Default + fmt::Debug + sealed::Sealed {
    const ENCODING: Encoding;
}

impl Element for i64 {
    const ENCODING: Encoding = Encoding::I64;
}

impl Element for i16 {
    const ENCODING: Encoding = Encoding::I16;
}
