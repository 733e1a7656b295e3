use std::borrow::Cow;

#[cfg(feature = "cuda")]
use crate::cuda_backend::CudaStorage;
use crate::{cpu_storage::CpuStorage, DType, DeviceLocation, Error, Result};

/// The backing buffer of one or more arrays.
pub enum Storage {
    #[cfg(feature = "cuda")]
    Cuda(CudaStorage),
    Cpu(CpuStorage),
}

impl Storage {
    pub(crate) fn to_cpu_storage(&self) -> Result<Cow<'_, CpuStorage>> {
        match self {
            Self::Cpu(cpu) => cpu.to_cpu_storage(),
            #[cfg(feature = "cuda")]
            Self::Cuda(cuda) => cuda.to_cpu_storage(),
        }
    }

    /// Overwrite the elements starting at `offset` with `src`. Nothing is
    /// written unless `src` has the buffer's dtype and fits inside it.
    pub(crate) fn write_window(&mut self, offset: usize, src: &CpuStorage) -> Result<()> {
        match self {
            Self::Cpu(cpu) => write_checked(cpu, offset, src),
            #[cfg(feature = "cuda")]
            Self::Cuda(cuda) => write_checked(cuda, offset, src),
        }
    }
}

fn write_checked<S: BackendStorage>(dst: &mut S, offset: usize, src: &CpuStorage) -> Result<()> {
    if dst.dtype() != src.dtype() {
        return Err(Error::DTypeMismatch {
            op: "write",
            lhs: dst.dtype(),
            rhs: src.dtype(),
        }
        .bt());
    }
    let end = offset.checked_add(src.len());
    if end.map_or(true, |end| end > dst.len()) {
        return Err(Error::BufferTooSmall {
            required: offset.saturating_add(src.len()),
            available: dst.len(),
        }
        .bt());
    }
    dst.write_window(offset, src)
}

pub trait BackendStorage {
    fn dtype(&self) -> DType;

    /// Number of elements in the buffer.
    fn len(&self) -> usize;

    fn to_cpu_storage(&self) -> Result<Cow<'_, CpuStorage>>;

    /// Overwrite the elements starting at `offset` with `src`.
    fn write_window(&mut self, offset: usize, src: &CpuStorage) -> Result<()>;
}

/// Turns a host buffer into storage owned by one device.
pub trait BackendDevice {
    type Storage: BackendStorage;

    fn location(&self) -> DeviceLocation;

    /// Take `src` as the backing buffer of an array viewing the
    /// `elem_count` elements that start at `offset`.
    ///
    /// Returns the storage and the offset of that view inside it.
    fn storage_from_cpu(
        &self,
        src: CpuStorage,
        offset: usize,
        elem_count: usize,
    ) -> Result<(Self::Storage, usize)>;
}
