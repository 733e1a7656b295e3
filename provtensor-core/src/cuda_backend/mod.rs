use std::{borrow::Cow, sync::Arc};

use cudarc::driver::{CudaContext, CudaSlice, CudaStream};
use error::{CudaError, WrapErr};

use crate::{
    cpu_storage::CpuStorage,
    storage::{BackendDevice, BackendStorage},
    DType, DeviceLocation, Result,
};

pub(crate) mod error;

#[derive(Clone)]
pub struct CudaDevice {
    ordinal: usize,
    stream: Arc<CudaStream>,
}

impl CudaDevice {
    pub(crate) fn new(ordinal: usize) -> Result<Self> {
        let context = CudaContext::new(ordinal).w()?;
        let stream = context.default_stream();
        Ok(Self { ordinal, stream })
    }
}

/// One device allocation per variant, freed when the slice is dropped.
enum CudaSlices {
    Bool(CudaSlice<bool>),
    I8(CudaSlice<i8>),
    I16(CudaSlice<i16>),
    I32(CudaSlice<i32>),
    I64(CudaSlice<i64>),
    U8(CudaSlice<u8>),
    F32(CudaSlice<f32>),
    F64(CudaSlice<f64>),
}

macro_rules! map_slices {
    ($slices:expr, $slice:ident => $body:expr) => {
        match $slices {
            CudaSlices::Bool($slice) => $body,
            CudaSlices::I8($slice) => $body,
            CudaSlices::I16($slice) => $body,
            CudaSlices::I32($slice) => $body,
            CudaSlices::I64($slice) => $body,
            CudaSlices::U8($slice) => $body,
            CudaSlices::F32($slice) => $body,
            CudaSlices::F64($slice) => $body,
        }
    };
}

pub struct CudaStorage {
    slice: CudaSlices,
    device: CudaDevice,
}

impl BackendStorage for CudaStorage {
    fn dtype(&self) -> DType {
        match &self.slice {
            CudaSlices::Bool(_) => DType::Bool,
            CudaSlices::I8(_) => DType::I8,
            CudaSlices::I16(_) => DType::I16,
            CudaSlices::I32(_) => DType::I32,
            CudaSlices::I64(_) => DType::I64,
            CudaSlices::U8(_) => DType::U8,
            CudaSlices::F32(_) => DType::F32,
            CudaSlices::F64(_) => DType::F64,
        }
    }

    fn len(&self) -> usize {
        map_slices!(&self.slice, slice => slice.len())
    }

    fn to_cpu_storage(&self) -> Result<Cow<'_, CpuStorage>> {
        let stream = &self.device.stream;
        let data: CpuStorage =
            map_slices!(&self.slice, slice => stream.memcpy_dtov(slice).w()?.into());
        Ok(Cow::Owned(data))
    }

    fn write_window(&mut self, offset: usize, src: &CpuStorage) -> Result<()> {
        let stream = &self.device.stream;
        let (dst_dtype, src_dtype) = (self.dtype(), src.dtype());
        let count = src.len();
        macro_rules! upload {
            ($dst:expr, $src:expr) => {{
                let len = $dst.len();
                let mut view = $dst
                    .try_slice_mut(offset..offset + count)
                    .ok_or(CudaError::OutOfBounds { offset, count, len })?;
                stream.memcpy_htod($src, &mut view).w()?;
            }};
        }
        match (&mut self.slice, src) {
            (CudaSlices::Bool(dst), CpuStorage::Bool(src)) => upload!(dst, src),
            (CudaSlices::I8(dst), CpuStorage::I8(src)) => upload!(dst, src),
            (CudaSlices::I16(dst), CpuStorage::I16(src)) => upload!(dst, src),
            (CudaSlices::I32(dst), CpuStorage::I32(src)) => upload!(dst, src),
            (CudaSlices::I64(dst), CpuStorage::I64(src)) => upload!(dst, src),
            (CudaSlices::U8(dst), CpuStorage::U8(src)) => upload!(dst, src),
            (CudaSlices::F32(dst), CpuStorage::F32(src)) => upload!(dst, src),
            (CudaSlices::F64(dst), CpuStorage::F64(src)) => upload!(dst, src),
            _ => {
                return Err(crate::Error::DTypeMismatch {
                    op: "write",
                    lhs: dst_dtype,
                    rhs: src_dtype,
                }
                .bt())
            }
        }
        stream.synchronize().w()
    }
}

impl BackendDevice for CudaDevice {
    type Storage = CudaStorage;

    fn location(&self) -> DeviceLocation {
        DeviceLocation::Cuda {
            ordinal: self.ordinal,
        }
    }

    /// Allocate exactly `elem_count` elements on the device and copy the
    /// viewed window into them. The returned offset is always zero.
    fn storage_from_cpu(
        &self,
        src: CpuStorage,
        offset: usize,
        elem_count: usize,
    ) -> Result<(CudaStorage, usize)> {
        let src = src.window(offset, elem_count)?;
        log::debug!(
            "allocating {} bytes of {} on cuda:{}",
            elem_count * src.dtype().size_in_bytes(),
            src.dtype(),
            self.ordinal
        );
        let stream = &self.stream;
        let slice = match &src {
            CpuStorage::Bool(data) => CudaSlices::Bool(stream.memcpy_stod(data).w()?),
            CpuStorage::I8(data) => CudaSlices::I8(stream.memcpy_stod(data).w()?),
            CpuStorage::I16(data) => CudaSlices::I16(stream.memcpy_stod(data).w()?),
            CpuStorage::I32(data) => CudaSlices::I32(stream.memcpy_stod(data).w()?),
            CpuStorage::I64(data) => CudaSlices::I64(stream.memcpy_stod(data).w()?),
            CpuStorage::U8(data) => CudaSlices::U8(stream.memcpy_stod(data).w()?),
            CpuStorage::F32(data) => CudaSlices::F32(stream.memcpy_stod(data).w()?),
            CpuStorage::F64(data) => CudaSlices::F64(stream.memcpy_stod(data).w()?),
        };
        stream.synchronize().w()?;
        Ok((
            CudaStorage {
                slice,
                device: self.clone(),
            },
            0,
        ))
    }
}
