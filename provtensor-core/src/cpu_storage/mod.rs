use std::borrow::Cow;

use rayon::prelude::*;

use crate::{
    dtype::dispatch_dtype,
    graph::BinaryOpType,
    storage::{BackendDevice, BackendStorage},
    Context, DType, DeviceLocation, Error, Result, WithDType,
};

/// Below this many elements a kernel runs on the calling thread.
const MIN_PAR_LEN: usize = 1 << 14;

pub struct CpuDevice;

#[derive(Clone, Debug, PartialEq)]
pub enum CpuStorage {
    Bool(Vec<bool>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! map_storage {
    ($storage:expr, $data:ident => $body:expr) => {
        match $storage {
            CpuStorage::Bool($data) => $body,
            CpuStorage::I8($data) => $body,
            CpuStorage::I16($data) => $body,
            CpuStorage::I32($data) => $body,
            CpuStorage::I64($data) => $body,
            CpuStorage::U8($data) => $body,
            CpuStorage::F32($data) => $body,
            CpuStorage::F64($data) => $body,
        }
    };
}

/// Apply `op` to `lhs` and `rhs` pairwise, in index order.
fn binary_map<T: WithDType>(lhs: &[T], rhs: &[T], op: BinaryOpType) -> Vec<T> {
    let f = op.as_fn::<T>();
    lhs.par_iter()
        .with_min_len(MIN_PAR_LEN)
        .zip(rhs.par_iter())
        .map(|(l, r)| f(*l, *r))
        .collect()
}

fn window<T>(data: &[T], offset: usize, len: usize) -> Result<&[T]> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .with_context(|| {
            format!(
                "window of {len} elements at {offset} is out of bounds for {} elements",
                data.len()
            )
        })
}

impl CpuStorage {
    pub fn dtype(&self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::I8(_) => DType::I8,
            Self::I16(_) => DType::I16,
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
            Self::U8(_) => DType::U8,
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
        }
    }

    pub fn len(&self) -> usize {
        map_storage!(self, data => data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A buffer of `len` copies of one value.
    pub fn full<T: WithDType>(v: T, len: usize) -> Self {
        T::to_cpu_storage_owned(vec![v; len])
    }

    pub fn zeros(dtype: DType, len: usize) -> Self {
        dispatch_dtype!(dtype, T => Self::full(T::ZERO, len))
    }

    pub fn ones(dtype: DType, len: usize) -> Self {
        dispatch_dtype!(dtype, T => Self::full(T::ONE, len))
    }

    /// Decode a native-endian byte buffer holding elements of `dtype`.
    pub fn from_bytes(dtype: DType, bytes: &[u8]) -> Result<Self> {
        let width = dtype.size_in_bytes();
        if bytes.len() % width != 0 {
            crate::bail!(
                "{} bytes is not a whole number of {dtype} elements",
                bytes.len()
            );
        }
        Ok(dispatch_dtype!(dtype, T => T::to_cpu_storage_owned(
            bytes
                .chunks_exact(width)
                .map(<T as WithDType>::from_ne_bytes)
                .collect()
        )))
    }

    /// Borrow the elements as `T`, `None` if `T` does not match the dtype.
    pub fn as_slice<T: WithDType>(&self) -> Option<&[T]> {
        T::cpu_storage_data(self)
    }

    /// Copy out `len` elements starting at `offset`.
    pub(crate) fn window(&self, offset: usize, len: usize) -> Result<Self> {
        Ok(map_storage!(self, data => window(data, offset, len)?.to_vec().into()))
    }

    /// Apply `op` to the `len`-element windows of `self` and `rhs` that start
    /// at `l_offset` and `r_offset`, producing a fresh buffer.
    pub(crate) fn binary_impl(
        &self,
        rhs: &Self,
        l_offset: usize,
        r_offset: usize,
        len: usize,
        op: BinaryOpType,
    ) -> Result<Self> {
        let (l_dtype, r_dtype) = (self.dtype(), rhs.dtype());
        dispatch_dtype!(l_dtype, T => {
            let lhs = window(T::cpu_storage_data(self).context("lhs dtype")?, l_offset, len)?;
            let rhs = T::cpu_storage_data(rhs).ok_or_else(|| {
                Error::DTypeMismatch {
                    op: op.name(),
                    lhs: l_dtype,
                    rhs: r_dtype,
                }
                .bt()
            })?;
            let rhs = window(rhs, r_offset, len)?;
            Ok(T::to_cpu_storage_owned(binary_map(lhs, rhs, op)))
        })
    }
}

macro_rules! from_vec {
    ($rt:ty, $variant:ident) => {
        impl From<Vec<$rt>> for CpuStorage {
            fn from(data: Vec<$rt>) -> Self {
                Self::$variant(data)
            }
        }
    };
}

from_vec!(bool, Bool);
from_vec!(i8, I8);
from_vec!(i16, I16);
from_vec!(i32, I32);
from_vec!(i64, I64);
from_vec!(u8, U8);
from_vec!(f32, F32);
from_vec!(f64, F64);

fn copy_into<T: Copy>(dst: &mut [T], offset: usize, src: &[T]) -> Result<()> {
    let (len, count) = (dst.len(), src.len());
    offset
        .checked_add(count)
        .and_then(|end| dst.get_mut(offset..end))
        .with_context(|| {
            format!("window of {count} elements at {offset} is out of bounds for {len} elements")
        })?
        .copy_from_slice(src);
    Ok(())
}

impl BackendStorage for CpuStorage {
    fn dtype(&self) -> DType {
        CpuStorage::dtype(self)
    }

    fn len(&self) -> usize {
        CpuStorage::len(self)
    }

    fn to_cpu_storage(&self) -> Result<Cow<'_, CpuStorage>> {
        Ok(Cow::Borrowed(self))
    }

    fn write_window(&mut self, offset: usize, src: &CpuStorage) -> Result<()> {
        let (dst_dtype, src_dtype) = (self.dtype(), src.dtype());
        match (self, src) {
            (Self::Bool(dst), Self::Bool(src)) => copy_into(dst, offset, src),
            (Self::I8(dst), Self::I8(src)) => copy_into(dst, offset, src),
            (Self::I16(dst), Self::I16(src)) => copy_into(dst, offset, src),
            (Self::I32(dst), Self::I32(src)) => copy_into(dst, offset, src),
            (Self::I64(dst), Self::I64(src)) => copy_into(dst, offset, src),
            (Self::U8(dst), Self::U8(src)) => copy_into(dst, offset, src),
            (Self::F32(dst), Self::F32(src)) => copy_into(dst, offset, src),
            (Self::F64(dst), Self::F64(src)) => copy_into(dst, offset, src),
            _ => Err(Error::DTypeMismatch {
                op: "write",
                lhs: dst_dtype,
                rhs: src_dtype,
            }
            .bt()),
        }
    }
}

impl BackendDevice for CpuDevice {
    type Storage = CpuStorage;

    fn location(&self) -> DeviceLocation {
        DeviceLocation::Cpu
    }

    /// The buffer is taken as is, no copy.
    fn storage_from_cpu(
        &self,
        src: CpuStorage,
        offset: usize,
        _elem_count: usize,
    ) -> Result<(CpuStorage, usize)> {
        Ok((src, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::CpuStorage;
    use crate::{graph::BinaryOpType, storage::BackendStorage, DType};

    #[test]
    fn binary_respects_offsets() {
        let lhs = CpuStorage::from(vec![9i32, 1, 2, 3]);
        let rhs = CpuStorage::from(vec![10i32, 20, 30, 0, 0]);
        let out = lhs.binary_impl(&rhs, 1, 0, 3, BinaryOpType::Add).unwrap();
        assert_eq!(out, CpuStorage::from(vec![11i32, 22, 33]));
    }

    #[test]
    fn binary_rejects_mixed_dtypes() {
        let lhs = CpuStorage::from(vec![1i32]);
        let rhs = CpuStorage::from(vec![1f32]);
        assert!(lhs.binary_impl(&rhs, 0, 0, 1, BinaryOpType::Mul).is_err());
    }

    #[test]
    fn write_window_in_place() {
        let mut dst = CpuStorage::zeros(DType::U8, 4);
        dst.write_window(2, &CpuStorage::from(vec![7u8, 8])).unwrap();
        assert_eq!(dst, CpuStorage::from(vec![0u8, 0, 7, 8]));
        assert!(dst.write_window(3, &CpuStorage::from(vec![1u8, 1])).is_err());
    }

    #[test]
    fn decode_bytes() {
        let bytes: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_ne_bytes()).collect();
        let storage = CpuStorage::from_bytes(DType::F32, &bytes).unwrap();
        assert_eq!(storage.as_slice::<f32>(), Some(&[1.5f32, -2.0][..]));
        assert!(CpuStorage::from_bytes(DType::I32, &bytes[..3]).is_err());
    }
}
