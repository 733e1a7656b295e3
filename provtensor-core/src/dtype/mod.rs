use std::{fmt::Debug, str::FromStr};

#[cfg(feature = "cuda")]
use cudarc::driver::DeviceRepr;

use crate::{cpu_storage::CpuStorage, Error};

mod ops;

pub use ops::DTypeOps;

/// The element representation of an array.
///
/// The set is closed: every `match` over it is exhaustive, so a tag without a
/// kernel cannot exist.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    F32,
    F64,
}

impl DType {
    pub const ALL: [DType; 8] = [
        DType::Bool,
        DType::I8,
        DType::I16,
        DType::I32,
        DType::I64,
        DType::U8,
        DType::F32,
        DType::F64,
    ];

    /// Width of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::U8 => "uint8",
            Self::F32 => "float32",
            Self::F64 => "float64",
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::U8)
    }
}

/// Expand `$body` once per dtype tag with `$t` bound to the matching Rust type.
macro_rules! dispatch_dtype {
    ($dtype:expr, $t:ident => $body:expr) => {
        match $dtype {
            $crate::DType::Bool => {
                type $t = bool;
                $body
            }
            $crate::DType::I8 => {
                type $t = i8;
                $body
            }
            $crate::DType::I16 => {
                type $t = i16;
                $body
            }
            $crate::DType::I32 => {
                type $t = i32;
                $body
            }
            $crate::DType::I64 => {
                type $t = i64;
                $body
            }
            $crate::DType::U8 => {
                type $t = u8;
                $body
            }
            $crate::DType::F32 => {
                type $t = f32;
                $body
            }
            $crate::DType::F64 => {
                type $t = f64;
                $body
            }
        }
    };
}

pub(crate) use dispatch_dtype;

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(Self::Bool),
            "int8" | "i8" => Ok(Self::I8),
            "int16" | "i16" => Ok(Self::I16),
            "int32" | "i32" => Ok(Self::I32),
            "int64" | "i64" => Ok(Self::I64),
            "uint8" | "u8" => Ok(Self::U8),
            "float32" | "f32" => Ok(Self::F32),
            "float64" | "f64" => Ok(Self::F64),
            other => Err(Error::UnsupportedDType(other.to_string()).bt()),
        }
    }
}

#[cfg(feature = "cuda")]
pub trait DeviceReprLike: DeviceRepr {}

#[cfg(not(feature = "cuda"))]
pub trait DeviceReprLike {}

impl DeviceReprLike for bool {}
impl DeviceReprLike for i8 {}
impl DeviceReprLike for i16 {}
impl DeviceReprLike for i32 {}
impl DeviceReprLike for i64 {}
impl DeviceReprLike for u8 {}
impl DeviceReprLike for f32 {}
impl DeviceReprLike for f64 {}

/// Marker trait for Rust types that back one [`DType`] tag.
pub trait WithDType:
    Debug + Clone + DTypeOps + Send + Sync + PartialEq + DeviceReprLike + 'static
{
    const DTYPE: DType;
    const ZERO: Self;
    const ONE: Self;

    /// Decode one element from its native-endian bytes.
    fn from_ne_bytes(bytes: &[u8]) -> Self;

    fn to_cpu_storage_owned(data: Vec<Self>) -> CpuStorage;

    fn cpu_storage_data(storage: &CpuStorage) -> Option<&[Self]>;
}

macro_rules! with_dtype {
    ($rt:ident, $variant:ident, $zero:expr, $one:expr) => {
        impl WithDType for $rt {
            const DTYPE: DType = DType::$variant;
            const ZERO: $rt = $zero;
            const ONE: $rt = $one;

            fn from_ne_bytes(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$rt>()];
                raw.copy_from_slice(bytes);
                $rt::from_ne_bytes(raw)
            }

            fn to_cpu_storage_owned(data: Vec<Self>) -> CpuStorage {
                CpuStorage::$variant(data)
            }

            fn cpu_storage_data(storage: &CpuStorage) -> Option<&[Self]> {
                match storage {
                    CpuStorage::$variant(data) => Some(data),
                    _ => None,
                }
            }
        }
    };
}

with_dtype!(i8, I8, 0i8, 1i8);
with_dtype!(i16, I16, 0i16, 1i16);
with_dtype!(i32, I32, 0i32, 1i32);
with_dtype!(i64, I64, 0i64, 1i64);
with_dtype!(u8, U8, 0u8, 1u8);
with_dtype!(f32, F32, 0f32, 1f32);
with_dtype!(f64, F64, 0f64, 1f64);

impl WithDType for bool {
    const DTYPE: DType = DType::Bool;
    const ZERO: bool = false;
    const ONE: bool = true;

    fn from_ne_bytes(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn to_cpu_storage_owned(data: Vec<Self>) -> CpuStorage {
        CpuStorage::Bool(data)
    }

    fn cpu_storage_data(storage: &CpuStorage) -> Option<&[Self]> {
        match storage {
            CpuStorage::Bool(data) => Some(data),
            _ => None,
        }
    }
}
