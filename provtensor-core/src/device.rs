#[cfg(feature = "cuda")]
use crate::cuda_backend::CudaDevice;
use crate::{
    cpu_storage::{CpuDevice, CpuStorage},
    storage::{BackendDevice, Storage},
    Error, Result,
};

/// A comparable device tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DeviceLocation {
    Cpu,
    Cuda { ordinal: usize },
}

impl std::fmt::Display for DeviceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda { ordinal } => write!(f, "cuda:{ordinal}"),
        }
    }
}

/// A concrete device.
#[derive(Clone)]
pub enum Device {
    #[cfg(feature = "cuda")]
    Cuda(CudaDevice),
    Cpu,
}

impl Device {
    /// Open the CUDA device `ordinal`.
    ///
    /// Without the `cuda` feature this is always [`Error::UnsupportedDevice`].
    #[cfg(feature = "cuda")]
    pub fn new_cuda(ordinal: usize) -> Result<Self> {
        Ok(Self::Cuda(CudaDevice::new(ordinal)?))
    }

    /// Open the CUDA device `ordinal`.
    ///
    /// Without the `cuda` feature this is always [`Error::UnsupportedDevice`].
    #[cfg(not(feature = "cuda"))]
    pub fn new_cuda(ordinal: usize) -> Result<Self> {
        Err(Error::UnsupportedDevice(format!(
            "cuda:{ordinal} (built without the `cuda` feature)"
        ))
        .bt())
    }

    /// CUDA device 0 when built with CUDA support, otherwise the CPU.
    pub fn best() -> Result<Self> {
        if cfg!(feature = "cuda") {
            Self::new_cuda(0)
        } else {
            Ok(Self::Cpu)
        }
    }

    /// Parse `cpu`, `cuda` or `cuda:N`.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Self::new_cuda(0),
            other => match other.strip_prefix("cuda:").map(str::parse::<usize>) {
                Some(Ok(ordinal)) => Self::new_cuda(ordinal),
                _ => Err(Error::UnsupportedDevice(other.to_string()).bt()),
            },
        }
    }

    pub fn location(&self) -> DeviceLocation {
        match self {
            #[cfg(feature = "cuda")]
            Self::Cuda(cuda) => cuda.location(),
            Self::Cpu => CpuDevice.location(),
        }
    }

    pub fn same_device(&self, other: &Self) -> bool {
        self.location() == other.location()
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self, Self::Cpu)
    }

    /// Run this device's allocator over a host buffer.
    ///
    /// Returns the storage and the element offset of the viewed window in it.
    pub(crate) fn storage_from_cpu(
        &self,
        src: CpuStorage,
        offset: usize,
        elem_count: usize,
    ) -> Result<(Storage, usize)> {
        match self {
            #[cfg(feature = "cuda")]
            Self::Cuda(cuda) => {
                let (storage, offset) = cuda.storage_from_cpu(src, offset, elem_count)?;
                Ok((Storage::Cuda(storage), offset))
            }
            Self::Cpu => {
                let (storage, offset) = CpuDevice.storage_from_cpu(src, offset, elem_count)?;
                Ok((Storage::Cpu(storage), offset))
            }
        }
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.same_device(other)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Device({})", self.location())
    }
}
