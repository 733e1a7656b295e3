/// cudarc related errors
#[derive(thiserror::Error, Debug)]
pub enum CudaError {
    #[error(transparent)]
    Driver(#[from] cudarc::driver::DriverError),

    #[error("window {offset}..{} is out of bounds for a device buffer of {len} elements", offset + count)]
    OutOfBounds {
        offset: usize,
        count: usize,
        len: usize,
    },
}

impl From<CudaError> for crate::Error {
    fn from(val: CudaError) -> Self {
        crate::Error::DeviceAllocation(Box::new(val)).bt()
    }
}

pub trait WrapErr<O> {
    fn w(self) -> std::result::Result<O, crate::Error>;
}

impl<O, E: Into<CudaError>> WrapErr<O> for std::result::Result<O, E> {
    fn w(self) -> std::result::Result<O, crate::Error> {
        self.map_err(|e| e.into().into())
    }
}
