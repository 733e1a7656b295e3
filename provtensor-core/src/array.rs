use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    cpu_storage::CpuStorage,
    graph::{ArrayNodeId, BinaryOpType, NodeHandle, OpNode},
    storage::Storage,
    Context, DType, Device, Error, Graph, Result, Shape, WithDType,
};

/// An n-dimensional array with a recorded provenance.
///
/// Cloning an `Array` yields another handle to the same buffer and the same
/// value node. The buffer is released when the last handle drops. Every
/// elementwise operation binds a fresh value node to its output, recording
/// the operation and its operands in the array's [`Graph`].
#[derive(Clone)]
pub struct Array {
    shape: Shape,
    dtype: DType,
    is_contiguous: bool,
    offset: usize,
    storage: Arc<RwLock<Storage>>,
    device: Device,
    node: Arc<NodeHandle>,
    graph: Graph,
}

/// Element count of `shape`, provided a buffer of that many `dtype` elements
/// can be addressed.
fn checked_element_count(shape: &Shape, dtype: DType) -> Result<usize> {
    shape
        .checked_element_count()
        .filter(|count| {
            count
                .checked_mul(dtype.size_in_bytes())
                .is_some_and(|bytes| bytes <= isize::MAX as usize)
        })
        .ok_or_else(|| {
            Error::ShapeTooLarge {
                shape: shape.clone(),
                dtype,
            }
            .bt()
        })
}

impl Array {
    /// Create an array over `data`, viewing the elements that start at `offset`.
    ///
    /// On the CPU `data` becomes the backing buffer as is. On CUDA exactly the
    /// viewed elements are copied into a fresh device allocation and the
    /// resulting offset is zero. The array is bound to a new leaf node.
    pub fn new(
        graph: &Graph,
        shape: impl Into<Shape>,
        data: CpuStorage,
        offset: usize,
        device: &Device,
    ) -> Result<Self> {
        let shape = shape.into();
        let dtype = data.dtype();
        let elem_count = checked_element_count(&shape, dtype)?;
        let required = offset.checked_add(elem_count);
        if required.map_or(true, |required| required > data.len()) {
            return Err(Error::BufferTooSmall {
                required: offset.saturating_add(elem_count),
                available: data.len(),
            }
            .bt());
        }
        let (storage, offset) = device.storage_from_cpu(data, offset, elem_count)?;
        Ok(Self {
            shape,
            dtype,
            is_contiguous: true,
            offset,
            storage: Arc::new(RwLock::new(storage)),
            device: device.clone(),
            node: graph.add_leaf(),
            graph: graph.clone(),
        })
    }

    pub fn from_vec<T: WithDType>(
        graph: &Graph,
        data: Vec<T>,
        shape: impl Into<Shape>,
        device: &Device,
    ) -> Result<Self> {
        Self::new(graph, shape, T::to_cpu_storage_owned(data), 0, device)
    }

    /// Create an array from native-endian bytes holding elements of `dtype`.
    /// `offset` counts elements, not bytes.
    pub fn from_bytes(
        graph: &Graph,
        shape: impl Into<Shape>,
        dtype: DType,
        bytes: &[u8],
        offset: usize,
        device: &Device,
    ) -> Result<Self> {
        let data = CpuStorage::from_bytes(dtype, bytes)?;
        Self::new(graph, shape, data, offset, device)
    }

    /// Create an array filled with `v`.
    pub fn full<T: WithDType>(
        graph: &Graph,
        v: T,
        shape: impl Into<Shape>,
        device: &Device,
    ) -> Result<Self> {
        let shape = shape.into();
        let data = CpuStorage::full(v, checked_element_count(&shape, T::DTYPE)?);
        Self::new(graph, shape, data, 0, device)
    }

    pub fn zeros(
        graph: &Graph,
        shape: impl Into<Shape>,
        dtype: DType,
        device: &Device,
    ) -> Result<Self> {
        let shape = shape.into();
        let data = CpuStorage::zeros(dtype, checked_element_count(&shape, dtype)?);
        Self::new(graph, shape, data, 0, device)
    }

    pub fn ones(
        graph: &Graph,
        shape: impl Into<Shape>,
        dtype: DType,
        device: &Device,
    ) -> Result<Self> {
        let shape = shape.into();
        let data = CpuStorage::ones(dtype, checked_element_count(&shape, dtype)?);
        Self::new(graph, shape, data, 0, device)
    }

    /// Zeros with the shape, dtype, device and graph of `self`.
    pub fn zeros_like(&self) -> Result<Self> {
        Self::zeros(&self.graph, &self.shape, self.dtype, &self.device)
    }

    /// Ones with the shape, dtype, device and graph of `self`.
    pub fn ones_like(&self) -> Result<Self> {
        Self::ones(&self.graph, &self.shape, self.dtype, &self.device)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Always true, strided views are not supported.
    pub fn is_contiguous(&self) -> bool {
        self.is_contiguous
    }

    /// Element offset of this array inside its buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The value node currently bound to this array.
    pub fn node(&self) -> ArrayNodeId {
        self.node.id()
    }

    /// The edge record that produced the current value, `None` for a leaf.
    pub fn producer(&self) -> Option<OpNode> {
        self.graph.producer(self.node())
    }

    pub fn element_count(&self) -> usize {
        self.shape.element_count()
    }

    pub fn total_bytes(&self) -> usize {
        self.element_count() * self.dtype.size_in_bytes()
    }

    /// Whether both arrays are backed by the same buffer.
    pub fn same_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    fn read_storage(&self) -> RwLockReadGuard<'_, Storage> {
        self.storage.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_storage(&self) -> RwLockWriteGuard<'_, Storage> {
        self.storage.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy the viewed elements to the host.
    pub fn to_cpu_storage(&self) -> Result<CpuStorage> {
        let storage = self.read_storage();
        let window = storage
            .to_cpu_storage()?
            .window(self.offset, self.element_count())?;
        Ok(window)
    }

    /// Copy the viewed elements to the host as a flat vector.
    pub fn to_vec<T: WithDType>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(Error::DTypeMismatch {
                op: "to_vec",
                lhs: self.dtype,
                rhs: T::DTYPE,
            }
            .bt());
        }
        let data = self.to_cpu_storage()?;
        let data = data.as_slice::<T>().context("storage dtype")?;
        Ok(data.to_vec())
    }

    /// Render the provenance graph of this array, see
    /// [`debug_dump_computational_graph`](crate::debug_dump_computational_graph).
    pub fn dump_graph(&self) -> Result<String> {
        self.graph.dump_to_string(self.node())
    }

    fn check_operands(&self, rhs: &Self, op: &'static str) -> Result<()> {
        if self.dtype != rhs.dtype {
            return Err(Error::DTypeMismatch {
                op,
                lhs: self.dtype,
                rhs: rhs.dtype,
            }
            .bt());
        }
        if self.shape != rhs.shape {
            return Err(Error::ShapeMismatch {
                op,
                lhs: self.shape.clone(),
                rhs: rhs.shape.clone(),
            }
            .bt());
        }
        if !self.device.same_device(&rhs.device) {
            return Err(Error::DeviceMismatch {
                op,
                lhs: self.device.location(),
                rhs: rhs.device.location(),
            }
            .bt());
        }
        if !self.graph.same_graph(&rhs.graph) {
            return Err(Error::GraphMismatch { op }.bt());
        }
        Ok(())
    }

    /// Run `op` over `self` and `rhs` into a fresh host buffer. Nothing is
    /// written and nothing is recorded.
    fn compute(&self, rhs: &Self, op: BinaryOpType) -> Result<CpuStorage> {
        self.check_operands(rhs, op.name())?;
        let len = self.element_count();
        let lhs_storage = self.read_storage();
        let lhs_data = lhs_storage.to_cpu_storage()?;
        if self.same_storage(rhs) {
            return lhs_data.binary_impl(&lhs_data, self.offset, rhs.offset, len, op);
        }
        let rhs_storage = rhs.read_storage();
        let rhs_data = rhs_storage.to_cpu_storage()?;
        lhs_data.binary_impl(&rhs_data, self.offset, rhs.offset, len, op)
    }

    /// Write a computed result into this array's buffer and bind the array to
    /// a new node produced by `op` over `operands`.
    fn commit(
        &mut self,
        result: &CpuStorage,
        op: BinaryOpType,
        operands: Vec<ArrayNodeId>,
    ) -> Result<()> {
        self.write_storage().write_window(self.offset, result)?;
        self.node = self.graph.add_op(op, operands);
        Ok(())
    }

    fn binary_op(&self, rhs: &Self, op: BinaryOpType) -> Result<Self> {
        let result = self.compute(rhs, op)?;
        let (storage, offset) =
            self.device
                .storage_from_cpu(result, 0, self.element_count())?;
        Ok(Self {
            shape: self.shape.clone(),
            dtype: self.dtype,
            is_contiguous: true,
            offset,
            storage: Arc::new(RwLock::new(storage)),
            device: self.device.clone(),
            node: self.graph.add_op(op, vec![self.node(), rhs.node()]),
            graph: self.graph.clone(),
        })
    }

    fn binary_op_into(&self, rhs: &Self, out: &mut Self, op: BinaryOpType) -> Result<()> {
        // `out` must be able to hold exactly what `self` would produce.
        out.check_operands(self, op.name())?;
        let result = self.compute(rhs, op)?;
        out.commit(&result, op, vec![self.node(), rhs.node()])
    }

    fn binary_op_assign(&mut self, rhs: &Self, op: BinaryOpType) -> Result<&mut Self> {
        let result = self.compute(rhs, op)?;
        let operands = vec![self.node(), rhs.node()];
        self.commit(&result, op, operands)?;
        Ok(self)
    }

    /// Elementwise `self + rhs` into a new array.
    pub fn add(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOpType::Add)
    }

    /// Elementwise `self * rhs` into a new array.
    pub fn mul(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOpType::Mul)
    }

    /// Elementwise `self + rhs` written into `out`, which is bound to a new node.
    pub fn add_into(&self, rhs: &Self, out: &mut Self) -> Result<()> {
        self.binary_op_into(rhs, out, BinaryOpType::Add)
    }

    /// Elementwise `self * rhs` written into `out`, which is bound to a new node.
    pub fn mul_into(&self, rhs: &Self, out: &mut Self) -> Result<()> {
        self.binary_op_into(rhs, out, BinaryOpType::Mul)
    }

    /// `self += rhs`. Other handles sharing the buffer observe the new values
    /// but keep their own node.
    pub fn iadd(&mut self, rhs: &Self) -> Result<&mut Self> {
        self.binary_op_assign(rhs, BinaryOpType::Add)
    }

    /// `self *= rhs`, see [`Array::iadd`].
    pub fn imul(&mut self, rhs: &Self) -> Result<&mut Self> {
        self.binary_op_assign(rhs, BinaryOpType::Mul)
    }
}

impl std::ops::Add<&Array> for &Array {
    type Output = Result<Array>;

    fn add(self, rhs: &Array) -> Self::Output {
        Array::add(self, rhs)
    }
}

impl std::ops::Mul<&Array> for &Array {
    type Output = Result<Array>;

    fn mul(self, rhs: &Array) -> Self::Output {
        Array::mul(self, rhs)
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("shape", &self.shape)
            .field("dtype", &self.dtype)
            .field("device", &self.device)
            .field("offset", &self.offset)
            .field("node", &self.node())
            .finish()
    }
}
