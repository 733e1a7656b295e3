//! Provtensor is the array core of a numerical library: an n-dimensional [`Array`] with
//! device-aware storage, elementwise arithmetic over a closed set of [`DType`]s, and a
//! [`Graph`] recording how every value was derived.
//!
//! Every operation extends the graph: its output is bound to a fresh value node whose
//! producer names the operation and its operands, left before right. Nodes are stored in
//! an arena and addressed by stable ids, so a node can only reference older nodes and the
//! graph is acyclic by construction. History no live array can reach is released with
//! [`Graph::sweep`].
//!
//! ## A quick guide
//! - Create a [`Graph`] and pick a [`Device`].
//! - Build arrays with [`Array::from_vec`], [`Array::full`], [`Array::zeros`] and friends.
//! - Combine them with [`Array::add`] / [`Array::mul`], the in-place [`Array::iadd`] /
//!   [`Array::imul`], or write into an existing array with [`Array::add_into`].
//! - Inspect provenance with [`Array::producer`] or [`debug_dump_computational_graph`].
//!
//! ```
//! use provtensor_core::{Array, Device, Graph};
//!
//! let graph = Graph::empty();
//! let device = Device::Cpu;
//! let a = Array::from_vec(&graph, vec![1i32, 2], [2], &device).unwrap();
//! let b = Array::from_vec(&graph, vec![3i32, 4], [2], &device).unwrap();
//! let c = a.add(&b).unwrap();
//!
//! assert_eq!(c.to_vec::<i32>().unwrap(), vec![4, 6]);
//! let op = c.producer().unwrap();
//! assert_eq!(op.name(), "add");
//! assert_eq!(op.operands(), &[a.node(), b.node()]);
//! assert!(a.producer().is_none());
//! ```

mod array;
mod cpu_storage;
#[cfg(feature = "cuda")]
mod cuda_backend;
mod device;
mod dtype;
mod error;
mod graph;
mod shape;
mod storage;

pub use array::Array;
pub use cpu_storage::CpuStorage;
pub use device::{Device, DeviceLocation};
pub use dtype::{DType, DTypeOps, WithDType};
pub use error::{Context, Error, Result};
pub use graph::{
    debug_dump_computational_graph, ArrayNode, ArrayNodeId, BinaryOpType, Graph, OpNode,
    OpNodeId, Swept,
};
pub use shape::Shape;
