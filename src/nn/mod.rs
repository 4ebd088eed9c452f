//! The layer graph: tensors, layers, nodes and the net that drives them.
//!
//! A [`Net`] owns every tensor in one arena and every node in execution
//! order. Nodes refer to tensors by index, so a layer never owns the buffers
//! it reads and writes. Forward runs nodes in insertion order, backward in
//! reverse.

pub mod activation;
pub mod filler;
pub mod io;
pub mod layers;
pub mod net;
pub mod node;
pub mod ops;
pub mod tensors;

/// Scalar element type of every tensor.
pub type TensorFloat = f32;

pub use self::activation::Activation;
pub use self::filler::Filler;
pub use self::layers::{DeconvParams, Layer, LayerKind};
pub use self::net::{Net, NetConfig, Optimizer};
pub use self::node::Node;
pub use self::tensors::{Shape, Tensor};
