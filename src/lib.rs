//! # `deconvnet`
//!
//! A small layer-graph neural network engine. Nets are built incrementally out
//! of named 4-D tensors and nodes, executed forward in insertion order and
//! backward in reverse, with hand-derived gradients per layer.
//!
//! The centerpiece is the transposed convolution ("deconvolution") layer, which
//! expresses its forward pass as a GEMM followed by a `col2im` scatter, and its
//! backward pass as an `im2col` gather followed by two GEMMs.
//!
//! ## Features
//!
//! - **Tensors**: `n x c x h x w` buffers with optional gradients and optimizer moments
//! - **Layers**: deconvolution and standalone activation layers behind one trait
//! - **Kernels**: Rayon-parallel CPU GEMM, `im2col`/`col2im`, bias and activations
//! - **GPU Acceleration**: optional `wgpu` compute shaders mirroring every CPU kernel
//! - **Data**: MNIST, packed dataset, list file and CSV ingestion
//! - **Persistence**: checksummed save/load of all parameter tensors
//!
//! ## Example
//!
//! ```rust
//! use deconvnet::nn::{Activation, DeconvParams, Filler, Net, NetConfig, Shape};
//!
//! let mut net = Net::new(NetConfig::default());
//! net.set_input_shape(Shape::new(1, 3, 8, 8)).unwrap();
//! net.add_deconvolutional_layer(
//!     DeconvParams::new(4, 3, 2, 1, Filler::Xavier, Activation::Relu),
//!     "input",
//!     "up1",
//! )
//! .unwrap();
//!
//! let out = net.predict(&[0.5; 3 * 8 * 8]).unwrap();
//! assert_eq!(out.len(), 4 * 15 * 15);
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::many_single_char_names,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::too_many_arguments,
    clippy::module_name_repetitions
)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod data;
pub mod error;
pub mod nn;

pub use self::error::{NetError, Result};
