//! The net: tensor arena, node list and training driver.

use crate::backend::{Backend, get_backend};
use crate::error::{NetError, Result};
use crate::nn::layers::missing_grad;
use crate::nn::node::Node;
use crate::nn::ops::cpu::{AdamStep, adam, sgd};
use crate::nn::tensors::{Shape, Tensor};
use crate::nn::TensorFloat;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Name given to tensor 0 by [`Net::set_input_shape`].
pub const INPUT_NAME: &str = "input";

/// Parameter update rule applied by [`Net::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Optimizer {
    /// `w -= learning_rate * (g + decay * w)`.
    Sgd {
        /// Step size.
        learning_rate: TensorFloat,
        /// L2 weight decay.
        decay: TensorFloat,
    },
    /// Adam with bias-corrected moments.
    Adam {
        /// Step size.
        learning_rate: TensorFloat,
        /// Decay of the first moment.
        beta1: TensorFloat,
        /// Decay of the second moment.
        beta2: TensorFloat,
        /// Denominator guard.
        eps: TensorFloat,
    },
}

impl Optimizer {
    /// Adam with the usual defaults and the given learning rate.
    #[must_use]
    pub const fn adam(learning_rate: TensorFloat) -> Self {
        Self::Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }

    /// Whether parameters need first and second moment buffers.
    #[must_use]
    pub const fn requires_moments(&self) -> bool {
        matches!(self, Self::Adam { .. })
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::Sgd {
            learning_rate: 0.01,
            decay: 0.0,
        }
    }
}

/// Settings fixed when a net is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetConfig {
    /// Where kernels run.
    pub backend: Backend,
    /// Parameter update rule.
    pub optimizer: Optimizer,
    /// Seed of the net's RNG, used by weight fillers.
    pub seed: u64,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            backend: get_backend(),
            optimizer: Optimizer::default(),
            seed: 0x5eed,
        }
    }
}

/// A feed-forward layer graph.
///
/// Build it with [`Net::set_input_shape`] and the `add_*_layer` methods,
/// then drive it with [`Net::train_step`] and [`Net::predict`] or with the
/// individual [`Net::forward`], [`Net::backward`] and [`Net::update`] steps.
#[derive(Debug)]
pub struct Net {
    pub(crate) tensors: Vec<Tensor>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) config: NetConfig,
    pub(crate) rng: StdRng,
    pub(crate) step: i32,
}

impl Net {
    /// Creates an empty net.
    #[must_use]
    pub fn new(config: NetConfig) -> Self {
        Self {
            tensors: Vec::new(),
            nodes: Vec::new(),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            step: 0,
        }
    }

    /// The configuration the net was created with.
    #[must_use]
    pub const fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Number of optimizer steps taken so far.
    #[must_use]
    pub const fn step(&self) -> i32 {
        self.step
    }

    /// Declares the input tensor (tensor 0, named `"input"`).
    ///
    /// Can be called again to reshape the input as long as no node has been
    /// added yet.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` once nodes depend on the input shape.
    pub fn set_input_shape(&mut self, shape: Shape) -> Result<usize> {
        if !self.nodes.is_empty() {
            return Err(NetError::invalid_parameter(
                "input shape is fixed once layers have been added",
            ));
        }
        match self.tensors.first_mut() {
            Some(input) => {
                input.set_shape(shape);
                input.allocate(false);
            }
            None => self.tensors.push(Tensor::new(INPUT_NAME, shape, false)),
        }
        Ok(0)
    }

    /// Pushes a tensor into the arena and returns its index.
    pub fn add_tensor(&mut self, tensor: Tensor) -> usize {
        self.tensors.push(tensor);
        self.tensors.len() - 1
    }

    /// Appends a node to the execution order and returns its index.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the node references a tensor that does not exist.
    pub fn add_node(&mut self, node: Node) -> Result<usize> {
        let len = self.tensors.len();
        if let Some(&bad) = node.src().iter().chain(node.dst()).find(|&&i| i >= len) {
            return Err(NetError::invalid_parameter(format!(
                "node references tensor {bad} but the net holds {len}"
            )));
        }
        self.nodes.push(node);
        Ok(self.nodes.len() - 1)
    }

    /// Index of the tensor a new layer should read.
    pub(crate) fn resolve_source(&self, name: &str) -> Result<usize> {
        if self.tensors.is_empty() {
            log::error!("cannot add a layer to a net without an input tensor");
            return Err(NetError::invalid_parameter("net has no input tensor"));
        }
        if self.nodes.is_empty() {
            return Ok(0);
        }
        self.find_tensor(name).ok_or_else(|| {
            log::error!("cannot find source tensor `{name}`");
            NetError::invalid_parameter(format!("unknown tensor `{name}`"))
        })
    }

    /// Index of the most recently added tensor called `name`.
    #[must_use]
    pub fn find_tensor(&self, name: &str) -> Option<usize> {
        self.tensors.iter().rposition(|t| t.name() == name)
    }

    /// The tensor at `index`.
    #[must_use]
    pub fn tensor(&self, index: usize) -> Option<&Tensor> {
        self.tensors.get(index)
    }

    /// Mutable access to the tensor at `index`.
    pub fn tensor_mut(&mut self, index: usize) -> Option<&mut Tensor> {
        self.tensors.get_mut(index)
    }

    /// The most recently added tensor called `name`.
    #[must_use]
    pub fn tensor_by_name(&self, name: &str) -> Option<&Tensor> {
        self.find_tensor(name).map(|i| &self.tensors[i])
    }

    /// Every tensor in insertion order.
    #[must_use]
    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    /// Every node in execution order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Runs every node in insertion order.
    ///
    /// # Errors
    ///
    /// Whatever the first failing layer reports.
    pub fn forward(&mut self) -> Result<()> {
        let backend = self.config.backend;
        for (i, node) in self.nodes.iter_mut().enumerate() {
            log::debug!("forward node {i} ({:?})", node.layer().kind());
            node.forward(backend, &mut self.tensors)?;
        }
        Ok(())
    }

    /// Runs every node's backward pass in reverse insertion order.
    ///
    /// The output gradient must already be seeded, e.g. by [`Net::mse_loss`].
    ///
    /// # Errors
    ///
    /// Whatever the first failing layer reports.
    pub fn backward(&mut self) -> Result<()> {
        let backend = self.config.backend;
        for (i, node) in self.nodes.iter_mut().enumerate().rev() {
            log::debug!("backward node {i} ({:?})", node.layer().kind());
            node.backward(backend, &mut self.tensors)?;
        }
        Ok(())
    }

    /// Zeroes the gradient of every parameter tensor.
    pub fn zero_param_grads(&mut self) {
        for tensor in self.tensors.iter_mut().filter(|t| t.is_param()) {
            tensor.zero_grad();
        }
    }

    /// Applies the optimizer to every parameter and clears its gradient.
    pub fn update(&mut self) {
        self.step += 1;
        let optimizer = self.config.optimizer;
        let t = self.step;
        log::debug!("optimizer step {t}");

        for tensor in self.tensors.iter_mut().filter(|t| t.is_param()) {
            if optimizer.requires_moments() && tensor.moments().is_none() {
                tensor.allocate_moments();
            }
            let (data, grad, moments) = tensor.param_parts_mut();
            let Some(grad) = grad else { continue };
            match (optimizer, moments) {
                (
                    Optimizer::Sgd {
                        learning_rate,
                        decay,
                    },
                    _,
                ) => sgd(data, grad, learning_rate, decay),
                (
                    Optimizer::Adam {
                        learning_rate,
                        beta1,
                        beta2,
                        eps,
                    },
                    Some(moments),
                ) => adam(
                    data,
                    grad,
                    moments,
                    AdamStep {
                        lr: learning_rate,
                        beta1,
                        beta2,
                        eps,
                        t,
                    },
                ),
                (Optimizer::Adam { .. }, None) => {}
            }
        }
    }

    /// Copies one batch into the input tensor.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` without an input tensor, `InvalidData` if `input`
    /// does not match its length.
    pub fn set_input(&mut self, input: &[TensorFloat]) -> Result<()> {
        let tensor = self
            .tensors
            .first_mut()
            .ok_or_else(|| NetError::invalid_parameter("net has no input tensor"))?;
        if input.len() != tensor.shape().len() {
            return Err(NetError::invalid_data(format!(
                "input holds {} values, tensor `{}` is {}",
                input.len(),
                tensor.name(),
                tensor.shape()
            )));
        }
        tensor.data_mut().copy_from_slice(input);
        Ok(())
    }

    fn output_index(&self) -> Result<usize> {
        self.nodes
            .last()
            .and_then(|node| node.dst().first().copied())
            .ok_or_else(|| NetError::invalid_parameter("net has no output node"))
    }

    /// The first destination of the last node.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the net has no nodes.
    pub fn output(&self) -> Result<&Tensor> {
        let i = self.output_index()?;
        Ok(&self.tensors[i])
    }

    /// Mean squared error of the output against `target`, averaged over the
    /// batch. Seeds the output gradient with `output - target`.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` without nodes, `InvalidData` if `target` does not
    /// match the output length.
    pub fn mse_loss(&mut self, target: &[TensorFloat]) -> Result<TensorFloat> {
        let i = self.output_index()?;
        let tensor = &mut self.tensors[i];
        if target.len() != tensor.shape().len() {
            return Err(NetError::invalid_data(format!(
                "target holds {} values, output `{}` is {}",
                target.len(),
                tensor.name(),
                tensor.shape()
            )));
        }
        let batch = tensor.shape().n.max(1) as TensorFloat;
        let (data, grad) = tensor.data_and_grad_mut().ok_or_else(|| missing_grad(i))?;

        let mut sum = 0.0;
        for ((g, &y), &t) in grad.iter_mut().zip(data.iter()).zip(target) {
            let diff = y - t;
            *g = diff;
            sum += diff * diff;
        }
        Ok(0.5 * sum / batch)
    }

    /// One full training iteration on a batch; returns the loss before the
    /// update.
    ///
    /// # Errors
    ///
    /// Any error from feeding, running or scoring the net.
    pub fn train_step(&mut self, input: &[TensorFloat], target: &[TensorFloat]) -> Result<TensorFloat> {
        self.zero_param_grads();
        self.set_input(input)?;
        self.forward()?;
        let loss = self.mse_loss(target)?;
        self.backward()?;
        self.update();
        Ok(loss)
    }

    /// Runs the net on a batch and returns the output values.
    ///
    /// # Errors
    ///
    /// Any error from feeding or running the net.
    pub fn predict(&mut self, input: &[TensorFloat]) -> Result<&[TensorFloat]> {
        self.set_input(input)?;
        self.forward()?;
        self.output().map(Tensor::data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Activation, DeconvParams, Filler};

    fn cpu_config() -> NetConfig {
        NetConfig {
            backend: Backend::Cpu,
            ..NetConfig::default()
        }
    }

    #[test]
    fn input_shape_is_fixed_after_first_layer() {
        let mut net = Net::new(cpu_config());
        net.set_input_shape(Shape::new(1, 1, 2, 2)).unwrap();
        net.set_input_shape(Shape::new(2, 1, 3, 3)).unwrap();
        assert_eq!(net.tensors().len(), 1);
        assert_eq!(net.tensor(0).unwrap().data().len(), 18);

        net.add_activation_layer(Activation::Tanh, "input", "a").unwrap();
        assert!(matches!(
            net.set_input_shape(Shape::new(1, 1, 2, 2)),
            Err(NetError::InvalidParameter(_))
        ));
    }

    #[test]
    fn sources_resolve_newest_first() {
        let mut net = Net::new(cpu_config());
        net.set_input_shape(Shape::new(1, 1, 2, 2)).unwrap();
        net.add_activation_layer(Activation::Relu, "whatever", "x").unwrap();
        net.add_activation_layer(Activation::Relu, "x", "x").unwrap();
        assert_eq!(net.find_tensor("x"), Some(2));
        assert_eq!(net.nodes()[1].src(), &[1]);
        assert!(net.add_activation_layer(Activation::Relu, "nope", "y").is_err());
    }

    #[test]
    fn adam_moments_are_attached_at_construction() {
        let mut net = Net::new(NetConfig {
            optimizer: Optimizer::adam(1e-3),
            ..cpu_config()
        });
        net.set_input_shape(Shape::new(1, 2, 3, 3)).unwrap();
        net.add_deconvolutional_layer(
            DeconvParams::new(2, 2, 2, 0, Filler::Msra, Activation::None),
            "input",
            "up",
        )
        .unwrap();
        let w = net.tensor_by_name("up_w").unwrap();
        assert!(w.is_param());
        assert_eq!(w.moments().map(|m| m.m.len()), Some(16));
        assert!(net.tensor_by_name("up").unwrap().moments().is_none());
    }

    #[test]
    fn update_counts_steps_and_clears_grads() {
        let mut net = Net::new(cpu_config());
        net.set_input_shape(Shape::new(1, 1, 2, 2)).unwrap();
        net.add_deconvolutional_layer(
            DeconvParams::new(1, 1, 1, 0, Filler::Zeros, Activation::None),
            "input",
            "out",
        )
        .unwrap();
        let loss = net.train_step(&[1.0; 4], &[1.0; 4]).unwrap();
        assert!((loss - 2.0).abs() < 1e-6);
        assert_eq!(net.step(), 1);
        assert!(net
            .tensors()
            .iter()
            .filter(|t| t.is_param())
            .all(|t| t.grad().unwrap().iter().all(|&g| g == 0.0)));
        assert!(net.tensor_by_name("out_w").unwrap().data()[0] > 0.0);
    }
}
