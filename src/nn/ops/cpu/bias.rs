use crate::nn::TensorFloat;

/// Adds `biases[c]` to every spatial position of channel `c` in every sample.
pub fn add_bias(data: &mut [TensorFloat], biases: &[TensorFloat], spatial: usize) {
    for (i, plane) in data.chunks_mut(spatial).enumerate() {
        let b = biases[i % biases.len()];
        plane.iter_mut().for_each(|v| *v += b);
    }
}

/// Accumulates into `bias_grad[c]` the sum of `grad` over every sample and
/// spatial position of channel `c`.
pub fn grad_bias(bias_grad: &mut [TensorFloat], grad: &[TensorFloat], spatial: usize) {
    let channels = bias_grad.len();
    for (i, plane) in grad.chunks(spatial).enumerate() {
        bias_grad[i % channels] += plane.iter().sum::<TensorFloat>();
    }
}
