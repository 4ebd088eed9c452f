use crate::nn::TensorFloat;

/// Stochastic gradient descent step with L2 weight decay:
/// `w -= lr * (grad + decay * w)`.
///
/// The gradient is zeroed afterwards.
pub fn sgd(params: &mut [TensorFloat], grads: &mut [TensorFloat], lr: TensorFloat, decay: TensorFloat) {
    for (w, g) in params.iter_mut().zip(grads.iter()) {
        *w -= lr * (*g + decay * *w);
    }
    grads.fill(0.0);
}
