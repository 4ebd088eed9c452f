use crate::nn::TensorFloat;
use crate::nn::tensors::Moments;

/// Hyperparameters of one Adam step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamStep {
    /// Learning rate.
    pub lr: TensorFloat,
    /// Decay of the first moment.
    pub beta1: TensorFloat,
    /// Decay of the second moment.
    pub beta2: TensorFloat,
    /// Denominator guard.
    pub eps: TensorFloat,
    /// 1-based timestep used for bias correction.
    pub t: i32,
}

/// Performs one step of Adam optimization on a parameter buffer.
///
/// # Arguments
///
/// - `params`: values to update
/// - `grads`: gradients, zeroed afterwards
/// - `moments`: first and second moment estimates (same length as `params`)
/// - `step`: hyperparameters and timestep
pub fn adam(
    params: &mut [TensorFloat],
    grads: &mut [TensorFloat],
    moments: &mut Moments,
    step: AdamStep,
) {
    let AdamStep {
        lr,
        beta1,
        beta2,
        eps,
        t,
    } = step;
    let correction1 = 1.0 - beta1.powi(t);
    let correction2 = 1.0 - beta2.powi(t);

    #[allow(clippy::suspicious_operation_groupings)]
    for ((param, grad), (m_val, v_val)) in params
        .iter_mut()
        .zip(grads.iter())
        .zip(moments.m.iter_mut().zip(moments.v.iter_mut()))
    {
        *m_val = beta1 * *m_val + (1.0 - beta1) * *grad;
        *v_val = beta2 * *v_val + (1.0 - beta2) * (*grad * *grad);

        let m_hat = *m_val / correction1;
        let v_hat = *v_val / correction2;

        *param -= lr * m_hat / (v_hat.sqrt() + eps);
    }

    grads.fill(0.0);
}
