use crate::nn::{Activation, TensorFloat};
use rayon::prelude::*;

/// Applies `act` in place over `data`.
pub fn activate(act: Activation, data: &mut [TensorFloat]) {
    if act == Activation::None {
        return;
    }
    data.par_iter_mut().for_each(|x| *x = act.apply(*x));
}

/// Multiplies `grad` in place by the derivative of `act` at the stored
/// outputs `output`.
pub fn activate_backward(act: Activation, output: &[TensorFloat], grad: &mut [TensorFloat]) {
    if act == Activation::None {
        return;
    }
    grad.par_iter_mut()
        .zip(output.par_iter())
        .for_each(|(g, &y)| *g *= act.derivative(y));
}
