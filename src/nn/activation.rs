//! Element-wise activation functions.
//!
//! Every backward rule is written in terms of the forward *output* `y`, so a
//! layer only needs its stored destination values to apply the derivative.

use crate::nn::TensorFloat;

/// Activation applied by a layer after its linear part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[repr(u32)]
pub enum Activation {
    /// Identity.
    #[default]
    None = 0,
    /// Hyperbolic tangent.
    Tanh,
    /// `max(x, 0)`.
    Relu,
    /// `x * (x > 0) + 0.1 * x`.
    Ramp,
    /// `ln(1 + e^x)`.
    Softplus,
    /// `x` for positive inputs, `0.01 * x` otherwise.
    LeakyRelu,
    /// Clamp into `[0, 1]`.
    Clamp,
    /// `1 / (1 + e^-x)`.
    Logistic,
}

impl Activation {
    /// Forward rule.
    #[inline]
    #[must_use]
    pub fn apply(self, x: TensorFloat) -> TensorFloat {
        match self {
            Self::None => x,
            Self::Tanh => x.tanh(),
            Self::Relu => x.max(0.0),
            Self::Ramp => {
                if x > 0.0 {
                    1.1 * x
                } else {
                    0.1 * x
                }
            }
            Self::Softplus => x.exp().ln_1p(),
            Self::LeakyRelu => {
                if x > 0.0 {
                    x
                } else {
                    0.01 * x
                }
            }
            Self::Clamp => x.clamp(0.0, 1.0),
            Self::Logistic => 1.0 / (1.0 + (-x).exp()),
        }
    }

    /// Derivative expressed through the forward output `y`.
    #[inline]
    #[must_use]
    pub fn derivative(self, y: TensorFloat) -> TensorFloat {
        match self {
            Self::None => 1.0,
            Self::Tanh => 1.0 - y * y,
            Self::Relu => f32::from(u8::from(y > 0.0)),
            Self::Ramp => f32::from(u8::from(y > 0.0)) + 0.1,
            Self::Softplus => 1.0 - (-y).exp(),
            Self::LeakyRelu => {
                if y > 0.0 {
                    1.0
                } else {
                    0.01
                }
            }
            Self::Clamp => f32::from(u8::from(y > 0.0 && y < 1.0)),
            Self::Logistic => y * (1.0 - y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Activation; 8] = [
        Activation::None,
        Activation::Tanh,
        Activation::Relu,
        Activation::Ramp,
        Activation::Softplus,
        Activation::LeakyRelu,
        Activation::Clamp,
        Activation::Logistic,
    ];

    #[test]
    fn derivative_from_output_matches_finite_difference() {
        let h = 1e-3;
        for act in ALL {
            for &x in &[-1.3f32, -0.4, 0.35, 0.8, 2.1] {
                let numeric = (act.apply(x + h) - act.apply(x - h)) / (2.0 * h);
                let analytic = act.derivative(act.apply(x));
                assert!(
                    (numeric - analytic).abs() < 1e-2,
                    "{act:?} at {x}: {numeric} vs {analytic}"
                );
            }
        }
    }
}
