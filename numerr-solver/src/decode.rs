#![forbid(unsafe_code)]

use std::fmt;

use crate::solver::{BoundTriple, Numeral};

/// Eight little-endian bytes for a model numeral.
///
/// Integers are stored two's-complement; rationals are stored as the raw bits of the IEEE
/// double `numerator / denominator`.
pub fn decode_model_bytes(value: Numeral) -> [u8; 8] {
    match value {
        Numeral::Int(v) => v.to_le_bytes(),
        Numeral::Rational { .. } => value.to_f64().to_bits().to_le_bytes(),
    }
}

/// Decoded optimum of one objective.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OptimalBound {
    pub value: f64,
    /// The bound has a nonzero infinity coefficient (unbounded objective).
    pub infinite: bool,
    /// The bound has a nonzero epsilon coefficient (supremum not attained).
    pub epsilon: bool,
}

impl OptimalBound {
    /// Finite and attained: `value` is the whole story.
    pub fn is_exact(&self) -> bool {
        !self.infinite && !self.epsilon
    }
}

impl fmt::Display for OptimalBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.infinite {
            write!(f, "oo")
        } else if self.epsilon {
            write!(f, "{} - epsilon", self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

pub fn decode_bound(triple: BoundTriple) -> OptimalBound {
    OptimalBound {
        value: triple.value.to_f64(),
        infinite: !triple.infinity.is_zero(),
        epsilon: !triple.epsilon.is_zero(),
    }
}
