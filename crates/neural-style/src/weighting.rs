/// Added to each loss before taking its reciprocal.
pub const EPSILON: f64 = 1e-10;

/// Values of the three loss terms at one iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossValues {
    /// Content loss.
    pub content: f64,
    /// Style loss.
    pub style: f64,
    /// Denoise loss.
    pub denoise: f64,
}

impl LossValues {
    /// Name and value of the first term that is NaN or infinite.
    pub fn first_non_finite(&self) -> Option<(&'static str, f64)> {
        [
            ("content loss", self.content),
            ("style loss", self.style),
            ("denoise loss", self.denoise),
        ]
        .into_iter()
        .find(|(_, value)| !value.is_finite())
    }
}

/// Scalars bringing each loss term to roughly unit magnitude.
///
/// Recomputed every iteration, so the user weights alone decide the balance between terms.
/// The weights measured at one iteration scale the loss of the next one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustmentWeights {
    /// Multiplier of the content loss.
    pub content: f64,
    /// Multiplier of the style loss.
    pub style: f64,
    /// Multiplier of the denoise loss.
    pub denoise: f64,
}

impl AdjustmentWeights {
    /// Applied at the first iteration, before any loss has been measured.
    pub const INITIAL: Self = Self {
        content: EPSILON,
        style: EPSILON,
        denoise: EPSILON,
    };

    /// `1 / (loss + EPSILON)` for each term.
    pub fn from_losses(losses: &LossValues) -> Self {
        Self {
            content: adjustment(losses.content),
            style: adjustment(losses.style),
            denoise: adjustment(losses.denoise),
        }
    }
}

/// Reciprocal of a loss value, bounded by `1 / EPSILON` for non-negative losses.
pub fn adjustment(loss: f64) -> f64 {
    1.0 / (loss + EPSILON)
}
