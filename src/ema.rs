//! Exponentially-weighted moving average for short-term safety gating.
//!
//! Grounded on the original's `EMA` class: `alpha = 2/(n+1)`, `n =
//! max(1, period_sec/step_sec)`, non-finite samples are ignored rather than
//! corrupting the running average.

#[derive(Debug, Clone, Copy)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    /// `window_sec` is the averaging window; `step_sec` the sampling
    /// period. `n = max(1, window_sec/step_sec)` and `alpha = 2/(n+1)`.
    pub fn new(window_sec: f64, step_sec: f64) -> Ema {
        let step = step_sec.max(0.1);
        let n = (window_sec / step).max(1.0);
        let alpha = 2.0 / (n + 1.0);
        Ema { alpha, value: None }
    }

    /// Feed a new sample. Non-finite (`NaN`/`inf`) samples are ignored and
    /// leave the running value unchanged. The first finite sample seeds the
    /// average directly rather than blending against zero.
    pub fn update(&mut self, sample: f64) -> f64 {
        if !sample.is_finite() {
            return self.value.unwrap_or(0.0);
        }
        let next = match self.value {
            None => sample,
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    /// Current value, or `None` if no finite sample has ever been fed.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Current value, defaulting to 0.0 if unset — convenient for safety
    /// gates that need a number to compare against a threshold.
    pub fn value_or_zero(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}
