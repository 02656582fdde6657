//! Four-knot cosine taper: ramps from 0.0 to 1.0, holds flat, then ramps
//! back down to 0.0. Used for azimuth-gap weighting in the nucleator and
//! for distance-dependent weighting in a TTT's phase entries.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Taper {
    pub x1: f64,
    pub x2: f64,
    pub x3: f64,
    pub x4: f64,
}

impl Default for Taper {
    /// Ramps to unity at the midpoint, flat, ramps back down by 1.0 —
    /// the same default knot set as the original's default constructor.
    fn default() -> Self {
        Taper {
            x1: 0.0,
            x2: 0.5,
            x3: 0.5,
            x4: 1.0,
        }
    }
}

impl Taper {
    pub fn new(x1: f64, x2: f64, x3: f64, x4: f64) -> Self {
        Taper { x1, x2, x3, x4 }
    }

    pub fn val(&self, x: f64) -> f64 {
        if x <= self.x1 || x >= self.x4 {
            return 0.0;
        }
        if x >= self.x2 && x <= self.x3 {
            return 1.0;
        }
        if x < self.x2 {
            return 0.5 - 0.5 * (PI * (x - self.x1) / (self.x2 - self.x1)).cos();
        }
        // x > self.x3
        0.5 - 0.5 * (PI * (self.x4 - x) / (self.x4 - self.x3)).cos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_window_is_zero() {
        let t = Taper::default();
        assert_eq!(t.val(-1.0), 0.0);
        assert_eq!(t.val(1.5), 0.0);
    }

    #[test]
    fn plateau_is_unity() {
        let t = Taper::new(0.0, 0.3, 0.7, 1.0);
        assert_eq!(t.val(0.5), 1.0);
    }

    #[test]
    fn ramps_are_continuous_at_knots() {
        let t = Taper::new(0.0, 0.3, 0.7, 1.0);
        assert!((t.val(0.0) - 0.0).abs() < 1e-12);
        assert!((t.val(0.3) - 1.0).abs() < 1e-9);
        assert!((t.val(0.7) - 1.0).abs() < 1e-9);
        assert!((t.val(1.0) - 0.0).abs() < 1e-12);
    }
}
