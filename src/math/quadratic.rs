//! Numerically stable roots of `A·t² + 2B·t + C = 0`.
//!
//! All quadric surfaces in the kernel reduce a ray query to this form with
//! `C < 0` meaning "inside the surface". The two root selectors pick the
//! crossing that leaves or enters that inside, using the rationalised form
//! of the root whenever the textbook form would cancel.

/// Leading coefficients below this magnitude are treated as linear.
pub const NEAR_LINEAR: f64 = 1e-6;

/// Coefficients of `A·t² + 2B·t + C`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadratic {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Quadratic {
    #[must_use]
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    /// Reduced discriminant `B² − A·C`.
    #[must_use]
    pub fn discriminant(&self) -> f64 {
        self.b * self.b - self.a * self.c
    }

    /// Whether the ray runs (almost) parallel to a generator.
    #[must_use]
    pub fn is_near_linear(&self) -> bool {
        self.a.abs() < NEAR_LINEAR
    }

    /// Root of `2B·t + C = 0`.
    #[must_use]
    pub fn linear_root(&self) -> Option<f64> {
        if self.b == 0.0 {
            None
        } else {
            Some(-self.c / (2.0 * self.b))
        }
    }

    /// Root at which a ray starting inside (`C ≤ 0`) leaves.
    #[must_use]
    pub fn exit_root(&self) -> Option<f64> {
        let d = self.discriminant();
        if d < 0.0 || (self.a < 0.0 && self.b < 0.0) {
            return None;
        }
        let sd = d.sqrt();
        if self.b > 0.0 {
            Some(-self.c / (self.b + sd))
        } else if self.a == 0.0 {
            None
        } else {
            Some((sd - self.b) / self.a)
        }
    }

    /// Root at which a ray starting outside (`C ≥ 0`) enters.
    #[must_use]
    pub fn entry_root(&self) -> Option<f64> {
        let d = self.discriminant();
        if d < 0.0 || (self.a > 0.0 && self.b > 0.0) {
            return None;
        }
        let sd = d.sqrt();
        if self.b < 0.0 {
            Some(self.c / (sd - self.b))
        } else if self.a == 0.0 {
            None
        } else {
            Some(-(sd + self.b) / self.a)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_circle_exit_from_center() {
        // |x + t u|² − 1 with x = 0, u = (1, 0)
        let q = Quadratic::new(1.0, 0.0, -1.0);
        assert!((q.exit_root().unwrap_or(f64::NAN) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unit_circle_entry_from_left() {
        // x = (−3, 0), u = (1, 0): t² − 6t + 8
        let q = Quadratic::new(1.0, -3.0, 8.0);
        assert!((q.entry_root().unwrap_or(f64::NAN) - 2.0).abs() < 1e-12);
        assert!((q.exit_root().unwrap_or(f64::NAN) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn moving_away_has_no_entry() {
        let q = Quadratic::new(1.0, 3.0, 8.0);
        assert!(q.entry_root().is_none());
    }

    #[test]
    fn negative_discriminant_misses() {
        // x = (−3, 2), u = (1, 0)
        let q = Quadratic::new(1.0, -3.0, 12.0);
        assert!(q.entry_root().is_none());
        assert!(q.exit_root().is_none());
    }

    #[test]
    fn tiny_root_keeps_precision() {
        // Starting 1e-12 inside the circle of radius 1e6.
        let r = 1e6;
        let x = r - 1e-12;
        let q = Quadratic::new(1.0, x, x * x - r * r);
        let t = q.exit_root().unwrap_or(f64::NAN);
        assert!(t >= 0.0 && t < 1e-9);
    }

    #[test]
    fn linear_root() {
        let q = Quadratic::new(0.0, -1.0, 4.0);
        assert!(q.is_near_linear());
        assert!((q.linear_root().unwrap_or(f64::NAN) - 2.0).abs() < 1e-12);
        assert!(Quadratic::new(0.0, 0.0, 4.0).linear_root().is_none());
    }
}
