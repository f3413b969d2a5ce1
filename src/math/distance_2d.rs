use super::{Point2, Vector2};

/// Returns the minimum distance from `p` to the segment from `a` to `b`.
#[must_use]
pub fn segment_distance(p: &Point2, a: &Point2, b: &Point2) -> f64 {
    let d = b - a;
    let len_sq = d.norm_squared();

    if len_sq < 1e-20 {
        return (p - a).norm();
    }

    // Project onto the infinite line, clamp to the segment.
    let t = ((p - a).dot(&d) / len_sq).clamp(0.0, 1.0);
    (p - (a + d * t)).norm()
}

/// Returns the minimum distance from `p` to the half-line starting at
/// `origin` along `dir`.
#[must_use]
pub fn ray_distance(p: &Point2, origin: &Point2, dir: &Vector2) -> f64 {
    let len_sq = dir.norm_squared();
    let w = p - origin;
    if len_sq < 1e-20 {
        return w.norm();
    }
    let t = (w.dot(dir) / len_sq).max(0.0);
    (w - dir * t).norm()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::TOLERANCE;

    #[test]
    fn segment_distance_perpendicular_and_endpoint() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(4.0, 0.0);
        assert!((segment_distance(&Point2::new(2.0, 3.0), &a, &b) - 3.0).abs() < TOLERANCE);
        assert!((segment_distance(&Point2::new(7.0, 4.0), &a, &b) - 5.0).abs() < TOLERANCE);
    }

    #[test]
    fn degenerate_segment_is_a_point() {
        let a = Point2::new(1.0, 1.0);
        assert!((segment_distance(&Point2::new(4.0, 5.0), &a, &a) - 5.0).abs() < TOLERANCE);
    }

    #[test]
    fn ray_distance_clamps_only_at_origin() {
        let o = Point2::origin();
        let dir = Vector2::new(1.0, 1.0);
        // behind the origin
        assert!((ray_distance(&Point2::new(-3.0, -4.0), &o, &dir) - 5.0).abs() < TOLERANCE);
        // far along the ray
        let d = ray_distance(&Point2::new(100.0, 102.0), &o, &dir);
        assert!((d - 2.0_f64.sqrt()).abs() < 1e-9);
    }
}
