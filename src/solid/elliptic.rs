use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, warn};

use crate::config;
use crate::error::{ConstructionError, GeometryError, Result};
use crate::math::{
    PlaneProjector, Point3, Projector, Vector2, Vector3, XProjector, YProjector, ZProjector,
};

use super::{Crossing, RegionMedia, Solid};

/// Non-convergence warnings emitted so far by the near-boundary search.
static NEWTON_WARNINGS: AtomicUsize = AtomicUsize::new(0);

/// Elliptic cylinders with axes along x and y (cylinder axis along z).
pub type EllipticCylindersXY = EllipticCylinderSet<XProjector, YProjector>;
/// Elliptic cylinders with axes along x and z (cylinder axis along y).
pub type EllipticCylindersXZ = EllipticCylinderSet<XProjector, ZProjector>;
/// Elliptic cylinders with axes along y and z (cylinder axis along x).
pub type EllipticCylindersYZ = EllipticCylinderSet<YProjector, ZProjector>;
/// Elliptic cylinders with arbitrary orthogonal axes.
pub type EllipticCylinders = EllipticCylinderSet<PlaneProjector, PlaneProjector>;

#[derive(Debug, Clone, Copy)]
struct Ellipse {
    ax: f64,
    ay: f64,
    circular: bool,
}

/// Concentric elliptic cylinders.
///
/// The semi-axis of ring `j` along the normal of `x_axis` is `x_radii[j]`,
/// along the normal of `y_axis` it is `y_radii[j]`. Region `j` is the
/// inside of ring `j` minus the inside of ring `j − 1`.
#[derive(Debug, Clone)]
pub struct EllipticCylinderSet<X: Projector, Y: Projector> {
    rings: Vec<Ellipse>,
    midpoint: Point3,
    x_axis: X,
    y_axis: Y,
    media: RegionMedia,
}

/// Checks that `values` are positive, finite and strictly increasing.
pub(super) fn check_increasing(what: &'static str, values: &[f64]) -> Result<()> {
    let mut previous = 0.0;
    for (index, &v) in values.iter().enumerate() {
        if !(v > previous && v.is_finite()) {
            return Err(ConstructionError::NotIncreasing { what, index }.into());
        }
        previous = v;
    }
    Ok(())
}

impl<X: Projector, Y: Projector> EllipticCylinderSet<X, Y> {
    /// Creates the set from its semi-axes, innermost ring first.
    ///
    /// # Errors
    ///
    /// Returns `ConstructionError::Empty` or `LengthMismatch` for bad list
    /// lengths, `NotIncreasing` unless both lists are positive and
    /// strictly increasing, and `GeometryError::Degenerate` if the two
    /// axes are not orthogonal.
    pub fn new(
        x_radii: &[f64],
        y_radii: &[f64],
        midpoint: Point3,
        x_axis: X,
        y_axis: Y,
    ) -> Result<Self> {
        if x_radii.is_empty() {
            return Err(ConstructionError::Empty("elliptic radii").into());
        }
        if y_radii.len() != x_radii.len() {
            return Err(ConstructionError::LengthMismatch {
                what: "y radii",
                expected: x_radii.len(),
                found: y_radii.len(),
            }
            .into());
        }
        check_increasing("x radii", x_radii)?;
        check_increasing("y radii", y_radii)?;
        if x_axis.normal().dot(&y_axis.normal()).abs() > 1e-8 {
            return Err(GeometryError::Degenerate("elliptic axes are not orthogonal".into()).into());
        }

        let tolerance = config::get().boundary_tolerance;
        let rings: Vec<Ellipse> = x_radii
            .iter()
            .zip(y_radii)
            .map(|(&ax, &ay)| Ellipse {
                ax,
                ay,
                circular: (ay / ax - 1.0).abs() <= tolerance,
            })
            .collect();
        debug!(rings = rings.len(), ?midpoint, "elliptic cylinder set");
        Ok(Self {
            media: RegionMedia::empty(rings.len()),
            rings,
            midpoint,
            x_axis,
            y_axis,
        })
    }

    /// Assigns one medium per ring.
    ///
    /// # Errors
    ///
    /// Returns `ConstructionError::LengthMismatch` unless there is one
    /// entry per ring.
    pub fn with_media(mut self, media: &[usize]) -> Result<Self> {
        self.media = RegionMedia::from_slice(self.rings.len(), media)?;
        Ok(self)
    }

    #[must_use]
    pub fn midpoint(&self) -> &Point3 {
        &self.midpoint
    }

    /// Semi-axes `(x, y)` of ring `j`.
    #[must_use]
    pub fn semi_axes(&self, j: usize) -> (f64, f64) {
        (self.rings[j].ax, self.rings[j].ay)
    }

    fn cross_section(&self, v: &Vector3) -> Vector2 {
        Vector2::new(self.x_axis.along(v), self.y_axis.along(v))
    }

    fn scaled(&self, ring: usize, v: &Vector2) -> Vector2 {
        let e = self.rings[ring];
        Vector2::new(v.x / e.ax, v.y / e.ay)
    }

    fn ring_contains(&self, ring: usize, p: &Vector2) -> bool {
        self.scaled(ring, p).norm_squared() <= 1.0
    }

    /// Distance from the cross-section point `p` to ring `ring`.
    fn ring_distance(&self, ring: usize, p: &Vector2) -> f64 {
        let e = self.rings[ring];
        if e.circular {
            return (e.ax - p.norm()).abs();
        }
        let cfg = config::get();
        let found = ellipse_distance(
            e.ax,
            e.ay,
            p.x,
            p.y,
            cfg.newton_max_iterations,
            cfg.boundary_tolerance,
        );
        settle_distance(found, ring, p, cfg.newton_warning_limit)
    }
}

/// Falls back to zero, the trivial lower bound, when the search did not
/// converge. Warnings stop after `warning_limit` failures per process.
fn settle_distance(found: Option<f64>, ring: usize, p: &Vector2, warning_limit: usize) -> f64 {
    found.unwrap_or_else(|| {
        if NEWTON_WARNINGS.fetch_add(1, Ordering::Relaxed) < warning_limit {
            warn!(ring, x = p.x, y = p.y, "ellipse distance search did not converge");
        }
        0.0
    })
}

/// Distance from `(px, py)` to the ellipse with semi-axes `ax` and `ay`.
///
/// The foot point is parameterised by the root `t` of
/// `(e0·y0 / (t + e0²))² + (e1·y1 / (t + e1²))² = 1`, which is decreasing
/// and convex in `t`. Newton's method started left of the root therefore
/// approaches it monotonically. Returns `None` if `max_iterations` steps do
/// not reach `tolerance`.
fn ellipse_distance(
    ax: f64,
    ay: f64,
    px: f64,
    py: f64,
    max_iterations: usize,
    tolerance: f64,
) -> Option<f64> {
    // First quadrant, major axis first.
    let (e0, e1, y0, y1) = if ax >= ay {
        (ax, ay, px.abs(), py.abs())
    } else {
        (ay, ax, py.abs(), px.abs())
    };
    let (s0, s1) = (e0 * e0, e1 * e1);

    if y1 == 0.0 {
        if y0 < (s0 - s1) / e0 {
            let x0 = s0 * y0 / (s0 - s1);
            let x1 = e1 * (1.0 - (x0 / e0).powi(2)).max(0.0).sqrt();
            return Some((x0 - y0).hypot(x1));
        }
        return Some((y0 - e0).abs());
    }
    if y0 == 0.0 {
        return Some((y1 - e1).abs());
    }

    let (a0, a1) = (e0 * y0, e1 * y1);
    let foot = |t: f64| {
        let x0 = s0 * y0 / (t + s0);
        let x1 = s1 * y1 / (t + s1);
        (x0 - y0).hypot(x1 - y1)
    };
    let mut t = (a1 - s1).max(a0 - s0);
    for _ in 0..max_iterations {
        let r0 = a0 / (t + s0);
        let r1 = a1 / (t + s1);
        let f = r0 * r0 + r1 * r1 - 1.0;
        if f.abs() < tolerance {
            return Some(foot(t));
        }
        let slope = -2.0 * (r0 * r0 / (t + s0) + r1 * r1 / (t + s1));
        let step = f / slope;
        t -= step;
        if step.abs() <= tolerance * t.abs().max(1.0) {
            return Some(foot(t));
        }
    }
    None
}

impl<X: Projector, Y: Projector> Solid for EllipticCylinderSet<X, Y> {
    fn region_count(&self) -> usize {
        self.rings.len()
    }

    fn is_inside(&self, x: &Point3) -> bool {
        let p = self.cross_section(&(x - self.midpoint));
        self.ring_contains(self.rings.len() - 1, &p)
    }

    fn is_where(&self, x: &Point3) -> Option<usize> {
        let p = self.cross_section(&(x - self.midpoint));
        (0..self.rings.len()).find(|&j| self.ring_contains(j, &p))
    }

    fn howfar(
        &self,
        region: Option<usize>,
        x: &Point3,
        u: &Vector3,
        max_distance: f64,
    ) -> Option<Crossing> {
        let n = self.rings.len();
        let xp = x - self.midpoint;
        let p = self.cross_section(&xp);
        let d = self.cross_section(u);
        let current = region.unwrap_or(n);

        let mut t = max_distance;
        // (new region, ring whose surface is crossed)
        let mut hit: Option<(Option<usize>, usize)> = None;

        if current > 0 {
            let ring = current - 1;
            let (q, v) = (self.scaled(ring, &p), self.scaled(ring, &d));
            let u2 = v.norm_squared();
            let xu = q.dot(&v);
            if u2 > 0.0 && xu < 0.0 {
                let r2 = q.norm_squared() - 1.0;
                if r2 > 0.0 {
                    let disc = xu * xu - r2 * u2;
                    if disc >= 0.0 {
                        let dist = r2 / (disc.sqrt() - xu);
                        if dist <= t {
                            t = dist;
                            hit = Some((Some(ring), ring));
                        }
                    }
                } else {
                    t = 0.0;
                    hit = Some((Some(ring), ring));
                }
            }
        }

        if let Some(r) = region.filter(|_| t > 0.0) {
            let (q, v) = (self.scaled(r, &p), self.scaled(r, &d));
            let u2 = v.norm_squared();
            if u2 > 0.0 {
                let xu = q.dot(&v);
                let r2 = q.norm_squared() - 1.0;
                let dist = if r2 >= 0.0 {
                    // Already on or past the boundary through round-off.
                    if xu > 0.0 {
                        0.0
                    } else {
                        -2.0 * xu / u2
                    }
                } else {
                    let s = (xu * xu - r2 * u2).sqrt();
                    if xu < 0.0 {
                        (s - xu) / u2
                    } else {
                        -r2 / (s + xu)
                    }
                };
                if dist <= t {
                    t = dist;
                    hit = Some(((r + 1 < n).then_some(r + 1), r));
                }
            }
        }

        let (next, ring) = hit?;
        let e = self.rings[ring];
        let at = self.cross_section(&(xp + u * t));
        let gradient = self.x_axis.normal() * (at.x * e.ay * e.ay)
            + self.y_axis.normal() * (at.y * e.ax * e.ax);
        let outward = gradient.try_normalize(0.0).unwrap_or(-u);
        let leaving = next.is_none_or(|r| r > ring);
        let normal = if leaving { -outward } else { outward };
        Some(Crossing::new(next, t, normal))
    }

    fn hownear(&self, region: Option<usize>, x: &Point3) -> f64 {
        let p = self.cross_section(&(x - self.midpoint));
        let p = Vector2::new(p.x.abs(), p.y.abs());
        match region {
            None => self.ring_distance(self.rings.len() - 1, &p),
            Some(r) => {
                let outer = self.ring_distance(r, &p);
                if r > 0 && outer > 0.0 {
                    outer.min(self.ring_distance(r - 1, &p))
                } else {
                    outer
                }
            }
        }
    }

    fn medium(&self, region: usize) -> Option<usize> {
        self.media.get(region)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::solid::testing::assert_consistent_crossings;

    fn xy_set() -> EllipticCylindersXY {
        EllipticCylindersXY::new(
            &[1.0, 2.0],
            &[0.5, 1.0],
            Point3::origin(),
            XProjector,
            YProjector,
        )
        .unwrap()
    }

    /// Brute-force distance to an ellipse by dense sampling.
    fn sampled_distance(ax: f64, ay: f64, px: f64, py: f64) -> f64 {
        (0..200_000)
            .map(|i| {
                let phi = std::f64::consts::TAU * f64::from(i) / 200_000.0;
                (ax * phi.cos() - px).hypot(ay * phi.sin() - py)
            })
            .fold(f64::INFINITY, f64::min)
    }

    // ── construction ──

    #[test]
    fn rejects_bad_radii_and_axes() {
        let o = Point3::origin();
        assert!(EllipticCylindersXY::new(&[], &[], o, XProjector, YProjector).is_err());
        assert!(EllipticCylindersXY::new(&[1.0, 2.0], &[1.0], o, XProjector, YProjector).is_err());
        assert!(
            EllipticCylindersXY::new(&[2.0, 1.0], &[1.0, 2.0], o, XProjector, YProjector).is_err()
        );
        let a = PlaneProjector::from_normal(Vector3::x()).unwrap();
        let b = PlaneProjector::from_normal(Vector3::new(1.0, 1.0, 0.0)).unwrap();
        assert!(EllipticCylinders::new(&[1.0], &[1.0], o, a, b).is_err());
    }

    // ── regions ──

    #[test]
    fn regions_by_scaled_radius() {
        let s = xy_set();
        assert_eq!(s.is_where(&Point3::new(0.9, 0.0, 5.0)), Some(0));
        assert_eq!(s.is_where(&Point3::new(0.0, 0.6, -3.0)), Some(1));
        assert_eq!(s.is_where(&Point3::new(2.5, 0.0, 0.0)), None);
        assert!(s.is_inside(&Point3::new(1.9, 0.0, 0.0)));
    }

    // ── howfar ──

    #[test]
    fn crosses_rings_along_major_axis() {
        let s = xy_set();
        let c = s
            .howfar(Some(0), &Point3::origin(), &Vector3::x(), 10.0)
            .unwrap();
        assert_relative_eq!(c.distance, 1.0, epsilon = 1e-12);
        assert_eq!(c.region, Some(1));
        assert_relative_eq!(c.normal, -Vector3::x(), epsilon = 1e-12);

        let c = s
            .howfar(Some(1), &Point3::new(1.5, 0.0, 0.0), &(-Vector3::x()), 10.0)
            .unwrap();
        assert_relative_eq!(c.distance, 0.5, epsilon = 1e-12);
        assert_eq!(c.region, Some(0));
        assert_relative_eq!(c.normal, Vector3::x(), epsilon = 1e-12);

        let c = s
            .howfar(Some(1), &Point3::new(1.5, 0.0, 0.0), &Vector3::x(), 10.0)
            .unwrap();
        assert_relative_eq!(c.distance, 0.5, epsilon = 1e-12);
        assert_eq!(c.region, None);
    }

    #[test]
    fn enters_from_outside_and_respects_budget() {
        let s = xy_set();
        let x = Point3::new(0.0, 3.0, 1.0);
        let c = s.howfar(None, &x, &(-Vector3::y()), 10.0).unwrap();
        assert_relative_eq!(c.distance, 2.0, epsilon = 1e-12);
        assert_eq!(c.region, Some(1));
        assert!(s.howfar(None, &x, &(-Vector3::y()), 1.5).is_none());
        assert!(s.howfar(None, &x, &Vector3::y(), 10.0).is_none());
    }

    #[test]
    fn parallel_to_axis_never_crosses() {
        let s = xy_set();
        assert!(s
            .howfar(Some(0), &Point3::new(0.2, 0.1, 0.0), &Vector3::z(), 1e6)
            .is_none());
    }

    // ── hownear ──

    #[test]
    fn ellipse_distance_matches_sampling() {
        let points = [
            (0.3, 0.2),
            (1.7, 0.9),
            (0.0, 0.1),
            (2.5, 0.0),
            (0.1, 0.0),
            (-1.2, 1.4),
        ];
        for (px, py) in points {
            let d = ellipse_distance(2.0, 1.0, px, py, 50, 1e-12).unwrap();
            assert!((d - sampled_distance(2.0, 1.0, px, py)).abs() < 1e-6, "({px}, {py})");
        }
        let d = ellipse_distance(0.5, 1.5, 0.4, 0.3, 50, 1e-12).unwrap();
        assert!((d - sampled_distance(0.5, 1.5, 0.4, 0.3)).abs() < 1e-6);
    }

    #[test]
    fn unconverged_search_falls_back_to_zero() {
        crate::solid::testing::init_tracing();
        assert!(ellipse_distance(2.0, 1.0, 0.3, 0.2, 1, 1e-300).is_none());

        let p = Vector2::new(0.3, 0.2);
        let before = NEWTON_WARNINGS.load(Ordering::Relaxed);
        for _ in 0..3 {
            let found = ellipse_distance(2.0, 1.0, p.x, p.y, 1, 1e-300);
            assert_eq!(settle_distance(found, 0, &p, 1), 0.0);
        }
        assert!(NEWTON_WARNINGS.load(Ordering::Relaxed) >= before + 3);

        let found = ellipse_distance(2.0, 1.0, p.x, p.y, 50, 1e-12);
        let d = settle_distance(found, 0, &p, 1);
        assert!((d - sampled_distance(2.0, 1.0, p.x, p.y)).abs() < 1e-6);
    }

    #[test]
    fn hownear_uses_both_rings() {
        let s = xy_set();
        let d = s.hownear(Some(1), &Point3::new(1.2, 0.0, 0.0));
        assert_relative_eq!(d, 0.2, epsilon = 1e-9);
        let d = s.hownear(None, &Point3::new(0.0, 3.0, 0.0));
        assert_relative_eq!(d, 2.0, epsilon = 1e-9);

        let circles =
            EllipticCylindersXY::new(&[1.0], &[1.0], Point3::origin(), XProjector, YProjector)
                .unwrap();
        let d = circles.hownear(Some(0), &Point3::new(0.3, 0.4, 7.0));
        assert_relative_eq!(d, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn hownear_is_relative_to_midpoint() {
        let s = EllipticCylindersXZ::new(
            &[1.0],
            &[2.0],
            Point3::new(5.0, 0.0, 5.0),
            XProjector,
            ZProjector,
        )
        .unwrap();
        assert_eq!(s.is_where(&Point3::new(5.0, 9.0, 5.0)), Some(0));
        let d = s.hownear(Some(0), &Point3::new(5.0, 9.0, 5.0));
        assert_relative_eq!(d, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn crossings_are_consistent() {
        let a = PlaneProjector::from_normal(Vector3::new(1.0, 1.0, 0.0)).unwrap();
        let b = PlaneProjector::from_normal(Vector3::new(-1.0, 1.0, 0.5)).unwrap();
        let s = EllipticCylinders::new(
            &[0.5, 1.2, 2.0],
            &[0.8, 1.5, 2.2],
            Point3::new(0.3, -0.2, 0.1),
            a,
            b,
        )
        .unwrap()
        .with_media(&[1, 2, 3])
        .unwrap();
        assert_eq!(s.medium(2), Some(3));
        let starts = [
            Point3::new(0.3, -0.2, 0.1),
            Point3::new(1.0, 0.2, -0.4),
            Point3::new(-0.9, 0.8, 0.3),
            Point3::new(2.6, 1.9, 0.0),
            Point3::new(-3.0, 0.5, 2.0),
        ];
        assert_consistent_crossings(&s, &starts);

        let s = EllipticCylindersYZ::new(
            &[0.5, 1.0],
            &[1.0, 3.0],
            Point3::origin(),
            YProjector,
            ZProjector,
        )
        .unwrap();
        let starts = [
            Point3::new(4.0, 0.1, 0.2),
            Point3::new(-1.0, 0.7, 0.4),
            Point3::new(0.0, 0.0, 5.0),
        ];
        assert_consistent_crossings(&s, &starts);
    }
}
