use tracing::debug;

use crate::config;
use crate::error::{ConstructionError, GeometryError, Result};
use crate::math::{
    PlaneProjector, Point3, Projector, Vector2, Vector3, XProjector, YProjector, ZProjector,
};

use super::elliptic::check_increasing;
use super::{Crossing, RegionMedia, Solid};

/// Rounded rectangles with sides along x and y (cylinder axis along z).
pub type RoundRectXY = RoundRectCylinderSet<XProjector, YProjector>;
/// Rounded rectangles with sides along x and z (cylinder axis along y).
pub type RoundRectXZ = RoundRectCylinderSet<XProjector, ZProjector>;
/// Rounded rectangles with sides along y and z (cylinder axis along x).
pub type RoundRectYZ = RoundRectCylinderSet<YProjector, ZProjector>;
/// Rounded rectangles with arbitrary orthogonal side directions.
pub type RoundRectCylinders = RoundRectCylinderSet<PlaneProjector, PlaneProjector>;

/// Reflections mapping each quadrant of the cross-section onto the first.
const QUADRANTS: [(f64, f64); 4] = [(1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)];

/// One rounded-rectangle outline: half-widths `a`, `b` and fillet `r`.
#[derive(Debug, Clone, Copy)]
struct Ring {
    a: f64,
    b: f64,
    r: f64,
}

impl Ring {
    /// Offset of a first-quadrant point from the corner-circle centre.
    fn corner_offset(&self, p: &Vector2) -> Vector2 {
        Vector2::new(p.x - (self.a - self.r), p.y - (self.b - self.r))
    }

    fn contains(&self, p: &Vector2) -> bool {
        let p = Vector2::new(p.x.abs(), p.y.abs());
        if p.x > self.a || p.y > self.b {
            return false;
        }
        let d = self.corner_offset(&p);
        if d.x < 0.0 || d.y < 0.0 {
            return true;
        }
        d.norm_squared() <= self.r * self.r
    }

    /// Exact distance from `p` to the outline.
    fn distance(&self, p: &Vector2) -> f64 {
        let p = Vector2::new(p.x.abs(), p.y.abs());
        (box_distance(&self.corner_offset(&p)) - self.r).abs()
    }

    /// First crossing of `p + t·q` with the outline, inward when `leaving`
    /// is false and outward otherwise. Returns the distance and the 2D
    /// outward normal.
    fn crossing(&self, p: &Vector2, q: &Vector2, leaving: bool) -> Option<(f64, Vector2)> {
        let slack = config::get().boundary_tolerance;
        let accepts = |t: f64, rate: f64| {
            let outward = if leaving { rate > 0.0 } else { rate < 0.0 };
            t >= -slack && outward
        };
        let (xc, yc) = (self.a - self.r, self.b - self.r);
        let qq = q.norm_squared();
        let mut best: Option<(f64, Vector2)> = None;
        let mut keep = |t: f64, n: Vector2| {
            let t = t.max(0.0);
            if best.is_none_or(|(b, _)| t < b) {
                best = Some((t, n));
            }
        };

        for (sx, sy) in QUADRANTS {
            let pr = Vector2::new(sx * p.x, sy * p.y);
            let qr = Vector2::new(sx * q.x, sy * q.y);

            if qr.x != 0.0 {
                let t = (self.a - pr.x) / qr.x;
                let y = pr.y + qr.y * t;
                if (0.0..=yc).contains(&y) && accepts(t, qr.x) {
                    keep(t, Vector2::new(sx, 0.0));
                }
            }
            if qr.y != 0.0 {
                let t = (self.b - pr.y) / qr.y;
                let x = pr.x + qr.x * t;
                if (0.0..=xc).contains(&x) && accepts(t, qr.y) {
                    keep(t, Vector2::new(0.0, sy));
                }
            }
            if self.r > 0.0 {
                let w = Vector2::new(pr.x - xc, pr.y - yc);
                let wq = w.dot(&qr);
                let d2 = w.norm_squared() - wq * wq / qq;
                let gap = self.r * self.r - d2;
                if gap >= 0.0 {
                    let half = (gap / qq).sqrt();
                    let t = if leaving { -wq / qq + half } else { -wq / qq - half };
                    let h = w + qr * t;
                    if h.x >= 0.0 && h.y >= 0.0 && accepts(t, h.dot(&qr)) {
                        keep(t, Vector2::new(sx * h.x, sy * h.y) / self.r);
                    }
                }
            }
        }
        best
    }
}

/// Signed distance from a corner offset to the inner box of a ring.
fn box_distance(d: &Vector2) -> f64 {
    if d.x > 0.0 && d.y > 0.0 {
        d.x.hypot(d.y)
    } else {
        d.x.max(d.y)
    }
}

/// Concentric rounded-rectangle cylinders.
///
/// Ring `j` has half-widths `x_widths[j]` and `y_widths[j]` along the
/// normals of `x_axis` and `y_axis`, with corners rounded by `radii[j]`.
/// Region `j` is the inside of ring `j` minus the inside of ring `j − 1`.
#[derive(Debug, Clone)]
pub struct RoundRectCylinderSet<X: Projector, Y: Projector> {
    rings: Vec<Ring>,
    midpoint: Point3,
    x_axis: X,
    y_axis: Y,
    media: RegionMedia,
}

impl<X: Projector, Y: Projector> RoundRectCylinderSet<X, Y> {
    /// Creates the set from half-widths and fillet radii, innermost ring
    /// first.
    ///
    /// # Errors
    ///
    /// - `ConstructionError::Empty` / `LengthMismatch` for bad list lengths
    /// - `ConstructionError::NotIncreasing` unless the half-widths are
    ///   positive and strictly increasing
    /// - `ConstructionError::ParameterOutOfRange` for a negative radius
    /// - `ConstructionError::FilletTooLarge` if a radius exceeds either
    ///   half-width of its ring
    /// - `ConstructionError::OverlappingRings` if a ring pokes out of the
    ///   next one
    /// - `GeometryError::Degenerate` if the axes are not orthogonal
    pub fn new(
        x_widths: &[f64],
        y_widths: &[f64],
        radii: &[f64],
        midpoint: Point3,
        x_axis: X,
        y_axis: Y,
    ) -> Result<Self> {
        if x_widths.is_empty() {
            return Err(ConstructionError::Empty("rounded rectangle widths").into());
        }
        for (what, found) in [("y widths", y_widths.len()), ("radii", radii.len())] {
            if found != x_widths.len() {
                return Err(ConstructionError::LengthMismatch {
                    what,
                    expected: x_widths.len(),
                    found,
                }
                .into());
            }
        }
        check_increasing("x widths", x_widths)?;
        check_increasing("y widths", y_widths)?;
        if x_axis.normal().dot(&y_axis.normal()).abs() > 1e-8 {
            return Err(
                GeometryError::Degenerate("rounded rectangle axes are not orthogonal".into())
                    .into(),
            );
        }

        let tolerance = config::get().boundary_tolerance;
        let mut rings: Vec<Ring> = Vec::with_capacity(radii.len());
        for (ring, ((&a, &b), &r)) in x_widths.iter().zip(y_widths).zip(radii).enumerate() {
            if !(r >= 0.0 && r.is_finite()) {
                return Err(ConstructionError::ParameterOutOfRange {
                    parameter: "fillet radius",
                    value: r,
                    min: 0.0,
                    max: a.min(b),
                }
                .into());
            }
            if r > a.min(b) {
                return Err(ConstructionError::FilletTooLarge {
                    ring,
                    radius: r,
                    half_width: a.min(b),
                }
                .into());
            }
            let current = Ring { a, b, r };
            if let Some(inner) = rings.last() {
                // The inner corner circle must fit inside this ring's offset box.
                let centre = Vector2::new(inner.a - inner.r, inner.b - inner.r);
                if box_distance(&current.corner_offset(&centre)) + inner.r > r + tolerance {
                    return Err(ConstructionError::OverlappingRings {
                        inner: ring - 1,
                        outer: ring,
                    }
                    .into());
                }
            }
            rings.push(current);
        }
        debug!(rings = rings.len(), ?midpoint, "rounded rectangle cylinder set");
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

    /// Half-widths and fillet radius `(x, y, r)` of ring `j`.
    #[must_use]
    pub fn ring(&self, j: usize) -> (f64, f64, f64) {
        let ring = self.rings[j];
        (ring.a, ring.b, ring.r)
    }

    fn cross_section(&self, v: &Vector3) -> Vector2 {
        Vector2::new(self.x_axis.along(v), self.y_axis.along(v))
    }

    fn lift(&self, n: &Vector2) -> Vector3 {
        self.x_axis.normal() * n.x + self.y_axis.normal() * n.y
    }
}

impl<X: Projector, Y: Projector> Solid for RoundRectCylinderSet<X, Y> {
    fn region_count(&self) -> usize {
        self.rings.len()
    }

    fn is_inside(&self, x: &Point3) -> bool {
        let p = self.cross_section(&(x - self.midpoint));
        self.rings[self.rings.len() - 1].contains(&p)
    }

    fn is_where(&self, x: &Point3) -> Option<usize> {
        let p = self.cross_section(&(x - self.midpoint));
        self.rings.iter().position(|ring| ring.contains(&p))
    }

    fn howfar(
        &self,
        region: Option<usize>,
        x: &Point3,
        u: &Vector3,
        max_distance: f64,
    ) -> Option<Crossing> {
        let n = self.rings.len();
        let p = self.cross_section(&(x - self.midpoint));
        let q = self.cross_section(u);
        if q.norm_squared() == 0.0 {
            return None;
        }

        let current = region.unwrap_or(n);
        if current > 0 {
            let ring = current - 1;
            if let Some((t, outward)) = self.rings[ring].crossing(&p, &q, false) {
                if t > max_distance {
                    return None;
                }
                return Some(Crossing::new(Some(ring), t, self.lift(&outward)));
            }
        }

        let r = region?;
        let (t, outward) = self.rings[r].crossing(&p, &q, true)?;
        if t > max_distance {
            return None;
        }
        let next = (r + 1 < n).then_some(r + 1);
        Some(Crossing::new(next, t, -self.lift(&outward)))
    }

    fn hownear(&self, region: Option<usize>, x: &Point3) -> f64 {
        let p = self.cross_section(&(x - self.midpoint));
        match region {
            None => self.rings[self.rings.len() - 1].distance(&p),
            Some(0) => self.rings[0].distance(&p),
            Some(r) => self.rings[r].distance(&p).min(self.rings[r - 1].distance(&p)),
        }
    }

    fn medium(&self, region: usize) -> Option<usize> {
        self.media.get(region)
    }
}
