use crate::error::{GeometryError, Result};
use crate::math::{PlaneProjector, Point2, Point3, Projector, Vector3, TOLERANCE};

use super::Polygon2d;

/// Projected directions shorter than this (squared) run along the normal.
const MIN_PROJECTED_SQ: f64 = 1e-8;

/// Maximum out-of-plane deviation accepted by [`make_polygon`].
const COPLANAR_TOLERANCE: f64 = 1e-6;

/// A crossing found in the plane of a [`PlanarPolygon`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarHit {
    pub distance: f64,
    /// Unit normal of the crossed edge face, oriented against the direction
    /// of travel.
    pub normal: Vector3,
}

/// A polygon embedded in 3D through a projector.
///
/// The polygon also defines the half-space on the normal side of its plane;
/// `is_inside`/`howfar` refer to that half-space or to the plane itself,
/// the `*_2d` queries to the prism obtained by extruding the outline along
/// the normal.
#[derive(Debug, Clone)]
pub struct PlanarPolygon<P: Projector> {
    outline: Polygon2d,
    projector: P,
}

impl<P: Projector> PlanarPolygon<P> {
    /// Creates a closed polygon from in-plane vertices.
    ///
    /// # Errors
    ///
    /// Propagates the construction errors of [`Polygon2d::new`].
    pub fn new(points: &[Point2], projector: P) -> Result<Self> {
        Ok(Self {
            outline: Polygon2d::new(points)?,
            projector,
        })
    }

    /// Creates an open wedge from three in-plane vertices.
    ///
    /// # Errors
    ///
    /// Propagates the construction errors of [`Polygon2d::open`].
    pub fn open(points: &[Point2], projector: P) -> Result<Self> {
        Ok(Self {
            outline: Polygon2d::open(points)?,
            projector,
        })
    }

    #[must_use]
    pub fn outline(&self) -> &Polygon2d {
        &self.outline
    }

    #[must_use]
    pub fn projector(&self) -> &P {
        &self.projector
    }

    #[must_use]
    pub fn is_convex(&self) -> bool {
        self.outline.is_convex()
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.outline.vertex_count()
    }

    /// Returns vertex `j` in 3D.
    #[must_use]
    pub fn vertex(&self, j: usize) -> Option<Point3> {
        self.outline
            .vertices()
            .get(j)
            .map(|p| self.projector.point(p))
    }

    /// Returns the inward normal of edge `j` lifted to 3D.
    #[must_use]
    pub fn edge_normal(&self, j: usize) -> Option<Vector3> {
        self.outline
            .edge_normal(j)
            .map(|n| self.projector.lift(&n))
    }

    #[must_use]
    pub fn plane_normal(&self) -> Vector3 {
        self.projector.normal()
    }

    /// Signed distance from the polygon plane.
    #[must_use]
    pub fn distance(&self, x: &Point3) -> f64 {
        self.projector.distance(x)
    }

    /// Whether `x` lies on the normal side of the plane (plane included).
    #[must_use]
    pub fn is_inside(&self, x: &Point3) -> bool {
        self.distance(x) >= 0.0
    }

    /// Whether the projection of `x` falls inside the outline.
    #[must_use]
    pub fn is_inside_2d(&self, x: &Point3) -> bool {
        self.outline.is_inside(&self.projector.project_point(x))
    }

    /// In-plane distance from the projection of `x` to the outline.
    #[must_use]
    pub fn hownear_2d(&self, x: &Point3) -> f64 {
        self.outline.hownear(&self.projector.project_point(x))
    }

    /// Distance from `x` to the polygon itself.
    #[must_use]
    pub fn hownear(&self, x: &Point3) -> f64 {
        let h = self.distance(x).abs();
        let p = self.projector.project_point(x);
        if self.outline.is_inside(&p) {
            h
        } else {
            h.hypot(self.outline.hownear(&p))
        }
    }

    /// First crossing of the extruded outline's side faces.
    ///
    /// Returns `None` for directions parallel to the plane normal.
    #[must_use]
    pub fn howfar_2d(
        &self,
        inside: bool,
        x: &Point3,
        u: &Vector3,
        max_distance: f64,
    ) -> Option<PlanarHit> {
        let dir = self.projector.project_vector(u);
        if dir.norm_squared() < MIN_PROJECTED_SQ {
            return None;
        }
        let p = self.projector.project_point(x);
        let hit = self.outline.howfar(inside, &p, &dir, max_distance)?;
        Some(PlanarHit {
            distance: hit.distance,
            normal: self.projector.lift(&hit.normal),
        })
    }

    /// Distance at which the ray crosses the plane inside the outline.
    ///
    /// `inside` refers to the half-space; only crossings leaving it (when
    /// inside) or entering it (when outside) are reported.
    #[must_use]
    pub fn howfar(&self, inside: bool, x: &Point3, u: &Vector3, max_distance: f64) -> Option<f64> {
        let up = self.projector.along(u);
        if (inside && up >= 0.0) || (!inside && up <= 0.0) {
            return None;
        }
        let t = -self.distance(x) / up;
        if t > max_distance {
            return None;
        }
        let hit = self.projector.project_point(&(x + u * t));
        self.outline.is_inside(&hit).then_some(t.max(0.0))
    }
}

/// Builds a polygon from coplanar 3D vertices.
///
/// The plane is spanned by the first vertex and the first pair of following
/// vertices that are not collinear with it; its normal follows the vertex
/// winding.
///
/// # Errors
///
/// Returns `GeometryError::Collinear` if all vertices are collinear,
/// `GeometryError::NotCoplanar` if a vertex lies off the plane, and the
/// construction errors of [`Polygon2d::new`].
pub fn make_polygon(points: &[Point3]) -> Result<PlanarPolygon<PlaneProjector>> {
    let first = points
        .first()
        .ok_or_else(|| GeometryError::Degenerate("polygon has no vertices".into()))?;
    let second = points
        .iter()
        .skip(1)
        .find(|p| (*p - first).norm() > TOLERANCE)
        .ok_or(GeometryError::ZeroVector)?;
    let projector = points
        .iter()
        .find_map(|p| PlaneProjector::from_points(first, second, p).ok())
        .ok_or(GeometryError::Collinear)?;

    for (index, p) in points.iter().enumerate() {
        let distance = projector.distance(p);
        if distance.abs() > COPLANAR_TOLERANCE {
            return Err(GeometryError::NotCoplanar { index, distance }.into());
        }
    }
    let planar: Vec<Point2> = points.iter().map(|p| projector.project_point(p)).collect();
    PlanarPolygon::new(&planar, projector)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::math::ZProjector;

    fn square_on_z() -> PlanarPolygon<ZProjector> {
        PlanarPolygon::new(
            &[
                Point2::new(-1.0, -1.0),
                Point2::new(1.0, -1.0),
                Point2::new(1.0, 1.0),
                Point2::new(-1.0, 1.0),
            ],
            ZProjector,
        )
        .unwrap()
    }

    #[test]
    fn half_space_and_prism_tests() {
        let sq = square_on_z();
        assert!(sq.is_inside(&Point3::new(5.0, 5.0, 0.5)));
        assert!(!sq.is_inside(&Point3::new(0.0, 0.0, -0.5)));
        assert!(sq.is_inside_2d(&Point3::new(0.5, 0.5, -7.0)));
        assert!(!sq.is_inside_2d(&Point3::new(1.5, 0.5, 0.0)));
    }

    #[test]
    fn hownear_combines_height_and_outline_distance() {
        let sq = square_on_z();
        assert!((sq.hownear(&Point3::new(0.0, 0.0, 2.0)) - 2.0).abs() < TOLERANCE);
        assert!((sq.hownear(&Point3::new(4.0, 0.0, 4.0)) - 5.0).abs() < TOLERANCE);
        assert!((sq.hownear_2d(&Point3::new(4.0, 0.0, 4.0)) - 3.0).abs() < TOLERANCE);
    }

    #[test]
    fn howfar_hits_plane_inside_outline_only() {
        let sq = square_on_z();
        let down = Vector3::new(0.0, 0.0, -1.0);
        let t = sq.howfar(true, &Point3::new(0.5, 0.5, 3.0), &down, 10.0).unwrap();
        assert!((t - 3.0).abs() < TOLERANCE);
        assert!(sq.howfar(true, &Point3::new(2.5, 0.5, 3.0), &down, 10.0).is_none());
        // Moving away from the plane.
        assert!(sq.howfar(true, &Point3::new(0.5, 0.5, 3.0), &(-down), 10.0).is_none());
        // From below the plane.
        let t = sq.howfar(false, &Point3::new(0.0, 0.0, -1.0), &(-down), 10.0).unwrap();
        assert!((t - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn howfar_2d_lifts_edge_normal() {
        let sq = square_on_z();
        let u = Vector3::new(3.0_f64.sqrt() / 2.0, 0.0, 0.5);
        let hit = sq.howfar_2d(true, &Point3::new(0.0, 0.0, 0.0), &u, 10.0).unwrap();
        assert_relative_eq!(hit.distance, 2.0 / 3.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(hit.normal, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
        assert!(sq.howfar_2d(true, &Point3::origin(), &Vector3::z(), 10.0).is_none());
    }

    #[test]
    fn make_polygon_in_tilted_plane() {
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let poly = make_polygon(&pts).unwrap();
        assert_eq!(poly.vertex_count(), 4);
        let n = poly.plane_normal();
        assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-12);
        assert!(n.dot(&Vector3::y()).abs() < TOLERANCE);
        for j in 0..4 {
            assert_relative_eq!(poly.vertex(j).unwrap(), pts[j], epsilon = 1e-12);
        }
        assert!(poly.is_inside_2d(&Point3::new(0.5, 0.5, 0.5)));
    }

    #[test]
    fn make_polygon_rejects_warped_input() {
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.5),
        ];
        assert!(matches!(
            make_polygon(&pts),
            Err(crate::KernelError::Geometry(GeometryError::NotCoplanar { index: 3, .. }))
        ));
    }
}
