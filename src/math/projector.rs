use std::fmt::Debug;

use tracing::debug;

use crate::error::{GeometryError, Result};

use super::{Point2, Point3, Vector2, Vector3, TOLERANCE};

/// Maps 3D space onto a plane and back.
///
/// A projector carries a unit normal and two in-plane unit vectors that
/// together form a right-handed orthonormal basis. Solids that are
/// extrusions of a 2D outline (polygons, elliptic and rounded-rectangle
/// cylinders) use a projector to reduce their queries to 2D.
pub trait Projector: Debug + Clone + Send + Sync {
    /// Component of a vector along the plane normal.
    fn along(&self, v: &Vector3) -> f64;

    /// In-plane coordinates of a point.
    fn project_point(&self, x: &Point3) -> Point2;

    /// In-plane components of a direction.
    fn project_vector(&self, u: &Vector3) -> Vector2;

    /// Signed distance of a point from the plane, positive on the normal side.
    fn distance(&self, x: &Point3) -> f64;

    /// Unit normal of the plane.
    fn normal(&self) -> Vector3;

    /// Lifts an in-plane vector (e.g. a 2D edge normal) back to 3D.
    fn lift(&self, v: &Vector2) -> Vector3;

    /// 3D point for in-plane coordinates.
    fn point(&self, p: &Point2) -> Point3;

    /// Length of the normal vector the projector was constructed from.
    fn normal_length(&self) -> f64 {
        1.0
    }
}

/// Projection onto the plane `x = 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct XProjector;

/// Projection onto the plane `y = 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct YProjector;

/// Projection onto the plane `z = 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZProjector;

impl Projector for XProjector {
    fn along(&self, v: &Vector3) -> f64 {
        v.x
    }

    fn project_point(&self, x: &Point3) -> Point2 {
        Point2::new(x.y, x.z)
    }

    fn project_vector(&self, u: &Vector3) -> Vector2 {
        Vector2::new(u.y, u.z)
    }

    fn distance(&self, x: &Point3) -> f64 {
        x.x
    }

    fn normal(&self) -> Vector3 {
        Vector3::x()
    }

    fn lift(&self, v: &Vector2) -> Vector3 {
        Vector3::new(0.0, v.x, v.y)
    }

    fn point(&self, p: &Point2) -> Point3 {
        Point3::new(0.0, p.x, p.y)
    }
}

impl Projector for YProjector {
    fn along(&self, v: &Vector3) -> f64 {
        v.y
    }

    fn project_point(&self, x: &Point3) -> Point2 {
        Point2::new(x.x, x.z)
    }

    fn project_vector(&self, u: &Vector3) -> Vector2 {
        Vector2::new(u.x, u.z)
    }

    fn distance(&self, x: &Point3) -> f64 {
        x.y
    }

    fn normal(&self) -> Vector3 {
        Vector3::y()
    }

    fn lift(&self, v: &Vector2) -> Vector3 {
        Vector3::new(v.x, 0.0, v.y)
    }

    fn point(&self, p: &Point2) -> Point3 {
        Point3::new(p.x, 0.0, p.y)
    }
}

impl Projector for ZProjector {
    fn along(&self, v: &Vector3) -> f64 {
        v.z
    }

    fn project_point(&self, x: &Point3) -> Point2 {
        Point2::new(x.x, x.y)
    }

    fn project_vector(&self, u: &Vector3) -> Vector2 {
        Vector2::new(u.x, u.y)
    }

    fn distance(&self, x: &Point3) -> f64 {
        x.z
    }

    fn normal(&self) -> Vector3 {
        Vector3::z()
    }

    fn lift(&self, v: &Vector2) -> Vector3 {
        Vector3::new(v.x, v.y, 0.0)
    }

    fn point(&self, p: &Point2) -> Point3 {
        Point3::new(p.x, p.y, 0.0)
    }
}

/// Projection onto an arbitrarily oriented plane.
///
/// The in-plane basis `(v1, v2)` satisfies `v1 × v2 = normal`; in-plane
/// coordinates are measured from `origin`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneProjector {
    origin: Point3,
    normal: Vector3,
    v1: Vector3,
    v2: Vector3,
    normal_length: f64,
    offset: f64,
}

impl PlaneProjector {
    /// Creates a projector for the plane through the coordinate origin with
    /// the given normal.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::ZeroVector` if the normal has zero length.
    pub fn from_normal(normal: Vector3) -> Result<Self> {
        Self::with_origin(Point3::origin(), normal)
    }

    /// Creates a projector for the plane through `origin` with the given
    /// normal. The in-plane axes are chosen automatically.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::ZeroVector` if the normal has zero length.
    pub fn with_origin(origin: Point3, normal: Vector3) -> Result<Self> {
        let len = normal.norm();
        if len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        let normal = normal / len;

        // Choose a reference vector not parallel to the normal
        let reference = if normal.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let v1 = normal.cross(&reference).normalize();
        let v2 = normal.cross(&v1);

        Ok(Self {
            origin,
            normal,
            v1,
            v2,
            normal_length: len,
            offset: normal.dot(&origin.coords),
        })
    }

    /// Creates a projector for the plane through three points.
    ///
    /// The first in-plane axis points from `x1` to `x2` and the normal
    /// follows the winding `x1 → x2 → x3`.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::ZeroVector` if `x1 == x2` and
    /// `GeometryError::Collinear` if the three points are collinear.
    pub fn from_points(x1: &Point3, x2: &Point3, x3: &Point3) -> Result<Self> {
        let edge = x2 - x1;
        let edge_len = edge.norm();
        if edge_len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        let normal = edge.cross(&(x3 - x1));
        let len = normal.norm();
        if len < TOLERANCE * edge_len {
            return Err(GeometryError::Collinear.into());
        }
        let normal = normal / len;
        let v1 = edge / edge_len;
        let v2 = normal.cross(&v1);
        debug!(?normal, "plane projector from three points");

        Ok(Self {
            origin: *x1,
            normal,
            v1,
            v2,
            normal_length: len,
            offset: normal.dot(&x1.coords),
        })
    }

    /// Returns the in-plane coordinate origin.
    #[must_use]
    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    /// Returns the first in-plane axis.
    #[must_use]
    pub fn v1(&self) -> &Vector3 {
        &self.v1
    }

    /// Returns the second in-plane axis.
    #[must_use]
    pub fn v2(&self) -> &Vector3 {
        &self.v2
    }
}

impl Projector for PlaneProjector {
    fn along(&self, v: &Vector3) -> f64 {
        self.normal.dot(v)
    }

    fn project_point(&self, x: &Point3) -> Point2 {
        let d = x - self.origin;
        Point2::new(d.dot(&self.v1), d.dot(&self.v2))
    }

    fn project_vector(&self, u: &Vector3) -> Vector2 {
        Vector2::new(u.dot(&self.v1), u.dot(&self.v2))
    }

    fn distance(&self, x: &Point3) -> f64 {
        self.normal.dot(&x.coords) - self.offset
    }

    fn normal(&self) -> Vector3 {
        self.normal
    }

    fn lift(&self, v: &Vector2) -> Vector3 {
        self.v1 * v.x + self.v2 * v.y
    }

    fn point(&self, p: &Point2) -> Point3 {
        self.origin + self.v1 * p.x + self.v2 * p.y
    }

    fn normal_length(&self) -> f64 {
        self.normal_length
    }
}
