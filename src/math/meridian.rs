//! Coordinates in the meridian half-plane of a solid of revolution.
//!
//! A point is described by `(axial, radial)` with `radial ≥ 0`. The nearest
//! point of a rotationally symmetric surface lies in the same half-plane, so
//! 2D distances between meridian coordinates are exact 3D distances.

use super::{Point2, Point3, Vector3};

/// `(axial, radial)` coordinates of `x` for the axis through `origin` along
/// the unit vector `axis`.
#[must_use]
pub fn meridian_coordinates(x: &Point3, origin: &Point3, axis: &Vector3) -> Point2 {
    let xp = x - origin;
    let axial = xp.dot(axis);
    let radial = (xp.norm_squared() - axial * axial).max(0.0).sqrt();
    Point2::new(axial, radial)
}
