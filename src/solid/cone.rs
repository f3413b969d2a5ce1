use crate::error::{ConstructionError, GeometryError, Result};
use crate::math::distance_2d::{ray_distance, segment_distance};
use crate::math::meridian::meridian_coordinates;
use crate::math::quadratic::Quadratic;
use crate::math::{Point2, Point3, Vector2, Vector3, TOLERANCE};

use super::{Crossing, RegionMedia, Solid};

/// Radii closer than this make a frustum a cylinder.
const CYLINDER_TOLERANCE: f64 = 2e-5;

/// Roots this far behind the start point still count as crossings.
pub(crate) const ROOT_SLACK: f64 = 2e-5;

/// A single cone or cylinder.
///
/// The cone has its apex at `apex`, opens along the unit `axis` and has the
/// half-angle tangent `gamma`; only the nappe on the positive side of the
/// apex belongs to the solid. A closed cone is capped by the plane at
/// `height` along the axis.
///
/// Cylinders (`gamma == 0`) measure the axial coordinate from their first
/// cap centre; a closed cylinder is capped at `0` and `height`.
#[derive(Debug, Clone)]
pub struct SimpleCone {
    apex: Point3,
    axis: Vector3,
    gamma: f64,
    g12: f64,
    g12i: f64,
    height: Option<f64>,
    radius: f64,
    cylinder: bool,
    media: RegionMedia,
}

fn unit_axis(axis: &Vector3) -> Result<Vector3> {
    let len = axis.norm();
    if len < TOLERANCE {
        return Err(GeometryError::ZeroVector.into());
    }
    Ok(axis / len)
}

fn check_positive(parameter: &'static str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConstructionError::ParameterOutOfRange {
            parameter,
            value,
            min: 0.0,
            max: f64::INFINITY,
        }
        .into())
    }
}

/// Any unit vector perpendicular to the unit vector `a`.
fn perpendicular(a: &Vector3) -> Vector3 {
    let reference = if a.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    a.cross(&reference).normalize()
}

impl SimpleCone {
    fn with_shape(
        apex: Point3,
        axis: Vector3,
        gamma: f64,
        height: Option<f64>,
        radius: f64,
        cylinder: bool,
    ) -> Self {
        let g12 = 1.0 + gamma * gamma;
        Self {
            apex,
            axis,
            gamma,
            g12,
            g12i: 1.0 / g12.sqrt(),
            height,
            radius,
            cylinder,
            media: RegionMedia::empty(1),
        }
    }

    /// Creates an unbounded cone from the tangent of its half-angle.
    ///
    /// # Errors
    ///
    /// Returns an error if the axis has zero length or `tan_half_angle` is
    /// not positive.
    pub fn open(apex: Point3, axis: Vector3, tan_half_angle: f64) -> Result<Self> {
        let axis = unit_axis(&axis)?;
        check_positive("tan_half_angle", tan_half_angle)?;
        Ok(Self::with_shape(apex, axis, tan_half_angle, None, 0.0, false))
    }

    /// Creates a cone capped by a plane at `height` from the apex.
    ///
    /// # Errors
    ///
    /// Returns an error if the axis has zero length or `tan_half_angle` or
    /// `height` is not positive.
    pub fn closed(apex: Point3, axis: Vector3, tan_half_angle: f64, height: f64) -> Result<Self> {
        let axis = unit_axis(&axis)?;
        check_positive("tan_half_angle", tan_half_angle)?;
        check_positive("height", height)?;
        Ok(Self::with_shape(
            apex,
            axis,
            tan_half_angle,
            Some(height),
            height * tan_half_angle,
            false,
        ))
    }

    /// Creates a cone from its half-angle in radians.
    ///
    /// # Errors
    ///
    /// Returns `ConstructionError::ParameterOutOfRange` unless
    /// `0 < half_angle < π/2`, plus the errors of [`Self::open`] and
    /// [`Self::closed`].
    pub fn from_half_angle(
        apex: Point3,
        axis: Vector3,
        half_angle: f64,
        height: Option<f64>,
    ) -> Result<Self> {
        if !(half_angle > 0.0 && half_angle < std::f64::consts::FRAC_PI_2) {
            return Err(ConstructionError::ParameterOutOfRange {
                parameter: "half_angle",
                value: half_angle,
                min: 0.0,
                max: std::f64::consts::FRAC_PI_2,
            }
            .into());
        }
        match height {
            Some(h) => Self::closed(apex, axis, half_angle.tan(), h),
            None => Self::open(apex, axis, half_angle.tan()),
        }
    }

    /// Same as [`Self::from_half_angle`] with the angle in degrees.
    ///
    /// # Errors
    ///
    /// See [`Self::from_half_angle`].
    pub fn from_half_angle_degrees(
        apex: Point3,
        axis: Vector3,
        degrees: f64,
        height: Option<f64>,
    ) -> Result<Self> {
        Self::from_half_angle(apex, axis, degrees.to_radians(), height)
    }

    /// Creates the cone through two coaxial rims.
    ///
    /// The rim of radius `top_radius` is centred on `top`, the one of radius
    /// `bottom_radius` lies `height` further along `axis`. Radii equal within
    /// `2e-5` give a cylinder, capped at both rims when `open` is false.
    /// A closed cone is capped only at its wider rim and extends to the apex.
    ///
    /// # Errors
    ///
    /// Returns an error if the axis has zero length, `height` is not
    /// positive, a radius is negative, or both radii vanish.
    pub fn from_radii(
        top: Point3,
        axis: Vector3,
        height: f64,
        top_radius: f64,
        bottom_radius: f64,
        open: bool,
    ) -> Result<Self> {
        let axis = unit_axis(&axis)?;
        check_positive("height", height)?;
        for (parameter, value) in [("top_radius", top_radius), ("bottom_radius", bottom_radius)] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ConstructionError::ParameterOutOfRange {
                    parameter,
                    value,
                    min: 0.0,
                    max: f64::INFINITY,
                }
                .into());
            }
        }

        if (top_radius - bottom_radius).abs() < CYLINDER_TOLERANCE {
            check_positive("radius", bottom_radius)?;
            let height = (!open).then_some(height);
            return Ok(Self::with_shape(top, axis, 0.0, height, bottom_radius, true));
        }

        let (apex, axis, length, rim) = if top_radius < bottom_radius {
            let aux = height * top_radius / (bottom_radius - top_radius);
            (top - axis * aux, axis, aux + height, bottom_radius)
        } else {
            let aux = height * bottom_radius / (top_radius - bottom_radius);
            (top + axis * (aux + height), -axis, aux + height, top_radius)
        };
        let gamma = rim / length;
        let height = (!open).then_some(length);
        Ok(Self::with_shape(apex, axis, gamma, height, rim, false))
    }

    /// Assigns the medium of the single region.
    #[must_use]
    pub fn with_medium(mut self, medium: usize) -> Self {
        self.media = RegionMedia::from_options(vec![Some(medium)]);
        self
    }

    #[must_use]
    pub fn apex(&self) -> &Point3 {
        &self.apex
    }

    #[must_use]
    pub fn axis(&self) -> &Vector3 {
        &self.axis
    }

    /// Tangent of the half-angle, zero for cylinders.
    #[must_use]
    pub fn tan_half_angle(&self) -> f64 {
        self.gamma
    }

    /// Distance of the closing plane from the apex, `None` for open cones.
    #[must_use]
    pub fn height(&self) -> Option<f64> {
        self.height
    }

    #[must_use]
    pub fn is_cylinder(&self) -> bool {
        self.cylinder
    }

    /// Radius of the rim at the closing plane, or of the cylinder.
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Unit outward normal of the lateral surface at the apex-relative
    /// point `hit` with axial coordinate `lam`.
    fn lateral_normal(&self, hit: &Vector3, lam: f64) -> Vector3 {
        let n = hit - self.axis * (lam * self.g12);
        let len = n.norm();
        if len > 0.0 {
            n / len
        } else {
            -self.axis
        }
    }

    fn howfar_from_apex(&self, inside: bool, u: &Vector3, b: f64, max: f64) -> Option<Crossing> {
        if b >= self.g12i {
            if !inside {
                return Some(Crossing::new(Some(0), 0.0, -self.axis));
            }
            let h = self.height?;
            let tt = h / b;
            return (tt <= max).then(|| Crossing::new(None, tt, -self.axis));
        }
        if !inside {
            return None;
        }
        // Leaving immediately through the generator closest to `u`.
        let radial = u - self.axis * b;
        let e = if radial.norm() > TOLERANCE {
            radial.normalize()
        } else {
            perpendicular(&self.axis)
        };
        let normal = -(e - self.axis * self.gamma).normalize();
        Some(Crossing::new(None, 0.0, normal))
    }

    fn howfar_cylinder(
        &self,
        inside: bool,
        xp: &Vector3,
        u: &Vector3,
        max: f64,
    ) -> Option<Crossing> {
        let aa = xp.dot(&self.axis);
        let b = u.dot(&self.axis);
        let r2 = xp.norm_squared();
        let c = u.dot(xp);
        let within = |lam: f64| self.height.is_none_or(|h| (0.0..=h).contains(&lam));
        let radial2_at = |t: f64| r2 + t * (t + 2.0 * c) - (aa + b * t).powi(2);

        let mut t = max;
        let mut best = None;

        if b.abs() < 1.0 {
            let q = Quadratic::new(
                1.0 - b * b,
                c - b * aa,
                r2 - aa * aa - self.radius * self.radius,
            );
            let root = if inside {
                if q.discriminant() < 0.0 || (q.c > 0.0 && q.b > 0.0) {
                    Some(0.0)
                } else {
                    q.exit_root()
                }
            } else if q.c < 0.0 {
                (q.b < 0.0 && within(aa)).then_some(0.0)
            } else if q.b < 0.0 {
                q.entry_root()
            } else {
                None
            };
            if let Some(d) = root.map(|d| d.max(0.0)) {
                let lam = aa + b * d;
                if d <= t && within(lam) {
                    t = d;
                    let n = self.lateral_normal(&(xp + u * d), lam);
                    let (region, normal) = if inside { (None, -n) } else { (Some(0), n) };
                    best = Some(Crossing::new(region, d, normal));
                }
            }
        }

        if let Some(h) = self.height {
            let cap = if inside {
                if b > 0.0 {
                    Some(((h - aa) / b, -self.axis))
                } else if b < 0.0 {
                    Some((-aa / b, self.axis))
                } else {
                    None
                }
            } else if aa < 0.0 && b > 0.0 {
                Some((-aa / b, -self.axis))
            } else if aa > h && b < 0.0 {
                Some(((h - aa) / b, self.axis))
            } else {
                None
            };
            if let Some((d, normal)) = cap {
                let d = d.max(0.0);
                let hits_disk = inside || radial2_at(d) <= self.radius * self.radius;
                if d <= t && hits_disk {
                    let region = if inside { None } else { Some(0) };
                    best = Some(Crossing::new(region, d, normal));
                }
            }
        }
        best
    }
}

impl Solid for SimpleCone {
    fn region_count(&self) -> usize {
        1
    }

    fn is_inside(&self, x: &Point3) -> bool {
        let xp = x - self.apex;
        let aa = xp.dot(&self.axis);
        if self.height.is_some_and(|h| aa < 0.0 || aa > h) {
            return false;
        }
        let r2 = xp.norm_squared();
        if self.cylinder {
            r2 - aa * aa <= self.radius * self.radius
        } else {
            aa >= 0.0 && r2 <= aa * aa * self.g12
        }
    }

    fn is_where(&self, x: &Point3) -> Option<usize> {
        self.is_inside(x).then_some(0)
    }

    fn howfar(
        &self,
        region: Option<usize>,
        x: &Point3,
        u: &Vector3,
        max_distance: f64,
    ) -> Option<Crossing> {
        let inside = region.is_some();
        let xp = x - self.apex;
        if self.cylinder {
            return self.howfar_cylinder(inside, &xp, u, max_distance);
        }

        let aa = xp.dot(&self.axis);
        let b = u.dot(&self.axis);
        let r2 = xp.norm_squared();
        let c = u.dot(&xp);

        if r2 == 0.0 {
            return self.howfar_from_apex(inside, u, b, max_distance);
        }

        if let Some(h) = self.height {
            let rim2 = h * h * self.g12;
            if !inside && aa > h && b < 0.0 {
                let tt = (h - aa) / b;
                if tt <= max_distance && r2 + tt * (tt + 2.0 * c) <= rim2 {
                    return Some(Crossing::new(Some(0), tt, self.axis));
                }
                // Inside the extended cone beyond the cap: only the cap is
                // reachable.
                if r2 <= aa * aa * self.g12 {
                    return None;
                }
            }
            if inside && b > 0.0 {
                let tt = ((h - aa) / b).max(0.0);
                if tt <= max_distance && r2 + tt * (tt + 2.0 * c) <= rim2 {
                    return Some(Crossing::new(None, tt, -self.axis));
                }
            }
        }

        let q = Quadratic::new(
            1.0 - b * b * self.g12,
            c - aa * b * self.g12,
            r2 - aa * aa * self.g12,
        );
        let root = if q.is_near_linear() {
            if (inside && q.b > 0.0) || (!inside && q.b < 0.0) {
                q.linear_root().filter(|&t| t >= 0.0)
            } else {
                None
            }
        } else if inside {
            q.exit_root()
        } else {
            q.entry_root()
        };

        let t = root.filter(|&t| t >= -ROOT_SLACK)?;
        let lam = aa + b * t;
        if lam < 0.0 || t > max_distance {
            return None;
        }
        if !inside && self.height.is_some_and(|h| lam > h) {
            return None;
        }
        let t = t.max(0.0);
        let n = self.lateral_normal(&(xp + u * t), lam);
        if inside {
            Some(Crossing::new(None, t, -n))
        } else {
            Some(Crossing::new(Some(0), t, n))
        }
    }

    fn hownear(&self, _region: Option<usize>, x: &Point3) -> f64 {
        let m = meridian_coordinates(x, &self.apex, &self.axis);
        let origin = Point2::origin();
        match (self.cylinder, self.height) {
            (true, None) => (m.y - self.radius).abs(),
            (true, Some(h)) => {
                let r = self.radius;
                let side = segment_distance(&m, &Point2::new(0.0, r), &Point2::new(h, r));
                let bottom = segment_distance(&m, &origin, &Point2::new(0.0, r));
                let top = segment_distance(&m, &Point2::new(h, 0.0), &Point2::new(h, r));
                side.min(bottom).min(top)
            }
            (false, None) => ray_distance(&m, &origin, &Vector2::new(1.0, self.gamma)),
            (false, Some(h)) => {
                let rim = Point2::new(h, self.radius);
                let side = segment_distance(&m, &origin, &rim);
                let cap = segment_distance(&m, &Point2::new(h, 0.0), &rim);
                side.min(cap)
            }
        }
    }

    fn max_step(&self) -> usize {
        4
    }

    fn medium(&self, region: usize) -> Option<usize> {
        self.media.get(region)
    }
}
