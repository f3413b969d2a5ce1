use crate::error::{ConstructionError, GeometryError, Result};
use crate::math::distance_2d::ray_distance;
use crate::math::meridian::meridian_coordinates;
use crate::math::quadratic::Quadratic;
use crate::math::{Point2, Point3, Vector2, Vector3, TOLERANCE};

use super::{Crossing, RegionMedia, Solid};

/// Cones with a common axis and opening angle whose apexes are shifted
/// along the axis.
///
/// Cone `c` has its apex `offsets[c]` along the axis from the first apex;
/// each cone lies inside the previous one. Region 0 is the innermost cone
/// (furthest apex), region `k` the shell between cone `n − k − 1` and cone
/// `n − k`.
#[derive(Debug, Clone)]
pub struct ParallelCones {
    apexes: Vec<Point3>,
    offsets: Vec<f64>,
    axis: Vector3,
    gamma: f64,
    g12: f64,
    media: RegionMedia,
}

/// Quadric coefficients of the ray against one cone of the set.
struct ConeRay {
    xp: Vector3,
    aa: f64,
    b: f64,
    q: Quadratic,
}

impl ParallelCones {
    /// Creates the set from the first apex and the offsets of the following
    /// apexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the axis has zero length, `tan_half_angle` is not
    /// positive, or the offsets are not positive and strictly increasing.
    pub fn new(apex: Point3, axis: Vector3, tan_half_angle: f64, offsets: &[f64]) -> Result<Self> {
        let len = axis.norm();
        if len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        let axis = axis / len;
        if !(tan_half_angle > 0.0 && tan_half_angle.is_finite()) {
            return Err(ConstructionError::ParameterOutOfRange {
                parameter: "tan_half_angle",
                value: tan_half_angle,
                min: 0.0,
                max: f64::INFINITY,
            }
            .into());
        }
        let mut all = Vec::with_capacity(offsets.len() + 1);
        all.push(0.0);
        for (index, &d) in offsets.iter().enumerate() {
            if !(d > all[index]) || !d.is_finite() {
                return Err(ConstructionError::NotIncreasing {
                    what: "apex offsets",
                    index,
                }
                .into());
            }
            all.push(d);
        }
        let apexes = all.iter().map(|&d| apex + axis * d).collect();
        Ok(Self {
            apexes,
            media: RegionMedia::empty(all.len()),
            offsets: all,
            axis,
            gamma: tan_half_angle,
            g12: 1.0 + tan_half_angle * tan_half_angle,
        })
    }

    /// Assigns one medium per region.
    ///
    /// # Errors
    ///
    /// Returns `ConstructionError::LengthMismatch` unless there is one
    /// entry per region.
    pub fn with_media(mut self, media: &[usize]) -> Result<Self> {
        self.media = RegionMedia::from_slice(self.region_count(), media)?;
        Ok(self)
    }

    #[must_use]
    pub fn cone_count(&self) -> usize {
        self.apexes.len()
    }

    #[must_use]
    pub fn apexes(&self) -> &[Point3] {
        &self.apexes
    }

    fn region_of_cone(&self, cone: usize) -> usize {
        self.cone_count() - 1 - cone
    }

    fn ray(&self, cone: usize, x: &Point3, u: &Vector3) -> ConeRay {
        let xp = x - self.apexes[cone];
        let aa = xp.dot(&self.axis);
        let b = u.dot(&self.axis);
        let q = Quadratic::new(
            1.0 - b * b * self.g12,
            u.dot(&xp) - aa * b * self.g12,
            xp.norm_squared() - aa * aa * self.g12,
        );
        ConeRay { xp, aa, b, q }
    }

    fn outward_normal(&self, hit: &Vector3, lam: f64) -> Vector3 {
        let n = hit - self.axis * (lam * self.g12);
        let len = n.norm();
        if len > 0.0 {
            n / len
        } else {
            -self.axis
        }
    }

    fn cone_distance(&self, cone: usize, x: &Point3) -> f64 {
        let m = meridian_coordinates(x, &self.apexes[cone], &self.axis);
        ray_distance(&m, &Point2::origin(), &Vector2::new(1.0, self.gamma))
    }
}

impl Solid for ParallelCones {
    fn region_count(&self) -> usize {
        self.apexes.len()
    }

    fn is_inside(&self, x: &Point3) -> bool {
        let xp = x - self.apexes[0];
        let aa = xp.dot(&self.axis);
        aa >= 0.0 && xp.norm_squared() <= aa * aa * self.g12
    }

    fn is_where(&self, x: &Point3) -> Option<usize> {
        if !self.is_inside(x) {
            return None;
        }
        let xp = x - self.apexes[0];
        let aa = xp.dot(&self.axis);
        let radial2 = xp.norm_squared() - aa * aa;
        for cone in 1..self.cone_count() {
            let aj = aa - self.offsets[cone];
            if aj < 0.0 || radial2 > (aj * self.gamma).powi(2) {
                return Some(self.region_of_cone(cone - 1));
            }
        }
        Some(0)
    }

    fn howfar(
        &self,
        region: Option<usize>,
        x: &Point3,
        u: &Vector3,
        max_distance: f64,
    ) -> Option<Crossing> {
        let n = self.cone_count();
        // The cone bounding the current region from outside.
        let outer = region.map(|r| n - 1 - r);

        let inner = match outer {
            None => Some(0),
            Some(c) if c + 1 < n => Some(c + 1),
            Some(_) => None,
        };
        if let Some(ci) = inner {
            let ray = self.ray(ci, x, u);
            let root = if ray.q.is_near_linear() {
                if ray.q.b < 0.0 {
                    ray.q.linear_root()
                } else {
                    None
                }
            } else {
                ray.q.entry_root()
            };
            if let Some(t) = root.filter(|&t| t >= 0.0) {
                let lam = ray.aa + ray.b * t;
                if lam >= 0.0 {
                    if t > max_distance {
                        return None;
                    }
                    let normal = self.outward_normal(&(ray.xp + u * t), lam);
                    return Some(Crossing::new(Some(self.region_of_cone(ci)), t, normal));
                }
            }
        }

        let co = outer?;
        let ray = self.ray(co, x, u);
        let root = if ray.q.is_near_linear() {
            if ray.q.b > 0.0 {
                ray.q.linear_root()
            } else {
                None
            }
        } else {
            ray.q.exit_root()
        };
        let t = root.filter(|&t| t >= 0.0)?;
        let lam = ray.aa + ray.b * t;
        if lam < 0.0 || t > max_distance {
            return None;
        }
        let next = (co > 0).then(|| self.region_of_cone(co - 1));
        let normal = -self.outward_normal(&(ray.xp + u * t), lam);
        Some(Crossing::new(next, t, normal))
    }

    fn hownear(&self, region: Option<usize>, x: &Point3) -> f64 {
        let n = self.cone_count();
        let Some(r) = region else {
            return self.cone_distance(0, x);
        };
        let co = n - 1 - r;
        let outer = self.cone_distance(co, x);
        if co + 1 < n {
            outer.min(self.cone_distance(co + 1, x))
        } else {
            outer
        }
    }

    fn medium(&self, region: usize) -> Option<usize> {
        self.media.get(region)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::solid::testing::assert_consistent_crossings;

    /// Apexes at z = 0, 1, 2 with 45° half-angle.
    fn three_cones() -> ParallelCones {
        ParallelCones::new(Point3::origin(), Vector3::z(), 1.0, &[1.0, 2.0]).unwrap()
    }

    #[test]
    fn rejects_unsorted_offsets() {
        assert!(ParallelCones::new(Point3::origin(), Vector3::z(), 1.0, &[2.0, 1.0]).is_err());
        assert!(ParallelCones::new(Point3::origin(), Vector3::z(), 1.0, &[0.0]).is_err());
    }

    #[test]
    fn regions_grow_outward() {
        let pc = three_cones();
        assert_eq!(pc.region_count(), 3);
        assert_eq!(pc.is_where(&Point3::new(0.0, 0.0, 5.0)), Some(0));
        assert_eq!(pc.is_where(&Point3::new(2.5, 0.0, 5.0)), Some(0));
        assert_eq!(pc.is_where(&Point3::new(3.5, 0.0, 5.0)), Some(1));
        assert_eq!(pc.is_where(&Point3::new(4.5, 0.0, 5.0)), Some(2));
        assert_eq!(pc.is_where(&Point3::new(5.5, 0.0, 5.0)), None);
        // Between the first two apexes only the outer cone exists.
        assert_eq!(pc.is_where(&Point3::new(0.0, 0.0, 0.5)), Some(2));
    }

    #[test]
    fn walks_out_one_ring_at_a_time() {
        let pc = three_cones();
        let u = Vector3::x();
        let mut x = Point3::new(0.0, 0.0, 5.0);
        let mut region = Some(0);
        let mut expected = [(3.0, Some(1)), (1.0, Some(2)), (1.0, None)].into_iter();
        while let Some(c) = pc.howfar(region, &x, &u, 100.0) {
            let (d, r) = expected.next().unwrap();
            assert!((c.distance - d).abs() < 1e-9);
            assert_eq!(c.region, r);
            x += u * c.distance;
            region = c.region;
            if region.is_none() {
                break;
            }
        }
        assert!(expected.next().is_none());
    }

    #[test]
    fn enters_outer_cone_from_outside() {
        let pc = three_cones();
        let c = pc
            .howfar(None, &Point3::new(-10.0, 0.0, 5.0), &Vector3::x(), 100.0)
            .unwrap();
        assert!((c.distance - 5.0).abs() < 1e-9);
        assert_eq!(c.region, Some(2));
        // Inner cone hit lies beyond the budget.
        assert!(pc
            .howfar(Some(2), &Point3::new(-4.5, 0.0, 5.0), &Vector3::x(), 0.4)
            .is_none());
    }

    #[test]
    fn hownear_takes_both_walls() {
        let pc = three_cones();
        let d = pc.hownear(Some(1), &Point3::new(3.5, 0.0, 5.0));
        assert!((d - 0.5 / 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn crossings_are_consistent() {
        let pc = ParallelCones::new(
            Point3::new(0.1, 0.0, -0.2),
            Vector3::new(0.1, -0.2, 1.0),
            0.6,
            &[0.7, 1.9],
        )
        .unwrap();
        let starts = [
            Point3::new(0.13, -0.21, 3.1),
            Point3::new(1.4, 0.3, 3.3),
            Point3::new(0.2, 2.1, 4.2),
            Point3::new(3.9, 0.2, 2.0),
            Point3::new(0.0, 0.1, -1.4),
        ];
        assert_consistent_crossings(&pc, &starts);
    }
}
