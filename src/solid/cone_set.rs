use tracing::warn;

use crate::error::{ConstructionError, GeometryError, Result};
use crate::math::distance_2d::ray_distance;
use crate::math::meridian::meridian_coordinates;
use crate::math::quadratic::Quadratic;
use crate::math::{Point2, Point3, Vector2, Vector3, TOLERANCE};

use super::{Crossing, RegionMedia, Solid};

/// Which parts of space around the common apex belong to a [`ConeSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConeSetMode {
    /// Only the cones on the positive side of the apex; `N` regions.
    #[default]
    Forward,
    /// Both nappes of every cone; the space beyond the widest cone is
    /// outside. Regions `N` is a placeholder.
    Double,
    /// Both nappes plus the space beyond the widest cone (region `N`);
    /// covers all of space.
    Full,
}

impl ConeSetMode {
    /// Maps the numeric flag `0`, `1`, `2` to a mode, falling back to
    /// [`ConeSetMode::Forward`] for anything else.
    #[must_use]
    pub fn from_flag(flag: u8) -> Self {
        match flag {
            0 => Self::Forward,
            1 => Self::Double,
            2 => Self::Full,
            other => {
                warn!(flag = other, "unknown cone set flag, using the forward mode");
                Self::Forward
            }
        }
    }
}

/// Cones sharing apex and axis with increasing opening angles.
///
/// Regions are ordered by polar angle from the forward axis: cone `j` on
/// the forward side is region `j`, the gap beyond the widest cone is region
/// `N`, and cone `j` on the backward side is region `2N − j`.
#[derive(Debug, Clone)]
pub struct ConeSet {
    apex: Point3,
    axis: Vector3,
    gammas: Vec<f64>,
    g12: Vec<f64>,
    mode: ConeSetMode,
    media: RegionMedia,
}

impl ConeSet {
    /// Creates the set from the half-angle tangents of its cones.
    ///
    /// # Errors
    ///
    /// Returns an error if the axis has zero length or the tangents are
    /// empty, not positive, or not strictly increasing.
    pub fn new(apex: Point3, axis: Vector3, tangents: &[f64], mode: ConeSetMode) -> Result<Self> {
        let len = axis.norm();
        if len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        if tangents.is_empty() {
            return Err(ConstructionError::Empty("cone tangents").into());
        }
        let mut previous = 0.0;
        for (index, &g) in tangents.iter().enumerate() {
            if !(g > previous) || !g.is_finite() {
                return Err(ConstructionError::NotIncreasing {
                    what: "cone tangents",
                    index,
                }
                .into());
            }
            previous = g;
        }
        let nc = tangents.len();
        let regions = if mode == ConeSetMode::Forward {
            nc
        } else {
            2 * nc + 1
        };
        Ok(Self {
            apex,
            axis: axis / len,
            gammas: tangents.to_vec(),
            g12: tangents.iter().map(|g| 1.0 + g * g).collect(),
            mode,
            media: RegionMedia::empty(regions),
        })
    }

    /// Assigns one medium per region index.
    ///
    /// # Errors
    ///
    /// Returns `ConstructionError::LengthMismatch` unless there is one
    /// entry per region index.
    pub fn with_media(mut self, media: &[usize]) -> Result<Self> {
        self.media = RegionMedia::from_slice(self.region_count(), media)?;
        Ok(self)
    }

    #[must_use]
    pub fn mode(&self) -> ConeSetMode {
        self.mode
    }

    #[must_use]
    pub fn cone_count(&self) -> usize {
        self.gammas.len()
    }

    /// Cone index bounding a region from the axis side.
    fn inner_cone(&self, region: Option<usize>) -> Option<usize> {
        let nc = self.cone_count();
        match region {
            None => Some(nc - 1),
            Some(r) if r == nc => Some(nc - 1),
            Some(0) => None,
            Some(r) if r == 2 * nc => None,
            Some(r) if r < nc => Some(r - 1),
            Some(r) => Some(2 * nc - r - 1),
        }
    }

    fn quadratic(&self, cone: usize, xp: &Vector3, u: &Vector3, aa: f64, b: f64) -> Quadratic {
        let g12 = self.g12[cone];
        Quadratic::new(
            1.0 - b * b * g12,
            u.dot(xp) - aa * b * g12,
            xp.norm_squared() - aa * aa * g12,
        )
    }

    fn outward_normal(&self, cone: usize, hit: &Vector3, lam: f64) -> Vector3 {
        let n = hit - self.axis * (lam * self.g12[cone]);
        let len = n.norm();
        if len > 0.0 {
            n / len
        } else {
            -self.axis
        }
    }

    fn nappe_distance(&self, cone: usize, m: &Point2, forward: bool) -> f64 {
        let dir = if forward {
            Vector2::new(1.0, self.gammas[cone])
        } else {
            Vector2::new(-1.0, self.gammas[cone])
        };
        ray_distance(m, &Point2::origin(), &dir)
    }
}

impl Solid for ConeSet {
    fn region_count(&self) -> usize {
        self.media.len()
    }

    fn is_inside(&self, x: &Point3) -> bool {
        self.is_where(x).is_some()
    }

    fn is_where(&self, x: &Point3) -> Option<usize> {
        let nc = self.cone_count();
        let xp = x - self.apex;
        let aa = xp.dot(&self.axis);
        if self.mode == ConeSetMode::Forward && aa < 0.0 {
            return None;
        }
        let r2 = xp.norm_squared();
        if let Some(j) = self.g12.iter().position(|&g| r2 <= aa * aa * g) {
            return Some(if aa >= 0.0 { j } else { 2 * nc - j });
        }
        (self.mode == ConeSetMode::Full).then_some(nc)
    }

    fn is_real_region(&self, region: usize) -> bool {
        region < self.region_count()
            && !(self.mode == ConeSetMode::Double && region == self.cone_count())
    }

    fn howfar(
        &self,
        region: Option<usize>,
        x: &Point3,
        u: &Vector3,
        max_distance: f64,
    ) -> Option<Crossing> {
        let nc = self.cone_count();
        let xp = x - self.apex;
        let aa = xp.dot(&self.axis);
        let b = u.dot(&self.axis);

        if xp.norm_squared() == 0.0 {
            // No surface normal at the apex; report the reversed direction.
            let next = self.is_where(&(x + u));
            return (next != region).then(|| Crossing::new(next, 0.0, -u.normalize()));
        }

        let beyond_widest = region.is_none() || region == Some(nc);

        if let Some(ci) = self.inner_cone(region) {
            let q = self.quadratic(ci, &xp, u, aa, b);
            let root = if q.is_near_linear() {
                if q.b < 0.0 {
                    q.linear_root()
                } else {
                    None
                }
            } else {
                q.entry_root()
            };

            let mut hit = false;
            if let Some(t) = root.filter(|&t| t >= 0.0) {
                let lam = aa + b * t;
                let next = if beyond_widest {
                    if lam >= 0.0 {
                        Some(nc - 1)
                    } else if self.mode == ConeSetMode::Forward {
                        None
                    } else {
                        Some(nc + 1)
                    }
                } else if lam * aa >= 0.0 {
                    region.map(|r| if lam >= 0.0 { r - 1 } else { r + 1 })
                } else {
                    None
                };
                if let Some(next) = next {
                    hit = true;
                    if t <= max_distance {
                        let normal = self.outward_normal(ci, &(xp + u * t), lam);
                        return Some(Crossing::new(Some(next), t, normal));
                    }
                }
            }
            if beyond_widest || hit {
                return None;
            }
        }

        let r = region?;
        let forward = r < nc;
        let co = if forward { r } else { 2 * nc - r };
        let q = self.quadratic(co, &xp, u, aa, b);
        let root = if q.is_near_linear() {
            if q.b > 0.0 {
                q.linear_root()
            } else {
                None
            }
        } else {
            q.exit_root()
        };
        let t = root.filter(|&t| t >= 0.0)?;
        let lam = aa + b * t;
        if (forward && lam < 0.0) || (!forward && lam > 0.0) || t > max_distance {
            return None;
        }
        let next = if forward { r + 1 } else { r - 1 };
        let next = (next != nc || self.mode == ConeSetMode::Full).then_some(next);
        let normal = -self.outward_normal(co, &(xp + u * t), lam);
        Some(Crossing::new(next, t, normal))
    }

    fn hownear(&self, region: Option<usize>, x: &Point3) -> f64 {
        let nc = self.cone_count();
        let m = meridian_coordinates(x, &self.apex, &self.axis);

        let Some(r) = region.filter(|&r| r != nc) else {
            let widest = nc - 1;
            let forward = self.nappe_distance(widest, &m, true);
            return if self.mode == ConeSetMode::Forward {
                forward
            } else {
                forward.min(self.nappe_distance(widest, &m, false))
            };
        };
        let forward = r < nc;
        let outer = self.nappe_distance(if forward { r } else { 2 * nc - r }, &m, forward);
        match self.inner_cone(region) {
            Some(ci) => outer.min(self.nappe_distance(ci, &m, forward)),
            None => outer,
        }
    }

    fn medium(&self, region: usize) -> Option<usize> {
        self.media.get(region)
    }
}
