pub mod cone;
pub mod cone_set;
pub mod cone_stack;
pub mod elliptic;
pub mod media;
pub mod parallel_cones;
pub mod roundrect;

pub use cone::SimpleCone;
pub use cone_set::{ConeSet, ConeSetMode};
pub use cone_stack::{ConeStack, ConeStackBuilder, LayerSpec};
pub use elliptic::{
    EllipticCylinderSet, EllipticCylinders, EllipticCylindersXY, EllipticCylindersXZ,
    EllipticCylindersYZ,
};
pub use media::RegionMedia;
pub use parallel_cones::ParallelCones;
pub use roundrect::{
    RoundRectCylinderSet, RoundRectCylinders, RoundRectXY, RoundRectXZ, RoundRectYZ,
};

use crate::math::{Point3, Vector3};

/// Result of a successful [`Solid::howfar`] query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    /// Region on the far side of the boundary, `None` when leaving the solid.
    pub region: Option<usize>,
    /// Distance to the boundary along the unit direction.
    pub distance: f64,
    /// Unit surface normal at the crossing, oriented against the direction
    /// of travel.
    pub normal: Vector3,
}

impl Crossing {
    #[must_use]
    pub fn new(region: Option<usize>, distance: f64, normal: Vector3) -> Self {
        Self {
            region,
            distance,
            normal,
        }
    }
}

/// The four-operation query contract shared by every solid.
///
/// Regions are numbered from zero; `None` stands for "outside the solid".
/// All operations are pure functions of their arguments and the solid's
/// construction-time state, so a solid can be shared between threads.
pub trait Solid: Send + Sync {
    /// Number of region indices, including placeholder slots.
    fn region_count(&self) -> usize;

    /// Whether `x` lies in any region of the solid.
    fn is_inside(&self, x: &Point3) -> bool;

    /// Region containing `x`, or `None` if `x` is outside.
    fn is_where(&self, x: &Point3) -> Option<usize>;

    /// First boundary crossing along `x + t·u` with `0 ≤ t ≤ max_distance`.
    ///
    /// `region` is the caller's current region. `None` as a return value
    /// means the particle stays in `region` for the whole step.
    fn howfar(
        &self,
        region: Option<usize>,
        x: &Point3,
        u: &Vector3,
        max_distance: f64,
    ) -> Option<Crossing>;

    /// Lower bound on the distance from `x` to the boundary of `region`.
    fn hownear(&self, region: Option<usize>, x: &Point3) -> f64;

    /// Whether `region` is an addressable region rather than a placeholder.
    fn is_real_region(&self, region: usize) -> bool {
        region < self.region_count()
    }

    /// Maximum number of boundary crossings along one straight line.
    fn max_step(&self) -> usize {
        2 * self.region_count() + 1
    }

    /// Medium index assigned to `region`.
    fn medium(&self, region: usize) -> Option<usize>;
}
