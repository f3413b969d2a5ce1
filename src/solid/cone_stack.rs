use tracing::{debug, warn};

use crate::config;
use crate::error::{ConstructionError, GeometryError, Result};
use crate::math::{Point3, Vector3, TOLERANCE};

use super::{Crossing, RegionMedia, SimpleCone, Solid};

/// Parameters of one layer of a [`ConeStack`].
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    /// Distance between the layer's top and bottom planes.
    pub thickness: f64,
    /// Ring radii at the top plane; `None` continues the bottom radii of
    /// the previous layer.
    pub top_radii: Option<Vec<f64>>,
    /// Ring radii at the bottom plane, innermost first.
    pub bottom_radii: Vec<f64>,
    /// Medium of each ring, innermost first.
    pub media: Vec<usize>,
}

impl LayerSpec {
    #[must_use]
    pub fn new(
        thickness: f64,
        top_radii: Vec<f64>,
        bottom_radii: Vec<f64>,
        media: Vec<usize>,
    ) -> Self {
        Self {
            thickness,
            top_radii: Some(top_radii),
            bottom_radii,
            media,
        }
    }

    /// A layer whose top radii are the bottom radii of the layer above.
    #[must_use]
    pub fn continuing(thickness: f64, bottom_radii: Vec<f64>, media: Vec<usize>) -> Self {
        Self {
            thickness,
            top_radii: None,
            bottom_radii,
            media,
        }
    }
}

#[derive(Debug, Clone)]
struct Layer {
    /// Open cones bounding each ring from outside, innermost first.
    cones: Vec<SimpleCone>,
    /// Top radii equal the bottom radii of the previous layer.
    joins_previous: bool,
    /// Bottom radii equal the top radii of the next layer.
    joins_next: bool,
}

impl Layer {
    fn ring_count(&self) -> usize {
        self.cones.len()
    }

    fn outer(&self) -> &SimpleCone {
        &self.cones[self.cones.len() - 1]
    }

    fn ring_at(&self, x: &Point3) -> Option<usize> {
        if !self.outer().is_inside(x) {
            return None;
        }
        let last = self.ring_count() - 1;
        Some(
            self.cones[..last]
                .iter()
                .position(|c| c.is_inside(x))
                .unwrap_or(last),
        )
    }
}

/// Incrementally assembles a [`ConeStack`] layer by layer.
#[derive(Debug, Clone)]
pub struct ConeStackBuilder {
    origin: Point3,
    axis: Vector3,
    planes: Vec<f64>,
    layers: Vec<Layer>,
    media: Vec<Vec<usize>>,
    bottom_radii: Vec<f64>,
    outer_radius: f64,
    same_outer_radius: bool,
}

fn invalid(layer: usize, reason: &str) -> ConstructionError {
    ConstructionError::InvalidLayer {
        layer,
        reason: reason.to_owned(),
    }
}

fn check_radii(layer: usize, top: &[f64], bottom: &[f64]) -> Result<()> {
    for (index, (&rt, &rb)) in top.iter().zip(bottom).enumerate() {
        if !(rt >= 0.0 && rb >= 0.0 && rt.is_finite() && rb.is_finite()) {
            return Err(invalid(layer, "radii must be finite and non-negative").into());
        }
        if index > 0 {
            let (pt, pb) = (top[index - 1], bottom[index - 1]);
            if rt < pt || rb < pb || (rt == pt && rb == pb) {
                return Err(ConstructionError::NotIncreasing {
                    what: "layer radii",
                    index,
                }
                .into());
            }
        }
    }
    Ok(())
}

impl ConeStackBuilder {
    /// Appends a layer below the current last one.
    ///
    /// # Errors
    ///
    /// Returns `ConstructionError::InvalidLayer` for a non-positive
    /// thickness, missing bottom radii, top radii of the wrong length, or a
    /// continuing first layer, `ConstructionError::LengthMismatch` if the
    /// media do not match the rings, and `ConstructionError::NotIncreasing`
    /// if the rings are not ordered.
    pub fn add_layer(&mut self, spec: LayerSpec) -> Result<&mut Self> {
        let index = self.layers.len();
        if !(spec.thickness > 0.0 && spec.thickness.is_finite()) {
            return Err(invalid(index, "thickness must be positive").into());
        }
        let rings = spec.bottom_radii.len();
        if rings == 0 {
            return Err(invalid(index, "no bottom radii").into());
        }
        if spec.media.len() != rings {
            return Err(ConstructionError::LengthMismatch {
                what: "layer media",
                expected: rings,
                found: spec.media.len(),
            }
            .into());
        }

        let tolerance = config::get().boundary_tolerance;
        let (top, joins_previous) = match spec.top_radii {
            Some(top) if top.len() != rings => {
                return Err(invalid(index, "top and bottom radii differ in count").into());
            }
            Some(top) => {
                let joins = index > 0
                    && self.bottom_radii.len() == rings
                    && top
                        .iter()
                        .zip(&self.bottom_radii)
                        .all(|(a, b)| (a - b).abs() <= tolerance);
                (top, joins)
            }
            None if index == 0 => {
                return Err(invalid(index, "the first layer needs top radii").into());
            }
            None if self.bottom_radii.len() != rings => {
                return Err(invalid(index, "continuing layer changes the ring count").into());
            }
            None => (self.bottom_radii.clone(), true),
        };
        check_radii(index, &top, &spec.bottom_radii)?;

        let start = self.planes[index];
        let top_point = self.origin + self.axis * (start - self.planes[0]);
        let cones = top
            .iter()
            .zip(&spec.bottom_radii)
            .map(|(&rt, &rb)| {
                SimpleCone::from_radii(top_point, self.axis, spec.thickness, rt, rb, true)
            })
            .collect::<Result<Vec<_>>>()?;

        if index == 0 {
            self.outer_radius = spec.bottom_radii[rings - 1];
        }
        if (top[rings - 1] - self.outer_radius).abs() > tolerance
            || (spec.bottom_radii[rings - 1] - self.outer_radius).abs() > tolerance
        {
            self.same_outer_radius = false;
        }
        if joins_previous {
            if let Some(previous) = self.layers.last_mut() {
                previous.joins_next = true;
            }
        }

        self.planes.push(start + spec.thickness);
        self.layers.push(Layer {
            cones,
            joins_previous,
            joins_next: false,
        });
        self.media.push(spec.media);
        self.bottom_radii = spec.bottom_radii;
        Ok(self)
    }

    /// Freezes the layers into a stack.
    ///
    /// # Errors
    ///
    /// Returns `ConstructionError::Empty` if no layer was added.
    pub fn build(self) -> Result<ConeStack> {
        if self.layers.is_empty() {
            return Err(ConstructionError::Empty("cone stack layers").into());
        }
        let stride = self
            .layers
            .iter()
            .map(Layer::ring_count)
            .max()
            .unwrap_or(1);
        let mut media = vec![None; stride * self.layers.len()];
        for (il, layer_media) in self.media.iter().enumerate() {
            for (ir, &m) in layer_media.iter().enumerate() {
                media[il * stride + ir] = Some(m);
            }
        }
        debug!(
            layers = self.layers.len(),
            stride,
            same_outer_radius = self.same_outer_radius,
            congruent = self.layers.iter().filter(|l| l.joins_previous).count(),
            "cone stack built"
        );
        Ok(ConeStack {
            axis: self.axis,
            planes: self.planes,
            layers: self.layers,
            stride,
            same_outer_radius: self.same_outer_radius,
            media: RegionMedia::from_options(media),
        })
    }
}

/// Coaxial layers of nested cones bounded by parallel planes.
///
/// Layer `l` lies between the planes at axial positions `planes[l]` and
/// `planes[l + 1]`; ring `r` of that layer is the shell between cone `r − 1`
/// and cone `r`. The region index is `l · stride + r`, where `stride` is the
/// largest ring count of any layer; slots beyond a layer's ring count are
/// placeholders.
#[derive(Debug, Clone)]
pub struct ConeStack {
    axis: Vector3,
    planes: Vec<f64>,
    layers: Vec<Layer>,
    stride: usize,
    same_outer_radius: bool,
    media: RegionMedia,
}

impl ConeStack {
    /// Starts a stack whose first top plane passes through `origin`.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::ZeroVector` if `axis` has zero length.
    pub fn builder(origin: Point3, axis: Vector3) -> Result<ConeStackBuilder> {
        let len = axis.norm();
        if len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        let axis = axis / len;
        Ok(ConeStackBuilder {
            origin,
            axis,
            planes: vec![origin.coords.dot(&axis)],
            layers: Vec::new(),
            media: Vec::new(),
            bottom_radii: Vec::new(),
            outer_radius: 0.0,
            same_outer_radius: true,
        })
    }

    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Region index stride between consecutive layers.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Axial positions of the layer planes.
    #[must_use]
    pub fn planes(&self) -> &[f64] {
        &self.planes
    }

    fn first(&self) -> f64 {
        self.planes[0]
    }

    fn last(&self) -> f64 {
        self.planes[self.layers.len()]
    }

    /// Layer whose slab contains the axial position `p`, clamped to the
    /// stack.
    fn layer_at(&self, p: f64) -> usize {
        let above = self.planes.partition_point(|&q| q <= p);
        above.saturating_sub(1).min(self.layers.len() - 1)
    }

    /// Direction along the axis and distance to the next plane of layer
    /// `il` for a point at axial position `p`.
    fn plane_step(&self, il: usize, p: f64, up: f64) -> (isize, f64) {
        if up > 0.0 {
            (1, (self.planes[il + 1] - p) / up)
        } else if up < 0.0 {
            (-1, (self.planes[il] - p) / up)
        } else {
            (0, f64::INFINITY)
        }
    }

    fn plane_normal(&self, dir: isize) -> Vector3 {
        if dir > 0 {
            -self.axis
        } else {
            self.axis
        }
    }

    fn neighbour(&self, il: usize, dir: isize) -> Option<usize> {
        il.checked_add_signed(dir).filter(|&l| l < self.layers.len())
    }

    /// Whether a ray entering `region` at `x` leaves the stack again within
    /// the kernel epsilon.
    fn exits_immediately(&self, region: usize, x: &Point3, u: &Vector3) -> bool {
        self.howfar(Some(region), x, u, f64::INFINITY)
            .is_some_and(|c| c.region.is_none() && c.distance <= config::get().epsilon)
    }

    fn howfar_inside(&self, region: usize, x: &Point3, u: &Vector3, max: f64) -> Option<Crossing> {
        let (il, ir) = (region / self.stride, region % self.stride);
        let layer = &self.layers[il];
        let p = x.coords.dot(&self.axis);
        let up = u.dot(&self.axis);

        let (dir, tp) = self.plane_step(il, p, up);
        let mut t = max;
        let hits_plane = dir != 0 && tp <= t;
        if hits_plane {
            t = tp;
        }

        let mut best = None;
        if let Some(c) = layer.cones[ir].howfar(Some(0), x, u, t) {
            t = c.distance;
            let next = (ir + 1 < layer.ring_count()).then_some(il * self.stride + ir + 1);
            best = Some(Crossing::new(next, c.distance, c.normal));
        }
        if ir > 0 {
            if let Some(c) = layer.cones[ir - 1].howfar(None, x, u, t) {
                best = Some(Crossing::new(Some(region - 1), c.distance, c.normal));
            }
        }
        if best.is_some() || !hits_plane {
            return best;
        }

        let normal = self.plane_normal(dir);
        let Some(next_layer) = self.neighbour(il, dir) else {
            return Some(Crossing::new(None, tp, normal));
        };
        let next = if dir > 0 && layer.joins_next {
            Some(region + self.stride)
        } else if dir < 0 && layer.joins_previous {
            Some(region - self.stride)
        } else {
            self.layers[next_layer]
                .ring_at(&(x + u * tp))
                .map(|r| next_layer * self.stride + r)
        };
        Some(Crossing::new(next, tp, normal))
    }

    /// Entry through the shared outer cylinder when every layer has the
    /// same outer radius.
    fn howfar_common_envelope(&self, x: &Point3, u: &Vector3, max: f64) -> Option<Crossing> {
        if let Some(r) = self.is_where(x) {
            if self.exits_immediately(r, x, u) {
                return None;
            }
        }
        let c = self.layers[0].outer().howfar(None, x, u, max)?;
        let up = u.dot(&self.axis);
        let aux = x.coords.dot(&self.axis) + up * c.distance;
        let (first, last) = (self.first(), self.last());
        if aux < first || aux > last || (aux == first && up <= 0.0) || (aux == last && up >= 0.0) {
            return None;
        }
        let il = self.layer_at(aux);
        let region = il * self.stride + self.layers[il].ring_count() - 1;
        Some(Crossing::new(Some(region), c.distance, c.normal))
    }

    fn howfar_outside(&self, x: &Point3, u: &Vector3, max: f64) -> Option<Crossing> {
        let p = x.coords.dot(&self.axis);
        let up = u.dot(&self.axis);
        let (first, last) = (self.first(), self.last());

        let mut il;
        let mut travelled = 0.0;
        let mut at = *x;

        if p <= first || p >= last {
            let (toward, plane, layer) = if p <= first {
                (up > 0.0, first, 0)
            } else {
                (up < 0.0, last, self.layers.len() - 1)
            };
            if !toward {
                return None;
            }
            let tp = (plane - p) / up;
            if tp > max {
                return None;
            }
            at = x + u * tp;
            travelled = tp;
            il = layer;
            if let Some(ir) = self.layers[il].ring_at(&at) {
                let region = il * self.stride + ir;
                // A glancing hit on a corner does not enter the stack.
                if self.exits_immediately(region, &at, u) {
                    return None;
                }
                let normal = if p <= first { -self.axis } else { self.axis };
                return Some(Crossing::new(Some(region), tp, normal));
            }
        } else {
            if self.same_outer_radius {
                return self.howfar_common_envelope(x, u, max);
            }
            il = self.layer_at(p);
            if self.layers[il].outer().is_inside(x)
                && !self.resolve_straddle(&mut il, x, u, p, up)
            {
                return None;
            }
        }

        loop {
            let (dir, tp) = self.plane_step(il, p, up);
            let outer = self.layers[il].outer();
            if let Some(c) = outer.howfar(None, &at, u, max - travelled) {
                if tp > travelled + c.distance {
                    let region = il * self.stride + self.layers[il].ring_count() - 1;
                    return Some(Crossing::new(Some(region), travelled + c.distance, c.normal));
                }
            }
            if dir == 0 || tp > max {
                return None;
            }
            il = self.neighbour(il, dir)?;
            travelled = tp;
            at = x + u * tp;
            if let Some(ir) = self.layers[il].ring_at(&at) {
                return Some(Crossing::new(
                    Some(il * self.stride + ir),
                    travelled,
                    self.plane_normal(dir),
                ));
            }
        }
    }

    /// Handles a point reported outside that lies within the outer cone of
    /// its layer. Returns `false` when the query must report no crossing.
    fn resolve_straddle(&self, il: &mut usize, x: &Point3, u: &Vector3, p: f64, up: f64) -> bool {
        let epsilon = config::get().epsilon;
        let (dir, tp) = self.plane_step(*il, p, up);
        if dir != 0 && tp < epsilon {
            let Some(next) = self.neighbour(*il, dir) else {
                return false;
            };
            *il = next;
            if !self.layers[next].outer().is_inside(x) {
                return true;
            }
        }
        let exit = self.layers[*il].outer().howfar(Some(0), x, u, f64::INFINITY);
        if exit.is_some_and(|c| c.region.is_none() && c.distance < epsilon) {
            return true;
        }
        warn!(
            x = ?x,
            layer = *il,
            plane_distance = tp,
            cone_distance = exit.map_or(f64::INFINITY, |c| c.distance),
            "cone stack queried from outside but the point is inside"
        );
        false
    }
}

impl Solid for ConeStack {
    fn region_count(&self) -> usize {
        self.layers.len() * self.stride
    }

    fn is_inside(&self, x: &Point3) -> bool {
        self.is_where(x).is_some()
    }

    fn is_where(&self, x: &Point3) -> Option<usize> {
        let p = x.coords.dot(&self.axis);
        if p < self.first() || p > self.last() {
            return None;
        }
        let il = self.layer_at(p);
        self.layers[il].ring_at(x).map(|ir| il * self.stride + ir)
    }

    fn is_real_region(&self, region: usize) -> bool {
        region < self.region_count()
            && region % self.stride < self.layers[region / self.stride].ring_count()
    }

    fn howfar(
        &self,
        region: Option<usize>,
        x: &Point3,
        u: &Vector3,
        max_distance: f64,
    ) -> Option<Crossing> {
        match region {
            Some(r) => self.howfar_inside(r, x, u, max_distance),
            None => self.howfar_outside(x, u, max_distance),
        }
    }

    fn hownear(&self, region: Option<usize>, x: &Point3) -> f64 {
        let p = x.coords.dot(&self.axis);
        if let Some(r) = region {
            let (il, ir) = (r / self.stride, r % self.stride);
            let layer = &self.layers[il];
            let planes = (p - self.planes[il]).min(self.planes[il + 1] - p);
            let mut cones = layer.cones[ir].hownear(Some(0), x);
            if ir > 0 {
                cones = cones.min(layer.cones[ir - 1].hownear(None, x));
            }
            return planes.min(cones);
        }
        // Outer cones of other layers are only reachable through a plane.
        if p <= self.first() {
            return self.first() - p;
        }
        if p >= self.last() {
            return p - self.last();
        }
        let il = self.layer_at(p);
        let planes = (p - self.planes[il]).min(self.planes[il + 1] - p);
        planes.min(self.layers[il].outer().hownear(None, x))
    }

    fn max_step(&self) -> usize {
        self.layers.iter().map(|l| 2 * l.ring_count() + 1).sum::<usize>() + 1
    }

    fn medium(&self, region: usize) -> Option<usize> {
        self.media.get(region)
    }
}
