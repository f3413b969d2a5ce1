use slotmap::{new_key_type, SlotMap};
use tracing::debug;

use crate::error::{GeometryError, Result};
use crate::math::distance_2d::{ray_distance, segment_distance};
use crate::math::{cross_2d, Point2, Vector2};

new_key_type! {
    /// Handle of an outline stored in a [`Polygon2d`] arena.
    pub struct OutlineId;
}

/// Squared distance below which consecutive vertices are merged.
const DUPLICATE_TOLERANCE_SQ: f64 = 1e-8;

/// Cross-product magnitude below which a vertex counts as collinear with its
/// neighbours.
const COLLINEAR_TOLERANCE: f64 = 1e-6;

/// A boundary crossing found by [`Polygon2d::howfar`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeHit {
    /// Distance along the (not necessarily unit) direction, in units of its
    /// length.
    pub distance: f64,
    /// Unit edge normal oriented against the direction of travel.
    pub normal: Vector2,
    /// Index of the crossed edge.
    pub edge: usize,
}

/// Convex hull and cutouts of a non-convex outline.
#[derive(Debug, Clone)]
struct Decomposition {
    hull: OutlineId,
    cutouts: Vec<OutlineId>,
}

/// Edge representation of one closed outline.
#[derive(Debug, Clone)]
struct Outline {
    /// Vertices with the first repeated at the end.
    points: Vec<Point2>,
    edges: Vec<Vector2>,
    edge_len_sq: Vec<f64>,
    /// Inward unit normals.
    normals: Vec<Vector2>,
    offsets: Vec<f64>,
    /// Whether every vertex lies on the inner side of the edge line.
    supporting: Vec<bool>,
    min: Point2,
    max: Point2,
    open: bool,
    decomposition: Option<Decomposition>,
}

impl Outline {
    fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges taking part in inside tests; an open wedge drops its closing edge.
    fn active_edges(&self) -> usize {
        if self.open {
            2
        } else {
            self.edges.len()
        }
    }

    fn is_convex(&self) -> bool {
        self.decomposition.is_none()
    }

    fn inside_edge(&self, j: usize, x: &Point2) -> bool {
        self.normals[j].dot(&x.coords) >= self.offsets[j]
    }

    fn in_bounds(&self, x: &Point2) -> bool {
        x.x >= self.min.x && x.x <= self.max.x && x.y >= self.min.y && x.y <= self.max.y
    }
}

/// A simple polygon in the plane.
///
/// Non-convex polygons are decomposed at construction into a convex hull
/// minus a set of cutouts. All outlines live in a private arena so the
/// decomposition can nest without owning pointers.
#[derive(Debug, Clone)]
pub struct Polygon2d {
    outlines: SlotMap<OutlineId, Outline>,
    root: OutlineId,
}

impl Polygon2d {
    /// Creates a closed polygon from its vertices in either winding order.
    ///
    /// The loop is closed automatically; near-duplicate and collinear
    /// vertices are dropped.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::Degenerate` if fewer than three distinct
    /// non-collinear vertices remain, or if a non-convex outline cannot be
    /// decomposed.
    pub fn new(points: &[Point2]) -> Result<Self> {
        Self::build(points, false)
    }

    /// Creates an open wedge from three vertices.
    ///
    /// The second vertex is the apex; the wedge is bounded by the half-lines
    /// from the apex through the first and through the third vertex.
    ///
    /// # Errors
    ///
    /// Returns `GeometryError::Degenerate` unless exactly three distinct
    /// non-collinear vertices are given.
    pub fn open(points: &[Point2]) -> Result<Self> {
        Self::build(points, true)
    }

    fn build(points: &[Point2], open: bool) -> Result<Self> {
        let mut outlines = SlotMap::with_key();
        let root = insert_outline(&mut outlines, points, open)?;
        Ok(Self { outlines, root })
    }

    fn root(&self) -> &Outline {
        &self.outlines[self.root]
    }

    /// Returns the number of vertices (equal to the number of edges).
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.root().edge_count()
    }

    /// Returns the vertices after normalisation, without the closing repeat.
    #[must_use]
    pub fn vertices(&self) -> &[Point2] {
        let root = self.root();
        &root.points[..root.edge_count()]
    }

    /// Returns the inward unit normal of edge `j`.
    #[must_use]
    pub fn edge_normal(&self, j: usize) -> Option<Vector2> {
        self.root().normals.get(j).copied()
    }

    #[must_use]
    pub fn is_convex(&self) -> bool {
        self.root().is_convex()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.root().open
    }

    /// Returns the convex hull vertices of a non-convex polygon.
    #[must_use]
    pub fn hull_vertices(&self) -> Option<&[Point2]> {
        let decomposition = self.root().decomposition.as_ref()?;
        let hull = &self.outlines[decomposition.hull];
        Some(&hull.points[..hull.edge_count()])
    }

    /// Returns the vertex lists of the top-level cutouts.
    pub fn cutout_vertices(&self) -> impl Iterator<Item = &[Point2]> + '_ {
        self.root()
            .decomposition
            .iter()
            .flat_map(|d| d.cutouts.iter())
            .map(|&id| {
                let cutout = &self.outlines[id];
                &cutout.points[..cutout.edge_count()]
            })
    }

    /// Checks whether `x` lies inside the polygon (boundary included).
    #[must_use]
    pub fn is_inside(&self, x: &Point2) -> bool {
        self.contains(self.root, x)
    }

    fn contains(&self, id: OutlineId, x: &Point2) -> bool {
        let outline = &self.outlines[id];
        if !outline.open && !outline.in_bounds(x) {
            return false;
        }
        match &outline.decomposition {
            None => (0..outline.active_edges()).all(|j| outline.inside_edge(j, x)),
            Some(d) => {
                self.contains(d.hull, x) && !d.cutouts.iter().any(|&c| self.contains(c, x))
            }
        }
    }

    /// Distance from `x` to the nearest point of the boundary.
    #[must_use]
    pub fn hownear(&self, x: &Point2) -> f64 {
        let root = self.root();
        if root.open {
            let apex = root.points[1];
            return ray_distance(x, &apex, &(-root.edges[0]))
                .min(ray_distance(x, &apex, &root.edges[1]));
        }
        root.points
            .windows(2)
            .map(|w| segment_distance(x, &w[0], &w[1]))
            .fold(f64::INFINITY, f64::min)
    }

    /// Finds the first boundary crossing of the ray `x + t·u` with
    /// `0 ≤ t ≤ max_distance`.
    ///
    /// # Arguments
    ///
    /// * `inside` - whether the ray starts inside the polygon
    /// * `x` - ray origin
    /// * `u` - ray direction; distances are in units of its length
    /// * `max_distance` - largest distance of interest
    #[must_use]
    pub fn howfar(
        &self,
        inside: bool,
        x: &Point2,
        u: &Vector2,
        max_distance: f64,
    ) -> Option<EdgeHit> {
        let o = self.root();
        let mut t = max_distance;
        let mut hit = None;

        for j in 0..o.active_edges() {
            let a = &o.normals[j];
            let up = u.dot(a);
            let xp = a.dot(&x.coords);
            if inside {
                if up >= 0.0 || xp < o.offsets[j] {
                    continue;
                }
                let tt = (o.offsets[j] - xp) / up;
                if tt > t {
                    continue;
                }
                // A non-supporting edge line can be crossed outside the edge
                // itself while the ray is still inside.
                let ok = o.is_convex() || o.supporting[j] || {
                    let lam = o.edges[j].dot(&(x + u * tt - o.points[j]));
                    (0.0..o.edge_len_sq[j]).contains(&lam)
                };
                if ok {
                    t = tt;
                    hit = Some(EdgeHit {
                        distance: tt,
                        normal: *a,
                        edge: j,
                    });
                }
            } else {
                if up <= 0.0 || xp > o.offsets[j] {
                    continue;
                }
                let tt = (o.offsets[j] - xp) / up;
                if tt > t {
                    continue;
                }
                let lam = o.edges[j].dot(&(x + u * tt - o.points[j]));
                let ok = match (o.open, j) {
                    (true, 0) => lam < o.edge_len_sq[0],
                    (true, _) => lam > 0.0,
                    (false, _) => (0.0..o.edge_len_sq[j]).contains(&lam),
                };
                if ok {
                    t = tt;
                    hit = Some(EdgeHit {
                        distance: tt,
                        normal: -a,
                        edge: j,
                    });
                }
            }
        }
        hit
    }
}

/// Removes near-duplicate and collinear vertices; returns an open vertex
/// list (no closing repeat).
fn normalize_vertices(points: &[Point2]) -> Result<Vec<Point2>> {
    let mut pts: Vec<Point2> = Vec::with_capacity(points.len() + 1);
    for p in points {
        if pts
            .last()
            .is_none_or(|q| (p - q).norm_squared() > DUPLICATE_TOLERANCE_SQ)
        {
            pts.push(*p);
        }
    }
    while pts.len() > 1 && (pts[0] - pts[pts.len() - 1]).norm_squared() <= DUPLICATE_TOLERANCE_SQ
    {
        pts.pop();
    }

    let mut changed = true;
    while changed && pts.len() >= 3 {
        changed = false;
        let n = pts.len();
        for j in 0..n {
            let prev = pts[(j + n - 1) % n];
            let next = pts[(j + 1) % n];
            if cross_2d(&(pts[j] - prev), &(next - prev)).abs() < COLLINEAR_TOLERANCE {
                pts.remove(j);
                changed = true;
                break;
            }
        }
    }

    if pts.len() < 3 {
        return Err(GeometryError::Degenerate(
            "polygon needs at least three distinct non-collinear vertices".into(),
        )
        .into());
    }
    Ok(pts)
}

/// Twice the signed area (shoelace formula); positive for counter-clockwise.
fn twice_signed_area(points: &[Point2]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let j = (i + 1) % n;
            points[i].x * points[j].y - points[j].x * points[i].y
        })
        .sum()
}

fn insert_outline(
    arena: &mut SlotMap<OutlineId, Outline>,
    points: &[Point2],
    open: bool,
) -> Result<OutlineId> {
    let mut points = normalize_vertices(points)?;
    let n = points.len();
    if open && n != 3 {
        return Err(
            GeometryError::Degenerate(format!("an open polygon needs 3 vertices, got {n}")).into(),
        );
    }
    let ccw = twice_signed_area(&points) > 0.0;
    points.push(points[0]);

    let mut edges = Vec::with_capacity(n);
    let mut edge_len_sq = Vec::with_capacity(n);
    let mut normals = Vec::with_capacity(n);
    let mut offsets = Vec::with_capacity(n);
    let mut min = points[0];
    let mut max = points[0];
    for w in points.windows(2) {
        let u = w[1] - w[0];
        let a = if ccw {
            Vector2::new(-u.y, u.x)
        } else {
            Vector2::new(u.y, -u.x)
        }
        .normalize();
        offsets.push(a.dot(&w[0].coords));
        normals.push(a);
        edge_len_sq.push(u.norm_squared());
        edges.push(u);
        min = min.inf(&w[1]);
        max = max.sup(&w[1]);
    }

    // A triangle is always convex.
    let mut supporting = vec![true; n];
    if n > 3 {
        for (j, flag) in supporting.iter_mut().enumerate() {
            *flag = points[..n]
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != j && i != (j + 1) % n)
                .all(|(_, p)| normals[j].dot(&p.coords) >= offsets[j]);
        }
    }
    let convex = supporting.iter().all(|&s| s);

    let decomposition = if convex {
        None
    } else {
        Some(decompose(arena, &points, ccw)?)
    };
    if let Some(d) = &decomposition {
        debug!(vertices = n, cutouts = d.cutouts.len(), "decomposed non-convex polygon");
    }

    Ok(arena.insert(Outline {
        points,
        edges,
        edge_len_sq,
        normals,
        offsets,
        supporting,
        min,
        max,
        open,
        decomposition,
    }))
}

/// Splits a non-convex closed outline into its convex hull and the pockets
/// between hull and outline.
///
/// Walks the vertices starting from the lowest (then leftmost) vertex,
/// which always lies on the hull, and greedily extends
/// the hull chain while every remaining vertex stays on the inner side of
/// the candidate hull edge; vertices skipped by the chain form a cutout
/// together with the two hull vertices around them.
fn decompose(
    arena: &mut SlotMap<OutlineId, Outline>,
    points: &[Point2],
    ccw: bool,
) -> Result<Decomposition> {
    let n = points.len() - 1;
    let mut start = 0;
    for (j, p) in points[..n].iter().enumerate() {
        let lowest = &points[start];
        if p.y < lowest.y || (p.y == lowest.y && p.x < lowest.x) {
            start = j;
        }
    }
    let pp: Vec<Point2> = (0..=n).map(|k| points[(start + k) % n]).collect();

    let mut hull = vec![pp[0]];
    let mut pocket: Vec<Point2> = Vec::new();
    let mut cutouts = Vec::new();
    let mut on_hull = true;

    for j in 1..=n {
        let last = hull[hull.len() - 1];
        let s = pp[j] - last;
        let perp = if ccw {
            Vector2::new(-s.y, s.x)
        } else {
            Vector2::new(s.y, -s.x)
        };
        let ds = perp.dot(&last.coords);
        let all_inside = pp[j + 1..].iter().all(|p| perp.dot(&p.coords) >= ds);

        if all_inside {
            if !on_hull {
                pocket.push(pp[j]);
                if pocket.len() > n {
                    return Err(GeometryError::Degenerate(
                        "polygon cutout does not shrink".into(),
                    )
                    .into());
                }
                cutouts.push(insert_outline(arena, &pocket, false)?);
                pocket.clear();
            }
            on_hull = true;
            hull.push(pp[j]);
        } else {
            if on_hull {
                on_hull = false;
                pocket.push(last);
            }
            pocket.push(pp[j]);
        }
    }

    // Every recursive call must see fewer vertices.
    if hull.len() > n {
        return Err(
            GeometryError::Degenerate("convex hull walk removed no vertex".into()).into(),
        );
    }
    let hull = insert_outline(arena, &hull, false)?;
    Ok(Decomposition { hull, cutouts })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::TOLERANCE;

    fn unit_square() -> Polygon2d {
        Polygon2d::new(&[
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ])
        .unwrap()
    }

    fn l_shape() -> Polygon2d {
        Polygon2d::new(&[
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 2.0),
            Point2::new(0.0, 2.0),
        ])
        .unwrap()
    }

    /// Even-odd ray casting, used as an independent reference.
    fn crossing_number(vertices: &[Point2], x: &Point2) -> bool {
        let n = vertices.len();
        let mut inside = false;
        for i in 0..n {
            let a = vertices[i];
            let b = vertices[(i + 1) % n];
            if (a.y > x.y) != (b.y > x.y) {
                let xc = a.x + (x.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if x.x < xc {
                    inside = !inside;
                }
            }
        }
        inside
    }

    // ── construction ──

    #[test]
    fn square_is_convex() {
        let sq = unit_square();
        assert!(sq.is_convex());
        assert_eq!(sq.vertex_count(), 4);
        assert!(sq.hull_vertices().is_none());
    }

    #[test]
    fn closing_duplicate_and_collinear_vertices_are_dropped() {
        let p = Polygon2d::new(&[
            Point2::new(0.0, 0.0),
            Point2::new(0.5, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 1.0 + 1e-6),
            Point2::new(0.0, 1.0),
            Point2::new(0.0, 0.0),
        ])
        .unwrap();
        assert_eq!(p.vertex_count(), 4);
    }

    #[test]
    fn winding_is_normalised() {
        let cw = Polygon2d::new(&[
            Point2::new(0.0, 0.0),
            Point2::new(0.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 0.0),
        ])
        .unwrap();
        let n0 = cw.edge_normal(0).unwrap();
        // Edge (0,0)->(0,1) has its inward normal pointing to +x.
        assert!((n0 - Vector2::new(1.0, 0.0)).norm() < TOLERANCE);
        assert!(cw.is_inside(&Point2::new(0.5, 0.5)));
        assert!(!cw.is_inside(&Point2::new(1.5, 0.5)));
    }

    #[test]
    fn degenerate_input_is_rejected() {
        assert!(Polygon2d::new(&[Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)]).is_err());
        let collinear = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
        ];
        assert!(Polygon2d::new(&collinear).is_err());
    }

    #[test]
    fn open_requires_three_vertices() {
        let square = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        assert!(Polygon2d::open(&square).is_err());
    }

    // ── decomposition ──

    #[test]
    fn l_shape_decomposes_into_hull_and_one_cutout() {
        let l = l_shape();
        assert!(!l.is_convex());
        assert_eq!(l.hull_vertices().unwrap().len(), 5);
        let cutouts: Vec<_> = l.cutout_vertices().collect();
        assert_eq!(cutouts.len(), 1);
        assert_eq!(cutouts[0].len(), 3);
    }

    #[test]
    fn non_convex_inside_matches_ray_casting() {
        let star = Polygon2d::new(&[
            Point2::new(0.0, 0.0),
            Point2::new(4.0, 0.0),
            Point2::new(4.0, 3.0),
            Point2::new(3.0, 1.0),
            Point2::new(2.0, 3.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 3.0),
        ])
        .unwrap();
        assert!(!star.is_convex());
        let vertices = star.vertices().to_vec();
        for i in 0..41 {
            for k in 0..33 {
                // Offsets keep samples off the boundary.
                let x = Point2::new(-0.0137 + 0.1 * f64::from(i), -0.0213 + 0.1 * f64::from(k));
                assert_eq!(
                    star.is_inside(&x),
                    crossing_number(&vertices, &x),
                    "mismatch at {x:?}"
                );
            }
        }
    }

    #[test]
    fn notched_triangle_without_hull_edges_decomposes() {
        // Every edge is notched, so no polygon edge lies on the hull.
        let notched = Polygon2d::new(&[
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.3),
            Point2::new(4.0, 0.0),
            Point2::new(2.7, 1.5),
            Point2::new(2.0, 3.46),
            Point2::new(1.3, 1.5),
        ])
        .unwrap();
        assert!(!notched.is_convex());
        assert_eq!(notched.hull_vertices().unwrap().len(), 3);
        assert_eq!(notched.cutout_vertices().count(), 3);
        let vertices = notched.vertices().to_vec();
        for i in 0..46 {
            for k in 0..41 {
                let x = Point2::new(-0.4137 + 0.1 * f64::from(i), -0.3213 + 0.1 * f64::from(k));
                assert_eq!(
                    notched.is_inside(&x),
                    crossing_number(&vertices, &x),
                    "mismatch at {x:?}"
                );
            }
        }
    }

    // ── queries ──

    #[test]
    fn square_hownear_from_center() {
        let sq = unit_square();
        assert!((sq.hownear(&Point2::new(0.5, 0.5)) - 0.5).abs() < TOLERANCE);
    }

    #[test]
    fn hownear_uses_corner_outside() {
        let sq = unit_square();
        let d = sq.hownear(&Point2::new(4.0, 5.0));
        assert!((d - 5.0).abs() < TOLERANCE);
    }

    #[test]
    fn square_howfar_exit_and_entry() {
        let sq = unit_square();
        let hit = sq
            .howfar(true, &Point2::new(0.25, 0.5), &Vector2::new(1.0, 0.0), 10.0)
            .unwrap();
        assert!((hit.distance - 0.75).abs() < TOLERANCE);
        assert!((hit.normal - Vector2::new(-1.0, 0.0)).norm() < TOLERANCE);

        let hit = sq
            .howfar(false, &Point2::new(-2.0, 0.5), &Vector2::new(1.0, 0.0), 10.0)
            .unwrap();
        assert!((hit.distance - 2.0).abs() < TOLERANCE);
        assert!((hit.normal - Vector2::new(-1.0, 0.0)).norm() < TOLERANCE);
    }

    #[test]
    fn howfar_respects_max_distance() {
        let sq = unit_square();
        let from = Point2::new(-2.0, 0.5);
        assert!(sq.howfar(false, &from, &Vector2::new(1.0, 0.0), 1.5).is_none());
        // Passing beside the square.
        assert!(sq
            .howfar(false, &Point2::new(-2.0, 1.5), &Vector2::new(1.0, 0.0), 10.0)
            .is_none());
    }

    #[test]
    fn l_shape_exit_skips_phantom_edge_line() {
        let l = l_shape();
        let hit = l
            .howfar(true, &Point2::new(0.5, 0.5), &Vector2::new(1.0, 0.0), 10.0)
            .unwrap();
        assert!((hit.distance - 1.5).abs() < TOLERANCE);

        let hit = l
            .howfar(true, &Point2::new(0.5, 1.5), &Vector2::new(1.0, 0.0), 10.0)
            .unwrap();
        assert!((hit.distance - 0.5).abs() < TOLERANCE);
    }

    #[test]
    fn l_shape_entry_into_notch_walls() {
        let l = l_shape();
        let from = Point2::new(1.5, 1.5);
        assert!(!l.is_inside(&from));
        let hit = l.howfar(false, &from, &Vector2::new(-1.0, 0.0), 10.0).unwrap();
        assert!((hit.distance - 0.5).abs() < TOLERANCE);
        assert!((hit.normal - Vector2::new(1.0, 0.0)).norm() < TOLERANCE);
        let hit = l.howfar(false, &from, &Vector2::new(0.0, -1.0), 10.0).unwrap();
        assert!((hit.distance - 0.5).abs() < TOLERANCE);
    }

    // ── open wedge ──

    #[test]
    fn open_wedge_is_unbounded() {
        let wedge = Polygon2d::open(&[
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 0.0),
            Point2::new(0.0, 1.0),
        ])
        .unwrap();
        assert!(wedge.is_open());
        assert!(wedge.is_inside(&Point2::new(50.0, 70.0)));
        assert!(!wedge.is_inside(&Point2::new(-1.0, 3.0)));
        assert!((wedge.hownear(&Point2::new(5.0, 2.0)) - 2.0).abs() < TOLERANCE);
        assert!((wedge.hownear(&Point2::new(-3.0, -4.0)) - 5.0).abs() < TOLERANCE);

        let hit = wedge
            .howfar(true, &Point2::new(5.0, 2.0), &Vector2::new(0.0, -1.0), 100.0)
            .unwrap();
        assert!((hit.distance - 2.0).abs() < TOLERANCE);
        let hit = wedge
            .howfar(false, &Point2::new(-1.0, 3.0), &Vector2::new(1.0, 0.0), 100.0)
            .unwrap();
        assert!((hit.distance - 1.0).abs() < TOLERANCE);
        // Entry beyond the first vertex along the infinite edge.
        let hit = wedge
            .howfar(false, &Point2::new(7.0, -1.0), &Vector2::new(0.0, 1.0), 100.0)
            .unwrap();
        assert!((hit.distance - 1.0).abs() < TOLERANCE);
    }
}
