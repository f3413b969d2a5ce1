pub mod polygon_2d;
pub mod polygon_3d;

pub use polygon_2d::{EdgeHit, Polygon2d};
pub use polygon_3d::{make_polygon, PlanarHit, PlanarPolygon};
