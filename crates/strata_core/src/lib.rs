//! Strata Core
//!
//! Geometry and color primitives shared by the op-list encoder and the GPU
//! renderer.
//!
//! - [`geometry`]: points, affine transforms, float and integer rectangles
//! - [`curve`]: quadratic Bézier evaluation, cubic and arc approximation
//! - [`color`]: sRGB to premultiplied linear conversion

pub mod color;
pub mod curve;
pub mod geometry;

pub use color::{LinearRgba, Nrgba};
pub use curve::QuadSegment;
pub use geometry::{Affine2D, IPoint, IRect, Point, Rect};
