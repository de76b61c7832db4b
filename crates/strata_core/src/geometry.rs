//! Geometry primitives
//!
//! Points, affine transforms and axis-aligned rectangles in both float and
//! integer (pixel) flavours. All types are small `Copy` values.

use std::ops::{Add, Mul, Neg, Sub};

use bytemuck::{Pod, Zeroable};

// ─────────────────────────────────────────────────────────────────────────────
// Points
// ─────────────────────────────────────────────────────────────────────────────

/// 2D point in float coordinates
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Component-wise division.
    pub fn div(self, s: f32) -> Self {
        Self::new(self.x / s, self.y / s)
    }

    pub fn dot(self, other: Point) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3D cross product.
    pub fn perp_dot(self, other: Point) -> f32 {
        self.x * other.y - self.y * other.x
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Point) -> f32 {
        (other - self).length()
    }

    /// Rotate 90 degrees clockwise (in a y-down coordinate system).
    pub fn rot90_cw(self) -> Self {
        Self::new(self.y, -self.x)
    }

    pub fn to_array(self) -> [f32; 2] {
        [self.x, self.y]
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Point {
    type Output = Point;

    fn mul(self, s: f32) -> Point {
        Point::new(self.x * s, self.y * s)
    }
}

impl Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

/// 2D point in integer pixel coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IPoint {
    pub x: i32,
    pub y: i32,
}

impl IPoint {
    pub const ZERO: IPoint = IPoint { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn to_point(self) -> Point {
        Point::new(self.x as f32, self.y as f32)
    }
}

impl Add for IPoint {
    type Output = IPoint;

    fn add(self, rhs: IPoint) -> IPoint {
        IPoint::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for IPoint {
    type Output = IPoint;

    fn sub(self, rhs: IPoint) -> IPoint {
        IPoint::new(self.x - rhs.x, self.y - rhs.y)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Affine transforms
// ─────────────────────────────────────────────────────────────────────────────

/// 2D affine transformation
///
/// Methods that modify a transform (`offset`, `scale`, `rotate`, `shear`)
/// append the operation, so it is applied after the existing transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine2D {
    /// Matrix elements [a, b, c, d, tx, ty]
    /// | a  c  tx |
    /// | b  d  ty |
    /// | 0  0   1 |
    pub elements: [f32; 6],
}

impl Default for Affine2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine2D {
    pub const IDENTITY: Affine2D = Affine2D {
        elements: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
    };

    /// Create a transform from row-major elements: rows `[sx hx ox]` and
    /// `[hy sy oy]`.
    pub const fn new(sx: f32, hx: f32, ox: f32, hy: f32, sy: f32, oy: f32) -> Self {
        Self {
            elements: [sx, hy, hx, sy, ox, oy],
        }
    }

    pub fn translation(x: f32, y: f32) -> Self {
        Self::new(1.0, 0.0, x, 0.0, 1.0, y)
    }

    pub fn scaling(sx: f32, sy: f32) -> Self {
        Self::new(sx, 0.0, 0.0, 0.0, sy, 0.0)
    }

    pub fn rotation(angle: f32) -> Self {
        Self::IDENTITY.rotate(Point::ZERO, angle)
    }

    /// Row-major elements `(sx, hx, ox, hy, sy, oy)`.
    pub fn elems(&self) -> (f32, f32, f32, f32, f32, f32) {
        let [a, b, c, d, tx, ty] = self.elements;
        (a, c, tx, b, d, ty)
    }

    pub fn transform_point(&self, point: Point) -> Point {
        let [a, b, c, d, tx, ty] = self.elements;
        Point::new(a * point.x + c * point.y + tx, b * point.x + d * point.y + ty)
    }

    /// Concatenate this transform with another (self * other)
    /// The resulting transform first applies `other`, then `self`.
    pub fn then(&self, other: &Affine2D) -> Affine2D {
        let [a1, b1, c1, d1, tx1, ty1] = self.elements;
        let [a2, b2, c2, d2, tx2, ty2] = other.elements;
        Affine2D {
            elements: [
                a1 * a2 + c1 * b2,
                b1 * a2 + d1 * b2,
                a1 * c2 + c1 * d2,
                b1 * c2 + d1 * d2,
                a1 * tx2 + c1 * ty2 + tx1,
                b1 * tx2 + d1 * ty2 + ty1,
            ],
        }
    }

    /// Translate after the transform.
    pub fn offset(&self, offset: Point) -> Affine2D {
        let mut t = *self;
        t.elements[4] += offset.x;
        t.elements[5] += offset.y;
        t
    }

    /// Scale around `origin` after the transform.
    pub fn scale(&self, origin: Point, factor: Point) -> Affine2D {
        self.around(origin, |t| {
            let [a, b, c, d, tx, ty] = t.elements;
            Affine2D {
                elements: [
                    a * factor.x,
                    b * factor.y,
                    c * factor.x,
                    d * factor.y,
                    tx * factor.x,
                    ty * factor.y,
                ],
            }
        })
    }

    /// Rotate counter-clockwise by `radians` around `origin` after the
    /// transform.
    pub fn rotate(&self, origin: Point, radians: f32) -> Affine2D {
        self.around(origin, |t| {
            let (s, c) = radians.sin_cos();
            Affine2D::new(c, -s, 0.0, s, c, 0.0).then(t)
        })
    }

    /// Shear by the given angles around `origin` after the transform.
    pub fn shear(&self, origin: Point, radians_x: f32, radians_y: f32) -> Affine2D {
        self.around(origin, |t| {
            Affine2D::new(1.0, radians_x.tan(), 0.0, radians_y.tan(), 1.0, 0.0).then(t)
        })
    }

    fn around(&self, origin: Point, op: impl FnOnce(&Affine2D) -> Affine2D) -> Affine2D {
        if origin == Point::ZERO {
            return op(self);
        }
        op(&self.offset(-origin)).offset(origin)
    }

    /// Inverse transform. Near-singular matrices give large or infinite
    /// coefficients.
    pub fn invert(&self) -> Affine2D {
        let [a, b, c, d, tx, ty] = self.elements;
        if a == 1.0 && b == 0.0 && c == 0.0 && d == 1.0 {
            return Affine2D::translation(-tx, -ty);
        }
        let det = a * d - b * c;
        let (ia, ib, ic, id) = (d / det, -b / det, -c / det, a / det);
        Affine2D {
            elements: [ia, ib, ic, id, -ia * tx - ic * ty, -ib * tx - id * ty],
        }
    }

    /// Split into the linear part and the translation.
    pub fn split(&self) -> (Affine2D, Point) {
        let [a, b, c, d, tx, ty] = self.elements;
        (
            Affine2D {
                elements: [a, b, c, d, 0.0, 0.0],
            },
            Point::new(tx, ty),
        )
    }

    /// True when the transform is a pure translation.
    pub fn is_offset(&self) -> bool {
        let [a, b, c, d, _, _] = self.elements;
        a == 1.0 && b == 0.0 && c == 0.0 && d == 1.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rectangles
// ─────────────────────────────────────────────────────────────────────────────

/// Axis-aligned float rectangle containing the points `min <= p < max`
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        min: Point::ZERO,
        max: Point::ZERO,
    };

    /// Rectangle spanning two corners, swapped as needed to be well formed.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Rect {
            min: Point::new(x0, y0),
            max: Point::new(x1, y1),
        }
        .canon()
    }

    pub const fn from_min_max(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn size(&self) -> Point {
        Point::new(self.dx(), self.dy())
    }

    pub fn dx(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn dy(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn is_empty(&self) -> bool {
        self.min.x >= self.max.x || self.min.y >= self.max.y
    }

    /// Intersection; the zero rectangle when the operands do not overlap.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let r = Rect {
            min: Point::new(self.min.x.max(other.min.x), self.min.y.max(other.min.y)),
            max: Point::new(self.max.x.min(other.max.x), self.max.y.min(other.max.y)),
        };
        if r.is_empty() {
            Rect::ZERO
        } else {
            r
        }
    }

    /// Smallest rectangle containing both. Empty operands are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    /// Swap corners so that `min` is above and left of `max`.
    pub fn canon(&self) -> Rect {
        let mut r = *self;
        if r.max.x < r.min.x {
            std::mem::swap(&mut r.min.x, &mut r.max.x);
        }
        if r.max.y < r.min.y {
            std::mem::swap(&mut r.min.y, &mut r.max.y);
        }
        r
    }

    pub fn add(&self, p: Point) -> Rect {
        Rect {
            min: self.min + p,
            max: self.max + p,
        }
    }

    pub fn sub(&self, p: Point) -> Rect {
        Rect {
            min: self.min - p,
            max: self.max - p,
        }
    }

    /// Smallest integer rectangle containing this one.
    pub fn round(&self) -> IRect {
        IRect {
            min: IPoint::new(self.min.x.floor() as i32, self.min.y.floor() as i32),
            max: IPoint::new(self.max.x.ceil() as i32, self.max.y.ceil() as i32),
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        self.min.x <= p.x && p.x < self.max.x && self.min.y <= p.y && p.y < self.max.y
    }

    /// True if `other` lies entirely inside this rectangle. Empty rectangles
    /// are contained in everything.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.is_empty()
            || (self.min.x <= other.min.x
                && self.min.y <= other.min.y
                && other.max.x <= self.max.x
                && other.max.y <= self.max.y)
    }
}

/// Axis-aligned integer rectangle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IRect {
    pub min: IPoint,
    pub max: IPoint,
}

impl IRect {
    pub const ZERO: IRect = IRect {
        min: IPoint::ZERO,
        max: IPoint::ZERO,
    };

    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            min: IPoint::new(x0, y0),
            max: IPoint::new(x1, y1),
        }
    }

    /// Rectangle with its origin at zero and the given size.
    pub const fn from_size(size: IPoint) -> Self {
        Self {
            min: IPoint::ZERO,
            max: size,
        }
    }

    pub fn dx(&self) -> i32 {
        self.max.x - self.min.x
    }

    pub fn dy(&self) -> i32 {
        self.max.y - self.min.y
    }

    pub fn size(&self) -> IPoint {
        IPoint::new(self.dx(), self.dy())
    }

    pub fn is_empty(&self) -> bool {
        self.min.x >= self.max.x || self.min.y >= self.max.y
    }

    pub fn intersect(&self, other: &IRect) -> IRect {
        let r = IRect {
            min: IPoint::new(self.min.x.max(other.min.x), self.min.y.max(other.min.y)),
            max: IPoint::new(self.max.x.min(other.max.x), self.max.y.min(other.max.y)),
        };
        if r.is_empty() {
            IRect::ZERO
        } else {
            r
        }
    }

    pub fn union(&self, other: &IRect) -> IRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        IRect {
            min: IPoint::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: IPoint::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    pub fn add(&self, p: IPoint) -> IRect {
        IRect {
            min: self.min + p,
            max: self.max + p,
        }
    }

    pub fn sub(&self, p: IPoint) -> IRect {
        IRect {
            min: self.min - p,
            max: self.max - p,
        }
    }

    pub fn to_rect(&self) -> Rect {
        Rect {
            min: self.min.to_point(),
            max: self.max.to_point(),
        }
    }

    /// True if `other` lies entirely inside this rectangle.
    pub fn contains_rect(&self, other: &IRect) -> bool {
        other.is_empty()
            || (self.min.x <= other.min.x
                && self.min.y <= other.min.y
                && other.max.x <= self.max.x
                && other.max.y <= self.max.y)
    }

    pub fn overlaps(&self, other: &IRect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }
}
