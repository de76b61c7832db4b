//! Quadratic Bézier math
//!
//! Evaluation, derivatives and splitting of quadratic segments, plus the two
//! approximations that turn other curves into quadratics: cubic subdivision
//! and elliptical arcs.

use crate::geometry::{Affine2D, Point, Rect};

/// Maximum recursion depth when approximating a cubic.
const MAX_CUBIC_SPLITS: u32 = 32;

/// Number of quadratic segments used for a full circle.
const SEGMENTS_PER_CIRCLE: u32 = 16;

/// Quadratic Bézier segment
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QuadSegment {
    pub from: Point,
    pub ctrl: Point,
    pub to: Point,
}

impl QuadSegment {
    pub const fn new(from: Point, ctrl: Point, to: Point) -> Self {
        Self { from, ctrl, to }
    }

    /// Straight line encoded as a quad with the midpoint as control.
    pub fn line(from: Point, to: Point) -> Self {
        Self::new(from, (from + to) * 0.5, to)
    }

    pub fn transform(&self, t: &Affine2D) -> Self {
        Self::new(
            t.transform_point(self.from),
            t.transform_point(self.ctrl),
            t.transform_point(self.to),
        )
    }

    /// Same curve traversed the other way.
    pub fn reversed(&self) -> Self {
        Self::new(self.to, self.ctrl, self.from)
    }

    /// B(t) = (1-t)² P0 + 2(1-t)t P1 + t² P2
    pub fn sample(&self, t: f32) -> Point {
        let t1 = 1.0 - t;
        self.from * (t1 * t1) + self.ctrl * (2.0 * t1 * t) + self.to * (t * t)
    }

    /// B'(t) = 2(1-t)(P1 - P0) + 2t(P2 - P1)
    pub fn d1(&self, t: f32) -> Point {
        (self.ctrl - self.from) * (2.0 * (1.0 - t)) + (self.to - self.ctrl) * (2.0 * t)
    }

    /// B''(t) = 2(P2 - 2P1 + P0)
    pub fn d2(&self) -> Point {
        (self.to - self.ctrl * 2.0 + self.from) * 2.0
    }

    /// Signed radius of curvature at `t`; negative when the curve bends
    /// clockwise. NaN for line-like segments.
    pub fn curvature(&self, t: f32) -> f32 {
        let d1 = self.d1(t);
        let d2 = self.d2();
        let a = d1.perp_dot(d2) as f64;
        if a.abs() < 1e-10 {
            return f32::NAN;
        }
        (((d1.x * d1.x + d1.y * d1.y) as f64).powf(1.5) / a) as f32
    }

    /// De Casteljau split at `t`.
    pub fn split(&self, t: f32) -> (QuadSegment, QuadSegment) {
        let mid = self.sample(t);
        let before = QuadSegment::new(self.from, lerp(self.from, self.ctrl, t), mid);
        let after = QuadSegment::new(mid, lerp(self.ctrl, self.to, t), self.to);
        (before, after)
    }

    /// Parameter of the x extremum, where dx/dt = 0.
    pub fn x_extremum(&self) -> Option<f32> {
        extremum(self.from.x, self.ctrl.x, self.to.x)
    }

    /// Parameter of the y extremum, where dy/dt = 0.
    pub fn y_extremum(&self) -> Option<f32> {
        extremum(self.from.y, self.ctrl.y, self.to.y)
    }

    /// Bounding box of the curve (not just its control points).
    pub fn bounds(&self) -> Rect {
        let mut min = Point::new(self.from.x.min(self.to.x), self.from.y.min(self.to.y));
        let mut max = Point::new(self.from.x.max(self.to.x), self.from.y.max(self.to.y));
        for t in [self.x_extremum(), self.y_extremum()].into_iter().flatten() {
            if t > 0.0 && t < 1.0 {
                let p = self.sample(t);
                min = Point::new(min.x.min(p.x), min.y.min(p.y));
                max = Point::new(max.x.max(p.x), max.y.max(p.y));
            }
        }
        Rect::from_min_max(min, max)
    }
}

fn lerp(p: Point, q: Point, t: f32) -> Point {
    Point::new((1.0 - t) * p.x + t * q.x, (1.0 - t) * p.y + t * q.y)
}

fn extremum(p0: f32, p1: f32, p2: f32) -> Option<f32> {
    let denom = p0 - 2.0 * p1 + p2;
    if denom == 0.0 {
        return None;
    }
    Some((p0 - p1) / denom)
}

// ─────────────────────────────────────────────────────────────────────────────
// Cubic approximation
// ─────────────────────────────────────────────────────────────────────────────

/// Approximate a cubic Bézier with quadratic segments appended to `quads`.
///
/// The tolerance is 0.001 of the longest side of the control hull.
pub fn split_cubic(
    from: Point,
    ctrl0: Point,
    ctrl1: Point,
    to: Point,
    quads: &mut Vec<QuadSegment>,
) {
    let hull = Rect::from_min_max(from, ctrl0)
        .canon()
        .union(&Rect::from_min_max(ctrl1, to).canon());
    let l = hull.dx().max(hull.dy());
    let max_dist = l * 0.001;
    approx_cubic(quads, 0, max_dist * max_dist, from, ctrl0, ctrl1, to);
}

fn approx_cubic(
    quads: &mut Vec<QuadSegment>,
    splits: u32,
    max_dist_sq: f32,
    from: Point,
    ctrl0: Point,
    ctrl1: Point,
    to: Point,
) -> u32 {
    // The quadratic sharing both endpoints has control (3c0 - p0 + 3c1 - p3) / 4.
    let q0 = ctrl0 * 3.0 - from;
    let q1 = ctrl1 * 3.0 - to;
    let c = (q0 + q1) * 0.25;
    if splits >= MAX_CUBIC_SPLITS {
        quads.push(QuadSegment::new(from, c, to));
        return splits;
    }
    // Error bound: sqrt(3)/36 * |q0 - q1|, compared squared.
    let v = q0 - q1;
    let d2 = (v.x * v.x + v.y * v.y) * 3.0 / (36.0 * 36.0);
    if d2 <= max_dist_sq {
        quads.push(QuadSegment::new(from, c, to));
        return splits;
    }
    let c0 = lerp(from, ctrl0, 0.5);
    let c1 = lerp(ctrl0, ctrl1, 0.5);
    let c2 = lerp(ctrl1, to, 0.5);
    let c01 = lerp(c0, c1, 0.5);
    let c12 = lerp(c1, c2, 0.5);
    let mid = lerp(c01, c12, 0.5);
    let splits = approx_cubic(quads, splits + 1, max_dist_sq, from, c0, c01, mid);
    approx_cubic(quads, splits, max_dist_sq, mid, c12, c2, to)
}

// ─────────────────────────────────────────────────────────────────────────────
// Arcs
// ─────────────────────────────────────────────────────────────────────────────

/// Transform stepping a point half a segment along an elliptical arc.
///
/// `p` is the start point and `f1`/`f2` are the ellipse foci (equal for a
/// circle). Applying the returned transform twice moves one full segment; the
/// intermediate point gives the quadratic control.
pub fn arc_transform(p: Point, f1: Point, f2: Point, angle: f32) -> (Affine2D, u32) {
    let angle_per_segment = 2.0 * std::f32::consts::PI / SEGMENTS_PER_CIRCLE as f32;
    let segments = ((angle / angle_per_segment).abs().ceil() as u32).max(1);

    let (rx, ry, alpha) = if f1 == f2 {
        let r = f1.distance(p) as f64;
        (r, r, 0.0f64)
    } else {
        // 2a = |PF1| + |PF2|, c² = a² - b²
        let a = 0.5 * (f1.distance(p) as f64 + f2.distance(p) as f64);
        let c = f1.distance(f2) as f64 * 0.5;
        let b = (a * a - c * c).sqrt();
        let (rx, ry) = if a > b { (a, b) } else { (b, a) };
        let alpha = if f1.x == f2.x {
            if f1.y < f2.y {
                -std::f64::consts::FRAC_PI_2
            } else {
                std::f64::consts::FRAC_PI_2
            }
        } else {
            (((f1.x - f2.x) as f64 * 0.5).abs() / c).acos()
        };
        (rx, ry, alpha)
    };

    let theta = angle / segments as f32;
    let center = (f1 + f2) * 0.5;
    let to_unit = Affine2D::IDENTITY
        .offset(-center)
        .rotate(Point::ZERO, -alpha as f32)
        .scale(Point::ZERO, Point::new((1.0 / rx) as f32, (1.0 / ry) as f32));
    let from_unit = to_unit.invert();
    let rot = Affine2D::IDENTITY.rotate(Point::ZERO, 0.5 * theta);
    (from_unit.then(&rot).then(&to_unit), segments)
}

/// Append the quadratic segments of an arc starting at `pen` to `quads`.
///
/// Returns the end point of the arc.
pub fn arc_to(pen: Point, f1: Point, f2: Point, angle: f32, quads: &mut Vec<QuadSegment>) -> Point {
    let (m, segments) = arc_transform(pen, f1, f2, angle);
    let mut p0 = pen;
    for _ in 0..segments {
        let p1 = m.transform_point(p0);
        let p2 = m.transform_point(p1);
        let ctrl = p1 * 2.0 - (p0 + p2) * 0.5;
        quads.push(QuadSegment::new(p0, ctrl, p2));
        p0 = p2;
    }
    p0
}
