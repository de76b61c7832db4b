//! Clip operations and path construction
//!
//! A clip op intersects the current clip area with a shape: a pixel-aligned
//! rectangle, the outline of a path (non-zero winding), or a stroked path.
//! Path data is recorded in a macro in the op list itself, prefixed by a
//! path op carrying a content hash of the segments.

use std::hash::Hasher;

use rustc_hash::FxHasher;
use strata_core::curve::arc_transform;
use strata_core::{IRect, Point, Rect};

use crate::op::{CallOp, MacroOp};
use crate::ops::{
    put_f32, put_u32, OpType, Ops, Shape, StackId, StackKind, AUX_LEN, CLIP_LEN, PATH_LEN,
    POP_CLIP_LEN, STROKE_LEN,
};
use crate::scene::{Command, RECORD_SIZE};

/// Recorded path, ready for use in clip ops
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PathSpec {
    spec: Option<CallOp>,
    has_segments: bool,
    bounds: IRect,
    shape: Shape,
    hash: u64,
}

impl PathSpec {
    pub fn bounds(&self) -> IRect {
        self.bounds
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn has_segments(&self) -> bool {
        self.has_segments
    }
}

/// Builds a path from lines and Bézier curves
///
/// The builder borrows the op list for its whole lifetime since the segments
/// are written directly into it.
pub struct PathBuilder<'a> {
    ops: &'a mut Ops,
    recording: Option<MacroOp>,
    contour: u32,
    pen: Point,
    start: Point,
    has_segments: bool,
    bounds: Rect,
    hasher: FxHasher,
}

impl<'a> PathBuilder<'a> {
    pub fn begin(ops: &'a mut Ops) -> Self {
        let recording = MacroOp::record(ops);
        ops.write(AUX_LEN)[0] = OpType::Aux as u8;
        Self {
            ops,
            recording: Some(recording),
            contour: 1,
            pen: Point::ZERO,
            start: Point::ZERO,
            has_segments: false,
            bounds: Rect::ZERO,
            hasher: FxHasher::default(),
        }
    }

    /// Current pen position.
    pub fn pos(&self) -> Point {
        self.pen
    }

    pub fn move_to(&mut self, to: Point) {
        if self.pen == to {
            return;
        }
        self.gap();
        self.contour += 1;
        self.pen = to;
        self.start = to;
    }

    /// Move the pen by `delta`.
    pub fn move_by(&mut self, delta: Point) {
        self.move_to(self.pen + delta);
    }

    pub fn line_to(&mut self, to: Point) {
        self.expand(self.pen);
        self.cmd(Command::Line(self.pen, to));
        self.pen = to;
        self.expand(to);
    }

    pub fn quad_to(&mut self, ctrl: Point, to: Point) {
        self.expand(self.pen);
        self.cmd(Command::Quad(self.pen, ctrl, to));
        self.pen = to;
        self.expand(ctrl);
        self.expand(to);
    }

    pub fn cube_to(&mut self, ctrl0: Point, ctrl1: Point, to: Point) {
        if ctrl0 == self.pen && ctrl1 == self.pen && to == self.pen {
            return;
        }
        self.expand(self.pen);
        self.cmd(Command::Cubic(self.pen, ctrl0, ctrl1, to));
        self.pen = to;
        self.expand(ctrl0);
        self.expand(ctrl1);
        self.expand(to);
    }

    /// Elliptical arc from the pen, `angle` radians along the ellipse with
    /// foci `f1` and `f2`. Positive angles run counter-clockwise.
    pub fn arc_to(&mut self, f1: Point, f2: Point, angle: f32) {
        let (m, segments) = arc_transform(self.pen, f1, f2, angle);
        for _ in 0..segments {
            let p0 = self.pen;
            let p1 = m.transform_point(p0);
            let p2 = m.transform_point(p1);
            let ctrl = p1 * 2.0 - (p0 + p2) * 0.5;
            self.quad_to(ctrl, p2);
        }
    }

    /// Close the current contour.
    pub fn close(&mut self) {
        if self.pen != self.start {
            self.line_to(self.start);
        }
        self.contour += 1;
    }

    pub fn end(mut self) -> PathSpec {
        self.gap();
        let spec = self.recording.take().map(|m| m.stop(self.ops));
        PathSpec {
            spec,
            has_segments: self.has_segments,
            bounds: self.bounds.round(),
            shape: Shape::Path,
            hash: self.hasher.finish(),
        }
    }

    /// A contour that does not end where it started is closed by a gap.
    fn gap(&mut self) {
        if self.pen != self.start {
            self.cmd(Command::Gap(self.pen, self.start));
        }
    }

    fn cmd(&mut self, c: Command) {
        let contour = self.contour;
        let rec = self.ops.write(RECORD_SIZE);
        put_u32(rec, contour);
        c.encode(&mut rec[4..]);
        self.hasher.write(&rec[4..]);
    }

    fn expand(&mut self, p: Point) {
        if !self.has_segments {
            self.has_segments = true;
            self.bounds = Rect::from_min_max(p, p);
            return;
        }
        let b = &mut self.bounds;
        b.min = Point::new(b.min.x.min(p.x), b.min.y.min(p.y));
        b.max = Point::new(b.max.x.max(p.x), b.max.y.max(p.y));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clip ops
// ─────────────────────────────────────────────────────────────────────────────

/// A clip area, intersected with the current one when pushed
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipOp {
    path: PathSpec,
    outline: bool,
    width: f32,
}

/// A [`ClipOp`] pushed on the clip stack
#[must_use = "a pushed clip must be popped"]
#[derive(Debug)]
pub struct ClipStack {
    id: StackId,
    macro_id: u32,
}

impl ClipOp {
    pub fn push(&self, o: &mut Ops) -> ClipStack {
        let (id, macro_id) = o.push_op(StackKind::Clip);
        self.encode(o);
        ClipStack { id, macro_id }
    }

    fn encode(&self, o: &mut Ops) {
        let mut path = self.path;
        if !path.has_segments && self.width > 0.0 && path.shape == Shape::Rect {
            // Stroked rectangles need real geometry.
            let b = path.bounds.to_rect();
            let mut rect = PathBuilder::begin(o);
            rect.move_to(b.min);
            rect.line_to(Point::new(b.max.x, b.min.y));
            rect.line_to(b.max);
            rect.line_to(Point::new(b.min.x, b.max.y));
            rect.close();
            path = rect.end();
        }
        if path.has_segments {
            let data = o.write(PATH_LEN);
            data[0] = OpType::Path as u8;
            data[1..9].copy_from_slice(&path.hash.to_le_bytes());
            if let Some(spec) = path.spec {
                spec.add(o);
            }
        }

        let mut bounds = path.bounds;
        if self.width > 0.0 {
            // Expand bounds to cover the stroke.
            let half = (self.width * 0.5 + 0.5) as i32;
            bounds.min.x -= half;
            bounds.min.y -= half;
            bounds.max.x += half;
            bounds.max.y += half;
            let data = o.write(STROKE_LEN);
            data[0] = OpType::Stroke as u8;
            put_f32(&mut data[1..], self.width);
        }

        let data = o.write(CLIP_LEN);
        data[0] = OpType::Clip as u8;
        put_u32(&mut data[1..], bounds.min.x as u32);
        put_u32(&mut data[5..], bounds.min.y as u32);
        put_u32(&mut data[9..], bounds.max.x as u32);
        put_u32(&mut data[13..], bounds.max.y as u32);
        data[17] = self.outline as u8;
        data[18] = path.shape as u8;
    }
}

impl ClipStack {
    pub fn pop(self, o: &mut Ops) {
        o.pop_op(StackKind::Clip, self.id, self.macro_id);
        o.write(POP_CLIP_LEN)[0] = OpType::PopClip as u8;
    }
}

/// Area inside a path by the non-zero winding rule
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Outline {
    pub path: PathSpec,
}

impl Outline {
    pub fn op(&self) -> ClipOp {
        ClipOp {
            path: self.path,
            outline: true,
            width: 0.0,
        }
    }
}

/// Stroked path with round joins and caps
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stroke {
    pub path: PathSpec,
    pub width: f32,
}

impl Stroke {
    pub fn op(&self) -> ClipOp {
        ClipOp {
            path: self.path,
            outline: false,
            width: self.width,
        }
    }
}

/// Pixel-aligned rectangular clip area
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClipRect(pub IRect);

impl ClipRect {
    pub fn path(&self) -> PathSpec {
        PathSpec {
            bounds: self.0,
            shape: Shape::Rect,
            ..PathSpec::default()
        }
    }

    pub fn op(&self) -> ClipOp {
        ClipOp {
            path: self.path(),
            outline: true,
            width: 0.0,
        }
    }

    pub fn push(&self, o: &mut Ops) -> ClipStack {
        self.op().push(o)
    }
}

/// Largest axis-aligned ellipse inside the given bounds
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ellipse(pub Rect);

impl Ellipse {
    pub fn path(&self, o: &mut Ops) -> PathSpec {
        let b = self.0;
        let center = (b.min + b.max) * 0.5;
        let r = b.dx() * 0.5;
        // A circle scaled along y.
        let scale = b.dy() / b.dx();
        // https://pomax.github.io/bezierinfo/#circles_cubic
        let q = 4.0 * (std::f32::consts::SQRT_2 - 1.0) / 3.0;
        let curve = r * q;
        let top = Point::new(center.x, center.y - r * scale);

        let mut p = PathBuilder::begin(o);
        p.move_to(top);
        p.cube_to(
            Point::new(center.x + curve, center.y - r * scale),
            Point::new(center.x + r, center.y - curve * scale),
            Point::new(center.x + r, center.y),
        );
        p.cube_to(
            Point::new(center.x + r, center.y + curve * scale),
            Point::new(center.x + curve, center.y + r * scale),
            Point::new(center.x, center.y + r * scale),
        );
        p.cube_to(
            Point::new(center.x - curve, center.y + r * scale),
            Point::new(center.x - r, center.y + curve * scale),
            Point::new(center.x - r, center.y),
        );
        p.cube_to(
            Point::new(center.x - r, center.y - curve * scale),
            Point::new(center.x - curve, center.y - r * scale),
            top,
        );
        let mut spec = p.end();
        spec.shape = Shape::Ellipse;
        spec
    }

    pub fn op(&self, o: &mut Ops) -> ClipOp {
        Outline { path: self.path(o) }.op()
    }

    pub fn push(&self, o: &mut Ops) -> ClipStack {
        self.op(o).push(o)
    }
}
