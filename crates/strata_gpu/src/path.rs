//! Path vertex encoding
//!
//! Outlines and strokes are turned into quadratic segments that are monotone
//! in x, and each segment becomes four vertices of a quad covering its
//! bounding box. The stencil shader computes the exact coverage of the curve
//! inside that quad.

use strata_core::curve::split_cubic;
use strata_core::{Affine2D, Point, QuadSegment, Rect};
use strata_paint::scene::{records, Command};

use crate::stroke::stroke_path_commands;

/// A stencil vertex
///
/// `corner` identifies which corner of the quad's bounding box the vertex
/// expands to. `max_y` is the largest y of the segment's contour, used by the
/// shader to extend coverage downwards.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub corner: f32,
    pub max_y: f32,
    pub from: [f32; 2],
    pub ctrl: [f32; 2],
    pub to: [f32; 2],
}

/// Size in bytes of a [`Vertex`].
pub const VERTEX_STRIDE: usize = std::mem::size_of::<Vertex>();

/// Vertices per path quad.
pub const QUAD_VERTICES: usize = 4;

// Corner encoding: 0.5 for the east edge plus 0.25 for the north edge.
const CORNER_NW: f32 = 0.25;
const CORNER_NE: f32 = 0.75;
const CORNER_SW: f32 = 0.0;
const CORNER_SE: f32 = 0.5;

impl Vertex {
    /// Contour id stored in `max_y` until [`fill_max_y`] replaces it.
    fn contour(&self) -> u32 {
        self.max_y.to_bits()
    }
}

/// Append the four vertices of `q` tagged with `contour`.
pub fn encode_quad(out: &mut Vec<Vertex>, contour: u32, q: &QuadSegment) {
    let max_y = f32::from_bits(contour);
    for corner in [CORNER_NW, CORNER_NE, CORNER_SW, CORNER_SE] {
        out.push(Vertex {
            corner,
            max_y,
            from: q.from.to_array(),
            ctrl: q.ctrl.to_array(),
            to: q.to.to_array(),
        });
    }
}

/// Replace contour ids with the maximum y of each run of equal contour.
pub fn fill_max_y(verts: &mut [Vertex]) {
    let mut start = 0;
    while start < verts.len() {
        let contour = verts[start].contour();
        let mut end = start;
        let mut max_y = f32::NEG_INFINITY;
        while end < verts.len() && verts[end].contour() == contour {
            let v = &verts[end];
            max_y = max_y.max(v.from[1]).max(v.ctrl[1]).max(v.to[1]);
            end += QUAD_VERTICES;
        }
        let end = end.min(verts.len());
        for v in &mut verts[start..end] {
            v.max_y = max_y;
        }
        start = end;
    }
}

/// Splits quads into x monotone pieces while tracking their bounds.
pub struct QuadSplitter<'a> {
    out: &'a mut Vec<Vertex>,
    pub contour: u32,
    bounds: Rect,
}

impl<'a> QuadSplitter<'a> {
    pub fn new(out: &'a mut Vec<Vertex>) -> Self {
        Self {
            out,
            contour: 0,
            bounds: Rect::from_min_max(
                Point::new(f32::INFINITY, f32::INFINITY),
                Point::new(f32::NEG_INFINITY, f32::NEG_INFINITY),
            ),
        }
    }

    /// Bounds of everything encoded so far. Inverted when nothing was.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn split_and_encode(&mut self, q: &QuadSegment) {
        let (from, ctrl, to) = (q.from, q.ctrl, q.to);
        let mut cbnd = Rect::from_min_max(from, to).canon();

        // A vertical line must cross each quad at most once, so split at the
        // x extremum when it lies strictly inside the segment.
        let v0 = ctrl - from;
        let v1 = to - ctrl;
        let d = v0.x - v1.x;
        if v0.x > 0.0 && d > v0.x || v0.x < 0.0 && d < v0.x {
            let t = v0.x / d;
            let (head, tail) = q.split(t);
            encode_quad(self.out, self.contour, &head);
            encode_quad(self.out, self.contour, &tail);
            let mid = head.to;
            cbnd.max.x = cbnd.max.x.max(mid.x);
            cbnd.min.x = cbnd.min.x.min(mid.x);
        } else {
            encode_quad(self.out, self.contour, q);
        }

        let d = v0.y - v1.y;
        if v0.y > 0.0 && d > v0.y || v0.y < 0.0 && d < v0.y {
            let t = v0.y / d;
            let y = q.sample(t).y;
            cbnd.max.y = cbnd.max.y.max(y);
            cbnd.min.y = cbnd.min.y.min(y);
        }

        let b = &mut self.bounds;
        b.min = Point::new(b.min.x.min(cbnd.min.x), b.min.y.min(cbnd.min.y));
        b.max = Point::new(b.max.x.max(cbnd.max.x), b.max.y.max(cbnd.max.y));
    }
}

/// Encode the filled outline of path commands, transformed by `tr`.
fn encode_outline(qs: &mut QuadSplitter<'_>, tr: &Affine2D, path_data: &[u8]) {
    let mut scratch = Vec::new();
    for (contour, cmd) in records(path_data) {
        qs.contour = contour;
        match cmd {
            Command::Line(from, to) | Command::Gap(from, to) => {
                qs.split_and_encode(&QuadSegment::line(from, to).transform(tr));
            }
            Command::Quad(from, ctrl, to) => {
                qs.split_and_encode(&QuadSegment::new(from, ctrl, to).transform(tr));
            }
            Command::Cubic(from, ctrl0, ctrl1, to) => {
                scratch.clear();
                split_cubic(from, ctrl0, ctrl1, to, &mut scratch);
                for q in &scratch {
                    qs.split_and_encode(&q.transform(tr));
                }
            }
        }
    }
}

/// Append stencil vertices for a path to `out` and return their bounds.
///
/// A positive `stroke_width` strokes the path in its own coordinates before
/// transforming; otherwise `outline` selects filling. With neither, nothing
/// is appended and the bounds are inverted.
pub fn build_verts(
    out: &mut Vec<Vertex>,
    path_data: &[u8],
    tr: &Affine2D,
    outline: bool,
    stroke_width: f32,
) -> Rect {
    let start = out.len();
    let bounds = {
        let mut qs = QuadSplitter::new(out);
        if stroke_width > 0.0 {
            for sq in stroke_path_commands(stroke_width, path_data).iter() {
                qs.contour = sq.contour;
                qs.split_and_encode(&sq.quad.transform(tr));
            }
        } else if outline {
            encode_outline(&mut qs, tr, path_data);
        }
        qs.bounds()
    };
    fill_max_y(&mut out[start..]);
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use strata_paint::scene::RECORD_SIZE;

    fn encode(cmds: &[(u32, Command)]) -> Vec<u8> {
        let mut data = vec![0u8; cmds.len() * RECORD_SIZE];
        for (rec, (contour, cmd)) in data.chunks_exact_mut(RECORD_SIZE).zip(cmds) {
            rec[..4].copy_from_slice(&contour.to_le_bytes());
            cmd.encode(&mut rec[4..]);
        }
        data
    }

    fn quad_of(v: &Vertex) -> QuadSegment {
        let p = |a: [f32; 2]| Point::new(a[0], a[1]);
        QuadSegment::new(p(v.from), p(v.ctrl), p(v.to))
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(VERTEX_STRIDE, 32);
        let mut out = Vec::new();
        encode_quad(
            &mut out,
            7,
            &QuadSegment::line(Point::new(0.0, 0.0), Point::new(1.0, 1.0)),
        );
        let corners: Vec<f32> = out.iter().map(|v| v.corner).collect();
        assert_eq!(corners, vec![0.25, 0.75, 0.0, 0.5]);
        assert!(out.iter().all(|v| v.contour() == 7));
        assert_eq!(bytemuck::cast_slice::<Vertex, u8>(&out).len(), 4 * 32);
    }

    #[test]
    fn test_split_at_x_extremum() {
        let mut out = Vec::new();
        let mut qs = QuadSplitter::new(&mut out);
        qs.split_and_encode(&QuadSegment::new(
            Point::new(0.0, 0.0),
            Point::new(10.0, 5.0),
            Point::new(0.0, 10.0),
        ));
        let bounds = qs.bounds();
        assert_eq!(out.len(), 8);
        assert!((bounds.max.x - 5.0).abs() < 1e-4);
        assert_eq!(bounds.min, Point::new(0.0, 0.0));
        assert_eq!(bounds.max.y, 10.0);
    }

    #[test]
    fn test_y_extremum_extends_bounds() {
        let mut out = Vec::new();
        let mut qs = QuadSplitter::new(&mut out);
        qs.split_and_encode(&QuadSegment::new(
            Point::new(0.0, 0.0),
            Point::new(5.0, 10.0),
            Point::new(10.0, 0.0),
        ));
        let bounds = qs.bounds();
        assert_eq!(out.len(), 4);
        assert!((bounds.max.y - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_degenerate_bounds_are_kept() {
        // A horizontal line has an empty box but still counts.
        let mut out = Vec::new();
        let mut qs = QuadSplitter::new(&mut out);
        qs.split_and_encode(&QuadSegment::line(Point::new(0.0, 2.0), Point::new(4.0, 2.0)));
        qs.split_and_encode(&QuadSegment::line(Point::new(4.0, 2.0), Point::new(4.0, 6.0)));
        let bounds = qs.bounds();
        assert_eq!(bounds, Rect::new(0.0, 2.0, 4.0, 6.0));
    }

    #[test]
    fn test_fill_max_y_per_contour() {
        let data = encode(&[
            (1, Command::Line(Point::new(0.0, 0.0), Point::new(4.0, 3.0))),
            (1, Command::Line(Point::new(4.0, 3.0), Point::new(0.0, 0.0))),
            (2, Command::Line(Point::new(0.0, 10.0), Point::new(4.0, 20.0))),
            (2, Command::Gap(Point::new(4.0, 20.0), Point::new(0.0, 10.0))),
        ]);
        let mut out = Vec::new();
        let bounds = build_verts(&mut out, &data, &Affine2D::IDENTITY, true, 0.0);
        assert_eq!(out.len(), 16);
        assert!(out[..8].iter().all(|v| v.max_y == 3.0));
        assert!(out[8..].iter().all(|v| v.max_y == 20.0));
        assert_eq!(bounds, Rect::new(0.0, 0.0, 4.0, 20.0));
    }

    #[test]
    fn test_transform_applies_to_outline() {
        let data = encode(&[(1, Command::Line(Point::new(0.0, 0.0), Point::new(1.0, 1.0)))]);
        let mut out = Vec::new();
        let tr = Affine2D::scaling(2.0, 3.0).offset(Point::new(10.0, 0.0));
        let bounds = build_verts(&mut out, &data, &tr, true, 0.0);
        assert_eq!(bounds, Rect::new(10.0, 0.0, 12.0, 3.0));
    }

    #[test]
    fn test_nothing_to_encode() {
        let data = encode(&[(1, Command::Line(Point::new(0.0, 0.0), Point::new(1.0, 1.0)))]);
        let mut out = Vec::new();
        let bounds = build_verts(&mut out, &data, &Affine2D::IDENTITY, false, 0.0);
        assert!(out.is_empty());
        assert!(bounds.is_empty());
    }

    #[test]
    fn test_stroke_verts_cover_width() {
        let data = encode(&[(1, Command::Line(Point::new(0.0, 5.0), Point::new(10.0, 5.0)))]);
        let mut out = Vec::new();
        let bounds = build_verts(&mut out, &data, &Affine2D::IDENTITY, false, 4.0);
        assert!(!out.is_empty());
        assert!((bounds.min.y - 3.0).abs() < 0.1);
        assert!((bounds.max.y - 7.0).abs() < 0.1);
        assert!(bounds.min.x < 0.0 && bounds.max.x > 10.0);
    }

    #[test]
    fn test_random_curves_are_x_monotone() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut out = Vec::new();
        let mut qs = QuadSplitter::new(&mut out);
        for _ in 0..500 {
            let mut p = || Point::new(rng.random_range(-100.0..100.0), rng.random_range(-100.0..100.0));
            let q = QuadSegment::new(p(), p(), p());
            qs.split_and_encode(&q);
        }
        let bounds = qs.bounds();
        for v in out.iter().step_by(QUAD_VERTICES) {
            let q = quad_of(v);
            let xs: Vec<f32> = (0..=16).map(|i| q.sample(i as f32 / 16.0).x).collect();
            let rising = xs.windows(2).all(|w| w[1] >= w[0] - 1e-3);
            let falling = xs.windows(2).all(|w| w[1] <= w[0] + 1e-3);
            assert!(rising || falling, "not x monotone: {q:?}");
            let b = q.bounds();
            assert!(b.min.x >= bounds.min.x - 1e-3 && b.max.x <= bounds.max.x + 1e-3);
            assert!(b.min.y >= bounds.min.y - 1e-3 && b.max.y <= bounds.max.y + 1e-3);
        }
    }
}
