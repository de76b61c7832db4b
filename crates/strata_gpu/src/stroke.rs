//! Stroke expansion
//!
//! Converts the segments of a path into the outline of its stroke: every
//! contour is offset by half the stroke width on both sides, the sides are
//! flattened into line-like quads, consecutive segments are joined with round
//! joins and open contours get round caps. The result is a set of closed
//! quad contours ready for filling.

use strata_core::curve::{arc_to, split_cubic};
use strata_core::{Point, QuadSegment};
use strata_paint::scene::{records, Command};

/// Flattening tolerance and the largest gap bridged between pieces.
pub const STROKE_TOLERANCE: f32 = 0.01;

/// A quad tagged with the contour it belongs to
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeQuad {
    pub contour: u32,
    pub quad: QuadSegment,
}

/// A sequence of stroke quads
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StrokeQuads {
    pub quads: Vec<StrokeQuad>,
}

/// Per-segment offset data
#[derive(Clone, Copy, Debug)]
struct SegmentState {
    p0: Point,
    p1: Point,
    ctl: Point,
    /// Normals at half width at the start and end point.
    n0: Point,
    n1: Point,
    /// Radii of curvature at the start and end point.
    r0: f32,
    r1: f32,
}

impl SegmentState {
    fn new(q: &QuadSegment, hw: f32) -> Self {
        Self {
            p0: q.from,
            p1: q.to,
            ctl: q.ctrl,
            n0: normal(q.from, q.ctrl, q.to, false, hw),
            n1: normal(q.from, q.ctrl, q.to, true, hw),
            r0: q.curvature(0.0),
            r1: q.curvature(1.0),
        }
    }

    fn is_line(&self) -> bool {
        self.r0.is_nan() && self.r1.is_nan()
    }
}

/// Stroke the path commands of an aux payload.
pub fn stroke_path_commands(width: f32, path_data: &[u8]) -> StrokeQuads {
    StrokeQuads::from_path_data(path_data).stroke(width)
}

impl StrokeQuads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode path commands into quads. Gaps are dropped since a stroke
    /// never covers the implicit closing segment of an open contour.
    pub fn from_path_data(path_data: &[u8]) -> Self {
        let mut qs = Self::new();
        let mut scratch = Vec::new();
        for (contour, cmd) in records(path_data) {
            match cmd {
                Command::Line(from, to) => qs.push(contour, QuadSegment::line(from, to)),
                Command::Gap(..) => {}
                Command::Quad(from, ctrl, to) => qs.push(contour, QuadSegment::new(from, ctrl, to)),
                Command::Cubic(from, ctrl0, ctrl1, to) => {
                    scratch.clear();
                    split_cubic(from, ctrl0, ctrl1, to, &mut scratch);
                    for q in &scratch {
                        qs.push(contour, *q);
                    }
                }
            }
        }
        qs
    }

    pub fn push(&mut self, contour: u32, quad: QuadSegment) {
        self.quads.push(StrokeQuad { contour, quad });
    }

    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StrokeQuad> {
        self.quads.iter()
    }

    /// The outline of a stroke of `width` around these quads.
    pub fn stroke(&self, width: f32) -> StrokeQuads {
        let hw = 0.5 * width;
        let mut o = StrokeQuads::new();
        for ps in self.split() {
            let contour = ps.quads[0].contour;
            let start = o.len();
            let (rhs, lhs) = ps.offset(hw);
            match lhs {
                None => o = o.append(rhs),
                Some(lhs) if ps.ccw() => {
                    o = o.append(rhs);
                    o = o.append(lhs.reversed());
                }
                Some(lhs) => {
                    o = o.append(lhs);
                    o = o.append(rhs.reversed());
                }
            }
            for q in &mut o.quads[start..] {
                q.contour = contour;
            }
        }
        o
    }

    /// Split into runs of equal contour id.
    fn split(&self) -> Vec<StrokeQuads> {
        let mut out: Vec<StrokeQuads> = Vec::new();
        let mut current = None;
        for q in &self.quads {
            if current != Some(q.contour) {
                current = Some(q.contour);
                out.push(StrokeQuads::new());
            }
            if let Some(last) = out.last_mut() {
                last.quads.push(*q);
            }
        }
        out
    }

    /// Offset a single contour. Closed contours yield both sides; open
    /// contours yield one closed outline with caps.
    fn offset(&self, hw: f32) -> (StrokeQuads, Option<StrokeQuads>) {
        let mut rhs = StrokeQuads::new();
        let mut lhs = StrokeQuads::new();
        let states: Vec<SegmentState> =
            self.quads.iter().map(|q| SegmentState::new(&q.quad, hw)).collect();
        let (Some(first), Some(last)) = (states.first().copied(), states.last().copied()) else {
            return (rhs, None);
        };
        let closed = first.p0 == last.p1;

        for (i, state) in states.iter().enumerate() {
            rhs = rhs.append(flatten(state, hw));
            lhs = lhs.append(flatten(state, -hw));

            let next = match states.get(i + 1) {
                Some(next) => Some(next),
                None if closed => Some(&first),
                None => None,
            };
            if let Some(next) = next {
                if state.n1 != next.n0 {
                    round_join(&mut rhs, &mut lhs, state.p1, state.n1, next.n0);
                }
            }
        }

        if closed {
            rhs.close();
            lhs.close();
            return (rhs, Some(lhs));
        }

        let lhs = lhs.reversed();
        rhs.round_cap(last.p1);
        let mut rhs = rhs.append(lhs);
        rhs.round_cap(first.p0);
        rhs.close();
        (rhs, None)
    }

    /// Orientation of the contour from the shoelace sum over its end points.
    fn ccw(&self) -> bool {
        let area: f32 = self
            .quads
            .windows(2)
            .map(|w| {
                let (pj, pi) = (w[0].quad.to, w[1].quad.to);
                (pi.x - pj.x) * (pi.y + pj.y)
            })
            .sum();
        area <= 0.0
    }

    fn reversed(&self) -> StrokeQuads {
        StrokeQuads {
            quads: self
                .quads
                .iter()
                .rev()
                .map(|q| StrokeQuad {
                    contour: q.contour,
                    quad: q.quad.reversed(),
                })
                .collect(),
        }
    }

    /// Concatenate, bridging a gap below the tolerance with a line.
    fn append(mut self, other: StrokeQuads) -> StrokeQuads {
        let (Some(last), Some(next)) = (self.quads.last(), other.quads.first()) else {
            return if self.is_empty() { other } else { self };
        };
        let (p0, p1) = (last.quad.to, next.quad.from);
        if p0 != p1 && p0.distance(p1) < STROKE_TOLERANCE {
            let contour = next.contour;
            self.push(contour, QuadSegment::line(p0, p1));
        }
        self.quads.extend(other.quads);
        self
    }

    fn close(&mut self) {
        let (Some(first), Some(last)) = (self.quads.first(), self.quads.last()) else {
            return;
        };
        let (p0, p1) = (last.quad.to, first.quad.from);
        if p0 != p1 {
            let contour = last.contour;
            self.push(contour, QuadSegment::line(p0, p1));
        }
    }

    fn pen(&self) -> Point {
        self.quads.last().map(|q| q.quad.to).unwrap_or_default()
    }

    fn line_to(&mut self, to: Point) {
        let pen = self.pen();
        self.push(0, QuadSegment::line(pen, to));
    }

    /// Arc from the pen around `center`.
    fn arc(&mut self, center: Point, angle: f32) {
        let pen = self.pen();
        if pen == center {
            return;
        }
        let mut quads = Vec::new();
        arc_to(pen, center, center, angle, &mut quads);
        for q in quads {
            self.push(0, q);
        }
    }

    fn round_cap(&mut self, pivot: Point) {
        self.arc(pivot, std::f32::consts::PI);
    }
}

/// Unit normal at the start or end of a quad, scaled to `d`. Degenerate
/// tangents give the zero vector.
fn normal(p0: Point, p1: Point, p2: Point, at_end: bool, d: f32) -> Point {
    let tangent = if at_end { p2 - p1 } else { p1 - p0 };
    if tangent == Point::ZERO {
        return Point::ZERO;
    }
    let n = tangent.rot90_cw();
    let len = n.length();
    if len == 0.0 {
        return Point::ZERO;
    }
    n * (d / len)
}

/// Offset one side of a segment by `d`, flattened into line quads.
fn flatten(state: &SegmentState, d: f32) -> StrokeQuads {
    let mut qs = StrokeQuads::new();
    let (mut p0, mut p1, mut p2) = (state.p0, state.ctl, state.p1);
    if !state.is_line() {
        let flatness = STROKE_TOLERANCE as f64;
        loop {
            let s2 = ((p2.x - p0.x) * (p1.y - p0.y) - (p2.y - p0.y) * (p1.x - p0.x)) as f64;
            let den = (p1 - p0).length() as f64;
            if s2 * den == 0.0 {
                break;
            }
            let s2 = s2 / den;
            let t = 2.0 * (flatness / 3.0 / s2.abs()).sqrt() as f32;
            if t >= 1.0 {
                break;
            }
            let (head, tail) = QuadSegment::new(p0, p1, p2).split(t);
            qs.add_line(&head, d);
            (p0, p1, p2) = (tail.from, tail.ctrl, tail.to);
        }
    }
    qs.add_line(&QuadSegment::new(p0, p1, p2), d);
    qs
}

impl StrokeQuads {
    /// Append the offset chord of `q`, starting at the previous end point.
    fn add_line(&mut self, q: &QuadSegment, d: f32) {
        let from = match self.quads.last() {
            Some(prev) => prev.quad.to,
            None => q.from + normal(q.from, q.ctrl, q.to, false, d),
        };
        let to = q.to + normal(from, q.ctrl, q.to, true, d);
        self.push(0, QuadSegment::line(from, to));
    }
}

/// Round join at `pivot` turning from normal `n0` to `n1`. The arc goes on
/// the outer side of the turn.
fn round_join(rhs: &mut StrokeQuads, lhs: &mut StrokeQuads, pivot: Point, n0: Point, n1: Point) {
    let rp = pivot + n1;
    let lp = pivot - n1;
    let angle = (n1.y as f64).atan2(n1.x as f64) - (n0.y as f64).atan2(n0.x as f64);
    if angle <= 0.0 {
        // Clockwise, or a full reversal.
        lhs.arc(pivot, angle as f32);
        lhs.line_to(lp);
        rhs.line_to(rp);
    } else {
        rhs.arc(pivot, angle as f32);
        rhs.line_to(rp);
        lhs.line_to(lp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_paint::scene::RECORD_SIZE;

    fn encode(cmds: &[(u32, Command)]) -> Vec<u8> {
        let mut data = vec![0u8; cmds.len() * RECORD_SIZE];
        for (rec, (contour, cmd)) in data.chunks_exact_mut(RECORD_SIZE).zip(cmds) {
            rec[..4].copy_from_slice(&contour.to_le_bytes());
            cmd.encode(&mut rec[4..]);
        }
        data
    }

    fn points(qs: &StrokeQuads) -> impl Iterator<Item = Point> + '_ {
        qs.iter()
            .flat_map(|q| [q.quad.from, q.quad.ctrl, q.quad.to])
    }

    fn assert_connected(qs: &StrokeQuads) {
        for w in qs.quads.windows(2) {
            assert!(
                w[0].quad.to.distance(w[1].quad.from) < 1e-3,
                "gap between {:?} and {:?}",
                w[0],
                w[1]
            );
        }
    }

    #[test]
    fn test_open_line_gets_caps() {
        let data = encode(&[(
            1,
            Command::Line(Point::new(0.0, 0.0), Point::new(10.0, 0.0)),
        )]);
        let out = stroke_path_commands(2.0, &data);
        assert!(!out.is_empty());
        assert_connected(&out);
        let first = out.quads[0].quad.from;
        let last = out.quads[out.len() - 1].quad.to;
        assert!(first.distance(last) < 1e-3);

        let (mut min, mut max) = (Point::new(f32::MAX, f32::MAX), Point::new(f32::MIN, f32::MIN));
        for p in points(&out) {
            min = Point::new(min.x.min(p.x), min.y.min(p.y));
            max = Point::new(max.x.max(p.x), max.y.max(p.y));
        }
        // Round caps reach half the width past both end points.
        assert!((min.x + 1.0).abs() < 0.05, "min {:?}", min);
        assert!((max.x - 11.0).abs() < 0.05, "max {:?}", max);
        assert!((min.y + 1.0).abs() < 0.05);
        assert!((max.y - 1.0).abs() < 0.05);
        assert!(out.iter().all(|q| q.contour == 1));
    }

    #[test]
    fn test_closed_contour_has_two_sides() {
        let p = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        let cmds: Vec<_> = (0..4)
            .map(|i| (1, Command::Line(p[i], p[(i + 1) % 4])))
            .collect();
        let out = stroke_path_commands(2.0, &encode(&cmds));

        let outer = points(&out).filter(|p| p.x < -0.5 || p.x > 10.5).count();
        let inner = points(&out)
            .filter(|p| p.x > 0.5 && p.x < 9.5 && p.y > 0.5 && p.y < 9.5)
            .count();
        assert!(outer > 0);
        assert!(inner > 0);
        for p in points(&out) {
            assert!(p.x >= -1.05 && p.x <= 11.05 && p.y >= -1.05 && p.y <= 11.05);
        }
    }

    #[test]
    fn test_curve_is_flattened() {
        let data = encode(&[(
            1,
            Command::Quad(
                Point::new(0.0, 0.0),
                Point::new(50.0, 100.0),
                Point::new(100.0, 0.0),
            ),
        )]);
        let quads = StrokeQuads::from_path_data(&data);
        let out = quads.stroke(4.0);
        // Flattened sides are straight.
        for q in out.iter().filter(|q| q.quad.from.distance(q.quad.to) > 1.0) {
            let mid = (q.quad.from + q.quad.to) * 0.5;
            if mid.distance(Point::new(0.0, 0.0)) > 3.0 && mid.distance(Point::new(100.0, 0.0)) > 3.0 {
                assert!(q.quad.ctrl.distance(mid) < 1e-3);
            }
        }
        assert!(out.len() > 20);
    }

    #[test]
    fn test_gaps_are_ignored() {
        let data = encode(&[
            (1, Command::Line(Point::new(0.0, 0.0), Point::new(5.0, 0.0))),
            (1, Command::Gap(Point::new(5.0, 0.0), Point::new(0.0, 0.0))),
        ]);
        let quads = StrokeQuads::from_path_data(&data);
        assert_eq!(quads.len(), 1);
    }

    #[test]
    fn test_zero_length_segment() {
        let data = encode(&[
            (1, Command::Line(Point::new(0.0, 0.0), Point::new(5.0, 0.0))),
            (1, Command::Line(Point::new(5.0, 0.0), Point::new(5.0, 0.0))),
            (1, Command::Line(Point::new(5.0, 0.0), Point::new(5.0, 5.0))),
        ]);
        let out = stroke_path_commands(1.0, &data);
        assert!(!out.is_empty());
        assert!(points(&out).all(|p| p.x.is_finite() && p.y.is_finite()));
    }

    #[test]
    fn test_orientation() {
        let mut cw = StrokeQuads::new();
        let p = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        for i in 0..4 {
            cw.push(1, QuadSegment::line(p[i], p[(i + 1) % 4]));
        }
        assert_ne!(cw.ccw(), cw.reversed().ccw());
    }

    /// A circle as four cubics, counter-clockwise in y-down space.
    fn circle(c: Point, r: f32) -> Vec<(u32, Command)> {
        let k = 0.552_284_8 * r;
        let p = |x: f32, y: f32| Point::new(c.x + x, c.y + y);
        vec![
            (1, Command::Cubic(p(r, 0.0), p(r, k), p(k, r), p(0.0, r))),
            (1, Command::Cubic(p(0.0, r), p(-k, r), p(-r, k), p(-r, 0.0))),
            (1, Command::Cubic(p(-r, 0.0), p(-r, -k), p(-k, -r), p(0.0, -r))),
            (1, Command::Cubic(p(0.0, -r), p(k, -r), p(r, -k), p(r, 0.0))),
        ]
    }

    /// Signed areas of the connected loops of a stroke outline.
    fn loop_areas(qs: &StrokeQuads) -> Vec<f32> {
        let mut areas = vec![0.0];
        for (i, q) in qs.quads.iter().enumerate() {
            if i > 0 && qs.quads[i - 1].quad.to.distance(q.quad.from) > 1e-3 {
                areas.push(0.0);
            }
            let (a, b) = (q.quad.from, q.quad.to);
            if let Some(area) = areas.last_mut() {
                *area += 0.5 * (a.x * b.y - b.x * a.y);
            }
        }
        areas
    }

    #[test]
    fn test_circle_sides_wind_oppositely() {
        for (r, width) in [(20.0, 4.0), (100.0, 10.0), (3.0, 1.0)] {
            let out = stroke_path_commands(width, &encode(&circle(Point::new(50.0, 50.0), r)));
            let areas = loop_areas(&out);
            assert_eq!(areas.len(), 2, "r={} areas={:?}", r, areas);
            assert!(areas[0] * areas[1] < 0.0, "r={} areas={:?}", r, areas);

            let (a, b) = (areas[0].abs(), areas[1].abs());
            let (outer, inner) = (a.max(b), a.min(b));
            let hw = 0.5 * width;
            let expect_outer = std::f32::consts::PI * (r + hw) * (r + hw);
            let expect_inner = std::f32::consts::PI * (r - hw) * (r - hw);
            assert!((outer - expect_outer).abs() < 0.05 * expect_outer, "r={} outer={}", r, outer);
            assert!((inner - expect_inner).abs() < 0.1 * expect_inner, "r={} inner={}", r, inner);
        }
    }

    #[test]
    fn test_append_bridges_small_gaps() {
        let mut a = StrokeQuads::new();
        a.push(1, QuadSegment::line(Point::new(0.0, 0.0), Point::new(1.0, 0.0)));
        let mut b = StrokeQuads::new();
        b.push(1, QuadSegment::line(Point::new(1.0, 0.005), Point::new(2.0, 0.0)));
        let joined = a.clone().append(b.clone());
        assert_eq!(joined.len(), 3);

        let mut far = StrokeQuads::new();
        far.push(1, QuadSegment::line(Point::new(5.0, 5.0), Point::new(6.0, 0.0)));
        assert_eq!(a.append(far).len(), 2);
    }
}
