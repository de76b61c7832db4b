//! Operation collection
//!
//! Walks a frame's op list once and turns it into a clip tree of
//! [`PathOp`] nodes plus a flat list of [`ImageOp`] paints, each pointing at
//! the clip node active when it was painted. Curved clips are tessellated
//! into the shared vertex cache unless the path cache already has them.

use std::hash::{Hash, Hasher};
use std::ops::Range;

use rustc_hash::FxHasher;
use strata_core::{Affine2D, IPoint, IRect, LinearRgba, Point, QuadSegment, Rect};
use strata_paint::ops::{
    decode_clip, decode_color, decode_image, decode_linear_gradient, decode_load, decode_path,
    decode_save, decode_stroke, decode_transform, AUX_LEN,
};
use strata_paint::{OpType, Ops, Reader};

use crate::cache::{OpCache, OpKey, PathData};
use crate::driver::{BufferBinding, Device, Result};
use crate::material::{material_for, Brush, Material, MaterialType};
use crate::pack::Placement;
use crate::path::{build_verts, encode_quad, fill_max_y, Vertex};

/// Paints without an image fill everything inside their clip.
const PAINT_EXTENT: f32 = 1e6;

/// A node of the clip tree
#[derive(Clone, Debug, Default)]
pub struct PathOp {
    pub off: Point,
    /// Whether this node and all its ancestors are pixel-aligned rectangles.
    pub rect: bool,
    /// Union of the clips of every paint below this node, set by
    /// [`DrawOps::expand_paths`].
    pub clip: IRect,
    pub bounds: Rect,
    /// `bounds + off` intersected with every ancestor.
    pub intersect: Rect,
    pub path_key: OpKey,
    /// Whether the node has a stencil path.
    pub path: bool,
    /// Vertices in the vertex cache. Empty when the cached buffer is used.
    pub path_verts: Range<usize>,
    pub parent: Option<usize>,
    pub place: Placement,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClipType {
    /// Rectangular clip, drawn with a plain blit.
    #[default]
    None,
    /// Covered by the stencil of a single path.
    Path,
    /// Covered by the product of several path stencils.
    Intersection,
}

/// A paint with its resolved material
#[derive(Clone, Debug, Default)]
pub struct ImageOp {
    pub path: Option<usize>,
    pub clip: IRect,
    pub material: Material,
    pub clip_type: ClipType,
    pub place: Placement,
}

#[derive(Clone, Debug, Default)]
struct DrawState {
    t: Affine2D,
    cpath: Option<usize>,
    brush: Brush,
}

/// Pending path data for the next clip
#[derive(Clone, Copy, Debug, Default)]
struct QuadsOp {
    key: OpKey,
    has_aux: bool,
}

/// Stencil path attached to a clip node
struct ClipPath {
    key: OpKey,
    verts: Range<usize>,
}

/// Per-frame collection state. Arenas are cleared, not freed, between
/// frames.
#[derive(Default)]
pub struct DrawOps {
    pub profile: bool,
    viewport: IPoint,
    pub clear: bool,
    pub clear_color: LinearRgba,
    /// Transforms by save slot; kept across frames.
    states: Vec<Affine2D>,
    trans_stack: Vec<Affine2D>,
    pub vert_cache: Vec<Vertex>,
    pub image_ops: Vec<ImageOp>,
    /// Indices of the nodes with stencil paths.
    pub path_ops: Vec<usize>,
    /// Clip tree arena.
    pub nodes: Vec<PathOp>,
    pub path_cache: OpCache,
    aux: Vec<u8>,
}

impl DrawOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn viewport(&self) -> IPoint {
        self.viewport
    }

    pub fn reset(&mut self, viewport: IPoint) {
        self.profile = false;
        self.viewport = viewport;
        self.image_ops.clear();
        self.path_ops.clear();
        self.nodes.clear();
        self.vert_cache.clear();
        self.trans_stack.clear();
        self.aux.clear();
    }

    /// Collect the ops of a frame.
    pub fn collect(&mut self, ops: &Ops, viewport: IPoint) {
        let viewport = Rect::from_min_max(Point::ZERO, viewport.to_point());
        let mut quads = QuadsOp::default();
        let mut state = DrawState::default();
        let mut reader = Reader::new(ops);

        while let Some(op) = reader.decode() {
            match op.op_type() {
                OpType::Profile => self.profile = true,
                OpType::Transform => {
                    let (t, push) = decode_transform(op.data);
                    if push {
                        self.trans_stack.push(state.t);
                    }
                    state.t = state.t.then(&t);
                }
                OpType::PopTransform => {
                    let Some(t) = self.trans_stack.pop() else {
                        panic!("transform pop without a matching push");
                    };
                    state.t = t;
                }
                OpType::Stroke => {
                    quads.key.stroke_width = decode_stroke(op.data).to_bits();
                }
                OpType::Path => {
                    let hash = decode_path(op.data);
                    let Some(aux) = reader.decode() else {
                        break;
                    };
                    self.aux.clear();
                    self.aux.extend_from_slice(&aux.data[AUX_LEN..]);
                    quads.key.content = hash;
                    quads.has_aux = !self.aux.is_empty();
                }
                OpType::Clip => {
                    let clip = decode_clip(op.data);
                    quads.key.outline = clip.outline;
                    let (trans, off) = state.t.split();
                    if quads.has_aux {
                        let key = quads.key.with_transform(&trans);
                        let cached = self.path_cache.get(&key).map(|v| v.bounds);
                        let (verts, bounds) = match cached {
                            // The cached buffer is used; no vertices needed.
                            Some(bounds) => (Some(0..0), bounds),
                            None => {
                                let start = self.vert_cache.len();
                                let bounds = build_verts(
                                    &mut self.vert_cache,
                                    &self.aux,
                                    &trans,
                                    clip.outline,
                                    f32::from_bits(quads.key.stroke_width),
                                );
                                self.path_cache.put(key, PathData::default(), bounds);
                                let end = self.vert_cache.len();
                                ((end > start).then_some(start..end), bounds)
                            }
                        };
                        let path = verts.map(|verts| ClipPath { key, verts });
                        self.add_clip_path(&mut state, path, bounds, off);
                    } else {
                        let r = clip.bounds.to_rect();
                        let (verts, bounds, _) = self.bounds_for_transformed_rect(r, &trans);
                        let key = rect_key(&r, &trans);
                        let path = verts.map(|verts| ClipPath { key, verts });
                        self.add_clip_path(&mut state, path, bounds, off);
                    }
                    quads = QuadsOp::default();
                    self.aux.clear();
                }
                OpType::PopClip => {
                    let Some(cpath) = state.cpath else {
                        panic!("clip pop without a matching push");
                    };
                    state.cpath = self.nodes[cpath].parent;
                }
                OpType::Color => state.brush = Brush::Color(decode_color(op.data)),
                OpType::LinearGradient => {
                    let g = decode_linear_gradient(op.data);
                    state.brush = Brush::LinearGradient {
                        stop1: g.stop1,
                        stop2: g.stop2,
                        color1: g.color1,
                        color2: g.color2,
                    };
                }
                OpType::Image => state.brush = Brush::Image(decode_image(op.data, op.refs)),
                OpType::Paint => self.add_paint(&mut state, &viewport),
                OpType::Save => {
                    let id = decode_save(op.data) as usize;
                    if id >= self.states.len() {
                        self.states.resize(id + 1, Affine2D::IDENTITY);
                    }
                    self.states[id] = state.t;
                }
                OpType::Load => {
                    let id = decode_load(op.data) as usize;
                    state = DrawState::default();
                    state.t = self.states.get(id).copied().unwrap_or_else(|| {
                        tracing::warn!(id, "load of an unsaved state");
                        Affine2D::IDENTITY
                    });
                }
                OpType::Aux => {
                    #[cfg(debug_assertions)]
                    tracing::warn!("aux data without a path op");
                }
                // Flattened away by the reader.
                OpType::Macro | OpType::Call | OpType::Defer => {}
            }
        }
    }

    fn add_paint(&mut self, state: &mut DrawState, viewport: &Rect) {
        let (t, off) = state.t.split();
        let dst = match &state.brush {
            Brush::Image(image) => Rect::new(0.0, 0.0, image.width() as f32, image.height() as f32),
            _ => Rect::new(-PAINT_EXTENT, -PAINT_EXTENT, PAINT_EXTENT, PAINT_EXTENT),
        };
        let (clip_verts, bnd, partial) = self.bounds_for_transformed_rect(dst, &t);
        let mut cl = viewport.intersect(&bnd.add(off));
        if let Some(cpath) = state.cpath {
            cl = self.nodes[cpath].intersect.intersect(&cl);
        }
        if cl.is_empty() {
            return;
        }

        let transient = clip_verts.is_some();
        if let Some(verts) = clip_verts {
            // Sheared or rotated paint: clip to the transformed rectangle.
            let key = rect_key(&dst, &t);
            self.add_clip_path(state, Some(ClipPath { key, verts }), bnd, off);
        }

        let bounds = cl.round();
        let mat = material_for(&state.brush, bnd, off, &partial, bounds);

        let rect = state.cpath.map_or(true, |p| self.nodes[p].rect);
        if bounds == IRect::from_size(self.viewport)
            && rect
            && mat.opaque
            && mat.material == MaterialType::Color
        {
            // An opaque full-screen color hides everything painted before.
            self.image_ops.clear();
            self.clear_color = mat.color.opaque();
            self.clear = true;
            return;
        }
        self.image_ops.push(ImageOp {
            path: state.cpath,
            clip: bounds,
            material: mat,
            ..Default::default()
        });
        if transient {
            state.cpath = state.cpath.and_then(|p| self.nodes[p].parent);
        }
    }

    fn add_clip_path(
        &mut self,
        state: &mut DrawState,
        path: Option<ClipPath>,
        bounds: Rect,
        off: Point,
    ) {
        let mut node = PathOp {
            parent: state.cpath,
            bounds,
            off,
            intersect: bounds.add(off),
            rect: true,
            ..Default::default()
        };
        if let Some(parent) = state.cpath.map(|p| &self.nodes[p]) {
            node.rect = parent.rect;
            node.intersect = parent.intersect.intersect(&node.intersect);
        }
        let idx = self.nodes.len();
        if let Some(path) = path {
            node.rect = false;
            node.path = true;
            node.path_key = path.key;
            node.path_verts = path.verts;
            self.path_ops.push(idx);
        }
        self.nodes.push(node);
        state.cpath = Some(idx);
    }

    /// Transformed bounds of `r` together with a 4-quad outline when the
    /// transform is not a pure offset, and the transform from the unit
    /// square of the bounds back to the transformed rectangle.
    pub fn bounds_for_transformed_rect(
        &mut self,
        r: Rect,
        tr: &Affine2D,
    ) -> (Option<Range<usize>>, Rect, Affine2D) {
        if tr.is_offset() {
            let (_, _, ox, _, _, oy) = tr.elems();
            return (None, r.add(Point::new(ox, oy)), Affine2D::IDENTITY);
        }

        let corners = [
            tr.transform_point(r.min),
            tr.transform_point(Point::new(r.max.x, r.min.y)),
            tr.transform_point(r.max),
            tr.transform_point(Point::new(r.min.x, r.max.y)),
        ];
        let mut bnd = Rect::from_min_max(
            Point::new(f32::MAX, f32::MAX),
            Point::new(f32::MIN, f32::MIN),
        );
        for c in &corners {
            bnd.min = Point::new(bnd.min.x.min(c.x), bnd.min.y.min(c.y));
            bnd.max = Point::new(bnd.max.x.max(c.x), bnd.max.y.max(c.y));
        }

        let start = self.vert_cache.len();
        for i in 0..4 {
            let q = QuadSegment::line(corners[i], corners[(i + 1) % 4]);
            encode_quad(&mut self.vert_cache, 0, &q);
        }
        fill_max_y(&mut self.vert_cache[start..]);

        let size = bnd.size();
        let norm = |p: Point| Point::new((p.x - bnd.min.x) / size.x, (p.y - bnd.min.y) / size.y);
        let (p1, p2, p3) = (norm(corners[1]), norm(corners[2]), norm(corners[3]));
        let (sx, sy) = (p2.x - p3.x, p2.y - p3.y);
        let partial =
            Affine2D::new(sx, p2.x - p1.x, p1.x - sx, sy, p2.y - p1.y, p1.y - sy).invert();

        (Some(start..self.vert_cache.len()), bnd, partial)
    }

    /// Grow each painted node's clip, and its ancestors', to include the
    /// paint's clip.
    pub fn expand_paths(&mut self) {
        for img in &self.image_ops {
            let mut clip = img.clip;
            let mut p = img.path;
            while let Some(idx) = p {
                let node = &mut self.nodes[idx];
                if !node.clip.is_empty() {
                    clip = clip.union(&node.clip);
                }
                node.clip = clip;
                p = node.parent;
            }
        }
    }

    /// Create vertex buffers for paths missing from the path cache. Vertex
    /// data is dropped afterwards.
    pub fn build_paths(&mut self, device: &mut dyn Device) -> Result<()> {
        for &idx in &self.path_ops {
            let node = &mut self.nodes[idx];
            let verts = std::mem::take(&mut node.path_verts);
            let cached = self.path_cache.get(&node.path_key).map(|v| v.data);
            if cached.map_or(false, |d| d.buffer.is_some()) {
                continue;
            }
            if verts.is_empty() {
                continue;
            }
            let data = bytemuck::cast_slice(&self.vert_cache[verts.clone()]);
            let buffer = device.new_immutable_buffer(BufferBinding::VERTICES, data)?;
            self.path_cache.put(
                node.path_key,
                PathData {
                    ncurves: verts.len(),
                    buffer: Some(buffer),
                },
                node.bounds,
            );
        }
        Ok(())
    }
}

/// Cache key of a rectangle under a transform.
fn rect_key(r: &Rect, t: &Affine2D) -> OpKey {
    let mut h = FxHasher::default();
    for v in [r.min.x, r.min.y, r.max.x, r.max.y] {
        v.to_bits().hash(&mut h);
    }
    OpKey::new(h.finish()).with_transform(t)
}
