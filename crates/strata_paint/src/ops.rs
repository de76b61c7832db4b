//! Operation list encoding
//!
//! An [`Ops`] list is a byte buffer of type-tagged operations plus a side
//! table of out-of-band references (images and other op lists). Every opcode
//! has a fixed encoded size and reference count, looked up from a static
//! table, so a reader can step through the list without decoding payloads.
//! All multi-byte values are little-endian.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use strata_core::{Affine2D, IPoint, IRect, Nrgba, Point};

use crate::paint::ImageHandle;

/// Opcodes start at a high number for easier debugging.
const FIRST_OP: u8 = 200;

/// Operation type tag, the first byte of every encoded operation
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpType {
    Macro = FIRST_OP,
    Call,
    Defer,
    Transform,
    PopTransform,
    Image,
    Paint,
    Color,
    LinearGradient,
    Save,
    Load,
    Aux,
    Clip,
    PopClip,
    Profile,
    Path,
    Stroke,
}

pub const MACRO_LEN: usize = 1 + 4 + 4;
pub const CALL_LEN: usize = 1 + 4 + 4 + 4 + 4;
pub const DEFER_LEN: usize = 1;
pub const TRANSFORM_LEN: usize = 1 + 1 + 4 * 6;
pub const POP_TRANSFORM_LEN: usize = 1;
pub const IMAGE_LEN: usize = 1;
pub const PAINT_LEN: usize = 1;
pub const COLOR_LEN: usize = 1 + 4;
pub const LINEAR_GRADIENT_LEN: usize = 1 + 8 * 2 + 4 * 2;
pub const SAVE_LEN: usize = 1 + 4;
pub const LOAD_LEN: usize = 1 + 4;
pub const AUX_LEN: usize = 1;
pub const CLIP_LEN: usize = 1 + 4 * 4 + 1 + 1;
pub const POP_CLIP_LEN: usize = 1;
pub const PROFILE_LEN: usize = 1;
pub const PATH_LEN: usize = 1 + 8;
pub const STROKE_LEN: usize = 1 + 4;

const ALL: [OpType; 17] = [
    OpType::Macro,
    OpType::Call,
    OpType::Defer,
    OpType::Transform,
    OpType::PopTransform,
    OpType::Image,
    OpType::Paint,
    OpType::Color,
    OpType::LinearGradient,
    OpType::Save,
    OpType::Load,
    OpType::Aux,
    OpType::Clip,
    OpType::PopClip,
    OpType::Profile,
    OpType::Path,
    OpType::Stroke,
];

impl OpType {
    pub fn from_u8(b: u8) -> Option<OpType> {
        let idx = b.checked_sub(FIRST_OP)? as usize;
        ALL.get(idx).copied()
    }

    /// Encoded size in bytes, including the opcode.
    pub const fn size(self) -> usize {
        match self {
            OpType::Macro => MACRO_LEN,
            OpType::Call => CALL_LEN,
            OpType::Defer => DEFER_LEN,
            OpType::Transform => TRANSFORM_LEN,
            OpType::PopTransform => POP_TRANSFORM_LEN,
            OpType::Image => IMAGE_LEN,
            OpType::Paint => PAINT_LEN,
            OpType::Color => COLOR_LEN,
            OpType::LinearGradient => LINEAR_GRADIENT_LEN,
            OpType::Save => SAVE_LEN,
            OpType::Load => LOAD_LEN,
            OpType::Aux => AUX_LEN,
            OpType::Clip => CLIP_LEN,
            OpType::PopClip => POP_CLIP_LEN,
            OpType::Profile => PROFILE_LEN,
            OpType::Path => PATH_LEN,
            OpType::Stroke => STROKE_LEN,
        }
    }

    /// Number of references consumed from the side table.
    pub const fn num_refs(self) -> usize {
        match self {
            OpType::Call | OpType::Image => 1,
            _ => 0,
        }
    }
}

/// Clip shape recorded in a clip op
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Shape {
    #[default]
    Path = 0,
    Ellipse = 1,
    Rect = 2,
}

impl Shape {
    fn from_u8(b: u8) -> Shape {
        match b {
            1 => Shape::Ellipse,
            2 => Shape::Rect,
            _ => Shape::Path,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Op lists
// ─────────────────────────────────────────────────────────────────────────────

/// Reference stored in the side table of an op list
#[derive(Clone, Debug)]
pub enum Ref {
    /// Image data for an image op.
    Image(ImageHandle),
    /// Call target in another, frozen, op list.
    List(Arc<Ops>),
    /// Call target in the list containing the call.
    Local,
}

/// Instruction counter into an op list
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pc {
    pub data: usize,
    pub refs: usize,
}

impl Pc {
    pub fn advance(self, op: OpType) -> Pc {
        Pc {
            data: self.data + op.size(),
            refs: self.refs + op.num_refs(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StackId {
    id: u32,
    prev: u32,
}

/// Tracks the identities of push operations so that pops pair up.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct StackTracker {
    current: u32,
    next: u32,
}

impl StackTracker {
    pub(crate) fn push(&mut self) -> StackId {
        self.next += 1;
        let sid = StackId {
            id: self.next,
            prev: self.current,
        };
        self.current = self.next;
        sid
    }

    pub(crate) fn pop(&mut self, sid: StackId) {
        if self.current != sid.id {
            panic!("unbalanced operation");
        }
        self.current = sid.prev;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StackKind {
    Clip = 0,
    Transform = 1,
}

static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(1);

/// A list of encoded operations
#[derive(Debug)]
pub struct Ops {
    id: u64,
    /// Incremented by every reset.
    version: u32,
    pub(crate) data: Vec<u8>,
    pub(crate) refs: Vec<Ref>,
    next_state_id: u32,
    pub(crate) macro_stack: StackTracker,
    stacks: [StackTracker; 2],
}

impl Default for Ops {
    fn default() -> Self {
        Self::new()
    }
}

impl Ops {
    pub fn new() -> Self {
        Self {
            id: NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed),
            version: 0,
            data: Vec::new(),
            refs: Vec::new(),
            next_state_id: 0,
            macro_stack: StackTracker::default(),
            stacks: [StackTracker::default(); 2],
        }
    }

    /// Clear the list for reuse. Recorded macros are invalidated.
    pub fn reset(&mut self) {
        self.data.clear();
        self.refs.clear();
        self.next_state_id = 0;
        self.macro_stack = StackTracker::default();
        self.stacks = [StackTracker::default(); 2];
        self.version = self.version.wrapping_add(1);
    }

    /// Process-unique identity of this list.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn refs(&self) -> &[Ref] {
        &self.refs
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn pc(&self) -> Pc {
        Pc {
            data: self.data.len(),
            refs: self.refs.len(),
        }
    }

    pub(crate) fn write(&mut self, n: usize) -> &mut [u8] {
        let start = self.data.len();
        self.data.resize(start + n, 0);
        &mut self.data[start..]
    }

    pub(crate) fn write1(&mut self, n: usize, r: Ref) -> &mut [u8] {
        self.refs.push(r);
        self.write(n)
    }

    pub(crate) fn push_op(&mut self, kind: StackKind) -> (StackId, u32) {
        (self.stacks[kind as usize].push(), self.macro_stack.current)
    }

    pub(crate) fn pop_op(&mut self, kind: StackKind, sid: StackId, macro_id: u32) {
        if self.macro_stack.current != macro_id {
            panic!("stack push and pop must not cross macro boundary");
        }
        self.stacks[kind as usize].pop(sid);
    }

    pub(crate) fn next_state_id(&mut self) -> u32 {
        self.next_state_id += 1;
        self.next_state_id
    }

    pub(crate) fn fill_macro(&mut self, start: Pc) {
        let end = self.pc();
        let data = &mut self.data[start.data..start.data + MACRO_LEN];
        data[0] = OpType::Macro as u8;
        put_u32(&mut data[1..], end.data as u32);
        put_u32(&mut data[5..], end.refs as u32);
    }

    pub(crate) fn add_call(&mut self, target: Ref, start: Pc, end: Pc) {
        let data = self.write1(CALL_LEN, target);
        data[0] = OpType::Call as u8;
        put_u32(&mut data[1..], start.data as u32);
        put_u32(&mut data[5..], start.refs as u32);
        put_u32(&mut data[9..], end.data as u32);
        put_u32(&mut data[13..], end.refs as u32);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payload encoding helpers
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn put_u32(out: &mut [u8], v: u32) {
    out[..4].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_f32(out: &mut [u8], v: f32) {
    put_u32(out, v.to_bits());
}

pub(crate) fn get_u32(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

pub(crate) fn get_f32(data: &[u8]) -> f32 {
    f32::from_bits(get_u32(data))
}

fn expect_op(data: &[u8], op: OpType) {
    if data.len() < op.size() || data[0] != op as u8 {
        panic!("invalid op: expected {:?}", op);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoders
// ─────────────────────────────────────────────────────────────────────────────

/// Decode a transform op into its matrix and push flag.
pub fn decode_transform(data: &[u8]) -> (Affine2D, bool) {
    expect_op(data, OpType::Transform);
    let push = data[1] != 0;
    let d = &data[2..];
    let e = |i: usize| get_f32(&d[4 * i..]);
    (Affine2D::new(e(0), e(1), e(2), e(3), e(4), e(5)), push)
}

/// Decoded clip op
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipData {
    pub bounds: IRect,
    pub outline: bool,
    pub shape: Shape,
}

pub fn decode_clip(data: &[u8]) -> ClipData {
    expect_op(data, OpType::Clip);
    let i = |off: usize| get_u32(&data[off..]) as i32;
    ClipData {
        bounds: IRect {
            min: IPoint::new(i(1), i(5)),
            max: IPoint::new(i(9), i(13)),
        },
        outline: data[17] == 1,
        shape: Shape::from_u8(data[18]),
    }
}

pub fn decode_color(data: &[u8]) -> Nrgba {
    expect_op(data, OpType::Color);
    Nrgba::new(data[1], data[2], data[3], data[4])
}

/// Decoded linear gradient op
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearGradientData {
    pub stop1: Point,
    pub stop2: Point,
    pub color1: Nrgba,
    pub color2: Nrgba,
}

pub fn decode_linear_gradient(data: &[u8]) -> LinearGradientData {
    expect_op(data, OpType::LinearGradient);
    LinearGradientData {
        stop1: Point::new(get_f32(&data[1..]), get_f32(&data[5..])),
        stop2: Point::new(get_f32(&data[9..]), get_f32(&data[13..])),
        color1: Nrgba::new(data[17], data[18], data[19], data[20]),
        color2: Nrgba::new(data[21], data[22], data[23], data[24]),
    }
}

pub fn decode_image(data: &[u8], refs: &[Ref]) -> ImageHandle {
    expect_op(data, OpType::Image);
    match refs.first() {
        Some(Ref::Image(handle)) => handle.clone(),
        _ => panic!("invalid op: image without image reference"),
    }
}

pub fn decode_save(data: &[u8]) -> u32 {
    expect_op(data, OpType::Save);
    get_u32(&data[1..])
}

pub fn decode_load(data: &[u8]) -> u32 {
    expect_op(data, OpType::Load);
    get_u32(&data[1..])
}

pub fn decode_stroke(data: &[u8]) -> f32 {
    expect_op(data, OpType::Stroke);
    get_f32(&data[1..])
}

/// Content hash carried by a path op.
pub fn decode_path(data: &[u8]) -> u64 {
    expect_op(data, OpType::Path);
    let mut b = [0u8; 8];
    b.copy_from_slice(&data[1..9]);
    u64::from_le_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_table() {
        assert_eq!(OpType::from_u8(200), Some(OpType::Macro));
        assert_eq!(OpType::from_u8(216), Some(OpType::Stroke));
        assert_eq!(OpType::from_u8(217), None);
        assert_eq!(OpType::from_u8(0), None);
        for op in ALL {
            assert_eq!(OpType::from_u8(op as u8), Some(op));
        }
        assert_eq!(OpType::Call.num_refs(), 1);
        assert_eq!(OpType::Transform.size(), 26);
        assert_eq!(OpType::Clip.size(), 19);
    }

    #[test]
    #[should_panic(expected = "unbalanced operation")]
    fn test_unbalanced_stack() {
        let mut s = StackTracker::default();
        let a = s.push();
        let _b = s.push();
        s.pop(a);
    }

    #[test]
    fn test_reset_bumps_version() {
        let mut ops = Ops::new();
        ops.write(3);
        let v = ops.version();
        ops.reset();
        assert!(ops.is_empty());
        assert_eq!(ops.version(), v + 1);
    }

    #[test]
    fn test_lists_have_unique_ids() {
        assert_ne!(Ops::new().id(), Ops::new().id());
    }
}
