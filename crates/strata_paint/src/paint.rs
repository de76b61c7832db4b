//! Paint operations: brushes and the paint op that fills the clip area

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use strata_core::{Nrgba, Point};

use crate::clip::{ClipOp, ClipStack};
use crate::ops::{put_f32, OpType, Ops, Ref, COLOR_LEN, IMAGE_LEN, LINEAR_GRADIENT_LEN, PAINT_LEN};

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Shared, immutable image data with a stable identity
///
/// The identity is what GPU texture caches key on, so the pixels of a handle
/// must never change. Create a new handle for new contents.
#[derive(Clone, Debug)]
pub struct ImageHandle {
    id: u64,
    image: Arc<RgbaImage>,
}

impl ImageHandle {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
            image: Arc::new(image),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl PartialEq for ImageHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ImageHandle {}

/// Sets the brush to a constant color
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorOp {
    pub color: Nrgba,
}

impl ColorOp {
    pub fn new(color: Nrgba) -> Self {
        Self { color }
    }

    pub fn add(&self, o: &mut Ops) {
        let data = o.write(COLOR_LEN);
        data[0] = OpType::Color as u8;
        data[1..5].copy_from_slice(&self.color.to_array());
    }
}

/// Sets the brush to a gradient from `color1` at `stop1` to `color2` at
/// `stop2`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearGradientOp {
    pub stop1: Point,
    pub color1: Nrgba,
    pub stop2: Point,
    pub color2: Nrgba,
}

impl LinearGradientOp {
    pub fn add(&self, o: &mut Ops) {
        let data = o.write(LINEAR_GRADIENT_LEN);
        data[0] = OpType::LinearGradient as u8;
        put_f32(&mut data[1..], self.stop1.x);
        put_f32(&mut data[5..], self.stop1.y);
        put_f32(&mut data[9..], self.stop2.x);
        put_f32(&mut data[13..], self.stop2.y);
        data[17..21].copy_from_slice(&self.color1.to_array());
        data[21..25].copy_from_slice(&self.color2.to_array());
    }
}

/// Sets the brush to an image, placed with its top-left corner at the origin
#[derive(Clone, Debug, PartialEq)]
pub struct ImageOp {
    handle: ImageHandle,
}

impl ImageOp {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            handle: ImageHandle::new(image),
        }
    }

    pub fn from_handle(handle: ImageHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &ImageHandle {
        &self.handle
    }

    /// Empty images add nothing.
    pub fn add(&self, o: &mut Ops) {
        if self.handle.width() == 0 || self.handle.height() == 0 {
            return;
        }
        o.write1(IMAGE_LEN, Ref::Image(self.handle.clone()))[0] = OpType::Image as u8;
    }
}

/// Fills the current clip area with the current brush
#[derive(Clone, Copy, Debug, Default)]
pub struct PaintOp;

impl PaintOp {
    pub fn add(&self, o: &mut Ops) {
        o.write(PAINT_LEN)[0] = OpType::Paint as u8;
    }
}

/// Fill `shape` with `color`.
pub fn fill_shape(o: &mut Ops, color: Nrgba, shape: ClipOp) {
    let stack: ClipStack = shape.push(o);
    fill(o, color);
    stack.pop(o);
}

/// Fill the current clip area with `color`.
pub fn fill(o: &mut Ops, color: Nrgba) {
    ColorOp::new(color).add(o);
    PaintOp.add(o);
}
