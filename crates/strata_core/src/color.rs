//! sRGB and linear color
//!
//! Colors enter the pipeline as non-premultiplied 8-bit sRGB and are drawn as
//! premultiplied linear floats. The sRGB to linear direction is table driven
//! since every input channel is one of 256 values.

use std::sync::OnceLock;

/// Non-premultiplied 8-bit sRGB color
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Nrgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Nrgba {
    pub const BLACK: Nrgba = Nrgba::new(0, 0, 0, 0xff);
    pub const WHITE: Nrgba = Nrgba::new(0xff, 0xff, 0xff, 0xff);
    pub const TRANSPARENT: Nrgba = Nrgba::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_hex(hex: u32) -> Self {
        Self::new(
            ((hex >> 24) & 0xff) as u8,
            ((hex >> 16) & 0xff) as u8,
            ((hex >> 8) & 0xff) as u8,
            (hex & 0xff) as u8,
        )
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Premultiplied linear color
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LinearRgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl LinearRgba {
    pub const TRANSPARENT: LinearRgba = LinearRgba::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Convert from non-premultiplied sRGB, premultiplying by alpha.
    pub fn from_srgb(c: Nrgba) -> Self {
        let table = srgb_table();
        let a = c.a as f32 / 255.0;
        Self {
            r: table[c.r as usize] * a,
            g: table[c.g as usize] * a,
            b: table[c.b as usize] * a,
            a,
        }
    }

    /// Convert back to non-premultiplied sRGB.
    pub fn to_srgb(self) -> Nrgba {
        if self.a == 0.0 {
            return Nrgba::TRANSPARENT;
        }
        let q = |c: f32| (linear_to_srgb(c / self.a) * 255.0 + 0.5) as u8;
        Nrgba {
            r: q(self.r),
            g: q(self.g),
            b: q(self.b),
            a: (self.a * 255.0 + 0.5) as u8,
        }
    }

    /// The color with alpha forced to one.
    pub fn opaque(mut self) -> Self {
        self.a = 1.0;
        self
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

fn srgb_table() -> &'static [f32; 256] {
    static TABLE: OnceLock<[f32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t = [0.0; 256];
        for (i, v) in t.iter_mut().enumerate() {
            *v = srgb_to_linear(i as f32 / 255.0);
        }
        t
    })
}

/// sRGB to linear (EXT_sRGB).
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Linear to sRGB (EXT_sRGB).
pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.0 {
        0.0
    } else if c < 0.0031308 {
        12.92 * c
    } else if c < 1.0 {
        1.055 * c.powf(0.41666) - 0.055
    } else {
        1.0
    }
}
