//! Paint materials
//!
//! A [`Material`] is the brush of a paint op resolved against the area it
//! covers: linear colors plus the transform from the covered rectangle to
//! gradient or texture space.

use strata_core::{Affine2D, IPoint, IRect, LinearRgba, Nrgba, Point, Rect};
use strata_paint::ImageHandle;

/// Shader variant of a material. The discriminant indexes the fragment
/// shader arrays in [`crate::shaders`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MaterialType {
    #[default]
    Color = 0,
    LinearGradient = 1,
    Texture = 2,
}

impl MaterialType {
    pub const ALL: [MaterialType; 3] = [
        MaterialType::Color,
        MaterialType::LinearGradient,
        MaterialType::Texture,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// The current brush of the draw state
#[derive(Clone, Debug, PartialEq)]
pub enum Brush {
    Color(Nrgba),
    LinearGradient {
        stop1: Point,
        stop2: Point,
        color1: Nrgba,
        color2: Nrgba,
    },
    Image(ImageHandle),
}

impl Default for Brush {
    fn default() -> Self {
        Brush::Color(Nrgba::BLACK)
    }
}

impl Brush {
    pub fn material_type(&self) -> MaterialType {
        match self {
            Brush::Color(_) => MaterialType::Color,
            Brush::LinearGradient { .. } => MaterialType::LinearGradient,
            Brush::Image(_) => MaterialType::Texture,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Material {
    pub material: MaterialType,
    pub opaque: bool,
    pub color: LinearRgba,
    pub color1: LinearRgba,
    pub color2: LinearRgba,
    /// Source image of texture materials.
    pub data: Option<ImageHandle>,
    /// From the unit square of the covered rectangle to gradient or texture
    /// coordinates.
    pub uv_trans: Affine2D,
}

/// Resolve `brush` for a paint covering `clip`.
///
/// `rect` is the untransformed paint rectangle relative to `off`, and
/// `partial` maps the unit square of its transformed bounds back to the
/// rectangle itself.
pub fn material_for(
    brush: &Brush,
    rect: Rect,
    off: Point,
    partial: &Affine2D,
    clip: IRect,
) -> Material {
    match brush {
        Brush::Color(c) => {
            let color = LinearRgba::from_srgb(*c);
            Material {
                material: MaterialType::Color,
                opaque: color.a == 1.0,
                color,
                ..Default::default()
            }
        }
        Brush::LinearGradient {
            stop1,
            stop2,
            color1,
            color2,
        } => {
            let color1 = LinearRgba::from_srgb(*color1);
            let color2 = LinearRgba::from_srgb(*color2);
            Material {
                material: MaterialType::LinearGradient,
                opaque: color1.a == 1.0 && color2.a == 1.0,
                color1,
                color2,
                uv_trans: partial.then(&gradient_space_transform(clip, off, *stop1, *stop2)),
                ..Default::default()
            }
        }
        Brush::Image(image) => {
            let dr = rect.add(off).round();
            let sz = IPoint::new(image.width() as i32, image.height() as i32);
            let mut sr = IRect::from_size(sz).to_rect();

            // Crop the source to the part of the image inside the clip.
            let (dx, sdx) = (dr.dx() as f32, sr.dx());
            sr.min.x += (clip.min.x - dr.min.x) as f32 * sdx / dx;
            sr.max.x -= (dr.max.x - clip.max.x) as f32 * sdx / dx;
            let (dy, sdy) = (dr.dy() as f32, sr.dy());
            sr.min.y += (clip.min.y - dr.min.y) as f32 * sdy / dy;
            sr.max.y -= (dr.max.y - clip.max.y) as f32 * sdy / dy;

            let (scale, offset) = tex_space_transform(sr, sz);
            Material {
                material: MaterialType::Texture,
                data: Some(image.clone()),
                uv_trans: partial
                    .then(&Affine2D::IDENTITY.scale(Point::ZERO, scale).offset(offset)),
                ..Default::default()
            }
        }
    }
}

/// Scale and offset mapping the unit square to `r` in texture coordinates
/// of a texture with the given size.
pub fn tex_space_transform(r: Rect, size: IPoint) -> (Point, Point) {
    let size = size.to_point();
    (
        Point::new(r.dx() / size.x, r.dy() / size.y),
        Point::new(r.min.x / size.x, r.min.y / size.y),
    )
}

/// Transform from the unit square of `clip` to gradient space, where `stop1`
/// maps to x = 0 and `stop2` to x = 1.
pub fn gradient_space_transform(clip: IRect, off: Point, stop1: Point, stop2: Point) -> Affine2D {
    let d = stop2 - stop1;
    let l = d.length();
    let a = (-d.y).atan2(d.x);
    Affine2D::IDENTITY
        .scale(Point::ZERO, clip.size().to_point())
        .offset(clip.min.to_point() - off)
        .offset(-stop1)
        .rotate(Point::ZERO, a)
        .scale(Point::ZERO, Point::new(1.0 / l, 1.0 / l))
}

/// Scale and offset mapping the [-1, 1] quad onto `r` in clip space of a
/// viewport.
pub fn clip_space_transform(r: IRect, viewport: IPoint) -> (Point, Point) {
    let (vx, vy) = (2.0 / viewport.x as f32, 2.0 / viewport.y as f32);
    let x = r.min.x as f32 * vx - 1.0;
    let y = r.min.y as f32 * vy - 1.0;
    let w = r.dx() as f32 * vx;
    let h = r.dy() as f32 * vy;
    (
        Point::new(w * 0.5, h * 0.5),
        Point::new(x + w * 0.5, y + h * 0.5),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn approx(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-5 && (a.y - b.y).abs() < 1e-5
    }

    #[test]
    fn test_color_opacity() {
        let clip = IRect::new(0, 0, 10, 10);
        let m = material_for(&Brush::default(), Rect::ZERO, Point::ZERO, &Affine2D::IDENTITY, clip);
        assert_eq!(m.material, MaterialType::Color);
        assert!(m.opaque);
        assert_eq!(m.color, LinearRgba::new(0.0, 0.0, 0.0, 1.0));

        let half = Brush::Color(Nrgba::new(255, 0, 0, 128));
        let m = material_for(&half, Rect::ZERO, Point::ZERO, &Affine2D::IDENTITY, clip);
        assert!(!m.opaque);
    }

    #[test]
    fn test_gradient_maps_stops() {
        let clip = IRect::new(0, 0, 100, 50);
        let brush = Brush::LinearGradient {
            stop1: Point::new(0.0, 0.0),
            stop2: Point::new(100.0, 0.0),
            color1: Nrgba::BLACK,
            color2: Nrgba::new(255, 255, 255, 0),
        };
        let m = material_for(&brush, Rect::ZERO, Point::ZERO, &Affine2D::IDENTITY, clip);
        assert_eq!(m.material, MaterialType::LinearGradient);
        assert!(!m.opaque);
        // The right edge of the clip is at the second stop.
        assert!(approx(m.uv_trans.transform_point(Point::new(1.0, 0.0)), Point::new(1.0, 0.0)));
        // Gradients only vary along x.
        let mid = m.uv_trans.transform_point(Point::new(0.5, 1.0));
        assert!((mid.x - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_texture_crop() {
        let image = ImageHandle::new(RgbaImage::new(10, 10));
        let brush = Brush::Image(image.clone());
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        // Only the right half is visible.
        let clip = IRect::new(5, 0, 10, 10);
        let m = material_for(&brush, rect, Point::ZERO, &Affine2D::IDENTITY, clip);
        assert_eq!(m.material, MaterialType::Texture);
        assert!(!m.opaque);
        assert_eq!(m.data, Some(image));
        assert!(approx(m.uv_trans.transform_point(Point::ZERO), Point::new(0.5, 0.0)));
        assert!(approx(m.uv_trans.transform_point(Point::new(1.0, 1.0)), Point::new(1.0, 1.0)));
    }

    #[test]
    fn test_clip_space() {
        let vp = IPoint::new(100, 100);
        let (scale, off) = clip_space_transform(IRect::new(0, 0, 100, 100), vp);
        assert!(approx(scale, Point::new(1.0, 1.0)));
        assert!(approx(off, Point::ZERO));

        let (scale, off) = clip_space_transform(IRect::new(50, 0, 100, 50), vp);
        assert!(approx(scale, Point::new(0.5, 0.5)));
        assert!(approx(off, Point::new(0.5, -0.5)));
    }

    #[test]
    fn test_tex_space() {
        let (scale, off) = tex_space_transform(Rect::new(2.0, 4.0, 6.0, 8.0), IPoint::new(8, 8));
        assert_eq!(scale, Point::new(0.5, 0.5));
        assert_eq!(off, Point::new(0.25, 0.5));
    }
}
