//! Frame rendering stages
//!
//! Given the collected clip tree and paints, the [`Renderer`] places every
//! clip path in a coverage atlas, stencils the paths, multiplies nested
//! clips into intersection pages and finally draws the paints.

use image::RgbaImage;
use smallvec::SmallVec;
use strata_core::{IPoint, IRect, LinearRgba};
use strata_paint::ImageHandle;

use crate::blitter::Blitter;
use crate::cache::{OpCache, Resource, ResourceCache};
use crate::collect::{ClipType, ImageOp, PathOp};
use crate::config::RendererConfig;
use crate::driver::{
    BufferBinding, Device, LoadDesc, Result, TextureDesc, TextureFilter, TextureFormat, TextureId,
};
use crate::material::{clip_space_transform, tex_space_transform, Material, MaterialType};
use crate::pack::{Packer, Placement};
use crate::pather::{Pather, StencilFbo, Stenciler};

/// Intersection pages start out fully covered.
const INTERSECT_CLEAR: LinearRgba = LinearRgba::new(1.0, 0.0, 0.0, 0.0);

/// Device texture of a painted image
pub struct Texture {
    src: ImageHandle,
    tex: Option<TextureId>,
}

impl Resource for Texture {
    fn release(&mut self, device: &mut dyn Device) {
        if let Some(tex) = self.tex.take() {
            tracing::trace!("releasing texture of image {}", self.src.id());
            device.release_texture(tex);
        }
    }
}

/// Image textures keyed by image id
pub type TextureCache = ResourceCache<u64, Texture>;

/// RGBA bytes with the color channels premultiplied by alpha.
fn premultiplied(img: &RgbaImage) -> Vec<u8> {
    img.pixels()
        .flat_map(|p| {
            let [r, g, b, a] = p.0;
            let m = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
            [m(r), m(g), m(b), a]
        })
        .collect()
}

/// The texture of an image, created and uploaded on first use.
pub fn tex_handle(
    device: &mut dyn Device,
    cache: &mut TextureCache,
    image: &ImageHandle,
) -> Result<TextureId> {
    let t = cache.get_or_put(image.id(), || Texture {
        src: image.clone(),
        tex: None,
    });
    if let Some(tex) = t.tex {
        return Ok(tex);
    }
    let (w, h) = (image.width(), image.height());
    let tex = device.new_texture(&TextureDesc {
        format: TextureFormat::Srgba,
        width: w,
        height: h,
        min_filter: TextureFilter::Linear,
        mag_filter: TextureFilter::Linear,
        bindings: BufferBinding::TEXTURE,
    })?;
    let pixels = premultiplied(image.image());
    device.upload_texture(
        tex,
        IPoint::ZERO,
        IPoint::new(w as i32, h as i32),
        &pixels,
        w as usize * 4,
    );
    t.tex = Some(tex);
    Ok(tex)
}

fn texture_of(mat: &Material) -> Option<&ImageHandle> {
    match mat.material {
        MaterialType::Texture => mat.data.as_ref(),
        _ => None,
    }
}

pub struct Renderer {
    pub blitter: Blitter,
    pub pather: Pather,
    /// Places clip paths in coverage pages.
    pub packer: Packer,
    /// Places paints with several clip paths in intersection pages.
    pub intersections: Packer,
}

impl Renderer {
    pub fn new(device: &mut dyn Device, config: &RendererConfig) -> Result<Self> {
        let blitter = Blitter::new(device)?;
        let pather = match Pather::new(device, config) {
            Ok(p) => p,
            Err(err) => {
                blitter.release(device);
                return Err(err);
            }
        };
        let dim = config.max_atlas_dim as i32;
        let max_dims = IPoint::new(dim, dim);
        Ok(Self {
            blitter,
            pather,
            packer: Packer::new(max_dims),
            intersections: Packer::new(max_dims),
        })
    }

    pub fn set_viewport(&mut self, viewport: IPoint) {
        self.blitter.viewport = viewport;
        self.pather.viewport = viewport;
    }

    pub fn release(self, device: &mut dyn Device) {
        self.pather.release(device);
        self.blitter.release(device);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Coverage
    // ─────────────────────────────────────────────────────────────────────────

    /// Place every clip path in the coverage atlas. Paths that no paint
    /// reached are dropped.
    ///
    /// # Panics
    ///
    /// If a clip is larger than the maximum atlas page.
    pub fn pack_stencils(&mut self, nodes: &mut [PathOp], path_ops: &mut Vec<usize>) {
        self.packer.clear();
        let mut i = 0;
        while i < path_ops.len() {
            let p = &mut nodes[path_ops[i]];
            if p.clip.is_empty() {
                path_ops.swap_remove(i);
                continue;
            }
            let Some(place) = self.packer.add(p.clip.size()) else {
                panic!(
                    "clip area {:?} is larger than maximum texture size {:?}",
                    p.clip,
                    self.packer.max_dims()
                );
            };
            p.place = place;
            i += 1;
        }
    }

    /// Render the coverage of every placed path, one pass per page.
    pub fn stencil_clips(
        &mut self,
        device: &mut dyn Device,
        path_cache: &mut OpCache,
        nodes: &[PathOp],
        path_ops: &[usize],
    ) -> Result<()> {
        // Resizing to no pages frees the pages of earlier frames.
        let st = &mut self.pather.stenciler;
        st.begin(device, self.packer.sizes())?;
        let mut page = None;
        for &idx in path_ops {
            let p = &nodes[idx];
            if page != Some(p.place.idx) {
                if page.is_some() {
                    device.end_render_pass();
                }
                page = Some(p.place.idx);
                let load = LoadDesc::clear(LinearRgba::TRANSPARENT);
                device.begin_render_pass(st.cover(p.place.idx).tex, load);
                device.bind_pipeline(st.pipeline.pipeline);
                device.bind_index_buffer(st.index_buf);
            }
            let Some(data) = path_cache.get(&p.path_key).map(|v| v.data) else {
                continue;
            };
            st.stencil_path(device, p.clip, p.off, p.place.pos, &data);
        }
        if page.is_some() {
            device.end_render_pass();
        }
        Ok(())
    }

    /// Decide how each paint is clipped. A paint under a single clip path
    /// reads that path's coverage directly; several paths need an
    /// intersection page.
    pub fn pack_intersections(&mut self, nodes: &[PathOp], image_ops: &mut [ImageOp]) {
        self.intersections.clear();
        for img in image_ops.iter_mut() {
            let mut npaths = 0;
            let mut one_path = None;
            let mut p = img.path;
            while let Some(idx) = p {
                let node = &nodes[idx];
                if node.path {
                    one_path = Some(node);
                    npaths += 1;
                }
                p = node.parent;
            }
            match (npaths, one_path) {
                (1, Some(path)) => {
                    img.place = Placement {
                        idx: path.place.idx,
                        pos: path.place.pos - path.clip.min + img.clip.min,
                    };
                    img.clip_type = ClipType::Path;
                }
                (0, _) | (_, None) => {}
                (_, Some(_)) => {
                    // Every paint clip is inside a path clip that already fit.
                    let Some(place) = self.intersections.add(img.clip.size()) else {
                        panic!("internal error: intersection of {:?} does not fit", img.clip);
                    };
                    img.place = place;
                    img.clip_type = ClipType::Intersection;
                }
            }
        }
    }

    /// Make the coverage pages read by intersections ready for sampling.
    pub fn prepare_intersections(
        &self,
        device: &mut dyn Device,
        nodes: &[PathOp],
        image_ops: &[ImageOp],
    ) {
        for img in image_ops.iter().filter(|img| img.clip_type == ClipType::Intersection) {
            let mut p = img.path;
            while let Some(idx) = p {
                let node = &nodes[idx];
                if node.path {
                    device.prepare_texture(self.pather.stenciler.cover(node.place.idx).tex);
                }
                p = node.parent;
            }
        }
    }

    /// Multiply the coverages of every path above an intersected paint into
    /// its intersection slot.
    pub fn intersect(
        &mut self,
        device: &mut dyn Device,
        nodes: &[PathOp],
        image_ops: &[ImageOp],
    ) -> Result<()> {
        let st = &mut self.pather.stenciler;
        st.begin_intersect(device, self.intersections.sizes())?;
        let mut page = None;
        for img in image_ops.iter().filter(|img| img.clip_type == ClipType::Intersection) {
            if page != Some(img.place.idx) {
                if page.is_some() {
                    device.end_render_pass();
                }
                page = Some(img.place.idx);
                let f = st.intersections.fbos[img.place.idx];
                device.begin_render_pass(f.tex, LoadDesc::clear(INTERSECT_CLEAR));
                device.bind_pipeline(st.ipipeline.pipeline);
                device.bind_vertex_buffer(self.blitter.quad_verts, 0);
            }
            device.viewport(img.place.pos.x, img.place.pos.y, img.clip.dx(), img.clip.dy());
            if let Some(leaf) = img.path {
                intersect_chain(st, device, nodes, leaf, img.clip);
            }
        }
        if page.is_some() {
            device.end_render_pass();
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Paints
    // ─────────────────────────────────────────────────────────────────────────

    pub fn upload_images(
        device: &mut dyn Device,
        cache: &mut TextureCache,
        image_ops: &[ImageOp],
    ) -> Result<()> {
        for image in image_ops.iter().filter_map(|img| texture_of(&img.material)) {
            tex_handle(device, cache, image)?;
        }
        Ok(())
    }

    /// Make every texture sampled by the paints ready, outside the render
    /// pass that draws them.
    pub fn prepare_draw_ops(
        &self,
        device: &mut dyn Device,
        cache: &mut TextureCache,
        image_ops: &[ImageOp],
    ) -> Result<()> {
        for img in image_ops {
            if let Some(image) = texture_of(&img.material) {
                let tex = tex_handle(device, cache, image)?;
                device.prepare_texture(tex);
            }
            if let Some(fbo) = self.coverage_of(img) {
                device.prepare_texture(fbo.tex);
            }
        }
        Ok(())
    }

    fn coverage_of(&self, img: &ImageOp) -> Option<StencilFbo> {
        let st = &self.pather.stenciler;
        match img.clip_type {
            ClipType::None => None,
            ClipType::Path => Some(st.cover(img.place.idx)),
            ClipType::Intersection => Some(st.intersections.fbos[img.place.idx]),
        }
    }

    /// Draw the paints in order into the current render pass.
    pub fn draw_ops(
        &mut self,
        device: &mut dyn Device,
        cache: &mut TextureCache,
        image_ops: &[ImageOp],
    ) -> Result<()> {
        let mut cover_tex = None;
        for img in image_ops {
            let m = &img.material;
            if let Some(image) = texture_of(m) {
                let tex = tex_handle(device, cache, image)?;
                device.bind_texture(0, tex);
            }
            let quad = clip_space_transform(img.clip, self.blitter.viewport);
            let Some(fbo) = self.coverage_of(img) else {
                self.blitter.blit(device, m, quad.0, quad.1);
                continue;
            };
            if cover_tex != Some(fbo.tex) {
                cover_tex = Some(fbo.tex);
                device.bind_texture(1, fbo.tex);
            }
            let uv = IRect::from_size(img.clip.size()).add(img.place.pos);
            let cover = tex_space_transform(uv.to_rect(), fbo.size);
            self.pather
                .coverer
                .cover(device, self.blitter.quad_verts, m, quad, cover);
        }
        Ok(())
    }
}

/// Multiply in the coverage of each path from the root down to `leaf`.
fn intersect_chain(
    st: &mut Stenciler,
    device: &mut dyn Device,
    nodes: &[PathOp],
    leaf: usize,
    clip: IRect,
) {
    let mut chain: SmallVec<[usize; 8]> = SmallVec::new();
    let mut p = Some(leaf);
    while let Some(idx) = p {
        chain.push(idx);
        p = nodes[idx].parent;
    }
    for &idx in chain.iter().rev() {
        let p = &nodes[idx];
        if !p.path {
            continue;
        }
        let uv = IRect::from_size(p.clip.size()).add(p.place.pos);
        let sub = clip.sub(p.clip.min);
        let fbo = st.cover(p.place.idx);
        device.bind_texture(0, fbo.tex);
        let cover = tex_space_transform(uv.to_rect(), fbo.size);
        let sub = tex_space_transform(sub.to_rect(), p.clip.size());
        st.intersect_path(device, cover, sub);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{DeviceCommand, HeadlessDevice};
    use image::Rgba;

    fn node(parent: Option<usize>, clip: IRect, path: bool) -> PathOp {
        PathOp {
            parent,
            clip,
            path,
            ..Default::default()
        }
    }

    fn image_op(path: Option<usize>, clip: IRect) -> ImageOp {
        ImageOp {
            path,
            clip,
            ..Default::default()
        }
    }

    #[test]
    fn test_premultiplied_pixels() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([255, 128, 0, 128]));
        img.put_pixel(1, 0, Rgba([10, 20, 30, 255]));
        assert_eq!(premultiplied(&img), [128, 64, 0, 128, 10, 20, 30, 255]);
    }

    #[test]
    fn test_texture_uploaded_once() {
        let mut device = HeadlessDevice::new();
        let mut cache = TextureCache::new();
        let image = ImageHandle::new(RgbaImage::new(4, 2));
        let a = tex_handle(&mut device, &mut cache, &image).unwrap();
        let b = tex_handle(&mut device, &mut cache, &image).unwrap();
        assert_eq!(a, b);
        assert_eq!(device.texture_uploads(a), Some(1));
        let desc = device.texture_desc(a).unwrap();
        assert_eq!((desc.width, desc.height), (4, 2));
        assert_eq!(desc.format, TextureFormat::Srgba);

        cache.frame(&mut device);
        cache.frame(&mut device);
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn test_pack_stencils_drops_unused_paths() {
        let mut r = Renderer::new(&mut HeadlessDevice::new(), &RendererConfig::default()).unwrap();
        let mut nodes = vec![
            node(None, IRect::new(0, 0, 10, 10), true),
            node(None, IRect::ZERO, true),
            node(None, IRect::new(5, 5, 25, 15), true),
        ];
        let mut path_ops = vec![0, 1, 2];
        r.pack_stencils(&mut nodes, &mut path_ops);
        assert_eq!(path_ops, [0, 2]);
        assert_eq!(nodes[0].place.pos, IPoint::ZERO);
        assert_eq!(r.packer.sizes().len(), 1);
    }

    #[test]
    #[should_panic(expected = "larger than maximum texture size")]
    fn test_pack_stencils_overflow() {
        let config = RendererConfig {
            max_atlas_dim: 16,
            ..Default::default()
        };
        let mut r = Renderer::new(&mut HeadlessDevice::new(), &config).unwrap();
        let mut nodes = vec![node(None, IRect::new(0, 0, 17, 1), true)];
        r.pack_stencils(&mut nodes, &mut vec![0]);
    }

    #[test]
    fn test_pack_intersections() {
        let mut r = Renderer::new(&mut HeadlessDevice::new(), &RendererConfig::default()).unwrap();
        let mut nodes = vec![
            node(None, IRect::new(0, 0, 50, 50), true),
            node(Some(0), IRect::new(10, 10, 40, 40), false),
            node(Some(1), IRect::new(20, 20, 30, 30), true),
            node(None, IRect::new(60, 60, 70, 70), false),
        ];
        nodes[0].place = Placement {
            idx: 0,
            pos: IPoint::new(100, 0),
        };
        let mut ops = vec![
            image_op(Some(1), IRect::new(10, 10, 40, 40)),
            image_op(Some(2), IRect::new(20, 20, 30, 30)),
            image_op(Some(3), IRect::new(60, 60, 70, 70)),
        ];
        r.pack_intersections(&nodes, &mut ops);

        assert_eq!(ops[0].clip_type, ClipType::Path);
        assert_eq!(ops[0].place.pos, IPoint::new(110, 10));
        assert_eq!(ops[1].clip_type, ClipType::Intersection);
        assert_eq!(ops[1].place.pos, IPoint::ZERO);
        assert_eq!(ops[2].clip_type, ClipType::None);
        assert_eq!(r.intersections.sizes(), &[IPoint::new(10, 10)]);
    }

    #[test]
    fn test_cover_texture_bound_once_per_page() {
        let mut device = HeadlessDevice::new();
        let mut r = Renderer::new(&mut device, &RendererConfig::default()).unwrap();
        let mut nodes = vec![node(None, IRect::new(0, 0, 20, 20), true)];
        let mut path_ops = vec![0];
        r.pack_stencils(&mut nodes, &mut path_ops);
        r.pather.stenciler.begin(&mut device, r.packer.sizes()).unwrap();
        r.set_viewport(IPoint::new(20, 20));
        let mut ops = vec![
            image_op(Some(0), IRect::new(0, 0, 10, 10)),
            image_op(Some(0), IRect::new(10, 10, 20, 20)),
        ];
        r.pack_intersections(&nodes, &mut ops);

        let mut cache = TextureCache::new();
        let target = device.begin_frame(Default::default(), false, IPoint::new(20, 20)).unwrap();
        device.begin_render_pass(target, LoadDesc::default());
        device.take_commands();
        r.draw_ops(&mut device, &mut cache, &ops).unwrap();
        let binds = device
            .commands()
            .iter()
            .filter(|c| matches!(c, DeviceCommand::BindTexture { unit: 1, .. }))
            .count();
        let draws = device
            .commands()
            .iter()
            .filter(|c| matches!(c, DeviceCommand::DrawArrays { .. }))
            .count();
        assert_eq!(binds, 1);
        assert_eq!(draws, 2);
        device.end_render_pass();
        device.end_frame().unwrap();
    }
}
