//! Stencil and cover
//!
//! Clip paths are rendered in two steps. The [`Stenciler`] accumulates the
//! analytic coverage of a path's quads into a float atlas page, and
//! multiplies several coverages together for nested clips. The [`Coverer`]
//! then draws the paint as a quad, modulated by the coverage texture.

use bytemuck::{Pod, Zeroable};
use strata_core::{IPoint, IRect, Point};

use crate::blitter::uv_rows;
use crate::cache::PathData;
use crate::config::{RendererConfig, MAX_PATH_BATCH};
use crate::driver::{
    BlendDesc, BlendFactor, BufferBinding, BufferId, Device, InputDesc, PipelineDesc, Result,
    ShaderId, TextureDesc, TextureFilter, TextureFormat, TextureId, Topology, VertexLayout,
};
use crate::material::{Material, MaterialType};
use crate::path::VERTEX_STRIDE;
use crate::pipeline::{
    build_or_release, create_color_pipelines, quad_layout, ColorPipelines, Pipeline,
};
use crate::shaders::{
    COVER_FRAG, COVER_VERT, INTERSECT_FRAG, INTERSECT_VERT, STENCIL_FRAG, STENCIL_VERT,
};

/// Atlas textures are recreated when the used area drops below this share
/// of the texture.
const MAX_FBO_WASTE: f32 = 1.2;

// ─────────────────────────────────────────────────────────────────────────────
// Uniform blocks
// ─────────────────────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CoverUniforms {
    pub transform: [f32; 4],
    pub uv_cover_transform: [f32; 4],
    pub uv_transform_r1: [f32; 4],
    pub uv_transform_r2: [f32; 4],
    pub z: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CoverTexUniforms {
    pub cover: CoverUniforms,
    _padding: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CoverColorUniforms {
    pub cover: CoverUniforms,
    _padding: [f32; 11],
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CoverGradientUniforms {
    pub cover: CoverUniforms,
    _padding: [f32; 7],
    pub color1: [f32; 4],
    pub color2: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct StencilUniforms {
    /// Page pixels to clip space
    pub transform: [f32; 4],
    pub path_offset: [f32; 2],
    _padding: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct IntersectUniforms {
    pub uv_transform: [f32; 4],
    pub sub_uv_transform: [f32; 4],
}

// ─────────────────────────────────────────────────────────────────────────────
// Atlas textures
// ─────────────────────────────────────────────────────────────────────────────

/// A coverage atlas page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StencilFbo {
    pub size: IPoint,
    pub tex: TextureId,
}

/// One texture per atlas page
#[derive(Debug, Default)]
pub struct FboSet {
    pub fbos: Vec<StencilFbo>,
}

impl FboSet {
    /// Match the textures to the page sizes, reusing a texture while it is
    /// large enough and not too wasteful.
    pub fn resize(&mut self, device: &mut dyn Device, sizes: &[IPoint]) -> Result<()> {
        let area = |p: IPoint| p.x as f32 * p.y as f32;
        for (i, &sz) in sizes.iter().enumerate() {
            if let Some(f) = self.fbos.get(i) {
                let fits = sz.x <= f.size.x && sz.y <= f.size.y;
                if fits && area(f.size) / area(sz) <= MAX_FBO_WASTE {
                    continue;
                }
            }
            let tex = device.new_texture(&TextureDesc {
                format: TextureFormat::Float,
                width: sz.x as u32,
                height: sz.y as u32,
                min_filter: TextureFilter::Nearest,
                mag_filter: TextureFilter::Nearest,
                bindings: BufferBinding::TEXTURE | BufferBinding::FRAMEBUFFER,
            })?;
            tracing::trace!("atlas page {} resized to {}x{}", i, sz.x, sz.y);
            let fbo = StencilFbo { size: sz, tex };
            match self.fbos.get_mut(i) {
                Some(f) => device.release_texture(std::mem::replace(f, fbo).tex),
                None => self.fbos.push(fbo),
            }
        }
        self.delete(device, sizes.len());
        Ok(())
    }

    /// Release the pages from `idx` on.
    pub fn delete(&mut self, device: &mut dyn Device, idx: usize) {
        if idx >= self.fbos.len() {
            return;
        }
        for f in self.fbos.drain(idx..) {
            device.release_texture(f.tex);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stenciler
// ─────────────────────────────────────────────────────────────────────────────

fn stencil_layout() -> VertexLayout {
    let f = std::mem::size_of::<f32>();
    VertexLayout {
        inputs: vec![
            // corner, max_y, from, ctrl, to
            InputDesc::float(1, 0),
            InputDesc::float(1, f),
            InputDesc::float(2, 2 * f),
            InputDesc::float(2, 4 * f),
            InputDesc::float(2, 6 * f),
        ],
        stride: VERTEX_STRIDE,
    }
}

pub struct Stenciler {
    pub pipeline: Pipeline,
    pub ipipeline: Pipeline,
    shaders: [ShaderId; 4],
    uniforms: StencilUniforms,
    iuniforms: IntersectUniforms,
    pub fbos: FboSet,
    pub intersections: FboSet,
    pub index_buf: BufferId,
    /// Quads per draw call.
    batch: usize,
}

impl Stenciler {
    pub fn new(device: &mut dyn Device, config: &RendererConfig) -> Result<Self> {
        // Quad vertex indices must fit in 16 bits.
        let batch = config.path_batch.clamp(1, MAX_PATH_BATCH);
        build_or_release(device, |device, pending| {
            // Two triangles per quad, 16-bit indices.
            let indices: Vec<u16> = (0..batch as u16)
                .flat_map(|i| [i * 4, i * 4 + 1, i * 4 + 2, i * 4 + 2, i * 4 + 1, i * 4 + 3])
                .collect();
            let index_buf =
                device.new_immutable_buffer(BufferBinding::INDICES, bytemuck::cast_slice(&indices))?;
            pending.buffers.push(index_buf);

            let vsh = device.new_vertex_shader(STENCIL_VERT)?;
            pending.shaders.push(vsh);
            let fsh = device.new_fragment_shader(STENCIL_FRAG)?;
            pending.shaders.push(fsh);
            let pipeline = Pipeline::new(
                device,
                &PipelineDesc {
                    vertex_shader: vsh,
                    fragment_shader: fsh,
                    vertex_layout: stencil_layout(),
                    blend: BlendDesc::new(BlendFactor::One, BlendFactor::One),
                    pixel_format: TextureFormat::Float,
                    topology: Topology::Triangles,
                },
                std::mem::size_of::<StencilUniforms>(),
            )?;
            pending.pipelines.push(pipeline);

            let ivsh = device.new_vertex_shader(INTERSECT_VERT)?;
            pending.shaders.push(ivsh);
            let ifsh = device.new_fragment_shader(INTERSECT_FRAG)?;
            pending.shaders.push(ifsh);
            let ipipeline = Pipeline::new(
                device,
                &PipelineDesc {
                    vertex_shader: ivsh,
                    fragment_shader: ifsh,
                    vertex_layout: quad_layout(),
                    blend: BlendDesc::new(BlendFactor::DstColor, BlendFactor::Zero),
                    pixel_format: TextureFormat::Float,
                    topology: Topology::TriangleStrip,
                },
                std::mem::size_of::<IntersectUniforms>(),
            )?;

            *pending = Default::default();
            Ok(Self {
                pipeline,
                ipipeline,
                shaders: [vsh, fsh, ivsh, ifsh],
                uniforms: StencilUniforms::default(),
                iuniforms: IntersectUniforms::default(),
                fbos: FboSet::default(),
                intersections: FboSet::default(),
                index_buf,
                batch,
            })
        })
    }

    pub fn begin(&mut self, device: &mut dyn Device, sizes: &[IPoint]) -> Result<()> {
        self.fbos.resize(device, sizes)
    }

    pub fn begin_intersect(&mut self, device: &mut dyn Device, sizes: &[IPoint]) -> Result<()> {
        self.intersections.resize(device, sizes)
    }

    /// The coverage page `idx`.
    pub fn cover(&self, idx: usize) -> StencilFbo {
        self.fbos.fbos[idx]
    }

    /// Accumulate the coverage of a path whose clip `bounds` land at `uv` in
    /// the current page. The stencil pipeline and index buffer must be bound.
    pub fn stencil_path(
        &mut self,
        device: &mut dyn Device,
        bounds: IRect,
        offset: Point,
        uv: IPoint,
        data: &PathData,
    ) {
        let Some(buffer) = data.buffer else {
            return;
        };
        device.viewport(uv.x, uv.y, bounds.dx(), bounds.dy());
        let (w, h) = (bounds.dx() as f32, bounds.dy() as f32);
        self.uniforms.transform = [
            2.0 / w,
            2.0 / h,
            -1.0 - bounds.min.x as f32 * 2.0 / w,
            -1.0 - bounds.min.y as f32 * 2.0 / h,
        ];
        self.uniforms.path_offset = [offset.x, offset.y];
        self.pipeline
            .upload_uniforms(device, bytemuck::bytes_of(&self.uniforms));

        let nquads = data.ncurves / 4;
        let mut start = 0;
        while start < nquads {
            let batch = (nquads - start).min(self.batch);
            device.bind_vertex_buffer(buffer, VERTEX_STRIDE * start * 4);
            device.draw_elements(0, batch * 6);
            start += batch;
        }
    }

    /// Multiply a path's coverage into the current intersection page.
    /// `cover` locates the path in its coverage page, `sub` the intersected
    /// area within the path's clip.
    pub fn intersect_path(
        &mut self,
        device: &mut dyn Device,
        cover: (Point, Point),
        sub: (Point, Point),
    ) {
        let ((cs, co), (ss, so)) = (cover, sub);
        self.iuniforms.uv_transform = [cs.x, cs.y, co.x, co.y];
        self.iuniforms.sub_uv_transform = [ss.x, ss.y, so.x, so.y];
        self.ipipeline
            .upload_uniforms(device, bytemuck::bytes_of(&self.iuniforms));
        device.draw_arrays(0, 4);
    }

    pub fn release(mut self, device: &mut dyn Device) {
        self.fbos.delete(device, 0);
        self.intersections.delete(device, 0);
        self.pipeline.release(device);
        self.ipipeline.release(device);
        for s in self.shaders {
            device.release_shader(s);
        }
        device.release_buffer(self.index_buf);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Coverer
// ─────────────────────────────────────────────────────────────────────────────

pub struct Coverer {
    pub pipelines: ColorPipelines,
    col_uniforms: CoverColorUniforms,
    tex_uniforms: CoverTexUniforms,
    gradient_uniforms: CoverGradientUniforms,
}

impl Coverer {
    pub fn new(device: &mut dyn Device) -> Result<Self> {
        let pipelines = create_color_pipelines(
            device,
            COVER_VERT,
            COVER_FRAG,
            [
                std::mem::size_of::<CoverColorUniforms>(),
                std::mem::size_of::<CoverGradientUniforms>(),
                std::mem::size_of::<CoverTexUniforms>(),
            ],
        )?;
        Ok(Self {
            pipelines,
            col_uniforms: CoverColorUniforms::default(),
            tex_uniforms: CoverTexUniforms::default(),
            gradient_uniforms: CoverGradientUniforms::default(),
        })
    }

    /// Draw `mat` with the quad at `scale`, `off` in clip space, modulated by
    /// the coverage at `cover_scale`, `cover_off` in the bound coverage
    /// texture.
    pub fn cover(
        &mut self,
        device: &mut dyn Device,
        quad_verts: BufferId,
        mat: &Material,
        (scale, off): (Point, Point),
        (cover_scale, cover_off): (Point, Point),
    ) {
        let p = *self.pipelines.get(mat.material);
        device.bind_pipeline(p.pipeline);
        device.bind_vertex_buffer(quad_verts, 0);
        let transform = [scale.x, scale.y, off.x, off.y];
        let uv_cover = [cover_scale.x, cover_scale.y, cover_off.x, cover_off.y];
        let set = |u: &mut CoverUniforms| {
            u.transform = transform;
            u.uv_cover_transform = uv_cover;
            (u.uv_transform_r1, u.uv_transform_r2) = uv_rows(&mat.uv_trans);
        };
        match mat.material {
            MaterialType::Color => {
                let u = &mut self.col_uniforms;
                u.color = mat.color.to_array();
                set(&mut u.cover);
                p.upload_uniforms(device, bytemuck::bytes_of(&*u));
            }
            MaterialType::LinearGradient => {
                let u = &mut self.gradient_uniforms;
                u.color1 = mat.color1.to_array();
                u.color2 = mat.color2.to_array();
                set(&mut u.cover);
                p.upload_uniforms(device, bytemuck::bytes_of(&*u));
            }
            MaterialType::Texture => {
                let u = &mut self.tex_uniforms;
                set(&mut u.cover);
                p.upload_uniforms(device, bytemuck::bytes_of(&*u));
            }
        }
        device.draw_arrays(0, 4);
    }

    pub fn release(self, device: &mut dyn Device) {
        self.pipelines.release(device);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pather
// ─────────────────────────────────────────────────────────────────────────────

pub struct Pather {
    pub viewport: IPoint,
    pub stenciler: Stenciler,
    pub coverer: Coverer,
}

impl Pather {
    pub fn new(device: &mut dyn Device, config: &RendererConfig) -> Result<Self> {
        let stenciler = Stenciler::new(device, config)?;
        let coverer = match Coverer::new(device) {
            Ok(c) => c,
            Err(err) => {
                stenciler.release(device);
                return Err(err);
            }
        };
        Ok(Self {
            viewport: IPoint::ZERO,
            stenciler,
            coverer,
        })
    }

    pub fn release(self, device: &mut dyn Device) {
        self.stenciler.release(device);
        self.coverer.release(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{LoadDesc, RenderTarget};
    use crate::headless::{DeviceCommand, HeadlessDevice};

    #[test]
    fn test_uniform_sizes() {
        assert_eq!(std::mem::size_of::<CoverUniforms>(), 68);
        assert_eq!(std::mem::size_of::<CoverTexUniforms>(), 80);
        assert_eq!(std::mem::size_of::<CoverColorUniforms>(), 128);
        assert_eq!(std::mem::size_of::<CoverGradientUniforms>(), 128);
        assert_eq!(std::mem::size_of::<StencilUniforms>(), 32);
        assert_eq!(std::mem::size_of::<IntersectUniforms>(), 32);
    }

    #[test]
    fn test_stencil_layout_matches_vertex() {
        let layout = stencil_layout();
        assert_eq!(layout.stride, 32);
        let offsets: Vec<usize> = layout.inputs.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, [0, 4, 8, 16, 24]);
    }

    #[test]
    fn test_fbo_set_reuses_and_shrinks() {
        let mut device = HeadlessDevice::new();
        let mut set = FboSet::default();
        set.resize(&mut device, &[IPoint::new(100, 100), IPoint::new(50, 50)]).unwrap();
        assert_eq!(device.live_textures(), 2);
        let first = set.fbos[0].tex;
        let desc = device.texture_desc(first).unwrap();
        assert_eq!(desc.format, TextureFormat::Float);
        assert!(desc.bindings.contains(BufferBinding::FRAMEBUFFER));

        // Slightly smaller pages keep their textures; extra pages go.
        set.resize(&mut device, &[IPoint::new(95, 100)]).unwrap();
        assert_eq!(set.fbos.len(), 1);
        assert_eq!(set.fbos[0].tex, first);
        assert_eq!(device.live_textures(), 1);

        // Growing recreates.
        set.resize(&mut device, &[IPoint::new(101, 100)]).unwrap();
        assert_ne!(set.fbos[0].tex, first);
        assert_eq!(set.fbos[0].size, IPoint::new(101, 100));

        // So does a much smaller page.
        let grown = set.fbos[0].tex;
        set.resize(&mut device, &[IPoint::new(10, 10)]).unwrap();
        assert_ne!(set.fbos[0].tex, grown);
        assert_eq!(device.live_textures(), 1);

        set.delete(&mut device, 0);
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn test_stencil_path_batches() {
        let mut device = HeadlessDevice::new();
        let config = RendererConfig {
            path_batch: 3,
            ..Default::default()
        };
        let mut st = Stenciler::new(&mut device, &config).unwrap();
        let buffer = device
            .new_immutable_buffer(BufferBinding::VERTICES, &vec![0u8; 7 * 4 * VERTEX_STRIDE])
            .unwrap();
        let data = PathData {
            ncurves: 7 * 4,
            buffer: Some(buffer),
        };
        st.begin(&mut device, &[IPoint::new(64, 64)]).unwrap();
        device.begin_frame(RenderTarget::Default, false, IPoint::new(64, 64)).unwrap();
        device.begin_render_pass(st.cover(0).tex, LoadDesc::default());
        device.take_commands();

        st.stencil_path(&mut device, IRect::new(10, 10, 30, 20), Point::ZERO, IPoint::new(2, 3), &data);
        let cmds = device.take_commands();
        assert_eq!(
            cmds[0],
            DeviceCommand::Viewport {
                x: 2,
                y: 3,
                width: 20,
                height: 10
            }
        );
        let draws: Vec<_> = cmds
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::BindVertexBuffer { offset, .. } => Some(("bind", *offset)),
                DeviceCommand::DrawElements { count, .. } => Some(("draw", *count)),
                _ => None,
            })
            .collect();
        let q = 4 * VERTEX_STRIDE;
        assert_eq!(
            draws,
            [("bind", 0), ("draw", 18), ("bind", 3 * q), ("draw", 18), ("bind", 6 * q), ("draw", 6)]
        );

        device.end_render_pass();
        device.end_frame().unwrap();
        st.release(&mut device);
        device.release_buffer(buffer);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.live_shaders(), 0);
    }

    #[test]
    fn test_stenciler_clamps_batch() {
        let mut device = HeadlessDevice::new();
        for (requested, expected) in [(0, 1), (20_000, MAX_PATH_BATCH), (70_000, MAX_PATH_BATCH)] {
            let config = RendererConfig {
                path_batch: requested,
                ..Default::default()
            };
            let st = Stenciler::new(&mut device, &config).unwrap();
            assert_eq!(st.batch, expected);
            let indices: Vec<u16> = device
                .buffer_data(st.index_buf)
                .unwrap()
                .chunks_exact(2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .collect();
            assert_eq!(indices.len(), expected * 6);
            assert_eq!(indices.iter().max().copied(), Some((expected * 4 - 1) as u16));
            st.release(&mut device);
        }
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_stencil_path_with_zero_batch_terminates() {
        let mut device = HeadlessDevice::new();
        let config = RendererConfig {
            path_batch: 0,
            ..Default::default()
        };
        let mut st = Stenciler::new(&mut device, &config).unwrap();
        let buffer = device
            .new_immutable_buffer(BufferBinding::VERTICES, &vec![0u8; 2 * 4 * VERTEX_STRIDE])
            .unwrap();
        let data = PathData {
            ncurves: 2 * 4,
            buffer: Some(buffer),
        };
        st.begin(&mut device, &[IPoint::new(16, 16)]).unwrap();
        device.begin_frame(RenderTarget::Default, false, IPoint::new(16, 16)).unwrap();
        device.begin_render_pass(st.cover(0).tex, LoadDesc::default());
        device.take_commands();

        st.stencil_path(&mut device, IRect::new(0, 0, 8, 8), Point::ZERO, IPoint::ZERO, &data);
        let draws = device
            .take_commands()
            .into_iter()
            .filter(|c| matches!(c, DeviceCommand::DrawElements { count: 6, .. }))
            .count();
        assert_eq!(draws, 2);

        device.end_render_pass();
        device.end_frame().unwrap();
        st.release(&mut device);
        device.release_buffer(buffer);
    }

    #[test]
    fn test_pather_failure_releases_stenciler() {
        let mut device = HeadlessDevice::new();
        device.fail_shader(COVER_FRAG[0]);
        assert!(Pather::new(&mut device, &RendererConfig::default()).is_err());
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_pipelines(), 0);
        assert_eq!(device.live_shaders(), 0);
    }
}
