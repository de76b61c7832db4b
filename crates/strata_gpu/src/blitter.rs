//! Rectangle blits
//!
//! Paints whose clip is a pixel-aligned rectangle skip the coverage
//! textures entirely and are drawn as a single quad.

use bytemuck::{Pod, Zeroable};
use strata_core::{Affine2D, IPoint, Point};

use crate::driver::{BufferBinding, BufferId, Device, Result};
use crate::material::{Material, MaterialType};
use crate::pipeline::{build_or_release, create_color_pipelines, ColorPipelines};
use crate::shaders::{BLIT_FRAG, BLIT_VERT};

/// Corners of the full-screen quad: clip space position and texture
/// coordinate.
#[rustfmt::skip]
const QUAD_VERTS: [f32; 16] = [
    -1.0, -1.0, 0.0, 0.0,
    1.0, -1.0, 1.0, 0.0,
    -1.0, 1.0, 0.0, 1.0,
    1.0, 1.0, 1.0, 1.0,
];

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct BlitUniforms {
    /// Scale and offset of the quad in clip space
    pub transform: [f32; 4],
    pub uv_transform_r1: [f32; 4],
    pub uv_transform_r2: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct BlitColorUniforms {
    pub blit: BlitUniforms,
    _padding: [f32; 16],
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct BlitGradientUniforms {
    pub blit: BlitUniforms,
    _padding: [f32; 12],
    pub color1: [f32; 4],
    pub color2: [f32; 4],
}

/// Rows of a UV transform as uniform vectors.
pub(crate) fn uv_rows(t: &Affine2D) -> ([f32; 4], [f32; 4]) {
    let (t1, t2, t3, t4, t5, t6) = t.elems();
    ([t1, t2, t3, 0.0], [t4, t5, t6, 0.0])
}

pub struct Blitter {
    pub viewport: IPoint,
    pub quad_verts: BufferId,
    pub pipelines: ColorPipelines,
    col_uniforms: BlitColorUniforms,
    tex_uniforms: BlitUniforms,
    gradient_uniforms: BlitGradientUniforms,
}

impl Blitter {
    pub fn new(device: &mut dyn Device) -> Result<Self> {
        build_or_release(device, |device, pending| {
            let quad_verts = device
                .new_immutable_buffer(BufferBinding::VERTICES, bytemuck::cast_slice(&QUAD_VERTS))?;
            pending.buffers.push(quad_verts);
            let pipelines = create_color_pipelines(
                device,
                BLIT_VERT,
                BLIT_FRAG,
                [
                    std::mem::size_of::<BlitColorUniforms>(),
                    std::mem::size_of::<BlitGradientUniforms>(),
                    std::mem::size_of::<BlitUniforms>(),
                ],
            )?;
            pending.buffers.clear();
            Ok(Self {
                viewport: IPoint::ZERO,
                quad_verts,
                pipelines,
                col_uniforms: BlitColorUniforms::default(),
                tex_uniforms: BlitUniforms::default(),
                gradient_uniforms: BlitGradientUniforms::default(),
            })
        })
    }

    /// Draw a quad at `scale`, `off` in clip space with `mat`. The caller
    /// binds the texture of texture materials.
    pub fn blit(&mut self, device: &mut dyn Device, mat: &Material, scale: Point, off: Point) {
        let p = *self.pipelines.get(mat.material);
        device.bind_pipeline(p.pipeline);
        device.bind_vertex_buffer(self.quad_verts, 0);
        let transform = [scale.x, scale.y, off.x, off.y];
        match mat.material {
            MaterialType::Color => {
                self.col_uniforms.color = mat.color.to_array();
                self.col_uniforms.blit.transform = transform;
                p.upload_uniforms(device, bytemuck::bytes_of(&self.col_uniforms));
            }
            MaterialType::LinearGradient => {
                let u = &mut self.gradient_uniforms;
                u.color1 = mat.color1.to_array();
                u.color2 = mat.color2.to_array();
                (u.blit.uv_transform_r1, u.blit.uv_transform_r2) = uv_rows(&mat.uv_trans);
                u.blit.transform = transform;
                p.upload_uniforms(device, bytemuck::bytes_of(&*u));
            }
            MaterialType::Texture => {
                let u = &mut self.tex_uniforms;
                (u.uv_transform_r1, u.uv_transform_r2) = uv_rows(&mat.uv_trans);
                u.transform = transform;
                p.upload_uniforms(device, bytemuck::bytes_of(&*u));
            }
        }
        device.draw_arrays(0, 4);
    }

    pub fn release(self, device: &mut dyn Device) {
        device.release_buffer(self.quad_verts);
        self.pipelines.release(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{LoadDesc, RenderTarget};
    use crate::headless::{DeviceCommand, HeadlessDevice};
    use strata_core::LinearRgba;

    #[test]
    fn test_uniform_sizes() {
        assert_eq!(std::mem::size_of::<BlitUniforms>(), 48);
        assert_eq!(std::mem::size_of::<BlitColorUniforms>(), 128);
        assert_eq!(std::mem::size_of::<BlitGradientUniforms>(), 128);
    }

    #[test]
    fn test_blit_color() {
        let mut device = HeadlessDevice::new();
        let mut blitter = Blitter::new(&mut device).unwrap();
        let target = device.begin_frame(RenderTarget::Default, false, IPoint::new(10, 10)).unwrap();
        device.begin_render_pass(target, LoadDesc::default());
        device.take_commands();

        let mat = Material {
            color: LinearRgba::new(0.5, 0.0, 0.0, 0.5),
            ..Default::default()
        };
        blitter.blit(&mut device, &mat, Point::new(1.0, 1.0), Point::ZERO);
        let cmds = device.take_commands();
        let color = blitter.pipelines.get(MaterialType::Color).pipeline;
        assert_eq!(cmds[0], DeviceCommand::BindPipeline(color));
        assert!(matches!(cmds[1], DeviceCommand::BindVertexBuffer { offset: 0, .. }));
        assert!(matches!(cmds[2], DeviceCommand::UploadBuffer { len: 128, .. }));
        assert_eq!(cmds.last(), Some(&DeviceCommand::DrawArrays { offset: 0, count: 4 }));

        device.end_render_pass();
        device.end_frame().unwrap();
        blitter.release(&mut device);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_pipelines(), 0);
    }

    #[test]
    fn test_uv_rows() {
        let t = Affine2D::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0);
        assert_eq!(uv_rows(&t), ([1.0, 2.0, 3.0, 0.0], [4.0, 5.0, 6.0, 0.0]));
    }
}
