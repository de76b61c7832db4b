//! Pipelines and their uniform buffers
//!
//! Every pipeline owns at most one uniform buffer sized for its uniform
//! block. The blit and cover programs come in one variant per
//! [`MaterialType`], sharing a vertex shader and the quad vertex layout.

use smallvec::SmallVec;

use crate::driver::{
    BlendDesc, BlendFactor, BufferBinding, BufferId, Device, InputDesc, PipelineDesc, PipelineId,
    Result, ShaderId, TextureFormat, Topology, VertexLayout,
};
use crate::material::MaterialType;

/// A pipeline with its uniform buffer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pipeline {
    pub pipeline: PipelineId,
    uniforms: Option<BufferId>,
}

impl Pipeline {
    /// Create the pipeline and, for a non-zero `uniform_size`, its uniform
    /// buffer.
    pub fn new(device: &mut dyn Device, desc: &PipelineDesc, uniform_size: usize) -> Result<Self> {
        let pipeline = device.new_pipeline(desc)?;
        let uniforms = if uniform_size > 0 {
            match device.new_buffer(BufferBinding::UNIFORMS, uniform_size) {
                Ok(buffer) => Some(buffer),
                Err(err) => {
                    device.release_pipeline(pipeline);
                    return Err(err);
                }
            }
        } else {
            None
        };
        Ok(Self { pipeline, uniforms })
    }

    /// Upload a uniform block and bind the buffer.
    pub fn upload_uniforms(&self, device: &mut dyn Device, data: &[u8]) {
        if let Some(buffer) = self.uniforms {
            device.upload_buffer(buffer, data);
            device.bind_uniforms(buffer);
        }
    }

    pub fn release(self, device: &mut dyn Device) {
        device.release_pipeline(self.pipeline);
        if let Some(buffer) = self.uniforms {
            device.release_buffer(buffer);
        }
    }
}

/// Objects of a half built renderer component, released together when a
/// later step fails
#[derive(Default)]
pub(crate) struct Pending {
    pub shaders: SmallVec<[ShaderId; 4]>,
    pub pipelines: SmallVec<[Pipeline; 4]>,
    pub buffers: SmallVec<[BufferId; 2]>,
}

impl Pending {
    pub fn release(self, device: &mut dyn Device) {
        for p in self.pipelines {
            p.release(device);
        }
        for s in self.shaders {
            device.release_shader(s);
        }
        for b in self.buffers {
            device.release_buffer(b);
        }
    }
}

/// Run a constructor, releasing everything it registered in [`Pending`] when
/// it fails.
pub(crate) fn build_or_release<T>(
    device: &mut dyn Device,
    build: impl FnOnce(&mut dyn Device, &mut Pending) -> Result<T>,
) -> Result<T> {
    let mut pending = Pending::default();
    match build(device, &mut pending) {
        Ok(v) => Ok(v),
        Err(err) => {
            tracing::debug!("releasing partially created gpu objects: {}", err);
            pending.release(device);
            Err(err)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Color programs
// ─────────────────────────────────────────────────────────────────────────────

/// Position and texture coordinate per quad corner.
pub fn quad_layout() -> VertexLayout {
    VertexLayout {
        inputs: vec![InputDesc::float(2, 0), InputDesc::float(2, 4 * 2)],
        stride: 4 * 4,
    }
}

/// One pipeline per material sharing a vertex shader
#[derive(Debug)]
pub struct ColorPipelines {
    /// Indexed by [`MaterialType::index`].
    pub pipelines: [Pipeline; 3],
    shaders: SmallVec<[ShaderId; 4]>,
}

impl ColorPipelines {
    pub fn get(&self, material: MaterialType) -> &Pipeline {
        &self.pipelines[material.index()]
    }

    pub fn release(self, device: &mut dyn Device) {
        for p in self.pipelines {
            p.release(device);
        }
        for s in self.shaders {
            device.release_shader(s);
        }
    }
}

/// Create the color, gradient and texture variants of a program, drawing
/// premultiplied output over the target.
pub fn create_color_pipelines(
    device: &mut dyn Device,
    vert: &str,
    frags: [&str; 3],
    uniform_sizes: [usize; 3],
) -> Result<ColorPipelines> {
    build_or_release(device, |device, pending| {
        let vsh = device.new_vertex_shader(vert)?;
        pending.shaders.push(vsh);

        let mut pipelines = [Pipeline::default(); 3];
        for mat in [MaterialType::Texture, MaterialType::Color, MaterialType::LinearGradient] {
            let fsh = device.new_fragment_shader(frags[mat.index()])?;
            pending.shaders.push(fsh);
            let desc = PipelineDesc {
                vertex_shader: vsh,
                fragment_shader: fsh,
                vertex_layout: quad_layout(),
                blend: BlendDesc::new(BlendFactor::One, BlendFactor::OneMinusSrcAlpha),
                pixel_format: TextureFormat::Output,
                topology: Topology::TriangleStrip,
            };
            let p = Pipeline::new(device, &desc, uniform_sizes[mat.index()])?;
            pending.pipelines.push(p);
            pipelines[mat.index()] = p;
        }

        let shaders = std::mem::take(&mut pending.shaders);
        pending.pipelines.clear();
        Ok(ColorPipelines { pipelines, shaders })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use crate::shaders::{BLIT_FRAG, BLIT_VERT};

    #[test]
    fn test_color_pipelines_per_material() {
        let mut device = HeadlessDevice::new();
        let p = create_color_pipelines(&mut device, BLIT_VERT, BLIT_FRAG, [16, 32, 0]).unwrap();
        for mat in MaterialType::ALL {
            let id = p.get(mat).pipeline;
            assert_eq!(device.pipeline_fragment_shader(id), Some(BLIT_FRAG[mat.index()]));
            let desc = device.pipeline_desc(id).unwrap();
            assert_eq!(desc.topology, Topology::TriangleStrip);
            assert_eq!(desc.vertex_layout.stride, 16);
        }
        // No uniform buffer for the texture variant.
        assert_eq!(device.live_buffers(), 2);
        assert_eq!(device.live_shaders(), 4);

        p.release(&mut device);
        assert_eq!(device.live_pipelines(), 0);
        assert_eq!(device.live_shaders(), 0);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_failed_creation_releases_partial_objects() {
        let mut device = HeadlessDevice::new();
        device.fail_shader(BLIT_FRAG[MaterialType::LinearGradient.index()]);
        let err = create_color_pipelines(&mut device, BLIT_VERT, BLIT_FRAG, [16, 16, 16]).unwrap_err();
        assert!(matches!(err, crate::driver::DriverError::ShaderCompilation { .. }));
        assert_eq!(device.live_pipelines(), 0);
        assert_eq!(device.live_shaders(), 0);
        assert_eq!(device.live_buffers(), 0);
    }
}
