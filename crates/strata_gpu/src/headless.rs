//! Headless recording device
//!
//! [`HeadlessDevice`] implements [`Device`] without a GPU. It hands out real
//! slotmap handles, checks that every handle is alive when used, and records
//! each call as a [`DeviceCommand`] so the command stream of a frame can be
//! inspected.

use std::time::Duration;

use slotmap::SlotMap;
use strata_core::IPoint;

use crate::driver::{
    BufferBinding, BufferId, Caps, Device, DriverError, Features, LoadDesc, PipelineDesc,
    PipelineId, RenderTarget, Result, ShaderId, TextureDesc, TextureFilter, TextureFormat,
    TextureId, TimerId,
};

/// A recorded device call
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCommand {
    BeginFrame { clear: bool, viewport: IPoint },
    EndFrame,
    NewTexture { id: TextureId, desc: TextureDesc },
    UploadTexture { id: TextureId, offset: IPoint, size: IPoint },
    NewBuffer { id: BufferId, binding: BufferBinding, size: usize },
    UploadBuffer { id: BufferId, len: usize },
    NewShader { id: ShaderId, name: String },
    NewPipeline { id: PipelineId },
    NewTimer(TimerId),
    Viewport { x: i32, y: i32, width: i32, height: i32 },
    DrawArrays { offset: usize, count: usize },
    DrawElements { offset: usize, count: usize },
    BeginRenderPass { target: TextureId, load: LoadDesc },
    EndRenderPass,
    PrepareTexture(TextureId),
    BindPipeline(PipelineId),
    BindTexture { unit: u32, id: TextureId },
    BindVertexBuffer { id: BufferId, offset: usize },
    BindIndexBuffer(BufferId),
    BindUniforms(BufferId),
    BeginTimer(TimerId),
    EndTimer(TimerId),
    ReleaseTexture(TextureId),
    ReleaseBuffer(BufferId),
    ReleaseShader(ShaderId),
    ReleasePipeline(PipelineId),
    ReleaseTimer(TimerId),
    Release,
}

#[derive(Debug)]
struct TextureInfo {
    desc: TextureDesc,
    uploads: usize,
}

#[derive(Debug)]
struct BufferInfo {
    binding: BufferBinding,
    data: Vec<u8>,
    immutable: bool,
}

#[derive(Debug)]
struct ShaderInfo {
    name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimerState {
    Idle,
    Running,
    /// Ended during the given frame, readable from the next one.
    Ended(u64),
}

/// A [`Device`] that records instead of drawing
#[derive(Debug)]
pub struct HeadlessDevice {
    caps: Caps,
    textures: SlotMap<TextureId, TextureInfo>,
    buffers: SlotMap<BufferId, BufferInfo>,
    shaders: SlotMap<ShaderId, ShaderInfo>,
    pipelines: SlotMap<PipelineId, PipelineDesc>,
    timers: SlotMap<TimerId, TimerState>,
    default_target: TextureId,
    commands: Vec<DeviceCommand>,
    frame: u64,
    in_frame: bool,
    in_pass: bool,
    device_lost: bool,
    content_lost: bool,
    timer_duration: Duration,
    failing_shaders: Vec<String>,
    released: bool,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Device with float render targets, sRGB and timers.
    pub fn new() -> Self {
        Self::with_caps(Caps {
            bottom_left_origin: false,
            features: Features::FLOAT_RENDER_TARGETS | Features::SRGB | Features::TIMERS,
            max_texture_size: 16384,
        })
    }

    pub fn with_caps(caps: Caps) -> Self {
        let mut textures = SlotMap::with_key();
        let default_target = textures.insert(TextureInfo {
            desc: TextureDesc {
                format: TextureFormat::Output,
                width: 0,
                height: 0,
                min_filter: TextureFilter::Nearest,
                mag_filter: TextureFilter::Nearest,
                bindings: BufferBinding::FRAMEBUFFER,
            },
            uploads: 0,
        });
        Self {
            caps,
            textures,
            buffers: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            timers: SlotMap::with_key(),
            default_target,
            commands: Vec::new(),
            frame: 0,
            in_frame: false,
            in_pass: false,
            device_lost: false,
            content_lost: false,
            timer_duration: Duration::from_micros(500),
            failing_shaders: Vec::new(),
            released: false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Test controls
    // ─────────────────────────────────────────────────────────────────────────

    /// Report device loss from every following frame.
    pub fn lose_device(&mut self) {
        self.device_lost = true;
    }

    /// Report content loss at the end of the next frame.
    pub fn lose_content(&mut self) {
        self.content_lost = true;
    }

    /// Duration reported by every timer.
    pub fn set_timer_duration(&mut self, duration: Duration) {
        self.timer_duration = duration;
    }

    /// Make creation of the named shader fail.
    pub fn fail_shader(&mut self, name: &str) {
        self.failing_shaders.push(name.to_string());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    /// The texture returned for [`RenderTarget::Default`].
    pub fn default_target(&self) -> TextureId {
        self.default_target
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Live textures, not counting the default target.
    pub fn live_textures(&self) -> usize {
        self.textures.len() - 1
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    pub fn live_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn texture_desc(&self, id: TextureId) -> Option<&TextureDesc> {
        self.textures.get(id).map(|t| &t.desc)
    }

    /// Number of uploads into a texture.
    pub fn texture_uploads(&self, id: TextureId) -> Option<usize> {
        self.textures.get(id).map(|t| t.uploads)
    }

    /// Last contents uploaded into a buffer.
    pub fn buffer_data(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(id).map(|b| b.data.as_slice())
    }

    pub fn buffer_binding(&self, id: BufferId) -> Option<BufferBinding> {
        self.buffers.get(id).map(|b| b.binding)
    }

    pub fn pipeline_desc(&self, id: PipelineId) -> Option<&PipelineDesc> {
        self.pipelines.get(id)
    }

    pub fn shader_name(&self, id: ShaderId) -> Option<&str> {
        self.shaders.get(id).map(|s| s.name.as_str())
    }

    /// Name of the fragment shader of a pipeline.
    pub fn pipeline_fragment_shader(&self, id: PipelineId) -> Option<&str> {
        let desc = self.pipelines.get(id)?;
        self.shader_name(desc.fragment_shader)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    fn check_alive(&self) {
        if self.released {
            panic!("headless device used after release");
        }
    }

    fn texture(&mut self, id: TextureId) -> &mut TextureInfo {
        self.textures
            .get_mut(id)
            .unwrap_or_else(|| panic!("invalid texture handle {:?}", id))
    }

    fn buffer(&mut self, id: BufferId) -> &mut BufferInfo {
        self.buffers
            .get_mut(id)
            .unwrap_or_else(|| panic!("invalid buffer handle {:?}", id))
    }

    fn check_shader(&self, id: ShaderId) {
        if !self.shaders.contains_key(id) {
            panic!("invalid shader handle {:?}", id);
        }
    }

    fn check_pipeline(&self, id: PipelineId) {
        if !self.pipelines.contains_key(id) {
            panic!("invalid pipeline handle {:?}", id);
        }
    }

    fn timer(&mut self, id: TimerId) -> &mut TimerState {
        self.timers
            .get_mut(id)
            .unwrap_or_else(|| panic!("invalid timer handle {:?}", id))
    }

    fn check_in_pass(&self, what: &str) {
        if !self.in_pass {
            panic!("{what} outside of a render pass");
        }
    }

    fn record(&mut self, cmd: DeviceCommand) {
        self.commands.push(cmd);
    }

    fn new_shader(&mut self, name: &str) -> Result<ShaderId> {
        self.check_alive();
        if self.failing_shaders.iter().any(|s| s == name) {
            return Err(DriverError::ShaderCompilation {
                name: name.to_string(),
                message: "rejected by headless device".to_string(),
            });
        }
        let id = self.shaders.insert(ShaderInfo {
            name: name.to_string(),
        });
        self.record(DeviceCommand::NewShader {
            id,
            name: name.to_string(),
        });
        Ok(id)
    }
}

impl Device for HeadlessDevice {
    fn begin_frame(
        &mut self,
        target: RenderTarget,
        clear: bool,
        viewport: IPoint,
    ) -> Result<TextureId> {
        self.check_alive();
        if self.in_frame {
            panic!("begin_frame inside a frame");
        }
        if self.device_lost {
            return Err(DriverError::DeviceLost);
        }
        let fbo = match target {
            RenderTarget::Default => {
                let id = self.default_target;
                let desc = &mut self.texture(id).desc;
                desc.width = viewport.x.max(0) as u32;
                desc.height = viewport.y.max(0) as u32;
                id
            }
            RenderTarget::Texture(id) => {
                let info = self.texture(id);
                if !info.desc.bindings.contains(BufferBinding::FRAMEBUFFER) {
                    panic!("render target {:?} is not a framebuffer", id);
                }
                id
            }
        };
        self.frame += 1;
        self.in_frame = true;
        self.record(DeviceCommand::BeginFrame { clear, viewport });
        Ok(fbo)
    }

    fn end_frame(&mut self) -> Result<()> {
        if !self.in_frame {
            panic!("end_frame without begin_frame");
        }
        if self.in_pass {
            panic!("end_frame inside a render pass");
        }
        self.in_frame = false;
        self.record(DeviceCommand::EndFrame);
        if std::mem::take(&mut self.content_lost) {
            return Err(DriverError::ContentLost);
        }
        Ok(())
    }

    fn caps(&self) -> Caps {
        self.caps
    }

    fn is_time_continuous(&self) -> bool {
        true
    }

    fn new_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        self.check_alive();
        let max = self.caps.max_texture_size;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(DriverError::ResourceCreation(format!(
                "texture size {}x{} outside 1..={}",
                desc.width, desc.height, max
            )));
        }
        let id = self.textures.insert(TextureInfo {
            desc: *desc,
            uploads: 0,
        });
        self.record(DeviceCommand::NewTexture { id, desc: *desc });
        Ok(id)
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        offset: IPoint,
        size: IPoint,
        pixels: &[u8],
        stride: usize,
    ) {
        let info = self.texture(texture);
        let (w, h) = (info.desc.width as i32, info.desc.height as i32);
        if offset.x < 0 || offset.y < 0 || offset.x + size.x > w || offset.y + size.y > h {
            panic!("texture upload {:?}+{:?} outside {}x{}", offset, size, w, h);
        }
        let rows = size.y.max(0) as usize;
        let needed = if rows == 0 {
            0
        } else {
            stride * (rows - 1) + size.x.max(0) as usize * 4
        };
        if pixels.len() < needed {
            panic!("texture upload needs {} bytes, got {}", needed, pixels.len());
        }
        info.uploads += 1;
        self.record(DeviceCommand::UploadTexture {
            id: texture,
            offset,
            size,
        });
    }

    fn new_immutable_buffer(&mut self, binding: BufferBinding, data: &[u8]) -> Result<BufferId> {
        self.check_alive();
        let id = self.buffers.insert(BufferInfo {
            binding,
            data: data.to_vec(),
            immutable: true,
        });
        self.record(DeviceCommand::NewBuffer {
            id,
            binding,
            size: data.len(),
        });
        Ok(id)
    }

    fn new_buffer(&mut self, binding: BufferBinding, size: usize) -> Result<BufferId> {
        self.check_alive();
        let id = self.buffers.insert(BufferInfo {
            binding,
            data: vec![0; size],
            immutable: false,
        });
        self.record(DeviceCommand::NewBuffer { id, binding, size });
        Ok(id)
    }

    fn upload_buffer(&mut self, buffer: BufferId, data: &[u8]) {
        let info = self.buffer(buffer);
        if info.immutable {
            panic!("upload into immutable buffer {:?}", buffer);
        }
        if data.len() > info.data.len() {
            panic!(
                "buffer upload of {} bytes into {} byte buffer",
                data.len(),
                info.data.len()
            );
        }
        info.data[..data.len()].copy_from_slice(data);
        self.record(DeviceCommand::UploadBuffer {
            id: buffer,
            len: data.len(),
        });
    }

    fn new_vertex_shader(&mut self, name: &str) -> Result<ShaderId> {
        self.new_shader(name)
    }

    fn new_fragment_shader(&mut self, name: &str) -> Result<ShaderId> {
        self.new_shader(name)
    }

    fn new_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId> {
        self.check_alive();
        self.check_shader(desc.vertex_shader);
        self.check_shader(desc.fragment_shader);
        if desc.vertex_layout.stride == 0 {
            return Err(DriverError::PipelineCreation("zero vertex stride".into()));
        }
        let id = self.pipelines.insert(desc.clone());
        self.record(DeviceCommand::NewPipeline { id });
        Ok(id)
    }

    fn new_timer(&mut self) -> Result<TimerId> {
        self.check_alive();
        if !self.caps.features.contains(Features::TIMERS) {
            return Err(DriverError::Unsupported("timers".into()));
        }
        let id = self.timers.insert(TimerState::Idle);
        self.record(DeviceCommand::NewTimer(id));
        Ok(id)
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.record(DeviceCommand::Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn draw_arrays(&mut self, offset: usize, count: usize) {
        self.check_in_pass("draw_arrays");
        self.record(DeviceCommand::DrawArrays { offset, count });
    }

    fn draw_elements(&mut self, offset: usize, count: usize) {
        self.check_in_pass("draw_elements");
        self.record(DeviceCommand::DrawElements { offset, count });
    }

    fn begin_render_pass(&mut self, target: TextureId, load: LoadDesc) {
        if !self.in_frame {
            panic!("render pass outside of a frame");
        }
        if self.in_pass {
            panic!("nested render pass");
        }
        self.texture(target);
        self.in_pass = true;
        self.record(DeviceCommand::BeginRenderPass { target, load });
    }

    fn end_render_pass(&mut self) {
        self.check_in_pass("end_render_pass");
        self.in_pass = false;
        self.record(DeviceCommand::EndRenderPass);
    }

    fn prepare_texture(&mut self, texture: TextureId) {
        if self.in_pass {
            panic!("prepare_texture inside a render pass");
        }
        self.texture(texture);
        self.record(DeviceCommand::PrepareTexture(texture));
    }

    fn bind_pipeline(&mut self, pipeline: PipelineId) {
        self.check_pipeline(pipeline);
        self.record(DeviceCommand::BindPipeline(pipeline));
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        self.texture(texture);
        self.record(DeviceCommand::BindTexture { unit, id: texture });
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferId, offset: usize) {
        let info = self.buffer(buffer);
        if !info.binding.contains(BufferBinding::VERTICES) {
            panic!("buffer {:?} is not a vertex buffer", buffer);
        }
        if offset > info.data.len() {
            panic!("vertex offset {} past end of buffer {:?}", offset, buffer);
        }
        self.record(DeviceCommand::BindVertexBuffer { id: buffer, offset });
    }

    fn bind_index_buffer(&mut self, buffer: BufferId) {
        if !self.buffer(buffer).binding.contains(BufferBinding::INDICES) {
            panic!("buffer {:?} is not an index buffer", buffer);
        }
        self.record(DeviceCommand::BindIndexBuffer(buffer));
    }

    fn bind_uniforms(&mut self, buffer: BufferId) {
        if !self.buffer(buffer).binding.contains(BufferBinding::UNIFORMS) {
            panic!("buffer {:?} is not a uniform buffer", buffer);
        }
        self.record(DeviceCommand::BindUniforms(buffer));
    }

    fn begin_timer(&mut self, timer: TimerId) {
        let state = self.timer(timer);
        *state = TimerState::Running;
        self.record(DeviceCommand::BeginTimer(timer));
    }

    fn end_timer(&mut self, timer: TimerId) {
        let frame = self.frame;
        let state = self.timer(timer);
        if *state != TimerState::Running {
            panic!("end_timer on a timer that is not running");
        }
        *state = TimerState::Ended(frame);
        self.record(DeviceCommand::EndTimer(timer));
    }

    fn timer_duration(&mut self, timer: TimerId) -> Option<Duration> {
        let (frame, duration) = (self.frame, self.timer_duration);
        match *self.timer(timer) {
            TimerState::Ended(ended) if frame > ended => Some(duration),
            _ => None,
        }
    }

    fn release_texture(&mut self, texture: TextureId) {
        if texture == self.default_target {
            panic!("release of the default render target");
        }
        if self.textures.remove(texture).is_none() {
            panic!("release of invalid texture {:?}", texture);
        }
        self.record(DeviceCommand::ReleaseTexture(texture));
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(buffer).is_none() {
            panic!("release of invalid buffer {:?}", buffer);
        }
        self.record(DeviceCommand::ReleaseBuffer(buffer));
    }

    fn release_shader(&mut self, shader: ShaderId) {
        if self.shaders.remove(shader).is_none() {
            panic!("release of invalid shader {:?}", shader);
        }
        self.record(DeviceCommand::ReleaseShader(shader));
    }

    fn release_pipeline(&mut self, pipeline: PipelineId) {
        if self.pipelines.remove(pipeline).is_none() {
            panic!("release of invalid pipeline {:?}", pipeline);
        }
        self.record(DeviceCommand::ReleasePipeline(pipeline));
    }

    fn release_timer(&mut self, timer: TimerId) {
        if self.timers.remove(timer).is_none() {
            panic!("release of invalid timer {:?}", timer);
        }
        self.record(DeviceCommand::ReleaseTimer(timer));
    }

    fn release(&mut self) {
        self.check_alive();
        self.released = true;
        self.record(DeviceCommand::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{LoadAction, TextureFilter};

    fn float_texture(d: &mut HeadlessDevice) -> TextureId {
        d.new_texture(&TextureDesc {
            format: TextureFormat::Float,
            width: 16,
            height: 16,
            min_filter: TextureFilter::Nearest,
            mag_filter: TextureFilter::Nearest,
            bindings: BufferBinding::TEXTURE | BufferBinding::FRAMEBUFFER,
        })
        .unwrap()
    }

    #[test]
    fn test_records_frame() {
        let mut d = HeadlessDevice::new();
        let tex = float_texture(&mut d);
        let fbo = d
            .begin_frame(RenderTarget::Default, true, IPoint::new(10, 20))
            .unwrap();
        assert_eq!(fbo, d.default_target());
        d.begin_render_pass(tex, LoadDesc::default());
        d.draw_arrays(0, 4);
        d.end_render_pass();
        d.end_frame().unwrap();

        let cmds = d.take_commands();
        assert!(matches!(cmds[0], DeviceCommand::NewTexture { .. }));
        assert_eq!(
            cmds[1],
            DeviceCommand::BeginFrame {
                clear: true,
                viewport: IPoint::new(10, 20)
            }
        );
        assert_eq!(
            cmds[2],
            DeviceCommand::BeginRenderPass {
                target: tex,
                load: LoadDesc {
                    action: LoadAction::Keep,
                    ..Default::default()
                }
            }
        );
        assert_eq!(cmds.last(), Some(&DeviceCommand::EndFrame));
        assert!(d.commands().is_empty());
    }

    #[test]
    #[should_panic(expected = "invalid texture handle")]
    fn test_released_handle_panics() {
        let mut d = HeadlessDevice::new();
        let tex = float_texture(&mut d);
        d.release_texture(tex);
        d.bind_texture(0, tex);
    }

    #[test]
    #[should_panic(expected = "outside of a render pass")]
    fn test_draw_outside_pass_panics() {
        let mut d = HeadlessDevice::new();
        d.draw_arrays(0, 4);
    }

    #[test]
    fn test_device_loss() {
        let mut d = HeadlessDevice::new();
        d.lose_device();
        let err = d
            .begin_frame(RenderTarget::Default, false, IPoint::new(1, 1))
            .unwrap_err();
        assert_eq!(err, DriverError::DeviceLost);

        let mut d = HeadlessDevice::new();
        d.lose_content();
        d.begin_frame(RenderTarget::Default, false, IPoint::new(1, 1))
            .unwrap();
        assert_eq!(d.end_frame(), Err(DriverError::ContentLost));
        d.begin_frame(RenderTarget::Default, false, IPoint::new(1, 1))
            .unwrap();
        assert_eq!(d.end_frame(), Ok(()));
    }

    #[test]
    fn test_timer_resolves_next_frame() {
        let mut d = HeadlessDevice::new();
        d.set_timer_duration(Duration::from_millis(2));
        let t = d.new_timer().unwrap();
        d.begin_frame(RenderTarget::Default, false, IPoint::new(1, 1))
            .unwrap();
        d.begin_timer(t);
        d.end_timer(t);
        assert_eq!(d.timer_duration(t), None);
        d.end_frame().unwrap();
        d.begin_frame(RenderTarget::Default, false, IPoint::new(1, 1))
            .unwrap();
        assert_eq!(d.timer_duration(t), Some(Duration::from_millis(2)));
    }

    #[test]
    fn test_failing_shader() {
        let mut d = HeadlessDevice::new();
        d.fail_shader("stencil.frag");
        assert!(d.new_vertex_shader("stencil.vert").is_ok());
        assert!(matches!(
            d.new_fragment_shader("stencil.frag"),
            Err(DriverError::ShaderCompilation { .. })
        ));
        assert_eq!(d.live_shaders(), 1);
    }
}
