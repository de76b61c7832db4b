//! Device abstraction
//!
//! The renderer talks to the GPU only through [`Device`]. Backends own the
//! actual API objects and hand out copyable handles; every handle is released
//! explicitly through the matching `release_*` method.

use std::time::Duration;

use bitflags::bitflags;
use slotmap::new_key_type;
use strata_core::{IPoint, LinearRgba};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Handles
// ─────────────────────────────────────────────────────────────────────────────

new_key_type! {
    /// Handle to a device texture
    pub struct TextureId;
    /// Handle to a device buffer
    pub struct BufferId;
    /// Handle to a vertex or fragment shader
    pub struct ShaderId;
    /// Handle to a render pipeline
    pub struct PipelineId;
    /// Handle to a GPU timer query
    pub struct TimerId;
}

// ─────────────────────────────────────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────────────────────────────────────

bitflags! {
    /// Optional device features
    pub struct Features: u32 {
        /// GPU timer queries.
        const TIMERS = 0x1;
        /// Single channel float textures can be render targets.
        const FLOAT_RENDER_TARGETS = 0x2;
        /// Compute programs.
        const COMPUTE = 0x4;
        /// sRGB textures and framebuffers.
        const SRGB = 0x8;
    }
}

bitflags! {
    /// The intended usage of a buffer or texture, specified on creation.
    pub struct BufferBinding: u32 {
        const INDICES = 0x1;
        const VERTICES = 0x2;
        const UNIFORMS = 0x4;
        const TEXTURE = 0x8;
        const FRAMEBUFFER = 0x10;
    }
}

/// Device capabilities
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caps {
    /// Framebuffer rows are stored bottom to top.
    pub bottom_left_origin: bool,
    pub features: Features,
    /// Largest supported texture dimension.
    pub max_texture_size: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Descriptors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit sRGB encoded RGBA with premultiplied alpha.
    Srgba,
    /// Single channel 16 or 32 bit float.
    Float,
    Rgba8,
    /// The format of the frame target.
    Output,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub bindings: BufferBinding,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    One,
    OneMinusSrcAlpha,
    Zero,
    DstColor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlendDesc {
    pub enable: bool,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
}

impl BlendDesc {
    /// Blending disabled.
    pub const NONE: BlendDesc = BlendDesc {
        enable: false,
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
    };

    pub const fn new(src_factor: BlendFactor, dst_factor: BlendFactor) -> Self {
        Self {
            enable: true,
            src_factor,
            dst_factor,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    TriangleStrip,
    Triangles,
}

/// Vertex attribute component type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Float,
}

/// A single vertex attribute: `size` components of `data_type` at `offset`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputDesc {
    pub data_type: DataType,
    pub size: usize,
    pub offset: usize,
}

impl InputDesc {
    pub const fn float(size: usize, offset: usize) -> Self {
        Self {
            data_type: DataType::Float,
            size,
            offset,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexLayout {
    pub inputs: Vec<InputDesc>,
    pub stride: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineDesc {
    pub vertex_shader: ShaderId,
    pub fragment_shader: ShaderId,
    pub vertex_layout: VertexLayout,
    pub blend: BlendDesc,
    pub pixel_format: TextureFormat,
    pub topology: Topology,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadAction {
    #[default]
    Keep,
    Clear,
    Invalidate,
}

/// How a render pass treats the existing contents of its target
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LoadDesc {
    pub action: LoadAction,
    pub clear_color: LinearRgba,
}

impl LoadDesc {
    pub fn clear(clear_color: LinearRgba) -> Self {
        Self {
            action: LoadAction::Clear,
            clear_color,
        }
    }
}

/// Where a frame is drawn
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderTarget {
    /// The device's default framebuffer, such as a window surface.
    #[default]
    Default,
    /// An offscreen texture created with [`BufferBinding::FRAMEBUFFER`].
    Texture(TextureId),
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Device errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The device was lost and must be recreated
    #[error("GPU device lost")]
    DeviceLost,

    /// The frame target lost its contents
    #[error("buffer content lost")]
    ContentLost,

    /// A shader failed to compile or is unknown to the backend
    #[error("shader {name} failed to compile: {message}")]
    ShaderCompilation { name: String, message: String },

    #[error("pipeline creation failed: {0}")]
    PipelineCreation(String),

    #[error("resource creation failed: {0}")]
    ResourceCreation(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DriverError>;

// ─────────────────────────────────────────────────────────────────────────────
// Device
// ─────────────────────────────────────────────────────────────────────────────

/// A GPU device
///
/// Methods that only record commands cannot fail; failures surface from the
/// next call that returns a [`Result`], at the latest from
/// [`end_frame`](Device::end_frame).
pub trait Device {
    /// Start a frame and return the texture to draw into.
    fn begin_frame(&mut self, target: RenderTarget, clear: bool, viewport: IPoint)
        -> Result<TextureId>;
    fn end_frame(&mut self) -> Result<()>;

    fn caps(&self) -> Caps;
    /// Whether timer results are meaningful, i.e. no disjoint event such
    /// as a clock change happened since the timers were started.
    fn is_time_continuous(&self) -> bool;

    fn new_texture(&mut self, desc: &TextureDesc) -> Result<TextureId>;
    /// Upload `size` pixels of RGBA data at `offset`; `stride` is the length of
    /// a row in bytes.
    fn upload_texture(
        &mut self,
        texture: TextureId,
        offset: IPoint,
        size: IPoint,
        pixels: &[u8],
        stride: usize,
    );
    fn new_immutable_buffer(&mut self, binding: BufferBinding, data: &[u8]) -> Result<BufferId>;
    fn new_buffer(&mut self, binding: BufferBinding, size: usize) -> Result<BufferId>;
    fn upload_buffer(&mut self, buffer: BufferId, data: &[u8]);
    fn new_vertex_shader(&mut self, name: &str) -> Result<ShaderId>;
    fn new_fragment_shader(&mut self, name: &str) -> Result<ShaderId>;
    fn new_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId>;
    fn new_timer(&mut self) -> Result<TimerId>;

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn draw_arrays(&mut self, offset: usize, count: usize);
    fn draw_elements(&mut self, offset: usize, count: usize);

    fn begin_render_pass(&mut self, target: TextureId, load: LoadDesc);
    fn end_render_pass(&mut self);
    /// Make a texture ready for sampling outside a render pass.
    fn prepare_texture(&mut self, texture: TextureId);
    fn bind_pipeline(&mut self, pipeline: PipelineId);
    fn bind_texture(&mut self, unit: u32, texture: TextureId);
    fn bind_vertex_buffer(&mut self, buffer: BufferId, offset: usize);
    fn bind_index_buffer(&mut self, buffer: BufferId);
    fn bind_uniforms(&mut self, buffer: BufferId);

    fn begin_timer(&mut self, timer: TimerId);
    fn end_timer(&mut self, timer: TimerId);
    /// The measured duration, once available. Never blocks.
    fn timer_duration(&mut self, timer: TimerId) -> Option<Duration>;

    fn release_texture(&mut self, texture: TextureId);
    fn release_buffer(&mut self, buffer: BufferId);
    fn release_shader(&mut self, shader: ShaderId);
    fn release_pipeline(&mut self, pipeline: PipelineId);
    fn release_timer(&mut self, timer: TimerId);

    /// Release the device itself. No other method may be called afterwards.
    fn release(&mut self);
}
