//! Strata GPU Renderer
//!
//! Stencil-and-cover path rendering over an abstract [`Device`].
//!
//! Clip paths are split into quadratic segments and their coverage is
//! accumulated into float atlas pages. Paints are then drawn as quads,
//! modulated by the coverage of their clip. Pixel-aligned rectangle clips
//! skip the atlas entirely.
//!
//! - [`gpu`]: the frame driver, [`Gpu`]
//! - [`collect`]: op-list walk into paints and the clip tree
//! - [`renderer`]: atlas packing, stenciling, intersection and drawing
//! - [`driver`]: the device trait and handles; [`headless`] records commands
//!   without a GPU
//!
//! # Example
//!
//! ```
//! use strata_core::{IPoint, IRect, Nrgba};
//! use strata_gpu::{Gpu, HeadlessDevice, RenderTarget, RendererConfig};
//! use strata_paint::clip::ClipRect;
//! use strata_paint::paint::fill;
//! use strata_paint::Ops;
//!
//! let mut gpu = Gpu::new(HeadlessDevice::new(), RendererConfig::default()).unwrap();
//! let mut ops = Ops::new();
//! let clip = ClipRect(IRect::new(10, 10, 50, 50)).push(&mut ops);
//! fill(&mut ops, Nrgba::new(0xff, 0, 0, 0xff));
//! clip.pop(&mut ops);
//! gpu.frame(&ops, RenderTarget::Default, IPoint::new(100, 100)).unwrap();
//! ```

pub mod blitter;
pub mod cache;
pub mod collect;
pub mod config;
pub mod driver;
pub mod error;
pub mod gpu;
pub mod headless;
pub mod material;
pub mod pack;
pub mod path;
pub mod pather;
pub mod pipeline;
pub mod renderer;
pub mod shaders;
pub mod stroke;
pub mod timer;

pub use config::RendererConfig;
pub use driver::{Caps, Device, DriverError, Features, RenderTarget};
pub use error::{GpuError, Result};
pub use gpu::Gpu;
pub use headless::{DeviceCommand, HeadlessDevice};
