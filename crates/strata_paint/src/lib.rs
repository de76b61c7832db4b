//! Strata Operation Lists
//!
//! A compact, allocation-friendly encoding of drawing commands. Clients record
//! transforms, clips and paints into an [`Ops`] list; renderers walk it with a
//! [`Reader`].
//!
//! # Example
//!
//! ```
//! use strata_core::{IRect, Nrgba};
//! use strata_paint::clip::ClipRect;
//! use strata_paint::paint::fill;
//! use strata_paint::Ops;
//!
//! let mut ops = Ops::new();
//! let clip = ClipRect(IRect::new(0, 0, 100, 100)).push(&mut ops);
//! fill(&mut ops, Nrgba::new(0xff, 0, 0, 0xff));
//! clip.pop(&mut ops);
//! ```

pub mod clip;
pub mod op;
pub mod ops;
pub mod paint;
pub mod reader;
pub mod scene;

pub use clip::{ClipOp, ClipRect, ClipStack, Ellipse, Outline, PathBuilder, PathSpec, Stroke};
pub use op::{defer, CallOp, MacroOp, ProfileOp, StateOp, TransformOp, TransformStack};
pub use ops::{OpType, Ops, Ref};
pub use paint::{ColorOp, ImageHandle, ImageOp, LinearGradientOp, PaintOp};
pub use reader::{EncodedOp, Reader};
