//! Shader program names
//!
//! Programs are referenced by name; device backends map each name to their
//! compiled vertex or fragment program. Fragment variants are indexed by
//! [`MaterialType`](crate::material::MaterialType).

/// Full-screen quad blit, no coverage lookup
pub const BLIT_VERT: &str = "blit.vert";
pub const BLIT_FRAG: [&str; 3] = [
    "blit.frag.color",
    "blit.frag.linear_gradient",
    "blit.frag.texture",
];

/// Quad blit modulated by a coverage texture
pub const COVER_VERT: &str = "cover.vert";
pub const COVER_FRAG: [&str; 3] = [
    "cover.frag.color",
    "cover.frag.linear_gradient",
    "cover.frag.texture",
];

/// Analytic coverage of quadratic curves, accumulated additively
pub const STENCIL_VERT: &str = "stencil.vert";
pub const STENCIL_FRAG: &str = "stencil.frag";

/// Multiplies coverage of one clip path into an intersection slot
pub const INTERSECT_VERT: &str = "intersect.vert";
pub const INTERSECT_FRAG: &str = "intersect.frag";
