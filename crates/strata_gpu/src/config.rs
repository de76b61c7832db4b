//! Renderer configuration

use crate::driver::Caps;

/// Atlas pages larger than this lose precision in the coverage shaders.
pub const MAX_ATLAS_DIM: u32 = 8192;

/// Default number of path quads per stencil draw.
pub const DEFAULT_PATH_BATCH: usize = 10_000;

/// Largest batch whose vertex indices fit 16 bits (4 vertices per quad).
pub const MAX_PATH_BATCH: usize = 16_383;

/// Configuration for creating a [`Gpu`](crate::Gpu)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RendererConfig {
    /// Select the compute renderer even if the device supports this one
    pub force_compute: bool,
    /// Upper bound for stencil and intersection atlas pages
    pub max_atlas_dim: u32,
    /// Path quads per stencil draw call
    pub path_batch: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            force_compute: false,
            max_atlas_dim: MAX_ATLAS_DIM,
            path_batch: DEFAULT_PATH_BATCH,
        }
    }
}

impl RendererConfig {
    /// Apply overrides from the process environment.
    ///
    /// Env:
    /// - STRATA_FORCE_COMPUTE=1
    /// - STRATA_MAX_ATLAS_DIM=4096
    /// - STRATA_PATH_BATCH=2000
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    pub(crate) fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |name: &str| var(name).and_then(|v| v.trim().parse::<usize>().ok());
        if var("STRATA_FORCE_COMPUTE").is_some() {
            self.force_compute = true;
        }
        if let Some(v) = parse("STRATA_MAX_ATLAS_DIM") {
            self.max_atlas_dim = v.min(MAX_ATLAS_DIM as usize) as u32;
        }
        if let Some(v) = parse("STRATA_PATH_BATCH") {
            self.path_batch = v;
        }
        self
    }

    /// Clamp to what the device and the index format allow.
    pub(crate) fn clamped(mut self, caps: &Caps) -> Self {
        self.max_atlas_dim = self
            .max_atlas_dim
            .min(caps.max_texture_size)
            .clamp(1, MAX_ATLAS_DIM);
        self.path_batch = self.path_batch.clamp(1, MAX_PATH_BATCH);
        self
    }
}

pub(crate) fn log_renderer_config(config: &RendererConfig, caps: &Caps) {
    tracing::info!(
        "gpu config: renderer=stencil, max_atlas_dim={}, path_batch={}, features={:?}, max_texture_size={}",
        config.max_atlas_dim,
        config.path_batch,
        caps.features,
        caps.max_texture_size
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Features;

    fn caps(max_texture_size: u32) -> Caps {
        Caps {
            bottom_left_origin: false,
            features: Features::FLOAT_RENDER_TARGETS | Features::SRGB,
            max_texture_size,
        }
    }

    #[test]
    fn test_overrides() {
        let config = RendererConfig::default().with_overrides(|name| match name {
            "STRATA_FORCE_COMPUTE" => Some(String::new()),
            "STRATA_MAX_ATLAS_DIM" => Some(" 1024 ".into()),
            "STRATA_PATH_BATCH" => Some("not a number".into()),
            _ => None,
        });
        assert!(config.force_compute);
        assert_eq!(config.max_atlas_dim, 1024);
        assert_eq!(config.path_batch, DEFAULT_PATH_BATCH);
    }

    #[test]
    fn test_clamping() {
        let config = RendererConfig::default()
            .with_overrides(|name| match name {
                "STRATA_MAX_ATLAS_DIM" => Some("100000".into()),
                "STRATA_PATH_BATCH" => Some("70000".into()),
                _ => None,
            })
            .clamped(&caps(16384));
        assert_eq!(config.max_atlas_dim, MAX_ATLAS_DIM);
        assert_eq!(config.path_batch, MAX_PATH_BATCH);

        let small = RendererConfig::default().clamped(&caps(2048));
        assert_eq!(small.max_atlas_dim, 2048);

        let zero = RendererConfig {
            path_batch: 0,
            ..Default::default()
        }
        .clamped(&caps(2048));
        assert_eq!(zero.path_batch, 1);
    }
}
