//! Frame driver
//!
//! [`Gpu`] owns a device and everything the renderer keeps across frames:
//! pipelines, coverage pages, the path and texture caches and the frame
//! timers. Each call to [`Gpu::frame`] turns an operation list into one
//! frame of device commands.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use strata_core::{IPoint, LinearRgba, Nrgba};
use strata_paint::Ops;

use crate::collect::DrawOps;
use crate::config::{log_renderer_config, RendererConfig};
use crate::driver::{Device, Features, LoadDesc, RenderTarget, TextureId};
use crate::error::{GpuError, Result};
use crate::renderer::{Renderer, TextureCache};
use crate::timer::Timers;

/// Granularity of the profile durations.
const PROFILE_QUANTUM: Duration = Duration::from_micros(100);

pub struct Gpu<D: Device> {
    device: D,
    config: RendererConfig,
    renderer: Renderer,
    draw_ops: DrawOps,
    cache: TextureCache,
    timers: Option<Timers>,
    frame_start: Instant,
    profile: String,
}

impl<D: Device> Gpu<D> {
    /// Create the renderer for `device`.
    ///
    /// Returns [`GpuError::ComputeRequired`] when the device cannot render
    /// float coverage or sRGB textures, or when the configuration asks for
    /// the compute renderer.
    pub fn new(mut device: D, config: RendererConfig) -> Result<Self> {
        let caps = device.caps();
        let config = config.with_env_overrides().clamped(&caps);
        let required = Features::FLOAT_RENDER_TARGETS | Features::SRGB;
        if config.force_compute || !caps.features.contains(required) {
            tracing::info!(
                "stencil renderer unavailable: force_compute={}, features={:?}",
                config.force_compute,
                caps.features
            );
            return Err(GpuError::ComputeRequired);
        }
        log_renderer_config(&config, &caps);

        // Some drivers only create objects inside a frame.
        device.begin_frame(RenderTarget::Default, false, IPoint::ZERO)?;
        let renderer = Renderer::new(&mut device, &config);
        let end = device.end_frame();
        let renderer = match (renderer, end) {
            (Ok(r), Ok(())) => r,
            (Ok(r), Err(err)) => {
                r.release(&mut device);
                return Err(err.into());
            }
            (Err(err), _) => return Err(err.into()),
        };

        Ok(Self {
            device,
            config,
            renderer,
            draw_ops: DrawOps::new(),
            cache: TextureCache::new(),
            timers: None,
            frame_start: Instant::now(),
            profile: String::new(),
        })
    }

    /// The effective configuration after environment overrides and
    /// clamping.
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Clear the target with `color` at the start of the next frame.
    pub fn clear(&mut self, color: Nrgba) {
        self.draw_ops.clear = true;
        self.draw_ops.clear_color = LinearRgba::from_srgb(color);
    }

    /// Draw `ops` to `target`.
    ///
    /// Device loss is returned as [`GpuError::DeviceLost`]; the renderer
    /// must then be released and recreated. [`GpuError::ContentLost`] means
    /// the frame should be drawn again.
    pub fn frame(&mut self, ops: &Ops, target: RenderTarget, viewport: IPoint) -> Result<()> {
        self.collect(ops, viewport)?;
        self.draw(target)
    }

    /// The timings of the last profiled frame, empty until the first GPU
    /// timer results arrive.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Release every GPU object and the device itself, returning the device.
    pub fn release(mut self) -> D {
        self.renderer.release(&mut self.device);
        self.draw_ops.path_cache.release(&mut self.device);
        self.cache.release(&mut self.device);
        if let Some(timers) = self.timers.take() {
            timers.release(&mut self.device);
        }
        self.device.release();
        self.device
    }

    fn collect(&mut self, ops: &Ops, viewport: IPoint) -> Result<()> {
        self.renderer.set_viewport(viewport);
        self.draw_ops.reset(viewport);
        self.draw_ops.collect(ops, viewport);
        if self.draw_ops.profile {
            if self.timers.is_none() && self.device.caps().features.contains(Features::TIMERS) {
                self.timers = Some(Timers::new(&mut self.device)?);
            }
            self.frame_start = Instant::now();
        }
        Ok(())
    }

    fn draw(&mut self, target: RenderTarget) -> Result<()> {
        let viewport = self.renderer.blitter.viewport;
        let fbo = self.device.begin_frame(target, self.draw_ops.clear, viewport)?;
        let res = self.render(fbo, viewport);
        let end = self.device.end_frame();
        res?;
        end?;

        tracing::debug!(
            "frame: image_ops={}, path_ops={}, stencil_pages={}, intersection_pages={}",
            self.draw_ops.image_ops.len(),
            self.draw_ops.path_ops.len(),
            self.renderer.packer.sizes().len(),
            self.renderer.intersections.sizes().len()
        );
        if self.draw_ops.profile {
            self.update_profile();
        }
        Ok(())
    }

    fn render(&mut self, fbo: TextureId, viewport: IPoint) -> Result<()> {
        let device: &mut dyn Device = &mut self.device;
        let ops = &mut self.draw_ops;
        let r = &mut self.renderer;

        ops.build_paths(device)?;
        ops.expand_paths();

        if let Some(t) = &mut self.timers {
            t.stencil.begin(device);
        }
        r.pack_stencils(&mut ops.nodes, &mut ops.path_ops);
        r.stencil_clips(device, &mut ops.path_cache, &ops.nodes, &ops.path_ops)?;
        r.pack_intersections(&ops.nodes, &mut ops.image_ops);
        r.prepare_intersections(device, &ops.nodes, &ops.image_ops);
        r.intersect(device, &ops.nodes, &ops.image_ops)?;
        if let Some(t) = &mut self.timers {
            t.stencil.end(device);
            t.cover.begin(device);
        }

        Renderer::upload_images(device, &mut self.cache, &ops.image_ops)?;
        r.prepare_draw_ops(device, &mut self.cache, &ops.image_ops)?;
        let load = if std::mem::take(&mut ops.clear) {
            LoadDesc::clear(ops.clear_color)
        } else {
            LoadDesc::default()
        };
        device.begin_render_pass(fbo, load);
        device.viewport(0, 0, viewport.x, viewport.y);
        let drawn = r.draw_ops(device, &mut self.cache, &ops.image_ops);
        if let Some(t) = &mut self.timers {
            t.cover.end(device);
        }
        device.end_render_pass();
        drawn?;

        if let Some(t) = &mut self.timers {
            t.cleanup.begin(device);
        }
        self.cache.frame(device);
        ops.path_cache.frame(device);
        if let Some(t) = &mut self.timers {
            t.cleanup.end(device);
        }
        Ok(())
    }

    fn update_profile(&mut self) {
        let Some(t) = &mut self.timers else {
            return;
        };
        if !t.ready(&mut self.device) {
            return;
        }
        let (st, cov, cleanup) = (t.stencil.elapsed, t.cover.elapsed, t.cleanup.elapsed);
        let q = PROFILE_QUANTUM;
        let frame = round_duration(self.frame_start.elapsed(), q);
        let gpu = round_duration(st + cov + cleanup, q);
        self.profile = format!(
            "draw:{:>7} gpu:{:>7} st:{:>7} cov:{:>7}",
            fmt_duration(frame),
            fmt_duration(gpu),
            fmt_duration(round_duration(st, q)),
            fmt_duration(round_duration(cov, q)),
        );
    }
}

/// Round to the nearest multiple of `q`, halfway values away from zero.
fn round_duration(d: Duration, q: Duration) -> Duration {
    let q = q.as_nanos();
    let n = (d.as_nanos() + q / 2) / q * q;
    Duration::from_nanos(n as u64)
}

/// Format a duration with the largest unit below it, such as `1.2ms` or
/// `300µs`.
fn fmt_duration(d: Duration) -> String {
    let n = d.as_nanos();
    let (unit, suffix) = match n {
        0 => return "0s".to_owned(),
        n if n < 1_000 => (1, "ns"),
        n if n < 1_000_000 => (1_000, "µs"),
        n if n < 1_000_000_000 => (1_000_000, "ms"),
        _ => (1_000_000_000, "s"),
    };
    let mut s = (n / unit).to_string();
    let rem = n % unit;
    if rem > 0 {
        let digits = unit.ilog10() as usize;
        let frac = format!("{:0digits$}", rem, digits = digits);
        let _ = write!(s, ".{}", frac.trim_end_matches('0'));
    }
    s.push_str(suffix);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_duration() {
        assert_eq!(fmt_duration(Duration::ZERO), "0s");
        assert_eq!(fmt_duration(Duration::from_micros(300)), "300µs");
        assert_eq!(fmt_duration(Duration::from_micros(1200)), "1.2ms");
        assert_eq!(fmt_duration(Duration::from_millis(16)), "16ms");
        assert_eq!(fmt_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(fmt_duration(Duration::from_nanos(20)), "20ns");
    }

    #[test]
    fn test_round_duration() {
        let q = PROFILE_QUANTUM;
        assert_eq!(round_duration(Duration::from_micros(149), q), Duration::from_micros(100));
        assert_eq!(round_duration(Duration::from_micros(150), q), Duration::from_micros(200));
        assert_eq!(round_duration(Duration::from_micros(20), q), Duration::ZERO);
    }
}
