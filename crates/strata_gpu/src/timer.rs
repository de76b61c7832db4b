//! GPU frame timers
//!
//! Timers measure stages of a frame on the GPU. Results arrive frames
//! later, so a timer that has been ended waits until its duration is
//! available before it can be started again.

use std::time::Duration;

use crate::driver::{Device, Result, TimerId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum TimerState {
    #[default]
    Idle,
    Running,
    Waiting,
}

#[derive(Debug)]
pub struct Timer {
    pub elapsed: Duration,
    timer: TimerId,
    state: TimerState,
}

impl Timer {
    pub fn begin(&mut self, device: &mut dyn Device) {
        if self.state != TimerState::Idle {
            return;
        }
        device.begin_timer(self.timer);
        self.state = TimerState::Running;
    }

    pub fn end(&mut self, device: &mut dyn Device) {
        if self.state != TimerState::Running {
            return;
        }
        device.end_timer(self.timer);
        self.state = TimerState::Waiting;
    }
}

/// The stencil, cover and cleanup timers of a frame
#[derive(Debug)]
pub struct Timers {
    pub stencil: Timer,
    pub cover: Timer,
    pub cleanup: Timer,
}

impl Timers {
    pub fn new(device: &mut dyn Device) -> Result<Self> {
        let stencil = device.new_timer()?;
        let cover = match device.new_timer() {
            Ok(t) => t,
            Err(err) => {
                device.release_timer(stencil);
                return Err(err);
            }
        };
        let cleanup = match device.new_timer() {
            Ok(t) => t,
            Err(err) => {
                device.release_timer(stencil);
                device.release_timer(cover);
                return Err(err);
            }
        };
        let timer = |timer| Timer {
            elapsed: Duration::ZERO,
            timer,
            state: TimerState::Idle,
        };
        Ok(Self {
            stencil: timer(stencil),
            cover: timer(cover),
            cleanup: timer(cleanup),
        })
    }

    fn all(&mut self) -> [&mut Timer; 3] {
        [&mut self.stencil, &mut self.cover, &mut self.cleanup]
    }

    /// Collect the results of waiting timers. True when every started timer
    /// has a result and the measurements are continuous.
    pub fn ready(&mut self, device: &mut dyn Device) -> bool {
        for t in self.all() {
            match t.state {
                TimerState::Idle => continue,
                TimerState::Running => return false,
                TimerState::Waiting => {}
            }
            let Some(d) = device.timer_duration(t.timer) else {
                return false;
            };
            t.state = TimerState::Idle;
            t.elapsed = d;
        }
        device.is_time_continuous()
    }

    pub fn release(mut self, device: &mut dyn Device) {
        for t in self.all() {
            device.release_timer(t.timer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RenderTarget;
    use crate::headless::HeadlessDevice;
    use strata_core::IPoint;

    fn frame(device: &mut HeadlessDevice, timers: &mut Timers) {
        device.begin_frame(RenderTarget::Default, false, IPoint::new(1, 1)).unwrap();
        timers.stencil.begin(device);
        timers.stencil.end(device);
        timers.cover.begin(device);
        timers.cover.end(device);
        device.end_frame().unwrap();
    }

    #[test]
    fn test_results_arrive_next_frame() {
        let mut device = HeadlessDevice::new();
        device.set_timer_duration(Duration::from_micros(250));
        let mut timers = Timers::new(&mut device).unwrap();

        frame(&mut device, &mut timers);
        assert!(!timers.ready(&mut device));

        // Waiting timers are not restarted.
        frame(&mut device, &mut timers);
        assert!(timers.ready(&mut device));
        assert_eq!(timers.stencil.elapsed, Duration::from_micros(250));
        assert_eq!(timers.cleanup.elapsed, Duration::ZERO);

        timers.release(&mut device);
        assert_eq!(device.live_timers(), 0);
    }

    #[test]
    fn test_running_timer_is_not_ready() {
        let mut device = HeadlessDevice::new();
        let mut timers = Timers::new(&mut device).unwrap();
        device.begin_frame(RenderTarget::Default, false, IPoint::new(1, 1)).unwrap();
        timers.cover.begin(&mut device);
        assert!(!timers.ready(&mut device));
        timers.cover.end(&mut device);
        device.end_frame().unwrap();
    }
}
