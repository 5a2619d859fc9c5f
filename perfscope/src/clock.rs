//! Cheap per-scope timestamps.
//!
//! Scopes are stamped with the raw hardware cycle counter. Each finished frame
//! measures how many wall-clock nanoseconds its cycles covered and hands that
//! scale to the collector, which converts the frame's timestamps once.

use std::time::Instant;

/// Reads the hardware cycle counter (`rdtsc` / `cntvct_el0`).
#[inline(always)]
pub fn cycles() -> u64 {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::x86_64::_rdtsc()
    }
    #[cfg(target_arch = "aarch64")]
    {
        let val: u64;
        unsafe { core::arch::asm!("mrs {}, cntvct_el0", out(reg) val) };
        val
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        use std::sync::OnceLock;
        static FALLBACK_EPOCH: OnceLock<Instant> = OnceLock::new();
        let epoch = FALLBACK_EPOCH.get_or_init(Instant::now);
        epoch.elapsed().as_nanos() as u64
    }
}

/// Wall-clock span of one finished frame plus its cycle-to-ns scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTiming {
    /// Frame start in seconds since the collector epoch.
    pub start: f64,
    /// Frame end in seconds since the collector epoch.
    pub end: f64,
    /// Nanoseconds per counter cycle measured over this frame.
    pub ns_per_cycle: f64,
}

/// Measures one frame in both cycles and wall-clock time.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FrameClock {
    wall_begin: Instant,
    cycle_begin: u64,
}

impl FrameClock {
    pub fn start() -> Self {
        Self {
            wall_begin: Instant::now(),
            cycle_begin: cycles(),
        }
    }

    /// Cycles elapsed since the frame started.
    #[inline(always)]
    pub fn elapsed_cycles(&self) -> u64 {
        cycles().wrapping_sub(self.cycle_begin)
    }

    /// Closes the frame; `epoch` is the collector's time origin.
    pub fn finish(&self, epoch: Instant) -> FrameTiming {
        let wall_end = Instant::now();
        let cycle_count = self.elapsed_cycles();
        let wall_ns = wall_end.duration_since(self.wall_begin).as_nanos() as f64;
        let ns_per_cycle = if cycle_count == 0 {
            1.0
        } else {
            wall_ns / cycle_count as f64
        };

        FrameTiming {
            start: self.wall_begin.saturating_duration_since(epoch).as_secs_f64(),
            end: wall_end.saturating_duration_since(epoch).as_secs_f64(),
            ns_per_cycle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cycles_are_monotonic_on_one_thread() {
        let a = cycles();
        let b = cycles();
        assert!(b >= a);
    }

    #[test]
    fn scale_converts_cycles_to_wall_time() {
        let epoch = Instant::now();
        let clock = FrameClock::start();
        std::thread::sleep(Duration::from_millis(5));
        let timing = clock.finish(epoch);

        assert!(timing.end > timing.start);
        assert!(timing.ns_per_cycle > 0.0);
        let span_ns = (timing.end - timing.start) * 1e9;
        assert!(span_ns >= 5_000_000.0);
    }
}
