//! # Thread Recorder
//!
//! One recorder per instrumented thread. Recording appends to a plain `Vec`
//! owned by the recorder; nothing on the hot path locks, allocates after
//! warm-up, or reads the wall clock.
//!
//! ## Frame slots
//!
//! The recorder keeps `num_swap_frames` slots used round-robin. Frame `k` is
//! recorded into slot `k % N`; when it ends the slot stays pending so late GPU
//! timestamps can still be patched in. The slot is handed to the
//! [`Collector`] only when frame `k + N` is about to reuse it.
//!
//! ## Nesting markers
//!
//! `child` opens a level that is closed together with its parent by a single
//! `exit`; `exit_single` closes just the innermost level, after which `exit`
//! of that child's point still closes the parent. `sibling` switches the
//! innermost scope to another point without changing the depth.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::{
    clock::{FrameClock, FrameTiming},
    collector::Collector,
    error::{Violation, fatal},
    point::PointId,
    sample::{Sample, SampleType},
};

/// Which recording call produced a GPU timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GpuMark {
    /// Opened a gpu scope (`enter_gpu` / `child_gpu`).
    Enter = 0,
    /// Closed one or more gpu scopes (`exit_gpu` / `exit_single_gpu`).
    Exit = 1,
    /// Closed a gpu scope and opened the next one (`sibling_gpu`).
    Sibling = 2,
}

/// Opaque reference to a reserved gpu-time sample.
///
/// The command-submission layer writes a timestamp query for every handle it
/// receives and later passes `(handle, timestamp)` pairs, in submission order,
/// to [`ThreadRecorder::resolve_gpu_scopes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GpuSampleHandle {
    /// Index of the gpu-time sample in the frame log.
    pub sample_index: u32,
    /// Recording call that produced the handle.
    pub mark: GpuMark,
}

impl GpuSampleHandle {
    /// Packs the handle as `sample_index * 4 + mark`.
    ///
    /// Returns `None` for sample indices of `2^30` and above, which do not fit.
    pub fn encode(self) -> Option<u32> {
        self.sample_index
            .checked_mul(4)
            .map(|packed| packed | self.mark as u32)
    }

    /// Unpacks a value produced by [`GpuSampleHandle::encode`].
    pub fn decode(encoded: u32) -> Option<Self> {
        let mark = match encoded & 3 {
            0 => GpuMark::Enter,
            1 => GpuMark::Exit,
            2 => GpuMark::Sibling,
            _ => return None,
        };
        Some(Self {
            sample_index: encoded >> 2,
            mark,
        })
    }
}

#[derive(Clone, Copy, Debug)]
struct Level {
    sample_index: u32,
    /// Closing this level also closes the one below it.
    pop_parent: bool,
    /// A gpu-time sample follows the scope begin.
    gpu: bool,
    /// Point of a `child` level closed with `exit_single`; `exit` accepts it
    /// in place of this level's own point.
    closed_child: PointId,
}

#[derive(Debug, Default)]
struct FrameSlot {
    frame_id: u64,
    samples: Vec<Sample<PointId>>,
    timing: Option<FrameTiming>,
    pending: bool,
}

/// Records scopes and counters of a single thread.
pub struct ThreadRecorder {
    collector: Arc<Collector>,
    slots: Vec<FrameSlot>,
    current: usize,
    frame_id: u64,
    stack: Vec<Level>,
    clock: FrameClock,
    enabled: bool,
    gpu_enabled: bool,
    thread_index: u32,
    thread_name: Option<String>,
}

impl ThreadRecorder {
    /// Creates a recorder for the calling thread and starts its first frame.
    pub fn new(collector: &Arc<Collector>) -> Self {
        let config = collector.config();
        let thread_name = std::thread::current().name().map(str::to_owned);
        let thread_index = collector.register_thread(thread_name.clone());
        let slots = (0..config.num_swap_frames)
            .map(|_| FrameSlot {
                samples: Vec::with_capacity(config.sample_reserve),
                ..FrameSlot::default()
            })
            .collect();
        debug!(
            "thread recorder {thread_index} ({}) started with {} frame slots",
            thread_name.as_deref().unwrap_or("unnamed"),
            config.num_swap_frames
        );

        Self {
            collector: collector.clone(),
            slots,
            current: 0,
            frame_id: 0,
            stack: Vec::with_capacity(config.stack_reserve),
            clock: FrameClock::start(),
            enabled: true,
            gpu_enabled: true,
            thread_index,
            thread_name,
        }
    }

    /// Id of the frame being recorded.
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// Index the collector assigned to this recorder's thread.
    pub fn thread_index(&self) -> u32 {
        self.thread_index
    }

    /// Name of the thread that created the recorder.
    pub fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }

    /// Samples recorded so far in the current frame.
    pub fn samples(&self) -> &[Sample<PointId>] {
        &self.slots[self.current].samples
    }

    /// Number of scopes currently open.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Returns `true` while recording is paused.
    pub fn is_paused(&self) -> bool {
        !self.enabled
    }

    /// Returns `true` while gpu scopes are recorded as plain cpu scopes.
    pub fn is_gpu_paused(&self) -> bool {
        !self.gpu_enabled
    }

    #[inline]
    fn log(&mut self) -> &mut Vec<Sample<PointId>> {
        &mut self.slots[self.current].samples
    }

    #[inline]
    fn push(&mut self, kind: SampleType, point: PointId, value: u64) -> u32 {
        let log = self.log();
        let index = log.len() as u32;
        log.push(Sample::new(kind, point, value));
        index
    }

    #[inline]
    #[track_caller]
    fn check_point(point: PointId) {
        if !point.is_valid() {
            fatal(Violation::InvalidPoint.into());
        }
    }

    /// Opens a scope.
    #[track_caller]
    pub fn enter(&mut self, point: PointId) {
        if self.enabled {
            self.open(point, false, false);
        }
    }

    /// Opens a scope that is closed together with the current one.
    #[track_caller]
    pub fn child(&mut self, point: PointId) {
        if self.enabled {
            self.open(point, true, false);
        }
    }

    /// Closes the innermost scope and every level it was opened with through `child`.
    #[track_caller]
    pub fn exit(&mut self, point: PointId) {
        if self.enabled {
            self.close(point, false);
        }
    }

    /// Closes exactly one level, even if it was opened with `child`.
    #[track_caller]
    pub fn exit_single(&mut self, point: PointId) {
        if self.enabled {
            self.close(point, true);
        }
    }

    /// Closes the innermost scope and opens `point` at the same depth.
    #[track_caller]
    pub fn sibling(&mut self, point: PointId) {
        if self.enabled {
            self.switch(point, false);
        }
    }

    /// Records a counter value; values are truncated to 45 bits.
    #[track_caller]
    pub fn set_counter(&mut self, point: PointId, value: u64) {
        if self.enabled {
            Self::check_point(point);
            self.push(SampleType::Counter, point, value);
        }
    }

    /// GPU variant of [`enter`](Self::enter).
    #[track_caller]
    pub fn enter_gpu(&mut self, point: PointId) -> Option<GpuSampleHandle> {
        if !self.enabled {
            return None;
        }
        let gpu = self.gpu_enabled;
        self.open(point, false, gpu).map(|sample_index| GpuSampleHandle {
            sample_index,
            mark: GpuMark::Enter,
        })
    }

    /// GPU variant of [`child`](Self::child).
    #[track_caller]
    pub fn child_gpu(&mut self, point: PointId) -> Option<GpuSampleHandle> {
        if !self.enabled {
            return None;
        }
        let gpu = self.gpu_enabled;
        self.open(point, true, gpu).map(|sample_index| GpuSampleHandle {
            sample_index,
            mark: GpuMark::Enter,
        })
    }

    /// GPU variant of [`exit`](Self::exit).
    #[track_caller]
    pub fn exit_gpu(&mut self, point: PointId) -> Option<GpuSampleHandle> {
        if !self.enabled {
            return None;
        }
        let closed = self.close(point, false);
        self.exit_handle(closed)
    }

    /// GPU variant of [`exit_single`](Self::exit_single).
    #[track_caller]
    pub fn exit_single_gpu(&mut self, point: PointId) -> Option<GpuSampleHandle> {
        if !self.enabled {
            return None;
        }
        let closed = self.close(point, true);
        self.exit_handle(closed)
    }

    /// GPU variant of [`sibling`](Self::sibling).
    #[track_caller]
    pub fn sibling_gpu(&mut self, point: PointId) -> Option<GpuSampleHandle> {
        if !self.enabled {
            return None;
        }
        let gpu = self.gpu_enabled;
        // Replacing a cpu-only level leaves no gpu span to close.
        let mark = if self.stack.last().is_some_and(|level| level.gpu) {
            GpuMark::Sibling
        } else {
            GpuMark::Enter
        };
        self.switch(point, gpu)
            .map(|sample_index| GpuSampleHandle { sample_index, mark })
    }

    fn exit_handle(&self, closed_gpu_sample: Option<u32>) -> Option<GpuSampleHandle> {
        if !self.gpu_enabled {
            return None;
        }
        closed_gpu_sample.map(|sample_index| GpuSampleHandle {
            sample_index,
            mark: GpuMark::Exit,
        })
    }

    /// Pushes a level; returns the index of its gpu-time sample if one was reserved.
    #[track_caller]
    fn open(&mut self, point: PointId, pop_parent: bool, gpu: bool) -> Option<u32> {
        Self::check_point(point);
        let time = self.clock.elapsed_cycles();
        let sample_index = self.push(SampleType::ScopeBegin, point, time);
        self.stack.push(Level {
            sample_index,
            pop_parent,
            gpu,
            closed_child: PointId::NONE,
        });
        gpu.then(|| self.push(SampleType::GpuTime, point, 0))
    }

    /// Pops levels; returns the smallest gpu-time sample index among the closed levels.
    #[track_caller]
    fn close(&mut self, point: PointId, single: bool) -> Option<u32> {
        Self::check_point(point);
        let Some(top) = self.stack.last_mut() else {
            fatal(Violation::UnmatchedExit.into());
        };
        let closes_child = single && top.pop_parent;
        if single {
            top.pop_parent = false;
        }
        let top_index = top.sample_index as usize;
        if self.slots[self.current].samples[top_index].id != point && top.closed_child != point {
            fatal(Violation::MismatchedExit.into());
        }

        let time = self.clock.elapsed_cycles();
        let mut closed_gpu = None;
        while let Some(level) = self.stack.pop() {
            let scope_point = self.slots[self.current].samples[level.sample_index as usize].id;
            self.push(SampleType::ScopeEnd, scope_point, time);
            if level.gpu {
                closed_gpu = Some(level.sample_index + 1);
            }
            if !level.pop_parent {
                if closes_child && let Some(parent) = self.stack.last_mut() {
                    parent.closed_child = scope_point;
                }
                break;
            }
        }
        closed_gpu
    }

    /// Ends the innermost scope and begins `point` in its place.
    #[track_caller]
    fn switch(&mut self, point: PointId, gpu: bool) -> Option<u32> {
        Self::check_point(point);
        let Some(&top) = self.stack.last() else {
            fatal(Violation::UnmatchedExit.into());
        };
        let time = self.clock.elapsed_cycles();
        let old_point = self.slots[self.current].samples[top.sample_index as usize].id;
        self.push(SampleType::ScopeEnd, old_point, time);
        let sample_index = self.push(SampleType::ScopeBegin, point, time);
        if let Some(level) = self.stack.last_mut() {
            level.sample_index = sample_index;
            level.gpu = gpu;
            level.closed_child = PointId::NONE;
        }
        gpu.then(|| self.push(SampleType::GpuTime, point, 0))
    }

    /// Stops recording; every call becomes a no-op until [`resume`](Self::resume).
    #[track_caller]
    pub fn pause(&mut self) {
        if !self.enabled {
            fatal(Violation::AlreadyPaused.into());
        }
        self.enabled = false;
    }

    /// Restarts recording after [`pause`](Self::pause).
    #[track_caller]
    pub fn resume(&mut self) {
        if self.enabled {
            fatal(Violation::NotPaused.into());
        }
        self.enabled = true;
    }

    /// Records gpu scopes as plain cpu scopes until [`resume_gpu`](Self::resume_gpu).
    #[track_caller]
    pub fn pause_gpu(&mut self) {
        if !self.gpu_enabled {
            fatal(Violation::GpuAlreadyPaused.into());
        }
        self.gpu_enabled = false;
    }

    /// Restarts gpu sample reservation.
    #[track_caller]
    pub fn resume_gpu(&mut self) {
        if self.gpu_enabled {
            fatal(Violation::GpuNotPaused.into());
        }
        self.gpu_enabled = true;
    }

    /// Ends the current frame and starts the next one.
    ///
    /// The slot the next frame is recorded into is published to the collector
    /// first if it still holds a pending frame. Does nothing while paused.
    #[track_caller]
    pub fn next_frame(&mut self) {
        if !self.enabled {
            return;
        }
        if !self.stack.is_empty() {
            fatal(Violation::OpenScopesAtFrameEnd.into());
        }

        let timing = self.clock.finish(self.collector.epoch());
        let slot = &mut self.slots[self.current];
        slot.frame_id = self.frame_id;
        slot.timing = Some(timing);
        slot.pending = true;
        trace!(
            "thread {} finished frame {} ({} samples)",
            self.thread_index,
            self.frame_id,
            slot.samples.len()
        );

        self.frame_id += 1;
        self.current = (self.frame_id % self.slots.len() as u64) as usize;
        self.publish(self.current);
        self.slots[self.current].frame_id = self.frame_id;
        self.clock = FrameClock::start();
    }

    /// Publishes every pending frame, oldest first.
    ///
    /// The frame being recorded is left alone. Call this before dropping the
    /// recorder to keep the last `num_swap_frames - 1` frames.
    pub fn flush(&mut self) {
        let mut pending: SmallVec<[usize; 4]> = (0..self.slots.len())
            .filter(|&idx| self.slots[idx].pending)
            .collect();
        pending.sort_by_key(|&idx| self.slots[idx].frame_id);
        for idx in pending {
            self.publish(idx);
        }
    }

    fn publish(&mut self, slot_index: usize) {
        let slot = &mut self.slots[slot_index];
        if !slot.pending {
            return;
        }
        if let Some(timing) = slot.timing.take() {
            self.collector
                .add_frame(slot.frame_id, timing, &slot.samples, self.thread_index);
        }
        slot.samples.clear();
        slot.pending = false;
    }

    /// Back-patches gpu-time samples of `frame_id` from query results.
    ///
    /// `results` must be in submission order. The replay keeps a stack of open
    /// gpu spans: `Enter` pushes, `Sibling` closes the innermost span and
    /// pushes the next one, `Exit` closes every span whose handle is not below
    /// its own. Each span stores its exclusive time, i.e. its length minus the
    /// spans closed inside it.
    ///
    /// Results for a frame whose slot was already recycled are dropped.
    pub fn resolve_gpu_scopes(&mut self, frame_id: u64, results: &[(GpuSampleHandle, u64)]) {
        let current = self.current;
        let Some(slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(idx, slot)| slot.frame_id == frame_id && (slot.pending || *idx == current))
            .map(|(_, slot)| slot)
        else {
            debug!(
                "dropping {} gpu results of frame {frame_id}: slot already recycled",
                results.len()
            );
            return;
        };

        struct Span {
            sample_index: u32,
            start: u64,
            nested: u64,
        }

        let samples = &mut slot.samples;
        let mut close = |open: &mut Vec<Span>, span: Span, end: u64| {
            let total = end.saturating_sub(span.start);
            match samples.get_mut(span.sample_index as usize) {
                Some(sample) if sample.kind == SampleType::GpuTime => {
                    sample.set_value(total.saturating_sub(span.nested));
                }
                _ => debug!(
                    "gpu result for sample {} of frame {frame_id} has no gpu_time sample",
                    span.sample_index
                ),
            }
            if let Some(parent) = open.last_mut() {
                parent.nested = parent.nested.saturating_add(total);
            }
        };

        let mut open: Vec<Span> = Vec::with_capacity(16);
        for &(handle, timestamp) in results {
            match handle.mark {
                GpuMark::Enter => open.push(Span {
                    sample_index: handle.sample_index,
                    start: timestamp,
                    nested: 0,
                }),
                GpuMark::Sibling => {
                    if let Some(span) = open.pop() {
                        close(&mut open, span, timestamp);
                    }
                    open.push(Span {
                        sample_index: handle.sample_index,
                        start: timestamp,
                        nested: 0,
                    });
                }
                GpuMark::Exit => {
                    while open
                        .last()
                        .is_some_and(|span| span.sample_index >= handle.sample_index)
                    {
                        if let Some(span) = open.pop() {
                            close(&mut open, span, timestamp);
                        }
                    }
                }
            }
        }
        if !open.is_empty() {
            debug!(
                "{} gpu spans of frame {frame_id} were never closed",
                open.len()
            );
        }
    }
}

impl Drop for ThreadRecorder {
    fn drop(&mut self) {
        let pending = self.slots.iter().filter(|slot| slot.pending).count();
        debug!(
            "thread recorder {} dropped at frame {} with {pending} unpublished frames",
            self.thread_index, self.frame_id
        );
    }
}
