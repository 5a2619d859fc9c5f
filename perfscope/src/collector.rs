//! # Collector
//!
//! The process-wide hand-off point between recording threads and the analyzer.
//! Construct it once at startup, hand an `Arc` to every subsystem that records,
//! and drop it after the last recorder and analyzer are gone.
//!
//! Frames flow through two queues: [`Collector::add_frame`] (any thread) maps a
//! finished frame onto the shared [`ExecTree`] and appends it to a staging
//! queue; [`Collector::get_new_frames`] (one consumer thread) moves staged
//! frames into the ordered history.

use std::{
    mem::{self, size_of},
    sync::Arc,
    time::Instant,
};

use bytemuck::cast_slice;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, trace};

use crate::{
    clock::FrameTiming,
    config::PerfConfig,
    error::{PerfResult, ensure},
    exec_tree::{ExecId, ExecTree},
    point::{PointId, PointKind, PointRegistry},
    sample::{PackedSample, Sample},
    thread_recorder::ThreadRecorder,
};

/// One finished frame of one thread, addressed by [`ExecId`].
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Tree-mapped samples; scope times in nanoseconds since frame start.
    pub samples: Vec<Sample<ExecId>>,
    /// Start in seconds since the collector was created.
    pub start_time: f64,
    /// End in seconds since the collector was created.
    pub end_time: f64,
    /// Per-thread frame counter.
    pub frame_id: u64,
    /// Index of the recording thread.
    pub thread_index: u32,
}

impl Frame {
    /// Wall-clock length in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Heap bytes held by the sample buffer.
    pub fn used_memory(&self) -> usize {
        self.samples.capacity() * size_of::<Sample<ExecId>>()
    }

    /// Packs the samples into little-endian 64-bit words.
    pub fn encode_samples(&self) -> Vec<u8> {
        let words: Vec<PackedSample> = self
            .samples
            .iter()
            .map(|sample| PackedSample(sample.encode().0.to_le()))
            .collect();
        cast_slice::<PackedSample, u8>(&words).to_vec()
    }

    /// Inverse of [`Frame::encode_samples`].
    ///
    /// Returns `None` if the length is not a multiple of 8 or a word carries an
    /// unused sample type.
    pub fn decode_samples(bytes: &[u8]) -> Option<Vec<Sample<ExecId>>> {
        if bytes.len() % size_of::<u64>() != 0 {
            return None;
        }
        bytes
            .chunks_exact(size_of::<u64>())
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                Sample::decode(PackedSample(u64::from_le_bytes(word)))
            })
            .collect()
    }
}

/// Owns the call tree and the frame history.
pub struct Collector {
    config: PerfConfig,
    registry: Arc<PointRegistry>,
    tree: RwLock<ExecTree>,
    staging: Mutex<Vec<Frame>>,
    history: RwLock<Vec<Frame>>,
    threads: RwLock<Vec<Option<String>>>,
    epoch: Instant,
}

impl Collector {
    /// Validates `config` and creates an empty collector.
    pub fn new(config: PerfConfig) -> PerfResult<Arc<Self>> {
        config.validate()?;
        let registry = Arc::new(PointRegistry::new());
        let tree = ExecTree::new(registry.clone(), config.tree_reserve);
        info!(
            "perf collector started ({} swap frames, gpu latency {})",
            config.num_swap_frames, config.gpu_latency_frames
        );

        Ok(Arc::new(Self {
            config,
            registry,
            tree: RwLock::new(tree),
            staging: Mutex::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            threads: RwLock::new(Vec::new()),
            epoch: Instant::now(),
        }))
    }

    /// Configuration the collector was created with.
    pub fn config(&self) -> &PerfConfig {
        &self.config
    }

    /// Time origin of every frame timestamp.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Shared point registry.
    pub fn registry(&self) -> &Arc<PointRegistry> {
        &self.registry
    }

    /// Registers an instrumentation point; see [`PointRegistry::register`].
    pub fn register_point(
        &self,
        kind: PointKind,
        file: &str,
        function: &str,
        tag: &str,
        line: u32,
    ) -> PerfResult<PointId> {
        self.registry.register(kind, file, function, tag, line)
    }

    /// Creates a recorder for the calling thread.
    pub fn recorder(self: &Arc<Self>) -> ThreadRecorder {
        ThreadRecorder::new(self)
    }

    /// Assigns the next thread index and remembers the thread's name.
    pub fn register_thread(&self, name: Option<String>) -> u32 {
        let mut threads = self.threads.write();
        threads.push(name);
        (threads.len() - 1) as u32
    }

    /// Name of the thread behind `thread_index`, if it had one.
    pub fn thread_name(&self, thread_index: u32) -> Option<String> {
        self.threads
            .read()
            .get(thread_index as usize)
            .cloned()
            .flatten()
    }

    /// Folds a finished frame into the tree and stages it.
    ///
    /// `samples` hold scope times in counter cycles; they are rescaled with the
    /// frame's measured `ns_per_cycle` and gpu times are made inclusive.
    /// Aborts on a malformed log or when the tree is full.
    #[track_caller]
    pub fn add_frame(
        &self,
        frame_id: u64,
        timing: FrameTiming,
        samples: &[Sample<PointId>],
        thread_index: u32,
    ) {
        let mut exec_samples = {
            let mut tree = self.tree.write();
            ensure(tree.to_exec_samples(samples))
        };
        ExecTree::scale_cpu_times(&mut exec_samples, timing.ns_per_cycle);
        ExecTree::compute_gpu_times(&mut exec_samples);

        trace!(
            "staged frame {frame_id} of thread {thread_index} ({} samples)",
            exec_samples.len()
        );
        self.staging.lock().push(Frame {
            samples: exec_samples,
            start_time: timing.start,
            end_time: timing.end,
            frame_id,
            thread_index,
        });
    }

    /// Moves staged frames into the history; returns how many were moved.
    pub fn get_new_frames(&self) -> usize {
        let staged = mem::take(&mut *self.staging.lock());
        let count = staged.len();
        if count > 0 {
            self.history.write().extend(staged);
        }
        count
    }

    /// Ordered frame history.
    pub fn frames(&self) -> RwLockReadGuard<'_, Vec<Frame>> {
        self.history.read()
    }

    /// Read access to the call tree.
    pub fn exec_tree(&self) -> RwLockReadGuard<'_, ExecTree> {
        self.tree.read()
    }

    /// Approximate bytes held by the history and the tree.
    pub fn used_memory(&self) -> usize {
        let history = self.history.read();
        let frames: usize = history.iter().map(Frame::used_memory).sum();
        frames + history.capacity() * size_of::<Frame>() + self.tree.read().used_memory()
    }

    /// Drops the oldest frames once the newest ones exceed `max_bytes`.
    ///
    /// At least `min_frames` frames (or all of them, if fewer) are kept.
    pub fn limit_memory(&self, max_bytes: usize, min_frames: usize) {
        let mut history = self.history.write();
        let mut total = 0;
        let mut kept = 0;
        for frame in history.iter().rev() {
            if total >= max_bytes {
                break;
            }
            total += frame.used_memory();
            kept += 1;
        }

        let kept = kept.max(min_frames).min(history.len());
        let dropped = history.len() - kept;
        if dropped > 0 {
            history.drain(..dropped);
            debug!("dropped {dropped} old frames, {kept} left");
        }
    }

    /// [`limit_memory`](Self::limit_memory) with the configured bounds.
    pub fn limit_memory_to_config(&self) {
        self.limit_memory(
            self.config.history_memory_limit,
            self.config.history_min_frames,
        );
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        debug!(
            "perf collector dropped with {} frames and {} exec nodes",
            self.history.get_mut().len(),
            self.tree.get_mut().len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{exec_tree::ExecNodeKind, sample::SampleType};

    fn timing(start: f64, end: f64) -> FrameTiming {
        FrameTiming {
            start,
            end,
            ns_per_cycle: 2.0,
        }
    }

    fn frame(samples: Vec<Sample<ExecId>>) -> Frame {
        Frame {
            samples,
            start_time: 1.0,
            end_time: 1.5,
            frame_id: 3,
            thread_index: 0,
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PerfConfig::default()
            .with_num_swap_frames(1)
            .with_gpu_latency_frames(1);
        assert!(Collector::new(config).is_err());
    }

    #[test]
    fn add_frame_maps_and_rescales() {
        let collector = Collector::new(PerfConfig::default()).expect("collector");
        let a = collector
            .register_point(PointKind::Scope, "c.rs", "a", "#", 1)
            .expect("point");
        collector.add_frame(
            0,
            timing(0.0, 0.001),
            &[
                Sample::new(SampleType::ScopeBegin, a, 10),
                Sample::new(SampleType::ScopeEnd, a, 60),
            ],
            0,
        );
        assert!(collector.frames().is_empty());
        assert_eq!(collector.get_new_frames(), 1);
        assert_eq!(collector.get_new_frames(), 0);

        let frames = collector.frames();
        let values: Vec<u64> = frames[0].samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![20, 120]);

        let tree = collector.exec_tree();
        let node = tree.node(frames[0].samples[0].id).expect("node");
        assert_eq!(node.point_id, a);
        assert_eq!(node.kind, ExecNodeKind::Scope);
        assert_eq!(node.parent_id, ExecId::ROOT);
    }

    #[test]
    #[should_panic(expected = "scope_end does not match")]
    fn malformed_frame_is_fatal() {
        let collector = Collector::new(PerfConfig::default()).expect("collector");
        let a = collector
            .register_point(PointKind::Scope, "c.rs", "a", "#", 1)
            .expect("point");
        collector.add_frame(
            0,
            timing(0.0, 0.001),
            &[Sample::new(SampleType::ScopeEnd, a, 60)],
            0,
        );
    }

    #[test]
    #[should_panic(expected = "too many exec nodes")]
    fn exhausted_tree_is_fatal() {
        let collector = Collector::new(PerfConfig::default()).expect("collector");
        let a = collector
            .register_point(PointKind::Scope, "c.rs", "a", "#", 1)
            .expect("point");
        let samples: Vec<Sample<PointId>> = (0..=ExecId::MAX as u64)
            .map(|time| Sample::new(SampleType::ScopeBegin, a, time))
            .collect();
        collector.add_frame(0, timing(0.0, 0.001), &samples, 0);
    }

    #[test]
    fn thread_names_are_remembered() {
        let collector = Collector::new(PerfConfig::default()).expect("collector");
        let main = collector.register_thread(Some("main".to_string()));
        let anon = collector.register_thread(None);
        assert_eq!((main, anon), (0, 1));
        assert_eq!(collector.thread_name(main).as_deref(), Some("main"));
        assert_eq!(collector.thread_name(anon), None);
        assert_eq!(collector.thread_name(9), None);
    }

    #[test]
    fn limit_memory_keeps_newest_frames() {
        let collector = Collector::new(PerfConfig::default()).expect("collector");
        let a = collector
            .register_point(PointKind::Scope, "c.rs", "a", "#", 1)
            .expect("point");
        for id in 0..10 {
            collector.add_frame(
                id,
                timing(id as f64, id as f64 + 1.0),
                &[
                    Sample::new(SampleType::ScopeBegin, a, 0),
                    Sample::new(SampleType::ScopeEnd, a, 1),
                ],
                0,
            );
        }
        collector.get_new_frames();
        let frame_size = collector.frames()[0].used_memory();

        collector.limit_memory(frame_size * 4, 2);
        let ids: Vec<u64> = collector.frames().iter().map(|f| f.frame_id).collect();
        assert_eq!(ids, vec![6, 7, 8, 9]);

        collector.limit_memory(0, 2);
        assert_eq!(collector.frames().len(), 2);

        collector.limit_memory(0, 5);
        assert_eq!(collector.frames().len(), 2);
    }

    #[test]
    fn frame_samples_pack_into_words() {
        let frame = frame(vec![
            Sample::new(SampleType::ScopeBegin, ExecId(1), 5),
            Sample::new(SampleType::GpuTime, ExecId(2), 77),
            Sample::new(SampleType::ScopeEnd, ExecId(1), 9),
        ]);
        let bytes = frame.encode_samples();
        assert_eq!(bytes.len(), 24);
        assert_eq!(Frame::decode_samples(&bytes), Some(frame.samples.clone()));
        assert_eq!(Frame::decode_samples(&bytes[..23]), None);
        assert!((frame.duration() - 0.5).abs() < 1e-12);
    }
}
