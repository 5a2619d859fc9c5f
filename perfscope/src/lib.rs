//! perfscope is an in-process instrumentation and trace-aggregation engine.
//!
//! Application code marks scoped regions and counters; every instrumented
//! thread records them into its own [`ThreadRecorder`]; a shared [`Collector`]
//! folds the per-thread streams into one deduplicated call tree; an
//! [`Analyzer`] aggregates frames into per-node statistics for display.
//!
//! # Recording
//!
//! Points are registered once per call site and then referenced by their
//! small [`PointId`]:
//!
//! ```
//! use std::sync::OnceLock;
//!
//! use perfscope::{Collector, PerfConfig, PointId, PointKind};
//!
//! let collector = Collector::new(PerfConfig::default())?;
//! static UPDATE: OnceLock<PointId> = OnceLock::new();
//! let update = *UPDATE.get_or_init(|| {
//!     collector
//!         .register_point(PointKind::Scope, file!(), "app::update", "#", line!())
//!         .expect("point registry has room")
//! });
//!
//! let mut recorder = collector.recorder();
//! recorder.enter(update);
//! // ... work ...
//! recorder.exit(update);
//! recorder.next_frame();
//! # Ok::<(), perfscope::PerfError>(())
//! ```
//!
//! A frame reaches the collector `num_swap_frames` frame boundaries after it
//! ended, which leaves room for GPU timestamps to be resolved into it with
//! [`ThreadRecorder::resolve_gpu_scopes`].
//!
//! # Aggregation
//!
//! The consumer thread periodically calls [`Collector::get_new_frames`] and
//! hands the history and the tree to [`Analyzer::update`], which produces the
//! sorted, fold-aware list of visible nodes.
//!
//! # Failure model
//!
//! Broken nesting, duplicate gpu-time nodes and pause/resume misuse are
//! protocol violations: they are logged through `tracing` and abort recording
//! with a panic. Exhausting the 16-bit point or node id space does the same.
#![deny(missing_docs, clippy::unwrap_used)]

pub mod analyzer;
pub mod clock;
pub mod collector;
pub mod config;
pub mod error;
pub mod exec_tree;
pub mod point;
pub mod sample;
pub mod thread_recorder;


pub use crate::{
    analyzer::{Analyzer, FrameRange, Row, Stat},
    clock::FrameTiming,
    collector::{Collector, Frame},
    config::{AnalyzerConfig, DataSource, PerfConfig, SortVar},
    error::{PerfError, PerfResult, Violation},
    exec_tree::{ExecId, ExecNode, ExecNodeKind, ExecTree, ExecValue},
    point::{FuncName, Point, PointId, PointKind, PointRegistry},
    sample::{PackedSample, Sample, SampleType},
    thread_recorder::{GpuMark, GpuSampleHandle, ThreadRecorder},
};
