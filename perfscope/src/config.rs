//! Runtime configuration for recording and for the analyzer view state.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{PerfError, PerfResult};

/// Recording and collection settings shared by a collector and its recorders.
#[derive(Clone, Debug, PartialEq)]
pub struct PerfConfig {
    /// Number of round-robin frame slots kept by every recorder.
    pub num_swap_frames: usize,
    /// How many frame boundaries may pass after a frame ends before its GPU
    /// timestamps are delivered.
    pub gpu_latency_frames: usize,
    /// Initial sample capacity of each frame slot.
    pub sample_reserve: usize,
    /// Initial capacity of the open-scope stack.
    pub stack_reserve: usize,
    /// Initial node capacity of the exec tree.
    pub tree_reserve: usize,
    /// Memory budget used by [`Collector::limit_memory_to_config`](crate::Collector::limit_memory_to_config).
    pub history_memory_limit: usize,
    /// Frames always kept by the memory limit.
    pub history_min_frames: usize,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            num_swap_frames: 2,
            gpu_latency_frames: 1,
            sample_reserve: 1024,
            stack_reserve: 64,
            tree_reserve: 1024,
            history_memory_limit: 256 * 1024 * 1024,
            history_min_frames: 60,
        }
    }
}

impl PerfConfig {
    /// Sets the number of frame slots per recorder.
    pub fn with_num_swap_frames(mut self, count: usize) -> Self {
        self.num_swap_frames = count;
        self
    }

    /// Sets the GPU result latency, in frames.
    pub fn with_gpu_latency_frames(mut self, count: usize) -> Self {
        self.gpu_latency_frames = count;
        self
    }

    /// Sets the per-slot and stack preallocation.
    pub fn with_reserve(mut self, samples: usize, stack: usize) -> Self {
        self.sample_reserve = samples;
        self.stack_reserve = stack;
        self
    }

    /// Sets the history bounds applied by the collector.
    pub fn with_history_limit(mut self, max_bytes: usize, min_frames: usize) -> Self {
        self.history_memory_limit = max_bytes;
        self.history_min_frames = min_frames;
        self
    }

    /// Checks that GPU results can arrive before their frame slot is recycled.
    ///
    /// A frame ending at boundary `k + 1` is published at boundary `k + N`, so
    /// results delivered up to `L` boundaries late require `N >= L + 1`.
    pub fn validate(&self) -> PerfResult<()> {
        if self.num_swap_frames == 0 {
            return Err(PerfError::InvalidConfig(
                "num_swap_frames must be at least 1".to_string(),
            ));
        }
        if self.num_swap_frames < self.gpu_latency_frames + 1 {
            return Err(PerfError::InvalidConfig(format!(
                "num_swap_frames ({}) must exceed gpu_latency_frames ({}); \
                 GPU timings would be dropped",
                self.num_swap_frames, self.gpu_latency_frames
            )));
        }
        Ok(())
    }
}

/// Where the analyzer takes its frames from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DataSource {
    /// An explicit `[first_frame, end_frame)` range of the history.
    CustomRange,
    /// The most recent frames, bounded by a duration and frame-count budget.
    #[default]
    LastFrames,
}

/// Key used to order sibling rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SortVar {
    /// Average begin time, i.e. the order in which scopes ran.
    #[default]
    Execution,
    /// Display name.
    Name,
    /// Average cpu time (or counter value).
    CpuAvg,
    /// Minimum cpu time (or counter value).
    CpuMin,
    /// Maximum cpu time (or counter value).
    CpuMax,
    /// Average gpu time.
    GpuAvg,
    /// Minimum gpu time.
    GpuMin,
    /// Maximum gpu time.
    GpuMax,
}

/// View state persisted by an external presenter.
///
/// Nodes are referenced by [`ExecTree::hashed_id`](crate::ExecTree::hashed_id),
/// which survives process restarts; ids that no longer resolve are ignored.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnalyzerConfig {
    /// Frame source.
    pub data_source: DataSource,
    /// First frame of the custom range.
    pub first_frame: usize,
    /// One past the last frame of the custom range.
    pub end_frame: usize,
    /// Minimum duration in seconds covered by a last-frames window.
    pub last_min_duration: f64,
    /// Minimum number of frames in a last-frames window.
    pub last_min_frames: usize,
    /// Sort key for sibling rows.
    pub sort_var: SortVar,
    /// Reverse the sort order.
    pub sort_inverse: bool,
    /// Show subtrees whose values are all zero.
    pub show_empty: bool,
    /// Hashed ids of opened nodes; `None` keeps the default fold state.
    pub opened_nodes: Option<Vec<u64>>,
    /// Hashed id of the selected node.
    pub selected: Option<u64>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            data_source: DataSource::LastFrames,
            first_frame: 0,
            end_frame: 1,
            last_min_duration: 1.0,
            last_min_frames: 1,
            sort_var: SortVar::Execution,
            sort_inverse: false,
            show_empty: false,
            opened_nodes: None,
            selected: None,
        }
    }
}

#[cfg(feature = "serde")]
impl AnalyzerConfig {
    /// Serializes the view state to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Restores view state from JSON; missing fields take their defaults.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
