//! # Analyzer
//!
//! Turns a window of collected frames into per-node statistics and the
//! flattened, fold-aware list of rows a presenter draws. The analyzer owns no
//! frames and no tree: every update borrows both from the [`Collector`], so a
//! presenter typically does
//!
//! ```no_run
//! # use perfscope::{Analyzer, Collector, PerfConfig};
//! # let collector = Collector::new(PerfConfig::default())?;
//! let mut analyzer = Analyzer::default();
//! collector.get_new_frames();
//! let frames = collector.frames();
//! let tree = collector.exec_tree();
//! analyzer.update(&tree, &frames);
//! for &exec_id in analyzer.visible() {
//!     println!("{}", analyzer.exec_name(&tree, exec_id));
//! }
//! # Ok::<(), perfscope::PerfError>(())
//! ```
//!
//! [`Collector`]: crate::Collector

use std::fmt::Write;

use rustc_hash::FxHashSet as HashSet;
use tracing::debug;

use crate::{
    collector::Frame,
    config::{AnalyzerConfig, DataSource, SortVar},
    exec_tree::{ExecId, ExecNodeKind, ExecTree, ExecValue},
    sample::SampleType,
};

/// Average, minimum and maximum of one value over a frame window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stat {
    /// Mean over the window.
    pub avg: u64,
    /// Smallest value in the window.
    pub min: u64,
    /// Largest value in the window.
    pub max: u64,
}

impl Stat {
    fn is_zero(&self) -> bool {
        self.avg == 0 && self.min == 0 && self.max == 0
    }
}

/// Statistics of one node over the selected frames.
///
/// For counter nodes `cpu` holds the counter value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Row {
    /// CPU time in nanoseconds (or counter value).
    pub cpu: Stat,
    /// GPU time in nanoseconds.
    pub gpu: Stat,
    /// Average begin time; orders rows by execution.
    pub exec_order: u64,
    /// Times the scope was entered in the whole window.
    pub num_instances: u32,
}

impl Default for Row {
    fn default() -> Self {
        Self {
            cpu: Stat::default(),
            gpu: Stat::default(),
            exec_order: u64::MAX,
            num_instances: 0,
        }
    }
}

impl Row {
    /// Returns `true` if every statistic is zero.
    pub fn is_empty(&self) -> bool {
        self.cpu.is_zero() && self.gpu.is_zero()
    }

    fn sort_value(&self, var: SortVar) -> u64 {
        match var {
            SortVar::Execution | SortVar::Name => self.exec_order,
            SortVar::CpuAvg => self.cpu.avg,
            SortVar::CpuMin => self.cpu.min,
            SortVar::CpuMax => self.cpu.max,
            SortVar::GpuAvg => self.gpu.avg,
            SortVar::GpuMin => self.gpu.min,
            SortVar::GpuMax => self.gpu.max,
        }
    }
}

/// Everything computed for the current frame window, indexed by [`ExecId`].
#[derive(Clone, Debug, Default)]
pub struct FrameRange {
    /// Mean of the raw per-frame node values.
    pub average: Vec<i64>,
    /// Minimum of the raw per-frame node values.
    pub minimum: Vec<i64>,
    /// Maximum of the raw per-frame node values.
    pub maximum: Vec<i64>,
    /// Number of frames in the window.
    pub num_frames: usize,
    /// Per-node statistics.
    pub rows: Vec<Row>,
    /// Subtrees whose averages are all zero.
    pub empty: Vec<bool>,
    /// Fold state.
    pub opened: Vec<bool>,
    /// Node has children other than its gpu-time node.
    pub has_children: Vec<bool>,
    /// Node has children that are currently listed.
    pub has_active_children: Vec<bool>,
    /// Visible nodes in display order.
    pub exec_list: Vec<ExecId>,
}

/// Nodes at this depth or above start opened.
const DEFAULT_OPEN_DEPTH: u16 = 3;

/// Aggregates frames into rows and maintains fold and selection state.
#[derive(Debug, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
    range: FrameRange,
    pending_opened: Option<HashSet<u64>>,
    selected: Option<ExecId>,
    selected_hash: Option<u64>,
    last_frames_start: usize,
}

impl Analyzer {
    /// Creates an analyzer with restored view state.
    pub fn new(config: AnalyzerConfig) -> Self {
        let mut analyzer = Self::default();
        analyzer.set_config(config);
        analyzer
    }

    /// Current view state, with nodes referenced by hashed id.
    pub fn config(&self, tree: &ExecTree) -> AnalyzerConfig {
        AnalyzerConfig {
            opened_nodes: Some(self.opened_nodes(tree)),
            selected: self
                .selected
                .map(|id| tree.hashed_id(id))
                .or(self.selected_hash),
            ..self.config.clone()
        }
    }

    /// Restores view state; fold and selection apply on the next update.
    pub fn set_config(&mut self, config: AnalyzerConfig) {
        self.pending_opened = config
            .opened_nodes
            .as_ref()
            .map(|nodes| nodes.iter().copied().collect());
        self.selected = None;
        self.selected_hash = config.selected;
        self.last_frames_start = 0;
        self.config = config;
    }

    /// Changes the sort key and direction.
    pub fn set_sort(&mut self, var: SortVar, inverse: bool) {
        self.config.sort_var = var;
        self.config.sort_inverse = inverse;
    }

    /// Shows or hides all-zero subtrees.
    pub fn set_show_empty(&mut self, show: bool) {
        self.config.show_empty = show;
    }

    /// Selects a custom `[first, end)` frame range.
    pub fn set_custom_range(&mut self, first_frame: usize, end_frame: usize) {
        self.config.data_source = DataSource::CustomRange;
        self.config.first_frame = first_frame;
        self.config.end_frame = end_frame;
    }

    /// Selects a rolling window of at least `min_duration` seconds and `min_frames` frames.
    pub fn set_last_frames(&mut self, min_duration: f64, min_frames: usize) {
        self.config.data_source = DataSource::LastFrames;
        self.config.last_min_duration = min_duration.clamp(0.0, 1000.0);
        self.config.last_min_frames = min_frames.clamp(1, 10000);
        self.last_frames_start = 0;
    }

    /// Picks the frames the statistics are computed over.
    ///
    /// A last-frames window advances in whole windows: it stays put until a
    /// complete new window is available behind it.
    pub fn select_frames<'a>(&mut self, frames: &'a [Frame]) -> &'a [Frame] {
        if frames.is_empty() {
            return &[];
        }

        match self.config.data_source {
            DataSource::CustomRange => {
                let first = self.config.first_frame.min(frames.len() - 1);
                let end = self.config.end_frame.clamp(first + 1, frames.len());
                &frames[first..end]
            }
            DataSource::LastFrames => {
                let min_duration = self.config.last_min_duration;
                let min_frames = self.config.last_min_frames.max(1);
                if self.last_frames_start >= frames.len() {
                    self.last_frames_start = 0;
                }

                let mut time_left: f64 = frames[self.last_frames_start..]
                    .iter()
                    .map(Frame::duration)
                    .sum();
                if self.last_frames_start == 0 && time_left <= min_duration {
                    return frames;
                }

                loop {
                    let start = self.last_frames_start;
                    let mut duration = 0.0;
                    let mut count = 0;
                    for frame in &frames[start..] {
                        duration += frame.duration();
                        count += 1;
                        if duration >= min_duration && count >= min_frames {
                            break;
                        }
                    }

                    time_left -= duration;
                    let can_advance = frames.len() - start - count >= min_frames
                        && (min_duration == 0.0 || time_left >= min_duration);
                    if !can_advance {
                        return &frames[start..start + count];
                    }
                    self.last_frames_start += count;
                }
            }
        }
    }

    /// Recomputes everything for the current frame window.
    pub fn update(&mut self, tree: &ExecTree, frames: &[Frame]) {
        let selected = self.select_frames(frames);
        self.compute_range(tree, selected);
        self.update_opened(tree);
        self.compute_exec_list(tree);
        self.resolve_selection(tree);
    }

    /// Fills averages, extremes and rows for `frames`.
    ///
    /// The root value of each frame is its wall-clock duration. An empty window
    /// yields all-zero statistics.
    pub fn compute_range(&mut self, tree: &ExecTree, frames: &[Frame]) {
        let size = tree.len();
        let range = &mut self.range;
        range.average.clear();
        range.average.resize(size, 0);
        range.minimum.clear();
        range.minimum.resize(size, i64::MAX);
        range.maximum.clear();
        range.maximum.resize(size, 0);
        range.num_frames = frames.len();

        let mut values = vec![ExecValue::default(); size];
        for frame in frames {
            for value in values.iter_mut() {
                value.value = 0;
            }
            tree.exec_values(&frame.samples, &mut values);
            values[ExecId::ROOT.index()].value = (frame.duration() * 1e9) as i64;

            for (idx, value) in values.iter().enumerate().take(size) {
                range.average[idx] += value.value;
                range.minimum[idx] = range.minimum[idx].min(value.value);
                range.maximum[idx] = range.maximum[idx].max(value.value);
            }
        }

        for idx in 0..size {
            if range.minimum[idx] == i64::MAX {
                range.minimum[idx] = 0;
            }
            if range.num_frames > 0 {
                range.average[idx] /= range.num_frames as i64;
            }
        }

        let mut rows = vec![Row::default(); size];
        for (idx, value) in values.iter().enumerate().take(size) {
            if tree.nodes()[idx].kind == ExecNodeKind::Scope && value.num_instances > 0 {
                rows[idx].num_instances = value.num_instances;
                rows[idx].exec_order = value.begin_time / value.num_instances as u64;
            }
        }
        Self::compute_rows(tree, &mut rows, range);
        range.rows = rows;
        range.empty = tree.empty_branches(&range.average);
    }

    fn compute_rows(tree: &ExecTree, rows: &mut [Row], range: &FrameRange) {
        let stat = |id: ExecId| Stat {
            avg: range.average[id.index()].max(0) as u64,
            min: range.minimum[id.index()].max(0) as u64,
            max: range.maximum[id.index()].max(0) as u64,
        };

        // Children have larger ids, so they are done before their parent.
        for idx in (0..rows.len()).rev() {
            let id = ExecId(idx as u16);
            let node = &tree.nodes()[idx];
            match node.kind {
                ExecNodeKind::Scope => {
                    let gpu = match node.gpu_time_id {
                        Some(gpu_id) => stat(gpu_id),
                        None => node.children.iter().fold(Stat::default(), |acc, child| {
                            let child = rows[child.index()].gpu;
                            Stat {
                                avg: acc.avg + child.avg,
                                min: acc.min + child.min,
                                max: acc.max + child.max,
                            }
                        }),
                    };
                    rows[idx].gpu = gpu;
                    rows[idx].cpu = stat(id);
                }
                ExecNodeKind::Counter => {
                    rows[idx].cpu = stat(id);
                    rows[idx].exec_order = u64::MAX;
                }
                ExecNodeKind::GpuTime => {}
            }
        }
    }

    fn update_opened(&mut self, tree: &ExecTree) {
        let opened = &mut self.range.opened;
        let known = opened.len();
        opened.extend(
            tree.nodes()[known.min(tree.len())..]
                .iter()
                .map(|node| node.depth <= DEFAULT_OPEN_DEPTH),
        );

        if let Some(pending) = &self.pending_opened {
            for (idx, open) in opened.iter_mut().enumerate() {
                *open = pending.contains(&tree.hashed_id(ExecId(idx as u16)));
            }
        }
    }

    fn sort_rows(&self, tree: &ExecTree, ids: &mut [ExecId]) {
        let rows = &self.range.rows;
        match self.config.sort_var {
            SortVar::Name => ids.sort_by_cached_key(|&id| self.exec_name(tree, id)),
            var => ids.sort_by(|&a, &b| {
                rows[a.index()]
                    .sort_value(var)
                    .cmp(&rows[b.index()].sort_value(var))
            }),
        }
        if self.config.sort_inverse {
            ids.reverse();
        }
    }

    /// Rebuilds the visible list: depth-first, children sorted, closed
    /// subtrees and (unless shown) empty subtrees omitted.
    pub fn compute_exec_list(&mut self, tree: &ExecTree) {
        let size = tree.len();
        self.range.exec_list.clear();
        self.range.has_children.clear();
        self.range.has_children.resize(size, false);
        self.range.has_active_children.clear();
        self.range.has_active_children.resize(size, false);
        self.range.opened.resize(size, false);
        if self.range.empty.len() < size {
            self.range.empty.resize(size, true);
        }
        if self.range.rows.len() < size {
            self.range.rows.resize(size, Row::default());
        }

        let show_empty = self.config.show_empty;
        let mut stack = vec![ExecId::ROOT];
        while let Some(id) = stack.pop() {
            let node = &tree.nodes()[id.index()];
            if node.kind == ExecNodeKind::GpuTime || (!show_empty && self.range.empty[id.index()])
            {
                continue;
            }
            self.range.exec_list.push(id);

            for &child in &node.children {
                if tree.nodes()[child.index()].kind == ExecNodeKind::GpuTime {
                    continue;
                }
                self.range.has_children[id.index()] = true;
                if show_empty || !self.range.empty[child.index()] {
                    self.range.has_active_children[id.index()] = true;
                    break;
                }
            }

            if self.range.opened[id.index()] {
                let mut children = node.children.to_vec();
                self.sort_rows(tree, &mut children);
                stack.extend(children.into_iter().rev());
            }
        }
    }

    fn resolve_selection(&mut self, tree: &ExecTree) {
        if self.selected.is_some() {
            self.selected_hash = None;
            return;
        }
        let Some(hash) = self.selected_hash else {
            return;
        };
        if let Some(idx) = (0..tree.len()).find(|&idx| tree.hashed_id(ExecId(idx as u16)) == hash) {
            self.selected = Some(ExecId(idx as u16));
            self.selected_hash = None;
        }
    }

    /// Statistics of the current window.
    pub fn range(&self) -> &FrameRange {
        &self.range
    }

    /// Visible nodes in display order.
    pub fn visible(&self) -> &[ExecId] {
        &self.range.exec_list
    }

    /// Row of `id`, if it exists in the current window.
    pub fn row(&self, id: ExecId) -> Option<&Row> {
        self.range.rows.get(id.index())
    }

    /// Returns `true` if the children of `id` are listed.
    pub fn is_opened(&self, id: ExecId) -> bool {
        self.range.opened.get(id.index()).copied().unwrap_or(false)
    }

    /// Opens or closes `id`; discards fold state restored from config.
    pub fn toggle_open(&mut self, id: ExecId) {
        self.pending_opened = None;
        if let Some(open) = self.range.opened.get_mut(id.index()) {
            *open = !*open;
        }
    }

    /// Hashed ids of every opened node.
    pub fn opened_nodes(&self, tree: &ExecTree) -> Vec<u64> {
        self.range
            .opened
            .iter()
            .enumerate()
            .filter(|&(idx, &open)| open && idx < tree.len())
            .map(|(idx, _)| tree.hashed_id(ExecId(idx as u16)))
            .collect()
    }

    /// Opens exactly the nodes whose hashed id is listed; unknown ids are ignored.
    pub fn set_opened_nodes(&mut self, hashed_ids: Vec<u64>) {
        self.pending_opened = Some(hashed_ids.into_iter().collect());
    }

    /// Selected node.
    pub fn selected(&self) -> Option<ExecId> {
        self.selected
    }

    /// Selects `id`, or clears the selection.
    pub fn select(&mut self, id: Option<ExecId>) {
        self.selected = id;
        self.selected_hash = None;
    }

    /// Display name: `"Frame"` for the root, else the tag or function name.
    pub fn exec_name(&self, tree: &ExecTree, id: ExecId) -> String {
        if id.is_root() {
            return "Frame".to_string();
        }
        tree.node(id)
            .and_then(|node| tree.registry().point(node.point_id))
            .map(|point| point.display_name().to_string())
            .unwrap_or_else(|| format!("<exec {}>", id.0))
    }

    /// Signature and source location of the node's point.
    pub fn exec_info(&self, tree: &ExecTree, id: ExecId) -> String {
        let Some(point) = tree
            .node(id)
            .filter(|_| !id.is_root())
            .and_then(|node| tree.registry().point(node.point_id))
        else {
            return String::new();
        };

        let tag = if point.tag.is_empty() {
            String::new()
        } else {
            format!("[{}]", point.tag)
        };
        format!(
            "{} {}{}{}\nLocation: {}:{}",
            point.func.return_type, point.func.name, point.func.args, tag, point.file, point.line
        )
        .trim_start()
        .to_string()
    }

    /// How often a scope ran relative to its parent, e.g. `" (2 / 3)"` or `" * 4"`.
    ///
    /// `None` when the counts match or the node is not a scope.
    pub fn instance_note(&self, tree: &ExecTree, id: ExecId) -> Option<String> {
        let node = tree.node(id)?;
        if id.is_root() || node.kind != ExecNodeKind::Scope {
            return None;
        }
        let instances = self.row(id)?.num_instances as usize;
        let parent_instances = if node.parent_id.is_root() {
            self.range.num_frames
        } else {
            self.row(node.parent_id)?.num_instances as usize
        };
        if instances == parent_instances || parent_instances == 0 {
            None
        } else if instances < parent_instances {
            Some(format!(" ({instances} / {parent_instances})"))
        } else if instances % parent_instances == 0 {
            Some(format!(" * {}", instances / parent_instances))
        } else {
            Some(format!(
                " * {:.2}",
                instances as f64 / parent_instances as f64
            ))
        }
    }

    /// Human-readable listing of a frame's samples, indented by scope depth.
    pub fn dump(&self, tree: &ExecTree, frame: &Frame) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Frame {}: {:.3} ms",
            frame.frame_id,
            frame.duration() * 1000.0
        );

        let mut indent = 0usize;
        let mut last_time = 0;
        for sample in &frame.samples {
            if sample.kind == SampleType::ScopeEnd {
                indent = indent.saturating_sub(1);
            }
            let (name, tag) = tree
                .node(sample.id)
                .and_then(|node| tree.registry().point(node.point_id))
                .map(|point| (point.func.name.clone(), point.tag.clone()))
                .unwrap_or_default();
            let _ = write!(
                out,
                "{}{name} {tag}: {:?}[{}]: {}",
                "  ".repeat(indent),
                sample.kind,
                sample.id.0,
                sample.value
            );
            if sample.kind.is_scope() {
                if sample.value < last_time {
                    out.push_str(" [INVALID TIME]");
                }
                last_time = sample.value;
            }
            if sample.kind == SampleType::ScopeBegin {
                indent += 1;
            }
            out.push('\n');
        }
        debug!("dumped frame {} ({} samples)", frame.frame_id, frame.samples.len());
        out
    }
}
