//! # Exec Tree
//!
//! Every distinct call path observed by any thread becomes one node of a
//! shared, append-only arena. A node is the concrete `(parent, point, kind)`
//! tuple; the same point reached through two different parents yields two
//! nodes. Ids are dense indices into the arena and a child is always created
//! after its parent, so `child.id > parent.id` holds for every edge.
//!
//! ```text
//! Frame (ExecId 0)
//! ├── update            (scope)
//! │   └── physics       (scope)
//! └── render            (scope)
//!     ├── render        (gpu_time)
//!     └── draw_calls    (counter)
//! ```

use std::{
    hash::{Hash, Hasher},
    mem::size_of,
    sync::Arc,
};

use rustc_hash::FxHasher;
use smallvec::SmallVec;
use tracing::warn;

use crate::{
    error::{PerfError, PerfResult, Violation},
    point::{PointId, PointRegistry},
    sample::{Sample, SampleType},
};

/// Index of a node in the [`ExecTree`]; 0 is the root (whole-frame) node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ExecId(pub u16);

impl ExecId {
    /// The root node, standing for the whole frame.
    pub const ROOT: ExecId = ExecId(0);
    /// Largest valid exec id.
    pub const MAX: u16 = u16::MAX;

    /// Index into dense per-node tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns `true` for the root node.
    pub fn is_root(self) -> bool {
        self.0 == 0
    }
}

impl From<u16> for ExecId {
    fn from(value: u16) -> Self {
        ExecId(value)
    }
}

impl From<ExecId> for u16 {
    fn from(id: ExecId) -> Self {
        id.0
    }
}

/// What a node of the tree stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExecNodeKind {
    /// A cpu scope; the only kind that can have children.
    Scope,
    /// The gpu time of its parent scope.
    GpuTime,
    /// A counter recorded inside its parent scope.
    Counter,
}

impl ExecNodeKind {
    /// Node kind addressed by a sample of the given type.
    pub fn from_sample_type(kind: SampleType) -> Self {
        match kind {
            SampleType::ScopeBegin | SampleType::ScopeEnd => ExecNodeKind::Scope,
            SampleType::GpuTime => ExecNodeKind::GpuTime,
            SampleType::Counter => ExecNodeKind::Counter,
        }
    }
}

/// One node of the call tree.
#[derive(Clone, Debug)]
pub struct ExecNode {
    /// Child nodes in creation order.
    pub children: SmallVec<[ExecId; 10]>,
    /// Point this node was created for ([`PointId::NONE`] for the root).
    pub point_id: PointId,
    /// Parent node (the root is its own parent).
    pub parent_id: ExecId,
    /// The unique gpu-time child of a scope, if one was observed.
    pub gpu_time_id: Option<ExecId>,
    /// Node kind.
    pub kind: ExecNodeKind,
    /// Distance from the root.
    pub depth: u16,
}

impl ExecNode {
    fn new(point_id: PointId, kind: ExecNodeKind, parent_id: ExecId, depth: u16) -> Self {
        Self {
            children: SmallVec::new(),
            point_id,
            parent_id,
            gpu_time_id: None,
            kind,
            depth,
        }
    }
}

/// Per-node values of a single frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecValue {
    /// Summed elapsed time (scopes) or summed sample value (gpu time, counters).
    pub value: i64,
    /// Sum of all scope begin times.
    pub begin_time: u64,
    /// Number of times the scope was entered.
    pub num_instances: u32,
}

/// Deduplicated call tree shared by every recording thread.
#[derive(Debug)]
pub struct ExecTree {
    nodes: Vec<ExecNode>,
    stack: Vec<ExecId>,
    registry: Arc<PointRegistry>,
}

impl ExecTree {
    /// Creates a tree holding only the root node.
    pub fn new(registry: Arc<PointRegistry>, reserve: usize) -> Self {
        let mut nodes = Vec::with_capacity(reserve.max(1));
        nodes.push(ExecNode::new(
            PointId::NONE,
            ExecNodeKind::Scope,
            ExecId::ROOT,
            0,
        ));
        Self {
            nodes,
            stack: Vec::with_capacity(64),
            registry,
        }
    }

    /// Registry the node points resolve against.
    pub fn registry(&self) -> &Arc<PointRegistry> {
        &self.registry
    }

    /// Looks up the node for `(parent, point, kind)`, creating it on first use.
    pub fn get(&mut self, parent: ExecId, point: PointId, kind: ExecNodeKind) -> PerfResult<ExecId> {
        if !point.is_valid() {
            return Err(Violation::InvalidPoint.into());
        }

        let parent_node = &self.nodes[parent.index()];
        if let Some(&found) = parent_node.children.iter().find(|&&child| {
            let node = &self.nodes[child.index()];
            node.point_id == point && node.kind == kind
        }) {
            return Ok(found);
        }

        if parent_node.kind != ExecNodeKind::Scope {
            return Err(Violation::NonScopeParent.into());
        }
        if kind == ExecNodeKind::GpuTime {
            if parent_node.gpu_time_id.is_some() {
                return Err(Violation::DuplicateGpuChild.into());
            }
            if parent_node.point_id != point {
                return Err(Violation::ForeignGpuChild.into());
            }
        }
        if self.nodes.len() > ExecId::MAX as usize {
            warn!("exec tree is full ({} nodes)", self.nodes.len());
            return Err(PerfError::CapacityExceeded {
                what: "exec nodes",
                limit: ExecId::MAX as usize + 1,
            });
        }

        let id = ExecId(self.nodes.len() as u16);
        let depth = parent_node.depth.saturating_add(1);
        let parent_node = &mut self.nodes[parent.index()];
        parent_node.children.push(id);
        if kind == ExecNodeKind::GpuTime {
            parent_node.gpu_time_id = Some(id);
        }
        self.nodes.push(ExecNode::new(point, kind, parent, depth));
        Ok(id)
    }

    /// Maps every sample of a point-keyed log to the node it belongs to.
    ///
    /// Scope ends map to the scope they close.
    pub fn map_samples(&mut self, samples: &[Sample<PointId>]) -> PerfResult<Vec<ExecId>> {
        let mut out = Vec::with_capacity(samples.len());
        self.stack.clear();
        self.stack.push(ExecId::ROOT);
        for sample in samples {
            out.push(self.map_sample(sample)?);
        }
        Ok(out)
    }

    /// Converts a point-keyed log into a tree-keyed one, growing the tree as needed.
    pub fn to_exec_samples(
        &mut self,
        samples: &[Sample<PointId>],
    ) -> PerfResult<Vec<Sample<ExecId>>> {
        let mut out = Vec::with_capacity(samples.len());
        self.stack.clear();
        self.stack.push(ExecId::ROOT);
        for sample in samples {
            let exec_id = self.map_sample(sample)?;
            out.push(sample.with_id(exec_id));
        }
        Ok(out)
    }

    fn map_sample(&mut self, sample: &Sample<PointId>) -> PerfResult<ExecId> {
        let parent = self.stack.last().copied().unwrap_or(ExecId::ROOT);
        match sample.kind {
            SampleType::ScopeBegin => {
                let id = self.get(parent, sample.id, ExecNodeKind::Scope)?;
                self.stack.push(id);
                Ok(id)
            }
            SampleType::ScopeEnd => {
                if parent.is_root() || self.nodes[parent.index()].point_id != sample.id {
                    return Err(Violation::UnbalancedSamples.into());
                }
                self.stack.pop();
                Ok(parent)
            }
            kind => self.get(parent, sample.id, ExecNodeKind::from_sample_type(kind)),
        }
    }

    /// Converts a tree-keyed log back to the points that produced it.
    pub fn to_point_samples(&self, samples: &[Sample<ExecId>]) -> PerfResult<Vec<Sample<PointId>>> {
        samples
            .iter()
            .map(|sample| match self.nodes.get(sample.id.index()) {
                Some(node) if !sample.id.is_root() => Ok(sample.with_id(node.point_id)),
                _ => Err(Violation::InvalidPoint.into()),
            })
            .collect()
    }

    /// Multiplies every scope timestamp by `scale` (cycles to nanoseconds).
    pub fn scale_cpu_times(samples: &mut [Sample<ExecId>], scale: f64) {
        for sample in samples.iter_mut().filter(|sample| sample.kind.is_scope()) {
            sample.set_value((sample.value as f64 * scale) as u64);
        }
    }

    /// Turns the exclusive gpu times of a frame into inclusive ones.
    ///
    /// Each scope's gpu sample becomes its own measured value plus the totals
    /// of all scopes nested in it; scopes without a gpu sample still pass their
    /// children's totals upwards. Must run exactly once per frame.
    pub fn compute_gpu_times(samples: &mut [Sample<ExecId>]) {
        struct Open {
            gpu_sample: Option<usize>,
            nested: u64,
        }

        let mut open: Vec<Open> = Vec::with_capacity(32);
        for idx in 0..samples.len() {
            match samples[idx].kind {
                SampleType::ScopeBegin => open.push(Open {
                    gpu_sample: None,
                    nested: 0,
                }),
                SampleType::GpuTime => {
                    if let Some(top) = open.last_mut()
                        && top.gpu_sample.is_none()
                    {
                        top.gpu_sample = Some(idx);
                    }
                }
                SampleType::ScopeEnd => {
                    let Some(closed) = open.pop() else {
                        continue;
                    };
                    let mut total = closed.nested;
                    if let Some(gpu_idx) = closed.gpu_sample {
                        total = total.saturating_add(samples[gpu_idx].value);
                        samples[gpu_idx].set_value(total);
                    }
                    if let Some(parent) = open.last_mut() {
                        parent.nested = parent.nested.saturating_add(total);
                    }
                }
                SampleType::Counter => {}
            }
        }
    }

    /// Accumulates one frame's samples into per-node values.
    ///
    /// `values` is grown to the tree size. Only `value` needs resetting between
    /// frames; begin times and instance counts keep accumulating so callers can
    /// average them over a whole window.
    pub fn exec_values(&self, samples: &[Sample<ExecId>], values: &mut Vec<ExecValue>) {
        if values.len() < self.nodes.len() {
            values.resize(self.nodes.len(), ExecValue::default());
        }
        for sample in samples {
            let Some(out) = values.get_mut(sample.id.index()) else {
                continue;
            };
            let value = sample.value as i64;
            if sample.kind == SampleType::ScopeBegin {
                out.value -= value;
                out.begin_time = out.begin_time.wrapping_add(sample.value);
                out.num_instances += 1;
            } else {
                out.value += value;
            }
        }
    }

    /// Flags every node whose whole subtree has zero values.
    ///
    /// Nodes beyond `values` are never empty and are skipped as children.
    pub fn empty_branches(&self, values: &[i64]) -> Vec<bool> {
        let mut out = vec![false; self.nodes.len()];
        let count = values.len().min(self.nodes.len());
        // Children always have larger ids than their parents.
        for idx in (0..count).rev() {
            let empty = values[idx] == 0
                && self.nodes[idx]
                    .children
                    .iter()
                    .filter(|child| child.index() < count)
                    .all(|child| out[child.index()]);
            out[idx] = empty;
        }
        out
    }

    /// Identity of a node derived from its ancestors' point descriptors.
    ///
    /// Unlike the numeric [`ExecId`], this stays the same across process runs
    /// as long as the instrumented call paths do not change.
    pub fn hashed_id(&self, id: ExecId) -> u64 {
        let mut path: SmallVec<[ExecId; 16]> = SmallVec::new();
        let mut cur = id;
        while !cur.is_root() {
            path.push(cur);
            cur = self.nodes[cur.index()].parent_id;
        }

        let mut hash = 0u64;
        for &exec_id in path.iter().rev() {
            let node = &self.nodes[exec_id.index()];
            let mut hasher = FxHasher::default();
            hash.hash(&mut hasher);
            match self.registry.point(node.point_id) {
                Some(point) => {
                    point.func.name.hash(&mut hasher);
                    point.func.args.hash(&mut hasher);
                    point.tag.hash(&mut hasher);
                }
                None => node.point_id.hash(&mut hasher),
            }
            (node.kind as u8).hash(&mut hasher);
            hash = hasher.finish();
        }
        hash
    }

    /// Node lookup.
    pub fn node(&self, id: ExecId) -> Option<&ExecNode> {
        self.nodes.get(id.index())
    }

    /// All nodes, indexed by [`ExecId`].
    pub fn nodes(&self) -> &[ExecNode] {
        &self.nodes
    }

    /// Parent of `id`; the root is its own parent.
    pub fn parent(&self, id: ExecId) -> ExecId {
        self.nodes[id.index()].parent_id
    }

    /// Children of `id` in creation order.
    pub fn children(&self, id: ExecId) -> &[ExecId] {
        &self.nodes[id.index()].children
    }

    /// Distance of `id` from the root.
    pub fn depth(&self, id: ExecId) -> u16 {
        self.nodes[id.index()].depth
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: the root exists from construction.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Approximate heap usage in bytes.
    pub fn used_memory(&self) -> usize {
        let spilled: usize = self
            .nodes
            .iter()
            .filter(|node| node.children.spilled())
            .map(|node| node.children.capacity() * size_of::<ExecId>())
            .sum();
        self.nodes.capacity() * size_of::<ExecNode>() + spilled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::PointKind;

    fn setup(count: usize) -> (ExecTree, Vec<PointId>) {
        let registry = Arc::new(PointRegistry::new());
        let points = (0..count)
            .map(|n| {
                registry
                    .register(PointKind::Scope, "tree.rs", &format!("fn_{n}"), "#", n as u32)
                    .expect("register")
            })
            .collect();
        (ExecTree::new(registry, 16), points)
    }

    fn begin(id: PointId, value: u64) -> Sample<PointId> {
        Sample::new(SampleType::ScopeBegin, id, value)
    }

    fn end(id: PointId, value: u64) -> Sample<PointId> {
        Sample::new(SampleType::ScopeEnd, id, value)
    }

    fn gpu(id: PointId, value: u64) -> Sample<PointId> {
        Sample::new(SampleType::GpuTime, id, value)
    }

    #[test]
    fn tree_is_capped_at_the_exec_id_space() {
        let (mut tree, points) = setup(1);
        let mut parent = ExecId::ROOT;
        for _ in 0..ExecId::MAX {
            parent = tree
                .get(parent, points[0], ExecNodeKind::Scope)
                .expect("exec node");
        }
        assert_eq!(tree.len(), ExecId::MAX as usize + 1);
        assert_eq!(parent, ExecId(ExecId::MAX));

        let err = tree
            .get(parent, points[0], ExecNodeKind::Scope)
            .expect_err("tree is full");
        assert_eq!(
            err,
            PerfError::CapacityExceeded {
                what: "exec nodes",
                limit: 65536
            }
        );
        assert_eq!(tree.len(), ExecId::MAX as usize + 1);
        assert_eq!(
            tree.get(ExecId::ROOT, points[0], ExecNodeKind::Scope)
                .expect("existing node"),
            ExecId(1)
        );
    }

    #[test]
    fn get_is_idempotent() {
        let (mut tree, points) = setup(2);
        let a = tree.get(ExecId::ROOT, points[0], ExecNodeKind::Scope).expect("exec node");
        let b = tree.get(a, points[1], ExecNodeKind::Scope).expect("exec node");
        assert_eq!(tree.get(ExecId::ROOT, points[0], ExecNodeKind::Scope).expect("exec node"), a);
        assert_eq!(tree.get(a, points[1], ExecNodeKind::Scope).expect("exec node"), b);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn distinct_tuples_get_distinct_nodes() {
        let (mut tree, points) = setup(2);
        let a = tree.get(ExecId::ROOT, points[0], ExecNodeKind::Scope).expect("exec node");
        let a_counter = tree.get(ExecId::ROOT, points[0], ExecNodeKind::Counter).expect("exec node");
        let b_under_root = tree.get(ExecId::ROOT, points[1], ExecNodeKind::Scope).expect("exec node");
        let b_under_a = tree.get(a, points[1], ExecNodeKind::Scope).expect("exec node");

        let ids = [a, a_counter, b_under_root, b_under_a];
        for (i, x) in ids.iter().enumerate() {
            for y in &ids[i + 1..] {
                assert_ne!(x, y);
            }
        }
    }

    #[test]
    fn tree_has_single_root_and_no_cycles() {
        let (mut tree, points) = setup(3);
        let samples = [
            begin(points[0], 1),
            begin(points[1], 2),
            begin(points[2], 3),
            end(points[2], 4),
            end(points[1], 5),
            begin(points[2], 6),
            end(points[2], 7),
            end(points[0], 8),
        ];
        tree.to_exec_samples(&samples).expect("mapped samples");

        for (idx, node) in tree.nodes().iter().enumerate().skip(1) {
            assert!(node.parent_id.index() < idx);
            let mut cur = ExecId(idx as u16);
            let mut steps = 0;
            while !cur.is_root() {
                cur = tree.parent(cur);
                steps += 1;
                assert!(steps <= tree.len());
            }
            assert_eq!(steps, node.depth as usize);
        }
        assert_eq!(tree.parent(ExecId::ROOT), ExecId::ROOT);
    }

    #[test]
    fn second_gpu_child_is_rejected() {
        let (mut tree, points) = setup(2);
        let a = tree.get(ExecId::ROOT, points[0], ExecNodeKind::Scope).expect("exec node");
        let gpu_a = tree.get(a, points[0], ExecNodeKind::GpuTime).expect("exec node");
        assert_eq!(tree.node(a).expect("node").gpu_time_id, Some(gpu_a));
        assert_eq!(tree.get(a, points[0], ExecNodeKind::GpuTime).expect("exec node"), gpu_a);

        let err = tree.get(a, points[1], ExecNodeKind::GpuTime).expect_err("rejected");
        assert_eq!(err, PerfError::ProtocolViolation(Violation::DuplicateGpuChild));
    }

    #[test]
    fn gpu_child_must_share_the_scope_point() {
        let (mut tree, points) = setup(2);
        let a = tree.get(ExecId::ROOT, points[0], ExecNodeKind::Scope).expect("exec node");
        let err = tree.get(a, points[1], ExecNodeKind::GpuTime).expect_err("rejected");
        assert_eq!(err, PerfError::ProtocolViolation(Violation::ForeignGpuChild));
    }

    #[test]
    fn leaves_cannot_have_children() {
        let (mut tree, points) = setup(2);
        let counter = tree.get(ExecId::ROOT, points[0], ExecNodeKind::Counter).expect("exec node");
        let err = tree.get(counter, points[1], ExecNodeKind::Scope).expect_err("rejected");
        assert_eq!(err, PerfError::ProtocolViolation(Violation::NonScopeParent));
    }

    #[test]
    fn unbalanced_end_is_rejected() {
        let (mut tree, points) = setup(2);
        let err = tree
            .map_samples(&[begin(points[0], 0), end(points[1], 1)])
            .expect_err("rejected");
        assert_eq!(err, PerfError::ProtocolViolation(Violation::UnbalancedSamples));

        let err = tree.map_samples(&[end(points[0], 1)]).expect_err("rejected");
        assert_eq!(err, PerfError::ProtocolViolation(Violation::UnbalancedSamples));
    }

    #[test]
    fn map_samples_matches_exec_samples() {
        let (mut tree, points) = setup(2);
        let samples = [
            begin(points[0], 0),
            begin(points[1], 1),
            end(points[1], 2),
            end(points[0], 3),
        ];
        let ids = tree.map_samples(&samples).expect("mapped ids");
        let exec = tree.to_exec_samples(&samples).expect("mapped samples");
        assert_eq!(ids, exec.iter().map(|s| s.id).collect::<Vec<_>>());
        assert_eq!(ids[0], ids[3]);
        assert_eq!(ids[1], ids[2]);
        assert_eq!(tree.to_point_samples(&exec).expect("point samples"), samples.to_vec());
    }

    #[test]
    fn gpu_totals_are_sums_of_leaves() {
        // A { B { D }, C }: only D measured anything.
        let (mut tree, p) = setup(4);
        let raw = [
            begin(p[0], 0),
            gpu(p[0], 0),
            begin(p[1], 1),
            gpu(p[1], 0),
            begin(p[3], 2),
            gpu(p[3], 70),
            end(p[3], 3),
            end(p[1], 4),
            begin(p[2], 5),
            end(p[2], 6),
            end(p[0], 7),
        ];
        let mut samples = tree.to_exec_samples(&raw).expect("mapped samples");
        ExecTree::compute_gpu_times(&mut samples);
        assert_eq!(samples[5].value, 70);
        assert_eq!(samples[3].value, 70);
        assert_eq!(samples[1].value, 70);
    }

    #[test]
    fn gpu_totals_include_own_time_and_pass_through_plain_scopes() {
        let (mut tree, p) = setup(3);
        let raw = [
            begin(p[0], 0),
            gpu(p[0], 5),
            begin(p[1], 1),
            begin(p[2], 2),
            gpu(p[2], 20),
            end(p[2], 3),
            end(p[1], 4),
            begin(p[2], 5),
            gpu(p[2], 7),
            end(p[2], 6),
            end(p[0], 7),
        ];
        let mut samples = tree.to_exec_samples(&raw).expect("mapped samples");
        ExecTree::compute_gpu_times(&mut samples);
        assert_eq!(samples[4].value, 20);
        assert_eq!(samples[8].value, 7);
        assert_eq!(samples[1].value, 5 + 20 + 7);
    }

    #[test]
    fn exec_values_sum_recursive_instances() {
        let (mut tree, p) = setup(2);
        let raw = [
            begin(p[0], 10),
            begin(p[1], 12),
            end(p[1], 15),
            begin(p[1], 20),
            end(p[1], 30),
            end(p[0], 40),
        ];
        let samples = tree.to_exec_samples(&raw).expect("mapped samples");
        let mut values = Vec::new();
        tree.exec_values(&samples, &mut values);

        let a = samples[0].id.index();
        let b = samples[1].id.index();
        assert_eq!(values.len(), tree.len());
        assert_eq!(values[a].value, 30);
        assert_eq!(values[b].value, 3 + 10);
        assert_eq!(values[b].num_instances, 2);
        assert_eq!(values[b].begin_time, 32);
    }

    #[test]
    fn empty_branches_are_all_zero_subtrees() {
        let (mut tree, p) = setup(3);
        let a = tree.get(ExecId::ROOT, p[0], ExecNodeKind::Scope).expect("exec node");
        let b = tree.get(a, p[1], ExecNodeKind::Scope).expect("exec node");
        let c = tree.get(ExecId::ROOT, p[2], ExecNodeKind::Scope).expect("exec node");

        let mut values = vec![0i64; tree.len()];
        values[c.index()] = 4;
        let empty = tree.empty_branches(&values);
        assert!(empty[a.index()]);
        assert!(empty[b.index()]);
        assert!(!empty[c.index()]);
        assert!(!empty[ExecId::ROOT.index()]);

        values[c.index()] = 0;
        values[b.index()] = 1;
        let empty = tree.empty_branches(&values);
        assert!(!empty[a.index()]);
        assert!(empty[c.index()]);

        assert!(tree.empty_branches(&[]).iter().all(|&e| !e));
    }

    #[test]
    fn hashed_id_follows_the_call_path() {
        let (mut tree_a, p) = setup(2);
        let a = tree_a.get(ExecId::ROOT, p[0], ExecNodeKind::Scope).expect("exec node");
        let ab = tree_a.get(a, p[1], ExecNodeKind::Scope).expect("exec node");
        let b = tree_a.get(ExecId::ROOT, p[1], ExecNodeKind::Scope).expect("exec node");

        // Same descriptors registered in a different order and tree built differently.
        let registry = Arc::new(PointRegistry::new());
        let q1 = registry
            .register(PointKind::Scope, "tree.rs", "fn_1", "#", 1)
            .expect("register");
        let q0 = registry
            .register(PointKind::Scope, "tree.rs", "fn_0", "#", 0)
            .expect("register");
        let mut tree_b = ExecTree::new(registry, 4);
        let b2 = tree_b.get(ExecId::ROOT, q1, ExecNodeKind::Scope).expect("exec node");
        let a2 = tree_b.get(ExecId::ROOT, q0, ExecNodeKind::Scope).expect("exec node");
        let ab2 = tree_b.get(a2, q1, ExecNodeKind::Scope).expect("exec node");

        assert_eq!(tree_a.hashed_id(ExecId::ROOT), 0);
        assert_eq!(tree_a.hashed_id(a), tree_b.hashed_id(a2));
        assert_eq!(tree_a.hashed_id(ab), tree_b.hashed_id(ab2));
        assert_eq!(tree_a.hashed_id(b), tree_b.hashed_id(b2));
        assert_ne!(tree_a.hashed_id(ab), tree_a.hashed_id(b));
    }

    #[test]
    fn scaling_touches_only_scope_samples() {
        let mut samples = vec![
            Sample::new(SampleType::ScopeBegin, ExecId(1), 100),
            Sample::new(SampleType::GpuTime, ExecId(2), 100),
            Sample::new(SampleType::Counter, ExecId(3), 100),
            Sample::new(SampleType::ScopeEnd, ExecId(1), 300),
        ];
        ExecTree::scale_cpu_times(&mut samples, 0.5);
        let values: Vec<u64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![50, 100, 100, 150]);
    }
}
