//! Frame graph compilation.
//!
//! Turns a [`FrameGraph`](crate::graph::FrameGraph) into a [`CompiledFrame`]:
//!
//! 1. **Topological sort** - Kahn's algorithm with a min-heap on insertion
//!    index, so the order is deterministic and keeps insertion order wherever
//!    dependencies allow.
//! 2. **Cycle detection** - reports the names of every job left unsorted.
//! 3. **Wait derivation** - cross-queue dependencies become command list
//!    waits, minus those already implied by another path (a transitive
//!    reduction that also accounts for in-order execution on each queue).
//!
//! # Example
//!
//! ```
//! use lumen_graphics::graph::FrameGraph;
//! use lumen_graphics::scheduler::QueueType;
//!
//! let mut graph = FrameGraph::<&str>::new();
//! let prepare = graph.add_job("prepare", QueueType::Graphics, &[], &["constants"]);
//! let effects = graph.add_job("effects", QueueType::Compute, &["constants"], &["ao"]);
//! let opaque = graph.add_job("opaque", QueueType::Graphics, &["ao"], &["color"]);
//!
//! let compiled = graph.compile().unwrap();
//! assert_eq!(compiled.order(), &[prepare, effects, opaque]);
//! assert_eq!(compiled.waits(), &[(effects, prepare), (opaque, effects)]);
//! ```

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use lumen_core::pool::Poolable;

use crate::error::GraphicsError;
use crate::graph::{JobHandle, JobNode};
use crate::scheduler::QueueType;

/// A compiled frame graph ready for command list creation.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CompiledFrame {
    order: Vec<JobHandle>,
    waits: Vec<(JobHandle, JobHandle)>,
}

impl CompiledFrame {
    /// Job execution order. Command lists are begun in this order.
    pub fn order(&self) -> &[JobHandle] {
        &self.order
    }

    /// Minimal `(dependent, dependency)` cross-queue waits.
    pub fn waits(&self) -> &[(JobHandle, JobHandle)] {
        &self.waits
    }

    /// Get the number of jobs in the compiled frame.
    pub fn job_count(&self) -> usize {
        self.order.len()
    }

    /// Check if the compiled frame is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Poolable for CompiledFrame {
    fn new_empty() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.order.clear();
        self.waits.clear();
    }
}

/// Errors that can occur during graph compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The graph contains a cyclic dependency between the named jobs.
    CyclicDependency { involved: Vec<String> },

    /// An invalid job handle was encountered.
    InvalidJobHandle(JobHandle),
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CyclicDependency { involved } => {
                write!(f, "frame graph contains cyclic dependency: {}", involved.join(", "))
            }
            Self::InvalidJobHandle(handle) => write!(f, "invalid job handle: {handle:?}"),
        }
    }
}

impl std::error::Error for GraphError {}

impl From<GraphError> for GraphicsError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::CyclicDependency { involved } => Self::CyclicDependency(involved),
            GraphError::InvalidJobHandle(handle) => {
                Self::Internal(format!("invalid job handle: {handle:?}"))
            }
        }
    }
}

/// Compile jobs and `(dependent, dependency)` edges into `target`, reusing
/// its allocations.
pub(crate) fn compile_into<R>(
    jobs: &[JobNode<R>],
    edges: &[(JobHandle, JobHandle)],
    target: &mut CompiledFrame,
) -> Result<(), GraphError> {
    target.reset();
    let n = jobs.len();
    if n == 0 {
        return Ok(());
    }

    let mut in_degree = vec![0u32; n];
    let mut dependents: Vec<Vec<u32>> = vec![Vec::new(); n];
    for &(dependent, dependency) in edges {
        if dependent.index() >= n {
            return Err(GraphError::InvalidJobHandle(dependent));
        }
        if dependency.index() >= n {
            return Err(GraphError::InvalidJobHandle(dependency));
        }
        in_degree[dependent.index()] += 1;
        dependents[dependency.index()].push(dependent.0);
    }

    let mut ready: BinaryHeap<Reverse<u32>> = (0..n as u32)
        .filter(|&i| in_degree[i as usize] == 0)
        .map(Reverse)
        .collect();

    while let Some(Reverse(index)) = ready.pop() {
        target.order.push(JobHandle(index));
        for &dependent in &dependents[index as usize] {
            in_degree[dependent as usize] -= 1;
            if in_degree[dependent as usize] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if target.order.len() != n {
        target.order.clear();
        let involved = (0..n)
            .filter(|&i| in_degree[i] > 0)
            .map(|i| jobs[i].name().to_string())
            .collect();
        return Err(GraphError::CyclicDependency { involved });
    }

    derive_waits(jobs, edges, target);
    Ok(())
}

/// Fixed-size bitset over job positions.
#[derive(Clone)]
struct Ancestors(Vec<u64>);

impl Ancestors {
    fn new(n: usize) -> Self {
        Self(vec![0; n.div_ceil(64)])
    }

    fn insert(&mut self, i: usize) {
        self.0[i / 64] |= 1 << (i % 64);
    }

    fn contains(&self, i: usize) -> bool {
        self.0[i / 64] & (1 << (i % 64)) != 0
    }

    fn union_with(&mut self, other: &Self) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }
}

fn derive_waits<R>(jobs: &[JobNode<R>], edges: &[(JobHandle, JobHandle)], target: &mut CompiledFrame) {
    let n = jobs.len();
    let mut position = vec![0usize; n];
    for (pos, handle) in target.order.iter().enumerate() {
        position[handle.index()] = pos;
    }

    // Predecessors by position: explicit edges plus the previous job on the same queue.
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut last_on_queue: [Option<usize>; QueueType::COUNT] = [None; QueueType::COUNT];
    let mut queue_prev: Vec<Option<usize>> = vec![None; n];
    for (pos, handle) in target.order.iter().enumerate() {
        let queue = jobs[handle.index()].queue() as usize;
        queue_prev[pos] = last_on_queue[queue];
        last_on_queue[queue] = Some(pos);
    }
    for &(dependent, dependency) in edges {
        let d = position[dependent.index()];
        let on = position[dependency.index()];
        if !preds[d].contains(&on) {
            preds[d].push(on);
        }
    }

    let mut ancestors: Vec<Ancestors> = Vec::with_capacity(n);
    for pos in 0..n {
        let job = &jobs[target.order[pos].index()];
        let mut all_preds = preds[pos].clone();
        if let Some(prev) = queue_prev[pos]
            && !all_preds.contains(&prev)
        {
            all_preds.push(prev);
        }

        let mut own = Ancestors::new(n);
        for &p in &all_preds {
            own.union_with(&ancestors[p]);
            own.insert(p);
        }

        let mut kept: Vec<usize> = preds[pos]
            .iter()
            .copied()
            .filter(|&p| jobs[target.order[p].index()].queue() != job.queue())
            .filter(|&p| {
                !all_preds
                    .iter()
                    .any(|&other| other != p && ancestors[other].contains(p))
            })
            .collect();
        kept.sort_unstable();
        for p in kept {
            target.waits.push((target.order[pos], target.order[p]));
        }

        ancestors.push(own);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FrameGraph;

    #[test]
    fn test_compile_empty_graph() {
        let graph = FrameGraph::<u32>::new();
        let compiled = graph.compile().unwrap();
        assert!(compiled.is_empty());
        assert_eq!(compiled.job_count(), 0);
    }

    #[test]
    fn test_compile_single_job() {
        let mut graph = FrameGraph::<u32>::new();
        let job = graph.add_job("main", QueueType::Graphics, &[], &[]);
        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.order(), &[job]);
        assert!(compiled.waits().is_empty());
    }

    #[test]
    fn test_compile_linear_chain() {
        let mut graph = FrameGraph::<u32>::new();
        let a = graph.add_job("A", QueueType::Graphics, &[], &[]);
        let b = graph.add_job("B", QueueType::Graphics, &[], &[]);
        let c = graph.add_job("C", QueueType::Graphics, &[], &[]);
        graph.add_dependency(b, a);
        graph.add_dependency(c, b);

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.order(), &[a, b, c]);
        assert!(compiled.waits().is_empty());
    }

    #[test]
    fn test_compile_backward_dependency_reorders() {
        let mut graph = FrameGraph::<u32>::new();
        let a = graph.add_job("A", QueueType::Graphics, &[], &[]);
        let b = graph.add_job("B", QueueType::Graphics, &[], &[]);
        graph.add_dependency(a, b);

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.order(), &[b, a]);
    }

    #[test]
    fn test_compile_independent_jobs_keep_insertion_order() {
        let mut graph = FrameGraph::<u32>::new();
        let handles: Vec<JobHandle> = (0..5)
            .map(|i| graph.add_job(format!("job{i}"), QueueType::Graphics, &[], &[]))
            .collect();
        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.order(), handles.as_slice());
    }

    #[test]
    fn test_compile_cycle_reports_involved_jobs() {
        let mut graph = FrameGraph::<u32>::new();
        let a = graph.add_job("A", QueueType::Graphics, &[], &[]);
        let b = graph.add_job("B", QueueType::Graphics, &[], &[]);
        let c = graph.add_job("C", QueueType::Graphics, &[], &[]);
        let _free = graph.add_job("D", QueueType::Graphics, &[], &[]);
        graph.add_dependency(b, a);
        graph.add_dependency(c, b);
        graph.add_dependency(a, c);

        match graph.compile() {
            Err(GraphError::CyclicDependency { involved }) => {
                assert_eq!(involved, vec!["A", "B", "C"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_waits_skip_same_queue_edges() {
        let mut graph = FrameGraph::<u32>::new();
        graph.add_job("A", QueueType::Graphics, &[], &[1]);
        graph.add_job("B", QueueType::Graphics, &[1], &[]);
        let compiled = graph.compile().unwrap();
        assert!(compiled.waits().is_empty());
    }

    #[test]
    fn test_waits_drop_transitively_implied_edges() {
        // A(gfx) -> B(compute) -> C(gfx), and C also reads A's output directly.
        let mut graph = FrameGraph::<u32>::new();
        let a = graph.add_job("A", QueueType::Graphics, &[], &[1]);
        let b = graph.add_job("B", QueueType::Compute, &[1], &[2]);
        let c = graph.add_job("C", QueueType::Graphics, &[1, 2], &[]);
        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.waits(), &[(b, a), (c, b)]);
    }

    #[test]
    fn test_waits_implied_by_queue_order() {
        // B waits on A. C runs after B on compute and reads A: already ordered.
        let mut graph = FrameGraph::<u32>::new();
        let a = graph.add_job("A", QueueType::Graphics, &[], &[1]);
        let b = graph.add_job("B", QueueType::Compute, &[1], &[]);
        let _c = graph.add_job("C", QueueType::Compute, &[1], &[]);
        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.waits(), &[(b, a)]);
    }

    #[test]
    fn test_waits_from_multiple_queues() {
        let mut graph = FrameGraph::<u32>::new();
        let copy = graph.add_job("copy", QueueType::Copy, &[], &[1]);
        let video = graph.add_job("video", QueueType::VideoDecode, &[], &[2]);
        let gfx = graph.add_job("gfx", QueueType::Graphics, &[1, 2], &[]);
        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.waits(), &[(gfx, copy), (gfx, video)]);
    }

    #[test]
    fn test_compile_into_reuses_allocation() {
        let mut graph = FrameGraph::<u32>::new();
        graph.add_job("A", QueueType::Graphics, &[], &[]);
        let mut compiled = CompiledFrame::default();
        graph.compile_into(&mut compiled).unwrap();
        assert_eq!(compiled.job_count(), 1);

        graph.clear();
        graph.compile_into(&mut compiled).unwrap();
        assert!(compiled.is_empty());
    }

    #[test]
    fn test_graph_error_converts() {
        let err: GraphicsError = GraphError::CyclicDependency {
            involved: vec!["A".into()],
        }
        .into();
        assert_eq!(err, GraphicsError::CyclicDependency(vec!["A".into()]));
    }
}
