//! Frame graph infrastructure.
//!
//! A [`FrameGraph`] describes the jobs of one frame and the resources each
//! job reads and writes. Dependencies are derived from those declarations as
//! jobs are added:
//!
//! - **read after write** - a reader depends on the resource's last writer
//! - **write after write** - a writer depends on the previous writer
//! - **write after read** - a writer depends on every reader since the
//!   previous write
//!
//! Dependencies that are not expressed through a resource (for example a
//! query heap filled by one job and resolved by another) are added with
//! [`FrameGraph::add_dependency`].
//!
//! The resource key `R` is any small copyable identifier. Resources that
//! share memory must map to the same key so the derived edges serialize
//! their uses.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::compiler::{CompiledFrame, GraphError, compile_into};
use crate::scheduler::QueueType;

/// Handle to a job in the frame graph.
///
/// `JobHandle` is `Copy` and cheap to pass around. It is only valid within
/// the `FrameGraph` that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobHandle(pub(crate) u32);

impl JobHandle {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A job with its declared accesses.
#[derive(Debug, Clone)]
pub struct JobNode<R> {
    name: String,
    queue: QueueType,
    reads: Vec<R>,
    writes: Vec<R>,
}

impl<R> JobNode<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> QueueType {
        self.queue
    }

    pub fn reads(&self) -> &[R] {
        &self.reads
    }

    pub fn writes(&self) -> &[R] {
        &self.writes
    }
}

/// The jobs of one frame with derived dependencies.
#[derive(Debug)]
pub struct FrameGraph<R> {
    jobs: Vec<JobNode<R>>,
    /// Dependency edges stored as (dependent, dependency) pairs.
    edges: Vec<(JobHandle, JobHandle)>,
    last_writer: HashMap<R, JobHandle>,
    readers: HashMap<R, Vec<JobHandle>>,
}

impl<R> Default for FrameGraph<R> {
    fn default() -> Self {
        Self {
            jobs: Vec::new(),
            edges: Vec::new(),
            last_writer: HashMap::new(),
            readers: HashMap::new(),
        }
    }
}

impl<R: Copy + Eq + Hash + Debug> FrameGraph<R> {
    /// Create a new empty frame graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job and derive its dependencies from `reads` and `writes`.
    pub fn add_job(
        &mut self,
        name: impl Into<String>,
        queue: QueueType,
        reads: &[R],
        writes: &[R],
    ) -> JobHandle {
        let handle = JobHandle(self.jobs.len() as u32);
        let mut dependencies: Vec<JobHandle> = Vec::new();

        for resource in reads {
            if let Some(&writer) = self.last_writer.get(resource) {
                dependencies.push(writer);
            }
        }
        for resource in writes {
            if let Some(&writer) = self.last_writer.get(resource) {
                dependencies.push(writer);
            }
            if let Some(readers) = self.readers.get(resource) {
                dependencies.extend(readers.iter().copied());
            }
        }

        for resource in reads {
            self.readers.entry(*resource).or_default().push(handle);
        }
        for resource in writes {
            self.last_writer.insert(*resource, handle);
            self.readers.remove(resource);
        }

        dependencies.sort_unstable();
        dependencies.dedup();
        for dependency in dependencies {
            if dependency != handle {
                self.edges.push((handle, dependency));
            }
        }

        self.jobs.push(JobNode {
            name: name.into(),
            queue,
            reads: reads.to_vec(),
            writes: writes.to_vec(),
        });
        handle
    }

    /// Add a dependency between jobs that no resource declaration expresses.
    ///
    /// The `dependent` job will execute after the `dependency` job.
    pub fn add_dependency(&mut self, dependent: JobHandle, dependency: JobHandle) {
        assert!(dependent.index() < self.jobs.len(), "Invalid dependent handle");
        assert!(dependency.index() < self.jobs.len(), "Invalid dependency handle");
        assert!(dependent != dependency, "Pass cannot depend on itself");

        let exists = self
            .edges
            .iter()
            .any(|&(d, dep)| d == dependent && dep == dependency);
        if !exists {
            self.edges.push((dependent, dependency));
        }
    }

    /// Get dependencies of a job.
    pub fn dependencies(&self, handle: JobHandle) -> impl Iterator<Item = JobHandle> + '_ {
        self.edges
            .iter()
            .filter(move |&&(dependent, _)| dependent == handle)
            .map(|&(_, dependency)| dependency)
    }

    /// Get the number of dependencies for a job.
    pub fn dependency_count(&self, handle: JobHandle) -> usize {
        self.dependencies(handle).count()
    }

    /// Get a job by handle.
    pub fn job(&self, handle: JobHandle) -> &JobNode<R> {
        &self.jobs[handle.index()]
    }

    /// Get all jobs in insertion order.
    pub fn jobs(&self) -> &[JobNode<R>] {
        &self.jobs
    }

    /// Get all dependency edges.
    pub fn edges(&self) -> &[(JobHandle, JobHandle)] {
        &self.edges
    }

    /// Get the number of jobs in the graph.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Compile the graph into an execution order and cross-queue waits.
    pub fn compile(&self) -> Result<CompiledFrame, GraphError> {
        let mut result = CompiledFrame::default();
        compile_into(&self.jobs, &self.edges, &mut result)?;
        Ok(result)
    }

    /// In-place variant of [`compile`](Self::compile).
    pub fn compile_into(&self, target: &mut CompiledFrame) -> Result<(), GraphError> {
        compile_into(&self.jobs, &self.edges, target)
    }

    /// Clear all jobs, keeping allocations.
    pub fn clear(&mut self) {
        self.jobs.clear();
        self.edges.clear();
        self.last_writer.clear();
        self.readers.clear();
    }
}
