//! Multi-queue command list scheduling.
//!
//! A [`FrameSchedule`] owns the command lists of one frame. Lists are begun
//! on the submitting thread in dependency order, may be recorded from worker
//! threads in any order, and are submitted together at the end of the frame.
//!
//! # Lifecycle
//!
//! ```
//! use lumen_graphics::scheduler::{Command, FrameSchedule, QueueType};
//!
//! let mut schedule = FrameSchedule::new();
//!
//! let prepare = schedule.begin_command_list("prepare_frame", QueueType::Graphics);
//! let effects = schedule.begin_command_list("compute_effects", QueueType::Compute);
//! schedule.wait_command_list(effects, prepare);
//!
//! // Recording only needs shared access, so jobs can record concurrently.
//! schedule.record(prepare, Command::Dispatch { label: "frame_constants" });
//! schedule.record(effects, Command::Dispatch { label: "ssao" });
//!
//! let report = schedule.submit().unwrap();
//! assert!(report.waits_on("compute_effects", "prepare_frame"));
//! schedule.recycle(report);
//! ```
//!
//! # Module Contents
//!
//! - [`FrameSchedule`] - Begins, records and submits command lists
//! - [`CommandList`] - Handle to a list begun this frame
//! - [`FrameReport`] - Everything a submitted frame recorded
//! - [`Semaphore`] / [`Fence`] - Queue and CPU synchronization

mod command;
mod sync;

pub use command::Command;
pub use sync::{Fence, FenceStatus, Semaphore};

use std::sync::Arc;

use lumen_core::pool::FramePool;
use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::resources::{Barrier, Texture};

/// Hardware queue a command list executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueType {
    Graphics,
    Compute,
    Copy,
    VideoDecode,
}

impl QueueType {
    /// Number of queue types.
    pub const COUNT: usize = 4;

    /// All queue types in index order.
    pub const ALL: [Self; Self::COUNT] = [Self::Graphics, Self::Compute, Self::Copy, Self::VideoDecode];

    fn index(self) -> usize {
        self as usize
    }

    /// Lower-case name for logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Graphics => "graphics",
            Self::Compute => "compute",
            Self::Copy => "copy",
            Self::VideoDecode => "video_decode",
        }
    }
}

/// Handle to a command list begun in the current frame.
///
/// Handles are only valid until the frame is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandList {
    index: u32,
    queue: QueueType,
    frame: u64,
}

impl CommandList {
    /// Queue the list executes on.
    pub fn queue(&self) -> QueueType {
        self.queue
    }

    /// Position of the list in begin order.
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

#[derive(Debug)]
struct ListRecord {
    name: String,
    queue: QueueType,
    waits: Vec<u32>,
    signal: Semaphore,
    commands: Mutex<Vec<Command>>,
}

/// Command lists of the frame being built.
#[derive(Debug)]
pub struct FrameSchedule {
    lists: Vec<ListRecord>,
    timelines: [u64; QueueType::COUNT],
    frame_index: u64,
    command_pool: FramePool<Vec<Command>>,
    fence: Option<Fence>,
}

impl FrameSchedule {
    pub fn new() -> Self {
        Self {
            lists: Vec::new(),
            timelines: [0; QueueType::COUNT],
            frame_index: 0,
            command_pool: FramePool::new(),
            fence: None,
        }
    }

    /// Begin a new command list on `queue`.
    ///
    /// Lists must be begun in an order where every dependency is begun first.
    pub fn begin_command_list(&mut self, name: impl Into<String>, queue: QueueType) -> CommandList {
        let name = name.into();
        let timeline = &mut self.timelines[queue.index()];
        *timeline += 1;
        let signal = Semaphore::new(queue, *timeline);

        let handle = CommandList {
            index: self.lists.len() as u32,
            queue,
            frame: self.frame_index,
        };
        log::trace!(
            "FrameSchedule: begin '{name}' on {} (list {})",
            queue.name(),
            handle.index
        );
        self.lists.push(ListRecord {
            name,
            queue,
            waits: Vec::new(),
            signal,
            commands: Mutex::new(self.command_pool.acquire()),
        });
        handle
    }

    /// Make `dependent` wait for `dependency` to finish on the GPU.
    ///
    /// # Panics
    ///
    /// Panics if either handle is invalid, if `dependency` was not begun
    /// before `dependent`, or if both lists are on the same queue (which
    /// is already ordered).
    pub fn wait_command_list(&mut self, dependent: CommandList, dependency: CommandList) {
        self.validate(dependent);
        self.validate(dependency);
        assert!(
            dependency.index < dependent.index,
            "Command list can only wait on an earlier list"
        );
        assert!(
            dependency.queue != dependent.queue,
            "Lists on the same queue are already ordered"
        );

        let waits = &mut self.lists[dependent.index()].waits;
        if !waits.contains(&dependency.index) {
            waits.push(dependency.index);
        }
    }

    /// Append a command to `list`.
    ///
    /// Takes `&self`: jobs recording different lists only contend on their
    /// own list's lock.
    pub fn record(&self, list: CommandList, command: Command) {
        self.validate(list);
        self.lists[list.index()].commands.lock().push(command);
    }

    /// Append several commands to `list` under one lock.
    pub fn record_all(&self, list: CommandList, commands: impl IntoIterator<Item = Command>) {
        self.validate(list);
        self.lists[list.index()].commands.lock().extend(commands);
    }

    /// Number of commands recorded so far into `list`.
    pub fn command_count(&self, list: CommandList) -> usize {
        self.validate(list);
        self.lists[list.index()].commands.lock().len()
    }

    /// Number of lists begun this frame.
    pub fn list_count(&self) -> usize {
        self.lists.len()
    }

    /// Index of the frame being built.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Fence of the most recent submission.
    pub fn fence(&self) -> Option<&Fence> {
        self.fence.as_ref()
    }

    /// Submit every list begun this frame and start the next frame.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::CyclicDependency`] if the waits do not form
    /// a DAG. Waits are only accepted towards earlier lists, so this guards
    /// against internal inconsistencies rather than user error.
    pub fn submit(&mut self) -> Result<FrameReport, GraphicsError> {
        lumen_core::profile_scope!("FrameSchedule::submit");

        let lists: Vec<SubmittedList> = self
            .lists
            .drain(..)
            .map(|record| SubmittedList {
                name: record.name,
                queue: record.queue,
                waits: record.waits.iter().map(|&w| w as usize).collect(),
                signal: record.signal,
                commands: record.commands.into_inner(),
            })
            .collect();

        let report = FrameReport {
            frame_index: self.frame_index,
            lists,
            last_postprocess: None,
        };
        report.submission_order()?;

        for list in &report.lists {
            log::trace!(
                "GPU submit '{}' on {}: {} commands, waits={:?}, signal={}",
                list.name,
                list.queue.name(),
                list.commands.len(),
                list.waits,
                list.signal.value()
            );
        }

        let fence = Fence::new_unsignaled();
        fence.signal();
        self.fence = Some(fence);
        self.frame_index += 1;
        Ok(report)
    }

    /// Return a report's command storage for reuse.
    pub fn recycle(&mut self, report: FrameReport) {
        for list in report.lists {
            self.command_pool.recycle(list.commands);
        }
    }

    /// Drop all lists begun this frame without submitting them.
    pub fn discard(&mut self) {
        for record in self.lists.drain(..) {
            self.command_pool.recycle(record.commands.into_inner());
        }
        self.frame_index += 1;
    }

    fn validate(&self, list: CommandList) {
        assert!(
            list.frame == self.frame_index && list.index() < self.lists.len(),
            "Invalid command list handle"
        );
    }
}

impl Default for FrameSchedule {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(FrameSchedule: Send, Sync);

/// A submitted command list.
#[derive(Debug)]
pub struct SubmittedList {
    pub name: String,
    pub queue: QueueType,
    /// Indices of the lists this one waited for.
    pub waits: Vec<usize>,
    pub signal: Semaphore,
    pub commands: Vec<Command>,
}

impl SubmittedList {
    /// Names of effects invoked by this list, in recording order.
    pub fn effects(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.iter().filter_map(Command::effect_name)
    }
}

/// Everything one frame submitted.
#[derive(Debug)]
pub struct FrameReport {
    pub frame_index: u64,
    lists: Vec<SubmittedList>,
    /// Final image of the postprocess chain, set by the render path.
    pub last_postprocess: Option<Arc<Texture>>,
}

impl FrameReport {
    /// Submitted lists in begin order.
    pub fn lists(&self) -> &[SubmittedList] {
        &self.lists
    }

    /// Names of submitted lists in begin order.
    pub fn list_names(&self) -> Vec<&str> {
        self.lists.iter().map(|l| l.name.as_str()).collect()
    }

    /// Look up a list by name.
    pub fn find(&self, name: &str) -> Option<&SubmittedList> {
        self.lists.iter().find(|l| l.name == name)
    }

    /// Position of a list by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.lists.iter().position(|l| l.name == name)
    }

    /// Whether `dependent` waits directly on `dependency`.
    pub fn waits_on(&self, dependent: &str, dependency: &str) -> bool {
        match (self.index_of(dependent), self.index_of(dependency)) {
            (Some(d), Some(on)) => self.lists[d].waits.contains(&on),
            _ => false,
        }
    }

    /// All `(dependent, dependency)` wait edges.
    pub fn wait_edges(&self) -> Vec<(usize, usize)> {
        self.lists
            .iter()
            .enumerate()
            .flat_map(|(i, list)| list.waits.iter().map(move |&w| (i, w)))
            .collect()
    }

    /// Aliasing barriers in submission order.
    pub fn aliasing_barriers(&self) -> impl Iterator<Item = (&str, &Barrier)> {
        self.lists.iter().flat_map(|list| {
            list.commands.iter().filter_map(move |command| match command {
                Command::Barrier(barrier) if barrier.is_aliasing() => Some((list.name.as_str(), barrier)),
                _ => None,
            })
        })
    }

    /// Every effect invoked this frame, in submission order.
    pub fn effects(&self) -> Vec<&'static str> {
        self.lists.iter().flat_map(SubmittedList::effects).collect()
    }

    /// Total recorded commands.
    pub fn command_count(&self) -> usize {
        self.lists.iter().map(|l| l.commands.len()).sum()
    }

    /// A valid execution order of the lists respecting waits and per-queue order.
    pub fn submission_order(&self) -> Result<Vec<usize>, GraphicsError> {
        let n = self.lists.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut last_on_queue: [Option<usize>; QueueType::COUNT] = [None; QueueType::COUNT];

        for (i, list) in self.lists.iter().enumerate() {
            let mut edges: Vec<usize> = list.waits.clone();
            if let Some(previous) = last_on_queue[list.queue.index()] {
                edges.push(previous);
            }
            last_on_queue[list.queue.index()] = Some(i);
            for dependency in edges {
                if dependency >= n {
                    return Err(GraphicsError::Internal(format!(
                        "list '{}' waits on unknown list {dependency}",
                        list.name
                    )));
                }
                dependents[dependency].push(i);
                in_degree[i] += 1;
            }
        }

        let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).rev().collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop() {
            order.push(i);
            for &dependent in dependents[i].iter().rev() {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(dependent);
                }
            }
        }

        if order.len() != n {
            let involved = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.lists[i].name.clone())
                .collect();
            return Err(GraphicsError::CyclicDependency(involved));
        }
        Ok(order)
    }

    /// One line per list with its queue, waits and commands.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for list in &self.lists {
            let waits: Vec<&str> = list.waits.iter().map(|&w| self.lists[w].name.as_str()).collect();
            out.push_str(&format!(
                "[{}] {} waits={:?} commands={}\n",
                list.queue.name(),
                list.name,
                waits,
                list.commands.len()
            ));
            for command in &list.commands {
                out.push_str(&format!("    {}\n", command.label()));
            }
        }
        out
    }
}
