//! # Task Queue Entries
//!
//! Entries flowing through the dispatcher's task queue and result channel.

use std::fmt;

use crate::domain::{ItemReference, Record, TaskFailure, WorkerId};

/// One entry of the task queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkEntry {
    /// Extract one item
    Task(ItemReference),
    /// The receiving worker releases its session and exits
    Stop,
}

impl fmt::Display for WorkEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task(item) => write!(f, "task #{} ({})", item.sequence_index, item.url),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// What a worker pushes onto the result channel for each task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerReport {
    Completed(Record),
    Failed(TaskFailure),
}

/// Why a worker stopped pulling work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Received its termination marker
    Stopped,
    /// Its session could not be started
    SessionInitFailed,
    /// The queue closed before a termination marker arrived
    QueueClosed,
}

/// Per-worker outcome collected when the worker task is joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub worker_id: WorkerId,
    pub processed: usize,
    pub failed: usize,
    pub session_started: bool,
    pub exit: WorkerExit,
}

impl WorkerSummary {
    pub(crate) const fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            processed: 0,
            failed: 0,
            session_started: false,
            exit: WorkerExit::QueueClosed,
        }
    }
}
