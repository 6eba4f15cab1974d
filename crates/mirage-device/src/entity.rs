//! Execution entities performing memory accesses
//!
//! An access is attributed either to a single work-item (carrying its
//! global index, group index, and current instruction) or to a whole
//! work-group (implicit group-wide operations such as asynchronous
//! copies, which carry no instruction).

use crate::memory::MemoryId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to an instruction, for source/IR attribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstructionHandle(pub u64);

impl InstructionHandle {
    /// Create a new instruction handle
    pub const fn new(id: u64) -> Self {
        InstructionHandle(id)
    }
}

impl fmt::Display for InstructionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A work-item as seen at one memory event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemView {
    /// Linear global index of the work-item
    pub global_index: usize,
    /// Linear index of the work-item's group
    pub group_index: usize,
    /// Instruction the work-item is currently executing
    pub instruction: InstructionHandle,
}

/// A work-group as seen at one memory or barrier event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkGroupView {
    /// Linear index of the group
    pub group_index: usize,
    /// Identity of the group's local memory arena
    pub local_memory: MemoryId,
}

/// The entity responsible for a memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entity {
    WorkItem(WorkItemView),
    WorkGroup(WorkGroupView),
}

impl Entity {
    /// Group index of the accessor (a work-item reports its group)
    pub const fn group_index(&self) -> usize {
        match self {
            Entity::WorkItem(item) => item.group_index,
            Entity::WorkGroup(group) => group.group_index,
        }
    }

    /// Global work-item index, if the accessor is a work-item
    pub const fn work_item_index(&self) -> Option<usize> {
        match self {
            Entity::WorkItem(item) => Some(item.global_index),
            Entity::WorkGroup(_) => None,
        }
    }

    /// Current instruction, if the accessor is a work-item
    pub const fn instruction(&self) -> Option<InstructionHandle> {
        match self {
            Entity::WorkItem(item) => Some(item.instruction),
            Entity::WorkGroup(_) => None,
        }
    }
}
