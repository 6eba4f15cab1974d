//! Race reports and report sinks
//!
//! A detected race names both participating entities. The current accessor
//! is known directly; the previous one is reconstructed from the shadow
//! state by decoding its recorded linear index against the dimensions of
//! the active kernel invocation.

use mirage_device::{AddressSpace, Dim3, InstructionHandle, KernelInvocation};
use serde::Serialize;
use std::fmt;

/// Classification of a detected race
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RaceKind {
    /// A read and a write conflicted (including atomic vs non-atomic)
    ReadWrite,
    /// Two writes conflicted
    WriteWrite,
}

impl fmt::Display for RaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceKind::ReadWrite => write!(f, "Read-write"),
            RaceKind::WriteWrite => write!(f, "Write-write"),
        }
    }
}

/// Coordinates of one race participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntityCoordinates {
    /// A work-item, located in the global, local, and group index spaces
    WorkItem { global: Dim3, local: Dim3, group: Dim3 },
    /// A whole work-group
    WorkGroup { group: Dim3 },
    /// The participant left no identity (never the case for reported races)
    Unknown,
}

impl EntityCoordinates {
    /// Decode a work-item's linear global index against the kernel's sizes
    pub fn work_item(global_index: usize, invocation: &KernelInvocation) -> Self {
        let global = Dim3::from_linear(global_index, invocation.global_size());
        let local = global % invocation.local_size();
        let group = global / invocation.local_size();
        Self::WorkItem { global, local, group }
    }

    /// Decode a work-group's linear index against the kernel's group count
    pub fn work_group(group_index: usize, invocation: &KernelInvocation) -> Self {
        Self::WorkGroup {
            group: Dim3::from_linear(group_index, invocation.num_groups()),
        }
    }
}

impl fmt::Display for EntityCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityCoordinates::WorkItem { global, local, group } => {
                write!(f, "Global{global} Local{local} Group{group}")
            }
            EntityCoordinates::WorkGroup { group } => write!(f, "Group{group}"),
            EntityCoordinates::Unknown => write!(f, "(unknown)"),
        }
    }
}

/// One detected data race
#[derive(Debug, Clone, Serialize)]
pub struct RaceReport {
    /// Race classification
    pub kind: RaceKind,
    /// Address space of the raced byte
    pub address_space: AddressSpace,
    /// Address of the first conflicting byte of the access
    pub address: u64,
    /// Name of the kernel being executed
    pub kernel: String,
    /// The entity performing the current access
    pub first: EntityCoordinates,
    /// Instruction of the current access, when issued by a work-item
    pub first_instruction: Option<InstructionHandle>,
    /// The entity recorded by the shadow state
    pub second: EntityCoordinates,
    /// Instruction recorded by the shadow state
    pub second_instruction: Option<InstructionHandle>,
}

impl fmt::Display for RaceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} data race at {} memory address {:#x}",
            self.kind, self.address_space, self.address
        )?;
        writeln!(f, "  Kernel: {}", self.kernel)?;
        writeln!(f)?;
        writeln!(f, "  First entity:  {}", self.first)?;
        if let Some(instruction) = self.first_instruction {
            writeln!(f, "    at instruction {instruction}")?;
        }
        writeln!(f)?;
        write!(f, "  Second entity: {}", self.second)?;
        if let Some(instruction) = self.second_instruction {
            write!(f, "\n    at instruction {instruction}")?;
        }
        Ok(())
    }
}

/// Destination for race reports
///
/// Fire-and-forget: a report is not a failure, and the detector continues
/// after sending one.
pub trait RaceSink: Send {
    /// Deliver one report
    fn send(&mut self, report: &RaceReport);
}

/// Default sink: emits each report as a `tracing` error event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl RaceSink for TracingSink {
    fn send(&mut self, report: &RaceReport) {
        tracing::error!(
            kind = %report.kind,
            address_space = %report.address_space,
            address = report.address,
            kernel = %report.kernel,
            "{report}"
        );
    }
}

/// Sink that retains reports in memory, for tests and embedding hosts
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Vec<RaceReport>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports delivered so far
    pub fn reports(&self) -> &[RaceReport] {
        &self.reports
    }

    /// Drop all retained reports
    pub fn clear(&mut self) {
        self.reports.clear();
    }
}

impl RaceSink for MemorySink {
    fn send(&mut self, report: &RaceReport) {
        self.reports.push(report.clone());
    }
}
