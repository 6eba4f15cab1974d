//! Plugin event interface
//!
//! The simulator executes one work-item (or one group-wide operation) at a
//! time and notifies registered plugins synchronously before advancing, so
//! hooks run to completion on the simulator's thread. A plugin implements
//! only the events it consumes; every hook has a no-op default.
//!
//! Event set:
//!
//! ```text
//! kernel_begin ──► memory_allocated ──► load / store / atomic ──┐
//!                                          ▲                    │
//!                                          └── work_group_barrier
//! kernel_end ◄── memory_deallocated ◄──────────────────────────┘
//! ```
//!
//! Hooks return `Result<()>`; an `Err` signals a corrupt event stream and
//! aborts the simulation.

use crate::entity::{Entity, WorkGroupView, WorkItemView};
use crate::error::Result;
use crate::kernel::KernelInvocation;
use crate::memory::DeviceMemory;
use bitflags::bitflags;
use std::fmt;
use std::sync::Arc;

bitflags! {
    /// Memory scopes fenced by a work-group barrier
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BarrierFlags: u32 {
        /// Barrier orders accesses to the group's local memory
        const LOCAL_MEM_FENCE = 1 << 0;
        /// Barrier orders the group's accesses to global memory
        const GLOBAL_MEM_FENCE = 1 << 1;
    }
}

/// Read-modify-write operation performed by an atomic access
///
/// Informational only; conflict analysis does not depend on the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicOp {
    Add,
    And,
    CompareExchange,
    Decrement,
    Exchange,
    Increment,
    Max,
    Min,
    Or,
    Sub,
    Xor,
}

impl fmt::Display for AtomicOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AtomicOp::Add => "add",
            AtomicOp::And => "and",
            AtomicOp::CompareExchange => "cmpxchg",
            AtomicOp::Decrement => "dec",
            AtomicOp::Exchange => "xchg",
            AtomicOp::Increment => "inc",
            AtomicOp::Max => "max",
            AtomicOp::Min => "min",
            AtomicOp::Or => "or",
            AtomicOp::Sub => "sub",
            AtomicOp::Xor => "xor",
        };
        write!(f, "{name}")
    }
}

/// Observer of device execution events
///
/// Store events arrive before the host commits the new bytes, so
/// [`DeviceMemory::read_byte`] still observes the pre-store value during
/// `memory_store`.
pub trait Plugin {
    /// A kernel launch is starting
    fn kernel_begin(&mut self, _invocation: &Arc<KernelInvocation>) -> Result<()> {
        Ok(())
    }

    /// The current kernel launch has finished
    fn kernel_end(&mut self, _invocation: &Arc<KernelInvocation>) -> Result<()> {
        Ok(())
    }

    /// A buffer of `size` bytes was allocated at `address`
    fn memory_allocated(
        &mut self,
        _memory: &dyn DeviceMemory,
        _address: u64,
        _size: usize,
    ) -> Result<()> {
        Ok(())
    }

    /// The buffer at `address` was freed
    fn memory_deallocated(&mut self, _memory: &dyn DeviceMemory, _address: u64) -> Result<()> {
        Ok(())
    }

    /// `entity` read `size` bytes starting at `address`
    fn memory_load(
        &mut self,
        _memory: &dyn DeviceMemory,
        _entity: Entity,
        _address: u64,
        _size: usize,
    ) -> Result<()> {
        Ok(())
    }

    /// `entity` is writing `store_data` (one byte per covered address)
    fn memory_store(
        &mut self,
        _memory: &dyn DeviceMemory,
        _entity: Entity,
        _address: u64,
        _size: usize,
        _store_data: &[u8],
    ) -> Result<()> {
        Ok(())
    }

    /// `work_item` performed an atomic read-modify-write
    fn memory_atomic(
        &mut self,
        _memory: &dyn DeviceMemory,
        _work_item: WorkItemView,
        _op: AtomicOp,
        _address: u64,
        _size: usize,
    ) -> Result<()> {
        Ok(())
    }

    /// `group` reached a barrier fencing the flagged memory scopes
    fn work_group_barrier(&mut self, _group: WorkGroupView, _flags: BarrierFlags) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barrier_flags() {
        let flags = BarrierFlags::LOCAL_MEM_FENCE | BarrierFlags::GLOBAL_MEM_FENCE;
        assert!(flags.contains(BarrierFlags::LOCAL_MEM_FENCE));
        assert!(flags.contains(BarrierFlags::GLOBAL_MEM_FENCE));

        let local_only = BarrierFlags::LOCAL_MEM_FENCE;
        assert!(!local_only.contains(BarrierFlags::GLOBAL_MEM_FENCE));
    }

    #[test]
    fn test_atomic_op_names() {
        assert_eq!(AtomicOp::Add.to_string(), "add");
        assert_eq!(AtomicOp::CompareExchange.to_string(), "cmpxchg");
        assert_eq!(AtomicOp::Exchange.to_string(), "xchg");
    }

    #[test]
    fn test_default_hooks_are_noops() {
        struct Inert;
        impl Plugin for Inert {}

        let mut plugin = Inert;
        let invocation = Arc::new(KernelInvocation::new(
            "noop",
            crate::dim::Dim3::linear(1),
            crate::dim::Dim3::linear(1),
        ));
        assert!(plugin.kernel_begin(&invocation).is_ok());
        assert!(plugin.kernel_end(&invocation).is_ok());
    }
}
