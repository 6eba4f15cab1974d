//! Minimal end-to-end demo: two work-items race on one global byte
//!
//! Run with `cargo run --example race_demo`; the detected race is emitted
//! as a `tracing` error event.

use mirage_device::{
    AddressSpace, DeviceError, DeviceMemory, Dim3, Entity, InstructionHandle, KernelInvocation,
    MemoryId, Plugin, Result, WorkItemView,
};
use mirage_racecheck::RaceDetector;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const GLOBAL_MEMORY: MemoryId = MemoryId::new(1);
const BUFFER: u64 = 1 << 32;

struct HostMemory {
    bytes: Vec<u8>,
}

impl DeviceMemory for HostMemory {
    fn id(&self) -> MemoryId {
        GLOBAL_MEMORY
    }

    fn address_space(&self) -> AddressSpace {
        AddressSpace::Global
    }

    fn read_byte(&self, address: u64) -> Result<u8> {
        self.bytes
            .get((address - BUFFER) as usize)
            .copied()
            .ok_or(DeviceError::InvalidAddress(address))
    }
}

fn work_item(global_index: usize) -> Entity {
    Entity::WorkItem(WorkItemView {
        global_index,
        group_index: global_index / 2,
        instruction: InstructionHandle::new(0x2a),
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut detector = RaceDetector::new(GLOBAL_MEMORY);
    let mut memory = HostMemory {
        bytes: vec![0u8; 4],
    };

    let invocation = Arc::new(KernelInvocation::new(
        "vecadd",
        Dim3::linear(4),
        Dim3::linear(2),
    ));
    detector.kernel_begin(&invocation)?;
    detector.memory_allocated(&memory, BUFFER, 4)?;

    // Work-item 0 writes 1, then work-item 1 writes 2 to the same byte
    // with no intervening barrier.
    detector.memory_store(&memory, work_item(0), BUFFER, 1, &[1])?;
    memory.bytes[0] = 1;
    detector.memory_store(&memory, work_item(1), BUFFER, 1, &[2])?;
    memory.bytes[0] = 2;

    detector.memory_deallocated(&memory, BUFFER)?;
    detector.kernel_end(&invocation)?;
    Ok(())
}
