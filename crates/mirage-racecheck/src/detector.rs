//! The race detector: access engine, sync engine, and lifecycle hook
//!
//! [`RaceDetector`] implements [`Plugin`] and observes every memory access
//! the simulator performs. For each byte touched it consults the shadow
//! state, reports a race when two unordered accesses from different
//! entities conflict, and advances the state machine:
//!
//! ```text
//!             load                    store / atomic
//!  pristine ────────► read-shared ──────────────────► claimed
//!     ▲     can_read ✓, can_write ✗          can_read ✗, can_write ✗
//!     │
//!     └────────── synchronize(Device)  (local fence, kernel end)
//! ```
//!
//! Synchronization sweeps reset state per scope: group scope clears only
//! per-work-item tracking, device scope restores the byte to pristine.

use crate::config::DetectorConfig;
use crate::report::{EntityCoordinates, RaceKind, RaceReport, RaceSink, TracingSink};
use crate::shadow::{ByteState, ShadowStore};
use mirage_device::{
    AddressLayout, AddressSpace, AtomicOp, BarrierFlags, DeviceError, DeviceMemory, Entity,
    KernelInvocation, MemoryId, Plugin, Result, WorkGroupView, WorkItemView,
};
use std::sync::Arc;

/// Scope of a synchronization sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncScope {
    /// Only intra-group ordering established: per-work-item tracking resets
    Group,
    /// All prior accesses ordered before subsequent ones: full reset
    Device,
}

/// Shadow-state data-race detector
///
/// A passive observer: it performs no I/O of its own beyond the report
/// sink and is driven entirely by the simulator's event stream. Races are
/// reports, not failures; the detector keeps observing after sending one.
/// An `Err` from any hook means the event stream itself is corrupt.
pub struct RaceDetector<S: RaceSink = TracingSink> {
    config: DetectorConfig,
    shadow: ShadowStore,
    global_memory: MemoryId,
    kernel: Option<Arc<KernelInvocation>>,
    sink: S,
}

impl RaceDetector<TracingSink> {
    /// Create a detector with configuration read from the environment
    ///
    /// `global_memory` is the identity of the device's global arena,
    /// swept at global barriers and kernel boundaries.
    pub fn new(global_memory: MemoryId) -> Self {
        Self::with_config(global_memory, DetectorConfig::from_env())
    }

    /// Create a detector with an explicit configuration
    pub fn with_config(global_memory: MemoryId, config: DetectorConfig) -> Self {
        Self::with_sink(global_memory, config, TracingSink)
    }
}

impl<S: RaceSink> RaceDetector<S> {
    /// Create a detector delivering reports to `sink`
    pub fn with_sink(global_memory: MemoryId, config: DetectorConfig, sink: S) -> Self {
        Self {
            config,
            shadow: ShadowStore::new(AddressLayout::default()),
            global_memory,
            kernel: None,
            sink,
        }
    }

    /// Replace the address layout; call before any allocation event
    pub fn with_address_layout(mut self, layout: AddressLayout) -> Self {
        self.shadow = ShadowStore::new(layout);
        self
    }

    /// The active configuration
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// The report sink
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Number of allocations currently shadowed
    pub fn tracked_buffers(&self) -> usize {
        self.shadow.len()
    }

    /// Reset shadow state for every buffer of one memory arena
    ///
    /// Group scope clears per-work-item tracking; device scope additionally
    /// restores read/write permission and forgets the responsible group and
    /// instruction. Both scopes re-permit atomics, unless
    /// `strict_atomic_sync` defers that to device scope.
    pub fn synchronize(&mut self, memory: MemoryId, scope: SyncScope) {
        tracing::debug!(memory = %memory, ?scope, "synchronize");
        let strict = self.config.strict_atomic_sync;
        for buffer in self.shadow.iter_memory_mut(memory) {
            for state in buffer.iter_mut() {
                if scope == SyncScope::Device || !strict {
                    state.can_atomic = true;
                }
                state.work_item = None;
                state.was_work_item = false;
                if scope == SyncScope::Device {
                    state.work_group = None;
                    state.can_read = true;
                    state.can_write = true;
                    state.instruction = None;
                }
            }
        }
    }

    /// Process one non-atomic access over `size` consecutive bytes
    ///
    /// `store_data` is `Some` for stores and carries the bytes about to be
    /// written; the underlying memory still holds the pre-store values.
    fn register_access(
        &mut self,
        memory: &dyn DeviceMemory,
        entity: Entity,
        address: u64,
        size: usize,
        store_data: Option<&[u8]>,
    ) -> Result<()> {
        if self.kernel.is_none() {
            return Ok(());
        }
        if memory.address_space().is_private() {
            return Ok(());
        }
        if let Some(data) = store_data {
            if data.len() < size {
                return Err(DeviceError::StoreSizeMismatch {
                    expected: size,
                    actual: data.len(),
                });
            }
        }

        let is_store = store_data.is_some();
        // At most one report per access; the first conflicting byte wins.
        let mut pending: Option<(RaceKind, u64, ByteState)> = None;

        let (buffer, base) = self.shadow.lookup_mut(memory.id(), address)?;
        let states = buffer.range_mut(base, size)?;

        for (index, state) in states.iter_mut().enumerate() {
            let mut conflict = if is_store {
                !state.can_write
            } else {
                !state.can_read
            };

            // A write of the byte already in memory cannot observably race.
            if conflict && self.config.allow_uniform_writes {
                if let Some(data) = store_data {
                    if memory.read_byte(address + index as u64)? == data[index] {
                        conflict = false;
                    }
                }
            }

            let same_entity = if state.was_work_item {
                state.work_item == entity.work_item_index()
            } else {
                state.work_group == Some(entity.group_index())
            };

            if pending.is_none() && conflict && !same_entity {
                let kind = if !is_store || state.can_read {
                    RaceKind::ReadWrite
                } else {
                    RaceKind::WriteWrite
                };
                pending = Some((kind, address + index as u64, *state));
            }

            // Record the entity only when this access is stronger than the
            // previous one: a store always wins, a load only claims a byte
            // that was still writable.
            let promote = is_store || state.can_write;

            state.can_atomic = false;
            state.can_read &= !is_store;
            state.can_write = false;
            if promote {
                state.work_group = Some(entity.group_index());
                match entity {
                    Entity::WorkItem(item) => {
                        state.work_item = Some(item.global_index);
                        state.instruction = Some(item.instruction);
                        state.was_work_item = true;
                    }
                    Entity::WorkGroup(_) => {
                        state.work_item = None;
                        state.instruction = None;
                        state.was_work_item = false;
                    }
                }
            }
        }

        if let Some((kind, raced_address, previous)) = pending {
            self.report_race(kind, memory.address_space(), raced_address, entity, &previous)?;
        }
        Ok(())
    }

    /// Process one atomic access over `size` consecutive bytes
    ///
    /// Atomics race only against prior non-atomic accesses from other
    /// work-items; two atomics never conflict, so `can_atomic` is left
    /// untouched here.
    fn register_atomic(
        &mut self,
        memory: &dyn DeviceMemory,
        item: WorkItemView,
        address: u64,
        size: usize,
    ) -> Result<()> {
        if self.kernel.is_none() {
            return Ok(());
        }
        if memory.address_space().is_private() {
            return Ok(());
        }

        let mut pending: Option<(u64, ByteState)> = None;

        let (buffer, base) = self.shadow.lookup_mut(memory.id(), address)?;
        let states = buffer.range_mut(base, size)?;

        for (index, state) in states.iter_mut().enumerate() {
            if pending.is_none()
                && !state.can_atomic
                && state.work_item != Some(item.global_index)
            {
                pending = Some((address + index as u64, *state));
            }

            state.can_read = false;
            state.can_write = false;
            if !state.was_work_item {
                state.instruction = Some(item.instruction);
                state.work_item = Some(item.global_index);
                state.was_work_item = true;
            }
        }

        if let Some((raced_address, previous)) = pending {
            self.report_race(
                RaceKind::ReadWrite,
                memory.address_space(),
                raced_address,
                Entity::WorkItem(item),
                &previous,
            )?;
        }
        Ok(())
    }

    /// Build and deliver a report attributing both participants
    fn report_race(
        &mut self,
        kind: RaceKind,
        address_space: AddressSpace,
        address: u64,
        entity: Entity,
        previous: &ByteState,
    ) -> Result<()> {
        let invocation = self.kernel.as_ref().ok_or(DeviceError::NoActiveKernel)?;

        let first = match entity {
            Entity::WorkItem(item) => EntityCoordinates::work_item(item.global_index, invocation),
            Entity::WorkGroup(group) => {
                EntityCoordinates::work_group(group.group_index, invocation)
            }
        };
        let second = if let Some(work_item) = previous.work_item {
            EntityCoordinates::work_item(work_item, invocation)
        } else if let Some(work_group) = previous.work_group {
            EntityCoordinates::work_group(work_group, invocation)
        } else {
            EntityCoordinates::Unknown
        };

        let report = RaceReport {
            kind,
            address_space,
            address,
            kernel: invocation.name().to_string(),
            first,
            first_instruction: entity.instruction(),
            second,
            second_instruction: previous.instruction,
        };
        self.sink.send(&report);
        Ok(())
    }
}

impl<S: RaceSink> Plugin for RaceDetector<S> {
    fn kernel_begin(&mut self, invocation: &Arc<KernelInvocation>) -> Result<()> {
        tracing::debug!(kernel = invocation.name(), "kernel_begin");
        self.kernel = Some(Arc::clone(invocation));
        Ok(())
    }

    fn kernel_end(&mut self, invocation: &Arc<KernelInvocation>) -> Result<()> {
        tracing::debug!(kernel = invocation.name(), "kernel_end");
        self.synchronize(self.global_memory, SyncScope::Device);
        self.kernel = None;
        Ok(())
    }

    fn memory_allocated(
        &mut self,
        memory: &dyn DeviceMemory,
        address: u64,
        size: usize,
    ) -> Result<()> {
        if memory.address_space().is_private() {
            return Ok(());
        }
        self.shadow.allocate(memory.id(), address, size);
        Ok(())
    }

    fn memory_deallocated(&mut self, memory: &dyn DeviceMemory, address: u64) -> Result<()> {
        if memory.address_space().is_private() {
            return Ok(());
        }
        self.shadow.deallocate(memory.id(), address)
    }

    fn memory_load(
        &mut self,
        memory: &dyn DeviceMemory,
        entity: Entity,
        address: u64,
        size: usize,
    ) -> Result<()> {
        self.register_access(memory, entity, address, size, None)
    }

    fn memory_store(
        &mut self,
        memory: &dyn DeviceMemory,
        entity: Entity,
        address: u64,
        size: usize,
        store_data: &[u8],
    ) -> Result<()> {
        self.register_access(memory, entity, address, size, Some(store_data))
    }

    fn memory_atomic(
        &mut self,
        memory: &dyn DeviceMemory,
        work_item: WorkItemView,
        _op: AtomicOp,
        address: u64,
        size: usize,
    ) -> Result<()> {
        self.register_atomic(memory, work_item, address, size)
    }

    fn work_group_barrier(&mut self, group: WorkGroupView, flags: BarrierFlags) -> Result<()> {
        if flags.contains(BarrierFlags::LOCAL_MEM_FENCE) {
            self.synchronize(group.local_memory, SyncScope::Device);
        }
        if flags.contains(BarrierFlags::GLOBAL_MEM_FENCE) {
            self.synchronize(self.global_memory, SyncScope::Group);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemorySink;
    use mirage_device::{Dim3, InstructionHandle};

    const GLOBAL: MemoryId = MemoryId::new(1);
    const LAYOUT: AddressLayout = AddressLayout::new(12);
    const BASE: u64 = 0x1000;

    // Mock host memory for driving the detector directly
    struct FakeMemory {
        id: MemoryId,
        space: AddressSpace,
        base: u64,
        bytes: Vec<u8>,
    }

    impl FakeMemory {
        fn global(size: usize) -> Self {
            Self {
                id: GLOBAL,
                space: AddressSpace::Global,
                base: BASE,
                bytes: vec![0u8; size],
            }
        }

        /// Apply a store the simulator would commit after the event
        fn commit(&mut self, address: u64, data: &[u8]) {
            let offset = (address - self.base) as usize;
            self.bytes[offset..offset + data.len()].copy_from_slice(data);
        }
    }

    impl DeviceMemory for FakeMemory {
        fn id(&self) -> MemoryId {
            self.id
        }

        fn address_space(&self) -> AddressSpace {
            self.space
        }

        fn read_byte(&self, address: u64) -> Result<u8> {
            address
                .checked_sub(self.base)
                .and_then(|offset| self.bytes.get(offset as usize).copied())
                .ok_or(DeviceError::InvalidAddress(address))
        }
    }

    fn work_item(global_index: usize) -> Entity {
        // local size 2: group index is global / 2
        Entity::WorkItem(WorkItemView {
            global_index,
            group_index: global_index / 2,
            instruction: InstructionHandle::new(0x100 + global_index as u64),
        })
    }

    fn detector() -> RaceDetector<MemorySink> {
        let mut detector =
            RaceDetector::with_sink(GLOBAL, DetectorConfig::default(), MemorySink::new())
                .with_address_layout(LAYOUT);
        let invocation = Arc::new(KernelInvocation::new(
            "vecadd",
            Dim3::linear(4),
            Dim3::linear(2),
        ));
        detector.kernel_begin(&invocation).unwrap();
        detector
    }

    fn states(detector: &mut RaceDetector<MemorySink>) -> Vec<ByteState> {
        let (buffer, _) = detector.shadow.lookup_mut(GLOBAL, BASE).unwrap();
        buffer.iter().copied().collect()
    }

    #[test]
    fn test_pristine_after_device_sync() {
        let mut detector = detector();
        let mut memory = FakeMemory::global(4);
        detector.memory_allocated(&memory, BASE, 4).unwrap();

        detector
            .memory_store(&memory, work_item(0), BASE, 4, &[1, 2, 3, 4])
            .unwrap();
        memory.commit(BASE, &[1, 2, 3, 4]);
        assert!(states(&mut detector).iter().any(|s| !s.is_pristine()));

        detector.synchronize(GLOBAL, SyncScope::Device);
        assert!(states(&mut detector).iter().all(|s| s.is_pristine()));
    }

    #[test]
    fn test_device_sync_idempotent() {
        let mut detector = detector();
        let memory = FakeMemory::global(4);
        detector.memory_allocated(&memory, BASE, 4).unwrap();
        detector
            .memory_store(&memory, work_item(0), BASE, 2, &[1, 1])
            .unwrap();

        detector.synchronize(GLOBAL, SyncScope::Device);
        let once = states(&mut detector);
        detector.synchronize(GLOBAL, SyncScope::Device);
        assert_eq!(states(&mut detector), once);
    }

    #[test]
    fn test_group_sync_clears_work_item_tracking_only() {
        let mut detector = detector();
        let memory = FakeMemory::global(4);
        detector.memory_allocated(&memory, BASE, 4).unwrap();
        detector
            .memory_store(&memory, work_item(0), BASE, 1, &[7])
            .unwrap();

        detector.synchronize(GLOBAL, SyncScope::Group);
        let state = states(&mut detector)[0];
        assert!(state.can_atomic);
        assert_eq!(state.work_item, None);
        assert!(!state.was_work_item);
        // write permission and group attribution survive a group-scope sweep
        assert!(!state.can_write);
        assert_eq!(state.work_group, Some(0));
    }

    #[test]
    fn test_strict_atomic_sync_defers_repermission() {
        let config = DetectorConfig {
            strict_atomic_sync: true,
            ..DetectorConfig::default()
        };
        let mut detector = RaceDetector::with_sink(GLOBAL, config, MemorySink::new())
            .with_address_layout(LAYOUT);
        let invocation = Arc::new(KernelInvocation::new(
            "vecadd",
            Dim3::linear(4),
            Dim3::linear(2),
        ));
        detector.kernel_begin(&invocation).unwrap();

        let memory = FakeMemory::global(4);
        detector.memory_allocated(&memory, BASE, 4).unwrap();
        detector
            .memory_store(&memory, work_item(0), BASE, 1, &[7])
            .unwrap();

        detector.synchronize(GLOBAL, SyncScope::Group);
        let (buffer, _) = detector.shadow.lookup_mut(GLOBAL, BASE).unwrap();
        assert!(!buffer.state(0).unwrap().can_atomic);

        detector.synchronize(GLOBAL, SyncScope::Device);
        let (buffer, _) = detector.shadow.lookup_mut(GLOBAL, BASE).unwrap();
        assert!(buffer.state(0).unwrap().can_atomic);
    }

    #[test]
    fn test_one_report_per_access() {
        let mut detector = detector();
        let mut memory = FakeMemory::global(4);
        detector.memory_allocated(&memory, BASE, 4).unwrap();

        detector
            .memory_store(&memory, work_item(0), BASE, 4, &[1, 2, 3, 4])
            .unwrap();
        memory.commit(BASE, &[1, 2, 3, 4]);

        // All four bytes conflict; exactly one report, for the first byte.
        detector
            .memory_store(&memory, work_item(3), BASE, 4, &[5, 6, 7, 8])
            .unwrap();
        let reports = detector.sink().reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].address, BASE);
    }

    #[test]
    fn test_store_updates_state_even_when_reporting() {
        let mut detector = detector();
        let mut memory = FakeMemory::global(1);
        detector.memory_allocated(&memory, BASE, 1).unwrap();

        detector
            .memory_store(&memory, work_item(0), BASE, 1, &[1])
            .unwrap();
        memory.commit(BASE, &[1]);
        detector
            .memory_store(&memory, work_item(3), BASE, 1, &[2])
            .unwrap();
        memory.commit(BASE, &[2]);

        assert_eq!(detector.sink().reports().len(), 1);
        // The racing store still claimed the byte.
        let state = states(&mut detector)[0];
        assert_eq!(state.work_item, Some(3));
        assert!(state.was_work_item);
    }

    #[test]
    fn test_group_access_records_group_granularity() {
        let mut detector = detector();
        let memory = FakeMemory::global(4);
        detector.memory_allocated(&memory, BASE, 4).unwrap();

        let group = Entity::WorkGroup(WorkGroupView {
            group_index: 1,
            local_memory: MemoryId::new(9),
        });
        detector
            .memory_store(&memory, group, BASE, 2, &[1, 1])
            .unwrap();

        let state = states(&mut detector)[0];
        assert!(!state.was_work_item);
        assert_eq!(state.work_item, None);
        assert_eq!(state.work_group, Some(1));
        assert_eq!(state.instruction, None);
    }

    #[test]
    fn test_access_before_kernel_begin_is_ignored() {
        let mut detector = RaceDetector::with_sink(GLOBAL, DetectorConfig::default(), MemorySink::new())
            .with_address_layout(LAYOUT);
        let memory = FakeMemory::global(4);
        detector.memory_allocated(&memory, BASE, 4).unwrap();

        // No kernel is active: the access is ignored rather than tracked.
        detector
            .memory_store(&memory, work_item(0), BASE, 1, &[1])
            .unwrap();
        assert!(states(&mut detector)[0].is_pristine());
        assert!(detector.sink().reports().is_empty());
    }

    #[test]
    fn test_unknown_buffer_is_fatal() {
        let mut detector = detector();
        let memory = FakeMemory::global(4);

        let err = detector
            .memory_load(&memory, work_item(0), BASE, 1)
            .unwrap_err();
        assert!(matches!(err, DeviceError::UnknownBuffer { .. }));
    }

    #[test]
    fn test_store_data_shorter_than_access_is_fatal() {
        let mut detector = detector();
        let memory = FakeMemory::global(4);
        detector.memory_allocated(&memory, BASE, 4).unwrap();

        let err = detector
            .memory_store(&memory, work_item(0), BASE, 4, &[1, 2])
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceError::StoreSizeMismatch {
                expected: 4,
                actual: 2,
            }
        ));
    }

    #[test]
    fn test_load_promotes_only_over_writable_byte() {
        let mut detector = detector();
        let memory = FakeMemory::global(1);
        detector.memory_allocated(&memory, BASE, 1).unwrap();

        detector.memory_load(&memory, work_item(0), BASE, 1).unwrap();
        assert_eq!(states(&mut detector)[0].work_item, Some(0));

        // A second reader does not displace the first recorded reader.
        detector.memory_load(&memory, work_item(1), BASE, 1).unwrap();
        assert_eq!(states(&mut detector)[0].work_item, Some(0));
        assert!(detector.sink().reports().is_empty());
    }
}
