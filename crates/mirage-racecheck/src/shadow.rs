//! Per-byte shadow state storage
//!
//! Every live non-private allocation carries one [`ByteState`] per byte,
//! owned exclusively by the [`ShadowStore`] and keyed by
//! (memory identity, allocation base). Shadow buffers are created at
//! `memory_allocated`, mutated by the access and sync engines, and
//! destroyed at `memory_deallocated`.

use mirage_device::{AddressLayout, DeviceError, InstructionHandle, MemoryId, Result};
use std::collections::HashMap;

/// Shadow state for one byte of device memory
///
/// A byte with all permission bits set and no recorded responsible entity
/// is *pristine*; pristine bytes never produce race reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteState {
    /// No prior write makes a subsequent read unsafe
    pub can_read: bool,
    /// No prior access makes a subsequent write unsafe
    pub can_write: bool,
    /// No prior non-atomic access makes a subsequent atomic unsafe
    pub can_atomic: bool,
    /// Last responsible entity was a work-item rather than a work-group
    pub was_work_item: bool,
    /// Global linear index of the last responsible work-item
    pub work_item: Option<usize>,
    /// Linear index of the last responsible work-group
    pub work_group: Option<usize>,
    /// Instruction that last accessed this byte
    pub instruction: Option<InstructionHandle>,
}

impl ByteState {
    /// State of a freshly allocated or fully synchronized byte
    pub const PRISTINE: ByteState = ByteState {
        can_read: true,
        can_write: true,
        can_atomic: true,
        was_work_item: false,
        work_item: None,
        work_group: None,
        instruction: None,
    };

    /// Whether this byte can produce no race report
    pub fn is_pristine(&self) -> bool {
        *self == Self::PRISTINE
    }
}

impl Default for ByteState {
    fn default() -> Self {
        Self::PRISTINE
    }
}

/// Shadow states for one allocation, one per byte
#[derive(Debug)]
pub struct ShadowBuffer {
    states: Box<[ByteState]>,
}

impl ShadowBuffer {
    /// Create a buffer of `size` pristine states
    pub fn new(size: usize) -> Self {
        Self {
            states: vec![ByteState::PRISTINE; size].into_boxed_slice(),
        }
    }

    /// Size of the shadowed allocation in bytes
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the shadowed allocation is empty
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Shadow state at `offset`, if in bounds
    pub fn state(&self, offset: usize) -> Option<&ByteState> {
        self.states.get(offset)
    }

    /// Mutable view of the states covered by an access
    pub fn range_mut(&mut self, offset: usize, size: usize) -> Result<&mut [ByteState]> {
        let buffer_size = self.states.len();
        if offset.checked_add(size).is_none_or(|end| end > buffer_size) {
            return Err(DeviceError::ShadowOutOfBounds {
                offset,
                size,
                buffer_size,
            });
        }
        Ok(&mut self.states[offset..offset + size])
    }

    /// Iterate all states
    pub fn iter(&self) -> impl Iterator<Item = &ByteState> + '_ {
        self.states.iter()
    }

    /// Iterate all states mutably (synchronization sweeps)
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ByteState> + '_ {
        self.states.iter_mut()
    }
}

/// Key identifying one allocation's shadow buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShadowKey {
    /// Identity of the owning memory arena
    pub memory: MemoryId,
    /// Allocation base address
    pub base: u64,
}

/// Owner of all live shadow buffers
///
/// Keyed lookup follows the host's address packing: the base bits of an
/// access address select the buffer, the offset bits the byte within it.
#[derive(Debug)]
pub struct ShadowStore {
    layout: AddressLayout,
    buffers: HashMap<ShadowKey, ShadowBuffer>,
}

impl ShadowStore {
    /// Create an empty store using the host's address layout
    pub fn new(layout: AddressLayout) -> Self {
        Self {
            layout,
            buffers: HashMap::new(),
        }
    }

    /// The address layout this store decodes accesses with
    pub const fn layout(&self) -> AddressLayout {
        self.layout
    }

    fn key(&self, memory: MemoryId, address: u64) -> ShadowKey {
        ShadowKey {
            memory,
            base: self.layout.base(address),
        }
    }

    /// Create a shadow buffer of `size` pristine states for an allocation
    pub fn allocate(&mut self, memory: MemoryId, address: u64, size: usize) {
        let key = self.key(memory, address);
        tracing::debug!(memory = %memory, base = key.base, size, "shadow_allocated");
        self.buffers.insert(key, ShadowBuffer::new(size));
    }

    /// Destroy the shadow buffer for an allocation
    pub fn deallocate(&mut self, memory: MemoryId, address: u64) -> Result<()> {
        let key = self.key(memory, address);
        tracing::debug!(memory = %memory, base = key.base, "shadow_deallocated");
        self.buffers
            .remove(&key)
            .map(|_| ())
            .ok_or(DeviceError::UnknownBuffer {
                memory,
                base: key.base,
            })
    }

    /// Resolve an access address to its shadow buffer and byte offset
    pub fn lookup_mut(
        &mut self,
        memory: MemoryId,
        address: u64,
    ) -> Result<(&mut ShadowBuffer, usize)> {
        let key = self.key(memory, address);
        let offset = self.layout.offset(address);
        let buffer = self
            .buffers
            .get_mut(&key)
            .ok_or(DeviceError::UnknownBuffer {
                memory,
                base: key.base,
            })?;
        Ok((buffer, offset))
    }

    /// Iterate all shadow buffers belonging to one memory arena
    pub fn iter_memory_mut(
        &mut self,
        memory: MemoryId,
    ) -> impl Iterator<Item = &mut ShadowBuffer> + '_ {
        self.buffers
            .iter_mut()
            .filter(move |(key, _)| key.memory == memory)
            .map(|(_, buffer)| buffer)
    }

    /// Number of live shadow buffers
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether no shadow buffers are live
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: AddressLayout = AddressLayout::new(12);
    const MEM: MemoryId = MemoryId::new(1);

    #[test]
    fn test_pristine_initial_state() {
        let state = ByteState::default();
        assert!(state.can_read);
        assert!(state.can_write);
        assert!(state.can_atomic);
        assert!(!state.was_work_item);
        assert_eq!(state.work_item, None);
        assert_eq!(state.work_group, None);
        assert_eq!(state.instruction, None);
        assert!(state.is_pristine());
    }

    #[test]
    fn test_allocate_deallocate_round_trip() {
        let mut store = ShadowStore::new(LAYOUT);
        assert!(store.is_empty());

        store.allocate(MEM, 0x1000, 4);
        assert_eq!(store.len(), 1);

        store.deallocate(MEM, 0x1000).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_deallocate_unknown_buffer_fails() {
        let mut store = ShadowStore::new(LAYOUT);
        let err = store.deallocate(MEM, 0x1000).unwrap_err();
        assert!(matches!(err, DeviceError::UnknownBuffer { .. }));
    }

    #[test]
    fn test_lookup_splits_address() {
        let mut store = ShadowStore::new(LAYOUT);
        store.allocate(MEM, 0x1000, 16);

        let (buffer, offset) = store.lookup_mut(MEM, 0x1003).unwrap();
        assert_eq!(buffer.len(), 16);
        assert_eq!(offset, 3);
    }

    #[test]
    fn test_lookup_distinguishes_memories() {
        let mut store = ShadowStore::new(LAYOUT);
        store.allocate(MEM, 0x1000, 4);

        let other = MemoryId::new(2);
        assert!(store.lookup_mut(other, 0x1000).is_err());
    }

    #[test]
    fn test_range_mut_bounds() {
        let mut buffer = ShadowBuffer::new(4);
        assert!(buffer.range_mut(0, 4).is_ok());
        assert!(buffer.range_mut(2, 2).is_ok());

        let err = buffer.range_mut(2, 3).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::ShadowOutOfBounds {
                offset: 2,
                size: 3,
                buffer_size: 4,
            }
        ));
    }

    #[test]
    fn test_iter_memory_filters_by_identity() {
        let mut store = ShadowStore::new(LAYOUT);
        let other = MemoryId::new(2);
        store.allocate(MEM, 0x1000, 4);
        store.allocate(MEM, 0x2000, 4);
        store.allocate(other, 0x1000, 4);

        assert_eq!(store.iter_memory_mut(MEM).count(), 2);
        assert_eq!(store.iter_memory_mut(other).count(), 1);
    }
}
