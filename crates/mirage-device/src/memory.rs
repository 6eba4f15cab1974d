//! Memory arenas as seen by observers
//!
//! The simulator owns all memory. Observers see each arena through three
//! small pieces of vocabulary:
//! - [`AddressSpace`]: which class of memory an arena models
//! - [`MemoryId`]: a stable opaque handle distinguishing arenas (global
//!   memory from each work-group's local memory, and so on)
//! - [`AddressLayout`]: how the host packs (allocation base, byte offset)
//!   into one word-sized access address
//!
//! Reads of the underlying bytes go through the [`DeviceMemory`] trait,
//! implemented by the host memory subsystem.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a memory arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressSpace {
    /// Per-work-item memory; invisible to cross-entity analyses
    Private,
    /// Per-work-group memory shared by the group's work-items
    Local,
    /// Device-wide memory shared by all work-items
    Global,
    /// Device-wide read-only memory
    Constant,
}

impl AddressSpace {
    /// Whether this is per-work-item memory
    pub const fn is_private(self) -> bool {
        matches!(self, AddressSpace::Private)
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressSpace::Private => write!(f, "private"),
            AddressSpace::Local => write!(f, "local"),
            AddressSpace::Global => write!(f, "global"),
            AddressSpace::Constant => write!(f, "constant"),
        }
    }
}

/// Stable opaque handle to a memory arena
///
/// Identities survive host address-space reorganization, so keys derived
/// from a `MemoryId` stay valid for the lifetime of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub u64);

impl MemoryId {
    /// Create a new memory identity
    pub const fn new(id: u64) -> Self {
        MemoryId(id)
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mem{}", self.0)
    }
}

/// Host address packing: high bits name the allocation base, low bits the
/// byte offset within it
///
/// Allocation bases therefore have all offset bits clear; the host
/// guarantees this for every `memory_allocated` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressLayout {
    offset_bits: u32,
}

impl AddressLayout {
    /// Create a layout with the given number of low offset bits (< 64)
    pub const fn new(offset_bits: u32) -> Self {
        assert!(offset_bits < 64, "offset bits must leave room for a base");
        Self { offset_bits }
    }

    /// Mask selecting the offset bits of an address
    pub const fn offset_mask(self) -> u64 {
        (1u64 << self.offset_bits) - 1
    }

    /// Allocation base of an access address
    pub const fn base(self, address: u64) -> u64 {
        address & !self.offset_mask()
    }

    /// Byte offset of an access address within its allocation
    pub const fn offset(self, address: u64) -> usize {
        (address & self.offset_mask()) as usize
    }
}

impl Default for AddressLayout {
    fn default() -> Self {
        Self::new(32)
    }
}

/// Host memory subsystem interface
///
/// Implemented by the simulator for every arena it owns. `read_byte`
/// observes the value currently committed at `address`; during a store
/// event the host has not yet applied the new bytes, so the read returns
/// the pre-store value.
pub trait DeviceMemory {
    /// Stable identity of this arena
    fn id(&self) -> MemoryId;

    /// Address-space classification of this arena
    fn address_space(&self) -> AddressSpace;

    /// Read one committed byte
    fn read_byte(&self, address: u64) -> Result<u8>;
}
