//! Device-side vocabulary for the mirage simulated parallel device
//!
//! This crate defines the types and traits shared between the simulator
//! and its observers:
//! - **Launch geometry**: 3-D extents and linear index conversion
//! - **Memory vocabulary**: address spaces, stable arena identities,
//!   host address decomposition, the host-memory read interface
//! - **Execution entities**: work-item and work-group views with
//!   instruction attribution
//! - **Plugin interface**: the event-capability set observers implement
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Simulator                   │
//! │   (interpreter, memory subsystem, wiring)    │
//! └──────────────────────┬───────────────────────┘
//!                        │ events (Plugin trait)
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!    ┌──────────┐  ┌──────────┐  ┌──────────┐
//!    │racecheck │  │ observer │  │ observer │
//!    └──────────┘  └──────────┘  └──────────┘
//! ```
//!
//! The simulator is single-threaded and invokes each hook synchronously
//! before advancing, so observers run to completion and need no locking.

pub mod dim;
pub mod entity;
pub mod error;
pub mod kernel;
pub mod memory;
pub mod plugin;

// Re-export public API
pub use dim::Dim3;
pub use entity::{Entity, InstructionHandle, WorkGroupView, WorkItemView};
pub use error::{DeviceError, Result};
pub use kernel::KernelInvocation;
pub use memory::{AddressLayout, AddressSpace, DeviceMemory, MemoryId};
pub use plugin::{AtomicOp, BarrierFlags, Plugin};
