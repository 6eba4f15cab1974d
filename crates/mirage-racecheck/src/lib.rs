//! Shadow-state data-race detection for the mirage simulated device
//!
//! This crate observes every memory access performed by every simulated
//! work-item and work-group and reports data races: conflicting accesses
//! to the same byte from two distinct execution entities without an
//! intervening synchronization.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                    Simulator                       │
//! └───────┬───────────────┬────────────────┬───────────┘
//!         │ alloc/free    │ load/store/    │ barrier /
//!         │               │ atomic         │ kernel end
//!         ▼               ▼                ▼
//!   ┌───────────┐   ┌──────────────┐   ┌────────────┐
//!   │ShadowStore│◄──┤ access engine│   │ sync engine│
//!   │ (per-byte │   │ (conflict +  │   │ (scoped    │
//!   │  states)  │◄──┤  update)     │   │  resets)   │
//!   └───────────┘   └──────┬───────┘   └────────────┘
//!                          │ race
//!                          ▼
//!                    ┌──────────┐
//!                    │ RaceSink │
//!                    └──────────┘
//! ```
//!
//! The detector reports only races actually witnessed on the observed
//! schedule; it assumes nothing about interleaving beyond "two accesses
//! to one byte without intervening synchronization are unordered".
//!
//! # Usage
//!
//! ```rust
//! use mirage_device::{Dim3, KernelInvocation, MemoryId, Plugin};
//! use mirage_racecheck::RaceDetector;
//! use std::sync::Arc;
//!
//! # fn main() -> mirage_device::Result<()> {
//! let global_memory = MemoryId::new(1);
//! let mut detector = RaceDetector::new(global_memory);
//!
//! let invocation = Arc::new(KernelInvocation::new(
//!     "vecadd",
//!     Dim3::linear(1024),
//!     Dim3::linear(64),
//! ));
//! detector.kernel_begin(&invocation)?;
//! // ... simulator forwards memory events ...
//! detector.kernel_end(&invocation)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod detector;
pub mod report;
pub mod shadow;

// Re-export public API
pub use config::{DetectorConfig, UNIFORM_WRITES_ENV};
pub use detector::{RaceDetector, SyncScope};
pub use report::{EntityCoordinates, MemorySink, RaceKind, RaceReport, RaceSink, TracingSink};
pub use shadow::{ByteState, ShadowBuffer, ShadowKey, ShadowStore};
