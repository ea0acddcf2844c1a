//! Memory decoding and mapping core for MEGA65 / Commodore 65
//! emulation.
//!
//! Resolves every read and write issued by an emulated 4510-family CPU
//! (and by bus masters such as DMA or a debugger) to a concrete action
//! on a 28-bit physical address space: RAM, the C65 ROM shadow,
//! hypervisor memory, the legacy `$D000` I/O aperture, constant
//! sources, or nothing at all.
//!
//! The logical 64 KB CPU space is carved into 256-byte slots, each
//! caching where it currently points. Four overlapping mechanisms
//! decide that mapping — the C64 processor port, VIC-III ROM banking,
//! the C65 `MAP` opcode windows, and the MEGA65 megabyte slices — and
//! any change to them invalidates the affected slots, which re-decode
//! themselves lazily on the next access.

mod decode;
pub mod io;
pub mod mapper;
pub mod regions;
pub mod slot;
mod snapshot;
pub mod storage;

mod memcore;

pub use io::{IoReadFn, IoWriteFn};
pub use memcore::{BusChannel, MemCfg, MemoryCore, UnhandledPolicy};
pub use snapshot::Snapshot;
