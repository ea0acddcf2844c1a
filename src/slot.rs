//! Slot dispatch entries — one per 256-byte page of the CPU's logical
//! address space, plus one per bus-master channel.
//!
//! A slot entry caches where its page currently points so the hot path
//! is a tag check and an indexed load. Routing is a tagged union rather
//! than raw function pointers; the resolver tag doubles as the
//! "invalidated" state, so an invalidated slot re-decodes itself on the
//! next touch.

use crate::storage::StoreId;

pub const CPU_SLOTS: usize = 256;
pub const CHANNEL_SLOTS: usize = 5;
pub const SLOT_COUNT: usize = CPU_SLOTS + CHANNEL_SLOTS;

/// Where one side (read or write) of a slot currently routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Direct view into storage: `store[base + (addr & 0xFF)]`.
    Direct { store: StoreId, base: u32 },
    /// Lazy resolver: decode the slot, then retry the access.
    Resolve,
    /// CPU I/O port writer (offsets 0/1 of physical page 0, plain RAM
    /// behind the rest of the page).
    CpuPort,
    /// Colour-RAM head writer (RAM shadow plus both colour buffers).
    ColourHead,
    /// Undecoded space: diagnostics, 0xFF reads, discarded writes.
    Undecoded,
    /// Legacy `$D000` I/O aperture trampoline.
    LegacyIo,
}

/// One slot's resolved mapping. The read and write sides carry their
/// own physical pages because C64-style ROM windows read the ROM shadow
/// but write through to RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotEntry {
    pub rd: Route,
    pub wr: Route,
    /// Physical page (bits 27..8) the read side resolves to.
    pub rd_page: u32,
    /// Physical page the write side resolves to.
    pub wr_page: u32,
}

impl SlotEntry {
    /// The invalidated state: both sides fall through to the resolver.
    pub const INVALID: SlotEntry =
        SlotEntry { rd: Route::Resolve, wr: Route::Resolve, rd_page: 0, wr_page: 0 };
}
