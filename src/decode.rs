//! Address decoding.
//!
//! The linear decoder turns a 28-bit physical page into a materialised
//! slot entry, honouring the covering region's policy. The logical
//! decoder decides which physical page a CPU slot currently represents
//! by cascading the overlapping mapping mechanisms — VIC-III ROM
//! banking, the `MAP` windows, the C64 processor-port layout, legacy
//! I/O visibility — and hands the result to the linear decoder.

use crate::mapper::{
    LAYOUT_BASIC, LAYOUT_D000_CHARGEN, LAYOUT_D000_IO, LAYOUT_KERNAL, VIC3_ROM_8000,
    VIC3_ROM_A000, VIC3_ROM_C000, VIC3_ROM_E000,
};
use crate::memcore::MemoryCore;
use crate::regions::{find_region, Backing, Region, RegionHook, RegionPolicy, REGIONS};
use crate::slot::{Route, SlotEntry};
use crate::storage::StoreId;

// C65 ROM shadow pages behind the four VIC-III windows.
const VIC3_BASE_8000: u32 = 0x38000;
const VIC3_BASE_A000: u32 = 0x3A000;
const VIC3_BASE_C000: u32 = 0x2C000;
const VIC3_BASE_E000: u32 = 0x3E000;

// C64 ROM shadows. Read side only; writes fall through to RAM at the
// logical address.
const C64_BASIC_BASE: u32 = 0x2A000;
const C64_CHARGEN_BASE: u32 = 0x2D000;
const C64_KERNAL_BASE: u32 = 0x2E000;

fn backing_route(b: Backing, page: u32, begin: u32) -> Route {
    match b {
        Backing::Linear(store, offset) => Route::Direct { store, base: offset + (page - begin) },
        Backing::Page(store) => Route::Direct { store, base: 0 },
        Backing::Hook(RegionHook::CpuPort) => Route::CpuPort,
        Backing::Hook(RegionHook::ColourHead) => Route::ColourHead,
        Backing::Hook(RegionHook::Undecoded) => Route::Undecoded,
    }
}

impl MemoryCore {
    // ── Linear decoder ────────────────────────────────────────

    /// Resolve the read half of `slot` to physical page `page`,
    /// walking the region table from `hint`. Returns the new hint.
    pub(crate) fn resolve_linear_read(&mut self, page: u32, slot: usize, hint: usize) -> usize {
        let ri = find_region(page, hint);
        let r: &Region = &REGIONS[ri];
        let route = match r.policy {
            RegionPolicy::Normal | RegionPolicy::Rom => backing_route(r.rd, page, r.begin),
            RegionPolicy::Hypervisor => {
                if self.mapper.in_hypervisor {
                    backing_route(r.rd, page, r.begin)
                } else {
                    Route::Direct { store: StoreId::WhiteHoleFf, base: 0 }
                }
            }
            RegionPolicy::IoRegion => unreachable!("IoRegion never appears in the table"),
        };
        let e = &mut self.slots[slot];
        e.rd = route;
        e.rd_page = page;
        ri
    }

    /// Resolve the write half of `slot` to physical page `page`.
    pub(crate) fn resolve_linear_write(&mut self, page: u32, slot: usize, hint: usize) -> usize {
        let ri = find_region(page, hint);
        let r: &Region = &REGIONS[ri];
        let route = match r.policy {
            RegionPolicy::Normal => backing_route(r.wr, page, r.begin),
            RegionPolicy::Rom => {
                if self.mapper.rom_protect {
                    Route::Direct { store: StoreId::BlackHole, base: 0 }
                } else {
                    backing_route(r.wr, page, r.begin)
                }
            }
            RegionPolicy::Hypervisor => {
                if self.mapper.in_hypervisor {
                    backing_route(r.wr, page, r.begin)
                } else {
                    Route::Direct { store: StoreId::BlackHole, base: 0 }
                }
            }
            RegionPolicy::IoRegion => unreachable!("IoRegion never appears in the table"),
        };
        let e = &mut self.slots[slot];
        e.wr = route;
        e.wr_page = page;
        ri
    }

    // ── Logical decoder ───────────────────────────────────────

    /// Materialise the mapping for a CPU slot (the whole 8 KiB `MAP`
    /// window at once in full-window mode). Observable behaviour of
    /// the two modes is identical.
    pub(crate) fn decode_cpu_slot(&mut self, slot: usize) {
        if self.cfg.full_window_decode {
            let first = slot & !0x1F;
            for s in first..first + 0x20 {
                self.decode_one_slot(s);
            }
        } else {
            self.decode_one_slot(slot);
        }
    }

    fn decode_one_slot(&mut self, slot: usize) {
        let page4k = slot >> 4;
        let logical = (slot as u32) << 8;

        if page4k < 8 {
            // Low half: MAP window or legacy RAM, nothing else.
            let page = if self.mapper.map_mask & (1 << (page4k >> 1)) != 0 {
                self.mapper.map_page_lo(slot as u32)
            } else {
                logical
            };
            self.materialise(slot, page4k, page, page);
            return;
        }

        // High half: first applicable rule wins.
        let vic3_bit = match page4k {
            0x8 | 0x9 => VIC3_ROM_8000,
            0xA | 0xB => VIC3_ROM_A000,
            0xC => VIC3_ROM_C000,
            0xE | 0xF => VIC3_ROM_E000,
            _ => 0,
        };
        if self.mapper.vic3_rom_mask & vic3_bit != 0 {
            // vic3_rom_mask is already forced clear in hypervisor mode
            let page = match page4k {
                0x8 | 0x9 => VIC3_BASE_8000 + (logical - 0x8000),
                0xA | 0xB => VIC3_BASE_A000 + (logical - 0xA000),
                0xC => VIC3_BASE_C000 + (logical - 0xC000),
                _ => VIC3_BASE_E000 + (logical - 0xE000),
            };
            self.materialise(slot, page4k, page, page);
            return;
        }

        if self.mapper.map_mask & (1 << (page4k >> 1)) != 0 {
            let page = self.mapper.map_page_hi(slot as u32);
            self.materialise(slot, page4k, page, page);
            return;
        }

        let layout = self.mapper.c64_memlayout;
        if page4k == 0xD {
            if layout & LAYOUT_D000_IO != 0 {
                self.slots[slot] = SlotEntry {
                    rd: Route::LegacyIo,
                    wr: Route::LegacyIo,
                    rd_page: logical,
                    wr_page: logical,
                };
                self.mapper.legacy_io_is_mapped = true;
                return;
            }
            if layout & LAYOUT_D000_CHARGEN != 0 {
                self.materialise(slot, page4k, C64_CHARGEN_BASE + (logical - 0xD000), logical);
                return;
            }
        }
        if (page4k == 0xA || page4k == 0xB) && layout & LAYOUT_BASIC != 0 {
            self.materialise(slot, page4k, C64_BASIC_BASE + (logical - 0xA000), logical);
            return;
        }
        if (page4k == 0xE || page4k == 0xF) && layout & LAYOUT_KERNAL != 0 {
            self.materialise(slot, page4k, C64_KERNAL_BASE + (logical - 0xE000), logical);
            return;
        }

        self.materialise(slot, page4k, logical, logical);
    }

    /// Populate both halves of a CPU slot via the linear decoder,
    /// threading the per-4K-page region hint through the walk.
    fn materialise(&mut self, slot: usize, page4k: usize, rd_page: u32, wr_page: u32) {
        let hint = self.decode_hints[page4k];
        let hint = self.resolve_linear_read(rd_page, slot, hint);
        let hint = self.resolve_linear_write(wr_page, slot, hint);
        self.decode_hints[page4k] = hint;
        if page4k == 0xD {
            self.mapper.legacy_io_is_mapped = false;
        }
    }
}
