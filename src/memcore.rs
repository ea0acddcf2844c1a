//! The memory core — slot dispatch, permanent write hooks, bus-master
//! channels, invalidation, and the undecoded-access policy.
//!
//! Every CPU access enters at the slot table: a direct-view hit is one
//! tag check and an indexed load, anything else falls through to the
//! tagged dispatch. Bus masters (DMA, linear-addressing opcodes, the
//! debugger) bypass the CPU slots and go through their own one-page
//! channel caches.

use log::warn;

use crate::io::{IoReadFn, IoWriteFn, LegacyIoMatrix};
use crate::mapper::MapperState;
use crate::regions::{check_region_table, PHYS_ADDR_MASK, PHYS_PAGE_MASK};
use crate::slot::{Route, SlotEntry, CHANNEL_SLOTS, CPU_SLOTS, SLOT_COUNT};
use crate::storage::{Storage, COLOUR_HEAD_BASE, MEMORY_UNDECODED_PATTERN};

// ── Channels ──────────────────────────────────────────────────

/// Bus-master access lanes. Each has a one-page cache that survives
/// until the linear address leaves the page or the channels are
/// invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusChannel {
    DmaList = 0,
    DmaSrc = 1,
    DmaDst = 2,
    CpuLinear = 3,
    Debugger = 4,
}

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    page: u32,
    hint: usize,
}

const CHANNEL_PAGE_INVALID: u32 = 0xFFFF_FFFF;

// ── Configuration ─────────────────────────────────────────────

/// What to do about accesses nothing decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnhandledPolicy {
    /// Treat the access as fatal.
    Fatal,
    /// Report the first offender, then fall silent.
    WarnOnce,
    /// Report every offender.
    Warn,
    /// Stay quiet entirely.
    Silent,
}

/// Strategy knobs. Observable behaviour is identical for every
/// combination of the two decode flags; see the equivalence tests.
#[derive(Debug, Clone, Copy)]
pub struct MemCfg {
    /// Materialise the whole 8 KiB window on decode instead of only
    /// the touched slot.
    pub full_window_decode: bool,
    /// Invalidate all 256 slots on `MAP` instead of the affected
    /// windows.
    pub full_invalidation: bool,
    /// Policy for undecoded accesses.
    pub skip_unhandled_mem: UnhandledPolicy,
}

impl Default for MemCfg {
    fn default() -> Self {
        Self {
            full_window_decode: false,
            full_invalidation: false,
            skip_unhandled_mem: UnhandledPolicy::WarnOnce,
        }
    }
}

// ── MemoryCore ────────────────────────────────────────────────

/// One complete memory subsystem. Owns all storage, the dispatch
/// tables and the mapping state; independent instances do not share
/// anything.
pub struct MemoryCore {
    pub(crate) storage: Storage,
    pub(crate) slots: [SlotEntry; SLOT_COUNT],
    /// Region-walk hints, one per 4 KiB logical page.
    pub(crate) decode_hints: [usize; 16],
    channels: [ChannelState; CHANNEL_SLOTS],
    pub(crate) mapper: MapperState,
    legacy_io: LegacyIoMatrix,
    vic_iomode: u8,
    pub cfg: MemCfg,
    /// Old byte during a callback-based read-modify-write; `None`
    /// whenever no such write is on the stack.
    rmw_old_data: Option<u8>,
    pc_fn: Option<Box<dyn Fn() -> u16>>,
    speed_fn: Option<Box<dyn FnMut(bool)>>,
}

impl MemoryCore {
    /// Power-on initialisation: zero-filled RAM, filled constant
    /// pages, seeded colour shadows, everything invalidated.
    pub fn new() -> Self {
        check_region_table();
        let mut core = Self {
            storage: Storage::new(),
            slots: [SlotEntry::INVALID; SLOT_COUNT],
            decode_hints: [0; 16],
            channels: [ChannelState { page: CHANNEL_PAGE_INVALID, hint: 0 }; CHANNEL_SLOTS],
            mapper: MapperState::new(),
            legacy_io: LegacyIoMatrix::new(),
            vic_iomode: 0,
            cfg: MemCfg::default(),
            rmw_old_data: None,
            pc_fn: None,
            speed_fn: None,
        };
        core.invalidate_mapper_all();
        core.invalidate_channels();
        core
    }

    /// Restore power-on mapping state without touching RAM contents.
    pub fn reset(&mut self) {
        self.mapper = MapperState::new();
        self.vic_iomode = 0;
        self.rmw_old_data = None;
        self.invalidate_mapper_all();
        self.invalidate_channels();
    }

    /// Load a C65 ROM image into the 128 KiB shadow at 0x20000.
    /// Oversize images are clamped.
    pub fn load_rom(&mut self, data: &[u8]) {
        let len = data.len().min(0x20000);
        self.storage.main_ram[0x20000..0x20000 + len].copy_from_slice(&data[..len]);
    }

    // ── CPU dispatch ──────────────────────────────────────────

    pub fn cpu_read(&mut self, addr: u16) -> u8 {
        let slot = (addr >> 8) as usize;
        loop {
            match self.slots[slot].rd {
                Route::Direct { store, base } => {
                    return self.storage.byte(store, base + (addr & 0xFF) as u32)
                }
                Route::Resolve => self.decode_cpu_slot(slot),
                Route::LegacyIo => return self.legacy_io_read(addr),
                Route::Undecoded => {
                    return self.unhandled_read(self.slots[slot].rd_page | (addr & 0xFF) as u32)
                }
                Route::CpuPort | Route::ColourHead => unreachable!("write hook on read path"),
            }
        }
    }

    pub fn cpu_write(&mut self, addr: u16, value: u8) {
        let slot = (addr >> 8) as usize;
        loop {
            match self.slots[slot].wr {
                Route::Direct { store, base } => {
                    return self.storage.set_byte(store, base + (addr & 0xFF) as u32, value)
                }
                Route::Resolve => self.decode_cpu_slot(slot),
                _ => return self.cpu_write_hook(slot, addr, value),
            }
        }
    }

    /// Read-modify-write store: I/O devices that care observe the old
    /// byte alongside the new one, as on a real 65xx RMW sequence.
    /// Direct-memory targets behave exactly like `cpu_write`.
    pub fn cpu_write_rmw(&mut self, addr: u16, old: u8, new: u8) {
        let slot = (addr >> 8) as usize;
        loop {
            match self.slots[slot].wr {
                Route::Direct { store, base } => {
                    return self.storage.set_byte(store, base + (addr & 0xFF) as u32, new)
                }
                Route::Resolve => self.decode_cpu_slot(slot),
                _ => break,
            }
        }
        self.rmw_old_data = Some(old);
        self.cpu_write_hook(slot, addr, new);
        self.rmw_old_data = None;
    }

    /// Four-byte little-endian read. Each byte re-derives its slot, so
    /// page and address-space wrap-around need no special casing.
    pub fn cpu_read_qbyte(&mut self, addr: u16) -> u32 {
        let mut v = 0u32;
        for i in 0..4 {
            v |= (self.cpu_read(addr.wrapping_add(i)) as u32) << (8 * i);
        }
        v
    }

    pub fn cpu_write_qbyte(&mut self, addr: u16, value: u32) {
        for i in 0..4 {
            self.cpu_write(addr.wrapping_add(i as u16), (value >> (8 * i)) as u8);
        }
    }

    fn cpu_write_hook(&mut self, slot: usize, addr: u16, value: u8) {
        match self.slots[slot].wr {
            Route::CpuPort => self.cpu_port_write((addr & 0xFF) as u8, value),
            Route::ColourHead => {
                self.colour_head_write(self.slots[slot].wr_page | (addr & 0xFF) as u32, value)
            }
            Route::LegacyIo => self.legacy_io_write(addr, value),
            Route::Undecoded => {
                self.unhandled_write(self.slots[slot].wr_page | (addr & 0xFF) as u32, value)
            }
            Route::Direct { .. } | Route::Resolve => unreachable!(),
        }
    }

    // ── Permanent write hooks ─────────────────────────────────

    /// Writer for physical page 0. Offsets 2..=255 are plain RAM; 0/1
    /// are the CPU I/O port, with the C65 speed-control special case
    /// on the direction register.
    fn cpu_port_write(&mut self, low: u8, value: u8) {
        if low >= 2 {
            self.storage.main_ram[low as usize] = value;
            return;
        }
        if low == 0 && (value & 0xFE) == 64 {
            let fast = value & 1 != 0;
            if fast != self.mapper.force_fast {
                self.mapper.force_fast = fast;
                if let Some(f) = self.speed_fn.as_mut() {
                    f(fast);
                }
            }
            return;
        }
        self.mapper.cpu_io_port[low as usize] = value;
        // mirror into RAM so the read side (plain main-RAM view) sees it
        self.storage.main_ram[low as usize] = value;
        self.update_cpu_io_port(true);
    }

    /// Writer for the colour-RAM head: the byte lands in the main-RAM
    /// shadow, in canonical colour RAM, and in the 4-bit-masked copy.
    fn colour_head_write(&mut self, phys: u32, value: u8) {
        let k = (phys - COLOUR_HEAD_BASE) as usize;
        self.storage.main_ram[phys as usize] = value;
        self.storage.colour_ram[k] = value;
        self.storage.c64_colour_ram[k] = (value & 0x0F) | 0xF0;
    }

    // ── Undecoded access policy ───────────────────────────────

    fn unhandled_read(&mut self, phys: u32) -> u8 {
        self.report_unhandled("read", phys);
        MEMORY_UNDECODED_PATTERN
    }

    fn unhandled_write(&mut self, phys: u32, _value: u8) {
        self.report_unhandled("write", phys);
    }

    fn report_unhandled(&mut self, op: &str, phys: u32) {
        match self.cfg.skip_unhandled_mem {
            UnhandledPolicy::Fatal => {
                panic!("unhandled memory {} at ${:07X} (PC ${:04X})", op, phys, self.cpu_pc())
            }
            UnhandledPolicy::WarnOnce => {
                warn!("unhandled memory {} at ${:07X} (PC ${:04X}), further reports suppressed",
                    op, phys, self.cpu_pc());
                self.cfg.skip_unhandled_mem = UnhandledPolicy::Silent;
            }
            UnhandledPolicy::Warn => {
                warn!("unhandled memory {} at ${:07X} (PC ${:04X})", op, phys, self.cpu_pc())
            }
            UnhandledPolicy::Silent => {}
        }
    }

    fn cpu_pc(&self) -> u16 {
        self.pc_fn.as_ref().map_or(0, |f| f())
    }

    // ── Legacy I/O ────────────────────────────────────────────

    fn legacy_io_read(&mut self, addr: u16) -> u8 {
        let iomode = self.vic_iomode;
        self.legacy_io.read(iomode, addr)
    }

    fn legacy_io_write(&mut self, addr: u16, value: u8) {
        let iomode = self.vic_iomode;
        let old = self.rmw_old_data;
        self.legacy_io.write(iomode, addr, value, old);
    }

    /// Register the read handler for one aperture page of one I/O
    /// personality.
    pub fn set_io_reader(&mut self, iomode: usize, page: usize, f: IoReadFn) {
        self.legacy_io.set_reader(iomode, page, f);
    }

    pub fn set_io_writer(&mut self, iomode: usize, page: usize, f: IoWriteFn) {
        self.legacy_io.set_writer(iomode, page, f);
    }

    /// Select the VIC I/O personality (0-3) the aperture dispatches
    /// to. Consulted on every trampoline access, so no invalidation is
    /// needed.
    pub fn set_vic_iomode(&mut self, iomode: u8) {
        self.vic_iomode = iomode & 3;
    }

    pub fn vic_iomode(&self) -> u8 {
        self.vic_iomode
    }

    // ── Bus-master channels ───────────────────────────────────

    pub fn channel_read(&mut self, channel: BusChannel, linaddr: u32) -> u8 {
        let lin = linaddr & PHYS_ADDR_MASK;
        let idx = channel as usize;
        self.channel_touch(idx, lin & PHYS_PAGE_MASK);
        let e = self.slots[CPU_SLOTS + idx];
        let low = lin & 0xFF;
        match e.rd {
            Route::Direct { store, base } => self.storage.byte(store, base + low),
            Route::Undecoded => self.unhandled_read(lin),
            _ => unreachable!("linear decode produced a CPU-only route"),
        }
    }

    pub fn channel_write(&mut self, channel: BusChannel, linaddr: u32, value: u8) {
        let lin = linaddr & PHYS_ADDR_MASK;
        let idx = channel as usize;
        self.channel_touch(idx, lin & PHYS_PAGE_MASK);
        let e = self.slots[CPU_SLOTS + idx];
        let low = lin & 0xFF;
        match e.wr {
            Route::Direct { store, base } => self.storage.set_byte(store, base + low, value),
            Route::CpuPort => self.cpu_port_write(low as u8, value),
            Route::ColourHead => self.colour_head_write(lin, value),
            Route::Undecoded => self.unhandled_write(lin, value),
            _ => unreachable!("linear decode produced a CPU-only route"),
        }
    }

    /// Refill a channel's one-page cache when the access leaves the
    /// cached page.
    fn channel_touch(&mut self, idx: usize, page: u32) {
        if page == self.channels[idx].page {
            return;
        }
        let slot = CPU_SLOTS + idx;
        let hint = self.channels[idx].hint;
        let hint = self.resolve_linear_read(page, slot, hint);
        let hint = self.resolve_linear_write(page, slot, hint);
        self.channels[idx] = ChannelState { page, hint };
    }

    // ── Invalidation ──────────────────────────────────────────

    /// Mark the slot range `[first, last]` unresolved; the next access
    /// through any of them re-runs the logical decoder.
    pub fn invalidate_mapper(&mut self, first: usize, last: usize) {
        for s in first..=last.min(CPU_SLOTS - 1) {
            self.slots[s] = SlotEntry::INVALID;
        }
    }

    pub fn invalidate_mapper_all(&mut self) {
        self.invalidate_mapper(0, CPU_SLOTS - 1);
    }

    /// Drop every channel's one-page cache. Channel slots are exempt
    /// from CPU-side invalidation and only flushed here.
    pub fn invalidate_channels(&mut self) {
        for c in self.channels.iter_mut() {
            c.page = CHANNEL_PAGE_INVALID;
            c.hint = 0;
        }
    }

    // ── Collaborator wiring ───────────────────────────────────

    /// Wire up the CPU program-counter getter used by undecoded-access
    /// diagnostics.
    pub fn set_pc_fn(&mut self, f: Box<dyn Fn() -> u16>) {
        self.pc_fn = Some(f);
    }

    /// Wire up the machine-speed governor signalled by `force_fast`
    /// toggles.
    pub fn set_speed_fn(&mut self, f: Box<dyn FnMut(bool)>) {
        self.speed_fn = Some(f);
    }

    // ── State accessors ───────────────────────────────────────

    pub fn cpu_inhibit_interrupts(&self) -> bool {
        self.mapper.cpu_inhibit_interrupts
    }

    pub fn in_hypervisor(&self) -> bool {
        self.mapper.in_hypervisor
    }

    pub fn rom_protect(&self) -> bool {
        self.mapper.rom_protect
    }

    pub fn force_fast(&self) -> bool {
        self.mapper.force_fast
    }

    pub fn legacy_io_is_mapped(&self) -> bool {
        self.mapper.legacy_io_is_mapped
    }

    pub fn c64_memlayout(&self) -> u8 {
        self.mapper.c64_memlayout
    }

    /// Old byte of an in-flight read-modify-write, `None` otherwise.
    pub fn rmw_old_data(&self) -> Option<u8> {
        self.rmw_old_data
    }

    pub fn main_ram(&self) -> &[u8] {
        &self.storage.main_ram
    }

    pub fn slow_ram(&self) -> &[u8] {
        &self.storage.slow_ram
    }

    pub fn colour_ram(&self) -> &[u8] {
        &self.storage.colour_ram
    }

    /// Colour RAM with the upper nibble forced to 1s: what a C64
    /// I/O-mode read of colour RAM returns.
    pub fn c64_colour_ram(&self) -> &[u8] {
        &self.storage.c64_colour_ram
    }

    pub fn hyper_ram(&self) -> &[u8] {
        &self.storage.hyper_ram
    }
}

impl Default for MemoryCore {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoding_twice_yields_identical_entries() {
        let mut core = MemoryCore::new();
        core.cpu_write(0, 0x2F);
        core.cpu_write(1, 0x37);
        for slot in [0x00, 0x45, 0xA0, 0xD3, 0xE9, 0xFF] {
            core.decode_cpu_slot(slot);
            let first = core.slots[slot];
            core.decode_cpu_slot(slot);
            assert_eq!(core.slots[slot], first, "slot {:#04x} not idempotent", slot);
        }
    }

    #[test]
    fn invalidation_routes_both_sides_to_the_resolver() {
        let mut core = MemoryCore::new();
        core.cpu_read(0x1234);
        core.cpu_write(0x1234, 0xAA);
        assert!(matches!(core.slots[0x12].rd, Route::Direct { .. }));
        core.invalidate_mapper(0x12, 0x12);
        assert_eq!(core.slots[0x12], SlotEntry::INVALID);
        // the next touch re-materialises
        assert_eq!(core.cpu_read(0x1234), 0xAA);
    }

    #[test]
    fn channel_cache_survives_within_a_page_only() {
        let mut core = MemoryCore::new();
        core.channel_write(BusChannel::DmaDst, 0x40000, 0x55);
        assert_eq!(core.channels[BusChannel::DmaDst as usize].page, 0x40000);
        core.channel_write(BusChannel::DmaDst, 0x40123, 0x66);
        assert_eq!(core.channels[BusChannel::DmaDst as usize].page, 0x40100);
        assert_eq!(core.storage.main_ram[0x40000], 0x55);
        assert_eq!(core.storage.main_ram[0x40123], 0x66);
    }
}
