//! Snapshot of the persistent machine state.
//!
//! Covers the canonical buffers and the mapping registers; derived
//! state (slot tables, channel caches, colour shadows) is rebuilt on
//! restore. Buffers of the wrong length are clamped, the way ROM
//! loading clamps oversize images.

use serde::{Deserialize, Serialize};

use crate::mapper::VIC3_ROM_BITS;
use crate::memcore::MemoryCore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub main_ram: Vec<u8>,
    pub slow_ram: Vec<u8>,
    pub colour_ram: Vec<u8>,
    pub hyper_ram: Vec<u8>,
    pub cpu_io_port: [u8; 2],
    pub map_offset_lo: u32,
    pub map_offset_hi: u32,
    pub map_mb_lo: u32,
    pub map_mb_hi: u32,
    pub map_mask: u8,
    pub rom_protect: bool,
    pub force_fast: bool,
    pub c64_memlayout: u8,
    pub vic3_rom_cfg: u8,
}

fn copy_clamped(dst: &mut [u8], src: &[u8]) {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
}

impl MemoryCore {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            main_ram: self.storage.main_ram.clone(),
            slow_ram: self.storage.slow_ram.clone(),
            colour_ram: self.storage.colour_ram.clone(),
            hyper_ram: self.storage.hyper_ram.clone(),
            cpu_io_port: self.mapper.cpu_io_port,
            map_offset_lo: self.mapper.map_offset_lo,
            map_offset_hi: self.mapper.map_offset_hi,
            map_mb_lo: self.mapper.map_mb_lo,
            map_mb_hi: self.mapper.map_mb_hi,
            map_mask: self.mapper.map_mask,
            rom_protect: self.mapper.rom_protect,
            force_fast: self.mapper.force_fast,
            c64_memlayout: self.mapper.c64_memlayout,
            vic3_rom_cfg: self.mapper.vic3_rom_cfg,
        }
    }

    /// Restore a snapshot. All slot tables and channel caches are
    /// invalidated and the colour shadows regenerated from canonical
    /// colour RAM.
    pub fn restore(&mut self, snap: &Snapshot) {
        copy_clamped(&mut self.storage.main_ram, &snap.main_ram);
        copy_clamped(&mut self.storage.slow_ram, &snap.slow_ram);
        copy_clamped(&mut self.storage.colour_ram, &snap.colour_ram);
        copy_clamped(&mut self.storage.hyper_ram, &snap.hyper_ram);

        let m = &mut self.mapper;
        m.cpu_io_port = snap.cpu_io_port;
        m.map_offset_lo = snap.map_offset_lo;
        m.map_offset_hi = snap.map_offset_hi;
        m.map_mb_lo = snap.map_mb_lo;
        m.map_mb_hi = snap.map_mb_hi;
        m.map_mask = snap.map_mask;
        m.rom_protect = snap.rom_protect;
        m.force_fast = snap.force_fast;
        m.c64_memlayout = snap.c64_memlayout;
        m.vic3_rom_cfg = snap.vic3_rom_cfg;
        m.vic3_rom_mask = if m.in_hypervisor { 0 } else { snap.vic3_rom_cfg & VIC3_ROM_BITS };

        self.storage.seed_colour_shadows();
        self.invalidate_mapper_all();
        self.invalidate_channels();
    }
}
