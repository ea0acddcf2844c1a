//! Strategy-equivalence property: for any access sequence, a core
//! using lazy single-slot decode with partial invalidation produces
//! the same byte stream and the same final memory image as a core
//! using full-window decode with full invalidation.

use proptest::prelude::*;

use mega65_mem::{BusChannel, MemCfg, MemoryCore, UnhandledPolicy};

#[derive(Debug, Clone)]
enum Op {
    Read(u16),
    Write(u16, u8),
    Rmw(u16, u8, u8),
    ReadQ(u16),
    WriteQ(u16, u32),
    Map(u8, u8, u8, u8),
    Eom,
    PortDdr(u8),
    PortData(u8),
    Vic3(u8),
    Hypervisor(bool),
    RomProtect(bool),
    ChanRead(usize, u32),
    ChanWrite(usize, u32, u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u16>().prop_map(Op::Read),
        (any::<u16>(), any::<u8>()).prop_map(|(a, v)| Op::Write(a, v)),
        (any::<u16>(), any::<u8>(), any::<u8>()).prop_map(|(a, o, n)| Op::Rmw(a, o, n)),
        any::<u16>().prop_map(Op::ReadQ),
        (any::<u16>(), any::<u32>()).prop_map(|(a, v)| Op::WriteQ(a, v)),
        (any::<u8>(), any::<u8>(), any::<u8>(), any::<u8>())
            .prop_map(|(a, x, y, z)| Op::Map(a, x, y, z)),
        Just(Op::Eom),
        any::<u8>().prop_map(Op::PortDdr),
        any::<u8>().prop_map(Op::PortData),
        any::<u8>().prop_map(Op::Vic3),
        any::<bool>().prop_map(Op::Hypervisor),
        any::<bool>().prop_map(Op::RomProtect),
        (0usize..5, any::<u32>()).prop_map(|(c, a)| Op::ChanRead(c, a)),
        (0usize..5, any::<u32>(), any::<u8>()).prop_map(|(c, a, v)| Op::ChanWrite(c, a, v)),
    ]
}

const CHANNELS: [BusChannel; 5] = [
    BusChannel::DmaList,
    BusChannel::DmaSrc,
    BusChannel::DmaDst,
    BusChannel::CpuLinear,
    BusChannel::Debugger,
];

fn build(full_window_decode: bool, full_invalidation: bool) -> MemoryCore {
    let mut core = MemoryCore::new();
    core.cfg = MemCfg {
        full_window_decode,
        full_invalidation,
        skip_unhandled_mem: UnhandledPolicy::Silent,
    };
    core
}

/// Run the sequence and collect every byte an op produced.
fn run(core: &mut MemoryCore, ops: &[Op]) -> Vec<u32> {
    let mut out = Vec::new();
    for op in ops {
        match *op {
            Op::Read(a) => out.push(core.cpu_read(a) as u32),
            Op::Write(a, v) => core.cpu_write(a, v),
            Op::Rmw(a, o, n) => core.cpu_write_rmw(a, o, n),
            Op::ReadQ(a) => out.push(core.cpu_read_qbyte(a)),
            Op::WriteQ(a, v) => core.cpu_write_qbyte(a, v),
            Op::Map(a, x, y, z) => core.on_map_opcode(a, x, y, z),
            Op::Eom => core.on_eom_opcode(),
            Op::PortDdr(v) => core.cpu_write(0, v),
            Op::PortData(v) => core.cpu_write(1, v),
            Op::Vic3(v) => core.set_vic3_rom_mapping(v),
            Op::Hypervisor(on) => core.set_hypervisor_mode(on),
            Op::RomProtect(on) => core.set_rom_protect(on),
            Op::ChanRead(c, a) => out.push(core.channel_read(CHANNELS[c], a) as u32),
            Op::ChanWrite(c, a, v) => core.channel_write(CHANNELS[c], a, v),
        }
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn lazy_partial_equals_full_full(ops in proptest::collection::vec(op_strategy(), 1..80)) {
        let mut lazy = build(false, false);
        let mut full = build(true, true);

        let lazy_out = run(&mut lazy, &ops);
        let full_out = run(&mut full, &ops);
        prop_assert_eq!(lazy_out, full_out);

        prop_assert_eq!(lazy.main_ram(), full.main_ram());
        prop_assert_eq!(lazy.slow_ram(), full.slow_ram());
        prop_assert_eq!(lazy.colour_ram(), full.colour_ram());
        prop_assert_eq!(lazy.c64_colour_ram(), full.c64_colour_ram());
        prop_assert_eq!(lazy.hyper_ram(), full.hyper_ram());
        prop_assert_eq!(lazy.c64_memlayout(), full.c64_memlayout());
        prop_assert_eq!(lazy.cpu_inhibit_interrupts(), full.cpu_inhibit_interrupts());
        prop_assert_eq!(lazy.force_fast(), full.force_fast());
        prop_assert_eq!(lazy.in_hypervisor(), full.in_hypervisor());
        prop_assert_eq!(lazy.rom_protect(), full.rom_protect());
    }
}
