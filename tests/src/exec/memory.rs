use gekko_core::{AccessSize, GuestMemory, JitConfig, GATHER_PIPE_ADDRESS, GATHER_PIPE_BURST};
use gekko_exec::{GatherPipe, Memory, HW_REGS_BASE};

use crate::asm::*;

#[test]
fn ram_is_mirrored() {
    let mut mem = Memory::new(0x1000);
    mem.write_u32(0xDEAD_BEEF, 0x8000_0010).unwrap();
    assert_eq!(mem.read_u32(0x10).unwrap(), 0xDEAD_BEEF);
    assert_eq!(mem.read_u32(0xC000_0010).unwrap(), 0xDEAD_BEEF);
    assert_eq!(&mem.ram()[0x10..0x14], &[0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn unmapped_access_faults() {
    let mut mem = Memory::new(0x1000);
    let fault = mem.read_u16(0x7000_0000).unwrap_err();
    assert_eq!(fault.address, 0x7000_0000);
    assert!(!fault.is_store);

    let fault = mem.write_u8(1, 0x8000_1000).unwrap_err();
    assert!(fault.is_store);

    // Straddling the end of RAM.
    assert!(mem.read_u32(0x8000_0FFE).is_err());
}

#[test]
fn hardware_registers_are_not_fastmem() {
    let mut mem = Memory::new(0x1000);
    mem.write_u16(0x1234, HW_REGS_BASE + 4).unwrap();
    assert_eq!(mem.read_u16(HW_REGS_BASE + 4).unwrap(), 0x1234);
    assert_eq!(&mem.hw_regs()[4..6], &[0x12, 0x34]);
    assert!(mem.fastmem(HW_REGS_BASE + 4, 2).is_none());
    assert!(mem.fastmem(0x8000_0000, 4).is_some());
}

#[test]
fn gather_pipe_moves_whole_bursts() {
    let mut pipe = GatherPipe::new();
    for i in 0..9u64 {
        pipe.write(AccessSize::U32, i);
    }
    assert_eq!(pipe.pending_len(), 36);

    assert_eq!(pipe.flush(), GATHER_PIPE_BURST);
    assert_eq!(pipe.pending_len(), 4);
    assert_eq!(pipe.fifo().len(), 32);
    assert_eq!(&pipe.fifo()[..8], &[0, 0, 0, 0, 0, 0, 0, 1]);

    assert_eq!(pipe.flush(), 0);
}

#[test]
fn gather_pipe_watermark_latches_once() {
    let mut pipe = GatherPipe::new();
    pipe.set_watermark(Some(80));
    for _ in 0..8 {
        pipe.write(AccessSize::U64, u64::MAX);
    }
    pipe.flush();
    assert!(!pipe.take_interrupt());

    for _ in 0..4 {
        pipe.write(AccessSize::U64, 0);
    }
    pipe.flush();
    assert!(pipe.take_interrupt());
    assert!(!pipe.take_interrupt());
    assert_eq!(pipe.take_fifo().len(), 96);
    assert!(pipe.fifo().is_empty());
}

#[test]
fn gather_pipe_address_bypasses_registers() {
    let mut mem = Memory::new(0x1000);
    mem.write_u32(0x0102_0304, GATHER_PIPE_ADDRESS).unwrap();
    mem.write_u8(5, GATHER_PIPE_ADDRESS).unwrap();
    assert_eq!(mem.gather_pipe.pending_len(), 5);
    assert!(mem.hw_regs().iter().all(|&b| b == 0));
}

#[test]
fn jit_gather_pipe_stores_reach_fifo() {
    let mut program = vec![lis(3, 0xCC01u32 as i32)];
    for i in 0..16 {
        program.push(li(4, i));
        program.push(stw(4, -0x8000, 3));
    }
    program.push(HANG);
    let (mut state, mut mem) = machine(&program);
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 2_000);

    let fifo = mem.gather_pipe.take_fifo();
    assert_eq!(fifo.len(), 64);
    let words: Vec<u32> = fifo
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(words, (0..16).collect::<Vec<u32>>());
    assert!(jit.faults().site_count() == 0);
}
