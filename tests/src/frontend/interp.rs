use gekko_core::state::{cr, exception, msr, program, spr, vector};
use gekko_core::{GuestInstruction, GuestMemory, PpcState, GEKKO_PVR};
use gekko_exec::Memory;
use gekko_frontend::{gekko_table, Interpreter};

use crate::asm::*;

/// Step `n` instructions of `program` after `setup` ran on the state.
fn step(program: &[u32], n: usize, setup: impl FnOnce(&mut PpcState)) -> (PpcState, Memory) {
    let (mut state, mut mem) = machine(program);
    setup(&mut state);
    let table = gekko_table().unwrap();
    for _ in 0..n {
        Interpreter::new(&mut state, &mut mem).step(table);
    }
    (state, mem)
}

#[test]
fn immediates() {
    let (s, _) = step(&[li(3, -2), lis(4, 0x1234), ori(4, 4, 0x5678), addis(5, 4, -1)], 4, |_| {});
    assert_eq!(s.gpr[3], 0xFFFF_FFFE);
    assert_eq!(s.gpr[4], 0x1234_5678);
    assert_eq!(s.gpr[5], 0x1233_5678);
    assert_eq!(s.pc, at(4));
}

#[test]
fn record_form_sets_cr0_with_so() {
    let (s, _) = step(&[add(3, 4, 5, true)], 1, |s| {
        s.gpr[4] = 1;
        s.gpr[5] = u32::MAX;
        s.set_xer(0x8000_0000);
    });
    assert_eq!(s.gpr[3], 0);
    assert_eq!(s.cr_field(0), cr::EQ | cr::SO);
}

#[test]
fn carries() {
    let (s, _) = step(&[addc(3, 4, 5), addic(6, 4, 1)], 2, |s| {
        s.gpr[4] = u32::MAX;
        s.gpr[5] = 1;
    });
    assert_eq!(s.gpr[3], 0);
    assert_eq!(s.gpr[6], 0);
    assert_eq!(s.xer_ca, 1);

    let (s, _) = step(&[subfic(3, 4, 10)], 1, |s| s.gpr[4] = 3);
    assert_eq!(s.gpr[3], 7);
    assert_eq!(s.xer_ca, 1);

    let (s, _) = step(&[srawi(3, 4, 1)], 1, |s| s.gpr[4] = -3i32 as u32);
    assert_eq!(s.gpr[3], -2i32 as u32);
    assert_eq!(s.xer_ca, 1);
}

#[test]
fn rotates_and_logic() {
    let (s, _) = step(
        &[rlwinm(3, 4, 8, 24, 31, false), cntlzw(5, 4), extsh(6, 4), andc(7, 4, 8)],
        4,
        |s| {
            s.gpr[4] = 0x1234_8678;
            s.gpr[8] = 0xFFFF_0000;
        },
    );
    assert_eq!(s.gpr[3], 0x12);
    assert_eq!(s.gpr[5], 3);
    assert_eq!(s.gpr[6], 0xFFFF_8678);
    assert_eq!(s.gpr[7], 0x8678);
}

#[test]
fn divide_by_zero_gives_sign_mask() {
    let (s, _) = step(&[divw(3, 4, 5), divw(6, 7, 5)], 2, |s| {
        s.gpr[4] = -5i32 as u32;
        s.gpr[7] = 5;
    });
    assert_eq!(s.gpr[3], u32::MAX);
    assert_eq!(s.gpr[6], 0);
}

#[test]
fn compares_fill_cr_fields() {
    let (s, _) = step(&[cmpwi(0, 3, 0), cmplwi(7, 3, 0), cmpw(2, 3, 4)], 3, |s| {
        s.gpr[3] = -1i32 as u32;
        s.gpr[4] = -1i32 as u32;
    });
    assert_eq!(s.cr_field(0), cr::LT);
    assert_eq!(s.cr_field(7), cr::GT);
    assert_eq!(s.cr_field(2), cr::EQ);
}

#[test]
fn loads_and_stores_are_big_endian() {
    let (s, mut mem) = step(
        &[stw(3, 0, 9), lbz(4, 0, 9), lha(5, 2, 9), stwu(3, 8, 9), lwzx(6, 9, 10)],
        5,
        |s| {
            s.gpr[3] = 0x1122_8344;
            s.gpr[9] = DATA_BASE;
        },
    );
    assert_eq!(mem.read_u32(DATA_BASE).unwrap(), 0x1122_8344);
    assert_eq!(s.gpr[4], 0x11);
    assert_eq!(s.gpr[5], 0xFFFF_8344);
    assert_eq!(s.gpr[9], DATA_BASE + 8);
    assert_eq!(s.gpr[6], 0x1122_8344);
}

#[test]
fn faulting_load_raises_dsi_without_writing() {
    let (s, _) = step(&[lwzu(3, 4, 9)], 1, |s| {
        s.gpr[3] = 7;
        s.gpr[9] = 0x7000_0000;
    });
    assert_eq!(s.gpr[3], 7);
    assert_eq!(s.gpr[9], 0x7000_0000);
    assert_eq!(s.pc, vector::DSI);
    assert_eq!(s.spr[spr::SRR0], at(0));
    assert_eq!(s.spr[spr::DAR], 0x7000_0004);
    assert_eq!(s.spr[spr::DSISR], 0x4000_0000);
    assert_eq!(s.exceptions & exception::DSI, 0);
}

#[test]
fn faulting_store_sets_dsisr_store_bit() {
    let (s, _) = step(&[stw(3, 0, 9)], 1, |s| s.gpr[9] = 0x7000_0000);
    assert_eq!(s.pc, vector::DSI);
    assert_eq!(s.spr[spr::DSISR], 0x4200_0000);
}

#[test]
fn branch_and_link() {
    let (s, _) = step(&[bl(8), NOP, BLR], 2, |_| {});
    assert_eq!(s.lr(), at(1));
    assert_eq!(s.pc, at(1));
}

#[test]
fn counted_loop() {
    let program = [li(3, 0), li(4, 5), mtctr(4), addi(3, 3, 2), bdnz(-4), HANG];
    let (mut state, mut mem) = machine(&program);
    interpret_until(&mut state, &mut mem, at(5), 100);
    assert_eq!(state.pc, at(5));
    assert_eq!(state.gpr[3], 10);
    assert_eq!(state.ctr(), 0);
}

#[test]
fn conditional_branch_reads_cr() {
    let program = [cmpwi(0, 3, 0), bc(BO_TRUE, CR0_EQ, 8), li(4, 1), HANG];
    let (s, _) = step(&program, 2, |_| {});
    assert_eq!(s.pc, at(3));
    let (s, _) = step(&program, 2, |s| s.gpr[3] = 1);
    assert_eq!(s.pc, at(2));
}

#[test]
fn syscall_returns_after_itself() {
    let (s, _) = step(&[SC], 1, |s| s.msr = msr::EE | msr::FP);
    assert_eq!(s.pc, vector::SYSCALL);
    assert_eq!(s.spr[spr::SRR0], at(1));
    assert_eq!(s.spr[spr::SRR1], msr::EE | msr::FP);
    assert_eq!(s.msr & msr::EE, 0);
}

#[test]
fn float_needs_msr_fp() {
    let (s, _) = step(&[fadd(1, 2, 3)], 1, |s| {
        s.set_ps0_f64(2, 1.0);
        s.set_ps0_f64(3, 2.0);
    });
    assert_eq!(s.pc, vector::FPU_UNAVAILABLE);
    assert_eq!(s.spr[spr::SRR0], at(0));
    assert_eq!(s.ps[1].ps0, 0);

    let (s, _) = step(&[fadd(1, 2, 3), fmul(4, 1, 1)], 2, |s| {
        s.msr = msr::FP;
        s.set_ps0_f64(2, 1.0);
        s.set_ps0_f64(3, 2.0);
    });
    assert_eq!(s.ps0_f64(1), 3.0);
    assert_eq!(s.ps0_f64(4), 9.0);
}

#[test]
fn single_precision_writes_both_halves() {
    let (s, _) = step(&[fadds(1, 2, 3)], 1, |s| {
        s.msr = msr::FP;
        s.set_ps0_f64(2, 0.1);
        s.set_ps0_f64(3, 0.2);
    });
    let expected = (0.1f64 + 0.2) as f32 as f64;
    assert_eq!(s.ps[1].ps0_f64(), expected);
    assert_eq!(s.ps[1].ps1_f64(), expected);
}

#[test]
fn float_memory_round_trip() {
    let (s, mut mem) = step(&[stfd(1, 0, 9), lfs(2, 0, 10), stfs(2, 8, 9), lfd(3, 0, 9)], 4, |s| {
        s.msr = msr::FP;
        s.set_ps0_f64(1, -2.5);
        s.gpr[9] = DATA_BASE;
        s.gpr[10] = DATA_BASE + 0x40;
    });
    assert_eq!(mem.read_u64(DATA_BASE).unwrap(), (-2.5f64).to_bits());
    assert_eq!(s.ps0_f64(3), -2.5);
    assert_eq!(s.ps0_f64(2), 0.0);
}

#[test]
fn spr_moves() {
    let (s, _) = step(&[mfspr(3, spr::PVR as u32), mtlr(4), mfspr(5, spr::LR as u32)], 3, |s| {
        s.gpr[4] = 0x8000_1234;
    });
    assert_eq!(s.gpr[3], GEKKO_PVR);
    assert_eq!(s.lr(), 0x8000_1234);
    assert_eq!(s.gpr[5], 0x8000_1234);
}

#[test]
fn unknown_opcode_is_a_program_exception() {
    let (s, _) = step(&[1 << 26], 1, |_| {});
    assert_eq!(s.pc, vector::PROGRAM);
    assert_eq!(s.spr[spr::SRR0], at(0));
    assert_ne!(s.spr[spr::SRR1] & program::ILLEGAL, 0);
    assert_eq!(s.program_cause, 0);
}

#[test]
fn privileged_spr_access_in_user_mode() {
    let srr0 = spr::SRR0 as u32;
    let (s, _) = step(&[mfspr(3, srr0)], 1, |s| {
        s.msr = msr::PR;
        s.gpr[3] = 7;
        s.spr[spr::SRR0] = 0x1234;
    });
    assert_eq!(s.pc, vector::PROGRAM);
    assert_eq!(s.gpr[3], 7);
    assert_eq!(s.spr[spr::SRR0], at(0));
    assert_ne!(s.spr[spr::SRR1] & program::PRIVILEGED, 0);
    assert_ne!(s.spr[spr::SRR1] & msr::PR, 0);

    let (s, _) = step(&[mtspr(spr::DEC as u32, 4)], 1, |s| {
        s.msr = msr::PR;
        s.gpr[4] = 99;
    });
    assert_eq!(s.pc, vector::PROGRAM);
    assert_ne!(s.spr[spr::DEC], 99);
    assert_ne!(s.spr[spr::SRR1] & program::PRIVILEGED, 0);

    // Supervisor mode reads it normally.
    let (s, _) = step(&[mfspr(3, srr0)], 1, |s| s.spr[spr::SRR0] = 0x1234);
    assert_eq!(s.gpr[3], 0x1234);
    assert_eq!(s.pc, at(1));
}

#[test]
fn trap_sets_the_trap_cause() {
    let (s, _) = step(&[tw(4, 3, 4)], 1, |s| {
        s.gpr[3] = 5;
        s.gpr[4] = 5;
    });
    assert_eq!(s.pc, vector::PROGRAM);
    assert_eq!(s.spr[spr::SRR1] & (program::TRAP | program::ILLEGAL), program::TRAP);

    let (s, _) = step(&[tw(4, 3, 4)], 1, |s| s.gpr[4] = 1);
    assert_eq!(s.pc, at(1));
}

#[test]
fn unmapped_fetch_is_isi() {
    let mut state = PpcState::new();
    let mut mem = Memory::new(1024 * 1024);
    state.pc = 0x7000_0000;
    let cycles = Interpreter::new(&mut state, &mut mem).step(gekko_table().unwrap());
    assert_eq!(cycles, 1);
    assert_eq!(state.pc, vector::ISI);
    assert_eq!(state.spr[spr::SRR0], 0x7000_0000);
}

#[test]
fn execute_leaves_pc_alone() {
    let (mut state, mut mem) = machine(&[]);
    let table = gekko_table().unwrap();
    Interpreter::new(&mut state, &mut mem).execute(table, GuestInstruction(li(3, 9)));
    assert_eq!(state.gpr[3], 9);
    assert_eq!(state.pc, CODE_BASE);

    Interpreter::new(&mut state, &mut mem).execute(table, GuestInstruction(SC));
    assert_eq!(state.exceptions, exception::SYSCALL);
    assert_eq!(state.pc, CODE_BASE);
}
