//! Dispatcher, timing and breakpoint tests for the execution engine.

mod difftest;
mod fault;
mod memory;

use gekko_core::state::{exception, msr, program, spr, vector};
use gekko_core::JitConfig;
use gekko_exec::RunExit;

use crate::asm::*;

#[test]
fn straight_line_then_hang() {
    let program = [li(3, 5), addi(4, 3, 7), HANG];
    let (mut state, mut mem) = machine(&program);
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 2_000);

    assert_eq!(state.gpr[3], 5);
    assert_eq!(state.gpr[4], 12);
    assert_eq!(state.pc, at(2));
    assert!(jit.total_cycles() >= 2_000);
}

#[test]
fn counted_loop() {
    let program = [
        li(3, 0),
        li(5, 10),
        mtctr(5),
        addi(3, 3, 3),
        bdnz(-4),
        HANG,
    ];
    let (mut state, mut mem) = machine(&program);
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 5_000);

    assert_eq!(state.gpr[3], 30);
    assert_eq!(state.ctr(), 0);
    assert_eq!(state.pc, at(5));
}

#[test]
fn call_and_return() {
    // 0: bl 3; 1: addi r3,r3,1; 2: hang; 3: li r3,41; 4: blr
    let program = [bl(12), addi(3, 3, 1), HANG, li(3, 41), BLR];
    let (mut state, mut mem) = machine(&program);
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 2_000);

    assert_eq!(state.gpr[3], 42);
    assert_eq!(state.lr(), at(1));
}

#[test]
fn budget_is_split_into_timeslices() {
    let (mut state, mut mem) = machine(&[HANG]);
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 1_000);
    let first = jit.total_cycles();
    assert!(first >= 1_000);

    run_jit(&mut jit, &mut state, &mut mem, 1_000);
    assert!(jit.total_cycles() >= first + 1_000);
}

#[test]
fn decrementer_interrupt() {
    let (mut state, mut mem) = machine(&[HANG]);
    mem.load_words(vector::DECREMENTER, &[HANG]).unwrap();
    state.msr = msr::EE;
    state.spr[spr::DEC] = 100;

    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 2_000);

    assert_eq!(state.pc, vector::DECREMENTER);
    assert_eq!(state.spr[spr::SRR0], at(0));
    assert_eq!(state.msr & msr::EE, 0);
    assert_eq!(state.exceptions & exception::DECREMENTER, 0);
}

#[test]
fn decrementer_waits_for_ee() {
    let (mut state, mut mem) = machine(&[HANG]);
    state.spr[spr::DEC] = 100;

    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 2_000);

    assert_eq!(state.pc, at(0));
    assert_ne!(state.exceptions & exception::DECREMENTER, 0);
}

#[test]
fn time_base_advances() {
    let (mut state, mut mem) = machine(&[HANG]);
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 12_000);
    assert!(state.spr[spr::TL] >= 900);
}

#[test]
fn system_call_vectors() {
    let (mut state, mut mem) = machine(&[li(3, 1), SC, HANG]);
    mem.load_words(vector::SYSCALL, &[HANG]).unwrap();
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 1_000);

    assert_eq!(state.pc, vector::SYSCALL);
    assert_eq!(state.spr[spr::SRR0], at(2));
    assert_eq!(state.gpr[3], 1);
}

#[test]
fn unmapped_fetch_raises_isi() {
    let (mut state, mut mem) = machine(&[]);
    mem.load_words(vector::ISI, &[HANG]).unwrap();
    state.pc = 0x7000_0000;
    state.npc = 0x7000_0000;

    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 1_000);

    assert_eq!(state.pc, vector::ISI);
    assert_eq!(state.spr[spr::SRR0], 0x7000_0000);
}

#[test]
fn breakpoint_stops_before_instruction() {
    let program = [li(3, 1), li(4, 2), li(5, 3), HANG];
    let (mut state, mut mem) = machine(&program);
    let mut jit = small_jit(JitConfig::default().with_debugging(true));
    jit.add_breakpoint(at(2));

    let exit = jit.run(&mut state, &mut mem, 1_000).unwrap();
    assert_eq!(exit, RunExit::Breakpoint(at(2)));
    assert_eq!(state.pc, at(2));
    assert_eq!((state.gpr[3], state.gpr[4], state.gpr[5]), (1, 2, 0));

    // Resuming steps over the breakpoint once.
    run_jit(&mut jit, &mut state, &mut mem, 1_000);
    assert_eq!(state.gpr[5], 3);
    assert_eq!(state.pc, at(3));
}

#[test]
fn breakpoint_on_loop_fires_each_iteration() {
    let program = [li(3, 0), addi(3, 3, 1), b(-4)];
    let (mut state, mut mem) = machine(&program);
    let mut jit = small_jit(JitConfig::default().with_debugging(true));
    jit.add_breakpoint(at(1));

    for expected in 0..3 {
        let exit = jit.run(&mut state, &mut mem, 1_000).unwrap();
        assert_eq!(exit, RunExit::Breakpoint(at(1)));
        assert_eq!(state.gpr[3], expected);
    }

    jit.remove_breakpoint(at(1));
    assert!(jit.breakpoints().is_empty());
}

#[test]
fn single_step_compiles_one_instruction_blocks() {
    let program = [li(3, 1), li(4, 2), add(5, 3, 4, false), HANG];
    let (mut state, mut mem) = machine(&program);
    let mut jit = small_jit(JitConfig::default().with_single_step(true));
    run_jit(&mut jit, &mut state, &mut mem, 1_000);

    assert_eq!(state.gpr[5], 3);
    assert!(jit
        .cache()
        .blocks()
        .all(|(_, b)| b.guest_instruction_count == 1));
}

#[test]
fn icbi_invalidates_cache() {
    let program = [li(4, 1), HANG];
    let (mut state, mut mem) = machine(&program);
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 1_000);
    assert_eq!(state.gpr[4], 1);

    let clears = jit.clear_count();
    mem.load_words(CODE_BASE, &[li(4, 2)]).unwrap();
    state.invalidate_icache = true;
    state.pc = CODE_BASE;
    run_jit(&mut jit, &mut state, &mut mem, 1_000);

    assert_eq!(state.gpr[4], 2);
    assert_eq!(jit.clear_count(), clears + 1);
}

#[test]
fn illegal_instruction_with_empty_vectors_spends_the_budget() {
    // The program vector holds zeros too, so every dispatch lands on
    // another illegal word.
    let (mut state, mut mem) = machine(&[0, HANG]);
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 40);

    assert!(jit.total_cycles() >= 40);
    assert_eq!(state.pc, vector::PROGRAM);
    assert_eq!(state.spr[spr::SRR0], vector::PROGRAM);
}

#[test]
fn memcheck_dsi_into_empty_vector_spends_the_budget() {
    let program = [lis(3, 0x7000), lwz(4, 0, 3), HANG];
    let (mut state, mut mem) = machine(&program);
    let mut jit = small_jit(JitConfig::default().with_memcheck(true));
    run_jit(&mut jit, &mut state, &mut mem, 200);

    assert!(jit.total_cycles() >= 200);
    assert_eq!(state.pc, vector::PROGRAM);
    assert_eq!(state.spr[spr::DAR], 0x7000_0000);
}

#[test]
fn not_taken_branch_continues_in_the_same_block() {
    // 0: cmpwi r3,0; 1: beq 3; 2: li r4,1; 3: li r5,2; 4: hang
    let program = [cmpwi(0, 3, 0), bc(BO_TRUE, CR0_EQ, 8), li(4, 1), li(5, 2), HANG];

    let (mut state, mut mem) = machine(&program);
    state.gpr[3] = 7;
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 1_000);
    assert_eq!((state.gpr[4], state.gpr[5]), (1, 2));
    let (_, first) = jit.cache().blocks().find(|(_, b)| b.guest_start == at(0)).unwrap();
    assert_eq!(first.guest_instruction_count, 5);

    let (mut state, mut mem) = machine(&program);
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 1_000);
    assert_eq!((state.gpr[4], state.gpr[5]), (0, 2));
    assert!(jit.cache().blocks().any(|(_, b)| b.guest_start == at(3)));
}

#[test]
fn privileged_spr_read_in_user_mode_raises_program() {
    let code = [li(3, 7), mfspr(3, spr::SRR0 as u32), li(4, 1), HANG];
    let (mut state, mut mem) = machine(&code);
    mem.load_words(vector::PROGRAM, &[HANG]).unwrap();
    state.msr = msr::PR;
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 1_000);

    assert_eq!(state.pc, vector::PROGRAM);
    assert_eq!(state.spr[spr::SRR0], at(1));
    assert_ne!(state.spr[spr::SRR1] & program::PRIVILEGED, 0);
    assert_eq!((state.gpr[3], state.gpr[4]), (7, 0));
}
