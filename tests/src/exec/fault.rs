use gekko_core::state::{spr, vector};
use gekko_core::JitConfig;
use gekko_exec::HW_REGS_BASE;

use crate::asm::*;

/// `lha r4,0(r3)` from the hardware register window five times. The loop
/// body is compiled twice: once inside the first block and once as the
/// block the `bdnz` jumps back to.
fn hw_read_loop() -> Vec<u32> {
    vec![
        li(5, 5),
        mtctr(5),
        lis(3, (HW_REGS_BASE >> 16) as i32),
        lha(4, 0, 3),
        add(6, 6, 4, false),
        bdnz(-8),
        HANG,
    ]
}

#[test]
fn faulting_site_is_patched_once() {
    let (mut state, mut mem) = machine(&hw_read_loop());
    mem.hw_regs_mut()[..2].copy_from_slice(&[0x80, 0x01]);
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 2_000);

    assert_eq!(state.gpr[4], 0xFFFF_8001);
    assert_eq!(state.gpr[6], 0xFFFF_8001u32.wrapping_mul(5));
    assert_eq!(jit.faults().patched_count(), 2);
    assert!(jit.faults().trampoline_bytes() > 0);

    // Later iterations take the patched jump.
    run_jit(&mut jit, &mut state, &mut mem, 2_000);
    assert_eq!(jit.faults().patched_count(), 2);
}

#[test]
fn patched_region_becomes_a_jump() {
    let (mut state, mut mem) = machine(&hw_read_loop());
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 2_000);

    let id = jit
        .cache()
        .blocks()
        .find(|(_, b)| b.guest_start == at(3))
        .map(|(id, _)| id)
        .unwrap();
    let code = jit.host_code(id).unwrap();
    assert!(!code
        .iter()
        .any(|(_, op)| matches!(op, gekko_backend::vm::HostOp::LoadFast { .. })));
}

#[test]
fn offset_base_is_restored_before_slow_path() {
    // `lwz r3,4(r3)` adds the displacement into r3 before the access.
    let (mut state, mut mem) = machine(&[lwz(3, 4, 3), HANG]);
    state.gpr[3] = HW_REGS_BASE;
    mem.hw_regs_mut()[4..8].copy_from_slice(&[0xCA, 0xFE, 0xBA, 0xBE]);
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 1_000);

    assert_eq!(state.gpr[3], 0xCAFE_BABE);
    assert_eq!(jit.faults().patched_count(), 1);
}

#[test]
fn stores_to_registers_go_through_trampolines() {
    let program = [
        lis(3, (HW_REGS_BASE >> 16) as i32),
        li(4, 0x1234),
        sth(4, 0x10, 3),
        stw(4, 0x20, 3),
        HANG,
    ];
    let (mut state, mut mem) = machine(&program);
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 1_000);

    assert_eq!(&mem.hw_regs()[0x10..0x12], &[0x12, 0x34]);
    assert_eq!(&mem.hw_regs()[0x20..0x24], &[0, 0, 0x12, 0x34]);
    assert_eq!(jit.faults().patched_count(), 2);
}

#[test]
fn clear_forgets_trampolines() {
    let (mut state, mut mem) = machine(&hw_read_loop());
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 2_000);
    assert!(jit.faults().patched_count() > 0);

    jit.clear_cache();
    assert_eq!(jit.faults().patched_count(), 0);
    assert_eq!(jit.faults().trampoline_bytes(), 0);
}

#[test]
fn tiny_trampoline_region_falls_back_to_emulation() {
    let (mut state, mut mem) = machine(&hw_read_loop());
    mem.hw_regs_mut()[..2].copy_from_slice(&[0x00, 0x07]);
    let mut jit = gekko_exec::Jit::new(
        JitConfig::default()
            .with_code_buffer_size(256 * 1024)
            .with_trampoline_region_size(0)
            .with_min_code_space(16 * 1024)
            .with_timeslice_cycles(500),
    )
    .unwrap();
    run_jit(&mut jit, &mut state, &mut mem, 2_000);

    assert_eq!(state.gpr[6], 35);
    assert_eq!(jit.faults().patched_count(), 0);
}

#[test]
fn memcheck_raises_dsi_before_commit() {
    // r5 is loaded from an unmapped address; the add after it must not run.
    let program = [
        li(5, 9),
        lis(3, 0x7000),
        lwz(5, 0, 3),
        addi(6, 5, 1),
        HANG,
    ];
    let (mut state, mut mem) = machine(&program);
    mem.load_words(vector::DSI, &[HANG]).unwrap();
    let mut jit = small_jit(JitConfig::default().with_memcheck(true));
    run_jit(&mut jit, &mut state, &mut mem, 1_000);

    assert_eq!(state.pc, vector::DSI);
    assert_eq!(state.spr[spr::SRR0], at(2));
    assert_eq!(state.spr[spr::DAR], 0x7000_0000);
    assert_eq!(state.spr[spr::DSISR], 0x4000_0000);
    assert_eq!(state.gpr[5], 9);
    assert_eq!(state.gpr[6], 0);
}

#[test]
fn memcheck_store_fault() {
    let program = [lis(3, 0x7000), li(4, 1), stw(4, 8, 3), li(7, 1), HANG];
    let (mut state, mut mem) = machine(&program);
    mem.load_words(vector::DSI, &[HANG]).unwrap();
    let mut jit = small_jit(JitConfig::default().with_memcheck(true).with_fastmem(false));
    run_jit(&mut jit, &mut state, &mut mem, 1_000);

    assert_eq!(state.pc, vector::DSI);
    assert_eq!(state.spr[spr::SRR0], at(2));
    assert_eq!(state.spr[spr::DAR], 0x7000_0008);
    assert_eq!(state.spr[spr::DSISR], 0x4200_0000);
    assert_eq!(state.gpr[7], 0);
}
