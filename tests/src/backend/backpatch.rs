use gekko_backend::backpatch::TRAMPOLINE_MAX_SIZE;
use gekko_backend::vm::emitter::{emit_load_fast, emit_unary, write_jmp_at};
use gekko_backend::vm::{decode_all, HostOp, Reg, UnaryOp, JMP_SIZE};
use gekko_backend::{emit_trampoline, BackpatchSite, CodeBuffer};
use gekko_core::{AccessSize, RegSet};

fn site(is_store: bool, size: AccessSize, signed: bool, live: RegSet) -> BackpatchSite {
    BackpatchSite {
        fault_at: 0,
        region_start: 0,
        region_end: 0x40,
        size,
        signed,
        is_store,
        value: Reg::R5,
        addr: Reg::R6,
        disp: 8,
        offset_added: false,
        live,
        guest_pc: 0x8000_0000,
    }
}

fn trampoline_ops(site: &BackpatchSite) -> Vec<HostOp> {
    let mut buf = CodeBuffer::with_trampolines(8192, 4096).unwrap();
    let at = buf.trampoline_region().start;
    let (start, end) = buf.emit_at(at, |buf| emit_trampoline(buf, site));
    assert_eq!(start, at);
    assert_eq!(buf.offset(), 0);
    assert!(end - start <= TRAMPOLINE_MAX_SIZE);
    decode_all(buf.range(start, end), start)
        .unwrap()
        .into_iter()
        .map(|(_, op)| op)
        .collect()
}

#[test]
fn load_trampoline_does_not_save_its_destination() {
    let live = RegSet::EMPTY.set(Reg::R5.index()).set(Reg::R7.index());
    let ops = trampoline_ops(&site(false, AccessSize::U32, false, live));
    let mask = 1 << Reg::R7.index();
    assert_eq!(
        ops,
        vec![
            HostOp::Push { mask },
            HostOp::LoadSlow { size: AccessSize::U32, dst: Reg::R5, addr: Reg::R6, disp: 8 },
            HostOp::Pop { mask },
            HostOp::Jmp { target: 0x40 },
        ]
    );
}

#[test]
fn store_trampoline_saves_the_whole_live_set() {
    let live = RegSet::EMPTY.set(Reg::R5.index());
    let ops = trampoline_ops(&site(true, AccessSize::U16, false, live));
    let mask = 1 << Reg::R5.index();
    assert_eq!(
        ops,
        vec![
            HostOp::Push { mask },
            HostOp::StoreSlow { size: AccessSize::U16, src: Reg::R5, addr: Reg::R6, disp: 8 },
            HostOp::Pop { mask },
            HostOp::Jmp { target: 0x40 },
        ]
    );
}

#[test]
fn signed_halfword_load_is_sign_extended() {
    let ops = trampoline_ops(&site(false, AccessSize::U16, true, RegSet::EMPTY));
    assert_eq!(
        ops,
        vec![
            HostOp::LoadSlow { size: AccessSize::U16, dst: Reg::R5, addr: Reg::R6, disp: 8 },
            HostOp::Unary { op: UnaryOp::ExtS16, dst: Reg::R5 },
            HostOp::Jmp { target: 0x40 },
        ]
    );
}

#[test]
fn patched_region_is_a_jump_then_traps() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let start = buf.offset();
    emit_load_fast(&mut buf, AccessSize::U16, Reg::R5, Reg::R6, 0);
    emit_unary(&mut buf, UnaryOp::Bswap16, Reg::R5);
    emit_unary(&mut buf, UnaryOp::ExtS16, Reg::R5);
    let end = buf.offset();
    assert!(end - start >= JMP_SIZE);

    write_jmp_at(&mut buf, start, end - start, 0x800);
    assert_eq!(buf.offset(), end);
    let ops = decode_all(buf.range(start, end), start).unwrap();
    assert_eq!(ops[0], (start, HostOp::Jmp { target: 0x800 }));
    assert!(ops[1..].iter().all(|&(_, op)| op == HostOp::Trap));
    assert_eq!(ops.len(), 1 + end - start - JMP_SIZE);
}
