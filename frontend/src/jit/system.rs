//! System calls, synchronization and the SPR moves worth inlining.

use gekko_backend::vm::emitter::{
    emit_alu_ri, emit_ld_state, emit_st_state, emit_st_state_imm,
};
use gekko_backend::vm::regs::RSCRATCH;
use gekko_backend::vm::AluOp;
use gekko_core::state::{exception, spr};
use gekko_core::StateSlot;

use super::Translator;
use crate::analyzer::CodeOp;

/// SPRs held in plain state slots with no side effects on access.
fn inline_spr(n: u32) -> Option<StateSlot> {
    match n as usize {
        spr::LR | spr::CTR => Some(StateSlot::Spr(n as u16)),
        _ => None,
    }
}

pub fn sc(t: &mut Translator<'_>, op: &CodeOp) {
    t.flush_all();
    emit_ld_state(t.buf, RSCRATCH, StateSlot::Exceptions);
    emit_alu_ri(t.buf, AluOp::Or, RSCRATCH, exception::SYSCALL);
    emit_st_state(t.buf, RSCRATCH, StateSlot::Exceptions);
    emit_st_state_imm(t.buf, StateSlot::Pc, op.address);
    emit_st_state_imm(t.buf, StateSlot::Npc, op.address.wrapping_add(4));
    t.emit_exception_exit();
}

/// Nothing to emit: memory is coherent and there is no data cache.
pub fn no_op(_t: &mut Translator<'_>, _op: &CodeOp) {}

pub fn mfspr(t: &mut Translator<'_>, op: &CodeOp) {
    let Some(slot) = inline_spr(op.insn.spr()) else {
        t.fallback(op);
        return;
    };
    emit_ld_state(t.buf, RSCRATCH, slot);
    t.commit(op.insn.rd(), false);
}

pub fn mtspr(t: &mut Translator<'_>, op: &CodeOp) {
    let Some(slot) = inline_spr(op.insn.spr()) else {
        t.fallback(op);
        return;
    };
    let rs = t.gpr_in(op.insn.rs());
    emit_st_state(t.buf, rs, slot);
}
