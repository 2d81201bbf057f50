//! Branches. The taken path always leaves the block. A conditional branch
//! falls through into the next instruction of the same block.

use gekko_backend::vm::emitter::{
    emit_alu_ri, emit_jcc_ri_fixup, emit_ld_state, emit_st_state, emit_st_state_imm,
    set_jump_target, Fixup,
};
use gekko_backend::vm::regs::{RSCRATCH, RSCRATCH2};
use gekko_backend::vm::{AluOp, Cond};
use gekko_core::state::spr;
use gekko_core::{GuestInstruction, StateSlot};

use super::Translator;
use crate::analyzer::CodeOp;

const BO_IGNORE_CR: u32 = 16;
const BO_BRANCH_IF_TRUE: u32 = 8;
const BO_DONT_DECREMENT: u32 = 4;
const BO_BRANCH_IF_CTR_ZERO: u32 = 2;

const LR: StateSlot = StateSlot::Spr(spr::LR as u16);
const CTR: StateSlot = StateSlot::Spr(spr::CTR as u16);

impl Translator<'_> {
    /// Emit the BO/BI tests; each returned fixup is taken when the branch
    /// is not.
    fn branch_conditions(&mut self, insn: GuestInstruction, use_ctr: bool) -> Vec<Fixup> {
        let bo = insn.bo();
        let mut not_taken = Vec::new();
        if use_ctr && bo & BO_DONT_DECREMENT == 0 {
            emit_ld_state(self.buf, RSCRATCH, CTR);
            emit_alu_ri(self.buf, AluOp::Sub, RSCRATCH, 1);
            emit_st_state(self.buf, RSCRATCH, CTR);
            let cond = if bo & BO_BRANCH_IF_CTR_ZERO != 0 {
                Cond::Ne
            } else {
                Cond::Eq
            };
            not_taken.push(emit_jcc_ri_fixup(self.buf, cond, RSCRATCH, 0));
        }
        if bo & BO_IGNORE_CR == 0 {
            let bi = insn.bi();
            emit_ld_state(self.buf, RSCRATCH, StateSlot::Cr((bi >> 2) as u8));
            let mask = 8 >> (bi & 3);
            let cond = if bo & BO_BRANCH_IF_TRUE != 0 {
                Cond::TstZ
            } else {
                Cond::TstNz
            };
            not_taken.push(emit_jcc_ri_fixup(self.buf, cond, RSCRATCH, mask));
        }
        not_taken
    }

    fn set_link(&mut self, op: &CodeOp) {
        if op.insn.lk() {
            emit_st_state_imm(self.buf, LR, op.address.wrapping_add(4));
        }
    }

    /// Bind the not-taken paths to the code that follows. The caches were
    /// flushed before the conditions, so the fall-through starts clean.
    fn fall_through(&mut self, not_taken: Vec<Fixup>) {
        for fixup in not_taken {
            set_jump_target(self.buf, fixup);
        }
    }

    /// Branch to the address in `slot`, masked to a word boundary.
    fn gen_register_branch(&mut self, op: &CodeOp, slot: StateSlot, use_ctr: bool) {
        self.flush_all();
        let not_taken = self.branch_conditions(op.insn, use_ctr);
        emit_ld_state(self.buf, RSCRATCH2, slot);
        emit_alu_ri(self.buf, AluOp::And, RSCRATCH2, !3);
        self.set_link(op);
        self.emit_dynamic_exit(RSCRATCH2);
        self.fall_through(not_taken);
    }
}

pub fn bx(t: &mut Translator<'_>, op: &CodeOp) {
    let target = op.branch_to.expect("bx always has a static target");
    t.flush_all();
    t.set_link(op);
    t.emit_exit(target);
}

pub fn bcx(t: &mut Translator<'_>, op: &CodeOp) {
    let target = op.branch_to.expect("bc always has a static target");
    t.flush_all();
    let not_taken = t.branch_conditions(op.insn, true);
    t.set_link(op);
    t.emit_exit(target);
    t.fall_through(not_taken);
}

pub fn bclrx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_register_branch(op, LR, true);
}

/// `bcctr` never decrements CTR.
pub fn bcctrx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_register_branch(op, CTR, false);
}
