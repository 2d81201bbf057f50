//! Branches. Targets go to `npc`; the link register is written only when
//! the branch is taken.

use gekko_core::insn::branch_target;
use gekko_core::GuestInstruction;

use super::Interpreter;

/// BO bits, most significant first.
const BO_IGNORE_CR: u32 = 16;
const BO_BRANCH_IF_TRUE: u32 = 8;
const BO_DONT_DECREMENT: u32 = 4;
const BO_BRANCH_IF_CTR_ZERO: u32 = 2;

impl Interpreter<'_> {
    fn condition_ok(&self, insn: GuestInstruction) -> bool {
        let bo = insn.bo();
        bo & BO_IGNORE_CR != 0 || self.state.cr_bit(insn.bi()) == (bo & BO_BRANCH_IF_TRUE != 0)
    }

    /// Decrement CTR unless BO says not to; returns whether the counter
    /// condition holds.
    fn counter_ok(&mut self, insn: GuestInstruction) -> bool {
        let bo = insn.bo();
        if bo & BO_DONT_DECREMENT != 0 {
            return true;
        }
        let ctr = self.state.ctr().wrapping_sub(1);
        self.state.set_ctr(ctr);
        (ctr != 0) != (bo & BO_BRANCH_IF_CTR_ZERO != 0)
    }

    fn take_branch(&mut self, insn: GuestInstruction, target: u32) {
        if insn.lk() {
            let ret = self.state.pc.wrapping_add(4);
            self.state.set_lr(ret);
        }
        self.state.npc = target;
    }
}

pub fn bx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let target = branch_target(ip.state.pc, insn.li(), insn.aa());
    ip.take_branch(insn, target);
}

pub fn bcx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let counter = ip.counter_ok(insn);
    if counter && ip.condition_ok(insn) {
        let target = branch_target(ip.state.pc, insn.bd(), insn.aa());
        ip.take_branch(insn, target);
    }
}

pub fn bclrx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let counter = ip.counter_ok(insn);
    if counter && ip.condition_ok(insn) {
        let target = ip.state.lr() & !3;
        ip.take_branch(insn, target);
    }
}

/// `bcctr` never decrements CTR.
pub fn bcctrx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    if ip.condition_ok(insn) {
        let target = ip.state.ctr() & !3;
        ip.take_branch(insn, target);
    }
}
