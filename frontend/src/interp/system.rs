//! System calls, MSR/SPR/segment register moves and condition register
//! logic.

use gekko_core::state::{exception, spr};
use gekko_core::GuestInstruction;

use super::Interpreter;

/// MSR bits restored from SRR1 by `rfi`.
const RFI_MASK: u32 = 0x87C0_FFFF;
/// `rfi` always clears MSR[13].
const RFI_CLEAR: u32 = 0xFFFB_FFFF;

/// SPR numbers with bit 0x10 set in the split field are supervisor-only.
fn spr_is_privileged(n: u32) -> bool {
    n & 0x10 != 0
}

pub fn sc(ip: &mut Interpreter<'_>, _insn: GuestInstruction) {
    ip.state.exceptions |= exception::SYSCALL;
}

pub fn rfi(ip: &mut Interpreter<'_>, _insn: GuestInstruction) {
    if !ip.supervisor() {
        return;
    }
    let srr1 = ip.state.spr[spr::SRR1];
    ip.state.msr = ((ip.state.msr & !RFI_MASK) | (srr1 & RFI_MASK)) & RFI_CLEAR;
    ip.state.npc = ip.state.spr[spr::SRR0];
}

pub fn mtmsr(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    if ip.supervisor() {
        ip.state.msr = ip.gpr(insn.rs());
    }
}

pub fn mfmsr(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    if ip.supervisor() {
        ip.set_gpr(insn.rd(), ip.state.msr);
    }
}

pub fn mtsr(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    if ip.supervisor() {
        ip.state.sr[insn.sr() as usize & 15] = ip.gpr(insn.rs());
    }
}

pub fn mtsrin(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    if ip.supervisor() {
        let index = (ip.gpr(insn.rb()) >> 28) as usize;
        ip.state.sr[index] = ip.gpr(insn.rs());
    }
}

pub fn mfsr(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    if ip.supervisor() {
        ip.set_gpr(insn.rd(), ip.state.sr[insn.sr() as usize & 15]);
    }
}

pub fn mfsrin(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    if ip.supervisor() {
        let index = (ip.gpr(insn.rb()) >> 28) as usize;
        ip.set_gpr(insn.rd(), ip.state.sr[index]);
    }
}

pub fn mfspr(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let n = insn.spr();
    if spr_is_privileged(n) && !ip.supervisor() {
        return;
    }
    let value = match n as usize {
        spr::XER => ip.state.xer(),
        n => ip.state.spr[n],
    };
    ip.set_gpr(insn.rd(), value);
}

pub fn mtspr(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let n = insn.spr();
    if spr_is_privileged(n) && !ip.supervisor() {
        return;
    }
    let value = ip.gpr(insn.rs());
    match n as usize {
        spr::XER => ip.state.set_xer(value),
        spr::TL_W => ip.state.spr[spr::TL] = value,
        spr::TU_W => ip.state.spr[spr::TU] = value,
        spr::PVR => {}
        n => ip.state.spr[n] = value,
    }
}

pub fn mftb(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let value = match insn.spr() as usize {
        spr::TU => ip.state.spr[spr::TU],
        _ => ip.state.spr[spr::TL],
    };
    ip.set_gpr(insn.rd(), value);
}

// ── Condition register ──────────────────────────────────

pub fn mfcr(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.set_gpr(insn.rd(), ip.state.cr());
}

pub fn mtcrf(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let crm = insn.crm();
    let value = ip.gpr(insn.rs());
    if crm == 0xFF {
        ip.state.set_cr(value);
        return;
    }
    for field in 0..8 {
        if crm & (0x80 >> field) != 0 {
            ip.state.set_cr_field(field, (value >> (28 - 4 * field)) as u8);
        }
    }
}

/// Move XER[SO,OV,CA] into a CR field and clear them.
pub fn mcrxr(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let field = (ip.state.xer_so_ov << 2) | (ip.state.xer_ca << 1);
    ip.state.set_cr_field(insn.crfd(), field);
    ip.state.xer_so_ov = 0;
    ip.state.xer_ca = 0;
}

pub fn mcrf(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let value = ip.state.cr_field(insn.crfs());
    ip.state.set_cr_field(insn.crfd(), value);
}

fn cr_logic(ip: &mut Interpreter<'_>, insn: GuestInstruction, op: fn(bool, bool) -> bool) {
    let a = ip.state.cr_bit(insn.crba());
    let b = ip.state.cr_bit(insn.crbb());
    ip.state.set_cr_bit(insn.crbd(), op(a, b));
}

pub fn crand(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    cr_logic(ip, insn, |a, b| a & b);
}

pub fn crandc(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    cr_logic(ip, insn, |a, b| a & !b);
}

pub fn creqv(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    cr_logic(ip, insn, |a, b| a == b);
}

pub fn crnand(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    cr_logic(ip, insn, |a, b| !(a & b));
}

pub fn crnor(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    cr_logic(ip, insn, |a, b| !(a | b));
}

pub fn cror(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    cr_logic(ip, insn, |a, b| a | b);
}

pub fn crorc(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    cr_logic(ip, insn, |a, b| a | !b);
}

pub fn crxor(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    cr_logic(ip, insn, |a, b| a ^ b);
}

// ── Synchronization ─────────────────────────────────────

/// `sync`, `eieio`, `isync`.
pub fn no_op(_ip: &mut Interpreter<'_>, _insn: GuestInstruction) {}

/// `tlbie`, `tlbsync`: no TLB is modeled, only the privilege check.
pub fn tlb_op(ip: &mut Interpreter<'_>, _insn: GuestInstruction) {
    ip.supervisor();
}
