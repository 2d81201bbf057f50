//! Integer arithmetic, logic, rotate, shift, compare and trap.

use gekko_core::insn::rotate_mask;
use gekko_core::state::program;
use gekko_core::GuestInstruction;

use super::Interpreter;

/// Two-operand logic op for the X-form helpers.
type LogicOp = fn(u32, u32) -> u32;

/// `a + b + c` with carry out and signed overflow.
#[inline]
fn add3(a: u32, b: u32, c: u32) -> (u32, bool, bool) {
    let wide = a as u64 + b as u64 + c as u64;
    let r = wide as u32;
    let overflow = ((a ^ r) & (b ^ r)) >> 31 != 0;
    (r, wide >> 32 != 0, overflow)
}

// ── Helpers ─────────────────────────────────────────────

impl Interpreter<'_> {
    /// XO-form arithmetic: write rD, then CA, OV and CR0 as requested.
    fn arith(&mut self, insn: GuestInstruction, (r, ca, ov): (u32, bool, bool), sets_ca: bool) {
        self.set_gpr(insn.rd(), r);
        if sets_ca {
            self.state.xer_ca = ca as u8;
        }
        if insn.oe() {
            self.state.set_xer_ov(ov);
        }
        self.record(insn, r);
    }

    /// X-form logic: `rA = op(rS, rB)`.
    fn logic(&mut self, insn: GuestInstruction, op: LogicOp) {
        let r = op(self.gpr(insn.rs()), self.gpr(insn.rb()));
        self.set_gpr(insn.ra(), r);
        self.record(insn, r);
    }

    /// X-form unary: `rA = op(rS)`.
    fn unary(&mut self, insn: GuestInstruction, op: fn(u32) -> u32) {
        let r = op(self.gpr(insn.rs()));
        self.set_gpr(insn.ra(), r);
        self.record(insn, r);
    }

    fn ca(&self) -> u32 {
        self.state.xer_ca as u32
    }

    fn trap_if(&mut self, a: u32, b: u32, to: u32) {
        let (sa, sb) = (a as i32, b as i32);
        let hit = (to & 16 != 0 && sa < sb)
            || (to & 8 != 0 && sa > sb)
            || (to & 4 != 0 && a == b)
            || (to & 2 != 0 && a < b)
            || (to & 1 != 0 && a > b);
        if hit {
            self.state.raise_program(program::TRAP);
        }
    }
}

// ── Immediate forms ─────────────────────────────────────

pub fn addi(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.gpr_or_zero(insn.ra()).wrapping_add(insn.simm16() as u32);
    ip.set_gpr(insn.rd(), r);
}

pub fn addis(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.gpr_or_zero(insn.ra()).wrapping_add((insn.simm16() as u32) << 16);
    ip.set_gpr(insn.rd(), r);
}

/// `addic` and `addic.`; the record form is a separate primary opcode.
pub fn addic(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let (r, ca, _) = add3(ip.gpr(insn.ra()), insn.simm16() as u32, 0);
    ip.set_gpr(insn.rd(), r);
    ip.state.xer_ca = ca as u8;
    if insn.opcd() == 13 {
        ip.state.update_cr0(r);
    }
}

pub fn subfic(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let (r, ca, _) = add3(!ip.gpr(insn.ra()), insn.simm16() as u32, 1);
    ip.set_gpr(insn.rd(), r);
    ip.state.xer_ca = ca as u8;
}

pub fn mulli(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = (ip.gpr(insn.ra()) as i32).wrapping_mul(insn.simm16());
    ip.set_gpr(insn.rd(), r as u32);
}

pub fn cmpi(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let field = ip.state.compare_signed(ip.gpr(insn.ra()) as i32, insn.simm16());
    ip.state.set_cr_field(insn.crfd(), field);
}

pub fn cmpli(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let field = ip.state.compare_unsigned(ip.gpr(insn.ra()), insn.uimm());
    ip.state.set_cr_field(insn.crfd(), field);
}

pub fn ori(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.set_gpr(insn.ra(), ip.gpr(insn.rs()) | insn.uimm());
}

pub fn oris(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.set_gpr(insn.ra(), ip.gpr(insn.rs()) | (insn.uimm() << 16));
}

pub fn xori(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.set_gpr(insn.ra(), ip.gpr(insn.rs()) ^ insn.uimm());
}

pub fn xoris(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.set_gpr(insn.ra(), ip.gpr(insn.rs()) ^ (insn.uimm() << 16));
}

pub fn andi_rc(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.gpr(insn.rs()) & insn.uimm();
    ip.set_gpr(insn.ra(), r);
    ip.state.update_cr0(r);
}

pub fn andis_rc(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.gpr(insn.rs()) & (insn.uimm() << 16);
    ip.set_gpr(insn.ra(), r);
    ip.state.update_cr0(r);
}

// ── Rotates ─────────────────────────────────────────────

pub fn rlwimix(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let mask = rotate_mask(insn.mb(), insn.me());
    let r = (ip.gpr(insn.rs()).rotate_left(insn.sh()) & mask) | (ip.gpr(insn.ra()) & !mask);
    ip.set_gpr(insn.ra(), r);
    ip.record(insn, r);
}

pub fn rlwinmx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let mask = rotate_mask(insn.mb(), insn.me());
    let r = ip.gpr(insn.rs()).rotate_left(insn.sh()) & mask;
    ip.set_gpr(insn.ra(), r);
    ip.record(insn, r);
}

pub fn rlwnmx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let mask = rotate_mask(insn.mb(), insn.me());
    let r = ip.gpr(insn.rs()).rotate_left(ip.gpr(insn.rb()) & 31) & mask;
    ip.set_gpr(insn.ra(), r);
    ip.record(insn, r);
}

// ── XO-form arithmetic ──────────────────────────────────

pub fn addx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let res = add3(ip.gpr(insn.ra()), ip.gpr(insn.rb()), 0);
    ip.arith(insn, res, false);
}

pub fn addcx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let res = add3(ip.gpr(insn.ra()), ip.gpr(insn.rb()), 0);
    ip.arith(insn, res, true);
}

pub fn addex(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let res = add3(ip.gpr(insn.ra()), ip.gpr(insn.rb()), ip.ca());
    ip.arith(insn, res, true);
}

pub fn addmex(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let res = add3(ip.gpr(insn.ra()), u32::MAX, ip.ca());
    ip.arith(insn, res, true);
}

pub fn addzex(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let res = add3(ip.gpr(insn.ra()), 0, ip.ca());
    ip.arith(insn, res, true);
}

pub fn subfx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let res = add3(!ip.gpr(insn.ra()), ip.gpr(insn.rb()), 1);
    ip.arith(insn, res, false);
}

pub fn subfcx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let res = add3(!ip.gpr(insn.ra()), ip.gpr(insn.rb()), 1);
    ip.arith(insn, res, true);
}

pub fn subfex(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let res = add3(!ip.gpr(insn.ra()), ip.gpr(insn.rb()), ip.ca());
    ip.arith(insn, res, true);
}

pub fn subfmex(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let res = add3(!ip.gpr(insn.ra()), u32::MAX, ip.ca());
    ip.arith(insn, res, true);
}

pub fn subfzex(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let res = add3(!ip.gpr(insn.ra()), 0, ip.ca());
    ip.arith(insn, res, true);
}

pub fn negx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let res = add3(!ip.gpr(insn.ra()), 0, 1);
    ip.arith(insn, res, false);
}

pub fn mullwx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let wide = ip.gpr(insn.ra()) as i32 as i64 * ip.gpr(insn.rb()) as i32 as i64;
    let r = wide as u32;
    ip.arith(insn, (r, false, wide != r as i32 as i64), false);
}

pub fn mulhwx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let wide = ip.gpr(insn.ra()) as i32 as i64 * ip.gpr(insn.rb()) as i32 as i64;
    let r = (wide >> 32) as u32;
    ip.set_gpr(insn.rd(), r);
    ip.record(insn, r);
}

pub fn mulhwux(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let wide = ip.gpr(insn.ra()) as u64 * ip.gpr(insn.rb()) as u64;
    let r = (wide >> 32) as u32;
    ip.set_gpr(insn.rd(), r);
    ip.record(insn, r);
}

pub fn divwx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let a = ip.gpr(insn.ra()) as i32;
    let b = ip.gpr(insn.rb()) as i32;
    let overflow = b == 0 || (a == i32::MIN && b == -1);
    let r = if overflow {
        if a < 0 {
            u32::MAX
        } else {
            0
        }
    } else {
        (a / b) as u32
    };
    ip.arith(insn, (r, false, overflow), false);
}

pub fn divwux(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let a = ip.gpr(insn.ra());
    let b = ip.gpr(insn.rb());
    let r = a.checked_div(b).unwrap_or(0);
    ip.arith(insn, (r, false, b == 0), false);
}

// ── X-form logic ────────────────────────────────────────

pub fn andx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.logic(insn, |a, b| a & b);
}

pub fn andcx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.logic(insn, |a, b| a & !b);
}

pub fn orx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.logic(insn, |a, b| a | b);
}

pub fn orcx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.logic(insn, |a, b| a | !b);
}

pub fn norx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.logic(insn, |a, b| !(a | b));
}

pub fn xorx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.logic(insn, |a, b| a ^ b);
}

pub fn nandx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.logic(insn, |a, b| !(a & b));
}

pub fn eqvx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.logic(insn, |a, b| !(a ^ b));
}

pub fn cntlzwx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.unary(insn, u32::leading_zeros);
}

pub fn extsbx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.unary(insn, |v| v as u8 as i8 as i32 as u32);
}

pub fn extshx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.unary(insn, |v| v as u16 as i16 as i32 as u32);
}

// ── Shifts ──────────────────────────────────────────────

pub fn slwx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.logic(insn, |s, b| {
        let amount = b & 0x3F;
        if amount & 0x20 != 0 {
            0
        } else {
            s << amount
        }
    });
}

pub fn srwx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.logic(insn, |s, b| {
        let amount = b & 0x3F;
        if amount & 0x20 != 0 {
            0
        } else {
            s >> amount
        }
    });
}

pub fn srawx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let s = ip.gpr(insn.rs());
    let amount = ip.gpr(insn.rb()) & 0x3F;
    let negative = (s as i32) < 0;
    let (r, ca) = if amount & 0x20 != 0 {
        if negative {
            (u32::MAX, true)
        } else {
            (0, false)
        }
    } else if amount == 0 {
        (s, false)
    } else {
        let r = ((s as i32) >> amount) as u32;
        (r, negative && s << (32 - amount) != 0)
    };
    ip.set_gpr(insn.ra(), r);
    ip.state.xer_ca = ca as u8;
    ip.record(insn, r);
}

pub fn srawix(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let s = ip.gpr(insn.rs());
    let amount = insn.sh();
    let r = ((s as i32) >> amount) as u32;
    let lost = s & ((1u32 << amount) - 1);
    ip.set_gpr(insn.ra(), r);
    ip.state.xer_ca = ((s as i32) < 0 && lost != 0) as u8;
    ip.record(insn, r);
}

// ── Compare and trap ────────────────────────────────────

pub fn cmp(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let field = ip
        .state
        .compare_signed(ip.gpr(insn.ra()) as i32, ip.gpr(insn.rb()) as i32);
    ip.state.set_cr_field(insn.crfd(), field);
}

pub fn cmpl(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let field = ip.state.compare_unsigned(ip.gpr(insn.ra()), ip.gpr(insn.rb()));
    ip.state.set_cr_field(insn.crfd(), field);
}

pub fn tw(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let (a, b) = (ip.gpr(insn.ra()), ip.gpr(insn.rb()));
    ip.trap_if(a, b, insn.to());
}

pub fn twi(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let a = ip.gpr(insn.ra());
    ip.trap_if(a, insn.simm16() as u32, insn.to());
}
