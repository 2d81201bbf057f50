//! Integer arithmetic, logic, rotate and compare.
//!
//! Results are computed in `RSCRATCH` and moved into the destination last,
//! so a destination that aliases a source reads the old value.

use gekko_backend::vm::emitter::{
    emit_alu_ri, emit_alu_rr, emit_cmp_cr, emit_cmp_cr_ri, emit_mov_rr, emit_setcond,
    emit_setcond_ri, emit_st_state, emit_unary,
};
use gekko_backend::vm::regs::{RSCRATCH, RSCRATCH2, RSCRATCH_EXTRA};
use gekko_backend::vm::{AluOp, Cond, UnaryOp};
use gekko_core::insn::rotate_mask;
use gekko_core::StateSlot;

use super::Translator;
use crate::analyzer::CodeOp;

impl Translator<'_> {
    /// `d = a op b`.
    fn gen_arith(&mut self, alu: AluOp, d: usize, a: usize, b: usize, record: bool) {
        let ra = self.gpr_in(a);
        let rb = self.gpr_in(b);
        emit_mov_rr(self.buf, RSCRATCH, ra);
        emit_alu_rr(self.buf, alu, RSCRATCH, rb);
        self.commit(d, record);
    }

    /// `d = a op imm`.
    fn gen_arith_imm(&mut self, alu: AluOp, d: usize, a: usize, imm: u32, record: bool) {
        let ra = self.gpr_in(a);
        emit_mov_rr(self.buf, RSCRATCH, ra);
        emit_alu_ri(self.buf, alu, RSCRATCH, imm);
        self.commit(d, record);
    }

    fn gen_unary(&mut self, op: UnaryOp, d: usize, a: usize, record: bool) {
        let ra = self.gpr_in(a);
        emit_mov_rr(self.buf, RSCRATCH, ra);
        emit_unary(self.buf, op, RSCRATCH);
        self.commit(d, record);
    }

    /// Move `RSCRATCH` into guest register `d`.
    pub(super) fn commit(&mut self, d: usize, record: bool) {
        let rd = self.gpr_out(d);
        emit_mov_rr(self.buf, rd, RSCRATCH);
        if record {
            self.record_cr0(rd);
        }
    }

    /// Fold `d = a + imm` when `a` is known, otherwise emit the add.
    fn gen_add_imm(&mut self, d: usize, a: usize, imm: u32) {
        // rA = 0 reads as zero for addi/addis.
        let base = if a == 0 { Some(0) } else { self.known(a) };
        match base {
            Some(v) => self.set_known(d, v.wrapping_add(imm)),
            None => self.gen_arith_imm(AluOp::Add, d, a, imm, false),
        }
    }

    fn gen_or_imm(&mut self, op: &CodeOp, imm: u32) {
        let (s, a) = (op.insn.rs(), op.insn.ra());
        if imm == 0 && s == a {
            return;
        }
        match self.known(s) {
            Some(v) => self.set_known(a, v | imm),
            None => self.gen_arith_imm(AluOp::Or, a, s, imm, false),
        }
    }

    fn gen_compare(&mut self, op: &CodeOp, unsigned: bool, imm: Option<u32>) {
        let ra = self.gpr_in(op.insn.ra());
        match imm {
            Some(imm) => emit_cmp_cr_ri(self.buf, unsigned, RSCRATCH, ra, imm),
            None => {
                let rb = self.gpr_in(op.insn.rb());
                emit_cmp_cr(self.buf, unsigned, RSCRATCH, ra, rb);
            }
        }
        emit_st_state(self.buf, RSCRATCH, StateSlot::Cr(op.insn.crfd() as u8));
    }

    /// Add with carry out of `a + imm`.
    fn gen_add_carry_imm(&mut self, op: &CodeOp, record: bool) {
        let insn = op.insn;
        let ra = self.gpr_in(insn.ra());
        emit_mov_rr(self.buf, RSCRATCH, ra);
        emit_alu_ri(self.buf, AluOp::Add, RSCRATCH, insn.simm16() as u32);
        emit_setcond(self.buf, Cond::Ltu, RSCRATCH2, RSCRATCH, ra);
        emit_st_state(self.buf, RSCRATCH2, StateSlot::XerCa);
        self.commit(insn.rd(), record);
    }

    fn gen_logic(&mut self, op: &CodeOp, alu: AluOp) {
        let insn = op.insn;
        self.gen_arith(alu, insn.ra(), insn.rs(), insn.rb(), insn.rc());
    }
}

// ── D-form ──────────────────────────────────────────────

pub fn addi(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_add_imm(insn.rd(), insn.ra(), insn.simm16() as u32);
}

pub fn addis(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_add_imm(insn.rd(), insn.ra(), (insn.simm16() as u32) << 16);
}

pub fn addic(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_add_carry_imm(op, false);
}

pub fn addic_rc(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_add_carry_imm(op, true);
}

/// `rD = simm - rA`; CA is set when no borrow occurs.
pub fn subfic(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    let imm = insn.simm16() as u32;
    let ra = t.gpr_in(insn.ra());
    emit_setcond_ri(t.buf, Cond::Leu, RSCRATCH2, ra, imm);
    emit_st_state(t.buf, RSCRATCH2, StateSlot::XerCa);
    emit_mov_rr(t.buf, RSCRATCH, ra);
    emit_unary(t.buf, UnaryOp::Neg, RSCRATCH);
    emit_alu_ri(t.buf, AluOp::Add, RSCRATCH, imm);
    t.commit(insn.rd(), false);
}

pub fn mulli(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_arith_imm(AluOp::Mul, insn.rd(), insn.ra(), insn.simm16() as u32, false);
}

pub fn ori(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_or_imm(op, op.insn.uimm());
}

pub fn oris(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_or_imm(op, op.insn.uimm() << 16);
}

pub fn xori(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_arith_imm(AluOp::Xor, insn.ra(), insn.rs(), insn.uimm(), false);
}

pub fn xoris(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_arith_imm(AluOp::Xor, insn.ra(), insn.rs(), insn.uimm() << 16, false);
}

pub fn andi_rc(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_arith_imm(AluOp::And, insn.ra(), insn.rs(), insn.uimm(), true);
}

pub fn andis_rc(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_arith_imm(AluOp::And, insn.ra(), insn.rs(), insn.uimm() << 16, true);
}

pub fn cmpi(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_compare(op, false, Some(op.insn.simm16() as u32));
}

pub fn cmpli(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_compare(op, true, Some(op.insn.uimm()));
}

pub fn cmp(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_compare(op, false, None);
}

pub fn cmpl(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_compare(op, true, None);
}

// ── Rotate ──────────────────────────────────────────────

pub fn rlwinmx(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    let rs = t.gpr_in(insn.rs());
    emit_mov_rr(t.buf, RSCRATCH, rs);
    if insn.sh() != 0 {
        emit_alu_ri(t.buf, AluOp::Rotl, RSCRATCH, insn.sh());
    }
    emit_alu_ri(t.buf, AluOp::And, RSCRATCH, rotate_mask(insn.mb(), insn.me()));
    t.commit(insn.ra(), insn.rc());
}

pub fn rlwimix(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    let mask = rotate_mask(insn.mb(), insn.me());
    let rs = t.gpr_in(insn.rs());
    let ra = t.gpr_in(insn.ra());
    emit_mov_rr(t.buf, RSCRATCH, rs);
    if insn.sh() != 0 {
        emit_alu_ri(t.buf, AluOp::Rotl, RSCRATCH, insn.sh());
    }
    emit_alu_ri(t.buf, AluOp::And, RSCRATCH, mask);
    emit_mov_rr(t.buf, RSCRATCH2, ra);
    emit_alu_ri(t.buf, AluOp::And, RSCRATCH2, !mask);
    emit_alu_rr(t.buf, AluOp::Or, RSCRATCH, RSCRATCH2);
    t.commit(insn.ra(), insn.rc());
}

pub fn rlwnmx(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    let rs = t.gpr_in(insn.rs());
    let rb = t.gpr_in(insn.rb());
    emit_mov_rr(t.buf, RSCRATCH, rs);
    emit_alu_rr(t.buf, AluOp::Rotl, RSCRATCH, rb);
    emit_alu_ri(t.buf, AluOp::And, RSCRATCH, rotate_mask(insn.mb(), insn.me()));
    t.commit(insn.ra(), insn.rc());
}

// ── XO-form ─────────────────────────────────────────────

pub fn addx(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_arith(AluOp::Add, insn.rd(), insn.ra(), insn.rb(), insn.rc());
}

pub fn addcx(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    let ra = t.gpr_in(insn.ra());
    let rb = t.gpr_in(insn.rb());
    emit_mov_rr(t.buf, RSCRATCH, ra);
    emit_alu_rr(t.buf, AluOp::Add, RSCRATCH, rb);
    emit_setcond(t.buf, Cond::Ltu, RSCRATCH2, RSCRATCH, ra);
    emit_st_state(t.buf, RSCRATCH2, StateSlot::XerCa);
    t.commit(insn.rd(), insn.rc());
}

/// `rD = rB - rA`.
pub fn subfx(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_arith(AluOp::Sub, insn.rd(), insn.rb(), insn.ra(), insn.rc());
}

pub fn subfcx(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    let ra = t.gpr_in(insn.ra());
    let rb = t.gpr_in(insn.rb());
    emit_setcond(t.buf, Cond::Geu, RSCRATCH2, rb, ra);
    emit_st_state(t.buf, RSCRATCH2, StateSlot::XerCa);
    emit_mov_rr(t.buf, RSCRATCH, rb);
    emit_alu_rr(t.buf, AluOp::Sub, RSCRATCH, ra);
    t.commit(insn.rd(), insn.rc());
}

pub fn negx(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_unary(UnaryOp::Neg, insn.rd(), insn.ra(), insn.rc());
}

pub fn mullwx(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_arith(AluOp::Mul, insn.rd(), insn.ra(), insn.rb(), insn.rc());
}

pub fn mulhwx(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_arith(AluOp::MulHs, insn.rd(), insn.ra(), insn.rb(), insn.rc());
}

pub fn mulhwux(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_arith(AluOp::MulHu, insn.rd(), insn.ra(), insn.rb(), insn.rc());
}

// ── X-form logic and shifts ─────────────────────────────

pub fn andx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_logic(op, AluOp::And);
}

pub fn andcx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_logic(op, AluOp::Andc);
}

pub fn orx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_logic(op, AluOp::Or);
}

pub fn orcx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_logic(op, AluOp::Orc);
}

pub fn xorx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_logic(op, AluOp::Xor);
}

pub fn norx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_logic(op, AluOp::Nor);
}

pub fn nandx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_logic(op, AluOp::Nand);
}

pub fn eqvx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_logic(op, AluOp::Eqv);
}

pub fn slwx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_logic(op, AluOp::Shl);
}

pub fn srwx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_logic(op, AluOp::Shr);
}

/// CA is set when a negative value loses one bits.
pub fn srawix(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    let sh = insn.sh();
    let rs = t.gpr_in(insn.rs());
    emit_mov_rr(t.buf, RSCRATCH2, rs);
    emit_alu_ri(t.buf, AluOp::And, RSCRATCH2, (1u32 << sh) - 1);
    emit_setcond_ri(t.buf, Cond::Ne, RSCRATCH2, RSCRATCH2, 0);
    emit_mov_rr(t.buf, RSCRATCH_EXTRA, rs);
    emit_alu_ri(t.buf, AluOp::Shr, RSCRATCH_EXTRA, 31);
    emit_alu_rr(t.buf, AluOp::And, RSCRATCH2, RSCRATCH_EXTRA);
    emit_st_state(t.buf, RSCRATCH2, StateSlot::XerCa);
    emit_mov_rr(t.buf, RSCRATCH, rs);
    if sh != 0 {
        emit_alu_ri(t.buf, AluOp::Sar, RSCRATCH, sh);
    }
    t.commit(insn.ra(), insn.rc());
}

pub fn cntlzwx(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_unary(UnaryOp::Cntlz, insn.ra(), insn.rs(), insn.rc());
}

pub fn extsbx(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_unary(UnaryOp::ExtS8, insn.ra(), insn.rs(), insn.rc());
}

pub fn extshx(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    t.gen_unary(UnaryOp::ExtS16, insn.ra(), insn.rs(), insn.rc());
}
