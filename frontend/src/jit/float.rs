//! Scalar floating point on `ps0`.
//!
//! Record forms are left to the interpreter, which owns CR1.

use gekko_backend::vm::emitter::{emit_falu, emit_fmov, emit_fst_state, emit_funary};
use gekko_backend::vm::regs::FSCRATCH;
use gekko_backend::vm::{FAluOp, FUnaryOp};
use gekko_core::StateSlot;

use super::Translator;
use crate::analyzer::CodeOp;

impl Translator<'_> {
    /// Move `FSCRATCH` into fD; singles are rounded and copied to `ps1`.
    fn commit_fp(&mut self, op: &CodeOp, single: bool) {
        let fd = op.insn.fd();
        if single {
            emit_funary(self.buf, FUnaryOp::RoundSingle, FSCRATCH);
        }
        let host = self.fpr_out(fd);
        emit_fmov(self.buf, host, FSCRATCH);
        if single {
            emit_fst_state(self.buf, host, StateSlot::Ps1(fd as u8));
        }
    }

    /// `fD = fA op fB`, or `fA op fC` for multiplies.
    fn gen_fp_arith(&mut self, op: &CodeOp, alu: FAluOp, single: bool) {
        let insn = op.insn;
        if insn.rc() {
            self.fallback(op);
            return;
        }
        let second = if alu == FAluOp::Mul { insn.fc() } else { insn.fb() };
        let fa = self.fpr_in(insn.fa());
        let fb = self.fpr_in(second);
        emit_fmov(self.buf, FSCRATCH, fa);
        emit_falu(self.buf, alu, FSCRATCH, fb);
        self.commit_fp(op, single);
    }

    fn gen_fp_move(&mut self, op: &CodeOp, unary: Option<FUnaryOp>) {
        let insn = op.insn;
        if insn.rc() {
            self.fallback(op);
            return;
        }
        let fb = self.fpr_in(insn.fb());
        emit_fmov(self.buf, FSCRATCH, fb);
        if let Some(unary) = unary {
            emit_funary(self.buf, unary, FSCRATCH);
        }
        self.commit_fp(op, false);
    }
}

pub fn faddx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_fp_arith(op, FAluOp::Add, false);
}

pub fn fsubx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_fp_arith(op, FAluOp::Sub, false);
}

pub fn fmulx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_fp_arith(op, FAluOp::Mul, false);
}

pub fn fdivx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_fp_arith(op, FAluOp::Div, false);
}

pub fn faddsx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_fp_arith(op, FAluOp::Add, true);
}

pub fn fsubsx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_fp_arith(op, FAluOp::Sub, true);
}

pub fn fmulsx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_fp_arith(op, FAluOp::Mul, true);
}

pub fn fdivsx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_fp_arith(op, FAluOp::Div, true);
}

pub fn fmrx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_fp_move(op, None);
}

pub fn fnegx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_fp_move(op, Some(FUnaryOp::Neg));
}

pub fn fabsx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_fp_move(op, Some(FUnaryOp::Abs));
}

pub fn fnabsx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_fp_move(op, Some(FUnaryOp::NAbs));
}

pub fn frspx(t: &mut Translator<'_>, op: &CodeOp) {
    let insn = op.insn;
    if insn.rc() {
        t.fallback(op);
        return;
    }
    let fb = t.fpr_in(insn.fb());
    emit_fmov(t.buf, FSCRATCH, fb);
    t.commit_fp(op, true);
}
