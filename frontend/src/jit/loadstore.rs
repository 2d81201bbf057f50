//! Loads and stores.
//!
//! With fastmem on, every access is an unguarded `LoadFast`/`StoreFast`
//! recorded as a [`BackpatchSite`]; a miss is repaired at run time by the
//! fault engine. Without it, accesses go through the checked slow path.
//! Stores to a constant gather-pipe address bypass memory entirely.

use gekko_backend::vm::emitter::{
    emit_alu_ri, emit_alu_rr, emit_ffrom_int, emit_fst_state, emit_fto_int,
    emit_gather_pipe_write, emit_load_fast, emit_load_slow, emit_mov_ri, emit_mov_rr, emit_pop,
    emit_push, emit_store_fast, emit_store_slow, emit_unary,
};
use gekko_backend::vm::regs::{Reg, RSCRATCH, RSCRATCH2, RSCRATCH_EXTRA};
use gekko_backend::vm::{AluOp, UnaryOp};
use gekko_backend::BackpatchSite;
use gekko_core::{AccessSize, RegSet, StateSlot, GATHER_PIPE_ADDRESS};

use super::Translator;
use crate::analyzer::CodeOp;

/// Float stores pass their bits through this register.
const RFLOAT_BITS: Reg = Reg::R3;

/// Address operand of one access.
struct Ea {
    base: Reg,
    disp: i32,
    /// Scratch registers that must survive the access.
    live: RegSet,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Form {
    D,
    Du,
    X,
    Xu,
}

impl Form {
    fn indexed(self) -> bool {
        matches!(self, Form::X | Form::Xu)
    }

    fn update(self) -> bool {
        matches!(self, Form::Du | Form::Xu)
    }
}

fn bswap_for(size: AccessSize) -> Option<UnaryOp> {
    match size {
        AccessSize::U8 => None,
        AccessSize::U16 => Some(UnaryOp::Bswap16),
        AccessSize::U32 => Some(UnaryOp::Bswap32),
        AccessSize::U64 => Some(UnaryOp::Bswap64),
    }
}

impl Translator<'_> {
    /// Effective address when every input is a known constant.
    fn constant_ea(&self, op: &CodeOp, form: Form) -> Option<u32> {
        let insn = op.insn;
        let base = if insn.ra() == 0 {
            0
        } else {
            self.known(insn.ra())?
        };
        let offset = if form.indexed() {
            self.known(insn.rb())?
        } else {
            insn.simm16() as u32
        };
        Some(base.wrapping_add(offset))
    }

    /// Update forms leave the address in `RSCRATCH2` for the write-back
    /// to rA.
    fn effective_address(&mut self, op: &CodeOp, form: Form) -> Ea {
        let insn = op.insn;
        if form.update() {
            let ra = self.gpr_in(insn.ra());
            emit_mov_rr(self.buf, RSCRATCH2, ra);
            if form.indexed() {
                let rb = self.gpr_in(insn.rb());
                emit_alu_rr(self.buf, AluOp::Add, RSCRATCH2, rb);
            } else {
                emit_alu_ri(self.buf, AluOp::Add, RSCRATCH2, insn.simm16() as u32);
            }
            return Ea {
                base: RSCRATCH2,
                disp: 0,
                live: RegSet::EMPTY.set(RSCRATCH2.index()),
            };
        }
        if let Some(ea) = self.constant_ea(op, form) {
            emit_mov_ri(self.buf, RSCRATCH2, ea);
            return Ea { base: RSCRATCH2, disp: 0, live: RegSet::EMPTY };
        }
        if !form.indexed() {
            let ra = self.gpr_in(insn.ra());
            return Ea { base: ra, disp: insn.simm16(), live: RegSet::EMPTY };
        }
        if insn.ra() == 0 {
            let rb = self.gpr_in(insn.rb());
            return Ea { base: rb, disp: 0, live: RegSet::EMPTY };
        }
        let ra = self.gpr_in(insn.ra());
        let rb = self.gpr_in(insn.rb());
        emit_mov_rr(self.buf, RSCRATCH2, ra);
        emit_alu_rr(self.buf, AluOp::Add, RSCRATCH2, rb);
        Ea { base: RSCRATCH2, disp: 0, live: RegSet::EMPTY }
    }

    /// Load `size` bytes into `dst` with guest byte order undone.
    fn emit_load(&mut self, size: AccessSize, signed: bool, dst: Reg, ea: &Ea, guest_pc: u32) {
        if !self.config.enable_fastmem {
            let saved = ea.live.clear(dst.index());
            emit_push(self.buf, saved, RegSet::EMPTY);
            emit_load_slow(self.buf, size, dst, ea.base, ea.disp);
            if signed {
                emit_unary(self.buf, UnaryOp::ExtS16, dst);
            }
            emit_pop(self.buf, saved, RegSet::EMPTY);
            return;
        }

        let region_start = self.buf.offset();
        let mut disp = ea.disp;
        // The load overwrites its own base; fold the displacement in first
        // so the site only needs one register.
        let offset_added = dst == ea.base && disp != 0;
        if offset_added {
            emit_alu_ri(self.buf, AluOp::Add, dst, disp as u32);
            disp = 0;
        }
        let fault_at = emit_load_fast(self.buf, size, dst, ea.base, disp);
        if let Some(swap) = bswap_for(size) {
            emit_unary(self.buf, swap, dst);
        }
        if signed {
            emit_unary(self.buf, UnaryOp::ExtS16, dst);
        }
        self.report.sites.push(BackpatchSite {
            fault_at,
            region_start,
            region_end: self.buf.offset(),
            size,
            signed,
            is_store: false,
            value: dst,
            addr: ea.base,
            disp: if offset_added { ea.disp } else { disp },
            offset_added,
            live: ea.live,
            guest_pc,
        });
    }

    /// Store the numeric value in `src`.
    fn emit_store(&mut self, size: AccessSize, src: Reg, ea: &Ea, guest_pc: u32) {
        if !self.config.enable_fastmem {
            emit_push(self.buf, ea.live, RegSet::EMPTY);
            emit_store_slow(self.buf, size, src, ea.base, ea.disp);
            emit_pop(self.buf, ea.live, RegSet::EMPTY);
            return;
        }

        let region_start = self.buf.offset();
        let swapped = match bswap_for(size) {
            Some(swap) => {
                emit_mov_rr(self.buf, RSCRATCH_EXTRA, src);
                emit_unary(self.buf, swap, RSCRATCH_EXTRA);
                RSCRATCH_EXTRA
            }
            None => src,
        };
        let fault_at = emit_store_fast(self.buf, size, swapped, ea.base, ea.disp);
        self.report.sites.push(BackpatchSite {
            fault_at,
            region_start,
            region_end: self.buf.offset(),
            size,
            signed: false,
            is_store: true,
            value: src,
            addr: ea.base,
            disp: ea.disp,
            offset_added: false,
            live: ea.live,
            guest_pc,
        });
    }

    fn commit_update(&mut self, op: &CodeOp, form: Form) {
        if form.update() {
            let ra = self.gpr_out(op.insn.ra());
            emit_mov_rr(self.buf, ra, RSCRATCH2);
        }
    }

    fn gen_load(&mut self, op: &CodeOp, size: AccessSize, signed: bool, form: Form) {
        let ea = self.effective_address(op, form);
        let memcheck = self.config.enable_memcheck;
        let dst = if memcheck {
            RSCRATCH
        } else {
            self.gpr_out(op.insn.rd())
        };
        self.emit_load(size, signed, dst, &ea, op.address);
        self.emit_memcheck(op.address);
        if memcheck {
            let rd = self.gpr_out(op.insn.rd());
            emit_mov_rr(self.buf, rd, RSCRATCH);
        }
        self.commit_update(op, form);
    }

    fn gen_store(&mut self, op: &CodeOp, size: AccessSize, form: Form) {
        if !form.update() && self.constant_ea(op, form) == Some(GATHER_PIPE_ADDRESS) {
            let src = self.gpr_in(op.insn.rs());
            emit_gather_pipe_write(self.buf, size, src);
            self.gather_pipe_bytes += size.bytes();
            return;
        }
        let src = self.gpr_in(op.insn.rs());
        let ea = self.effective_address(op, form);
        self.emit_store(size, src, &ea, op.address);
        self.emit_memcheck(op.address);
        self.commit_update(op, form);
    }

    /// `lfs` widens to double and fills both halves; `lfd` writes `ps0`.
    fn gen_load_float(&mut self, op: &CodeOp, single: bool, form: Form) {
        let size = if single { AccessSize::U32 } else { AccessSize::U64 };
        let ea = self.effective_address(op, form);
        self.emit_load(size, false, RSCRATCH, &ea, op.address);
        self.emit_memcheck(op.address);
        let fd = self.fpr_out(op.insn.fd());
        emit_ffrom_int(self.buf, single, fd, RSCRATCH);
        if single {
            emit_fst_state(self.buf, fd, StateSlot::Ps1(op.insn.fd() as u8));
        }
        self.commit_update(op, form);
    }

    fn gen_store_float(&mut self, op: &CodeOp, single: bool, form: Form) {
        let size = if single { AccessSize::U32 } else { AccessSize::U64 };
        let fs = self.fpr_in(op.insn.fs());
        let ea = self.effective_address(op, form);
        emit_fto_int(self.buf, single, RFLOAT_BITS, fs);
        self.emit_store(size, RFLOAT_BITS, &ea, op.address);
        self.emit_memcheck(op.address);
        self.commit_update(op, form);
    }
}

macro_rules! loads {
    ($($name:ident => $size:ident, $signed:expr, $form:ident;)*) => {
        $(
            pub fn $name(t: &mut Translator<'_>, op: &CodeOp) {
                t.gen_load(op, AccessSize::$size, $signed, Form::$form);
            }
        )*
    };
}

macro_rules! stores {
    ($($name:ident => $size:ident, $form:ident;)*) => {
        $(
            pub fn $name(t: &mut Translator<'_>, op: &CodeOp) {
                t.gen_store(op, AccessSize::$size, Form::$form);
            }
        )*
    };
}

loads! {
    lwz => U32, false, D;
    lwzu => U32, false, Du;
    lwzx => U32, false, X;
    lwzux => U32, false, Xu;
    lhz => U16, false, D;
    lhzu => U16, false, Du;
    lhzx => U16, false, X;
    lhzux => U16, false, Xu;
    lha => U16, true, D;
    lhau => U16, true, Du;
    lhax => U16, true, X;
    lhaux => U16, true, Xu;
    lbz => U8, false, D;
    lbzu => U8, false, Du;
    lbzx => U8, false, X;
    lbzux => U8, false, Xu;
}

stores! {
    stw => U32, D;
    stwu => U32, Du;
    stwx => U32, X;
    stwux => U32, Xu;
    sth => U16, D;
    sthu => U16, Du;
    sthx => U16, X;
    sthux => U16, Xu;
    stb => U8, D;
    stbu => U8, Du;
    stbx => U8, X;
    stbux => U8, Xu;
}

pub fn lfs(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_load_float(op, true, Form::D);
}

pub fn lfsu(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_load_float(op, true, Form::Du);
}

pub fn lfsx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_load_float(op, true, Form::X);
}

pub fn lfd(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_load_float(op, false, Form::D);
}

pub fn lfdu(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_load_float(op, false, Form::Du);
}

pub fn lfdx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_load_float(op, false, Form::X);
}

pub fn stfs(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_store_float(op, true, Form::D);
}

pub fn stfsu(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_store_float(op, true, Form::Du);
}

pub fn stfsx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_store_float(op, true, Form::X);
}

pub fn stfd(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_store_float(op, false, Form::D);
}

pub fn stfdu(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_store_float(op, false, Form::Du);
}

pub fn stfdx(t: &mut Translator<'_>, op: &CodeOp) {
    t.gen_store_float(op, false, Form::X);
}
