use gekko_core::{AccessSize, RegSet, StateSlot};

use crate::code_buffer::CodeBuffer;
use crate::vm::insn::{
    AluOp, Cond, ExitCode, FAluOp, FUnaryOp, Helper, HostOp, UnaryOp, JMP_SIZE, OPC_JMP, OPC_TRAP,
};
use crate::vm::regs::{FReg, Reg};
use crate::HostCodeGen;

/// Append one instruction; returns its offset.
#[inline]
pub fn emit_op(buf: &mut CodeBuffer, op: HostOp) -> usize {
    let at = buf.offset();
    let mut bytes = Vec::with_capacity(12);
    op.encode(&mut bytes);
    buf.emit(&bytes);
    at
}

// -- Moves and guest state --

pub fn emit_mov_rr(buf: &mut CodeBuffer, dst: Reg, src: Reg) {
    if dst != src {
        emit_op(buf, HostOp::Mov { dst, src });
    }
}

pub fn emit_mov_ri(buf: &mut CodeBuffer, dst: Reg, imm: u32) {
    emit_op(buf, HostOp::MovImm { dst, imm });
}

pub fn emit_ld_state(buf: &mut CodeBuffer, dst: Reg, slot: StateSlot) {
    emit_op(buf, HostOp::LdState { dst, slot });
}

pub fn emit_st_state(buf: &mut CodeBuffer, src: Reg, slot: StateSlot) {
    emit_op(buf, HostOp::StState { src, slot });
}

pub fn emit_st_state_imm(buf: &mut CodeBuffer, slot: StateSlot, imm: u32) {
    emit_op(buf, HostOp::StStateImm { slot, imm });
}

// -- Integer ALU --

pub fn emit_alu_rr(buf: &mut CodeBuffer, op: AluOp, dst: Reg, src: Reg) {
    emit_op(buf, HostOp::Alu { op, dst, src });
}

pub fn emit_alu_ri(buf: &mut CodeBuffer, op: AluOp, dst: Reg, imm: u32) {
    emit_op(buf, HostOp::AluImm { op, dst, imm });
}

pub fn emit_unary(buf: &mut CodeBuffer, op: UnaryOp, dst: Reg) {
    emit_op(buf, HostOp::Unary { op, dst });
}

pub fn emit_setcond(buf: &mut CodeBuffer, cond: Cond, dst: Reg, a: Reg, b: Reg) {
    emit_op(buf, HostOp::SetCond { cond, dst, a, b });
}

pub fn emit_setcond_ri(buf: &mut CodeBuffer, cond: Cond, dst: Reg, a: Reg, imm: u32) {
    emit_op(buf, HostOp::SetCondImm { cond, dst, a, imm });
}

pub fn emit_cmp_cr(buf: &mut CodeBuffer, unsigned: bool, dst: Reg, a: Reg, b: Reg) {
    emit_op(buf, HostOp::CmpCr { unsigned, dst, a, b });
}

pub fn emit_cmp_cr_ri(buf: &mut CodeBuffer, unsigned: bool, dst: Reg, a: Reg, imm: u32) {
    emit_op(buf, HostOp::CmpCrImm { unsigned, dst, a, imm });
}

// -- Branches --

/// A forward jump whose target is filled in later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Fixup {
    /// Offset of the jump's four target bytes.
    target_at: usize,
}

/// Emit `Jmp target`; returns the jump's offset for later patching.
pub fn emit_jmp(buf: &mut CodeBuffer, target_offset: usize) -> usize {
    emit_op(buf, HostOp::Jmp { target: target_offset as u32 })
}

pub fn emit_jmp_fixup(buf: &mut CodeBuffer) -> Fixup {
    let at = emit_jmp(buf, 0);
    Fixup { target_at: at + 1 }
}

pub fn emit_jcc_ri(buf: &mut CodeBuffer, cond: Cond, a: Reg, imm: u32, target_offset: usize) {
    emit_op(buf, HostOp::JccImm { cond, a, imm, target: target_offset as u32 });
}

pub fn emit_jcc_ri_fixup(buf: &mut CodeBuffer, cond: Cond, a: Reg, imm: u32) -> Fixup {
    let at = emit_op(buf, HostOp::JccImm { cond, a, imm, target: 0 });
    Fixup { target_at: at + 7 }
}

pub fn emit_jcc_rr_fixup(buf: &mut CodeBuffer, cond: Cond, a: Reg, b: Reg) -> Fixup {
    let at = emit_op(buf, HostOp::Jcc { cond, a, b, target: 0 });
    Fixup { target_at: at + 4 }
}

/// Point `fixup` at the current write offset.
pub fn set_jump_target(buf: &mut CodeBuffer, fixup: Fixup) {
    let here = buf.offset() as u32;
    buf.patch_u32(fixup.target_at, here);
}

/// Overwrite the bytes at `at` with `Jmp target` followed by trap filler
/// up to `len` bytes.
pub fn write_jmp_at(buf: &mut CodeBuffer, at: usize, len: usize, target_offset: usize) {
    assert!(len >= JMP_SIZE, "patch region smaller than a jump");
    buf.patch(at, &[OPC_JMP]);
    buf.patch_u32(at + 1, target_offset as u32);
    buf.fill(at + JMP_SIZE, len - JMP_SIZE, OPC_TRAP);
}

pub fn emit_ret(buf: &mut CodeBuffer, code: ExitCode) {
    emit_op(buf, HostOp::Ret { code });
}

pub fn emit_trap_fill(buf: &mut CodeBuffer, n: usize) {
    for _ in 0..n {
        buf.emit_u8(OPC_TRAP);
    }
}

// -- Memory --

/// Unguarded load in host byte order; returns the op's offset.
pub fn emit_load_fast(buf: &mut CodeBuffer, size: AccessSize, dst: Reg, addr: Reg, disp: i32) -> usize {
    emit_op(buf, HostOp::LoadFast { size, dst, addr, disp })
}

pub fn emit_store_fast(buf: &mut CodeBuffer, size: AccessSize, src: Reg, addr: Reg, disp: i32) -> usize {
    emit_op(buf, HostOp::StoreFast { size, src, addr, disp })
}

pub fn emit_load_slow(buf: &mut CodeBuffer, size: AccessSize, dst: Reg, addr: Reg, disp: i32) {
    emit_op(buf, HostOp::LoadSlow { size, dst, addr, disp });
}

pub fn emit_store_slow(buf: &mut CodeBuffer, size: AccessSize, src: Reg, addr: Reg, disp: i32) {
    emit_op(buf, HostOp::StoreSlow { size, src, addr, disp });
}

pub fn emit_gather_pipe_write(buf: &mut CodeBuffer, size: AccessSize, src: Reg) {
    emit_op(buf, HostOp::GatherPipeWrite { size, src });
}

// -- Calls --

pub fn emit_call_interp(buf: &mut CodeBuffer, word: u32) {
    emit_op(buf, HostOp::CallInterp { word });
}

pub fn emit_call_helper(buf: &mut CodeBuffer, helper: Helper) {
    emit_op(buf, HostOp::CallHelper { helper });
}

fn push_mask(gprs: RegSet, fprs: RegSet) -> u32 {
    (gprs.raw() as u32 & 0xFFFF) | ((fprs.raw() as u32 & 0xFFFF) << 16)
}

/// Save registers across a call. Nothing is emitted for empty sets.
pub fn emit_push(buf: &mut CodeBuffer, gprs: RegSet, fprs: RegSet) {
    let mask = push_mask(gprs, fprs);
    if mask != 0 {
        emit_op(buf, HostOp::Push { mask });
    }
}

pub fn emit_pop(buf: &mut CodeBuffer, gprs: RegSet, fprs: RegSet) {
    let mask = push_mask(gprs, fprs);
    if mask != 0 {
        emit_op(buf, HostOp::Pop { mask });
    }
}

// -- Float --

pub fn emit_fld_state(buf: &mut CodeBuffer, dst: FReg, slot: StateSlot) {
    emit_op(buf, HostOp::FLdState { dst, slot });
}

pub fn emit_fst_state(buf: &mut CodeBuffer, src: FReg, slot: StateSlot) {
    emit_op(buf, HostOp::FStState { src, slot });
}

pub fn emit_fmov(buf: &mut CodeBuffer, dst: FReg, src: FReg) {
    if dst != src {
        emit_op(buf, HostOp::FMov { dst, src });
    }
}

pub fn emit_falu(buf: &mut CodeBuffer, op: FAluOp, dst: FReg, src: FReg) {
    emit_op(buf, HostOp::FAlu { op, dst, src });
}

pub fn emit_funary(buf: &mut CodeBuffer, op: FUnaryOp, dst: FReg) {
    emit_op(buf, HostOp::FUnary { op, dst });
}

pub fn emit_ffrom_int(buf: &mut CodeBuffer, single: bool, dst: FReg, src: Reg) {
    emit_op(buf, HostOp::FFromInt { single, dst, src });
}

pub fn emit_fto_int(buf: &mut CodeBuffer, single: bool, dst: Reg, src: FReg) {
    emit_op(buf, HostOp::FToInt { single, dst, src });
}

// ==========================================================
// VmCodeGen: shared stubs and jump patching
// ==========================================================

/// Code generator for the host register machine.
///
/// Owns the return stubs at the start of the code buffer. Every block exit
/// is a `Jmp` to one of them until it is linked.
pub struct VmCodeGen {
    pub dispatcher_offset: usize,
    pub timing_offset: usize,
    pub exception_offset: usize,
    pub breakpoint_offset: usize,
    pub code_gen_start: usize,
}

impl VmCodeGen {
    pub fn new() -> Self {
        Self {
            dispatcher_offset: 0,
            timing_offset: 0,
            exception_offset: 0,
            breakpoint_offset: 0,
            code_gen_start: 0,
        }
    }

    /// Emit a patchable exit to the dispatcher; returns the jump's offset.
    pub fn emit_exit_jump(&self, buf: &mut CodeBuffer, code: ExitCode) -> usize {
        emit_jmp(buf, self.exit_stub(code))
    }
}

impl Default for VmCodeGen {
    fn default() -> Self {
        Self::new()
    }
}

impl HostCodeGen for VmCodeGen {
    fn emit_epilogue(&mut self, buf: &mut CodeBuffer) {
        self.dispatcher_offset = buf.offset();
        emit_ret(buf, ExitCode::Dispatch);
        self.timing_offset = buf.offset();
        emit_ret(buf, ExitCode::Timing);
        self.exception_offset = buf.offset();
        emit_ret(buf, ExitCode::Exception);
        self.breakpoint_offset = buf.offset();
        emit_ret(buf, ExitCode::Breakpoint);
        self.code_gen_start = buf.offset();
    }

    fn patch_jump(&self, buf: &mut CodeBuffer, jump_offset: usize, target_offset: usize) {
        assert_eq!(buf.read_u8(jump_offset), OPC_JMP, "patch site is not a jump");
        buf.patch_u32(jump_offset + 1, target_offset as u32);
    }

    fn exit_stub(&self, code: ExitCode) -> usize {
        match code {
            ExitCode::Dispatch => self.dispatcher_offset,
            ExitCode::Timing => self.timing_offset,
            ExitCode::Exception => self.exception_offset,
            ExitCode::Breakpoint => self.breakpoint_offset,
        }
    }

    fn code_gen_start(&self) -> usize {
        self.code_gen_start
    }
}
