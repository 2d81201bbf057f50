//! Block translation into host code.
//!
//! [`compile_block`] walks an [`AnalyzedBlock`] and emits one host sequence
//! per guest instruction, either inline or as a call into the interpreter.
//! Guest registers live in the [`GprCache`]/[`FprCache`] between
//! instructions; every path that leaves the block or hands control to the
//! interpreter writes them back first.

mod branch;
mod float;
mod integer;
mod loadstore;
mod system;

use std::collections::BTreeSet;

use gekko_backend::vm::emitter::{
    emit_alu_ri, emit_call_helper, emit_call_interp, emit_cmp_cr_ri, emit_jcc_ri_fixup, emit_jmp,
    emit_ld_state, emit_st_state, emit_st_state_imm, set_jump_target,
};
use gekko_backend::vm::regs::{FReg, Reg, RSCRATCH, RSCRATCH2, RSCRATCH_EXTRA};
use gekko_backend::vm::{AluOp, Cond, ExitCode, Helper};
use gekko_backend::{
    BackpatchSite, CodeBuffer, FlushMode, FprCache, GprCache, HostCodeGen, VmCodeGen,
};
use gekko_core::opcode::OpCategory;
use gekko_core::state::{exception, msr};
use gekko_core::{ExitRecord, JitConfig, OpFlags, RegSet, StateSlot};
use tracing::trace;

use crate::analyzer::{AnalyzedBlock, CodeOp, Lookahead};
use crate::tables::{GekkoTable, OpStats};

/// Inline translation of one opcode.
pub type JitFn = fn(&mut Translator<'_>, &CodeOp);

/// Upper bound on the host code emitted for one guest instruction,
/// including its checks and exits.
pub const MAX_INSTRUCTION_HOST_SIZE: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EmitError {
    #[error("code space exhausted at offset {offset:#x}")]
    OutOfSpace { offset: usize },
}

/// An interpreter call emitted into a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpCall {
    /// Offset of the `CallInterp`.
    pub offset: usize,
    pub guest_pc: u32,
    /// Guest registers still dirty in host registers at the call.
    pub dirty_gprs: RegSet,
    pub dirty_fprs: RegSet,
}

/// Everything the block cache and the fault engine need to know about a
/// freshly emitted block.
#[derive(Debug, Clone, Default)]
pub struct BlockReport {
    pub guest_start: u32,
    pub instructions: u32,
    pub guest_size: u32,
    pub checked_entry: usize,
    pub normal_entry: usize,
    pub host_end: usize,
    pub exits: Vec<ExitRecord>,
    pub sites: Vec<BackpatchSite>,
    pub interp_calls: Vec<InterpCall>,
    /// Offsets of the floating-point-available checks.
    pub fp_checks: Vec<usize>,
    pub gather_pipe_flushes: usize,
    pub cycles: u32,
}

/// Read-only inputs shared by every block compiled in one session.
pub struct CompileEnv<'a> {
    pub codegen: &'a VmCodeGen,
    pub config: &'a JitConfig,
    pub table: &'a GekkoTable,
    pub breakpoints: &'a BTreeSet<u32>,
    /// Generated code must end before this offset; the rest of the buffer
    /// belongs to fault trampolines.
    pub code_limit: usize,
}

/// Per-block emission state.
pub struct Translator<'a> {
    buf: &'a mut CodeBuffer,
    codegen: &'a VmCodeGen,
    config: &'a JitConfig,
    block: &'a AnalyzedBlock,
    gpr: GprCache,
    fpr: FprCache,
    pos: usize,
    /// Cycles of every instruction up to and including the current one.
    cycles: u32,
    fp_checked: bool,
    gather_pipe_bytes: u32,
    report: BlockReport,
}

/// Emit host code for `block` at the buffer's current offset.
///
/// On [`EmitError::OutOfSpace`] the buffer holds a partial block that
/// nothing references; the caller clears the cache and retries.
pub fn compile_block(
    buf: &mut CodeBuffer,
    env: &CompileEnv<'_>,
    block: &AnalyzedBlock,
    stats: &mut OpStats,
) -> Result<BlockReport, EmitError> {
    let translator = Translator {
        codegen: env.codegen,
        config: env.config,
        block,
        gpr: GprCache::new(),
        fpr: FprCache::new(),
        pos: 0,
        cycles: 0,
        fp_checked: false,
        gather_pipe_bytes: 0,
        report: BlockReport {
            guest_start: block.address,
            instructions: block.len() as u32,
            guest_size: block.len() as u32 * 4,
            ..BlockReport::default()
        },
        buf,
    };
    translator.run(env, stats)
}

impl<'a> Translator<'a> {
    fn run(mut self, env: &CompileEnv<'_>, stats: &mut OpStats) -> Result<BlockReport, EmitError> {
        self.check_space(env.code_limit)?;
        self.emit_checked_entry();
        self.gpr.start();
        self.fpr.start();

        let block = self.block;
        let last = block.ops.len().saturating_sub(1);
        for (pos, op) in block.ops.iter().enumerate() {
            self.check_space(env.code_limit)?;
            self.pos = pos;

            if self.gather_pipe_bytes >= self.config.gather_pipe_threshold {
                self.emit_gather_pipe_check(op.address);
            }
            if self.config.enable_debugging && env.breakpoints.contains(&op.address) {
                self.emit_breakpoint_check(op.address);
            }
            if op.desc.uses_fpu() && !self.fp_checked {
                self.emit_fp_check(op.address);
            }
            self.cycles += op.desc.base_cycles;

            stats.record_compile(op.index);
            match env.table.entry(op.index).routine.jit {
                Some(routine) => routine(&mut self, op),
                None => self.fallback(op),
            }

            self.gpr.unlock_all();
            self.fpr.unlock_all();
            if pos < last {
                self.gpr.release_unused(self.buf, op.gpr_in_use);
                self.fpr.release_unused(self.buf, op.fpr_in_use);
            }
        }

        if block.broken {
            self.check_space(env.code_limit)?;
            self.flush_all();
            self.emit_exit(block.next_pc());
        }

        self.report.host_end = self.buf.offset();
        self.report.cycles = self.cycles;
        trace!(
            guest = format_args!("{:#010x}", block.address),
            host = self.report.normal_entry,
            len = self.report.host_end - self.report.checked_entry,
            "block emitted"
        );
        Ok(self.report)
    }

    fn check_space(&self, limit: usize) -> Result<(), EmitError> {
        let offset = self.buf.offset();
        if offset + MAX_INSTRUCTION_HOST_SIZE > limit {
            return Err(EmitError::OutOfSpace { offset });
        }
        Ok(())
    }

    /// Entry that leaves for the timing stub when the timeslice ran out.
    fn emit_checked_entry(&mut self) {
        self.report.checked_entry = self.buf.offset();
        emit_ld_state(self.buf, RSCRATCH, StateSlot::Downcount);
        let run = emit_jcc_ri_fixup(self.buf, Cond::Gt, RSCRATCH, 0);
        emit_st_state_imm(self.buf, StateSlot::Pc, self.block.address);
        emit_jmp(self.buf, self.codegen.exit_stub(ExitCode::Timing));
        set_jump_target(self.buf, run);
        self.report.normal_entry = self.buf.offset();
    }

    // ── Register access ─────────────────────────────────

    /// Host register holding guest GPR `r`, loaded if needed.
    fn gpr_in(&mut self, r: usize) -> Reg {
        let hint = Lookahead::gpr(&self.block.ops, self.pos, self.config.lookahead_window);
        self.gpr.acquire(self.buf, r, &hint)
    }

    /// Host register that will receive guest GPR `r`.
    fn gpr_out(&mut self, r: usize) -> Reg {
        let hint = Lookahead::gpr(&self.block.ops, self.pos, self.config.lookahead_window);
        self.gpr.acquire_for_write(self.buf, r, &hint)
    }

    fn fpr_in(&mut self, r: usize) -> FReg {
        let hint = Lookahead::fpr(&self.block.ops, self.pos, self.config.lookahead_window);
        self.fpr.acquire(self.buf, r, &hint)
    }

    fn fpr_out(&mut self, r: usize) -> FReg {
        let hint = Lookahead::fpr(&self.block.ops, self.pos, self.config.lookahead_window);
        self.fpr.acquire_for_write(self.buf, r, &hint)
    }

    fn known(&self, r: usize) -> Option<u32> {
        self.gpr.known_immediate(r)
    }

    fn set_known(&mut self, r: usize, value: u32) {
        self.gpr.set_to_known_immediate(r, value);
    }

    /// CR0 from a record-form result.
    fn record_cr0(&mut self, result: Reg) {
        emit_cmp_cr_ri(self.buf, false, RSCRATCH2, result, 0);
        emit_st_state(self.buf, RSCRATCH2, StateSlot::Cr(0));
    }

    /// Write every cached register back and forget the bindings.
    fn flush_all(&mut self) {
        self.gpr.flush(self.buf, FlushMode::Discard);
        self.fpr.flush(self.buf, FlushMode::Discard);
    }

    /// Write dirty registers back on a side path without touching the
    /// bindings the main path keeps using.
    fn write_back_all(&mut self) {
        self.gpr.write_back_preserving(self.buf);
        self.fpr.write_back_preserving(self.buf);
    }

    // ── Exits ───────────────────────────────────────────

    fn emit_downcount(&mut self) {
        emit_ld_state(self.buf, RSCRATCH, StateSlot::Downcount);
        emit_alu_ri(self.buf, AluOp::Sub, RSCRATCH, self.cycles);
        emit_st_state(self.buf, RSCRATCH, StateSlot::Downcount);
    }

    /// Leave for a known guest address. The exit is recorded so the block
    /// cache can link it.
    fn emit_exit(&mut self, target: u32) {
        emit_st_state_imm(self.buf, StateSlot::Pc, target);
        self.emit_downcount();
        let patch_site = self.codegen.emit_exit_jump(self.buf, ExitCode::Dispatch);
        self.report.exits.push(ExitRecord {
            guest_target: target,
            patch_site,
            is_linked: false,
        });
    }

    /// Leave for the guest address in `target`, which must not be
    /// `RSCRATCH`.
    fn emit_dynamic_exit(&mut self, target: Reg) {
        debug_assert_ne!(target, RSCRATCH);
        emit_st_state(self.buf, target, StateSlot::Pc);
        self.emit_downcount();
        self.codegen.emit_exit_jump(self.buf, ExitCode::Dispatch);
    }

    /// Leave through the exception stub; `pc` must already be stored.
    fn emit_exception_exit(&mut self) {
        self.emit_downcount();
        self.codegen.emit_exit_jump(self.buf, ExitCode::Exception);
    }

    // ── Checks ──────────────────────────────────────────

    fn emit_gather_pipe_check(&mut self, address: u32) {
        emit_call_helper(self.buf, Helper::GatherPipeFlush);
        let no_interrupt = emit_jcc_ri_fixup(self.buf, Cond::Eq, RSCRATCH, 0);
        self.write_back_all();
        emit_st_state_imm(self.buf, StateSlot::Pc, address);
        emit_st_state_imm(self.buf, StateSlot::Npc, address);
        self.emit_exception_exit();
        set_jump_target(self.buf, no_interrupt);
        self.gather_pipe_bytes = 0;
        self.report.gather_pipe_flushes += 1;
    }

    fn emit_breakpoint_check(&mut self, address: u32) {
        emit_st_state_imm(self.buf, StateSlot::Pc, address);
        emit_call_helper(self.buf, Helper::CheckBreakpoint);
        let no_break = emit_jcc_ri_fixup(self.buf, Cond::Eq, RSCRATCH, 0);
        self.write_back_all();
        self.emit_downcount();
        self.codegen.emit_exit_jump(self.buf, ExitCode::Breakpoint);
        set_jump_target(self.buf, no_break);
    }

    /// Raise FPU-unavailable when MSR[FP] is clear. Emitted once, before
    /// the first floating-point instruction of the block.
    fn emit_fp_check(&mut self, address: u32) {
        self.report.fp_checks.push(self.buf.offset());
        emit_ld_state(self.buf, RSCRATCH, StateSlot::Msr);
        let enabled = emit_jcc_ri_fixup(self.buf, Cond::TstNz, RSCRATCH, msr::FP);
        self.write_back_all();
        emit_ld_state(self.buf, RSCRATCH, StateSlot::Exceptions);
        emit_alu_ri(self.buf, AluOp::Or, RSCRATCH, exception::FPU_UNAVAILABLE);
        emit_st_state(self.buf, RSCRATCH, StateSlot::Exceptions);
        emit_st_state_imm(self.buf, StateSlot::Pc, address);
        self.emit_exception_exit();
        set_jump_target(self.buf, enabled);
        self.fp_checked = true;
    }

    /// After an access in memcheck mode: leave with DSI pending before any
    /// register of the faulting instruction is committed.
    fn emit_memcheck(&mut self, address: u32) {
        if !self.config.enable_memcheck {
            return;
        }
        emit_ld_state(self.buf, RSCRATCH_EXTRA, StateSlot::Exceptions);
        let ok = emit_jcc_ri_fixup(self.buf, Cond::TstZ, RSCRATCH_EXTRA, exception::DSI);
        self.write_back_all();
        emit_st_state_imm(self.buf, StateSlot::Pc, address);
        self.emit_exception_exit();
        set_jump_target(self.buf, ok);
    }

    // ── Interpreter fallback ────────────────────────────

    /// Run `op` through the interpreter from generated code.
    fn fallback(&mut self, op: &CodeOp) {
        self.flush_all();
        emit_st_state_imm(self.buf, StateSlot::Pc, op.address);
        emit_st_state_imm(self.buf, StateSlot::Npc, op.address.wrapping_add(4));
        self.report.interp_calls.push(InterpCall {
            offset: self.buf.offset(),
            guest_pc: op.address,
            dirty_gprs: self.gpr.dirty_set(),
            dirty_fprs: self.fpr.dirty_set(),
        });
        emit_call_interp(self.buf, op.insn.hex());

        emit_ld_state(self.buf, RSCRATCH, StateSlot::Exceptions);
        let no_exception = emit_jcc_ri_fixup(self.buf, Cond::TstZ, RSCRATCH, exception::SYNC_MASK);
        self.emit_exception_exit();
        set_jump_target(self.buf, no_exception);

        if op.desc.flags.contains(OpFlags::CHECK_EXCEPTIONS) || is_mtmsr(op) {
            // Anything the instruction unmasked is delivered before the
            // next one runs.
            emit_ld_state(self.buf, RSCRATCH2, StateSlot::Npc);
            emit_st_state(self.buf, RSCRATCH2, StateSlot::Pc);
            self.emit_exception_exit();
        } else if op.can_end_block || op.desc.category == OpCategory::Branch {
            emit_ld_state(self.buf, RSCRATCH2, StateSlot::Npc);
            let sequential =
                emit_jcc_ri_fixup(self.buf, Cond::Eq, RSCRATCH2, op.address.wrapping_add(4));
            self.emit_dynamic_exit(RSCRATCH2);
            set_jump_target(self.buf, sequential);
            // A conditional branch that was not taken continues inline.
            if op.can_end_block {
                self.emit_exit(op.address.wrapping_add(4));
            }
        }
    }
}

fn is_mtmsr(op: &CodeOp) -> bool {
    op.desc.name == "mtmsr"
}

/// Inline translation for `name`, if there is one.
pub fn lookup(name: &str) -> Option<JitFn> {
    use branch::*;
    use float::*;
    use integer::*;
    use loadstore::*;
    use system::*;

    let f: JitFn = match name {
        // Integer
        "addi" => addi,
        "addis" => addis,
        "addic" => addic,
        "addic_rc" => addic_rc,
        "subfic" => subfic,
        "mulli" => mulli,
        "ori" => ori,
        "oris" => oris,
        "xori" => xori,
        "xoris" => xoris,
        "andi_rc" => andi_rc,
        "andis_rc" => andis_rc,
        "cmpi" => cmpi,
        "cmpli" => cmpli,
        "cmp" => cmp,
        "cmpl" => cmpl,
        "rlwinmx" => rlwinmx,
        "rlwimix" => rlwimix,
        "rlwnmx" => rlwnmx,
        "addx" => addx,
        "addcx" => addcx,
        "subfx" => subfx,
        "subfcx" => subfcx,
        "negx" => negx,
        "mullwx" => mullwx,
        "mulhwx" => mulhwx,
        "mulhwux" => mulhwux,
        "andx" => andx,
        "andcx" => andcx,
        "orx" => orx,
        "orcx" => orcx,
        "xorx" => xorx,
        "norx" => norx,
        "nandx" => nandx,
        "eqvx" => eqvx,
        "slwx" => slwx,
        "srwx" => srwx,
        "srawix" => srawix,
        "cntlzwx" => cntlzwx,
        "extsbx" => extsbx,
        "extshx" => extshx,

        // Load/store
        "lwz" => lwz,
        "lwzu" => lwzu,
        "lwzx" => lwzx,
        "lwzux" => lwzux,
        "lbz" => lbz,
        "lbzu" => lbzu,
        "lbzx" => lbzx,
        "lbzux" => lbzux,
        "lhz" => lhz,
        "lhzu" => lhzu,
        "lhzx" => lhzx,
        "lhzux" => lhzux,
        "lha" => lha,
        "lhau" => lhau,
        "lhax" => lhax,
        "lhaux" => lhaux,
        "stw" => stw,
        "stwu" => stwu,
        "stwx" => stwx,
        "stwux" => stwux,
        "sth" => sth,
        "sthu" => sthu,
        "sthx" => sthx,
        "sthux" => sthux,
        "stb" => stb,
        "stbu" => stbu,
        "stbx" => stbx,
        "stbux" => stbux,
        "lfs" => lfs,
        "lfsu" => lfsu,
        "lfsx" => lfsx,
        "lfd" => lfd,
        "lfdu" => lfdu,
        "lfdx" => lfdx,
        "stfs" => stfs,
        "stfsu" => stfsu,
        "stfsx" => stfsx,
        "stfd" => stfd,
        "stfdu" => stfdu,
        "stfdx" => stfdx,

        // Branch
        "bx" => bx,
        "bcx" => bcx,
        "bclrx" => bclrx,
        "bcctrx" => bcctrx,

        // Float
        "faddx" => faddx,
        "fsubx" => fsubx,
        "fmulx" => fmulx,
        "fdivx" => fdivx,
        "faddsx" => faddsx,
        "fsubsx" => fsubsx,
        "fmulsx" => fmulsx,
        "fdivsx" => fdivsx,
        "fmrx" => fmrx,
        "fnegx" => fnegx,
        "fabsx" => fabsx,
        "fnabsx" => fnabsx,
        "frspx" => frspx,

        // System
        "sc" => sc,
        "sync" | "isync" | "eieio" | "dcbt" | "dcbtst" => no_op,
        "mfspr" => mfspr,
        "mtspr" => mtspr,
        _ => return None,
    };
    Some(f)
}
