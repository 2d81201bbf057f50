//! The dispatcher: look up or compile the block at `pc`, run it, handle
//! the reason it returned, repeat until the cycle budget is spent.

use std::collections::BTreeSet;

use gekko_backend::vm::{decode_all, DecodeError, HostOp};
use gekko_backend::{
    BackpatchSite, CodeBuffer, FaultError, HostCodeGen, HostContext, HostCpu, HostEnv, HostExit,
    TrapHandler, VmCodeGen,
};
use gekko_backend::vm::{ExitCode, Helper};
use gekko_core::state::{exception, msr, spr};
use gekko_core::{AccessSize, BlockId, GuestInstruction, GuestMemory, JitConfig, PpcState};
use gekko_frontend::{
    build_gekko_table, compile_block, AnalyzedBlock, BlockAnalyzer, CompileEnv, EmitError,
    GekkoTable, Interpreter, OpStats,
};
use tracing::{debug, info, trace, warn};

use crate::block_cache::BlockCache;
use crate::fault::{undo_offset, FaultRecovery};
use crate::memory::Memory;
use crate::JitError;

/// CPU cycles per time base tick.
const TIMEBASE_DIVISOR: u64 = 12;

/// Why [`Jit::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The cycle budget was consumed.
    BudgetExhausted,
    /// Execution stopped before the instruction at this address.
    Breakpoint(u32),
}

pub struct Jit {
    config: JitConfig,
    table: GekkoTable,
    buf: CodeBuffer,
    codegen: VmCodeGen,
    cache: BlockCache,
    faults: FaultRecovery,
    analyzer: BlockAnalyzer,
    cpu: HostCpu,
    stats: OpStats,
    breakpoints: BTreeSet<u32>,
    /// Generated blocks end before this offset; trampolines live after it.
    code_limit: usize,
    total_cycles: u64,
    /// Downcount the current timeslice started with.
    slice_len: i64,
    /// Resuming from a breakpoint at this address steps over it once.
    stopped_at: Option<u32>,
    clear_requested: bool,
    clears: u64,
}

impl Jit {
    pub fn new(config: JitConfig) -> Result<Self, JitError> {
        let table = build_gekko_table()?;
        let mut buf =
            CodeBuffer::with_trampolines(config.code_buffer_size, config.trampoline_region_size)?;
        let mut codegen = VmCodeGen::new();
        codegen.emit_epilogue(&mut buf);

        let capacity = buf.capacity();
        let code_limit = buf.code_limit().max(codegen.code_gen_start());
        info!(
            capacity,
            code_limit,
            opcodes = table.len(),
            "jit initialized"
        );

        Ok(Self {
            stats: OpStats::new(table.len()),
            analyzer: BlockAnalyzer::new(config.lookahead_window),
            faults: FaultRecovery::new(code_limit..capacity),
            cache: BlockCache::new(),
            cpu: HostCpu::new(),
            breakpoints: BTreeSet::new(),
            code_limit,
            total_cycles: 0,
            slice_len: 0,
            stopped_at: None,
            clear_requested: false,
            clears: 0,
            config,
            table,
            buf,
            codegen,
        })
    }

    // ── Accessors ───────────────────────────────────────

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    pub fn table(&self) -> &GekkoTable {
        &self.table
    }

    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    pub fn faults(&self) -> &FaultRecovery {
        &self.faults
    }

    pub fn stats(&self) -> &OpStats {
        &self.stats
    }

    pub fn code_buffer(&self) -> &CodeBuffer {
        &self.buf
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Host instructions executed since creation.
    pub fn host_instructions(&self) -> u64 {
        self.cpu.executed
    }

    pub fn clear_count(&self) -> u64 {
        self.clears
    }

    // ── Breakpoints ─────────────────────────────────────

    /// Blocks compiled earlier have no check at `address`, so the cache
    /// is cleared.
    pub fn add_breakpoint(&mut self, address: u32) {
        if self.breakpoints.insert(address) {
            self.clear_cache();
        }
    }

    pub fn remove_breakpoint(&mut self, address: u32) {
        self.breakpoints.remove(&address);
    }

    pub fn breakpoints(&self) -> &BTreeSet<u32> {
        &self.breakpoints
    }

    // ── Cache management ────────────────────────────────

    /// Drop every compiled block, exit record, backpatch site and
    /// trampoline.
    pub fn clear_cache(&mut self) {
        self.cache.clear(&mut self.buf, &self.codegen);
        self.faults.clear();
        self.clear_requested = false;
        self.clears += 1;
    }

    /// Compile the block at `address` if it is not cached. `None` when
    /// its first instruction cannot be fetched.
    pub fn compile_at(&mut self, mem: &mut Memory, address: u32) -> Result<Option<BlockId>, JitError> {
        if let Some(id) = self.cache.lookup(address) {
            return Ok(Some(id));
        }
        let block = self.analyzer.analyze(
            &self.table,
            mem,
            address,
            self.config.block_limit(),
            &self.breakpoints,
        );
        if block.memory_exception {
            return Ok(None);
        }

        if self.buf.code_room() < self.config.min_code_space {
            info!("code space low, clearing cache");
            self.clear_cache();
        }
        match self.compile(&block) {
            Ok(id) => Ok(Some(id)),
            Err(EmitError::OutOfSpace { offset }) => {
                warn!(offset, "block did not fit, clearing cache and retrying");
                self.clear_cache();
                self.compile(&block)
                    .map(Some)
                    .map_err(|_| JitError::CodeSpaceExhausted { pc: address })
            }
        }
    }

    fn compile(&mut self, block: &AnalyzedBlock) -> Result<BlockId, EmitError> {
        let id = self.cache.allocate(block.address);
        let env = CompileEnv {
            codegen: &self.codegen,
            config: &self.config,
            table: &self.table,
            breakpoints: &self.breakpoints,
            code_limit: self.code_limit,
        };
        let report = compile_block(&mut self.buf, &env, block, &mut self.stats)?;
        debug!(
            guest = format_args!("{:#010x}", block.address),
            instructions = report.instructions,
            host_size = report.host_end - report.checked_entry,
            fallbacks = report.interp_calls.len(),
            "block compiled"
        );
        self.faults.register(&report.sites);
        self.cache
            .finalize(&mut self.buf, &self.codegen, id, &report, self.config.enable_block_linking);
        Ok(id)
    }

    /// Decoded host code of a compiled block, checked entry first.
    pub fn host_code(&self, id: BlockId) -> Result<Vec<(usize, HostOp)>, DecodeError> {
        let range = self.cache.get(id).host_code_range();
        decode_all(self.buf.range(range.start, range.end), range.start)
    }

    // ── Execution ───────────────────────────────────────

    /// Run guest code from `state.pc` for about `cycles` cycles.
    pub fn run(&mut self, state: &mut PpcState, mem: &mut Memory, cycles: u64) -> Result<RunExit, JitError> {
        let target = self.total_cycles + cycles;
        loop {
            if self.clear_requested || state.invalidate_icache {
                state.invalidate_icache = false;
                self.clear_cache();
            }

            if state.downcount <= 0 {
                self.end_timeslice(state, mem);
                if self.total_cycles >= target {
                    return Ok(RunExit::BudgetExhausted);
                }
                self.start_timeslice(state, target);
            }

            if let Some(address) = self.stopped_at.take() {
                if state.pc == address {
                    let spent = Interpreter::new(state, mem).step(&self.table);
                    state.downcount -= spent.max(1) as i32;
                    continue;
                }
            }

            let Some(id) = self.compile_at(mem, state.pc)? else {
                warn!(pc = format_args!("{:#010x}", state.pc), "instruction fetch failed, raising ISI");
                state.exceptions |= exception::ISI;
                state.npc = state.pc;
                state.check_exceptions();
                state.downcount -= 1;
                continue;
            };

            let before = state.downcount;
            let code = self.execute(id, state, mem)?;
            // Every dispatch costs time, so an exception vector that faults
            // back into itself still runs the budget down.
            if state.downcount >= before {
                state.downcount = before - 1;
            }
            trace!(?code, pc = format_args!("{:#010x}", state.pc), "block exit");
            match code {
                ExitCode::Dispatch | ExitCode::Timing => {
                    if state.exceptions != 0 {
                        state.npc = state.pc;
                        state.check_exceptions();
                    }
                }
                ExitCode::Exception => {
                    state.check_exceptions();
                }
                ExitCode::Breakpoint => {
                    self.stopped_at = Some(state.pc);
                    return Ok(RunExit::Breakpoint(state.pc));
                }
            }
        }
    }

    /// Enter a block at its normal entry and run until generated code
    /// returns, repairing fastmem faults on the way.
    fn execute(&mut self, id: BlockId, state: &mut PpcState, mem: &mut Memory) -> Result<ExitCode, JitError> {
        let entry = self.cache.get(id).normal_entry;
        let mut env = Env {
            state,
            mem,
            table: &self.table,
            stats: &mut self.stats,
            breakpoints: &self.breakpoints,
        };
        let mut exit = self.cpu.enter(&self.buf, entry, &mut env)?;
        loop {
            let fault = match exit {
                HostExit::Return(code) => return Ok(code),
                HostExit::Fault(fault) => fault,
            };
            match self.faults.handle_trap(&mut self.buf, &fault, &mut self.cpu.ctx) {
                Ok(()) => {}
                Err(FaultError::TrampolineSpaceExhausted) => {
                    let site = *self
                        .faults
                        .site(fault.pc)
                        .ok_or(FaultError::NoSite { pc: fault.pc })?;
                    warn!(site = fault.pc, "trampoline space exhausted, emulating access");
                    emulate_access(&site, &mut self.cpu.ctx, &mut env);
                    self.clear_requested = true;
                }
                Err(err) => return Err(err.into()),
            }
            exit = self.cpu.resume(&self.buf, &mut env)?;
        }
    }

    fn start_timeslice(&mut self, state: &mut PpcState, target: u64) {
        let remaining = target - self.total_cycles;
        let slice = remaining.clamp(1, self.config.timeslice_cycles.max(1) as u64) as i32;
        state.downcount = slice;
        self.slice_len = slice as i64;
    }

    /// Account for the cycles run in the slice that just ended and advance
    /// the timers.
    fn end_timeslice(&mut self, state: &mut PpcState, mem: &mut Memory) {
        let executed = (self.slice_len - state.downcount as i64).max(0) as u64;
        self.total_cycles += executed;
        self.slice_len = 0;
        state.downcount = 0;

        let dec = state.spr[spr::DEC];
        let next = dec.wrapping_sub(executed as u32);
        if (dec as i32) >= 0 && (next as i32) < 0 {
            state.exceptions |= exception::DECREMENTER;
        }
        state.spr[spr::DEC] = next;

        let tb = ((state.spr[spr::TU] as u64) << 32 | state.spr[spr::TL] as u64)
            .wrapping_add(executed / TIMEBASE_DIVISOR);
        state.spr[spr::TL] = tb as u32;
        state.spr[spr::TU] = (tb >> 32) as u32;

        mem.gather_pipe.flush();
        if mem.gather_pipe.take_interrupt() {
            state.exceptions |= exception::EXTERNAL_INT;
        }
        if state.exceptions != 0 {
            state.npc = state.pc;
            state.check_exceptions();
        }
    }
}

/// Perform a faulted access in place of its trampoline and continue after
/// the site.
fn emulate_access(site: &BackpatchSite, ctx: &mut HostContext, env: &mut dyn HostEnv) {
    undo_offset(site, ctx);
    let ea = (ctx.regs[site.addr.index()] as u32).wrapping_add(site.disp as u32);
    if site.is_store {
        env.write_checked(site.size, ctx.regs[site.value.index()], ea);
    } else {
        let mut value = env.read_checked(site.size, ea);
        if site.signed && site.size == AccessSize::U16 {
            value = value as u16 as i16 as i32 as u32 as u64;
        }
        ctx.regs[site.value.index()] = value;
    }
    ctx.pc = site.region_end;
}

/// What generated code sees of the machine while a block runs.
struct Env<'a> {
    state: &'a mut PpcState,
    mem: &'a mut Memory,
    table: &'a GekkoTable,
    stats: &'a mut OpStats,
    breakpoints: &'a BTreeSet<u32>,
}

impl HostEnv for Env<'_> {
    fn state(&mut self) -> &mut PpcState {
        self.state
    }

    fn fastmem(&mut self, addr: u32, len: usize) -> Option<&mut [u8]> {
        self.mem.fastmem(addr, len)
    }

    fn read_checked(&mut self, size: AccessSize, addr: u32) -> u64 {
        match self.mem.read_sized(size, addr) {
            Ok(value) => value,
            Err(fault) => {
                self.state.raise_dsi(fault.address, false);
                0
            }
        }
    }

    fn write_checked(&mut self, size: AccessSize, value: u64, addr: u32) {
        if let Err(fault) = self.mem.write_sized(size, value, addr) {
            self.state.raise_dsi(fault.address, true);
        }
    }

    fn gather_pipe_write(&mut self, size: AccessSize, value: u64) {
        self.mem.gather_pipe.write(size, value);
    }

    fn interpret(&mut self, insn: GuestInstruction) {
        self.stats.record_fallback(self.table.index_of(insn));
        Interpreter::new(&mut *self.state, &mut *self.mem).execute(self.table, insn);
    }

    fn helper(&mut self, helper: Helper) -> u64 {
        match helper {
            Helper::GatherPipeFlush => {
                self.mem.gather_pipe.flush();
                if self.mem.gather_pipe.take_interrupt() {
                    self.state.exceptions |= exception::EXTERNAL_INT;
                }
                let pending = self.state.exceptions & exception::EXTERNAL_INT != 0;
                (pending && self.state.msr & msr::EE != 0) as u64
            }
            Helper::CheckBreakpoint => self.breakpoints.contains(&self.state.pc) as u64,
        }
    }
}
