//! Executor for the host register machine.
//!
//! Runs generated code out of a [`CodeBuffer`] until it returns to the
//! dispatcher. A fast memory access outside the fastmem view stops
//! execution with [`HostExit::Fault`] and leaves the register context as it
//! was at the faulting instruction, so a trap handler can inspect and
//! rewrite it before calling [`HostCpu::resume`].

use gekko_core::{AccessSize, GuestInstruction, PpcState};

use crate::code_buffer::CodeBuffer;
use crate::vm::insn::{DecodeError, ExitCode, Helper, HostOp};
use crate::vm::regs::{NUM_REGS, POISON};

/// Services generated code calls out to.
pub trait HostEnv {
    fn state(&mut self) -> &mut PpcState;

    /// Host bytes backing `len` guest bytes at `addr`, or `None` when the
    /// range is not in the fastmem view.
    fn fastmem(&mut self, addr: u32, len: usize) -> Option<&mut [u8]>;

    /// Checked read. A fault raises DSI in guest state and yields zero.
    fn read_checked(&mut self, size: AccessSize, addr: u32) -> u64;

    /// Checked write. A fault raises DSI in guest state.
    fn write_checked(&mut self, size: AccessSize, value: u64, addr: u32);

    fn gather_pipe_write(&mut self, size: AccessSize, value: u64);

    /// Run one instruction in the interpreter against guest state.
    fn interpret(&mut self, insn: GuestInstruction);

    fn helper(&mut self, helper: Helper) -> u64;
}

/// Register file and program counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    /// Byte offset into the code buffer.
    pub pc: usize,
    pub regs: [u64; NUM_REGS],
    pub fregs: [u64; NUM_REGS],
}

impl Default for HostContext {
    fn default() -> Self {
        Self {
            pc: 0,
            regs: [0; NUM_REGS],
            fregs: [0; NUM_REGS],
        }
    }
}

/// A fast access that missed the fastmem view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostFault {
    /// Offset of the faulting `LoadFast`/`StoreFast`.
    pub pc: usize,
    pub address: u32,
    pub size: AccessSize,
    pub is_store: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostExit {
    Return(ExitCode),
    Fault(HostFault),
}

/// Generated code did something it never should.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("executed trap filler at {pc:#x}")]
    TrapFiller { pc: usize },
    #[error("pop with empty stack at {pc:#x}")]
    StackUnderflow { pc: usize },
    #[error("host pc {pc:#x} outside the code buffer")]
    PcOutOfRange { pc: usize },
}

pub struct HostCpu {
    pub ctx: HostContext,
    stack: Vec<u64>,
    /// Host instructions executed since creation.
    pub executed: u64,
}

impl HostCpu {
    pub fn new() -> Self {
        Self {
            ctx: HostContext::default(),
            stack: Vec::new(),
            executed: 0,
        }
    }

    /// Start executing at `entry`.
    pub fn enter(
        &mut self,
        buf: &CodeBuffer,
        entry: usize,
        env: &mut dyn HostEnv,
    ) -> Result<HostExit, HostError> {
        self.ctx.pc = entry;
        self.stack.clear();
        self.resume(buf, env)
    }

    /// Continue from `ctx.pc`, e.g. after a trap handler rewrote the context.
    pub fn resume(&mut self, buf: &CodeBuffer, env: &mut dyn HostEnv) -> Result<HostExit, HostError> {
        loop {
            let pc = self.ctx.pc;
            if pc >= buf.capacity() {
                return Err(HostError::PcOutOfRange { pc });
            }
            let op = HostOp::decode(buf.tail(pc), pc)?;
            self.executed += 1;
            let mut next = pc + op.encoded_len();
            let regs = &mut self.ctx.regs;
            let fregs = &mut self.ctx.fregs;

            match op {
                HostOp::Nop => {}
                HostOp::Trap => return Err(HostError::TrapFiller { pc }),
                HostOp::Mov { dst, src } => regs[dst.index()] = regs[src.index()],
                HostOp::MovImm { dst, imm } => regs[dst.index()] = imm as u64,
                HostOp::LdState { dst, slot } => regs[dst.index()] = env.state().read_slot(slot),
                HostOp::StState { src, slot } => env.state().write_slot(slot, regs[src.index()]),
                HostOp::StStateImm { slot, imm } => env.state().write_slot(slot, imm as u64),
                HostOp::Alu { op, dst, src } => {
                    let v = op.apply(regs[dst.index()] as u32, regs[src.index()] as u32);
                    regs[dst.index()] = v as u64;
                }
                HostOp::AluImm { op, dst, imm } => {
                    regs[dst.index()] = op.apply(regs[dst.index()] as u32, imm) as u64;
                }
                HostOp::Unary { op, dst } => regs[dst.index()] = op.apply(regs[dst.index()]),
                HostOp::SetCond { cond, dst, a, b } => {
                    regs[dst.index()] = cond.eval(regs[a.index()] as u32, regs[b.index()] as u32) as u64;
                }
                HostOp::SetCondImm { cond, dst, a, imm } => {
                    regs[dst.index()] = cond.eval(regs[a.index()] as u32, imm) as u64;
                }
                HostOp::CmpCr { unsigned, dst, a, b } => {
                    let (a, b) = (regs[a.index()] as u32, regs[b.index()] as u32);
                    regs[dst.index()] = compare(env.state(), unsigned, a, b);
                }
                HostOp::CmpCrImm { unsigned, dst, a, imm } => {
                    let a = regs[a.index()] as u32;
                    regs[dst.index()] = compare(env.state(), unsigned, a, imm);
                }
                HostOp::Jmp { target } => next = target as usize,
                HostOp::JccImm { cond, a, imm, target } => {
                    if cond.eval(regs[a.index()] as u32, imm) {
                        next = target as usize;
                    }
                }
                HostOp::Jcc { cond, a, b, target } => {
                    if cond.eval(regs[a.index()] as u32, regs[b.index()] as u32) {
                        next = target as usize;
                    }
                }
                HostOp::LoadFast { size, dst, addr, disp } => {
                    let ea = (regs[addr.index()] as u32).wrapping_add(disp as u32);
                    let len = size.bytes() as usize;
                    let Some(bytes) = env.fastmem(ea, len) else {
                        return Ok(HostExit::Fault(HostFault { pc, address: ea, size, is_store: false }));
                    };
                    let mut raw = [0u8; 8];
                    raw[..len].copy_from_slice(&bytes[..len]);
                    regs[dst.index()] = u64::from_le_bytes(raw);
                }
                HostOp::StoreFast { size, src, addr, disp } => {
                    let ea = (regs[addr.index()] as u32).wrapping_add(disp as u32);
                    let len = size.bytes() as usize;
                    let value = regs[src.index()].to_le_bytes();
                    let Some(bytes) = env.fastmem(ea, len) else {
                        return Ok(HostExit::Fault(HostFault { pc, address: ea, size, is_store: true }));
                    };
                    bytes[..len].copy_from_slice(&value[..len]);
                }
                HostOp::LoadSlow { size, dst, addr, disp } => {
                    let ea = (regs[addr.index()] as u32).wrapping_add(disp as u32);
                    let v = env.read_checked(size, ea);
                    clobber(regs, fregs, Some(dst.index()));
                    regs[dst.index()] = v;
                }
                HostOp::StoreSlow { size, src, addr, disp } => {
                    let ea = (regs[addr.index()] as u32).wrapping_add(disp as u32);
                    env.write_checked(size, regs[src.index()], ea);
                    clobber(regs, fregs, None);
                }
                HostOp::GatherPipeWrite { size, src } => {
                    env.gather_pipe_write(size, regs[src.index()]);
                    clobber(regs, fregs, None);
                }
                HostOp::CallInterp { word } => {
                    env.interpret(GuestInstruction(word));
                    clobber(regs, fregs, None);
                }
                HostOp::CallHelper { helper } => {
                    let v = env.helper(helper);
                    clobber(regs, fregs, Some(0));
                    regs[0] = v;
                }
                HostOp::Ret { code } => {
                    self.ctx.pc = next;
                    return Ok(HostExit::Return(code));
                }
                HostOp::Push { mask } => {
                    for bit in 0..32 {
                        if mask & (1 << bit) != 0 {
                            let v = if bit < 16 { regs[bit] } else { fregs[bit - 16] };
                            self.stack.push(v);
                        }
                    }
                }
                HostOp::Pop { mask } => {
                    for bit in (0..32).rev() {
                        if mask & (1 << bit) != 0 {
                            let v = self.stack.pop().ok_or(HostError::StackUnderflow { pc })?;
                            if bit < 16 {
                                regs[bit] = v;
                            } else {
                                fregs[bit - 16] = v;
                            }
                        }
                    }
                }
                HostOp::FLdState { dst, slot } => fregs[dst.index()] = env.state().read_slot(slot),
                HostOp::FStState { src, slot } => env.state().write_slot(slot, fregs[src.index()]),
                HostOp::FMov { dst, src } => fregs[dst.index()] = fregs[src.index()],
                HostOp::FAlu { op, dst, src } => {
                    let a = f64::from_bits(fregs[dst.index()]);
                    let b = f64::from_bits(fregs[src.index()]);
                    fregs[dst.index()] = op.apply(a, b).to_bits();
                }
                HostOp::FUnary { op, dst } => fregs[dst.index()] = op.apply(fregs[dst.index()]),
                HostOp::FFromInt { single, dst, src } => {
                    let v = regs[src.index()];
                    fregs[dst.index()] = if single {
                        gekko_core::state::single_to_double_bits(v as u32)
                    } else {
                        v
                    };
                }
                HostOp::FToInt { single, dst, src } => {
                    let v = fregs[src.index()];
                    regs[dst.index()] = if single {
                        gekko_core::state::double_to_single_bits(v) as u64
                    } else {
                        v
                    };
                }
            }
            self.ctx.pc = next;
        }
    }
}

impl Default for HostCpu {
    fn default() -> Self {
        Self::new()
    }
}

fn compare(state: &PpcState, unsigned: bool, a: u32, b: u32) -> u64 {
    let field = if unsigned {
        state.compare_unsigned(a, b)
    } else {
        state.compare_signed(a as i32, b as i32)
    };
    field as u64
}

/// Poison the caller-saved registers a call may have clobbered.
fn clobber(regs: &mut [u64; NUM_REGS], fregs: &mut [u64; NUM_REGS], keep: Option<usize>) {
    for (i, r) in regs.iter_mut().enumerate().take(4) {
        if Some(i) != keep {
            *r = POISON;
        }
    }
    fregs[0] = POISON;
    fregs[1] = POISON;
}
