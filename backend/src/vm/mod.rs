pub mod cpu;
pub mod emitter;
pub mod insn;
pub mod regs;

pub use cpu::{HostContext, HostCpu, HostEnv, HostError, HostExit, HostFault};
pub use emitter::{Fixup, VmCodeGen};
pub use insn::{
    decode_all, AluOp, Cond, DecodeError, ExitCode, FAluOp, FUnaryOp, Helper, HostOp, UnaryOp,
    JMP_SIZE,
};
pub use regs::{FReg, Reg};
