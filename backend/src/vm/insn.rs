//! Instruction set of the host register machine.
//!
//! Every instruction starts with one opcode byte followed by fixed-size
//! operands in little-endian order. Jump targets are absolute code-buffer
//! offsets, so a `Jmp` can be retargeted by rewriting its four target bytes.

use std::fmt;

use gekko_core::{AccessSize, StateSlot};

use crate::vm::regs::{FReg, Reg};

// -- Opcode bytes --

pub const OPC_NOP: u8 = 0x00;
pub const OPC_MOV_RR: u8 = 0x01;
pub const OPC_MOV_RI: u8 = 0x02;
pub const OPC_LD_STATE: u8 = 0x03;
pub const OPC_ST_STATE: u8 = 0x04;
pub const OPC_ST_STATE_IMM: u8 = 0x05;
pub const OPC_ALU_RR: u8 = 0x06;
pub const OPC_ALU_RI: u8 = 0x07;
pub const OPC_UNARY: u8 = 0x08;
pub const OPC_SETCOND: u8 = 0x09;
pub const OPC_CMP_CR: u8 = 0x0A;
pub const OPC_CMP_CR_IMM: u8 = 0x0B;
pub const OPC_JMP: u8 = 0x0C;
pub const OPC_JCC_RI: u8 = 0x0D;
pub const OPC_JCC_RR: u8 = 0x0E;
pub const OPC_SETCOND_IMM: u8 = 0x0F;
pub const OPC_LOAD_FAST: u8 = 0x10;
pub const OPC_STORE_FAST: u8 = 0x11;
pub const OPC_LOAD_SLOW: u8 = 0x12;
pub const OPC_STORE_SLOW: u8 = 0x13;
pub const OPC_GATHER_PIPE_WRITE: u8 = 0x14;
pub const OPC_CALL_INTERP: u8 = 0x15;
pub const OPC_CALL_HELPER: u8 = 0x16;
pub const OPC_RET: u8 = 0x17;
pub const OPC_PUSH: u8 = 0x18;
pub const OPC_POP: u8 = 0x19;
pub const OPC_FLD_STATE: u8 = 0x20;
pub const OPC_FST_STATE: u8 = 0x21;
pub const OPC_FMOV_RR: u8 = 0x22;
pub const OPC_FALU: u8 = 0x23;
pub const OPC_FUNARY: u8 = 0x24;
pub const OPC_FFROM_INT: u8 = 0x25;
pub const OPC_FTO_INT: u8 = 0x26;
pub const OPC_TRAP: u8 = 0xCC;

/// Size of `Jmp`, the only instruction ever patched in place.
pub const JMP_SIZE: usize = 5;

/// 32-bit ALU operations. `dst = dst op src`, result zero-extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AluOp {
    Add = 0,
    Sub = 1,
    And = 2,
    Or = 3,
    Xor = 4,
    /// `dst & !src`
    Andc = 5,
    /// `dst | !src`
    Orc = 6,
    Nor = 7,
    Nand = 8,
    Eqv = 9,
    /// Shift amounts use the low six bits; 32..63 yield zero.
    Shl = 10,
    Shr = 11,
    /// Arithmetic right shift; 32..63 fill with the sign bit.
    Sar = 12,
    Rotl = 13,
    Mul = 14,
    MulHs = 15,
    MulHu = 16,
}

const ALU_OPS: [AluOp; 17] = [
    AluOp::Add,
    AluOp::Sub,
    AluOp::And,
    AluOp::Or,
    AluOp::Xor,
    AluOp::Andc,
    AluOp::Orc,
    AluOp::Nor,
    AluOp::Nand,
    AluOp::Eqv,
    AluOp::Shl,
    AluOp::Shr,
    AluOp::Sar,
    AluOp::Rotl,
    AluOp::Mul,
    AluOp::MulHs,
    AluOp::MulHu,
];

impl AluOp {
    pub fn from_u8(n: u8) -> Option<Self> {
        ALU_OPS.get(n as usize).copied()
    }

    pub fn apply(self, a: u32, b: u32) -> u32 {
        match self {
            AluOp::Add => a.wrapping_add(b),
            AluOp::Sub => a.wrapping_sub(b),
            AluOp::And => a & b,
            AluOp::Or => a | b,
            AluOp::Xor => a ^ b,
            AluOp::Andc => a & !b,
            AluOp::Orc => a | !b,
            AluOp::Nor => !(a | b),
            AluOp::Nand => !(a & b),
            AluOp::Eqv => !(a ^ b),
            AluOp::Shl => ((a as u64) << (b & 63)) as u32,
            AluOp::Shr => ((a as u64) >> (b & 63)) as u32,
            AluOp::Sar => ((a as i32 as i64) >> (b & 63)) as u32,
            AluOp::Rotl => a.rotate_left(b & 31),
            AluOp::Mul => a.wrapping_mul(b),
            AluOp::MulHs => ((a as i32 as i64 * b as i32 as i64) >> 32) as u32,
            AluOp::MulHu => ((a as u64 * b as u64) >> 32) as u32,
        }
    }

    fn name(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::And => "and",
            AluOp::Or => "or",
            AluOp::Xor => "xor",
            AluOp::Andc => "andc",
            AluOp::Orc => "orc",
            AluOp::Nor => "nor",
            AluOp::Nand => "nand",
            AluOp::Eqv => "eqv",
            AluOp::Shl => "shl",
            AluOp::Shr => "shr",
            AluOp::Sar => "sar",
            AluOp::Rotl => "rotl",
            AluOp::Mul => "mul",
            AluOp::MulHs => "mulhs",
            AluOp::MulHu => "mulhu",
        }
    }
}

/// Single-register operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UnaryOp {
    Not = 0,
    Neg = 1,
    ExtS8 = 2,
    ExtS16 = 3,
    /// Leading zeros of the low 32 bits.
    Cntlz = 4,
    Bswap16 = 5,
    Bswap32 = 6,
    /// Full 64-bit swap.
    Bswap64 = 7,
}

const UNARY_OPS: [UnaryOp; 8] = [
    UnaryOp::Not,
    UnaryOp::Neg,
    UnaryOp::ExtS8,
    UnaryOp::ExtS16,
    UnaryOp::Cntlz,
    UnaryOp::Bswap16,
    UnaryOp::Bswap32,
    UnaryOp::Bswap64,
];

impl UnaryOp {
    pub fn from_u8(n: u8) -> Option<Self> {
        UNARY_OPS.get(n as usize).copied()
    }

    pub fn apply(self, v: u64) -> u64 {
        let w = v as u32;
        match self {
            UnaryOp::Not => (!w) as u64,
            UnaryOp::Neg => w.wrapping_neg() as u64,
            UnaryOp::ExtS8 => w as u8 as i8 as i32 as u32 as u64,
            UnaryOp::ExtS16 => w as u16 as i16 as i32 as u32 as u64,
            UnaryOp::Cntlz => w.leading_zeros() as u64,
            UnaryOp::Bswap16 => (w as u16).swap_bytes() as u64,
            UnaryOp::Bswap32 => w.swap_bytes() as u64,
            UnaryOp::Bswap64 => v.swap_bytes(),
        }
    }

    /// Byte swap matching an access width, if any.
    pub fn bswap_for(size: AccessSize) -> Option<Self> {
        match size {
            AccessSize::U8 => None,
            AccessSize::U16 => Some(UnaryOp::Bswap16),
            AccessSize::U32 => Some(UnaryOp::Bswap32),
            AccessSize::U64 => Some(UnaryOp::Bswap64),
        }
    }

    fn name(self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
            UnaryOp::Neg => "neg",
            UnaryOp::ExtS8 => "exts8",
            UnaryOp::ExtS16 => "exts16",
            UnaryOp::Cntlz => "cntlz",
            UnaryOp::Bswap16 => "bswap16",
            UnaryOp::Bswap32 => "bswap32",
            UnaryOp::Bswap64 => "bswap64",
        }
    }
}

/// Comparison conditions on 32-bit operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Cond {
    Eq = 0,
    Ne = 1,
    Lt = 2,
    Ge = 3,
    Gt = 4,
    Le = 5,
    Ltu = 6,
    Geu = 7,
    Gtu = 8,
    Leu = 9,
    /// `a & b == 0`
    TstZ = 10,
    /// `a & b != 0`
    TstNz = 11,
}

const CONDS: [Cond; 12] = [
    Cond::Eq,
    Cond::Ne,
    Cond::Lt,
    Cond::Ge,
    Cond::Gt,
    Cond::Le,
    Cond::Ltu,
    Cond::Geu,
    Cond::Gtu,
    Cond::Leu,
    Cond::TstZ,
    Cond::TstNz,
];

impl Cond {
    pub fn from_u8(n: u8) -> Option<Self> {
        CONDS.get(n as usize).copied()
    }

    /// Return the inverted condition.
    pub fn invert(self) -> Self {
        // Pairs differ in the low bit.
        CONDS[(self as usize) ^ 1]
    }

    pub fn eval(self, a: u32, b: u32) -> bool {
        match self {
            Cond::Eq => a == b,
            Cond::Ne => a != b,
            Cond::Lt => (a as i32) < (b as i32),
            Cond::Ge => (a as i32) >= (b as i32),
            Cond::Gt => (a as i32) > (b as i32),
            Cond::Le => (a as i32) <= (b as i32),
            Cond::Ltu => a < b,
            Cond::Geu => a >= b,
            Cond::Gtu => a > b,
            Cond::Leu => a <= b,
            Cond::TstZ => a & b == 0,
            Cond::TstNz => a & b != 0,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Cond::Eq => "eq",
            Cond::Ne => "ne",
            Cond::Lt => "lt",
            Cond::Ge => "ge",
            Cond::Gt => "gt",
            Cond::Le => "le",
            Cond::Ltu => "ltu",
            Cond::Geu => "geu",
            Cond::Gtu => "gtu",
            Cond::Leu => "leu",
            Cond::TstZ => "tstz",
            Cond::TstNz => "tstnz",
        }
    }
}

/// Float arithmetic, `dst = dst op src` on doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FAluOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
}

impl FAluOp {
    pub fn from_u8(n: u8) -> Option<Self> {
        [FAluOp::Add, FAluOp::Sub, FAluOp::Mul, FAluOp::Div]
            .get(n as usize)
            .copied()
    }

    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            FAluOp::Add => a + b,
            FAluOp::Sub => a - b,
            FAluOp::Mul => a * b,
            FAluOp::Div => a / b,
        }
    }

    fn name(self) -> &'static str {
        match self {
            FAluOp::Add => "fadd",
            FAluOp::Sub => "fsub",
            FAluOp::Mul => "fmul",
            FAluOp::Div => "fdiv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FUnaryOp {
    Neg = 0,
    Abs = 1,
    NAbs = 2,
    /// Round to single precision, keep double format.
    RoundSingle = 3,
}

impl FUnaryOp {
    pub fn from_u8(n: u8) -> Option<Self> {
        [
            FUnaryOp::Neg,
            FUnaryOp::Abs,
            FUnaryOp::NAbs,
            FUnaryOp::RoundSingle,
        ]
        .get(n as usize)
        .copied()
    }

    pub fn apply(self, bits: u64) -> u64 {
        const SIGN: u64 = 1 << 63;
        match self {
            FUnaryOp::Neg => bits ^ SIGN,
            FUnaryOp::Abs => bits & !SIGN,
            FUnaryOp::NAbs => bits | SIGN,
            FUnaryOp::RoundSingle => gekko_core::state::round_single(f64::from_bits(bits)).to_bits(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            FUnaryOp::Neg => "fneg",
            FUnaryOp::Abs => "fabs",
            FUnaryOp::NAbs => "fnabs",
            FUnaryOp::RoundSingle => "frsp",
        }
    }
}

/// Runtime helpers reachable through `CallHelper`. The result lands in R0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Helper {
    /// Drain the gather pipe. Returns 1 when an external interrupt can be
    /// taken afterwards.
    GatherPipeFlush = 0,
    /// Returns 1 when `pc` in guest state is a breakpoint address.
    CheckBreakpoint = 1,
}

impl Helper {
    pub fn from_u8(n: u8) -> Option<Self> {
        match n {
            0 => Some(Helper::GatherPipeFlush),
            1 => Some(Helper::CheckBreakpoint),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Helper::GatherPipeFlush => "gather_pipe_flush",
            Helper::CheckBreakpoint => "check_breakpoint",
        }
    }
}

/// Why generated code returned to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExitCode {
    /// Continue at guest `pc`.
    Dispatch = 0,
    /// Downcount ran out; run timed events.
    Timing = 1,
    /// A guest exception is pending.
    Exception = 2,
    /// Stopped at a breakpoint.
    Breakpoint = 3,
}

impl ExitCode {
    pub fn from_u8(n: u8) -> Option<Self> {
        match n {
            0 => Some(ExitCode::Dispatch),
            1 => Some(ExitCode::Timing),
            2 => Some(ExitCode::Exception),
            3 => Some(ExitCode::Breakpoint),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ExitCode::Dispatch => "dispatch",
            ExitCode::Timing => "timing",
            ExitCode::Exception => "exception",
            ExitCode::Breakpoint => "breakpoint",
        }
    }
}

/// One decoded host instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostOp {
    Nop,
    Trap,
    Mov { dst: Reg, src: Reg },
    MovImm { dst: Reg, imm: u32 },
    LdState { dst: Reg, slot: StateSlot },
    StState { src: Reg, slot: StateSlot },
    StStateImm { slot: StateSlot, imm: u32 },
    Alu { op: AluOp, dst: Reg, src: Reg },
    AluImm { op: AluOp, dst: Reg, imm: u32 },
    Unary { op: UnaryOp, dst: Reg },
    SetCond { cond: Cond, dst: Reg, a: Reg, b: Reg },
    SetCondImm { cond: Cond, dst: Reg, a: Reg, imm: u32 },
    /// CR field value (LT/GT/EQ plus XER[SO]) of comparing `a` with `b`.
    CmpCr { unsigned: bool, dst: Reg, a: Reg, b: Reg },
    CmpCrImm { unsigned: bool, dst: Reg, a: Reg, imm: u32 },
    Jmp { target: u32 },
    JccImm { cond: Cond, a: Reg, imm: u32, target: u32 },
    Jcc { cond: Cond, a: Reg, b: Reg, target: u32 },
    /// Unguarded access to the fastmem view. Raw host byte order.
    LoadFast { size: AccessSize, dst: Reg, addr: Reg, disp: i32 },
    StoreFast { size: AccessSize, src: Reg, addr: Reg, disp: i32 },
    /// Checked access. Numeric values; a fault sets DSI and loads zero.
    LoadSlow { size: AccessSize, dst: Reg, addr: Reg, disp: i32 },
    StoreSlow { size: AccessSize, src: Reg, addr: Reg, disp: i32 },
    GatherPipeWrite { size: AccessSize, src: Reg },
    CallInterp { word: u32 },
    CallHelper { helper: Helper },
    Ret { code: ExitCode },
    /// Bits 0..16 select integer registers, 16..32 float registers.
    Push { mask: u32 },
    Pop { mask: u32 },
    FLdState { dst: FReg, slot: StateSlot },
    FStState { src: FReg, slot: StateSlot },
    FMov { dst: FReg, src: FReg },
    FAlu { op: FAluOp, dst: FReg, src: FReg },
    FUnary { op: FUnaryOp, dst: FReg },
    /// Move bits from an integer register; `single` widens a float32.
    FFromInt { single: bool, dst: FReg, src: Reg },
    /// Move bits to an integer register; `single` narrows to float32.
    FToInt { single: bool, dst: Reg, src: FReg },
}

/// Malformed host code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown host opcode {opcode:#04x} at {offset:#x}")]
    UnknownOpcode { offset: usize, opcode: u8 },
    #[error("bad operand in host instruction at {offset:#x}")]
    BadOperand { offset: usize },
    #[error("truncated host instruction at {offset:#x}")]
    Truncated { offset: usize },
}

impl HostOp {
    /// Encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            HostOp::Nop | HostOp::Trap => 1,
            HostOp::CallHelper { .. } | HostOp::Ret { .. } => 2,
            HostOp::Mov { .. }
            | HostOp::Unary { .. }
            | HostOp::GatherPipeWrite { .. }
            | HostOp::FMov { .. }
            | HostOp::FUnary { .. } => 3,
            HostOp::LdState { .. }
            | HostOp::StState { .. }
            | HostOp::Alu { .. }
            | HostOp::FLdState { .. }
            | HostOp::FStState { .. }
            | HostOp::FAlu { .. }
            | HostOp::FFromInt { .. }
            | HostOp::FToInt { .. } => 4,
            HostOp::SetCond { .. }
            | HostOp::CmpCr { .. }
            | HostOp::Jmp { .. }
            | HostOp::CallInterp { .. }
            | HostOp::Push { .. }
            | HostOp::Pop { .. } => 5,
            HostOp::MovImm { .. } => 6,
            HostOp::StStateImm { .. } | HostOp::AluImm { .. } => 7,
            HostOp::SetCondImm { .. }
            | HostOp::CmpCrImm { .. }
            | HostOp::Jcc { .. }
            | HostOp::LoadFast { .. }
            | HostOp::StoreFast { .. }
            | HostOp::LoadSlow { .. }
            | HostOp::StoreSlow { .. } => 8,
            HostOp::JccImm { .. } => 11,
        }
    }

    /// Whether the executor clobbers the caller-saved registers.
    pub fn is_call(&self) -> bool {
        matches!(
            self,
            HostOp::LoadSlow { .. }
                | HostOp::StoreSlow { .. }
                | HostOp::GatherPipeWrite { .. }
                | HostOp::CallInterp { .. }
                | HostOp::CallHelper { .. }
        )
    }

    /// Append the encoding to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        fn mem(out: &mut Vec<u8>, opc: u8, size: AccessSize, r: Reg, addr: Reg, disp: i32) {
            out.extend_from_slice(&[opc, size as u8, r as u8, addr as u8]);
            out.extend_from_slice(&disp.to_le_bytes());
        }

        match *self {
            HostOp::Nop => out.push(OPC_NOP),
            HostOp::Trap => out.push(OPC_TRAP),
            HostOp::Mov { dst, src } => out.extend_from_slice(&[OPC_MOV_RR, dst as u8, src as u8]),
            HostOp::MovImm { dst, imm } => {
                out.extend_from_slice(&[OPC_MOV_RI, dst as u8]);
                out.extend_from_slice(&imm.to_le_bytes());
            }
            HostOp::LdState { dst, slot } => {
                out.extend_from_slice(&[OPC_LD_STATE, dst as u8]);
                out.extend_from_slice(&slot.encode().to_le_bytes());
            }
            HostOp::StState { src, slot } => {
                out.extend_from_slice(&[OPC_ST_STATE, src as u8]);
                out.extend_from_slice(&slot.encode().to_le_bytes());
            }
            HostOp::StStateImm { slot, imm } => {
                out.push(OPC_ST_STATE_IMM);
                out.extend_from_slice(&slot.encode().to_le_bytes());
                out.extend_from_slice(&imm.to_le_bytes());
            }
            HostOp::Alu { op, dst, src } => {
                out.extend_from_slice(&[OPC_ALU_RR, op as u8, dst as u8, src as u8])
            }
            HostOp::AluImm { op, dst, imm } => {
                out.extend_from_slice(&[OPC_ALU_RI, op as u8, dst as u8]);
                out.extend_from_slice(&imm.to_le_bytes());
            }
            HostOp::Unary { op, dst } => out.extend_from_slice(&[OPC_UNARY, op as u8, dst as u8]),
            HostOp::SetCond { cond, dst, a, b } => {
                out.extend_from_slice(&[OPC_SETCOND, cond as u8, dst as u8, a as u8, b as u8])
            }
            HostOp::SetCondImm { cond, dst, a, imm } => {
                out.extend_from_slice(&[OPC_SETCOND_IMM, cond as u8, dst as u8, a as u8]);
                out.extend_from_slice(&imm.to_le_bytes());
            }
            HostOp::CmpCr { unsigned, dst, a, b } => {
                out.extend_from_slice(&[OPC_CMP_CR, unsigned as u8, dst as u8, a as u8, b as u8])
            }
            HostOp::CmpCrImm { unsigned, dst, a, imm } => {
                out.extend_from_slice(&[OPC_CMP_CR_IMM, unsigned as u8, dst as u8, a as u8]);
                out.extend_from_slice(&imm.to_le_bytes());
            }
            HostOp::Jmp { target } => {
                out.push(OPC_JMP);
                out.extend_from_slice(&target.to_le_bytes());
            }
            HostOp::JccImm { cond, a, imm, target } => {
                out.extend_from_slice(&[OPC_JCC_RI, cond as u8, a as u8]);
                out.extend_from_slice(&imm.to_le_bytes());
                out.extend_from_slice(&target.to_le_bytes());
            }
            HostOp::Jcc { cond, a, b, target } => {
                out.extend_from_slice(&[OPC_JCC_RR, cond as u8, a as u8, b as u8]);
                out.extend_from_slice(&target.to_le_bytes());
            }
            HostOp::LoadFast { size, dst, addr, disp } => mem(out, OPC_LOAD_FAST, size, dst, addr, disp),
            HostOp::StoreFast { size, src, addr, disp } => mem(out, OPC_STORE_FAST, size, src, addr, disp),
            HostOp::LoadSlow { size, dst, addr, disp } => mem(out, OPC_LOAD_SLOW, size, dst, addr, disp),
            HostOp::StoreSlow { size, src, addr, disp } => mem(out, OPC_STORE_SLOW, size, src, addr, disp),
            HostOp::GatherPipeWrite { size, src } => {
                out.extend_from_slice(&[OPC_GATHER_PIPE_WRITE, size as u8, src as u8])
            }
            HostOp::CallInterp { word } => {
                out.push(OPC_CALL_INTERP);
                out.extend_from_slice(&word.to_le_bytes());
            }
            HostOp::CallHelper { helper } => out.extend_from_slice(&[OPC_CALL_HELPER, helper as u8]),
            HostOp::Ret { code } => out.extend_from_slice(&[OPC_RET, code as u8]),
            HostOp::Push { mask } => {
                out.push(OPC_PUSH);
                out.extend_from_slice(&mask.to_le_bytes());
            }
            HostOp::Pop { mask } => {
                out.push(OPC_POP);
                out.extend_from_slice(&mask.to_le_bytes());
            }
            HostOp::FLdState { dst, slot } => {
                out.extend_from_slice(&[OPC_FLD_STATE, dst as u8]);
                out.extend_from_slice(&slot.encode().to_le_bytes());
            }
            HostOp::FStState { src, slot } => {
                out.extend_from_slice(&[OPC_FST_STATE, src as u8]);
                out.extend_from_slice(&slot.encode().to_le_bytes());
            }
            HostOp::FMov { dst, src } => out.extend_from_slice(&[OPC_FMOV_RR, dst as u8, src as u8]),
            HostOp::FAlu { op, dst, src } => {
                out.extend_from_slice(&[OPC_FALU, op as u8, dst as u8, src as u8])
            }
            HostOp::FUnary { op, dst } => out.extend_from_slice(&[OPC_FUNARY, op as u8, dst as u8]),
            HostOp::FFromInt { single, dst, src } => {
                out.extend_from_slice(&[OPC_FFROM_INT, single as u8, dst as u8, src as u8])
            }
            HostOp::FToInt { single, dst, src } => {
                out.extend_from_slice(&[OPC_FTO_INT, single as u8, dst as u8, src as u8])
            }
        }
    }

    /// Decode the instruction at the start of `code`. `offset` is only
    /// used for error reporting.
    pub fn decode(code: &[u8], offset: usize) -> Result<HostOp, DecodeError> {
        let opcode = *code.first().ok_or(DecodeError::Truncated { offset })?;
        let mut r = Reader { code, pos: 1, offset };

        let op = match opcode {
            OPC_NOP => HostOp::Nop,
            OPC_TRAP => HostOp::Trap,
            OPC_MOV_RR => HostOp::Mov { dst: r.reg()?, src: r.reg()? },
            OPC_MOV_RI => HostOp::MovImm { dst: r.reg()?, imm: r.u32()? },
            OPC_LD_STATE => HostOp::LdState { dst: r.reg()?, slot: r.slot()? },
            OPC_ST_STATE => HostOp::StState { src: r.reg()?, slot: r.slot()? },
            OPC_ST_STATE_IMM => HostOp::StStateImm { slot: r.slot()?, imm: r.u32()? },
            OPC_ALU_RR => HostOp::Alu {
                op: r.sub(AluOp::from_u8)?,
                dst: r.reg()?,
                src: r.reg()?,
            },
            OPC_ALU_RI => HostOp::AluImm {
                op: r.sub(AluOp::from_u8)?,
                dst: r.reg()?,
                imm: r.u32()?,
            },
            OPC_UNARY => HostOp::Unary { op: r.sub(UnaryOp::from_u8)?, dst: r.reg()? },
            OPC_SETCOND => HostOp::SetCond {
                cond: r.sub(Cond::from_u8)?,
                dst: r.reg()?,
                a: r.reg()?,
                b: r.reg()?,
            },
            OPC_SETCOND_IMM => HostOp::SetCondImm {
                cond: r.sub(Cond::from_u8)?,
                dst: r.reg()?,
                a: r.reg()?,
                imm: r.u32()?,
            },
            OPC_CMP_CR => HostOp::CmpCr {
                unsigned: r.flag()?,
                dst: r.reg()?,
                a: r.reg()?,
                b: r.reg()?,
            },
            OPC_CMP_CR_IMM => HostOp::CmpCrImm {
                unsigned: r.flag()?,
                dst: r.reg()?,
                a: r.reg()?,
                imm: r.u32()?,
            },
            OPC_JMP => HostOp::Jmp { target: r.u32()? },
            OPC_JCC_RI => HostOp::JccImm {
                cond: r.sub(Cond::from_u8)?,
                a: r.reg()?,
                imm: r.u32()?,
                target: r.u32()?,
            },
            OPC_JCC_RR => HostOp::Jcc {
                cond: r.sub(Cond::from_u8)?,
                a: r.reg()?,
                b: r.reg()?,
                target: r.u32()?,
            },
            OPC_LOAD_FAST => HostOp::LoadFast {
                size: r.size()?,
                dst: r.reg()?,
                addr: r.reg()?,
                disp: r.u32()? as i32,
            },
            OPC_STORE_FAST => HostOp::StoreFast {
                size: r.size()?,
                src: r.reg()?,
                addr: r.reg()?,
                disp: r.u32()? as i32,
            },
            OPC_LOAD_SLOW => HostOp::LoadSlow {
                size: r.size()?,
                dst: r.reg()?,
                addr: r.reg()?,
                disp: r.u32()? as i32,
            },
            OPC_STORE_SLOW => HostOp::StoreSlow {
                size: r.size()?,
                src: r.reg()?,
                addr: r.reg()?,
                disp: r.u32()? as i32,
            },
            OPC_GATHER_PIPE_WRITE => HostOp::GatherPipeWrite { size: r.size()?, src: r.reg()? },
            OPC_CALL_INTERP => HostOp::CallInterp { word: r.u32()? },
            OPC_CALL_HELPER => HostOp::CallHelper { helper: r.sub(Helper::from_u8)? },
            OPC_RET => HostOp::Ret { code: r.sub(ExitCode::from_u8)? },
            OPC_PUSH => HostOp::Push { mask: r.u32()? },
            OPC_POP => HostOp::Pop { mask: r.u32()? },
            OPC_FLD_STATE => HostOp::FLdState { dst: r.freg()?, slot: r.slot()? },
            OPC_FST_STATE => HostOp::FStState { src: r.freg()?, slot: r.slot()? },
            OPC_FMOV_RR => HostOp::FMov { dst: r.freg()?, src: r.freg()? },
            OPC_FALU => HostOp::FAlu {
                op: r.sub(FAluOp::from_u8)?,
                dst: r.freg()?,
                src: r.freg()?,
            },
            OPC_FUNARY => HostOp::FUnary { op: r.sub(FUnaryOp::from_u8)?, dst: r.freg()? },
            OPC_FFROM_INT => HostOp::FFromInt {
                single: r.flag()?,
                dst: r.freg()?,
                src: r.reg()?,
            },
            OPC_FTO_INT => HostOp::FToInt {
                single: r.flag()?,
                dst: r.reg()?,
                src: r.freg()?,
            },
            _ => return Err(DecodeError::UnknownOpcode { offset, opcode }),
        };
        Ok(op)
    }
}

struct Reader<'a> {
    code: &'a [u8],
    pos: usize,
    offset: usize,
}

impl Reader<'_> {
    fn u8(&mut self) -> Result<u8, DecodeError> {
        let b = *self
            .code
            .get(self.pos)
            .ok_or(DecodeError::Truncated { offset: self.offset })?;
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes([self.u8()?, self.u8()?]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes([self.u8()?, self.u8()?, self.u8()?, self.u8()?]))
    }

    fn sub<T>(&mut self, f: fn(u8) -> Option<T>) -> Result<T, DecodeError> {
        let b = self.u8()?;
        f(b).ok_or(DecodeError::BadOperand { offset: self.offset })
    }

    fn reg(&mut self) -> Result<Reg, DecodeError> {
        self.sub(Reg::from_u8)
    }

    fn freg(&mut self) -> Result<FReg, DecodeError> {
        self.sub(FReg::from_u8)
    }

    fn flag(&mut self) -> Result<bool, DecodeError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::BadOperand { offset: self.offset }),
        }
    }

    fn size(&mut self) -> Result<AccessSize, DecodeError> {
        self.sub(AccessSize::from_bytes)
    }

    fn slot(&mut self) -> Result<StateSlot, DecodeError> {
        let raw = self.u16()?;
        StateSlot::decode(raw).ok_or(DecodeError::BadOperand { offset: self.offset })
    }
}

/// Decode every instruction in `code`, which starts at buffer offset `base`.
pub fn decode_all(code: &[u8], base: usize) -> Result<Vec<(usize, HostOp)>, DecodeError> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < code.len() {
        let op = HostOp::decode(&code[pos..], base + pos)?;
        out.push((base + pos, op));
        pos += op.encoded_len();
    }
    Ok(out)
}

fn width(size: AccessSize) -> &'static str {
    match size {
        AccessSize::U8 => "b",
        AccessSize::U16 => "h",
        AccessSize::U32 => "w",
        AccessSize::U64 => "d",
    }
}

struct Mask(u32);

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        let mut first = true;
        for bit in 0..32 {
            if self.0 & (1 << bit) == 0 {
                continue;
            }
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            if bit < 16 {
                write!(f, "r{bit}")?;
            } else {
                write!(f, "f{}", bit - 16)?;
            }
        }
        f.write_str("}")
    }
}

impl fmt::Display for HostOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = |reg: Reg| reg as u8;
        let fr = |reg: FReg| reg as u8;
        match *self {
            HostOp::Nop => f.write_str("nop"),
            HostOp::Trap => f.write_str("trap"),
            HostOp::Mov { dst, src } => write!(f, "mov r{}, r{}", r(dst), r(src)),
            HostOp::MovImm { dst, imm } => write!(f, "movi r{}, {imm:#x}", r(dst)),
            HostOp::LdState { dst, slot } => write!(f, "ldst r{}, [{slot}]", r(dst)),
            HostOp::StState { src, slot } => write!(f, "stst r{}, [{slot}]", r(src)),
            HostOp::StStateImm { slot, imm } => write!(f, "ststi [{slot}], {imm:#x}"),
            HostOp::Alu { op, dst, src } => write!(f, "{} r{}, r{}", op.name(), r(dst), r(src)),
            HostOp::AluImm { op, dst, imm } => write!(f, "{}i r{}, {imm:#x}", op.name(), r(dst)),
            HostOp::Unary { op, dst } => write!(f, "{} r{}", op.name(), r(dst)),
            HostOp::SetCond { cond, dst, a, b } => {
                write!(f, "set{} r{}, r{}, r{}", cond.name(), r(dst), r(a), r(b))
            }
            HostOp::SetCondImm { cond, dst, a, imm } => {
                write!(f, "set{}i r{}, r{}, {imm:#x}", cond.name(), r(dst), r(a))
            }
            HostOp::CmpCr { unsigned, dst, a, b } => {
                let u = if unsigned { "u" } else { "" };
                write!(f, "cmpcr{u} r{}, r{}, r{}", r(dst), r(a), r(b))
            }
            HostOp::CmpCrImm { unsigned, dst, a, imm } => {
                let u = if unsigned { "u" } else { "" };
                write!(f, "cmpcr{u}i r{}, r{}, {imm:#x}", r(dst), r(a))
            }
            HostOp::Jmp { target } => write!(f, "jmp {target:#x}"),
            HostOp::JccImm { cond, a, imm, target } => {
                write!(f, "j{}i r{}, {imm:#x}, {target:#x}", cond.name(), r(a))
            }
            HostOp::Jcc { cond, a, b, target } => {
                write!(f, "j{} r{}, r{}, {target:#x}", cond.name(), r(a), r(b))
            }
            HostOp::LoadFast { size, dst, addr, disp } => {
                write!(f, "ldfast.{} r{}, [r{}{disp:+}]", width(size), r(dst), r(addr))
            }
            HostOp::StoreFast { size, src, addr, disp } => {
                write!(f, "stfast.{} r{}, [r{}{disp:+}]", width(size), r(src), r(addr))
            }
            HostOp::LoadSlow { size, dst, addr, disp } => {
                write!(f, "ldslow.{} r{}, [r{}{disp:+}]", width(size), r(dst), r(addr))
            }
            HostOp::StoreSlow { size, src, addr, disp } => {
                write!(f, "stslow.{} r{}, [r{}{disp:+}]", width(size), r(src), r(addr))
            }
            HostOp::GatherPipeWrite { size, src } => {
                write!(f, "gpwrite.{} r{}", width(size), r(src))
            }
            HostOp::CallInterp { word } => write!(f, "callinterp {word:#010x}"),
            HostOp::CallHelper { helper } => write!(f, "callhelper {}", helper.name()),
            HostOp::Ret { code } => write!(f, "ret {}", code.name()),
            HostOp::Push { mask } => write!(f, "push {}", Mask(mask)),
            HostOp::Pop { mask } => write!(f, "pop {}", Mask(mask)),
            HostOp::FLdState { dst, slot } => write!(f, "fldst f{}, [{slot}]", fr(dst)),
            HostOp::FStState { src, slot } => write!(f, "fstst f{}, [{slot}]", fr(src)),
            HostOp::FMov { dst, src } => write!(f, "fmov f{}, f{}", fr(dst), fr(src)),
            HostOp::FAlu { op, dst, src } => write!(f, "{} f{}, f{}", op.name(), fr(dst), fr(src)),
            HostOp::FUnary { op, dst } => write!(f, "{} f{}", op.name(), fr(dst)),
            HostOp::FFromInt { single, dst, src } => {
                let s = if single { "s" } else { "" };
                write!(f, "fmovfi{s} f{}, r{}", fr(dst), r(src))
            }
            HostOp::FToInt { single, dst, src } => {
                let s = if single { "s" } else { "" };
                write!(f, "fmovif{s} r{}, f{}", r(dst), fr(src))
            }
        }
    }
}
