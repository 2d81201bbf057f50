//! Emulated Gekko CPU state.
//!
//! `PpcState` is the single source of truth for guest registers. Generated
//! code reaches it through [`StateSlot`] ids; the interpreter and the
//! exception machinery access the fields directly.

use std::fmt;

/// Pending-exception bits in [`PpcState::exceptions`].
pub mod exception {
    pub const DECREMENTER: u32 = 0x0000_0001;
    pub const SYSCALL: u32 = 0x0000_0002;
    pub const EXTERNAL_INT: u32 = 0x0000_0004;
    pub const DSI: u32 = 0x0000_0008;
    pub const ISI: u32 = 0x0000_0010;
    pub const ALIGNMENT: u32 = 0x0000_0020;
    pub const FPU_UNAVAILABLE: u32 = 0x0000_0040;
    pub const PROGRAM: u32 = 0x0000_0080;

    /// Raised by the instruction itself; delivered before the next one.
    pub const SYNC_MASK: u32 = SYSCALL | DSI | ISI | ALIGNMENT | FPU_UNAVAILABLE | PROGRAM;
}

/// SRR1 bits naming the cause of a program exception.
pub mod program {
    pub const FLOATING_POINT: u32 = 1 << 20;
    pub const ILLEGAL: u32 = 1 << 19;
    pub const PRIVILEGED: u32 = 1 << 18;
    pub const TRAP: u32 = 1 << 17;
}

/// MSR bits.
pub mod msr {
    pub const EE: u32 = 1 << 15;
    pub const PR: u32 = 1 << 14;
    pub const FP: u32 = 1 << 13;
    pub const ME: u32 = 1 << 12;
    pub const IR: u32 = 1 << 5;
    pub const DR: u32 = 1 << 4;
    pub const RI: u32 = 1 << 1;

    /// Bits cleared when an exception is taken.
    pub const EXCEPTION_CLEAR: u32 = 0x0004_EF36;
    /// Bits of MSR copied into SRR1.
    pub const SRR1_MASK: u32 = 0x87C0_FFFF;
}

/// Special purpose register numbers.
pub mod spr {
    pub const XER: usize = 1;
    pub const LR: usize = 8;
    pub const CTR: usize = 9;
    pub const DSISR: usize = 18;
    pub const DAR: usize = 19;
    pub const DEC: usize = 22;
    pub const SDR1: usize = 25;
    pub const SRR0: usize = 26;
    pub const SRR1: usize = 27;
    pub const TL: usize = 268;
    pub const TU: usize = 269;
    pub const SPRG0: usize = 272;
    pub const SPRG1: usize = 273;
    pub const SPRG2: usize = 274;
    pub const SPRG3: usize = 275;
    pub const EAR: usize = 282;
    pub const TL_W: usize = 284;
    pub const TU_W: usize = 285;
    pub const PVR: usize = 287;
    pub const GQR0: usize = 912;
    pub const HID2: usize = 920;
    pub const WPAR: usize = 921;
    pub const DMAU: usize = 922;
    pub const DMAL: usize = 923;
    pub const HID0: usize = 1008;
    pub const HID1: usize = 1009;
    pub const IABR: usize = 1010;
    pub const DABR: usize = 1013;
    pub const L2CR: usize = 1017;

    pub const COUNT: usize = 1024;
}

/// CR field bits, most significant first.
pub mod cr {
    pub const LT: u8 = 8;
    pub const GT: u8 = 4;
    pub const EQ: u8 = 2;
    pub const SO: u8 = 1;
}

/// Exception vector offsets.
pub mod vector {
    pub const DSI: u32 = 0x300;
    pub const ISI: u32 = 0x400;
    pub const EXTERNAL_INT: u32 = 0x500;
    pub const ALIGNMENT: u32 = 0x600;
    pub const PROGRAM: u32 = 0x700;
    pub const FPU_UNAVAILABLE: u32 = 0x800;
    pub const DECREMENTER: u32 = 0x900;
    pub const SYSCALL: u32 = 0xC00;
}

/// Gekko processor version.
pub const GEKKO_PVR: u32 = 0x0008_3214;

/// One floating point register: two doubles stored as raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PairedSingle {
    pub ps0: u64,
    pub ps1: u64,
}

impl PairedSingle {
    #[inline]
    pub fn ps0_f64(self) -> f64 {
        f64::from_bits(self.ps0)
    }

    #[inline]
    pub fn ps1_f64(self) -> f64 {
        f64::from_bits(self.ps1)
    }
}

pub struct PpcState {
    pub gpr: [u32; 32],
    pub ps: [PairedSingle; 32],
    pub pc: u32,
    pub npc: u32,
    pub msr: u32,
    /// Eight 4-bit CR fields, `cr[0]` is CR0.
    pub cr: [u8; 8],
    pub xer_ca: u8,
    /// Bit 1 is SO, bit 0 is OV.
    pub xer_so_ov: u8,
    /// Byte count of the string instructions (XER[25:31]).
    pub xer_stringctrl: u16,
    pub fpscr: u32,
    pub sr: [u32; 16],
    pub spr: Box<[u32; spr::COUNT]>,
    pub exceptions: u32,
    /// [`program`] cause copied into SRR1 when PROGRAM is taken.
    pub program_cause: u32,
    pub downcount: i32,
    pub reserve: bool,
    pub reserve_address: u32,
    /// Set by `icbi`; the dispatcher clears the block cache between blocks.
    pub invalidate_icache: bool,
}

impl PpcState {
    pub fn new() -> Self {
        let mut spr = Box::new([0u32; spr::COUNT]);
        spr[spr::PVR] = GEKKO_PVR;
        Self {
            gpr: [0; 32],
            ps: [PairedSingle::default(); 32],
            pc: 0,
            npc: 0,
            msr: 0,
            cr: [0; 8],
            xer_ca: 0,
            xer_so_ov: 0,
            xer_stringctrl: 0,
            fpscr: 0,
            sr: [0; 16],
            spr,
            exceptions: 0,
            program_cause: 0,
            downcount: 0,
            reserve: false,
            reserve_address: 0,
            invalidate_icache: false,
        }
    }

    // -- SPR shorthands ------------------------------------

    #[inline]
    pub fn lr(&self) -> u32 {
        self.spr[spr::LR]
    }

    #[inline]
    pub fn set_lr(&mut self, value: u32) {
        self.spr[spr::LR] = value;
    }

    #[inline]
    pub fn ctr(&self) -> u32 {
        self.spr[spr::CTR]
    }

    #[inline]
    pub fn set_ctr(&mut self, value: u32) {
        self.spr[spr::CTR] = value;
    }

    pub fn xer(&self) -> u32 {
        ((self.xer_so_ov as u32 & 3) << 30)
            | ((self.xer_ca as u32 & 1) << 29)
            | (self.xer_stringctrl as u32 & 0x7F)
    }

    pub fn set_xer(&mut self, value: u32) {
        self.xer_so_ov = ((value >> 30) & 3) as u8;
        self.xer_ca = ((value >> 29) & 1) as u8;
        self.xer_stringctrl = (value & 0x7F) as u16;
    }

    #[inline]
    pub fn xer_so(&self) -> bool {
        self.xer_so_ov & 2 != 0
    }

    /// Set OV and, when overflowing, the sticky SO bit.
    pub fn set_xer_ov(&mut self, overflow: bool) {
        if overflow {
            self.xer_so_ov = 3;
        } else {
            self.xer_so_ov &= 2;
        }
    }

    // -- Condition register --------------------------------

    #[inline]
    pub fn cr_field(&self, n: usize) -> u8 {
        self.cr[n]
    }

    #[inline]
    pub fn set_cr_field(&mut self, n: usize, value: u8) {
        self.cr[n] = value & 0xF;
    }

    /// CR bit `bi` in IBM numbering (bit 0 is CR0[LT]).
    #[inline]
    pub fn cr_bit(&self, bi: u32) -> bool {
        (self.cr[(bi >> 2) as usize] >> (3 - (bi & 3))) & 1 != 0
    }

    pub fn set_cr_bit(&mut self, bi: u32, value: bool) {
        let field = (bi >> 2) as usize;
        let mask = 1u8 << (3 - (bi & 3));
        if value {
            self.cr[field] |= mask;
        } else {
            self.cr[field] &= !mask;
        }
    }

    pub fn cr(&self) -> u32 {
        self.cr
            .iter()
            .fold(0u32, |acc, &field| (acc << 4) | (field as u32 & 0xF))
    }

    pub fn set_cr(&mut self, value: u32) {
        for (i, field) in self.cr.iter_mut().enumerate() {
            *field = ((value >> (28 - 4 * i)) & 0xF) as u8;
        }
    }

    /// CR field value of a signed comparison result, including SO.
    pub fn compare_signed(&self, a: i32, b: i32) -> u8 {
        let ord = if a < b {
            cr::LT
        } else if a > b {
            cr::GT
        } else {
            cr::EQ
        };
        ord | self.xer_so() as u8
    }

    pub fn compare_unsigned(&self, a: u32, b: u32) -> u8 {
        let ord = if a < b {
            cr::LT
        } else if a > b {
            cr::GT
        } else {
            cr::EQ
        };
        ord | self.xer_so() as u8
    }

    /// Record-form update of CR0 from a result.
    pub fn update_cr0(&mut self, result: u32) {
        self.cr[0] = self.compare_signed(result as i32, 0);
    }

    // -- Floating point ------------------------------------

    #[inline]
    pub fn ps0_f64(&self, n: usize) -> f64 {
        self.ps[n].ps0_f64()
    }

    #[inline]
    pub fn set_ps0_f64(&mut self, n: usize, value: f64) {
        self.ps[n].ps0 = value.to_bits();
    }

    #[inline]
    pub fn set_both_f64(&mut self, n: usize, value: f64) {
        let bits = value.to_bits();
        self.ps[n] = PairedSingle { ps0: bits, ps1: bits };
    }

    // -- Exceptions ----------------------------------------

    /// Record a data storage fault at `address`.
    pub fn raise_dsi(&mut self, address: u32, is_store: bool) {
        self.exceptions |= exception::DSI;
        self.spr[spr::DAR] = address;
        self.spr[spr::DSISR] = 0x4000_0000 | if is_store { 0x0200_0000 } else { 0 };
    }

    pub fn raise_program(&mut self, cause: u32) {
        self.exceptions |= exception::PROGRAM;
        self.program_cause = cause;
    }

    #[inline]
    pub fn has_sync_exception(&self) -> bool {
        self.exceptions & exception::SYNC_MASK != 0
    }

    /// Deliver the highest-priority pending exception, if any can be taken.
    ///
    /// Synchronous exceptions are always taken. External interrupts and
    /// the decrementer require MSR[EE]. Returns the vector taken.
    pub fn check_exceptions(&mut self) -> Option<u32> {
        use exception as e;
        let pending = self.exceptions;

        // (bit, vector, srr0 = npc)
        const ORDER: [(u32, u32, bool); 6] = [
            (e::ISI, vector::ISI, false),
            (e::PROGRAM, vector::PROGRAM, false),
            (e::SYSCALL, vector::SYSCALL, true),
            (e::FPU_UNAVAILABLE, vector::FPU_UNAVAILABLE, false),
            (e::DSI, vector::DSI, false),
            (e::ALIGNMENT, vector::ALIGNMENT, false),
        ];
        for (bit, vec, after) in ORDER {
            if pending & bit != 0 {
                let srr0 = if after { self.npc } else { self.pc };
                self.take_exception(bit, vec, srr0);
                return Some(vec);
            }
        }

        if self.msr & msr::EE != 0 {
            if pending & e::EXTERNAL_INT != 0 {
                self.take_exception(e::EXTERNAL_INT, vector::EXTERNAL_INT, self.npc);
                return Some(vector::EXTERNAL_INT);
            }
            if pending & e::DECREMENTER != 0 {
                self.take_exception(e::DECREMENTER, vector::DECREMENTER, self.npc);
                return Some(vector::DECREMENTER);
            }
        }
        None
    }

    fn take_exception(&mut self, bit: u32, vec: u32, srr0: u32) {
        self.spr[spr::SRR0] = srr0;
        self.spr[spr::SRR1] = self.msr & msr::SRR1_MASK;
        if bit == exception::PROGRAM {
            self.spr[spr::SRR1] |= std::mem::take(&mut self.program_cause);
        }
        self.msr &= !msr::EXCEPTION_CLEAR;
        self.pc = vec;
        self.npc = vec;
        self.exceptions &= !bit;
        tracing::trace!(vector = vec, srr0, "exception taken");
    }

    // -- Slot access ---------------------------------------

    /// Read a slot as generated code sees it: zero-extended to 64 bits.
    pub fn read_slot(&self, slot: StateSlot) -> u64 {
        match slot {
            StateSlot::Gpr(n) => self.gpr[n as usize] as u64,
            StateSlot::Ps0(n) => self.ps[n as usize].ps0,
            StateSlot::Ps1(n) => self.ps[n as usize].ps1,
            StateSlot::Cr(n) => self.cr[n as usize] as u64,
            StateSlot::Pc => self.pc as u64,
            StateSlot::Npc => self.npc as u64,
            StateSlot::Msr => self.msr as u64,
            StateSlot::XerCa => self.xer_ca as u64,
            StateSlot::XerSoOv => self.xer_so_ov as u64,
            StateSlot::Fpscr => self.fpscr as u64,
            StateSlot::Exceptions => self.exceptions as u64,
            StateSlot::Downcount => self.downcount as u32 as u64,
            StateSlot::Spr(n) => self.spr[n as usize] as u64,
        }
    }

    pub fn write_slot(&mut self, slot: StateSlot, value: u64) {
        match slot {
            StateSlot::Gpr(n) => self.gpr[n as usize] = value as u32,
            StateSlot::Ps0(n) => self.ps[n as usize].ps0 = value,
            StateSlot::Ps1(n) => self.ps[n as usize].ps1 = value,
            StateSlot::Cr(n) => self.cr[n as usize] = (value & 0xF) as u8,
            StateSlot::Pc => self.pc = value as u32,
            StateSlot::Npc => self.npc = value as u32,
            StateSlot::Msr => self.msr = value as u32,
            StateSlot::XerCa => self.xer_ca = (value & 1) as u8,
            StateSlot::XerSoOv => self.xer_so_ov = (value & 3) as u8,
            StateSlot::Fpscr => self.fpscr = value as u32,
            StateSlot::Exceptions => self.exceptions = value as u32,
            StateSlot::Downcount => self.downcount = value as u32 as i32,
            StateSlot::Spr(n) => self.spr[n as usize] = value as u32,
        }
    }
}

impl Default for PpcState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PpcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PpcState")
            .field("pc", &format_args!("{:#010x}", self.pc))
            .field("npc", &format_args!("{:#010x}", self.npc))
            .field("msr", &format_args!("{:#010x}", self.msr))
            .field("gpr", &self.gpr)
            .field("cr", &format_args!("{:#010x}", self.cr()))
            .field("xer", &format_args!("{:#010x}", self.xer()))
            .field("lr", &format_args!("{:#010x}", self.lr()))
            .field("ctr", &format_args!("{:#010x}", self.ctr()))
            .field("exceptions", &format_args!("{:#x}", self.exceptions))
            .field("downcount", &self.downcount)
            .finish()
    }
}

/// A location in [`PpcState`] addressable from generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateSlot {
    Gpr(u8),
    Ps0(u8),
    Ps1(u8),
    Cr(u8),
    Pc,
    Npc,
    Msr,
    XerCa,
    XerSoOv,
    Fpscr,
    Exceptions,
    Downcount,
    Spr(u16),
}

const SLOT_PS0: u16 = 32;
const SLOT_PS1: u16 = 64;
const SLOT_CR: u16 = 96;
const SLOT_PC: u16 = 104;
const SLOT_SPR: u16 = 0x400;

impl StateSlot {
    pub const fn encode(self) -> u16 {
        match self {
            StateSlot::Gpr(n) => n as u16,
            StateSlot::Ps0(n) => SLOT_PS0 + n as u16,
            StateSlot::Ps1(n) => SLOT_PS1 + n as u16,
            StateSlot::Cr(n) => SLOT_CR + n as u16,
            StateSlot::Pc => SLOT_PC,
            StateSlot::Npc => SLOT_PC + 1,
            StateSlot::Msr => SLOT_PC + 2,
            StateSlot::XerCa => SLOT_PC + 3,
            StateSlot::XerSoOv => SLOT_PC + 4,
            StateSlot::Fpscr => SLOT_PC + 5,
            StateSlot::Exceptions => SLOT_PC + 6,
            StateSlot::Downcount => SLOT_PC + 7,
            StateSlot::Spr(n) => SLOT_SPR + n,
        }
    }

    pub const fn decode(raw: u16) -> Option<Self> {
        Some(match raw {
            0..=31 => StateSlot::Gpr(raw as u8),
            32..=63 => StateSlot::Ps0((raw - SLOT_PS0) as u8),
            64..=95 => StateSlot::Ps1((raw - SLOT_PS1) as u8),
            96..=103 => StateSlot::Cr((raw - SLOT_CR) as u8),
            104 => StateSlot::Pc,
            105 => StateSlot::Npc,
            106 => StateSlot::Msr,
            107 => StateSlot::XerCa,
            108 => StateSlot::XerSoOv,
            109 => StateSlot::Fpscr,
            110 => StateSlot::Exceptions,
            111 => StateSlot::Downcount,
            0x400..=0x7FF => StateSlot::Spr(raw - SLOT_SPR),
            _ => return None,
        })
    }
}

impl fmt::Display for StateSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateSlot::Gpr(n) => write!(f, "r{n}"),
            StateSlot::Ps0(n) => write!(f, "f{n}.ps0"),
            StateSlot::Ps1(n) => write!(f, "f{n}.ps1"),
            StateSlot::Cr(n) => write!(f, "cr{n}"),
            StateSlot::Pc => f.write_str("pc"),
            StateSlot::Npc => f.write_str("npc"),
            StateSlot::Msr => f.write_str("msr"),
            StateSlot::XerCa => f.write_str("xer.ca"),
            StateSlot::XerSoOv => f.write_str("xer.so_ov"),
            StateSlot::Fpscr => f.write_str("fpscr"),
            StateSlot::Exceptions => f.write_str("exceptions"),
            StateSlot::Downcount => f.write_str("downcount"),
            StateSlot::Spr(n) => write!(f, "spr{n}"),
        }
    }
}

// ── Float helpers ───────────────────────────────────────

/// Round a double to single precision and widen it back.
#[inline]
pub fn round_single(value: f64) -> f64 {
    value as f32 as f64
}

/// Double bits to the single-precision memory format.
#[inline]
pub fn double_to_single_bits(bits: u64) -> u32 {
    (f64::from_bits(bits) as f32).to_bits()
}

/// Single-precision memory format to double bits.
#[inline]
pub fn single_to_double_bits(bits: u32) -> u64 {
    (f32::from_bits(bits) as f64).to_bits()
}
