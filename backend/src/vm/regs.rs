use gekko_core::RegSet;

/// Integer registers of the host register machine (64-bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Reg {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    R6 = 6,
    R7 = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

const ALL_REGS: [Reg; NUM_REGS] = [
    Reg::R0,
    Reg::R1,
    Reg::R2,
    Reg::R3,
    Reg::R4,
    Reg::R5,
    Reg::R6,
    Reg::R7,
    Reg::R8,
    Reg::R9,
    Reg::R10,
    Reg::R11,
    Reg::R12,
    Reg::R13,
    Reg::R14,
    Reg::R15,
];

impl Reg {
    #[inline]
    pub const fn from_u8(n: u8) -> Option<Reg> {
        if (n as usize) < NUM_REGS {
            Some(ALL_REGS[n as usize])
        } else {
            None
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Float registers, holding IEEE double bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum FReg {
    F0 = 0,
    F1 = 1,
    F2 = 2,
    F3 = 3,
    F4 = 4,
    F5 = 5,
    F6 = 6,
    F7 = 7,
    F8 = 8,
    F9 = 9,
    F10 = 10,
    F11 = 11,
    F12 = 12,
    F13 = 13,
    F14 = 14,
    F15 = 15,
}

const ALL_FREGS: [FReg; NUM_REGS] = [
    FReg::F0,
    FReg::F1,
    FReg::F2,
    FReg::F3,
    FReg::F4,
    FReg::F5,
    FReg::F6,
    FReg::F7,
    FReg::F8,
    FReg::F9,
    FReg::F10,
    FReg::F11,
    FReg::F12,
    FReg::F13,
    FReg::F14,
    FReg::F15,
];

impl FReg {
    #[inline]
    pub const fn from_u8(n: u8) -> Option<FReg> {
        if (n as usize) < NUM_REGS {
            Some(ALL_FREGS[n as usize])
        } else {
            None
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

pub const NUM_REGS: usize = 16;

/// Scratch for loaded values and byte-swapped store data.
pub const RSCRATCH: Reg = Reg::R0;
/// Scratch for effective addresses and computed exit targets.
pub const RSCRATCH2: Reg = Reg::R1;
/// Scratch for materialized store sources.
pub const RSCRATCH_EXTRA: Reg = Reg::R2;

pub const FSCRATCH: FReg = FReg::F0;
pub const FSCRATCH2: FReg = FReg::F1;

/// Clobbered by interpreter calls, helper calls and slow accesses.
pub const CALLER_SAVED: RegSet = RegSet::range(0, 3);
pub const CALLER_SAVED_F: RegSet = RegSet::range(0, 1);

/// Allocation order for guest integer registers.
pub const ALLOCATABLE_GPRS: &[Reg] = &[
    Reg::R4,
    Reg::R5,
    Reg::R6,
    Reg::R7,
    Reg::R8,
    Reg::R9,
    Reg::R10,
    Reg::R11,
    Reg::R12,
    Reg::R13,
    Reg::R14,
    Reg::R15,
];

/// Allocation order for guest float registers.
pub const ALLOCATABLE_FPRS: &[FReg] = &[
    FReg::F2,
    FReg::F3,
    FReg::F4,
    FReg::F5,
    FReg::F6,
    FReg::F7,
    FReg::F8,
    FReg::F9,
    FReg::F10,
    FReg::F11,
    FReg::F12,
    FReg::F13,
    FReg::F14,
    FReg::F15,
];

/// Value left in clobbered registers after a call.
pub const POISON: u64 = 0xDEAD_BEEF_DEAD_BEEF;
