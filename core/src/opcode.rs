//! Opcode descriptors and the Gekko template lists.
//!
//! Each template names an opcode slot, its category, baseline cycle cost
//! and side-effect flags. The table builder in [`crate::table`] expands the
//! templates into the two-level lookup structure.

use bitflags::bitflags;

bitflags! {
    /// Side-effect and register-usage flags of an opcode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpFlags: u64 {
        /// Ends the translation unit after this instruction.
        const END_BLOCK = 1 << 0;
        /// Reads rA.
        const IN_A = 1 << 1;
        /// Reads rA unless the field is zero (then the literal 0 is used).
        const IN_A0 = 1 << 2;
        const IN_B = 1 << 3;
        const IN_C = 1 << 4;
        /// Reads rS (same field as rD).
        const IN_S = 1 << 5;
        const OUT_A = 1 << 6;
        const OUT_D = 1 << 7;
        const SET_CR0 = 1 << 8;
        /// Writes the CR field named by crfD.
        const SET_CRN = 1 << 9;
        const READ_CRN = 1 << 10;
        /// Reads the CR bit named by BI.
        const READ_CR_BI = 1 << 11;
        const SET_ALL_CR = 1 << 12;
        const READ_ALL_CR = 1 << 13;
        const SET_CA = 1 << 14;
        const READ_CA = 1 << 15;
        /// Rc selects a CR0 update.
        const RC_BIT = 1 << 16;
        /// Rc selects a CR1 update.
        const RC_BIT_F = 1 << 17;
        /// Updates XER[OV/SO].
        const SET_OE = 1 << 18;
        const USE_FPU = 1 << 19;
        const LOADSTORE = 1 << 20;
        const IN_FLOAT_A = 1 << 21;
        const IN_FLOAT_B = 1 << 22;
        const IN_FLOAT_C = 1 << 23;
        const IN_FLOAT_S = 1 << 24;
        const IN_FLOAT_D = 1 << 25;
        const OUT_FLOAT_D = 1 << 26;
        const SET_FPRF = 1 << 27;
        const READ_FPRF = 1 << 28;
        const FLOAT_EXCEPTION = 1 << 29;
        const FLOAT_DIV = 1 << 30;
        const PROGRAM_EXCEPTION = 1 << 31;
        const CHECK_EXCEPTIONS = 1 << 32;
        const NO_REORDER = 1 << 33;
        /// Reads the time base.
        const TIMER = 1 << 34;
        /// Translated by a call into the single-instruction interpreter.
        /// Set by the table builder, never by a template.
        const INTERPRETED = 1 << 35;

        const IN_AB = Self::IN_A.bits() | Self::IN_B.bits();
        const IN_A0B = Self::IN_A0.bits() | Self::IN_B.bits();
        const IN_SB = Self::IN_S.bits() | Self::IN_B.bits();
        const IN_FLOAT_AB = Self::IN_FLOAT_A.bits() | Self::IN_FLOAT_B.bits();
        const IN_FLOAT_AC = Self::IN_FLOAT_A.bits() | Self::IN_FLOAT_C.bits();
        const IN_FLOAT_ABC =
            Self::IN_FLOAT_A.bits() | Self::IN_FLOAT_B.bits() | Self::IN_FLOAT_C.bits();
        const INOUT_FLOAT_D = Self::IN_FLOAT_D.bits() | Self::OUT_FLOAT_D.bits();
    }
}

/// Opcode category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCategory {
    /// Primary opcode that dispatches through a secondary table.
    Subtable,
    Integer,
    Cr,
    Spr,
    System,
    SystemFp,
    Load,
    Store,
    LoadFp,
    StoreFp,
    LoadPs,
    StorePs,
    DoubleFp,
    SingleFp,
    Ps,
    DataCache,
    InstructionCache,
    Branch,
    Unknown,
    Invalid,
}

impl OpCategory {
    pub const fn is_memory(self) -> bool {
        matches!(
            self,
            OpCategory::Load
                | OpCategory::Store
                | OpCategory::LoadFp
                | OpCategory::StoreFp
                | OpCategory::LoadPs
                | OpCategory::StorePs
        )
    }

    pub const fn is_float(self) -> bool {
        matches!(
            self,
            OpCategory::DoubleFp
                | OpCategory::SingleFp
                | OpCategory::Ps
                | OpCategory::SystemFp
                | OpCategory::LoadFp
                | OpCategory::StoreFp
                | OpCategory::LoadPs
                | OpCategory::StorePs
        )
    }
}

/// Semantic description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeDescriptor {
    pub name: &'static str,
    pub category: OpCategory,
    pub flags: OpFlags,
    pub base_cycles: u32,
}

impl OpcodeDescriptor {
    #[inline]
    pub fn ends_block(&self) -> bool {
        self.flags.contains(OpFlags::END_BLOCK)
    }

    #[inline]
    pub fn uses_fpu(&self) -> bool {
        self.flags.contains(OpFlags::USE_FPU)
    }

    #[inline]
    pub fn is_load_store(&self) -> bool {
        self.flags.contains(OpFlags::LOADSTORE)
    }

    #[inline]
    pub fn is_interpreted(&self) -> bool {
        self.flags.contains(OpFlags::INTERPRETED)
    }
}

/// One entry of a template list.
#[derive(Debug, Clone, Copy)]
pub struct OpTemplate {
    pub opcode: u32,
    pub name: &'static str,
    pub category: OpCategory,
    pub cycles: u32,
    pub flags: OpFlags,
}

impl OpTemplate {
    pub const fn descriptor(&self) -> OpcodeDescriptor {
        OpcodeDescriptor {
            name: self.name,
            category: self.category,
            flags: self.flags,
            base_cycles: self.cycles,
        }
    }
}

const fn t(
    opcode: u32,
    name: &'static str,
    category: OpCategory,
    cycles: u32,
    flags: OpFlags,
) -> OpTemplate {
    OpTemplate {
        opcode,
        name,
        category,
        cycles,
        flags,
    }
}

const fn f(a: OpFlags, b: OpFlags) -> OpFlags {
    OpFlags::from_bits_retain(a.bits() | b.bits())
}

macro_rules! fl {
    ($($flag:ident)|+) => {
        OpFlags::from_bits_retain(0 $(| OpFlags::$flag.bits())+)
    };
}

use OpCategory as C;

pub const UNKNOWN_TEMPLATE: OpTemplate =
    t(0, "unknown_instruction", C::Unknown, 1, OpFlags::END_BLOCK);

const NONE: OpFlags = OpFlags::empty();

const FP_ARITH: OpFlags =
    fl!(OUT_FLOAT_D | RC_BIT_F | USE_FPU | SET_FPRF | FLOAT_EXCEPTION);
const FP_ARITH_D: OpFlags =
    fl!(INOUT_FLOAT_D | RC_BIT_F | USE_FPU | SET_FPRF | FLOAT_EXCEPTION);
const PS_ARITH: OpFlags = f(FP_ARITH, OpFlags::PROGRAM_EXCEPTION);
const PS_MOVE: OpFlags = fl!(OUT_FLOAT_D | RC_BIT_F | USE_FPU | PROGRAM_EXCEPTION);
const PS_CMP: OpFlags = fl!(
    IN_FLOAT_AB | SET_CRN | USE_FPU | READ_FPRF | SET_FPRF | PROGRAM_EXCEPTION | FLOAT_EXCEPTION
);

pub const PRIMARY_TEMPLATES: &[OpTemplate] = &[
    t(4, "RunTable4", C::Subtable, 0, NONE),
    t(19, "RunTable19", C::Subtable, 0, NONE),
    t(31, "RunTable31", C::Subtable, 0, NONE),
    t(59, "RunTable59", C::Subtable, 0, NONE),
    t(63, "RunTable63", C::Subtable, 0, NONE),
    t(16, "bcx", C::Branch, 1, fl!(END_BLOCK | READ_CR_BI)),
    t(18, "bx", C::Branch, 1, fl!(END_BLOCK)),
    t(3, "twi", C::System, 1, fl!(IN_A | END_BLOCK)),
    t(17, "sc", C::System, 2, fl!(END_BLOCK)),
    t(7, "mulli", C::Integer, 3, fl!(OUT_D | IN_A)),
    t(8, "subfic", C::Integer, 1, fl!(OUT_D | IN_A | SET_CA)),
    t(10, "cmpli", C::Integer, 1, fl!(IN_A | SET_CRN)),
    t(11, "cmpi", C::Integer, 1, fl!(IN_A | SET_CRN)),
    t(12, "addic", C::Integer, 1, fl!(OUT_D | IN_A | SET_CA)),
    t(13, "addic_rc", C::Integer, 1, fl!(OUT_D | IN_A | SET_CA | SET_CR0)),
    t(14, "addi", C::Integer, 1, fl!(OUT_D | IN_A0)),
    t(15, "addis", C::Integer, 1, fl!(OUT_D | IN_A0)),
    t(20, "rlwimix", C::Integer, 1, fl!(OUT_A | IN_A | IN_S | RC_BIT)),
    t(21, "rlwinmx", C::Integer, 1, fl!(OUT_A | IN_S | RC_BIT)),
    t(23, "rlwnmx", C::Integer, 1, fl!(OUT_A | IN_SB | RC_BIT)),
    t(24, "ori", C::Integer, 1, fl!(OUT_A | IN_S)),
    t(25, "oris", C::Integer, 1, fl!(OUT_A | IN_S)),
    t(26, "xori", C::Integer, 1, fl!(OUT_A | IN_S)),
    t(27, "xoris", C::Integer, 1, fl!(OUT_A | IN_S)),
    t(28, "andi_rc", C::Integer, 1, fl!(OUT_A | IN_S | SET_CR0)),
    t(29, "andis_rc", C::Integer, 1, fl!(OUT_A | IN_S | SET_CR0)),
    t(32, "lwz", C::Load, 1, fl!(OUT_D | IN_A0 | LOADSTORE)),
    t(33, "lwzu", C::Load, 1, fl!(OUT_D | OUT_A | IN_A | LOADSTORE)),
    t(34, "lbz", C::Load, 1, fl!(OUT_D | IN_A0 | LOADSTORE)),
    t(35, "lbzu", C::Load, 1, fl!(OUT_D | OUT_A | IN_A | LOADSTORE)),
    t(40, "lhz", C::Load, 1, fl!(OUT_D | IN_A0 | LOADSTORE)),
    t(41, "lhzu", C::Load, 1, fl!(OUT_D | OUT_A | IN_A | LOADSTORE)),
    t(42, "lha", C::Load, 1, fl!(OUT_D | IN_A0 | LOADSTORE)),
    t(43, "lhau", C::Load, 1, fl!(OUT_D | OUT_A | IN_A | LOADSTORE)),
    t(44, "sth", C::Store, 1, fl!(IN_A0 | IN_S | LOADSTORE)),
    t(45, "sthu", C::Store, 1, fl!(OUT_A | IN_A | IN_S | LOADSTORE)),
    t(36, "stw", C::Store, 1, fl!(IN_A0 | IN_S | LOADSTORE)),
    t(37, "stwu", C::Store, 1, fl!(OUT_A | IN_A | IN_S | LOADSTORE)),
    t(38, "stb", C::Store, 1, fl!(IN_A0 | IN_S | LOADSTORE)),
    t(39, "stbu", C::Store, 1, fl!(OUT_A | IN_A | IN_S | LOADSTORE)),
    t(46, "lmw", C::System, 11, fl!(IN_A0 | LOADSTORE)),
    t(47, "stmw", C::System, 11, fl!(IN_A0 | LOADSTORE)),
    t(48, "lfs", C::LoadFp, 1, fl!(OUT_FLOAT_D | IN_A | USE_FPU | LOADSTORE)),
    t(49, "lfsu", C::LoadFp, 1, fl!(OUT_FLOAT_D | OUT_A | IN_A | USE_FPU | LOADSTORE)),
    t(50, "lfd", C::LoadFp, 1, fl!(INOUT_FLOAT_D | IN_A | USE_FPU | LOADSTORE)),
    t(51, "lfdu", C::LoadFp, 1, fl!(INOUT_FLOAT_D | OUT_A | IN_A | USE_FPU | LOADSTORE)),
    t(52, "stfs", C::StoreFp, 1, fl!(IN_FLOAT_S | IN_A0 | USE_FPU | LOADSTORE)),
    t(53, "stfsu", C::StoreFp, 1, fl!(IN_FLOAT_S | OUT_A | IN_A | USE_FPU | LOADSTORE)),
    t(54, "stfd", C::StoreFp, 1, fl!(IN_FLOAT_S | IN_A0 | USE_FPU | LOADSTORE)),
    t(55, "stfdu", C::StoreFp, 1, fl!(IN_FLOAT_S | OUT_A | IN_A | USE_FPU | LOADSTORE)),
    t(56, "psq_l", C::LoadPs, 1, fl!(OUT_FLOAT_D | IN_A0 | USE_FPU | LOADSTORE | PROGRAM_EXCEPTION)),
    t(57, "psq_lu", C::LoadPs, 1,
        fl!(OUT_FLOAT_D | OUT_A | IN_A | USE_FPU | LOADSTORE | PROGRAM_EXCEPTION)),
    t(60, "psq_st", C::StorePs, 1, fl!(IN_FLOAT_S | IN_A0 | USE_FPU | LOADSTORE | PROGRAM_EXCEPTION)),
    t(61, "psq_stu", C::StorePs, 1,
        fl!(IN_FLOAT_S | OUT_A | IN_A | USE_FPU | LOADSTORE | PROGRAM_EXCEPTION)),
];

/// Table 4, 10-bit forms.
pub const TABLE4_TEMPLATES: &[OpTemplate] = &[
    t(0, "ps_cmpu0", C::Ps, 1, PS_CMP),
    t(32, "ps_cmpo0", C::Ps, 1, PS_CMP),
    t(40, "ps_neg", C::Ps, 1, f(PS_MOVE, OpFlags::IN_FLOAT_B)),
    t(136, "ps_nabs", C::Ps, 1, f(PS_MOVE, OpFlags::IN_FLOAT_B)),
    t(264, "ps_abs", C::Ps, 1, f(PS_MOVE, OpFlags::IN_FLOAT_B)),
    t(64, "ps_cmpu1", C::Ps, 1, PS_CMP),
    t(72, "ps_mr", C::Ps, 1, f(PS_MOVE, OpFlags::IN_FLOAT_B)),
    t(96, "ps_cmpo1", C::Ps, 1, PS_CMP),
    t(528, "ps_merge00", C::Ps, 1, f(PS_MOVE, OpFlags::IN_FLOAT_AB)),
    t(560, "ps_merge01", C::Ps, 1, f(PS_MOVE, OpFlags::IN_FLOAT_AB)),
    t(592, "ps_merge10", C::Ps, 1, f(PS_MOVE, OpFlags::IN_FLOAT_AB)),
    t(624, "ps_merge11", C::Ps, 1, f(PS_MOVE, OpFlags::IN_FLOAT_AB)),
    t(1014, "dcbz_l", C::System, 1, fl!(IN_A0B | LOADSTORE | PROGRAM_EXCEPTION)),
];

/// Table 4, 5-bit forms; replicated across the upper five bits.
pub const TABLE4_2_TEMPLATES: &[OpTemplate] = &[
    t(10, "ps_sum0", C::Ps, 1, f(PS_ARITH, OpFlags::IN_FLOAT_ABC)),
    t(11, "ps_sum1", C::Ps, 1, f(PS_ARITH, OpFlags::IN_FLOAT_ABC)),
    t(12, "ps_muls0", C::Ps, 1, f(PS_ARITH, OpFlags::IN_FLOAT_AC)),
    t(13, "ps_muls1", C::Ps, 1, f(PS_ARITH, OpFlags::IN_FLOAT_AC)),
    t(14, "ps_madds0", C::Ps, 1, f(PS_ARITH, OpFlags::IN_FLOAT_ABC)),
    t(15, "ps_madds1", C::Ps, 1, f(PS_ARITH, OpFlags::IN_FLOAT_ABC)),
    t(18, "ps_div", C::Ps, 17, f(PS_ARITH, fl!(IN_FLOAT_AB | FLOAT_DIV))),
    t(20, "ps_sub", C::Ps, 1, f(PS_ARITH, OpFlags::IN_FLOAT_AB)),
    t(21, "ps_add", C::Ps, 1, f(PS_ARITH, OpFlags::IN_FLOAT_AB)),
    t(23, "ps_sel", C::Ps, 1, f(PS_MOVE, OpFlags::IN_FLOAT_ABC)),
    t(24, "ps_res", C::Ps, 1, f(PS_ARITH, fl!(IN_FLOAT_B | FLOAT_DIV))),
    t(25, "ps_mul", C::Ps, 1, f(PS_ARITH, OpFlags::IN_FLOAT_AC)),
    t(26, "ps_rsqrte", C::Ps, 2, f(PS_ARITH, fl!(IN_FLOAT_B | FLOAT_DIV))),
    t(28, "ps_msub", C::Ps, 1, f(PS_ARITH, OpFlags::IN_FLOAT_ABC)),
    t(29, "ps_madd", C::Ps, 1, f(PS_ARITH, OpFlags::IN_FLOAT_ABC)),
    t(30, "ps_nmsub", C::Ps, 1, f(PS_ARITH, OpFlags::IN_FLOAT_ABC)),
    t(31, "ps_nmadd", C::Ps, 1, f(PS_ARITH, OpFlags::IN_FLOAT_ABC)),
];

/// Table 4, 6-bit indexed load/store forms; replicated across the upper
/// four bits.
pub const TABLE4_3_TEMPLATES: &[OpTemplate] = &[
    t(6, "psq_lx", C::LoadPs, 1, fl!(OUT_FLOAT_D | IN_A0B | USE_FPU | LOADSTORE)),
    t(7, "psq_stx", C::StorePs, 1, fl!(IN_FLOAT_S | IN_A0B | USE_FPU | LOADSTORE)),
    t(38, "psq_lux", C::LoadPs, 1, fl!(OUT_FLOAT_D | OUT_A | IN_AB | USE_FPU | LOADSTORE)),
    t(39, "psq_stux", C::StorePs, 1, fl!(IN_FLOAT_S | OUT_A | IN_AB | USE_FPU | LOADSTORE)),
];

pub const TABLE19_TEMPLATES: &[OpTemplate] = &[
    t(528, "bcctrx", C::Branch, 1, fl!(END_BLOCK | READ_CR_BI)),
    t(16, "bclrx", C::Branch, 1, fl!(END_BLOCK | READ_CR_BI)),
    t(257, "crand", C::Cr, 1, NONE),
    t(129, "crandc", C::Cr, 1, NONE),
    t(289, "creqv", C::Cr, 1, NONE),
    t(225, "crnand", C::Cr, 1, NONE),
    t(33, "crnor", C::Cr, 1, NONE),
    t(449, "cror", C::Cr, 1, NONE),
    t(417, "crorc", C::Cr, 1, NONE),
    t(193, "crxor", C::Cr, 1, NONE),
    t(150, "isync", C::InstructionCache, 1, fl!(NO_REORDER)),
    t(0, "mcrf", C::System, 1, fl!(SET_CRN | READ_CRN)),
    t(50, "rfi", C::System, 2, fl!(END_BLOCK | CHECK_EXCEPTIONS | PROGRAM_EXCEPTION)),
];

pub const TABLE31_TEMPLATES: &[OpTemplate] = &[
    t(266, "addx", C::Integer, 1, fl!(OUT_D | IN_AB | RC_BIT)),
    t(778, "addox", C::Integer, 1, fl!(OUT_D | IN_AB | RC_BIT | SET_OE)),
    t(10, "addcx", C::Integer, 1, fl!(OUT_D | IN_AB | SET_CA | RC_BIT)),
    t(522, "addcox", C::Integer, 1, fl!(OUT_D | IN_AB | SET_CA | RC_BIT | SET_OE)),
    t(138, "addex", C::Integer, 1, fl!(OUT_D | IN_AB | READ_CA | SET_CA | RC_BIT)),
    t(650, "addeox", C::Integer, 1, fl!(OUT_D | IN_AB | READ_CA | SET_CA | RC_BIT | SET_OE)),
    t(234, "addmex", C::Integer, 1, fl!(OUT_D | IN_A | READ_CA | SET_CA | RC_BIT)),
    t(746, "addmeox", C::Integer, 1, fl!(OUT_D | IN_A | READ_CA | SET_CA | RC_BIT | SET_OE)),
    t(202, "addzex", C::Integer, 1, fl!(OUT_D | IN_A | READ_CA | SET_CA | RC_BIT)),
    t(714, "addzeox", C::Integer, 1, fl!(OUT_D | IN_A | READ_CA | SET_CA | RC_BIT | SET_OE)),
    t(491, "divwx", C::Integer, 40, fl!(OUT_D | IN_AB | RC_BIT)),
    t(1003, "divwox", C::Integer, 40, fl!(OUT_D | IN_AB | RC_BIT | SET_OE)),
    t(459, "divwux", C::Integer, 40, fl!(OUT_D | IN_AB | RC_BIT)),
    t(971, "divwuox", C::Integer, 40, fl!(OUT_D | IN_AB | RC_BIT | SET_OE)),
    t(75, "mulhwx", C::Integer, 5, fl!(OUT_D | IN_AB | RC_BIT)),
    t(11, "mulhwux", C::Integer, 5, fl!(OUT_D | IN_AB | RC_BIT)),
    t(235, "mullwx", C::Integer, 5, fl!(OUT_D | IN_AB | RC_BIT)),
    t(747, "mullwox", C::Integer, 5, fl!(OUT_D | IN_AB | RC_BIT | SET_OE)),
    t(104, "negx", C::Integer, 1, fl!(OUT_D | IN_A | RC_BIT)),
    t(616, "negox", C::Integer, 1, fl!(OUT_D | IN_A | RC_BIT | SET_OE)),
    t(40, "subfx", C::Integer, 1, fl!(OUT_D | IN_AB | RC_BIT)),
    t(552, "subfox", C::Integer, 1, fl!(OUT_D | IN_AB | RC_BIT | SET_OE)),
    t(8, "subfcx", C::Integer, 1, fl!(OUT_D | IN_AB | SET_CA | RC_BIT)),
    t(520, "subfcox", C::Integer, 1, fl!(OUT_D | IN_AB | SET_CA | RC_BIT | SET_OE)),
    t(136, "subfex", C::Integer, 1, fl!(OUT_D | IN_AB | READ_CA | SET_CA | RC_BIT)),
    t(648, "subfeox", C::Integer, 1, fl!(OUT_D | IN_AB | READ_CA | SET_CA | RC_BIT | SET_OE)),
    t(232, "subfmex", C::Integer, 1, fl!(OUT_D | IN_A | READ_CA | SET_CA | RC_BIT)),
    t(744, "subfmeox", C::Integer, 1, fl!(OUT_D | IN_A | READ_CA | SET_CA | RC_BIT | SET_OE)),
    t(200, "subfzex", C::Integer, 1, fl!(OUT_D | IN_A | READ_CA | SET_CA | RC_BIT)),
    t(712, "subfzeox", C::Integer, 1, fl!(OUT_D | IN_A | READ_CA | SET_CA | RC_BIT | SET_OE)),
    t(28, "andx", C::Integer, 1, fl!(OUT_A | IN_SB | RC_BIT)),
    t(60, "andcx", C::Integer, 1, fl!(OUT_A | IN_SB | RC_BIT)),
    t(444, "orx", C::Integer, 1, fl!(OUT_A | IN_SB | RC_BIT)),
    t(124, "norx", C::Integer, 1, fl!(OUT_A | IN_SB | RC_BIT)),
    t(316, "xorx", C::Integer, 1, fl!(OUT_A | IN_SB | RC_BIT)),
    t(412, "orcx", C::Integer, 1, fl!(OUT_A | IN_SB | RC_BIT)),
    t(476, "nandx", C::Integer, 1, fl!(OUT_A | IN_SB | RC_BIT)),
    t(284, "eqvx", C::Integer, 1, fl!(OUT_A | IN_SB | RC_BIT)),
    t(0, "cmp", C::Integer, 1, fl!(IN_AB | SET_CRN)),
    t(32, "cmpl", C::Integer, 1, fl!(IN_AB | SET_CRN)),
    t(26, "cntlzwx", C::Integer, 1, fl!(OUT_A | IN_S | RC_BIT)),
    t(922, "extshx", C::Integer, 1, fl!(OUT_A | IN_S | RC_BIT)),
    t(954, "extsbx", C::Integer, 1, fl!(OUT_A | IN_S | RC_BIT)),
    t(536, "srwx", C::Integer, 1, fl!(OUT_A | IN_SB | RC_BIT)),
    t(792, "srawx", C::Integer, 1, fl!(OUT_A | IN_SB | SET_CA | RC_BIT)),
    t(824, "srawix", C::Integer, 1, fl!(OUT_A | IN_S | SET_CA | RC_BIT)),
    t(24, "slwx", C::Integer, 1, fl!(OUT_A | IN_SB | RC_BIT)),
    t(54, "dcbst", C::DataCache, 5, fl!(IN_A0B | LOADSTORE)),
    t(86, "dcbf", C::DataCache, 5, fl!(IN_A0B | LOADSTORE)),
    t(246, "dcbtst", C::DataCache, 2, NONE),
    t(278, "dcbt", C::DataCache, 2, NONE),
    t(470, "dcbi", C::DataCache, 5, fl!(IN_A0B | LOADSTORE | PROGRAM_EXCEPTION)),
    t(758, "dcba", C::DataCache, 5, NONE),
    t(1014, "dcbz", C::DataCache, 5, fl!(IN_A0B | LOADSTORE)),
    t(23, "lwzx", C::Load, 1, fl!(OUT_D | IN_A0B | LOADSTORE)),
    t(55, "lwzux", C::Load, 1, fl!(OUT_D | OUT_A | IN_AB | LOADSTORE)),
    t(279, "lhzx", C::Load, 1, fl!(OUT_D | IN_A0B | LOADSTORE)),
    t(311, "lhzux", C::Load, 1, fl!(OUT_D | OUT_A | IN_AB | LOADSTORE)),
    t(343, "lhax", C::Load, 1, fl!(OUT_D | IN_A0B | LOADSTORE)),
    t(375, "lhaux", C::Load, 1, fl!(OUT_D | OUT_A | IN_AB | LOADSTORE)),
    t(87, "lbzx", C::Load, 1, fl!(OUT_D | IN_A0B | LOADSTORE)),
    t(119, "lbzux", C::Load, 1, fl!(OUT_D | OUT_A | IN_AB | LOADSTORE)),
    t(534, "lwbrx", C::Load, 1, fl!(OUT_D | IN_A0B | LOADSTORE)),
    t(790, "lhbrx", C::Load, 1, fl!(OUT_D | IN_A0B | LOADSTORE)),
    t(150, "stwcxd", C::Store, 1, fl!(IN_S | IN_A0B | SET_CR0 | LOADSTORE)),
    t(20, "lwarx", C::Load, 1, fl!(OUT_D | IN_A0B | SET_CR0 | LOADSTORE)),
    t(533, "lswx", C::Load, 1, fl!(IN_A0B | OUT_D | LOADSTORE)),
    t(597, "lswi", C::Load, 1, fl!(IN_A0 | OUT_D | LOADSTORE)),
    t(151, "stwx", C::Store, 1, fl!(IN_S | IN_A0B | LOADSTORE)),
    t(183, "stwux", C::Store, 1, fl!(IN_S | OUT_A | IN_AB | LOADSTORE)),
    t(407, "sthx", C::Store, 1, fl!(IN_S | IN_A0B | LOADSTORE)),
    t(439, "sthux", C::Store, 1, fl!(IN_S | OUT_A | IN_AB | LOADSTORE)),
    t(215, "stbx", C::Store, 1, fl!(IN_S | IN_A0B | LOADSTORE)),
    t(247, "stbux", C::Store, 1, fl!(IN_S | OUT_A | IN_AB | LOADSTORE)),
    t(662, "stwbrx", C::Store, 1, fl!(IN_S | IN_A0B | LOADSTORE)),
    t(918, "sthbrx", C::Store, 1, fl!(IN_S | IN_A0B | LOADSTORE)),
    t(661, "stswx", C::Store, 1, fl!(IN_A0B | LOADSTORE)),
    t(725, "stswi", C::Store, 1, fl!(IN_A0 | LOADSTORE)),
    t(535, "lfsx", C::LoadFp, 1, fl!(OUT_FLOAT_D | IN_A0B | USE_FPU | LOADSTORE)),
    t(567, "lfsux", C::LoadFp, 1, fl!(OUT_FLOAT_D | IN_AB | OUT_A | USE_FPU | LOADSTORE)),
    t(599, "lfdx", C::LoadFp, 1, fl!(INOUT_FLOAT_D | IN_A0B | USE_FPU | LOADSTORE)),
    t(631, "lfdux", C::LoadFp, 1, fl!(INOUT_FLOAT_D | IN_AB | OUT_A | USE_FPU | LOADSTORE)),
    t(663, "stfsx", C::StoreFp, 1, fl!(IN_FLOAT_S | IN_A0B | USE_FPU | LOADSTORE)),
    t(695, "stfsux", C::StoreFp, 1, fl!(IN_FLOAT_S | IN_AB | OUT_A | USE_FPU | LOADSTORE)),
    t(727, "stfdx", C::StoreFp, 1, fl!(IN_FLOAT_S | IN_A0B | USE_FPU | LOADSTORE)),
    t(759, "stfdux", C::StoreFp, 1, fl!(IN_FLOAT_S | IN_AB | OUT_A | USE_FPU | LOADSTORE)),
    t(983, "stfiwx", C::StoreFp, 1, fl!(IN_FLOAT_S | IN_A0B | USE_FPU | LOADSTORE)),
    t(19, "mfcr", C::System, 1, fl!(OUT_D | READ_ALL_CR)),
    t(83, "mfmsr", C::System, 1, fl!(OUT_D | PROGRAM_EXCEPTION)),
    t(144, "mtcrf", C::System, 1, fl!(IN_S | SET_ALL_CR | READ_ALL_CR)),
    t(146, "mtmsr", C::System, 1, fl!(IN_S | END_BLOCK | PROGRAM_EXCEPTION | FLOAT_EXCEPTION)),
    t(210, "mtsr", C::System, 1, fl!(IN_S | PROGRAM_EXCEPTION)),
    t(242, "mtsrin", C::System, 1, fl!(IN_SB | PROGRAM_EXCEPTION)),
    t(339, "mfspr", C::Spr, 1, fl!(OUT_D | PROGRAM_EXCEPTION)),
    t(467, "mtspr", C::Spr, 2, fl!(IN_S | END_BLOCK | PROGRAM_EXCEPTION)),
    t(371, "mftb", C::System, 1, fl!(OUT_D | TIMER | PROGRAM_EXCEPTION)),
    t(512, "mcrxr", C::System, 1, fl!(SET_CRN | READ_CA | SET_CA)),
    t(595, "mfsr", C::System, 3, fl!(OUT_D | PROGRAM_EXCEPTION)),
    t(659, "mfsrin", C::System, 3, fl!(OUT_D | IN_B | PROGRAM_EXCEPTION)),
    t(4, "tw", C::System, 2, fl!(IN_AB | END_BLOCK)),
    t(598, "sync", C::System, 3, NONE),
    t(982, "icbi", C::System, 4, fl!(IN_A0B | END_BLOCK | LOADSTORE)),
    t(310, "eciwx", C::System, 1, fl!(IN_A0B | OUT_D | LOADSTORE)),
    t(438, "ecowx", C::System, 1, fl!(IN_A0B | IN_S | LOADSTORE)),
    t(854, "eieio", C::System, 1, NONE),
    t(306, "tlbie", C::System, 1, fl!(IN_B | PROGRAM_EXCEPTION)),
    t(566, "tlbsync", C::System, 1, fl!(PROGRAM_EXCEPTION)),
];

/// Table 59 (single-precision arithmetic), indexed by the 5-bit field.
pub const TABLE59_TEMPLATES: &[OpTemplate] = &[
    t(18, "fdivsx", C::SingleFp, 17, f(FP_ARITH, fl!(IN_FLOAT_AB | FLOAT_DIV))),
    t(20, "fsubsx", C::SingleFp, 1, f(FP_ARITH, OpFlags::IN_FLOAT_AB)),
    t(21, "faddsx", C::SingleFp, 1, f(FP_ARITH, OpFlags::IN_FLOAT_AB)),
    t(24, "fresx", C::SingleFp, 1, f(FP_ARITH, fl!(IN_FLOAT_B | FLOAT_DIV))),
    t(25, "fmulsx", C::SingleFp, 1, f(FP_ARITH, OpFlags::IN_FLOAT_AC)),
    t(28, "fmsubsx", C::SingleFp, 1, f(FP_ARITH, OpFlags::IN_FLOAT_ABC)),
    t(29, "fmaddsx", C::SingleFp, 1, f(FP_ARITH, OpFlags::IN_FLOAT_ABC)),
    t(30, "fnmsubsx", C::SingleFp, 1, f(FP_ARITH, OpFlags::IN_FLOAT_ABC)),
    t(31, "fnmaddsx", C::SingleFp, 1, f(FP_ARITH, OpFlags::IN_FLOAT_ABC)),
];

/// Table 63, 10-bit forms.
pub const TABLE63_TEMPLATES: &[OpTemplate] = &[
    t(264, "fabsx", C::DoubleFp, 1, fl!(INOUT_FLOAT_D | IN_FLOAT_B | RC_BIT_F | USE_FPU)),
    t(32, "fcmpo", C::DoubleFp, 1,
        fl!(IN_FLOAT_AB | SET_CRN | USE_FPU | READ_FPRF | SET_FPRF | FLOAT_EXCEPTION)),
    t(0, "fcmpu", C::DoubleFp, 1,
        fl!(IN_FLOAT_AB | SET_CRN | USE_FPU | READ_FPRF | SET_FPRF | FLOAT_EXCEPTION)),
    t(14, "fctiwx", C::DoubleFp, 1,
        fl!(INOUT_FLOAT_D | IN_FLOAT_B | RC_BIT_F | USE_FPU | FLOAT_EXCEPTION)),
    t(15, "fctiwzx", C::DoubleFp, 1,
        fl!(INOUT_FLOAT_D | IN_FLOAT_B | RC_BIT_F | USE_FPU | FLOAT_EXCEPTION)),
    t(72, "fmrx", C::DoubleFp, 1, fl!(INOUT_FLOAT_D | IN_FLOAT_B | RC_BIT_F | USE_FPU)),
    t(136, "fnabsx", C::DoubleFp, 1, fl!(INOUT_FLOAT_D | IN_FLOAT_B | RC_BIT_F | USE_FPU)),
    t(40, "fnegx", C::DoubleFp, 1, fl!(INOUT_FLOAT_D | IN_FLOAT_B | RC_BIT_F | USE_FPU)),
    t(12, "frspx", C::DoubleFp, 1, f(FP_ARITH, OpFlags::IN_FLOAT_B)),
    t(64, "mcrfs", C::SystemFp, 1, fl!(SET_CRN | USE_FPU | READ_FPRF)),
    t(583, "mffsx", C::SystemFp, 1, fl!(RC_BIT_F | INOUT_FLOAT_D | USE_FPU | READ_FPRF)),
    t(70, "mtfsb0x", C::SystemFp, 3, fl!(RC_BIT_F | USE_FPU | READ_FPRF | SET_FPRF)),
    t(38, "mtfsb1x", C::SystemFp, 3,
        fl!(RC_BIT_F | USE_FPU | READ_FPRF | SET_FPRF | FLOAT_EXCEPTION)),
    t(134, "mtfsfix", C::SystemFp, 3,
        fl!(RC_BIT_F | USE_FPU | READ_FPRF | SET_FPRF | FLOAT_EXCEPTION)),
    t(711, "mtfsfx", C::SystemFp, 3,
        fl!(RC_BIT_F | IN_FLOAT_B | USE_FPU | READ_FPRF | SET_FPRF | FLOAT_EXCEPTION)),
];

/// Table 63, 5-bit A-forms; replicated across the upper five bits.
pub const TABLE63_2_TEMPLATES: &[OpTemplate] = &[
    t(18, "fdivx", C::DoubleFp, 31, f(FP_ARITH_D, fl!(IN_FLOAT_AB | FLOAT_DIV))),
    t(20, "fsubx", C::DoubleFp, 1, f(FP_ARITH_D, OpFlags::IN_FLOAT_AB)),
    t(21, "faddx", C::DoubleFp, 1, f(FP_ARITH_D, OpFlags::IN_FLOAT_AB)),
    t(23, "fselx", C::DoubleFp, 1, fl!(INOUT_FLOAT_D | IN_FLOAT_ABC | RC_BIT_F | USE_FPU)),
    t(25, "fmulx", C::DoubleFp, 1, f(FP_ARITH_D, OpFlags::IN_FLOAT_AC)),
    t(26, "frsqrtex", C::DoubleFp, 1, f(FP_ARITH_D, fl!(IN_FLOAT_B | FLOAT_DIV))),
    t(28, "fmsubx", C::DoubleFp, 1, f(FP_ARITH_D, OpFlags::IN_FLOAT_ABC)),
    t(29, "fmaddx", C::DoubleFp, 1, f(FP_ARITH_D, OpFlags::IN_FLOAT_ABC)),
    t(30, "fnmsubx", C::DoubleFp, 1, f(FP_ARITH_D, OpFlags::IN_FLOAT_ABC)),
    t(31, "fnmaddx", C::DoubleFp, 1, f(FP_ARITH_D, OpFlags::IN_FLOAT_ABC)),
];
