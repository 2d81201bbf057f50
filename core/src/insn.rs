//! Gekko instruction word and its bitfields.
//!
//! Field names follow the PowerPC manuals (OPCD, RD, RA, SIMM, ...).
//! Every 32-bit pattern is a valid `GuestInstruction`; whether it means
//! anything is decided by the opcode table.

use std::fmt;

/// A raw 32-bit guest instruction word.
///
/// Immutable value type, created on demand from guest memory.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct GuestInstruction(pub u32);

impl GuestInstruction {
    #[inline]
    pub const fn new(hex: u32) -> Self {
        Self(hex)
    }

    /// Build from a word as read from memory. Guest memory is big-endian;
    /// pass `big_endian = false` when the word was fetched with host
    /// (little-endian) byte order.
    #[inline]
    pub const fn from_memory(word: u32, big_endian: bool) -> Self {
        if big_endian {
            Self(word)
        } else {
            Self(word.swap_bytes())
        }
    }

    #[inline]
    pub const fn hex(self) -> u32 {
        self.0
    }

    // -- Opcode fields -------------------------------------

    /// Primary opcode (bits 0-5).
    #[inline]
    pub const fn opcd(self) -> u32 {
        self.0 >> 26
    }

    /// 10-bit extended opcode (bits 21-30).
    #[inline]
    pub const fn subop10(self) -> u32 {
        (self.0 >> 1) & 0x3FF
    }

    /// 5-bit extended opcode (bits 26-30), used by the A-form tables.
    #[inline]
    pub const fn subop5(self) -> u32 {
        (self.0 >> 1) & 0x1F
    }

    /// 6-bit extended opcode (bits 25-30), paired-single indexed forms.
    #[inline]
    pub const fn subop6(self) -> u32 {
        (self.0 >> 1) & 0x3F
    }

    // -- Register fields -----------------------------------

    #[inline]
    pub const fn rd(self) -> usize {
        ((self.0 >> 21) & 0x1F) as usize
    }

    /// Source register of stores and logical ops; same bits as RD.
    #[inline]
    pub const fn rs(self) -> usize {
        self.rd()
    }

    #[inline]
    pub const fn ra(self) -> usize {
        ((self.0 >> 16) & 0x1F) as usize
    }

    #[inline]
    pub const fn rb(self) -> usize {
        ((self.0 >> 11) & 0x1F) as usize
    }

    #[inline]
    pub const fn rc_reg(self) -> usize {
        ((self.0 >> 6) & 0x1F) as usize
    }

    #[inline]
    pub const fn fd(self) -> usize {
        self.rd()
    }

    #[inline]
    pub const fn fs(self) -> usize {
        self.rd()
    }

    #[inline]
    pub const fn fa(self) -> usize {
        self.ra()
    }

    #[inline]
    pub const fn fb(self) -> usize {
        self.rb()
    }

    #[inline]
    pub const fn fc(self) -> usize {
        self.rc_reg()
    }

    // -- Immediates ----------------------------------------

    /// Sign-extended 16-bit immediate.
    #[inline]
    pub const fn simm16(self) -> i32 {
        self.0 as u16 as i16 as i32
    }

    /// Zero-extended 16-bit immediate.
    #[inline]
    pub const fn uimm(self) -> u32 {
        self.0 & 0xFFFF
    }

    /// Sign-extended 12-bit displacement of `psq_l`/`psq_st`.
    #[inline]
    pub const fn simm12(self) -> i32 {
        ((self.0 << 20) as i32) >> 20
    }

    /// Branch displacement of `b`, sign-extended from 26 bits.
    #[inline]
    pub const fn li(self) -> i32 {
        (((self.0 & 0x03FF_FFFC) << 6) as i32) >> 6
    }

    /// Branch displacement of `bc`, sign-extended from 16 bits.
    #[inline]
    pub const fn bd(self) -> i32 {
        (self.0 & 0xFFFC) as u16 as i16 as i32
    }

    // -- Flag bits -----------------------------------------

    /// Record bit (Rc).
    #[inline]
    pub const fn rc(self) -> bool {
        self.0 & 1 != 0
    }

    /// Overflow-enable bit (OE).
    #[inline]
    pub const fn oe(self) -> bool {
        (self.0 >> 10) & 1 != 0
    }

    /// Absolute-address bit (AA).
    #[inline]
    pub const fn aa(self) -> bool {
        (self.0 >> 1) & 1 != 0
    }

    /// Link bit (LK).
    #[inline]
    pub const fn lk(self) -> bool {
        self.0 & 1 != 0
    }

    #[inline]
    pub const fn bo(self) -> u32 {
        (self.0 >> 21) & 0x1F
    }

    #[inline]
    pub const fn bi(self) -> u32 {
        (self.0 >> 16) & 0x1F
    }

    /// Trap condition bits (TO), same position as RD.
    #[inline]
    pub const fn to(self) -> u32 {
        (self.0 >> 21) & 0x1F
    }

    // -- Rotate / shift -------------------------------------

    #[inline]
    pub const fn sh(self) -> u32 {
        (self.0 >> 11) & 0x1F
    }

    #[inline]
    pub const fn mb(self) -> u32 {
        (self.0 >> 6) & 0x1F
    }

    #[inline]
    pub const fn me(self) -> u32 {
        (self.0 >> 1) & 0x1F
    }

    // -- Condition register ---------------------------------

    #[inline]
    pub const fn crfd(self) -> usize {
        ((self.0 >> 23) & 7) as usize
    }

    #[inline]
    pub const fn crfs(self) -> usize {
        ((self.0 >> 18) & 7) as usize
    }

    #[inline]
    pub const fn crbd(self) -> u32 {
        (self.0 >> 21) & 0x1F
    }

    #[inline]
    pub const fn crba(self) -> u32 {
        (self.0 >> 16) & 0x1F
    }

    #[inline]
    pub const fn crbb(self) -> u32 {
        (self.0 >> 11) & 0x1F
    }

    /// CR field mask of `mtcrf`.
    #[inline]
    pub const fn crm(self) -> u32 {
        (self.0 >> 12) & 0xFF
    }

    // -- SPR / misc -----------------------------------------

    /// SPR number with the two 5-bit halves swapped back into order.
    #[inline]
    pub const fn spr(self) -> u32 {
        let raw = (self.0 >> 11) & 0x3FF;
        ((raw & 0x1F) << 5) | (raw >> 5)
    }

    /// Segment register field of `mtsr`/`mfsr`.
    #[inline]
    pub const fn sr(self) -> u32 {
        (self.0 >> 16) & 0xF
    }

    /// Byte count of the string instructions.
    #[inline]
    pub const fn nb(self) -> u32 {
        (self.0 >> 11) & 0x1F
    }

    /// FPSCR field mask of `mtfsf`.
    #[inline]
    pub const fn fm(self) -> u32 {
        (self.0 >> 17) & 0xFF
    }

    // -- Paired-single quantization -------------------------

    /// W bit of `psq_l`/`psq_st`.
    #[inline]
    pub const fn ps_w(self) -> u32 {
        (self.0 >> 15) & 1
    }

    /// GQR index of `psq_l`/`psq_st`.
    #[inline]
    pub const fn ps_i(self) -> u32 {
        (self.0 >> 12) & 7
    }

    /// W bit of the indexed paired-single forms.
    #[inline]
    pub const fn ps_wx(self) -> u32 {
        (self.0 >> 10) & 1
    }

    /// GQR index of the indexed paired-single forms.
    #[inline]
    pub const fn ps_ix(self) -> u32 {
        (self.0 >> 7) & 7
    }
}

impl fmt::Debug for GuestInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuestInstruction({:08x})", self.0)
    }
}

impl From<u32> for GuestInstruction {
    fn from(hex: u32) -> Self {
        Self(hex)
    }
}

/// Primary tables that are reached through a secondary opcode field.
pub const SUBTABLE_OPCODES: [u32; 5] = [4, 19, 31, 59, 63];

/// Split a word into `(primary, secondary)` opcode numbers.
///
/// The secondary number is the 5-bit field for table 59, the 10-bit field
/// for the other subtables and zero for primary-only opcodes.
#[inline]
pub const fn decode(insn: GuestInstruction) -> (u32, u32) {
    let primary = insn.opcd();
    let secondary = match primary {
        4 | 19 | 31 | 63 => insn.subop10(),
        59 => insn.subop5(),
        _ => 0,
    };
    (primary, secondary)
}

/// Rotate mask for `rlwinm`/`rlwimi`/`rlwnm`: ones from bit `mb` to
/// bit `me` (IBM numbering), wrapping when `mb > me`.
#[inline]
pub const fn rotate_mask(mb: u32, me: u32) -> u32 {
    let begin = u32::MAX >> mb;
    let end = 0x7FFF_FFFFu32 >> me;
    let mask = begin ^ end;
    if me < mb {
        !mask
    } else {
        mask
    }
}

/// Effective target of `b`/`bc`: the displacement itself when AA is set,
/// otherwise relative to the branch's own address.
#[inline]
pub const fn branch_target(address: u32, displacement: i32, absolute: bool) -> u32 {
    if absolute {
        displacement as u32
    } else {
        address.wrapping_add(displacement as u32)
    }
}
