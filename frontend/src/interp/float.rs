//! Scalar floating point.
//!
//! Double-precision results go to `ps0` only. Single-precision results are
//! rounded and written to both halves. FPRF and the sticky exception bits
//! are not tracked for arithmetic.

use gekko_core::state::{cr, round_single};
use gekko_core::GuestInstruction;

use super::Interpreter;

/// `mffs` and `fctiw*` return their integer in the low word of this
/// pattern.
const FP_INT_PATTERN: u64 = 0xFFF8_0000_0000_0000;
/// FX and every exception bit of FPSCR; cleared when `mcrfs` reads them.
const FPSCR_EXCEPTION_BITS: u32 = 0x9FF8_0700;
/// FPSCR[FPRF] condition code, bits 16..19.
const FPSCR_FPCC_SHIFT: u32 = 12;
const FPSCR_RN_MASK: u32 = 3;

pub(crate) type BinFn = fn(f64, f64) -> f64;
pub(crate) type TriFn = fn(f64, f64, f64) -> f64;

pub(crate) fn madd(a: f64, c: f64, b: f64) -> f64 {
    a.mul_add(c, b)
}

pub(crate) fn msub(a: f64, c: f64, b: f64) -> f64 {
    a.mul_add(c, -b)
}

pub(crate) fn nmadd(a: f64, c: f64, b: f64) -> f64 {
    -a.mul_add(c, b)
}

pub(crate) fn nmsub(a: f64, c: f64, b: f64) -> f64 {
    -a.mul_add(c, -b)
}

/// CR field of an unordered-aware comparison.
pub(crate) fn compare_fp(a: f64, b: f64) -> u8 {
    if a.is_nan() || b.is_nan() {
        cr::SO
    } else if a < b {
        cr::LT
    } else if a > b {
        cr::GT
    } else {
        cr::EQ
    }
}

// ── Helpers ─────────────────────────────────────────────

impl Interpreter<'_> {
    #[inline]
    pub(crate) fn ps0(&self, n: usize) -> f64 {
        self.state.ps0_f64(n)
    }

    #[inline]
    pub(crate) fn ps1(&self, n: usize) -> f64 {
        self.state.ps[n].ps1_f64()
    }

    fn write_double(&mut self, insn: GuestInstruction, value: f64) {
        self.state.set_ps0_f64(insn.fd(), value);
        self.record_fp(insn);
    }

    fn write_single(&mut self, insn: GuestInstruction, value: f64) {
        self.state.set_both_f64(insn.fd(), round_single(value));
        self.record_fp(insn);
    }

    fn fp_ab(&self, insn: GuestInstruction, op: BinFn) -> f64 {
        op(self.ps0(insn.fa()), self.ps0(insn.fb()))
    }

    fn fp_ac(&self, insn: GuestInstruction, op: BinFn) -> f64 {
        op(self.ps0(insn.fa()), self.ps0(insn.fc()))
    }

    fn fp_acb(&self, insn: GuestInstruction, op: TriFn) -> f64 {
        op(self.ps0(insn.fa()), self.ps0(insn.fc()), self.ps0(insn.fb()))
    }

    /// Bit operation on `ps0` of fB into `ps0` of fD.
    fn fp_bits(&mut self, insn: GuestInstruction, op: fn(u64) -> u64) {
        let bits = op(self.state.ps[insn.fb()].ps0);
        self.state.ps[insn.fd()].ps0 = bits;
        self.record_fp(insn);
    }

    pub(crate) fn set_fpcc(&mut self, field: u8) {
        self.state.fpscr =
            (self.state.fpscr & !(0xF << FPSCR_FPCC_SHIFT)) | ((field as u32) << FPSCR_FPCC_SHIFT);
    }
}

// ── Arithmetic ──────────────────────────────────────────

pub fn faddx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_ab(insn, |a, b| a + b);
    ip.write_double(insn, r);
}

pub fn fsubx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_ab(insn, |a, b| a - b);
    ip.write_double(insn, r);
}

pub fn fmulx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_ac(insn, |a, c| a * c);
    ip.write_double(insn, r);
}

pub fn fdivx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_ab(insn, |a, b| a / b);
    ip.write_double(insn, r);
}

pub fn faddsx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_ab(insn, |a, b| a + b);
    ip.write_single(insn, r);
}

pub fn fsubsx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_ab(insn, |a, b| a - b);
    ip.write_single(insn, r);
}

pub fn fmulsx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_ac(insn, |a, c| a * c);
    ip.write_single(insn, r);
}

pub fn fdivsx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_ab(insn, |a, b| a / b);
    ip.write_single(insn, r);
}

pub fn fmaddx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_acb(insn, madd);
    ip.write_double(insn, r);
}

pub fn fmsubx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_acb(insn, msub);
    ip.write_double(insn, r);
}

pub fn fnmaddx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_acb(insn, nmadd);
    ip.write_double(insn, r);
}

pub fn fnmsubx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_acb(insn, nmsub);
    ip.write_double(insn, r);
}

pub fn fmaddsx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_acb(insn, madd);
    ip.write_single(insn, r);
}

pub fn fmsubsx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_acb(insn, msub);
    ip.write_single(insn, r);
}

pub fn fnmaddsx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_acb(insn, nmadd);
    ip.write_single(insn, r);
}

pub fn fnmsubsx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.fp_acb(insn, nmsub);
    ip.write_single(insn, r);
}

pub fn fselx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = if ip.ps0(insn.fa()) >= 0.0 {
        ip.ps0(insn.fc())
    } else {
        ip.ps0(insn.fb())
    };
    ip.write_double(insn, r);
}

pub fn fresx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = 1.0 / ip.ps0(insn.fb());
    ip.write_single(insn, r);
}

pub fn frsqrtex(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = 1.0 / ip.ps0(insn.fb()).sqrt();
    ip.write_double(insn, r);
}

pub fn frspx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r = ip.ps0(insn.fb());
    ip.write_single(insn, r);
}

// ── Moves ───────────────────────────────────────────────

const SIGN: u64 = 1 << 63;

pub fn fmrx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.fp_bits(insn, |b| b);
}

pub fn fnegx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.fp_bits(insn, |b| b ^ SIGN);
}

pub fn fabsx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.fp_bits(insn, |b| b & !SIGN);
}

pub fn fnabsx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.fp_bits(insn, |b| b | SIGN);
}

// ── Compare and convert ─────────────────────────────────

/// `fcmpu` and `fcmpo`.
pub fn fcmp(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let field = compare_fp(ip.ps0(insn.fa()), ip.ps0(insn.fb()));
    ip.state.set_cr_field(insn.crfd(), field);
    ip.set_fpcc(field);
}

/// Convert to a saturated signed word, rounding per FPSCR[RN] unless
/// `truncate` is set.
fn convert_to_int(value: f64, rn: u32, truncate: bool) -> u32 {
    if value.is_nan() {
        return 0x8000_0000;
    }
    let rounded = if truncate {
        value.trunc()
    } else {
        match rn & FPSCR_RN_MASK {
            0 => {
                let r = value.round();
                // Ties to even.
                if (value - value.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
                    r - value.signum()
                } else {
                    r
                }
            }
            1 => value.trunc(),
            2 => value.ceil(),
            _ => value.floor(),
        }
    };
    if rounded >= 2_147_483_648.0 {
        0x7FFF_FFFF
    } else if rounded < -2_147_483_648.0 {
        0x8000_0000
    } else {
        rounded as i32 as u32
    }
}

pub fn fctiwx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let v = convert_to_int(ip.ps0(insn.fb()), ip.state.fpscr, false);
    ip.state.ps[insn.fd()].ps0 = FP_INT_PATTERN | v as u64;
    ip.record_fp(insn);
}

pub fn fctiwzx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let v = convert_to_int(ip.ps0(insn.fb()), ip.state.fpscr, true);
    ip.state.ps[insn.fd()].ps0 = FP_INT_PATTERN | v as u64;
    ip.record_fp(insn);
}

// ── FPSCR ───────────────────────────────────────────────

pub fn mffsx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.state.ps[insn.fd()].ps0 = FP_INT_PATTERN | ip.state.fpscr as u64;
    ip.record_fp(insn);
}

pub fn mtfsb0x(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.state.fpscr &= !(0x8000_0000 >> insn.crbd());
    ip.record_fp(insn);
}

pub fn mtfsb1x(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.state.fpscr |= 0x8000_0000 >> insn.crbd();
    ip.record_fp(insn);
}

pub fn mtfsfix(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let shift = 28 - 4 * insn.crfd() as u32;
    let imm = (insn.hex() >> 12) & 0xF;
    ip.state.fpscr = (ip.state.fpscr & !(0xF << shift)) | (imm << shift);
    ip.record_fp(insn);
}

pub fn mtfsfx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let fm = insn.fm();
    let mask = (0..8)
        .filter(|i| fm & (1 << i) != 0)
        .fold(0u32, |m, i| m | (0xF << (4 * i)));
    let value = ip.state.ps[insn.fb()].ps0 as u32;
    ip.state.fpscr = (ip.state.fpscr & !mask) | (value & mask);
    ip.record_fp(insn);
}

pub fn mcrfs(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let shift = 28 - 4 * insn.crfs() as u32;
    let field = (ip.state.fpscr >> shift) & 0xF;
    ip.state.set_cr_field(insn.crfd(), field as u8);
    ip.state.fpscr &= !((0xF << shift) & FPSCR_EXCEPTION_BITS);
}
