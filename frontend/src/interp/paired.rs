//! Paired-single arithmetic and quantized loads and stores.
//!
//! Arithmetic operates on both halves independently and rounds each
//! result to single precision. Sign manipulation and merges move bits
//! without rounding.

use gekko_core::state::{double_to_single_bits, program, round_single, single_to_double_bits, spr};
use gekko_core::{AccessSize, GuestInstruction};

use super::float::{compare_fp, madd, msub, nmadd, nmsub, BinFn, TriFn};
use super::Interpreter;

/// HID2[LSQE]: paired-single load/store quantization enabled.
const HID2_LSQE: u32 = 0x8000_0000;
const SIGN: u64 = 1 << 63;

// ── Helpers ─────────────────────────────────────────────

impl Interpreter<'_> {
    fn write_pair(&mut self, insn: GuestInstruction, ps0: f64, ps1: f64) {
        let fd = &mut self.state.ps[insn.fd()];
        fd.ps0 = round_single(ps0).to_bits();
        fd.ps1 = round_single(ps1).to_bits();
        self.record_fp(insn);
    }

    fn pair_ab(&mut self, insn: GuestInstruction, op: BinFn) {
        let (a, b) = (insn.fa(), insn.fb());
        let r0 = op(self.ps0(a), self.ps0(b));
        let r1 = op(self.ps1(a), self.ps1(b));
        self.write_pair(insn, r0, r1);
    }

    fn pair_ac(&mut self, insn: GuestInstruction, op: BinFn) {
        let (a, c) = (insn.fa(), insn.fc());
        let r0 = op(self.ps0(a), self.ps0(c));
        let r1 = op(self.ps1(a), self.ps1(c));
        self.write_pair(insn, r0, r1);
    }

    fn pair_acb(&mut self, insn: GuestInstruction, op: TriFn) {
        let (a, b, c) = (insn.fa(), insn.fb(), insn.fc());
        let r0 = op(self.ps0(a), self.ps0(c), self.ps0(b));
        let r1 = op(self.ps1(a), self.ps1(c), self.ps1(b));
        self.write_pair(insn, r0, r1);
    }

    fn pair_b(&mut self, insn: GuestInstruction, op: fn(f64) -> f64) {
        let b = insn.fb();
        let r0 = op(self.ps0(b));
        let r1 = op(self.ps1(b));
        self.write_pair(insn, r0, r1);
    }

    fn pair_bits(&mut self, insn: GuestInstruction, op: fn(u64) -> u64) {
        let fb = self.state.ps[insn.fb()];
        let fd = &mut self.state.ps[insn.fd()];
        fd.ps0 = op(fb.ps0);
        fd.ps1 = op(fb.ps1);
        self.record_fp(insn);
    }

    fn merge(&mut self, insn: GuestInstruction, hi_a: bool, hi_b: bool) {
        let fa = self.state.ps[insn.fa()];
        let fb = self.state.ps[insn.fb()];
        let fd = &mut self.state.ps[insn.fd()];
        fd.ps0 = if hi_a { fa.ps1 } else { fa.ps0 };
        fd.ps1 = if hi_b { fb.ps1 } else { fb.ps0 };
        self.record_fp(insn);
    }

    fn pair_compare(&mut self, insn: GuestInstruction, upper: bool) {
        let (a, b) = if upper {
            (self.ps1(insn.fa()), self.ps1(insn.fb()))
        } else {
            (self.ps0(insn.fa()), self.ps0(insn.fb()))
        };
        let field = compare_fp(a, b);
        self.state.set_cr_field(insn.crfd(), field);
        self.set_fpcc(field);
    }
}

// ── Arithmetic ──────────────────────────────────────────

pub fn ps_add(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_ab(insn, |a, b| a + b);
}

pub fn ps_sub(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_ab(insn, |a, b| a - b);
}

pub fn ps_mul(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_ac(insn, |a, c| a * c);
}

pub fn ps_div(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_ab(insn, |a, b| a / b);
}

pub fn ps_madd(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_acb(insn, madd);
}

pub fn ps_msub(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_acb(insn, msub);
}

pub fn ps_nmadd(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_acb(insn, nmadd);
}

pub fn ps_nmsub(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_acb(insn, nmsub);
}

/// `ps0 = a0 + b1`, `ps1 = c1`.
pub fn ps_sum0(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r0 = ip.ps0(insn.fa()) + ip.ps1(insn.fb());
    let r1 = ip.ps1(insn.fc());
    ip.write_pair(insn, r0, r1);
}

/// `ps0 = c0`, `ps1 = a0 + b1`.
pub fn ps_sum1(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let r0 = ip.ps0(insn.fc());
    let r1 = ip.ps0(insn.fa()) + ip.ps1(insn.fb());
    ip.write_pair(insn, r0, r1);
}

fn muls(ip: &mut Interpreter<'_>, insn: GuestInstruction, upper: bool) {
    let c = if upper { ip.ps1(insn.fc()) } else { ip.ps0(insn.fc()) };
    let r0 = ip.ps0(insn.fa()) * c;
    let r1 = ip.ps1(insn.fa()) * c;
    ip.write_pair(insn, r0, r1);
}

fn madds(ip: &mut Interpreter<'_>, insn: GuestInstruction, upper: bool) {
    let c = if upper { ip.ps1(insn.fc()) } else { ip.ps0(insn.fc()) };
    let r0 = madd(ip.ps0(insn.fa()), c, ip.ps0(insn.fb()));
    let r1 = madd(ip.ps1(insn.fa()), c, ip.ps1(insn.fb()));
    ip.write_pair(insn, r0, r1);
}

pub fn ps_muls0(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    muls(ip, insn, false);
}

pub fn ps_muls1(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    muls(ip, insn, true);
}

pub fn ps_madds0(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    madds(ip, insn, false);
}

pub fn ps_madds1(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    madds(ip, insn, true);
}

pub fn ps_sel(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let (a, b, c) = (insn.fa(), insn.fb(), insn.fc());
    let r0 = if ip.ps0(a) >= 0.0 { ip.ps0(c) } else { ip.ps0(b) };
    let r1 = if ip.ps1(a) >= 0.0 { ip.ps1(c) } else { ip.ps1(b) };
    ip.write_pair(insn, r0, r1);
}

pub fn ps_res(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_b(insn, |b| 1.0 / b);
}

pub fn ps_rsqrte(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_b(insn, |b| 1.0 / b.sqrt());
}

// ── Moves ───────────────────────────────────────────────

pub fn ps_neg(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_bits(insn, |b| b ^ SIGN);
}

pub fn ps_abs(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_bits(insn, |b| b & !SIGN);
}

pub fn ps_nabs(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_bits(insn, |b| b | SIGN);
}

pub fn ps_mr(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_bits(insn, |b| b);
}

pub fn ps_merge00(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.merge(insn, false, false);
}

pub fn ps_merge01(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.merge(insn, false, true);
}

pub fn ps_merge10(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.merge(insn, true, false);
}

pub fn ps_merge11(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.merge(insn, true, true);
}

/// `ps_cmpu0` and `ps_cmpo0`.
pub fn ps_cmp0(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_compare(insn, false);
}

/// `ps_cmpu1` and `ps_cmpo1`.
pub fn ps_cmp1(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.pair_compare(insn, true);
}

// ── Quantization ────────────────────────────────────────

/// Element format selected by a GQR type field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum QuantType {
    Float,
    U8,
    U16,
    S8,
    S16,
}

impl QuantType {
    pub(crate) fn from_field(field: u32) -> Self {
        match field & 7 {
            4 => Self::U8,
            5 => Self::U16,
            6 => Self::S8,
            7 => Self::S16,
            _ => Self::Float,
        }
    }

    pub(crate) fn size(self) -> AccessSize {
        match self {
            Self::Float => AccessSize::U32,
            Self::U8 | Self::S8 => AccessSize::U8,
            Self::U16 | Self::S16 => AccessSize::U16,
        }
    }

    fn dequantize(self, raw: u64, scale: i32) -> f64 {
        let value = match self {
            Self::Float => return f64::from_bits(single_to_double_bits(raw as u32)),
            Self::U8 => raw as u8 as f64,
            Self::U16 => raw as u16 as f64,
            Self::S8 => raw as u8 as i8 as f64,
            Self::S16 => raw as u16 as i16 as f64,
        };
        value * (-(scale as f64)).exp2()
    }

    fn quantize(self, bits: u64, scale: i32) -> u64 {
        let value = f64::from_bits(bits);
        let (lo, hi) = match self {
            Self::Float => return double_to_single_bits(bits) as u64,
            Self::U8 => (0.0, u8::MAX as f64),
            Self::U16 => (0.0, u16::MAX as f64),
            Self::S8 => (i8::MIN as f64, i8::MAX as f64),
            Self::S16 => (i16::MIN as f64, i16::MAX as f64),
        };
        let scaled = (value * (scale as f64).exp2()).clamp(lo, hi);
        // NaN clamps to NaN; `as` maps it to zero.
        let int = scaled as i64;
        match self {
            Self::S8 => int as i8 as u8 as u64,
            Self::S16 => int as i16 as u16 as u64,
            _ => int as u64,
        }
    }
}

/// Sign-extend a 6-bit GQR scale.
fn scale_field(raw: u32) -> i32 {
    ((raw & 0x3F) as i32) << 26 >> 26
}

/// Load side of a GQR: `(type, scale)`.
pub(crate) fn gqr_load(gqr: u32) -> (QuantType, i32) {
    (QuantType::from_field(gqr >> 16), scale_field(gqr >> 24))
}

/// Store side of a GQR: `(type, scale)`.
pub(crate) fn gqr_store(gqr: u32) -> (QuantType, i32) {
    (QuantType::from_field(gqr), scale_field(gqr >> 8))
}

impl Interpreter<'_> {
    fn lsqe_enabled(&mut self) -> bool {
        if self.state.spr[spr::HID2] & HID2_LSQE == 0 {
            self.state.raise_program(program::ILLEGAL);
            false
        } else {
            true
        }
    }

    fn quantized_load(&mut self, insn: GuestInstruction, ea: u32, w: u32, gqr: u32, update: bool) {
        let (ty, scale) = gqr_load(self.state.spr[spr::GQR0 + gqr as usize]);
        let size = ty.size();
        let Some(raw0) = self.read(size, ea) else {
            return;
        };
        let ps1 = if w == 1 {
            1.0
        } else {
            let Some(raw1) = self.read(size, ea.wrapping_add(size.bytes())) else {
                return;
            };
            ty.dequantize(raw1, scale)
        };
        let fd = &mut self.state.ps[insn.fd()];
        fd.ps0 = ty.dequantize(raw0, scale).to_bits();
        fd.ps1 = ps1.to_bits();
        if update {
            self.set_gpr(insn.ra(), ea);
        }
    }

    fn quantized_store(&mut self, insn: GuestInstruction, ea: u32, w: u32, gqr: u32, update: bool) {
        let (ty, scale) = gqr_store(self.state.spr[spr::GQR0 + gqr as usize]);
        let size = ty.size();
        let fs = self.state.ps[insn.fs()];
        if !self.write(size, ty.quantize(fs.ps0, scale), ea) {
            return;
        }
        if w == 0 && !self.write(size, ty.quantize(fs.ps1, scale), ea.wrapping_add(size.bytes())) {
            return;
        }
        if update {
            self.set_gpr(insn.ra(), ea);
        }
    }

    /// `(rA|0) + simm12`.
    fn ea_psq(&self, insn: GuestInstruction) -> u32 {
        self.gpr_or_zero(insn.ra()).wrapping_add(insn.simm12() as u32)
    }

    fn ea_psqu(&self, insn: GuestInstruction) -> u32 {
        self.gpr(insn.ra()).wrapping_add(insn.simm12() as u32)
    }
}

pub fn psq_l(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    if ip.lsqe_enabled() {
        let ea = ip.ea_psq(insn);
        ip.quantized_load(insn, ea, insn.ps_w(), insn.ps_i(), false);
    }
}

pub fn psq_lu(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    if ip.lsqe_enabled() {
        let ea = ip.ea_psqu(insn);
        ip.quantized_load(insn, ea, insn.ps_w(), insn.ps_i(), true);
    }
}

pub fn psq_lx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let ea = ip.ea_x(insn);
    ip.quantized_load(insn, ea, insn.ps_wx(), insn.ps_ix(), false);
}

pub fn psq_lux(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let ea = ip.ea_xu(insn);
    ip.quantized_load(insn, ea, insn.ps_wx(), insn.ps_ix(), true);
}

pub fn psq_st(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    if ip.lsqe_enabled() {
        let ea = ip.ea_psq(insn);
        ip.quantized_store(insn, ea, insn.ps_w(), insn.ps_i(), false);
    }
}

pub fn psq_stu(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    if ip.lsqe_enabled() {
        let ea = ip.ea_psqu(insn);
        ip.quantized_store(insn, ea, insn.ps_w(), insn.ps_i(), true);
    }
}

pub fn psq_stx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let ea = ip.ea_x(insn);
    ip.quantized_store(insn, ea, insn.ps_wx(), insn.ps_ix(), false);
}

pub fn psq_stux(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let ea = ip.ea_xu(insn);
    ip.quantized_store(insn, ea, insn.ps_wx(), insn.ps_ix(), true);
}
