//! Integer and floating loads and stores, string and multiple-word
//! transfers, reservations and cache control.
//!
//! A faulting access raises DSI and leaves every register untouched;
//! update forms write rA only after the access succeeded.

use gekko_core::state::{double_to_single_bits, exception, program, single_to_double_bits, spr};
use gekko_core::{AccessSize, GuestInstruction};

use super::Interpreter;

const CACHE_LINE: u32 = 32;
/// HID2[LCE]: locked cache enabled.
const HID2_LCE: u32 = 0x1000_0000;
/// EAR[E]: external access enabled.
const EAR_ENABLE: u32 = 0x8000_0000;

/// How a loaded value is widened.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Ext {
    Zero,
    Sign,
    /// Little-endian load, zero extended.
    Reverse,
}

fn widen(value: u64, size: AccessSize, ext: Ext) -> u32 {
    match (ext, size) {
        (Ext::Sign, AccessSize::U16) => value as u16 as i16 as i32 as u32,
        (Ext::Sign, AccessSize::U8) => value as u8 as i8 as i32 as u32,
        (Ext::Reverse, AccessSize::U16) => (value as u16).swap_bytes() as u32,
        (Ext::Reverse, _) => (value as u32).swap_bytes(),
        _ => value as u32,
    }
}

// ── Helpers ─────────────────────────────────────────────

impl Interpreter<'_> {
    fn load_gpr(&mut self, insn: GuestInstruction, ea: u32, size: AccessSize, ext: Ext, update: bool) {
        let Some(value) = self.read(size, ea) else {
            return;
        };
        self.set_gpr(insn.rd(), widen(value, size, ext));
        if update {
            self.set_gpr(insn.ra(), ea);
        }
    }

    fn store_gpr(&mut self, insn: GuestInstruction, ea: u32, size: AccessSize, reverse: bool, update: bool) {
        let mut value = self.gpr(insn.rs());
        if reverse {
            value = match size {
                AccessSize::U16 => (value as u16).swap_bytes() as u32,
                _ => value.swap_bytes(),
            };
        }
        if self.write(size, value as u64, ea) && update {
            self.set_gpr(insn.ra(), ea);
        }
    }

    fn load_single(&mut self, insn: GuestInstruction, ea: u32, update: bool) {
        let Some(bits) = self.read(AccessSize::U32, ea) else {
            return;
        };
        let value = single_to_double_bits(bits as u32);
        let fd = &mut self.state.ps[insn.fd()];
        fd.ps0 = value;
        fd.ps1 = value;
        if update {
            self.set_gpr(insn.ra(), ea);
        }
    }

    fn load_double(&mut self, insn: GuestInstruction, ea: u32, update: bool) {
        let Some(bits) = self.read(AccessSize::U64, ea) else {
            return;
        };
        self.state.ps[insn.fd()].ps0 = bits;
        if update {
            self.set_gpr(insn.ra(), ea);
        }
    }

    fn store_single(&mut self, insn: GuestInstruction, ea: u32, update: bool) {
        let bits = double_to_single_bits(self.state.ps[insn.fs()].ps0);
        if self.write(AccessSize::U32, bits as u64, ea) && update {
            self.set_gpr(insn.ra(), ea);
        }
    }

    fn store_double(&mut self, insn: GuestInstruction, ea: u32, update: bool) {
        let bits = self.state.ps[insn.fs()].ps0;
        if self.write(AccessSize::U64, bits, ea) && update {
            self.set_gpr(insn.ra(), ea);
        }
    }

    fn zero_line(&mut self, ea: u32) {
        let base = ea & !(CACHE_LINE - 1);
        for off in (0..CACHE_LINE).step_by(8) {
            if !self.write(AccessSize::U64, 0, base + off) {
                return;
            }
        }
    }
}

// ── Integer loads ───────────────────────────────────────

pub fn lwz(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_d(insn), AccessSize::U32, Ext::Zero, false);
}

pub fn lwzu(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_du(insn), AccessSize::U32, Ext::Zero, true);
}

pub fn lbz(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_d(insn), AccessSize::U8, Ext::Zero, false);
}

pub fn lbzu(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_du(insn), AccessSize::U8, Ext::Zero, true);
}

pub fn lhz(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_d(insn), AccessSize::U16, Ext::Zero, false);
}

pub fn lhzu(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_du(insn), AccessSize::U16, Ext::Zero, true);
}

pub fn lha(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_d(insn), AccessSize::U16, Ext::Sign, false);
}

pub fn lhau(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_du(insn), AccessSize::U16, Ext::Sign, true);
}

pub fn lwzx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_x(insn), AccessSize::U32, Ext::Zero, false);
}

pub fn lwzux(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_xu(insn), AccessSize::U32, Ext::Zero, true);
}

pub fn lhzx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_x(insn), AccessSize::U16, Ext::Zero, false);
}

pub fn lhzux(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_xu(insn), AccessSize::U16, Ext::Zero, true);
}

pub fn lhax(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_x(insn), AccessSize::U16, Ext::Sign, false);
}

pub fn lhaux(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_xu(insn), AccessSize::U16, Ext::Sign, true);
}

pub fn lbzx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_x(insn), AccessSize::U8, Ext::Zero, false);
}

pub fn lbzux(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_xu(insn), AccessSize::U8, Ext::Zero, true);
}

pub fn lwbrx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_x(insn), AccessSize::U32, Ext::Reverse, false);
}

pub fn lhbrx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_gpr(insn, ip.ea_x(insn), AccessSize::U16, Ext::Reverse, false);
}

// ── Integer stores ──────────────────────────────────────

pub fn stw(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_gpr(insn, ip.ea_d(insn), AccessSize::U32, false, false);
}

pub fn stwu(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_gpr(insn, ip.ea_du(insn), AccessSize::U32, false, true);
}

pub fn sth(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_gpr(insn, ip.ea_d(insn), AccessSize::U16, false, false);
}

pub fn sthu(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_gpr(insn, ip.ea_du(insn), AccessSize::U16, false, true);
}

pub fn stb(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_gpr(insn, ip.ea_d(insn), AccessSize::U8, false, false);
}

pub fn stbu(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_gpr(insn, ip.ea_du(insn), AccessSize::U8, false, true);
}

pub fn stwx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_gpr(insn, ip.ea_x(insn), AccessSize::U32, false, false);
}

pub fn stwux(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_gpr(insn, ip.ea_xu(insn), AccessSize::U32, false, true);
}

pub fn sthx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_gpr(insn, ip.ea_x(insn), AccessSize::U16, false, false);
}

pub fn sthux(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_gpr(insn, ip.ea_xu(insn), AccessSize::U16, false, true);
}

pub fn stbx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_gpr(insn, ip.ea_x(insn), AccessSize::U8, false, false);
}

pub fn stbux(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_gpr(insn, ip.ea_xu(insn), AccessSize::U8, false, true);
}

pub fn stwbrx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_gpr(insn, ip.ea_x(insn), AccessSize::U32, true, false);
}

pub fn sthbrx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_gpr(insn, ip.ea_x(insn), AccessSize::U16, true, false);
}

// ── Multiple and string ─────────────────────────────────

pub fn lmw(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let mut ea = ip.ea_d(insn);
    for r in insn.rd()..32 {
        let Some(v) = ip.read(AccessSize::U32, ea) else {
            return;
        };
        ip.set_gpr(r, v as u32);
        ea = ea.wrapping_add(4);
    }
}

pub fn stmw(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let mut ea = ip.ea_d(insn);
    for r in insn.rs()..32 {
        if !ip.write(AccessSize::U32, ip.gpr(r) as u64, ea) {
            return;
        }
        ea = ea.wrapping_add(4);
    }
}

/// Load `n` bytes into consecutive registers starting at `rd`, four per
/// register, most significant byte first.
fn load_string(ip: &mut Interpreter<'_>, rd: usize, mut ea: u32, n: u32) {
    for i in 0..n {
        let reg = (rd + (i as usize >> 2)) & 31;
        let shift = 24 - 8 * (i & 3);
        let Some(byte) = ip.read(AccessSize::U8, ea) else {
            return;
        };
        if i & 3 == 0 {
            ip.set_gpr(reg, 0);
        }
        let v = ip.gpr(reg) | ((byte as u32) << shift);
        ip.set_gpr(reg, v);
        ea = ea.wrapping_add(1);
    }
}

fn store_string(ip: &mut Interpreter<'_>, rs: usize, mut ea: u32, n: u32) {
    for i in 0..n {
        let reg = (rs + (i as usize >> 2)) & 31;
        let shift = 24 - 8 * (i & 3);
        let byte = (ip.gpr(reg) >> shift) & 0xFF;
        if !ip.write(AccessSize::U8, byte as u64, ea) {
            return;
        }
        ea = ea.wrapping_add(1);
    }
}

fn string_len(nb: u32) -> u32 {
    if nb == 0 {
        32
    } else {
        nb
    }
}

pub fn lswi(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let ea = ip.gpr_or_zero(insn.ra());
    load_string(ip, insn.rd(), ea, string_len(insn.nb()));
}

pub fn lswx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let n = ip.state.xer_stringctrl as u32 & 0x7F;
    let ea = ip.ea_x(insn);
    load_string(ip, insn.rd(), ea, n);
}

pub fn stswi(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let ea = ip.gpr_or_zero(insn.ra());
    store_string(ip, insn.rs(), ea, string_len(insn.nb()));
}

pub fn stswx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let n = ip.state.xer_stringctrl as u32 & 0x7F;
    let ea = ip.ea_x(insn);
    store_string(ip, insn.rs(), ea, n);
}

// ── Reservations ────────────────────────────────────────

pub fn lwarx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let ea = ip.ea_x(insn);
    let Some(v) = ip.read(AccessSize::U32, ea) else {
        return;
    };
    ip.set_gpr(insn.rd(), v as u32);
    ip.state.reserve = true;
    ip.state.reserve_address = ea;
}

/// `stwcx.`: store only while the reservation for this address holds.
pub fn stwcxd(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let ea = ip.ea_x(insn);
    let so = ip.state.xer_so() as u8;
    if ip.state.reserve && ip.state.reserve_address == ea {
        if ip.write(AccessSize::U32, ip.gpr(insn.rs()) as u64, ea) {
            ip.state.reserve = false;
            ip.state.set_cr_field(0, gekko_core::state::cr::EQ | so);
        }
        return;
    }
    ip.state.set_cr_field(0, so);
}

// ── Float loads and stores ──────────────────────────────

pub fn lfs(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_single(insn, ip.ea_d(insn), false);
}

pub fn lfsu(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_single(insn, ip.ea_du(insn), true);
}

pub fn lfsx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_single(insn, ip.ea_x(insn), false);
}

pub fn lfsux(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_single(insn, ip.ea_xu(insn), true);
}

pub fn lfd(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_double(insn, ip.ea_d(insn), false);
}

pub fn lfdu(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_double(insn, ip.ea_du(insn), true);
}

pub fn lfdx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_double(insn, ip.ea_x(insn), false);
}

pub fn lfdux(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.load_double(insn, ip.ea_xu(insn), true);
}

pub fn stfs(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_single(insn, ip.ea_d(insn), false);
}

pub fn stfsu(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_single(insn, ip.ea_du(insn), true);
}

pub fn stfsx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_single(insn, ip.ea_x(insn), false);
}

pub fn stfsux(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_single(insn, ip.ea_xu(insn), true);
}

pub fn stfd(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_double(insn, ip.ea_d(insn), false);
}

pub fn stfdu(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_double(insn, ip.ea_du(insn), true);
}

pub fn stfdx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_double(insn, ip.ea_x(insn), false);
}

pub fn stfdux(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.store_double(insn, ip.ea_xu(insn), true);
}

/// Store the low word of the raw double bits.
pub fn stfiwx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let bits = ip.state.ps[insn.fs()].ps0 as u32;
    ip.write(AccessSize::U32, bits as u64, ip.ea_x(insn));
}

// ── Cache control ───────────────────────────────────────

pub fn dcbz(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    ip.zero_line(ip.ea_x(insn));
}

pub fn dcbz_l(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    if ip.state.spr[spr::HID2] & HID2_LCE == 0 {
        ip.state.raise_program(program::ILLEGAL);
        return;
    }
    ip.zero_line(ip.ea_x(insn));
}

pub fn dcbi(ip: &mut Interpreter<'_>, _insn: GuestInstruction) {
    ip.supervisor();
}

/// `dcbst`, `dcbf`, `dcbt`, `dcbtst`, `dcba`: no data cache is modeled.
pub fn cache_hint(_ip: &mut Interpreter<'_>, _insn: GuestInstruction) {}

pub fn icbi(ip: &mut Interpreter<'_>, _insn: GuestInstruction) {
    ip.state.invalidate_icache = true;
}

// ── External control ────────────────────────────────────

pub fn eciwx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let ea = ip.ea_x(insn);
    if ip.state.spr[spr::EAR] & EAR_ENABLE == 0 {
        ip.state.raise_dsi(ea, false);
        return;
    }
    if ea & 3 != 0 {
        ip.state.exceptions |= exception::ALIGNMENT;
        return;
    }
    ip.load_gpr(insn, ea, AccessSize::U32, Ext::Zero, false);
}

pub fn ecowx(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    let ea = ip.ea_x(insn);
    if ip.state.spr[spr::EAR] & EAR_ENABLE == 0 {
        ip.state.raise_dsi(ea, true);
        return;
    }
    if ea & 3 != 0 {
        ip.state.exceptions |= exception::ALIGNMENT;
        return;
    }
    ip.store_gpr(insn, ea, AccessSize::U32, false, false);
}
