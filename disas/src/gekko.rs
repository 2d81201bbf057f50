//! Gekko / Broadway disassembler.
//!
//! Covers the 32-bit PowerPC user and supervisor sets, the Gekko
//! paired-single extension and the 64-bit forms (flagged, never
//! executed by the core). Illegal patterns render as `(ill)` plus the
//! raw word; the all-zero word renders as the empty mnemonic with `---`.

use std::fmt;

use bitflags::bitflags;
use gekko_core::GuestMemory;

bitflags! {
    /// Properties of a rendered instruction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DisasFlags: u32 {
        /// The immediate operand was printed unsigned.
        const UNSIGNED = 1 << 0;
        /// Supervisor-only instruction.
        const SUPER = 1 << 1;
        /// 64-bit only; not implemented by the Gekko.
        const PPC64 = 1 << 2;
        const ILLEGAL = 1 << 3;
    }
}

/// Rendered instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembly {
    pub mnemonic: String,
    pub operands: String,
    pub flags: DisasFlags,
}

impl Disassembly {
    pub fn is_illegal(&self) -> bool {
        self.flags.contains(DisasFlags::ILLEGAL)
    }
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.mnemonic, self.operands)
    }
}

/// Sentinel shown by tooling for addresses with no readable memory.
pub const NO_MEMORY: &str = "(no memory)";

/// Render a big-endian instruction word located at `address`.
pub fn render(word: u32, address: u32) -> Disassembly {
    render_endian(word, address, true)
}

/// Render a word, byte-swapping it first when `big_endian` is false.
pub fn render_endian(word: u32, address: u32, big_endian: bool) -> Disassembly {
    let word = if big_endian { word } else { word.swap_bytes() };
    let mut d = Disasm {
        insn: word,
        addr: address,
        opcode: String::new(),
        operands: String::new(),
        flags: DisasFlags::empty(),
    };
    d.run();
    Disassembly {
        mnemonic: d.opcode,
        operands: d.operands,
        flags: d.flags,
    }
}

/// `mnemonic\toperands` form of [`render_endian`].
pub fn disassemble(word: u32, address: u32, big_endian: bool) -> String {
    render_endian(word, address, big_endian).to_string()
}

/// Fetch the word at `address` and render it. `None` when the fetch
/// fails.
pub fn render_at(mem: &mut dyn GuestMemory, address: u32) -> Option<(u32, Disassembly)> {
    let word = mem.fetch(address).ok()?;
    Some((word, render(word, address)))
}

/// Text form of [`render_at`], [`NO_MEMORY`] for unreadable addresses.
pub fn disassemble_at(mem: &mut dyn GuestMemory, address: u32) -> String {
    match render_at(mem, address) {
        Some((_, d)) => d.to_string(),
        None => NO_MEMORY.to_string(),
    }
}

// -- Name tables ---------------------------------------

const REG_NAMES: [&str; 32] = [
    "r0", "sp", "rtoc", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11",
    "r12", "r13", "r14", "r15", "r16", "r17", "r18", "r19", "r20", "r21", "r22",
    "r23", "r24", "r25", "r26", "r27", "r28", "r29", "r30", "r31",
];

const GPR_NAMES: [&str; 32] = [
    " r0", " r1 (sp)", " r2 (rtoc)", " r3", " r4", " r5", " r6", " r7", " r8",
    " r9", "r10", "r11", "r12", "r13", "r14", "r15", "r16", "r17", "r18", "r19",
    "r20", "r21", "r22", "r23", "r24", "r25", "r26", "r27", "r28", "r29", "r30",
    "r31",
];

const FPR_NAMES: [&str; 32] = [
    " f0", " f1", " f2", " f3", " f4", " f5", " f6", " f7", " f8", " f9", "f10",
    "f11", "f12", "f13", "f14", "f15", "f16", "f17", "f18", "f19", "f20", "f21",
    "f22", "f23", "f24", "f25", "f26", "f27", "f28", "f29", "f30", "f31",
];

/// Column-aligned GPR name for register views.
pub fn gpr_name(index: usize) -> Option<&'static str> {
    GPR_NAMES.get(index).copied()
}

pub fn fpr_name(index: usize) -> Option<&'static str> {
    FPR_NAMES.get(index).copied()
}

const TRAP_CONDITION: [Option<&str>; 32] = {
    let mut t = [None; 32];
    t[1] = Some("lgt");
    t[2] = Some("llt");
    t[4] = Some("eq");
    t[5] = Some("lge");
    t[6] = Some("lle");
    t[8] = Some("gt");
    t[12] = Some("ge");
    t[16] = Some("lt");
    t[20] = Some("le");
    t[24] = Some("ne");
    t
};

const CMP_NAME: [&str; 4] = ["cmpw", "cmpd", "cmplw", "cmpld"];
const PS_CMP_NAME: [&str; 4] = ["ps_cmpu0", "ps_cmpo0", "ps_cmpu1", "ps_cmpo1"];
const B_EXT: [&str; 4] = ["", "l", "a", "la"];
const B_CONDITION: [&str; 8] = ["ge", "le", "ne", "ns", "lt", "gt", "eq", "so"];
const B_DECR: [&str; 16] = [
    "nzf", "zf", "", "", "nzt", "zt", "", "", "nz", "z", "", "", "nz", "z", "", "",
];
const LDST_NAMES: [&str; 24] = [
    "lwz", "lwzu", "lbz", "lbzu", "stw", "stwu", "stb", "stbu", "lhz", "lhzu",
    "lha", "lhau", "sth", "sthu", "lmw", "stmw", "lfs", "lfsu", "lfd", "lfdu",
    "stfs", "stfsu", "stfd", "stfdu",
];

/// Name of a special purpose register, or its number.
pub fn spr_name(spr: u32) -> String {
    let name = match spr {
        1 => "XER",
        8 => "LR",
        9 => "CTR",
        18 => "DSISR",
        19 => "DAR",
        22 => "DEC",
        25 => "SDR1",
        26 => "SRR0",
        27 => "SRR1",
        268 => "TBLr",
        269 => "TBUr",
        272 => "SPRG0",
        273 => "SPRG1",
        274 => "SPRG2",
        275 => "SPRG3",
        282 => "EAR",
        284 => "TBLw",
        285 => "TBUw",
        287 => "PVR",
        528..=543 | 560..=575 => return bat_name(spr),
        912..=919 => return format!("GQR{}", spr - 912),
        920 => "HID2",
        921 => "WPAR",
        922 => "DMAU",
        923 => "DMAL",
        924 => "ECID_U",
        925 => "ECID_M",
        926 => "ECID_L",
        936 => "UMMCR0",
        937 => "UPMC1",
        938 => "UPMC2",
        939 => "USIA",
        940 => "UMMCR1",
        941 => "UPMC3",
        942 => "UPMC4",
        943 => "USDA",
        952 => "MMCR0",
        953 => "PMC1",
        954 => "PMC2",
        955 => "SIA",
        956 => "MMCR1",
        957 => "PMC3",
        958 => "PMC4",
        959 => "SDA",
        1008 => "HID0",
        1009 => "HID1",
        1010 => "IABR",
        1011 => "HID4",
        1012 => "TDCL",
        1013 => "DABR",
        1017 => "L2CR",
        1018 => "TDCH",
        1019 => "ICTC",
        1020 => "THRM1",
        1021 => "THRM2",
        1022 => "THRM3",
        _ => return spr.to_string(),
    };
    name.to_string()
}

/// IBAT0U..DBAT7L.
fn bat_name(spr: u32) -> String {
    let (base, hi) = if spr >= 560 { (560, 4) } else { (528, 0) };
    let off = spr - base;
    let kind = if off < 8 { "IBAT" } else { "DBAT" };
    let n = (off % 8) / 2 + hi;
    let half = if off % 2 == 0 { 'U' } else { 'L' };
    format!("{kind}{n}{half}")
}

// ── Field helpers ───────────────────────────────────────

const IDX_MASK: u32 = 0xFC00_0000;
const D_MASK: u32 = 0x03E0_0000;
const A_MASK: u32 = 0x001F_0000;
const B_MASK: u32 = 0x0000_F800;
const OE: u32 = 0x0000_0400;

#[inline]
fn idx(w: u32) -> u32 {
    w >> 26
}
#[inline]
fn fd(w: u32) -> u32 {
    (w & D_MASK) >> 21
}
#[inline]
fn fa(w: u32) -> u32 {
    (w & A_MASK) >> 16
}
#[inline]
fn fb(w: u32) -> u32 {
    (w & B_MASK) >> 11
}
#[inline]
fn fc(w: u32) -> u32 {
    (w >> 6) & 0x1F
}
#[inline]
fn fm(w: u32) -> u32 {
    (w >> 1) & 0x1F
}
#[inline]
fn crd(w: u32) -> u32 {
    (w >> 23) & 7
}
#[inline]
fn cra(w: u32) -> u32 {
    (w >> 18) & 7
}
#[inline]
fn fl(w: u32) -> u32 {
    (w >> 21) & 3
}
#[inline]
fn idx2(w: u32) -> u32 {
    (w >> 1) & 0x3FF
}

fn reg(r: u32) -> &'static str {
    REG_NAMES[(r & 0x1F) as usize]
}

fn swap_da(w: u32) -> u32 {
    (w & 0xFC00_FFFF) | ((w & A_MASK) << 5) | ((w & D_MASK) >> 5)
}

fn swap_ab(w: u32) -> u32 {
    (w & 0xFFE0_07FF) | ((w & B_MASK) << 5) | ((w & A_MASK) >> 5)
}

fn rotate_mask(r: u32, mb: u32, me: u32) -> u32 {
    let begin = u32::MAX >> mb;
    let end = if me < 31 { u32::MAX >> (me + 1) } else { 0 };
    let mut mask = begin ^ end;
    if me < mb {
        mask = !mask;
    }
    mask.rotate_right(r)
}

fn ldst_offs(val: u32) -> String {
    if val == 0 {
        "0".into()
    } else if val & 0x8000 != 0 {
        format!("-0x{:04X}", ((!val) & 0xFFFF) + 1)
    } else {
        format!("0x{val:04X}")
    }
}

fn psq_offs(val: u32) -> String {
    if val == 0 {
        "0".into()
    } else if val & 0x800 != 0 {
        format!("-0x{:04X}", ((!val) & 0xFFF) + 1)
    } else {
        format!("0x{val:04X}")
    }
}

/// Operand layout of [`Disasm::imm`].
#[derive(Clone, Copy, PartialEq, Eq)]
enum ImmForm {
    /// rD, rA, imm
    Dai,
    /// rA, rS, imm
    Asi,
    /// rA, imm (trap, cmpi)
    Ai,
    /// rD, imm (li)
    Di,
}

struct Disasm {
    insn: u32,
    addr: u32,
    opcode: String,
    operands: String,
    flags: DisasFlags,
}

impl Disasm {
    fn ill(&mut self, w: u32) {
        if w == 0 {
            self.opcode.clear();
            self.operands = "---".into();
        } else {
            self.opcode = "(ill)".into();
            self.operands = format!("{w:08x}");
            self.flags |= DisasFlags::ILLEGAL;
        }
    }

    fn imm(&mut self, w: u32, unsigned: bool, form: ImmForm, hex: bool) -> String {
        let mut i = (w & 0xFFFF) as i32;
        if !unsigned {
            if i > 0x7FFF {
                i -= 0x10000;
            }
        } else {
            self.flags |= DisasFlags::UNSIGNED;
        }
        match (form, hex) {
            (ImmForm::Dai, _) => format!("{}, {}, {}", reg(fd(w)), reg(fa(w)), i),
            (ImmForm::Asi, true) => format!("{}, {}, 0x{:04X}", reg(fa(w)), reg(fd(w)), i),
            (ImmForm::Asi, false) => format!("{}, {}, {}", reg(fa(w)), reg(fd(w)), i),
            (ImmForm::Ai, _) => format!("{}, {}", reg(fa(w)), i),
            (ImmForm::Di, true) => format!("{}, 0x{:04X}", reg(fd(w)), i),
            (ImmForm::Di, false) => format!("{}, {}", reg(fd(w)), i),
        }
    }

    fn ra_rb(w: u32) -> String {
        format!("{}, {}", reg(fa(w)), reg(fb(w)))
    }

    fn rd_ra_rb(w: u32, mask: u32) -> String {
        let mut parts = Vec::with_capacity(3);
        if mask & 4 != 0 {
            parts.push(reg(fd(w)));
        }
        if mask & 2 != 0 {
            parts.push(reg(fa(w)));
        }
        if mask & 1 != 0 {
            parts.push(reg(fb(w)));
        }
        parts.join(", ")
    }

    fn trapi(&mut self, w: u32, dword: bool) {
        let t = if dword { 'd' } else { 'w' };
        if dword {
            self.flags |= DisasFlags::PPC64;
        }
        match TRAP_CONDITION[fd(w) as usize] {
            Some(cnd) => self.opcode = format!("t{t}{cnd}i"),
            None => {
                self.opcode = format!("t{t}i");
                self.operands = format!("{}, ", fd(w));
            }
        }
        let imm = self.imm(w, false, ImmForm::Ai, false);
        self.operands.push_str(&imm);
    }

    fn cmpi(&mut self, w: u32, unsigned: bool) {
        let l = fl(w);
        if l >= 2 {
            return self.ill(w);
        }
        if l == 1 {
            self.flags |= DisasFlags::PPC64;
        }
        self.opcode = format!("{}i", CMP_NAME[unsigned as usize * 2 + l as usize]);
        let crf = crd(w);
        if crf != 0 {
            self.operands = format!("cr{crf}, ");
        }
        let imm = self.imm(w, unsigned, ImmForm::Ai, false);
        self.operands.push_str(&imm);
    }

    fn addi(&mut self, w: u32, ext: &str) {
        if w & 0x0800_0000 != 0 && fa(w) == 0 {
            self.opcode = format!("l{ext}");
            self.operands = if ext == "i" {
                self.imm(w, false, ImmForm::Di, false)
            } else {
                self.imm(w, true, ImmForm::Di, true)
            };
        } else {
            let negative = w & 0x8000 != 0;
            self.opcode = format!("{}{ext}", if negative { "sub" } else { "add" });
            let w = if negative { (w ^ 0xFFFF).wrapping_add(1) } else { w };
            self.operands = self.imm(w, true, ImmForm::Dai, false);
        }
    }

    fn branch(&mut self, w: u32, bname: &str, aform: usize, bdisp: i32) {
        let bo = fd(w);
        let bi = fa(w);
        let ext = B_EXT[aform * 2 + (w & 1) as usize];
        let mut y = bo & 1 != 0;
        if bdisp < 0 {
            y = !y;
        }
        let y = if y { '+' } else { '-' };

        if bo & 4 != 0 {
            if bo & 16 != 0 {
                if idx(w) != 16 {
                    self.opcode = format!("b{bname}{ext}");
                } else {
                    self.opcode = format!("bc{ext}");
                    self.operands = format!("{bo}, {bi}");
                }
            } else {
                let cond = B_CONDITION[(((bo & 8) >> 1) + (bi & 3)) as usize];
                self.opcode = format!("b{cond}{bname}{ext}{y}");
                if bi >= 4 {
                    self.operands = format!("cr{}", bi >> 2);
                }
            }
        } else {
            self.opcode = format!("bd{}{bname}{ext}{y}", B_DECR[(bo >> 1) as usize]);
            if bo & 16 == 0 {
                self.operands = bi.to_string();
            }
        }
    }

    fn bc(&mut self, w: u32) {
        let d = (w & 0xFFFC) as u16 as i16 as i32;
        let absolute = w & 2 != 0;
        self.branch(w, "", absolute as usize, d);
        let target = if absolute {
            d as u32
        } else {
            self.addr.wrapping_add(d as u32)
        };
        self.operands = format!("{} ->0x{target:08X}", self.operands);
    }

    fn bli(&mut self, w: u32) {
        let d = (((w & 0x03FF_FFFC) << 6) as i32 >> 6) as u32;
        self.opcode = format!("b{}", B_EXT[(w & 3) as usize]);
        let target = if w & 2 != 0 { d } else { self.addr.wrapping_add(d) };
        self.operands = format!("->0x{target:08X}");
    }

    fn mcrf(&mut self, w: u32, suffix: &str) {
        if w & 0x0063_F801 == 0 {
            self.opcode = format!("mcrf{suffix}");
            self.operands = format!("cr{}, cr{}", crd(w), cra(w));
        } else {
            self.ill(w);
        }
    }

    fn crop(&mut self, w: u32, n1: &str, n2: Option<&str>) {
        if w & 1 != 0 {
            return self.ill(w);
        }
        let (d, a, b) = (fd(w), fa(w), fb(w));
        match n2 {
            Some(n2) if a == b => {
                self.opcode = format!("cr{n2}");
                self.operands = format!("{d}, {a}");
            }
            _ => {
                self.opcode = format!("cr{n1}");
                self.operands = format!("{d}, {a}, {b}");
            }
        }
    }

    fn nooper(&mut self, w: u32, name: &str) {
        if w & (D_MASK | A_MASK | B_MASK | 1) != 0 {
            self.ill(w);
        } else {
            self.opcode = name.into();
        }
    }

    fn rlw(&mut self, w: u32, name: &str, reg_shift: bool) {
        let (s, a, bsh, mb, me) = (fd(w), fa(w), fb(w), fc(w), fm(w));
        self.opcode = format!("rlw{name}{}", if w & 1 != 0 { "." } else { "" });
        let r = if reg_shift { "r" } else { "" };
        self.operands = format!(
            "{}, {}, {r}{bsh}, {mb}, {me} ({:08x})",
            reg(a),
            reg(s),
            rotate_mask(bsh, mb, me)
        );
    }

    fn ori(&mut self, w: u32, name: &str) {
        self.opcode = name.into();
        self.operands = self.imm(w, true, ImmForm::Asi, true);
    }

    fn rld(&mut self, w: u32, name: &str, reg_shift: bool) {
        let (s, a) = (fd(w), fa(w));
        let bsh = if reg_shift { fb(w) } else { ((w & 2) << 4) + fb(w) };
        let m = (w & 0x7E0) >> 5;
        self.flags |= DisasFlags::PPC64;
        self.opcode = format!("rld{name}{}", if w & 1 != 0 { "." } else { "" });
        let r = if reg_shift { "r" } else { "" };
        self.operands = format!("{}, {}, {r}{bsh}, {m}", reg(a), reg(s));
    }

    fn cmp(&mut self, w: u32) {
        let l = fl(w);
        if l >= 2 {
            return self.ill(w);
        }
        if l == 1 {
            self.flags |= DisasFlags::PPC64;
        }
        let logical = if idx2(w) != 0 { 2 } else { 0 };
        self.opcode = CMP_NAME[logical + l as usize].into();
        let crf = crd(w);
        if crf != 0 {
            self.operands = format!("cr{crf},");
        }
        self.operands.push_str(&Self::ra_rb(w));
    }

    fn trap(&mut self, w: u32, dword: bool) {
        let to = fd(w);
        let t = if dword { 'd' } else { 'w' };
        if dword {
            self.flags |= DisasFlags::PPC64;
        }
        if let Some(cnd) = TRAP_CONDITION[to as usize] {
            self.opcode = format!("t{t}{cnd}");
            self.operands = Self::ra_rb(w);
        } else if to == 31 {
            if dword {
                self.opcode = "td".into();
                self.operands = "31,0,0".into();
            } else {
                self.opcode = "trap".into();
            }
        } else {
            self.ill(w);
        }
    }

    /// Standard `xxxx rD,rA,rB` form. `chkrc` is the required Rc value,
    /// or `None` when Rc selects the record form.
    fn dab(&mut self, w: u32, name: &str, mask: u32, smode: bool, chkoe: bool, chkrc: Option<u32>) {
        if let Some(rc) = chkrc {
            if w & 1 != rc {
                return self.ill(w);
            }
        }
        let w = if smode { swap_da(w) } else { w };
        let o = if chkoe && w & OE != 0 { "o" } else { "" };
        let dot = if chkrc.is_none() && w & 1 != 0 { "." } else { "" };
        self.opcode = format!("{name}{o}{dot}");
        self.operands = Self::rd_ra_rb(w, mask);
    }

    /// `xxxx rD,rA,NB` form.
    fn rrn(&mut self, w: u32, name: &str, smode: bool, chkrc: Option<u32>) {
        if let Some(rc) = chkrc {
            if w & 1 != rc {
                return self.ill(w);
            }
        }
        let w = if smode { swap_da(w) } else { w };
        let dot = if chkrc.is_none() && w & 1 != 0 { "." } else { "" };
        self.opcode = format!("{name}{dot}");
        self.operands = format!("{},{}", Self::rd_ra_rb(w, 6), fb(w));
    }

    fn mtcr(&mut self, w: u32) {
        if w & 0x0010_0801 != 0 {
            return self.ill(w);
        }
        let crm = (w & 0x000F_F000) >> 12;
        if crm == 0xFF {
            self.opcode = "mtcr".into();
            self.operands = reg(fd(w)).into();
        } else {
            self.opcode = "mtcrf".into();
            self.operands = format!("0x{crm:02x},{}", reg(fd(w)));
        }
    }

    fn msr(&mut self, w: u32, to_sr: bool) {
        if w & 0x0010_F801 != 0 {
            return self.ill(w);
        }
        let s = fd(w);
        let sr = (w & 0x000F_0000) >> 16;
        self.flags |= DisasFlags::SUPER;
        if to_sr {
            self.opcode = "mtsr".into();
            self.operands = format!("{sr}, {}", reg(s));
        } else {
            self.opcode = "mfsr".into();
            self.operands = format!("{}, {sr}", reg(s));
        }
    }

    fn mspr(&mut self, w: u32, to_spr: bool) {
        if w & 1 != 0 {
            return self.ill(w);
        }
        let d = fd(w);
        let spr = (fb(w) << 5) + fa(w);
        if spr & 0x10 != 0 {
            self.flags |= DisasFlags::SUPER;
        }
        let dir = if to_spr { 't' } else { 'f' };
        let short = match spr {
            1 => Some("xer"),
            8 => Some("lr"),
            9 => Some("ctr"),
            _ => None,
        };
        match short {
            Some(x) => {
                self.opcode = format!("m{dir}{x}");
                self.operands = reg(d).into();
            }
            None => {
                self.opcode = format!("m{dir}spr");
                self.operands = if to_spr {
                    format!("{}, {}", spr_name(spr), reg(d))
                } else {
                    format!("{}, {}", reg(d), spr_name(spr))
                };
            }
        }
    }

    fn mtb(&mut self, w: u32) {
        if w & 1 != 0 {
            return self.ill(w);
        }
        let tbr = (fb(w) << 5) + fa(w);
        self.operands = reg(fd(w)).into();
        let x = match tbr {
            268 => "l",
            269 => "u",
            _ => {
                self.operands.push_str(&format!(",{tbr}"));
                ""
            }
        };
        self.opcode = format!("mftb{x}");
    }

    fn sradi(&mut self, w: u32) {
        let bsh = ((w & 2) << 4) + fb(w);
        self.flags |= DisasFlags::PPC64;
        self.opcode = format!("sradi{}", if w & 1 != 0 { "." } else { "" });
        self.operands = format!("{}, {}, {bsh}", reg(fa(w)), reg(fd(w)));
    }

    fn ldst(&mut self, w: u32, name: &str, float: bool) {
        let (s, a, d) = (fd(w), fa(w), w & 0xFFFF);
        self.opcode = name.into();
        self.operands = if float {
            format!("f{s}, {} ({})", ldst_offs(d), reg(a))
        } else {
            format!("{}, {} ({})", reg(s), ldst_offs(d), reg(a))
        };
    }

    /// Floating point `xxxx fD,fA,fC,fB`. Mask bit 8 ignores unused
    /// fields instead of flagging them.
    fn fdabc(&mut self, w: u32, name: &str, mask: u32) {
        let mut err = 0;
        self.opcode = format!("f{name}{}", if w & 1 != 0 { "." } else { "" });
        self.operands = format!("f{}", fd(w));
        if mask & 4 != 0 {
            self.operands.push_str(&format!(", f{}", fa(w)));
        } else if mask & 8 == 0 {
            err |= fa(w);
        }
        if mask & 2 != 0 {
            self.operands.push_str(&format!(", f{}", fc(w)));
        } else if mask & 8 == 0 {
            err |= fc(w);
        }
        if mask & 1 != 0 {
            self.operands.push_str(&format!(", f{}", fb(w)));
        } else if mask & 8 == 0 {
            err |= fb(w);
        }
        if err != 0 {
            self.ill(w);
        }
    }

    fn fmr(&mut self, w: u32) {
        self.opcode = format!("fmr{}", if w & 1 != 0 { "." } else { "" });
        self.operands = format!("f{}, f{}", fd(w), fb(w));
    }

    fn fdab(&mut self, w: u32, name: &str) {
        self.opcode = name.into();
        self.operands = format!("f{}, {}, {}", fd(w), reg(fa(w)), reg(fb(w)));
    }

    fn fcmp(&mut self, w: u32, c: char) {
        if w & 0x0060_0001 != 0 {
            return self.ill(w);
        }
        self.opcode = format!("fcmp{c}");
        self.operands = format!("cr{}, f{}, f{}", crd(w), fa(w), fb(w));
    }

    fn mtfsb(&mut self, w: u32, n: u32) {
        if w & (A_MASK | B_MASK) != 0 {
            return self.ill(w);
        }
        self.opcode = format!("mtfsb{n}{}", if w & 1 != 0 { "." } else { "" });
        self.operands = fd(w).to_string();
    }

    // -- Paired singles ------------------------------------

    fn ps(&mut self, w: u32) {
        let (d, a, b, c) = (fd(w), fa(w), fb(w), fc(w));
        let (wx, ix) = ((w >> 10) & 1, (w >> 7) & 7);
        let (op, ops): (&str, String) = match (w >> 1) & 0x1F {
            6 => (
                if w & 0x40 != 0 { "psq_lux" } else { "psq_lx" },
                format!("p{d}, r{a}, r{b}, {wx}, qr{ix}"),
            ),
            7 => (
                if w & 0x40 != 0 { "psq_stux" } else { "psq_stx" },
                format!("p{d}, r{a}, r{b}, {wx}, qr{ix}"),
            ),
            18 => ("ps_div", format!("p{d}, p{a}/p{b}")),
            20 => ("ps_sub", format!("p{d}, p{a}-p{b}")),
            21 => ("ps_add", format!("p{d}, p{a}+p{b}")),
            23 => ("ps_sel", format!("p{d}>=0?p{a}:p{c}")),
            24 => ("ps_res", format!("p{d}, (1/p{b})")),
            25 => ("ps_mul", format!("p{d}, p{a}*p{c}")),
            26 => ("ps_rsqrte", format!("p{d}, p{b}")),
            28 => ("ps_msub", format!("p{d}, p{a}*p{c}-p{b}")),
            29 => ("ps_madd", format!("p{d}, p{a}*p{c}+p{b}")),
            30 => ("ps_nmsub", format!("p{d}, -(p{a}*p{c}-p{b})")),
            31 => ("ps_nmadd", format!("p{d}, -(p{a}*p{c}+p{b})")),
            10 => ("ps_sum0", format!("p{d}, 0=p{a}+p{b}, 1=p{c}")),
            11 => ("ps_sum1", format!("p{d}, 0=p{c}, 1=p{a}+p{b}")),
            12 => ("ps_muls0", format!("p{d}, p{a}*p{c}[0]")),
            13 => ("ps_muls1", format!("p{d}, p{a}*p{c}[1]")),
            14 => ("ps_madds0", format!("p{d}, p{a}*p{c}[0]+p{b}")),
            15 => ("ps_madds1", format!("p{d}, p{a}*p{c}[1]+p{b}")),
            _ => return self.ps_xo10(w),
        };
        self.opcode = op.into();
        self.operands = ops;
    }

    fn ps_xo10(&mut self, w: u32) {
        let (d, a, b) = (fd(w), fa(w), fb(w));
        let (op, ops): (&str, String) = match idx2(w) {
            40 => ("ps_neg", format!("p{d}, -p{b}")),
            72 => ("ps_mr", format!("p{d}, p{b}")),
            136 => ("ps_nabs", format!("p{d}, -|p{b}|")),
            264 => ("ps_abs", format!("p{d}, |p{b}|")),
            0 | 32 | 64 | 96 => {
                let crf = crd(w);
                let prefix = if crf != 0 { format!("cr{crf}, ") } else { String::new() };
                (PS_CMP_NAME[((w >> 6) & 3) as usize], format!("{prefix}p{a}, p{b}"))
            }
            528 => ("ps_merge00", format!("p{d}, p{a}[0], p{b}[0]")),
            560 => ("ps_merge01", format!("p{d}, p{a}[0], p{b}[1]")),
            592 => ("ps_merge10", format!("p{d}, p{a}[1], p{b}[0]")),
            624 => ("ps_merge11", format!("p{d}, p{a}[1], p{b}[1]")),
            1014 => {
                if w & D_MASK != 0 {
                    self.ill(w);
                } else {
                    self.dab(w, "dcbz_l", 3, false, false, Some(0));
                }
                return;
            }
            _ => {
                self.opcode = format!("ps_{}", (w >> 1) & 0x1F);
                self.operands = "---".into();
                return;
            }
        };
        self.opcode = op.into();
        self.operands = ops;
    }

    fn ps_mem(&mut self, w: u32) {
        let name = match idx(w) {
            56 => "psq_l",
            57 => "psq_lu",
            60 => "psq_st",
            _ => "psq_stu",
        };
        let (s, a) = (fd(w), fa(w));
        let (wb, i) = ((w >> 15) & 1, (w >> 12) & 7);
        self.opcode = name.into();
        self.operands = format!("p{s}, {}(r{a}), {wb}, qr{i}", psq_offs(w & 0xFFF));
    }

    // -- Top level -----------------------------------------

    fn run(&mut self) {
        let w = self.insn;
        match idx(w) {
            2 => self.trapi(w, true),
            3 => self.trapi(w, false),
            4 => self.ps(w),
            56 | 57 | 60 | 61 => self.ps_mem(w),
            7 => {
                self.opcode = "mulli".into();
                self.operands = self.imm(w, false, ImmForm::Dai, false);
            }
            8 => {
                self.opcode = "subfic".into();
                self.operands = self.imm(w, false, ImmForm::Dai, false);
            }
            10 => self.cmpi(w, true),
            11 => self.cmpi(w, false),
            12 => self.addi(w, "ic"),
            13 => self.addi(w, "ic."),
            14 => self.addi(w, "i"),
            15 => self.addi(w, "is"),
            16 => self.bc(w),
            17 => {
                if w & !IDX_MASK == 2 {
                    self.opcode = "sc".into();
                } else {
                    self.ill(w);
                }
            }
            18 => self.bli(w),
            19 => self.table19(w),
            20 => self.rlw(w, "imi", false),
            21 => self.rlw(w, "inm", false),
            23 => self.rlw(w, "nm", true),
            24 => {
                if w & !IDX_MASK != 0 {
                    self.ori(w, "ori");
                } else {
                    self.opcode = "nop".into();
                }
            }
            25 => self.ori(w, "oris"),
            26 => self.ori(w, "xori"),
            27 => self.ori(w, "xoris"),
            28 => self.ori(w, "andi."),
            29 => self.ori(w, "andis."),
            30 => match (w >> 2) & 7 {
                0 => self.rld(w, "icl", false),
                1 => self.rld(w, "icr", false),
                2 => self.rld(w, "ic", false),
                3 => self.rld(w, "imi", false),
                4 => self.rld(w, if w & 2 != 0 { "cl" } else { "cr" }, true),
                _ => self.ill(w),
            },
            31 => self.table31(w),
            n @ 32..=47 => self.ldst(w, LDST_NAMES[(n - 32) as usize], false),
            n @ 48..=55 => self.ldst(w, LDST_NAMES[(n - 32) as usize], true),
            58 => {
                let name = match w & 3 {
                    0 => "ld",
                    1 => "ldu",
                    2 => "lwa",
                    _ => return self.ill(w),
                };
                self.flags |= DisasFlags::PPC64;
                self.ldst(w & !3, name, false);
            }
            59 => self.table59(w),
            62 => {
                let name = match w & 3 {
                    0 => "std",
                    1 => "stdu",
                    _ => return self.ill(w),
                };
                self.flags |= DisasFlags::PPC64;
                self.ldst(w & !3, name, false);
            }
            63 => self.table63(w),
            _ => self.ill(w),
        }
    }

    fn table19(&mut self, w: u32) {
        match idx2(w) {
            0 => self.mcrf(w, ""),
            16 => self.branch(w, "lr", 0, 0),
            33 => self.crop(w, "nor", Some("not")),
            50 => {
                self.flags |= DisasFlags::SUPER;
                self.nooper(w, "rfi");
            }
            129 => self.crop(w, "andc", None),
            150 => self.nooper(w, "isync"),
            193 => self.crop(w, "xor", Some("clr")),
            225 => self.crop(w, "nand", None),
            257 => self.crop(w, "and", None),
            289 => self.crop(w, "eqv", Some("set")),
            417 => self.crop(w, "orc", None),
            449 => self.crop(w, "or", Some("move")),
            528 => self.branch(w, "ctr", 0, 0),
            _ => self.ill(w),
        }
    }

    fn table31(&mut self, w: u32) {
        const RC: Option<u32> = None;
        const NO_RC: Option<u32> = Some(0);
        let x = idx2(w);
        // OE forms share the handler of their base opcode.
        let base = if x & 0x200 != 0 && matches!(x & 0x1FF, 8 | 10 | 40 | 104 | 136 | 138 | 200
            | 202 | 232 | 233 | 234 | 235 | 266 | 457 | 459 | 489 | 491)
        {
            x & 0x1FF
        } else {
            x
        };
        let b_set = w & B_MASK != 0;
        let d_set = w & D_MASK != 0;
        let ab_set = w & (A_MASK | B_MASK) != 0;
        match base {
            0 | 32 => {
                if w & 1 != 0 {
                    self.ill(w)
                } else {
                    self.cmp(w)
                }
            }
            4 => {
                if w & 1 != 0 {
                    self.ill(w)
                } else {
                    self.trap(w, false)
                }
            }
            8 => self.dab(swap_ab(w), "subc", 7, false, true, RC),
            9 => self.dab64(w, "mulhdu", 7, false, false, RC),
            10 => self.dab(w, "addc", 7, false, true, RC),
            11 => self.dab(w, "mulhwu", 7, false, false, RC),
            19 if ab_set => self.ill(w),
            19 => self.dab(w, "mfcr", 4, false, false, NO_RC),
            20 => self.dab(w, "lwarx", 7, false, false, NO_RC),
            21 => self.dab64(w, "ldx", 7, false, false, NO_RC),
            23 => self.dab(w, "lwzx", 7, false, false, NO_RC),
            24 => self.dab(w, "slw", 7, true, false, RC),
            26 if b_set => self.ill(w),
            26 => self.dab(w, "cntlzw", 6, true, false, RC),
            27 => self.dab64(w, "sld", 7, true, false, RC),
            28 => self.dab(w, "and", 7, true, false, RC),
            40 => self.dab(swap_ab(w), "sub", 7, false, true, RC),
            53 => self.dab64(w, "ldux", 7, false, false, NO_RC),
            54 if d_set => self.ill(w),
            54 => self.dab(w, "dcbst", 3, false, false, NO_RC),
            55 => self.dab(w, "lwzux", 7, false, false, NO_RC),
            58 if b_set => self.ill(w),
            58 => self.dab64(w, "cntlzd", 6, true, false, RC),
            60 => self.dab(w, "andc", 7, true, false, RC),
            68 => self.trap(w, true),
            73 => self.dab64(w, "mulhd", 7, false, false, RC),
            75 => self.dab(w, "mulhw", 7, false, false, RC),
            83 if ab_set => self.ill(w),
            83 => {
                self.flags |= DisasFlags::SUPER;
                self.dab(w, "mfmsr", 4, false, false, NO_RC)
            }
            84 => self.dab64(w, "ldarx", 7, false, false, NO_RC),
            86 if d_set => self.ill(w),
            86 => self.dab(w, "dcbf", 3, false, false, NO_RC),
            87 => self.dab(w, "lbzx", 7, false, false, NO_RC),
            104 if b_set => self.ill(w),
            104 => self.dab(w, "neg", 6, false, true, RC),
            119 => self.dab(w, "lbzux", 7, false, false, NO_RC),
            124 if fd(w) == fb(w) => self.dab(w, "not", 6, true, false, RC),
            124 => self.dab(w, "nor", 7, true, false, RC),
            136 => self.dab(w, "subfe", 7, false, true, RC),
            138 => self.dab(w, "adde", 7, false, true, RC),
            144 => self.mtcr(w),
            146 if ab_set => self.ill(w),
            146 => {
                self.flags |= DisasFlags::SUPER;
                self.dab(w, "mtmsr", 4, false, false, NO_RC)
            }
            149 => self.dab64(w, "stdx", 7, false, false, NO_RC),
            150 => self.dab(w, "stwcx.", 7, false, false, Some(1)),
            151 => self.dab(w, "stwx", 7, false, false, NO_RC),
            181 => self.dab64(w, "stdux", 7, false, false, NO_RC),
            183 => self.dab(w, "stwux", 7, false, false, NO_RC),
            200 if b_set => self.ill(w),
            200 => self.dab(w, "subfze", 6, false, true, RC),
            202 if b_set => self.ill(w),
            202 => self.dab(w, "addze", 6, false, true, RC),
            210 => self.msr(w, true),
            214 => self.dab64(w, "stdcx.", 7, false, false, Some(1)),
            215 => self.dab(w, "stbx", 7, false, false, NO_RC),
            232 if b_set => self.ill(w),
            232 => self.dab(w, "subfme", 6, false, true, RC),
            233 => self.dab64(w, "mulld", 7, false, true, RC),
            234 if b_set => self.ill(w),
            234 => self.dab(w, "addme", 6, false, true, RC),
            235 => self.dab(w, "mullw", 7, false, true, RC),
            242 if w & A_MASK != 0 => self.ill(w),
            242 => {
                self.flags |= DisasFlags::SUPER;
                self.dab(w, "mtsrin", 5, false, false, NO_RC)
            }
            246 if d_set => self.ill(w),
            246 => self.dab(w, "dcbtst", 3, false, false, NO_RC),
            247 => self.dab(w, "stbux", 7, false, false, NO_RC),
            266 => self.dab(w, "add", 7, false, true, RC),
            278 if d_set => self.ill(w),
            278 => self.dab(w, "dcbt", 3, false, false, NO_RC),
            279 => self.dab(w, "lhzx", 7, false, false, NO_RC),
            284 => self.dab(w, "eqv", 7, true, false, RC),
            306 if w & (D_MASK | A_MASK) != 0 => self.ill(w),
            306 => {
                self.flags |= DisasFlags::SUPER;
                self.dab(w, "tlbie", 1, false, false, NO_RC)
            }
            310 => self.dab(w, "eciwx", 7, false, false, NO_RC),
            311 => self.dab(w, "lhzux", 7, false, false, NO_RC),
            316 => self.dab(w, "xor", 7, true, false, RC),
            339 => self.mspr(w, false),
            341 => self.dab64(w, "lwax", 7, false, false, NO_RC),
            343 => self.dab(w, "lhax", 7, false, false, NO_RC),
            370 => {
                self.flags |= DisasFlags::SUPER;
                self.nooper(w, "tlbia")
            }
            371 => self.mtb(w),
            373 => self.dab64(w, "lwaux", 7, false, false, NO_RC),
            375 => self.dab(w, "lhaux", 7, false, false, NO_RC),
            407 => self.dab(w, "sthx", 7, false, false, NO_RC),
            412 => self.dab(w, "orc", 7, true, false, RC),
            413 => self.sradi(w),
            434 if w & (D_MASK | A_MASK) != 0 => self.ill(w),
            434 => {
                self.flags |= DisasFlags::SUPER;
                self.dab64(w, "slbie", 1, false, false, NO_RC)
            }
            438 => self.dab(w, "ecowx", 7, false, false, NO_RC),
            439 => self.dab(w, "sthux", 7, false, false, NO_RC),
            444 if fd(w) == fb(w) => self.dab(w, "mr", 6, true, false, RC),
            444 => self.dab(w, "or", 7, true, false, RC),
            457 => self.dab64(w, "divdu", 7, false, true, RC),
            459 => self.dab(w, "divwu", 7, false, true, RC),
            467 => self.mspr(w, true),
            470 if d_set => self.ill(w),
            470 => {
                self.flags |= DisasFlags::SUPER;
                self.dab(w, "dcbi", 3, false, false, NO_RC)
            }
            476 => self.dab(w, "nand", 7, true, false, RC),
            489 => self.dab64(w, "divd", 7, false, true, RC),
            491 => self.dab(w, "divw", 7, false, true, RC),
            498 => {
                self.flags |= DisasFlags::SUPER | DisasFlags::PPC64;
                self.nooper(w, "slbia")
            }
            512 => {
                if w & 0x007F_F801 != 0 {
                    self.ill(w);
                } else {
                    self.opcode = "mcrxr".into();
                    self.operands = format!("cr{}", crd(w));
                }
            }
            533 => self.dab(w, "lswx", 7, false, false, NO_RC),
            534 => self.dab(w, "lwbrx", 7, false, false, NO_RC),
            535 => self.fdab(w, "lfsx"),
            536 => self.dab(w, "srw", 7, true, false, RC),
            539 => self.dab64(w, "srd", 7, true, false, RC),
            566 => {
                self.flags |= DisasFlags::SUPER;
                self.nooper(w, "tlbsync")
            }
            567 => self.fdab(w, "lfsux"),
            595 => self.msr(w, false),
            597 => self.rrn(w, "lswi", false, NO_RC),
            598 => self.nooper(w, "sync"),
            599 => self.fdab(w, "lfdx"),
            631 => self.fdab(w, "lfdux"),
            659 if w & A_MASK != 0 => self.ill(w),
            659 => {
                self.flags |= DisasFlags::SUPER;
                self.dab(w, "mfsrin", 5, false, false, NO_RC)
            }
            661 => self.dab(w, "stswx", 7, false, false, NO_RC),
            662 => self.dab(w, "stwbrx", 7, false, false, NO_RC),
            663 => self.fdab(w, "stfsx"),
            695 => self.fdab(w, "stfsux"),
            725 => self.rrn(w, "stswi", false, NO_RC),
            727 => self.fdab(w, "stfdx"),
            759 => self.fdab(w, "stfdux"),
            790 => self.dab(w, "lhbrx", 7, false, false, NO_RC),
            792 => self.dab(w, "sraw", 7, true, false, RC),
            794 => self.dab64(w, "srad", 7, true, false, RC),
            824 => self.rrn(w, "srawi", true, RC),
            854 => self.nooper(w, "eieio"),
            918 => self.dab(w, "sthbrx", 7, false, false, NO_RC),
            922 if b_set => self.ill(w),
            922 => self.dab(w, "extsh", 6, true, false, RC),
            954 if b_set => self.ill(w),
            954 => self.dab(w, "extsb", 6, true, false, RC),
            982 if d_set => self.ill(w),
            982 => self.dab(w, "icbi", 3, false, false, NO_RC),
            983 => self.fdab(w, "stfiwx"),
            986 if b_set => self.ill(w),
            986 => self.dab64(w, "extsw", 6, true, false, RC),
            1014 if d_set => self.ill(w),
            1014 => self.dab(w, "dcbz", 3, false, false, NO_RC),
            _ => self.ill(w),
        }
    }

    fn dab64(&mut self, w: u32, name: &str, mask: u32, smode: bool, chkoe: bool, chkrc: Option<u32>) {
        self.flags |= DisasFlags::PPC64;
        self.dab(w, name, mask, smode, chkoe, chkrc);
    }

    fn table59(&mut self, w: u32) {
        match w & 0x3E {
            36 => self.fdabc(w, "divs", 5),
            40 => self.fdabc(w, "subs", 5),
            42 => self.fdabc(w, "adds", 5),
            44 => self.fdabc(w, "sqrts", 1),
            48 => self.fdabc(w, "res", 1),
            50 => self.fdabc(w, "muls", 6),
            56 => self.fdabc(w, "msubs", 7),
            58 => self.fdabc(w, "madds", 7),
            60 => self.fdabc(w, "nmsubs", 7),
            62 => self.fdabc(w, "nmadds", 7),
            _ => self.ill(w),
        }
    }

    fn table63(&mut self, w: u32) {
        if w & 32 != 0 {
            match w & 0x1E {
                4 => self.fdabc(w, "div", 5),
                8 => self.fdabc(w, "sub", 5),
                10 => self.fdabc(w, "add", 5),
                12 => self.fdabc(w, "sqrt", 1),
                14 => self.fdabc(w, "sel", 7),
                18 => self.fdabc(w, "mul", 6),
                20 => self.fdabc(w, "rsqrte", 1),
                24 => self.fdabc(w, "msub", 7),
                26 => self.fdabc(w, "madd", 7),
                28 => self.fdabc(w, "nmsub", 7),
                30 => self.fdabc(w, "nmadd", 7),
                _ => self.ill(w),
            }
            return;
        }
        match idx2(w) {
            0 => self.fcmp(w, 'u'),
            12 => self.fdabc(w, "rsp", 1),
            14 => self.fdabc(w, "ctiw", 1),
            15 => self.fdabc(w, "ctiwz", 1),
            32 => self.fcmp(w, 'o'),
            38 => self.mtfsb(w, 1),
            40 => self.fdabc(w, "neg", 9),
            64 => self.mcrf(w, "s"),
            70 => self.mtfsb(w, 0),
            72 => self.fmr(w),
            134 => {
                if w & 0x006F_0800 == 0 {
                    self.opcode = format!("mtfsfi{}", if w & 1 != 0 { "." } else { "" });
                    self.operands = format!("cr{},{}", crd(w), (w & 0xF000) >> 12);
                } else {
                    self.ill(w);
                }
            }
            136 => self.fdabc(w, "nabs", 9),
            264 => self.fdabc(w, "abs", 9),
            583 => {
                if w & (A_MASK | B_MASK) != 0 {
                    self.ill(w);
                } else {
                    self.dab(w, "mffs", 4, false, false, None);
                }
            }
            711 => {
                if w & 0x0201_0000 == 0 {
                    self.opcode = format!("mtfsf{}", if w & 1 != 0 { "." } else { "" });
                    self.operands = format!("0x{:x}, f{}", (w >> 17) & 0xFF, fb(w));
                } else {
                    self.ill(w);
                }
            }
            814 | 815 | 846 => {
                self.flags |= DisasFlags::PPC64;
                let name = match idx2(w) {
                    814 => "ctid",
                    815 => "ctidz",
                    _ => "cfid",
                };
                self.fdabc(w, name, 9);
            }
            _ => self.ill(w),
        }
    }
}
