//! Gekko instruction encoders and small harness helpers shared by the
//! test modules.

#![allow(dead_code)]

use gekko_core::{JitConfig, PpcState};
use gekko_exec::{Jit, Memory, RunExit};
use gekko_frontend::{gekko_table, Interpreter};

// ── Encoding helpers ──────────────────────────────────────────

pub fn d_form(op: u32, rd: u32, ra: u32, imm: i32) -> u32 {
    (op << 26) | (rd << 21) | (ra << 16) | (imm as u32 & 0xFFFF)
}

pub fn x_form(rd: u32, ra: u32, rb: u32, xo: u32, rc: bool) -> u32 {
    (31 << 26) | (rd << 21) | (ra << 16) | (rb << 11) | (xo << 1) | rc as u32
}

fn a_form(op: u32, fd: u32, fa: u32, fb: u32, fc: u32, xo: u32) -> u32 {
    (op << 26) | (fd << 21) | (fa << 16) | (fb << 11) | (fc << 6) | (xo << 1)
}

// ── Integer ───────────────────────────────────────────────────

pub fn addi(rd: u32, ra: u32, simm: i32) -> u32 {
    d_form(14, rd, ra, simm)
}
pub fn li(rd: u32, simm: i32) -> u32 {
    addi(rd, 0, simm)
}
pub fn addis(rd: u32, ra: u32, simm: i32) -> u32 {
    d_form(15, rd, ra, simm)
}
pub fn lis(rd: u32, simm: i32) -> u32 {
    addis(rd, 0, simm)
}
pub fn addic(rd: u32, ra: u32, simm: i32) -> u32 {
    d_form(12, rd, ra, simm)
}
pub fn addic_rc(rd: u32, ra: u32, simm: i32) -> u32 {
    d_form(13, rd, ra, simm)
}
pub fn subfic(rd: u32, ra: u32, simm: i32) -> u32 {
    d_form(8, rd, ra, simm)
}
pub fn mulli(rd: u32, ra: u32, simm: i32) -> u32 {
    d_form(7, rd, ra, simm)
}
pub fn ori(ra: u32, rs: u32, uimm: u32) -> u32 {
    d_form(24, rs, ra, uimm as i32)
}
pub fn oris(ra: u32, rs: u32, uimm: u32) -> u32 {
    d_form(25, rs, ra, uimm as i32)
}
pub fn xori(ra: u32, rs: u32, uimm: u32) -> u32 {
    d_form(26, rs, ra, uimm as i32)
}
pub fn andi_rc(ra: u32, rs: u32, uimm: u32) -> u32 {
    d_form(28, rs, ra, uimm as i32)
}
pub fn cmpwi(crf: u32, ra: u32, simm: i32) -> u32 {
    (11 << 26) | (crf << 23) | (ra << 16) | (simm as u32 & 0xFFFF)
}
pub fn cmplwi(crf: u32, ra: u32, uimm: u32) -> u32 {
    (10 << 26) | (crf << 23) | (ra << 16) | (uimm & 0xFFFF)
}
pub fn cmpw(crf: u32, ra: u32, rb: u32) -> u32 {
    x_form(crf << 2, ra, rb, 0, false)
}
pub fn cmplw(crf: u32, ra: u32, rb: u32) -> u32 {
    x_form(crf << 2, ra, rb, 32, false)
}
pub fn rlwinm(ra: u32, rs: u32, sh: u32, mb: u32, me: u32, rc: bool) -> u32 {
    (21 << 26) | (rs << 21) | (ra << 16) | (sh << 11) | (mb << 6) | (me << 1) | rc as u32
}
pub fn rlwimi(ra: u32, rs: u32, sh: u32, mb: u32, me: u32) -> u32 {
    (20 << 26) | (rs << 21) | (ra << 16) | (sh << 11) | (mb << 6) | (me << 1)
}

pub fn add(rd: u32, ra: u32, rb: u32, rc: bool) -> u32 {
    x_form(rd, ra, rb, 266, rc)
}
pub fn addc(rd: u32, ra: u32, rb: u32) -> u32 {
    x_form(rd, ra, rb, 10, false)
}
pub fn subf(rd: u32, ra: u32, rb: u32, rc: bool) -> u32 {
    x_form(rd, ra, rb, 40, rc)
}
pub fn subfc(rd: u32, ra: u32, rb: u32) -> u32 {
    x_form(rd, ra, rb, 8, false)
}
pub fn neg(rd: u32, ra: u32) -> u32 {
    x_form(rd, ra, 0, 104, false)
}
pub fn mullw(rd: u32, ra: u32, rb: u32) -> u32 {
    x_form(rd, ra, rb, 235, false)
}
pub fn mulhw(rd: u32, ra: u32, rb: u32) -> u32 {
    x_form(rd, ra, rb, 75, false)
}
pub fn mulhwu(rd: u32, ra: u32, rb: u32) -> u32 {
    x_form(rd, ra, rb, 11, false)
}
pub fn divw(rd: u32, ra: u32, rb: u32) -> u32 {
    x_form(rd, ra, rb, 491, false)
}
pub fn and(ra: u32, rs: u32, rb: u32, rc: bool) -> u32 {
    x_form(rs, ra, rb, 28, rc)
}
pub fn andc(ra: u32, rs: u32, rb: u32) -> u32 {
    x_form(rs, ra, rb, 60, false)
}
pub fn or(ra: u32, rs: u32, rb: u32, rc: bool) -> u32 {
    x_form(rs, ra, rb, 444, rc)
}
pub fn mr(ra: u32, rs: u32) -> u32 {
    or(ra, rs, rs, false)
}
pub fn xor(ra: u32, rs: u32, rb: u32) -> u32 {
    x_form(rs, ra, rb, 316, false)
}
pub fn nor(ra: u32, rs: u32, rb: u32) -> u32 {
    x_form(rs, ra, rb, 124, false)
}
pub fn eqv(ra: u32, rs: u32, rb: u32) -> u32 {
    x_form(rs, ra, rb, 284, false)
}
pub fn slw(ra: u32, rs: u32, rb: u32) -> u32 {
    x_form(rs, ra, rb, 24, false)
}
pub fn srw(ra: u32, rs: u32, rb: u32) -> u32 {
    x_form(rs, ra, rb, 536, false)
}
pub fn sraw(ra: u32, rs: u32, rb: u32) -> u32 {
    x_form(rs, ra, rb, 792, false)
}
pub fn srawi(ra: u32, rs: u32, sh: u32) -> u32 {
    x_form(rs, ra, sh, 824, false)
}
pub fn cntlzw(ra: u32, rs: u32) -> u32 {
    x_form(rs, ra, 0, 26, false)
}
pub fn extsb(ra: u32, rs: u32) -> u32 {
    x_form(rs, ra, 0, 954, false)
}
pub fn extsh(ra: u32, rs: u32) -> u32 {
    x_form(rs, ra, 0, 922, false)
}

/// SPR numbers are encoded with their halves swapped.
fn spr_field(spr: u32) -> u32 {
    ((spr & 0x1F) << 16) | ((spr >> 5) << 11)
}
pub fn mfspr(rd: u32, spr: u32) -> u32 {
    (31 << 26) | (rd << 21) | spr_field(spr) | (339 << 1)
}
pub fn mtspr(spr: u32, rs: u32) -> u32 {
    (31 << 26) | (rs << 21) | spr_field(spr) | (467 << 1)
}
pub fn mtlr(rs: u32) -> u32 {
    mtspr(8, rs)
}
pub fn mtctr(rs: u32) -> u32 {
    mtspr(9, rs)
}

// ── Load / store ──────────────────────────────────────────────

pub fn lwz(rd: u32, d: i32, ra: u32) -> u32 {
    d_form(32, rd, ra, d)
}
pub fn lwzu(rd: u32, d: i32, ra: u32) -> u32 {
    d_form(33, rd, ra, d)
}
pub fn lbz(rd: u32, d: i32, ra: u32) -> u32 {
    d_form(34, rd, ra, d)
}
pub fn lhz(rd: u32, d: i32, ra: u32) -> u32 {
    d_form(40, rd, ra, d)
}
pub fn lha(rd: u32, d: i32, ra: u32) -> u32 {
    d_form(42, rd, ra, d)
}
pub fn stw(rs: u32, d: i32, ra: u32) -> u32 {
    d_form(36, rs, ra, d)
}
pub fn stwu(rs: u32, d: i32, ra: u32) -> u32 {
    d_form(37, rs, ra, d)
}
pub fn stb(rs: u32, d: i32, ra: u32) -> u32 {
    d_form(38, rs, ra, d)
}
pub fn sth(rs: u32, d: i32, ra: u32) -> u32 {
    d_form(44, rs, ra, d)
}
pub fn lwzx(rd: u32, ra: u32, rb: u32) -> u32 {
    x_form(rd, ra, rb, 23, false)
}
pub fn stwx(rs: u32, ra: u32, rb: u32) -> u32 {
    x_form(rs, ra, rb, 151, false)
}
pub fn lfs(fd: u32, d: i32, ra: u32) -> u32 {
    d_form(48, fd, ra, d)
}
pub fn lfd(fd: u32, d: i32, ra: u32) -> u32 {
    d_form(50, fd, ra, d)
}
pub fn stfs(fs: u32, d: i32, ra: u32) -> u32 {
    d_form(52, fs, ra, d)
}
pub fn stfd(fs: u32, d: i32, ra: u32) -> u32 {
    d_form(54, fs, ra, d)
}

// ── Floating point ────────────────────────────────────────────

pub fn fadd(fd: u32, fa: u32, fb: u32) -> u32 {
    a_form(63, fd, fa, fb, 0, 21)
}
pub fn fsub(fd: u32, fa: u32, fb: u32) -> u32 {
    a_form(63, fd, fa, fb, 0, 20)
}
pub fn fmul(fd: u32, fa: u32, fc: u32) -> u32 {
    a_form(63, fd, fa, 0, fc, 25)
}
pub fn fdiv(fd: u32, fa: u32, fb: u32) -> u32 {
    a_form(63, fd, fa, fb, 0, 18)
}
pub fn fadds(fd: u32, fa: u32, fb: u32) -> u32 {
    a_form(59, fd, fa, fb, 0, 21)
}
pub fn fsubs(fd: u32, fa: u32, fb: u32) -> u32 {
    a_form(59, fd, fa, fb, 0, 20)
}
pub fn fmuls(fd: u32, fa: u32, fc: u32) -> u32 {
    a_form(59, fd, fa, 0, fc, 25)
}
pub fn fdivs(fd: u32, fa: u32, fb: u32) -> u32 {
    a_form(59, fd, fa, fb, 0, 18)
}
pub fn fabs(fd: u32, fb: u32) -> u32 {
    (63 << 26) | (fd << 21) | (fb << 11) | (264 << 1)
}
pub fn frsp(fd: u32, fb: u32) -> u32 {
    (63 << 26) | (fd << 21) | (fb << 11) | (12 << 1)
}
pub fn fmr(fd: u32, fb: u32) -> u32 {
    (63 << 26) | (fd << 21) | (fb << 11) | (72 << 1)
}
pub fn fneg(fd: u32, fb: u32) -> u32 {
    (63 << 26) | (fd << 21) | (fb << 11) | (40 << 1)
}

// ── Branches and system ──────────────────────────────────────

pub const BO_ALWAYS: u32 = 20;
pub const BO_TRUE: u32 = 12;
pub const BO_FALSE: u32 = 4;
pub const BO_DNZ: u32 = 16;
pub const CR0_LT: u32 = 0;
pub const CR0_GT: u32 = 1;
pub const CR0_EQ: u32 = 2;

pub fn b(disp: i32) -> u32 {
    (18 << 26) | (disp as u32 & 0x03FF_FFFC)
}
pub fn bl(disp: i32) -> u32 {
    b(disp) | 1
}
pub fn bc(bo: u32, bi: u32, disp: i32) -> u32 {
    (16 << 26) | (bo << 21) | (bi << 16) | (disp as u32 & 0xFFFC)
}
pub fn bdnz(disp: i32) -> u32 {
    bc(BO_DNZ, 0, disp)
}
pub fn bclr(bo: u32, bi: u32) -> u32 {
    (19 << 26) | (bo << 21) | (bi << 16) | (16 << 1)
}
pub fn bcctr(bo: u32, bi: u32) -> u32 {
    (19 << 26) | (bo << 21) | (bi << 16) | (528 << 1)
}
pub fn ba(target: u32) -> u32 {
    (18 << 26) | (target & 0x03FF_FFFC) | 2
}
pub fn bla(target: u32) -> u32 {
    ba(target) | 1
}
pub fn tw(to: u32, ra: u32, rb: u32) -> u32 {
    x_form(to, ra, rb, 4, false)
}
pub fn twi(to: u32, ra: u32, simm: i32) -> u32 {
    d_form(3, to, ra, simm)
}
pub const BLR: u32 = 0x4E80_0020;
pub const BCTR: u32 = 0x4E80_0420;
pub const SC: u32 = 0x4400_0002;
pub const NOP: u32 = 0x6000_0000;
/// `b .`, the idle loop every test program ends in.
pub const HANG: u32 = 0x4800_0000;

// ── Harness ───────────────────────────────────────────────────

/// Guest address test programs are loaded at.
pub const CODE_BASE: u32 = 0x8000_3000;
/// Scratch data area, far from the code.
pub const DATA_BASE: u32 = 0x8010_0000;

pub fn machine(program: &[u32]) -> (PpcState, Memory) {
    let mut mem = Memory::new(4 * 1024 * 1024);
    mem.load_words(CODE_BASE, program).unwrap();
    let mut state = PpcState::new();
    state.pc = CODE_BASE;
    state.npc = CODE_BASE;
    (state, mem)
}

/// Address of the `index`-th word of a program.
pub fn at(index: usize) -> u32 {
    CODE_BASE + 4 * index as u32
}

/// Interpret until `pc` reaches `stop` or `limit` instructions retire.
pub fn interpret_until(state: &mut PpcState, mem: &mut Memory, stop: u32, limit: usize) {
    let table = gekko_table().unwrap();
    for _ in 0..limit {
        if state.pc == stop {
            return;
        }
        Interpreter::new(state, mem).step(table);
    }
}

pub fn small_jit(config: JitConfig) -> Jit {
    Jit::new(
        config
            .with_code_buffer_size(1024 * 1024)
            .with_trampoline_region_size(64 * 1024)
            .with_min_code_space(16 * 1024)
            .with_timeslice_cycles(500),
    )
    .unwrap()
}

/// Run the JIT for `cycles` and expect the budget to run out.
pub fn run_jit(jit: &mut Jit, state: &mut PpcState, mem: &mut Memory, cycles: u64) {
    assert_eq!(jit.run(state, mem, cycles).unwrap(), RunExit::BudgetExhausted);
}
