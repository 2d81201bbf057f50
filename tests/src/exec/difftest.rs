//! Interpreter versus JIT: random programs must leave identical state.
//!
//! Programs mix integer, floating point, load/store and forward branch
//! instructions. Under memcheck some accesses hit unmapped memory; every
//! exception vector holds an idle loop so both runs come to rest.

use gekko_core::state::{msr, spr, vector};
use gekko_core::{GuestMemory, JitConfig, PpcState};
use gekko_exec::Memory;
use gekko_frontend::{gekko_table, Interpreter};
use proptest::prelude::*;

use crate::asm::*;

/// r31 points at the data area and is never written by generated code.
const BASE: u32 = 31;
/// r30 points at unmapped memory.
const FAULT: u32 = 30;
const FAULT_ADDRESS: u32 = 0x7000_0000;

const VECTORS: [u32; 6] = [
    vector::DSI,
    vector::ISI,
    vector::ALIGNMENT,
    vector::PROGRAM,
    vector::FPU_UNAVAILABLE,
    vector::SYSCALL,
];

#[derive(Debug, Clone)]
enum Piece {
    Op(u32),
    /// Forward branch over `skip` instructions. `cond` is the BO/BI pair
    /// of a `bc`; `None` is a plain `b`.
    Branch {
        cond: Option<(u32, u32)>,
        link: bool,
        skip: usize,
    },
}

fn reg() -> impl Strategy<Value = u32> {
    3u32..12
}

fn freg() -> impl Strategy<Value = u32> {
    0u32..8
}

fn word_offset() -> impl Strategy<Value = i32> {
    (0i32..16).prop_map(|i| i * 4)
}

fn integer() -> impl Strategy<Value = u32> {
    prop_oneof![
        (reg(), -0x8000i32..0x8000).prop_map(|(d, v)| li(d, v)),
        (reg(), any::<u16>()).prop_map(|(d, v)| lis(d, v as i32)),
        (reg(), reg(), -100i32..100).prop_map(|(d, a, v)| addi(d, a, v)),
        (reg(), reg(), -100i32..100).prop_map(|(d, a, v)| addic(d, a, v)),
        (reg(), reg(), -100i32..100).prop_map(|(d, a, v)| subfic(d, a, v)),
        (reg(), reg(), any::<u16>()).prop_map(|(a, s, v)| ori(a, s, v as u32)),
        (reg(), reg(), any::<u16>()).prop_map(|(a, s, v)| andi_rc(a, s, v as u32)),
        (reg(), reg(), reg(), any::<bool>()).prop_map(|(d, a, b, rc)| add(d, a, b, rc)),
        (reg(), reg(), reg(), any::<bool>()).prop_map(|(d, a, b, rc)| subf(d, a, b, rc)),
        (reg(), reg(), reg()).prop_map(|(d, a, b)| addc(d, a, b)),
        (reg(), reg(), reg()).prop_map(|(d, a, b)| subfc(d, a, b)),
        (reg(), reg(), reg()).prop_map(|(d, a, b)| mullw(d, a, b)),
        (reg(), reg(), reg()).prop_map(|(d, a, b)| mulhwu(d, a, b)),
        (reg(), reg(), reg()).prop_map(|(d, a, b)| divw(d, a, b)),
        (reg(), reg(), reg()).prop_map(|(a, s, b)| xor(a, s, b)),
        (reg(), reg(), reg()).prop_map(|(a, s, b)| nor(a, s, b)),
        (reg(), reg(), reg()).prop_map(|(a, s, b)| slw(a, s, b)),
        (reg(), reg(), reg()).prop_map(|(a, s, b)| sraw(a, s, b)),
        (reg(), reg(), 0u32..32).prop_map(|(a, s, sh)| srawi(a, s, sh)),
        (reg(), reg(), 0u32..32, 0u32..32, 0u32..32, any::<bool>())
            .prop_map(|(a, s, sh, mb, me, rc)| rlwinm(a, s, sh, mb, me, rc)),
        (reg(), reg(), 0u32..32).prop_map(|(a, s, sh)| rlwimi(a, s, sh, 0, 15)),
        (reg(), reg()).prop_map(|(a, s)| cntlzw(a, s)),
        (reg(), reg()).prop_map(|(a, s)| extsh(a, s)),
        (reg(), reg()).prop_map(|(d, a)| neg(d, a)),
        (0u32..8, reg(), reg()).prop_map(|(crf, a, b)| cmpw(crf, a, b)),
        (0u32..8, reg(), reg()).prop_map(|(crf, a, b)| cmplw(crf, a, b)),
        (0u32..8, reg(), -100i32..100).prop_map(|(crf, a, v)| cmpwi(crf, a, v)),
        reg().prop_map(|d| mfspr(d, 287)),
        reg().prop_map(mtctr),
    ]
}

fn float() -> impl Strategy<Value = u32> {
    prop_oneof![
        (freg(), freg(), freg()).prop_map(|(d, a, b)| fadd(d, a, b)),
        (freg(), freg(), freg()).prop_map(|(d, a, b)| fsub(d, a, b)),
        (freg(), freg(), freg()).prop_map(|(d, a, c)| fmul(d, a, c)),
        (freg(), freg(), freg()).prop_map(|(d, a, b)| fdiv(d, a, b)),
        (freg(), freg(), freg()).prop_map(|(d, a, b)| fadds(d, a, b)),
        (freg(), freg(), freg()).prop_map(|(d, a, b)| fsubs(d, a, b)),
        (freg(), freg(), freg()).prop_map(|(d, a, c)| fmuls(d, a, c)),
        (freg(), freg(), freg()).prop_map(|(d, a, b)| fdivs(d, a, b)),
        (freg(), freg()).prop_map(|(d, b)| fmr(d, b)),
        (freg(), freg()).prop_map(|(d, b)| fneg(d, b)),
        (freg(), freg()).prop_map(|(d, b)| fabs(d, b)),
        (freg(), freg()).prop_map(|(d, b)| frsp(d, b)),
        (freg(), word_offset()).prop_map(|(d, off)| lfs(d, off, BASE)),
        (freg(), word_offset()).prop_map(|(d, off)| lfd(d, off, BASE)),
        (freg(), word_offset()).prop_map(|(s, off)| stfs(s, off, BASE)),
        (freg(), (0i32..8).prop_map(|i| i * 8)).prop_map(|(s, off)| stfd(s, off, BASE)),
    ]
}

/// Integer loads and stores. With `faulting`, a quarter of them go
/// through the unmapped base.
fn memory(faulting: bool) -> impl Strategy<Value = u32> {
    let base = if faulting {
        prop_oneof![3 => Just(BASE), 1 => Just(FAULT)].boxed()
    } else {
        Just(BASE).boxed()
    };
    (base, reg(), word_offset(), 0usize..6).prop_map(|(ra, r, off, kind)| match kind {
        0 => lwz(r, off, ra),
        1 => lha(r, off, ra),
        2 => lbz(r, off, ra),
        3 => stw(r, off, ra),
        4 => sth(r, off + 2, ra),
        _ => stb(r, off + 1, ra),
    })
}

fn branch() -> impl Strategy<Value = Piece> {
    let cond = prop_oneof![
        Just(None),
        (prop::sample::select(vec![BO_TRUE, BO_FALSE, BO_DNZ, BO_ALWAYS]), 0u32..32).prop_map(Some),
    ];
    (cond, prop::bool::weighted(0.2), 0usize..4)
        .prop_map(|(cond, link, skip)| Piece::Branch { cond, link, skip })
}

fn program(faulting: bool) -> impl Strategy<Value = Vec<u32>> {
    let piece = prop_oneof![
        8 => integer().prop_map(Piece::Op),
        3 => float().prop_map(Piece::Op),
        3 => memory(faulting).prop_map(Piece::Op),
        2 => branch(),
    ];
    prop::collection::vec(piece, 1..60).prop_map(assemble)
}

/// Prefix the base registers, resolve branch targets and end in `HANG`.
/// Targets past the end land on the final `HANG`.
fn assemble(body: Vec<Piece>) -> Vec<u32> {
    let mut program = vec![
        lis(BASE, (DATA_BASE >> 16) as i32),
        lis(FAULT, (FAULT_ADDRESS >> 16) as i32),
    ];
    let hang = program.len() + body.len();
    for piece in body {
        let here = program.len();
        let word = match piece {
            Piece::Op(word) => word,
            Piece::Branch { cond, link, skip } => {
                let disp = 4 * ((here + 1 + skip).min(hang) - here) as i32;
                let word = match cond {
                    None => b(disp),
                    Some((bo, bi)) => bc(bo, bi, disp),
                };
                word | link as u32
            }
        };
        program.push(word);
    }
    program.push(HANG);
    program
}

/// Registers, floating point registers and the data area from `seed`.
/// The vectors hold idle loops.
fn seeded(program: &[u32], seed: &[u32], fp: bool) -> (PpcState, Memory) {
    let (mut state, mut mem) = machine(program);
    for (r, &v) in (3..12).zip(seed) {
        state.gpr[r] = v;
    }
    for (f, &v) in seed.iter().enumerate().take(8) {
        let value = (v as i32 as f64) / 16.0;
        state.set_both_f64(f, value);
    }
    if fp {
        state.msr |= msr::FP;
    }
    let data: Vec<u32> = seed.iter().rev().copied().chain(0..8).collect();
    mem.load_words(DATA_BASE, &data).unwrap();
    for v in VECTORS {
        mem.load_words(v, &[HANG]).unwrap();
    }
    (state, mem)
}

fn idle(mem: &mut Memory, pc: u32) -> bool {
    mem.fetch(pc) == Ok(HANG)
}

/// Interpret until an idle loop is reached.
fn interpret_to_idle(state: &mut PpcState, mem: &mut Memory, limit: usize) {
    let table = gekko_table().unwrap();
    for _ in 0..limit {
        if idle(mem, state.pc) {
            return;
        }
        Interpreter::new(state, mem).step(table);
    }
    panic!("no idle loop reached from {:#010x}", state.pc);
}

fn assert_same(jit: &PpcState, interp: &PpcState, jit_mem: &Memory, interp_mem: &Memory) {
    assert_eq!(jit.pc, interp.pc, "pc");
    assert_eq!(jit.gpr, interp.gpr, "gprs");
    assert_eq!(jit.ps, interp.ps, "fprs");
    assert_eq!(jit.cr, interp.cr, "cr");
    assert_eq!(jit.xer_ca, interp.xer_ca, "xer.ca");
    assert_eq!(jit.xer_so_ov, interp.xer_so_ov, "xer.so/ov");
    assert_eq!(jit.ctr(), interp.ctr(), "ctr");
    assert_eq!(jit.lr(), interp.lr(), "lr");
    assert_eq!(jit.msr, interp.msr, "msr");
    for (name, n) in [
        ("srr0", spr::SRR0),
        ("srr1", spr::SRR1),
        ("dar", spr::DAR),
        ("dsisr", spr::DSISR),
    ] {
        assert_eq!(jit.spr[n], interp.spr[n], "{name}");
    }
    let data = (DATA_BASE & 0x0FFF_FFFF) as usize;
    assert_eq!(
        &jit_mem.ram()[data..data + 0x48],
        &interp_mem.ram()[data..data + 0x48],
        "data"
    );
}

fn check(program: &[u32], seed: &[u32], fp: bool, config: JitConfig) {
    let (mut interp, mut interp_mem) = seeded(program, seed, fp);
    interpret_to_idle(&mut interp, &mut interp_mem, program.len() * 2);

    let (mut state, mut mem) = seeded(program, seed, fp);
    let mut jit = small_jit(config);
    run_jit(&mut jit, &mut state, &mut mem, 10_000);

    assert_same(&state, &interp, &mem, &interp_mem);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn jit_matches_interpreter(
        program in program(false),
        seed in prop::collection::vec(any::<u32>(), 9),
        fp in prop::bool::weighted(0.9),
    ) {
        check(&program, &seed, fp, JitConfig::default());
    }

    #[test]
    fn jit_matches_interpreter_without_fastmem(
        program in program(false),
        seed in prop::collection::vec(any::<u32>(), 9),
    ) {
        check(&program, &seed, true, JitConfig::default().with_fastmem(false));
    }

    #[test]
    fn jit_matches_interpreter_with_faulting_accesses(
        program in program(true),
        seed in prop::collection::vec(any::<u32>(), 9),
        fastmem in any::<bool>(),
    ) {
        check(
            &program,
            &seed,
            true,
            JitConfig::default().with_memcheck(true).with_fastmem(fastmem),
        );
    }

    #[test]
    fn jit_matches_interpreter_in_short_blocks(
        program in program(true),
        seed in prop::collection::vec(any::<u32>(), 9),
        limit in 1usize..6,
    ) {
        check(
            &program,
            &seed,
            true,
            JitConfig::default().with_max_block_instructions(limit).with_memcheck(true),
        );
    }
}

#[test]
fn carry_chain() {
    let program = assemble(vec![
        Piece::Op(li(3, -1)),
        Piece::Op(li(4, 1)),
        Piece::Op(addc(5, 3, 4)),
        Piece::Op(addic(6, 5, -1)),
        Piece::Op(subfc(7, 4, 3)),
    ]);
    check(&program, &[0; 9], false, JitConfig::default());
}

#[test]
fn conditional_return() {
    // bl to a leaf that returns early through beqlr when r3 is zero.
    let program = [
        bl(12),
        li(5, 1),
        HANG,
        cmpwi(0, 3, 0),
        bclr(BO_TRUE, CR0_EQ),
        li(6, 2),
        BLR,
    ];
    for r3 in [0, 1] {
        check(&program, &[r3, 0, 0, 0, 0, 0, 0, 0, 0], false, JitConfig::default());
    }
}

#[test]
fn branch_over_faulting_load() {
    // beq skips the unmapped load when r3 is zero.
    let program = assemble(vec![
        Piece::Op(cmpwi(0, 3, 0)),
        Piece::Branch { cond: Some((BO_TRUE, CR0_EQ)), link: false, skip: 1 },
        Piece::Op(lwz(4, 0, FAULT)),
        Piece::Op(li(5, 3)),
    ]);
    let config = JitConfig::default().with_memcheck(true);
    for r3 in [0, 1] {
        check(&program, &[r3, 9, 9, 0, 0, 0, 0, 0, 0], false, config.clone());
    }
}

#[test]
fn float_without_fpu_takes_unavailable() {
    let program = assemble(vec![Piece::Op(li(3, 1)), Piece::Op(fadd(1, 2, 3)), Piece::Op(li(4, 2))]);
    check(&program, &[0; 9], false, JitConfig::default());
}

#[test]
fn record_forms_copy_summary_overflow() {
    let program = [lis(BASE, (DATA_BASE >> 16) as i32), add(5, 3, 4, true), HANG];
    let (mut state, mut mem) = seeded(&program, &[1, 2, 0, 0, 0, 0, 0, 0, 0], false);
    state.xer_so_ov = 0b10;
    let mut jit = small_jit(JitConfig::default());
    run_jit(&mut jit, &mut state, &mut mem, 1_000);

    assert_eq!(state.gpr[5], 3);
    assert_eq!(state.cr[0], gekko_core::state::cr::GT | gekko_core::state::cr::SO);
}
