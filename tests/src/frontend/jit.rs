use std::collections::BTreeSet;

use gekko_backend::vm::{decode_all, Helper, HostOp};
use gekko_backend::{CodeBuffer, HostCodeGen, VmCodeGen};
use gekko_core::JitConfig;
use gekko_frontend::{
    compile_block, gekko_table, BlockAnalyzer, BlockReport, CompileEnv, EmitError, OpStats,
};
use proptest::prelude::*;

use crate::asm::*;

struct Compiled {
    buf: CodeBuffer,
    codegen: VmCodeGen,
    report: BlockReport,
    stats: OpStats,
}

impl Compiled {
    fn ops(&self) -> Vec<HostOp> {
        let r = &self.report;
        decode_all(self.buf.range(r.checked_entry, r.host_end), r.checked_entry)
            .unwrap()
            .into_iter()
            .map(|(_, op)| op)
            .collect()
    }
}

fn try_compile(
    program: &[u32],
    config: JitConfig,
    breakpoints: &[u32],
    room: Option<usize>,
) -> Result<Compiled, EmitError> {
    let (_, mut mem) = machine(program);
    let table = gekko_table().unwrap();
    let breakpoints: BTreeSet<u32> = breakpoints.iter().copied().collect();
    let block = BlockAnalyzer::new(config.lookahead_window).analyze(
        table,
        &mut mem,
        CODE_BASE,
        config.block_limit(),
        &breakpoints,
    );

    let mut buf = CodeBuffer::new(256 * 1024).unwrap();
    let mut codegen = VmCodeGen::new();
    codegen.emit_epilogue(&mut buf);
    let code_limit = room.map_or(buf.capacity(), |r| buf.offset() + r);
    let env = CompileEnv {
        codegen: &codegen,
        config: &config,
        table,
        breakpoints: &breakpoints,
        code_limit,
    };
    let mut stats = OpStats::new(table.len());
    let report = compile_block(&mut buf, &env, &block, &mut stats)?;
    Ok(Compiled { buf, codegen, report, stats })
}

fn compile(program: &[u32]) -> Compiled {
    try_compile(program, JitConfig::default(), &[], None).unwrap()
}

#[test]
fn entries_and_exit_records() {
    let c = compile(&[li(3, 1), b(8)]);
    let r = &c.report;
    assert_eq!(r.guest_start, CODE_BASE);
    assert_eq!(r.instructions, 2);
    assert_eq!(r.guest_size, 8);
    assert_eq!(r.checked_entry, c.codegen.code_gen_start());
    assert!(r.normal_entry > r.checked_entry);
    assert_eq!(r.host_end, c.buf.offset());

    assert_eq!(r.exits.len(), 1);
    let exit = r.exits[0];
    assert_eq!(exit.guest_target, at(3));
    assert!(!exit.is_linked);
    let jump = HostOp::decode(c.buf.tail(exit.patch_site), exit.patch_site).unwrap();
    assert_eq!(
        jump,
        HostOp::Jmp { target: c.codegen.exit_stub(gekko_backend::vm::ExitCode::Dispatch) as u32 }
    );
    assert!(!c.ops().is_empty());
}

#[test]
fn broken_block_exits_to_next_instruction() {
    let c = try_compile(
        &[NOP, NOP, NOP],
        JitConfig::default().with_max_block_instructions(2),
        &[],
        None,
    )
    .unwrap();
    assert_eq!(c.report.instructions, 2);
    assert_eq!(c.report.exits.len(), 1);
    assert_eq!(c.report.exits[0].guest_target, at(2));
}

#[test]
fn conditional_branch_exits_only_when_taken() {
    let c = compile(&[bc(BO_TRUE, CR0_EQ, 12), li(3, 1), BLR]);
    assert_eq!(c.report.instructions, 3);
    let targets: Vec<u32> = c.report.exits.iter().map(|e| e.guest_target).collect();
    assert_eq!(targets, vec![at(3)]);

    let c = compile(&[bc(BO_ALWAYS, 0, 12), li(3, 1), BLR]);
    assert_eq!(c.report.instructions, 1);
    let targets: Vec<u32> = c.report.exits.iter().map(|e| e.guest_target).collect();
    assert_eq!(targets, vec![at(3)]);
}

#[test]
fn conditional_branch_at_the_limit_exits_both_ways() {
    let c = try_compile(
        &[bc(BO_TRUE, CR0_EQ, 12), li(3, 1), BLR],
        JitConfig::default().with_max_block_instructions(1),
        &[],
        None,
    )
    .unwrap();
    let targets: Vec<u32> = c.report.exits.iter().map(|e| e.guest_target).collect();
    assert_eq!(targets, vec![at(3), at(1)]);
}

#[test]
fn register_branch_is_not_linkable() {
    let c = compile(&[BLR]);
    assert!(c.report.exits.is_empty());
}

#[test]
fn one_fp_check_per_block() {
    let c = compile(&[fadd(1, 2, 3), fmul(4, 1, 1), fadd(5, 4, 4), BLR]);
    assert_eq!(c.report.fp_checks.len(), 1);
    assert_eq!(c.report.fp_checks[0], c.report.normal_entry);

    let c = compile(&[li(3, 0), addi(3, 3, 1), BLR]);
    assert!(c.report.fp_checks.is_empty());
}

#[test]
fn untranslated_opcode_falls_back() {
    let word = divw(3, 4, 5);
    let c = compile(&[li(4, 10), word, BLR]);
    assert_eq!(c.report.interp_calls.len(), 1);
    let call = c.report.interp_calls[0];
    assert_eq!(call.guest_pc, at(1));
    assert!(call.dirty_gprs.is_empty());
    assert!(call.dirty_fprs.is_empty());
    assert_eq!(
        HostOp::decode(c.buf.tail(call.offset), call.offset).unwrap(),
        HostOp::CallInterp { word }
    );

    let table = gekko_table().unwrap();
    let index = table.index_of(gekko_core::GuestInstruction(word));
    assert_eq!(c.stats.compiled(index), 1);
    assert_eq!(c.stats.fallbacks(index), 0);
}

#[test]
fn fastmem_accesses_are_backpatch_sites() {
    let c = compile(&[lwz(3, 0, 4), stw(3, 4, 4), BLR]);
    let sites = &c.report.sites;
    assert_eq!(sites.len(), 2);
    assert!(!sites[0].is_store);
    assert_eq!(sites[0].guest_pc, at(0));
    assert!(sites[1].is_store);
    assert_eq!(sites[1].disp, 4);
    assert_eq!(sites[1].guest_pc, at(1));
    for s in sites {
        assert!(s.region_start <= s.fault_at && s.fault_at < s.region_end);
        let op = HostOp::decode(c.buf.tail(s.fault_at), s.fault_at).unwrap();
        assert!(matches!(op, HostOp::LoadFast { .. } | HostOp::StoreFast { .. }));
    }

    let c = try_compile(
        &[lwz(3, 0, 4), stw(3, 4, 4), BLR],
        JitConfig::default().with_fastmem(false),
        &[],
        None,
    )
    .unwrap();
    assert!(c.report.sites.is_empty());
    assert!(c.ops().iter().any(|op| matches!(op, HostOp::LoadSlow { .. })));
}

#[test]
fn load_into_own_base_folds_displacement() {
    let c = compile(&[lwz(3, 8, 3), BLR]);
    let site = c.report.sites[0];
    assert!(site.offset_added);
    assert_eq!(site.disp, 8);
    assert_eq!(site.addr, site.value);
}

#[test]
fn gather_pipe_stores_trigger_flush_checks() {
    let mut program = vec![lis(3, 0xCC01u32 as i32)];
    program.extend(std::iter::repeat(stw(4, -0x8000, 3)).take(10));
    program.push(BLR);
    let c = compile(&program);
    assert!(c.report.sites.is_empty());
    assert_eq!(c.report.gather_pipe_flushes, 1);
    let ops = c.ops();
    assert_eq!(
        ops.iter().filter(|op| matches!(op, HostOp::GatherPipeWrite { .. })).count(),
        10
    );
    assert!(ops.contains(&HostOp::CallHelper { helper: Helper::GatherPipeFlush }));
}

#[test]
fn breakpoint_checks_need_debugging() {
    let program = [li(3, 1), BLR];
    let check = HostOp::CallHelper { helper: Helper::CheckBreakpoint };

    let c = try_compile(&program, JitConfig::default(), &[CODE_BASE], None).unwrap();
    assert!(!c.ops().contains(&check));

    let c = try_compile(&program, JitConfig::default().with_debugging(true), &[CODE_BASE], None)
        .unwrap();
    assert!(c.ops().contains(&check));
}

#[test]
fn out_of_space_is_reported() {
    let err = try_compile(&[li(3, 1), BLR], JitConfig::default(), &[], Some(64))
        .err()
        .unwrap();
    assert!(matches!(err, EmitError::OutOfSpace { .. }));
}

fn instruction() -> impl Strategy<Value = u32> {
    let r = || 3u32..12;
    prop_oneof![
        (r(), -100i32..100).prop_map(|(d, v)| li(d, v)),
        (r(), r(), -100i32..100).prop_map(|(d, a, v)| addi(d, a, v)),
        (r(), r(), r()).prop_map(|(d, a, b)| add(d, a, b, false)),
        (r(), r(), r()).prop_map(|(d, a, b)| add(d, a, b, true)),
        (r(), r(), r()).prop_map(|(d, a, b)| subf(d, a, b, false)),
        (r(), r(), r()).prop_map(|(a, s, b)| xor(a, s, b)),
        (r(), r(), 0u32..32).prop_map(|(a, s, sh)| rlwinm(a, s, sh, 0, 31, false)),
        (r(), r()).prop_map(|(a, b)| cmpw(0, a, b)),
        (r(), r(), r()).prop_map(|(d, a, b)| divw(d, a, b)),
        (r(), r(), r()).prop_map(|(d, a, b)| mulhw(d, a, b)),
        r().prop_map(|d| mfspr(d, 287)),
    ]
}

proptest! {
    #[test]
    fn interpreter_calls_see_no_dirty_registers(
        program in prop::collection::vec(instruction(), 1..40)
    ) {
        let mut program = program;
        program.push(BLR);
        let c = compile(&program);
        for call in &c.report.interp_calls {
            prop_assert!(call.dirty_gprs.is_empty(), "dirty at {:#x}", call.guest_pc);
            prop_assert!(call.dirty_fprs.is_empty());
        }
        prop_assert_eq!(c.report.instructions as usize, program.len());
        prop_assert!(!c.ops().is_empty());
    }
}
