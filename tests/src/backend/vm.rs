//! Host register machine: encoding, decoding and execution.

use gekko_backend::vm::emitter::*;
use gekko_backend::vm::regs::POISON;
use gekko_backend::vm::{
    decode_all, AluOp, Cond, DecodeError, ExitCode, FAluOp, FReg, Helper, HostOp, Reg, UnaryOp,
};
use gekko_backend::{CodeBuffer, HostCodeGen, HostCpu, HostEnv, HostError, HostExit, VmCodeGen};
use gekko_core::state::single_to_double_bits;
use gekko_core::{AccessSize, GuestInstruction, PpcState, RegSet, StateSlot};

/// Flat little-endian memory at address 0 with a fault window above it.
struct TestEnv {
    state: PpcState,
    ram: Vec<u8>,
    interpreted: Vec<u32>,
    helpers: Vec<Helper>,
    piped: Vec<(AccessSize, u64)>,
}

impl TestEnv {
    fn new() -> Self {
        Self {
            state: PpcState::new(),
            ram: vec![0; 0x1000],
            interpreted: Vec::new(),
            helpers: Vec::new(),
            piped: Vec::new(),
        }
    }
}

impl HostEnv for TestEnv {
    fn state(&mut self) -> &mut PpcState {
        &mut self.state
    }

    fn fastmem(&mut self, addr: u32, len: usize) -> Option<&mut [u8]> {
        let start = addr as usize;
        self.ram.get_mut(start..start + len)
    }

    fn read_checked(&mut self, size: AccessSize, addr: u32) -> u64 {
        // Checked reads see a recognizable pattern instead of RAM.
        0x1000_0000 + addr as u64 + size.bytes() as u64
    }

    fn write_checked(&mut self, _size: AccessSize, value: u64, addr: u32) {
        self.state.gpr[0] = addr;
        self.state.gpr[1] = value as u32;
    }

    fn gather_pipe_write(&mut self, size: AccessSize, value: u64) {
        self.piped.push((size, value));
    }

    fn interpret(&mut self, insn: GuestInstruction) {
        self.interpreted.push(insn.0);
    }

    fn helper(&mut self, helper: Helper) -> u64 {
        self.helpers.push(helper);
        42
    }
}

fn setup() -> (CodeBuffer, VmCodeGen) {
    let mut buf = CodeBuffer::new(64 * 1024).unwrap();
    let mut gen = VmCodeGen::new();
    gen.emit_epilogue(&mut buf);
    (buf, gen)
}

fn run(buf: &CodeBuffer, entry: usize, env: &mut TestEnv) -> (HostCpu, HostExit) {
    let mut cpu = HostCpu::new();
    let exit = cpu.enter(buf, entry, env).unwrap();
    (cpu, exit)
}

#[test]
fn epilogue_stubs_return_their_codes() {
    let (buf, gen) = setup();
    let mut env = TestEnv::new();
    for code in [ExitCode::Dispatch, ExitCode::Timing, ExitCode::Exception, ExitCode::Breakpoint] {
        let (_, exit) = run(&buf, gen.exit_stub(code), &mut env);
        assert_eq!(exit, HostExit::Return(code));
    }
    assert!(gen.code_gen_start() > gen.breakpoint_offset);
}

#[test]
fn alu_and_state_round_trip() {
    let (mut buf, gen) = setup();
    let entry = buf.offset();
    emit_mov_ri(&mut buf, Reg::R4, 40);
    emit_alu_ri(&mut buf, AluOp::Add, Reg::R4, 2);
    emit_ld_state(&mut buf, Reg::R5, StateSlot::Gpr(3));
    emit_alu_rr(&mut buf, AluOp::Mul, Reg::R5, Reg::R4);
    emit_st_state(&mut buf, Reg::R5, StateSlot::Gpr(7));
    emit_st_state_imm(&mut buf, StateSlot::Pc, 0x8000_0000);
    gen.emit_exit_jump(&mut buf, ExitCode::Dispatch);

    let mut env = TestEnv::new();
    env.state.gpr[3] = 3;
    let (cpu, exit) = run(&buf, entry, &mut env);
    assert_eq!(exit, HostExit::Return(ExitCode::Dispatch));
    assert_eq!(env.state.gpr[7], 126);
    assert_eq!(env.state.pc, 0x8000_0000);
    assert_eq!(cpu.ctx.regs[Reg::R4.index()], 42);
}

#[test]
fn alu_results_are_32_bit() {
    assert_eq!(AluOp::Add.apply(u32::MAX, 1), 0);
    assert_eq!(AluOp::Shl.apply(1, 32), 0);
    assert_eq!(AluOp::Sar.apply(0x8000_0000, 40), u32::MAX);
    assert_eq!(AluOp::Rotl.apply(0x8000_0001, 1), 3);
    assert_eq!(AluOp::MulHs.apply(-2i32 as u32, 3), u32::MAX);
    assert_eq!(AluOp::MulHu.apply(0x8000_0000, 4), 2);
    assert_eq!(AluOp::Andc.apply(0xFF, 0x0F), 0xF0);
}

#[test]
fn unary_ops() {
    assert_eq!(UnaryOp::Cntlz.apply(0), 32);
    assert_eq!(UnaryOp::Cntlz.apply(1), 31);
    assert_eq!(UnaryOp::ExtS8.apply(0x80), 0xFFFF_FF80);
    assert_eq!(UnaryOp::ExtS16.apply(0x8001), 0xFFFF_8001);
    assert_eq!(UnaryOp::Bswap32.apply(0x1122_3344), 0x4433_2211);
    assert_eq!(UnaryOp::Bswap16.apply(0x1122), 0x2211);
}

#[test]
fn conditional_jump_and_fixup() {
    let (mut buf, gen) = setup();
    let entry = buf.offset();
    emit_ld_state(&mut buf, Reg::R4, StateSlot::Gpr(3));
    let skip = emit_jcc_ri_fixup(&mut buf, Cond::Eq, Reg::R4, 0);
    emit_st_state_imm(&mut buf, StateSlot::Gpr(4), 1);
    set_jump_target(&mut buf, skip);
    gen.emit_exit_jump(&mut buf, ExitCode::Timing);

    let mut env = TestEnv::new();
    run(&buf, entry, &mut env);
    assert_eq!(env.state.gpr[4], 0);

    env.state.gpr[3] = 5;
    run(&buf, entry, &mut env);
    assert_eq!(env.state.gpr[4], 1);
}

#[test]
fn patch_jump_redirects_exit() {
    let (mut buf, gen) = setup();
    let entry = buf.offset();
    let jump = gen.emit_exit_jump(&mut buf, ExitCode::Dispatch);

    let mut env = TestEnv::new();
    assert_eq!(run(&buf, entry, &mut env).1, HostExit::Return(ExitCode::Dispatch));
    gen.patch_jump(&mut buf, jump, gen.exit_stub(ExitCode::Exception));
    assert_eq!(run(&buf, entry, &mut env).1, HostExit::Return(ExitCode::Exception));
}

#[test]
fn compare_produces_cr_field() {
    let (mut buf, gen) = setup();
    let entry = buf.offset();
    emit_mov_ri(&mut buf, Reg::R4, -1i32 as u32);
    emit_cmp_cr_ri(&mut buf, false, Reg::R5, Reg::R4, 0);
    emit_cmp_cr_ri(&mut buf, true, Reg::R6, Reg::R4, 0);
    gen.emit_exit_jump(&mut buf, ExitCode::Dispatch);

    let mut env = TestEnv::new();
    env.state.set_xer(0x8000_0000);
    let (cpu, _) = run(&buf, entry, &mut env);
    assert_eq!(cpu.ctx.regs[Reg::R5.index()], 8 | 1);
    assert_eq!(cpu.ctx.regs[Reg::R6.index()], 4 | 1);
}

#[test]
fn fast_load_reads_host_order_and_faults_outside_ram() {
    let (mut buf, gen) = setup();
    let entry = buf.offset();
    emit_mov_ri(&mut buf, Reg::R4, 0x10);
    emit_load_fast(&mut buf, AccessSize::U32, Reg::R5, Reg::R4, 4);
    emit_unary(&mut buf, UnaryOp::Bswap32, Reg::R5);
    let faulting = emit_load_fast(&mut buf, AccessSize::U16, Reg::R6, Reg::R4, 0x2000);
    gen.emit_exit_jump(&mut buf, ExitCode::Dispatch);

    let mut env = TestEnv::new();
    env.ram[0x14..0x18].copy_from_slice(&[0x12, 0x34, 0x56, 0x78]);
    let (cpu, exit) = run(&buf, entry, &mut env);
    assert_eq!(cpu.ctx.regs[Reg::R5.index()], 0x1234_5678);
    let HostExit::Fault(fault) = exit else {
        panic!("expected a fault, got {exit:?}");
    };
    assert_eq!(fault.pc, faulting);
    assert_eq!(fault.address, 0x2010);
    assert_eq!(fault.size, AccessSize::U16);
    assert!(!fault.is_store);
    assert_eq!(cpu.ctx.pc, faulting);
}

#[test]
fn calls_poison_caller_saved_registers() {
    let (mut buf, gen) = setup();
    let entry = buf.offset();
    for r in [Reg::R0, Reg::R1, Reg::R2, Reg::R3, Reg::R4] {
        emit_mov_ri(&mut buf, r, 7);
    }
    emit_call_interp(&mut buf, 0x7C00_0000);
    gen.emit_exit_jump(&mut buf, ExitCode::Dispatch);

    let mut env = TestEnv::new();
    let (cpu, _) = run(&buf, entry, &mut env);
    assert_eq!(env.interpreted, vec![0x7C00_0000]);
    for r in 0..4 {
        assert_eq!(cpu.ctx.regs[r], POISON);
    }
    assert_eq!(cpu.ctx.regs[Reg::R4.index()], 7);
}

#[test]
fn helper_result_lands_in_r0() {
    let (mut buf, gen) = setup();
    let entry = buf.offset();
    emit_call_helper(&mut buf, Helper::CheckBreakpoint);
    gen.emit_exit_jump(&mut buf, ExitCode::Dispatch);

    let mut env = TestEnv::new();
    let (cpu, _) = run(&buf, entry, &mut env);
    assert_eq!(env.helpers, vec![Helper::CheckBreakpoint]);
    assert_eq!(cpu.ctx.regs[0], 42);
}

#[test]
fn push_pop_preserves_registers_across_calls() {
    let (mut buf, gen) = setup();
    let entry = buf.offset();
    emit_mov_ri(&mut buf, Reg::R2, 0x55);
    let saved = RegSet::EMPTY.set(Reg::R2.index());
    emit_push(&mut buf, saved, RegSet::EMPTY);
    emit_call_interp(&mut buf, 0);
    emit_pop(&mut buf, saved, RegSet::EMPTY);
    gen.emit_exit_jump(&mut buf, ExitCode::Dispatch);

    let mut env = TestEnv::new();
    let (cpu, _) = run(&buf, entry, &mut env);
    assert_eq!(cpu.ctx.regs[Reg::R2.index()], 0x55);
}

#[test]
fn pop_without_push_is_an_error() {
    let (mut buf, _) = setup();
    let entry = buf.offset();
    emit_pop(&mut buf, RegSet::EMPTY.set(5), RegSet::EMPTY);
    let mut cpu = HostCpu::new();
    let err = cpu.enter(&buf, entry, &mut TestEnv::new()).unwrap_err();
    assert_eq!(err, HostError::StackUnderflow { pc: entry });
}

#[test]
fn trap_filler_is_an_error() {
    let (mut buf, gen) = setup();
    let entry = buf.offset();
    let jump = gen.emit_exit_jump(&mut buf, ExitCode::Dispatch);
    write_jmp_at(&mut buf, jump, 8, jump + 5);
    let mut cpu = HostCpu::new();
    let err = cpu.enter(&buf, entry, &mut TestEnv::new()).unwrap_err();
    assert_eq!(err, HostError::TrapFiller { pc: jump + 5 });
}

#[test]
fn float_ops_and_single_conversion() {
    let (mut buf, gen) = setup();
    let entry = buf.offset();
    emit_fld_state(&mut buf, FReg::F2, StateSlot::Ps0(1));
    emit_fld_state(&mut buf, FReg::F3, StateSlot::Ps0(2));
    emit_falu(&mut buf, FAluOp::Mul, FReg::F2, FReg::F3);
    emit_fst_state(&mut buf, FReg::F2, StateSlot::Ps0(3));
    emit_mov_ri(&mut buf, Reg::R4, 1.5f32.to_bits());
    emit_ffrom_int(&mut buf, true, FReg::F4, Reg::R4);
    emit_fst_state(&mut buf, FReg::F4, StateSlot::Ps0(4));
    gen.emit_exit_jump(&mut buf, ExitCode::Dispatch);

    let mut env = TestEnv::new();
    env.state.ps[1].ps0 = 2.5f64.to_bits();
    env.state.ps[2].ps0 = 4.0f64.to_bits();
    run(&buf, entry, &mut env);
    assert_eq!(env.state.ps[3].ps0_f64(), 10.0);
    assert_eq!(env.state.ps[4].ps0, single_to_double_bits(1.5f32.to_bits()));
    assert_eq!(env.state.ps[4].ps0_f64(), 1.5);
}

#[test]
fn gather_pipe_write_goes_to_env() {
    let (mut buf, gen) = setup();
    let entry = buf.offset();
    emit_mov_ri(&mut buf, Reg::R4, 0xABCD);
    emit_gather_pipe_write(&mut buf, AccessSize::U16, Reg::R4);
    gen.emit_exit_jump(&mut buf, ExitCode::Dispatch);

    let mut env = TestEnv::new();
    run(&buf, entry, &mut env);
    assert_eq!(env.piped, vec![(AccessSize::U16, 0xABCD)]);
}

#[test]
fn decode_all_lists_emitted_ops() {
    let (mut buf, gen) = setup();
    let start = buf.offset();
    emit_mov_ri(&mut buf, Reg::R4, 1);
    emit_alu_rr(&mut buf, AluOp::Xor, Reg::R4, Reg::R5);
    emit_call_interp(&mut buf, 0x6000_0000);
    gen.emit_exit_jump(&mut buf, ExitCode::Exception);
    let end = buf.offset();

    let ops = decode_all(buf.range(start, end), start).unwrap();
    let kinds: Vec<HostOp> = ops.iter().map(|&(_, op)| op).collect();
    assert_eq!(
        kinds,
        vec![
            HostOp::MovImm { dst: Reg::R4, imm: 1 },
            HostOp::Alu { op: AluOp::Xor, dst: Reg::R4, src: Reg::R5 },
            HostOp::CallInterp { word: 0x6000_0000 },
            HostOp::Jmp { target: gen.exit_stub(ExitCode::Exception) as u32 },
        ]
    );
    assert_eq!(ops[0].0, start);
    for (offset, op) in &ops {
        assert_eq!(HostOp::decode(buf.tail(*offset), *offset).unwrap(), *op);
        assert!(!op.to_string().is_empty());
    }
}

#[test]
fn unknown_opcode_does_not_decode() {
    let err = HostOp::decode(&[0x7F, 0, 0, 0], 16).unwrap_err();
    assert_eq!(err, DecodeError::UnknownOpcode { offset: 16, opcode: 0x7F });
    let err = HostOp::decode(&[0x02, 4], 0).unwrap_err();
    assert_eq!(err, DecodeError::Truncated { offset: 0 });
}
