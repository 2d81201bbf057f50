//! Block analysis.
//!
//! Walks guest code from a start address until an instruction that always
//! leaves the block, the length limit, a breakpoint boundary or unreadable
//! memory. Conditional branches and traps do not stop the walk. Every instruction gets its register usage and a look-ahead
//! liveness summary the register caches use to pick eviction victims and
//! to drop mappings early.

use std::collections::BTreeSet;

use gekko_backend::UsageHint;
use gekko_core::insn::branch_target;
use gekko_core::opcode::OpCategory;
use gekko_core::{GuestInstruction, GuestMemory, OpFlags, OpIndex, OpcodeDescriptor, OpcodeTable, RegSet};

/// One analyzed guest instruction.
#[derive(Debug, Clone)]
pub struct CodeOp {
    pub insn: GuestInstruction,
    pub address: u32,
    pub index: OpIndex,
    pub desc: OpcodeDescriptor,
    pub regs_in: RegSet,
    pub regs_out: RegSet,
    pub fregs_in: RegSet,
    pub fregs_out: RegSet,
    /// Static target of `b`/`bc`.
    pub branch_to: Option<u32>,
    pub can_end_block: bool,
    pub can_cause_exception: bool,
    /// GPRs touched by the following instructions inside the look-ahead
    /// window.
    pub gpr_in_use: RegSet,
    pub fpr_in_use: RegSet,
}

impl CodeOp {
    pub fn gprs(&self) -> RegSet {
        self.regs_in.union(self.regs_out)
    }

    pub fn fprs(&self) -> RegSet {
        self.fregs_in.union(self.fregs_out)
    }
}

/// Output of [`BlockAnalyzer::analyze`].
#[derive(Debug, Clone)]
pub struct AnalyzedBlock {
    pub address: u32,
    pub ops: Vec<CodeOp>,
    pub num_cycles: u32,
    /// No instruction ended the block; the translator appends an exit to
    /// the following address.
    pub broken: bool,
    /// The first instruction could not be fetched.
    pub memory_exception: bool,
    pub uses_fpu: bool,
}

impl AnalyzedBlock {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Address following the last analyzed instruction.
    pub fn next_pc(&self) -> u32 {
        self.address.wrapping_add(4 * self.ops.len() as u32)
    }
}

const SPR_MMCR0: u32 = 952;
const SPR_MMCR1: u32 = 956;

pub struct BlockAnalyzer {
    window: usize,
}

impl BlockAnalyzer {
    pub fn new(lookahead_window: usize) -> Self {
        Self {
            window: lookahead_window,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Analyze at most `limit` instructions starting at `address`.
    ///
    /// A breakpoint address other than the first one ends the block before
    /// it, so breakpoints always start a block.
    pub fn analyze<R>(
        &self,
        table: &OpcodeTable<R>,
        mem: &mut dyn GuestMemory,
        address: u32,
        limit: usize,
        breakpoints: &BTreeSet<u32>,
    ) -> AnalyzedBlock {
        let mut block = AnalyzedBlock {
            address,
            ops: Vec::new(),
            num_cycles: 0,
            broken: false,
            memory_exception: false,
            uses_fpu: false,
        };

        let mut pc = address;
        let mut found_exit = false;
        for i in 0..limit.max(1) {
            if i > 0 && breakpoints.contains(&pc) {
                break;
            }
            let word = match mem.fetch(pc) {
                Ok(word) => word,
                Err(_) => {
                    if i == 0 {
                        block.memory_exception = true;
                    }
                    break;
                }
            };

            let insn = GuestInstruction(word);
            let index = table.index_of(insn);
            let desc = table.entry(index).desc;
            block.num_cycles += desc.base_cycles;

            let first_fpu = desc.uses_fpu() && !block.uses_fpu;
            block.uses_fpu |= desc.uses_fpu();
            let op = instruction_stats(insn, pc, index, desc, first_fpu);
            let ends = op.can_end_block;
            block.ops.push(op);

            pc = pc.wrapping_add(4);
            if ends {
                found_exit = true;
                break;
            }
        }

        if (!found_exit && !block.ops.is_empty()) || limit == 1 {
            block.broken = true;
        }
        self.compute_in_use(&mut block.ops);

        tracing::trace!(
            address = format_args!("{address:#010x}"),
            instructions = block.ops.len(),
            broken = block.broken,
            "analyzed block"
        );
        block
    }

    fn compute_in_use(&self, ops: &mut [CodeOp]) {
        for i in 0..ops.len() {
            let end = (i + 1 + self.window).min(ops.len());
            let (gprs, fprs) = ops[i + 1..end]
                .iter()
                .fold((RegSet::EMPTY, RegSet::EMPTY), |(g, f), op| {
                    (g.union(op.gprs()), f.union(op.fprs()))
                });
            ops[i].gpr_in_use = gprs;
            ops[i].fpr_in_use = fprs;
        }
    }
}

fn instruction_stats(
    insn: GuestInstruction,
    address: u32,
    index: OpIndex,
    desc: OpcodeDescriptor,
    first_fpu: bool,
) -> CodeOp {
    let flags = desc.flags;

    let mut regs_in = RegSet::EMPTY;
    let mut regs_out = RegSet::EMPTY;
    if flags.contains(OpFlags::OUT_A) {
        regs_out = regs_out.set(insn.ra());
    }
    if flags.contains(OpFlags::OUT_D) {
        regs_out = regs_out.set(insn.rd());
    }
    if flags.contains(OpFlags::IN_A) || (flags.contains(OpFlags::IN_A0) && insn.ra() != 0) {
        regs_in = regs_in.set(insn.ra());
    }
    if flags.contains(OpFlags::IN_B) {
        regs_in = regs_in.set(insn.rb());
    }
    if flags.contains(OpFlags::IN_C) {
        regs_in = regs_in.set(insn.rc_reg());
    }
    if flags.contains(OpFlags::IN_S) {
        regs_in = regs_in.set(insn.rs());
    }
    match insn.opcd() {
        46 => regs_out = regs_out.union(RegSet::range(insn.rd(), 31)),
        47 => regs_in = regs_in.union(RegSet::range(insn.rs(), 31)),
        _ => {}
    }

    let mut fregs_in = RegSet::EMPTY;
    let mut fregs_out = RegSet::EMPTY;
    if flags.contains(OpFlags::OUT_FLOAT_D) {
        fregs_out = fregs_out.set(insn.fd());
    }
    for (flag, reg) in [
        (OpFlags::IN_FLOAT_A, insn.fa()),
        (OpFlags::IN_FLOAT_B, insn.fb()),
        (OpFlags::IN_FLOAT_C, insn.fc()),
        (OpFlags::IN_FLOAT_D, insn.fd()),
        (OpFlags::IN_FLOAT_S, insn.fs()),
    ] {
        if flags.contains(flag) {
            fregs_in = fregs_in.set(reg);
        }
    }

    let branch_to = match insn.opcd() {
        18 => Some(branch_target(address, insn.li(), insn.aa())),
        16 => Some(branch_target(address, insn.bd(), insn.aa())),
        _ => None,
    };

    let can_end_block = can_end_block(insn, &desc);
    let can_cause_exception = first_fpu
        || flags.intersects(OpFlags::LOADSTORE | OpFlags::PROGRAM_EXCEPTION)
        || desc.category == OpCategory::Unknown;

    CodeOp {
        insn,
        address,
        index,
        desc,
        regs_in,
        regs_out,
        fregs_in,
        fregs_out,
        branch_to,
        can_end_block,
        can_cause_exception,
        gpr_in_use: RegSet::EMPTY,
        fpr_in_use: RegSet::EMPTY,
    }
}

const BO_DONT_DECREMENT: u32 = 4;
const BO_DONT_CHECK_CONDITION: u32 = 16;

/// Whether `op` leaves the block on every path.
///
/// Conditional branches and traps carry END_BLOCK but the block continues
/// past them: the taken path exits and the fall-through compiles inline.
/// `mtspr` only ends the block for the performance monitor registers.
fn can_end_block(insn: GuestInstruction, desc: &OpcodeDescriptor) -> bool {
    if !desc.ends_block() {
        return false;
    }
    let always = |bo: u32| bo & BO_DONT_DECREMENT != 0 && bo & BO_DONT_CHECK_CONDITION != 0;
    match (insn.opcd(), insn.subop10()) {
        (16, _) | (19, 16) => always(insn.bo()),
        (19, 528) => insn.bo() & BO_DONT_CHECK_CONDITION != 0,
        (3, _) | (31, 4) => false,
        (31, 467) => {
            let n = insn.spr();
            n == SPR_MMCR0 || n == SPR_MMCR1
        }
        _ => true,
    }
}

/// Distance to the next use of a register, for eviction decisions.
pub struct Lookahead<'a> {
    ops: &'a [CodeOp],
    pos: usize,
    window: usize,
    float: bool,
}

impl<'a> Lookahead<'a> {
    pub fn gpr(ops: &'a [CodeOp], pos: usize, window: usize) -> Self {
        Self {
            ops,
            pos,
            window,
            float: false,
        }
    }

    pub fn fpr(ops: &'a [CodeOp], pos: usize, window: usize) -> Self {
        Self {
            ops,
            pos,
            window,
            float: true,
        }
    }
}

impl UsageHint for Lookahead<'_> {
    fn next_use(&self, guest: usize) -> Option<usize> {
        let end = (self.pos + self.window + 1).min(self.ops.len());
        self.ops
            .get(self.pos..end)?
            .iter()
            .position(|op| {
                let regs = if self.float { op.fprs() } else { op.gprs() };
                regs.contains(guest)
            })
    }
}
