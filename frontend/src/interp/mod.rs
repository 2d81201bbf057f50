//! Single-instruction interpreter.
//!
//! Every opcode has one routine operating directly on [`PpcState`] and
//! guest memory. The translator calls these for opcodes it does not
//! translate inline; [`Interpreter::step`] runs whole instructions with
//! pc bookkeeping and exception delivery, which is what the equivalence
//! tests compare translated code against.

mod branch;
mod float;
mod integer;
mod loadstore;
mod paired;
mod system;

use gekko_core::state::{exception, msr, program};
use gekko_core::{AccessSize, GuestInstruction, GuestMemory, OpFlags, PpcState};

use crate::tables::GekkoTable;

/// Interpreter routine for one opcode.
pub type InterpretFn = fn(&mut Interpreter<'_>, GuestInstruction);

pub struct Interpreter<'a> {
    pub state: &'a mut PpcState,
    pub mem: &'a mut dyn GuestMemory,
}

impl<'a> Interpreter<'a> {
    pub fn new(state: &'a mut PpcState, mem: &'a mut dyn GuestMemory) -> Self {
        Self { state, mem }
    }

    /// Run the routine bound to `insn` without touching pc or delivering
    /// exceptions. This is the translator's fallback entry point.
    pub fn execute(&mut self, table: &GekkoTable, insn: GuestInstruction) {
        (table.lookup(insn).routine.interp)(self, insn);
    }

    /// Fetch, execute and retire one instruction at `pc`. Returns the
    /// cycles it cost.
    pub fn step(&mut self, table: &GekkoTable) -> u32 {
        let pc = self.state.pc;
        let word = match self.mem.fetch(pc) {
            Ok(word) => word,
            Err(_) => {
                self.state.exceptions |= exception::ISI;
                self.state.npc = pc;
                self.state.check_exceptions();
                return 1;
            }
        };

        let insn = GuestInstruction(word);
        let entry = table.lookup(insn);
        self.state.npc = pc.wrapping_add(4);

        if entry.desc.uses_fpu() && self.state.msr & msr::FP == 0 {
            self.state.exceptions |= exception::FPU_UNAVAILABLE;
        } else {
            (entry.routine.interp)(self, insn);
        }

        if self.state.has_sync_exception() {
            self.state.check_exceptions();
        } else {
            self.state.pc = self.state.npc;
            if entry.desc.flags.contains(OpFlags::CHECK_EXCEPTIONS) || is_mtmsr(insn) {
                self.state.check_exceptions();
            }
        }
        entry.desc.base_cycles
    }

    // -- Register access --

    #[inline]
    pub(crate) fn gpr(&self, n: usize) -> u32 {
        self.state.gpr[n]
    }

    #[inline]
    pub(crate) fn set_gpr(&mut self, n: usize, value: u32) {
        self.state.gpr[n] = value;
    }

    /// `rA`, or 0 when the field is zero.
    #[inline]
    pub(crate) fn gpr_or_zero(&self, n: usize) -> u32 {
        if n == 0 {
            0
        } else {
            self.state.gpr[n]
        }
    }

    pub(crate) fn record(&mut self, insn: GuestInstruction, result: u32) {
        if insn.rc() {
            self.state.update_cr0(result);
        }
    }

    /// Record form of the float instructions: CR1 takes FPSCR[FX,FEX,VX,OX].
    pub(crate) fn record_fp(&mut self, insn: GuestInstruction) {
        if insn.rc() {
            let fpscr = self.state.fpscr;
            self.state.set_cr_field(1, (fpscr >> 28) as u8);
        }
    }

    /// Raise PROGRAM when running in user mode. Returns whether the
    /// instruction may proceed.
    pub(crate) fn supervisor(&mut self) -> bool {
        if self.state.msr & msr::PR != 0 {
            self.state.raise_program(program::PRIVILEGED);
            false
        } else {
            true
        }
    }

    // -- Effective addresses --

    /// D-form: `(rA|0) + d`.
    #[inline]
    pub(crate) fn ea_d(&self, insn: GuestInstruction) -> u32 {
        self.gpr_or_zero(insn.ra()).wrapping_add(insn.simm16() as u32)
    }

    /// D-form with update: `rA + d`.
    #[inline]
    pub(crate) fn ea_du(&self, insn: GuestInstruction) -> u32 {
        self.gpr(insn.ra()).wrapping_add(insn.simm16() as u32)
    }

    /// X-form: `(rA|0) + rB`.
    #[inline]
    pub(crate) fn ea_x(&self, insn: GuestInstruction) -> u32 {
        self.gpr_or_zero(insn.ra()).wrapping_add(self.gpr(insn.rb()))
    }

    /// X-form with update: `rA + rB`.
    #[inline]
    pub(crate) fn ea_xu(&self, insn: GuestInstruction) -> u32 {
        self.gpr(insn.ra()).wrapping_add(self.gpr(insn.rb()))
    }

    // -- Memory --

    /// Checked read; a fault raises DSI and returns `None`.
    pub(crate) fn read(&mut self, size: AccessSize, addr: u32) -> Option<u64> {
        match self.mem.read_sized(size, addr) {
            Ok(v) => Some(v),
            Err(fault) => {
                self.state.raise_dsi(fault.address, false);
                None
            }
        }
    }

    /// Checked write; a fault raises DSI and returns `false`.
    pub(crate) fn write(&mut self, size: AccessSize, value: u64, addr: u32) -> bool {
        match self.mem.write_sized(size, value, addr) {
            Ok(()) => true,
            Err(fault) => {
                self.state.raise_dsi(fault.address, true);
                false
            }
        }
    }
}

fn is_mtmsr(insn: GuestInstruction) -> bool {
    insn.opcd() == 31 && insn.subop10() == 146
}

/// Interpreter routine for an opcode name, `None` for subtable markers.
pub fn lookup(name: &str) -> Option<InterpretFn> {
    use branch::*;
    use float::*;
    use integer::*;
    use loadstore::*;
    use paired::*;
    use system::*;

    let f: InterpretFn = match name {
        "unknown_instruction" => unknown,

        // -- Integer --
        "addi" => addi,
        "addis" => addis,
        "addic" | "addic_rc" => addic,
        "subfic" => subfic,
        "mulli" => mulli,
        "cmpi" => cmpi,
        "cmpli" => cmpli,
        "cmp" => cmp,
        "cmpl" => cmpl,
        "ori" => ori,
        "oris" => oris,
        "xori" => xori,
        "xoris" => xoris,
        "andi_rc" => andi_rc,
        "andis_rc" => andis_rc,
        "rlwimix" => rlwimix,
        "rlwinmx" => rlwinmx,
        "rlwnmx" => rlwnmx,
        "addx" | "addox" => addx,
        "addcx" | "addcox" => addcx,
        "addex" | "addeox" => addex,
        "addmex" | "addmeox" => addmex,
        "addzex" | "addzeox" => addzex,
        "subfx" | "subfox" => subfx,
        "subfcx" | "subfcox" => subfcx,
        "subfex" | "subfeox" => subfex,
        "subfmex" | "subfmeox" => subfmex,
        "subfzex" | "subfzeox" => subfzex,
        "negx" | "negox" => negx,
        "mullwx" | "mullwox" => mullwx,
        "mulhwx" => mulhwx,
        "mulhwux" => mulhwux,
        "divwx" | "divwox" => divwx,
        "divwux" | "divwuox" => divwux,
        "andx" => andx,
        "andcx" => andcx,
        "orx" => orx,
        "orcx" => orcx,
        "norx" => norx,
        "xorx" => xorx,
        "nandx" => nandx,
        "eqvx" => eqvx,
        "slwx" => slwx,
        "srwx" => srwx,
        "srawx" => srawx,
        "srawix" => srawix,
        "cntlzwx" => cntlzwx,
        "extsbx" => extsbx,
        "extshx" => extshx,
        "tw" => tw,
        "twi" => twi,

        // -- Load/store --
        "lwz" => lwz,
        "lwzu" => lwzu,
        "lbz" => lbz,
        "lbzu" => lbzu,
        "lhz" => lhz,
        "lhzu" => lhzu,
        "lha" => lha,
        "lhau" => lhau,
        "stw" => stw,
        "stwu" => stwu,
        "sth" => sth,
        "sthu" => sthu,
        "stb" => stb,
        "stbu" => stbu,
        "lwzx" => lwzx,
        "lwzux" => lwzux,
        "lhzx" => lhzx,
        "lhzux" => lhzux,
        "lhax" => lhax,
        "lhaux" => lhaux,
        "lbzx" => lbzx,
        "lbzux" => lbzux,
        "lwbrx" => lwbrx,
        "lhbrx" => lhbrx,
        "stwx" => stwx,
        "stwux" => stwux,
        "sthx" => sthx,
        "sthux" => sthux,
        "stbx" => stbx,
        "stbux" => stbux,
        "stwbrx" => stwbrx,
        "sthbrx" => sthbrx,
        "lmw" => lmw,
        "stmw" => stmw,
        "lswi" => lswi,
        "lswx" => lswx,
        "stswi" => stswi,
        "stswx" => stswx,
        "lwarx" => lwarx,
        "stwcxd" => stwcxd,
        "lfs" => lfs,
        "lfsu" => lfsu,
        "lfsx" => lfsx,
        "lfsux" => lfsux,
        "lfd" => lfd,
        "lfdu" => lfdu,
        "lfdx" => lfdx,
        "lfdux" => lfdux,
        "stfs" => stfs,
        "stfsu" => stfsu,
        "stfsx" => stfsx,
        "stfsux" => stfsux,
        "stfd" => stfd,
        "stfdu" => stfdu,
        "stfdx" => stfdx,
        "stfdux" => stfdux,
        "stfiwx" => stfiwx,
        "dcbz" => dcbz,
        "dcbz_l" => dcbz_l,
        "dcbi" => dcbi,
        "dcbst" | "dcbf" | "dcbt" | "dcbtst" | "dcba" => cache_hint,
        "icbi" => icbi,
        "eciwx" => eciwx,
        "ecowx" => ecowx,

        // -- Branch --
        "bx" => bx,
        "bcx" => bcx,
        "bclrx" => bclrx,
        "bcctrx" => bcctrx,

        // -- System --
        "sc" => sc,
        "rfi" => rfi,
        "mtmsr" => mtmsr,
        "mfmsr" => mfmsr,
        "mtsr" => mtsr,
        "mtsrin" => mtsrin,
        "mfsr" => mfsr,
        "mfsrin" => mfsrin,
        "mfspr" => mfspr,
        "mtspr" => mtspr,
        "mftb" => mftb,
        "mfcr" => mfcr,
        "mtcrf" => mtcrf,
        "mcrxr" => mcrxr,
        "mcrf" => mcrf,
        "crand" => crand,
        "crandc" => crandc,
        "creqv" => creqv,
        "crnand" => crnand,
        "crnor" => crnor,
        "cror" => cror,
        "crorc" => crorc,
        "crxor" => crxor,
        "sync" | "eieio" | "isync" => no_op,
        "tlbie" | "tlbsync" => tlb_op,

        // -- Float --
        "faddx" => faddx,
        "fsubx" => fsubx,
        "fmulx" => fmulx,
        "fdivx" => fdivx,
        "faddsx" => faddsx,
        "fsubsx" => fsubsx,
        "fmulsx" => fmulsx,
        "fdivsx" => fdivsx,
        "fmaddx" => fmaddx,
        "fmsubx" => fmsubx,
        "fnmaddx" => fnmaddx,
        "fnmsubx" => fnmsubx,
        "fmaddsx" => fmaddsx,
        "fmsubsx" => fmsubsx,
        "fnmaddsx" => fnmaddsx,
        "fnmsubsx" => fnmsubsx,
        "fselx" => fselx,
        "fresx" => fresx,
        "frsqrtex" => frsqrtex,
        "frspx" => frspx,
        "fmrx" => fmrx,
        "fnegx" => fnegx,
        "fabsx" => fabsx,
        "fnabsx" => fnabsx,
        "fcmpu" | "fcmpo" => fcmp,
        "fctiwx" => fctiwx,
        "fctiwzx" => fctiwzx,
        "mffsx" => mffsx,
        "mtfsb0x" => mtfsb0x,
        "mtfsb1x" => mtfsb1x,
        "mtfsfix" => mtfsfix,
        "mtfsfx" => mtfsfx,
        "mcrfs" => mcrfs,

        // -- Paired singles --
        "ps_add" => ps_add,
        "ps_sub" => ps_sub,
        "ps_mul" => ps_mul,
        "ps_div" => ps_div,
        "ps_madd" => ps_madd,
        "ps_msub" => ps_msub,
        "ps_nmadd" => ps_nmadd,
        "ps_nmsub" => ps_nmsub,
        "ps_sum0" => ps_sum0,
        "ps_sum1" => ps_sum1,
        "ps_muls0" => ps_muls0,
        "ps_muls1" => ps_muls1,
        "ps_madds0" => ps_madds0,
        "ps_madds1" => ps_madds1,
        "ps_sel" => ps_sel,
        "ps_res" => ps_res,
        "ps_rsqrte" => ps_rsqrte,
        "ps_neg" => ps_neg,
        "ps_abs" => ps_abs,
        "ps_nabs" => ps_nabs,
        "ps_mr" => ps_mr,
        "ps_merge00" => ps_merge00,
        "ps_merge01" => ps_merge01,
        "ps_merge10" => ps_merge10,
        "ps_merge11" => ps_merge11,
        "ps_cmpu0" | "ps_cmpo0" => ps_cmp0,
        "ps_cmpu1" | "ps_cmpo1" => ps_cmp1,
        "psq_l" => psq_l,
        "psq_lu" => psq_lu,
        "psq_lx" => psq_lx,
        "psq_lux" => psq_lux,
        "psq_st" => psq_st,
        "psq_stu" => psq_stu,
        "psq_stx" => psq_stx,
        "psq_stux" => psq_stux,

        _ => return None,
    };
    Some(f)
}

/// Raise PROGRAM for an opcode with no meaning.
pub fn unknown(ip: &mut Interpreter<'_>, insn: GuestInstruction) {
    tracing::debug!(
        word = format_args!("{:#010x}", insn.hex()),
        pc = format_args!("{:#010x}", ip.state.pc),
        "unknown instruction"
    );
    ip.state.raise_program(program::ILLEGAL);
}
