//! Fastmem sites and their slow-path trampolines.
//!
//! Every unguarded `LoadFast`/`StoreFast` is recorded as a
//! [`BackpatchSite`] when it is emitted. When one faults, the trap handler
//! emits a trampoline doing the checked access and overwrites the site's
//! region with a jump to it.

use gekko_core::{AccessSize, RegSet};

use crate::code_buffer::CodeBuffer;
use crate::vm::cpu::{HostContext, HostFault};
use crate::vm::emitter::{emit_jmp, emit_load_slow, emit_pop, emit_push, emit_store_slow, emit_unary};
use crate::vm::insn::UnaryOp;
use crate::vm::regs::Reg;

/// Upper bound on the size of one trampoline.
pub const TRAMPOLINE_MAX_SIZE: usize = 32;

/// Emission-time record of one unguarded access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackpatchSite {
    /// Offset of the `LoadFast`/`StoreFast` itself.
    pub fault_at: usize,
    /// Code replaced by the patch: address fixup, access, byte swap and
    /// sign extension.
    pub region_start: usize,
    pub region_end: usize,
    pub size: AccessSize,
    pub signed: bool,
    pub is_store: bool,
    /// Load destination, or the unswapped store source.
    pub value: Reg,
    pub addr: Reg,
    pub disp: i32,
    /// The region adds `disp` into `addr` before the access; recovery
    /// subtracts it again.
    pub offset_added: bool,
    /// Caller-saved host registers that must survive the slow access.
    pub live: RegSet,
    pub guest_pc: u32,
}

impl BackpatchSite {
    pub fn region_len(&self) -> usize {
        self.region_end - self.region_start
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FaultError {
    #[error("host fault at {pc:#x} has no backpatch site")]
    NoSite { pc: usize },
    #[error("trampoline region exhausted")]
    TrampolineSpaceExhausted,
}

/// Repairs faulting fast accesses.
pub trait TrapHandler {
    /// Handle `fault`. On success `ctx` is ready to resume.
    fn handle_trap(
        &mut self,
        buf: &mut CodeBuffer,
        fault: &HostFault,
        ctx: &mut HostContext,
    ) -> Result<(), FaultError>;
}

/// Emit the checked equivalent of `site`'s region at the current offset,
/// ending in a jump back to the region's end. Returns its start.
pub fn emit_trampoline(buf: &mut CodeBuffer, site: &BackpatchSite) -> usize {
    let start = buf.offset();
    let saved = if site.is_store {
        site.live
    } else {
        site.live.clear(site.value.index())
    };

    emit_push(buf, saved, RegSet::EMPTY);
    if site.is_store {
        emit_store_slow(buf, site.size, site.value, site.addr, site.disp);
    } else {
        emit_load_slow(buf, site.size, site.value, site.addr, site.disp);
        if site.signed && site.size == AccessSize::U16 {
            emit_unary(buf, UnaryOp::ExtS16, site.value);
        }
    }
    emit_pop(buf, saved, RegSet::EMPTY);
    emit_jmp(buf, site.region_end);

    debug_assert!(buf.offset() - start <= TRAMPOLINE_MAX_SIZE);
    start
}
