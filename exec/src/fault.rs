//! Fault recovery for fastmem sites.
//!
//! Each site is either unguarded or patched. The first fault at a site
//! emits a trampoline into the reserved tail of the code buffer, rewrites
//! the site's region into a jump to it and resumes there. Later runs take
//! the jump and never fault again.

use std::collections::HashMap;
use std::ops::Range;

use gekko_backend::backpatch::TRAMPOLINE_MAX_SIZE;
use gekko_backend::vm::emitter::write_jmp_at;
use gekko_backend::{
    emit_trampoline, BackpatchSite, CodeBuffer, FaultError, HostContext, HostFault, TrapHandler,
};
use tracing::debug;

pub struct FaultRecovery {
    sites: HashMap<usize, BackpatchSite>,
    /// Patched sites and their trampolines.
    patched: HashMap<usize, usize>,
    region: Range<usize>,
    next: usize,
}

impl FaultRecovery {
    /// Trampolines are emitted into `region`.
    pub fn new(region: Range<usize>) -> Self {
        Self {
            sites: HashMap::new(),
            patched: HashMap::new(),
            next: region.start,
            region,
        }
    }

    pub fn register(&mut self, sites: &[BackpatchSite]) {
        self.sites.extend(sites.iter().map(|s| (s.fault_at, *s)));
    }

    pub fn site(&self, fault_at: usize) -> Option<&BackpatchSite> {
        self.sites.get(&fault_at)
    }

    pub fn is_patched(&self, fault_at: usize) -> bool {
        self.patched.contains_key(&fault_at)
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    pub fn patched_count(&self) -> usize {
        self.patched.len()
    }

    pub fn trampoline_bytes(&self) -> usize {
        self.next - self.region.start
    }

    /// Forget every site and trampoline. Only valid together with a
    /// block cache clear.
    pub fn clear(&mut self) {
        self.sites.clear();
        self.patched.clear();
        self.next = self.region.start;
    }

    fn emit(&mut self, buf: &mut CodeBuffer, site: &BackpatchSite) -> Result<usize, FaultError> {
        if self.next + TRAMPOLINE_MAX_SIZE > self.region.end {
            return Err(FaultError::TrampolineSpaceExhausted);
        }
        let (start, end) = buf.emit_at(self.next, |buf| emit_trampoline(buf, site));
        self.next = end;

        write_jmp_at(buf, site.region_start, site.region_len(), start);
        self.patched.insert(site.fault_at, start);
        debug!(
            site = site.fault_at,
            trampoline = start,
            guest = format_args!("{:#010x}", site.guest_pc),
            "backpatched"
        );
        Ok(start)
    }
}

/// Undo the displacement a site added into its own address register.
pub fn undo_offset(site: &BackpatchSite, ctx: &mut HostContext) {
    if site.offset_added {
        let reg = &mut ctx.regs[site.addr.index()];
        *reg = (*reg as u32).wrapping_sub(site.disp as u32) as u64;
    }
}

impl TrapHandler for FaultRecovery {
    fn handle_trap(
        &mut self,
        buf: &mut CodeBuffer,
        fault: &HostFault,
        ctx: &mut HostContext,
    ) -> Result<(), FaultError> {
        let site = *self
            .sites
            .get(&fault.pc)
            .ok_or(FaultError::NoSite { pc: fault.pc })?;
        let trampoline = match self.patched.get(&site.fault_at) {
            Some(&start) => start,
            None => self.emit(buf, &site)?,
        };
        undo_offset(&site, ctx);
        ctx.pc = trampoline;
        Ok(())
    }
}
