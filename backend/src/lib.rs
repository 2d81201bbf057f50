pub mod backpatch;
pub mod code_buffer;
pub mod regcache;
pub mod vm;

pub use backpatch::{emit_trampoline, BackpatchSite, FaultError, TrapHandler};
pub use code_buffer::CodeBuffer;
pub use regcache::{FlushMode, FprCache, GprCache, Location, NoHint, RegCache, UsageHint};
pub use vm::{HostContext, HostCpu, HostEnv, HostError, HostExit, HostFault, VmCodeGen};

use vm::ExitCode;

/// Trait for host code generators.
///
/// Owns the shared return stubs generated code exits through and the one
/// in-place rewrite the translator performs: retargeting a `Jmp`.
pub trait HostCodeGen {
    /// Emit the return stubs at the start of the buffer. Generated code
    /// starts at `code_gen_start()` afterwards.
    fn emit_epilogue(&mut self, buf: &mut CodeBuffer);

    /// Patch a direct jump at `jump_offset` to point to `target_offset`.
    /// Used for block linking and unlinking.
    fn patch_jump(&self, buf: &mut CodeBuffer, jump_offset: usize, target_offset: usize);

    /// Offset of the stub returning `code` to the dispatcher.
    fn exit_stub(&self, code: ExitCode) -> usize;

    /// Offset of the plain dispatcher return.
    fn epilogue_offset(&self) -> usize {
        self.exit_stub(ExitCode::Dispatch)
    }

    fn code_gen_start(&self) -> usize;
}
