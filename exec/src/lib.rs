//! Execution engine: guest memory, the block cache, fastmem fault
//! recovery and the dispatch loop tying them to the translator.

pub mod block_cache;
pub mod exec_loop;
pub mod fault;
pub mod memory;

pub use block_cache::BlockCache;
pub use exec_loop::{Jit, RunExit};
pub use fault::FaultRecovery;
pub use memory::{GatherPipe, Memory, DEFAULT_RAM_SIZE, HW_REGS_BASE, HW_REGS_SIZE};

use gekko_backend::{FaultError, HostError};
use gekko_core::TableError;

#[derive(Debug, thiserror::Error)]
pub enum JitError {
    #[error("opcode table: {0}")]
    Table(#[from] TableError),
    #[error("code buffer allocation failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("generated code: {0}")]
    Host(#[from] HostError),
    #[error("fault recovery: {0}")]
    Fault(#[from] FaultError),
    #[error("block at {pc:#010x} does not fit in an empty code buffer")]
    CodeSpaceExhausted { pc: u32 },
}
