pub mod block;
pub mod config;
pub mod insn;
pub mod memory;
pub mod opcode;
pub mod regset;
pub mod state;
pub mod table;

pub use block::{BlockId, CodeBlock, ExitRecord, JumpCache, LinkState, JMP_CACHE_SIZE};
pub use config::JitConfig;
pub use insn::{decode, GuestInstruction};
pub use memory::{AccessSize, GuestMemory, MemoryFault, GATHER_PIPE_ADDRESS, GATHER_PIPE_BURST};
pub use opcode::{OpCategory, OpFlags, OpTemplate, OpcodeDescriptor};
pub use regset::RegSet;
pub use state::{PairedSingle, PpcState, StateSlot, GEKKO_PVR};
pub use table::{OpIndex, OpcodeEntry, OpcodeTable, TableError, TemplateSet, GEKKO_TEMPLATES};
