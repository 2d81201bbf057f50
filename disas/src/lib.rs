//! Gekko disassembler.
//!
//! Renders guest instruction words as `mnemonic` plus `operands` with a
//! flag set for tooling. Illegal encodings are data, never errors.

pub mod gekko;

pub use gekko::{
    disassemble, disassemble_at, fpr_name, gpr_name, render, render_at, render_endian, spr_name,
    DisasFlags, Disassembly, NO_MEMORY,
};
