//! Gekko front end: block analysis, the interpreter and the translator.
//!
//! [`tables`] binds every opcode to an interpreter routine and, where one
//! exists, an inline translation. [`analyzer`] turns guest memory into
//! [`AnalyzedBlock`]s, [`jit`] emits host code for them and [`interp`]
//! executes whatever the translator does not handle inline.

pub mod analyzer;
pub mod interp;
pub mod jit;
pub mod tables;

pub use analyzer::{AnalyzedBlock, BlockAnalyzer, CodeOp, Lookahead};
pub use interp::{InterpretFn, Interpreter};
pub use jit::{compile_block, BlockReport, CompileEnv, EmitError, InterpCall, JitFn, Translator};
pub use tables::{build_gekko_table, build_table_from, gekko_table, GekkoTable, OpRoutines, OpStats};
