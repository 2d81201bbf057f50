//! The Gekko opcode table with its interpreter and translator routines,
//! and the per-opcode statistics kept alongside it.

use std::sync::OnceLock;

use gekko_core::opcode::OpCategory;
use gekko_core::{OpFlags, OpIndex, OpcodeDescriptor, OpcodeTable, TableError, TemplateSet};

use crate::interp::{self, InterpretFn};
use crate::jit::{self, JitFn};

/// Routines bound to one opcode.
#[derive(Clone, Copy)]
pub struct OpRoutines {
    pub interp: InterpretFn,
    /// Inline translation, `None` when the translator calls the
    /// interpreter instead.
    pub jit: Option<JitFn>,
}

impl std::fmt::Debug for OpRoutines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpRoutines")
            .field("jit", &self.jit.is_some())
            .finish()
    }
}

pub type GekkoTable = OpcodeTable<OpRoutines>;

fn resolve(desc: &OpcodeDescriptor) -> (OpRoutines, OpFlags) {
    if matches!(desc.category, OpCategory::Subtable | OpCategory::Unknown) {
        let routines = OpRoutines {
            interp: interp::unknown,
            jit: None,
        };
        return (routines, OpFlags::empty());
    }
    let routines = OpRoutines {
        interp: interp::lookup(desc.name).unwrap_or(interp::unknown),
        jit: jit::lookup(desc.name),
    };
    let extra = if routines.jit.is_none() {
        OpFlags::INTERPRETED
    } else {
        OpFlags::empty()
    };
    (routines, extra)
}

/// Build a table from an explicit template set. Opcodes without an inline
/// translation are flagged [`OpFlags::INTERPRETED`].
pub fn build_table_from(templates: &TemplateSet) -> Result<GekkoTable, TableError> {
    OpcodeTable::build_from(templates, resolve)
}

pub fn build_gekko_table() -> Result<GekkoTable, TableError> {
    OpcodeTable::build(resolve)
}

static GEKKO_TABLE: OnceLock<Result<GekkoTable, TableError>> = OnceLock::new();

/// The process-wide table, built on first use.
pub fn gekko_table() -> Result<&'static GekkoTable, TableError> {
    GEKKO_TABLE
        .get_or_init(build_gekko_table)
        .as_ref()
        .map_err(Clone::clone)
}

// ── Statistics ──────────────────────────────────────────

/// Per-opcode counters: how often an opcode was compiled, and how often
/// compiled code fell back to the interpreter for it.
#[derive(Debug, Clone, Default)]
pub struct OpStats {
    compiled: Vec<u64>,
    fallbacks: Vec<u64>,
}

impl OpStats {
    pub fn new(table_len: usize) -> Self {
        Self {
            compiled: vec![0; table_len],
            fallbacks: vec![0; table_len],
        }
    }

    fn bump(counters: &mut Vec<u64>, index: OpIndex) {
        let i = index as usize;
        if i >= counters.len() {
            counters.resize(i + 1, 0);
        }
        counters[i] += 1;
    }

    pub fn record_compile(&mut self, index: OpIndex) {
        Self::bump(&mut self.compiled, index);
    }

    pub fn record_fallback(&mut self, index: OpIndex) {
        Self::bump(&mut self.fallbacks, index);
    }

    pub fn compiled(&self, index: OpIndex) -> u64 {
        self.compiled.get(index as usize).copied().unwrap_or(0)
    }

    pub fn fallbacks(&self, index: OpIndex) -> u64 {
        self.fallbacks.get(index as usize).copied().unwrap_or(0)
    }

    /// The `n` opcodes that fell back most often, by name.
    pub fn top_fallbacks(&self, table: &GekkoTable, n: usize) -> Vec<(&'static str, u64)> {
        let mut rows: Vec<(&'static str, u64)> = self
            .fallbacks
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(i, &count)| (table.entry(i as OpIndex).desc.name, count))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        rows.truncate(n);
        rows
    }

    pub fn reset(&mut self) {
        self.compiled.fill(0);
        self.fallbacks.fill(0);
    }
}
