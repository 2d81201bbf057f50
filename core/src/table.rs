//! Two-level opcode lookup table.
//!
//! The table is generic over the per-opcode routine type so that the same
//! structure serves the translator, the interpreter and tooling. It is
//! built once from a [`TemplateSet`]; every unpopulated slot resolves to
//! the unknown-instruction entry at index 0.

use thiserror::Error;

use crate::insn::GuestInstruction;
use crate::opcode::{
    OpCategory, OpFlags, OpTemplate, OpcodeDescriptor, PRIMARY_TEMPLATES, TABLE19_TEMPLATES,
    TABLE31_TEMPLATES, TABLE4_2_TEMPLATES, TABLE4_3_TEMPLATES, TABLE4_TEMPLATES,
    TABLE59_TEMPLATES, TABLE63_2_TEMPLATES, TABLE63_TEMPLATES, UNKNOWN_TEMPLATE,
};

/// Index into [`OpcodeTable::entries`]. Zero is the unknown instruction.
pub type OpIndex = u16;

pub const UNKNOWN_INDEX: OpIndex = 0;

const SUBTABLE_SIZE: usize = 1024;
const TABLE59_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("opcode collision in {table} slot {slot}: `{existing}` vs `{new}`")]
    Collision {
        table: &'static str,
        slot: u32,
        existing: &'static str,
        new: &'static str,
    },
    #[error("opcode {opcode} of `{name}` does not fit in {table}")]
    OutOfRange {
        table: &'static str,
        opcode: u32,
        name: &'static str,
    },
}

/// The template lists a table is built from.
#[derive(Debug, Clone, Copy)]
pub struct TemplateSet {
    pub primary: &'static [OpTemplate],
    pub table4: &'static [OpTemplate],
    pub table4_2: &'static [OpTemplate],
    pub table4_3: &'static [OpTemplate],
    pub table19: &'static [OpTemplate],
    pub table31: &'static [OpTemplate],
    pub table59: &'static [OpTemplate],
    pub table63: &'static [OpTemplate],
    pub table63_2: &'static [OpTemplate],
}

pub const GEKKO_TEMPLATES: TemplateSet = TemplateSet {
    primary: PRIMARY_TEMPLATES,
    table4: TABLE4_TEMPLATES,
    table4_2: TABLE4_2_TEMPLATES,
    table4_3: TABLE4_3_TEMPLATES,
    table19: TABLE19_TEMPLATES,
    table31: TABLE31_TEMPLATES,
    table59: TABLE59_TEMPLATES,
    table63: TABLE63_TEMPLATES,
    table63_2: TABLE63_2_TEMPLATES,
};

/// A descriptor and the routine bound to it.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeEntry<R> {
    pub desc: OpcodeDescriptor,
    pub routine: R,
}

/// Immutable two-level opcode table.
pub struct OpcodeTable<R> {
    entries: Vec<OpcodeEntry<R>>,
    primary: [OpIndex; 64],
    table4: Box<[OpIndex; SUBTABLE_SIZE]>,
    table19: Box<[OpIndex; SUBTABLE_SIZE]>,
    table31: Box<[OpIndex; SUBTABLE_SIZE]>,
    table59: [OpIndex; TABLE59_SIZE],
    table63: Box<[OpIndex; SUBTABLE_SIZE]>,
}

impl<R: Copy> OpcodeTable<R> {
    /// Build the Gekko table. `resolve` binds a routine to every
    /// descriptor and may add flags (e.g. [`OpFlags::INTERPRETED`]).
    pub fn build<F>(resolve: F) -> Result<Self, TableError>
    where
        F: FnMut(&OpcodeDescriptor) -> (R, OpFlags),
    {
        Self::build_from(&GEKKO_TEMPLATES, resolve)
    }

    pub fn build_from<F>(set: &TemplateSet, mut resolve: F) -> Result<Self, TableError>
    where
        F: FnMut(&OpcodeDescriptor) -> (R, OpFlags),
    {
        let mut builder = Builder {
            entries: Vec::new(),
            resolve: &mut resolve,
        };
        builder.push(&UNKNOWN_TEMPLATE);

        let mut primary = [UNKNOWN_INDEX; 64];
        for tmpl in set.primary {
            let idx = builder.push(tmpl);
            claim(&mut primary, "primary", tmpl.opcode, idx, &builder.entries)?;
        }

        let mut table4 = Box::new([UNKNOWN_INDEX; SUBTABLE_SIZE]);
        for tmpl in set.table4_2 {
            let idx = builder.push(tmpl);
            for fill in 0..32 {
                let slot = (fill << 5) | tmpl.opcode;
                claim(&mut table4[..], "table4", slot, idx, &builder.entries)?;
            }
        }
        for tmpl in set.table4_3 {
            let idx = builder.push(tmpl);
            for fill in 0..16 {
                let slot = (fill << 6) | tmpl.opcode;
                claim(&mut table4[..], "table4", slot, idx, &builder.entries)?;
            }
        }
        for tmpl in set.table4 {
            let idx = builder.push(tmpl);
            claim(&mut table4[..], "table4", tmpl.opcode, idx, &builder.entries)?;
        }

        let table19 = builder.fill_simple(set.table19, "table19")?;
        let table31 = builder.fill_simple(set.table31, "table31")?;

        let mut table59 = [UNKNOWN_INDEX; TABLE59_SIZE];
        for tmpl in set.table59 {
            let idx = builder.push(tmpl);
            claim(&mut table59, "table59", tmpl.opcode, idx, &builder.entries)?;
        }

        let mut table63 = builder.fill_simple(set.table63, "table63")?;
        for tmpl in set.table63_2 {
            let idx = builder.push(tmpl);
            for fill in 0..32 {
                let slot = (fill << 5) | tmpl.opcode;
                claim(&mut table63[..], "table63", slot, idx, &builder.entries)?;
            }
        }

        let entries = builder.entries;
        tracing::info!(opcodes = entries.len(), "opcode table built");
        Ok(Self {
            entries,
            primary,
            table4,
            table19,
            table31,
            table59,
            table63,
        })
    }
}

impl<R> OpcodeTable<R> {
    /// Resolve an instruction to its entry index. One or two indexings.
    #[inline]
    pub fn index_of(&self, insn: GuestInstruction) -> OpIndex {
        match insn.opcd() {
            4 => self.table4[insn.subop10() as usize],
            19 => self.table19[insn.subop10() as usize],
            31 => self.table31[insn.subop10() as usize],
            59 => self.table59[insn.subop5() as usize],
            63 => self.table63[insn.subop10() as usize],
            op => self.primary[op as usize],
        }
    }

    #[inline]
    pub fn lookup(&self, insn: GuestInstruction) -> &OpcodeEntry<R> {
        &self.entries[self.index_of(insn) as usize]
    }

    #[inline]
    pub fn descriptor(&self, insn: GuestInstruction) -> &OpcodeDescriptor {
        &self.lookup(insn).desc
    }

    #[inline]
    pub fn entry(&self, index: OpIndex) -> &OpcodeEntry<R> {
        &self.entries[index as usize]
    }

    pub fn entries(&self) -> &[OpcodeEntry<R>] {
        &self.entries
    }

    /// Number of distinct entries including the unknown instruction and
    /// the subtable markers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find an entry by opcode name.
    pub fn find(&self, name: &str) -> Option<OpIndex> {
        self.entries
            .iter()
            .position(|e| e.desc.name == name)
            .map(|i| i as OpIndex)
    }
}

// ── Helpers ─────────────────────────────────────────────

struct Builder<'a, R, F> {
    entries: Vec<OpcodeEntry<R>>,
    resolve: &'a mut F,
}

impl<R, F> Builder<'_, R, F>
where
    F: FnMut(&OpcodeDescriptor) -> (R, OpFlags),
{
    fn push(&mut self, tmpl: &OpTemplate) -> OpIndex {
        let mut desc = tmpl.descriptor();
        let (routine, extra) = (self.resolve)(&desc);
        if desc.category != OpCategory::Subtable {
            desc.flags |= extra;
        }
        self.entries.push(OpcodeEntry { desc, routine });
        (self.entries.len() - 1) as OpIndex
    }

    fn fill_simple(
        &mut self,
        templates: &[OpTemplate],
        table: &'static str,
    ) -> Result<Box<[OpIndex; SUBTABLE_SIZE]>, TableError> {
        let mut slots = Box::new([UNKNOWN_INDEX; SUBTABLE_SIZE]);
        for tmpl in templates {
            let idx = self.push(tmpl);
            claim(&mut slots[..], table, tmpl.opcode, idx, &self.entries)?;
        }
        Ok(slots)
    }
}

fn claim<R>(
    slots: &mut [OpIndex],
    table: &'static str,
    slot: u32,
    idx: OpIndex,
    entries: &[OpcodeEntry<R>],
) -> Result<(), TableError> {
    let new = entries[idx as usize].desc.name;
    let Some(cell) = slots.get_mut(slot as usize) else {
        return Err(TableError::OutOfRange {
            table,
            opcode: slot,
            name: new,
        });
    };
    if *cell != UNKNOWN_INDEX {
        return Err(TableError::Collision {
            table,
            slot,
            existing: entries[*cell as usize].desc.name,
            new,
        });
    }
    *cell = idx;
    Ok(())
}
