use gekko_core::opcode::{OpCategory, OpTemplate};
use gekko_core::table::UNKNOWN_INDEX;
use gekko_core::{GuestInstruction, OpFlags, OpcodeTable, TableError, TemplateSet, GEKKO_TEMPLATES};
use gekko_frontend::gekko_table;

use crate::asm::*;

fn names() -> OpcodeTable<()> {
    OpcodeTable::build(|_| ((), OpFlags::empty())).unwrap()
}

#[test]
fn resolves_every_table_level() {
    let table = names();
    let name = |w: u32| table.descriptor(GuestInstruction(w)).name;
    assert_eq!(name(addi(3, 1, 8)), "addi");
    assert_eq!(name(add(3, 4, 5, false)), "addx");
    assert_eq!(name(BLR), "bclrx");
    assert_eq!(name(fadds(1, 2, 3)), "faddsx");
    assert_eq!(name(fadd(1, 2, 3)), "faddx");
    assert_eq!(name(fmul(1, 2, 3)), "fmulx");
    assert_eq!(name(fmr(1, 2)), "fmrx");
}

#[test]
fn five_bit_table63_forms_ignore_upper_bits() {
    let table = names();
    // fmul carries frC in the upper five bits of the secondary field.
    for fc in 0..32 {
        let insn = GuestInstruction(fmul(1, 2, fc));
        assert_eq!(table.descriptor(insn).name, "fmulx");
    }
}

#[test]
fn unpopulated_slots_are_unknown() {
    let table = names();
    assert_eq!(table.index_of(GuestInstruction(0)), UNKNOWN_INDEX);
    assert_eq!(table.index_of(GuestInstruction(x_form(0, 0, 0, 1, false))), UNKNOWN_INDEX);
    let desc = table.descriptor(GuestInstruction(1 << 26));
    assert_eq!(desc.category, OpCategory::Unknown);
    assert!(desc.ends_block());
}

#[test]
fn find_by_name() {
    let table = names();
    let idx = table.find("lwz").unwrap();
    assert_eq!(table.index_of(GuestInstruction(lwz(3, 0, 1))), idx);
    assert!(table.find("no_such_op").is_none());
}

#[test]
fn descriptors_carry_flags() {
    let table = names();
    let lfd_desc = table.descriptor(GuestInstruction(lfd(1, 0, 3)));
    assert!(lfd_desc.uses_fpu());
    assert!(lfd_desc.is_load_store());
    assert!(table.descriptor(GuestInstruction(b(8))).ends_block());
    assert!(!table.descriptor(GuestInstruction(add(1, 2, 3, false))).ends_block());
}

const DUPLICATE_PRIMARY: &[OpTemplate] = &[
    OpTemplate {
        opcode: 14,
        name: "addi",
        category: OpCategory::Integer,
        cycles: 1,
        flags: OpFlags::OUT_D,
    },
    OpTemplate {
        opcode: 14,
        name: "addi_shadow",
        category: OpCategory::Integer,
        cycles: 1,
        flags: OpFlags::OUT_D,
    },
];

#[test]
fn duplicate_slot_is_a_collision() {
    let set = TemplateSet {
        primary: DUPLICATE_PRIMARY,
        ..GEKKO_TEMPLATES
    };
    let err = OpcodeTable::<()>::build_from(&set, |_| ((), OpFlags::empty()))
        .err()
        .unwrap();
    assert_eq!(
        err,
        TableError::Collision {
            table: "primary",
            slot: 14,
            existing: "addi",
            new: "addi_shadow",
        }
    );
}

const OUT_OF_RANGE: &[OpTemplate] = &[OpTemplate {
    opcode: 64,
    name: "bogus",
    category: OpCategory::Integer,
    cycles: 1,
    flags: OpFlags::empty(),
}];

#[test]
fn oversized_opcode_is_rejected() {
    let set = TemplateSet {
        primary: OUT_OF_RANGE,
        ..GEKKO_TEMPLATES
    };
    let err = OpcodeTable::<()>::build_from(&set, |_| ((), OpFlags::empty()))
        .err()
        .unwrap();
    assert!(matches!(err, TableError::OutOfRange { opcode: 64, .. }));
}

#[test]
fn gekko_table_marks_interpreted_opcodes() {
    let table = gekko_table().unwrap();
    let divw_desc = table.descriptor(GuestInstruction(divw(3, 4, 5)));
    assert!(divw_desc.is_interpreted());
    let add_desc = table.descriptor(GuestInstruction(add(3, 4, 5, false)));
    assert!(!add_desc.is_interpreted());
}
