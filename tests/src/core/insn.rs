use gekko_core::insn::{branch_target, decode, rotate_mask};
use gekko_core::GuestInstruction;

use crate::asm::*;

#[test]
fn fields_of_d_form() {
    let insn = GuestInstruction(addi(3, 1, -8));
    assert_eq!(insn.opcd(), 14);
    assert_eq!(insn.rd(), 3);
    assert_eq!(insn.ra(), 1);
    assert_eq!(insn.simm16(), -8);
    assert_eq!(insn.uimm(), 0xFFF8);
}

#[test]
fn fields_of_x_form() {
    let insn = GuestInstruction(add(5, 6, 7, true));
    assert_eq!(decode(insn), (31, 266));
    assert_eq!((insn.rd(), insn.ra(), insn.rb()), (5, 6, 7));
    assert!(insn.rc());
    assert!(!insn.oe());
}

#[test]
fn spr_field_is_unswapped() {
    assert_eq!(GuestInstruction(mfspr(3, 8)).spr(), 8);
    assert_eq!(GuestInstruction(mtspr(920, 4)).spr(), 920);
}

#[test]
fn table59_uses_five_bit_secondary() {
    assert_eq!(decode(GuestInstruction(fadds(1, 2, 3))), (59, 21));
    assert_eq!(decode(GuestInstruction(lwz(3, 0, 1))), (32, 0));
}

#[test]
fn from_memory_swaps_little_endian() {
    let insn = GuestInstruction::from_memory(BLR.swap_bytes(), false);
    assert_eq!(insn.hex(), BLR);
    assert_eq!(GuestInstruction::from_memory(BLR, true).hex(), BLR);
}

#[test]
fn branch_displacements_sign_extend() {
    let back = GuestInstruction(b(-16));
    assert_eq!(back.li(), -16);
    let cond = GuestInstruction(bc(BO_TRUE, CR0_EQ, -8));
    assert_eq!(cond.bd(), -8);
    assert_eq!(cond.bo(), BO_TRUE);
    assert_eq!(cond.bi(), CR0_EQ);
}

#[test]
fn rotate_masks() {
    assert_eq!(rotate_mask(0, 31), 0xFFFF_FFFF);
    assert_eq!(rotate_mask(0, 29), 0xFFFF_FFFC);
    assert_eq!(rotate_mask(16, 31), 0x0000_FFFF);
    // mb > me wraps around.
    assert_eq!(rotate_mask(30, 1), 0xC000_0003);
}

#[test]
fn branch_targets() {
    assert_eq!(branch_target(0x8000_0100, -0x10, false), 0x8000_00F0);
    assert_eq!(branch_target(0x8000_0100, 0x100, true), 0x100);
    assert_eq!(branch_target(0xFFFF_FFFC, 8, false), 4);
}
