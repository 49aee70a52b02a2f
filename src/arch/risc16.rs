//! risc16: a 16-bit three-register teaching machine.
//!
//! Every instruction is one 16-bit word with the opcode in bits 15..12.
//! Register fields are 3 bits; branches are pc-relative with a signed
//! 9-bit word offset, measured from the address after the branch.

use super::{
    bare, common_directives, imm_field, mem_operands, pcrel_field, reg_field, reg_operands, Arch,
    Component, InstrDef, RegDef,
};

fn alu3(mnemonic: &'static str, opcode: u64) -> InstrDef {
    InstrDef {
        mnemonic,
        operands: reg_operands(3),
        opcode: opcode << 12,
        fields: vec![reg_field(9, 3, 0), reg_field(6, 3, 1), reg_field(0, 3, 2)],
        mem_form: false,
    }
}

fn mem(mnemonic: &'static str, opcode: u64) -> InstrDef {
    InstrDef {
        mnemonic,
        operands: mem_operands(),
        opcode: opcode << 12,
        fields: vec![
            reg_field(9, 3, 0),
            reg_field(6, 3, 1),
            imm_field(0, 6, 2, true),
        ],
        mem_form: true,
    }
}

fn branch(mnemonic: &'static str, opcode: u64) -> InstrDef {
    InstrDef {
        mnemonic,
        operands: Component::expr(),
        opcode: opcode << 12,
        fields: vec![pcrel_field(0, 9, 0, 1)],
        mem_form: false,
    }
}

/// The risc16 target.
pub fn risc16() -> Arch {
    Arch {
        name: "risc16",
        word_bits: 16,
        addr_bits: 16,
        registers: (0..8)
            .map(|n| RegDef {
                names: match n {
                    0 => &["r0"], 1 => &["r1"], 2 => &["r2"], 3 => &["r3"],
                    4 => &["r4"], 5 => &["r5"], 6 => &["r6"], _ => &["r7"],
                },
                number: n,
            })
            .collect(),
        instructions: vec![
            bare("nop", 0x0000),
            alu3("add", 0x1),
            alu3("sub", 0x2),
            alu3("and", 0x3),
            alu3("or", 0x4),
            alu3("xor", 0x5),
            InstrDef {
                mnemonic: "ldi",
                operands: Component::Seq(vec![
                    Component::reg(),
                    Component::comma(),
                    Component::expr(),
                ]),
                opcode: 0x6 << 12,
                fields: vec![reg_field(9, 3, 0), imm_field(0, 8, 1, true)],
                mem_form: false,
            },
            mem("ld", 0x7),
            mem("st", 0x8),
            branch("bra", 0x9),
            branch("beq", 0xA),
            branch("bne", 0xB),
            InstrDef {
                mnemonic: "jmp",
                operands: Component::reg(),
                opcode: 0xC << 12,
                fields: vec![reg_field(9, 3, 0)],
                mem_form: false,
            },
            bare("halt", 0xF000),
        ],
        directives: common_directives(),
    }
}
