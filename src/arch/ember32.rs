//! ember32: a 32-bit sixteen-register teaching machine.
//!
//! One 32-bit word per instruction, opcode in bits 31..24, 4-bit register
//! fields. Conditional branches test a register and take a signed 16-bit
//! pc-relative word offset; the unconditional branch gets 20 bits.

use super::{
    bare, common_directives, imm_field, mem_operands, pcrel_field, reg_field, reg_operands, Arch,
    Component, InstrDef, RegDef,
};

fn alu3(mnemonic: &'static str, opcode: u64) -> InstrDef {
    InstrDef {
        mnemonic,
        operands: reg_operands(3),
        opcode: opcode << 24,
        fields: vec![reg_field(20, 4, 0), reg_field(16, 4, 1), reg_field(12, 4, 2)],
        mem_form: false,
    }
}

fn mem(mnemonic: &'static str, opcode: u64) -> InstrDef {
    InstrDef {
        mnemonic,
        operands: mem_operands(),
        opcode: opcode << 24,
        fields: vec![
            reg_field(20, 4, 0),
            reg_field(16, 4, 1),
            imm_field(0, 12, 2, true),
        ],
        mem_form: true,
    }
}

fn reg_imm(mnemonic: &'static str, opcode: u64, width: u32) -> InstrDef {
    InstrDef {
        mnemonic,
        operands: Component::Seq(vec![
            Component::reg(),
            Component::comma(),
            Component::expr(),
        ]),
        opcode: opcode << 24,
        fields: vec![reg_field(20, 4, 0), imm_field(0, width, 1, true)],
        mem_form: false,
    }
}

fn cond_branch(mnemonic: &'static str, opcode: u64) -> InstrDef {
    InstrDef {
        mnemonic,
        operands: Component::Seq(vec![
            Component::reg(),
            Component::comma(),
            Component::expr(),
        ]),
        opcode: opcode << 24,
        fields: vec![reg_field(20, 4, 0), pcrel_field(0, 16, 1, 1)],
        mem_form: false,
    }
}

/// The ember32 target.
pub fn ember32() -> Arch {
    let mut registers: Vec<RegDef> = (0..16)
        .map(|n| RegDef {
            names: match n {
                0 => &["r0"], 1 => &["r1"], 2 => &["r2"], 3 => &["r3"],
                4 => &["r4"], 5 => &["r5"], 6 => &["r6"], 7 => &["r7"],
                8 => &["r8"], 9 => &["r9"], 10 => &["r10"], 11 => &["r11"],
                12 => &["r12"], 13 => &["r13"], 14 => &["r14"], _ => &["r15"],
            },
            number: n,
        })
        .collect();
    // Conventional aliases; the canonical r-names stay first so the
    // disassembler prints those.
    registers[14].names = &["r14", "sp"];
    registers[15].names = &["r15", "lr"];

    Arch {
        name: "ember32",
        word_bits: 32,
        addr_bits: 32,
        registers,
        instructions: vec![
            bare("nop", 0x00000000),
            alu3("add", 0x01),
            alu3("sub", 0x02),
            alu3("and", 0x03),
            alu3("or", 0x04),
            alu3("xor", 0x05),
            InstrDef {
                mnemonic: "addi",
                operands: Component::Seq(vec![
                    Component::reg(),
                    Component::comma(),
                    Component::reg(),
                    Component::comma(),
                    Component::expr(),
                ]),
                opcode: 0x10 << 24,
                fields: vec![
                    reg_field(20, 4, 0),
                    reg_field(16, 4, 1),
                    imm_field(0, 12, 2, true),
                ],
                mem_form: false,
            },
            reg_imm("li", 0x11, 16),
            mem("ldw", 0x20),
            mem("stw", 0x21),
            InstrDef {
                mnemonic: "b",
                operands: Component::expr(),
                opcode: 0x30 << 24,
                fields: vec![pcrel_field(0, 20, 0, 1)],
                mem_form: false,
            },
            cond_branch("bz", 0x31),
            cond_branch("bnz", 0x32),
            InstrDef {
                mnemonic: "jr",
                operands: Component::reg(),
                opcode: 0x33 << 24,
                fields: vec![reg_field(20, 4, 0)],
                mem_form: false,
            },
            bare("halt", 0xFF << 24),
        ],
        directives: common_directives(),
    }
}
