//! acc24: a 24-bit accumulator machine with no register file.
//!
//! Every instruction is one 24-bit word: an 8-bit opcode in bits 23..16
//! and a 16-bit operand below it. Arithmetic goes through the implicit
//! accumulator; jumps are absolute.

use super::{bare, common_directives, imm_field, Arch, Component, InstrDef};

/// `opcode` over a 16-bit address operand.
fn addressed(mnemonic: &'static str, opcode: u64) -> InstrDef {
    InstrDef {
        mnemonic,
        operands: Component::expr(),
        opcode: opcode << 16,
        fields: vec![imm_field(0, 16, 0, false)],
        mem_form: false,
    }
}

/// The acc24 target.
pub fn acc24() -> Arch {
    Arch {
        name: "acc24",
        word_bits: 24,
        addr_bits: 16,
        registers: Vec::new(),
        instructions: vec![
            InstrDef {
                // Load a signed constant into the accumulator.
                mnemonic: "ldc",
                operands: Component::expr(),
                opcode: 0x01 << 16,
                fields: vec![imm_field(0, 16, 0, true)],
                mem_form: false,
            },
            addressed("ldv", 0x02),
            addressed("stv", 0x03),
            addressed("add", 0x10),
            addressed("and", 0x11),
            addressed("or", 0x12),
            addressed("xor", 0x13),
            bare("not", 0x14 << 16),
            addressed("jmp", 0x20),
            // Jump if the accumulator is negative.
            addressed("jmn", 0x21),
            bare("halt", 0xF0 << 16),
        ],
        directives: common_directives(),
    }
}
