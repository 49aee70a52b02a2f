//! Architecture descriptors.
//!
//! An [`Arch`] is a plain data table: register names, instruction encodings,
//! and directives. The lexer probes it to classify keywords, the parser
//! pulls operand rules from it, and the assembler and disassembler walk its
//! field descriptions. Nothing else in the crate knows any instruction set;
//! adding a target means writing one of these tables.
//!
//! The bundled targets ([`risc16`], [`acc24`], [`ember32`]) are small
//! fixed-width teaching machines. Addresses count words, not bytes.

use crate::asm::SectionKind;
use crate::parse::rule::Component;
use crate::parse::NodeType;

mod acc24;
mod ember32;
mod risc16;

pub use acc24::acc24;
pub use ember32::ember32;
pub use risc16::risc16;

/// A complete description of one target machine.
#[derive(Debug)]
pub struct Arch {
    /// A short identifier, unique among the bundled targets.
    pub name: &'static str,
    /// Bits per machine word. Every instruction and data cell is one word.
    pub word_bits: u32,
    /// Bits per address.
    pub addr_bits: u32,
    /// The register file. Empty for accumulator machines.
    pub registers: Vec<RegDef>,
    /// The instruction table, probed in order.
    pub instructions: Vec<InstrDef>,
    /// The directive table, probed in order.
    pub directives: Vec<DirectiveDef>,
}

impl Arch {
    /// Finds a directive by name (case-insensitive), returning its index.
    pub fn find_directive(&self, text: &str) -> Option<usize> {
        self.directives.iter().position(|d| d.name.eq_ignore_ascii_case(text))
    }

    /// Finds an instruction by mnemonic (case-insensitive), returning its
    /// index.
    pub fn find_instruction(&self, text: &str) -> Option<usize> {
        self.instructions.iter().position(|i| i.mnemonic.eq_ignore_ascii_case(text))
    }

    /// Finds a register by any of its names (case-insensitive), returning
    /// its number.
    pub fn find_register(&self, text: &str) -> Option<u8> {
        self.registers
            .iter()
            .find(|r| r.names.iter().any(|n| n.eq_ignore_ascii_case(text)))
            .map(|r| r.number)
    }

    /// A mask covering one machine word.
    pub fn word_mask(&self) -> u64 {
        bit_mask(self.word_bits)
    }
}

/// A mask of the low `width` bits.
pub(crate) fn bit_mask(width: u32) -> u64 {
    match width >= 64 {
        true => u64::MAX,
        false => (1 << width) - 1,
    }
}

/// One architectural register.
#[derive(Debug)]
pub struct RegDef {
    /// Every name this register answers to. The first is canonical and is
    /// what the disassembler prints.
    pub names: &'static [&'static str],
    /// The number encoded into register fields.
    pub number: u8,
}

/// One instruction's syntax and encoding.
#[derive(Debug)]
pub struct InstrDef {
    /// The mnemonic.
    pub mnemonic: &'static str,
    /// The operand syntax, as a rule. [`Component::Nothing`] for
    /// zero-operand instructions.
    pub operands: Component,
    /// The fixed bits of the encoding, in place. Field bits must be zero
    /// here.
    pub opcode: u64,
    /// The variable fields, filled from operands.
    pub fields: Vec<FieldDef>,
    /// Whether operands 1 and 2 came from a `[base + offset]` memory
    /// operand (the disassembler prints them back in that form).
    pub mem_form: bool,
}

impl InstrDef {
    /// The bits of the word not claimed by any field. A word decodes as
    /// this instruction iff it matches `opcode` on this mask.
    pub fn fixed_mask(&self, word_bits: u32) -> u64 {
        let mut mask = bit_mask(word_bits);
        for f in &self.fields {
            mask &= !(bit_mask(f.width) << f.shift);
        }
        mask
    }
}

/// One bit field of an instruction encoding.
#[derive(Debug)]
pub struct FieldDef {
    /// The field's position from bit 0.
    pub shift: u32,
    /// The field's width in bits.
    pub width: u32,
    /// What fills the field.
    pub kind: FieldKind,
}

/// The source of a field's value. `operand` indexes the operand nodes the
/// instruction's rule produced (registers and expressions alike, in source
/// order).
#[derive(Debug)]
pub enum FieldKind {
    /// A register number.
    Reg {
        /// Which operand holds the register.
        operand: usize,
    },
    /// An immediate value, range-checked as signed or unsigned.
    Imm {
        /// Which operand holds the expression.
        operand: usize,
        /// Whether the field is sign-extended on decode.
        signed: bool,
    },
    /// A signed word offset holding `target - (own address + adjust)`.
    /// The bundled targets use `adjust = 1`, measuring from the word
    /// after the branch.
    PcRel {
        /// Which operand holds the target expression.
        operand: usize,
        /// Added to the instruction's own address before subtracting.
        adjust: i64,
    },
}

/// One directive's syntax and meaning.
#[derive(Debug)]
pub struct DirectiveDef {
    /// The directive's name, including the leading dot.
    pub name: &'static str,
    /// The operand syntax, as a rule.
    pub operands: Component,
    /// What the assembler does with it.
    pub action: DirectiveAction,
}

/// What a directive does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveAction {
    /// Switches the current section.
    Section(SectionKind),
    /// Emits one word per operand expression, range-checked at the given
    /// bit width (the full word width if `None`).
    Data {
        /// The check width.
        bits: Option<u32>,
    },
    /// Emits one word per character of each string operand.
    Ascii {
        /// Whether to append a NUL word after each string.
        terminated: bool,
    },
    /// Pads with zero words until the section offset is a multiple of the
    /// operand.
    Align,
    /// Emits the given number of zero words.
    Space,
    /// Defines a symbol, like `name = value`.
    Define,
}

/// The directive set shared by every bundled target.
pub fn common_directives() -> Vec<DirectiveDef> {
    use Component as C;

    let exprs = C::list(C::expr());
    let strs = C::list(C::Any(vec![C::str_expr(), C::expr()]));
    let defn = C::Seq(vec![
        C::Kind(crate::parse::rule::KindClass::Symbol),
        C::comma(),
        C::Any(vec![C::expr(), C::str_expr()]),
    ]);

    vec![
        DirectiveDef { name: ".text", operands: C::Nothing, action: DirectiveAction::Section(SectionKind::Text) },
        DirectiveDef { name: ".data", operands: C::Nothing, action: DirectiveAction::Section(SectionKind::Data) },
        DirectiveDef { name: ".rodata", operands: C::Nothing, action: DirectiveAction::Section(SectionKind::Rodata) },
        DirectiveDef { name: ".bss", operands: C::Nothing, action: DirectiveAction::Section(SectionKind::Bss) },
        DirectiveDef { name: ".word", operands: exprs.clone(), action: DirectiveAction::Data { bits: None } },
        DirectiveDef { name: ".byte", operands: exprs.clone(), action: DirectiveAction::Data { bits: Some(8) } },
        DirectiveDef { name: ".ascii", operands: strs.clone(), action: DirectiveAction::Ascii { terminated: false } },
        DirectiveDef { name: ".asciz", operands: strs, action: DirectiveAction::Ascii { terminated: true } },
        DirectiveDef { name: ".align", operands: C::expr(), action: DirectiveAction::Align },
        DirectiveDef { name: ".space", operands: C::expr(), action: DirectiveAction::Space },
        DirectiveDef { name: ".skip", operands: C::expr(), action: DirectiveAction::Space },
        DirectiveDef { name: ".equ", operands: defn, action: DirectiveAction::Define },
    ]
}

/// Shorthand used by the target tables.
pub(crate) fn reg_field(shift: u32, width: u32, operand: usize) -> FieldDef {
    FieldDef { shift, width, kind: FieldKind::Reg { operand } }
}

pub(crate) fn imm_field(shift: u32, width: u32, operand: usize, signed: bool) -> FieldDef {
    FieldDef { shift, width, kind: FieldKind::Imm { operand, signed } }
}

pub(crate) fn pcrel_field(shift: u32, width: u32, operand: usize, adjust: i64) -> FieldDef {
    FieldDef { shift, width, kind: FieldKind::PcRel { operand, adjust } }
}

/// `mnemonic` with no operands.
pub(crate) fn bare(mnemonic: &'static str, opcode: u64) -> InstrDef {
    InstrDef { mnemonic, operands: Component::Nothing, opcode, fields: Vec::new(), mem_form: false }
}

/// The operand rule for `reg, [reg]` / `reg, [reg + offset]` forms.
pub(crate) fn mem_operands() -> Component {
    use crate::parse::lex::Bracket;
    use crate::parse::rule::KindClass;
    use Component as C;

    C::Seq(vec![
        C::reg(),
        C::comma(),
        C::Kind(KindClass::Open(Bracket::Square)),
        C::reg(),
        C::Opt(Box::new(C::Node(NodeType::Expr))),
        C::Kind(KindClass::Close(Bracket::Square)),
    ])
}

/// The operand rule for `reg, reg, ..., reg` forms.
pub(crate) fn reg_operands(count: usize) -> Component {
    let mut parts = Vec::with_capacity(count * 2 - 1);
    for i in 0..count {
        if i > 0 {
            parts.push(Component::comma());
        }
        parts.push(Component::reg());
    }
    Component::Seq(parts)
}
