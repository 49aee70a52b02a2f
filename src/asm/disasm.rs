//! Disassembling words back into mnemonic text.
//!
//! This is driven by the same [`InstrDef`] tables the assembler encodes
//! from: a word decodes as the first instruction whose fixed bits it
//! matches, and each field is extracted and printed back. Words that match
//! nothing become `.word` records, so the output is always re-assemblable.

use crate::arch::{bit_mask, Arch, FieldKind, InstrDef};

/// One disassembled word.
#[derive(Debug, PartialEq, Clone)]
pub struct DecodedInstr {
    /// The word's address.
    pub addr: u64,
    /// The raw word.
    pub raw: u64,
    /// The rendered assembly text.
    pub text: String,
    /// The computed target address, if this is a pc-relative branch.
    pub branch_target: Option<u64>,
    /// Whether the word matched an instruction (a `.word` record if not).
    pub valid: bool,
}

/// Sign-extends the low `width` bits of `raw`.
fn sext(raw: u64, width: u32) -> i64 {
    let sh = 64 - width;
    ((raw << sh) as i64) >> sh
}

/// The canonical name of register `n`.
fn reg_name(arch: &Arch, n: u8) -> String {
    arch.registers
        .iter()
        .find(|r| r.number == n)
        .map(|r| r.names[0].to_string())
        .unwrap_or_else(|| format!("r{n}"))
}

/// One rendered operand, keyed for source-order output.
enum Rendered {
    Reg(String),
    Num(i64),
    Addr(u64),
}
impl std::fmt::Display for Rendered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rendered::Reg(name) => f.write_str(name),
            Rendered::Num(v) => write!(f, "{v}"),
            Rendered::Addr(a) => write!(f, "{a:#x}"),
        }
    }
}

fn render(ins: &InstrDef, word: u64, addr: u64, arch: &Arch) -> DecodedInstr {
    let mut operands: Vec<(usize, Rendered)> = Vec::new();
    let mut branch_target = None;

    for f in &ins.fields {
        let raw = (word >> f.shift) & bit_mask(f.width);
        let (operand, r) = match f.kind {
            FieldKind::Reg { operand } => (operand, Rendered::Reg(reg_name(arch, raw as u8))),
            FieldKind::Imm { operand, signed } => {
                let v = match signed {
                    true => sext(raw, f.width),
                    false => raw as i64,
                };
                (operand, Rendered::Num(v))
            }
            FieldKind::PcRel { operand, adjust } => {
                let t = (addr as i64 + adjust + sext(raw, f.width)) as u64 & bit_mask(arch.addr_bits);
                branch_target = Some(t);
                (operand, Rendered::Addr(t))
            }
        };
        operands.push((operand, r));
    }
    operands.sort_by_key(|(i, _)| *i);

    let text = match (ins.mem_form, operands.as_slice()) {
        // `op rd, [base]` / `op rd, [base + off]` / `op rd, [base - off]`
        (true, [(_, rd), (_, base), (_, Rendered::Num(off))]) => match off {
            0 => format!("{} {rd}, [{base}]", ins.mnemonic),
            o if *o < 0 => format!("{} {rd}, [{base} - {}]", ins.mnemonic, -o),
            o => format!("{} {rd}, [{base} + {o}]", ins.mnemonic),
        },
        _ if operands.is_empty() => ins.mnemonic.to_string(),
        _ => {
            let rendered: Vec<String> = operands.iter().map(|(_, r)| r.to_string()).collect();
            format!("{} {}", ins.mnemonic, rendered.join(", "))
        }
    };

    DecodedInstr { addr, raw: word, text, branch_target, valid: true }
}

/// Disassembles a run of words starting at address `start`.
///
/// Produces exactly one record per input word.
pub fn disassemble(words: &[u64], start: u64, arch: &Arch) -> Vec<DecodedInstr> {
    words
        .iter()
        .enumerate()
        .map(|(i, &word)| {
            let addr = start + i as u64;
            let decoded = (word & !arch.word_mask() == 0)
                .then(|| {
                    arch.instructions
                        .iter()
                        .find(|ins| word & ins.fixed_mask(arch.word_bits) == ins.opcode)
                })
                .flatten();
            match decoded {
                Some(ins) => render(ins, word, addr, arch),
                None => DecodedInstr {
                    addr,
                    raw: word,
                    text: format!(".word {word:#x}"),
                    branch_target: None,
                    valid: false,
                },
            }
        })
        .collect()
}
