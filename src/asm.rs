//! Assembling parse trees into object images.
//!
//! Assembly is two passes over one tree:
//!
//! 1. **Emission**: walk the statements in order, growing one [`Section`]
//!    per section kind. Expressions that resolve now are encoded now;
//!    expressions that mention a label (whose address depends on layout)
//!    are emitted as placeholder words with a [`LateFixup`] queued.
//! 2. **Ordering**: assign each section a base address from the
//!    [`LinkerLayout`], then resolve every queued fixup in order and patch
//!    its bits into the placeholder word.
//!
//! A value that overflows its field is reported as an error on the token
//! that produced it, but the truncated bits are still written: the output
//! image never changes length because of a diagnostic.

pub mod disasm;

use std::cell::Cell;
use std::collections::HashMap;

use crate::arch::{bit_mask, Arch, DirectiveAction, FieldKind, InstrDef};
use crate::ast::{EvalErr, Expr, Node, NodeKind, Operand, StrExpr, SymbolEnv, Value};
use crate::err::Diagnostics;
use crate::parse::lex::{Token, TokenKind};

/// How deep symbol-to-symbol definitions may chain before resolution
/// gives up (this also catches definition cycles).
const MAX_RESOLVE_DEPTH: u32 = 64;

/// The section kinds the assembler knows.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum SectionKind {
    /// Code.
    Text,
    /// Initialized data.
    Data,
    /// Read-only data.
    Rodata,
    /// Zero-initialized data.
    Bss,
}
impl SectionKind {
    /// The conventional section name.
    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Text => ".text",
            SectionKind::Data => ".data",
            SectionKind::Rodata => ".rodata",
            SectionKind::Bss => ".bss",
        }
    }
}
impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One contiguous run of words in the output image.
#[derive(Debug, Clone)]
pub struct Section {
    /// Which kind of section this is.
    pub kind: SectionKind,
    /// The base address, assigned by the ordering pass.
    /// `None` until then.
    pub base: Option<u64>,
    /// The section's words, one per address.
    pub words: Vec<u64>,
    fixups: Vec<LateFixup>,
}
impl Section {
    fn new(kind: SectionKind) -> Self {
        Section { kind, base: None, words: Vec::new(), fixups: Vec::new() }
    }

    /// The address of the word at `offset`, once a base is assigned.
    pub fn addr(&self, offset: u64) -> Option<u64> {
        self.base.map(|b| b + offset)
    }
}

/// How a fixup's resolved value relates to addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixupKind {
    /// The value is used as-is.
    Absolute,
    /// The value is a target address; the field holds
    /// `target - (own address + adjust)`.
    PcRelative { adjust: i64 },
}

/// The range a field value must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeCheck {
    Signed,
    Unsigned,
    /// Accepts the union of both, for raw data words.
    Either,
}

impl RangeCheck {
    fn fits(self, v: i128, width: u32) -> bool {
        let lo_signed = -(1i128 << (width - 1));
        let hi_signed = (1i128 << (width - 1)) - 1;
        let hi_unsigned = (1i128 << width) - 1;
        match self {
            RangeCheck::Signed => (lo_signed..=hi_signed).contains(&v),
            RangeCheck::Unsigned => (0..=hi_unsigned).contains(&v),
            RangeCheck::Either => (lo_signed..=hi_unsigned).contains(&v),
        }
    }
}

/// A deferred patch: an expression whose value wasn't known during
/// emission, and the bit field it must land in.
#[derive(Debug, Clone)]
struct LateFixup {
    /// The token blamed if resolution or the range check fails.
    token: usize,
    /// The word offset in the owning section.
    offset: usize,
    shift: u32,
    width: u32,
    check: RangeCheck,
    kind: FixupKind,
    target: Expr,
}

/// Where each section kind is placed in the address space.
///
/// Entries are applied in order: an explicit `start` moves the cursor, an
/// `align` rounds it up, and each section then occupies its length in
/// words. The default puts `.text` at `0x1000` with the data sections
/// packed after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkerLayout {
    /// The placement entries, in address order.
    pub entries: Vec<LayoutEntry>,
}

/// One section placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    /// Which section this places.
    pub kind: SectionKind,
    /// An explicit base address, or `None` to continue after the previous
    /// section.
    pub start: Option<u64>,
    /// Round the base up to a multiple of this.
    pub align: Option<u64>,
}

impl Default for LinkerLayout {
    fn default() -> Self {
        LinkerLayout {
            entries: vec![
                LayoutEntry { kind: SectionKind::Text, start: Some(0x1000), align: None },
                LayoutEntry { kind: SectionKind::Data, start: None, align: None },
                LayoutEntry { kind: SectionKind::Rodata, start: None, align: None },
                LayoutEntry { kind: SectionKind::Bss, start: None, align: None },
            ],
        }
    }
}

/// How a symbol was defined.
#[derive(Debug, Clone)]
enum SymbolDefn {
    /// A known value.
    Value(Value),
    /// A lazily evaluated numeric expression.
    Expr(Expr),
    /// A lazily evaluated string expression.
    StrExpr(StrExpr),
    /// A position in a section; its address exists once the section has a
    /// base.
    Label { section: usize, offset: u64 },
}

/// Every symbol defined in one compile.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    map: HashMap<String, (SymbolDefn, usize)>,
}
impl SymbolTable {
    fn define(
        &mut self,
        name: &str,
        defn: SymbolDefn,
        token: usize,
        tokens: &[Token],
        diags: &mut Diagnostics,
    ) {
        match self.map.contains_key(name) {
            true => diags.report(
                token,
                tokens[token].span.clone(),
                &AsmErrKind::DuplicateSymbol(name.to_string()),
            ),
            false => {
                self.map.insert(name.to_string(), (defn, token));
            }
        }
    }

    /// Iterates over every defined symbol name.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.map.keys().map(|s| s.as_str())
    }

    /// Whether `name` is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }
}

/// Any errors raised while assembling.
#[derive(Debug, PartialEq, Clone)]
enum AsmErrKind {
    /// A symbol has two definitions.
    DuplicateSymbol(String),
    /// A resolved value does not fit its bit field.
    FieldOverflow { value: i128, width: u32 },
    /// An alignment operand was not a positive, reasonable number.
    BadAlignment(i128),
    /// A space/skip operand was negative or unreasonably large.
    BadSpace(i128),
    /// An instruction operand the encoding needs was not there.
    MissingOperand,
    /// An operand held a register where a value was needed, or the
    /// other way around.
    WrongOperand,
    /// Expression evaluation failed.
    Eval(EvalErr),
}
impl std::fmt::Display for AsmErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AsmErrKind::DuplicateSymbol(name) => write!(f, "symbol '{name}' is defined multiple times"),
            AsmErrKind::FieldOverflow { value, width } => {
                write!(f, "value {value} does not fit in a {width}-bit field")
            }
            AsmErrKind::BadAlignment(n) => write!(f, "invalid alignment {n}"),
            AsmErrKind::BadSpace(n) => write!(f, "invalid size {n}"),
            AsmErrKind::MissingOperand => f.write_str("missing operand"),
            AsmErrKind::WrongOperand => f.write_str("wrong kind of operand"),
            AsmErrKind::Eval(e) => e.fmt(f),
        }
    }
}
impl std::error::Error for AsmErrKind {}
impl crate::err::Error for AsmErrKind {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            AsmErrKind::DuplicateSymbol(_) => Some("labels and assignments share one namespace".into()),
            AsmErrKind::FieldOverflow { .. } => Some("the truncated bits are kept in the output".into()),
            AsmErrKind::BadAlignment(_) => Some("alignment must be between 1 and 65536".into()),
            AsmErrKind::BadSpace(_) => Some("size must be between 0 and 65536".into()),
            AsmErrKind::MissingOperand => None,
            AsmErrKind::WrongOperand => None,
            AsmErrKind::Eval(e) => e.help(),
        }
    }
}

/// Resolves symbols against the table and (optionally) section bases.
///
/// During emission `labels_known` is false and labels resolve to
/// [`EvalErr::Unresolved`], deferring their uses to fixups. After the
/// ordering pass they resolve to addresses.
struct Resolver<'a> {
    symbols: &'a SymbolTable,
    sections: &'a [Section],
    labels_known: bool,
    depth: Cell<u32>,
}

impl Resolver<'_> {
    /// Resolves an expression that may name a string: a bare symbol
    /// reference passes its value through unchanged, anything else
    /// must evaluate numerically.
    fn value_of(&self, e: &Expr) -> Result<Value, EvalErr> {
        match e {
            Expr::Operand(Operand::Sym { name, .. }) => self.resolve(name),
            _ => e.value(self, None).map(Value::Num),
        }
    }

    fn resolve_inner(&self, name: &str) -> Result<Value, EvalErr> {
        let Some((defn, _)) = self.symbols.map.get(name) else {
            return Err(EvalErr::Unresolved(name.to_string()));
        };
        match defn {
            SymbolDefn::Value(v) => Ok(v.clone()),
            SymbolDefn::Expr(e) => self.value_of(e),
            SymbolDefn::StrExpr(s) => s.value(self).map(Value::Str),
            SymbolDefn::Label { section, offset } => {
                match self.labels_known {
                    false => Err(EvalErr::Unresolved(name.to_string())),
                    true => self.sections[*section]
                        .addr(*offset)
                        .map(|a| Value::Num(a as i128))
                        .ok_or_else(|| EvalErr::Unresolved(name.to_string())),
                }
            }
        }
    }
}

impl SymbolEnv for Resolver<'_> {
    fn resolve(&self, name: &str) -> Result<Value, EvalErr> {
        let d = self.depth.get();
        if d >= MAX_RESOLVE_DEPTH {
            return Err(EvalErr::ResolutionDepth);
        }
        self.depth.set(d + 1);
        let out = self.resolve_inner(name);
        self.depth.set(d);
        out
    }
}

/// The output of one assembly: placed sections plus the symbol table.
#[derive(Debug, Clone)]
pub struct Object {
    /// The sections that received any content, in first-use order.
    pub sections: Vec<Section>,
    symbols: SymbolTable,
}

impl Object {
    /// The section of the given kind, if the source used it.
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// The defined symbols.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Resolves a symbol to its final value (labels included).
    pub fn symbol_value(&self, name: &str) -> Result<Value, EvalErr> {
        let r = Resolver {
            symbols: &self.symbols,
            sections: &self.sections,
            labels_known: true,
            depth: Cell::new(0),
        };
        r.resolve(name)
    }
}

/// One operand of an instruction or directive, in source order.
enum OpRef<'a> {
    /// A register token.
    Reg(u8, usize),
    /// An expression child node.
    Expr(&'a Expr, usize),
    /// A string expression child node.
    Str(&'a StrExpr, usize),
}
impl OpRef<'_> {
    fn token(&self) -> usize {
        match self {
            OpRef::Reg(_, t) | OpRef::Expr(_, t) | OpRef::Str(_, t) => *t,
        }
    }
}

/// The first non-trivia token a node consumed, for anchoring diagnostics.
fn anchor_token(tokens: &[Token], node: &Node) -> usize {
    node.tokens
        .clone()
        .find(|&t| !tokens[t].is_trivia())
        .unwrap_or(node.tokens.start)
}

/// Collects a body node's operands in source order: register tokens from
/// its consumed range plus its expression child nodes.
fn collect_operands<'a>(tokens: &[Token], node: &'a Node) -> Vec<OpRef<'a>> {
    let mut ops = Vec::new();
    let mut children = node.children.iter().peekable();
    let mut t = node.tokens.start;
    while t < node.tokens.end {
        if let Some(child) = children.peek() {
            if child.tokens.start <= t {
                let child = children.next().unwrap_or_else(|| unreachable!());
                match &child.kind {
                    NodeKind::Expr(e) => ops.push(OpRef::Expr(e, anchor_token(tokens, child))),
                    NodeKind::StrExpr(s) => ops.push(OpRef::Str(s, anchor_token(tokens, child))),
                    _ => {}
                }
                t = child.tokens.end.max(t + 1);
                continue;
            }
        }
        if let TokenKind::RegisterKw(n) = tokens[t].kind {
            ops.push(OpRef::Reg(n, t));
        }
        t += 1;
    }
    ops
}

/// The index of the section of `kind`, creating it on first use.
fn section_index(sections: &mut Vec<Section>, kind: SectionKind) -> usize {
    match sections.iter().position(|s| s.kind == kind) {
        Some(i) => i,
        None => {
            sections.push(Section::new(kind));
            sections.len() - 1
        }
    }
}

/// Assembles a parse tree into an [`Object`].
///
/// Always returns an object; problems are reported through `diags` and
/// leave placeholder words behind, so the image's shape is stable under
/// errors.
pub fn assemble(
    tokens: &[Token],
    root: &Node,
    arch: &Arch,
    layout: &LinkerLayout,
    diags: &mut Diagnostics,
) -> Object {
    let mut sections: Vec<Section> = Vec::new();
    let mut symbols = SymbolTable::default();
    let mut current = section_index(&mut sections, SectionKind::Text);

    // Emission pass.
    for stmt in root.statements() {
        for part in &stmt.children {
            match &part.kind {
                NodeKind::Label(name) => {
                    let offset = sections[current].words.len() as u64;
                    symbols.define(
                        name,
                        SymbolDefn::Label { section: current, offset },
                        anchor_token(tokens, part),
                        tokens,
                        diags,
                    );
                }
                NodeKind::SymbolDef(name) => {
                    let defn = match part.children.first().map(|c| &c.kind) {
                        Some(NodeKind::Expr(e)) => SymbolDefn::Expr(e.clone()),
                        Some(NodeKind::StrExpr(s)) => SymbolDefn::StrExpr(s.clone()),
                        _ => continue,
                    };
                    symbols.define(name, defn, anchor_token(tokens, part), tokens, diags);
                }
                NodeKind::Directive(idx) => {
                    apply_directive(
                        tokens, part, *idx, arch, &mut sections, &mut current, &mut symbols, diags,
                    );
                }
                NodeKind::Instruction(idx) => {
                    encode_instruction(
                        tokens, part, &arch.instructions[*idx], arch, &mut sections, current, &symbols,
                        diags,
                    );
                }
                _ => {}
            }
        }
    }

    // Ordering pass: assign bases.
    let mut cursor: u64 = 0;
    for entry in &layout.entries {
        let Some(si) = sections.iter().position(|s| s.kind == entry.kind) else {
            continue;
        };
        if let Some(start) = entry.start {
            cursor = start;
        }
        if let Some(align) = entry.align.filter(|&a| a > 1) {
            cursor = (cursor + align - 1) / align * align;
        }
        sections[si].base = Some(cursor);
        cursor += sections[si].words.len() as u64;
    }
    // Sections the layout doesn't mention are packed at the end.
    for s in sections.iter_mut() {
        if s.base.is_none() {
            s.base = Some(cursor);
            cursor += s.words.len() as u64;
        }
    }

    log::debug!(
        "assembled {} section(s): {}",
        sections.len(),
        sections
            .iter()
            .map(|s| format!("{} {} words @ {:#x}", s.kind, s.words.len(), s.base.unwrap_or(0)))
            .collect::<Vec<_>>()
            .join(", ")
    );

    // Resolve fixups, in emission order per section.
    let pending: Vec<(usize, Vec<LateFixup>)> = sections
        .iter_mut()
        .enumerate()
        .map(|(i, s)| (i, std::mem::take(&mut s.fixups)))
        .collect();
    for (si, fixes) in pending {
        for f in fixes {
            let resolved = {
                let r = Resolver {
                    symbols: &symbols,
                    sections: &sections,
                    labels_known: true,
                    depth: Cell::new(0),
                };
                f.target.value(&r, None)
            };
            let target = match resolved {
                Ok(v) => v,
                Err(e) => {
                    report(diags, tokens, f.token, AsmErrKind::Eval(e));
                    continue;
                }
            };
            let value = match f.kind {
                FixupKind::Absolute => target,
                FixupKind::PcRelative { adjust } => {
                    let own = sections[si].base.unwrap_or(0) + f.offset as u64;
                    target - (own as i128 + adjust as i128)
                }
            };
            if !f.check.fits(value, f.width) {
                report(diags, tokens, f.token, AsmErrKind::FieldOverflow { value, width: f.width });
            }
            let bits = (value as u64) & bit_mask(f.width);
            let word = &mut sections[si].words[f.offset];
            *word = (*word & !(bit_mask(f.width) << f.shift)) | (bits << f.shift);
        }
    }

    Object { sections, symbols }
}

fn report(diags: &mut Diagnostics, tokens: &[Token], token: usize, kind: AsmErrKind) {
    diags.report(token, tokens[token].span.clone(), &kind);
}

/// Evaluates `e` with labels still unplaced.
fn eval_emission(symbols: &SymbolTable, sections: &[Section], e: &Expr) -> Result<i128, EvalErr> {
    let r = Resolver { symbols, sections, labels_known: false, depth: Cell::new(0) };
    e.value(&r, None)
}

fn value_emission(symbols: &SymbolTable, sections: &[Section], e: &Expr) -> Result<Value, EvalErr> {
    let r = Resolver { symbols, sections, labels_known: false, depth: Cell::new(0) };
    r.value_of(e)
}

fn str_emission(symbols: &SymbolTable, sections: &[Section], s: &StrExpr) -> Result<String, EvalErr> {
    let r = Resolver { symbols, sections, labels_known: false, depth: Cell::new(0) };
    s.value(&r)
}

#[allow(clippy::too_many_arguments)]
fn apply_directive(
    tokens: &[Token],
    node: &Node,
    idx: usize,
    arch: &Arch,
    sections: &mut Vec<Section>,
    current: &mut usize,
    symbols: &mut SymbolTable,
    diags: &mut Diagnostics,
) {
    let ops = collect_operands(tokens, node);
    match arch.directives[idx].action {
        DirectiveAction::Section(kind) => {
            *current = section_index(sections, kind);
        }

        DirectiveAction::Data { bits } => {
            let width = bits.unwrap_or(arch.word_bits);
            for op in &ops {
                let OpRef::Expr(e, token) = op else {
                    report(diags, tokens, op.token(), AsmErrKind::WrongOperand);
                    continue;
                };
                match eval_emission(symbols, sections, e) {
                    Ok(v) => {
                        if !RangeCheck::Either.fits(v, width) {
                            report(diags, tokens, *token, AsmErrKind::FieldOverflow { value: v, width });
                        }
                        sections[*current].words.push((v as u64) & bit_mask(width));
                    }
                    Err(EvalErr::Unresolved(_)) => {
                        let offset = sections[*current].words.len();
                        sections[*current].words.push(0);
                        sections[*current].fixups.push(LateFixup {
                            token: *token,
                            offset,
                            shift: 0,
                            width,
                            check: RangeCheck::Either,
                            kind: FixupKind::Absolute,
                            target: (*e).clone(),
                        });
                    }
                    Err(e) => {
                        report(diags, tokens, *token, AsmErrKind::Eval(e));
                        sections[*current].words.push(0);
                    }
                }
            }
        }

        DirectiveAction::Ascii { terminated } => {
            let mask = arch.word_mask();
            for op in &ops {
                match op {
                    OpRef::Str(s, token) => {
                        match str_emission(symbols, sections, s) {
                            Ok(text) => {
                                let sec = &mut sections[*current];
                                sec.words.extend(text.chars().map(|c| c as u64 & mask));
                                if terminated {
                                    sec.words.push(0);
                                }
                            }
                            // String content sizes the section, so it
                            // cannot wait for a fixup.
                            Err(e) => report(diags, tokens, *token, AsmErrKind::Eval(e)),
                        }
                    }
                    OpRef::Expr(e, token) => match value_emission(symbols, sections, e) {
                        Ok(Value::Str(text)) => {
                            let sec = &mut sections[*current];
                            sec.words.extend(text.chars().map(|c| c as u64 & mask));
                            if terminated {
                                sec.words.push(0);
                            }
                        }
                        Ok(Value::Num(v)) => {
                            sections[*current].words.push((v as u64) & mask);
                        }
                        Err(e) => report(diags, tokens, *token, AsmErrKind::Eval(e)),
                    },
                    OpRef::Reg(..) => report(diags, tokens, op.token(), AsmErrKind::WrongOperand),
                }
            }
        }

        DirectiveAction::Align => {
            let Some(OpRef::Expr(e, token)) = ops.first() else {
                report(diags, tokens, anchor_token(tokens, node), AsmErrKind::MissingOperand);
                return;
            };
            match eval_emission(symbols, sections, e) {
                Ok(n) if (1..=65536).contains(&n) => {
                    let sec = &mut sections[*current];
                    while sec.words.len() as i128 % n != 0 {
                        sec.words.push(0);
                    }
                }
                Ok(n) => report(diags, tokens, *token, AsmErrKind::BadAlignment(n)),
                Err(e) => report(diags, tokens, *token, AsmErrKind::Eval(e)),
            }
        }

        DirectiveAction::Space => {
            let Some(OpRef::Expr(e, token)) = ops.first() else {
                report(diags, tokens, anchor_token(tokens, node), AsmErrKind::MissingOperand);
                return;
            };
            match eval_emission(symbols, sections, e) {
                Ok(n) if (0..=65536).contains(&n) => {
                    let sec = &mut sections[*current];
                    sec.words.extend(std::iter::repeat(0).take(n as usize));
                }
                Ok(n) => report(diags, tokens, *token, AsmErrKind::BadSpace(n)),
                Err(e) => report(diags, tokens, *token, AsmErrKind::Eval(e)),
            }
        }

        DirectiveAction::Define => {
            // The name is the symbol token before the value node.
            let value_start = node.children.first().map_or(node.tokens.end, |c| c.tokens.start);
            let name_tok = (node.tokens.start..value_start)
                .find(|&t| matches!(tokens[t].kind, TokenKind::Symbol));
            let Some(name_tok) = name_tok else {
                report(diags, tokens, anchor_token(tokens, node), AsmErrKind::MissingOperand);
                return;
            };
            let defn = match node.children.first().map(|c| &c.kind) {
                Some(NodeKind::Expr(e)) => SymbolDefn::Expr(e.clone()),
                Some(NodeKind::StrExpr(s)) => SymbolDefn::StrExpr(s.clone()),
                _ => {
                    report(diags, tokens, name_tok, AsmErrKind::MissingOperand);
                    return;
                }
            };
            let name = tokens[name_tok].text.clone();
            symbols.define(&name, defn, name_tok, tokens, diags);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn encode_instruction(
    tokens: &[Token],
    node: &Node,
    entry: &InstrDef,
    arch: &Arch,
    sections: &mut Vec<Section>,
    current: usize,
    symbols: &SymbolTable,
    diags: &mut Diagnostics,
) {
    let ops = collect_operands(tokens, node);
    let offset = sections[current].words.len();
    let mut word = entry.opcode & arch.word_mask();
    let mut fixups: Vec<LateFixup> = Vec::new();

    for field in &entry.fields {
        match field.kind {
            FieldKind::Reg { operand } => match ops.get(operand) {
                Some(OpRef::Reg(n, _)) => {
                    word |= ((*n as u64) & bit_mask(field.width)) << field.shift;
                }
                Some(op) => report(diags, tokens, op.token(), AsmErrKind::WrongOperand),
                None => report(diags, tokens, anchor_token(tokens, node), AsmErrKind::MissingOperand),
            },

            FieldKind::Imm { operand, signed } => {
                let check = match signed {
                    true => RangeCheck::Signed,
                    false => RangeCheck::Unsigned,
                };
                match ops.get(operand) {
                    Some(OpRef::Expr(e, token)) => match eval_emission(symbols, sections, e) {
                        Ok(v) => {
                            if !check.fits(v, field.width) {
                                report(
                                    diags, tokens, *token,
                                    AsmErrKind::FieldOverflow { value: v, width: field.width },
                                );
                            }
                            word |= ((v as u64) & bit_mask(field.width)) << field.shift;
                        }
                        Err(EvalErr::Unresolved(_)) => fixups.push(LateFixup {
                            token: *token,
                            offset,
                            shift: field.shift,
                            width: field.width,
                            check,
                            kind: FixupKind::Absolute,
                            target: (*e).clone(),
                        }),
                        Err(e) => report(diags, tokens, *token, AsmErrKind::Eval(e)),
                    },
                    Some(op) => report(diags, tokens, op.token(), AsmErrKind::WrongOperand),
                    // An omitted optional offset encodes as zero.
                    None => {}
                }
            }

            FieldKind::PcRel { operand, adjust } => match ops.get(operand) {
                // The field depends on this word's final address, so it is
                // always a fixup, even for a constant target.
                Some(OpRef::Expr(e, token)) => fixups.push(LateFixup {
                    token: *token,
                    offset,
                    shift: field.shift,
                    width: field.width,
                    check: RangeCheck::Signed,
                    kind: FixupKind::PcRelative { adjust },
                    target: (*e).clone(),
                }),
                Some(op) => report(diags, tokens, op.token(), AsmErrKind::WrongOperand),
                None => report(diags, tokens, anchor_token(tokens, node), AsmErrKind::MissingOperand),
            },
        }
    }

    sections[current].words.push(word);
    sections[current].fixups.extend(fixups);
}

#[cfg(test)]
mod tests {
    use super::{assemble, LinkerLayout, Object, SectionKind};
    use crate::arch;
    use crate::ast::Value;
    use crate::err::Diagnostics;
    use crate::parse::{lex::tokenize, parse_tree};

    fn asm(src: &str) -> (Object, Diagnostics) {
        let a = arch::risc16();
        let tokens = tokenize(src, &a);
        let mut diags = Diagnostics::new();
        let root = parse_tree(&tokens, &a, &mut diags);
        let obj = assemble(&tokens, &root, &a, &LinkerLayout::default(), &mut diags);
        (obj, diags)
    }

    fn text_words(obj: &Object) -> &[u64] {
        &obj.section(SectionKind::Text).unwrap().words
    }

    #[test]
    fn test_register_encoding() {
        let (obj, diags) = asm("add r1, r2, r3\n");
        assert!(!diags.has_errors());
        // opcode 1, rd=1, ra=2, rb=3
        assert_eq!(text_words(&obj), [0x1000 | 1 << 9 | 2 << 6 | 3]);
    }

    #[test]
    fn test_forward_branch_fixup() {
        let (obj, diags) = asm("start: bra target\n nop\ntarget: nop\n");
        assert!(!diags.has_errors());
        // target = 0x1002; field = 0x1002 - (0x1000 + 1) = 1
        assert_eq!(text_words(&obj), [0x9001, 0x0000, 0x0000]);
        assert_eq!(obj.symbol_value("target"), Ok(Value::Num(0x1002)));
    }

    #[test]
    fn test_backward_branch() {
        let (obj, diags) = asm("top: nop\n bra top\n");
        assert!(!diags.has_errors());
        // field = 0x1000 - (0x1001 + 1) = -2, 9 bits -> 0x1FE
        assert_eq!(text_words(&obj), [0x0000, 0x9000 | 0x1FE]);
    }

    #[test]
    fn test_branch_out_of_range() {
        let (obj, diags) = asm("bra top\n.space 600\ntop: nop\n");
        // 601 words ahead: outside the signed 9-bit range.
        assert_eq!(diags.error_count(), 1);
        // Truncated bits are still written; the image keeps its shape.
        assert_eq!(text_words(&obj).len(), 602);
    }

    #[test]
    fn test_overflow_keeps_length() {
        let (obj, diags) = asm(".byte 300\n.byte 44\n");
        assert_eq!(diags.error_count(), 1);
        // Both emit one word; the overflowing one is truncated to 8 bits.
        assert_eq!(text_words(&obj), [44, 44]);
    }

    #[test]
    fn test_sections_and_layout() {
        let (obj, diags) = asm(".text\nnop\n.data\n.word 5\nv: .word 6\n");
        assert!(!diags.has_errors());

        let text = obj.section(SectionKind::Text).unwrap();
        let data = obj.section(SectionKind::Data).unwrap();
        assert_eq!(text.base, Some(0x1000));
        assert_eq!(data.base, Some(0x1001));
        assert_eq!(data.words, [5, 6]);
        assert_eq!(obj.symbol_value("v"), Ok(Value::Num(0x1002)));
    }

    #[test]
    fn test_word_label_reference() {
        let (obj, diags) = asm(".word target\ntarget: nop\n");
        assert!(!diags.has_errors());
        assert_eq!(text_words(&obj), [0x1001, 0x0000]);
    }

    #[test]
    fn test_symbol_chains() {
        let (obj, diags) = asm("x = y + 1\ny = 2\n.word x\n");
        assert!(!diags.has_errors());
        assert_eq!(text_words(&obj), [3]);
    }

    #[test]
    fn test_symbol_cycle_reported() {
        let (obj, diags) = asm("a = b\nb = a\n.word a\n");
        assert!(diags.has_errors());
        assert_eq!(text_words(&obj), [0]);
    }

    #[test]
    fn test_duplicate_symbol() {
        let (_, diags) = asm("a: nop\na: nop\n");
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn test_align_space_ascii() {
        let (obj, diags) = asm(".word 1\n.align 4\n.word 2\n");
        assert!(!diags.has_errors());
        assert_eq!(text_words(&obj), [1, 0, 0, 0, 2]);

        let (obj, diags) = asm(".space 3\n");
        assert!(!diags.has_errors());
        assert_eq!(text_words(&obj), [0, 0, 0]);

        let (obj, diags) = asm(".asciz \"AB\"\n");
        assert!(!diags.has_errors());
        assert_eq!(text_words(&obj), [65, 66, 0]);

        let (_, diags) = asm(".align 0\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_equ_and_string_symbols() {
        let (obj, diags) = asm(".equ size, 4 * 2\n.word size\n");
        assert!(!diags.has_errors());
        assert_eq!(text_words(&obj), [8]);

        let (obj, diags) = asm("name = \"A\" \"B\"\n.ascii name\n");
        assert!(!diags.has_errors());
        assert_eq!(text_words(&obj), [65, 66]);
    }

    #[test]
    fn test_memory_offset_encoding() {
        let (obj, diags) = asm("ld r1, [r2 + 3]\nld r1, [r2]\nst r4, [r5 - 1]\n");
        assert!(!diags.has_errors());
        assert_eq!(
            text_words(&obj),
            [
                0x7000 | 1 << 9 | 2 << 6 | 3,
                0x7000 | 1 << 9 | 2 << 6,
                0x8000 | 4 << 9 | 5 << 6 | 0x3F, // -1 in 6 bits
            ]
        );
    }
}
