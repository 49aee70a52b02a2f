//! Components relating to the annotated parse trees built from assembly
//! source.
//!
//! These components together are used to construct...
//! - [`Node`] (one node of the parse tree, carrying the tokens it consumed),
//! - [`Expr`] (a numeric expression tree with lazy symbol resolution),
//! - and [`StrExpr`] (a string expression, evaluating to text).
//!
//! A tree is built once per compile and replaced wholesale on re-parse;
//! nodes reference tokens by index into the compile's token list, so
//! diagnostics attached to a token are visible from every node that
//! consumed it.

use std::ops::Range;

use crate::parse::lex::Op;

/// One node of the parse tree.
#[derive(Debug, PartialEq, Clone)]
pub struct Node {
    /// What this node is.
    pub kind: NodeKind,
    /// The range of token indices this node consumed
    /// (including any trivia folded in while matching).
    pub tokens: Range<usize>,
    /// Child nodes, in source order.
    pub children: Vec<Node>,
}
impl Node {
    /// Creates a childless node.
    pub fn new(kind: NodeKind, tokens: Range<usize>) -> Self {
        Node { kind, tokens, children: Vec::new() }
    }

    /// Creates a node with children.
    pub fn with_children(kind: NodeKind, tokens: Range<usize>, children: Vec<Node>) -> Self {
        Node { kind, tokens, children }
    }

    /// Iterates over the statement nodes of a root node.
    pub fn statements(&self) -> impl Iterator<Item = &Node> + '_ {
        self.children.iter().filter(|n| matches!(n.kind, NodeKind::Statement))
    }
}

/// The kind of a parse-tree [`Node`].
#[derive(Debug, PartialEq, Clone)]
pub enum NodeKind {
    /// The unique root of a file's tree. Children are statements.
    Root,
    /// One statement: optional label, optional body, terminator.
    Statement,
    /// A label definition (`name:`).
    Label(String),
    /// A symbol definition (`name = expr`). The child node holds the value
    /// expression; the name is the first symbol token in range.
    SymbolDef(String),
    /// A directive, holding the index into the architecture's directive
    /// table. Children are the operand nodes its rule produced.
    Directive(usize),
    /// An instruction, holding the index into the architecture's
    /// instruction table. Children are the operand nodes its rule produced.
    Instruction(usize),
    /// A numeric expression.
    Expr(Expr),
    /// A string expression.
    StrExpr(StrExpr),
}

/// A numeric expression tree.
///
/// Built by the expression parser from infix source text; evaluation is
/// lazy, so a tree referencing a label can be kept until the label's
/// address is known.
#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    /// A leaf operand.
    Operand(Operand),
    /// A prefix operator applied to an operand expression.
    Prefix(UnOp, Box<Expr>),
    /// A binary operator applied to two expressions.
    Binary(Box<Expr>, BinOp, Box<Expr>),
}

/// A leaf of an [`Expr`].
#[derive(Debug, PartialEq, Clone)]
pub enum Operand {
    /// A literal value (integer or char literal).
    Num(i128),
    /// A symbol reference, resolved at evaluation time.
    Sym {
        /// The symbol's name.
        name: String,
        /// The index of the referencing token (for diagnostics).
        token: usize,
    },
}

/// A prefix operator.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnOp {
    /// `+` (identity)
    Pos,
    /// `-` (negation)
    Neg,
    /// `~` (bitwise complement)
    Not,
}

/// A binary operator.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `|`
    Or,
    /// `&`
    And,
    /// `^`
    Xor,
    /// `!` (bit clear: `a ! b` is `a & ~b`)
    BitClear,
}
impl BinOp {
    pub(crate) fn from_op(op: Op) -> Option<BinOp> {
        match op {
            Op::Add      => Some(BinOp::Add),
            Op::Sub      => Some(BinOp::Sub),
            Op::Mul      => Some(BinOp::Mul),
            Op::Div      => Some(BinOp::Div),
            Op::Rem      => Some(BinOp::Rem),
            Op::Shl      => Some(BinOp::Shl),
            Op::Shr      => Some(BinOp::Shr),
            Op::Or       => Some(BinOp::Or),
            Op::And      => Some(BinOp::And),
            Op::Xor      => Some(BinOp::Xor),
            Op::BitClear => Some(BinOp::BitClear),
            Op::Not      => None,
        }
    }
}

/// The value of a symbol: a number or a piece of text.
#[derive(Debug, PartialEq, Clone)]
pub enum Value {
    /// A numeric value.
    Num(i128),
    /// A text value (from a string-valued definition).
    Str(String),
}

/// Resolves symbol names during expression evaluation.
///
/// The assembler provides implementations with different capabilities:
/// during the emission pass labels have no address yet and resolve to
/// [`EvalErr::Unresolved`]; after the ordering pass they resolve to their
/// final addresses.
pub trait SymbolEnv {
    /// Resolves a symbol to its value.
    fn resolve(&self, name: &str) -> Result<Value, EvalErr>;
}

/// An environment with no symbols at all.
///
/// Useful for evaluating constant expressions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymbols;
impl SymbolEnv for NoSymbols {
    fn resolve(&self, name: &str) -> Result<Value, EvalErr> {
        Err(EvalErr::Unresolved(name.to_string()))
    }
}

/// Any errors raised in evaluating an expression.
///
/// These are reportable conditions, not fatal ones: an unresolved symbol
/// during the emission pass simply means the evaluation is deferred to a
/// late fixup.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum EvalErr {
    /// A symbol's value is not (yet) known.
    Unresolved(String),
    /// Division or remainder by zero.
    DivideByZero,
    /// A string-valued symbol was used in a numeric context.
    NotNumeric(String),
    /// A numeric value was used in a string context.
    NotText(String),
    /// Symbol definitions chain too deeply (or form a cycle).
    ResolutionDepth,
}
impl std::fmt::Display for EvalErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalErr::Unresolved(name)  => write!(f, "symbol '{name}' is not resolved"),
            EvalErr::DivideByZero      => f.write_str("division by zero"),
            EvalErr::NotNumeric(name)  => write!(f, "symbol '{name}' has a string value"),
            EvalErr::NotText(name)     => write!(f, "symbol '{name}' has a numeric value"),
            EvalErr::ResolutionDepth   => f.write_str("symbol definitions nest too deeply"),
        }
    }
}
impl std::error::Error for EvalErr {}
impl crate::err::Error for EvalErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            EvalErr::Unresolved(_)   => Some("define the symbol with a label or an assignment".into()),
            EvalErr::DivideByZero    => None,
            EvalErr::NotNumeric(_)   => Some("this context needs a number, not a string".into()),
            EvalErr::NotText(_)      => Some("this context needs a string, not a number".into()),
            EvalErr::ResolutionDepth => Some("check for a cycle in symbol assignments".into()),
        }
    }
}

/// Truncates a value to `width` bits, two's-complement
/// (sign bit propagates back up).
fn truncate(v: i128, width: u32) -> i128 {
    let sh = 128 - width;
    (v << sh) >> sh
}

impl Expr {
    /// Evaluates the expression.
    ///
    /// Symbols are resolved through `env`; a symbol that is not yet known
    /// fails with [`EvalErr::Unresolved`], which callers use to defer
    /// evaluation rather than report.
    ///
    /// If `width` is given, arithmetic wraps around two's-complement at
    /// that bit width after every operation; otherwise the full 128-bit
    /// range is used.
    pub fn value(&self, env: &dyn SymbolEnv, width: Option<u32>) -> Result<i128, EvalErr> {
        let wrap = |v: i128| match width {
            Some(w) if (1..128).contains(&w) => truncate(v, w),
            _ => v,
        };

        match self {
            Expr::Operand(Operand::Num(n)) => Ok(wrap(*n)),
            Expr::Operand(Operand::Sym { name, .. }) => match env.resolve(name)? {
                Value::Num(n) => Ok(wrap(n)),
                Value::Str(_) => Err(EvalErr::NotNumeric(name.clone())),
            },
            Expr::Prefix(op, inner) => {
                let v = inner.value(env, width)?;
                Ok(wrap(match op {
                    UnOp::Pos => v,
                    UnOp::Neg => v.wrapping_neg(),
                    UnOp::Not => !v,
                }))
            }
            Expr::Binary(lhs, op, rhs) => {
                let l = lhs.value(env, width)?;
                let r = rhs.value(env, width)?;
                let v = match op {
                    BinOp::Add      => l.wrapping_add(r),
                    BinOp::Sub      => l.wrapping_sub(r),
                    BinOp::Mul      => l.wrapping_mul(r),
                    BinOp::Div      => l.checked_div(r).ok_or(EvalErr::DivideByZero)?,
                    BinOp::Rem      => l.checked_rem(r).ok_or(EvalErr::DivideByZero)?,
                    BinOp::Shl      => l.wrapping_shl(r as u32),
                    BinOp::Shr      => l.wrapping_shr(r as u32),
                    BinOp::Or       => l | r,
                    BinOp::And      => l & r,
                    BinOp::Xor      => l ^ r,
                    BinOp::BitClear => l & !r,
                };
                Ok(wrap(v))
            }
        }
    }

    /// Collects the name of the first symbol this expression references,
    /// if it references any.
    pub fn first_symbol(&self) -> Option<(&str, usize)> {
        match self {
            Expr::Operand(Operand::Num(_)) => None,
            Expr::Operand(Operand::Sym { name, token }) => Some((name, *token)),
            Expr::Prefix(_, inner) => inner.first_symbol(),
            Expr::Binary(lhs, _, rhs) => lhs.first_symbol().or_else(|| rhs.first_symbol()),
        }
    }
}

/// A string expression: pieces concatenated into one text value.
#[derive(Debug, PartialEq, Clone)]
pub struct StrExpr {
    /// The pieces, in source order.
    pub parts: Vec<StrPart>,
}

/// One piece of a [`StrExpr`].
#[derive(Debug, PartialEq, Clone)]
pub enum StrPart {
    /// A string or char literal.
    Lit(String),
    /// A string-valued symbol reference.
    Sym {
        /// The symbol's name.
        name: String,
        /// The index of the referencing token (for diagnostics).
        token: usize,
    },
}

impl StrExpr {
    /// Evaluates the expression to text, resolving symbols through `env`.
    pub fn value(&self, env: &dyn SymbolEnv) -> Result<String, EvalErr> {
        let mut buf = String::new();
        for part in &self.parts {
            match part {
                StrPart::Lit(s) => buf.push_str(s),
                StrPart::Sym { name, .. } => match env.resolve(name)? {
                    Value::Str(s) => buf.push_str(&s),
                    Value::Num(_) => return Err(EvalErr::NotText(name.clone())),
                },
            }
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::{BinOp, EvalErr, Expr, NoSymbols, Operand, StrExpr, StrPart, SymbolEnv, UnOp, Value};

    fn num(n: i128) -> Expr {
        Expr::Operand(Operand::Num(n))
    }
    fn sym(name: &str) -> Expr {
        Expr::Operand(Operand::Sym { name: name.to_string(), token: 0 })
    }
    fn bin(l: Expr, op: BinOp, r: Expr) -> Expr {
        Expr::Binary(Box::new(l), op, Box::new(r))
    }

    struct OneSym(&'static str, Value);
    impl SymbolEnv for OneSym {
        fn resolve(&self, name: &str) -> Result<Value, EvalErr> {
            match name == self.0 {
                true => Ok(self.1.clone()),
                false => Err(EvalErr::Unresolved(name.to_string())),
            }
        }
    }

    #[test]
    fn test_arithmetic() {
        let e = bin(num(7), BinOp::Mul, bin(num(10), BinOp::Sub, num(4)));
        assert_eq!(e.value(&NoSymbols, None), Ok(42));

        let e = Expr::Prefix(UnOp::Neg, Box::new(num(5)));
        assert_eq!(e.value(&NoSymbols, None), Ok(-5));

        let e = bin(num(0b1111), BinOp::BitClear, num(0b0101));
        assert_eq!(e.value(&NoSymbols, None), Ok(0b1010));
    }

    #[test]
    fn test_width_wraparound() {
        // 200 + 100 wraps at 8 bits: 300 & 0xFF = 44
        let e = bin(num(200), BinOp::Add, num(100));
        assert_eq!(e.value(&NoSymbols, Some(8)), Ok(44));

        // 0xFF at 8 bits is -1 (sign bit propagates)
        assert_eq!(num(0xFF).value(&NoSymbols, Some(8)), Ok(-1));
        assert_eq!(num(0xFF).value(&NoSymbols, None), Ok(0xFF));
    }

    #[test]
    fn test_unresolved_and_div_zero() {
        assert_eq!(
            sym("nowhere").value(&NoSymbols, None),
            Err(EvalErr::Unresolved("nowhere".to_string()))
        );
        assert_eq!(
            bin(num(1), BinOp::Div, num(0)).value(&NoSymbols, None),
            Err(EvalErr::DivideByZero)
        );

        let env = OneSym("here", Value::Num(3));
        assert_eq!(sym("here").value(&env, None), Ok(3));
        assert_eq!(
            sym("here").value(&OneSym("here", Value::Str("s".into())), None),
            Err(EvalErr::NotNumeric("here".to_string()))
        );
    }

    #[test]
    fn test_str_expr() {
        let e = StrExpr {
            parts: vec![
                StrPart::Lit("hello ".to_string()),
                StrPart::Sym { name: "who".to_string(), token: 0 },
            ],
        };
        let env = OneSym("who", Value::Str("world".to_string()));
        assert_eq!(e.value(&env), Ok("hello world".to_string()));
        assert_eq!(
            e.value(&OneSym("who", Value::Num(1))),
            Err(EvalErr::NotText("who".to_string()))
        );
        assert_eq!(
            e.value(&NoSymbols),
            Err(EvalErr::Unresolved("who".to_string()))
        );
    }
}
