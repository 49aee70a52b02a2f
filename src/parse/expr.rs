//! Parsing infix expressions.
//!
//! Expressions are parsed in four steps:
//! 1. collect the longest token prefix that could belong to an expression
//!    (literals, symbols, operators, round brackets), stopping at any
//!    unmatched `)`;
//! 2. mark which `+`/`-`/`~` are prefix operators, judged by their
//!    neighbors;
//! 3. convert to postfix by operator precedence (shunting yard);
//! 4. fold the postfix sequence into an [`Expr`] tree.
//!
//! A prefix that collects but does not fold (say, a dangling operator) is
//! not an expression, and the whole attempt fails without consuming input.

use crate::ast::{BinOp, Expr, Node, NodeKind, Operand, StrExpr, StrPart, UnOp};
use crate::parse::lex::{Bracket, TokenKind};
use crate::parse::ParseCtx;

/// Binding strength of a binary operator. Unary operators bind tighter
/// than all of these.
fn precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Mul | BinOp::Div | BinOp::Rem | BinOp::Shl | BinOp::Shr => 3,
        BinOp::Or | BinOp::And | BinOp::Xor | BinOp::BitClear => 2,
        BinOp::Add | BinOp::Sub => 1,
    }
}

/// An expression token, after collection and prefix marking.
#[derive(Debug, Clone, PartialEq)]
enum Item {
    Num(i128),
    Sym(String, usize),
    Un(UnOp),
    Bin(BinOp),
    Open,
    Close,
}

impl Item {
    /// Whether this item can end an operand (so a following `+`/`-`
    /// is binary, not prefix). A closing bracket ends the parenthesized
    /// operand before it.
    fn ends_operand(&self) -> bool {
        matches!(self, Item::Num(_) | Item::Sym(..) | Item::Close)
    }

    /// Whether this item can start an operand.
    fn starts_operand(&self) -> bool {
        matches!(self, Item::Num(_) | Item::Sym(..) | Item::Open)
    }
}

/// Builds a numeric expression node at `pos`.
///
/// Consumes the longest expressible token prefix; returns `None` (consuming
/// nothing) if no valid expression starts here.
pub(crate) fn build_expr(ctx: &ParseCtx<'_>, pos: usize) -> Option<(Node, usize)> {
    // Step 1: collect.
    let mut raw: Vec<(usize, Item)> = Vec::new();
    let mut p = pos;
    let mut depth = 0u32;
    let mut end = pos;
    loop {
        let t = ctx.skip_trivia(p);
        let tok = &ctx.tokens[t];
        let item = match &tok.kind {
            TokenKind::Int(lit) => Item::Num(lit.value),
            TokenKind::Char(c) => Item::Num(*c as i128),
            TokenKind::Symbol => Item::Sym(tok.text.clone(), t),
            // Operator role (prefix or binary) is decided in step 2;
            // park the raw op in a prefix slot for now.
            TokenKind::Operator(op) => match BinOp::from_op(*op) {
                Some(b) => Item::Bin(b),
                None => Item::Un(UnOp::Not),
            },
            TokenKind::Open(Bracket::Round) => {
                depth += 1;
                Item::Open
            }
            TokenKind::Close(Bracket::Round) => {
                // An unmatched `)` belongs to the surrounding syntax.
                if depth == 0 {
                    break;
                }
                depth -= 1;
                Item::Close
            }
            _ => break,
        };
        raw.push((t, item));
        p = t + 1;
        end = p;
    }
    if raw.is_empty() {
        return None;
    }

    // Step 2: decide which +/- are prefix operators.
    let items: Vec<Item> = raw
        .iter()
        .enumerate()
        .map(|(i, (_, item))| match item {
            Item::Bin(b @ (BinOp::Add | BinOp::Sub)) => {
                let after_operand = i > 0 && raw[i - 1].1.ends_operand();
                let before_operand = raw.get(i + 1).is_some_and(|(_, it)| it.starts_operand());
                match !after_operand && before_operand {
                    true => Item::Un(match b {
                        BinOp::Add => UnOp::Pos,
                        _ => UnOp::Neg,
                    }),
                    false => item.clone(),
                }
            }
            _ => item.clone(),
        })
        .collect();

    // Steps 3 and 4.
    let expr = fold(to_postfix(items)?)?;
    Some((Node::new(NodeKind::Expr(expr), pos..end), end))
}

/// Reorders infix items into postfix by precedence (left-associative).
fn to_postfix(items: Vec<Item>) -> Option<Vec<Item>> {
    let mut out = Vec::with_capacity(items.len());
    let mut stack: Vec<Item> = Vec::new();

    for item in items {
        match item {
            Item::Num(_) | Item::Sym(..) => out.push(item),
            // Unary operators bind tightest and nest rightward.
            Item::Un(_) => stack.push(item),
            Item::Bin(b) => {
                while stack.last().is_some_and(|top| match top {
                    Item::Un(_) => true,
                    Item::Bin(t) => precedence(*t) >= precedence(b),
                    _ => false,
                }) {
                    out.extend(stack.pop());
                }
                stack.push(Item::Bin(b));
            }
            Item::Open => stack.push(item),
            Item::Close => loop {
                match stack.pop()? {
                    Item::Open => break,
                    popped => out.push(popped),
                }
            },
        }
    }
    while let Some(popped) = stack.pop() {
        if popped == Item::Open {
            return None;
        }
        out.push(popped);
    }
    Some(out)
}

/// Folds a postfix sequence into a tree. Fails if operators and operands
/// don't pair up (which is how a malformed collection is rejected).
fn fold(postfix: Vec<Item>) -> Option<Expr> {
    let mut stack: Vec<Expr> = Vec::new();
    for item in postfix {
        match item {
            Item::Num(n) => stack.push(Expr::Operand(Operand::Num(n))),
            Item::Sym(name, token) => stack.push(Expr::Operand(Operand::Sym { name, token })),
            Item::Un(op) => {
                let inner = stack.pop()?;
                stack.push(Expr::Prefix(op, Box::new(inner)));
            }
            Item::Bin(op) => {
                let rhs = stack.pop()?;
                let lhs = stack.pop()?;
                stack.push(Expr::Binary(Box::new(lhs), op, Box::new(rhs)));
            }
            Item::Open | Item::Close => return None,
        }
    }
    match stack.len() == 1 {
        true => stack.pop(),
        false => None,
    }
}

/// Builds a string expression node at `pos`: one or more string literals,
/// char literals, and symbol references, concatenated left to right.
///
/// The first piece must be a string literal; that is what distinguishes a
/// string expression from a numeric one during parsing.
pub(crate) fn build_str_expr(ctx: &ParseCtx<'_>, pos: usize) -> Option<(Node, usize)> {
    let mut parts = Vec::new();
    let mut p = pos;
    let mut end = pos;
    loop {
        let t = ctx.skip_trivia(p);
        match &ctx.tokens[t].kind {
            TokenKind::Str(s) => parts.push(StrPart::Lit(s.clone())),
            TokenKind::Char(c) if !parts.is_empty() => parts.push(StrPart::Lit(c.to_string())),
            TokenKind::Symbol if !parts.is_empty() => {
                parts.push(StrPart::Sym { name: ctx.tokens[t].text.clone(), token: t })
            }
            _ => break,
        }
        p = t + 1;
        end = p;
    }
    if parts.is_empty() {
        return None;
    }
    Some((Node::new(NodeKind::StrExpr(StrExpr { parts }), pos..end), end))
}

#[cfg(test)]
mod tests {
    use crate::arch;
    use crate::ast::{NodeKind, NoSymbols};
    use crate::parse::lex::tokenize;
    use crate::parse::ParseCtx;

    fn eval(src: &str) -> i128 {
        let a = arch::risc16();
        let tokens = tokenize(src, &a);
        let ctx = ParseCtx { tokens: &tokens, arch: &a };
        let (node, end) = super::build_expr(&ctx, 0).unwrap();
        assert_eq!(end, tokens.len() - 1, "expression did not consume {src:?}");
        let NodeKind::Expr(e) = node.kind else { panic!("expected expr node") };
        e.value(&NoSymbols, None).unwrap()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3"), 7);
        assert_eq!(eval("(1 + 2) * 3"), 9);
        assert_eq!(eval("-1 + 2"), 1);
        // Shifts bind at the multiplicative level.
        assert_eq!(eval("2 << 3 + 1"), 17);
        // Bitwise sits between multiplicative and additive.
        assert_eq!(eval("0xFF ! 0x0F + 1"), 0xF1);
        assert_eq!(eval("1 + 2 & 3"), 3);
    }

    #[test]
    fn test_left_associativity() {
        assert_eq!(eval("10 - 4 - 3"), 3);
        assert_eq!(eval("64 / 4 / 2"), 8);
    }

    #[test]
    fn test_prefix_disambiguation() {
        assert_eq!(eval("1 - -5"), 6);
        assert_eq!(eval("-(2 + 3)"), -5);
        assert_eq!(eval("+7"), 7);
        assert_eq!(eval("~0 & 0xF"), 0xF);
        // After a closing bracket, minus is binary.
        assert_eq!(eval("(1 + 2) - 3"), 0);
    }

    #[test]
    fn test_char_literal_operand() {
        assert_eq!(eval("'A' + 1"), 66);
    }

    #[test]
    fn test_longest_prefix_stops() {
        let a = arch::risc16();

        // Collection stops at an unmatched `)` and at a comma.
        let tokens = tokenize("1 + 2), 3", &a);
        let ctx = ParseCtx { tokens: &tokens, arch: &a };
        let (node, end) = super::build_expr(&ctx, 0).unwrap();
        let NodeKind::Expr(e) = node.kind else { panic!() };
        assert_eq!(e.value(&NoSymbols, None), Ok(3));
        assert_eq!(tokens[end].text, ")");
    }

    #[test]
    fn test_rejections() {
        let a = arch::risc16();
        for src in ["", ", 1", "1 +", "(1 + 2", "* 3", "( )"] {
            let tokens = tokenize(src, &a);
            let ctx = ParseCtx { tokens: &tokens, arch: &a };
            assert!(super::build_expr(&ctx, 0).is_none(), "accepted {src:?}");
        }
    }

    #[test]
    fn test_str_expr() {
        let a = arch::risc16();
        let tokens = tokenize(r#""lib" ".o" suffix"#, &a);
        let ctx = ParseCtx { tokens: &tokens, arch: &a };
        let (node, end) = super::build_str_expr(&ctx, 0).unwrap();
        assert_eq!(end, tokens.len() - 1);
        let NodeKind::StrExpr(s) = node.kind else { panic!() };
        assert_eq!(s.parts.len(), 3);

        // Leading symbols or chars are not string expressions.
        let tokens = tokenize("suffix \"x\"", &a);
        let ctx = ParseCtx { tokens: &tokens, arch: &a };
        assert!(super::build_str_expr(&ctx, 0).is_none());
    }
}
