//! Parsing tokens into a tree.
//!
//! [`parse_tree`] turns a token list into a [`Node`] tree: a root whose
//! children are statements, each statement an optional label, an optional
//! body (directive, instruction, or symbol definition), and a terminator.
//! Statement structure is fixed here; operand syntax comes from the
//! architecture's rule tables (see [`rule`]).
//!
//! Parsing never fails as a whole. A line that matches no statement form is
//! skipped up to the next line break and an error is attached to its first
//! token, so one bad line cannot hide errors (or code) elsewhere in the file.

pub mod expr;
pub mod lex;
pub mod rule;

use crate::arch::Arch;
use crate::ast::{Node, NodeKind};
use crate::err::Diagnostics;
use lex::{Token, TokenKind};

/// Everything a rule needs to look at while matching: the token list and
/// the architecture whose tables the tokens were classified against.
///
/// Shared immutably by every match attempt, which is what makes
/// backtracking free.
#[derive(Clone, Copy)]
pub struct ParseCtx<'s> {
    /// The token list. Always ends with [`TokenKind::Eoi`].
    pub tokens: &'s [Token],
    /// The architecture the source targets.
    pub arch: &'s Arch,
}

impl ParseCtx<'_> {
    /// The first non-trivia position at or after `pos`.
    ///
    /// Stops at line breaks and end of input, which are not trivia.
    pub fn skip_trivia(&self, mut pos: usize) -> usize {
        while self.tokens[pos].is_trivia() {
            pos += 1;
        }
        pos
    }
}

/// The types of node that can be recursively requested from a rule
/// (see [`rule::Component::Node`]).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum NodeType {
    /// A whole statement.
    Statement,
    /// A label definition (`name:`).
    Label,
    /// A directive and its operands.
    Directive,
    /// An instruction and its operands.
    Instruction,
    /// A symbol definition (`name = value`).
    SymbolDef,
    /// A numeric expression.
    Expr,
    /// A string expression.
    StrExpr,
}

/// Parses a token list into a tree rooted at a [`NodeKind::Root`] node.
///
/// Always returns a tree. Lines that parse are statement children; lines
/// that don't are skipped with an error attached to their first
/// non-trivia token.
pub fn parse_tree(tokens: &[Token], arch: &Arch, diags: &mut Diagnostics) -> Node {
    let ctx = ParseCtx { tokens, arch };
    let eoi = tokens.len() - 1;
    let mut stmts = Vec::new();
    let mut pos = 0;

    loop {
        let p = ctx.skip_trivia(pos);
        if p >= eoi {
            break;
        }

        match build_statement(&ctx, pos) {
            Some((node, end)) => {
                debug_assert!(end > pos, "statement must consume input");
                stmts.push(node);
                pos = end;
            }
            None => {
                // Skip the rest of the line and report it once.
                let mut after = p;
                while !ctx.tokens[after].is_line_end() {
                    after += 1;
                }
                let span = ctx.tokens[p].span.start..ctx.tokens[after - 1].span.end;
                diags.error(p, span, "expected a statement");
                pos = match ctx.tokens[after].kind {
                    TokenKind::NewLine => after + 1,
                    _ => after,
                };
            }
        }
    }

    Node::with_children(NodeKind::Root, 0..tokens.len(), stmts)
}

/// Builds one statement: `[label:] [body] (newline | eoi)`.
///
/// Label and body are each optional, so a blank line is an (empty)
/// statement too. The newline terminator is consumed; end of input is not.
fn build_statement(ctx: &ParseCtx<'_>, pos: usize) -> Option<(Node, usize)> {
    let mut children = Vec::new();
    let mut p = pos;

    if let Some((label, end)) = build_node(ctx, NodeType::Label, p) {
        children.push(label);
        p = end;
    }

    let body = build_node(ctx, NodeType::Directive, p)
        .or_else(|| build_node(ctx, NodeType::Instruction, p))
        .or_else(|| build_node(ctx, NodeType::SymbolDef, p));
    if let Some((node, end)) = body {
        children.push(node);
        p = end;
    }

    let t = ctx.skip_trivia(p);
    match ctx.tokens[t].kind {
        TokenKind::NewLine => {
            Some((Node::with_children(NodeKind::Statement, pos..t + 1, children), t + 1))
        }
        TokenKind::Eoi => {
            Some((Node::with_children(NodeKind::Statement, pos..t, children), t))
        }
        _ => None,
    }
}

/// Builds a node of the requested type at `pos`, or `None` if the input
/// doesn't have that shape. Failure consumes nothing.
///
/// This is the recursion point for [`rule::Component::Node`].
pub fn build_node(ctx: &ParseCtx<'_>, ty: NodeType, pos: usize) -> Option<(Node, usize)> {
    match ty {
        NodeType::Statement => build_statement(ctx, pos),

        NodeType::Label => {
            let p = ctx.skip_trivia(pos);
            let name = match &ctx.tokens[p].kind {
                // Numeric labels are allowed (local labels like `1:`).
                TokenKind::Symbol | TokenKind::Int(_) => ctx.tokens[p].text.clone(),
                _ => return None,
            };
            let c = ctx.skip_trivia(p + 1);
            match ctx.tokens[c].kind {
                TokenKind::Colon => Some((Node::new(NodeKind::Label(name), pos..c + 1), c + 1)),
                _ => None,
            }
        }

        NodeType::Directive => {
            let p = ctx.skip_trivia(pos);
            let TokenKind::DirectiveKw(idx) = ctx.tokens[p].kind else {
                return None;
            };
            let m = ctx.arch.directives[idx].operands.match_at(ctx, p + 1)?;
            Some((Node::with_children(NodeKind::Directive(idx), pos..m.end, m.nodes), m.end))
        }

        NodeType::Instruction => {
            let p = ctx.skip_trivia(pos);
            let TokenKind::InstrKw(idx) = ctx.tokens[p].kind else {
                return None;
            };
            let m = ctx.arch.instructions[idx].operands.match_at(ctx, p + 1)?;
            Some((Node::with_children(NodeKind::Instruction(idx), pos..m.end, m.nodes), m.end))
        }

        NodeType::SymbolDef => {
            let p = ctx.skip_trivia(pos);
            let TokenKind::Symbol = ctx.tokens[p].kind else {
                return None;
            };
            let name = ctx.tokens[p].text.clone();
            let eq = ctx.skip_trivia(p + 1);
            let TokenKind::Equals = ctx.tokens[eq].kind else {
                return None;
            };
            let (value, end) = build_node(ctx, NodeType::Expr, eq + 1)
                .or_else(|| build_node(ctx, NodeType::StrExpr, eq + 1))?;
            Some((Node::with_children(NodeKind::SymbolDef(name), pos..end, vec![value]), end))
        }

        NodeType::Expr => expr::build_expr(ctx, pos),

        NodeType::StrExpr => expr::build_str_expr(ctx, pos),
    }
}

#[cfg(test)]
mod tests {
    use crate::arch;
    use crate::ast::{Node, NodeKind, NoSymbols};
    use crate::err::Diagnostics;

    fn parse(src: &str) -> (Node, Diagnostics) {
        let a = arch::risc16();
        let tokens = super::lex::tokenize(src, &a);
        let mut diags = Diagnostics::new();
        let root = super::parse_tree(&tokens, &a, &mut diags);
        (root, diags)
    }

    #[test]
    fn test_statement_shapes() {
        let (root, diags) = parse("start: add r0, r1, r2\n.word 5\nx = 1\n\n");
        assert!(!diags.has_errors());

        let stmts: Vec<_> = root.statements().collect();
        assert_eq!(stmts.len(), 4);

        // label + instruction
        assert!(matches!(stmts[0].children[0].kind, NodeKind::Label(ref n) if n == "start"));
        assert!(matches!(stmts[0].children[1].kind, NodeKind::Instruction(_)));
        // bare directive
        assert!(matches!(stmts[1].children[0].kind, NodeKind::Directive(_)));
        // symbol definition
        assert!(matches!(stmts[2].children[0].kind, NodeKind::SymbolDef(ref n) if n == "x"));
        // blank line
        assert!(stmts[3].children.is_empty());
    }

    #[test]
    fn test_error_isolation() {
        // Line 1 is garbage; line 2 must still parse, with exactly one
        // error reported for line 1.
        let (root, diags) = parse("add add\nadd r0, r1, r2\n");
        assert_eq!(diags.error_count(), 1);

        let stmts: Vec<_> = root.statements().collect();
        assert_eq!(stmts.len(), 1);
        assert!(matches!(stmts[0].children[0].kind, NodeKind::Instruction(_)));

        // The error is attached to line 1's first token.
        let note = diags.iter().next().unwrap();
        assert_eq!(note.token, 0);
    }

    #[test]
    fn test_directive_operands() {
        let (root, diags) = parse(".word 1, 2 + 3, x\n");
        assert!(!diags.has_errors());

        let stmt = root.statements().next().unwrap();
        let NodeKind::Directive(_) = stmt.children[0].kind else {
            panic!("expected directive");
        };
        let exprs: Vec<_> = stmt.children[0]
            .children
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::Expr(e) => Some(e),
                _ => None,
            })
            .collect();
        assert_eq!(exprs.len(), 3);
        assert_eq!(exprs[1].value(&NoSymbols, None), Ok(5));
    }

    #[test]
    fn test_memory_operand() {
        let (root, diags) = parse("ld r0, [r1 + 4]\nld r2, [r3]\n");
        assert!(!diags.has_errors());

        let stmts: Vec<_> = root.statements().collect();
        // With an offset: one expression child.
        assert_eq!(stmts[0].children[0].children.len(), 1);
        // Without: none.
        assert_eq!(stmts[1].children[0].children.len(), 0);
    }

    #[test]
    fn test_numeric_label() {
        let (root, diags) = parse("1: nop\n");
        assert!(!diags.has_errors());
        let stmt = root.statements().next().unwrap();
        assert!(matches!(stmt.children[0].kind, NodeKind::Label(ref n) if n == "1"));
    }

    #[test]
    fn test_trailing_junk_rejects_line() {
        let (root, diags) = parse("halt halt\nnop");
        assert_eq!(diags.error_count(), 1);
        assert_eq!(root.statements().count(), 1);
    }

    #[test]
    fn test_comment_only_lines() {
        let (root, diags) = parse("; header\n  // note\nnop ; trailing\n");
        assert!(!diags.has_errors());
        let stmts: Vec<_> = root.statements().collect();
        assert_eq!(stmts.len(), 3);
        assert!(stmts[0].children.is_empty());
        assert!(stmts[1].children.is_empty());
        assert!(matches!(stmts[2].children[0].kind, NodeKind::Instruction(_)));
    }
}
