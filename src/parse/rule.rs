//! The rule engine: a combinator algebra over token streams.
//!
//! A [`Component`] is an immutable description of a piece of grammar:
//! sequence, ordered choice, option, repetition, negation, or a recursive
//! sub-node. It holds no parse state; matching is a pure recursive function
//! over `(component, tokens, position)`.
//!
//! The central invariant is *non-destructive backtracking*: a failed match
//! returns `None` and leaves the caller's position untouched, so an
//! [`Any`](Component::Any) may try one alternative, fail, and retry the next
//! from the identical starting point. This holds under arbitrary nesting
//! because positions are plain indices into an immutable token slice.

use crate::ast::Node;
use crate::parse::lex::{Bracket, TokenKind};
use crate::parse::{build_node, NodeType, ParseCtx};

/// A composable grammar expression.
///
/// Architecture tables build these to describe directive and instruction
/// operand syntax; the parse-tree builder uses them for statement structure.
#[derive(Debug, PartialEq, Clone)]
pub enum Component {
    /// Matches nothing and always succeeds.
    Nothing,
    /// Matches one token with exactly this text (ASCII case-insensitive).
    Specific(&'static str),
    /// Matches one token of the given class.
    Kind(KindClass),
    /// Matches each component in order; fails as a whole if any fails,
    /// with no partial consumption.
    Seq(Vec<Component>),
    /// Tries each component in order; the first success wins
    /// (ordered choice, not longest match).
    Any(Vec<Component>),
    /// Always succeeds, consuming the inner component's match if present.
    Opt(Box<Component>),
    /// Greedily matches the inner component zero or more times
    /// (at most `max` times if given). Always succeeds.
    Repeat(Box<Component>, Option<usize>),
    /// Succeeds by consuming exactly one token iff the inner component
    /// would *not* match here. Fails at end of input.
    Not(Box<Component>),
    /// Recursively builds a sub-node of the given type, claiming all of
    /// that node's tokens.
    Node(NodeType),
}

impl Component {
    /// A comma-separated list of one or more `item`s.
    pub fn list(item: Component) -> Component {
        Component::Seq(vec![
            item.clone(),
            Component::Repeat(
                Box::new(Component::Seq(vec![Component::Kind(KindClass::Comma), item])),
                None,
            ),
        ])
    }

    /// A numeric expression sub-node.
    pub fn expr() -> Component {
        Component::Node(NodeType::Expr)
    }

    /// A string expression sub-node.
    pub fn str_expr() -> Component {
        Component::Node(NodeType::StrExpr)
    }

    /// A register token.
    pub fn reg() -> Component {
        Component::Kind(KindClass::Register)
    }

    /// A comma token.
    pub fn comma() -> Component {
        Component::Kind(KindClass::Comma)
    }
}

/// A predicate over token kinds, as data.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum KindClass {
    /// An integer literal.
    Int,
    /// A string literal.
    StrLit,
    /// A char literal.
    CharLit,
    /// A generic (unclassified) symbol.
    Symbol,
    /// A register keyword.
    Register,
    /// Any expression operator.
    Operator,
    /// A comma.
    Comma,
    /// A colon.
    Colon,
    /// An equals sign.
    Equals,
    /// An opening bracket of the given kind.
    Open(Bracket),
    /// A closing bracket of the given kind.
    Close(Bracket),
}
impl KindClass {
    /// Whether a token kind belongs to this class.
    pub fn matches(&self, kind: &TokenKind) -> bool {
        match (self, kind) {
            (KindClass::Int, TokenKind::Int(_)) => true,
            (KindClass::StrLit, TokenKind::Str(_)) => true,
            (KindClass::CharLit, TokenKind::Char(_)) => true,
            (KindClass::Symbol, TokenKind::Symbol) => true,
            (KindClass::Register, TokenKind::RegisterKw(_)) => true,
            (KindClass::Operator, TokenKind::Operator(_)) => true,
            (KindClass::Comma, TokenKind::Comma) => true,
            (KindClass::Colon, TokenKind::Colon) => true,
            (KindClass::Equals, TokenKind::Equals) => true,
            (KindClass::Open(b), TokenKind::Open(k)) => b == k,
            (KindClass::Close(b), TokenKind::Close(k)) => b == k,
            _ => false,
        }
    }
}

/// The outcome of a successful match attempt.
///
/// `end` is the position just past the last consumed token (leading trivia
/// is folded into the consumed range); `nodes` are any sub-nodes produced.
/// A failed attempt is `None`: the input is untouched, so "remaining
/// tokens" is simply the caller's original position.
#[derive(Debug, PartialEq, Clone)]
pub struct RuleMatch {
    /// The position just past the last consumed token.
    pub end: usize,
    /// Sub-nodes produced by [`Component::Node`] members, in order.
    pub nodes: Vec<Node>,
}

impl Component {
    /// Attempts to match this component against the token stream at `pos`.
    ///
    /// Leading trivia (spaces, comments) is skipped before single-token
    /// matchers and folded into the consumed range; its absence is never a
    /// failure.
    pub fn match_at(&self, ctx: &ParseCtx<'_>, pos: usize) -> Option<RuleMatch> {
        match self {
            Component::Nothing => Some(RuleMatch { end: pos, nodes: Vec::new() }),

            Component::Specific(text) => {
                let p = ctx.skip_trivia(pos);
                let tok = &ctx.tokens[p];
                match !tok.text.is_empty() && tok.text.eq_ignore_ascii_case(text) {
                    true => Some(RuleMatch { end: p + 1, nodes: Vec::new() }),
                    false => None,
                }
            }

            Component::Kind(class) => {
                let p = ctx.skip_trivia(pos);
                match class.matches(&ctx.tokens[p].kind) {
                    true => Some(RuleMatch { end: p + 1, nodes: Vec::new() }),
                    false => None,
                }
            }

            Component::Seq(parts) => {
                let mut end = pos;
                let mut nodes = Vec::new();
                for part in parts {
                    let m = part.match_at(ctx, end)?;
                    end = m.end;
                    nodes.extend(m.nodes);
                }
                Some(RuleMatch { end, nodes })
            }

            Component::Any(alts) => alts.iter().find_map(|alt| alt.match_at(ctx, pos)),

            Component::Opt(inner) => Some(
                inner.match_at(ctx, pos)
                    .unwrap_or(RuleMatch { end: pos, nodes: Vec::new() }),
            ),

            Component::Repeat(inner, max) => {
                let mut end = pos;
                let mut nodes = Vec::new();
                let mut count = 0;
                while max.map_or(true, |m| count < m) {
                    match inner.match_at(ctx, end) {
                        // An inner rule that consumes nothing would repeat forever.
                        Some(m) if m.end > end => {
                            end = m.end;
                            nodes.extend(m.nodes);
                            count += 1;
                        }
                        _ => break,
                    }
                }
                Some(RuleMatch { end, nodes })
            }

            Component::Not(inner) => {
                let p = ctx.skip_trivia(pos);
                if matches!(ctx.tokens[p].kind, TokenKind::Eoi) {
                    return None;
                }
                match inner.match_at(ctx, pos) {
                    Some(_) => None,
                    None => Some(RuleMatch { end: p + 1, nodes: Vec::new() }),
                }
            }

            Component::Node(ty) => {
                let (node, end) = build_node(ctx, *ty, pos)?;
                Some(RuleMatch { end, nodes: vec![node] })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Component, KindClass, RuleMatch};
    use crate::arch;
    use crate::parse::lex::tokenize;
    use crate::parse::ParseCtx;

    fn with_ctx<R>(src: &str, f: impl FnOnce(&ParseCtx<'_>) -> R) -> R {
        let a = arch::risc16();
        let tokens = tokenize(src, &a);
        f(&ParseCtx { tokens: &tokens, arch: &a })
    }

    fn int() -> Component {
        Component::Kind(KindClass::Int)
    }

    #[test]
    fn test_non_destructive_backtracking() {
        // A fails partway through, B succeeds. Any([A, B]) must equal
        // running B alone on the original input: A leaves no trace.
        with_ctx("1 2", |ctx| {
            let a = Component::Seq(vec![int(), Component::Kind(KindClass::Comma)]);
            let b = Component::Seq(vec![int(), int()]);

            assert_eq!(a.match_at(ctx, 0), None);
            let alone = b.match_at(ctx, 0).unwrap();
            let choice = Component::Any(vec![a, b]).match_at(ctx, 0).unwrap();
            assert_eq!(choice, alone);
        });
    }

    #[test]
    fn test_seq_no_partial_consumption() {
        with_ctx("1 , x", |ctx| {
            let rule = Component::Seq(vec![int(), Component::comma(), int()]);
            // The sequence fails on the third member; the failure must not
            // report any consumed prefix.
            assert_eq!(rule.match_at(ctx, 0), None);
        });
    }

    #[test]
    fn test_opt_repeat() {
        with_ctx("1 2 3", |ctx| {
            let opt = Component::Opt(Box::new(Component::comma()));
            assert_eq!(opt.match_at(ctx, 0), Some(RuleMatch { end: 0, nodes: vec![] }));

            let rep = Component::Repeat(Box::new(int()), None);
            assert_eq!(rep.match_at(ctx, 0).unwrap().end, 5); // all three ints

            let rep2 = Component::Repeat(Box::new(int()), Some(2));
            assert_eq!(rep2.match_at(ctx, 0).unwrap().end, 3); // first two

            // Zero repetitions is a valid match.
            let rep0 = Component::Repeat(Box::new(Component::comma()), None);
            assert_eq!(rep0.match_at(ctx, 0).unwrap().end, 0);
        });
    }

    #[test]
    fn test_repeat_of_nothing_terminates() {
        with_ctx("1", |ctx| {
            let rep = Component::Repeat(Box::new(Component::Nothing), None);
            assert_eq!(rep.match_at(ctx, 0).unwrap().end, 0);
        });
    }

    #[test]
    fn test_negation() {
        with_ctx("x ,", |ctx| {
            let not_comma = Component::Not(Box::new(Component::comma()));
            // Consumes exactly one token that is not a comma.
            assert_eq!(not_comma.match_at(ctx, 0).unwrap().end, 1);
            // Fails on a comma.
            assert_eq!(not_comma.match_at(ctx, 1), None);
        });
        with_ctx("", |ctx| {
            let not_comma = Component::Not(Box::new(Component::comma()));
            // Fails at end of input rather than consuming it.
            assert_eq!(not_comma.match_at(ctx, 0), None);
        });
    }

    #[test]
    fn test_specific_and_trivia_folding() {
        with_ctx("  halt ; trailing", |ctx| {
            let rule = Component::Specific("halt");
            // Leading whitespace is folded into the consumed range.
            let m = rule.match_at(ctx, 0).unwrap();
            assert_eq!(m.end, 2);
        });
    }

    #[test]
    fn test_list() {
        with_ctx("1, 2 , 3", |ctx| {
            let rule = Component::list(int());
            let m = rule.match_at(ctx, 0).unwrap();
            assert_eq!(m.end, 8);
        });
        with_ctx("1 2", |ctx| {
            // No comma: list stops after the first item.
            let rule = Component::list(int());
            assert_eq!(rule.match_at(ctx, 0).unwrap().end, 1);
        });
    }
}
