//! Tokenizing assembly source.
//!
//! This module holds the tokens shared by every supported architecture
//! ([`Token`], [`TokenKind`]) and the lexer that produces them
//! ([`tokenize`]).
//!
//! The token stream is *total*: whitespace and comments are tokens too, and
//! concatenating every token's span reconstructs the source text exactly.
//! This lets an editor map any byte offset back to a token. Downstream
//! consumers filter trivia as needed.
//!
//! Keywords are not baked into the lexer. A symbol-shaped match is re-tagged
//! by probing the architecture's directive, instruction, and register tables
//! (in that order) through a pure classification function; anything the
//! tables don't know stays a generic [`TokenKind::Symbol`].

use std::num::IntErrorKind;

use logos::{Lexer, Logos};

use crate::arch::Arch;
use crate::err::Span;

/// A unit of information in assembly source code.
///
/// `kind` is the full closed set of token categories; `span` and `text` tie
/// the token back to the source. Tokens are immutable once produced —
/// diagnostics attach to them through [`Diagnostics`] by token index.
///
/// [`Diagnostics`]: crate::err::Diagnostics
#[derive(Debug, PartialEq, Clone)]
pub struct Token {
    /// The category of this token.
    pub kind: TokenKind,
    /// The byte range this token occupies in the source.
    pub span: Span,
    /// The raw source text of this token.
    pub text: String,
}
impl Token {
    /// Whether this token is skippable filler between operands
    /// (spaces and comments, but *not* line breaks).
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    /// Whether this token terminates a statement.
    pub fn is_line_end(&self) -> bool {
        matches!(self.kind, TokenKind::NewLine | TokenKind::Eoi)
    }
}

/// The category of a [`Token`].
///
/// This is a closed set; the parser and assembler match it exhaustively.
#[derive(Debug, PartialEq, Clone)]
pub enum TokenKind {
    /// A line break (`\n` or `\r\n`).
    NewLine,
    /// A run of spaces and tabs.
    Whitespace,
    /// A line comment (`;`, `//`, `#`) or block comment (`/* */`).
    Comment,
    /// An integer literal, with its value and the radix it was written in.
    Int(IntLit),
    /// A string literal, with escapes already applied.
    Str(String),
    /// A character literal.
    Char(char),
    /// An identifier the architecture tables don't recognize:
    /// a label, a symbol reference, or a future definition.
    Symbol,
    /// A symbol re-tagged as a directive; holds the index into the
    /// architecture's directive table.
    DirectiveKw(usize),
    /// A symbol re-tagged as an instruction mnemonic; holds the index into
    /// the architecture's instruction table.
    InstrKw(usize),
    /// A symbol re-tagged as a register name; holds the register number.
    RegisterKw(u8),
    /// An expression operator.
    Operator(Op),
    /// A comma, which delineates operands.
    Comma,
    /// A colon, which closes a label.
    Colon,
    /// An equals sign, which introduces a symbol definition.
    Equals,
    /// An opening bracket.
    Open(Bracket),
    /// A closing bracket.
    Close(Bracket),
    /// A piece of source the lexer could not recognize.
    Error(LexErr),
    /// End of input. Appended once after lexing, with an empty span.
    Eoi,
}

/// An integer literal's value and source radix.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct IntLit {
    /// The literal's value. Always non-negative; minus signs lex as
    /// operators and are folded by the expression parser.
    pub value: i128,
    /// The radix the literal was written in (2, 8, 10, or 16).
    pub radix: u32,
}

/// An expression operator, as lexed.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Op {
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
    /// `~` (complement; always a prefix)
    Not,
}

/// The kind of a bracket token.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Bracket {
    /// `(` / `)` — expression grouping.
    Round,
    /// `[` / `]` — memory operands.
    Square,
}

/// The raw lexical shapes. Keyword re-tagging happens after the fact,
/// so the state machine itself is architecture-independent.
//
// Note, some of these regexes span over tokens that are technically invalid
// (e.g., 0xZZ matches the integer shape even though it shouldn't).
// This is intended: each regex collects one discernible unit and the
// callback validates it.
#[derive(Debug, Logos, PartialEq)]
#[logos(error = LexErr)]
enum RawToken {
    #[regex(r"\r?\n")]
    NewLine,

    #[regex(r"[ \t]+")]
    Whitespace,

    #[regex(r"(;|//|#)[^\n]*")]
    #[token("/*", lex_block_comment)]
    Comment,

    #[regex(r"\d\w*", lex_int)]
    Int(IntLit),

    #[token("\"", lex_str_literal)]
    Str(String),

    #[token("'", lex_char_literal)]
    Char(char),

    #[regex(r"[A-Za-z_.$][A-Za-z0-9_.$]*")]
    Symbol,

    #[token("+", |_| Op::Add)]
    #[token("-", |_| Op::Sub)]
    #[token("*", |_| Op::Mul)]
    #[token("/", |_| Op::Div)]
    #[token("%", |_| Op::Rem)]
    #[token("<<", |_| Op::Shl)]
    #[token(">>", |_| Op::Shr)]
    #[token("|", |_| Op::Or)]
    #[token("&", |_| Op::And)]
    #[token("^", |_| Op::Xor)]
    #[token("!", |_| Op::BitClear)]
    #[token("~", |_| Op::Not)]
    Operator(Op),

    #[token(",")]
    Comma,

    #[token(":")]
    Colon,

    #[token("=")]
    Equals,

    #[token("(", |_| Bracket::Round)]
    #[token("[", |_| Bracket::Square)]
    Open(Bracket),

    #[token(")", |_| Bracket::Round)]
    #[token("]", |_| Bracket::Square)]
    Close(Bracket),
}

/// Any errors raised in attempting to tokenize an input stream.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum LexErr {
    /// Numeric literal cannot fit the evaluator's 128-bit range.
    DoesNotFit,
    /// Hex literal (starting with 0x) has invalid hex digits.
    InvalidHex,
    /// Binary literal (starting with 0b) has invalid digits.
    InvalidBin,
    /// Octal literal (starting with 0o) has invalid digits.
    InvalidOct,
    /// Numeric literal has invalid decimal digits.
    InvalidDec,
    /// Radix prefix (0x, 0b, 0o) with no digits after it.
    EmptyRadix,
    /// String literal is missing an end quotation mark.
    UnclosedStrLit,
    /// Char literal is missing an end quote.
    UnclosedCharLit,
    /// Block comment is missing its `*/`.
    UnclosedBlockComment,
    /// A character was used which does not start any token.
    #[default]
    InvalidSymbol,
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::DoesNotFit           => f.write_str("numeric literal is too large"),
            LexErr::InvalidHex           => f.write_str("invalid hex literal"),
            LexErr::InvalidBin           => f.write_str("invalid binary literal"),
            LexErr::InvalidOct           => f.write_str("invalid octal literal"),
            LexErr::InvalidDec           => f.write_str("invalid decimal literal"),
            LexErr::EmptyRadix           => f.write_str("radix prefix with no digits"),
            LexErr::UnclosedStrLit       => f.write_str("unclosed string literal"),
            LexErr::UnclosedCharLit      => f.write_str("unclosed char literal"),
            LexErr::UnclosedBlockComment => f.write_str("unclosed block comment"),
            LexErr::InvalidSymbol        => f.write_str("unrecognized symbol"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::DoesNotFit           => Some("numeric literals are limited to 128 bits".into()),
            LexErr::InvalidHex           => Some("a hex literal starts with 0x and consists of 0-9, A-F".into()),
            LexErr::InvalidBin           => Some("a binary literal starts with 0b and consists of 0 and 1".into()),
            LexErr::InvalidOct           => Some("an octal literal starts with 0o and consists of 0-7".into()),
            LexErr::InvalidDec           => Some("a decimal literal only consists of digits 0-9".into()),
            LexErr::EmptyRadix           => Some("there should be digits after the radix prefix".into()),
            LexErr::UnclosedStrLit       => Some("add a quote to the end of the string literal".into()),
            LexErr::UnclosedCharLit      => Some("add a quote to the end of the char literal".into()),
            LexErr::UnclosedBlockComment => Some("add */ to close the comment".into()),
            LexErr::InvalidSymbol        => Some("this char does not start any token".into()),
        }
    }
}

fn lex_int(lx: &Lexer<'_, RawToken>) -> Result<IntLit, LexErr> {
    let s = lx.slice();
    let (digits, radix, invalid) = if let Some(d) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (d, 16, LexErr::InvalidHex)
    } else if let Some(d) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        (d, 2, LexErr::InvalidBin)
    } else if let Some(d) = s.strip_prefix("0o").or_else(|| s.strip_prefix("0O")) {
        (d, 8, LexErr::InvalidOct)
    } else {
        (s, 10, LexErr::InvalidDec)
    };

    i128::from_str_radix(digits, radix)
        .map(|value| IntLit { value, radix })
        .map_err(|e| match e.kind() {
            IntErrorKind::Empty => LexErr::EmptyRadix,
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => LexErr::DoesNotFit,
            _ => invalid,
        })
}

fn lex_str_literal(lx: &mut Lexer<'_, RawToken>) -> Result<String, LexErr> {
    let rem = lx.remainder()
        .lines()
        .next()
        .unwrap_or("");

    // Find the closing unescaped quote and consume up to and including it.
    // A quote is escaped iff an odd run of backslashes precedes it.
    let mlen = rem.match_indices('"')
        .map(|(n, _)| n)
        .find(|&n| rem[..n].bytes().rev().take_while(|&b| b == b'\\').count() % 2 == 0);

    match mlen {
        Some(len) => lx.bump(len + 1),
        None => {
            lx.bump(rem.len());
            return Err(LexErr::UnclosedStrLit);
        }
    }

    // The text between the quotes:
    let mut remaining = &lx.slice()[1..(lx.slice().len() - 1)];
    let mut buf = String::with_capacity(remaining.len());

    // Apply the simple escape set. Unknown escapes are kept verbatim.
    while let Some((left, right)) = remaining.split_once('\\') {
        buf.push_str(left);

        let esc = right.as_bytes()
            .first()
            .unwrap_or_else(|| unreachable!("expected character after escape"));
        match esc {
            b'n'  => buf.push('\n'),
            b'r'  => buf.push('\r'),
            b't'  => buf.push('\t'),
            b'\\' => buf.push('\\'),
            b'0'  => buf.push('\0'),
            b'"'  => buf.push('\"'),
            &c => {
                buf.push('\\');
                buf.push(char::from(c));
            }
        }

        remaining = &right[1..];
    }
    buf.push_str(remaining);

    Ok(buf)
}

fn lex_char_literal(lx: &mut Lexer<'_, RawToken>) -> Result<char, LexErr> {
    let rem = lx.remainder();
    let mut chars = rem.chars();

    let (c, clen) = match chars.next() {
        None | Some('\n') => return Err(LexErr::UnclosedCharLit),
        Some('\\') => {
            let Some(esc) = chars.next() else {
                lx.bump(1);
                return Err(LexErr::UnclosedCharLit);
            };
            let c = match esc {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                '0' => '\0',
                c => c,
            };
            (c, 1 + esc.len_utf8())
        }
        Some(c) => (c, c.len_utf8()),
    };

    match rem[clen..].starts_with('\'') {
        true => {
            lx.bump(clen + 1);
            Ok(c)
        }
        false => {
            lx.bump(clen);
            Err(LexErr::UnclosedCharLit)
        }
    }
}

fn lex_block_comment(lx: &mut Lexer<'_, RawToken>) -> Result<(), LexErr> {
    match lx.remainder().find("*/") {
        Some(n) => {
            lx.bump(n + 2);
            Ok(())
        }
        None => {
            lx.bump(lx.remainder().len());
            Err(LexErr::UnclosedBlockComment)
        }
    }
}

/// Determines what kind of token a symbol-shaped match really is.
///
/// This probes the architecture's directive, instruction, and register
/// tables in that order; if none match, the token stays a generic symbol.
/// Pure function of the text and the tables; called once per symbol.
pub fn classify(text: &str, arch: &Arch) -> TokenKind {
    if let Some(d) = arch.find_directive(text) {
        return TokenKind::DirectiveKw(d);
    }
    if let Some(i) = arch.find_instruction(text) {
        return TokenKind::InstrKw(i);
    }
    if let Some(r) = arch.find_register(text) {
        return TokenKind::RegisterKw(r);
    }
    TokenKind::Symbol
}

/// Converts source text into an ordered, position-total token list.
///
/// Every byte of the input is covered by exactly one token (unrecognized
/// input becomes [`TokenKind::Error`] tokens), and a final [`TokenKind::Eoi`]
/// token with an empty span is appended. The lexer always advances, so this
/// terminates on any input.
pub fn tokenize(src: &str, arch: &Arch) -> Vec<Token> {
    let mut lx = RawToken::lexer(src);
    let mut out = Vec::new();

    while let Some(res) = lx.next() {
        let span = lx.span();
        let text = lx.slice().to_string();
        let kind = match res {
            Ok(RawToken::NewLine)     => TokenKind::NewLine,
            Ok(RawToken::Whitespace)  => TokenKind::Whitespace,
            Ok(RawToken::Comment)     => TokenKind::Comment,
            Ok(RawToken::Int(lit))    => TokenKind::Int(lit),
            Ok(RawToken::Str(s))      => TokenKind::Str(s),
            Ok(RawToken::Char(c))     => TokenKind::Char(c),
            Ok(RawToken::Symbol)      => classify(&text, arch),
            Ok(RawToken::Operator(o)) => TokenKind::Operator(o),
            Ok(RawToken::Comma)       => TokenKind::Comma,
            Ok(RawToken::Colon)       => TokenKind::Colon,
            Ok(RawToken::Equals)      => TokenKind::Equals,
            Ok(RawToken::Open(b))     => TokenKind::Open(b),
            Ok(RawToken::Close(b))    => TokenKind::Close(b),
            Err(e)                    => TokenKind::Error(e),
        };
        out.push(Token { kind, span, text });
    }

    out.push(Token {
        kind: TokenKind::Eoi,
        span: src.len()..src.len(),
        text: String::new(),
    });
    out
}

#[cfg(test)]
mod tests {
    use crate::arch;
    use crate::parse::lex::{tokenize, Bracket, IntLit, LexErr, Op, Token, TokenKind};

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, &arch::risc16())
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }
    fn int(value: i128, radix: u32) -> TokenKind {
        TokenKind::Int(IntLit { value, radix })
    }

    #[test]
    fn test_numeric() {
        assert_eq!(
            kinds("0 123 0x2F 0X2f 0b101 0o17"),
            vec![
                int(0, 10), TokenKind::Whitespace,
                int(123, 10), TokenKind::Whitespace,
                int(0x2F, 16), TokenKind::Whitespace,
                int(0x2F, 16), TokenKind::Whitespace,
                int(5, 2), TokenKind::Whitespace,
                int(0o17, 8), TokenKind::Eoi,
            ]
        );
    }

    #[test]
    fn test_numeric_invalid() {
        assert_eq!(kinds("0xZZ")[0], TokenKind::Error(LexErr::InvalidHex));
        assert_eq!(kinds("0b12")[0], TokenKind::Error(LexErr::InvalidBin));
        assert_eq!(kinds("0o9")[0], TokenKind::Error(LexErr::InvalidOct));
        assert_eq!(kinds("23trst")[0], TokenKind::Error(LexErr::InvalidDec));
        assert_eq!(kinds("0x")[0], TokenKind::Error(LexErr::EmptyRadix));
        assert_eq!(
            kinds("0x100000000000000000000000000000000")[0],
            TokenKind::Error(LexErr::DoesNotFit)
        );
    }

    #[test]
    fn test_classification() {
        assert!(matches!(kinds(".word")[0], TokenKind::DirectiveKw(_)));
        assert!(matches!(kinds("add")[0], TokenKind::InstrKw(_)));
        assert!(matches!(kinds("ADD")[0], TokenKind::InstrKw(_)));
        assert_eq!(kinds("r3")[0], TokenKind::RegisterKw(3));
        assert_eq!(kinds("R3")[0], TokenKind::RegisterKw(3));
        assert_eq!(kinds("loop")[0], TokenKind::Symbol);
        assert_eq!(kinds(".notadirective")[0], TokenKind::Symbol);
    }

    #[test]
    fn test_operators_punct() {
        assert_eq!(
            kinds("a+b<<2,(x)!~y"),
            vec![
                TokenKind::Symbol,
                TokenKind::Operator(Op::Add),
                TokenKind::Symbol,
                TokenKind::Operator(Op::Shl),
                int(2, 10),
                TokenKind::Comma,
                TokenKind::Open(Bracket::Round),
                TokenKind::Symbol,
                TokenKind::Close(Bracket::Round),
                TokenKind::Operator(Op::BitClear),
                TokenKind::Operator(Op::Not),
                TokenKind::Symbol,
                TokenKind::Eoi,
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            kinds("1 ; everything\n2 // also this\n3 # and this"),
            vec![
                int(1, 10), TokenKind::Whitespace, TokenKind::Comment, TokenKind::NewLine,
                int(2, 10), TokenKind::Whitespace, TokenKind::Comment, TokenKind::NewLine,
                int(3, 10), TokenKind::Whitespace, TokenKind::Comment, TokenKind::Eoi,
            ]
        );
        assert_eq!(
            kinds("1 /* span\nmultiple lines */ 2"),
            vec![
                int(1, 10), TokenKind::Whitespace, TokenKind::Comment,
                TokenKind::Whitespace, int(2, 10), TokenKind::Eoi,
            ]
        );
        assert_eq!(kinds("/* never closed")[0], TokenKind::Error(LexErr::UnclosedBlockComment));
    }

    #[test]
    fn test_str_literal() {
        assert_eq!(kinds(r#""hello""#)[0], TokenKind::Str("hello".to_string()));
        assert_eq!(kinds(r#""a\n\t\"b\"""#)[0], TokenKind::Str("a\n\t\"b\"".to_string()));
        assert_eq!(kinds(r#""""#)[0], TokenKind::Str(String::new()));
        assert_eq!(kinds(r#"""#)[0], TokenKind::Error(LexErr::UnclosedStrLit));
    }

    #[test]
    fn test_str_literal_trailing_backslash() {
        // An escaped backslash before the closing quote does not escape
        // the quote; only an odd run of backslashes does.
        assert_eq!(
            kinds(r#""ab\\" x"#),
            vec![
                TokenKind::Str("ab\\".to_string()),
                TokenKind::Whitespace,
                TokenKind::Symbol,
                TokenKind::Eoi,
            ]
        );
        assert_eq!(kinds(r#""\\\"""#)[0], TokenKind::Str("\\\"".to_string()));
        assert_eq!(kinds(r#""\\\\""#)[0], TokenKind::Str("\\\\".to_string()));
        assert_eq!(kinds(r#""ab\""#)[0], TokenKind::Error(LexErr::UnclosedStrLit));
    }

    #[test]
    fn test_char_literal() {
        assert_eq!(kinds("'a'")[0], TokenKind::Char('a'));
        assert_eq!(kinds(r"'\n'")[0], TokenKind::Char('\n'));
        assert_eq!(kinds(r"'\''")[0], TokenKind::Char('\''));
        assert_eq!(kinds("'a")[0], TokenKind::Error(LexErr::UnclosedCharLit));
        assert_eq!(kinds("'")[0], TokenKind::Error(LexErr::UnclosedCharLit));
    }

    #[test]
    fn test_total_coverage() {
        // Concatenating every token's span must reconstruct the input
        // exactly: no gaps, no overlaps, even with garbage in the middle.
        let srcs = [
            "start: add r0, r1, r2 ; comment\n\t.word 1, 0x2\n",
            "a @ b ` c\n\"unclosed",
            "",
            "\n\n\n",
            "/* a */ '\\'' \"x\\\"y\" @@",
        ];
        let a = arch::risc16();
        for src in srcs {
            let tokens = tokenize(src, &a);
            let mut pos = 0;
            for t in &tokens {
                assert_eq!(t.span.start, pos, "gap or overlap in {src:?}");
                assert_eq!(&src[t.span.clone()], t.text, "span/text mismatch in {src:?}");
                pos = t.span.end;
            }
            assert_eq!(pos, src.len(), "tokens do not cover {src:?}");
            assert_eq!(tokens.last().map(|t| t.kind.clone()), Some(TokenKind::Eoi));
        }
    }

    #[test]
    fn test_progress() {
        // Adversarial inputs still terminate, with each unmatched char
        // becoming an error token.
        let tokens = tokenize("@@@", &arch::risc16());
        let errs: Vec<_> = tokens.iter()
            .filter(|t| matches!(t.kind, TokenKind::Error(_)))
            .collect();
        assert_eq!(errs.len(), 3);
        assert!(errs.iter().all(|t| t.span.len() == 1));
    }

    #[test]
    fn test_trivia_helpers() {
        let tokens = tokenize(" ; c\n", &arch::risc16());
        let [ws, comment, nl, eoi]: &[Token; 4] = tokens.as_slice().try_into().unwrap();
        assert!(ws.is_trivia());
        assert!(comment.is_trivia());
        assert!(!nl.is_trivia());
        assert!(nl.is_line_end());
        assert!(eoi.is_line_end());
    }
}
