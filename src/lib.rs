//! A retargetable assembler front end for small fixed-width teaching
//! architectures.
//!
//! This crate takes assembly source for one of several simple CPUs and
//! produces tokens, a parse tree with per-token diagnostics, and a placed
//! object image, all designed to sit behind an editor: compiles never
//! abort, errors annotate tokens instead, and results are cached per file.
//!
//! The pieces, in pipeline order:
//! - [`parse::lex`]: tokenizing source text (total coverage, keywords
//!   classified against the target's tables),
//! - [`parse`]: building a parse tree with backtracking rules
//!   ([`parse::rule`]) and infix expressions ([`parse::expr`]),
//! - [`asm`]: two-pass assembly into sections with late fixups, plus a
//!   table-driven disassembler ([`asm::disasm`]),
//! - [`arch`]: the target descriptions everything above is parameterized
//!   by,
//! - [`pipeline`]: the per-file compile cache a host drives.
//!
//! # Example
//!
//! ```
//! use polyasm::arch;
//! use polyasm::asm::{LinkerLayout, SectionKind};
//! use polyasm::ast::Value;
//! use polyasm::pipeline::{FileId, Workspace};
//!
//! let src = "
//!         ldi r1, 1
//!         ldi r0, 3
//! loop:   sub r0, r0, r1
//!         bne loop
//!         halt
//! ";
//!
//! let target = arch::risc16();
//! let mut ws = Workspace::new();
//! let out = ws.compile(FileId(0), src, &target, &LinkerLayout::default(), true);
//! assert!(!out.failed());
//!
//! let obj = out.object.as_ref().unwrap();
//! assert_eq!(obj.section(SectionKind::Text).unwrap().words.len(), 5);
//! assert_eq!(obj.symbol_value("loop"), Ok(Value::Num(0x1002)));
//! ```
#![warn(missing_docs)]

pub mod arch;
pub mod asm;
pub mod ast;
pub mod err;
pub mod parse;
pub mod pipeline;
