//! The compile pipeline and its per-file cache.
//!
//! A [`Workspace`] owns one cached compile per file. [`Workspace::compile`]
//! runs tokenize, parse, and (optionally) assemble over a source snapshot
//! and returns the whole result as one shared [`Compiled`]; compiling the
//! same snapshot again with the same settings returns the identical `Arc`
//! without re-running anything.
//!
//! There is no incremental re-lexing: any change to a file's source
//! replaces its trees wholesale on the next compile.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::arch::Arch;
use crate::asm::{assemble, LinkerLayout, Object};
use crate::ast::Node;
use crate::err::Diagnostics;
use crate::parse::{lex, parse_tree};

/// Identifies one source file to the cache. The host assigns these.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct FileId(pub u32);

/// Everything one compile produced.
#[derive(Debug)]
pub struct Compiled {
    /// The token list, covering the whole source.
    pub tokens: Vec<lex::Token>,
    /// The parse tree root.
    pub root: Node,
    /// Every annotation attached during the compile.
    pub diags: Diagnostics,
    /// The assembled object, if a full compile was requested.
    pub object: Option<Object>,
}

impl Compiled {
    /// Whether the compile failed. Warnings don't fail a compile; any
    /// error-severity annotation does.
    pub fn failed(&self) -> bool {
        self.diags.has_errors()
    }
}

struct CacheEntry {
    src: String,
    arch_id: usize,
    layout: LinkerLayout,
    full: bool,
    result: Arc<Compiled>,
}

impl CacheEntry {
    /// Whether this entry already answers a request.
    ///
    /// A full compile's result also answers a parse-only request for the
    /// same snapshot, but not the other way around. The architecture is
    /// identified by the address of its table, not its name, so a host
    /// that passes an edited copy of a bundled table never gets a stale
    /// hit.
    fn satisfies(&self, src: &str, arch: &Arch, layout: &LinkerLayout, full: bool) -> bool {
        self.src == src
            && self.arch_id == arch_id(arch)
            && (!full || (self.full && self.layout == *layout))
    }
}

fn arch_id(arch: &Arch) -> usize {
    arch as *const Arch as usize
}

/// A set of files and their cached compiles.
#[derive(Default)]
pub struct Workspace {
    cache: HashMap<FileId, CacheEntry>,
}

impl Workspace {
    /// Creates an empty workspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles one file's source snapshot, or returns the cached result
    /// if nothing relevant changed since the last call.
    ///
    /// With `full` false, the compile stops after parsing (`object` is
    /// `None`); an editor uses this for files it only needs diagnostics
    /// for.
    ///
    /// The cache treats `arch` as identified by reference: keep one
    /// [`Arch`] value alive across calls to benefit from caching.
    /// Rebuilding the table each call recompiles every time.
    pub fn compile(
        &mut self,
        file: FileId,
        src: &str,
        arch: &Arch,
        layout: &LinkerLayout,
        full: bool,
    ) -> Arc<Compiled> {
        if let Some(entry) = self.cache.get(&file) {
            if entry.satisfies(src, arch, layout, full) {
                debug!("cache hit for {file:?}");
                return Arc::clone(&entry.result);
            }
        }

        debug!("compiling {file:?}: {} bytes, arch {}, full={full}", src.len(), arch.name);
        let mut diags = Diagnostics::new();
        let tokens = lex::tokenize(src, arch);
        for (i, t) in tokens.iter().enumerate() {
            if let lex::TokenKind::Error(e) = &t.kind {
                diags.report(i, t.span.clone(), e);
            }
        }
        let root = parse_tree(&tokens, arch, &mut diags);
        let object = match full {
            true => Some(assemble(&tokens, &root, arch, layout, &mut diags)),
            false => None,
        };
        debug!(
            "compiled {file:?}: {} token(s), {} annotation(s)",
            tokens.len(),
            diags.len()
        );

        let result = Arc::new(Compiled { tokens, root, diags, object });
        self.cache.insert(
            file,
            CacheEntry {
                src: src.to_string(),
                arch_id: arch_id(arch),
                layout: layout.clone(),
                full,
                result: Arc::clone(&result),
            },
        );
        result
    }

    /// The cached compile for a file, if there is one.
    pub fn cached(&self, file: FileId) -> Option<Arc<Compiled>> {
        self.cache.get(&file).map(|e| Arc::clone(&e.result))
    }

    /// Drops a file's cached compile (say, when the host closes the file).
    pub fn invalidate(&mut self, file: FileId) {
        self.cache.remove(&file);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{FileId, Workspace};
    use crate::arch;
    use crate::asm::{LayoutEntry, LinkerLayout, SectionKind};

    #[test]
    fn test_cache_hit_is_same_arc() {
        let a = arch::risc16();
        let layout = LinkerLayout::default();
        let mut ws = Workspace::new();

        let first = ws.compile(FileId(0), "nop\n", &a, &layout, true);
        let second = ws.compile(FileId(0), "nop\n", &a, &layout, true);
        assert!(Arc::ptr_eq(&first, &second));

        // Different source: recompiled.
        let third = ws.compile(FileId(0), "halt\n", &a, &layout, true);
        assert!(!Arc::ptr_eq(&first, &third));

        // Files are cached independently.
        let other = ws.compile(FileId(1), "halt\n", &a, &layout, true);
        assert!(!Arc::ptr_eq(&third, &other));
    }

    #[test]
    fn test_cache_invalidated_by_settings() {
        let a = arch::risc16();
        let layout = LinkerLayout::default();
        let mut ws = Workspace::new();

        let first = ws.compile(FileId(0), "bra 0x2000\n", &a, &layout, true);

        // A different layout changes addresses, so it recompiles.
        let moved = LinkerLayout {
            entries: vec![LayoutEntry { kind: SectionKind::Text, start: Some(0x2000), align: None }],
        };
        let second = ws.compile(FileId(0), "bra 0x2000\n", &a, &moved, true);
        assert!(!Arc::ptr_eq(&first, &second));

        // A different architecture recompiles too.
        let b = arch::ember32();
        let third = ws.compile(FileId(0), "bra 0x2000\n", &b, &layout, true);
        assert!(!Arc::ptr_eq(&second, &third));
    }

    #[test]
    fn test_edited_arch_recompiles() {
        let layout = LinkerLayout::default();
        let mut ws = Workspace::new();

        let a = arch::risc16();
        let first = ws.compile(FileId(0), "add r0, r1, r2\n", &a, &layout, true);
        assert!(!first.failed());

        // An edited copy of the table, even with the same name, must not
        // be answered from the original's cache entry.
        let mut b = arch::risc16();
        b.instructions.retain(|i| i.mnemonic != "add");
        let second = ws.compile(FileId(0), "add r0, r1, r2\n", &b, &layout, true);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.failed());
    }

    #[test]
    fn test_parse_only_compile() {
        let a = arch::risc16();
        let layout = LinkerLayout::default();
        let mut ws = Workspace::new();

        let parsed = ws.compile(FileId(0), "nop\n", &a, &layout, false);
        assert!(parsed.object.is_none());
        assert!(!parsed.failed());

        // A full request is not answered by the parse-only entry.
        let full = ws.compile(FileId(0), "nop\n", &a, &layout, true);
        assert!(!Arc::ptr_eq(&parsed, &full));
        assert!(full.object.is_some());

        // But the full entry answers a later parse-only request.
        let again = ws.compile(FileId(0), "nop\n", &a, &layout, false);
        assert!(Arc::ptr_eq(&full, &again));
    }

    #[test]
    fn test_failed_flag_and_invalidate() {
        let a = arch::risc16();
        let layout = LinkerLayout::default();
        let mut ws = Workspace::new();

        let bad = ws.compile(FileId(7), "add r1\n", &a, &layout, true);
        assert!(bad.failed());
        // A failed compile still has its tree and object.
        assert!(bad.object.is_some());

        assert!(ws.cached(FileId(7)).is_some());
        ws.invalidate(FileId(7));
        assert!(ws.cached(FileId(7)).is_none());
    }

    #[test]
    fn test_lex_errors_reported() {
        let a = arch::risc16();
        let mut ws = Workspace::new();

        let out = ws.compile(FileId(0), "ldi r0, 0xZZ\n", &a, &LinkerLayout::default(), false);
        assert!(out.failed());
        assert!(out.diags.iter().any(|n| n.message.contains("hex")));
    }
}
