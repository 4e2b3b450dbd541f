//! Symbol table: interns tokens to dense `u32` ids.
//!
//! A single `Vocabulary` is created at decoder startup and shared by
//! reference (`Arc<Vocabulary>`) between the models, the decoder and every
//! worker thread. Ids are append-only and never reused.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Interned token id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(pub u32);

impl Symbol {
    /// Sentence-start marker `<s>`.
    pub const START: Symbol = Symbol(0);
    /// Sentence-end marker `</s>`.
    pub const END: Symbol = Symbol(1);

    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub const START_TOKEN: &str = "<s>";
pub const END_TOKEN: &str = "</s>";

#[derive(Default)]
struct Inner {
    by_name: HashMap<Arc<str>, Symbol>,
    names: Vec<Arc<str>>,
}

/// Thread-safe insert-or-lookup token interner.
///
/// Lookups take the read lock; only a miss upgrades to the write lock, and
/// the entry is re-checked there so two racing inserts of the same token
/// agree on one id.
pub struct Vocabulary {
    inner: RwLock<Inner>,
}

impl Vocabulary {
    pub fn new() -> Self {
        let vocab = Self {
            inner: RwLock::new(Inner::default()),
        };
        let start = vocab.intern(START_TOKEN);
        let end = vocab.intern(END_TOKEN);
        debug_assert_eq!(start, Symbol::START);
        debug_assert_eq!(end, Symbol::END);
        vocab
    }

    /// Return the id for `token`, assigning the next free id on first sight.
    pub fn intern(&self, token: &str) -> Symbol {
        {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            if let Some(&sym) = inner.by_name.get(token) {
                return sym;
            }
        }
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(&sym) = inner.by_name.get(token) {
            return sym;
        }
        let sym = Symbol(inner.names.len() as u32);
        let name: Arc<str> = Arc::from(token);
        inner.names.push(Arc::clone(&name));
        inner.by_name.insert(name, sym);
        sym
    }

    /// Look up a token without interning it.
    pub fn get(&self, token: &str) -> Option<Symbol> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_name.get(token).copied()
    }

    /// The token string for `sym`, or `None` if the id was never assigned.
    pub fn name(&self, sym: Symbol) -> Option<Arc<str>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.names.get(sym.0 as usize).cloned()
    }

    /// Intern every whitespace-separated token of an already-tokenized line.
    pub fn intern_line(&self, line: &str) -> Vec<Symbol> {
        line.split_whitespace().map(|t| self.intern(t)).collect()
    }

    /// Render symbols as a space-joined string. Unknown ids render as `#id`.
    pub fn render(&self, symbols: &[Symbol]) -> String {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut out = String::new();
        for (i, sym) in symbols.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            match inner.names.get(sym.0 as usize) {
                Some(name) => out.push_str(name),
                None => out.push_str(&sym.to_string()),
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vocabulary")
            .field("len", &self.len())
            .finish()
    }
}
