use std::collections::HashMap;

use rtmc_types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Global,
    Local,
    Param,
    /// A message channel. `Symbol::address` holds its channel id, not a
    /// memory address.
    Message,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub ty: Type,
    pub address: u32,
    pub is_const: bool,
}

/// A stack of lexical scopes, pushed on block/function entry and popped on
/// exit. Lookups walk from the innermost scope outward so inner
/// declarations shadow outer ones.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<HashMap<String, Symbol>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self { scopes: vec![HashMap::new()] }
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
        debug_assert!(!self.scopes.is_empty(), "popped the file scope");
    }

    /// Declares `name` in the innermost scope. Returns `false` if it is
    /// already defined there (a distinct error from shadowing an outer
    /// scope, which is allowed).
    pub fn declare(&mut self, name: &str, symbol: Symbol) -> bool {
        let scope = self.scopes.last_mut().expect("at least one scope");
        if scope.contains_key(name) {
            return false;
        }
        scope.insert(name.to_string(), symbol);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }
}
