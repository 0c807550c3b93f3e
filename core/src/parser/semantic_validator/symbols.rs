//! Symbol tables
//!
//! Tables are built while walking a feature set and then frozen. A child
//! scope points at an `Arc` snapshot of its parent, so lookups walk the
//! chain without ever mutating an enclosing table.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;

use crate::executor::types::ast::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Visibility {
    Internal,
    Published,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SymbolOrigin {
    /// Pulled in by a request-role action
    Extracted,
    /// Produced by an own-role action or a transition
    Computed,
    /// Bound directly from a literal
    Literal,
    /// Implicit parameter or loop variable
    Parameter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Symbol {
    pub name: String,
    pub defined_at: Span,
    pub visibility: Visibility,
    pub origin: SymbolOrigin,
}

impl Symbol {
    pub fn new(name: impl Into<String>, defined_at: Span, origin: SymbolOrigin) -> Self {
        Self {
            name: name.into(),
            defined_at,
            visibility: Visibility::Internal,
            origin,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
    parent: Option<Arc<SymbolTable>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new scope nested inside a frozen parent
    pub fn child_of(parent: Arc<SymbolTable>) -> Self {
        Self {
            symbols: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// Define (or redefine) a symbol in this scope
    pub fn define(&mut self, symbol: Symbol) {
        self.symbols.insert(symbol.name.clone(), symbol);
    }

    /// Mark a symbol as published. Symbols from enclosing scopes are copied
    /// into this scope first.
    pub fn publish(&mut self, name: &str) -> bool {
        if !self.symbols.contains_key(name) {
            match self.lookup(name).cloned() {
                Some(symbol) => self.define(symbol),
                None => return false,
            }
        }
        if let Some(symbol) = self.symbols.get_mut(name) {
            symbol.visibility = Visibility::Published;
        }
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        match self.symbols.get(name) {
            Some(symbol) => Some(symbol),
            None => self.parent.as_ref().and_then(|p| p.lookup(name)),
        }
    }

    pub fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn parent(&self) -> Option<&Arc<SymbolTable>> {
        self.parent.as_ref()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/* ===================== Published Aliases ===================== */

/// One `<Publish> as <alias> <variable>.` site
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedSymbol {
    pub alias: String,
    pub variable: String,
    pub feature_set: String,
    pub span: Span,
}

/// Program-wide view of every published alias
#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishedAliases {
    entries: BTreeMap<String, Vec<PublishedSymbol>>,
}

impl PublishedAliases {
    pub fn record(&mut self, symbol: PublishedSymbol) {
        self.entries
            .entry(symbol.alias.clone())
            .or_default()
            .push(symbol);
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    /// Every publish site of an alias, in program order
    pub fn publishers(&self, alias: &str) -> &[PublishedSymbol] {
        self.entries.get(alias).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&String, &Vec<PublishedSymbol>)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_scope_sees_parent_without_mutating_it() {
        let mut root = SymbolTable::new();
        root.define(Symbol::new("order", Span::default(), SymbolOrigin::Extracted));
        let root = Arc::new(root);

        let mut child = SymbolTable::child_of(root.clone());
        child.define(Symbol::new("item", Span::default(), SymbolOrigin::Parameter));

        assert!(child.lookup("order").is_some());
        assert!(child.lookup("item").is_some());
        assert!(root.lookup("item").is_none());
        assert!(child.lookup_local("order").is_none());
    }

    #[test]
    fn test_publish_marks_visibility() {
        let mut root = SymbolTable::new();
        root.define(Symbol::new("total", Span::default(), SymbolOrigin::Computed));
        assert!(root.publish("total"));
        assert_eq!(
            root.lookup("total").map(|s| s.visibility),
            Some(Visibility::Published)
        );
        assert!(!root.publish("missing"));
    }
}
