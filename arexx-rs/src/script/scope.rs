//! Variable tables and the scope stack.
//!
//! Names are case-insensitive: every operation keys on the uppercased name.
//! Only the innermost table is ever visible, so a procedure cannot read or
//! change a caller's variables.

use std::collections::HashMap;

use super::value::Value;

/// One variable table.
pub type VarTable = HashMap<String, Value>;

/// Stack of variable tables.  The bottom (root) table lives for the whole
/// run and is never popped.
#[derive(Debug)]
pub struct ScopeStack {
    tables: Vec<VarTable>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack { tables: vec![VarTable::new()] }
    }

    fn current(&self) -> &VarTable {
        // The root table is never popped.
        &self.tables[self.tables.len() - 1]
    }

    fn current_mut(&mut self) -> &mut VarTable {
        let top = self.tables.len() - 1;
        &mut self.tables[top]
    }

    /// Set (or overwrite) a variable in the current table.
    pub fn set(&mut self, name: &str, value: Value) {
        self.current_mut().insert(name.to_ascii_uppercase(), value);
    }

    /// Look up a variable in the current table.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.current().get(&name.to_ascii_uppercase())
    }

    /// Returns `true` if the variable is set in the current table.
    pub fn has(&self, name: &str) -> bool {
        self.current().contains_key(&name.to_ascii_uppercase())
    }

    /// Remove a variable from the current table.  Returns `true` if it existed.
    pub fn unset(&mut self, name: &str) -> bool {
        self.current_mut().remove(&name.to_ascii_uppercase()).is_some()
    }

    /// Empty the current table.
    pub fn clear(&mut self) {
        self.current_mut().clear();
    }

    /// Push a fresh table bound positionally from `params` and `args`.
    /// Parameters without a matching argument bind to the empty string;
    /// surplus arguments are dropped.
    pub fn push_scope(&mut self, params: &[String], args: Vec<Value>) {
        let mut table = VarTable::new();
        let mut args = args.into_iter();
        for p in params {
            table.insert(p.to_ascii_uppercase(), args.next().unwrap_or_default());
        }
        self.tables.push(table);
    }

    /// Discard the current table.  The root table stays; returns `false`
    /// if asked to pop it.
    pub fn pop_scope(&mut self) -> bool {
        if self.tables.len() > 1 {
            self.tables.pop();
            true
        } else {
            false
        }
    }

    /// Number of tables, root included.
    pub fn depth(&self) -> usize {
        self.tables.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
