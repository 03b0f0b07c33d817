//! Lexical scope arena
//!
//! Scopes live in a flat arena owned by the VM and are addressed by
//! `ScopeId`, so values never hold references into the VM. Closures keep
//! the id of the scope they were created in; once a scope has been captured
//! it (and every ancestor) stays alive for the lifetime of the VM. Scopes
//! nobody captured are reclaimed as soon as their block or call exits.

use super::types::Val;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    pub const GLOBAL: ScopeId = ScopeId(0);
}

#[derive(Debug, Clone)]
pub struct Slot {
    pub value: Val,
    pub constant: bool,
}

#[derive(Debug, Default)]
struct Scope {
    vars: HashMap<String, Slot>,
    parent: Option<ScopeId>,
    captured: bool,
}

#[derive(Debug)]
pub struct Scopes {
    slots: Vec<Option<Scope>>,
    free: Vec<usize>,
}

impl Scopes {
    pub fn new() -> Self {
        let global = Scope {
            captured: true,
            ..Default::default()
        };
        Self {
            slots: vec![Some(global)],
            free: Vec::new(),
        }
    }

    /// Open a child scope of `parent`
    pub fn push(&mut self, parent: ScopeId) -> ScopeId {
        let scope = Scope {
            parent: Some(parent),
            ..Default::default()
        };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(scope);
                ScopeId(idx)
            }
            None => {
                self.slots.push(Some(scope));
                ScopeId(self.slots.len() - 1)
            }
        }
    }

    /// Close a scope; its slot is reused unless a closure captured it
    pub fn release(&mut self, id: ScopeId) {
        let reclaim = matches!(self.slots.get(id.0), Some(Some(scope)) if !scope.captured);
        if reclaim {
            self.slots[id.0] = None;
            self.free.push(id.0);
        }
    }

    /// Pin a scope and all of its ancestors
    pub fn capture(&mut self, id: ScopeId) {
        let mut current = Some(id);
        while let Some(cid) = current {
            match self.slots.get_mut(cid.0) {
                Some(Some(scope)) if !scope.captured => {
                    scope.captured = true;
                    current = scope.parent;
                }
                // Captured scopes always have captured ancestors
                _ => break,
            }
        }
    }

    pub fn declare(&mut self, scope: ScopeId, name: &str, value: Val, constant: bool) {
        if let Some(Some(s)) = self.slots.get_mut(scope.0) {
            s.vars.insert(name.to_string(), Slot { value, constant });
        }
    }

    fn find(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.slots.get(id.0)?.as_ref()?;
            if s.vars.contains_key(name) {
                return Some(id);
            }
            current = s.parent;
        }
        None
    }

    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&Val> {
        let id = self.find(scope, name)?;
        self.slots[id.0]
            .as_ref()?
            .vars
            .get(name)
            .map(|slot| &slot.value)
    }

    pub fn slot_mut(&mut self, scope: ScopeId, name: &str) -> Option<&mut Slot> {
        let id = self.find(scope, name)?;
        self.slots.get_mut(id.0)?.as_mut()?.vars.get_mut(name)
    }

    /// Every variable value in every live scope
    pub fn values(&self) -> impl Iterator<Item = &Val> {
        self.slots
            .iter()
            .flatten()
            .flat_map(|scope| scope.vars.values().map(|slot| &slot.value))
    }

    /// Number of scopes currently alive (global included)
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}
