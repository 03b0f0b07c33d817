//! Promise table
//!
//! Promises are entries in a table owned by the VM; scripts only ever hold a
//! `Val::Promise(id)` handle. Settling a promise never runs script code
//! directly: every reaction becomes a `Job` that the host drains with
//! `Vm::take_jobs` and runs later, one at a time.

use super::types::{PromiseId, Val};
use std::collections::{HashMap, HashSet};

/// Final outcome of a promise
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Fulfilled(Val),
    Rejected(Val),
}

impl Settlement {
    pub fn value(&self) -> &Val {
        match self {
            Settlement::Fulfilled(v) | Settlement::Rejected(v) => v,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Settlement::Rejected(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    Pending,
    Settled(Settlement),
}

/// Handlers registered through `then`/`catch`, plus the promise they feed
///
/// A reaction without handlers passes the settlement through unchanged,
/// which is how adopting another promise is expressed.
#[derive(Debug, Clone)]
pub struct Reaction {
    pub on_fulfilled: Option<Val>,
    pub on_rejected: Option<Val>,
    pub derived: PromiseId,
}

impl Reaction {
    fn collect_promise_ids(&self, out: &mut Vec<PromiseId>) {
        out.push(self.derived);
        for handler in [&self.on_fulfilled, &self.on_rejected].into_iter().flatten() {
            handler.collect_promise_ids(out);
        }
    }
}

/// A reaction that is ready to run
#[derive(Debug, Clone)]
pub struct Job {
    pub reaction: Reaction,
    pub settlement: Settlement,
}

impl Job {
    /// Push every promise this job can still touch onto `out`
    pub fn collect_promise_ids(&self, out: &mut Vec<PromiseId>) {
        self.reaction.collect_promise_ids(out);
        self.settlement.value().collect_promise_ids(out);
    }
}

#[derive(Debug)]
struct Entry {
    state: PromiseState,
    reactions: Vec<Reaction>,
    handled: bool,
}

#[derive(Debug, Default)]
pub struct PromiseTable {
    next_id: u64,
    entries: HashMap<PromiseId, Entry>,
    rejected_unhandled: Vec<PromiseId>,
}

impl PromiseTable {
    pub fn create(&mut self) -> PromiseId {
        self.next_id += 1;
        let id = PromiseId(self.next_id);
        self.entries.insert(
            id,
            Entry {
                state: PromiseState::Pending,
                reactions: Vec::new(),
                handled: false,
            },
        );
        id
    }

    pub fn state(&self, id: PromiseId) -> Option<&PromiseState> {
        self.entries.get(&id).map(|e| &e.state)
    }

    pub fn contains(&self, id: PromiseId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Settle a pending promise and return the jobs its reactions produce
    ///
    /// Settling an already settled promise is ignored. Returns `None` for
    /// an unknown id.
    pub fn settle(&mut self, id: PromiseId, settlement: Settlement) -> Option<Vec<Job>> {
        let entry = self.entries.get_mut(&id)?;
        if entry.state != PromiseState::Pending {
            return Some(Vec::new());
        }
        if settlement.is_rejected() && !entry.handled {
            self.rejected_unhandled.push(id);
        }
        entry.state = PromiseState::Settled(settlement.clone());
        let jobs = entry
            .reactions
            .drain(..)
            .map(|reaction| Job {
                reaction,
                settlement: settlement.clone(),
            })
            .collect();
        Some(jobs)
    }

    /// Attach a reaction; runs immediately (as a job) if already settled
    pub fn subscribe(&mut self, id: PromiseId, reaction: Reaction) -> Option<Option<Job>> {
        let entry = self.entries.get_mut(&id)?;
        entry.handled = true;
        match &entry.state {
            PromiseState::Pending => {
                entry.reactions.push(reaction);
                Some(None)
            }
            PromiseState::Settled(settlement) => Some(Some(Job {
                reaction,
                settlement: settlement.clone(),
            })),
        }
    }

    /// Rejections that still have no handler attached
    ///
    /// Drains the candidates recorded since the last call, so each rejection
    /// is reported at most once.
    pub fn take_unhandled(&mut self) -> Vec<(PromiseId, Val)> {
        let candidates = std::mem::take(&mut self.rejected_unhandled);
        candidates
            .into_iter()
            .filter_map(|id| {
                let entry = self.entries.get(&id)?;
                match &entry.state {
                    PromiseState::Settled(Settlement::Rejected(reason)) if !entry.handled => {
                        Some((id, reason.clone()))
                    }
                    _ => None,
                }
            })
            .collect()
    }

    /// Drop settled promises that `roots` cannot reach
    ///
    /// Pending promises are always kept (a host may still settle them) and
    /// count as roots, as do rejections not yet reported. Returns how many
    /// entries were dropped.
    pub fn sweep(&mut self, mut roots: Vec<PromiseId>) -> usize {
        roots.extend(self.rejected_unhandled.iter().copied());
        roots.extend(
            self.entries
                .iter()
                .filter(|(_, entry)| entry.state == PromiseState::Pending)
                .map(|(id, _)| *id),
        );

        let mut reachable = HashSet::new();
        while let Some(id) = roots.pop() {
            if !reachable.insert(id) {
                continue;
            }
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            if let PromiseState::Settled(settlement) = &entry.state {
                settlement.value().collect_promise_ids(&mut roots);
            }
            for reaction in &entry.reactions {
                reaction.collect_promise_ids(&mut roots);
            }
        }

        let before = self.entries.len();
        self.entries.retain(|id, _| reachable.contains(id));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
