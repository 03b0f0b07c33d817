//! Task queue shared between the loop thread and its handles
//!
//! Tasks live in `tasks` from `insert` until they finish (or are cleared).
//! A task is eligible to run once it has an entry in `schedule`, keyed by
//! `(ready_at, seq)` so that earlier readiness wins and ties go to whichever
//! task became eligible first.

use super::task::{Task, TaskBody, TaskId, TaskKind};
use super::CallError;
use crate::interpreter::{PromiseId, Val};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

pub(crate) type Reply = oneshot::Sender<Result<Val, CallError>>;

type Key = (Instant, u64);

struct Slot {
    kind: TaskKind,
    body: TaskBody,
    delay: Duration,
    key: Option<Key>,
    completion: Option<Reply>,
}

/// A task taken off the schedule, ready to execute
pub(crate) struct Due {
    pub id: TaskId,
    pub kind: TaskKind,
    pub body: TaskBody,
    pub delay: Duration,
    pub completion: Option<Reply>,
}

pub(crate) struct Queue {
    next_id: u64,
    next_seq: u64,
    tasks: HashMap<TaskId, Slot>,
    schedule: BTreeMap<Key, TaskId>,
    closed: bool,
}

impl Queue {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            next_seq: 0,
            tasks: HashMap::new(),
            schedule: BTreeMap::new(),
            closed: false,
        }
    }

    fn key(&mut self, at: Instant) -> Key {
        self.next_seq += 1;
        (at, self.next_seq)
    }

    /// Register a task. Timers are scheduled right away; calls wait for
    /// `mark_ready`. A closed queue hands out the id and drops the task.
    pub fn insert(&mut self, task: Task, now: Instant) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        if self.closed {
            return id;
        }

        let key = if task.kind.is_timer() {
            let key = self.key(now + task.delay);
            self.schedule.insert(key, id);
            Some(key)
        } else {
            None
        };
        self.tasks.insert(
            id,
            Slot {
                kind: task.kind,
                body: task.body,
                delay: task.delay,
                key,
                completion: None,
            },
        );
        id
    }

    /// Make a task eligible now, behind everything already eligible
    ///
    /// Returns false (dropping `completion`) if the id is unknown.
    pub fn mark_ready(&mut self, id: TaskId, completion: Option<Reply>, now: Instant) -> bool {
        let key = self.key(now);
        let Some(slot) = self.tasks.get_mut(&id) else {
            return false;
        };
        if let Some(old) = slot.key.replace(key) {
            self.schedule.remove(&old);
        }
        if completion.is_some() {
            slot.completion = completion;
        }
        self.schedule.insert(key, id);
        true
    }

    /// Take the earliest task whose readiness time has passed
    ///
    /// Intervals keep their slot (unscheduled) while they run so they can
    /// be cleared from inside their own callback.
    pub fn pop_due(&mut self, now: Instant) -> Option<Due> {
        loop {
            let (&key, &id) = self.schedule.iter().next()?;
            if key.0 > now {
                return None;
            }
            self.schedule.remove(&key);

            let is_interval = match self.tasks.get(&id) {
                Some(slot) => slot.kind == TaskKind::Interval,
                None => continue,
            };
            let due = if is_interval {
                let Some(slot) = self.tasks.get_mut(&id) else {
                    continue;
                };
                slot.key = None;
                Due {
                    id,
                    kind: slot.kind,
                    body: slot.body.clone(),
                    delay: slot.delay,
                    completion: slot.completion.take(),
                }
            } else {
                let Some(slot) = self.tasks.remove(&id) else {
                    continue;
                };
                Due {
                    id,
                    kind: slot.kind,
                    body: slot.body,
                    delay: slot.delay,
                    completion: slot.completion,
                }
            };
            return Some(due);
        }
    }

    /// Readiness time of the earliest scheduled task
    pub fn next_deadline(&self) -> Option<Instant> {
        self.schedule.keys().next().map(|key| key.0)
    }

    /// Put an interval back on the schedule, unless it was cleared
    pub fn reschedule(&mut self, id: TaskId, at: Instant) {
        if self.closed {
            return;
        }
        let key = self.key(at);
        if let Some(slot) = self.tasks.get_mut(&id) {
            slot.key = Some(key);
            self.schedule.insert(key, id);
        }
    }

    /// Cancel a pending timer; anything else is left alone
    pub fn cancel_timer(&mut self, id: TaskId) -> bool {
        match self.tasks.get(&id) {
            Some(slot) if slot.kind.is_timer() => {}
            _ => return false,
        }
        if let Some(slot) = self.tasks.remove(&id) {
            if let Some(key) = slot.key {
                self.schedule.remove(&key);
            }
        }
        true
    }

    /// Refuse new work and drop everything pending
    ///
    /// Dropping the completion senders releases every waiting caller.
    pub fn close(&mut self) -> usize {
        self.closed = true;
        self.schedule.clear();
        let dropped = self.tasks.len();
        self.tasks.clear();
        dropped
    }

    /// Promise handles held by registered tasks
    pub fn collect_promise_ids(&self) -> Vec<PromiseId> {
        let mut ids = Vec::new();
        for slot in self.tasks.values() {
            slot.body.collect_promise_ids(&mut ids);
        }
        ids
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}
