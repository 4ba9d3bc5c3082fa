// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The propagation core: the event graph, state deduction, handler registration and
//! removal, priority and one-shot disciplines, and cycle prevention.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use cascade_support::Erased;

use crate::dispatcher::{Dispatcher, Priority};
use crate::error::CoreError;
use crate::event_id::EventId;

const WHY_TRUE: &str = "<true>";
const WHY_UNKNOWN: &str = "<unknown>";

#[derive(Clone)]
enum HandlerKey {
    Single,
    Named(Box<str>),
}

type HandlerFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct EventSlot {
    name: Option<Box<str>>,
    state: bool,
    prev_true: HashSet<EventId>,
    prev_false: HashSet<EventId>,
    next_true: HashSet<EventId>,
    next_false: HashSet<EventId>,
    handler: Option<HandlerFn>,
    multi: Vec<(Box<str>, HandlerFn)>,
    priority: Priority,
    one_shot: bool,
    data: Option<Erased>,
    write_protected: bool,
}

impl EventSlot {
    fn is_source(&self) -> bool {
        self.prev_true.is_empty() && self.prev_false.is_empty()
    }

    fn reset_for_reuse(&mut self, name: &str) {
        *self = EventSlot { name: Some(name.into()), ..EventSlot::default() };
    }
}

struct EngineInner {
    dispatcher: Dispatcher,
    names: HashMap<Box<str>, EventId>,
    slots: Vec<EventSlot>,
    tombstones: Vec<u32>,
}

impl EngineInner {
    fn get_or_create(&mut self, name: &str) -> EventId {
        if let Some(id) = self.names.get(name) {
            return *id;
        }
        let id = if let Some(raw) = self.tombstones.pop() {
            let id = EventId::new(raw);
            self.slots[id.index()].reset_for_reuse(name);
            id
        } else {
            let id = EventId::new(self.slots.len() as u32);
            self.slots.push(EventSlot { name: Some(name.into()), ..EventSlot::default() });
            id
        };
        self.names.insert(name.into(), id);
        id
    }

    fn state_of(&self, id: EventId) -> bool {
        if id.index() >= self.slots.len() {
            return false;
        }
        self.slots[id.index()].state
    }

    fn name_of(&self, id: EventId) -> &str {
        self.slots.get(id.index()).and_then(|s| s.name.as_deref()).unwrap_or(WHY_UNKNOWN)
    }

    /// Breadth-first worklist re-deduction, seeded from the *successors* of `seeds`
    /// (events whose state just changed). Use this when `seeds` themselves are
    /// sources or were just assigned directly (their own value is not derived).
    /// No recursion, so adversarially deep graphs cannot blow the stack. Returns
    /// events that actually changed their own state.
    fn propagate(&mut self, seeds: impl IntoIterator<Item = EventId>) -> Vec<EventId> {
        let mut queue: VecDeque<EventId> = VecDeque::new();
        let mut queued: HashSet<EventId> = HashSet::new();

        for seed in seeds {
            for succ in self.successors_of(seed) {
                if queued.insert(succ) {
                    queue.push_back(succ);
                }
            }
        }
        self.run_worklist(queue, queued)
    }

    /// Like [`Self::propagate`], but re-deduces `dirty` itself first, rather than
    /// its successors. Use this when `dirty`'s own predecessor set just changed
    /// (e.g. a predecessor was removed) and its own fixed point may be stale.
    fn propagate_dirty(&mut self, dirty: impl IntoIterator<Item = EventId>) -> Vec<EventId> {
        let mut queue: VecDeque<EventId> = VecDeque::new();
        let mut queued: HashSet<EventId> = HashSet::new();
        for id in dirty {
            if queued.insert(id) {
                queue.push_back(id);
            }
        }
        self.run_worklist(queue, queued)
    }

    fn run_worklist(
        &mut self,
        mut queue: VecDeque<EventId>,
        mut queued: HashSet<EventId>,
    ) -> Vec<EventId> {
        let mut changed = Vec::new();
        while let Some(id) = queue.pop_front() {
            queued.remove(&id);
            let slot = &self.slots[id.index()];
            if slot.is_source() {
                continue;
            }
            let new_value = {
                let prev_true = slot.prev_true.clone();
                let prev_false = slot.prev_false.clone();
                prev_true.iter().all(|p| self.state_of(*p)) && prev_false.iter().all(|p| !self.state_of(*p))
            };
            let slot = &mut self.slots[id.index()];
            if slot.state != new_value {
                let was_false = !slot.state;
                slot.state = new_value;
                changed.push(id);
                if was_false && new_value {
                    self.fire_rising_edge(id);
                }
                for succ in self.successors_of(id) {
                    if queued.insert(succ) {
                        queue.push_back(succ);
                    }
                }
            }
        }
        changed
    }

    fn successors_of(&self, id: EventId) -> Vec<EventId> {
        let slot = &self.slots[id.index()];
        slot.next_true.iter().chain(slot.next_false.iter()).copied().collect()
    }

    fn fire_rising_edge(&self, id: EventId) {
        let slot = &self.slots[id.index()];
        if let Some(h) = &slot.handler {
            self.dispatcher.post(Arc::downgrade(h), slot.priority);
        }
        for (_, h) in &slot.multi {
            self.dispatcher.post(Arc::downgrade(h), slot.priority);
        }
    }

    fn reachable_via_next(&self, from: EventId, target: EventId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            stack.extend(self.successors_of(id));
        }
        false
    }

    fn blocking_predecessor(&self, id: EventId) -> Option<EventId> {
        let slot = &self.slots[id.index()];
        slot.prev_true
            .iter()
            .find(|p| !self.state_of(**p))
            .or_else(|| slot.prev_false.iter().find(|p| self.state_of(**p)))
            .copied()
    }
}

/// Weak handle back into the engine, captured by handler-wrapping closures so that
/// one-shot removal can run after the handler completes without keeping the engine
/// alive on the dispatcher's account.
#[derive(Clone)]
struct EngineHandle(Weak<Mutex<EngineInner>>);

impl EngineHandle {
    fn maybe_remove_one_shot(&self, id: EventId, key: &HandlerKey) {
        let Some(inner) = self.0.upgrade() else { return };
        let mut inner = inner.lock();
        if id.index() >= inner.slots.len() {
            return;
        }
        let slot = &mut inner.slots[id.index()];
        if !slot.one_shot {
            return;
        }
        match key {
            HandlerKey::Single => {
                slot.handler = None;
            }
            HandlerKey::Named(name) => {
                slot.multi.retain(|(n, _)| n.as_ref() != name.as_ref());
            }
        }
    }
}

fn build_composite(
    handle: EngineHandle,
    id: EventId,
    key: HandlerKey,
    user_fn: HandlerFn,
) -> HandlerFn {
    Arc::new(move || {
        user_fn();
        handle.maybe_remove_one_shot(id, &key);
    })
}

/// The propagation core: a cheaply-`Clone`-able handle onto shared engine state,
/// following the same `Arc<Mutex<_>>`-handle pattern used for the shared
/// scheduler elsewhere in this stack. All public operations execute on the owning
/// thread per the engine's single-writer contract; the `Mutex` exists for interior
/// mutability of the handle, not for cross-thread contention.
#[derive(Clone)]
pub struct Engine(Arc<Mutex<EngineInner>>);

impl Engine {
    /// Builds a new, empty engine bound to `dispatcher`. The dispatcher is shared
    /// (not owned): the host keeps its own clone to drive `run_all` on the main loop.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self(Arc::new(Mutex::new(EngineInner {
            dispatcher,
            names: HashMap::new(),
            slots: Vec::new(),
            tombstones: Vec::new(),
        })))
    }

    fn handle(&self) -> EngineHandle {
        EngineHandle(Arc::downgrade(&self.0))
    }

    /// Idempotent: returns the existing identity if `name` is known, else issues one
    /// (recycling a tombstoned identity when available, else extending the dense
    /// range).
    pub fn new_event(&self, name: &str) -> EventId {
        self.0.lock().get_or_create(name)
    }

    pub fn get_event(&self, name: &str) -> Option<EventId> {
        self.0.lock().names.get(name).copied()
    }

    /// Unknown or out-of-range returns `false`, per the engine's documented lookup
    /// semantics (not an error).
    pub fn state(&self, name: &str) -> bool {
        let inner = self.0.lock();
        inner.names.get(name).map(|id| inner.state_of(*id)).unwrap_or(false)
    }

    pub fn state_of(&self, id: EventId) -> bool {
        self.0.lock().state_of(id)
    }

    /// Declares edges from each `(prev_name, color)` into `name`. Fails (leaving the
    /// graph unchanged) on a self-loop or on any edge that would introduce a cycle
    /// considering both colors.
    pub fn set_prev(&self, name: &str, prevs: &[(&str, bool)]) -> Result<EventId, CoreError> {
        let mut inner = self.0.lock();
        let target = inner.get_or_create(name);

        let mut resolved = Vec::with_capacity(prevs.len());
        for (prev_name, color) in prevs {
            let prev_id = inner.get_or_create(prev_name);
            if prev_id == target {
                tracing::warn!(event = name, "set_prev: self-loop rejected");
                return Err(CoreError::SelfLoop(target));
            }
            resolved.push((prev_id, *color));
        }
        for (prev_id, _) in &resolved {
            if inner.reachable_via_next(target, *prev_id) {
                tracing::warn!(event = name, prev = inner.name_of(*prev_id), "set_prev: cycle rejected");
                return Err(CoreError::WouldCycle { from: *prev_id, to: target });
            }
        }

        for (prev_id, color) in resolved {
            let slot = &mut inner.slots[target.index()];
            if color {
                slot.prev_true.insert(prev_id);
            } else {
                slot.prev_false.insert(prev_id);
            }
            let prev_slot = &mut inner.slots[prev_id.index()];
            if color {
                prev_slot.next_true.insert(target);
            } else {
                prev_slot.next_false.insert(target);
            }
        }

        // `target` itself needs an initial deduction: `propagate` only re-deduces a
        // seed's *successors*, but target may now have predecessors for the first
        // time (or new ones), so its own fixed point must be recomputed directly.
        let is_source = inner.slots[target.index()].is_source();
        if !is_source {
            let prev_true = inner.slots[target.index()].prev_true.clone();
            let prev_false = inner.slots[target.index()].prev_false.clone();
            let new_value =
                prev_true.iter().all(|p| inner.state_of(*p)) && prev_false.iter().all(|p| !inner.state_of(*p));
            let current = inner.slots[target.index()].state;
            if new_value != current {
                inner.slots[target.index()].state = new_value;
                if !current && new_value {
                    inner.fire_rising_edge(target);
                }
            }
        }
        inner.propagate([target]);
        Ok(target)
    }

    /// Applies simultaneous facts to sources, then deduces every reachable
    /// successor to a fixed point. Facts on non-source events are ignored. Returns
    /// the number of source facts that actually changed state.
    pub fn set_state(&self, facts: &[(&str, bool)]) -> usize {
        let mut inner = self.0.lock();
        let mut seeds = Vec::with_capacity(facts.len());
        let mut changed = 0usize;

        for (name, value) in facts {
            let id = inner.get_or_create(name);
            if !inner.slots[id.index()].is_source() {
                continue;
            }
            let slot = &mut inner.slots[id.index()];
            if slot.state != *value {
                let was_false = !slot.state;
                slot.state = *value;
                changed += 1;
                if was_false && *value {
                    inner.fire_rising_edge(id);
                }
                seeds.push(id);
            }
        }

        inner.propagate(seeds);
        changed
    }

    /// First root-cause path: the nearest predecessor whose mis-state blocks this
    /// event, walked to the deepest traversal. Returns a reserved string if the
    /// event is true or unknown.
    pub fn why_false(&self, name: &str) -> String {
        let inner = self.0.lock();
        let Some(mut current) = inner.names.get(name).copied() else { return WHY_UNKNOWN.into() };
        if inner.state_of(current) {
            return WHY_TRUE.into();
        }
        loop {
            match inner.blocking_predecessor(current) {
                Some(p) => current = p,
                None => break,
            }
        }
        format!("{}=={}", inner.name_of(current), inner.state_of(current))
    }

    /// Attaches the single handler for `name`, creating the event if needed. Fails
    /// if a handler is already set. If the event is currently true, immediately
    /// enqueues the handler at its priority.
    pub fn set_handler(
        &self,
        name: &str,
        f: impl Fn() + Send + Sync + 'static,
    ) -> Result<EventId, CoreError> {
        let handle = self.handle();
        let mut inner = self.0.lock();
        let id = inner.get_or_create(name);
        if inner.slots[id.index()].handler.is_some() {
            tracing::warn!(event = name, "set_handler: handler already set");
            return Err(CoreError::HandlerExists(id));
        }
        let composite = build_composite(handle, id, HandlerKey::Single, Arc::new(f));
        let slot = &mut inner.slots[id.index()];
        slot.handler = Some(composite.clone());
        let (was_true, priority) = (slot.state, slot.priority);
        if was_true {
            inner.dispatcher.post(Arc::downgrade(&composite), priority);
        }
        Ok(id)
    }

    /// Creates a new event `alias_name` whose only predecessor is `host_name@true`,
    /// and attaches `f` on the alias. Fails if `alias_name` already names an event.
    pub fn multi_handler(
        &self,
        alias_name: &str,
        f: impl Fn() + Send + Sync + 'static,
        host_name: &str,
    ) -> Result<EventId, CoreError> {
        {
            let inner = self.0.lock();
            if inner.names.contains_key(alias_name) {
                tracing::warn!(alias = alias_name, "multi_handler: alias already names an event");
                return Err(CoreError::AliasExists(alias_name.to_string()));
            }
        }
        self.set_prev(alias_name, &[(host_name, true)])?;
        self.set_handler(alias_name, f)
    }

    /// Adds a named handler to `name`'s multi-handler bag. Duplicate `handler_name`
    /// is rejected.
    pub fn multi_handler_on_same(
        &self,
        name: &str,
        f: impl Fn() + Send + Sync + 'static,
        handler_name: &str,
    ) -> Result<EventId, CoreError> {
        let handle = self.handle();
        let mut inner = self.0.lock();
        let id = inner.get_or_create(name);
        if inner.slots[id.index()].multi.iter().any(|(n, _)| n.as_ref() == handler_name) {
            tracing::warn!(event = name, handler = handler_name, "multi_handler_on_same: duplicate name");
            return Err(CoreError::DuplicateHandlerName(handler_name.to_string(), id));
        }
        let key = HandlerKey::Named(handler_name.into());
        let composite = build_composite(handle, id, key, Arc::new(f));
        let slot = &mut inner.slots[id.index()];
        slot.multi.push((handler_name.into(), composite.clone()));
        let (was_true, priority) = (slot.state, slot.priority);
        if was_true {
            inner.dispatcher.post(Arc::downgrade(&composite), priority);
        }
        Ok(id)
    }

    /// Removes the single handler (`handler_name: None`) or a named multi-handler.
    /// Invalidates any in-flight dispatcher entries for that handler by dropping the
    /// engine's strong reference to it.
    pub fn remove_handler(&self, name: &str, handler_name: Option<&str>) -> bool {
        let mut inner = self.0.lock();
        let Some(id) = inner.names.get(name).copied() else { return false };
        let slot = &mut inner.slots[id.index()];
        match handler_name {
            None => slot.handler.take().is_some(),
            Some(hname) => {
                let before = slot.multi.len();
                slot.multi.retain(|(n, _)| n.as_ref() != hname);
                slot.multi.len() != before
            }
        }
    }

    /// Enqueues every handler of `name` (single + multi bag) regardless of state.
    /// Missing handler or event yields a no-op.
    pub fn force_all(&self, name: &str) {
        let inner = self.0.lock();
        let Some(id) = inner.names.get(name).copied() else { return };
        let slot = &inner.slots[id.index()];
        if let Some(h) = &slot.handler {
            inner.dispatcher.post(Arc::downgrade(h), slot.priority);
        }
        for (_, h) in &slot.multi {
            inner.dispatcher.post(Arc::downgrade(h), slot.priority);
        }
    }

    pub fn n_handler(&self, name: &str) -> usize {
        let inner = self.0.lock();
        let Some(id) = inner.names.get(name).copied() else { return 0 };
        let slot = &inner.slots[id.index()];
        slot.handler.is_some() as usize + slot.multi.len()
    }

    pub fn set_priority(&self, name: &str, priority: Priority) -> EventId {
        let mut inner = self.0.lock();
        let id = inner.get_or_create(name);
        inner.slots[id.index()].priority = priority;
        id
    }

    /// Marks `name` one-shot: its handler(s) are removed immediately after they run
    /// through the dispatcher.
    pub fn flag_one_shot(&self, name: &str) -> EventId {
        let mut inner = self.0.lock();
        let id = inner.get_or_create(name);
        inner.slots[id.index()].one_shot = true;
        id
    }

    /// Sets or clears write-protection. Fails if enabling while a payload already
    /// exists.
    pub fn mark_write_protected(&self, name: &str, protect: bool) -> Result<(), CoreError> {
        let mut inner = self.0.lock();
        let id = inner.get_or_create(name);
        let slot = &mut inner.slots[id.index()];
        if protect && slot.data.is_some() {
            tracing::warn!(event = name, "mark_write_protected: data already present");
            return Err(CoreError::WriteProtectWithData(id));
        }
        slot.write_protected = protect;
        Ok(())
    }

    pub fn is_write_protected(&self, name: &str) -> bool {
        let inner = self.0.lock();
        inner.names.get(name).map(|id| inner.slots[id.index()].write_protected).unwrap_or(false)
    }

    /// Non-protected data API; fails with [`CoreError::ProtectionMismatch`] if the
    /// event is write-protected.
    pub fn get_data(&self, name: &str) -> Result<Option<Erased>, CoreError> {
        let inner = self.0.lock();
        let Some(id) = inner.names.get(name).copied() else { return Ok(None) };
        let slot = &inner.slots[id.index()];
        if slot.write_protected {
            tracing::warn!(event = name, "get_data: use wp_get_data on a write-protected event");
            return Err(CoreError::ProtectionMismatch(id));
        }
        Ok(slot.data.clone())
    }

    pub fn replace_data(&self, name: &str, data: Erased) -> Result<(), CoreError> {
        let mut inner = self.0.lock();
        let id = inner.get_or_create(name);
        let slot = &mut inner.slots[id.index()];
        if slot.write_protected {
            tracing::warn!(event = name, "replace_data: use wp_replace_data on a write-protected event");
            return Err(CoreError::ProtectionMismatch(id));
        }
        slot.data = Some(data);
        Ok(())
    }

    /// Write-protected data API; fails with [`CoreError::ProtectionMismatch`] if the
    /// event is not write-protected.
    pub fn wp_get_data(&self, name: &str) -> Result<Option<Erased>, CoreError> {
        let inner = self.0.lock();
        let Some(id) = inner.names.get(name).copied() else { return Ok(None) };
        let slot = &inner.slots[id.index()];
        if !slot.write_protected {
            tracing::warn!(event = name, "wp_get_data: event is not write-protected");
            return Err(CoreError::ProtectionMismatch(id));
        }
        Ok(slot.data.clone())
    }

    pub fn wp_replace_data(&self, name: &str, data: Erased) -> Result<(), CoreError> {
        let mut inner = self.0.lock();
        let id = inner.get_or_create(name);
        let slot = &mut inner.slots[id.index()];
        if !slot.write_protected {
            tracing::warn!(event = name, "wp_replace_data: event is not write-protected");
            return Err(CoreError::ProtectionMismatch(id));
        }
        slot.data = Some(data);
        Ok(())
    }

    /// Tombstones `name`: removes links, handlers (including in-flight entries, via
    /// dropping the engine's strong reference), data, and the write-protect flag;
    /// re-deduces successors; recycles the identity at the next [`Engine::new_event`].
    pub fn remove_event(&self, name: &str) -> bool {
        let mut inner = self.0.lock();
        let Some(id) = inner.names.remove(name) else { return false };

        let successors = inner.successors_of(id);
        for p in inner.slots[id.index()].prev_true.clone() {
            inner.slots[p.index()].next_true.remove(&id);
        }
        for p in inner.slots[id.index()].prev_false.clone() {
            inner.slots[p.index()].next_false.remove(&id);
        }
        for succ in &successors {
            inner.slots[succ.index()].prev_true.remove(&id);
            inner.slots[succ.index()].prev_false.remove(&id);
        }

        inner.slots[id.index()] = EventSlot::default();
        inner.tombstones.push(id.index() as u32);

        inner.propagate_dirty(successors);
        true
    }

    /// Read-only snapshot of the live name↔id table, used for diagnostics and by
    /// tests that need to enumerate events without reconstructing them. Returned as
    /// an owned `Vec` (rather than a borrowing iterator) since `Engine` is a locked
    /// handle, not a reference the caller already holds.
    pub fn event_names(&self) -> Vec<(EventId, String)> {
        let inner = self.0.lock();
        inner.names.iter().map(|(name, id)| (*id, name.to_string())).collect()
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
