// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Open-addressed hash table keyed by interned strings (§3.4).
//!
//! Used for globals, instance fields, class method tables, and — with
//! [`Table::find_string`] — as the backing store for string interning.
//! Three cell states: empty, live, and tombstone. A tombstone keeps probe
//! chains intact after a deletion without requiring a full rehash.

use crate::object::ObjRef;
use crate::value::Value;

const INITIAL_CAPACITY: usize = 8;
const MAX_LOAD: f64 = 0.75;

#[derive(Clone)]
enum Entry {
    Empty,
    Tombstone,
    Live(ObjRef, Value),
}

/// Open-addressed, linear-probed table from interned strings to values.
#[derive(Default)]
pub struct Table {
    entries: Vec<Entry>,
    /// Live entries plus tombstones — used to trigger growth.
    count: usize,
}

impl Table {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            count: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Live(..)))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Find the slot a key belongs in: either the live entry for `key`, or
    /// the first empty/tombstone slot on its probe chain (so insertion can
    /// reuse tombstones instead of growing the chain further).
    fn find_slot(entries: &[Entry], key: ObjRef, capacity: usize) -> usize {
        let hash = unsafe { key.as_string().hash };
        let mut index = hash as usize % capacity;
        let mut first_tombstone: Option<usize> = None;
        loop {
            match &entries[index] {
                Entry::Empty => return first_tombstone.unwrap_or(index),
                Entry::Tombstone => {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(index);
                    }
                }
                Entry::Live(k, _) if *k == key => return index,
                Entry::Live(..) => {}
            }
            index = (index + 1) % capacity;
        }
    }

    fn grow(&mut self, new_capacity: usize) {
        let mut new_entries = vec![Entry::Empty; new_capacity];
        let mut live_count = 0;
        for entry in &self.entries {
            if let Entry::Live(key, value) = entry {
                let slot = Self::find_slot(&new_entries, *key, new_capacity);
                new_entries[slot] = Entry::Live(*key, *value);
                live_count += 1;
            }
        }
        self.entries = new_entries;
        // Rehashing drops tombstones, so count collapses to the live total.
        self.count = live_count;
    }

    /// Insert or overwrite `key`. Returns `true` if this created a new
    /// binding (as opposed to overwriting an existing one).
    pub fn set(&mut self, key: ObjRef, value: Value) -> bool {
        if self.entries.is_empty()
            || (self.count + 1) as f64 > self.capacity() as f64 * MAX_LOAD
        {
            let new_capacity = if self.entries.is_empty() {
                INITIAL_CAPACITY
            } else {
                self.capacity() * 2
            };
            self.grow(new_capacity);
        }

        let capacity = self.capacity();
        let slot = Self::find_slot(&self.entries, key, capacity);
        let is_new = !matches!(self.entries[slot], Entry::Live(..));
        if is_new && !matches!(self.entries[slot], Entry::Tombstone) {
            self.count += 1;
        }
        self.entries[slot] = Entry::Live(key, value);
        is_new
    }

    #[must_use]
    pub fn get(&self, key: ObjRef) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }
        let slot = Self::find_slot(&self.entries, key, self.capacity());
        match self.entries[slot] {
            Entry::Live(_, value) => Some(value),
            _ => None,
        }
    }

    /// Delete `key`, leaving a tombstone so later probe chains stay intact.
    /// Returns `true` if the key was present.
    pub fn delete(&mut self, key: ObjRef) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let slot = Self::find_slot(&self.entries, key, self.capacity());
        if matches!(self.entries[slot], Entry::Live(..)) {
            self.entries[slot] = Entry::Tombstone;
            true
        } else {
            false
        }
    }

    /// Look up an interned string by content, bypassing `ObjRef` identity.
    /// Only the interning table uses this: it is the one place a table is
    /// probed by raw bytes instead of an existing key reference.
    #[must_use]
    pub fn find_string(&self, chars: &str, hash: u32) -> Option<ObjRef> {
        if self.entries.is_empty() {
            return None;
        }
        let capacity = self.capacity();
        let mut index = hash as usize % capacity;
        loop {
            match &self.entries[index] {
                Entry::Empty => return None,
                Entry::Live(key, _) if key.as_str() == chars => return Some(*key),
                _ => {}
            }
            index = (index + 1) % capacity;
        }
    }

    /// Remove every entry whose key is unmarked (§4.5 step 3): the
    /// interning table holds weak references to its string keys, so a
    /// string with no other reachable referent can still be collected.
    pub fn remove_unmarked(&mut self) {
        for entry in &mut self.entries {
            let should_drop = matches!(entry, Entry::Live(key, _) if !key.header().marked.get());
            if should_drop {
                *entry = Entry::Tombstone;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, Value)> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Entry::Live(k, v) => Some((*k, *v)),
            _ => None,
        })
    }
}
