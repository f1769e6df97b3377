// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the open-addressed string-keyed hash table.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::object::{new_header, link, ObjKind, ObjRef, ObjString};
use crate::table::Table;
use crate::value::Value;
use std::cell::Cell;
use std::ptr::NonNull;

type Objects = Cell<Option<NonNull<crate::object::ObjHeader>>>;

fn intern(objects: &Objects, s: &str, hash: u32) -> ObjRef {
    let ptr = link(
        objects,
        ObjString {
            header: new_header(ObjKind::String),
            hash,
            chars: s.into(),
        },
    );
    ObjRef(ptr.cast())
}

#[test]
fn set_then_get_round_trips() {
    let objects = Objects::default();
    let key = intern(&objects, "answer", 1);
    let mut table = Table::new();
    assert!(table.set(key, Value::Number(42.0)));
    assert_eq!(table.get(key), Some(Value::Number(42.0)));
    assert_eq!(table.len(), 1);
}

#[test]
fn overwriting_an_existing_key_reports_not_new() {
    let objects = Objects::default();
    let key = intern(&objects, "x", 1);
    let mut table = Table::new();
    assert!(table.set(key, Value::Number(1.0)));
    assert!(!table.set(key, Value::Number(2.0)));
    assert_eq!(table.get(key), Some(Value::Number(2.0)));
    assert_eq!(table.len(), 1);
}

#[test]
fn missing_key_returns_none() {
    let objects = Objects::default();
    let key = intern(&objects, "nope", 1);
    let table = Table::new();
    assert_eq!(table.get(key), None);
}

#[test]
fn delete_removes_the_binding_and_leaves_a_tombstone_slot_reusable() {
    let objects = Objects::default();
    let a = intern(&objects, "a", 1);
    let b = intern(&objects, "b", 1); // same hash, collides with `a`
    let mut table = Table::new();
    table.set(a, Value::Bool(true));
    table.set(b, Value::Bool(false));

    assert!(table.delete(a));
    assert!(!table.delete(a), "deleting twice reports the key was already gone");
    assert_eq!(table.get(a), None);
    // `b` must still be reachable even though its probe chain passed through
    // the tombstone left by deleting `a`.
    assert_eq!(table.get(b), Some(Value::Bool(false)));

    // Re-inserting into the tombstoned slot must not grow `len()` twice.
    assert!(table.set(a, Value::Bool(true)));
    assert_eq!(table.len(), 2);
}

#[test]
fn find_string_looks_up_by_content_not_identity() {
    let objects = Objects::default();
    let key = intern(&objects, "needle", 7);
    let mut table = Table::new();
    table.set(key, Value::Nil);

    let found = table.find_string("needle", 7).expect("content match");
    assert_eq!(found, key);
    assert!(table.find_string("haystack", 7).is_none());
}

#[test]
fn remove_unmarked_tombstones_unreferenced_keys() {
    let objects = Objects::default();
    let marked = intern(&objects, "kept", 1);
    let unmarked = intern(&objects, "dropped", 2);
    marked.header().marked.set(true);

    let mut table = Table::new();
    table.set(marked, Value::Nil);
    table.set(unmarked, Value::Nil);

    table.remove_unmarked();

    assert_eq!(table.get(marked), Some(Value::Nil));
    assert_eq!(table.get(unmarked), None);
}

#[test]
fn growth_preserves_every_binding() {
    let objects = Objects::default();
    let mut table = Table::new();
    let mut keys = Vec::new();
    for i in 0..64u32 {
        let key = intern(&objects, &format!("key{i}"), i);
        keys.push(key);
        table.set(key, Value::Number(f64::from(i)));
    }
    for (i, key) in keys.iter().enumerate() {
        assert_eq!(table.get(*key), Some(Value::Number(i as f64)));
    }
    assert_eq!(table.len(), 64);
}

#[test]
fn iter_yields_every_live_entry() {
    let objects = Objects::default();
    let a = intern(&objects, "a", 1);
    let b = intern(&objects, "b", 2);
    let mut table = Table::new();
    table.set(a, Value::Number(1.0));
    table.set(b, Value::Number(2.0));

    let mut seen: Vec<_> = table.iter().collect();
    seen.sort_by(|x, y| {
        x.1.as_number()
            .expect("numbers")
            .partial_cmp(&y.1.as_number().expect("numbers"))
            .expect("no NaN in this table")
    });
    assert_eq!(seen.len(), 2);
}
