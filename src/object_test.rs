// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for heap object layout and the type-erased `ObjRef` handle.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::object::{new_header, link, object_size, ObjKind, ObjRef, ObjString};
use std::cell::Cell;

fn make_string(objects: &Cell<Option<std::ptr::NonNull<crate::object::ObjHeader>>>, s: &str) -> ObjRef {
    let ptr = link(
        objects,
        ObjString {
            header: new_header(ObjKind::String),
            hash: 0,
            chars: s.into(),
        },
    );
    ObjRef(ptr.cast())
}

#[test]
fn link_prepends_to_the_object_list() {
    let objects = Cell::new(None);
    assert!(objects.get().is_none());
    let first = make_string(&objects, "a");
    assert!(objects.get().is_some());
    let second = make_string(&objects, "b");

    // The list head is now `second`, and it chains back to `first`.
    let head = objects.get().expect("list is non-empty");
    assert_eq!(head, second.as_header_ptr());
    let next = unsafe { head.as_ref() }.next.get().expect("first link remains");
    assert_eq!(next, first.as_header_ptr());
}

#[test]
fn obj_ref_equality_is_pointer_identity() {
    let objects = Cell::new(None);
    let a = make_string(&objects, "same text");
    let b = make_string(&objects, "same text");
    assert_ne!(a, b, "distinct allocations must not compare equal even with identical contents");
    assert_eq!(a, a);
}

#[test]
fn kind_and_downcast_agree() {
    let objects = Cell::new(None);
    let s = make_string(&objects, "hello");
    assert_eq!(s.kind(), ObjKind::String);
    assert_eq!(unsafe { s.as_string() }.chars.as_ref(), "hello");
    assert_eq!(s.as_str(), "hello");
}

#[test]
fn object_size_is_nonzero_for_every_kind() {
    for kind in [
        ObjKind::String,
        ObjKind::Function,
        ObjKind::Native,
        ObjKind::Closure,
        ObjKind::Upvalue,
        ObjKind::Class,
        ObjKind::Instance,
        ObjKind::BoundMethod,
    ] {
        assert!(object_size(kind) > 0);
    }
}

#[test]
fn new_header_starts_unmarked_with_no_next() {
    let header = new_header(ObjKind::String);
    assert!(!header.marked.get());
    assert!(header.next.get().is_none());
}
