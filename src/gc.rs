// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tri-color mark-and-sweep collector (§4.5).
//!
//! Roots are the VM value stack, every active call frame's closure, the
//! chain of open upvalues, the globals table, and the compiler's
//! in-progress function roots. Marking walks outward from there with an
//! explicit gray worklist (no recursion, so deeply nested data can't blow
//! the native stack). The string-intern table is swept separately first:
//! it holds only weak references to its keys.

use crate::object::{
    object_size, ObjClass, ObjClosure, ObjFunction, ObjHeader, ObjInstance, ObjKind, ObjRef,
    ObjString, ObjUpvalue, UpvalueLocation,
};
use crate::value::Value;
use crate::vm::Vm;
use std::ptr::NonNull;

impl Vm {
    pub(crate) fn collect_garbage(&mut self) {
        let before = self.bytes_allocated;
        let mut gray: Vec<ObjRef> = Vec::new();
        self.mark_roots(&mut gray);
        while let Some(obj) = gray.pop() {
            blacken(obj, &mut gray);
        }
        self.strings.remove_unmarked();
        self.sweep();
        self.next_gc = self.bytes_allocated * self.config.gc_growth_factor;
        tracing::debug!(
            bytes_before = before,
            bytes_after = self.bytes_allocated,
            next_gc = self.next_gc,
            "garbage collection cycle"
        );
    }

    fn mark_roots(&mut self, gray: &mut Vec<ObjRef>) {
        for value in &self.stack {
            mark_value(*value, gray);
        }
        for frame in &self.frames {
            mark_object(frame.closure, gray);
        }
        let mut upvalue = self.open_upvalues;
        while let Some(ptr) = upvalue {
            let obj = crate::object::upvalue_ref(ptr);
            mark_object(obj, gray);
            upvalue = unsafe { ptr.as_ref() }.next_open.get();
        }
        for (key, value) in self.globals.iter() {
            mark_object(key, gray);
            mark_value(value, gray);
        }
        for root in &self.compiler_roots {
            mark_object(*root, gray);
        }
        if let Some(init_string) = self.init_string {
            mark_object(init_string, gray);
        }
    }

    fn sweep(&mut self) {
        let mut prev: Option<NonNull<ObjHeader>> = None;
        let mut current = self.objects.get();
        while let Some(ptr) = current {
            let header = unsafe { ptr.as_ref() };
            let next = header.next.get();
            if header.marked.get() {
                header.marked.set(false);
                prev = Some(ptr);
            } else {
                match prev {
                    Some(p) => unsafe { p.as_ref().next.set(next) },
                    None => self.objects.set(next),
                }
                self.bytes_allocated = self
                    .bytes_allocated
                    .saturating_sub(object_size(header.kind));
                free_object(ptr);
            }
            current = next;
        }
    }
}

fn mark_value(value: Value, gray: &mut Vec<ObjRef>) {
    if let Value::Obj(obj) = value {
        mark_object(obj, gray);
    }
}

fn mark_object(obj: ObjRef, gray: &mut Vec<ObjRef>) {
    let header = obj.header();
    if header.marked.get() {
        return;
    }
    header.marked.set(true);
    gray.push(obj);
}

/// Trace one object's outgoing references, pushing anything newly reached
/// onto `gray`. Strings and natives have none.
fn blacken(obj: ObjRef, gray: &mut Vec<ObjRef>) {
    match obj.kind() {
        ObjKind::String | ObjKind::Native => {}
        ObjKind::Function => {
            let function = unsafe { obj.as_function() };
            if let Some(name) = function.name.get() {
                mark_object(name, gray);
            }
            for constant in &function.chunk.borrow().constants {
                mark_value(*constant, gray);
            }
        }
        ObjKind::Closure => {
            let closure = unsafe { obj.as_closure() };
            mark_object(closure.function, gray);
            for upvalue in &closure.upvalues {
                if let Some(u) = upvalue.get() {
                    mark_object(u, gray);
                }
            }
        }
        ObjKind::Upvalue => {
            let upvalue = unsafe { obj.as_upvalue() };
            if let UpvalueLocation::Closed(value) = *upvalue.location.borrow() {
                mark_value(value, gray);
            }
        }
        ObjKind::Class => {
            let class = unsafe { obj.as_class() };
            mark_object(class.name, gray);
            for (key, value) in class.methods.borrow().iter() {
                mark_object(key, gray);
                mark_value(value, gray);
            }
        }
        ObjKind::Instance => {
            let instance = unsafe { obj.as_instance() };
            mark_object(instance.class, gray);
            for (key, value) in instance.fields.borrow().iter() {
                mark_object(key, gray);
                mark_value(value, gray);
            }
        }
        ObjKind::BoundMethod => {
            let bound = unsafe { obj.as_bound_method() };
            mark_value(bound.receiver, gray);
            mark_object(bound.method, gray);
        }
    }
}

fn free_object(ptr: NonNull<ObjHeader>) {
    let kind = unsafe { ptr.as_ref() }.kind;
    unsafe {
        match kind {
            ObjKind::String => drop(Box::from_raw(ptr.cast::<ObjString>().as_ptr())),
            ObjKind::Function => drop(Box::from_raw(ptr.cast::<ObjFunction>().as_ptr())),
            ObjKind::Native => drop(Box::from_raw(ptr.cast::<crate::object::ObjNative>().as_ptr())),
            ObjKind::Closure => drop(Box::from_raw(ptr.cast::<ObjClosure>().as_ptr())),
            ObjKind::Upvalue => drop(Box::from_raw(ptr.cast::<ObjUpvalue>().as_ptr())),
            ObjKind::Class => drop(Box::from_raw(ptr.cast::<ObjClass>().as_ptr())),
            ObjKind::Instance => drop(Box::from_raw(ptr.cast::<ObjInstance>().as_ptr())),
            ObjKind::BoundMethod => {
                drop(Box::from_raw(ptr.cast::<crate::object::ObjBoundMethod>().as_ptr()));
            }
        }
    }
}
