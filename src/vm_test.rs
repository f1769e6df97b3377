// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! End-to-end interpreter tests: compile real source, run it, and check
//! either the captured `print` output or the shape of a reported error.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::error::InterpretError;
use crate::vm::{Vm, VmConfig};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("buffer lock poisoned").write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().expect("buffer lock poisoned").clone())
            .expect("print only ever writes UTF-8 text")
    }
}

fn run(source: &str) -> (Vm, SharedBuffer, crate::error::InterpretResult) {
    let mut vm = Vm::new();
    let buffer = SharedBuffer::default();
    vm.set_output(buffer.clone());
    let result = vm.interpret(source);
    (vm, buffer, result)
}

fn run_ok(source: &str) -> String {
    let (_, buffer, result) = run(source);
    result.expect("expected successful interpretation");
    buffer.contents()
}

fn run_err(source: &str) -> InterpretError {
    let (_, _, result) = run(source);
    result.expect_err("expected interpretation to fail")
}

#[test]
fn arithmetic_respects_precedence() {
    assert_eq!(run_ok("print 1 + 2 * 3;"), "7\n");
}

#[test]
fn string_concatenation() {
    assert_eq!(run_ok(r#"print "foo" + "bar";"#), "foobar\n");
}

#[test]
fn closures_capture_and_mutate_shared_upvalues() {
    let source = r#"
        fun makeCounter() {
            var i = 0;
            fun count() {
                i = i + 1;
                print i;
            }
            return count;
        }
        var counter = makeCounter();
        counter();
        counter();
    "#;
    assert_eq!(run_ok(source), "1\n2\n");
}

#[test]
fn single_inheritance_dispatches_to_the_superclass_method() {
    let source = r#"
        class Doughnut {
            cook() {
                print "Fry until golden brown.";
            }
        }
        class BostonCream < Doughnut {}
        BostonCream().cook();
    "#;
    assert_eq!(run_ok(source), "Fry until golden brown.\n");
}

#[test]
fn initializer_sets_fields_used_by_other_methods() {
    let source = r#"
        class Point {
            init(x, y) {
                this.x = x;
                this.y = y;
            }
            sum() {
                return this.x + this.y;
            }
        }
        var p = Point(3, 4);
        print p.sum();
    "#;
    assert_eq!(run_ok(source), "7\n");
}

#[test]
fn for_loop_accumulates() {
    let source = r#"
        var sum = 0;
        for (var i = 0; i < 5; i = i + 1) {
            sum = sum + i;
        }
        print sum;
    "#;
    assert_eq!(run_ok(source), "10\n");
}

#[test]
fn reading_an_undefined_global_is_a_runtime_error() {
    let err = run_err("print nope;");
    match err {
        InterpretError::Runtime(runtime) => {
            assert_eq!(runtime.message, "Undefined variable 'nope'.");
        }
        InterpretError::Compile(_) => panic!("expected a runtime error"),
    }
}

#[test]
fn assigning_to_an_undefined_global_is_a_runtime_error_and_does_not_define_it() {
    let (mut vm, _, result) = run("nope = 1;");
    match result.expect_err("expected an error") {
        InterpretError::Runtime(runtime) => {
            assert_eq!(runtime.message, "Undefined variable 'nope'.");
        }
        InterpretError::Compile(_) => panic!("expected a runtime error"),
    }
    // The failed assignment must not have created the binding.
    let second = vm.interpret("print nope;");
    assert!(second.is_err());
}

#[test]
fn adding_a_number_and_a_string_is_a_type_error() {
    let err = run_err(r#"print 1 + "two";"#);
    match err {
        InterpretError::Runtime(runtime) => {
            assert_eq!(runtime.message, "Operands must be two numbers or two strings.");
        }
        InterpretError::Compile(_) => panic!("expected a runtime error"),
    }
}

#[test]
fn calling_with_the_wrong_arity_is_a_runtime_error() {
    let err = run_err("fun f(a, b) { return a + b; } f(1);");
    match err {
        InterpretError::Runtime(runtime) => {
            assert_eq!(runtime.message, "Expected 2 arguments but got 1.");
        }
        InterpretError::Compile(_) => panic!("expected a runtime error"),
    }
}

#[test]
fn calling_a_non_callable_value_is_a_runtime_error() {
    let err = run_err("var x = 1; x();");
    match err {
        InterpretError::Runtime(runtime) => {
            assert_eq!(runtime.message, "Can only call functions and classes.");
        }
        InterpretError::Compile(_) => panic!("expected a runtime error"),
    }
}

#[test]
fn instantiating_with_arguments_but_no_initializer_is_a_runtime_error() {
    let err = run_err("class Foo {} Foo(1, 2);");
    match err {
        InterpretError::Runtime(runtime) => {
            assert_eq!(runtime.message, "Expected 0 arguments but got 2.");
        }
        InterpretError::Compile(_) => panic!("expected a runtime error"),
    }
}

#[test]
fn unbounded_recursion_overflows_the_frame_stack() {
    let source = r#"
        fun recurse(n) {
            return recurse(n + 1);
        }
        recurse(0);
    "#;
    let err = run_err(source);
    match err {
        InterpretError::Runtime(runtime) => {
            assert_eq!(runtime.message, "Stack overflow.");
        }
        InterpretError::Compile(_) => panic!("expected a runtime error"),
    }
}

#[test]
fn backtrace_is_innermost_frame_first() {
    let source = r#"
        fun inner() {
            return 1 + "two";
        }
        fun outer() {
            return inner();
        }
        outer();
    "#;
    let err = run_err(source);
    let InterpretError::Runtime(runtime) = err else {
        panic!("expected a runtime error");
    };
    let names: Vec<&str> = runtime.backtrace.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["inner", "outer", "script"]);
}

#[test]
fn custom_config_lowers_the_frame_stack_limit() {
    let config = VmConfig {
        frame_stack_max: 2,
        ..VmConfig::default()
    };
    let mut vm = Vm::with_config(config);
    let buffer = SharedBuffer::default();
    vm.set_output(buffer);
    let err = vm
        .interpret("fun recurse(n) { return recurse(n + 1); } recurse(0);")
        .expect_err("expected a stack overflow");
    match err {
        InterpretError::Runtime(runtime) => assert_eq!(runtime.message, "Stack overflow."),
        InterpretError::Compile(_) => panic!("expected a runtime error"),
    }
}
