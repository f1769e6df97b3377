// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Property-based tests for the §8 "Property-based targets": random
//! arithmetic expressions checked against a reference `f64` evaluator, and
//! random local-scope trees checked for correct read/shadow behavior.
//!
//! Both generators render source text, run it through the real VM, and
//! compare observed `print` output against a plain-Rust reference model —
//! there is no mocking of the compiler or VM here.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::vm::Vm;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Add,
    Sub,
    Mul,
}

#[derive(Debug, Clone)]
enum Expr {
    Num(i64),
    Bin(Box<Expr>, Op, Box<Expr>),
}

fn expr_strategy() -> impl Strategy<Value = Expr> {
    // Small magnitudes and shallow depth keep every intermediate result well
    // under six significant digits, so printing and reparsing it through
    // `%g`-style formatting never loses precision.
    let leaf = (-6i64..6i64).prop_map(Expr::Num);
    leaf.prop_recursive(2, 8, 2, |inner| {
        (
            inner.clone(),
            prop_oneof![Just(Op::Add), Just(Op::Sub), Just(Op::Mul)],
            inner,
        )
            .prop_map(|(l, op, r)| Expr::Bin(Box::new(l), op, Box::new(r)))
    })
}

fn eval(expr: &Expr) -> i64 {
    match expr {
        Expr::Num(n) => *n,
        Expr::Bin(l, op, r) => {
            let (a, b) = (eval(l), eval(r));
            match op {
                Op::Add => a + b,
                Op::Sub => a - b,
                Op::Mul => a * b,
            }
        }
    }
}

fn render(expr: &Expr) -> String {
    match expr {
        Expr::Num(n) if *n < 0 => format!("(-{})", -n),
        Expr::Num(n) => n.to_string(),
        Expr::Bin(l, op, r) => {
            let op_str = match op {
                Op::Add => "+",
                Op::Sub => "-",
                Op::Mul => "*",
            };
            format!("({} {} {})", render(l), op_str, render(r))
        }
    }
}

#[derive(Debug, Clone)]
enum Item {
    Print,
    Nested(Option<i64>, Vec<Item>),
}

fn item_strategy() -> impl Strategy<Value = Item> {
    let leaf = Just(Item::Print);
    leaf.prop_recursive(3, 30, 4, |inner| {
        (
            proptest::option::of(-1000i64..1000i64),
            proptest::collection::vec(inner, 0..4),
        )
            .prop_map(|(decl, items)| Item::Nested(decl, items))
    })
}

fn render_decl(v: i64, out: &mut String) {
    if v < 0 {
        out.push_str(&format!("var a = (-{});\n", -v));
    } else {
        out.push_str(&format!("var a = {v};\n"));
    }
}

fn render_items(items: &[Item], out: &mut String) {
    for item in items {
        match item {
            Item::Print => out.push_str("print a;\n"),
            Item::Nested(decl, children) => {
                out.push_str("{\n");
                if let Some(v) = decl {
                    render_decl(*v, out);
                }
                render_items(children, out);
                out.push_str("}\n");
            }
        }
    }
}

fn eval_items(items: &[Item], current: i64, out: &mut Vec<i64>) {
    for item in items {
        match item {
            Item::Print => out.push(current),
            Item::Nested(decl, children) => {
                let inner_current = decl.unwrap_or(current);
                eval_items(children, inner_current, out);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Random well-formed arithmetic expressions evaluate identically to a
    /// reference double-precision evaluator (§8).
    #[test]
    fn arithmetic_matches_reference_evaluator(expr in expr_strategy()) {
        let expected = eval(&expr);
        let source = format!("print {};", render(&expr));
        let mut vm = Vm::new();
        let captured = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        vm.set_output(WriteVec(captured.clone()));
        vm.interpret(&source).expect("well-formed arithmetic always compiles and runs");
        let printed = String::from_utf8(captured.borrow().clone()).expect("print only writes UTF-8");
        let got: f64 = printed.trim().parse().expect("printed a number");
        prop_assert_eq!(got, expected as f64);
    }

    /// Random local-variable scope trees produce the expected get/set
    /// behavior with correct shadowing (§8).
    #[test]
    fn nested_scopes_shadow_correctly(items in proptest::collection::vec(item_strategy(), 0..6)) {
        let mut expected = Vec::new();
        eval_items(&items, 0, &mut expected);

        let mut source = String::from("var a = 0;\n");
        render_items(&items, &mut source);

        let captured = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut vm = Vm::new();
        vm.set_output(WriteVec(captured.clone()));
        vm.interpret(&source).expect("well-formed scope nesting always compiles and runs");
        let printed = String::from_utf8(captured.borrow().clone()).expect("print only writes UTF-8");
        let got: Vec<i64> = printed
            .lines()
            .map(|line| line.parse().expect("each print emits one integer"))
            .collect();
        prop_assert_eq!(got, expected);
    }
}

/// A `Write` sink over a shared `Rc<RefCell<Vec<u8>>>`, so the proptest
/// closures above can capture `print` output without threading a borrow
/// across the `Vm` API.
struct WriteVec(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

impl std::io::Write for WriteVec {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
