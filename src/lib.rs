// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! # Vesl
//!
//! Single-pass bytecode compiler and stack-based virtual machine for Vesl,
//! a small dynamically-typed, class-based scripting language.
//!
//! This crate provides:
//! - a tokenizer and a Pratt-parsing compiler that emit bytecode directly,
//!   with no separate AST or IR pass
//! - a bytecode chunk format (instructions, line table, constant pool)
//! - a stack virtual machine with call frames, closures, upvalues, and
//!   single-inheritance classes with virtual dispatch
//! - a tri-color mark-and-sweep garbage collector over interned strings and
//!   heap objects
//!
//! Host integration (a REPL, file loading, disassembly, CLI argument
//! handling) is deliberately left to the embedder: this crate exposes a
//! single [`Vm::interpret`] entry point and nothing else talks to the
//! outside world except the `print` instruction and the built-in `clock`
//! native.

pub mod chunk;
pub mod compiler;
pub mod error;
mod gc;
pub mod lexer;
mod native;
pub mod object;
pub mod printer;
pub mod table;
pub mod value;
pub mod vm;

#[cfg(test)]
mod chunk_test;
#[cfg(test)]
mod lexer_test;
#[cfg(test)]
mod object_test;
#[cfg(test)]
mod table_test;
#[cfg(test)]
mod value_test;
#[cfg(test)]
mod vm_proptest;
#[cfg(test)]
mod vm_test;

pub use error::{CompilerError, ErrorLocation, FrameTrace, InterpretError, InterpretResult, RuntimeError};
pub use value::Value;
pub use vm::{Vm, VmConfig};
