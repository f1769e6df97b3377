// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Error types surfaced by the compiler and the virtual machine.
//!
//! The two error classes are kept separate per the language's error model:
//! a compile error never triggers a VM backtrace, and a runtime error is
//! only possible once compilation has already succeeded.

use std::fmt;

/// Where a [`CompilerError`] points, for rendering the "at ..." clause.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorLocation {
    /// A normal token, rendered `at 'TEXT'`.
    Token(String),
    /// End of input, rendered `at end` with no quotes.
    End,
    /// A lexer error token: the lexer already described the problem in the
    /// message, so no location clause is rendered at all.
    None,
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(text) => write!(f, " at '{text}'"),
            Self::End => write!(f, " at end"),
            Self::None => Ok(()),
        }
    }
}

/// A single error reported by the compiler.
///
/// The compiler does not stop at the first error: it enters panic mode,
/// suppresses further reports until it resynchronizes on a statement
/// boundary, and keeps going so a caller sees every independent mistake in
/// one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerError {
    pub line: u32,
    pub location: ErrorLocation,
    pub message: String,
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error{}: {}", self.line, self.location, self.message)
    }
}

/// A single active call frame, used to render a runtime backtrace.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTrace {
    pub line: u32,
    /// Function name, or `"script"` for the top-level frame.
    pub name: String,
}

impl fmt::Display for FrameTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] in {}", self.line, self.name)
    }
}

/// An error raised while executing bytecode.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
    /// Innermost frame first, matching the order the VM unwinds in.
    pub backtrace: Vec<FrameTrace>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)?;
        for frame in &self.backtrace {
            writeln!(f, "{frame}")?;
        }
        Ok(())
    }
}

/// The outcome of [`crate::Vm::interpret`].
#[derive(Debug, Clone, PartialEq)]
pub enum InterpretError {
    Compile(Vec<CompilerError>),
    Runtime(RuntimeError),
}

impl fmt::Display for InterpretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile(errors) => {
                for error in errors {
                    writeln!(f, "{error}")?;
                }
                Ok(())
            }
            Self::Runtime(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for InterpretError {}

pub type InterpretResult = Result<(), InterpretError>;
