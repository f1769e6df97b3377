// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Per-function compiler state: locals, upvalues, and scope depth (§4.2).
//!
//! Function compilers form a back-spine (each holds its `enclosing`
//! pointer) rather than a tree, so the whole chain is still walkable by the
//! garbage collector while the parser is mid-recursion — see
//! [`crate::vm::Vm`]'s `compiler_roots`.

use crate::lexer::{Token, TokenType};
use crate::object::ObjRef;

pub const MAX_LOCALS: usize = 256;
pub const MAX_UPVALUES: usize = 256;
pub const MAX_PARAMS: usize = 255;
pub const MAX_ARGS: usize = 255;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(super) enum FunctionType {
    Script,
    Function,
    Method,
    Initializer,
}

pub(super) struct Local<'src> {
    pub name: Token<'src>,
    /// `-1` while the initializer is still being compiled (§4.2 "Variable
    /// resolution"); reading a local at that depth is an error.
    pub depth: i32,
    pub is_captured: bool,
}

#[derive(Clone, Copy)]
pub(super) struct UpvalueDesc {
    pub index: u8,
    pub is_local: bool,
}

pub(super) struct FunctionCompiler<'src> {
    pub enclosing: Option<Box<FunctionCompiler<'src>>>,
    pub function: ObjRef,
    pub function_type: FunctionType,
    pub locals: Vec<Local<'src>>,
    pub upvalues: Vec<UpvalueDesc>,
    pub scope_depth: i32,
}

impl<'src> FunctionCompiler<'src> {
    pub fn new(
        function: ObjRef,
        function_type: FunctionType,
        enclosing: Option<Box<FunctionCompiler<'src>>>,
    ) -> Self {
        // Slot 0 is reserved. Methods and initializers name it `this`;
        // every other function leaves it unnamed so user code can never
        // shadow it.
        let slot0_name = if matches!(function_type, FunctionType::Method | FunctionType::Initializer) {
            "this"
        } else {
            ""
        };
        let locals = vec![Local {
            name: Token {
                kind: TokenType::This,
                text: slot0_name,
                line: 0,
            },
            depth: 0,
            is_captured: false,
        }];
        Self {
            enclosing,
            function,
            function_type,
            locals,
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }
}

pub(super) enum ResolveError {
    OwnInitializer,
    TooManyUpvalues,
}

/// Walk `fc`'s locals back to front, matching by identifier text (§4.2).
pub(super) fn resolve_local<'src>(
    fc: &FunctionCompiler<'src>,
    name: &str,
) -> Result<Option<u8>, ResolveError> {
    for (index, local) in fc.locals.iter().enumerate().rev() {
        if local.name.text == name {
            if local.depth == -1 {
                return Err(ResolveError::OwnInitializer);
            }
            return Ok(Some(index as u8));
        }
    }
    Ok(None)
}

fn add_upvalue(fc: &mut FunctionCompiler<'_>, index: u8, is_local: bool) -> Result<u8, ResolveError> {
    for (i, existing) in fc.upvalues.iter().enumerate() {
        if existing.index == index && existing.is_local == is_local {
            return Ok(i as u8);
        }
    }
    if fc.upvalues.len() >= MAX_UPVALUES {
        return Err(ResolveError::TooManyUpvalues);
    }
    fc.upvalues.push(UpvalueDesc { index, is_local });
    Ok((fc.upvalues.len() - 1) as u8)
}

/// Recursively resolve `name` as an upvalue: a local match in the
/// enclosing compiler captures that local; an upvalue match chains through
/// it. Registration dedups by `(index, is_local)` (§4.2).
pub(super) fn resolve_upvalue<'src>(
    fc: &mut FunctionCompiler<'src>,
    name: &str,
) -> Result<Option<u8>, ResolveError> {
    let Some(enclosing) = fc.enclosing.as_mut() else {
        return Ok(None);
    };

    if let Some(local_index) = resolve_local(enclosing, name)? {
        enclosing.locals[local_index as usize].is_captured = true;
        return add_upvalue(fc, local_index, true).map(Some);
    }

    if let Some(upvalue_index) = resolve_upvalue(enclosing, name)? {
        return add_upvalue(fc, upvalue_index, false).map(Some);
    }

    Ok(None)
}
