// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Single-pass compiler: a Pratt expression parser wired directly into
//! statement parsing, emitting bytecode as it goes with no separate AST
//! (§4.2).
//!
//! Split across sibling files the way a large hand-written recursive
//! descent parser naturally grows: [`function`] holds per-function local
//! and upvalue bookkeeping, [`class`] holds the class-compiler stack,
//! [`rules`] holds the Pratt precedence table and expression parsing. This
//! file owns the `Compiler` struct itself, token-stream plumbing, error
//! recovery, and statement-level parsing.

mod class;
mod function;
mod rules;

use crate::chunk::OpCode;
use crate::error::{CompilerError, ErrorLocation};
use crate::lexer::{Lexer, Token, TokenType};
use crate::object::ObjRef;
use crate::value::Value;
use crate::vm::Vm;
use class::ClassCompiler;
use function::{
    resolve_local, resolve_upvalue, FunctionCompiler, FunctionType, Local, ResolveError,
    MAX_LOCALS, MAX_PARAMS,
};

/// Compile `source` against `vm`'s heap (constants and functions are
/// allocated as they're emitted) and return the top-level `<script>`
/// function, or every error collected across the whole source on failure.
///
/// Compilation never stops at the first error: panic-mode recovery
/// resynchronizes on the next statement boundary so a single pass reports
/// everything wrong with the program.
pub fn compile(vm: &mut Vm, source: &str) -> Result<ObjRef, Vec<CompilerError>> {
    let function = vm.alloc_function();
    vm.push_compiler_root(function);

    let dummy = Token {
        kind: TokenType::Eof,
        text: "",
        line: 0,
    };
    let mut compiler = Compiler {
        vm,
        lexer: Lexer::new(source),
        previous: dummy,
        current: dummy,
        had_error: false,
        panic_mode: false,
        errors: Vec::new(),
        fc: Box::new(FunctionCompiler::new(function, FunctionType::Script, None)),
        class_compiler: None,
    };

    compiler.advance();
    while !compiler.match_token(TokenType::Eof) {
        compiler.declaration();
    }
    compiler.emit_return();

    let had_error = compiler.had_error;
    let errors = compiler.errors;
    compiler.vm.pop_compiler_root();

    if had_error {
        Err(errors)
    } else {
        Ok(function)
    }
}

pub(self) struct Compiler<'src, 'vm> {
    vm: &'vm mut Vm,
    lexer: Lexer<'src>,
    previous: Token<'src>,
    current: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<CompilerError>,
    fc: Box<FunctionCompiler<'src>>,
    class_compiler: Option<Box<ClassCompiler>>,
}

impl<'src, 'vm> Compiler<'src, 'vm> {
    // ---- token stream ---------------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.scan_token();
            if self.current.kind != TokenType::Error {
                break;
            }
            let message = self.current.text.to_string();
            self.error_at_current(&message);
        }
    }

    fn consume(&mut self, kind: TokenType, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn check(&self, kind: TokenType) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenType) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    // ---- error reporting / panic-mode recovery ---------------------------

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let location = match token.kind {
            TokenType::Eof => ErrorLocation::End,
            TokenType::Error => ErrorLocation::None,
            _ => ErrorLocation::Token(token.text.to_string()),
        };
        self.errors.push(CompilerError {
            line: token.line,
            location,
            message: message.to_string(),
        });
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    /// Skip tokens until a likely statement boundary, so one mistake
    /// doesn't cascade into a flood of spurious follow-on errors.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        tracing::trace!(line = self.current.line, "resynchronizing after parse error");
        while self.current.kind != TokenType::Eof {
            if self.previous.kind == TokenType::Semicolon {
                return;
            }
            match self.current.kind {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ---- bytecode emission ------------------------------------------------

    fn current_chunk_len(&self) -> usize {
        unsafe { self.fc.function.as_function() }.chunk.borrow().len()
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        unsafe { self.fc.function.as_function() }
            .chunk
            .borrow_mut()
            .write_u8(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    fn emit_bytes(&mut self, op: OpCode, byte: u8) {
        self.emit_op(op);
        self.emit_byte(byte);
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.current_chunk_len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        let jump = self.current_chunk_len() - offset - 2;
        if jump > u16::from(u16::MAX) as usize {
            self.error("Too much code to jump over.");
        }
        let bytes = (jump as u16).to_be_bytes();
        let function = unsafe { self.fc.function.as_function() };
        let mut chunk = function.chunk.borrow_mut();
        chunk.code[offset] = bytes[0];
        chunk.code[offset + 1] = bytes[1];
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.current_chunk_len() - loop_start + 2;
        if offset > usize::from(u16::MAX) {
            self.error("Loop body too large.");
        }
        let bytes = (offset as u16).to_be_bytes();
        self.emit_byte(bytes[0]);
        self.emit_byte(bytes[1]);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        let function = unsafe { self.fc.function.as_function() };
        let index = function.chunk.borrow_mut().add_constant(value);
        if index > usize::from(u8::MAX) {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        index as u8
    }

    fn emit_constant(&mut self, value: Value) {
        let constant = self.make_constant(value);
        self.emit_bytes(OpCode::Constant, constant);
    }

    fn emit_return(&mut self) {
        if self.fc.function_type == FunctionType::Initializer {
            // `return;` from an initializer hands back `this`, not `nil`.
            self.emit_bytes(OpCode::GetLocal, 0);
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    fn identifier_constant(&mut self, name: Token<'src>) -> u8 {
        let interned = self.vm.intern_string(name.text);
        self.make_constant(Value::Obj(interned))
    }

    // ---- variables ---------------------------------------------------------

    fn resolve_local_checked(&mut self, name: Token<'src>) -> Option<u8> {
        match resolve_local(&self.fc, name.text) {
            Ok(slot) => slot,
            Err(ResolveError::OwnInitializer) => {
                self.error("Can't read local variable in its own initializer.");
                None
            }
            Err(ResolveError::TooManyUpvalues) => None,
        }
    }

    fn resolve_upvalue_checked(&mut self, name: Token<'src>) -> Option<u8> {
        match resolve_upvalue(&mut self.fc, name.text) {
            Ok(slot) => slot,
            Err(ResolveError::TooManyUpvalues) => {
                self.error("Too many closure variables in function.");
                None
            }
            Err(ResolveError::OwnInitializer) => None,
        }
    }

    fn add_local(&mut self, name: Token<'src>) {
        if self.fc.locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.fc.locals.push(Local {
            name,
            depth: -1,
            is_captured: false,
        });
    }

    fn declare_variable(&mut self) {
        if self.fc.scope_depth == 0 {
            return;
        }
        let name = self.previous;
        let mut duplicate = false;
        for local in self.fc.locals.iter().rev() {
            if local.depth != -1 && local.depth < self.fc.scope_depth {
                break;
            }
            if local.name.text == name.text {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
            return;
        }
        self.add_local(name);
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenType::Identifier, message);
        self.declare_variable();
        if self.fc.scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous)
    }

    fn mark_initialized(&mut self) {
        if self.fc.scope_depth == 0 {
            return;
        }
        let depth = self.fc.scope_depth;
        self.fc
            .locals
            .last_mut()
            .expect("a variable was just declared")
            .depth = depth;
    }

    fn define_variable(&mut self, global: u8) {
        if self.fc.scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_bytes(OpCode::DefineGlobal, global);
    }

    // ---- scopes --------------------------------------------------------

    fn begin_scope(&mut self) {
        self.fc.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.fc.scope_depth -= 1;
        while let Some(local) = self.fc.locals.last() {
            if local.depth <= self.fc.scope_depth {
                break;
            }
            if local.is_captured {
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                self.emit_op(OpCode::Pop);
            }
            self.fc.locals.pop();
        }
    }

    // ---- declarations and statements ---------------------------------------

    fn declaration(&mut self) {
        if self.match_token(TokenType::Class) {
            self.class_declaration();
        } else if self.match_token(TokenType::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenType::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionType::Function);
        self.define_variable(global);
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_token(TokenType::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(
            TokenType::Semicolon,
            "Expect ';' after variable declaration.",
        );
        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.match_token(TokenType::Print) {
            self.print_statement();
        } else if self.match_token(TokenType::For) {
            self.for_statement();
        } else if self.match_token(TokenType::If) {
            self.if_statement();
        } else if self.match_token(TokenType::Return) {
            self.return_statement();
        } else if self.match_token(TokenType::While) {
            self.while_statement();
        } else if self.match_token(TokenType::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.declaration();
        }
        self.consume(TokenType::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.match_token(TokenType::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk_len();
        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenType::Semicolon) {
            // No initializer.
        } else if self.match_token(TokenType::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk_len();
        let mut exit_jump = None;
        if !self.match_token(TokenType::Semicolon) {
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_token(TokenType::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.current_chunk_len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenType::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.fc.function_type == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_token(TokenType::Semicolon) {
            self.emit_return();
        } else {
            if self.fc.function_type == FunctionType::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenType::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    // ---- functions ---------------------------------------------------------

    /// Compile a function body: `previous` must already be its name token.
    /// Pushes a new [`FunctionCompiler`] onto the back-spine, compiles the
    /// parameter list and block, then pops back to the enclosing compiler
    /// and emits the `closure` instruction with its upvalue descriptors.
    fn function(&mut self, function_type: FunctionType) {
        let function = self.vm.alloc_function();
        self.vm.push_compiler_root(function);
        if function_type != FunctionType::Script {
            let name = self.vm.intern_string(self.previous.text);
            unsafe { function.as_function() }.name.set(Some(name));
        }

        let new_fc = Box::new(FunctionCompiler::new(function, function_type, None));
        let enclosing = std::mem::replace(&mut self.fc, new_fc);
        self.fc.enclosing = Some(enclosing);

        self.begin_scope();
        self.consume(TokenType::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenType::RightParen) {
            loop {
                let arity = unsafe { function.as_function() }.arity.get();
                if arity as usize >= MAX_PARAMS {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                unsafe { function.as_function() }.arity.set(arity + 1);
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.");
        self.consume(TokenType::LeftBrace, "Expect '{' before function body.");
        self.block();
        self.emit_return();

        unsafe { function.as_function() }
            .upvalue_count
            .set(self.fc.upvalues.len());
        let upvalues = std::mem::take(&mut self.fc.upvalues);
        let enclosing = self
            .fc
            .enclosing
            .take()
            .expect("a function compiler always has an enclosing compiler");
        self.fc = enclosing;
        self.vm.pop_compiler_root();

        let constant = self.make_constant(Value::Obj(function));
        self.emit_bytes(OpCode::Closure, constant);
        for upvalue in upvalues {
            self.emit_byte(u8::from(upvalue.is_local));
            self.emit_byte(upvalue.index);
        }
    }

    // ---- classes -------------------------------------------------------

    /// `class C [< Super] { methods }` (§4.2 "Classes"). Pushes a
    /// [`ClassCompiler`] onto the back-spine for the duration of the body
    /// so `this`/`super` resolution inside methods can see it.
    fn class_declaration(&mut self) {
        self.consume(TokenType::Identifier, "Expect class name.");
        let class_name = self.previous;
        let name_constant = self.identifier_constant(class_name);
        self.declare_variable();

        self.emit_bytes(OpCode::Class, name_constant);
        self.define_variable(name_constant);

        let enclosing_class = self.class_compiler.take();
        self.class_compiler = Some(Box::new(ClassCompiler::new(enclosing_class)));

        if self.match_token(TokenType::Less) {
            self.consume(TokenType::Identifier, "Expect superclass name.");
            let superclass_name = self.previous;
            self.named_variable(superclass_name, false);

            if class_name.text == superclass_name.text {
                self.error("A class can't inherit from itself.");
            }

            self.begin_scope();
            self.add_local(synthetic_token("super"));
            self.define_variable(0);

            self.named_variable(class_name, false);
            self.emit_op(OpCode::Inherit);
            self.class_compiler
                .as_mut()
                .expect("class compiler was just pushed above")
                .has_superclass = true;
        }

        self.named_variable(class_name, false);
        self.consume(TokenType::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenType::RightBrace) && !self.check(TokenType::Eof) {
            self.method();
        }
        self.consume(TokenType::RightBrace, "Expect '}' after class body.");
        self.emit_op(OpCode::Pop);

        let had_superclass = self
            .class_compiler
            .as_ref()
            .expect("class compiler was just pushed above")
            .has_superclass;
        if had_superclass {
            self.end_scope();
        }

        self.class_compiler = self
            .class_compiler
            .take()
            .expect("class compiler was just pushed above")
            .enclosing;
    }

    /// A single method inside a class body: `init` compiles as
    /// [`FunctionType::Initializer`], everything else as a plain method.
    fn method(&mut self) {
        self.consume(TokenType::Identifier, "Expect method name.");
        let constant = self.identifier_constant(self.previous);
        let function_type = if self.previous.text == "init" {
            FunctionType::Initializer
        } else {
            FunctionType::Method
        };
        self.function(function_type);
        self.emit_bytes(OpCode::Method, constant);
    }
}

/// A token that doesn't borrow real source text, for compiler-synthesized
/// identifiers (`this`, `super`) that never appear in the user's program.
pub(self) fn synthetic_token(text: &'static str) -> Token<'static> {
    Token {
        kind: TokenType::Identifier,
        text,
        line: 0,
    }
}
