// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Pratt precedence table and expression parsing (§4.2 "Pratt parser").
//!
//! Parse actions are represented as plain function pointers rather than
//! trait objects: each entry in [`rule`] is a `(prefix, infix, precedence)`
//! triple exactly mirroring the fixed array the spec describes, just
//! expressed as a `match` instead of an array indexed by token tag.

use super::function::MAX_ARGS;
use super::{synthetic_token, Compiler};
use crate::chunk::OpCode;
use crate::lexer::{Token, TokenType};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    /// The next tighter-binding level, used by `binary` to enforce left
    /// associativity: a binary operator parses its right operand one level
    /// above its own precedence.
    fn next(self) -> Self {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

type ParseFn<'src, 'vm> = fn(&mut Compiler<'src, 'vm>, bool);

struct ParseRule<'src, 'vm> {
    prefix: Option<ParseFn<'src, 'vm>>,
    infix: Option<ParseFn<'src, 'vm>>,
    precedence: Precedence,
}

/// The fixed lookup table, one entry per token type (§4.2, §9).
fn rule<'src, 'vm>(kind: TokenType) -> ParseRule<'src, 'vm> {
    match kind {
        TokenType::LeftParen => ParseRule {
            prefix: Some(grouping),
            infix: Some(call),
            precedence: Precedence::Call,
        },
        TokenType::Dot => ParseRule {
            prefix: None,
            infix: Some(dot),
            precedence: Precedence::Call,
        },
        TokenType::Minus => ParseRule {
            prefix: Some(unary),
            infix: Some(binary),
            precedence: Precedence::Term,
        },
        TokenType::Plus => ParseRule {
            prefix: None,
            infix: Some(binary),
            precedence: Precedence::Term,
        },
        TokenType::Slash | TokenType::Star => ParseRule {
            prefix: None,
            infix: Some(binary),
            precedence: Precedence::Factor,
        },
        TokenType::Bang => ParseRule {
            prefix: Some(unary),
            infix: None,
            precedence: Precedence::None,
        },
        TokenType::BangEqual | TokenType::EqualEqual => ParseRule {
            prefix: None,
            infix: Some(binary),
            precedence: Precedence::Equality,
        },
        TokenType::Greater | TokenType::GreaterEqual | TokenType::Less | TokenType::LessEqual => {
            ParseRule {
                prefix: None,
                infix: Some(binary),
                precedence: Precedence::Comparison,
            }
        }
        TokenType::Identifier => ParseRule {
            prefix: Some(variable),
            infix: None,
            precedence: Precedence::None,
        },
        TokenType::String => ParseRule {
            prefix: Some(string_literal),
            infix: None,
            precedence: Precedence::None,
        },
        TokenType::Number => ParseRule {
            prefix: Some(number),
            infix: None,
            precedence: Precedence::None,
        },
        TokenType::And => ParseRule {
            prefix: None,
            infix: Some(and_),
            precedence: Precedence::And,
        },
        TokenType::Or => ParseRule {
            prefix: None,
            infix: Some(or_),
            precedence: Precedence::Or,
        },
        TokenType::False | TokenType::Nil | TokenType::True => ParseRule {
            prefix: Some(literal),
            infix: None,
            precedence: Precedence::None,
        },
        TokenType::Super => ParseRule {
            prefix: Some(super_),
            infix: None,
            precedence: Precedence::None,
        },
        TokenType::This => ParseRule {
            prefix: Some(this_),
            infix: None,
            precedence: Precedence::None,
        },
        _ => ParseRule {
            prefix: None,
            infix: None,
            precedence: Precedence::None,
        },
    }
}

impl<'src, 'vm> Compiler<'src, 'vm> {
    pub(super) fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// Algorithm from §4.2: run the prefix rule for `previous`, then keep
    /// folding in infix rules as long as the upcoming token binds at least
    /// as tightly as `precedence`. `can_assign` is threaded through so only
    /// the outermost call in an assignment target actually consumes `=`.
    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix_rule) = rule(self.previous.kind).prefix else {
            self.error("Expect expression.");
            return;
        };

        let can_assign = precedence <= Precedence::Assignment;
        prefix_rule(self, can_assign);

        while precedence <= rule(self.current.kind).precedence {
            self.advance();
            let infix_rule = rule(self.previous.kind)
                .infix
                .expect("a token with infix precedence always has an infix rule");
            infix_rule(self, can_assign);
        }

        if can_assign && self.match_token(TokenType::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    /// Emit a read (or, if `can_assign` and an `=` follows, a write) of
    /// `name` resolved in order: local, upvalue, global (§4.2 "Variable
    /// resolution"). Shared by plain identifiers, `this`, and `super`.
    pub(super) fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local_checked(name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(slot) = self.resolve_upvalue_checked(name) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, slot)
        } else {
            let constant = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, constant)
        };

        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.emit_bytes(set_op, arg);
        } else {
            self.emit_bytes(get_op, arg);
        }
    }
}

/// `(` as an infix operator: a call on whatever the prefix/infix chain so
/// far has left on the stack.
fn call(compiler: &mut Compiler<'_, '_>, _can_assign: bool) {
    let arg_count = argument_list(compiler);
    compiler.emit_bytes(OpCode::Call, arg_count);
}

/// Shared by `call` and `dot`'s method-call shorthand. Cap matches §4.2's
/// 255-argument limit.
fn argument_list(compiler: &mut Compiler<'_, '_>) -> u8 {
    let mut arg_count: usize = 0;
    if !compiler.check(TokenType::RightParen) {
        loop {
            compiler.expression();
            if arg_count == MAX_ARGS {
                compiler.error("Can't have more than 255 arguments.");
            }
            arg_count += 1;
            if !compiler.match_token(TokenType::Comma) {
                break;
            }
        }
    }
    compiler.consume(TokenType::RightParen, "Expect ')' after arguments.");
    arg_count as u8
}

/// `.name`, `.name = value`, or `.name(args)` (fused into `invoke`).
fn dot(compiler: &mut Compiler<'_, '_>, can_assign: bool) {
    compiler.consume(TokenType::Identifier, "Expect property name after '.'.");
    let name = compiler.identifier_constant(compiler.previous);

    if can_assign && compiler.match_token(TokenType::Equal) {
        compiler.expression();
        compiler.emit_bytes(OpCode::SetProperty, name);
    } else if compiler.match_token(TokenType::LeftParen) {
        let arg_count = argument_list(compiler);
        compiler.emit_bytes(OpCode::Invoke, name);
        compiler.emit_byte(arg_count);
    } else {
        compiler.emit_bytes(OpCode::GetProperty, name);
    }
}

fn grouping(compiler: &mut Compiler<'_, '_>, _can_assign: bool) {
    compiler.expression();
    compiler.consume(TokenType::RightParen, "Expect ')' after expression.");
}

fn literal(compiler: &mut Compiler<'_, '_>, _can_assign: bool) {
    match compiler.previous.kind {
        TokenType::False => compiler.emit_op(OpCode::False),
        TokenType::Nil => compiler.emit_op(OpCode::Nil),
        TokenType::True => compiler.emit_op(OpCode::True),
        _ => unreachable!("literal rule is only registered for false/nil/true"),
    }
}

fn number(compiler: &mut Compiler<'_, '_>, _can_assign: bool) {
    let value: f64 = compiler
        .previous
        .text
        .parse()
        .expect("the tokenizer only produces valid decimal digit runs");
    compiler.emit_constant(Value::Number(value));
}

/// Strip the surrounding quotes and intern the remaining bytes.
fn string_literal(compiler: &mut Compiler<'_, '_>, _can_assign: bool) {
    let text = compiler.previous.text;
    let contents = &text[1..text.len() - 1];
    let interned = compiler.vm.intern_string(contents);
    compiler.emit_constant(Value::Obj(interned));
}

fn variable(compiler: &mut Compiler<'_, '_>, can_assign: bool) {
    compiler.named_variable(compiler.previous, can_assign);
}

fn this_(compiler: &mut Compiler<'_, '_>, _can_assign: bool) {
    if compiler.class_compiler.is_none() {
        compiler.error("Can't use 'this' outside of a class.");
        return;
    }
    // `this` reads like a local, never an assignment target.
    compiler.named_variable(compiler.previous, false);
}

fn super_(compiler: &mut Compiler<'_, '_>, _can_assign: bool) {
    match compiler.class_compiler.as_deref() {
        None => compiler.error("Can't use 'super' outside of a class."),
        Some(class) if !class.has_superclass => {
            compiler.error("Can't use 'super' in a class with no superclass.");
        }
        Some(_) => {}
    }

    compiler.consume(TokenType::Dot, "Expect '.' after 'super'.");
    compiler.consume(TokenType::Identifier, "Expect superclass method name.");
    let name = compiler.identifier_constant(compiler.previous);

    compiler.named_variable(synthetic_token("this"), false);
    if compiler.match_token(TokenType::LeftParen) {
        let arg_count = argument_list(compiler);
        compiler.named_variable(synthetic_token("super"), false);
        compiler.emit_bytes(OpCode::SuperInvoke, name);
        compiler.emit_byte(arg_count);
    } else {
        compiler.named_variable(synthetic_token("super"), false);
        compiler.emit_bytes(OpCode::GetSuper, name);
    }
}

fn unary(compiler: &mut Compiler<'_, '_>, _can_assign: bool) {
    let operator_type = compiler.previous.kind;
    compiler.parse_precedence(Precedence::Unary);
    match operator_type {
        TokenType::Bang => compiler.emit_op(OpCode::Not),
        TokenType::Minus => compiler.emit_op(OpCode::Negate),
        _ => unreachable!("unary rule is only registered for ! and -"),
    }
}

fn binary(compiler: &mut Compiler<'_, '_>, _can_assign: bool) {
    let operator_type = compiler.previous.kind;
    let operator_rule = rule(operator_type);
    compiler.parse_precedence(operator_rule.precedence.next());
    match operator_type {
        TokenType::BangEqual => {
            compiler.emit_op(OpCode::Equal);
            compiler.emit_op(OpCode::Not);
        }
        TokenType::EqualEqual => compiler.emit_op(OpCode::Equal),
        TokenType::Greater => compiler.emit_op(OpCode::Greater),
        TokenType::GreaterEqual => {
            compiler.emit_op(OpCode::Less);
            compiler.emit_op(OpCode::Not);
        }
        TokenType::Less => compiler.emit_op(OpCode::Less),
        TokenType::LessEqual => {
            compiler.emit_op(OpCode::Greater);
            compiler.emit_op(OpCode::Not);
        }
        TokenType::Plus => compiler.emit_op(OpCode::Add),
        TokenType::Minus => compiler.emit_op(OpCode::Subtract),
        TokenType::Star => compiler.emit_op(OpCode::Multiply),
        TokenType::Slash => compiler.emit_op(OpCode::Divide),
        _ => unreachable!("binary rule is only registered for arithmetic/comparison operators"),
    }
}

/// Short-circuiting `and`: skip the right operand entirely when the left
/// is already falsey, leaving that falsey value as the result.
fn and_(compiler: &mut Compiler<'_, '_>, _can_assign: bool) {
    let end_jump = compiler.emit_jump(OpCode::JumpIfFalse);
    compiler.emit_op(OpCode::Pop);
    compiler.parse_precedence(Precedence::And);
    compiler.patch_jump(end_jump);
}

/// Short-circuiting `or`: jump past the right operand when the left is
/// already truthy.
fn or_(compiler: &mut Compiler<'_, '_>, _can_assign: bool) {
    let else_jump = compiler.emit_jump(OpCode::JumpIfFalse);
    let end_jump = compiler.emit_jump(OpCode::Jump);
    compiler.patch_jump(else_jump);
    compiler.emit_op(OpCode::Pop);
    compiler.parse_precedence(Precedence::Or);
    compiler.patch_jump(end_jump);
}
