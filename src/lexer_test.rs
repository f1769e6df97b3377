// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the tokenizer.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::lexer::{Lexer, TokenType};

fn scan_all(source: &str) -> Vec<TokenType> {
    let mut lexer = Lexer::new(source);
    let mut kinds = Vec::new();
    loop {
        let token = lexer.scan_token();
        let kind = token.kind;
        kinds.push(kind);
        if kind == TokenType::Eof {
            break;
        }
    }
    kinds
}

#[test]
fn single_char_punctuation() {
    let kinds = scan_all("(){};,.-+/*");
    assert_eq!(
        kinds,
        vec![
            TokenType::LeftParen,
            TokenType::RightParen,
            TokenType::LeftBrace,
            TokenType::RightBrace,
            TokenType::Semicolon,
            TokenType::Comma,
            TokenType::Dot,
            TokenType::Minus,
            TokenType::Plus,
            TokenType::Slash,
            TokenType::Star,
            TokenType::Eof,
        ]
    );
}

#[test]
fn two_char_operators_prefer_the_longer_match() {
    let kinds = scan_all("! != = == < <= > >=");
    assert_eq!(
        kinds,
        vec![
            TokenType::Bang,
            TokenType::BangEqual,
            TokenType::Equal,
            TokenType::EqualEqual,
            TokenType::Less,
            TokenType::LessEqual,
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Eof,
        ]
    );
}

#[test]
fn string_literal_keeps_quotes_in_text() {
    let mut lexer = Lexer::new("\"hello\"");
    let token = lexer.scan_token();
    assert_eq!(token.kind, TokenType::String);
    assert_eq!(token.text, "\"hello\"");
}

#[test]
fn unterminated_string_produces_error_token() {
    let mut lexer = Lexer::new("\"hello");
    let token = lexer.scan_token();
    assert_eq!(token.kind, TokenType::Error);
    assert_eq!(token.text, "Unterminated string.");
}

#[test]
fn integer_and_fractional_numbers() {
    let mut lexer = Lexer::new("123 4.5");
    let first = lexer.scan_token();
    assert_eq!(first.kind, TokenType::Number);
    assert_eq!(first.text, "123");
    let second = lexer.scan_token();
    assert_eq!(second.kind, TokenType::Number);
    assert_eq!(second.text, "4.5");
}

#[test]
fn a_trailing_dot_with_no_digits_is_not_consumed() {
    let mut lexer = Lexer::new("1.");
    let number = lexer.scan_token();
    assert_eq!(number.kind, TokenType::Number);
    assert_eq!(number.text, "1");
    let dot = lexer.scan_token();
    assert_eq!(dot.kind, TokenType::Dot);
}

#[test]
fn keywords_are_recognized_exactly() {
    let kinds = scan_all("and class else false for fun if nil or print return super this true var while");
    assert_eq!(
        kinds,
        vec![
            TokenType::And,
            TokenType::Class,
            TokenType::Else,
            TokenType::False,
            TokenType::For,
            TokenType::Fun,
            TokenType::If,
            TokenType::Nil,
            TokenType::Or,
            TokenType::Print,
            TokenType::Return,
            TokenType::Super,
            TokenType::This,
            TokenType::True,
            TokenType::Var,
            TokenType::While,
            TokenType::Eof,
        ]
    );
}

/// Regression coverage for the fixed keyword-dispatch defect: identifiers
/// that share a prefix with `f`/`t`-keywords must not fall through to the
/// wrong keyword or get misrecognized.
#[test]
fn identifiers_sharing_a_prefix_with_keywords_stay_identifiers() {
    let kinds = scan_all("foo form fort this2 thatone trueish f t");
    assert_eq!(
        kinds,
        vec![
            TokenType::Identifier, // foo
            TokenType::Identifier, // form
            TokenType::Identifier, // fort
            TokenType::Identifier, // this2
            TokenType::Identifier, // thatone
            TokenType::Identifier, // trueish
            TokenType::Identifier, // f
            TokenType::Identifier, // t
            TokenType::Eof,
        ]
    );
}

#[test]
fn exact_f_and_t_keywords_still_resolve() {
    let kinds = scan_all("false for fun this true");
    assert_eq!(
        kinds,
        vec![
            TokenType::False,
            TokenType::For,
            TokenType::Fun,
            TokenType::This,
            TokenType::True,
            TokenType::Eof,
        ]
    );
}

#[test]
fn line_comments_are_skipped_but_single_slash_is_a_token() {
    let kinds = scan_all("// a comment\n+ 1 / 2");
    assert_eq!(
        kinds,
        vec![
            TokenType::Plus,
            TokenType::Number,
            TokenType::Slash,
            TokenType::Number,
            TokenType::Eof,
        ]
    );
}

#[test]
fn newlines_advance_the_line_counter() {
    let mut lexer = Lexer::new("1\n\n2");
    let first = lexer.scan_token();
    assert_eq!(first.line, 1);
    let second = lexer.scan_token();
    assert_eq!(second.line, 3);
}

#[test]
fn unexpected_character_is_an_error_token() {
    let mut lexer = Lexer::new("$");
    let token = lexer.scan_token();
    assert_eq!(token.kind, TokenType::Error);
    assert_eq!(token.text, "Unexpected character.");
}

#[test]
fn scanning_past_eof_keeps_returning_eof() {
    let mut lexer = Lexer::new("");
    assert_eq!(lexer.scan_token().kind, TokenType::Eof);
    assert_eq!(lexer.scan_token().kind, TokenType::Eof);
}
