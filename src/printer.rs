// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Value formatting for `print` and error messages (§6).

use crate::object::ObjKind;
use crate::value::Value;

/// Render a value the way the `print` instruction and error messages do.
#[must_use]
pub fn print_value(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(*n),
        Value::Obj(obj) => match obj.kind() {
            ObjKind::String => obj.as_str().to_string(),
            ObjKind::Function => {
                let func = unsafe { obj.as_function() };
                match func.name.get() {
                    Some(name) => format!("<fn {}>", name.as_str()),
                    None => "<script>".to_string(),
                }
            }
            ObjKind::Closure => {
                let closure = unsafe { obj.as_closure() };
                let func = unsafe { closure.function.as_function() };
                match func.name.get() {
                    Some(name) => format!("<fn {}>", name.as_str()),
                    None => "<script>".to_string(),
                }
            }
            ObjKind::Native => "<native fn>".to_string(),
            ObjKind::Class => {
                let class = unsafe { obj.as_class() };
                class.name.as_str().to_string()
            }
            ObjKind::Instance => {
                let instance = unsafe { obj.as_instance() };
                let class = unsafe { instance.class.as_class() };
                format!("{} instance", class.name.as_str())
            }
            ObjKind::BoundMethod => {
                let bound = unsafe { obj.as_bound_method() };
                print_value(&Value::Obj(bound.method))
            }
            ObjKind::Upvalue => "<upvalue>".to_string(),
        },
    }
}

/// C's `printf("%g", ...)` with the default precision of 6 significant
/// digits: fixed notation when the decimal exponent is in `-4..precision`,
/// scientific notation otherwise, trailing fractional zeros (and a bare
/// trailing `.`) stripped either way. Rust's `Display` for `f64` is a
/// shortest-round-trip representation and is not equivalent.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    format_g(n, 6)
}

fn format_g(n: f64, precision: usize) -> String {
    let precision = precision.max(1);
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let scientific = format!("{:.*e}", precision - 1, n);
    let (mantissa, exponent_str) = scientific
        .split_once('e')
        .expect("Rust's `{:e}` format always emits an exponent");
    let exponent: i32 = exponent_str
        .parse()
        .expect("Rust's scientific exponent is always a valid integer");

    if exponent >= -4 && i64::from(exponent) < precision as i64 {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        strip_trailing_zeros(&format!("{n:.decimals$}"))
    } else {
        let mantissa = strip_trailing_zeros(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    }
}

/// Drop trailing fractional zeros, and the decimal point itself if nothing
/// follows it, matching `%g`'s default (no `#` flag) behavior.
fn strip_trailing_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
