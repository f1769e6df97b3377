// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Built-in native functions, installed into the globals table at VM
//! construction (§5 "Natives").

use crate::value::Value;
use crate::vm::Vm;
use std::time::{SystemTime, UNIX_EPOCH};

/// Installs every native function. Called once from [`Vm::new`].
pub(crate) fn install(vm: &mut Vm) {
    let clock_ref = vm.alloc_native(clock);
    vm.define_global("clock", Value::Obj(clock_ref));
}

/// Seconds elapsed since the Unix epoch, as a floating-point value.
fn clock(_args: &[Value]) -> Result<Value, String> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| "system clock is before the Unix epoch".to_string())?;
    Ok(Value::Number(elapsed.as_secs_f64()))
}
