// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The stack-based virtual machine (§4.4) and its heap.
//!
//! A `Vm` owns the value stack, the call-frame stack, the globals table, the
//! string-interning table, and the intrusive list of every live heap object.
//! [`crate::gc`] walks these same fields to find its roots, which is why
//! most of them are `pub(crate)` rather than hidden behind accessors.

use crate::chunk::OpCode;
use crate::compiler;
use crate::error::{FrameTrace, InterpretError, InterpretResult, RuntimeError};
use crate::object::{
    link, new_header, object_size, NativeFn, ObjBoundMethod, ObjClass, ObjClosure, ObjFunction,
    ObjHeader, ObjInstance, ObjKind, ObjNative, ObjRef, ObjString, ObjUpvalue, UpvalueLocation,
};
use crate::printer::print_value;
use crate::table::Table;
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::io::{self, Write};
use std::ptr::NonNull;

/// Tunables that shape VM behavior without changing language semantics
/// (§2): GC pacing and the two stack caps that stand in for "ran out of
/// memory" in a hosted, non-embedded interpreter.
#[derive(Debug, Clone)]
pub struct VmConfig {
    pub initial_gc_threshold: usize,
    pub gc_growth_factor: usize,
    pub stress_gc: bool,
    pub frame_stack_max: usize,
    pub value_stack_max: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        let frame_stack_max = 64;
        Self {
            initial_gc_threshold: 1024 * 1024,
            gc_growth_factor: 2,
            stress_gc: false,
            frame_stack_max,
            value_stack_max: frame_stack_max * 256,
        }
    }
}

pub(crate) struct CallFrame {
    pub closure: ObjRef,
    pub ip: usize,
    pub slots_base: usize,
}

pub struct Vm {
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) globals: Table,
    pub(crate) strings: Table,
    pub(crate) objects: Cell<Option<NonNull<ObjHeader>>>,
    pub(crate) open_upvalues: Option<NonNull<ObjUpvalue>>,
    /// Functions currently mid-compilation, rooted so the collector can
    /// reach the constants a not-yet-executing function has already
    /// emitted (§4.5 "compiler roots").
    pub(crate) compiler_roots: Vec<ObjRef>,
    pub(crate) config: VmConfig,
    pub(crate) bytes_allocated: usize,
    pub(crate) next_gc: usize,
    /// `None` only during the first few allocations of [`Vm::with_config`],
    /// before the `"init"` string itself has been interned. [`crate::gc`]
    /// skips this root while it's unset instead of marking a placeholder.
    pub(crate) init_string: Option<ObjRef>,
    output: RefCell<Box<dyn Write>>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    #[must_use]
    pub fn with_config(config: VmConfig) -> Self {
        let mut vm = Self {
            stack: Vec::new(),
            frames: Vec::new(),
            globals: Table::new(),
            strings: Table::new(),
            objects: Cell::new(None),
            open_upvalues: None,
            compiler_roots: Vec::new(),
            next_gc: config.initial_gc_threshold,
            config,
            bytes_allocated: 0,
            init_string: None,
            output: RefCell::new(Box::new(io::stdout())),
        };
        let init_string = vm.intern_string("init");
        vm.init_string = Some(init_string);
        crate::native::install(&mut vm);
        vm
    }

    /// Redirect `print` output, for tests that capture it in a buffer
    /// instead of the process's real stdout.
    pub fn set_output(&mut self, output: impl Write + 'static) {
        self.output = RefCell::new(Box::new(output));
    }

    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let function = compiler::compile(self, source).map_err(InterpretError::Compile)?;
        let closure = self.alloc_closure(function, 0);
        self.stack.push(Value::Obj(closure));
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            slots_base: 0,
        });
        self.run().map_err(InterpretError::Runtime)
    }

    // ---- allocation -------------------------------------------------

    pub(crate) fn intern_string(&mut self, chars: &str) -> ObjRef {
        let hash = hash_string(chars);
        if let Some(existing) = self.strings.find_string(chars, hash) {
            return existing;
        }
        let obj_ref = self.alloc_string(chars.into(), hash);
        self.strings.set(obj_ref, Value::Nil);
        obj_ref
    }

    fn alloc_string(&mut self, chars: Box<str>, hash: u32) -> ObjRef {
        self.bytes_allocated += object_size(ObjKind::String);
        self.maybe_gc();
        let ptr = link(
            &self.objects,
            ObjString {
                header: new_header(ObjKind::String),
                hash,
                chars,
            },
        );
        ObjRef(ptr.cast())
    }

    pub(crate) fn alloc_function(&mut self) -> ObjRef {
        self.bytes_allocated += object_size(ObjKind::Function);
        self.maybe_gc();
        let ptr = link(
            &self.objects,
            ObjFunction {
                header: new_header(ObjKind::Function),
                arity: Cell::new(0),
                upvalue_count: Cell::new(0),
                chunk: RefCell::new(crate::chunk::Chunk::new()),
                name: Cell::new(None),
            },
        );
        ObjRef(ptr.cast())
    }

    pub(crate) fn alloc_native(&mut self, function: NativeFn) -> ObjRef {
        self.bytes_allocated += object_size(ObjKind::Native);
        self.maybe_gc();
        let ptr = link(
            &self.objects,
            ObjNative {
                header: new_header(ObjKind::Native),
                function,
            },
        );
        ObjRef(ptr.cast())
    }

    pub(crate) fn alloc_closure(&mut self, function: ObjRef, upvalue_count: usize) -> ObjRef {
        let upvalues = (0..upvalue_count)
            .map(|_| Cell::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        self.bytes_allocated += object_size(ObjKind::Closure);
        self.maybe_gc();
        let ptr = link(
            &self.objects,
            ObjClosure {
                header: new_header(ObjKind::Closure),
                function,
                upvalues,
            },
        );
        ObjRef(ptr.cast())
    }

    fn alloc_class(&mut self, name: ObjRef) -> ObjRef {
        self.bytes_allocated += object_size(ObjKind::Class);
        self.maybe_gc();
        let ptr = link(
            &self.objects,
            ObjClass {
                header: new_header(ObjKind::Class),
                name,
                methods: RefCell::new(Table::new()),
            },
        );
        ObjRef(ptr.cast())
    }

    fn alloc_instance(&mut self, class: ObjRef) -> ObjRef {
        self.bytes_allocated += object_size(ObjKind::Instance);
        self.maybe_gc();
        let ptr = link(
            &self.objects,
            ObjInstance {
                header: new_header(ObjKind::Instance),
                class,
                fields: RefCell::new(Table::new()),
            },
        );
        ObjRef(ptr.cast())
    }

    fn alloc_bound_method(&mut self, receiver: Value, method: ObjRef) -> ObjRef {
        self.bytes_allocated += object_size(ObjKind::BoundMethod);
        self.maybe_gc();
        let ptr = link(
            &self.objects,
            ObjBoundMethod {
                header: new_header(ObjKind::BoundMethod),
                receiver,
                method,
            },
        );
        ObjRef(ptr.cast())
    }

    fn maybe_gc(&mut self) {
        if self.config.stress_gc || self.bytes_allocated > self.next_gc {
            self.collect_garbage();
        }
    }

    pub(crate) fn push_compiler_root(&mut self, obj: ObjRef) {
        self.compiler_roots.push(obj);
    }

    pub(crate) fn pop_compiler_root(&mut self) {
        self.compiler_roots.pop();
    }

    pub(crate) fn define_global(&mut self, name: &str, value: Value) {
        let key = self.intern_string(name);
        self.globals.set(key, value);
    }

    // ---- upvalues -----------------------------------------------------

    pub(crate) fn capture_upvalue(&mut self, stack_index: usize) -> ObjRef {
        let mut prev: Option<NonNull<ObjUpvalue>> = None;
        let mut current = self.open_upvalues;
        while let Some(ptr) = current {
            let upvalue = unsafe { ptr.as_ref() };
            let slot = match *upvalue.location.borrow() {
                UpvalueLocation::Open(s) => s,
                UpvalueLocation::Closed(_) => unreachable!("open list holds only open upvalues"),
            };
            match slot.cmp(&stack_index) {
                Ordering::Equal => return ObjRef(ptr.cast()),
                Ordering::Less => break,
                Ordering::Greater => {
                    prev = Some(ptr);
                    current = upvalue.next_open.get();
                }
            }
        }

        self.bytes_allocated += object_size(ObjKind::Upvalue);
        self.maybe_gc();
        let new_ptr = link(
            &self.objects,
            ObjUpvalue {
                header: new_header(ObjKind::Upvalue),
                location: RefCell::new(UpvalueLocation::Open(stack_index)),
                next_open: Cell::new(current),
            },
        );
        match prev {
            Some(p) => unsafe { p.as_ref().next_open.set(Some(new_ptr)) },
            None => self.open_upvalues = Some(new_ptr),
        }
        ObjRef(new_ptr.cast())
    }

    fn read_upvalue(&self, upvalue_ref: ObjRef) -> Value {
        let upvalue = unsafe { upvalue_ref.as_upvalue() };
        match *upvalue.location.borrow() {
            UpvalueLocation::Open(slot) => self.stack[slot],
            UpvalueLocation::Closed(value) => value,
        }
    }

    fn write_upvalue(&mut self, upvalue_ref: ObjRef, value: Value) {
        let upvalue = unsafe { upvalue_ref.as_upvalue() };
        let open_slot = match *upvalue.location.borrow() {
            UpvalueLocation::Open(slot) => Some(slot),
            UpvalueLocation::Closed(_) => None,
        };
        match open_slot {
            Some(slot) => self.stack[slot] = value,
            None => *upvalue.location.borrow_mut() = UpvalueLocation::Closed(value),
        }
    }

    /// Close every open upvalue whose slot is at or above `from`, copying
    /// the stack value into the upvalue before its frame disappears.
    fn close_upvalues(&mut self, from: usize) {
        while let Some(ptr) = self.open_upvalues {
            let upvalue = unsafe { ptr.as_ref() };
            let slot = match *upvalue.location.borrow() {
                UpvalueLocation::Open(s) => s,
                UpvalueLocation::Closed(_) => break,
            };
            if slot < from {
                break;
            }
            let value = self.stack[slot];
            *upvalue.location.borrow_mut() = UpvalueLocation::Closed(value);
            self.open_upvalues = upvalue.next_open.get();
        }
    }

    // ---- bytecode reading ---------------------------------------------

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("no active call frame");
        let function_ref = unsafe { frame.closure.as_closure() }.function;
        let function = unsafe { function_ref.as_function() };
        let byte = function.chunk.borrow().code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        (u16::from(hi) << 8) | u16::from(lo)
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte();
        let frame = self.frames.last().expect("no active call frame");
        let function_ref = unsafe { frame.closure.as_closure() }.function;
        let function = unsafe { function_ref.as_function() };
        function.chunk.borrow().constants[index as usize]
    }

    fn read_string(&mut self) -> ObjRef {
        self.read_constant()
            .as_obj()
            .expect("constant operand must be an interned string")
    }

    fn current_line(&self) -> u32 {
        let frame = self.frames.last().expect("no active call frame");
        let function_ref = unsafe { frame.closure.as_closure() }.function;
        let function = unsafe { function_ref.as_function() };
        function
            .chunk
            .borrow()
            .lines
            .get(frame.ip.saturating_sub(1))
            .copied()
            .unwrap_or(0)
    }

    fn runtime_error(&self, message: impl Into<String>) -> RuntimeError {
        let mut backtrace = Vec::with_capacity(self.frames.len());
        for (depth, frame) in self.frames.iter().enumerate().rev() {
            let function_ref = unsafe { frame.closure.as_closure() }.function;
            let function = unsafe { function_ref.as_function() };
            let line = if depth == self.frames.len() - 1 {
                self.current_line()
            } else {
                function
                    .chunk
                    .borrow()
                    .lines
                    .get(frame.ip.saturating_sub(1))
                    .copied()
                    .unwrap_or(0)
            };
            let name = function
                .name
                .get()
                .map_or_else(|| "script".to_string(), |n| n.as_str().to_string());
            backtrace.push(FrameTrace { line, name });
        }
        RuntimeError {
            message: message.into(),
            backtrace,
        }
    }

    // ---- stack helpers --------------------------------------------------

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.config.value_stack_max {
            return Err(self.runtime_error("Stack overflow."));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.stack
            .pop()
            .expect("stack underflow: the compiler guarantees balanced push/pop")
    }

    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    // ---- the dispatch loop ----------------------------------------------

    fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            if self.config.stress_gc {
                self.collect_garbage();
            }

            let byte = self.read_byte();
            let Some(op) = OpCode::from_u8(byte) else {
                return Err(self.runtime_error("Invalid opcode."));
            };

            match op {
                OpCode::Constant => {
                    let value = self.read_constant();
                    self.push(value)?;
                }
                OpCode::Nil => self.push(Value::Nil)?,
                OpCode::True => self.push(Value::Bool(true))?,
                OpCode::False => self.push(Value::Bool(false))?,
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames.last().expect("no active call frame").slots_base;
                    let value = self.stack[base + slot];
                    self.push(value)?;
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames.last().expect("no active call frame").slots_base;
                    let value = *self.peek(0);
                    self.stack[base + slot] = value;
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string();
                    let value = self.pop();
                    self.globals.set(name, value);
                }
                OpCode::GetGlobal => {
                    let name = self.read_string();
                    match self.globals.get(name) {
                        Some(value) => self.push(value)?,
                        None => {
                            return Err(self.runtime_error(format!(
                                "Undefined variable '{}'.",
                                name.as_str()
                            )))
                        }
                    }
                }
                OpCode::SetGlobal => {
                    let name = self.read_string();
                    let value = *self.peek(0);
                    if self.globals.set(name, value) {
                        self.globals.delete(name);
                        return Err(self.runtime_error(format!(
                            "Undefined variable '{}'.",
                            name.as_str()
                        )));
                    }
                }
                OpCode::GetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let closure = self.frames.last().expect("no active call frame").closure;
                    let upvalue_ref = unsafe { closure.as_closure() }.upvalues[slot]
                        .get()
                        .expect("upvalue slot must be captured before use");
                    let value = self.read_upvalue(upvalue_ref);
                    self.push(value)?;
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let closure = self.frames.last().expect("no active call frame").closure;
                    let upvalue_ref = unsafe { closure.as_closure() }.upvalues[slot]
                        .get()
                        .expect("upvalue slot must be captured before use");
                    let value = *self.peek(0);
                    self.write_upvalue(upvalue_ref, value);
                }
                OpCode::CloseUpvalue => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues(top);
                    self.pop();
                }
                OpCode::GetProperty => self.get_property()?,
                OpCode::SetProperty => self.set_property()?,
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b))?;
                }
                OpCode::Greater => self.binary_compare(|a, b| a > b)?,
                OpCode::Less => self.binary_compare(|a, b| a < b)?,
                OpCode::Add => self.add()?,
                OpCode::Subtract => self.binary_number(|a, b| a - b)?,
                OpCode::Multiply => self.binary_number(|a, b| a * b)?,
                OpCode::Divide => self.binary_number(|a, b| a / b)?,
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(!value.is_truthy()))?;
                }
                OpCode::Negate => {
                    let value = *self.peek(0);
                    match value.as_number() {
                        Some(n) => {
                            self.pop();
                            self.push(Value::Number(-n))?;
                        }
                        None => return Err(self.runtime_error("Operand must be a number.")),
                    }
                }
                OpCode::Jump => {
                    let offset = self.read_u16();
                    self.frames.last_mut().expect("no active call frame").ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16();
                    if !self.peek(0).is_truthy() {
                        self.frames.last_mut().expect("no active call frame").ip +=
                            offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16();
                    self.frames.last_mut().expect("no active call frame").ip -= offset as usize;
                }
                OpCode::Print => {
                    let value = self.pop();
                    writeln!(self.output.borrow_mut(), "{}", print_value(&value))
                        .expect("write to configured output stream failed");
                }
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("no active call frame");
                    self.close_upvalues(frame.slots_base);
                    if self.frames.is_empty() {
                        self.pop();
                        return Ok(());
                    }
                    self.stack.truncate(frame.slots_base);
                    self.push(result)?;
                }
                OpCode::Call => {
                    let arg_count = self.read_byte() as usize;
                    let callee = *self.peek(arg_count);
                    self.call_value(callee, arg_count)?;
                }
                OpCode::Invoke => {
                    let method_name = self.read_string();
                    let arg_count = self.read_byte() as usize;
                    self.invoke(method_name, arg_count)?;
                }
                OpCode::Closure => self.op_closure()?,
                OpCode::Class => {
                    let name = self.read_string();
                    let class = self.alloc_class(name);
                    self.push(Value::Obj(class))?;
                }
                OpCode::Method => {
                    let name = self.read_string();
                    self.define_method(name);
                }
                OpCode::Inherit => self.op_inherit()?,
                OpCode::GetSuper => {
                    let name = self.read_string();
                    let superclass = self.pop().as_obj().expect("super must resolve to a class");
                    self.bind_method(superclass, name)?;
                }
                OpCode::SuperInvoke => {
                    let method_name = self.read_string();
                    let arg_count = self.read_byte() as usize;
                    let superclass = self.pop().as_obj().expect("super must resolve to a class");
                    self.invoke_from_class(superclass, method_name, arg_count)?;
                }
            }
        }
    }

    fn binary_number(&mut self, op: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let b = *self.peek(0);
        let a = *self.peek(1);
        match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(op(a, b)))
            }
            _ => Err(self.runtime_error("Operands must be numbers.")),
        }
    }

    fn binary_compare(&mut self, op: impl Fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
        let b = *self.peek(0);
        let a = *self.peek(1);
        match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Bool(op(a, b)))
            }
            _ => Err(self.runtime_error("Operands must be numbers.")),
        }
    }

    /// Number addition or string concatenation. Operands stay on the value
    /// stack (a GC root) until the concatenated string is safely interned,
    /// so an allocation-triggered collection can never see them as garbage.
    fn add(&mut self) -> Result<(), RuntimeError> {
        let b = *self.peek(0);
        let a = *self.peek(1);
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(x + y))
            }
            _ if a.is_string() && b.is_string() => {
                let mut concatenated = String::with_capacity(
                    a.as_obj().unwrap().as_str().len() + b.as_obj().unwrap().as_str().len(),
                );
                concatenated.push_str(a.as_obj().unwrap().as_str());
                concatenated.push_str(b.as_obj().unwrap().as_str());
                let interned = self.intern_string(&concatenated);
                self.pop();
                self.pop();
                self.push(Value::Obj(interned))
            }
            _ => Err(self.runtime_error("Operands must be two numbers or two strings.")),
        }
    }

    fn call_value(&mut self, callee: Value, arg_count: usize) -> Result<(), RuntimeError> {
        let Some(obj) = callee.as_obj() else {
            return Err(self.runtime_error("Can only call functions and classes."));
        };
        match obj.kind() {
            ObjKind::Closure => self.call_closure(obj, arg_count),
            ObjKind::Native => self.call_native(obj, arg_count),
            ObjKind::Class => self.instantiate(obj, arg_count),
            ObjKind::BoundMethod => {
                let bound = unsafe { obj.as_bound_method() };
                let receiver = bound.receiver;
                let method = bound.method;
                let base = self.stack.len() - arg_count - 1;
                self.stack[base] = receiver;
                self.call_closure(method, arg_count)
            }
            _ => Err(self.runtime_error("Can only call functions and classes.")),
        }
    }

    fn call_closure(&mut self, closure: ObjRef, arg_count: usize) -> Result<(), RuntimeError> {
        let function = unsafe { closure.as_closure() }.function;
        let arity = unsafe { function.as_function() }.arity.get();
        if arg_count != arity as usize {
            return Err(self.runtime_error(format!(
                "Expected {arity} arguments but got {arg_count}."
            )));
        }
        if self.frames.len() >= self.config.frame_stack_max {
            return Err(self.runtime_error("Stack overflow."));
        }
        let slots_base = self.stack.len() - arg_count - 1;
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            slots_base,
        });
        Ok(())
    }

    fn call_native(&mut self, native_ref: ObjRef, arg_count: usize) -> Result<(), RuntimeError> {
        let native = unsafe { native_ref.as_native() };
        let base = self.stack.len() - arg_count;
        let result = (native.function)(&self.stack[base..]).map_err(|msg| self.runtime_error(msg))?;
        self.stack.truncate(base - 1);
        self.push(result)
    }

    fn instantiate(&mut self, class_ref: ObjRef, arg_count: usize) -> Result<(), RuntimeError> {
        let instance = self.alloc_instance(class_ref);
        let base = self.stack.len() - arg_count - 1;
        self.stack[base] = Value::Obj(instance);
        let init_string = self
            .init_string
            .expect("init_string is set before any bytecode runs");
        let init = unsafe { class_ref.as_class() }
            .methods
            .borrow()
            .get(init_string);
        match init {
            Some(initializer) => {
                let closure = initializer
                    .as_obj()
                    .expect("init must resolve to a closure");
                self.call_closure(closure, arg_count)
            }
            None if arg_count == 0 => Ok(()),
            None => Err(self.runtime_error(format!("Expected 0 arguments but got {arg_count}."))),
        }
    }

    fn get_property(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string();
        let receiver = *self.peek(0);
        let Some(obj) = receiver.as_obj().filter(|o| o.kind() == ObjKind::Instance) else {
            return Err(self.runtime_error("Only instances have properties."));
        };
        let instance = unsafe { obj.as_instance() };
        if let Some(value) = instance.fields.borrow().get(name) {
            self.pop();
            return self.push(value);
        }
        let class = instance.class;
        self.bind_method(class, name)
    }

    fn set_property(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string();
        let value = *self.peek(0);
        let receiver = *self.peek(1);
        let Some(obj) = receiver.as_obj().filter(|o| o.kind() == ObjKind::Instance) else {
            return Err(self.runtime_error("Only instances have fields."));
        };
        let instance = unsafe { obj.as_instance() };
        instance.fields.borrow_mut().set(name, value);
        self.pop();
        self.pop();
        self.push(value)
    }

    fn bind_method(&mut self, class: ObjRef, name: ObjRef) -> Result<(), RuntimeError> {
        let method = unsafe { class.as_class() }.methods.borrow().get(name);
        let Some(method) = method else {
            return Err(
                self.runtime_error(format!("Undefined property '{}'.", name.as_str()))
            );
        };
        let method_ref = method.as_obj().expect("method table stores closures");
        let receiver = self.pop();
        let bound = self.alloc_bound_method(receiver, method_ref);
        self.push(Value::Obj(bound))
    }

    fn invoke(&mut self, name: ObjRef, arg_count: usize) -> Result<(), RuntimeError> {
        let receiver = *self.peek(arg_count);
        let Some(obj) = receiver.as_obj().filter(|o| o.kind() == ObjKind::Instance) else {
            return Err(self.runtime_error("Only instances have methods."));
        };
        let instance = unsafe { obj.as_instance() };
        if let Some(value) = instance.fields.borrow().get(name) {
            let base = self.stack.len() - arg_count - 1;
            self.stack[base] = value;
            return self.call_value(value, arg_count);
        }
        let class = instance.class;
        self.invoke_from_class(class, name, arg_count)
    }

    fn invoke_from_class(
        &mut self,
        class: ObjRef,
        name: ObjRef,
        arg_count: usize,
    ) -> Result<(), RuntimeError> {
        let method = unsafe { class.as_class() }.methods.borrow().get(name);
        let Some(method) = method else {
            return Err(
                self.runtime_error(format!("Undefined property '{}'.", name.as_str()))
            );
        };
        let closure = method.as_obj().expect("method table stores closures");
        self.call_closure(closure, arg_count)
    }

    fn op_closure(&mut self) -> Result<(), RuntimeError> {
        let function_ref = self
            .read_constant()
            .as_obj()
            .expect("closure operand must be a function constant");
        let upvalue_count = unsafe { function_ref.as_function() }.upvalue_count.get();
        let closure = self.alloc_closure(function_ref, upvalue_count);
        for i in 0..upvalue_count {
            let is_local = self.read_byte() != 0;
            let index = self.read_byte() as usize;
            let upvalue_ref = if is_local {
                let base = self.frames.last().expect("no active call frame").slots_base;
                self.capture_upvalue(base + index)
            } else {
                let enclosing = self.frames.last().expect("no active call frame").closure;
                unsafe { enclosing.as_closure() }.upvalues[index]
                    .get()
                    .expect("enclosing upvalue must already be captured")
            };
            unsafe { closure.as_closure() }.upvalues[i].set(Some(upvalue_ref));
        }
        self.push(Value::Obj(closure))
    }

    fn define_method(&mut self, name: ObjRef) {
        let method = self.pop();
        let class = self
            .peek(0)
            .as_obj()
            .expect("class must be on the stack below its methods");
        unsafe { class.as_class() }.methods.borrow_mut().set(name, method);
    }

    fn op_inherit(&mut self) -> Result<(), RuntimeError> {
        let superclass = *self.peek(1);
        let Some(super_obj) = superclass.as_obj().filter(|o| o.kind() == ObjKind::Class) else {
            return Err(self.runtime_error("Superclass must be a class."));
        };
        let subclass = self
            .peek(0)
            .as_obj()
            .expect("subclass must be on the stack");
        let inherited: Vec<_> = unsafe { super_obj.as_class() }.methods.borrow().iter().collect();
        let mut sub_methods = unsafe { subclass.as_class() }.methods.borrow_mut();
        for (key, value) in inherited {
            sub_methods.set(key, value);
        }
        drop(sub_methods);
        self.pop();
        Ok(())
    }
}

/// FNV-1a, matching the hash the string interning table probes with.
pub(crate) fn hash_string(s: &str) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for byte in s.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}
