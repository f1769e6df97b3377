// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Class compiler stack (§4.2 "Classes").

/// One entry per class body currently being compiled. Forms a back-spine
/// like [`super::function::FunctionCompiler`] so `super` resolution can
/// walk outward from a nested method.
pub(super) struct ClassCompiler {
    pub enclosing: Option<Box<ClassCompiler>>,
    pub has_superclass: bool,
}

impl ClassCompiler {
    pub fn new(enclosing: Option<Box<ClassCompiler>>) -> Self {
        Self {
            enclosing,
            has_superclass: false,
        }
    }
}
