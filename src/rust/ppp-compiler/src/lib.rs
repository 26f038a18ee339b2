// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Compiler for the ppp pulse-sequencing language.
//!
//! ```text
//! source --lexer--> tokens --parser--> AST --codegen--> assembly text
//! ```
//!
//! The output is pulse-program assembly, to be assembled by the
//! `pulse-program` crate, together with a map from assembly lines back to
//! the ppp lines they were generated from.

pub mod ast;
pub mod codegen;
pub mod lexer;
pub mod parser;
pub mod symbols;

pub use ast::Position;
pub use codegen::CompiledProgram;
pub use symbols::{BUILTINS, Builtin, SymbolTable};

/// The first error found in a ppp source.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}, column {column}: {message}")]
pub struct CompileError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl CompileError {
    pub fn at(position: Position, message: impl Into<String>) -> Self {
        CompileError {
            line: position.line,
            column: position.column,
            message: message.into(),
        }
    }
}

pub type Result<T, E = CompileError> = std::result::Result<T, E>;

/// Compile ppp source text to assembly.
pub fn compile(source: &str) -> Result<CompiledProgram> {
    let program = parser::parse(source)?;
    codegen::generate(&program, &lexer::SourceMap::new(source))
}
