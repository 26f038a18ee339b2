// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Pulse programs: assembly text to instruction and data images.
//!
//! The assembler reads one statement per line (`const`, `var`, labels and
//! instructions, with `insert` splicing in other files), resolves names in a
//! second pass and emits a 32-bit instruction image and a 64-bit data image.

pub mod context;
pub mod disassembler;
pub mod opcode;
pub mod parameters;
pub mod program;
pub mod source;
pub mod variable;

use encodings::EncodingError;

pub use context::{Context, ContextError, ContextStore, ContextValue, ResolvedContext};
pub use disassembler::disassemble;
pub use opcode::{Instruction, OPCODES, Opcode, OperandKind};
pub use parameters::{ParameterError, ParameterTable};
pub use program::{ListingRow, MORE_FOLLOWS, MemoryLimits, PulseProgram, SourceLocation, words_to_bytes};
pub use source::{FileLoader, SourceLoader};
pub use variable::{DATA_WORD_BYTES, END_OF_RUN, EXITCODE_PREFIX, Variable, VariableType};

/// Assembler failure with the offending source line.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{file}:{line}: {message} ('{context}')")]
pub struct PpError {
    pub file: String,
    pub line: usize,
    pub context: String,
    pub message: String,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Pp(#[from] PpError),
    #[error("Program needs {words} instruction words, the device holds {limit}")]
    CodeSize { words: usize, limit: usize },
    #[error("Program needs {words} data words, the device holds {limit}")]
    DataSize { words: usize, limit: usize },
    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("{0}")]
    Image(String),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Context(#[from] ContextError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
