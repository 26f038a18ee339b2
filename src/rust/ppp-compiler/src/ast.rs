// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use expression::parser::Expr;

/// 1-based line and column of a construct in the ppp source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// A parsed expression together with the source text it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceExpr {
    pub expr: Expr,
    pub text: String,
    /// Byte offset of `text` in the ppp source.
    pub start: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Var,
    Const,
    Parameter,
    Shutter,
    MaskedShutter,
    Trigger,
    Counter,
    Exitcode,
    Address,
}

impl DeclarationKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "var" => DeclarationKind::Var,
            "const" => DeclarationKind::Const,
            "parameter" => DeclarationKind::Parameter,
            "shutter" => DeclarationKind::Shutter,
            "masked_shutter" => DeclarationKind::MaskedShutter,
            "trigger" => DeclarationKind::Trigger,
            "counter" => DeclarationKind::Counter,
            "exitcode" => DeclarationKind::Exitcode,
            "address" => DeclarationKind::Address,
            _ => return None,
        })
    }

    /// Variable type written into the assembly `var` line.
    pub fn type_name(self) -> Option<&'static str> {
        match self {
            DeclarationKind::Var => None,
            DeclarationKind::Const => Some("const"),
            DeclarationKind::Parameter => Some("parameter"),
            DeclarationKind::Shutter => Some("shutter"),
            DeclarationKind::MaskedShutter => Some("masked_shutter"),
            DeclarationKind::Trigger => Some("trigger"),
            DeclarationKind::Counter => Some("counter"),
            DeclarationKind::Exitcode => Some("exitcode"),
            DeclarationKind::Address => Some("address"),
        }
    }

    pub fn requires_value(self) -> bool {
        matches!(self, DeclarationKind::Const | DeclarationKind::Exitcode)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub name: String,
    pub value: Option<SourceExpr>,
    /// Comma-separated names after the value: a type, a unit or an encoding.
    pub attributes: Vec<(String, Position)>,
    /// Encoding given as `parameter<ENCODING>`.
    pub encoding: Option<String>,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentedOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Shl,
    Shr,
}

impl AugmentedOp {
    pub fn from_token(op: &str) -> Option<Self> {
        Some(match op {
            "+=" => AugmentedOp::Add,
            "-=" => AugmentedOp::Sub,
            "*=" => AugmentedOp::Mul,
            "/=" => AugmentedOp::Div,
            "&=" => AugmentedOp::And,
            "|=" => AugmentedOp::Or,
            "<<=" => AugmentedOp::Shl,
            ">>=" => AugmentedOp::Shr,
            _ => return None,
        })
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            AugmentedOp::Add => "ADDW",
            AugmentedOp::Sub => "SUBW",
            AugmentedOp::Mul => "MULTW",
            AugmentedOp::Div => "DIVW",
            AugmentedOp::And => "ANDW",
            AugmentedOp::Or => "ORW",
            AugmentedOp::Shl => "SHL",
            AugmentedOp::Shr => "SHR",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub keyword: Option<String>,
    pub value: SourceExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Assign {
        target: String,
        op: Option<AugmentedOp>,
        value: SourceExpr,
    },
    If {
        branches: Vec<(SourceExpr, Vec<Statement>)>,
        otherwise: Vec<Statement>,
    },
    While {
        condition: SourceExpr,
        body: Vec<Statement>,
    },
    Call {
        name: String,
        arguments: Vec<Argument>,
    },
    Return(Option<SourceExpr>),
    Pass,
    /// Assembly passed through verbatim.
    Asm(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: Vec<Statement>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Declaration(Declaration),
    Procedure(Procedure),
    Statement(Statement),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub items: Vec<Item>,
}
