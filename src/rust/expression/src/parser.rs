// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Precedence-climbing parser producing an [`Expr`] tree.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparisons, `+ -`,
//! `* / %`, unary sign, `^`/`**` (right associative), calls and indexing.

use ionpulse_units::Unit;

use crate::lexer::{Token, TokenKind, tokenize};
use crate::{ExpressionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    /// Numeric literal with an explicit unit suffix.
    Quantity(f64, Unit),
    Str(String),
    Ident(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub offset: usize,
}

impl Expr {
    fn new(kind: ExprKind, offset: usize) -> Self {
        Expr { kind, offset }
    }
}

pub fn parse(text: &str) -> Result<Expr> {
    let mut parser = Parser {
        tokens: tokenize(text)?,
        pos: 0,
    };
    let expr = parser.expression()?;
    match parser.peek() {
        TokenKind::End => Ok(expr),
        _ => Err(parser.unexpected()),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].offset
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), TokenKind::Op(o) if *o == op)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(name) if name == keyword)
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.is_op(op) {
            self.advance();
            Ok(())
        } else {
            Err(ExpressionError::Syntax {
                offset: self.offset(),
                message: format!("expected '{op}'"),
            })
        }
    }

    fn unexpected(&self) -> ExpressionError {
        let message = match self.peek() {
            TokenKind::End => "unexpected end of expression".to_string(),
            TokenKind::Op(op) => format!("unexpected '{op}'"),
            TokenKind::Ident(name) => format!("unexpected identifier '{name}'"),
            other => format!("unexpected token {other:?}"),
        };
        ExpressionError::Syntax {
            offset: self.offset(),
            message,
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr> {
        let mut lhs = self.and()?;
        while self.is_keyword("or") {
            let offset = self.advance().offset;
            let rhs = self.and()?;
            lhs = Expr::new(ExprKind::Binary(BinaryOp::Or, lhs.into(), rhs.into()), offset);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut lhs = self.not()?;
        while self.is_keyword("and") {
            let offset = self.advance().offset;
            let rhs = self.not()?;
            lhs = Expr::new(ExprKind::Binary(BinaryOp::And, lhs.into(), rhs.into()), offset);
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr> {
        if self.is_keyword("not") {
            let offset = self.advance().offset;
            let operand = self.not()?;
            return Ok(Expr::new(ExprKind::Unary(UnaryOp::Not, operand.into()), offset));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let lhs = self.sum()?;
        let op = match self.peek() {
            TokenKind::Op("==") => BinaryOp::Eq,
            TokenKind::Op("!=") => BinaryOp::Ne,
            TokenKind::Op("<") => BinaryOp::Lt,
            TokenKind::Op("<=") => BinaryOp::Le,
            TokenKind::Op(">") => BinaryOp::Gt,
            TokenKind::Op(">=") => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        let offset = self.advance().offset;
        let rhs = self.sum()?;
        Ok(Expr::new(ExprKind::Binary(op, lhs.into(), rhs.into()), offset))
    }

    fn sum(&mut self) -> Result<Expr> {
        let mut lhs = self.product()?;
        loop {
            let op = match self.peek() {
                TokenKind::Op("+") => BinaryOp::Add,
                TokenKind::Op("-") => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            let offset = self.advance().offset;
            let rhs = self.product()?;
            lhs = Expr::new(ExprKind::Binary(op, lhs.into(), rhs.into()), offset);
        }
    }

    fn product(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Op("*") => BinaryOp::Mul,
                TokenKind::Op("/") => BinaryOp::Div,
                TokenKind::Op("%") => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            let offset = self.advance().offset;
            let rhs = self.unary()?;
            lhs = Expr::new(ExprKind::Binary(op, lhs.into(), rhs.into()), offset);
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            TokenKind::Op("-") => UnaryOp::Neg,
            TokenKind::Op("+") => UnaryOp::Plus,
            _ => return self.power(),
        };
        let offset = self.advance().offset;
        let operand = self.unary()?;
        Ok(Expr::new(ExprKind::Unary(op, operand.into()), offset))
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.postfix()?;
        if self.is_op("^") || self.is_op("**") {
            let offset = self.advance().offset;
            let exponent = self.unary()?;
            return Ok(Expr::new(
                ExprKind::Binary(BinaryOp::Pow, base.into(), exponent.into()),
                offset,
            ));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        while self.is_op("[") {
            let offset = self.advance().offset;
            let index = self.expression()?;
            self.expect_op("]")?;
            expr = Expr::new(ExprKind::Index(expr.into(), index.into()), offset);
        }
        Ok(expr)
    }

    fn atom(&mut self) -> Result<Expr> {
        let start = self.pos;
        let token = self.advance();
        let offset = token.offset;
        let kind = match token.kind {
            TokenKind::Int(value) => return self.unit_suffix(value as f64, ExprKind::Int(value), offset),
            TokenKind::Float(value) => return self.unit_suffix(value, ExprKind::Float(value), offset),
            TokenKind::Str(text) => ExprKind::Str(text),
            TokenKind::Ident(name) if self.is_op("(") => {
                self.advance();
                ExprKind::Call(name, self.sequence(")")?)
            }
            TokenKind::Ident(name) => ExprKind::Ident(name),
            TokenKind::Op("(") => {
                let inner = self.expression()?;
                self.expect_op(")")?;
                return Ok(inner);
            }
            TokenKind::Op("[") => ExprKind::List(self.sequence("]")?),
            TokenKind::Op("{") => ExprKind::Dict(self.dict()?),
            _ => {
                self.pos = start;
                return Err(self.unexpected());
            }
        };
        Ok(Expr::new(kind, offset))
    }

    fn unit_suffix(&mut self, magnitude: f64, bare: ExprKind, offset: usize) -> Result<Expr> {
        let TokenKind::Ident(symbol) = self.peek() else {
            return Ok(Expr::new(bare, offset));
        };
        if matches!(symbol.as_str(), "and" | "or" | "not") {
            return Ok(Expr::new(bare, offset));
        }
        let unit_offset = self.offset();
        let unit = Unit::parse(symbol).map_err(|_| ExpressionError::Syntax {
            offset: unit_offset,
            message: format!("unknown unit '{symbol}'"),
        })?;
        self.advance();
        Ok(Expr::new(ExprKind::Quantity(magnitude, unit), offset))
    }

    fn sequence(&mut self, close: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.is_op(close) {
            items.push(self.expression()?);
            if !self.is_op(close) {
                self.expect_op(",")?;
            }
        }
        self.advance();
        Ok(items)
    }

    fn dict(&mut self) -> Result<Vec<(Expr, Expr)>> {
        let mut items = Vec::new();
        while !self.is_op("}") {
            let key = self.expression()?;
            self.expect_op(":")?;
            items.push((key, self.expression()?));
            if !self.is_op("}") {
                self.expect_op(",")?;
            }
        }
        self.advance();
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        let ExprKind::Binary(BinaryOp::Add, _, rhs) = expr.kind else {
            panic!("expected addition at the root");
        };
        assert!(matches!(rhs.kind, ExprKind::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn test_power_binds_tighter_than_sign() {
        let expr = parse("-2^2").unwrap();
        assert!(matches!(expr.kind, ExprKind::Unary(UnaryOp::Neg, _)));
    }

    #[test]
    fn test_unit_literal() {
        let expr = parse("10 MHz").unwrap();
        assert_eq!(
            expr.kind,
            ExprKind::Quantity(10.0, Unit::parse("MHz").unwrap())
        );
    }

    #[test]
    fn test_unknown_unit_reports_offset() {
        assert_eq!(
            parse("3 bogus").unwrap_err(),
            ExpressionError::Syntax {
                offset: 2,
                message: "unknown unit 'bogus'".to_string()
            }
        );
    }

    #[test]
    fn test_call_list_dict() {
        let expr = parse("f(1, [2, 3], {'a': 4})").unwrap();
        let ExprKind::Call(name, args) = expr.kind else {
            panic!("expected call");
        };
        assert_eq!(name, "f");
        assert_eq!(args.len(), 3);
        assert!(matches!(args[2].kind, ExprKind::Dict(_)));
    }

    #[test]
    fn test_trailing_garbage() {
        assert!(matches!(
            parse("1 2"),
            Err(ExpressionError::Syntax { offset: 2, .. })
        ));
        assert!(matches!(
            parse("(1 + 2"),
            Err(ExpressionError::Syntax { offset: 6, .. })
        ));
    }
}
