// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Recursive-descent parser from tokens to [`Program`].
//!
//! Statement structure is parsed here; the expressions inside statements are
//! handed to the expression crate's parser as source slices, so that ppp and
//! the variable tables share one expression grammar.

use expression::ExpressionError;
use pulse_program::Opcode;

use crate::ast::*;
use crate::lexer::{SourceMap, Token, TokenKind, tokenize};
use crate::{CompileError, Result};

pub fn parse(source: &str) -> Result<Program> {
    let tokens = tokenize(source)?;
    let map = SourceMap::new(source);
    let mut parser = Parser {
        source,
        map: &map,
        tokens,
        pos: 0,
    };
    parser.program()
}

/// Convert an expression failure inside a slice starting at `start`.
pub(crate) fn expression_error(map: &SourceMap, start: usize, err: &ExpressionError) -> CompileError {
    let position = map.position(start + err.offset().unwrap_or(0));
    let message = match err {
        ExpressionError::Syntax { message, .. } => message.clone(),
        ExpressionError::UnresolvedIdentifier { name, .. } => format!("unresolved identifier '{name}'"),
        ExpressionError::UnknownFunction { name, .. } => format!("unknown function '{name}'"),
        other => other.to_string(),
    };
    CompileError::at(position, message)
}

struct Parser<'a> {
    source: &'a str,
    map: &'a SourceMap,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek().kind, TokenKind::Op(o) if o == op)
    }

    fn at_name(&self, name: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Name(n) if n == name)
    }

    fn position(token: &Token) -> Position {
        Position {
            line: token.line,
            column: token.column,
        }
    }

    fn error(&self, token: &Token, message: impl Into<String>) -> CompileError {
        CompileError::at(Self::position(token), message)
    }

    fn unexpected(&self) -> CompileError {
        let token = self.peek();
        let found = match &token.kind {
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "unexpected indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::Eof => "end of file".to_string(),
            _ => format!("'{}'", &self.source[token.start..token.end]),
        };
        match token.kind {
            TokenKind::Indent => self.error(token, found),
            _ => self.error(token, format!("unexpected {found}")),
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<Token> {
        if self.at_op(op) {
            Ok(self.advance())
        } else {
            let token = self.peek();
            Err(self.error(token, format!("expected '{op}'")))
        }
    }

    fn expect_name(&mut self) -> Result<(String, Token)> {
        match &self.peek().kind {
            TokenKind::Name(name) => {
                let name = name.clone();
                Ok((name, self.advance()))
            }
            _ => {
                let token = self.peek();
                Err(self.error(token, "expected a name"))
            }
        }
    }

    fn end_of_simple_statement(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline | TokenKind::Eof | TokenKind::Dedent
        ) || self.at_op(";")
    }

    fn program(&mut self) -> Result<Program> {
        let mut program = Program::default();
        loop {
            match self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::Newline => {
                    self.advance();
                }
                _ => program.items.extend(self.line(true)?),
            }
        }
        Ok(program)
    }

    /// One logical line: a compound statement or `;`-separated simple items.
    fn line(&mut self, top_level: bool) -> Result<Vec<Item>> {
        if let TokenKind::Name(keyword) = &self.peek().kind {
            match keyword.as_str() {
                "def" if top_level => return Ok(vec![Item::Procedure(self.procedure()?)]),
                "def" => {
                    let token = self.peek();
                    return Err(self.error(token, "procedures must be defined at top level"));
                }
                "if" => return Ok(vec![Item::Statement(self.if_statement()?)]),
                "while" => return Ok(vec![Item::Statement(self.while_statement()?)]),
                _ => {}
            }
        }
        let mut items = Vec::new();
        loop {
            items.push(self.simple_item(top_level)?);
            if self.at_op(";") {
                self.advance();
                if !self.end_of_simple_statement() {
                    continue;
                }
            }
            break;
        }
        match self.peek().kind {
            TokenKind::Newline => {
                self.advance();
            }
            TokenKind::Eof | TokenKind::Dedent => {}
            _ => return Err(self.unexpected()),
        }
        Ok(items)
    }

    fn is_declaration(&self) -> bool {
        let TokenKind::Name(keyword) = &self.peek().kind else {
            return false;
        };
        let Some(kind) = DeclarationKind::from_keyword(keyword) else {
            return false;
        };
        match &self.peek_at(1).kind {
            TokenKind::Name(_) => true,
            TokenKind::Op("<") => kind == DeclarationKind::Parameter,
            _ => false,
        }
    }

    fn simple_item(&mut self, top_level: bool) -> Result<Item> {
        if self.is_declaration() {
            if !top_level {
                let token = self.peek();
                return Err(self.error(token, "declarations are only allowed at top level"));
            }
            return Ok(Item::Declaration(self.declaration()?));
        }
        Ok(Item::Statement(self.simple_statement()?))
    }

    fn declaration(&mut self) -> Result<Declaration> {
        let (keyword, token) = self.expect_name()?;
        let kind = DeclarationKind::from_keyword(&keyword).ok_or_else(|| self.error(&token, "expected a declaration"))?;
        let mut encoding = None;
        if kind == DeclarationKind::Parameter && self.at_op("<") {
            self.advance();
            encoding = Some(self.expect_name()?.0);
            self.expect_op(">")?;
        }
        let (name, _) = self.expect_name()?;
        let value = if self.at_op("=") {
            self.advance();
            Some(self.expression(&[",", ";"])?)
        } else {
            None
        };
        if value.is_none() && kind.requires_value() {
            let token = self.peek();
            return Err(self.error(token, format!("'{keyword}' declarations need a value")));
        }
        let mut attributes = Vec::new();
        while self.at_op(",") {
            self.advance();
            let (attribute, token) = self.expect_name()?;
            attributes.push((attribute, Self::position(&token)));
        }
        Ok(Declaration {
            kind,
            name,
            value,
            attributes,
            encoding,
            position: Self::position(&token),
        })
    }

    fn procedure(&mut self) -> Result<Procedure> {
        let token = self.advance();
        let (name, _) = self.expect_name()?;
        self.expect_op("(")?;
        let mut parameters = Vec::new();
        while !self.at_op(")") {
            let (parameter, token) = self.expect_name()?;
            if parameters.contains(&parameter) {
                return Err(self.error(&token, format!("duplicate parameter '{parameter}'")));
            }
            parameters.push(parameter);
            if !self.at_op(")") {
                self.expect_op(",")?;
            }
        }
        self.advance();
        let body = self.block()?;
        Ok(Procedure {
            name,
            parameters,
            body,
            position: Self::position(&token),
        })
    }

    fn if_statement(&mut self) -> Result<Statement> {
        let token = self.advance();
        let mut branches = vec![(self.expression(&[":"])?, self.block()?)];
        let mut otherwise = Vec::new();
        loop {
            if self.at_name("elif") {
                self.advance();
                branches.push((self.expression(&[":"])?, self.block()?));
            } else if self.at_name("else") {
                self.advance();
                otherwise = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Statement {
            kind: StatementKind::If { branches, otherwise },
            position: Self::position(&token),
        })
    }

    fn while_statement(&mut self) -> Result<Statement> {
        let token = self.advance();
        let condition = self.expression(&[":"])?;
        let body = self.block()?;
        Ok(Statement {
            kind: StatementKind::While { condition, body },
            position: Self::position(&token),
        })
    }

    /// `: NEWLINE INDENT lines DEDENT` or `: simple statements NEWLINE`.
    fn block(&mut self) -> Result<Vec<Statement>> {
        self.expect_op(":")?;
        let mut items = Vec::new();
        if matches!(self.peek().kind, TokenKind::Newline) {
            self.advance();
            if !matches!(self.peek().kind, TokenKind::Indent) {
                let token = self.peek();
                return Err(self.error(token, "expected an indented block"));
            }
            self.advance();
            while !matches!(self.peek().kind, TokenKind::Dedent | TokenKind::Eof) {
                if matches!(self.peek().kind, TokenKind::Newline) {
                    self.advance();
                    continue;
                }
                items.extend(self.line(false)?);
            }
            if matches!(self.peek().kind, TokenKind::Dedent) {
                self.advance();
            }
        } else {
            items = self.line(false)?;
        }
        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Item::Statement(statement) => Some(statement),
                _ => None,
            })
            .collect())
    }

    fn simple_statement(&mut self) -> Result<Statement> {
        let token = self.peek().clone();
        let position = Self::position(&token);
        let TokenKind::Name(name) = &token.kind else {
            return Err(self.unexpected());
        };
        let kind = match name.as_str() {
            "pass" => {
                self.advance();
                StatementKind::Pass
            }
            "return" => {
                self.advance();
                if self.end_of_simple_statement() {
                    StatementKind::Return(None)
                } else {
                    StatementKind::Return(Some(self.expression(&[";"])?))
                }
            }
            mnemonic if is_mnemonic(mnemonic) => StatementKind::Asm(self.raw_statement()),
            _ => {
                let name = name.clone();
                self.advance();
                match &self.peek().kind {
                    TokenKind::Op("(") => {
                        let arguments = self.arguments()?;
                        StatementKind::Call { name, arguments }
                    }
                    TokenKind::Op("=") => {
                        self.advance();
                        StatementKind::Assign {
                            target: name,
                            op: None,
                            value: self.expression(&[";"])?,
                        }
                    }
                    TokenKind::Op(op) if AugmentedOp::from_token(op).is_some() => {
                        let op = AugmentedOp::from_token(op);
                        self.advance();
                        StatementKind::Assign {
                            target: name,
                            op,
                            value: self.expression(&[";"])?,
                        }
                    }
                    _ => return Err(self.unexpected()),
                }
            }
        };
        Ok(Statement { kind, position })
    }

    /// Source text up to the end of the simple statement.
    fn raw_statement(&mut self) -> String {
        let start = self.peek().start;
        let mut end = start;
        while !self.end_of_simple_statement() {
            end = self.advance().end;
        }
        clean_continuations(&self.source[start..end])
    }

    fn arguments(&mut self) -> Result<Vec<Argument>> {
        self.expect_op("(")?;
        let mut arguments: Vec<Argument> = Vec::new();
        while !self.at_op(")") {
            let keyword = match (&self.peek().kind, &self.peek_at(1).kind) {
                (TokenKind::Name(name), TokenKind::Op("=")) => {
                    let name = name.clone();
                    self.advance();
                    self.advance();
                    Some(name)
                }
                _ => None,
            };
            if keyword.is_none() && arguments.iter().any(|a| a.keyword.is_some()) {
                let token = self.peek();
                return Err(self.error(token, "positional argument follows keyword argument"));
            }
            let value = self.expression(&[",", ")"])?;
            arguments.push(Argument { keyword, value });
            if !self.at_op(")") {
                self.expect_op(",")?;
            }
        }
        self.advance();
        Ok(arguments)
    }

    /// Collect tokens up to one of `stops` at bracket depth zero and parse them.
    fn expression(&mut self, stops: &[&str]) -> Result<SourceExpr> {
        let first = self.peek().clone();
        let mut depth = 0usize;
        let mut end = first.start;
        loop {
            let token = self.peek();
            match &token.kind {
                TokenKind::Newline | TokenKind::Eof | TokenKind::Indent | TokenKind::Dedent => break,
                TokenKind::Op(op) if depth == 0 && stops.contains(op) => break,
                TokenKind::Op("(" | "[" | "{") => depth += 1,
                TokenKind::Op(")" | "]" | "}") => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            end = self.advance().end;
        }
        if end == first.start {
            return Err(self.error(&first, "expected an expression"));
        }
        let text = clean_continuations(&self.source[first.start..end]);
        let expr = expression::parser::parse(&text).map_err(|err| expression_error(self.map, first.start, &err))?;
        Ok(SourceExpr {
            expr,
            text,
            start: first.start,
        })
    }
}

/// Blank out backslash continuations while keeping byte offsets intact.
fn clean_continuations(text: &str) -> String {
    text.replace("\\\r\n", "   ").replace("\\\n", "  ")
}

fn is_mnemonic(name: &str) -> bool {
    name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        && Opcode::from_mnemonic(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use expression::parser::ExprKind;

    fn statements(source: &str) -> Vec<StatementKind> {
        parse(source)
            .unwrap()
            .items
            .into_iter()
            .filter_map(|item| match item {
                Item::Statement(s) => Some(s.kind),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_declarations() {
        let program = parse(
            "var x = 10 MHz, AD9912_FRQ\nparameter<AD9912_PHASE> phase = 0\nshutter cooling\nconst N = 5\n",
        )
        .unwrap();
        let Item::Declaration(x) = &program.items[0] else {
            panic!("expected a declaration");
        };
        assert_eq!(x.kind, DeclarationKind::Var);
        assert_eq!(x.name, "x");
        assert_eq!(x.value.as_ref().unwrap().text, "10 MHz");
        assert_eq!(x.attributes[0].0, "AD9912_FRQ");
        let Item::Declaration(phase) = &program.items[1] else {
            panic!("expected a declaration");
        };
        assert_eq!(phase.encoding.as_deref(), Some("AD9912_PHASE"));
        let Item::Declaration(cooling) = &program.items[2] else {
            panic!("expected a declaration");
        };
        assert_eq!(cooling.kind, DeclarationKind::Shutter);
        assert!(cooling.value.is_none());
    }

    #[test]
    fn test_semicolons_and_asm() {
        let program = parse("var x = 0 ; update(1 us) ; DDSFRQ 0, x ; update(1 us) ; END").unwrap();
        assert_eq!(program.items.len(), 5);
        let Item::Statement(asm) = &program.items[2] else {
            panic!("expected a statement");
        };
        assert_eq!(asm.kind, StatementKind::Asm("DDSFRQ 0, x".to_string()));
        assert_eq!(asm.position, Position { line: 1, column: 28 });
        let Item::Statement(end) = &program.items[4] else {
            panic!("expected a statement");
        };
        assert_eq!(end.kind, StatementKind::Asm("END".to_string()));
    }

    #[test]
    fn test_compound_statements() {
        let source = "\
if x > 3:
    x -= 1
elif x == 0: pass
else:
    while y:
        y = y - 1
";
        let parsed = statements(source);
        let StatementKind::If { branches, otherwise } = &parsed[0] else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].0.text, "x > 3");
        let StatementKind::Assign { target, op, value } = &branches[0].1[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!((target.as_str(), *op), ("x", Some(AugmentedOp::Sub)));
        assert_eq!(value.text, "1");
        assert_eq!(branches[1].1[0].kind, StatementKind::Pass);
        assert!(matches!(otherwise[0].kind, StatementKind::While { .. }));
    }

    #[test]
    fn test_keyword_arguments() {
        let parsed = statements("set_dds(channel=1, frequency=f, phase=(a + 1) * 2)\n");
        let StatementKind::Call { name, arguments } = &parsed[0] else {
            panic!("expected call");
        };
        assert_eq!(name, "set_dds");
        assert_eq!(arguments.len(), 3);
        assert_eq!(arguments[2].keyword.as_deref(), Some("phase"));
        assert_eq!(arguments[2].value.text, "(a + 1) * 2");
        assert!(matches!(arguments[0].value.expr.kind, ExprKind::Int(1)));
    }

    #[test]
    fn test_procedures() {
        let program = parse("def twice(a):\n    return a + a\n\ntwice(3)\n").unwrap();
        let Item::Procedure(procedure) = &program.items[0] else {
            panic!("expected procedure");
        };
        assert_eq!(procedure.parameters, vec!["a".to_string()]);
        assert!(matches!(procedure.body[0].kind, StatementKind::Return(Some(_))));
        assert!(matches!(program.items[1], Item::Statement(_)));
    }

    #[test]
    fn test_error_positions() {
        let err = parse("x = 1\nif x > :\n    pass\n").unwrap_err();
        assert_eq!(err.line, 2);

        let err = parse("while x:\n    var y = 1\n").unwrap_err();
        assert_eq!((err.line, err.column), (2, 5));
        assert!(err.message.contains("top level"));

        let err = parse("x = 1\n    y = 2\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("indent"));
    }
}
