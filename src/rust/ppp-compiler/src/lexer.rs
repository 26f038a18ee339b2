// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Tokenizer with Python-style significant indentation.
//!
//! Leading whitespace of each logical line is measured (a tab counts as 4
//! columns) against a stack of open indentation levels and turned into
//! `Indent` / `Dedent` tokens. Newlines inside brackets and after a trailing
//! backslash do not end the logical line.

use crate::ast::Position;
use crate::{CompileError, Result};

const TAB_WIDTH: usize = 4;

/// Maps byte offsets back to line and column.
#[derive(Debug, Clone)]
pub struct SourceMap {
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        SourceMap { line_starts }
    }

    pub fn position(&self, offset: usize) -> Position {
        let line = self.line_starts.partition_point(|&start| start <= offset).max(1);
        Position {
            line,
            column: offset - self.line_starts[line - 1] + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Name(String),
    Number,
    Str,
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte range in the source.
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

const OPERATORS: [&str; 33] = [
    "<<=", ">>=", "**", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "&=", "|=", "<<", ">>",
    "(", ")", "[", "]", "{", "}", ",", ":", ";", "=", "+", "-", "*", "/", "%", "^", "<", ">",
];

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
    depth: usize,
    indents: Vec<usize>,
    tokens: Vec<Token>,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        line: 1,
        line_start: 0,
        depth: 0,
        indents: vec![0],
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer<'_> {
    fn column(&self, pos: usize) -> usize {
        pos - self.line_start + 1
    }

    fn error(&self, pos: usize, message: impl Into<String>) -> CompileError {
        CompileError {
            line: self.line,
            column: self.column(pos),
            message: message.into(),
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            start,
            end,
            line: self.line,
            column: self.column(start),
        });
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.line_start = self.pos;
    }

    fn run(&mut self) -> Result<()> {
        let mut at_line_start = true;
        while self.pos < self.bytes.len() {
            if at_line_start && self.depth == 0 {
                at_line_start = false;
                if self.indentation()? {
                    at_line_start = true;
                    continue;
                }
            }
            let c = self.bytes[self.pos];
            let start = self.pos;
            match c {
                b'\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        self.push(TokenKind::Newline, start, start);
                        at_line_start = true;
                    }
                    self.new_line();
                }
                b'\\' if matches!(self.bytes.get(self.pos + 1), Some(b'\n')) => {
                    self.pos += 2;
                    self.new_line();
                }
                b'\\' if self.bytes.get(self.pos + 1..self.pos + 3) == Some(b"\r\n") => {
                    self.pos += 3;
                    self.new_line();
                }
                b'#' => {
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'"' | b'\'' => {
                    let close = self.source[start + 1..]
                        .find(c as char)
                        .filter(|&i| !self.source[start + 1..start + 1 + i].contains('\n'))
                        .ok_or_else(|| self.error(start, "unterminated string"))?;
                    self.pos = start + close + 2;
                    self.push(TokenKind::Str, start, self.pos);
                }
                c if c.is_ascii_digit() || (c == b'.' && self.bytes.get(start + 1).is_some_and(u8::is_ascii_digit)) => {
                    self.number();
                    self.push(TokenKind::Number, start, self.pos);
                }
                c if c.is_ascii_alphabetic() || c == b'_' || !c.is_ascii() => {
                    let end = self.source[start..]
                        .char_indices()
                        .find(|(_, ch)| !(ch.is_alphanumeric() || *ch == '_'))
                        .map_or(self.source.len(), |(i, _)| start + i);
                    if end == start {
                        return Err(self.error(start, "unexpected character"));
                    }
                    self.pos = end;
                    let name = self.source[start..end].to_string();
                    self.push(TokenKind::Name(name), start, end);
                }
                _ => {
                    let op = OPERATORS
                        .iter()
                        .find(|op| self.source[start..].starts_with(**op))
                        .ok_or_else(|| self.error(start, format!("unexpected character '{}'", c as char)))?;
                    match *op {
                        "(" | "[" | "{" => self.depth += 1,
                        ")" | "]" | "}" => {
                            self.depth = self
                                .depth
                                .checked_sub(1)
                                .ok_or_else(|| self.error(start, format!("unmatched '{op}'")))?;
                        }
                        _ => {}
                    }
                    self.pos += op.len();
                    self.push(TokenKind::Op(op), start, self.pos);
                }
            }
        }
        let end = self.bytes.len();
        if self.depth > 0 {
            return Err(self.error(end, "unexpected end of file inside brackets"));
        }
        if self.tokens.last().is_some_and(|t| !matches!(t.kind, TokenKind::Newline | TokenKind::Dedent)) {
            self.push(TokenKind::Newline, end, end);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, end, end);
        }
        self.push(TokenKind::Eof, end, end);
        Ok(())
    }

    /// Measure indentation; returns true if the line was blank and skipped.
    fn indentation(&mut self) -> Result<bool> {
        let mut width = 0;
        let mut pos = self.pos;
        while let Some(&c) = self.bytes.get(pos) {
            match c {
                b' ' => width += 1,
                b'\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                _ => break,
            }
            pos += 1;
        }
        match self.bytes.get(pos) {
            None | Some(b'\n' | b'#') | Some(b'\r') => {
                // Blank or comment-only line: skip to its end.
                while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                    self.pos += 1;
                }
                if self.pos < self.bytes.len() {
                    self.pos += 1;
                    self.new_line();
                }
                return Ok(true);
            }
            _ => {}
        }
        self.pos = pos;
        let current = self.indents.last().copied().unwrap_or_default();
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, pos, pos);
        } else {
            while width < self.indents.last().copied().unwrap_or_default() {
                self.indents.pop();
                self.push(TokenKind::Dedent, pos, pos);
            }
            if width != self.indents.last().copied().unwrap_or_default() {
                return Err(self.error(pos, "unindent does not match any outer indentation level"));
            }
        }
        Ok(false)
    }

    fn number(&mut self) {
        let bytes = self.bytes;
        if bytes[self.pos] == b'0' && matches!(bytes.get(self.pos + 1), Some(b'x' | b'X')) {
            self.pos += 2;
            while self.pos < bytes.len() && (bytes[self.pos].is_ascii_hexdigit() || bytes[self.pos] == b'_') {
                self.pos += 1;
            }
            return;
        }
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'0'..=b'9' | b'.' | b'_' => self.pos += 1,
                b'e' | b'E'
                    if bytes.get(self.pos + 1).is_some_and(|c| c.is_ascii_digit() || *c == b'-' || *c == b'+') =>
                {
                    self.pos += 2;
                }
                _ => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn name(s: &str) -> TokenKind {
        TokenKind::Name(s.to_string())
    }

    #[test]
    fn test_indent_dedent() {
        let source = "while x:\n    y = 1\n\n    # comment\nz()\n";
        assert_eq!(
            kinds(source),
            vec![
                name("while"),
                name("x"),
                TokenKind::Op(":"),
                TokenKind::Newline,
                TokenKind::Indent,
                name("y"),
                TokenKind::Op("="),
                TokenKind::Number,
                TokenKind::Newline,
                TokenKind::Dedent,
                name("z"),
                TokenKind::Op("("),
                TokenKind::Op(")"),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_dedents_closed_at_eof() {
        let tokens = kinds("if a:\n    if b:\n        c = 1");
        let tail: Vec<_> = tokens[tokens.len() - 4..].to_vec();
        assert_eq!(
            tail,
            [TokenKind::Newline, TokenKind::Dedent, TokenKind::Dedent, TokenKind::Eof]
        );
    }

    #[test]
    fn test_continuations() {
        let tokens = kinds("x = (1 +\n  2) + \\\n 3\n");
        assert_eq!(tokens.iter().filter(|t| **t == TokenKind::Newline).count(), 1);
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("a = 1\n  b").unwrap();
        assert_eq!(tokens[4].kind, TokenKind::Indent);
        assert_eq!((tokens[5].line, tokens[5].column), (2, 3));
        let ok = tokenize("x  +=  0x1f").unwrap();
        assert_eq!(ok[1].kind, TokenKind::Op("+="));
        assert_eq!((ok[2].line, ok[2].column), (1, 8));
        assert_eq!(&"x  +=  0x1f"[ok[2].start..ok[2].end], "0x1f");
    }

    #[test]
    fn test_source_map() {
        let map = SourceMap::new("ab\ncd\n\nx");
        assert_eq!(map.position(0), Position { line: 1, column: 1 });
        assert_eq!(map.position(4), Position { line: 2, column: 2 });
        assert_eq!(map.position(7), Position { line: 4, column: 1 });
    }

    #[test]
    fn test_bad_dedent() {
        let err = tokenize("if a:\n        b = 1\n    c = 2\n").unwrap_err();
        assert_eq!((err.line, err.column), (3, 5));
    }
}
